use std::sync::Arc;

use vulkano::{
	buffer::Subbuffer,
	command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage},
	descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet},
	pipeline::{Pipeline, PipelineBindPoint},
	sync::{self, GpuFuture}
};

use crate::error::{Error, VulkanError};

use super::resources::{ResourceManager, search_shaders};

pub(crate) struct DispatchOutcome {
	pub match_count: u32,
	pub positions: Vec<u32>,
	pub truncated: bool
}

/// Encodes and submits one search dispatch over `threads = text_len - pattern_len + 1`
/// candidate offsets, blocks until the device signals completion, then reads the match
/// count and the captured positions back. Callers have already validated that the pattern
/// is non-empty and no longer than the text
pub(crate) fn run_search(resources: &ResourceManager, text_buffer: Subbuffer<[u8]>, text_len: u64, pattern_buffer: Subbuffer<[u8]>, pattern_len: u32) -> Result<DispatchOutcome, Error> {
	resources.reset_match_count();

	let threads = text_len - pattern_len as u64 + 1;

	// One thread per candidate offset, flattened onto a 2D grid so group counts stay under
	// the per-dimension device limit. Out-of-range invocations in the last group exit on the
	// thread_count bound
	let width = resources.workgroup_width() as u64;
	let groups_total = threads.div_ceil(width);
	let groups_x = groups_total.min(resources.max_workgroup_count()[0] as u64).max(1) as u32;
	let groups_y = groups_total.div_ceil(groups_x as u64) as u32;

	let descriptor_set = PersistentDescriptorSet::new(
		resources.descriptor_set_allocator(),
		Arc::clone(&resources.pipeline().layout().set_layouts()[0]),
		[
			WriteDescriptorSet::buffer(0, text_buffer),
			WriteDescriptorSet::buffer(1, pattern_buffer),
			WriteDescriptorSet::buffer(2, resources.match_count_buffer().clone()),
			WriteDescriptorSet::buffer(3, resources.positions_buffer().clone())
		],
		[]
	).map_err(|e| Error::CommandBufferCreationFailed(e.into()))?;

	let params = search_shaders::unified::SearchParams {
		text_len: text_len as u32,
		pattern_len,
		thread_count: threads as u32,
		max_positions: resources.capacity()
	};

	let dispatch_cmd_buf = {
		let mut builder = AutoCommandBufferBuilder::primary(resources.command_buffer_allocator(), resources.queue().queue_family_index(), CommandBufferUsage::OneTimeSubmit)
			.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?;

		builder
			.bind_pipeline_compute(Arc::clone(resources.pipeline()))
			.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?
			.bind_descriptor_sets(
				PipelineBindPoint::Compute,
				Arc::clone(resources.pipeline().layout()),
				0,
				descriptor_set
			)
			.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?
			.push_constants(
				Arc::clone(resources.pipeline().layout()),
				0,
				params
			)
			.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?
			.dispatch([groups_x, groups_y, 1])
			.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?;

		builder.build().map_err(|e| Error::CommandBufferCreationFailed(e.into()))?
	};

	// The host synchronises on the fence for the whole dispatch, which is why relaxed
	// atomics in the kernel are enough. No timeout; a hung dispatch surfaces as a device
	// error
	let fence_fut = sync::now(Arc::clone(resources.device()))
		.then_execute(Arc::clone(resources.queue()), dispatch_cmd_buf)
		.map_err(|e| Error::GpuExecutionFailed(e.to_string()))?
		.then_signal_fence_and_flush()
		.map_err(|e| Error::GpuExecutionFailed(VulkanError::from(e).to_string()))?;

	fence_fut.wait(None).map_err(|e| Error::GpuExecutionFailed(VulkanError::from(e).to_string()))?;
	drop(fence_fut);

	let match_count = resources.match_count_buffer().read().unwrap()[0];
	let stored = match_count.min(resources.capacity()) as usize;
	let positions = resources.positions_buffer().read().unwrap()[..stored].to_vec();

	Ok(DispatchOutcome {
		match_count,
		positions,
		truncated: match_count > resources.capacity()
	})
}

/// Pushes an empty submission through the queue, realising the command buffer and
/// submission paths without touching any engine-visible state
pub(crate) fn run_empty(resources: &ResourceManager) -> Result<(), Error> {
	let cmd_buf = AutoCommandBufferBuilder::primary(resources.command_buffer_allocator(), resources.queue().queue_family_index(), CommandBufferUsage::OneTimeSubmit)
		.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?
		.build()
		.map_err(|e| Error::CommandBufferCreationFailed(e.into()))?;

	sync::now(Arc::clone(resources.device()))
		.then_execute(Arc::clone(resources.queue()), cmd_buf)
		.map_err(|e| Error::GpuExecutionFailed(e.to_string()))?
		.then_signal_fence_and_flush()
		.map_err(|e| Error::GpuExecutionFailed(VulkanError::from(e).to_string()))?
		.wait(None)
		.map_err(|e| Error::GpuExecutionFailed(VulkanError::from(e).to_string()))?;

	Ok(())
}
