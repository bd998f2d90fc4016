pub(crate) mod search_shaders {
	pub mod unified {
		use vulkano_shaders::shader;

		shader! {
			ty: "compute",
			path: "shaders/substring.comp"
		}
	}
}

use std::{env, fs, path::{Path, PathBuf}, sync::Arc};

use log::{debug, info, warn};
use vulkano::{
	DeviceSize, VulkanLibrary,
	buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
	command_buffer::allocator::{StandardCommandBufferAllocator, StandardCommandBufferAllocatorCreateInfo},
	descriptor_set::allocator::{StandardDescriptorSetAllocator, StandardDescriptorSetAllocatorCreateInfo},
	descriptor_set::layout::{DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType},
	device::{Device, DeviceCreateInfo, DeviceExtensions, Features, Queue, QueueCreateInfo, QueueFlags, physical::{PhysicalDevice, PhysicalDeviceType}},
	instance::{Instance, InstanceCreateInfo},
	memory::allocator::{AllocationCreateInfo, MemoryAllocatePreference, MemoryAllocator, MemoryTypeFilter, StandardMemoryAllocator},
	pipeline::{ComputePipeline, PipelineLayout, PipelineShaderStageCreateInfo, cache::{PipelineCache, PipelineCacheCreateInfo}, compute::ComputePipelineCreateInfo, layout::{PipelineDescriptorSetLayoutCreateInfo, PipelineLayoutCreateFlags, PushConstantRange}},
	shader::ShaderStage
};

use crate::error::{Error, VulkanError};

/// Smallest accepted capture capacity, in positions
pub const MIN_CAPACITY: u32 = 1_000_000;
/// Largest accepted capture capacity, in positions
pub const MAX_CAPACITY: u32 = 500_000_000;
/// Capacity used when no hint is given
pub const DEFAULT_CAPACITY: u32 = 50_000_000;

const PIPELINE_CACHE_FILE_NAME: &str = "ScourKernelCache.bin";

/// Which memory class the engine's buffers live in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
	/// Host and device share physical memory; buffers are device-local and host-visible
	Shared,
	/// Discrete device; buffers live in host memory the device reads across the bus
	Managed
}

impl StorageMode {
	pub fn name(self) -> &'static str {
		match self {
			StorageMode::Shared => "shared",
			StorageMode::Managed => "managed"
		}
	}

	/// Filter for buffers the host writes once and the device reads (text, patterns)
	pub(crate) fn upload_filter(self) -> MemoryTypeFilter {
		match self {
			StorageMode::Shared => MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
			StorageMode::Managed => MemoryTypeFilter::PREFER_HOST | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE
		}
	}

	/// Filter for buffers the device writes and the host reads back (match count, positions)
	pub(crate) fn readback_filter(self) -> MemoryTypeFilter {
		match self {
			StorageMode::Shared => MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_RANDOM_ACCESS,
			StorageMode::Managed => MemoryTypeFilter::PREFER_HOST | MemoryTypeFilter::HOST_RANDOM_ACCESS
		}
	}
}

/// Owns the device, queue, compute pipeline and the persistent result buffers for the
/// lifetime of the engine. The pipeline is built through an on-disk pipeline cache blob so
/// repeat startups skip kernel compilation
pub struct ResourceManager {
	device: Arc<Device>,
	queue: Arc<Queue>,
	malloc: Arc<StandardMemoryAllocator>,
	cmd_buf_alloc: StandardCommandBufferAllocator,
	desc_set_alloc: StandardDescriptorSetAllocator,
	pipeline: Arc<ComputePipeline>,
	storage_mode: StorageMode,
	capacity: u32,
	workgroup_width: u32,
	max_workgroup_count: [u32; 3],
	match_count_buffer: Subbuffer<[u32]>,
	positions_buffer: Subbuffer<[u32]>
}

impl ResourceManager {
	pub fn new(capacity_hint: Option<u32>) -> Result<Self, Error> {
		let capacity = clamp_capacity(capacity_hint);

		let req_device_extensions = DeviceExtensions::default();
		let req_features = Features {
			uniform_and_storage_buffer8_bit_access: true,
			shader_int8: true,
			..Default::default()
		};

		let vklib = VulkanLibrary::new().map_err(|e| Error::NoDevice(e.into()))?;
		let vkins = Instance::new(vklib, InstanceCreateInfo::default()).map_err(|e| Error::NoDevice(e.into()))?;

		let (vkphys, vkqfidx) = Self::select_device(&vkins, &req_device_extensions, &req_features)?;

		let storage_mode = match vkphys.properties().device_type {
			// Integrated and software devices read host allocations at full speed; treat
			// them as unified memory
			PhysicalDeviceType::IntegratedGpu | PhysicalDeviceType::Cpu => StorageMode::Shared,
			_ => StorageMode::Managed
		};

		info!("Using physical vulkan device: {} (type {:?}, {} storage)", vkphys.properties().device_name, vkphys.properties().device_type, storage_mode.name());

		let workgroup_width = Self::pick_workgroup_width(&vkphys);
		let max_workgroup_count = vkphys.properties().max_compute_work_group_count;

		let (vkdev, mut vkqueues) = Device::new(Arc::clone(&vkphys), DeviceCreateInfo {
			queue_create_infos: vec![
				QueueCreateInfo {
					queue_family_index: vkqfidx,
					..Default::default()
				}
			],
			enabled_extensions: req_device_extensions,
			enabled_features: req_features,
			..Default::default()
		}).map_err(|e| Error::QueueCreationFailed(e.into()))?;

		let vkqueue = vkqueues.next().ok_or(Error::QueueCreationFailed(VulkanError::NoVulkanImplementations))?;

		let cache_path = Self::pipeline_cache_write_path();
		let pipeline_cache = Self::load_pipeline_cache(&vkdev);

		let shader = search_shaders::unified::load(Arc::clone(&vkdev))
			.map_err(|e| Error::ShaderNotFound(e.into()))?
			.specialize(
				[(0, workgroup_width.into())].into_iter().collect()
			)
			.map_err(|e| Error::ShaderNotFound(e.into()))?;
		let entry_point = shader.entry_point("main").unwrap();

		let pipeline = {
			let pipeline_stage = PipelineShaderStageCreateInfo::new(entry_point);

			let pipeline_layout = PipelineLayout::new(
				Arc::clone(&vkdev),
				PipelineDescriptorSetLayoutCreateInfo {
					set_layouts: vec![
						DescriptorSetLayoutCreateInfo {
							bindings: [
								(0, Self::storage_buffer_binding()),
								(1, Self::storage_buffer_binding()),
								(2, Self::storage_buffer_binding()),
								(3, Self::storage_buffer_binding()),
							].into(),
							..Default::default()
						}
					],
					push_constant_ranges: vec![
						PushConstantRange {
							stages: ShaderStage::Compute.into(),
							offset: 0,
							size: 16
						}
					],
					flags: PipelineLayoutCreateFlags::default()
				}.into_pipeline_layout_create_info(Arc::clone(&vkdev)).expect("Failed to create pipeline layout create info")
			).map_err(|e| Error::PipelineCreationFailed(e.into()))?;

			ComputePipeline::new(
				Arc::clone(&vkdev),
				pipeline_cache.clone(),
				ComputePipelineCreateInfo::stage_layout(pipeline_stage, pipeline_layout)
			).map_err(|e| Error::PipelineCreationFailed(e.into()))?
		};

		if let (Some(cache), Some(path)) = (&pipeline_cache, &cache_path) {
			Self::persist_pipeline_cache(cache, path);
		}

		let malloc = Arc::new(StandardMemoryAllocator::new_default(Arc::clone(&vkdev)));

		let match_count_buffer = Buffer::new_slice::<u32>(
			Arc::clone(&malloc) as Arc<dyn MemoryAllocator>,
			BufferCreateInfo {
				usage: BufferUsage::STORAGE_BUFFER,
				..Default::default()
			},
			AllocationCreateInfo {
				memory_type_filter: storage_mode.readback_filter(),
				..Default::default()
			},
			1
		).map_err(|e| Error::BufferAllocationFailed(e.into()))?;

		let positions_buffer = Buffer::new_slice::<u32>(
			Arc::clone(&malloc) as Arc<dyn MemoryAllocator>,
			BufferCreateInfo {
				usage: BufferUsage::STORAGE_BUFFER,
				..Default::default()
			},
			AllocationCreateInfo {
				memory_type_filter: storage_mode.readback_filter(),
				allocate_preference: MemoryAllocatePreference::AlwaysAllocate,
				..Default::default()
			},
			capacity as DeviceSize
		).map_err(|e| Error::BufferAllocationFailed(e.into()))?;

		let cmd_buf_alloc = StandardCommandBufferAllocator::new(Arc::clone(&vkdev), StandardCommandBufferAllocatorCreateInfo::default());
		let desc_set_alloc = StandardDescriptorSetAllocator::new(Arc::clone(&vkdev), StandardDescriptorSetAllocatorCreateInfo::default());

		Ok(ResourceManager {
			device: vkdev,
			queue: vkqueue,
			malloc,
			cmd_buf_alloc,
			desc_set_alloc,
			pipeline,
			storage_mode,
			capacity,
			workgroup_width,
			max_workgroup_count,
			match_count_buffer,
			positions_buffer
		})
	}

	// Attempts to find the best vulkan implementation and a queue family index supporting
	// compute and transfer operations on it
	fn select_device(instance: &Arc<Instance>, device_extensions: &DeviceExtensions, features: &Features) -> Result<(Arc<PhysicalDevice>, u32), Error> {
		let physical_devices: Vec<Arc<PhysicalDevice>> = instance.enumerate_physical_devices()
			.map_err(|e| Error::NoDevice(e.into()))?
			.collect();

		if physical_devices.is_empty() {
			return Err(Error::NoDevice(VulkanError::NoVulkanImplementations));
		}

		physical_devices.into_iter()
			.filter(|p| p.supported_extensions().contains(device_extensions) && p.supported_features().contains(features))
			.filter_map(|p| {
				// The vulkan specs guarantee that a compliant implementation must provide at
				// least one queue that supports compute operations
				p.queue_family_properties().iter().enumerate()
					.position(|(_, q)| {
						q.queue_flags.contains(QueueFlags::COMPUTE | QueueFlags::TRANSFER)
					})
					.map(|i| (Arc::clone(&p), i as u32))
			})
			.min_by_key(|(p, _)| match p.properties().device_type { // Order by device type. Preferably we want to use a discrete gpu
				PhysicalDeviceType::DiscreteGpu => 0,
				PhysicalDeviceType::IntegratedGpu => 1,
				PhysicalDeviceType::VirtualGpu => 2,
				PhysicalDeviceType::Cpu => 3,
				PhysicalDeviceType::Other => 4,
				_ => 5
			})
			.ok_or(Error::DeviceUnsupported)
	}

	/// Workgroup width for the kernel: the largest multiple of the subgroup size that fits
	/// in a workgroup, falling back to 64 when the subgroup size is unknown. Baked into the
	/// pipeline as a specialization constant; partial groups are bounds-checked in the kernel
	fn pick_workgroup_width(phys: &PhysicalDevice) -> u32 {
		let props = phys.properties();
		let max_invocations = props.max_compute_work_group_invocations;
		let subgroup_size = props.subgroup_size.unwrap_or(0);

		let desired = if subgroup_size > 0 && max_invocations >= subgroup_size {
			(max_invocations / subgroup_size) * subgroup_size
		} else {
			64
		};

		desired.min(max_invocations).min(props.max_compute_work_group_size[0]).max(1)
	}

	fn storage_buffer_binding() -> DescriptorSetLayoutBinding {
		DescriptorSetLayoutBinding {
			stages: ShaderStage::Compute.into(),
			descriptor_count: 1,
			..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::StorageBuffer)
		}
	}

	/// First-found of a cache blob shipped alongside the executable and the user cache
	/// directory. Missing or unreadable blobs simply seed an empty cache
	fn pipeline_cache_read_path() -> Option<PathBuf> {
		if let Ok(exe) = env::current_exe() {
			if let Some(bundled) = exe.parent().map(|dir| dir.join(PIPELINE_CACHE_FILE_NAME)) {
				if bundled.is_file() {
					return Some(bundled);
				}
			}
		}

		Self::pipeline_cache_write_path()
	}

	fn pipeline_cache_write_path() -> Option<PathBuf> {
		dirs::cache_dir().map(|dir| dir.join("scour").join(PIPELINE_CACHE_FILE_NAME))
	}

	/// Failure to create the cache is non-fatal: the engine runs without persistent pipeline
	/// caching and says so once
	fn load_pipeline_cache(device: &Arc<Device>) -> Option<Arc<PipelineCache>> {
		let initial_data = Self::pipeline_cache_read_path()
			.and_then(|path| fs::read(&path).ok())
			.unwrap_or_default();

		match PipelineCache::new(Arc::clone(device), PipelineCacheCreateInfo { initial_data, ..Default::default() }) {
			Ok(cache) => Some(cache),
			Err(e) => {
				warn!("Failed to create pipeline cache, continuing without one: {}", e);
				None
			}
		}
	}

	fn persist_pipeline_cache(cache: &Arc<PipelineCache>, path: &Path) {
		let data = match cache.get_data() {
			Ok(data) => data,
			Err(e) => {
				warn!("Failed to serialise pipeline cache: {}", e);
				return;
			}
		};

		if let Some(dir) = path.parent() {
			if let Err(e) = fs::create_dir_all(dir) {
				warn!("Failed to create pipeline cache directory {}: {}", dir.display(), e);
				return;
			}
		}

		match fs::write(path, &data) {
			Ok(_) => debug!("Pipeline cache written to {} ({} bytes)", path.display(), data.len()),
			Err(e) => warn!("Failed to write pipeline cache to {}: {}", path.display(), e)
		}
	}

	/// Zeroes the match count slot. Called before every dispatch
	pub fn reset_match_count(&self) {
		self.match_count_buffer.write().unwrap()[0] = 0;
	}

	/// The effective capture capacity: the constructor hint (or the default) clamped into
	/// [MIN_CAPACITY, MAX_CAPACITY]
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	pub fn optimal_storage_mode(&self) -> StorageMode {
		self.storage_mode
	}

	pub(crate) fn device(&self) -> &Arc<Device> {
		&self.device
	}

	pub(crate) fn queue(&self) -> &Arc<Queue> {
		&self.queue
	}

	pub(crate) fn pipeline(&self) -> &Arc<ComputePipeline> {
		&self.pipeline
	}

	pub(crate) fn memory_allocator(&self) -> Arc<dyn MemoryAllocator> {
		Arc::clone(&self.malloc) as Arc<dyn MemoryAllocator>
	}

	pub(crate) fn command_buffer_allocator(&self) -> &StandardCommandBufferAllocator {
		&self.cmd_buf_alloc
	}

	pub(crate) fn descriptor_set_allocator(&self) -> &StandardDescriptorSetAllocator {
		&self.desc_set_alloc
	}

	pub(crate) fn workgroup_width(&self) -> u32 {
		self.workgroup_width
	}

	pub(crate) fn max_workgroup_count(&self) -> [u32; 3] {
		self.max_workgroup_count
	}

	pub(crate) fn match_count_buffer(&self) -> &Subbuffer<[u32]> {
		&self.match_count_buffer
	}

	pub(crate) fn positions_buffer(&self) -> &Subbuffer<[u32]> {
		&self.positions_buffer
	}
}

/// Clamps a capture capacity hint into [MIN_CAPACITY, MAX_CAPACITY]; no hint yields
/// [DEFAULT_CAPACITY]
pub(crate) fn clamp_capacity(hint: Option<u32>) -> u32 {
	hint.unwrap_or(DEFAULT_CAPACITY).clamp(MIN_CAPACITY, MAX_CAPACITY)
}
