mod vulkan_error {
	use std::fmt::Display;

	use vulkano::{self, LoadingError, ValidationError, Validated, memory::allocator::MemoryAllocatorError, buffer::AllocateBufferError, command_buffer::CommandBufferExecError};

	/// Wrapper over the assorted vulkano error types so the rest of the library can carry a
	/// single device-error payload around
	#[derive(Debug)]
	pub enum VulkanError {
		VulkanLoadError(LoadingError),
		VulkanError(vulkano::VulkanError),
		VulkanValidationError(Box<ValidationError>),
		NoVulkanImplementations,
		VulkanMallocError(MemoryAllocatorError),
		VulkanCmdExecError(CommandBufferExecError)
	}

	impl Display for VulkanError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "{}", match self {
				VulkanError::VulkanLoadError(e) => e.to_string(),
				VulkanError::VulkanError(e) => e.to_string(),
				VulkanError::VulkanValidationError(e) => e.to_string(),
				VulkanError::NoVulkanImplementations => "No appropriate vulkan implementations found on the system".to_string(),
				VulkanError::VulkanMallocError(e) => e.to_string(),
				VulkanError::VulkanCmdExecError(e) => e.to_string(),
			})
		}
	}

	macro_rules! impl_from_for_variant {
		($variant: path, $contained_type: ty) => {
			impl From<$contained_type> for VulkanError {
				fn from(value: $contained_type) -> Self {
					$variant(value)
				}
			}
		};
	}

	impl_from_for_variant!(VulkanError::VulkanError, vulkano::VulkanError);
	impl_from_for_variant!(VulkanError::VulkanLoadError, LoadingError);
	impl_from_for_variant!(VulkanError::VulkanValidationError, Box<ValidationError>);
	impl_from_for_variant!(VulkanError::VulkanMallocError, MemoryAllocatorError);
	impl_from_for_variant!(VulkanError::VulkanCmdExecError, CommandBufferExecError);

	impl<T> From<Validated<T>> for VulkanError where T: Into<VulkanError> {
		fn from(value: Validated<T>) -> Self {
			match value { Validated::Error(e) => e.into(), Validated::ValidationError(ve) => VulkanError::from(ve) }
		}
	}

	impl From<AllocateBufferError> for VulkanError {
		fn from(value: AllocateBufferError) -> Self {
			match value {
				AllocateBufferError::AllocateMemory(mae) => VulkanError::from(mae),
				AllocateBufferError::BindMemory(vke) => VulkanError::from(vke),
				AllocateBufferError::CreateBuffer(vke) => VulkanError::from(vke)
			}
		}
	}
}

use std::{fmt::Display, io, path::PathBuf};

pub use self::vulkan_error::VulkanError;

/// Error type for the whole library. Variants are stable in kind; the carried context
/// (paths, sizes, device error messages) is not
#[derive(Debug)]
pub enum Error {
	/// The vulkan library could not be loaded, or no physical devices were reported
	NoDevice(VulkanError),
	/// Physical devices exist, but none supports compute with 8-bit storage access
	DeviceUnsupported,
	QueueCreationFailed(VulkanError),
	/// The embedded kernel could not be turned into a shader module on this device
	ShaderNotFound(VulkanError),
	PipelineCreationFailed(VulkanError),
	BufferAllocationFailed(VulkanError),
	CommandBufferCreationFailed(VulkanError),
	/// The dispatch was submitted but did not complete successfully
	GpuExecutionFailed(String),
	FileNotFound(PathBuf),
	NotReadable(PathBuf),
	IsDirectory(PathBuf),
	TooLarge { size: u64, cap: u64 },
	StatError(PathBuf, io::Error),
	MapError(io::Error),
	/// The reported file size cannot be memory mapped on this platform
	InvalidSize(u64),
	NoFileMapped,
	EmptyPattern,
	PatternTooLong { pattern_len: usize, text_len: u64 },
	InvalidIterationCount { given: u32, max: u32 }
}

impl Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", match self {
			Error::NoDevice(e) => format!("No usable GPU device: {}", e),
			Error::DeviceUnsupported => "No GPU device supports the required compute features".to_string(),
			Error::QueueCreationFailed(e) => format!("Failed to create device queue: {}", e),
			Error::ShaderNotFound(e) => format!("Search kernel unavailable on this device: {}", e),
			Error::PipelineCreationFailed(e) => format!("Failed to create compute pipeline: {}", e),
			Error::BufferAllocationFailed(e) => format!("Failed to allocate device buffer: {}", e),
			Error::CommandBufferCreationFailed(e) => format!("Failed to encode command buffer: {}", e),
			Error::GpuExecutionFailed(msg) => format!("GPU dispatch failed: {}", msg),
			Error::FileNotFound(path) => format!("File not found: {}", path.display()),
			Error::NotReadable(path) => format!("Not a readable regular file: {}", path.display()),
			Error::IsDirectory(path) => format!("Path is a directory: {}", path.display()),
			Error::TooLarge { size, cap } => format!("File is {} bytes, which exceeds the {} byte cap", size, cap),
			Error::StatError(path, e) => format!("Failed to stat {}: {}", path.display(), e),
			Error::MapError(e) => format!("Failed to memory map file: {}", e),
			Error::InvalidSize(size) => format!("File size {} cannot be mapped", size),
			Error::NoFileMapped => "No file is mapped".to_string(),
			Error::EmptyPattern => "Pattern is empty".to_string(),
			Error::PatternTooLong { pattern_len, text_len } => format!("Pattern of {} bytes is longer than the {} byte text", pattern_len, text_len),
			Error::InvalidIterationCount { given, max } => format!("Iteration count {} is outside [1, {}]", given, max)
		})
	}
}
