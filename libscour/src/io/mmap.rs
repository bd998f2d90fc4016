use std::{fs::{self, File}, io::ErrorKind, path::{Path, PathBuf}};

use log::debug;
use memmap::{Mmap, MmapOptions};
use vulkano::{DeviceSize, buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer}, memory::allocator::{AllocationCreateInfo, MemoryAllocatePreference}};

use crate::{engine::resources::ResourceManager, error::Error};

use super::FILE_SIZE_CAP;

/// Maps files read-only into the process address space and exposes the mapped bytes to the
/// GPU as a storage buffer. At most one file is mapped at a time; mapping a new file tears
/// the previous mapping down first, so after a failed `map` no file is mapped
pub struct FileMapper {
	mapping: Option<Mapping>
}

struct Mapping {
	path: PathBuf,
	len: u64,
	/// None for zero-length files, which cannot be mapped
	mmap: Option<Mmap>,
	/// Created on first use, dropped with the mapping
	device_buffer: Option<Subbuffer<[u8]>>
}

impl FileMapper {
	pub fn new() -> Self {
		FileMapper { mapping: None }
	}

	/// Validates that `path` is a regular readable file of at most [FILE_SIZE_CAP] bytes and
	/// maps it read-only, private, in full. Zero-length files are recorded as an explicit
	/// empty mapping rather than mapped
	pub fn map(&mut self, path: &Path) -> Result<(), Error> {
		self.unmap();

		let meta = match fs::metadata(path) {
			Ok(meta) => meta,
			Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::FileNotFound(path.to_path_buf())),
			Err(e) => return Err(Error::StatError(path.to_path_buf(), e))
		};

		if meta.is_dir() {
			return Err(Error::IsDirectory(path.to_path_buf()));
		}
		if !meta.is_file() {
			return Err(Error::NotReadable(path.to_path_buf()));
		}

		let len = meta.len();
		if len > FILE_SIZE_CAP {
			return Err(Error::TooLarge { size: len, cap: FILE_SIZE_CAP });
		}
		if len > isize::MAX as u64 {
			return Err(Error::InvalidSize(len));
		}

		if len == 0 {
			self.mapping = Some(Mapping { path: path.to_path_buf(), len: 0, mmap: None, device_buffer: None });
			return Ok(());
		}

		let file = File::open(path).map_err(|_| Error::NotReadable(path.to_path_buf()))?;
		let mmap = unsafe { MmapOptions::new().map(&file).map_err(Error::MapError)? };

		#[cfg(target_os = "linux")]
		unsafe {
			libc::madvise(mmap.as_ptr() as *mut libc::c_void, mmap.len(), libc::MADV_SEQUENTIAL);
		}

		debug!("Mapped {} ({} bytes)", path.display(), len);

		self.mapping = Some(Mapping { path: path.to_path_buf(), len, mmap: Some(mmap), device_buffer: None });

		Ok(())
	}

	/// Drops the device buffer and the mapping. Idempotent
	pub fn unmap(&mut self) {
		if let Some(mapping) = self.mapping.take() {
			debug!("Unmapped {}", mapping.path.display());
		}
	}

	/// The GPU-visible buffer over the mapped bytes, created on first call after a `map` and
	/// reused until `unmap`. The buffer is valid exactly as long as the mapping is
	pub fn buffer(&mut self, resources: &ResourceManager) -> Result<Subbuffer<[u8]>, Error> {
		let mapping = self.mapping.as_mut().ok_or(Error::NoFileMapped)?;
		let mmap = mapping.mmap.as_ref().ok_or(Error::NoFileMapped)?;

		if mapping.device_buffer.is_none() {
			let buffer = Buffer::new_slice::<u8>(
				resources.memory_allocator(),
				BufferCreateInfo {
					usage: BufferUsage::STORAGE_BUFFER,
					..Default::default()
				},
				AllocationCreateInfo {
					memory_type_filter: resources.optimal_storage_mode().upload_filter(),
					allocate_preference: MemoryAllocatePreference::AlwaysAllocate,
					..Default::default()
				},
				mapping.len as DeviceSize
			).map_err(|e| Error::BufferAllocationFailed(e.into()))?;

			buffer.write().unwrap().copy_from_slice(&mmap[..]);

			mapping.device_buffer = Some(buffer);
		}

		Ok(mapping.device_buffer.as_ref().unwrap().clone())
	}

	pub fn is_mapped(&self) -> bool {
		self.mapping.is_some()
	}

	/// Length of the mapped file, or None if no file is mapped
	pub fn mapped_len(&self) -> Option<u64> {
		self.mapping.as_ref().map(|m| m.len)
	}

	pub fn path(&self) -> Option<&Path> {
		self.mapping.as_ref().map(|m| m.path.as_path())
	}
}

impl Default for FileMapper {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod test {
	use std::{env, fs, path::PathBuf, process};

	use crate::error::Error;

	use super::FileMapper;

	fn temp_path(name: &str) -> PathBuf {
		env::temp_dir().join(format!("libscour_mmap_test_{}_{}", process::id(), name))
	}

	#[test]
	fn test_map_missing_file() {
		let mut mapper = FileMapper::new();
		let result = mapper.map(&temp_path("does_not_exist"));

		assert!(matches!(result, Err(Error::FileNotFound(_))));
		assert!(!mapper.is_mapped());
	}

	#[test]
	fn test_map_directory() {
		let mut mapper = FileMapper::new();
		let result = mapper.map(&env::temp_dir());

		assert!(matches!(result, Err(Error::IsDirectory(_))));
		assert!(!mapper.is_mapped());
	}

	#[test]
	fn test_map_empty_file() {
		let path = temp_path("empty");
		fs::write(&path, []).unwrap();

		let mut mapper = FileMapper::new();
		mapper.map(&path).unwrap();

		assert!(mapper.is_mapped());
		assert_eq!(mapper.mapped_len(), Some(0));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_map_regular_file() {
		let path = temp_path("regular");
		fs::write(&path, b"Hello, World!").unwrap();

		let mut mapper = FileMapper::new();
		mapper.map(&path).unwrap();

		assert_eq!(mapper.mapped_len(), Some(13));
		assert_eq!(mapper.path(), Some(path.as_path()));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_unmap_idempotent() {
		let path = temp_path("unmap");
		fs::write(&path, b"bytes").unwrap();

		let mut mapper = FileMapper::new();
		mapper.map(&path).unwrap();

		mapper.unmap();
		mapper.unmap();

		assert!(!mapper.is_mapped());
		assert_eq!(mapper.mapped_len(), None);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_failed_map_replaces_previous_mapping() {
		let path = temp_path("replaced");
		fs::write(&path, b"bytes").unwrap();

		let mut mapper = FileMapper::new();
		mapper.map(&path).unwrap();

		let result = mapper.map(&temp_path("does_not_exist_either"));

		assert!(matches!(result, Err(Error::FileNotFound(_))));
		assert!(!mapper.is_mapped());

		fs::remove_file(&path).unwrap();
	}
}
