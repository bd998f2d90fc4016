use std::{collections::{HashMap, VecDeque}, sync::Arc};

use vulkano::{DeviceSize, buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer}, memory::allocator::{AllocationCreateInfo, MemoryAllocator, MemoryTypeFilter}};

use crate::error::Error;

/// How many pattern buffers are kept alive at once
pub const PATTERN_CACHE_SIZE: usize = 32;

/// Value-keyed cache of device buffers holding pattern bytes, with strict LRU eviction.
/// Each buffer is sized to exactly the pattern it holds. Cached entries are independent of
/// which text is mapped
pub struct PatternCache {
	malloc: Arc<dyn MemoryAllocator>,
	upload_filter: MemoryTypeFilter,
	buffers: HashMap<Vec<u8>, Subbuffer<[u8]>>,
	keys: LruKeys
}

impl PatternCache {
	pub(crate) fn new(malloc: Arc<dyn MemoryAllocator>, upload_filter: MemoryTypeFilter) -> Self {
		PatternCache {
			malloc,
			upload_filter,
			buffers: HashMap::new(),
			keys: LruKeys::new(PATTERN_CACHE_SIZE)
		}
	}

	/// Returns the cached buffer for `pattern`, marking it most recently used, or allocates
	/// one of exactly `pattern.len()` bytes, evicting the least recently used entry if the
	/// cache is full
	pub fn get_or_create(&mut self, pattern: &[u8]) -> Result<Subbuffer<[u8]>, Error> {
		if pattern.is_empty() {
			return Err(Error::EmptyPattern);
		}

		if let Some(buffer) = self.buffers.get(pattern) {
			self.keys.hit(pattern);
			return Ok(buffer.clone());
		}

		let buffer = Buffer::new_slice::<u8>(
			Arc::clone(&self.malloc),
			BufferCreateInfo {
				usage: BufferUsage::STORAGE_BUFFER,
				..Default::default()
			},
			AllocationCreateInfo {
				memory_type_filter: self.upload_filter,
				..Default::default()
			},
			pattern.len() as DeviceSize
		).map_err(|e| Error::BufferAllocationFailed(e.into()))?;

		buffer.write().unwrap().copy_from_slice(pattern);

		if let Some(evicted) = self.keys.insert(pattern.to_vec()) {
			self.buffers.remove(&evicted);
		}
		self.buffers.insert(pattern.to_vec(), buffer.clone());

		Ok(buffer)
	}

	pub fn clear(&mut self) {
		self.buffers.clear();
		self.keys.clear();
	}

	pub fn len(&self) -> usize {
		self.buffers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buffers.is_empty()
	}

	pub fn contains(&self, pattern: &[u8]) -> bool {
		self.buffers.contains_key(pattern)
	}

	/// Pre-populates buffers for each pattern, in order. Later patterns may evict earlier
	/// ones when more than the cache capacity are given
	pub fn warmup(&mut self, patterns: &[Vec<u8>]) -> Result<(), Error> {
		for pattern in patterns {
			self.get_or_create(pattern)?;
		}

		Ok(())
	}
}

/// Access-ordered key list backing the cache, least recently used at the front
struct LruKeys {
	order: VecDeque<Vec<u8>>,
	capacity: usize
}

impl LruKeys {
	fn new(capacity: usize) -> Self {
		LruKeys { order: VecDeque::new(), capacity }
	}

	/// Moves an existing key to the most recently used end
	fn hit(&mut self, key: &[u8]) {
		if let Some(idx) = self.order.iter().position(|k| k == key) {
			let key = self.order.remove(idx).unwrap();
			self.order.push_back(key);
		}
	}

	/// Appends a new key at the most recently used end, returning the evicted least recently
	/// used key if the list was at capacity
	fn insert(&mut self, key: Vec<u8>) -> Option<Vec<u8>> {
		let evicted = if self.order.len() == self.capacity {
			self.order.pop_front()
		} else {
			None
		};

		self.order.push_back(key);

		evicted
	}

	fn clear(&mut self) {
		self.order.clear();
	}
}

#[cfg(test)]
mod test {
	use super::LruKeys;

	#[test]
	fn test_lru_insert_below_capacity() {
		let mut keys = LruKeys::new(3);

		assert_eq!(keys.insert(b"a".to_vec()), None);
		assert_eq!(keys.insert(b"b".to_vec()), None);
		assert_eq!(keys.insert(b"c".to_vec()), None);
	}

	#[test]
	fn test_lru_evicts_front() {
		let mut keys = LruKeys::new(2);

		keys.insert(b"a".to_vec());
		keys.insert(b"b".to_vec());

		assert_eq!(keys.insert(b"c".to_vec()), Some(b"a".to_vec()));
		assert_eq!(keys.insert(b"d".to_vec()), Some(b"b".to_vec()));
	}

	#[test]
	fn test_lru_hit_protects_key() {
		let mut keys = LruKeys::new(2);

		keys.insert(b"a".to_vec());
		keys.insert(b"b".to_vec());

		// "a" becomes most recently used, so "b" is the next eviction candidate
		keys.hit(b"a");

		assert_eq!(keys.insert(b"c".to_vec()), Some(b"b".to_vec()));
		assert_eq!(keys.insert(b"d".to_vec()), Some(b"a".to_vec()));
	}

	#[test]
	fn test_lru_hit_unknown_key_is_noop() {
		let mut keys = LruKeys::new(2);

		keys.insert(b"a".to_vec());
		keys.hit(b"never inserted");

		assert_eq!(keys.insert(b"b".to_vec()), None);
		assert_eq!(keys.insert(b"c".to_vec()), Some(b"a".to_vec()));
	}
}
