pub mod resources;
pub mod pattern_cache;
mod dispatch;

use std::{path::Path, time::Instant};

use log::info;

use crate::{
	bench::MAX_BENCHMARK_ITERATIONS,
	error::Error,
	io::mmap::FileMapper,
	search::{throughput_mbps, BenchmarkResult, SearchResult}
};

use self::{pattern_cache::PatternCache, resources::{ResourceManager, StorageMode}};

/// The main mediator of the library. Owns the GPU resources, the file mapping and the
/// pattern cache, and serialises searches over them; a `SearchEngine` is not safe for
/// concurrent use
pub struct SearchEngine {
	resources: ResourceManager,
	mapper: FileMapper,
	patterns: PatternCache
}

impl SearchEngine {
	/// Creates an engine with all device resources allocated. `capacity_hint` bounds how
	/// many match positions a single search can capture; it is clamped into the supported
	/// range, and `None` selects the default
	pub fn new(capacity_hint: Option<u32>) -> Result<Self, Error> {
		let resources = ResourceManager::new(capacity_hint)?;
		let patterns = PatternCache::new(resources.memory_allocator(), resources.optimal_storage_mode().upload_filter());

		Ok(SearchEngine {
			resources,
			mapper: FileMapper::new(),
			patterns
		})
	}

	/// Maps a file for searching, replacing any previous mapping. On error the engine is
	/// left with no file mapped
	pub fn map(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
		self.mapper.map(path.as_ref())
	}

	/// Releases the current mapping, if any
	pub fn unmap(&mut self) -> Result<(), Error> {
		self.mapper.unmap();
		Ok(())
	}

	/// Searches the mapped file for every occurrence of `pattern`, including positionally
	/// overlapping ones. The returned count is always the true total; at most `capacity()`
	/// starting offsets are captured alongside it
	pub fn search(&mut self, pattern: &[u8]) -> Result<SearchResult, Error> {
		if pattern.is_empty() {
			return Err(Error::EmptyPattern);
		}

		let text_len = self.mapper.mapped_len().ok_or(Error::NoFileMapped)?;

		if text_len == 0 {
			return Ok(SearchResult::empty());
		}

		if pattern.len() as u64 > text_len {
			return Err(Error::PatternTooLong { pattern_len: pattern.len(), text_len });
		}

		let started = Instant::now();

		let text_buffer = self.mapper.buffer(&self.resources)?;
		let pattern_buffer = self.patterns.get_or_create(pattern)?;

		let outcome = dispatch::run_search(&self.resources, text_buffer, text_len, pattern_buffer, pattern.len() as u32)?;

		let execution_time = started.elapsed();

		Ok(SearchResult {
			match_count: outcome.match_count,
			positions: outcome.positions,
			execution_time,
			throughput_mbps: throughput_mbps(text_len, execution_time),
			truncated: outcome.truncated
		})
	}

	/// Realises the persistent buffers and spins the submission path so the first timed
	/// search does not pay cold-start costs. Does not change any state observable through
	/// the other operations
	pub fn warmup(&mut self) -> Result<(), Error> {
		self.resources.reset_match_count();
		let _ = self.resources.positions_buffer().read().unwrap()[0];

		dispatch::run_empty(&self.resources)
	}

	/// Maps `path` and searches it for `pattern` `iterations` times, collecting every
	/// per-iteration result. The file stays mapped afterwards
	pub fn benchmark(&mut self, path: impl AsRef<Path>, pattern: &[u8], iterations: u32, warmup: bool) -> Result<BenchmarkResult, Error> {
		if iterations == 0 || iterations > MAX_BENCHMARK_ITERATIONS {
			return Err(Error::InvalidIterationCount { given: iterations, max: MAX_BENCHMARK_ITERATIONS });
		}

		self.map(path)?;

		if warmup {
			self.warmup()?;
		}

		let file_size = self.mapper.mapped_len().unwrap_or(0);

		info!("Benchmarking {} byte pattern over {} bytes, {} iterations", pattern.len(), file_size, iterations);

		let mut runs = Vec::with_capacity(iterations as usize);
		for _ in 0..iterations {
			runs.push(self.search(pattern)?);
		}

		Ok(BenchmarkResult::new(pattern.to_vec(), file_size, runs))
	}

	pub fn clear_pattern_cache(&mut self) {
		self.patterns.clear();
	}

	/// Pre-populates the pattern cache so later searches for these patterns skip buffer
	/// allocation
	pub fn warmup_pattern_cache(&mut self, patterns: &[Vec<u8>]) -> Result<(), Error> {
		self.patterns.warmup(patterns)
	}

	pub fn pattern_cache_len(&self) -> usize {
		self.patterns.len()
	}

	pub fn pattern_cached(&self, pattern: &[u8]) -> bool {
		self.patterns.contains(pattern)
	}

	/// The effective capture capacity for this engine
	pub fn capacity(&self) -> u32 {
		self.resources.capacity()
	}

	pub fn storage_mode(&self) -> StorageMode {
		self.resources.optimal_storage_mode()
	}

	/// Length of the mapped file, or None if no file is mapped
	pub fn mapped_len(&self) -> Option<u64> {
		self.mapper.mapped_len()
	}
}

#[cfg(all(test, feature = "gpu_tests"))]
mod test {
	use std::{collections::BTreeSet, env, fs, path::PathBuf, process};

	use crate::{error::Error, utils::init_test_logger};

	use super::SearchEngine;

	fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
		let path = env::temp_dir().join(format!("libscour_engine_test_{}_{}", process::id(), name));
		fs::write(&path, contents).unwrap();
		path
	}

	fn positions_set(positions: &[u32]) -> BTreeSet<u32> {
		positions.iter().copied().collect()
	}

	#[test]
	fn test_two_hellos() {
		init_test_logger();

		let path = temp_file("two_hellos", b"Hello, World! Hello again!");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"Hello").unwrap();

		assert_eq!(result.match_count, 2);
		assert_eq!(positions_set(&result.positions), BTreeSet::from([0, 14]));
		assert!(!result.truncated);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_overlapping_matches() {
		init_test_logger();

		let path = temp_file("overlap", b"aaaa");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"aa").unwrap();

		assert_eq!(result.match_count, 3);
		assert_eq!(positions_set(&result.positions), BTreeSet::from([0, 1, 2]));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_single_byte_pattern() {
		init_test_logger();

		let path = temp_file("single_byte", b"abacadaba");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"a").unwrap();

		assert_eq!(result.match_count, 5);
		assert_eq!(positions_set(&result.positions), BTreeSet::from([0, 2, 4, 6, 8]));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_repeated_word() {
		init_test_logger();

		let path = temp_file("repeated_word", b"Pattern matching test with Pattern occurring multiple times. Pattern here too.");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"Pattern").unwrap();

		assert_eq!(result.match_count, 3);
		assert_eq!(positions_set(&result.positions), BTreeSet::from([0, 28, 62]));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_sparse_matches_in_large_file() {
		init_test_logger();

		let mut contents = vec![b'A'; 100_000];
		contents.extend_from_slice(b"PATTERN");
		contents.extend(std::iter::repeat(b'B').take(900_000));
		contents.extend_from_slice(b"PATTERN");

		let path = temp_file("sparse_large", &contents);
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"PATTERN").unwrap();

		assert_eq!(result.match_count, 2);
		assert_eq!(positions_set(&result.positions), BTreeSet::from([100_000, 1_000_007]));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_pattern_equal_to_text() {
		init_test_logger();

		let path = temp_file("whole_text", b"exactly this");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"exactly this").unwrap();

		assert_eq!(result.match_count, 1);
		assert_eq!(result.positions, vec![0]);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_empty_file_fast_path() {
		init_test_logger();

		let path = temp_file("empty", b"");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let result = engine.search(b"test").unwrap();

		assert_eq!(result.match_count, 0);
		assert!(result.positions.is_empty());
		assert_eq!(result.throughput_mbps, 0.0);
		assert!(!result.truncated);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_validation_errors() {
		init_test_logger();

		let path = temp_file("validation", b"short");
		let mut engine = SearchEngine::new(None).unwrap();

		// Order matters: an empty pattern is rejected before the missing mapping is noticed
		assert!(matches!(engine.search(b""), Err(Error::EmptyPattern)));
		assert!(matches!(engine.search(b"a"), Err(Error::NoFileMapped)));

		engine.map(&path).unwrap();

		assert!(matches!(engine.search(b"longer than the text"), Err(Error::PatternTooLong { .. })));

		// A validation failure leaves the engine usable
		assert_eq!(engine.search(b"short").unwrap().match_count, 1);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_unmap_idempotent() {
		init_test_logger();

		let path = temp_file("unmap", b"bytes");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		engine.unmap().unwrap();
		engine.unmap().unwrap();

		assert!(matches!(engine.search(b"b"), Err(Error::NoFileMapped)));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_truncation() {
		init_test_logger();

		// More matches than the (clamped-to-minimum) capacity can capture
		let path = temp_file("truncation", &vec![b'a'; 2_000_001]);
		let mut engine = SearchEngine::new(Some(1)).unwrap();
		engine.map(&path).unwrap();

		let capacity = engine.capacity();
		let result = engine.search(b"a").unwrap();

		assert_eq!(result.match_count, 2_000_001);
		assert_eq!(result.positions.len(), capacity as usize);
		assert!(result.truncated);

		// Captured positions are distinct valid offsets even under slot contention
		let distinct = positions_set(&result.positions);
		assert_eq!(distinct.len(), result.positions.len());
		assert!(distinct.iter().all(|&p| p <= 2_000_000));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_count_is_deterministic() {
		init_test_logger();

		let path = temp_file("determinism", b"the quick brown fox jumps over the lazy dog; the end");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		let first = engine.search(b"the").unwrap();
		let expected = positions_set(&first.positions);

		for _ in 0..20 {
			let result = engine.search(b"the").unwrap();
			assert_eq!(result.match_count, first.match_count);
			assert_eq!(positions_set(&result.positions), expected);
		}

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_pattern_cache_controls() {
		init_test_logger();

		let path = temp_file("cache_controls", b"abcabcabc");
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&path).unwrap();

		engine.search(b"abc").unwrap();
		assert!(engine.pattern_cached(b"abc"));
		assert_eq!(engine.pattern_cache_len(), 1);

		engine.warmup_pattern_cache(&[b"ab".to_vec(), b"bc".to_vec()]).unwrap();
		assert_eq!(engine.pattern_cache_len(), 3);

		engine.clear_pattern_cache();
		assert_eq!(engine.pattern_cache_len(), 0);

		// Searching after a clear reallocates and still matches
		assert_eq!(engine.search(b"abc").unwrap().match_count, 3);

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_benchmark_driver() {
		init_test_logger();

		let path = temp_file("benchmark", b"benchmark me benchmark me benchmark me");
		let mut engine = SearchEngine::new(None).unwrap();

		let result = engine.benchmark(&path, b"benchmark", 5, true).unwrap();

		assert_eq!(result.iterations.len(), 5);
		assert!(result.iterations.iter().all(|r| r.match_count == 3));
		assert_eq!(result.file_size, 38);

		assert!(matches!(engine.benchmark(&path, b"benchmark", 0, false), Err(Error::InvalidIterationCount { .. })));
		assert!(matches!(engine.benchmark(&path, b"benchmark", 10_001, false), Err(Error::InvalidIterationCount { .. })));

		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn test_capacity_clamping() {
		init_test_logger();

		let engine = SearchEngine::new(Some(10)).unwrap();
		assert_eq!(engine.capacity(), 1_000_000);
	}
}
