use std::time::Duration;

use serde::Serialize;

/// The outcome of one search over the mapped text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
	/// Total number of occurrences of the pattern in the text. Never truncated, even when
	/// more matches were found than could be captured
	pub match_count: u32,
	/// Up to `capacity` starting offsets, in the order GPU threads claimed result slots.
	/// There is no ordering guarantee between entries; callers wanting sorted output must
	/// sort
	pub positions: Vec<u32>,
	pub execution_time: Duration,
	pub throughput_mbps: f64,
	/// True when `match_count` exceeded the capture capacity
	pub truncated: bool
}

impl SearchResult {
	/// The result of searching zero-length text: nothing found, nothing measured
	pub(crate) fn empty() -> Self {
		SearchResult {
			match_count: 0,
			positions: Vec::new(),
			execution_time: Duration::ZERO,
			throughput_mbps: 0.0,
			truncated: false
		}
	}
}

/// `text_len / (time * 1 MiB)`, or 0 when either is not positive
pub fn throughput_mbps(text_len: u64, time: Duration) -> f64 {
	let secs = time.as_secs_f64();
	if text_len == 0 || secs <= 0.0 {
		return 0.0;
	}

	text_len as f64 / (secs * 1_048_576.0)
}

/// Per-iteration results of repeatedly searching one file for one pattern
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
	pub pattern: Vec<u8>,
	pub file_size: u64,
	pub iterations: Vec<SearchResult>,
	pub avg_time: Duration,
	pub avg_throughput_mbps: f64
}

impl BenchmarkResult {
	pub fn new(pattern: Vec<u8>, file_size: u64, iterations: Vec<SearchResult>) -> Self {
		let (avg_time, avg_throughput_mbps) = if iterations.is_empty() {
			(Duration::ZERO, 0.0)
		} else {
			(
				iterations.iter().map(|r| r.execution_time).sum::<Duration>() / iterations.len() as u32,
				iterations.iter().map(|r| r.throughput_mbps).sum::<f64>() / iterations.len() as f64
			)
		};

		BenchmarkResult {
			pattern,
			file_size,
			iterations,
			avg_time,
			avg_throughput_mbps
		}
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use super::{throughput_mbps, BenchmarkResult, SearchResult};

	#[test]
	fn test_throughput() {
		// 1 MiB in 1 second is 1 MB/s by definition
		assert_eq!(throughput_mbps(1_048_576, Duration::from_secs(1)), 1.0);
		assert_eq!(throughput_mbps(1_048_576, Duration::from_millis(500)), 2.0);

		assert_eq!(throughput_mbps(0, Duration::from_secs(1)), 0.0);
		assert_eq!(throughput_mbps(1_048_576, Duration::ZERO), 0.0);
	}

	#[test]
	fn test_empty_result() {
		let result = SearchResult::empty();

		assert_eq!(result.match_count, 0);
		assert!(result.positions.is_empty());
		assert_eq!(result.execution_time, Duration::ZERO);
		assert_eq!(result.throughput_mbps, 0.0);
		assert!(!result.truncated);
	}

	#[test]
	fn test_benchmark_averages() {
		let runs = vec![
			SearchResult { match_count: 3, positions: vec![0, 5, 9], execution_time: Duration::from_millis(10), throughput_mbps: 100.0, truncated: false },
			SearchResult { match_count: 3, positions: vec![9, 0, 5], execution_time: Duration::from_millis(30), throughput_mbps: 300.0, truncated: false }
		];

		let result = BenchmarkResult::new(b"ab".to_vec(), 1024, runs);

		assert_eq!(result.avg_time, Duration::from_millis(20));
		assert_eq!(result.avg_throughput_mbps, 200.0);
	}

	#[test]
	fn test_benchmark_zero_iterations() {
		let result = BenchmarkResult::new(b"ab".to_vec(), 1024, Vec::new());

		assert_eq!(result.avg_time, Duration::ZERO);
		assert_eq!(result.avg_throughput_mbps, 0.0);
	}
}
