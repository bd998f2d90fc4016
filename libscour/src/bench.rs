use std::{collections::BTreeSet, path::Path};

use serde::Serialize;

use crate::{engine::SearchEngine, error::Error, search::BenchmarkResult};

/// Most iterations `SearchEngine::benchmark` accepts
pub const MAX_BENCHMARK_ITERATIONS: u32 = 10_000;
/// Most iterations per pattern `profile_patterns` accepts
pub const MAX_PROFILE_ITERATIONS: u32 = 1_000;

/// Welford's single-pass running mean and variance
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
	count: u64,
	mean: f64,
	m2: f64
}

impl RunningStats {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, value: f64) {
		self.count += 1;
		let delta = value - self.mean;
		self.mean += delta / self.count as f64;
		let delta2 = value - self.mean;
		self.m2 += delta * delta2;
	}

	pub fn count(&self) -> u64 {
		self.count
	}

	pub fn mean(&self) -> f64 {
		if self.count == 0 {
			0.0
		} else {
			self.mean
		}
	}

	/// Sample standard deviation, or 0 with fewer than two samples
	pub fn sample_sd(&self) -> f64 {
		if self.count >= 2 {
			(self.m2 / (self.count - 1) as f64).sqrt()
		} else {
			0.0
		}
	}
}

/// Percentile by linear interpolation on an already-sorted sample: for rank
/// `r = (p / 100) * (n - 1)`, interpolates between the neighbouring values
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
	match sorted.len() {
		0 => 0.0,
		1 => sorted[0],
		n => {
			let rank = (p / 100.0) * (n - 1) as f64;
			let lo = rank.floor() as usize;
			let hi = rank.ceil() as usize;
			let frac = rank - lo as f64;

			sorted[lo] * (1.0 - frac) + sorted[hi] * frac
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
	pub mean: f64,
	pub min: f64,
	pub max: f64,
	pub sd: f64,
	pub p50: f64,
	pub p95: f64,
	pub p99: f64
}

impl StatsSummary {
	pub fn from_samples(samples: &[f64]) -> Self {
		let mut stats = RunningStats::new();
		let mut min = f64::INFINITY;
		let mut max = f64::NEG_INFINITY;

		for &sample in samples {
			stats.push(sample);
			min = min.min(sample);
			max = max.max(sample);
		}

		if samples.is_empty() {
			min = 0.0;
			max = 0.0;
		}

		let mut sorted = samples.to_vec();
		sorted.sort_by(f64::total_cmp);

		StatsSummary {
			mean: stats.mean(),
			min,
			max,
			sd: stats.sample_sd(),
			p50: percentile(&sorted, 50.0),
			p95: percentile(&sorted, 95.0),
			p99: percentile(&sorted, 99.0)
		}
	}
}

impl BenchmarkResult {
	/// Summary statistics over the per-iteration execution times, in seconds
	pub fn time_summary(&self) -> StatsSummary {
		let times: Vec<f64> = self.iterations.iter().map(|r| r.execution_time.as_secs_f64()).collect();
		StatsSummary::from_samples(&times)
	}

	/// Summary statistics over the per-iteration throughputs, in MB/s
	pub fn throughput_summary(&self) -> StatsSummary {
		let throughputs: Vec<f64> = self.iterations.iter().map(|r| r.throughput_mbps).collect();
		StatsSummary::from_samples(&throughputs)
	}

	/// The distinct match counts seen across iterations. A single value means the
	/// iterations were consistent
	pub fn distinct_match_counts(&self) -> BTreeSet<u32> {
		self.iterations.iter().map(|r| r.match_count).collect()
	}

	pub fn is_consistent(&self) -> bool {
		self.distinct_match_counts().len() <= 1
	}

	/// How many iterations captured fewer positions than they counted matches
	pub fn truncated_iterations(&self) -> usize {
		self.iterations.iter().filter(|r| r.truncated).count()
	}
}

/// Benchmarks each pattern in turn against one file, which is mapped once and stays mapped.
/// Iterations are bounded tighter than `SearchEngine::benchmark` since the total work is
/// `patterns × iterations` searches
pub fn profile_patterns(engine: &mut SearchEngine, path: impl AsRef<Path>, patterns: &[Vec<u8>], iterations: u32) -> Result<Vec<BenchmarkResult>, Error> {
	if iterations == 0 || iterations > MAX_PROFILE_ITERATIONS {
		return Err(Error::InvalidIterationCount { given: iterations, max: MAX_PROFILE_ITERATIONS });
	}

	engine.map(path)?;
	engine.warmup()?;

	let file_size = engine.mapped_len().unwrap_or(0);

	patterns.iter().map(|pattern| {
		let mut runs = Vec::with_capacity(iterations as usize);
		for _ in 0..iterations {
			runs.push(engine.search(pattern)?);
		}

		Ok(BenchmarkResult::new(pattern.clone(), file_size, runs))
	}).collect()
}
