mod args;

use std::{fs::File, io::{BufWriter, Write}, process::ExitCode};

use clap::Parser;
use libscour::{bench::profile_patterns, engine::SearchEngine, search::{BenchmarkResult, SearchResult}, utils::str_parse::parse_pattern_str};
use log::{error, info, warn};

use crate::args::{Args, Command};

fn main() -> ExitCode {
	let args = Args::parse();

	env_logger::builder()
		.format(|f, record| {
			let level_style = f.default_level_style(record.level());
			writeln!(f, "[{} {}/{}{}{}]: {}", f.timestamp(), record.target(), level_style.render(), record.level(), level_style.render_reset(), record.args())
		})
		.filter_level(args.verbose.log_level_filter())
		.init();

	let engine = SearchEngine::new(args.capacity);
	let mut engine = match engine {
		Ok(engine) => engine,
		Err(e) => {
			error!("Failed to initialise search engine: {}", e);
			return ExitCode::FAILURE;
		}
	};

	info!("Engine ready ({} storage, capacity {})", engine.storage_mode().name(), engine.capacity());

	let outcome = match args.command {
		Command::Search { input, pattern, limit, export, json, raw } => {
			run_search(&mut engine, &input, &pattern, limit, export.as_deref(), json, raw)
		}
		Command::Benchmark { input, pattern, iterations, no_warmup, csv, raw } => {
			run_benchmark(&mut engine, &input, &pattern, iterations, !no_warmup, csv.as_deref(), raw)
		}
		Command::Profile { input, patterns, iterations, raw } => {
			run_profile(&mut engine, &input, &patterns, iterations, raw)
		}
	};

	match outcome {
		Ok(_) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}

fn pattern_bytes(pattern: &str, raw: bool) -> Vec<u8> {
	if raw {
		pattern.as_bytes().to_vec()
	} else {
		parse_pattern_str(pattern)
	}
}

fn run_search(engine: &mut SearchEngine, input: &str, pattern: &str, limit: usize, export: Option<&str>, json: bool, raw: bool) -> Result<(), String> {
	let pattern = pattern_bytes(pattern, raw);

	engine.map(input).map_err(|e| e.to_string())?;
	let result = engine.search(&pattern).map_err(|e| e.to_string())?;

	if json {
		println!("{}", serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?);
	} else {
		print_search_result(&result, limit);
	}

	if let Some(path) = export {
		write_positions(path, &result.positions).map_err(|e| format!("Failed to export positions to {}: {}", path, e))?;
		info!("Exported {} positions to {}", result.positions.len(), path);
	}

	Ok(())
}

fn print_search_result(result: &SearchResult, limit: usize) {
	println!("{} matches in {} ({:.2} MB/s)", result.match_count, humantime::format_duration(result.execution_time), result.throughput_mbps);

	if result.truncated {
		warn!("Match count exceeded the capture capacity; only {} positions were stored", result.positions.len());
	}

	if !result.positions.is_empty() {
		let shown = limit.min(result.positions.len());
		println!("First {} positions (storage order): {:?}", shown, &result.positions[..shown]);
	}
}

/// The positions-binary format: a contiguous little-endian u32 array, no header
fn write_positions(path: &str, positions: &[u32]) -> std::io::Result<()> {
	let mut writer = BufWriter::new(File::create(path)?);

	for position in positions {
		writer.write_all(&position.to_le_bytes())?;
	}

	writer.flush()
}

fn run_benchmark(engine: &mut SearchEngine, input: &str, pattern: &str, iterations: u32, warmup: bool, csv: Option<&str>, raw: bool) -> Result<(), String> {
	let pattern = pattern_bytes(pattern, raw);

	let result = engine.benchmark(input, &pattern, iterations, warmup).map_err(|e| e.to_string())?;

	print_benchmark_result(&result);

	if let Some(path) = csv {
		write_csv(path, &result).map_err(|e| format!("Failed to write CSV to {}: {}", path, e))?;
		info!("Wrote {} iterations to {}", result.iterations.len(), path);
	}

	Ok(())
}

fn print_benchmark_result(result: &BenchmarkResult) {
	let times = result.time_summary();
	let throughputs = result.throughput_summary();

	println!("{} iterations over {} bytes", result.iterations.len(), result.file_size);
	println!("time:       mean {:.6}s  sd {:.6}s  min {:.6}s  max {:.6}s", times.mean, times.sd, times.min, times.max);
	println!("            p50 {:.6}s  p95 {:.6}s  p99 {:.6}s", times.p50, times.p95, times.p99);
	println!("throughput: mean {:.2} MB/s  sd {:.2}  min {:.2}  max {:.2}", throughputs.mean, throughputs.sd, throughputs.min, throughputs.max);

	if result.is_consistent() {
		if let Some(count) = result.distinct_match_counts().first() {
			println!("match count: {} (consistent across iterations)", count);
		}
	} else {
		warn!("Inconsistent match counts across iterations: {:?}", result.distinct_match_counts());
	}

	let truncated = result.truncated_iterations();
	if truncated > 0 {
		warn!("{} iterations exceeded the capture capacity", truncated);
	}
}

fn write_csv(path: &str, result: &BenchmarkResult) -> std::io::Result<()> {
	let mut writer = BufWriter::new(File::create(path)?);

	writeln!(writer, "iteration,match_count,time_s,throughput_mbps,truncated")?;
	for (i, run) in result.iterations.iter().enumerate() {
		writeln!(writer, "{},{},{:.9},{:.3},{}", i, run.match_count, run.execution_time.as_secs_f64(), run.throughput_mbps, run.truncated)?;
	}

	writer.flush()
}

fn run_profile(engine: &mut SearchEngine, input: &str, patterns: &[String], iterations: u32, raw: bool) -> Result<(), String> {
	let patterns: Vec<Vec<u8>> = patterns.iter().map(|p| pattern_bytes(p, raw)).collect();

	let results = profile_patterns(engine, input, &patterns, iterations).map_err(|e| e.to_string())?;

	println!("{:<24} {:>12} {:>12} {:>12} {:>14}", "pattern", "mean (s)", "p95 (s)", "sd (s)", "mean (MB/s)");
	for result in &results {
		let times = result.time_summary();
		let throughputs = result.throughput_summary();

		println!("{:<24} {:>12.6} {:>12.6} {:>12.6} {:>14.2}", preview_pattern(&result.pattern), times.mean, times.p95, times.sd, throughputs.mean);

		if !result.is_consistent() {
			warn!("Inconsistent match counts for pattern {:?}: {:?}", preview_pattern(&result.pattern), result.distinct_match_counts());
		}
	}

	Ok(())
}

/// Short printable rendition of a pattern for table output; non-ASCII bytes are hex-escaped
fn preview_pattern(pattern: &[u8]) -> String {
	let mut out = String::new();

	for &byte in pattern.iter().take(16) {
		if byte.is_ascii_graphic() || byte == b' ' {
			out.push(byte as char);
		} else {
			out.push_str(&format!("\\x{:02x}", byte));
		}
	}

	if pattern.len() > 16 {
		out.push_str("...");
	}

	out
}
