use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	#[command(flatten)]
	pub verbose: clap_verbosity_flag::Verbosity<InfoLevel>,
	/// Capture-capacity hint: the most match positions a single search stores. Clamped into
	/// the supported range
	#[arg(long)]
	pub capacity: Option<u32>,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Search a file for every occurrence of a byte pattern
	Search {
		/// Path to the file to search
		input: String,
		/// Pattern to search for. Escape sequences such as \xFF, \n and \0 are processed
		/// unless --raw is given
		pattern: String,
		/// Maximum number of positions to print
		#[arg(short, long, default_value_t = 10)]
		limit: usize,
		/// Write every captured position to a file, as a contiguous array of little-endian
		/// 32-bit values
		#[arg(short, long)]
		export: Option<String>,
		/// Emit the full result as JSON on stdout
		#[arg(long)]
		json: bool,
		/// Treat the pattern argument as literal bytes, without escape processing
		#[arg(long)]
		raw: bool,
	},
	/// Repeatedly search a file and report timing statistics
	Benchmark {
		/// Path to the file to search
		input: String,
		/// Pattern to search for
		pattern: String,
		/// Number of timed search iterations to run
		#[arg(short, long, default_value_t = 10)]
		iterations: u32,
		/// Skip the warmup pass before the timed iterations
		#[arg(long)]
		no_warmup: bool,
		/// Write per-iteration results to a CSV file
		#[arg(long)]
		csv: Option<String>,
		/// Treat the pattern argument as literal bytes, without escape processing
		#[arg(long)]
		raw: bool,
	},
	/// Benchmark several patterns against one file
	Profile {
		/// Path to the file to search
		input: String,
		/// Patterns to profile
		#[arg(required = true)]
		patterns: Vec<String>,
		/// Number of timed search iterations per pattern
		#[arg(short, long, default_value_t = 100)]
		iterations: u32,
		/// Treat the pattern arguments as literal bytes, without escape processing
		#[arg(long)]
		raw: bool,
	},
}
