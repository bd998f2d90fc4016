use std::{env, fs, hint::black_box};

use criterion::{criterion_group, criterion_main, Bencher, Criterion, Throughput};
use libscour::engine::SearchEngine;
use tinyrand::{Rand, StdRand};

criterion_group!(benches, search_bench);
criterion_main!(benches);

const BENCH_FILE_LEN: usize = 16 * 1024 * 1024;
const SEARCH_PATTERN: &[u8] = b"\x7f\x45\x4c\x46";

fn search_bench(c: &mut Criterion) {
	let bench_file = env::temp_dir().join("scour_search_bench.dat");

	let mut rand = StdRand::default();
	let data: Vec<u8> = (0..BENCH_FILE_LEN).map(|_| rand.next_u16() as u8).collect();
	fs::write(&bench_file, &data).unwrap();

	let mut group = c.benchmark_group("search");
	group.sample_size(20);
	group.throughput(Throughput::Bytes(BENCH_FILE_LEN as u64));

	group.bench_function("substring_gpu", |b: &mut Bencher| {
		let mut engine = SearchEngine::new(None).unwrap();
		engine.map(&bench_file).unwrap();
		engine.warmup().unwrap();

		b.iter(|| {
			black_box(engine.search(SEARCH_PATTERN).unwrap());
		});
	});

	group.finish();

	let _ = fs::remove_file(&bench_file);
}
