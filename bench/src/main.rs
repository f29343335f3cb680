use jitsort::{Generator, SortRoutine};
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize)]
struct BenchmarkResult {
    name: String,
    elements: usize,
    element_size: usize,
    generate_secs: f64,
    run_secs: f64,
    code_bytes: usize,
    rust_sort_secs: f64,
}

#[derive(Serialize)]
struct BenchmarkOutput {
    results: Vec<BenchmarkResult>,
}

/// Deterministic byte-keyed records: the first byte is the key, the rest is
/// filler so records stay distinguishable.
fn make_records(count: usize, element_size: usize) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    let mut data = Vec::with_capacity(count * element_size);
    for i in 0..count {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let mut record = vec![0u8; element_size];
        record[0] = (state & 0xFF) as u8;
        for (j, byte) in record.iter_mut().enumerate().skip(8usize.min(element_size)) {
            *byte = (i + j) as u8;
        }
        data.extend_from_slice(&record);
    }
    data
}

fn time<T, F: FnOnce() -> T>(f: F) -> (T, f64) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed().as_secs_f64())
}

fn run_benchmark(name: &str, count: usize, element_size: usize) -> BenchmarkResult {
    let data = make_records(count, element_size);
    let generator = Generator::default();

    let (routine, generate_secs) = time(|| generator.sort_fixed(&data, element_size));
    let routine: SortRoutine<'_> = match routine {
        Ok(routine) => routine,
        Err(e) => {
            eprintln!("benchmark {} failed to generate: {}", name, e);
            std::process::exit(1);
        }
    };
    let (output, run_secs) = time(|| routine.run());
    if output.is_none() {
        eprintln!("benchmark {}: output allocation failed", name);
    }

    let (_, rust_sort_secs) = time(|| {
        let mut records: Vec<&[u8]> = data.chunks_exact(element_size).collect();
        records.sort_by_key(|r| r[0]);
        records.concat()
    });

    BenchmarkResult {
        name: name.to_string(),
        elements: count,
        element_size,
        generate_secs,
        run_secs,
        code_bytes: routine.code().len(),
        rust_sort_secs,
    }
}

fn main() {
    let results = vec![
        run_benchmark("bytes_10k", 10_000, 1),
        run_benchmark("u32_10k", 10_000, 4),
        run_benchmark("records64_10k", 10_000, 64),
        run_benchmark("bytes_100k", 100_000, 1),
    ];

    let output = BenchmarkOutput { results };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to serialize results: {}", e),
    }
}
