use cpu_probe::core::hardware::CpuDetector;
use cpu_probe::simd::{get_dot_product, scalar};
use rand::Rng;
use std::hint::black_box;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let n = 10_000;
    let dim = 256;
    let rounds = 100;

    let detector = CpuDetector::native();
    let (path, dot) = get_dot_product();

    println!("=== Dot Product Benchmark: N={}, Dim={} ===", n, dim);
    println!("Best feature: {}", detector.best_feature_label());
    println!("Code path:    {}", path);

    // 1. Generate Data
    let mut rng = rand::thread_rng();
    let vectors: Vec<Vec<f32>> = (0..n).map(|_| (0..dim).map(|_| rng.gen()).collect()).collect();
    let query: Vec<f32> = (0..dim).map(|_| rng.gen()).collect();

    // 2. Scalar baseline
    let start = Instant::now();
    for _ in 0..rounds {
        for v in &vectors {
            black_box(scalar::dot_product(black_box(&query), black_box(v)));
        }
    }
    let scalar_time = start.elapsed();

    // 3. Dispatched kernel
    let start = Instant::now();
    for _ in 0..rounds {
        for v in &vectors {
            // Safe: kernel was checked against the running CPU and OS.
            black_box(unsafe { dot(black_box(&query), black_box(v)) });
        }
    }
    let dispatched_time = start.elapsed();

    let total = (n * rounds) as f64;
    println!("Scalar:     {:.2?} ({:.2} Mdot/s)", scalar_time, total / scalar_time.as_secs_f64() / 1e6);
    println!("{:<11} {:.2?} ({:.2} Mdot/s)", format!("{}:", path), dispatched_time, total / dispatched_time.as_secs_f64() / 1e6);
    println!("Speedup:    {:.2}x", scalar_time.as_secs_f64() / dispatched_time.as_secs_f64());
    Ok(())
}
