// Per-run overhead benchmark for Engine::execute
// Measures provision -> spawn -> capture -> dispose -> ledger append
// Target for a trivial /bin/sh payload: p50 < 50ms, p95 < 100ms

use snipbox::judge::pipeline::{LanguagePipeline, PhaseSpec};
use snipbox::{Engine, EngineConfig, ExecutionRequest, Language, ResourceLimits};
use std::time::{Duration, Instant};

const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;
        let p99_idx = (len as f64 * 0.99) as usize;

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx],
            p99: samples[p99_idx],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    budget: (Duration, Duration),
    failures: usize,
}

impl BenchmarkResult {
    fn passed(&self) -> bool {
        self.failures == 0 && self.stats.p50 < self.budget.0 && self.stats.p95 < self.budget.1
    }

    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");

        if self.passed() {
            println!("PASS");
        } else {
            println!(
                "FAIL: p50={:?} (target <{:?}), p95={:?} (target <{:?}), failed runs={}",
                self.stats.p50, self.budget.0, self.stats.p95, self.budget.1, self.failures
            );
        }
    }
}

fn bench_engine(name: &str, pipeline: LanguagePipeline) -> Engine {
    let base = std::env::temp_dir().join(format!("snipbox_bench_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&base);
    let mut config = EngineConfig {
        workspace_root: base.join("work"),
        state_dir: base.join("state"),
        ..EngineConfig::default()
    };
    config.languages.insert(pipeline.language, pipeline);
    match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to build engine: {}", e);
            std::process::exit(1);
        }
    }
}

fn measure(scenario: &str, engine: &Engine, request: &ExecutionRequest, budget: (Duration, Duration)) -> BenchmarkResult {
    for _ in 0..WARMUP_ITERATIONS {
        let _ = engine.execute(request);
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    let mut failures = 0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        match engine.execute(request) {
            Ok(reply) if reply.success() => {}
            _ => failures += 1,
        }
        samples.push(start.elapsed());
    }

    BenchmarkResult {
        scenario: scenario.to_string(),
        stats: LatencyStats::from_samples(samples),
        budget,
        failures,
    }
}

/// Engine overhead with a payload that does almost nothing
fn benchmark_shell_echo() -> BenchmarkResult {
    let pipeline = LanguagePipeline {
        language: Language::Python,
        file_name: "main.sh".to_string(),
        compile: None,
        run: PhaseSpec::new(&["/bin/sh", "{source}"], 5_000, ResourceLimits::default()),
        install: None,
        notes: None,
    };
    let engine = bench_engine("echo", pipeline);
    let request = ExecutionRequest::new("bench", "echo hello").with_language("python");
    measure(
        "Shell echo (interpreted path)",
        &engine,
        &request,
        (Duration::from_millis(50), Duration::from_millis(100)),
    )
}

/// Same payload through a compile step, to price the extra phase
fn benchmark_two_phase() -> BenchmarkResult {
    let pipeline = LanguagePipeline {
        language: Language::C,
        file_name: "main.c".to_string(),
        compile: Some(PhaseSpec::new(
            &["/bin/sh", "-c", "cp \"$0\" \"$1\" && chmod +x \"$1\"", "{source}", "{binary}"],
            5_000,
            ResourceLimits::default(),
        )),
        run: PhaseSpec::new(&["{binary}"], 5_000, ResourceLimits::default()),
        install: None,
        notes: None,
    };
    let engine = bench_engine("two_phase", pipeline);
    let request = ExecutionRequest::new("bench", "#!/bin/sh\necho hello").with_language("c");
    measure(
        "Compile + run (compiled path)",
        &engine,
        &request,
        (Duration::from_millis(100), Duration::from_millis(200)),
    )
}

fn main() {
    println!("=== snipbox Engine::execute Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let results = vec![benchmark_shell_echo(), benchmark_two_phase()];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed()).count();
    let total_count = results.len();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All latency budgets met");
        std::process::exit(0);
    } else {
        println!("Some latency budgets exceeded");
        std::process::exit(1);
    }
}
