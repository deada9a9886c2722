//! Captcha OCR benchmark CLI.
//!
//! Runs the shared recognition bridge in-process, the same code path a
//! host app reaches through the C ABI.
//!
//! Usage:
//!   cargo run -- <captcha.png>              Single image → JSON
//!   cargo run -- --batch <directory>        All PNG/JPEGs in directory → CSV
//!
//! In batch mode a file named after its answer (e.g. `7K3P.png`) counts
//! towards accuracy.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use captcha_ocr_bridge::CaptchaOcrBridge;

fn main() {
    load_env();
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage:");
        eprintln!("  ocr-bench <captcha.png>");
        eprintln!("  ocr-bench --batch <directory>");
        std::process::exit(1);
    }

    let warm_start = Instant::now();
    let bridge = CaptchaOcrBridge::shared();
    eprintln!(
        "[WARM-UP] Bridge ready in {:.1}ms, recognizers: [{}]",
        warm_start.elapsed().as_micros() as f64 / 1000.0,
        bridge.recognizer_names().join(", ")
    );

    if args[1] == "--batch" {
        let Some(dir) = args.get(2) else {
            eprintln!("--batch requires a directory path");
            std::process::exit(1);
        };
        run_batch(bridge, dir);
    } else {
        run_single(bridge, &args[1]);
    }
}

/// Load `.env.local` → `.env` from the working directory, first found wins.
fn load_env() {
    for env_file in [".env.local", ".env"] {
        let path = Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break;
        }
    }
}

/// Recognize one file, measuring wall-clock time.
fn timed_recognize(bridge: &CaptchaOcrBridge, path: &Path) -> (Option<String>, f64) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("[BENCH] Failed to read {}: {}", path.display(), e);
            return (None, 0.0);
        }
    };
    let start = Instant::now();
    let result = bridge.recognize(&bytes);
    (result, start.elapsed().as_micros() as f64 / 1000.0)
}

fn run_single(bridge: &CaptchaOcrBridge, image_path: &str) {
    let path = Path::new(image_path);
    if !path.is_file() {
        eprintln!("File not found: {}", image_path);
        std::process::exit(1);
    }

    let (result, wall_ms) = timed_recognize(bridge, path);
    let output = serde_json::json!({
        "file": image_path,
        "recognized": result.is_some(),
        "text": result,
        "wallTimeMs": (wall_ms * 100.0).round() / 100.0,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize result: {}", e),
    }
}

fn run_batch(bridge: &CaptchaOcrBridge, dir_path: &str) {
    let dir = Path::new(dir_path);
    if !dir.is_dir() {
        eprintln!("Not a directory: {}", dir_path);
        std::process::exit(1);
    }

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect(),
        Err(e) => {
            eprintln!("Failed to read {}: {}", dir_path, e);
            std::process::exit(1);
        }
    };
    entries.sort();

    if entries.is_empty() {
        eprintln!("No image files found in {}", dir_path);
        std::process::exit(1);
    }

    println!("filename,text,wall_ms,matches_name");

    let mut latencies: Vec<f64> = Vec::new();
    let mut recognized = 0usize;
    let mut correct = 0usize;

    for image_path in &entries {
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let expected = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let (result, wall_ms) = timed_recognize(bridge, image_path);
        let text = result.unwrap_or_default();
        let matches = !text.is_empty() && text.eq_ignore_ascii_case(&expected);

        println!(
            "{},{},{:.2},{}",
            csv_quote(&filename),
            csv_quote(&text),
            wall_ms,
            matches
        );

        if !text.is_empty() {
            recognized += 1;
        }
        if matches {
            correct += 1;
        }
        latencies.push(wall_ms);

        std::io::stdout().flush().ok();
    }

    eprintln!("\n--- Benchmark Summary ---");
    eprintln!("  Images processed: {}", entries.len());
    eprintln!("  Recognized: {}", recognized);
    eprintln!(
        "  Matches file name: {} ({:.1}%)",
        correct,
        correct as f64 * 100.0 / entries.len() as f64
    );
    print_latency_summary(&mut latencies);
}

/// Quote a CSV field, doubling embedded quotes.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn print_latency_summary(latencies: &mut [f64]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort_by(|a, b| a.total_cmp(b));
    let median = latencies[latencies.len() / 2];
    let p99_idx = ((latencies.len() as f64 * 0.99).ceil() as usize).min(latencies.len() - 1);
    let p99 = latencies[p99_idx];
    let avg: f64 = latencies.iter().sum::<f64>() / latencies.len() as f64;

    eprintln!("  Latency:");
    eprintln!("    Median: {:.1}ms", median);
    eprintln!("    Average: {:.1}ms", avg);
    eprintln!("    P99: {:.1}ms", p99);
}
