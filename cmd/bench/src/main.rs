//! Dispatch throughput benchmark
//!
//! Runs the same chained workload several ways (blocking driver threads,
//! callback state machines, eager and lazy async sessions) and prints
//! dispatches per second for each.
//!
//! ```text
//! bench [blocking|callbacks|sessions|sessions-lazy]
//! ```
//!
//! Knobs come from `BENCH_*` environment variables (see `config.rs`), pool
//! tuning from `HANDOFF_*`. Logging follows `RUST_LOG`.

mod approach;
mod config;
mod workload;

use approach::{Approach, RunReport};
use config::BenchConfig;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    init_logging();

    let config = BenchConfig::from_env();
    let selected = std::env::args().nth(1);
    let approaches: Vec<Box<dyn Approach>> = approach::all()
        .into_iter()
        .filter(|a| selected.as_deref().map_or(true, |name| a.name() == name))
        .collect();

    if approaches.is_empty() {
        eprintln!(
            "unknown approach {:?}; expected one of: blocking, callbacks, sessions, sessions-lazy",
            selected.unwrap_or_default()
        );
        std::process::exit(2);
    }

    println!("=== handoff dispatch benchmark ===\n");
    println!("  Threads:     {}", config.num_threads);
    println!("  Sessions:    {}", format_count(config.num_sessions as u64, ','));
    println!("  Dispatches:  {}", format_count(config.total_dispatches(), ','));
    println!(
        "  Buffers:     {} x {} bytes",
        config.num_buffers, config.buffer_size
    );
    println!(
        "  Wait:        {:?} every {} chars\n",
        config.wait_time,
        format_count(config.num_chars_between_wait, ',')
    );

    for approach in approaches {
        tracing::info!(approach = approach.name(), "starting");
        match approach.go(&config) {
            Ok(report) => print_report(&report),
            Err(e) => {
                tracing::error!(approach = approach.name(), error = %e, "approach failed");
                std::process::exit(1);
            }
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn print_report(report: &RunReport) {
    println!("Approach: {}", report.name);
    println!("{}", "─".repeat(40));
    println!("  Dispatches:  {}", format_count(report.dispatches, ','));
    println!("  Failures:    {}", format_count(report.failures, ','));
    println!("  I/O waits:   {}", format_count(report.waits, ','));
    println!("  Total time:  {:?}", report.elapsed);
    println!("  Rate:        {}/sec\n", format_count(report.per_sec(), ','));
}

/// `1234567` -> `"1,234,567"` for `sep = ','`.
pub fn format_count(val: u64, sep: char) -> String {
    let digits = val.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}
