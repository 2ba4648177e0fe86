//! Load probe for the gateway.
//!
//! Sends requests at a fixed rate, each with a fresh synthetic
//! `traceparent`, and prints latency percentiles at the end.

use std::time::{Duration, Instant};

use clap::Parser;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::task::JoinSet;

use trace_bridge::trace::{format, SpanId, TraceFlags, TraceId, TRACEPARENT_HEADER, TRACESTATE_HEADER};

/// Highest rate whose tick period is still a whole microsecond.
const MAX_RATE: i64 = 1_000_000;

#[derive(Parser)]
#[command(name = "trace-probe")]
#[command(about = "Drive traced requests through the gateway", long_about = None)]
struct Cli {
    /// Gateway URL
    #[arg(short, long, default_value = "http://127.0.0.1:3000/")]
    url: String,

    /// Requests per second
    #[arg(
        short,
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..=MAX_RATE)
    )]
    rate: u32,

    /// How long to send for
    #[arg(short, long, default_value_t = 10)]
    duration_secs: u64,

    /// Fraction of requests sent with the sampled flag
    #[arg(short, long, default_value_t = 1.0)]
    sampled_ratio: f64,

    /// Optional tracestate sent with every request
    #[arg(long)]
    tracestate: Option<String>,

    /// Per-request timeout
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,
}

struct Outcome {
    latency: Duration,
    ok: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;
    let tracestate = cli
        .tracestate
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1) / cli.rate);
    let deadline = Instant::now() + Duration::from_secs(cli.duration_secs);
    let started = Instant::now();
    let mut tasks = JoinSet::new();
    let mut sampled = 0usize;

    while Instant::now() < deadline {
        ticker.tick().await;

        let flags = if fastrand::f64() < cli.sampled_ratio {
            sampled += 1;
            TraceFlags::SAMPLED
        } else {
            TraceFlags::NOT_SAMPLED
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            TRACEPARENT_HEADER,
            HeaderValue::from_str(&format(TraceId::random(), SpanId::random(), flags))?,
        );
        if let Some(tracestate) = &tracestate {
            headers.insert(TRACESTATE_HEADER, tracestate.clone());
        }

        let request = client.get(&cli.url).headers(headers);
        tasks.spawn(async move {
            let start = Instant::now();
            let ok = match request.send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            Outcome {
                latency: start.elapsed(),
                ok,
            }
        });
    }

    let mut latencies = Vec::new();
    let mut errors = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) if outcome.ok => latencies.push(outcome.latency),
            _ => errors += 1,
        }
    }
    let elapsed = started.elapsed();
    let total = latencies.len() + errors;

    println!("\n--- Probe Results ---");
    println!("Target:         {}", cli.url);
    println!("Total Requests: {}", total);
    println!("Sampled:        {}", sampled);
    println!("Errors:         {}", errors);
    println!("Total Duration: {:?}", elapsed);
    println!("Requests/sec:   {:.2}", total as f64 / elapsed.as_secs_f64());

    if latencies.is_empty() {
        println!("No successful requests recorded");
    } else {
        latencies.sort();
        println!("P50 Latency:    {:?}", percentile(&latencies, 0.50));
        println!("P90 Latency:    {:?}", percentile(&latencies, 0.90));
        println!("P99 Latency:    {:?}", percentile(&latencies, 0.99));
    }
    println!("---------------------\n");

    Ok(())
}

/// `sorted` must be non-empty and ascending.
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    let index = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[index]
}
