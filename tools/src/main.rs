//! risk-engine: headless runner for the Equilibrate risk scan loop.
//!
//! Usage:
//!   risk-engine --db risk.db --seed-demo 500 --cycles 3
//!   risk-engine --config engine.json --concurrency 8
//!
//! Without --cycles the loop runs until stdin sends `quit` or closes.
//! `status` prints the most recent cycle outcome as JSON.

use anyhow::Result;
use equilibrate_core::{
    population,
    report::CycleOutcome,
    scan_loop::ScanLoop,
    store::{RetryingStore, SqliteStore},
    EngineConfig,
};
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut config = match find_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = find_arg(&args, "--db") {
        config.store_target = db.to_string();
    }
    config.tick_interval = parse_arg(&args, "--tick-secs", config.tick_interval);
    config.concurrency = parse_arg(&args, "--concurrency", config.concurrency);
    config.validate()?;

    let cycles = find_arg(&args, "--cycles").and_then(|v| v.parse::<u64>().ok());
    let seed_demo = parse_arg(&args, "--seed-demo", 0usize);
    let seed = parse_arg(&args, "--seed", 42u64);

    println!("Equilibrate risk engine");
    println!("  store:       {}", config.store_target);
    println!("  interval:    {:?} ({:?})", config.tick_interval(), config.tick_policy);
    println!("  concurrency: {}", config.concurrency);
    println!();

    // A store still unreachable after the retry budget is a startup failure.
    let store = SqliteStore::open_with_retry(&config.store_target, &config.retry.policy())?;

    if seed_demo > 0 {
        for customer in population::generate(seed, seed_demo) {
            store.put_snapshot(&customer.customer_id, &customer.snapshot)?;
        }
        println!("  seeded {seed_demo} demo customers (seed {seed})");
        println!();
    }

    let store = RetryingStore::new(store, config.retry.policy());
    let mut scan = ScanLoop::new(store, &config)?;

    match cycles {
        Some(n) => {
            let outcomes = scan.run_cycles(n);
            print_summary(&scan, &outcomes)?;
        }
        None => run_until_quit(scan, &config)?,
    }

    Ok(())
}

fn run_until_quit(
    mut scan: ScanLoop<RetryingStore<SqliteStore>>,
    config: &EngineConfig,
) -> Result<()> {
    let outcomes = scan.subscribe();
    let handle = scan.spawn()?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last: Option<CycleOutcome> = None;

    for line in stdin.lock().lines() {
        let line = line?;
        last = outcomes.try_iter().last().or(last);
        match line.trim() {
            "quit" | "exit" => break,
            "status" => {
                let json = match &last {
                    Some(outcome) => serde_json::to_string(outcome)?,
                    None => serde_json::json!({ "status": "no cycle completed yet" }).to_string(),
                };
                writeln!(stdout, "{json}")?;
                stdout.flush()?;
            }
            "" => {}
            other => log::warn!("Unknown command: {other}"),
        }
    }

    let outcome = handle.shutdown(config.shutdown_timeout());
    println!("shutdown: {outcome:?}");
    Ok(())
}

fn print_summary(
    scan: &ScanLoop<RetryingStore<SqliteStore>>,
    outcomes: &[CycleOutcome],
) -> Result<()> {
    let store = scan.store().inner();
    let aborted = outcomes.iter().filter(|o| o.report().is_none()).count();

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  instance:       {}", scan.instance_id);
    println!("  cycles run:     {}", outcomes.len());
    println!("  cycles aborted: {aborted}");
    println!("  customers:      {}", store.customer_count()?);

    if let Some(report) = outcomes.iter().rev().find_map(|o| o.report()) {
        println!();
        println!("=== LAST CYCLE (#{}) ===", report.cycle);
        println!("  CRITICAL:            {}", report.tiers.critical);
        println!("  HIGH:                {}", report.tiers.high);
        println!("  MEDIUM:              {}", report.tiers.medium);
        println!("  LOW:                 {}", report.tiers.low);
        println!("  income shock:        {}", report.hardship.income_shock);
        println!("  liquidity stress:    {}", report.hardship.liquidity_stress);
        println!("  expense compression: {}", report.hardship.expense_compression);
        println!("  skipped / failed:    {} / {}", report.skipped, report.failed);
    }
    Ok(())
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
