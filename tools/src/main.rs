//! risk-runner: headless driver for the account risk engine.
//!
//! Usage:
//!   risk-runner generate --seed 12345 --accounts 500 --db telemetry.db
//!   risk-runner assess --db telemetry.db --config data/engine_config.json --out run.json
//!   risk-runner assess --seed 7 --accounts 300            (synthetic, in memory)

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use cloudrisk_core::{
    config::EngineConfig,
    engine::{RiskEngine, RunControl, RunOutput},
    snapshot::EventSnapshot,
    stats::SignificanceOutcome,
    store::EventStore,
    synthetic::{self, SyntheticSpec},
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("generate") => generate(&args),
        Some("assess") => assess(&args),
        other => {
            log::warn!("Unknown command: {:?}", other);
            eprintln!("usage: risk-runner <generate|assess> [options]");
            bail!("missing or unknown command");
        }
    }
}

fn generate(args: &[String]) -> Result<()> {
    let seed = parse_arg(args, "--seed", 42u64)?;
    let accounts = parse_arg(args, "--accounts", 500usize)?;
    let db = string_arg(args, "--db").context("generate requires --db <path>")?;
    let end = as_of_arg(args)?.unwrap_or_else(Utc::now);

    let snapshot = synthetic::generate(seed, &SyntheticSpec::new(accounts, end));
    let mut store = EventStore::open(db)?;
    store.migrate()?;
    store.write_snapshot(&snapshot)?;

    println!("Synthetic telemetry written");
    println!("  seed:      {seed}");
    println!("  accounts:  {}", snapshot.account_count());
    println!("  logins:    {}", snapshot.login_count());
    println!("  compute:   {}", snapshot.compute_count());
    println!("  payments:  {}", snapshot.payment_count());
    println!("  db:        {db}");
    Ok(())
}

fn assess(args: &[String]) -> Result<()> {
    let config = match string_arg(args, "--config") {
        Some(path) => {
            log::info!("loading config from {path}");
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };

    let snapshot: EventSnapshot = match string_arg(args, "--db") {
        Some(db) => EventStore::open(db)?.load_snapshot()?,
        None => {
            let seed = parse_arg(args, "--seed", 42u64)?;
            let accounts = parse_arg(args, "--accounts", 500usize)?;
            let end = as_of_arg(args)?.unwrap_or_else(Utc::now);
            synthetic::generate(seed, &SyntheticSpec::new(accounts, end))
        }
    };

    let as_of = match as_of_arg(args)? {
        Some(ts) => ts,
        None => snapshot
            .latest_login_time()
            .context("snapshot has no logins; pass --as-of")?,
    };

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let engine = RiskEngine::new(config)?;
    let output = engine.run(run_id, &snapshot, as_of, &RunControl::new())?;

    print_summary(&output);

    if let Some(path) = string_arg(args, "--out") {
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {path}"))?;
        println!("  output:         {path}");
    }
    Ok(())
}

fn print_summary(output: &RunOutput) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", output.run_id);
    println!("  as_of:          {}", output.as_of);
    println!("  accounts:       {}", output.reports.len());
    println!("  detections:     {}", output.detections.len());
    println!("  outliers:       {}", output.outlier_count);
    println!("  flagged:        {}", output.flagged_count);

    println!();
    println!("=== TOP ACCOUNTS BY COMPOSITE ===");
    let mut ranked: Vec<_> = output.reports.values().collect();
    ranked.sort_by(|a, b| {
        b.signals
            .composite
            .total_cmp(&a.signals.composite)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });
    for r in ranked.iter().take(10) {
        println!(
            "  {} | composite {:.3} | fail {:.2} | new-country {:.2} | tor {} | detections {}",
            r.account_id,
            r.signals.composite,
            r.signals.failed_login_rate,
            r.signals.new_country_rate,
            r.signals.tor_login_count,
            r.detections.len()
        );
    }

    println!();
    println!("=== PAYMENT OUTCOMES: FLAGGED VS BASELINE ===");
    match &output.significance {
        Some(SignificanceOutcome::Tested(s)) => {
            println!(
                "  flagged {:.2}% (n={}) | unflagged {:.2}% (n={})",
                s.flagged_rate * 100.0,
                s.flagged_n,
                s.unflagged_rate * 100.0,
                s.unflagged_n
            );
            println!(
                "  {:?}: statistic={:.3} p={:.4} significant={}",
                s.method, s.statistic, s.p_value, s.significant
            );
        }
        Some(SignificanceOutcome::InsufficientData { reason, .. }) => {
            println!("  insufficient data: {reason}");
        }
        None => println!("  validation unavailable: {:?}", output.validation_status),
    }

    if let Some(p) = &output.proxy_precision {
        println!(
            "  proxy precision: findings {:.2} | payments {:.2}",
            p.finding_precision, p.payment_precision
        );
    }
}

/// Absent flag gives `default`; a value that does not parse is an error.
fn parse_arg<T>(args: &[String], flag: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match string_arg(args, flag) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{flag} got '{raw}': {e}")),
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn as_of_arg(args: &[String]) -> Result<Option<DateTime<Utc>>> {
    string_arg(args, "--as-of")
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .with_context(|| format!("--as-of must be RFC 3339, got '{raw}'"))
        })
        .transpose()
}
