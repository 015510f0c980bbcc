//! Stress command - many concurrent sessions renewed against one store.
//!
//! Each worker owns one session and renews it `rounds` times, spacing the
//! renewals at staggered fractions of the TTL so some land just before the
//! deadline. Every successful update must be readable right away. After the
//! last renewal the store must drain to zero sessions and zero watchers
//! within the documented lifetime bound.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use lapse_session::{Error, SessionStore, SessionValues, StoreStats};
use serde::Serialize;
use tokio::time::{Instant, sleep};

use super::{Context, millis};

/// Arguments for the stress command.
#[derive(Args, Debug)]
pub struct StressArgs {
    /// Number of concurrent sessions
    #[arg(long, default_value_t = 100)]
    pub sessions: usize,

    /// Renewals per session
    #[arg(long, default_value_t = 10)]
    pub rounds: u32,
}

/// Per-worker tallies.
#[derive(Debug, Default)]
struct WorkerTally {
    updated: u64,
    lost: u64,
}

/// Summary of a stress run.
#[derive(Debug, Serialize)]
struct StressReport {
    sessions: usize,
    rounds: u32,
    ttl_ms: u64,
    updates_applied: u64,
    updates_after_expiry: u64,
    running: StoreStats,
    drained: StoreStats,
    elapsed_ms: u64,
}

/// Delay before renewal `round` of worker `worker`, between 0.5 and ~1.0 ttl.
fn renewal_delay(ttl: Duration, worker: usize, round: u32) -> Duration {
    let spread = ((worker as u64 * 7 + round as u64 * 13) % 50) as f64 / 100.0;
    ttl.mul_f64(0.5 + spread)
}

/// Run the stress command.
pub async fn run(args: StressArgs, ctx: &Context) -> Result<()> {
    let store = SessionStore::new(ctx.config.clone());
    let ttl = store.ttl();
    let started = Instant::now();

    let mut handles = Vec::with_capacity(args.sessions);
    for worker in 0..args.sessions {
        let store = store.clone();
        let rounds = args.rounds;
        let handle = tokio::spawn(async move {
            let id = store.create()?;
            let mut tally = WorkerTally::default();

            for round in 0..rounds {
                sleep(renewal_delay(ttl, worker, round)).await;

                let mut data = SessionValues::new();
                data.insert("worker".to_string(), worker.into());
                data.insert("round".to_string(), round.into());

                match store.update(&id, data.clone()) {
                    Ok(()) => {
                        if store.get(&id)? != data {
                            bail!("session {id} lost update {round}");
                        }
                        tally.updated += 1;
                    }
                    Err(Error::NotFound(_)) => {
                        tally.lost += 1;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Ok::<_, anyhow::Error>(tally)
        });
        handles.push(handle);
    }

    // Sample once every worker has created its session.
    sleep(ttl / 4).await;
    let running = store.stats();
    tracing::debug!(sessions = running.sessions, watchers = running.watchers, "Workers running");

    let mut updates_applied = 0;
    let mut updates_after_expiry = 0;
    for handle in handles {
        let tally = handle.await??;
        updates_applied += tally.updated;
        updates_after_expiry += tally.lost;
    }

    sleep(store.config().max_lifetime()).await;
    let drained = store.stats();

    let report = StressReport {
        sessions: args.sessions,
        rounds: args.rounds,
        ttl_ms: millis(ttl),
        updates_applied,
        updates_after_expiry,
        running,
        drained,
        elapsed_ms: millis(started.elapsed()),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if drained.sessions != 0 || drained.watchers != 0 {
        bail!(
            "store did not drain: {} sessions and {} watchers left",
            drained.sessions,
            drained.watchers
        );
    }

    Ok(())
}

fn print_report(report: &StressReport) {
    let dim = Style::new().dim();
    let green = Style::new().green();

    println!();
    println!("{}", Style::new().bold().apply_to("Stress run"));
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Sessions:"), report.sessions);
    println!("  {} {}", dim.apply_to("Rounds:"), report.rounds);
    println!("  {} {}ms", dim.apply_to("TTL:"), report.ttl_ms);
    println!("  {} {}", dim.apply_to("Updates:"), report.updates_applied);
    println!(
        "  {} {}",
        dim.apply_to("Too late:"),
        report.updates_after_expiry
    );
    println!(
        "  {} {} sessions, {} watchers",
        dim.apply_to("Running:"),
        report.running.sessions,
        report.running.watchers
    );
    println!(
        "  {} {}",
        dim.apply_to("Drained:"),
        green.apply_to(format!(
            "{} sessions, {} watchers",
            report.drained.sessions, report.drained.watchers
        ))
    );
    println!("  {} {}ms", dim.apply_to("Elapsed:"), report.elapsed_ms);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_delay_within_ttl() {
        let ttl = Duration::from_secs(1);
        for worker in 0..20 {
            for round in 0..20 {
                let delay = renewal_delay(ttl, worker, round);
                assert!(delay >= ttl / 2);
                assert!(delay < ttl);
            }
        }
    }
}
