//! Demo command - one session from creation to expiry.
//!
//! Timeline, relative to the configured TTL:
//! - `0`: create the session
//! - `0.6 ttl`: store `{"website": "longhoang.de"}`, renewing the deadline
//! - `1.2 ttl`: read it back, past the original deadline
//! - `0.6 ttl + max lifetime`: read again and expect the session to be gone

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use lapse_session::{Error, SessionStore, SessionValues};
use serde::Serialize;
use tokio::time::{Instant, sleep};

use super::{Context, millis};

/// Fraction of the TTL to wait before each renewal and read.
const STEP_FRACTION: f64 = 0.6;

/// Arguments for the demo command.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Key to store in the session
    #[arg(long, default_value = "website")]
    pub key: String,

    /// Value to store under the key
    #[arg(long, default_value = "longhoang.de")]
    pub value: String,
}

/// One timeline entry for JSON output.
#[derive(Debug, Serialize)]
struct Step {
    at_ms: u64,
    action: &'static str,
    detail: String,
}

struct Timeline {
    started: Instant,
    steps: Vec<Step>,
    json: bool,
}

impl Timeline {
    fn new(json: bool) -> Self {
        Self {
            started: Instant::now(),
            steps: Vec::new(),
            json,
        }
    }

    fn record(&mut self, action: &'static str, detail: impl Into<String>) {
        let step = Step {
            at_ms: millis(self.started.elapsed()),
            action,
            detail: detail.into(),
        };

        if !self.json {
            let dim = Style::new().dim();
            let bold = Style::new().bold();
            println!(
                "  {} {:<8} {}",
                dim.apply_to(format!("{:>7}ms", step.at_ms)),
                bold.apply_to(step.action),
                step.detail
            );
        }

        self.steps.push(step);
    }
}

/// Run the demo command.
pub async fn run(args: DemoArgs, ctx: &Context) -> Result<()> {
    let store = SessionStore::new(ctx.config.clone());
    let ttl = store.ttl();
    let step = ttl.mul_f64(STEP_FRACTION);

    let mut timeline = Timeline::new(ctx.json_output);
    if !ctx.json_output {
        println!();
        println!(
            "{}",
            Style::new()
                .bold()
                .apply_to(format!("Session lifecycle (ttl {})", format_duration(ttl)))
        );
        println!();
    }

    let id = store.create()?;
    timeline.record("create", id.clone());

    sleep(step).await;
    let mut data = SessionValues::new();
    data.insert(args.key.clone(), serde_json::Value::String(args.value.clone()));
    store.update(&id, data.clone())?;
    timeline.record("update", format!("{} = {}", args.key, args.value));

    sleep(step).await;
    let read = store.get(&id)?;
    if read != data {
        bail!("session {id} returned unexpected data: {read:?}");
    }
    timeline.record("get", serde_json::to_string(&read)?);

    // Wait out the renewed deadline plus the documented slack.
    sleep(store.config().max_lifetime().saturating_sub(step)).await;
    match store.get(&id) {
        Err(Error::NotFound(_)) => timeline.record("get", "session not found (expired)"),
        Ok(_) => bail!(
            "session {id} still present {} after its last update",
            format_duration(store.config().max_lifetime())
        ),
        Err(e) => return Err(e.into()),
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&timeline.steps)?);
    } else {
        println!();
        if ctx.verbose {
            let stats = store.stats();
            println!(
                "  {} {} sessions, {} watchers",
                Style::new().dim().apply_to("Final:"),
                stats.sessions,
                stats.watchers
            );
            println!();
        }
    }

    Ok(())
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
    }
}
