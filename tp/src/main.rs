//! Taskpacer - rate-limited priority task scheduler
//!
//! CLI entry point for driving the scheduler with synthetic workloads.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use taskpacer::cli::{BucketArgs, Cli, Command, get_log_path};
use taskpacer::config::Config;
use taskpacer::events::{EventLogEntry, SchedulerEvent};
use taskpacer::poll::{self, PollEvent, PollOptions, PollStatus};
use taskpacer::scheduler::{Scheduler, Task, TaskClass};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.parse::<tracing::Level>() {
            Ok(level) => level,
            Err(_) => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Burst {
            priority,
            regular,
            bucket,
            json,
        } => cmd_burst(&config, priority, regular, &bucket, json).await,
        Command::Poll {
            ready_after,
            backoff_ms,
            factor,
            expires_in_ms,
            bucket,
        } => cmd_poll(&config, ready_after, backoff_ms, factor, expires_in_ms, &bucket).await,
        Command::Config => cmd_config(&config),
    }
}

fn class_label(class: TaskClass) -> ColoredString {
    match class {
        TaskClass::Priority => "priority".magenta(),
        TaskClass::Regular => "regular".cyan(),
    }
}

async fn cmd_burst(config: &Config, priority: u32, regular: u32, bucket: &BucketArgs, json: bool) -> Result<()> {
    debug!(priority, regular, json, "cmd_burst: called");
    let mut scheduler_config = config.scheduler.clone();
    bucket.apply(&mut scheduler_config);

    let (scheduler, join) = Scheduler::spawn(scheduler_config.clone()).context("Failed to start scheduler")?;
    let mut events = scheduler.subscribe();

    for i in 1..=priority {
        scheduler.submit_priority(Task::new(format!("p{}", i), || Ok(())), Duration::ZERO)?;
    }
    for i in 1..=regular {
        scheduler.submit(Task::new(format!("r{}", i), || Ok(())), Duration::ZERO)?;
    }

    if !json {
        println!(
            "{} {} priority, {} regular (capacity {}, {}ms per token)",
            "Burst:".bold(),
            priority,
            regular,
            scheduler_config.capacity,
            scheduler_config.refill_interval_ms
        );
    }

    let total = priority + regular;
    let started_at = Instant::now();
    let mut started = 0;
    while started < total {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "cmd_burst: event subscriber lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if json {
            println!("{}", serde_json::to_string(&EventLogEntry::new(event.clone()))?);
        }
        if let SchedulerEvent::TaskStarted {
            label,
            class,
            tokens_before,
            ..
        } = event
        {
            started += 1;
            if !json {
                println!(
                    "{:>4}  {:<6} {:<8}  tokens {:>5.2}  {}",
                    started,
                    label,
                    class_label(class),
                    tokens_before,
                    format!("+{}ms", started_at.elapsed().as_millis()).dimmed()
                );
            }
        }
    }

    let state = scheduler.queue_state().await?;
    if !json {
        println!(
            "{} executed {}, failed {}, empty turns {}, peak depth {}",
            "✓".green(),
            state.stats.total_executed,
            state.stats.total_failed,
            state.stats.total_empty_turns,
            state.stats.peak_queue_depth
        );
    }

    scheduler.shutdown()?;
    join.await.context("Scheduler task panicked")?;
    Ok(())
}

async fn cmd_poll(
    config: &Config,
    ready_after: u32,
    backoff_ms: Option<u64>,
    factor: Option<f64>,
    expires_in_ms: Option<u64>,
    bucket: &BucketArgs,
) -> Result<()> {
    debug!(ready_after, ?backoff_ms, ?factor, ?expires_in_ms, "cmd_poll: called");
    let mut scheduler_config = config.scheduler.clone();
    bucket.apply(&mut scheduler_config);

    let mut polling = config.polling.clone();
    if backoff_ms.is_some() || factor.is_some() {
        let mut backoff = polling.backoff.unwrap_or_default();
        if let Some(ms) = backoff_ms {
            backoff.initial_ms = ms;
        }
        if let Some(factor) = factor {
            backoff.factor = factor;
        }
        polling.backoff = Some(backoff);
    }
    let mut options = PollOptions::from(&polling);
    if let Some(ms) = expires_in_ms {
        options = options.with_expiry(chrono::Utc::now() + chrono::Duration::milliseconds(ms as i64));
    }

    let (scheduler, join) = Scheduler::spawn(scheduler_config).context("Failed to start scheduler")?;

    let checks = Arc::new(AtomicU32::new(0));
    let mut subscription = poll::poll(&scheduler, "synthetic", options, move || {
        let checks = checks.clone();
        async move {
            let seen = checks.fetch_add(1, Ordering::SeqCst) + 1;
            if seen > ready_after {
                Ok(PollStatus::Ready(seen))
            } else {
                Ok(PollStatus::Pending(seen))
            }
        }
    })?;

    let started_at = Instant::now();
    let mut last = None;
    while let Some(event) = subscription.next_event().await {
        let elapsed = format!("+{}ms", started_at.elapsed().as_millis()).dimmed();
        match &event {
            PollEvent::Polling { attempt } => println!("{:>4}  {}  {}", attempt, "polling".dimmed(), elapsed),
            PollEvent::Pending { attempt, value } => {
                println!("{:>4}  {}  checks={}  {}", attempt, "pending".yellow(), value, elapsed)
            }
            PollEvent::Ready { attempt, value } => {
                println!("{:>4}  {}  checks={}  {}", attempt, "ready".green(), value, elapsed)
            }
            PollEvent::Expired { attempt, value } => {
                println!("{:>4}  {}  checks={}  {}", attempt, "expired".red(), value, elapsed)
            }
            PollEvent::Failed { attempt, error } => {
                println!("{:>4}  {}  {}  {}", attempt, "failed".red(), error, elapsed)
            }
        }
        last = Some(event);
    }

    scheduler.shutdown()?;
    join.await.context("Scheduler task panicked")?;

    match last {
        Some(PollEvent::Ready { attempt, .. }) => {
            println!("{} ready after {} checks", "✓".green(), attempt);
            Ok(())
        }
        Some(PollEvent::Expired { attempt, .. }) => Err(eyre::eyre!("Poll expired after {} checks", attempt)),
        Some(PollEvent::Failed { error, .. }) => Err(eyre::eyre!("Poll failed: {}", error)),
        _ => Err(eyre::eyre!("Poll stopped without a result")),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    config.validate()?;
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}
