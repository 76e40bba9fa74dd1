use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;
use trendbot::execution::{run_session, FeedEvent, SessionSnapshot, SharedSession, TradingSession};
use trendbot::feed::{load_ticks, MarketScenario, SyntheticFeed};
use trendbot::persistence::SnapshotStore;
use trendbot::Settings;

const COMMIT_POLL_MS: u64 = 250;

#[derive(Parser, Debug)]
#[command(name = "trendbot", about = "Trend-following single-position trading engine")]
struct Cli {
    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine live against a synthetic price feed
    Simulate {
        #[arg(long, value_enum, default_value = "volatile")]
        scenario: MarketScenario,
        /// Number of ticks to emit
        #[arg(long, default_value_t = 600)]
        ticks: usize,
        /// Milliseconds between ticks
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Ignore any saved snapshot and start empty
        #[arg(long)]
        fresh: bool,
    },
    /// Replay historic ticks from a JSON file, committing on tick time
    Replay {
        file: PathBuf,
        /// Where to write the final snapshot
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print ledger statistics from a saved snapshot
    Report {
        /// Snapshot file (defaults to the configured snapshot path)
        snapshot: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    setup_logging(&settings.log_level);

    match cli.command {
        Command::Simulate {
            scenario,
            ticks,
            interval_ms,
            seed,
            fresh,
        } => simulate(settings, scenario, ticks, interval_ms, seed, fresh).await,
        Command::Replay { file, output } => replay(settings, file, output).await,
        Command::Report { snapshot } => {
            let path = snapshot.unwrap_or(settings.snapshot_path);
            report(path).await
        }
    }
}

fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn simulate(
    settings: Settings,
    scenario: MarketScenario,
    ticks: usize,
    interval_ms: u64,
    seed: u64,
    fresh: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(SnapshotStore::new(settings.snapshot_path.clone()));

    let session = if fresh {
        TradingSession::new(settings.engine.clone())
    } else {
        match store.load().await {
            Ok(Some(snapshot)) => TradingSession::restore(settings.engine.clone(), snapshot),
            Ok(None) => TradingSession::new(settings.engine.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load snapshot, starting empty");
                TradingSession::new(settings.engine.clone())
            }
        }
    };
    let session: SharedSession = Arc::new(Mutex::new(session));

    tracing::info!(
        ?scenario,
        ticks,
        interval_ms,
        investment = %settings.engine.investment_amount,
        open_windows = ?settings.engine.trend.open_windows_secs,
        close_windows = ?settings.engine.trend.close_windows_secs,
        "Starting simulation"
    );

    let (tx, rx) = mpsc::channel(256);

    let runner_task = tokio::spawn(run_session(
        session.clone(),
        rx,
        Duration::from_millis(COMMIT_POLL_MS),
    ));

    let snapshot_task = {
        let session = session.clone();
        let store = store.clone();
        let every = Duration::from_secs(settings.snapshot_interval_secs.max(1));
        tokio::spawn(async move {
            let mut timer = interval(every);
            loop {
                timer.tick().await;
                let snapshot = take_snapshot(&session);
                if let Err(e) = store.save(&snapshot).await {
                    tracing::warn!(error = %e, "Failed to save snapshot");
                }
            }
        })
    };

    let feed_task = tokio::spawn(async move {
        let mut feed = SyntheticFeed::new(
            seed,
            scenario,
            Utc::now(),
            chrono::Duration::milliseconds(interval_ms as i64),
        );
        let mut timer = interval(Duration::from_millis(interval_ms));

        for _ in 0..ticks {
            timer.tick().await;
            let mut tick = feed.next_tick();
            tick.timestamp = Utc::now();
            if tx.send(FeedEvent::Tick(tick)).await.is_err() {
                break;
            }
        }
    });

    let feed_abort = feed_task.abort_handle();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            feed_abort.abort();
        }
        result = feed_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Feed task failed");
            }
        }
    }

    // Feed sender is gone, so the runner drains and exits
    if let Err(e) = runner_task.await {
        tracing::error!(error = %e, "Session runner failed");
    }
    snapshot_task.abort();

    let snapshot = take_snapshot(&session);
    store.save(&snapshot).await?;
    print_report(&snapshot);

    Ok(())
}

fn take_snapshot(session: &SharedSession) -> SessionSnapshot {
    session
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .snapshot()
}

async fn replay(settings: Settings, file: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let ticks = load_ticks(&file)
        .await
        .with_context(|| format!("loading ticks from {}", file.display()))?;

    let mut session = TradingSession::new(settings.engine);
    let mut commits = 0usize;

    for tick in ticks {
        if session.on_tick(tick).committed.is_some() {
            commits += 1;
        }
    }

    tracing::info!(commits, "Replay finished");

    let snapshot = session.snapshot();
    if let Some(output) = output {
        SnapshotStore::new(output).save(&snapshot).await?;
    }
    print_report(&snapshot);

    Ok(())
}

async fn report(path: PathBuf) -> anyhow::Result<()> {
    let snapshot = SnapshotStore::new(&path)
        .load()
        .await?
        .with_context(|| format!("no snapshot at {}", path.display()))?;

    print_report(&snapshot);
    Ok(())
}

fn print_report(snapshot: &SessionSnapshot) {
    let summary = snapshot.ledger.summary();

    println!("\n═══════════════════════════════════════════════════════");
    println!("                    SESSION REPORT");
    println!("═══════════════════════════════════════════════════════\n");

    println!("  Ticks in history:   {}", snapshot.history.len());
    println!("  Closed trades:      {}", summary.trades);
    println!("  Winners / Losers:   {} / {}", summary.winners, summary.losers);
    if let Some(win_rate) = summary.win_rate_pct() {
        println!("  Win rate:           {:.1}%", win_rate);
    }
    println!("  Total profit:       ${:.4}", summary.total_profit);
    if let (Some(best), Some(worst)) = (summary.best_trade, summary.worst_trade) {
        println!("  Best / Worst trade: ${:.4} / ${:.4}", best, worst);
    }
    if let Some(avg) = summary.average_duration_secs {
        println!("  Avg duration:       {}s", avg);
    }

    match (&snapshot.position, snapshot.history.last()) {
        (Some(position), Some(latest)) => {
            println!("\n  Open position:");
            println!("    Quantity:         {:.6}", position.quantity);
            println!("    Avg open price:   ${:.4}", position.avg_open_price);
            println!(
                "    Best / Worst:     ${:.4} / ${:.4}",
                position.best_price, position.worst_price
            );
            println!(
                "    Unrealized:       ${:.4} @ ${:.4}",
                position.unrealized_profit(latest.price),
                latest.price
            );
            println!("    Open for:         {}s", position.duration(Utc::now()));
        }
        (Some(position), None) => {
            println!("\n  Open position: {:.6} @ ${:.4}", position.quantity, position.avg_open_price);
        }
        (None, _) => println!("\n  No open position"),
    }
    println!();
}
