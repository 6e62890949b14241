//! Echo Autonomy - Entry Point
//!
//! Runs the cognitive scheduler until Ctrl+C, then flushes state and exits.
//! - --json: log to stderr as JSON
//! - --goal <text>: register a goal before the loop starts (repeatable)

use echo_autonomy::llm::{OfflineGenerator, OllamaGenerator, TextGenerator};
use echo_autonomy::scheduler::EventKind;
use echo_autonomy::{CognitiveScheduler, Config, Goal, SqliteStore};
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let json_mode = args.iter().any(|a| a == "--json");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let goals: Vec<String> = args
        .windows(2)
        .filter(|w| w[0] == "--goal" || w[0] == "-g")
        .map(|w| w[1].clone())
        .collect();

    if help_mode {
        println!("Echo Autonomy v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: echo-autonomy [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --goal, -g <TEXT>  Add a goal before starting (repeatable)");
        println!("  --json             Log to stderr as JSON");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  ECHO_DB_PATH              State database (default: <data dir>/echo-autonomy/state.db)");
        println!("  ECHO_TICK_INTERVAL_MS     Tick cadence (default: 2000)");
        println!("  ECHO_PERSIST_EVERY        Energy snapshot every N ticks (default: 5)");
        println!("  ECHO_DREAM_EVERY          Dream cadence while resting (default: 3)");
        println!("  ECHO_ACTIVITY_BATCH       Records per dream (default: 10)");
        println!("  ECHO_PURSUIT_BUDGET_SECS  Goal pursuit budget per tick (default: 10)");
        println!("  ECHO_LLM_TIMEOUT_SECS     Generation timeout (default: 30)");
        println!("  OLLAMA_URL                Ollama server (unset: offline placeholders)");
        println!("  LLAMA_MODEL               Model name (default: llama3.2:3b)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_mode {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Echo Autonomy v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let generator: Arc<dyn TextGenerator> = match config.ollama() {
        Some(ollama) => {
            let generator = OllamaGenerator::new(ollama)?;
            if !generator.is_available().await {
                warn!("Ollama not reachable yet; thoughts will degrade to placeholders until it is");
            }
            Arc::new(generator)
        }
        None => {
            info!("OLLAMA_URL not set, running with offline generator");
            Arc::new(OfflineGenerator)
        }
    };

    let mut scheduler = CognitiveScheduler::new(config.scheduler.clone(), store, generator);
    scheduler.start().await?;
    for description in goals {
        scheduler.add_goal(Goal::new(&description, 0.8));
    }

    // Observer: mirror events into the log
    let mut events = BroadcastStream::new(scheduler.subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) if event.kind == EventKind::Thought => {
                    info!(
                        "[{}] {}",
                        event.payload["category"].as_str().unwrap_or_default(),
                        event.payload["content"].as_str().unwrap_or_default()
                    );
                }
                Ok(event) if event.kind == EventKind::Consolidation => {
                    info!("Dream: {}", event.payload);
                }
                Ok(event) => debug!("{}: {}", event.kind.as_str(), event.payload),
                Err(e) => debug!("Event stream lagged: {}", e),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Hold the sender so the loop keeps running until the process is killed
                warn!("Cannot listen for Ctrl+C: {}", e);
                let _keep = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    scheduler.run(shutdown_rx).await?;

    let stats = scheduler.stats();
    info!(
        "Stopped after {} ticks: {} thoughts, {} dreams, {} goal sessions",
        stats.tick, stats.thoughts, stats.dreams, stats.orchestrator.total_sessions
    );

    Ok(())
}
