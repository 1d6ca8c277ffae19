use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use flasher_core::ingest::{clear_and_release, open_persistent, shared_register, MessageQueue};
use flasher_core::{
    AcquirePolicy, ChannelQueue, ConfigManager, EventSource, FileSource, HttpConnector,
    IngestionLoop, IngestionManager, LoopOptions, PinController, PulseTiming, QueueMessage,
    QueueSource, RegisterDriver, Settings, SimulatedBoard, SourceKind, StdDelay, StreamSource,
};
use serde::Deserialize;

/// Drives an LED matrix shift register from XML light show documents.
#[derive(Parser, Debug)]
#[command(name = "pattern-flasher")]
#[command(about = "Pattern flasher for 74HC595 LED matrices")]
struct Args {
    /// Path to the config file (default: flasher.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to read show documents from
    #[arg(short, long)]
    source: Option<SourceKind>,

    /// Show file to play with the file source
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Base URL of the web controller for the stream source
    #[arg(long)]
    url: Option<String>,

    /// Drive a simulated board instead of the GPIO header
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// One line of the stdin bridge for the queue source.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
    body: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = ConfigManager::new(args.config.clone());
    let mut settings = config.load().context("failed to load configuration")?;
    apply_overrides(&mut settings, &args);
    ConfigManager::validate_settings(&settings)
        .map_err(|errors| anyhow::anyhow!("invalid configuration: {}", errors.join(", ")))?;

    log::info!("Pattern flasher starting with the {} source", settings.source);

    if settings.dry_run {
        log::info!("Dry run, driving a simulated board");
        let board = SimulatedBoard::without_history(settings.pins.clone());
        return run(settings, board.pins()).await;
    }

    run_hardware(settings).await
}

#[cfg(feature = "rpi")]
async fn run_hardware(settings: Settings) -> anyhow::Result<()> {
    let pins = flasher_core::register::RppalController::new()
        .context("failed to access the GPIO controller")?;
    run(settings, pins).await
}

#[cfg(not(feature = "rpi"))]
async fn run_hardware(_settings: Settings) -> anyhow::Result<()> {
    anyhow::bail!("built without GPIO support; rebuild with --features rpi or pass --dry-run")
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(source) = args.source {
        settings.source = source;
    }
    if let Some(file) = &args.file {
        settings.show_file = file.display().to_string();
        if args.source.is_none() {
            settings.source = SourceKind::File;
        }
    }
    if let Some(url) = &args.url {
        settings.controller_url = url.clone();
    }
    if args.dry_run {
        settings.dry_run = true;
    }
}

async fn run<P>(settings: Settings, pins: P) -> anyhow::Result<()>
where
    P: PinController + 'static,
{
    let timing = PulseTiming::new(settings.pulse_unit())?;
    let driver = RegisterDriver::new(pins, StdDelay, settings.pins.clone(), timing);
    let register = shared_register(driver);

    let policy = match settings.source {
        SourceKind::Queue => AcquirePolicy::Persistent,
        SourceKind::File | SourceKind::Stream => AcquirePolicy::PerDocument,
    };
    let options = LoopOptions {
        policy,
        relevance_key: settings.relevance_key.clone(),
        retry_interval: settings.retry_interval(),
    };

    if policy == AcquirePolicy::Persistent {
        open_persistent(&register).context("failed to set up the register")?;
    }

    let mut manager = IngestionManager::new();
    for source in build_sources(&settings).await? {
        manager.register_unit(IngestionLoop::new(
            source,
            Arc::clone(&register),
            options.clone(),
        ));
    }
    manager.start()?;

    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Exiting... please wait ...");
            cancel.cancel();
        }
    });

    let results = manager.wait().await;
    for (id, stats) in &results {
        log::info!(
            "{}: {} document(s), {} show(s), {} write(s), {} parse failure(s), {} source failure(s)",
            id,
            stats.documents,
            stats.shows_run,
            stats.register_writes,
            stats.parse_failures,
            stats.source_failures
        );
    }

    tokio::task::spawn_blocking(move || clear_and_release(&register))
        .await?
        .context("failed to clear the register on exit")?;

    log::info!("Pattern flasher stopped");
    Ok(())
}

async fn build_sources(settings: &Settings) -> anyhow::Result<Vec<Box<dyn EventSource>>> {
    let sources: Vec<Box<dyn EventSource>> = match settings.source {
        SourceKind::File => vec![Box::new(FileSource::new(&settings.show_file))],
        SourceKind::Stream => {
            let connector =
                HttpConnector::from_base(&settings.controller_url, &settings.events_path)?;
            log::info!("Reading controller events from {}", connector.url());
            vec![Box::new(StreamSource::new(connector))]
        }
        SourceKind::Queue => {
            let partitions: Vec<&str> =
                settings.queue_partitions.iter().map(String::as_str).collect();
            let queue = Arc::new(ChannelQueue::new(&partitions, Duration::from_secs(1)));
            spawn_stdin_bridge(Arc::clone(&queue), settings.queue_partitions.clone());

            let queue: Arc<dyn MessageQueue> = queue;
            QueueSource::for_all_partitions(queue)
                .await?
                .into_iter()
                .map(|source| Box::new(source) as Box<dyn EventSource>)
                .collect()
        }
    };
    Ok(sources)
}

/// Publish JSON envelopes read from stdin, one per line, round robin across partitions.
/// The queue closes when stdin does.
///
/// Runs on a plain thread so a pending stdin read never holds up runtime shutdown.
fn spawn_stdin_bridge(queue: Arc<ChannelQueue>, partitions: Vec<String>) {
    std::thread::spawn(move || {
        let mut next = 0;

        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    log::warn!("Skipping malformed queue envelope: {}", e);
                    continue;
                }
            };

            let message = QueueMessage {
                properties: envelope.properties,
                body: envelope.body.to_string().into_bytes(),
            };
            let partition = &partitions[next % partitions.len()];
            next += 1;

            if let Some(publisher) = queue.publisher(partition) {
                if publisher.blocking_send(message).is_err() {
                    break;
                }
            }
        }

        log::info!("Queue input closed");
        queue.close();
    });
}
