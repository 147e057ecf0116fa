//! uns-monitor - Unified Namespace tag monitor
//!
//! Watches tag updates and database snapshots on an MQTT broker, and publishes
//! single tag updates.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uns_monitor::config::AppConfig;
use uns_monitor::mqtt::{self, pump::incoming_publish, MqttTransport, TagPublisher};
use uns_monitor::render;
use uns_monitor::state::{
    IngestEvent, Ingested, TagActor, TagError, TagPath, TagStateStore, TagValue,
    UpdateClassification, SNAPSHOT_TOPIC,
};

/// How long `publish` waits for the broker to acknowledge
const PUBLISH_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Unified Namespace tag monitor and publisher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "uns-monitor.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// MQTT broker host, overrides the config file
    #[arg(long, env = "MQTT_HOST")]
    host: Option<String>,

    /// MQTT broker port, overrides the config file
    #[arg(long, env = "MQTT_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print tag changes as they arrive
    Monitor {
        /// Only follow this tag path
        #[arg(long)]
        tag: Option<TagPath>,

        /// Print the full tag listing every N seconds
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Publish a single tag update
    Publish {
        /// Tag path, e.g. US/TX/AUSTIN/AREA1/LINE1/MACHINE1/PUMP1/PRESSURE
        path: TagPath,

        /// New value, published as text
        value: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Also republish `tags/database` with this update merged in
        #[arg(long)]
        sync_database: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting uns-monitor...");
    info!("Configuration file: {}", args.config);

    let mut config = AppConfig::load_or_default(&args.config).await?;
    if let Some(host) = args.host {
        config.mqtt.host = host;
    }
    if let Some(port) = args.port {
        config.mqtt.port = port;
    }
    config.validate()?;

    match args.command {
        Command::Monitor { tag, interval } => run_monitor(config, tag, interval).await?,
        Command::Publish {
            path,
            value,
            name,
            description,
            sync_database,
        } => {
            run_publish(
                &config,
                path,
                TagValue::from_text(value),
                name,
                description,
                sync_database,
            )
            .await?
        }
    }

    info!("uns-monitor shutdown complete");
    Ok(())
}

async fn run_monitor(
    config: AppConfig,
    tag: Option<TagPath>,
    interval: Option<u64>,
) -> Result<()> {
    let store = TagStateStore::new();
    let (handle, mut events) = TagActor::spawn(store.clone(), config.monitor.queue_capacity);

    let filters = match &tag {
        Some(path) => {
            info!("Monitoring tag {}", path);
            vec![path.to_topic(), SNAPSHOT_TOPIC.to_string()]
        }
        None => vec![config.mqtt.topic_filter.clone()],
    };

    let (client, eventloop) = mqtt::connect(&config.mqtt, &config.mqtt.client_id);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let stopped = async move {
        let _ = stop_rx.await;
    };
    let pump_task = tokio::spawn(mqtt::pump(client, eventloop, filters, handle.clone(), stopped));

    let mut ticker = interval
        .or(config.monitor.list_interval_secs)
        .map(|secs| {
            let period = Duration::from_secs(secs.max(1));
            tokio::time::interval_at(Instant::now() + period, period)
        });

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Monitoring started. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event, tag.as_ref(), &store),
                None => {
                    warn!("Tag actor stopped");
                    break;
                }
            },
            _ = next_tick(&mut ticker) => {
                // Read the shared store directly, the actor may be waiting on us to drain events
                println!("{}", render::format_listing(&store.list()));
            }
            _ = &mut shutdown => break,
        }
    }

    // Nobody drains events from here on, so let the actor's sends fail fast
    drop(events);
    let _ = stop_tx.send(());
    match pump_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("MQTT event loop failed: {}", e),
        Err(e) => warn!("MQTT event loop task panicked: {}", e),
    }
    if handle.is_alive() {
        handle.shutdown().await;
    }

    info!("Monitored {} tags", store.len());
    Ok(())
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn print_event(event: &IngestEvent, watched: Option<&TagPath>, store: &TagStateStore) {
    if let Ok(Ingested::Update {
        path,
        classification: UpdateClassification::Unchanged,
        value,
    }) = &event.outcome
    {
        debug!(%path, %value, "UNCHANGED");
        return;
    }

    let Some(watched) = watched else {
        if let Some(line) = render::format_event(event) {
            println!("{}", line);
        }
        return;
    };

    if !render::concerns(event, watched) {
        return;
    }

    match &event.outcome {
        Ok(Ingested::Snapshot(_)) | Err(TagError::MalformedSnapshot { .. }) => {
            if let Ok(record) = store.get(watched) {
                println!("{}", render::format_watched(&record, &event.received_at, true));
            }
        }
        _ => {
            if let Some(line) = render::format_event(event) {
                println!("{}", line);
            }
        }
    }
}

async fn run_publish(
    config: &AppConfig,
    path: TagPath,
    value: TagValue,
    name: Option<String>,
    description: Option<String>,
    sync_database: bool,
) -> Result<()> {
    let client_id = format!("{}-publisher", config.mqtt.client_id);
    let (client, mut eventloop) = mqtt::connect(&config.mqtt, &client_id);
    let publisher = TagPublisher::new(Arc::new(client.clone()));

    let store = TagStateStore::new();
    let synced = if sync_database {
        let wait = Duration::from_secs(config.monitor.snapshot_wait_secs);
        MqttTransport::subscribe(&client, SNAPSHOT_TOPIC).await?;

        match tokio::time::timeout(wait, wait_for_snapshot(&mut eventloop, &store)).await {
            Ok(result) => {
                result?;
                true
            }
            Err(_) => {
                warn!(
                    "No snapshot on {} within {}s, skipping database publish",
                    SNAPSHOT_TOPIC,
                    wait.as_secs()
                );
                false
            }
        }
    } else {
        false
    };

    info!("Publishing {} = {}", path, value);
    publisher
        .publish_update(&path, value.clone(), name.clone(), description.clone())
        .await?;
    let mut expected_acks = 1;

    if synced {
        let classification = store.ingest_update_with_meta(&path, value, name, description);
        debug!(%path, classification = classification.label(), "Merged update into database");

        publisher.publish_snapshot(&store.list()).await?;
        expected_acks += 1;
    }

    tokio::time::timeout(PUBLISH_ACK_TIMEOUT, wait_for_acks(&mut eventloop, expected_acks))
        .await
        .context("Timed out waiting for the broker to acknowledge")??;

    disconnect(&client, &mut eventloop).await;
    println!("Tag {} updated", path);
    Ok(())
}

/// Poll until the retained snapshot arrives and is merged into `store`
async fn wait_for_snapshot(eventloop: &mut EventLoop, store: &TagStateStore) -> Result<()> {
    loop {
        let event = eventloop
            .poll()
            .await
            .context("Failed to connect to MQTT broker")?;

        let Some((topic, payload)) = incoming_publish(event) else {
            continue;
        };
        if topic != SNAPSHOT_TOPIC {
            continue;
        }

        match store.ingest_message(&topic, &payload) {
            Ok(Ingested::Snapshot(report)) => {
                info!(tags = report.committed(), "Loaded database snapshot");
                return Ok(());
            }
            Ok(_) => {}
            Err(TagError::MalformedSnapshot { reason, report }) => {
                warn!("Database snapshot partially loaded: {}", reason);
                info!(tags = report.committed(), "Loaded database snapshot");
                return Ok(());
            }
            Err(e) => return Err(e).context("Unusable database snapshot"),
        }
    }
}

async fn wait_for_acks(eventloop: &mut EventLoop, mut remaining: usize) -> Result<()> {
    while remaining > 0 {
        match eventloop.poll().await.context("MQTT connection error")? {
            Event::Incoming(Packet::PubAck(ack)) => {
                debug!(pkid = ack.pkid, "Publish acknowledged");
                remaining -= 1;
            }
            event => debug!(?event, "MQTT event"),
        }
    }
    Ok(())
}

/// Send DISCONNECT and drive the event loop until it is written out
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        debug!("Disconnect request not queued: {}", e);
        return;
    }

    let drain = async {
        while let Ok(event) = eventloop.poll().await {
            if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(1), drain).await;
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries the rendered tag lines
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
