use anyhow::Context;
use clap::Parser;
use marginalia_workspace::{
    FileSink, ForeignSurfaceAdapter, JsonLinesChannel, PresenceStore, SaveDebouncer, SharedText,
    SyncConfig, DEFAULT_CONFIG_NAME,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Bridges an embedded diagram editor speaking JSON lines on stdin/stdout
/// to a replicated document persisted in a file.
#[derive(Parser, Debug)]
#[command(name = "marginalia-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (JSON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_NAME)]
    config: PathBuf,

    /// Origin the surface's messages are treated as coming from
    #[arg(long)]
    origin: Option<String>,

    /// Diagram file to load and save
    #[arg(short, long)]
    file: PathBuf,

    /// Display name for presence
    #[arg(short, long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    let mut config = SyncConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(origin) = args.origin {
        config.allowed_origin = origin;
    }
    if let Some(name) = args.name {
        config.user.name = name;
    }

    let initial = if args.file.exists() {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?
    } else {
        String::new()
    };

    let shared = SharedText::with_client_id(&config.text_name, config.client_id);
    tracing::info!(
        "Bridging {} as client {} ({})",
        args.file.display(),
        shared.client_id(),
        config.user.name
    );

    let presence = Arc::new(Mutex::new(PresenceStore::new(shared.client_id())));
    let channel = Arc::new(JsonLinesChannel::new(std::io::stdout()));
    let mut adapter = ForeignSurfaceAdapter::new(shared.clone(), channel, presence, &config);
    adapter.set_initial_snapshot(initial);
    adapter.start_presence_relay();

    let debouncer = SaveDebouncer::spawn(Arc::new(FileSink::new(&args.file)), config.save_debounce());
    let saves = debouncer.handle();
    let persistence = shared.observe(move |change| saves.notify(change.text.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = adapter.handle_message(&config.allowed_origin, &line) {
            tracing::warn!("Surface message failed: {}", e);
        }
    }

    tracing::info!("Surface closed, flushing");
    adapter.destroy();
    drop(persistence);
    debouncer.shutdown().await;
    Ok(())
}
