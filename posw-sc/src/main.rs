//! Scanner Capture (posw-sc) - Main entry point
//!
//! Runs the barcode/QR capture service: a keyboard-wedge reader on stdin,
//! the scanner session and pipeline, and the HTTP control API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use posw_common::config::{self, TomlConfig, TransportKind, CONFIG_ENV_VAR};
use posw_common::events::EventBus;
use posw_sc::api;
use posw_sc::feedback::TerminalBell;
use posw_sc::keystroke::{self, KeyEvent, KeystrokeClassifier, KeystrokeConfig};
use posw_sc::resolver::{CatalogResolver, HttpResolver, ProductResolver};
use posw_sc::transport::ChannelConnector;
use posw_sc::ScannerSession;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Queued frames between the wedge reader and the scanner transport
const WEDGE_BUFFER: usize = 64;

/// Command-line arguments for posw-sc
#[derive(Parser, Debug)]
#[command(name = "posw-sc")]
#[command(about = "Barcode and QR scanner capture service for POSW")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "POSW_SC_PORT")]
    port: Option<u16>,

    /// JSON product catalog (overrides config file)
    #[arg(long, env = "POSW_SC_CATALOG")]
    catalog: Option<PathBuf>,

    /// Inventory service base URL (overrides config file)
    #[arg(long, env = "POSW_SC_INVENTORY_URL")]
    inventory_url: Option<String>,

    /// Scanner transport: usb, bluetooth or wifi
    #[arg(long)]
    device_kind: Option<TransportKind>,

    /// Scanner device identifier
    #[arg(long)]
    device_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load bootstrap configuration
    let config_path = config::resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let mut toml_config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut toml_config, &args);

    // Initialize tracing
    let default_filter = format!(
        "posw_sc={level},posw_common={level},tower_http=info",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting POSW Scanner Capture on port {}", toml_config.server.port);
    match &config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    toml_config
        .scanner
        .validate()
        .context("Invalid scanner configuration")?;

    let resolver = build_resolver(&toml_config)?;

    // Keyboard wedge: stdin lines -> keystroke classifier -> scanner transport
    let (connector, wedge_tx) = ChannelConnector::new(WEDGE_BUFFER);
    let keystrokes = KeystrokeConfig::from(&toml_config.scanner.scanning);
    spawn_wedge(keystrokes, wedge_tx.clone());

    let events = EventBus::new(100);
    let session = Arc::new(ScannerSession::new(
        Arc::new(connector),
        resolver,
        Arc::new(TerminalBell),
        events,
        toml_config.scanner.scanning.clone(),
    ));

    if let Err(e) = session.connect(toml_config.scanner.clone()).await {
        warn!("Initial scanner connect failed: {}", e);
    }

    // Build the application router
    let app_state = api::AppState {
        session: Arc::clone(&session),
        scanner_config: toml_config.scanner.clone(),
        port: toml_config.server.port,
    };

    let app = api::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    api::serve(app, toml_config.server.port, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    session
        .disconnect()
        .await
        .context("Failed to disconnect scanner")?;
    // Keeps the wedge transport open until the session is gone
    drop(wedge_tx);

    info!("Server shutdown complete");
    Ok(())
}

/// Apply command-line overrides on top of the loaded file
fn apply_overrides(config: &mut TomlConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(catalog) = &args.catalog {
        config.server.catalog_path = Some(catalog.clone());
    }
    if let Some(url) = &args.inventory_url {
        config.server.inventory_url = Some(url.clone());
    }
    if let Some(kind) = args.device_kind {
        config.scanner.connection.kind = kind;
    }
    if let Some(device_id) = &args.device_id {
        config.scanner.connection.device_id = device_id.clone();
    }
}

/// Inventory service when configured, otherwise the local catalog
fn build_resolver(config: &TomlConfig) -> Result<Arc<dyn ProductResolver>> {
    if let Some(url) = &config.server.inventory_url {
        let timeout = Duration::from_millis(config.server.inventory_timeout_ms);
        let resolver = HttpResolver::new(url, timeout).context("Invalid inventory URL")?;
        info!("Resolving products via inventory service {}", url);
        return Ok(Arc::new(resolver));
    }

    match &config.server.catalog_path {
        Some(path) => {
            let catalog = CatalogResolver::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            Ok(Arc::new(catalog))
        }
        None => {
            warn!("No inventory URL or catalog configured; every scan will miss");
            Ok(Arc::new(CatalogResolver::default()))
        }
    }
}

/// Feed stdin lines through the keystroke classifier into the transport
///
/// Each line is replayed as a keystroke burst followed by Enter, the way a
/// USB HID scanner types into a focused terminal.
fn spawn_wedge(config: KeystrokeConfig, frames: mpsc::Sender<Vec<u8>>) {
    let (key_tx, key_rx) = mpsc::channel::<KeyEvent>(256);
    let (scan_tx, mut scan_rx) = mpsc::channel(WEDGE_BUFFER);

    tokio::spawn(keystroke::run_capture(
        KeystrokeClassifier::new(config),
        key_rx,
        scan_tx,
    ));

    tokio::spawn(async move {
        while let Some(scan) = scan_rx.recv().await {
            if frames.send(scan.data.into_bytes()).await.is_err() {
                debug!("Scanner transport gone, stopping wedge");
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    for c in line.chars() {
                        if key_tx.send(KeyEvent::char(c, Instant::now())).await.is_err() {
                            return;
                        }
                    }
                    if key_tx.send(KeyEvent::enter(Instant::now())).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    debug!("Wedge input closed");
                    return;
                }
                Err(e) => {
                    warn!("Wedge input error: {}", e);
                    return;
                }
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
