//! `lockscan-cli` – operator console for the QR lock scanner.
//!
//! This binary:
//!
//! 1. Checks for `~/.lockscan/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Opens the MQTT broker session in the background.
//! 3. Drops the operator into an **interactive REPL** (`/scan`, `/enter`,
//!    `/status`, `/settings`, `/help`, `/quit`).
//! 4. Intercepts **Ctrl-C** to cancel a running scan, or to exit when idle.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lockscan_middleware::{EventBus, MqttPublisher, Publisher};
use lockscan_perception::QrDecoder;
use lockscan_runtime::{ScanSession, init_tracing};
use lockscan_types::{PublishEnvelope, ScanError, SessionEventPayload};
use tracing::{error, info, warn};

fn main() {
    // RUST_LOG sets the filter; LOCKSCAN_LOG_FORMAT=json switches to JSON
    // lines.  Operator-facing output still uses println!.
    let telemetry = init_tracing("lockscan");
    if telemetry.is_exporting() {
        info!("exporting spans over OTLP");
    }

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Broker session ────────────────────────────────────────────────────
    let mqtt = cfg.to_mqtt_config();
    println!(
        "\n  Connecting to broker {} …",
        format!("{}:{}", mqtt.host, mqtt.port).dimmed()
    );
    let broker = match rt.block_on(async { MqttPublisher::connect(&mqtt) }) {
        Ok(publisher) => Some(Arc::new(publisher)),
        Err(e) => {
            error!(error = %e, "broker session could not be started");
            println!("  {} {}", "Broker unavailable:".red(), e);
            println!("  Scanned records will not be published until this is fixed.");
            None
        }
    };
    let publisher: Arc<dyn Publisher> = match &broker {
        Some(broker) => broker.clone(),
        None => Arc::new(BrokerUnavailable),
    };

    // ── Session and event rendering ───────────────────────────────────────
    let session_config = cfg.to_session_config();
    if let Err(e) = session_config.validate() {
        println!("  {} {}", "Settings problem:".red(), e);
        println!("  Scans and entries will be refused until it is fixed in /settings.");
    }
    let bus = EventBus::default();
    rt.spawn(render_events(bus.clone()));
    let session = ScanSession::new(
        session_config,
        Box::new(QrDecoder::new()),
        publisher,
        bus,
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // A running scan is cancelled; otherwise the REPL is asked to exit.
    let shutdown = Arc::new(AtomicBool::new(false));
    let cancel = Arc::new(AtomicBool::new(false));
    let scanning = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let cancel = cancel.clone();
        let scanning = scanning.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if scanning.load(Ordering::SeqCst) {
                println!();
                println!("{}", "⚠  Ctrl-C received – cancelling scan …".yellow().bold());
                cancel.store(true, Ordering::SeqCst);
            } else {
                println!();
                println!("{}", "⚠  Ctrl-C received – exiting.".yellow().bold());
                shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; scans can only end on their own");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let console = repl::Console {
        rt: &rt,
        session,
        broker: broker.clone(),
        cfg,
        cancel,
        scanning,
        shutdown,
    };
    console.run();

    if let Some(broker) = broker
        && let Err(e) = rt.block_on(broker.disconnect())
    {
        warn!(error = %e, "broker disconnect failed");
    }
    rt.shutdown_timeout(Duration::from_millis(500));
}

/// Stand-in publisher when the broker session could not even be started.
struct BrokerUnavailable;

#[async_trait]
impl Publisher for BrokerUnavailable {
    async fn publish(&self, _envelope: &PublishEnvelope) -> Result<(), ScanError> {
        Err(ScanError::BrokerConnect(
            "broker session was not started; check the broker settings".to_string(),
        ))
    }
}

/// Print every session event as it arrives.
async fn render_events(bus: EventBus) {
    let mut events = bus.subscribe();
    drop(bus);
    while let Some(event) = events.recv().await {
        match event.payload {
            SessionEventPayload::StateChanged { from, to } => {
                println!("  {} {} → {}", "·".dimmed(), from.to_string().dimmed(), to.to_string().bold());
            }
            SessionEventPayload::PayloadRejected { reason } => {
                println!("  {} {}", "✗ rejected:".yellow(), reason);
            }
            SessionEventPayload::RecordPublished {
                topic,
                subject_id,
                resource_id,
            } => {
                println!(
                    "  {} user {} / box {} → {}",
                    "✓ published".green().bold(),
                    subject_id.bold(),
                    resource_id.bold(),
                    topic.cyan()
                );
            }
            SessionEventPayload::PublishFailed { reason } => {
                println!("  {} {}", "✗ publish failed:".red().bold(), reason);
            }
            SessionEventPayload::DeviceFault { device, details } => {
                println!("  {} {}: {}", "✗ camera".red(), device.bold(), details);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      LockScan First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's connect the scanner to a broker.\n");

    let mut cfg = config::Config::default();

    cfg.broker_host = prompt_line(
        &format!("  Broker host [{}]: ", cfg.broker_host),
        &cfg.broker_host,
    );

    let port_str = prompt_line(
        &format!("  Broker port [{}]: ", cfg.broker_port),
        &cfg.broker_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.broker_port = p;
    }

    cfg.username = prompt_line("  Broker username (empty for none): ", "");
    if !cfg.username.is_empty() {
        cfg.password = prompt_line("  Broker password: ", "");
    }

    let ca = prompt_line(
        &format!("  CA certificate [{}]: ", cfg.ca_cert.display()),
        &cfg.ca_cert.to_string_lossy(),
    );
    cfg.ca_cert = ca.into();

    cfg.topic = prompt_line(&format!("  Topic [{}]: ", cfg.topic), &cfg.topic);

    cfg.camera_source = prompt_line(
        &format!("  Camera source (device:N, frame directory or image) [{}]: ", cfg.camera_source),
        &cfg.camera_source,
    );

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __            __   ____                 "#.bold().cyan());
    println!("{}", r#"  / /  ___  ____/ /__/ __/______ ____      "#.bold().cyan());
    println!("{}", r#" / /__/ _ \/ __/  '_/\ \/ __/ _ `/ _ \     "#.bold().cyan());
    println!("{}", r#"/____/\___/\__/_/\_\___/\__/\_,_/_//_/     "#.bold().cyan());
    println!();
    println!("  {} {}",
        "LockScan".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  QR lock code scanner");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
