//! REPL – Read-Eval-Print Loop for the LockScan operator console.
//!
//! Supported slash-commands:
//!   /help         – show this list
//!   /scan         – scan frames from the configured camera source
//!   /enter        – type a code by hand (`/back` returns to the prompt)
//!   /status       – broker and session state
//!   /settings     – interactively edit `~/.lockscan/config.toml`
//!   /quit | /exit – gracefully exit the CLI

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lockscan_hal::CameraSource;
use lockscan_middleware::MqttPublisher;
use lockscan_runtime::ScanSession;
use lockscan_types::{ParseFailurePolicy, ScanError};
use tokio::runtime::Runtime;

use crate::config::{self, Config};

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Scan,
    Enter,
    Status,
    Settings,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let cmd = line.trim();
        if cmd.is_empty() {
            return None;
        }
        Some(match cmd {
            "/help" | "/?" => Command::Help,
            "/scan" => Command::Scan,
            "/enter" => Command::Enter,
            "/status" => Command::Status,
            "/settings" => Command::Settings,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// Everything the REPL drives.
pub struct Console<'rt> {
    pub rt: &'rt Runtime,
    pub session: ScanSession,
    /// `None` when the broker session could not be started.
    pub broker: Option<Arc<MqttPublisher>>,
    pub cfg: Config,
    /// Raised by the Ctrl-C handler to stop a running scan.
    pub cancel: Arc<AtomicBool>,
    /// Tells the Ctrl-C handler a scan is in progress.
    pub scanning: Arc<AtomicBool>,
    pub shutdown: Arc<AtomicBool>,
}

impl Console<'_> {
    /// Run until `/quit`, end of input or Ctrl-C at the prompt.
    pub fn run(mut self) {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("{}: {}", "Cannot open terminal".red(), e);
                return;
            }
        };

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let line = match editor.readline(&format!("{} ", "lockscan>".bold().cyan())) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            };

            let Some(command) = Command::parse(&line) else {
                continue;
            };
            let _ = editor.add_history_entry(line.trim());

            match command {
                Command::Help => cmd_help(),
                Command::Scan => self.cmd_scan(),
                Command::Enter => self.cmd_enter(&mut editor),
                Command::Status => self.cmd_status(),
                Command::Settings => cmd_settings(&mut editor),
                Command::Quit => {
                    println!("{}", "Goodbye.".green());
                    self.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                Command::Unknown(other) => {
                    println!(
                        "{} '{}'. Type {} for available commands.",
                        "Unknown command:".red(),
                        other.yellow(),
                        "/help".bold()
                    );
                }
            }
        }
    }

    // ── Command handlers ─────────────────────────────────────────────────────

    fn cmd_scan(&mut self) {
        let source = CameraSource::parse(&self.cfg.camera_source);
        let camera = match source.open() {
            Ok(camera) => camera,
            Err(e) => {
                println!("{}: {}", "Camera unavailable".red(), e);
                return;
            }
        };

        println!(
            "  Scanning {} … press {} to cancel",
            source.to_string().bold(),
            "Ctrl-C".bold()
        );

        self.cancel.store(false, Ordering::SeqCst);
        self.scanning.store(true, Ordering::SeqCst);
        let result = self.rt.block_on(self.session.scan(camera, &self.cancel));
        self.scanning.store(false, Ordering::SeqCst);

        // Published/rejected/fault events are printed by the event renderer.
        match result {
            Ok(_) => {}
            Err(ScanError::Cancelled) => println!("  {}", "Scan cancelled.".yellow()),
            Err(ScanError::InvalidState { .. }) => {
                println!("  {}", "A scan cannot start right now; try /status.".yellow())
            }
            Err(ScanError::DeviceUnavailable { .. }) => {
                println!("  {}", "No QR code found before the camera stopped.".yellow())
            }
            Err(ScanError::Config(reason)) => {
                println!("  {} {}", "Settings problem:".red(), reason)
            }
            Err(_) => {}
        }
    }

    fn cmd_enter(&mut self, editor: &mut DefaultEditor) {
        if let Err(e) = self.session.begin_entry() {
            println!("{}: {}", "Cannot enter a code".red(), e);
            return;
        }
        println!(
            "  Enter the code as {}. Type {} to return.",
            "user-box-pin".bold(),
            "/back".bold().cyan()
        );

        loop {
            let line = match editor.readline(&format!("{} ", "code>".bold().yellow())) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = self.session.cancel_entry();
                    return;
                }
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    let _ = self.session.cancel_entry();
                    return;
                }
            };

            let code = match EntryLine::classify(&line) {
                EntryLine::Blank => continue,
                EntryLine::Back => {
                    let _ = self.session.cancel_entry();
                    return;
                }
                EntryLine::Code(code) => code,
            };

            match self.rt.block_on(self.session.submit(code)) {
                // Rejected codes keep the form open for another try.
                Err(ScanError::MalformedRecord { .. }) => continue,
                _ => return,
            }
        }
    }

    fn cmd_status(&self) {
        println!("{}", "Status".bold().underline());
        match &self.broker {
            Some(broker) if broker.is_connected() => println!(
                "  Broker  : {} {}",
                "connected".green(),
                format!("({}:{})", self.cfg.broker_host, self.cfg.broker_port).dimmed()
            ),
            Some(_) => println!(
                "  Broker  : {} {}",
                "not connected".yellow(),
                format!("({}:{})", self.cfg.broker_host, self.cfg.broker_port).dimmed()
            ),
            None => println!("  Broker  : {}", "not started (check /settings)".red()),
        }
        println!("  Session : {}", self.session.state().to_string().bold());
        println!("  Topic   : {}", self.session.config().topic.cyan());
        println!("  Camera  : {}", CameraSource::parse(&self.cfg.camera_source));
    }
}

fn cmd_help() {
    println!();
    println!("{}", "LockScan Commands".bold().underline());
    println!("  {}      – scan the configured camera source", "/scan".bold().cyan());
    println!("  {}     – type a code by hand (/back returns)", "/enter".bold().cyan());
    println!("  {}    – broker and session state", "/status".bold().cyan());
    println!("  {}  – edit ~/.lockscan/config.toml", "/settings".bold().cyan());
    println!("  {} – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_settings(editor: &mut DefaultEditor) {
    let mut cfg = match config::load_from(&config::config_path()) {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!("  Press Enter to keep the current value.");

    cfg.broker_host = prompt_str(editor, &format!("  Broker host    [{}]: ", cfg.broker_host), &cfg.broker_host);
    cfg.broker_port = prompt_u16(editor, &format!("  Broker port    [{}]: ", cfg.broker_port), cfg.broker_port);
    cfg.username = prompt_str(editor, &format!("  Username       [{}]: ", cfg.username), &cfg.username);
    let password = prompt_str(editor, "  Password       [unchanged]: ", "");
    if !password.is_empty() {
        cfg.password = password;
    }
    let ca = prompt_str(
        editor,
        &format!("  CA certificate [{}]: ", cfg.ca_cert.display()),
        &cfg.ca_cert.to_string_lossy(),
    );
    cfg.ca_cert = ca.into();
    cfg.topic = prompt_str(editor, &format!("  Topic          [{}]: ", cfg.topic), &cfg.topic);
    cfg.camera_source = prompt_str(
        editor,
        &format!("  Camera source  [{}] (device:N or image path): ", cfg.camera_source),
        &cfg.camera_source,
    );

    let state = prompt_str(
        editor,
        &format!("  State flag     [{}] (y / n): ", if cfg.include_state { "y" } else { "n" }),
        "",
    );
    if !state.is_empty() {
        match parse_yes_no(&state) {
            Some(v) => cfg.include_state = v,
            None => warn_kept(&state, "is not y or n", cfg.include_state),
        }
    }

    let qos = prompt_str(editor, &format!("  QoS            [{}] (0 / 1 / 2): ", cfg.qos), "");
    if !qos.is_empty() {
        match parse_qos(&qos) {
            Some(v) => cfg.qos = v,
            None => warn_kept(&qos, "is not a QoS level", cfg.qos),
        }
    }

    let policy = prompt_str(
        editor,
        &format!("  On bad code    [{}] (continue / abort): ", cfg.on_parse_error),
        "",
    );
    if !policy.is_empty() {
        match policy.parse::<ParseFailurePolicy>() {
            Ok(v) => cfg.on_parse_error = v,
            Err(_) => warn_kept(&policy, "is not continue or abort", cfg.on_parse_error),
        }
    }

    match config::save(&cfg) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!("  Restart lockscan to apply them.");
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// One line typed at the `code>` prompt.
#[derive(Debug, PartialEq, Eq)]
enum EntryLine<'a> {
    Blank,
    Back,
    /// Submitted exactly as typed; surrounding whitespace is part of the code.
    Code(&'a str),
}

impl<'a> EntryLine<'a> {
    fn classify(line: &'a str) -> Self {
        match line.trim() {
            "" => EntryLine::Blank,
            "/back" => EntryLine::Back,
            _ => EntryLine::Code(line),
        }
    }
}

fn parse_yes_no(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "on" => Some(true),
        "n" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn parse_qos(raw: &str) -> Option<u8> {
    raw.trim().parse::<u8>().ok().filter(|level| *level <= 2)
}

fn warn_kept(raw: &str, problem: &str, kept: impl std::fmt::Display) {
    println!("  {} '{}' {}, keeping {}", "Warning:".yellow(), raw, problem, kept);
}

/// Prompt for a u16 value.  Returns `default` when the user presses Enter.
fn prompt_u16(editor: &mut DefaultEditor, msg: &str, default: u16) -> u16 {
    let raw = prompt_str(editor, msg, &default.to_string());
    match raw.parse::<u16>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not a valid port number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(editor: &mut DefaultEditor, msg: &str, default: &str) -> String {
    match editor.readline(msg) {
        Ok(line) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() { default.to_string() } else { trimmed }
        }
        Err(_) => default.to_string(),
    }
}
