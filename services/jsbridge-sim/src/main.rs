//! JsBridge Simulator
//!
//! Runs a native [`Bridge`] against the emulated script side over an in-proc
//! script bus, with no web view involved. Every line read from stdin is sent
//! to a script handler; the script's answer is written to stdout.
//!
//! Script handlers: `echo`, `upper`, `reverse`, plus the script's default
//! handler (use `--handler ""`). Native handlers the script side may call:
//! `native.time`, `native.log`.
//!
//! # Usage
//!
//! ```bash
//! # Echo each line through the bridge
//! echo '{"a":"b\\c"}' | jsbridge-sim
//!
//! # Upper-case, fire and forget, JSON logs
//! jsbridge-sim --handler upper --no-wait --log-format json
//!
//! # Environment overrides
//! JSBRIDGE__SCHEME=hybrid JSBRIDGE__LOGGING__LEVEL=debug jsbridge-sim
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jsbridge_core::{
    BoundThread, Bridge, BridgeConfig, BridgeHandle, BridgeResult, LoggingConfig, PageLoadStatus,
    Responder, UiContext,
};
use jsbridge_peer::{PeerResponder, ScriptPeer};
use jsbridge_transport::{ChannelWebView, NavigationDecision, ScriptBus};

const PAGE_URL: &str = "file:///android_asset/sim/index.html";
const ANSWER_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// CLI Arguments
// =============================================================================

/// JsBridge Simulator - exercise the native <-> script bridge from a terminal
#[derive(Parser, Debug)]
#[command(name = "jsbridge-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "JSBRIDGE_CONFIG")]
    config: Option<String>,

    /// Script handler each input line goes to (empty: the script's default handler)
    #[arg(long, default_value = "echo")]
    handler: String,

    /// Send without waiting for the script's answer
    #[arg(long)]
    no_wait: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long)]
    log_format: Option<String>,
}

// =============================================================================
// UI loop plumbing
// =============================================================================

enum Wake {
    Work,
    Eof,
}

/// The main task is the UI thread; `notify` wakes it
struct SimContext {
    ui: BoundThread,
    wake: flume::Sender<Wake>,
}

impl UiContext for SimContext {
    fn is_ui_thread(&self) -> bool {
        self.ui.is_ui_thread()
    }

    fn notify(&self) {
        let _ = self.wake.send(Wake::Work);
    }
}

/// Both halves of the bridge plus the bus between them
struct Page {
    bus: ScriptBus,
    bridge: Bridge<ChannelWebView>,
    peer: ScriptPeer,
}

impl Page {
    fn new(config: &BridgeConfig, context: Arc<dyn UiContext>) -> Self {
        let bus = ScriptBus::new();
        let bridge = Bridge::with_context(bus.web_view(), config, context);
        let peer = ScriptPeer::new(config.injector(), config.router());
        Self { bus, bridge, peer }
    }

    /// Deliver scripts and navigations until both sides are idle
    fn pump(&mut self) {
        loop {
            let navigations = self.peer.take_navigations();
            let scripts = self.bus.drain();
            if navigations.is_empty() && scripts.is_empty() {
                return;
            }
            for url in navigations {
                if self.bridge.should_override_url_loading(&url) == NavigationDecision::Proceed {
                    tracing::warn!(url = %url, "script navigated away from the page");
                }
            }
            for script in scripts {
                if let Err(e) = self.peer.evaluate(&script) {
                    tracing::warn!(code = e.error_code(), error = %e, "script side rejected injection");
                }
            }
        }
    }
}

fn register_native_handlers(bridge: &Bridge<ChannelWebView>) -> BridgeResult<()> {
    bridge.register_handler("native.time", |_: String, responder: Responder| {
        responder.respond(Utc::now().to_rfc3339());
    })?;
    bridge.register_handler("native.log", |data: String, responder: Responder| {
        tracing::info!(data = %data, "script log");
        responder.respond("logged");
    })?;
    bridge.set_default_handler(|data: String, responder: Responder| {
        tracing::info!(data = %data, "native default handler");
        responder.respond(format!("native got {} bytes", data.len()));
    })
}

fn install_script_handlers(peer: &mut ScriptPeer) -> anyhow::Result<()> {
    peer.register_handler("echo", |data, responder: PeerResponder| responder.respond(data));
    peer.register_handler("upper", |data: String, responder: PeerResponder| {
        responder.respond(data.to_uppercase())
    });
    peer.register_handler("reverse", |data: String, responder: PeerResponder| {
        responder.respond(data.chars().rev().collect::<String>())
    });
    peer.init(|data: String, responder: PeerResponder| {
        tracing::info!(data = %data, "script default handler");
        responder.respond(format!("script got {} bytes", data.len()));
    })?;
    Ok(())
}

// =============================================================================
// Stdin
// =============================================================================

fn spawn_stdin_reader(
    handle: BridgeHandle,
    wake: flume::Sender<Wake>,
    handler: String,
    wait: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Failed to read line: {}", e);
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }
            if let Err(e) = forward(&handle, &handler, line, wait) {
                tracing::error!(code = e.error_code(), error = %e, "bridge rejected input");
                break;
            }
        }
        let _ = wake.send(Wake::Eof);
    })
}

fn forward(handle: &BridgeHandle, handler: &str, line: String, wait: bool) -> BridgeResult<()> {
    if !wait {
        return handle.call_handler(handler, line);
    }

    let (tx, rx) = flume::bounded(1);
    handle.call_handler_with_response(handler, line, move |answer| {
        let _ = tx.send(answer);
    })?;
    match rx.recv_timeout(ANSWER_TIMEOUT) {
        Ok(answer) => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{answer}").ok();
            stdout.flush().ok();
        }
        Err(_) => tracing::warn!(handler, "no answer from script within {:?}", ANSWER_TIMEOUT),
    }
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = BridgeConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        scheme = %config.scheme,
        handler = %args.handler,
        "Starting JsBridge simulator"
    );

    let (wake_tx, wake_rx) = flume::unbounded();
    let context = Arc::new(SimContext {
        ui: BoundThread::current(),
        wake: wake_tx.clone(),
    });
    let mut page = Page::new(&config, context);

    register_native_handlers(&page.bridge)?;
    page.bridge.on_page_started(PAGE_URL)?;

    // Buffered until the page reports it loaded
    page.bridge
        .call_handler_with_response("echo", "hello from native", |answer| {
            tracing::info!(answer = %answer, "startup call answered");
        })?;

    install_script_handlers(&mut page.peer)?;
    page.peer.page_loaded(PageLoadStatus::Ok);
    page.pump();

    page.peer
        .call_handler_with_response("native.time", "", |time| {
            tracing::info!(time = %time, "script asked native for the time");
        });
    page.pump();

    let reader = spawn_stdin_reader(page.bridge.handle(), wake_tx, args.handler, !args.no_wait);

    while let Ok(event) = wake_rx.recv_async().await {
        match event {
            Wake::Work => {
                let ran = page.bridge.drain_marshaled()?;
                page.pump();
                tracing::debug!(ran, pending = page.bridge.pending_callbacks(), "drained");
            }
            Wake::Eof => break,
        }
    }

    page.bridge.drain_marshaled()?;
    page.pump();

    tracing::info!(
        pending = page.bridge.pending_callbacks(),
        "stdin closed, shutting down"
    );
    page.bridge.destroy()?;

    reader
        .join()
        .map_err(|_| anyhow::anyhow!("stdin reader panicked"))?;
    Ok(())
}

/// Initialize logging; output goes to stderr, stdout carries answers
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr).with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_writer(io::stderr).with_target(true))
                .init();
        }
    }

    Ok(())
}
