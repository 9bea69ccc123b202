//! finguard-agent - The FinGuard session agent
//!
//! This is the main entry point for the session agent.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Backend transport
//! - Session runtime (credential renewal, idle timeout, notifications)
//! - Command input on stdin and event output on stdout

use anyhow::{Context, Result};
use clap::Parser;
use finguard_api::{Command, Event, EventPayload};
use finguard_backend::{FinanceApi, HttpTransport};
use finguard_config::{AgentConfig, StorageBackend, load_config};
use finguard_core::SessionRuntime;
use finguard_store::{AuditEvent, AuditEventType, MemoryStore, SqliteStore, Store};
use finguard_util::{MonotonicInstant, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// finguard-agent - Session continuity and notifications for FinGuard
#[derive(Parser, Debug)]
#[command(name = "finguard-agent")]
#[command(about = "Session continuity and notification agent for FinGuard", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/finguard/agent.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set FINGUARD_DATA_DIR env var)
    #[arg(short, long, env = "FINGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Backend base URL override (or set FINGUARD_API_URL env var)
    #[arg(short, long, env = "FINGUARD_API_URL")]
    base_url: Option<String>,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long)]
    memory: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    runtime: Arc<SessionRuntime>,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let mut config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(config_path = %args.config.display(), "Configuration loaded");
            config
        } else {
            info!(
                config_path = %args.config.display(),
                "No configuration file, using defaults"
            );
            AgentConfig::default()
        };

        if let Some(data_dir) = &args.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        if let Some(base_url) = &args.base_url {
            config.api.base_url = base_url.trim_end_matches('/').to_string();
        }
        if args.memory {
            config.storage.backend = StorageBackend::Memory;
        }

        // Initialize store
        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Sqlite => {
                let db_path = config.storage.database_path();
                let store = SqliteStore::open(&db_path)
                    .with_context(|| format!("Failed to open database {:?}", db_path))?;
                info!(db_path = %db_path.display(), "Store initialized");
                Arc::new(store)
            }
            StorageBackend::Memory => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        store.append_audit(AuditEvent::new(AuditEventType::AgentStarted))?;

        // Initialize backend transport
        let transport = HttpTransport::new(&config.api.base_url, config.api.timeout)
            .context("Failed to create HTTP client")?;
        info!(base_url = %config.api.base_url, "Backend transport ready");

        let runtime = SessionRuntime::new(
            FinanceApi::new(Arc::new(transport)),
            store.clone(),
            &config,
        );

        Ok(Self {
            runtime: Arc::new(runtime),
            store,
        })
    }

    async fn run(self) -> Result<()> {
        let runtime = self.runtime.clone();

        // Output channel; one writer task owns stdout
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Event>();
        let writer = tokio::spawn(write_events(out_rx));

        let mut credential_events = runtime.credentials().events().subscribe();
        let mut idle_events = runtime.idle().events().subscribe();
        let mut notification_events = runtime.notifications().events().subscribe();

        match runtime.restore(finguard_util::now(), MonotonicInstant::now()) {
            Ok(true) => info!("Resumed persisted session"),
            Ok(false) => info!("No persisted session, waiting for login"),
            Err(e) => warn!(error = %e, "Failed to restore session"),
        }

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut commands = BufReader::new(tokio::io::stdin()).lines();

        // Main event loop
        let mut tick_timer = tokio::time::interval(Duration::from_millis(250));

        info!("Agent running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Tick timer - renewals, idle countdown, rule polls, toasts
                _ = tick_timer.tick() => {
                    runtime.tick(finguard_util::now(), MonotonicInstant::now());
                }

                line = commands.next_line() => {
                    match line {
                        Ok(Some(line)) => Self::handle_line(&runtime, &out_tx, &line),
                        Ok(None) => {
                            info!("Command input closed, shutting down");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read command input");
                            break;
                        }
                    }
                }

                event = credential_events.recv() => {
                    forward(&out_tx, event, EventPayload::Credential);
                }
                event = idle_events.recv() => {
                    forward(&out_tx, event, EventPayload::Idle);
                }
                event = notification_events.recv() => {
                    forward(&out_tx, event, EventPayload::Notification);
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down finguard-agent");
        runtime.shutdown();

        let _ = out_tx.send(Event::new(EventPayload::Shutdown));
        drop(out_tx);
        if let Err(e) = writer.await {
            warn!(error = %e, "Event writer did not finish cleanly");
        }

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AgentStopped))
        {
            warn!(error = %e, "Failed to log agent shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_line(runtime: &Arc<SessionRuntime>, out: &mpsc::UnboundedSender<Event>, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Invalid command");
                let _ = out.send(Event::new(EventPayload::Error {
                    message: format!("Invalid command: {}", e),
                }));
                return;
            }
        };

        for payload in Self::handle_command(runtime, command) {
            let _ = out.send(Event::new(payload));
        }
    }

    /// Apply one command. Returns direct replies; state changes reach the
    /// UI through the component event streams.
    fn handle_command(runtime: &Arc<SessionRuntime>, command: Command) -> Vec<EventPayload> {
        let now = finguard_util::now();
        let now_mono = MonotonicInstant::now();
        let notifications = runtime.notifications();

        match command {
            Command::Login { tokens } => match runtime.login(tokens, now, now_mono) {
                Ok(_) => vec![],
                Err(e) => vec![error_payload(e)],
            },

            Command::Logout => {
                runtime.logout();
                vec![]
            }

            Command::Activity { kind } => {
                let reset = runtime.record_activity(now_mono);
                debug!(?kind, reset, "Activity");
                vec![]
            }

            Command::Extend => {
                if runtime.extend(now_mono) {
                    vec![]
                } else {
                    vec![EventPayload::Error {
                        message: "No session to extend".into(),
                    }]
                }
            }

            Command::Focus => {
                runtime.on_focus(&now);
                vec![]
            }

            Command::Domain { event } => {
                // Budget checks wait on the network; keep the loop moving
                runtime.spawn_dispatch(event, now);
                vec![]
            }

            Command::MarkRead { id } => match notifications.mark_read(&id) {
                Some(_) => vec![],
                None => vec![unknown_notification(&id)],
            },

            Command::MarkAllRead => {
                notifications.mark_all_read();
                vec![]
            }

            Command::Dismiss { id } => {
                notifications.dismiss(&id);
                vec![]
            }

            Command::DismissAll => {
                notifications.dismiss_all();
                vec![]
            }

            Command::ClearAll => {
                notifications.clear_all();
                vec![]
            }

            Command::Action { id, action_id } => match notifications.handle_action(&id, &action_id) {
                Some(notification) => vec![EventPayload::ActionRequested {
                    notification,
                    action_id,
                }],
                None => vec![unknown_notification(&id)],
            },

            Command::GetNotifications { limit, unread_only } => vec![EventPayload::Notifications {
                items: notifications.notifications(limit, unread_only),
            }],

            Command::GetStats => vec![EventPayload::Stats(notifications.stats())],

            Command::GetSettings => vec![EventPayload::Settings(notifications.settings())],

            Command::UpdateSettings { settings } => {
                let mut replies = Vec::new();
                if let Err(e) = notifications.update_settings(settings) {
                    replies.push(error_payload(e));
                }
                replies.push(EventPayload::Settings(notifications.settings()));
                replies
            }

            Command::GetIdleWindow => {
                vec![EventPayload::IdleWindow(runtime.idle().window_state(now_mono))]
            }

            Command::GetSessionStats => {
                vec![EventPayload::SessionStats(runtime.session_stats(now, now_mono))]
            }
        }
    }
}

fn error_payload(error: impl std::fmt::Display) -> EventPayload {
    EventPayload::Error {
        message: error.to_string(),
    }
}

fn unknown_notification(id: &finguard_util::NotificationId) -> EventPayload {
    EventPayload::Error {
        message: format!("Unknown notification: {}", id),
    }
}

fn forward<T>(
    out: &mpsc::UnboundedSender<Event>,
    received: Result<T, broadcast::error::RecvError>,
    wrap: impl FnOnce(T) -> EventPayload,
) {
    match received {
        Ok(event) => {
            let _ = out.send(Event::new(wrap(event)));
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "Event stream lagged");
        }
        Err(broadcast::error::RecvError::Closed) => {}
    }
}

/// Write events to stdout as newline-delimited JSON
async fn write_events(mut events: mpsc::UnboundedReceiver<Event>) {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = events.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize event");
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = stdout.write_all(&line).await {
            error!(error = %e, "Failed to write event");
            return;
        }
        let _ = stdout.flush().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout carries events, so logs go to stderr
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "finguard-agent starting");

    let service = Service::new(&args)?;
    service.run().await
}
