mod api;
mod config;
mod rules_cmd;
mod status_cmd;
mod terminal_output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cadence_channels::{ChannelAdapter, DiscordAdapter, DiscordGrantAction};
use cadence_config::{validate, CadenceConfig};
use cadence_core::{ActivityLog, CadenceBus, Component, Message, RuleSource};
use cadence_scheduler::{parse_period, AlertSink, PollScheduler};
use cadence_store::Database;
use cadence_supervisor::{AlertStore, Supervisor};

use api::AppState;
use rules_cmd::RulesCommands;
use terminal_output::{note_success, note_warn};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "cadence: grant Discord roles for sustained activity")]
#[command(version)]
struct Cli {
    /// Path to cadence.yaml (overrides CADENCE_CONFIG and discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: record activity and grant roles
    Serve {
        /// Port to bind the HTTP API to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage activity rules
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Delete old activity events once
    Prune {
        /// Delete events older than this period, e.g. `30d`. Defaults to the
        /// retention cutoff.
        #[arg(long)]
        older_than: Option<String>,
    },
    /// Show the status of a running bot
    Status,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cadence_config::load_and_prepare(cli.config.as_deref()).await?;
    let config = config::apply_env_overrides(config);

    if let Commands::Serve { .. } = cli.command {
        cadence_logging::init_logger(&config.logging.dir, &config.logging.level);
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.api.port = port;
            }
            run_server(config).await?;
        }
        Commands::Rules { command } => {
            let db = Database::open(&config.database.path)?;
            rules_cmd::run(&db, command).await?;
        }
        Commands::Prune { older_than } => {
            let db = Database::open(&config.database.path)?;
            match prune(&db, &config, older_than.as_deref()).await? {
                Some(outcome) => {
                    note_success(&format!(
                        "Pruned {} events older than {}",
                        outcome.removed, outcome.cutoff
                    ));
                    match outcome.oldest_remaining {
                        Some(ts) => println!("  Oldest remaining event: {ts}"),
                        None => println!("  No events remain"),
                    }
                }
                None => note_warn("No rules configured; nothing to prune"),
            }
        }
        Commands::Status => {
            status_cmd::run(&api_base_url(&config)).await?;
        }
        Commands::Config => {
            for warning in validate(&config, false).warnings {
                note_warn(&warning.to_string());
            }
            print!("{}", serde_yaml::to_string(&config.redacted())?);
        }
    }

    Ok(())
}

fn api_base_url(config: &CadenceConfig) -> String {
    let host = match config.api.bind_address.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, config.api.port)
}

struct PruneOutcome {
    cutoff: i64,
    removed: usize,
    oldest_remaining: Option<i64>,
}

async fn prune(
    db: &Database,
    config: &CadenceConfig,
    older_than: Option<&str>,
) -> Result<Option<PruneOutcome>> {
    let now = Utc::now().timestamp();
    let cutoff = match older_than {
        Some(period) => {
            let secs = parse_period(period)?;
            Some(now.saturating_sub(i64::try_from(secs).unwrap_or(i64::MAX)))
        }
        None => {
            let rules = db.rules().list_rules().await?;
            let max_period = rules.iter().map(|r| r.time_period).max();
            config::retention_policy(config).cutoff(now, max_period)
        }
    };

    let Some(cutoff) = cutoff else {
        return Ok(None);
    };
    let events = db.events();
    let removed = events.prune_before(cutoff).await?;
    let oldest_remaining = events.oldest_timestamp().await?;
    Ok(Some(PruneOutcome {
        cutoff,
        removed,
        oldest_remaining,
    }))
}

async fn run_server(config: CadenceConfig) -> Result<()> {
    let report = validate(&config, true);
    for warning in &report.warnings {
        warn!(warning = %warning, "Config warning");
    }
    if !report.is_valid() {
        for err in &report.errors {
            error!(error = %err, "Config error");
        }
        anyhow::bail!("Invalid configuration ({} errors)", report.errors.len());
    }

    let token = config
        .discord
        .bot_token
        .clone()
        .context("discord.bot_token is required to serve")?;

    info!(
        db = %config.database.path,
        interval_secs = config.poller.poll_interval_seconds,
        api_enabled = config.api.enabled,
        "Starting cadence"
    );

    let db = Database::open(&config.database.path)?;
    let alert_store = AlertStore::open(&config.database.path)?;
    let supervisor = Arc::new(Supervisor::new(alert_store));

    let (broadcast_tx, _) = broadcast::channel(100);
    supervisor.set_broadcast_tx(broadcast_tx.clone()).await;

    let mut bus = CadenceBus::new();
    let scheduler_rx = bus.take_scheduler_rx().context("scheduler rx already taken")?;
    let supervisor_rx = bus.take_supervisor_rx().context("supervisor rx already taken")?;

    let activity: Arc<dyn ActivityLog> = Arc::new(db.events());
    let grant = Arc::new(DiscordGrantAction::new(&token, config.discord.audit_reason.clone()));
    let scheduler = PollScheduler::new(
        Arc::new(db.rules()),
        Arc::clone(&activity),
        grant,
        config::poll_config(&config),
        AlertSink::new(bus.supervisor_tx.clone()),
    );
    let status_rx = scheduler.subscribe();

    let supervisor_ref = Arc::clone(&supervisor);
    let supervisor_task = tokio::spawn(async move {
        if let Err(e) = Component::start(&*supervisor_ref, supervisor_rx).await {
            error!(error = %e, "Supervisor task failed");
        }
    });

    let mut scheduler_task =
        tokio::spawn(async move { Component::start(&scheduler, scheduler_rx).await });

    let adapter = DiscordAdapter::new(token, Arc::clone(&activity));
    tokio::spawn(async move {
        if let Err(e) = adapter.start().await {
            error!(adapter = adapter.name(), error = %e, "Channel adapter stopped");
        }
    });

    if config.api.enabled {
        let app_state = Arc::new(AppState {
            supervisor: Arc::clone(&supervisor),
            rules: db.rules(),
            status_rx,
            scheduler_tx: bus.scheduler_tx.clone(),
            broadcast_tx,
        });
        let app = api::build_router(app_state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());
        let addr = format!("{}:{}", config.api.bind_address, config.api.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP API to {addr}"))?;
        info!(addr = %addr, "HTTP API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "HTTP API stopped");
            }
        });
    }

    info!("All components started");

    let scheduler_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            let _ = bus.scheduler_tx.send(Message::Shutdown).await;
            (&mut scheduler_task).await
        }
        result = &mut scheduler_task => result,
    };

    let _ = bus.supervisor_tx.send(Message::Shutdown).await;
    let _ = supervisor_task.await;

    scheduler_result.context("Poll scheduler task panicked")??;
    info!("cadence stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{ActivityEvent, ChannelId, ChannelScope, NewRule, RoleId, ServerId, UserId};

    #[test]
    fn test_api_base_url_uses_loopback_for_wildcard() {
        let mut config = CadenceConfig::default();
        config.api.bind_address = "0.0.0.0".to_string();
        config.api.port = 9000;
        assert_eq!(api_base_url(&config), "http://127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_prune_uses_retention_cutoff() {
        let db = Database::in_memory().unwrap();
        let events = db.events();
        let now = Utc::now().timestamp();
        for ts in [now - 10 * 86_400, now - 60] {
            events
                .append(ActivityEvent::new(ServerId(1), ChannelId(2), UserId(3), ts))
                .await
                .unwrap();
        }

        // No rules: nothing is pruned.
        assert!(prune(&db, &CadenceConfig::default(), None).await.unwrap().is_none());
        assert_eq!(events.count().await.unwrap(), 2);

        db.rules()
            .create_rule(NewRule {
                server_id: ServerId(1),
                time_period: 3_600,
                role_id: RoleId(10),
                message_count: 1,
                channel_scope: ChannelScope::AllChannels,
            })
            .await
            .unwrap();
        let outcome = prune(&db, &CadenceConfig::default(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.oldest_remaining, Some(now - 60));
        assert_eq!(events.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let db = Database::in_memory().unwrap();
        let events = db.events();
        let now = Utc::now().timestamp();
        events
            .append(ActivityEvent::new(ServerId(1), ChannelId(2), UserId(3), now - 7_200))
            .await
            .unwrap();
        let outcome = prune(&db, &CadenceConfig::default(), Some("1h"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.oldest_remaining, None);
        assert_eq!(events.count().await.unwrap(), 0);
    }
}
