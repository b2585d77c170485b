use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roombook::audit::AuditLedger;
use roombook::config::{Config, IdentityMode, MailMode};
use roombook::engine::Engine;
use roombook::http::{self, AppState};
use roombook::identity::{AdminPolicy, DirectoryProvider, FederatedProvider, IdentityProvider, Sessions, TokenRefresher};
use roombook::lifecycle::Lifecycle;
use roombook::mailer::{self, FederatedTransport, MailTransport, Outbox, RelayTransport};
use roombook::notify::LiveHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roombook=info")))
        .init();

    let config = Config::from_env()?;
    roombook::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path(), Arc::new(LiveHub::new()))?);
    info!("replayed {} bookings", engine.booking_count());

    let http_client = reqwest::Client::new();
    let sessions = Arc::new(Sessions::new(config.session_ttl_secs));
    let policy = Arc::new(AdminPolicy::new(config.admins.clone()));
    if policy.is_empty() {
        warn!("ROOMBOOK_ADMINS is empty; nobody can approve bookings");
    }

    let identity: Arc<dyn IdentityProvider> = match config.identity {
        IdentityMode::Directory => Arc::new(DirectoryProvider::new(http_client.clone(), &config.directory_url)),
        IdentityMode::Federated => Arc::new(FederatedProvider::new(http_client.clone(), &config.profile_url)),
    };

    let outbox = match config.mail {
        MailMode::Disabled => Outbox::disabled(),
        mode => {
            let transport: Arc<dyn MailTransport> = match mode {
                MailMode::Federated => {
                    let refresher = match (&config.token_url, &config.client_id) {
                        (Some(url), Some(client_id)) => {
                            Some(TokenRefresher::new(http_client.clone(), url.clone(), client_id.clone()))
                        }
                        _ => None,
                    };
                    Arc::new(FederatedTransport::new(
                        http_client.clone(),
                        &config.mail_url,
                        sessions.clone(),
                        refresher,
                        config.token_wait,
                    ))
                }
                _ => Arc::new(RelayTransport::new(http_client.clone(), &config.mail_url)),
            };
            let (outbox, rx) = Outbox::new(config.outbox_capacity);
            tokio::spawn(mailer::run_dispatcher(rx, transport));
            outbox
        }
    };

    tokio::spawn(roombook::compactor::run_compactor(engine.clone(), config.compact_threshold));

    let mut lifecycle = Lifecycle::new(engine.clone(), policy.clone(), outbox).with_self_service(config.self_service);
    if let Some(url) = &config.portal_url {
        lifecycle = lifecycle.with_portal_url(url.clone());
    }
    if let Some(url) = &config.audit_url {
        lifecycle = lifecycle.with_audit(AuditLedger::new(http_client.clone(), url));
    }

    let state = AppState {
        lifecycle: Arc::new(lifecycle),
        sessions,
        identity: identity.clone(),
    };

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("roombook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  identity: {}", identity.name());
    info!("  mail: {:?}", config.mail);
    info!("  admins: {}", policy.len());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete, {} bookings on record", engine.booking_count());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("could not register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");
}
