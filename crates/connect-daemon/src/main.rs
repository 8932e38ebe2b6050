use std::sync::Arc;

use connect_daemon::apresolve::{ApResolver, EndpointResolver, Endpoints};
use connect_daemon::events::LoggingSink;
use connect_daemon::spclient::SpClient;
use connect_daemon::token::StaticTokenProvider;
use connect_daemon::transport::WsConnector;
use connect_daemon::{http, Session, SessionConfig, SessionDeps};
use connect_proto::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File log + stderr
    let data_dir = connect_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("connectd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,connect_daemon=debug,connect_proto=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let session_config = SessionConfig::from_config(&config);
    info!(
        "Device '{}' ({})",
        config.device.name, session_config.device_id
    );

    let tokens = match config.auth.resolve_token() {
        Some(token) => StaticTokenProvider::new(token),
        None => {
            warn!(
                "No access token configured; set {} or [auth].access_token",
                connect_proto::config::ACCESS_TOKEN_ENV
            );
            StaticTokenProvider::empty()
        }
    };
    let tokens = Arc::new(tokens);

    let api = Arc::new(SpClient::new(
        config.session.spclient_url.clone(),
        session_config.device_id.clone(),
        tokens.clone(),
    )?);

    let resolver: Option<Arc<dyn EndpointResolver>> = if config.session.resolve_endpoints {
        let fallback = Endpoints {
            dealer_url: config.session.dealer_url.clone(),
            spclient_url: config.session.spclient_url.clone(),
        };
        Some(Arc::new(ApResolver::new(
            config.session.apresolve_url.clone(),
            fallback,
        )?))
    } else {
        None
    };

    let deps = SessionDeps {
        connector: Arc::new(WsConnector),
        api,
        tokens,
        events: Arc::new(LoggingSink),
        resolver,
    };

    let cancel = CancellationToken::new();
    let session = Session::start(session_config, deps, cancel.clone());

    let _http_handle = if config.http.enabled {
        Some(http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            session.clone(),
        ))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    session.shutdown().await;
    Ok(())
}
