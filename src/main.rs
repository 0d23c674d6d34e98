use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dirshare::auth::{PermissionLevel, UserStore};
use dirshare::{AppState, Config, RootRegistry, StartupError, StaticPolicy, routes};

#[derive(Parser, Debug)]
#[command(name = "dirshare")]
#[command(about = "Share a directory over HTTP and WebDAV")]
#[command(version)]
struct Cli {
    /// Address to listen on (repeatable)
    #[arg(
        short,
        long = "listen",
        env = "DIRSHARE_LISTEN",
        value_delimiter = ',',
        default_value = "localhost:8080"
    )]
    listen: Vec<String>,

    /// Directory to serve
    #[arg(short, long, env = "DIRSHARE_DIR", default_value = ".")]
    dir: PathBuf,

    /// Server-wide permission level
    #[arg(short, long, env = "DIRSHARE_PERMLEVEL", value_enum, default_value = "readonly")]
    permlevel: PermissionLevel,

    /// Maximum size of one uploaded file, in MB
    #[arg(short, long, env = "DIRSHARE_MAXSIZE")]
    maxsize: Option<u64>,

    /// Credentials file (`user:password:level` per line); enables auth
    #[arg(long, env = "DIRSHARE_LOGINS")]
    logins: Option<PathBuf>,

    /// Config file path (optional)
    #[arg(short, long, env = "DIRSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "DIRSHARE_VERBOSE")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "dirshare=debug,tower_http=debug"
    } else {
        "dirshare=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn bind_all(addrs: &[String]) -> Result<Vec<(String, TcpListener)>, StartupError> {
    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|e| StartupError::from_bind_error(addr, e))?;
        listeners.push((addr.clone(), listener));
    }
    Ok(listeners)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(mb) = cli.maxsize {
        config.max_upload_size = mb.saturating_mul(1024 * 1024);
    }

    let registry = RootRegistry::new(&cli.dir).map_err(|e| StartupError::InvalidRoot {
        path: cli.dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let users = match &cli.logins {
        Some(path) => Some(
            UserStore::load(path)
                .with_context(|| format!("loading credentials from {}", path.display()))?,
        ),
        None => None,
    };

    let policy = StaticPolicy::from_level(cli.permlevel);
    let user_count = users.as_ref().map(UserStore::len);
    let max_upload_size = config.max_upload_size;
    let state = AppState::new(registry, config, policy, users);
    let root = state.registry.get();
    let app = routes::app(state);

    // Bind everything first so a busy port fails before anything is announced.
    let listeners = bind_all(&cli.listen).await?;

    info!("Serving {}", root.display());
    info!("Permission level: {}", cli.permlevel);
    match user_count {
        Some(count) => info!("Authentication enabled: {} user(s) loaded", count),
        None => info!("Authentication disabled"),
    }
    info!("Max upload size: {} MB", max_upload_size / (1024 * 1024));

    let mut servers = Vec::with_capacity(listeners.len());
    for (addr, listener) in listeners {
        let local = listener
            .local_addr()
            .with_context(|| format!("reading local address of {}", addr))?;
        info!("Listening on http://{}/ (WebDAV: http://{}/webdav/)", local, local);

        let service = app
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        servers.push(tokio::spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .with_context(|| format!("serving {}", addr))
        }));
    }

    for server in servers {
        server.await.context("server task panicked")??;
    }

    Ok(())
}
