//! Secret injector - mutating admission webhook for 1Password Connect

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tracing::{info, warn};

use injector_common::telemetry::{init_logging, LogFormat};
use injector_common::{Error, InjectorConfig, DEFAULT_WEBHOOK_PORT};
use injector_webhook::{webhook_router, WebhookState};

/// How long in-flight admission requests may take to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Secret injector - rewrites opted-in pods to run under `op run`
#[derive(Parser, Debug)]
#[command(name = "secret-injector", version, about, long_about = None)]
struct Cli {
    /// HTTPS port the webhook listens on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    port: u16,

    /// PEM certificate presented to the API server
    #[arg(
        long,
        env = "WEBHOOK_TLS_CERT_FILE",
        default_value = "/etc/webhook/certs/cert.pem"
    )]
    tls_cert_file: PathBuf,

    /// PEM private key matching the certificate
    #[arg(
        long,
        env = "WEBHOOK_TLS_KEY_FILE",
        default_value = "/etc/webhook/certs/key.pem"
    )]
    tls_key_file: PathBuf,

    /// 1Password Connect address injected as OP_CONNECT_HOST
    #[arg(long, env = "OP_CONNECT_HOST")]
    connect_host: String,

    /// Secret holding the Connect token
    #[arg(long, env = "OP_CONNECT_TOKEN_NAME")]
    connect_token_name: String,

    /// Key within the Connect token secret
    #[arg(long, env = "OP_CONNECT_TOKEN_KEY")]
    connect_token_key: String,

    /// Namespace whose pods are never mutated (repeatable)
    ///
    /// Defaults to kube-system and kube-public when not given.
    #[arg(long = "ignored-namespace")]
    ignored_namespaces: Vec<String>,

    /// Log output format: json or text
    #[arg(long, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_logging(cli.log_format)?;

    let config = InjectorConfig::new(
        cli.connect_host.as_str(),
        cli.connect_token_name.as_str(),
        cli.connect_token_key.as_str(),
    )?
    .with_ignored_namespaces(cli.ignored_namespaces.iter().cloned());

    info!(
        connect_host = %config.connect_host,
        token_secret = %config.token_secret_name,
        ignored_namespaces = ?config.ignored_namespaces,
        "Starting secret injector"
    );

    serve(&cli, config).await?;

    info!("Secret injector stopped");
    Ok(())
}

/// Serve the admission routes over TLS until a shutdown signal arrives
async fn serve(cli: &Cli, config: InjectorConfig) -> Result<(), Error> {
    let state = Arc::new(WebhookState::new(config));
    let app = webhook_router(state);

    let tls_config = RustlsConfig::from_pem_file(&cli.tls_cert_file, &cli.tls_key_file)
        .await
        .map_err(|e| {
            Error::tls(format!(
                "failed to load {} / {}: {}",
                cli.tls_cert_file.display(),
                cli.tls_key_file.display(),
                e
            ))
        })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!(addr = %addr, "Listening for admission reviews");

    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::server(e.to_string()))
}

/// Begin a graceful shutdown on SIGINT or SIGTERM
async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
