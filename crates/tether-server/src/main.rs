//! Tether MDM Server Binary
//!
//! Bootstraps the MDM subsystems and serves the HTTP API until an
//! interrupt or a fatal listener error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tether_server::{
    create_router, interrupt_signal, serve_until, AppState, Bootstrap, ServerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "tetherd", about = "Tether MDM server", version)]
struct Args {
    /// Public HTTPS URL of this server, e.g. https://mdm.example.com
    #[arg(long = "server-url", env = "TETHER_SERVER_URL")]
    server_url: String,

    /// Path to the push certificate (PKCS#12 bundle, or certificate PEM
    /// when --apns-private-key is given)
    #[arg(
        long = "apns-certificate",
        env = "TETHER_APNS_CERTIFICATE",
        default_value = "mdm.p12"
    )]
    apns_certificate: PathBuf,

    /// Passphrase of the PKCS#12 bundle
    #[arg(
        long = "apns-password",
        env = "TETHER_APNS_PASSWORD",
        default_value = "secret"
    )]
    apns_password: String,

    /// Separate private-key PEM; switches credential loading to PEM-pair
    /// mode
    #[arg(long = "apns-private-key", env = "TETHER_APNS_PRIVATE_KEY")]
    apns_private_key: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "TETHER_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Path of the durable key/value store
    #[arg(long, env = "TETHER_STORAGE", default_value = "mdm.db")]
    storage: PathBuf,

    /// SCEP enrollment challenge
    #[arg(long, env = "TETHER_SCEP_CHALLENGE", default_value = "")]
    challenge: String,
}

impl Args {
    fn into_config(self) -> (ServerConfig, String) {
        let config = ServerConfig {
            public_url: self.server_url,
            push_cert_path: self.apns_certificate,
            push_cert_password: self.apns_password,
            push_key_path: self.apns_private_key,
            storage_path: self.storage,
            scep_challenge: self.challenge,
        };
        (config, self.listen)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(true)
        .init();

    let (config, listen) = args.into_config();

    info!(public_url = %config.public_url, "starting tetherd");

    let composed = match Bootstrap::run(config) {
        Ok(composed) => composed,
        Err(e) => {
            error!(error = %e, "bootstrap failed");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState::from(composed));
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %listen, error = %e, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %listen, "tetherd listening");

    let cause = serve_until(listener, app, interrupt_signal()).await;
    info!(cause = %cause, "tetherd terminated");
    ExitCode::SUCCESS
}
