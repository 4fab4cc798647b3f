//! Local Tabill server.
//!
//! - `POST /api/create-order` creates a subscription order with the payment gateway
//! - every other request goes through the offline shell towards the app origin,
//!   so the app keeps rendering when the origin is unreachable

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tabill_core::payment::{CustomerDirectory, PaymentGateway, PaymentService, RazorpayGateway};
use tabill_core::shell::{HttpNetwork, Network, ShellWorker, Url};

use crate::app::App;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use config::ServerConfig;
use routes::{create_order_handler, shell_handler};
use state::{Payments, Shell, State};

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/create-order", post(create_order_handler).layer(cors))
        .fallback(shell_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the shell, falling back to a bucket left by an earlier run when
/// the origin cannot be reached.
async fn start_shell(shell: &Shell) -> Result<()> {
    match shell.install().await {
        Ok(()) => {
            shell.activate().await?;
        }
        Err(e) => {
            warn!(error = %e, "Shell install failed, trying existing cache");
            if !shell.resume().await? {
                warn!("No cached shell available, requests pass straight through");
            }
        }
    }
    Ok(())
}

fn build_payments(app: &App, config: &ServerConfig) -> Result<Option<Payments>> {
    let Some((key_id, key_secret)) = config.gateway_keys() else {
        warn!("Payment gateway keys missing, order creation disabled");
        return Ok(None);
    };
    let mut gateway = RazorpayGateway::new(key_id, key_secret)?;
    if let Some(ref url) = config.razorpay_api_url {
        info!(url = %url, "Using gateway base URL override");
        gateway = gateway.with_base_url(url);
    }
    let directory: Arc<dyn CustomerDirectory> = Arc::new(app.api.clone());
    let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway);
    Ok(Some(PaymentService::new(directory, gateway)))
}

pub async fn start_server(app: &App, port: Option<u16>) -> Result<()> {
    info!("Initializing state...");
    let mut config = ServerConfig::load()?;
    if let Some(port) = port {
        config.port = port;
    }

    let scope = Url::parse(&app.config.app_origin)?;
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(scope.clone())?);
    let shell = ShellWorker::new(app.shell_storage()?, network, scope);
    start_shell(&shell).await?;

    let payments = build_payments(app, &config)?;
    let address = format!("127.0.0.1:{}", config.port);
    let state = State::new(shell, payments);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!(origin = %app.config.app_origin, "Server running on http://{address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
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
}
