mod api;
mod auth;
mod config;
mod error;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wabridge_session::SessionController;
use wabridge_shared::gateway::{GatewayFactory, UnlinkedBackend};
use wabridge_store::MessageStore;

use crate::api::AppState;
use crate::auth::AuthConfig;
use crate::config::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wabridge_server=debug")),
        )
        .init();

    info!("starting WhatsApp bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::from_env()?;
    let store = Arc::new(MessageStore::open(&config.store_dir)?);

    // The wire protocol backend is selected when the binary is assembled;
    // the bridge core only depends on the gateway trait. Without one the
    // control plane still serves, and connect attempts report the error
    // through the auth status.
    let factory: Arc<dyn GatewayFactory> = Arc::new(UnlinkedBackend);

    let controller = SessionController::new(store, factory);
    controller
        .status()
        .set_disconnected("Initializing WhatsApp bridge");

    // Auto-connect in the background so the control plane is reachable
    // immediately; a linked device reconnects, a fresh install waits for an
    // explicit connect request.
    let startup = controller.clone();
    tokio::spawn(async move {
        startup.auto_connect_on_startup().await;
    });

    let state = AppState {
        controller,
        auth: AuthConfig::new(
            &config.jwt_secret,
            &config.jwt_audience,
            &config.jwt_issuer,
        ),
        store_dir: Arc::new(config.store_dir.clone()),
    };

    let addr = config.listen_addr();
    tokio::select! {
        result = api::serve(state, &addr) => {
            if let Err(e) = result {
                error!(error = %e, "control plane server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
