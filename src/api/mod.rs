//! HTTP API
//!
//! axum router exposing the node provisioning API. Handlers are thin: they
//! decode the request, call the [`Conductor`] and render the result for the
//! negotiated version.

use std::future::Future;

use axum::{
    http::{header, HeaderMap, StatusCode},
    middleware,
    routing::{get, put},
    Router,
};
use tokio::net::TcpListener;

use crate::conductor::Conductor;
use crate::error::ProvisionError;

pub mod error;
pub mod nodes;
pub mod root;
pub mod versioning;
pub mod views;

use self::error::ApiError;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub conductor: Conductor,
}

/// Scheme and authority used in links, from the request's Host header.
pub fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

async fn not_found() -> ApiError {
    ApiError::with_status(
        StatusCode::NOT_FOUND,
        ProvisionError::internal("The resource could not be found."),
    )
}

/// Build the full API router.
pub fn router(conductor: Conductor) -> Router {
    let state = AppState { conductor };

    Router::new()
        .route("/", get(root::root))
        .route("/v1", get(root::v1))
        .route("/v1/", get(root::v1))
        .route("/v1/drivers", get(root::list_drivers))
        .route("/v1/drivers/:name", get(root::get_driver))
        .route("/v1/nodes", get(nodes::list_nodes).post(nodes::create_node))
        .route("/v1/nodes/detail", get(nodes::list_nodes_detail))
        .route(
            "/v1/nodes/:ident",
            get(nodes::get_node)
                .patch(nodes::patch_node)
                .delete(nodes::delete_node),
        )
        .route("/v1/nodes/:ident/states", get(nodes::get_states))
        .route("/v1/nodes/:ident/states/provision", put(nodes::set_provision_state))
        .route("/v1/nodes/:ident/states/power", put(nodes::set_power_state))
        .route(
            "/v1/nodes/:ident/maintenance",
            put(nodes::set_maintenance).delete(nodes::clear_maintenance),
        )
        .route(
            "/v1/nodes/:ident/management/boot_device",
            get(nodes::get_boot_device).put(nodes::set_boot_device),
        )
        .route(
            "/v1/nodes/:ident/management/boot_device/supported",
            get(nodes::supported_boot_devices),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(versioning::negotiate_version))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
///
/// In-flight background actions are awaited before returning.
pub async fn serve<F>(listener: TcpListener, conductor: Conductor, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(conductor.clone());
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(listen_addr = %addr, "API listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("waiting for background actions to finish");
    conductor.wait_idle().await;
    tracing::info!("API shutdown complete");
    Ok(())
}
