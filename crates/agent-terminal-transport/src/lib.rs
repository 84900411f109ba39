//! Transport layer for browser clients.
//!
//! Provides:
//! - Wire protocol (JSON, tagged by `type`)
//! - WebSocket sessions registered with the broadcast hub
//! - HTTP API over the workspace, router and lifecycle services

pub mod api;
pub mod protocol;
pub mod state;
pub mod websocket;

pub use api::ApiError;
pub use protocol::{ClientMessage, ServerMessage};
pub use state::AppState;

use tower_http::trace::TraceLayer;

/// Full application router: HTTP API plus `/ws`.
pub fn router(state: AppState) -> axum::Router {
    api::routes()
        .route("/ws", axum::routing::get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
