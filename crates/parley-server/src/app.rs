use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use parley_gateway::{Relay, connection};

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Legacy clients name themselves here and skip the login handshake.
    pub username: Option<String>,
}

pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .with_state(relay)
        .layer(TraceLayer::new_for_http())
}

/// Serve the relay on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, relay: Relay) -> anyhow::Result<()> {
    let app = router(relay);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn ws_upgrade(
    State(relay): State<Relay>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let legacy_username = params.username.filter(|name| !name.trim().is_empty());
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, relay, remote_addr, legacy_username)
    })
}
