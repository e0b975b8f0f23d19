//! Request handlers for the relay's endpoints

pub mod control;
pub mod websocket;

use log::info;
use std::convert::Infallible;
use warp::ws::Ws;
use warp::{Filter, Rejection, Reply};

use crate::constants::WS_PATH;
use crate::core::server::SharedRelayServer;

// Re-export the websocket handler
pub use control::control_routes;
pub use websocket::handle_ws_client;

// Helper function to include the relay in request state
pub fn with_server(
    server: SharedRelayServer,
) -> impl Filter<Extract = (SharedRelayServer,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

/// All routes: `/ws/{channel}`, the HTTP control surface and static assets
pub fn routes(
    server: SharedRelayServer,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let max_message_size = server.config().max_message_size;
    let static_dir = server.config().static_dir.clone();

    // The channel is the raw path segment; no decoding or normalization
    let ws_route = warp::path(WS_PATH)
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_server(server.clone()))
        .map(move |channel: String, ws: Ws, server: SharedRelayServer| {
            info!("New websocket connection for channel {}", channel);
            ws.max_message_size(max_message_size)
                .on_upgrade(move |socket| handle_ws_client(socket, channel, server))
        });

    let index = warp::get()
        .and(warp::path::end())
        .and(warp::fs::file(static_dir.join("index.html")));
    let assets = warp::get().and(warp::fs::dir(static_dir));

    ws_route
        .or(control_routes(server))
        .or(index)
        .or(assets)
        .with(warp::log("prompter_relay::http"))
}
