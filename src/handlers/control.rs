//! HTTP endpoints: health, liveness, channel lookup and playback control

use log::error;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::constants::DEFAULT_SCROLL_LINES;
use crate::core::message::{ClientMessage, ScrollDirection};
use crate::core::server::SharedRelayServer;
use crate::handlers::with_server;

/// A playback action triggered over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    ScrollForward(u32),
    ScrollBack(u32),
    Top,
    Bottom,
}

impl ControlAction {
    pub fn message(&self) -> ClientMessage {
        match *self {
            Self::Start => ClientMessage::Start,
            Self::Stop => ClientMessage::Pause,
            Self::ScrollForward(lines) => ClientMessage::ScrollLines {
                direction: ScrollDirection::Forward,
                lines,
                smooth: true,
            },
            Self::ScrollBack(lines) => ClientMessage::ScrollLines {
                direction: ScrollDirection::Backward,
                lines,
                smooth: true,
            },
            Self::Top => ClientMessage::GoToBeginning,
            Self::Bottom => ClientMessage::GoToEnd,
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            Self::Start => "Playback started".to_string(),
            Self::Stop => "Playback stopped".to_string(),
            Self::ScrollForward(lines) => format!("Scrolled forward {} line(s)", lines),
            Self::ScrollBack(lines) => format!("Scrolled back {} line(s)", lines),
            Self::Top => "Scrolled to top".to_string(),
            Self::Bottom => "Scrolled to end".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    success: bool,
    message: String,
    recipients: usize,
}

async fn health_handler(server: SharedRelayServer) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&server.health().await))
}

async fn channel_info_handler(
    channel: String,
    server: SharedRelayServer,
) -> Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&server.channel_info(&channel).await))
}

async fn control_handler(
    channel: String,
    action: ControlAction,
    server: SharedRelayServer,
) -> Result<impl Reply, Infallible> {
    let (status, body) = match server.send_control(&channel, &action.message()).await {
        Ok(recipients) => (
            StatusCode::OK,
            ControlResponse {
                success: true,
                message: action.describe(),
                recipients,
            },
        ),
        Err(e) => {
            error!("Control {:?} on channel {} failed: {}", action, channel, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ControlResponse {
                    success: false,
                    message: format!("Failed: {}", action.describe().to_lowercase()),
                    recipients: 0,
                },
            )
        }
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Health, liveness and channel-scoped playback control routes
pub fn control_routes(
    server: SharedRelayServer,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::get()
        .and(warp::path!("health"))
        .and(with_server(server.clone()))
        .and_then(health_handler);

    let live = warp::get()
        .and(warp::path!("live"))
        .map(|| warp::reply::json(&json!({ "status": "alive" })));

    let channel_info = warp::get()
        .and(warp::path!("api" / "channels" / String))
        .and(with_server(server.clone()))
        .and_then(channel_info_handler);

    let start = warp::post()
        .and(warp::path!("api" / "channels" / String / "playback" / "start"))
        .and(with_server(server.clone()))
        .and_then(|channel: String, server: SharedRelayServer| {
            control_handler(channel, ControlAction::Start, server)
        });

    let stop = warp::post()
        .and(warp::path!("api" / "channels" / String / "playback" / "stop"))
        .and(with_server(server.clone()))
        .and_then(|channel: String, server: SharedRelayServer| {
            control_handler(channel, ControlAction::Stop, server)
        });

    let forward = warp::post()
        .and(warp::path!("api" / "channels" / String / "scroll" / "forward"))
        .map(|channel: String| (channel, DEFAULT_SCROLL_LINES))
        .untuple_one()
        .or(warp::post().and(warp::path!("api" / "channels" / String / "scroll" / "forward" / u32)))
        .unify()
        .and(with_server(server.clone()))
        .and_then(|channel: String, lines: u32, server: SharedRelayServer| {
            control_handler(channel, ControlAction::ScrollForward(lines), server)
        });

    let back = warp::post()
        .and(warp::path!("api" / "channels" / String / "scroll" / "back"))
        .map(|channel: String| (channel, DEFAULT_SCROLL_LINES))
        .untuple_one()
        .or(warp::post().and(warp::path!("api" / "channels" / String / "scroll" / "back" / u32)))
        .unify()
        .and(with_server(server.clone()))
        .and_then(|channel: String, lines: u32, server: SharedRelayServer| {
            control_handler(channel, ControlAction::ScrollBack(lines), server)
        });

    let top = warp::post()
        .and(warp::path!("api" / "channels" / String / "scroll" / "top"))
        .and(with_server(server.clone()))
        .and_then(|channel: String, server: SharedRelayServer| {
            control_handler(channel, ControlAction::Top, server)
        });

    let bottom = warp::post()
        .and(warp::path!("api" / "channels" / String / "scroll" / "bottom"))
        .and(with_server(server))
        .and_then(|channel: String, server: SharedRelayServer| {
            control_handler(channel, ControlAction::Bottom, server)
        });

    health
        .or(live)
        .or(channel_info)
        .or(start)
        .or(stop)
        .or(forward)
        .or(back)
        .or(top)
        .or(bottom)
}
