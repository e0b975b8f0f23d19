use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, info, trace, warn};
use tokio::time::{interval, timeout, MissedTickBehavior};
use warp::ws::{Message, WebSocket};

use crate::core::server::SharedRelayServer;

// Handle a WebSocket connection bound to `channel_id`
pub async fn handle_ws_client(ws: WebSocket, channel_id: String, server: SharedRelayServer) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let connection = server.new_connection();
    let send_timeout = server.config().send_timeout;

    // Drain the connection's outbound queue into the socket. A write that
    // fails or stalls past the timeout closes the connection.
    let writer = {
        let connection = connection.clone();
        tokio::task::spawn(async move {
            while let Some(message) = connection.next_outbound().await {
                match timeout(send_timeout, ws_tx.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Failed to send to client {}: {}", connection.id, e);
                        connection.close();
                        break;
                    }
                    Err(_) => {
                        warn!(
                            "Send to client {} timed out after {:?}, disconnecting",
                            connection.id, send_timeout
                        );
                        connection.close();
                        break;
                    }
                }
            }
            if let Err(e) = ws_tx.close().await {
                debug!("Error closing socket for client {}: {}", connection.id, e);
            }
        })
    };

    if let Err(e) = server.connect(&connection, &channel_id).await {
        warn!("Client {} could not join channel {:?}: {}", connection.id, channel_id, e);
        if let Err(e) = writer.await {
            debug!("Writer task for client {} ended abnormally: {}", connection.id, e);
        }
        return;
    }

    let idle_timeout = server.config().idle_timeout;
    let mut ping = interval(server.config().ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(msg)) => {
                    connection.touch();
                    if msg.is_text() {
                        match msg.to_str() {
                            Ok(text) => {
                                let outcome = server.handle_text(&connection, text.to_string()).await;
                                trace!("Client {}: {:?}", connection.id, outcome);
                            }
                            Err(_) => debug!("Client {} sent a non-UTF-8 text frame", connection.id),
                        }
                    } else if msg.is_close() {
                        debug!("Client {} sent close frame", connection.id);
                        break;
                    } else if msg.is_binary() {
                        debug!("Discarding binary frame from client {}", connection.id);
                    }
                }
                Some(Err(e)) => {
                    debug!("WebSocket error for client {}: {}", connection.id, e);
                    break;
                }
                None => break,
            },
            _ = connection.closed() => {
                debug!("Client {} closed by the relay", connection.id);
                break;
            }
            _ = ping.tick() => {
                if connection.is_idle(idle_timeout) {
                    info!("Client {} idle for over {:?}, disconnecting", connection.id, idle_timeout);
                    break;
                }
                connection.send(Message::ping(Vec::new()));
            }
        }
    }

    server.disconnect(&connection).await;

    if let Err(e) = writer.await {
        debug!("Writer task for client {} ended abnormally: {}", connection.id, e);
    }
}
