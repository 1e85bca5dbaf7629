//! `GET /ws`: each connection becomes one hub observer.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::hub::BroadcastHub;

const TARGET: &str = "sharelist::http::ws";
/// Heartbeat intervals a client may stay silent before it is considered gone.
const MISSED_PONGS_ALLOWED: u32 = 2;

#[derive(Clone)]
pub struct WsState {
    pub hub: BroadcastHub,
    pub ping_interval: Duration,
}

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| serve_observer(socket, state.hub, state.ping_interval))
}

/// Pump hub snapshots into the socket until either side goes away.
///
/// The observer is unregistered on every exit path.
pub async fn serve_observer(socket: WebSocket, hub: BroadcastHub, ping_interval: Duration) {
    let mut subscription = hub.register();
    let observer_id = subscription.id();
    let (mut outbound, mut inbound) = socket.split();
    info!(target = TARGET, observer_id, "observer connected");

    let mut heartbeat = tokio::time::interval(ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!(target = TARGET, observer_id, "hub released observer");
                    break;
                };
                if let Err(err) = outbound.send(Message::Text(snapshot.payload().into())).await {
                    debug!(target = TARGET, observer_id, error = %err, "write failed");
                    break;
                }
            }
            incoming = inbound.next() => {
                if matches!(incoming, Some(Ok(_))) {
                    last_seen = Instant::now();
                }
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if outbound.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(target = TARGET, observer_id, error = %err, "read failed");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if client_silent(last_seen, Instant::now(), ping_interval) {
                    info!(target = TARGET, observer_id, "no pong from observer; closing");
                    break;
                }
                if outbound.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.unregister(observer_id);
    info!(target = TARGET, observer_id, "observer disconnected");
}

fn client_silent(last_seen: Instant, now: Instant, ping_interval: Duration) -> bool {
    now.saturating_duration_since(last_seen) > ping_interval * MISSED_PONGS_ALLOWED
}
