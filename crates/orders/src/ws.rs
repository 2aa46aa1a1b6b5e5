//! WebSocket endpoint for order status updates.
//!
//! Protocol: the client's first text frame is the order id. Afterwards the
//! server pushes `{"orderId": "...", "status": "..."}` frames for that order
//! until either side closes. A first frame that is not an order id closes the
//! socket with code 1007.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::response::{IntoResponse, Response};
use common::OrderId;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::notifier::OrderNotifier;
use crate::routes::orders::AppState;
use crate::store::OrderStore;

/// Close reason sent when the first frame is not an order id.
pub const INVALID_ORDER_ID: &str = "Invalid OrderId";

/// GET /ws: upgrade to a status subscription; 400 for plain HTTP requests.
pub async fn upgrade<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => {
            let notifier = state.notifier.clone();
            ws.on_upgrade(move |socket| handle_socket(socket, notifier))
        }
        Err(rejection) => {
            debug!(%rejection, "Rejected non-WebSocket request to /ws");
            ApiError::BadRequest("Expected a WebSocket upgrade request".to_string())
                .into_response()
        }
    }
}

async fn handle_socket(mut socket: WebSocket, notifier: OrderNotifier) {
    let Some(order_id) = read_order_id(&mut socket).await else {
        return;
    };

    let mut subscription = notifier.subscribe(order_id);
    metrics::gauge!("websocket_connections_active").increment(1.0);
    info!(%order_id, connection_id = subscription.id(), "WebSocket subscribed");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = socket.send(Message::Text(event.into())).await {
                    debug!(%order_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%order_id, error = %e, "WebSocket receive failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    metrics::gauge!("websocket_connections_active").decrement(1.0);
    info!(%order_id, "WebSocket closed");
}

/// Reads the subscription request. Returns `None` once the socket is done,
/// having sent the invalid-payload close if the request was bad.
async fn read_order_id(socket: &mut WebSocket) -> Option<OrderId> {
    loop {
        let text = match socket.recv().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Binary(_))) => {
                warn!("Binary subscription frame, expected an order id");
                close_invalid(socket).await;
                return None;
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket receive failed before subscribing");
                return None;
            }
        };

        return match OrderId::parse(text.as_str()) {
            Some(order_id) => Some(order_id),
            None => {
                warn!(payload = text.as_str(), "Invalid OrderId received");
                close_invalid(socket).await;
                None
            }
        };
    }
}

async fn close_invalid(socket: &mut WebSocket) {
    let frame = CloseFrame {
        code: close_code::INVALID,
        reason: INVALID_ORDER_ID.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}
