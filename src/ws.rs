// src/ws.rs
use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use warp::Filter;

use crate::types::{IncomingMessage, NfcCommand, OutgoingMessage};

pub async fn start_server(
    addr: SocketAddr,
    nfc_cmd_tx: Sender<NfcCommand>,
    mut nfc_event_rx: broadcast::Receiver<OutgoingMessage>,
) {
    // Shared Broadcast Channel for WS Clients
    let (ws_tx, _) = broadcast::channel::<OutgoingMessage>(32);
    let ws_tx = Arc::new(ws_tx);

    // Forward NFC Events -> All WS Clients
    let ws_tx_clone = ws_tx.clone();
    tokio::spawn(async move {
        while let Ok(msg) = nfc_event_rx.recv().await {
            let _ = ws_tx_clone.send(msg);
        }
    });

    info!("WebSocket server running on ws://{}", addr);
    warp::serve(routes(nfc_cmd_tx, ws_tx)).run(addr).await;
}

pub fn routes(
    nfc_cmd_tx: Sender<NfcCommand>,
    ws_tx: Arc<broadcast::Sender<OutgoingMessage>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let nfc_cmd_tx = nfc_cmd_tx.clone();
            let ws_tx = ws_tx.clone();

            ws.on_upgrade(move |socket| handle_connection(socket, nfc_cmd_tx, ws_tx))
        });

    ws_route.with(warp::cors().allow_any_origin())
}

/// Maps a client message to the command for the NFC thread, or to an immediate reply.
pub fn dispatch(msg: IncomingMessage) -> Result<NfcCommand, OutgoingMessage> {
    match msg {
        IncomingMessage::GetReaderStatus => Ok(NfcCommand::CheckReaderStatus),
        IncomingMessage::WriteText { text } if text.is_empty() => {
            Err(OutgoingMessage::DataWriteError {
                error: "Nothing to write, scanned text is empty".into(),
            })
        }
        IncomingMessage::WriteText { text } => Ok(NfcCommand::Write { text }),
    }
}

async fn handle_connection(
    ws: warp::ws::WebSocket,
    nfc_cmd_tx: Sender<NfcCommand>,
    ws_tx: Arc<broadcast::Sender<OutgoingMessage>>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let mut rx_broadcast = ws_tx.subscribe();

    // Replies meant for this client only
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<OutgoingMessage>();

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Ok(msg) = rx_broadcast.recv() => msg,
                Some(msg) = reply_rx.recv() => msg,
                else => break,
            };
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize {:?}: {}", msg, e);
                    continue;
                }
            };
            if client_ws_tx
                .send(warp::ws::Message::text(json))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Client -> NFC thread
    while let Some(result) = client_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        };
        let Ok(text) = msg.to_str() else {
            continue;
        };

        let parsed = match serde_json::from_str::<IncomingMessage>(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring malformed message: {}", e);
                continue;
            }
        };

        match dispatch(parsed) {
            Ok(cmd) => {
                if nfc_cmd_tx.send(cmd).is_err() {
                    error!("NFC thread is gone");
                    break;
                }
            }
            Err(reply) => {
                let _ = reply_tx.send(reply);
            }
        }
    }
}
