mod apdu;
mod config;
mod error;
mod ndef;
mod nfc_service;
mod tag;
mod types;
mod writer;
mod ws;

use clap::Parser;
use crossbeam_channel::unbounded;
use log::{error, info};
use tokio::sync::broadcast;

use crate::config::Config;

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = Config::parse();

    let writer = match config.writer() {
        Ok(writer) => writer,
        Err(e) => {
            error!("Invalid language code {:?}: {}", config.language, e);
            std::process::exit(2);
        }
    };
    info!("Starting NFC text writer (language {:?})...", config.language);

    // WS -> NFC (Commands); crossbeam because the NFC thread blocks on PC/SC
    let (cmd_tx, cmd_rx) = unbounded::<types::NfcCommand>();

    // NFC -> WS (Events)
    let (event_tx, event_rx) = broadcast::channel::<types::OutgoingMessage>(100);

    // NFC thread -> bridge -> broadcast
    let (bridge_tx, bridge_rx) = unbounded::<types::OutgoingMessage>();

    std::thread::spawn(move || {
        nfc_service::run(writer, bridge_tx, cmd_rx);
    });

    std::thread::spawn(move || {
        while let Ok(msg) = bridge_rx.recv() {
            let _ = event_tx.send(msg);
        }
    });

    ws::start_server(config.listen_addr(), cmd_tx, event_rx).await;
}
