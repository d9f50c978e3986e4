// src/types.rs
use serde::{Deserialize, Serialize};

use crate::writer::WriteOutcome;

// Messages sent TO the WebSocket client (Frontend)
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    ReaderStatus {
        success: bool,
    },
    CardStatus {
        success: bool,
        message: String,
    },
    DataReadSuccess {
        data: String,
    },
    DataReadError {
        error: String,
    },
    DataWriteError {
        error: String,
    },
    ReaderError {
        error: String,
    },
    /// One per write attempt; `play_cue` asks the client for its confirmation sound.
    WriteOutcome {
        outcome: String,
        success: bool,
        message: String,
        play_cue: bool,
    },
}

impl From<&WriteOutcome> for OutgoingMessage {
    fn from(outcome: &WriteOutcome) -> Self {
        OutgoingMessage::WriteOutcome {
            outcome: outcome.kind().to_string(),
            success: outcome.is_success(),
            message: outcome.status_message(),
            play_cue: outcome.plays_cue(),
        }
    }
}

// Messages received FROM the WebSocket client
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    GetReaderStatus,
    /// Text decoded by the client's barcode scanner.
    WriteText { text: String },
}

// Internal commands sent from WS Server -> NFC Thread
#[derive(Debug)]
pub enum NfcCommand {
    Write { text: String },
    CheckReaderStatus,
}
