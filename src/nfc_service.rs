// src/nfc_service.rs
use std::ffi::{CStr, CString};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures::executor::block_on;
use log::{debug, error, info};
use pcsc::{Context, PNP_NOTIFICATION, ReaderState, Scope, State};

use crate::tag::PcscTagSession;
use crate::types::{NfcCommand, OutgoingMessage};
use crate::writer::{NdefTextWriter, TagSession};

pub fn run(writer: NdefTextWriter, tx: Sender<OutgoingMessage>, rx: Receiver<NfcCommand>) {
    info!("Starting NFC Service (Event Driven)...");

    let ctx = match Context::establish(Scope::User) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to establish context: {}", err);
            let _ = tx.send(OutgoingMessage::ReaderError {
                error: err.to_string(),
            });
            return;
        }
    };

    let mut readers_buf = [0; 2048];
    let mut reader_names: Vec<CString> = Vec::new();

    // Index 0 tracks reader plug/unplug, the rest follow reader_names
    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];

    loop {
        // Blocks up to 500ms so queued commands are still picked up
        if let Err(err) = ctx.get_status_change(Duration::from_millis(500), &mut reader_states) {
            if err != pcsc::Error::Timeout {
                error!("PCSC Error: {}", err);
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        }

        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                NfcCommand::Write { text } => {
                    info!("Received Write Command ({} bytes)", text.len());
                    let readers = reader_states.iter().skip(1).zip(&reader_names).map(|(rs, name)| {
                        (rs.event_state().intersects(State::PRESENT), name.as_c_str())
                    });
                    match write_target(readers) {
                        Ok(reader) => handle_write_command(&ctx, &writer, reader, &text, &tx),
                        Err(error) => {
                            let _ = tx.send(OutgoingMessage::DataWriteError {
                                error: error.into(),
                            });
                        }
                    }
                }
                NfcCommand::CheckReaderStatus => {
                    refresh_readers(&ctx, &mut readers_buf, &mut reader_names, &mut reader_states, &tx);
                }
            }
        }

        let mut readers_changed = false;

        if reader_states[0].event_state().intersects(State::CHANGED) {
            info!("Hardware change detected");
            readers_changed = true;
            reader_states[0].sync_current_state();
        }

        for i in 1..reader_states.len() {
            let name = reader_names[i - 1].clone();
            let rs = &reader_states[i];

            if rs.event_state().intersects(State::CHANGED) {
                let current = rs.event_state();

                if current.intersects(State::PRESENT)
                    && !rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Inserted on {:?}", name);
                    handle_card_insertion(&ctx, &name, &tx);
                }

                if current.intersects(State::EMPTY) && rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Removed from {:?}", name);
                    let _ = tx.send(OutgoingMessage::CardStatus {
                        success: false,
                        message: "Card removed!".into(),
                    });
                }

                reader_states[i].sync_current_state();
            }
        }

        if readers_changed {
            refresh_readers(&ctx, &mut readers_buf, &mut reader_names, &mut reader_states, &tx);
        }
    }
}

fn refresh_readers(
    ctx: &Context,
    readers_buf: &mut [u8],
    reader_names: &mut Vec<CString>,
    reader_states: &mut Vec<ReaderState>,
    tx: &Sender<OutgoingMessage>,
) {
    // Keep the PnP state (index 0) and drop everything else
    reader_states.truncate(1);

    match ctx.list_readers(readers_buf) {
        Ok(iter) => {
            *reader_names = iter.map(CString::from).collect();
            for name in reader_names.iter() {
                reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
            }
        }
        Err(err) => {
            debug!("No readers listed: {}", err);
            reader_names.clear();
        }
    }

    let _ = tx.send(OutgoingMessage::ReaderStatus {
        success: !reader_names.is_empty(),
    });
}

fn handle_card_insertion(ctx: &Context, reader_name: &CStr, tx: &Sender<OutgoingMessage>) {
    let _ = tx.send(OutgoingMessage::CardStatus {
        success: true,
        message: "Card detected!".into(),
    });

    let mut session = PcscTagSession::new(ctx, reader_name);
    let message = match session.read_text() {
        Ok(text) => {
            let _ = tx.send(OutgoingMessage::DataReadSuccess { data: text });
            "Tag read"
        }
        Err(e) => {
            debug!("Read failed: {}", e);
            let _ = tx.send(OutgoingMessage::DataReadError {
                error: "Empty/Non-NDEF".into(),
            });
            "Tag has no readable text record"
        }
    };
    session.invalidate(message);
}

/// First reader holding a card, from `(card present, reader name)` pairs.
fn write_target<'a>(
    readers: impl IntoIterator<Item = (bool, &'a CStr)>,
) -> Result<&'a CStr, &'static str> {
    let mut seen_reader = false;
    for (present, name) in readers {
        if present {
            return Ok(name);
        }
        seen_reader = true;
    }

    Err(if seen_reader {
        "No card found on reader"
    } else {
        "No reader connected"
    })
}

fn handle_write_command(
    ctx: &Context,
    writer: &NdefTextWriter,
    reader: &CStr,
    text: &str,
    tx: &Sender<OutgoingMessage>,
) {
    let mut session = PcscTagSession::new(ctx, reader);
    let outcome = block_on(writer.attempt_write(&mut session, text));
    let _ = tx.send(OutgoingMessage::from(&outcome));
}
