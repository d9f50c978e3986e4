// src/config.rs
use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use crate::error::NdefError;
use crate::ndef::DEFAULT_LANGUAGE;
use crate::writer::NdefTextWriter;

/// Writes scanned text onto NFC tags through a PC/SC reader.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address the WebSocket server binds to
    #[arg(long, env = "NFC_SERVICE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port the WebSocket server listens on
    #[arg(long, env = "NFC_SERVICE_PORT", default_value_t = 3500)]
    pub port: u16,

    /// Language code stored in every text record
    #[arg(long, env = "NFC_TEXT_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub language: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Builds the writer, rejecting a language code that cannot be encoded.
    pub fn writer(&self) -> Result<NdefTextWriter, NdefError> {
        NdefTextWriter::build_text_record("", &self.language)?;
        Ok(NdefTextWriter::new(self.language.clone()))
    }
}
