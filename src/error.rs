// src/error.rs

/// Errors raised while building or decoding NDEF data.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NdefError {
    #[error("Language code must be ASCII")]
    LanguageNotAscii,

    #[error("Language code is {0} bytes, at most 63 fit in the status byte")]
    LanguageTooLong(usize),

    #[error("No NDEF TLV found")]
    MissingTlv,

    #[error("Truncated NDEF data: {0}")]
    Truncated(&'static str),

    #[error("UTF-16 text records are not supported")]
    Utf16Unsupported,

    #[error("No text record in NDEF message")]
    NoTextRecord,

    #[error("UTF-8 Decode Error")]
    Utf8,
}

/// Errors reported by the tag transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    Pcsc(#[from] pcsc::Error),

    #[error("Card returned status {0:02X?}")]
    Status(Vec<u8>),

    #[error("Not connected to a tag")]
    NotConnected,

    #[error("NDEF message needs {needed} bytes, tag data area holds {available}")]
    DataAreaOverflow { needed: usize, available: usize },

    #[error(transparent)]
    Ndef(#[from] NdefError),
}
