// src/writer.rs
use std::fmt;

use log::{debug, info, warn};

use crate::error::{NdefError, TransportError};
use crate::ndef::{DEFAULT_LANGUAGE, NdefMessage, TextRecordPayload};

/// NDEF status reported by a tag before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdefStatus {
    NotSupported,
    ReadOnly,
    ReadWrite,
    Unknown,
}

/// Transport to a single discovered tag.
///
/// One session backs one write attempt. `invalidate` ends the session and
/// must tolerate being called on a session that never connected.
pub trait TagSession {
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Returns the tag's NDEF status and the number of bytes available for a payload.
    async fn query_status(&mut self) -> Result<(NdefStatus, usize), TransportError>;

    async fn write(&mut self, message: &NdefMessage) -> Result<(), TransportError>;

    fn invalidate(&mut self, message: &str);
}

/// Terminal result of one write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    CapacityExceeded,
    EncodingFailed,
    NotSupported,
    ReadOnly,
    TransportError(String),
    UnknownStatus,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success)
    }

    /// Whether the presentation layer should play its confirmation cue.
    pub fn plays_cue(&self) -> bool {
        self.is_success()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOutcome::Success => "Success",
            WriteOutcome::CapacityExceeded => "CapacityExceeded",
            WriteOutcome::EncodingFailed => "EncodingFailed",
            WriteOutcome::NotSupported => "NotSupported",
            WriteOutcome::ReadOnly => "ReadOnly",
            WriteOutcome::TransportError(_) => "TransportError",
            WriteOutcome::UnknownStatus => "UnknownStatus",
        }
    }

    /// Human-readable status shown to the user.
    pub fn status_message(&self) -> String {
        match self {
            WriteOutcome::Success => "Text written to the tag successfully!".into(),
            WriteOutcome::CapacityExceeded => "Text does not fit on this tag".into(),
            WriteOutcome::EncodingFailed => "Text could not be encoded as an NDEF record".into(),
            WriteOutcome::NotSupported => "Tag does not support NDEF".into(),
            WriteOutcome::ReadOnly => "Tag is read-only".into(),
            WriteOutcome::TransportError(message) => message.clone(),
            WriteOutcome::UnknownStatus => "Unknown tag status".into(),
        }
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_message())
    }
}

impl From<TransportError> for WriteOutcome {
    fn from(err: TransportError) -> Self {
        WriteOutcome::TransportError(err.to_string())
    }
}

/// Encodes text as a single NDEF text record and writes it to a tag.
#[derive(Debug, Clone)]
pub struct NdefTextWriter {
    language_code: String,
}

impl Default for NdefTextWriter {
    fn default() -> Self {
        Self {
            language_code: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl NdefTextWriter {
    pub fn new(language_code: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
        }
    }

    pub fn build_text_record(
        text: &str,
        language_code: &str,
    ) -> Result<TextRecordPayload, NdefError> {
        TextRecordPayload::new(text, language_code)
    }

    /// Runs one attempt against `session` and invalidates it exactly once.
    pub async fn attempt_write<S: TagSession>(&self, session: &mut S, text: &str) -> WriteOutcome {
        let outcome = self.run(session, text).await;

        match &outcome {
            WriteOutcome::Success => info!("Write attempt succeeded"),
            other => warn!("Write attempt ended with {}: {}", other.kind(), other),
        }

        session.invalidate(&outcome.status_message());
        outcome
    }

    async fn run<S: TagSession>(&self, session: &mut S, text: &str) -> WriteOutcome {
        if let Err(e) = session.connect().await {
            return e.into();
        }

        let capacity = match session.query_status().await {
            Ok((NdefStatus::ReadWrite, capacity)) => capacity,
            Ok((NdefStatus::NotSupported, _)) => return WriteOutcome::NotSupported,
            Ok((NdefStatus::ReadOnly, _)) => return WriteOutcome::ReadOnly,
            Ok((NdefStatus::Unknown, _)) => return WriteOutcome::UnknownStatus,
            Err(e) => return e.into(),
        };

        let payload = match Self::build_text_record(text, &self.language_code) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to build text record: {}", e);
                return WriteOutcome::EncodingFailed;
            }
        };

        // Partial writes are not permitted, reject before touching the tag
        if payload.serialized_len() > capacity {
            debug!(
                "Payload of {} bytes exceeds tag capacity of {} bytes",
                payload.serialized_len(),
                capacity
            );
            return WriteOutcome::CapacityExceeded;
        }

        debug!("Text record language {:?}", payload.language_code());
        let message = NdefMessage::single(payload.into_record());
        debug!("Writing NDEF message {}", hex::encode(message.encode()));

        match session.write(&message).await {
            Ok(()) => WriteOutcome::Success,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSession {
        connect_error: bool,
        status: Option<(NdefStatus, usize)>,
        write_error: bool,
        queries: usize,
        writes: Vec<NdefMessage>,
        invalidations: Vec<String>,
    }

    impl MockSession {
        fn with_status(status: NdefStatus, capacity: usize) -> Self {
            Self {
                status: Some((status, capacity)),
                ..Default::default()
            }
        }
    }

    impl TagSession for MockSession {
        async fn connect(&mut self) -> Result<(), TransportError> {
            if self.connect_error {
                return Err(TransportError::NotConnected);
            }
            Ok(())
        }

        async fn query_status(&mut self) -> Result<(NdefStatus, usize), TransportError> {
            self.queries += 1;
            self.status.ok_or(TransportError::Status(vec![0x63, 0x00]))
        }

        async fn write(&mut self, message: &NdefMessage) -> Result<(), TransportError> {
            self.writes.push(message.clone());
            if self.write_error {
                return Err(TransportError::Status(vec![0x6A, 0x82]));
            }
            Ok(())
        }

        fn invalidate(&mut self, message: &str) {
            self.invalidations.push(message.to_string());
        }
    }

    #[test]
    fn test_build_text_record() {
        let payload = NdefTextWriter::build_text_record("Hello", "en").unwrap();
        assert_eq!(b"\x02enHello".to_vec(), payload.to_bytes());

        assert!(NdefTextWriter::build_text_record("Hello", &"x".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn test_success_writes_single_text_record() {
        let mut session = MockSession::with_status(NdefStatus::ReadWrite, 100);
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(WriteOutcome::Success, outcome);
        assert!(outcome.plays_cue());
        assert_eq!(1, session.writes.len());

        let message = &session.writes[0];
        assert_eq!(1, message.records.len());
        assert!(message.records[0].is_text());
        assert_eq!(None, message.records[0].id);
        assert_eq!(b"\x02enHello".to_vec(), message.records[0].payload);

        assert_eq!(vec![outcome.status_message()], session.invalidations);
    }

    #[tokio::test]
    async fn test_read_only_never_writes() {
        let mut session = MockSession::with_status(NdefStatus::ReadOnly, 100);
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(WriteOutcome::ReadOnly, outcome);
        assert!(!outcome.plays_cue());
        assert!(session.writes.is_empty());
        assert_eq!(1, session.invalidations.len());
    }

    #[tokio::test]
    async fn test_capacity_exceeded_never_writes() {
        let mut session = MockSession::with_status(NdefStatus::ReadWrite, 4);
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(WriteOutcome::CapacityExceeded, outcome);
        assert!(session.writes.is_empty());
        assert_eq!(1, session.invalidations.len());
    }

    #[tokio::test]
    async fn test_capacity_boundary() {
        for capacity in 0..16 {
            let mut session = MockSession::with_status(NdefStatus::ReadWrite, capacity);
            let outcome = NdefTextWriter::default()
                .attempt_write(&mut session, "Hello")
                .await;

            if capacity < 8 {
                assert_eq!(WriteOutcome::CapacityExceeded, outcome);
                assert!(session.writes.is_empty());
            } else {
                assert_eq!(WriteOutcome::Success, outcome);
                assert_eq!(1, session.writes.len());
            }
            assert_eq!(1, session.invalidations.len());
        }
    }

    #[tokio::test]
    async fn test_status_branches() {
        let cases = [
            (NdefStatus::NotSupported, WriteOutcome::NotSupported),
            (NdefStatus::ReadOnly, WriteOutcome::ReadOnly),
            (NdefStatus::Unknown, WriteOutcome::UnknownStatus),
        ];

        for (status, expected) in cases {
            let mut session = MockSession::with_status(status, 100);
            let outcome = NdefTextWriter::default()
                .attempt_write(&mut session, "Hello")
                .await;

            assert_eq!(expected, outcome);
            assert!(session.writes.is_empty());
            assert_eq!(1, session.invalidations.len());
        }
    }

    #[tokio::test]
    async fn test_encoding_failure_never_writes() {
        let mut session = MockSession::with_status(NdefStatus::ReadWrite, 100);
        let outcome = NdefTextWriter::new("ру")
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(WriteOutcome::EncodingFailed, outcome);
        assert!(session.writes.is_empty());
        assert_eq!(1, session.invalidations.len());
    }

    #[tokio::test]
    async fn test_query_failure_is_transport_error() {
        let mut session = MockSession::default();
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(
            WriteOutcome::TransportError("Card returned status [63, 00]".into()),
            outcome
        );
        assert!(session.writes.is_empty());
        assert_eq!(vec!["Card returned status [63, 00]".to_string()], session.invalidations);
    }

    #[tokio::test]
    async fn test_connect_failure_skips_query() {
        let mut session = MockSession {
            connect_error: true,
            ..MockSession::with_status(NdefStatus::ReadWrite, 100)
        };
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(WriteOutcome::TransportError("Not connected to a tag".into()), outcome);
        assert_eq!(0, session.queries);
        assert_eq!(1, session.invalidations.len());
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_transport_message() {
        let mut session = MockSession {
            write_error: true,
            ..MockSession::with_status(NdefStatus::ReadWrite, 100)
        };
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, "Hello")
            .await;

        assert_eq!(
            WriteOutcome::TransportError("Card returned status [6A, 82]".into()),
            outcome
        );
        assert_eq!(1, session.writes.len());
        assert_eq!(1, session.invalidations.len());
    }

    #[tokio::test]
    async fn test_long_text_fits_large_tag() {
        let text = "z".repeat(200);
        let mut session = MockSession::with_status(NdefStatus::ReadWrite, 500);
        let outcome = NdefTextWriter::default()
            .attempt_write(&mut session, &text)
            .await;

        assert_eq!(WriteOutcome::Success, outcome);
        assert_eq!(text, session.writes[0].text().unwrap().text());
    }
}
