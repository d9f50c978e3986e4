// src/tag.rs
//! PC/SC session for NFC Forum Type 2 tags (NTAG21x, Ultralight).

use std::ffi::{CStr, CString};

use log::{debug, info, warn};
use pcsc::{Card, Context, Disposition, Protocols, ShareMode};

use crate::apdu::{self, PAGE_SIZE};
use crate::error::{NdefError, TransportError};
use crate::ndef::{self, NdefMessage};
use crate::writer::{NdefStatus, TagSession};

// Last ATR byte of a MIFARE Classic 1K, which carries no capability container
pub const CARD_TYPE_MIFARE_1K: u8 = 0x6A;

const CC_PAGE: u8 = 3;
const FIRST_DATA_PAGE: u8 = 4;
const CC_MAGIC: u8 = 0xE1;
const CC_ACCESS_READ_WRITE: u8 = 0x00;
const CC_ACCESS_READ_ONLY: u8 = 0x0F;

// Page numbers are a single byte in the reader's pseudo-APDUs
const MAX_DATA_AREA: usize = (256 - FIRST_DATA_PAGE as usize) * PAGE_SIZE;

// READ BINARY returns up to four pages at once
const READ_CHUNK: u8 = 16;

/// Decoded capability container (page 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContainer {
    pub status: NdefStatus,
    pub data_area: usize,
}

impl CapabilityContainer {
    pub fn parse(cc: &[u8]) -> Self {
        match cc {
            [CC_MAGIC, _version, size, access, ..] => {
                let status = match *access {
                    CC_ACCESS_READ_WRITE => NdefStatus::ReadWrite,
                    CC_ACCESS_READ_ONLY => NdefStatus::ReadOnly,
                    _ => NdefStatus::Unknown,
                };
                Self {
                    status,
                    data_area: (*size as usize * 8).min(MAX_DATA_AREA),
                }
            }
            _ => Self {
                status: NdefStatus::NotSupported,
                data_area: 0,
            },
        }
    }

    /// Largest text payload whose record and TLV still fit in the data area.
    pub fn payload_capacity(&self) -> usize {
        let mut capacity = self.data_area.saturating_sub(12);
        while encoded_size(capacity + 1) <= self.data_area {
            capacity += 1;
        }
        capacity
    }
}

// Bytes a single text record of `payload` bytes takes on the tag, TLV included
fn encoded_size(payload: usize) -> usize {
    // header, type length, payload length (1 or 4), 'T'
    let record = payload + if payload < 256 { 4 } else { 7 };
    record + ndef::tlv_overhead(record)
}

/// Pairs each page-sized chunk of `data` with its page number, starting at page 4.
fn pages(data: &[u8]) -> Result<Vec<(u8, &[u8])>, TransportError> {
    if data.len() > MAX_DATA_AREA {
        return Err(TransportError::DataAreaOverflow {
            needed: data.len(),
            available: MAX_DATA_AREA,
        });
    }
    Ok((FIRST_DATA_PAGE..=u8::MAX)
        .zip(data.chunks(PAGE_SIZE))
        .collect())
}

pub struct PcscTagSession<'a> {
    ctx: &'a Context,
    reader: CString,
    card: Option<Card>,
    data_area: usize,
    invalidated: bool,
}

impl<'a> PcscTagSession<'a> {
    pub fn new(ctx: &'a Context, reader: &CStr) -> Self {
        Self {
            ctx,
            reader: reader.to_owned(),
            card: None,
            data_area: 0,
            invalidated: false,
        }
    }

    fn connect_card(&mut self) -> Result<(), TransportError> {
        let card = self
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)?;
        info!("Connected to tag on {:?}", self.reader);
        self.card = Some(card);
        Ok(())
    }

    fn card(&self) -> Result<&Card, TransportError> {
        self.card.as_ref().ok_or(TransportError::NotConnected)
    }

    fn card_type(&self) -> Result<Option<u8>, TransportError> {
        let mut names_buf = [0u8; 128];
        let mut atr_buf = [0u8; 64];
        let status = self.card()?.status2(&mut names_buf, &mut atr_buf)?;
        debug!("ATR {}", hex::encode(status.atr()));
        Ok(status.atr().last().copied())
    }

    fn read_capability_container(&mut self) -> Result<CapabilityContainer, TransportError> {
        if self.card_type()? == Some(CARD_TYPE_MIFARE_1K) {
            info!("MIFARE Classic detected, no NDEF capability container");
            return Ok(CapabilityContainer::parse(&[]));
        }

        let cc = apdu::read_binary(self.card()?, CC_PAGE, PAGE_SIZE as u8)?;
        debug!("Capability container {}", hex::encode(&cc));
        let cc = CapabilityContainer::parse(&cc);
        self.data_area = cc.data_area;
        Ok(cc)
    }

    /// Reads the data area and decodes the first text record on the tag.
    pub fn read_text(&mut self) -> Result<String, TransportError> {
        if self.card.is_none() {
            self.connect_card()?;
        }

        let cc = self.read_capability_container()?;
        if cc.status == NdefStatus::NotSupported {
            return Err(NdefError::MissingTlv.into());
        }

        let mut data = Vec::new();
        let mut page = FIRST_DATA_PAGE;
        while data.len() < cc.data_area {
            data.extend(apdu::read_binary(self.card()?, page, READ_CHUNK)?);
            page = page.saturating_add(READ_CHUNK / PAGE_SIZE as u8);

            match ndef::unwrap_tlv(&data) {
                Ok(_) => break,
                Err(NdefError::Truncated(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ndef::decode_ndef_text(&data)?)
    }
}

impl TagSession for PcscTagSession<'_> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_card()
    }

    async fn query_status(&mut self) -> Result<(NdefStatus, usize), TransportError> {
        let cc = self.read_capability_container()?;
        Ok((cc.status, cc.payload_capacity()))
    }

    async fn write(&mut self, message: &NdefMessage) -> Result<(), TransportError> {
        let tlv = ndef::wrap_in_tlv(&message.encode());
        if tlv.len() > self.data_area {
            return Err(TransportError::DataAreaOverflow {
                needed: tlv.len(),
                available: self.data_area,
            });
        }

        // Pad to whole pages
        let mut padded = tlv;
        padded.resize(padded.len().div_ceil(PAGE_SIZE) * PAGE_SIZE, 0x00);

        let card = self.card()?;
        for (page, chunk) in pages(&padded)? {
            apdu::update_binary(card, page, chunk)?;
        }
        Ok(())
    }

    fn invalidate(&mut self, message: &str) {
        if self.invalidated {
            return;
        }
        self.invalidated = true;
        info!("Session invalidated: {}", message);

        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
                warn!("Failed to disconnect from tag: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capability_container() {
        // NTAG215 reports 0x3E, a 496 byte data area
        assert_eq!(
            CapabilityContainer {
                status: NdefStatus::ReadWrite,
                data_area: 496,
            },
            CapabilityContainer::parse(&[0xE1, 0x10, 0x3E, 0x00])
        );
        assert_eq!(
            NdefStatus::ReadOnly,
            CapabilityContainer::parse(&[0xE1, 0x10, 0x06, 0x0F]).status
        );
        assert_eq!(
            NdefStatus::Unknown,
            CapabilityContainer::parse(&[0xE1, 0x10, 0x06, 0x80]).status
        );
        assert_eq!(
            NdefStatus::NotSupported,
            CapabilityContainer::parse(&[0x00, 0x00, 0x00, 0x00]).status
        );
        assert_eq!(NdefStatus::NotSupported, CapabilityContainer::parse(&[]).status);
    }

    #[test]
    fn test_payload_capacity_fits_data_area() {
        for size in [0u8, 1, 6, 18, 31, 33, 62, 109] {
            let cc = CapabilityContainer::parse(&[0xE1, 0x10, size, 0x00]);
            let capacity = cc.payload_capacity();

            if cc.data_area >= encoded_size(0) {
                assert!(encoded_size(capacity) <= cc.data_area);
            }
            assert!(encoded_size(capacity + 1) > cc.data_area);
        }
    }

    #[test]
    fn test_pages_cover_full_data_area() {
        // Largest capacity on a clamped data area fills every addressable page
        let cc = CapabilityContainer::parse(&[0xE1, 0x10, 0xFF, 0x00]);
        assert_eq!(MAX_DATA_AREA, cc.data_area);
        assert_eq!(MAX_DATA_AREA, encoded_size(cc.payload_capacity()));

        let data = vec![0u8; MAX_DATA_AREA];
        let pages = pages(&data).unwrap();
        assert_eq!(252, pages.len());
        assert_eq!(Some(4), pages.first().map(|(page, _)| *page));
        assert_eq!(Some(255), pages.last().map(|(page, _)| *page));
        assert!(pages.iter().all(|(_, chunk)| chunk.len() == PAGE_SIZE));
    }

    #[test]
    fn test_pages_reject_oversized_data() {
        let data = vec![0u8; MAX_DATA_AREA + PAGE_SIZE];
        assert!(matches!(
            pages(&data),
            Err(TransportError::DataAreaOverflow { needed: 1012, available: 1008 })
        ));
    }

    #[test]
    fn test_payload_capacity_ntag213() {
        // 144 byte data area: 144 - TLV(3) - record header(4)
        let cc = CapabilityContainer::parse(&[0xE1, 0x10, 0x12, 0x00]);
        assert_eq!(137, cc.payload_capacity());
    }
}
