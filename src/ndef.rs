// src/ndef.rs
use std::str;

use crate::error::NdefError;

pub const TNF_WELL_KNOWN: u8 = 0x01;
pub const TEXT_RECORD_TYPE: &[u8] = b"T";
pub const DEFAULT_LANGUAGE: &str = "en";

// Status byte: bit 7 = UTF-16, bit 6 reserved, bits 5-0 = language code length
const STATUS_UTF16: u8 = 0x80;
const STATUS_LANG_LEN_MASK: u8 = 0x3F;
pub const MAX_LANGUAGE_LEN: usize = STATUS_LANG_LEN_MASK as usize;

// Record header flags
const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

// Type 2 tag TLV blocks
const TLV_NULL: u8 = 0x00;
pub const TLV_NDEF: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;

/// Payload of an NFC Forum well-known Text record, always UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecordPayload {
    language_code: String,
    text: String,
}

impl TextRecordPayload {
    /// Validates the language code and wraps the text.
    pub fn new(text: &str, language_code: &str) -> Result<Self, NdefError> {
        if !language_code.is_ascii() {
            return Err(NdefError::LanguageNotAscii);
        }
        if language_code.len() > MAX_LANGUAGE_LEN {
            return Err(NdefError::LanguageTooLong(language_code.len()));
        }

        Ok(Self {
            language_code: language_code.to_string(),
            text: text.to_string(),
        })
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status_byte(&self) -> u8 {
        // UTF-8 only, so bit 7 stays clear
        (self.language_code.len() as u8) & STATUS_LANG_LEN_MASK
    }

    /// `[status][language code][text]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.serialized_len());
        payload.push(self.status_byte());
        payload.extend_from_slice(self.language_code.as_bytes());
        payload.extend_from_slice(self.text.as_bytes());
        payload
    }

    pub fn serialized_len(&self) -> usize {
        1 + self.language_code.len() + self.text.len()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, NdefError> {
        let (&status_byte, rest) = payload
            .split_first()
            .ok_or(NdefError::Truncated("empty text payload"))?;

        if status_byte & STATUS_UTF16 != 0 {
            return Err(NdefError::Utf16Unsupported);
        }

        let lang_len = (status_byte & STATUS_LANG_LEN_MASK) as usize;
        if lang_len > rest.len() {
            return Err(NdefError::Truncated("language code"));
        }
        let (lang, text) = rest.split_at(lang_len);

        let language_code = str::from_utf8(lang).map_err(|_| NdefError::LanguageNotAscii)?;
        if !language_code.is_ascii() {
            return Err(NdefError::LanguageNotAscii);
        }
        let text = str::from_utf8(text).map_err(|_| NdefError::Utf8)?;

        Ok(Self {
            language_code: language_code.to_string(),
            text: text.to_string(),
        })
    }

    pub fn into_record(self) -> NdefRecord {
        NdefRecord {
            tnf: TNF_WELL_KNOWN,
            record_type: TEXT_RECORD_TYPE.to_vec(),
            payload: self.to_bytes(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: u8, // Type Name Format (How to interpret the type)
    pub record_type: Vec<u8>,
    pub payload: Vec<u8>,
    pub id: Option<Vec<u8>>,
}

impl NdefRecord {
    pub fn is_text(&self) -> bool {
        self.tnf == TNF_WELL_KNOWN && self.record_type == TEXT_RECORD_TYPE
    }

    fn encode_into(&self, buf: &mut Vec<u8>, mb: bool, me: bool) {
        let short = self.payload.len() < 256;
        let id = self.id.as_deref().filter(|id| !id.is_empty());

        // Bit 7: MB, Bit 6: ME, Bit 5: CF(0), Bit 4: SR, Bit 3: IL, Bits 2-0: TNF
        let mut header = self.tnf & TNF_MASK;
        if mb {
            header |= FLAG_MB;
        }
        if me {
            header |= FLAG_ME;
        }
        if short {
            header |= FLAG_SR;
        }
        if id.is_some() {
            header |= FLAG_IL;
        }

        buf.push(header);
        buf.push(self.record_type.len() as u8);
        if short {
            buf.push(self.payload.len() as u8);
        } else {
            buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        }
        if let Some(id) = id {
            buf.push(id.len() as u8);
        }
        buf.extend_from_slice(&self.record_type);
        if let Some(id) = id {
            buf.extend_from_slice(id);
        }
        buf.extend_from_slice(&self.payload);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn single(record: NdefRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let last = self.records.len().saturating_sub(1);
        for (i, record) in self.records.iter().enumerate() {
            record.encode_into(&mut buf, i == 0, i == last);
        }
        buf
    }

    pub fn parse(data: &[u8]) -> Result<Self, NdefError> {
        Ok(Self {
            records: parse_ndef_records(data)?,
        })
    }

    /// First text record in the message.
    pub fn text(&self) -> Result<TextRecordPayload, NdefError> {
        let record = self
            .records
            .iter()
            .find(|r| r.is_text())
            .ok_or(NdefError::NoTextRecord)?;
        TextRecordPayload::decode(&record.payload)
    }
}

/// Number of bytes `wrap_in_tlv` adds around a message of `len` bytes.
pub fn tlv_overhead(len: usize) -> usize {
    // T + L (1 or 3 bytes) + terminator
    if len < 0xFF { 3 } else { 5 }
}

pub fn wrap_in_tlv(ndef_bytes: &[u8]) -> Vec<u8> {
    let mut tlv = Vec::with_capacity(ndef_bytes.len() + tlv_overhead(ndef_bytes.len()));
    tlv.push(TLV_NDEF);

    if ndef_bytes.len() < 0xFF {
        tlv.push(ndef_bytes.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(ndef_bytes.len() as u16).to_be_bytes());
    }

    tlv.extend_from_slice(ndef_bytes);
    tlv.push(TLV_TERMINATOR);
    tlv
}

/// Walks the TLV blocks of a tag data area and returns the NDEF message value.
pub fn unwrap_tlv(buffer: &[u8]) -> Result<&[u8], NdefError> {
    let mut cursor = 0;

    while cursor < buffer.len() {
        let tag = buffer[cursor];
        cursor += 1;

        match tag {
            TLV_NULL => continue,
            TLV_TERMINATOR => break,
            _ => {}
        }

        let first = *buffer.get(cursor).ok_or(NdefError::Truncated("TLV length"))?;
        cursor += 1;
        let len = if first == 0xFF {
            let bytes = buffer
                .get(cursor..cursor + 2)
                .ok_or(NdefError::Truncated("TLV length"))?;
            cursor += 2;
            u16::from_be_bytes([bytes[0], bytes[1]]) as usize
        } else {
            first as usize
        };

        let value = buffer
            .get(cursor..cursor + len)
            .ok_or(NdefError::Truncated("TLV value"))?;
        if tag == TLV_NDEF {
            return Ok(value);
        }
        cursor += len;
    }

    Err(NdefError::MissingTlv)
}

pub fn parse_ndef_records(data: &[u8]) -> Result<Vec<NdefRecord>, NdefError> {
    let mut records = Vec::new();
    let mut cursor = 0;

    let take = move |cursor: &mut usize, n: usize, what: &'static str| {
        let slice = data
            .get(*cursor..*cursor + n)
            .ok_or(NdefError::Truncated(what))?;
        *cursor += n;
        Ok::<_, NdefError>(slice)
    };

    while cursor < data.len() {
        let header = take(&mut cursor, 1, "record header")?[0];
        let tnf = header & TNF_MASK;
        let is_short_record = header & FLAG_SR != 0;
        let has_id = header & FLAG_IL != 0;
        let is_me = header & FLAG_ME != 0;

        let type_len = take(&mut cursor, 1, "type length")?[0] as usize;

        // 1 byte for Short Record, 4 bytes otherwise
        let payload_len = if is_short_record {
            take(&mut cursor, 1, "payload length")?[0] as usize
        } else {
            let b = take(&mut cursor, 4, "payload length")?;
            u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
        };

        let id_len = if has_id {
            take(&mut cursor, 1, "id length")?[0] as usize
        } else {
            0
        };

        let record_type = take(&mut cursor, type_len, "record type")?.to_vec();
        let id = if has_id {
            Some(take(&mut cursor, id_len, "record id")?.to_vec())
        } else {
            None
        };
        let payload = take(&mut cursor, payload_len, "record payload")?.to_vec();

        records.push(NdefRecord {
            tnf,
            record_type,
            payload,
            id,
        });

        if is_me {
            break;
        }
    }

    Ok(records)
}

/// Decodes the text of the first text record found in a raw tag data area.
pub fn decode_ndef_text(buffer: &[u8]) -> Result<String, NdefError> {
    let message = NdefMessage::parse(unwrap_tlv(buffer)?)?;
    Ok(message.text()?.text)
}
