// src/apdu.rs
use pcsc::Card;

use crate::error::TransportError;

// Type 2 tags are addressed in 4-byte pages
pub const PAGE_SIZE: usize = 4;

const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

// Read: FF B0 00 Page Len
pub fn read_binary_command(page: u8, length: u8) -> [u8; 5] {
    [0xFF, 0xB0, 0x00, page, length]
}

// Write: FF D6 00 Page Len [Data]
pub fn update_binary_command(page: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, page, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu
}

/// Strips the trailing status word, failing unless it is 90 00.
pub fn check_status(resp: &[u8]) -> Result<&[u8], TransportError> {
    match resp.len().checked_sub(2) {
        Some(split) if resp[split..] == SW_SUCCESS => Ok(&resp[..split]),
        _ => Err(TransportError::Status(resp.to_vec())),
    }
}

fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut recv_buffer = [0u8; 258];
    let resp = card.transmit(apdu, &mut recv_buffer)?;
    Ok(check_status(resp)?.to_vec())
}

pub fn read_binary(card: &Card, page: u8, length: u8) -> Result<Vec<u8>, TransportError> {
    transmit(card, &read_binary_command(page, length))
}

pub fn update_binary(card: &Card, page: u8, data: &[u8]) -> Result<(), TransportError> {
    transmit(card, &update_binary_command(page, data)).map(|_| ())
}
