//! Legacy BLE advertising frames carrying the reading.
//!
//! The advertising packet holds flags, TX power and the manufacturer data
//! (company id followed by the payload). The device name goes in the scan
//! response so the payload always fits.

use heapless::Vec;
use thiserror_no_std::Error;

/// Maximum length of legacy advertising or scan response data.
pub const LEGACY_DATA_LEN: usize = 31;

/// Longest name that fits the scan response (two bytes of AD header).
pub const MAX_NAME_LEN: usize = LEGACY_DATA_LEN - 2;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
const AD_TYPE_TX_POWER: u8 = 0x0A;
const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// LE general discoverable, BR/EDR not supported.
const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingError {
    #[error("advertising data exceeds 31 bytes")]
    Overflow,
}

pub type AdvertisingPayload = Vec<u8, LEGACY_DATA_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingData {
    pub advertisement: AdvertisingPayload,
    pub scan_response: AdvertisingPayload,
}

impl AdvertisingData {
    pub fn new(
        name: &str,
        tx_power_dbm: i8,
        company_id: u16,
        payload: &[u8],
    ) -> Result<Self, AdvertisingError> {
        let mut advertisement = Vec::new();
        push_structure(&mut advertisement, AD_TYPE_FLAGS, &[FLAGS_GENERAL_DISCOVERABLE])?;
        push_structure(
            &mut advertisement,
            AD_TYPE_TX_POWER,
            &tx_power_dbm.to_le_bytes(),
        )?;

        let mut manufacturer: Vec<u8, LEGACY_DATA_LEN> = Vec::new();
        manufacturer
            .extend_from_slice(&company_id.to_le_bytes())
            .map_err(|_| AdvertisingError::Overflow)?;
        manufacturer
            .extend_from_slice(payload)
            .map_err(|_| AdvertisingError::Overflow)?;
        push_structure(&mut advertisement, AD_TYPE_MANUFACTURER_DATA, &manufacturer)?;

        let mut scan_response = Vec::new();
        push_structure(&mut scan_response, AD_TYPE_COMPLETE_NAME, name.as_bytes())?;

        Ok(Self {
            advertisement,
            scan_response,
        })
    }
}

fn push_structure(
    buffer: &mut AdvertisingPayload,
    ad_type: u8,
    data: &[u8],
) -> Result<(), AdvertisingError> {
    let length = u8::try_from(data.len() + 1).map_err(|_| AdvertisingError::Overflow)?;
    buffer.push(length).map_err(|_| AdvertisingError::Overflow)?;
    buffer.push(ad_type).map_err(|_| AdvertisingError::Overflow)?;
    buffer
        .extend_from_slice(data)
        .map_err(|_| AdvertisingError::Overflow)
}

/// Finds the manufacturer data structure in advertising data.
///
/// Returns the company id and the bytes following it.
pub fn find_manufacturer_data(data: &[u8]) -> Option<(u16, &[u8])> {
    let mut rest = data;
    while let [length, tail @ ..] = rest {
        let length = *length as usize;
        if length == 0 || length > tail.len() {
            return None;
        }
        let (structure, next) = tail.split_at(length);
        if let [AD_TYPE_MANUFACTURER_DATA, low, high, payload @ ..] = structure {
            return Some((u16::from_le_bytes([*low, *high]), payload));
        }
        rest = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::PAYLOAD_LEN;

    #[test]
    fn payload_fits_legacy_advertisement() {
        let payload = [0x5A; PAYLOAD_LEN];
        let data = AdvertisingData::new("sTPMS", 4, 0xFFFF, &payload).unwrap();

        assert_eq!(data.advertisement.len(), 3 + 3 + 2 + 2 + PAYLOAD_LEN);
        assert!(data.advertisement.len() <= LEGACY_DATA_LEN);
        assert_eq!(&data.advertisement[..6], &[2, 0x01, 0x06, 2, 0x0A, 4]);
        assert_eq!(
            find_manufacturer_data(&data.advertisement),
            Some((0xFFFF, &payload[..]))
        );
    }

    #[test]
    fn name_goes_in_scan_response() {
        let data = AdvertisingData::new("sTPMS", -4, 0x0059, &[1, 2]).unwrap();
        assert_eq!(data.scan_response.as_slice(), b"\x06\x09sTPMS");
        assert_eq!(data.advertisement[5], (-4i8) as u8);
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let payload = [0u8; 24];
        assert_eq!(
            AdvertisingData::new("sTPMS", 0, 0xFFFF, &payload),
            Err(AdvertisingError::Overflow)
        );
    }

    #[test]
    fn oversized_name_is_an_error() {
        let name = "this-name-is-definitely-longer-than-29";
        assert_eq!(
            AdvertisingData::new(name, 0, 0xFFFF, &[]),
            Err(AdvertisingError::Overflow)
        );
    }

    #[test]
    fn malformed_structures_are_ignored() {
        assert_eq!(find_manufacturer_data(&[5, 0xFF, 1]), None);
        assert_eq!(find_manufacturer_data(&[0]), None);
    }
}
