//! Broadcast-only BLE advertiser speaking raw HCI to the controller.

use embassy_time::{Duration, Instant};
use embedded_io::{Read, Write};
use esp_radio::ble::controller::BleConnector;
use heapless::Vec;
use log::{debug, warn};

use stpms_core::advertising::{AdvertisingData, LEGACY_DATA_LEN};
use stpms_core::collaborators::{Radio, RadioError};
use stpms_core::config::Config;

const PACKET_COMMAND: u8 = 0x01;
const PACKET_EVENT: u8 = 0x04;
const EVENT_COMMAND_COMPLETE: u8 = 0x0E;

const OP_RESET: u16 = 0x0C03;
const OP_LE_SET_ADV_PARAMS: u16 = 0x2006;
const OP_LE_SET_ADV_DATA: u16 = 0x2008;
const OP_LE_SET_SCAN_RESPONSE: u16 = 0x2009;
const OP_LE_SET_ADV_ENABLE: u16 = 0x200A;

/// Scannable, not connectable.
const ADV_SCAN_IND: u8 = 0x02;
const ALL_CHANNELS: u8 = 0x07;

/// Events skipped while waiting for one command's completion.
const MAX_UNRELATED_EVENTS: usize = 8;

/// One advertising interval unit is 0.625 ms.
const INTERVAL_UNIT_US: u64 = 625;

pub struct HciAdvertiser<'d> {
    hci: BleConnector<'d>,
    device_name: &'d str,
    tx_power_dbm: i8,
    company_id: u16,
    interval_units: u16,
    airtime: Duration,
    done_at: Option<Instant>,
}

impl<'d> HciAdvertiser<'d> {
    /// Resets the controller and sets the advertising parameters.
    pub fn new(hci: BleConnector<'d>, config: &Config<'d>) -> Result<Self, RadioError> {
        let airtime_us = u64::from(config.adv_event_count)
            * u64::from(config.adv_interval_units)
            * INTERVAL_UNIT_US;
        let mut advertiser = Self {
            hci,
            device_name: config.device_name,
            tx_power_dbm: config.adv_tx_power_dbm,
            company_id: config.company_id,
            interval_units: config.adv_interval_units,
            airtime: Duration::from_micros(airtime_us),
            done_at: None,
        };

        advertiser.command(OP_RESET, &[])?;
        advertiser.set_parameters()?;
        Ok(advertiser)
    }

    fn set_parameters(&mut self) -> Result<(), RadioError> {
        let [interval_low, interval_high] = self.interval_units.to_le_bytes();
        let params = [
            interval_low,
            interval_high,
            interval_low,
            interval_high,
            ADV_SCAN_IND,
            0x00, // public own address
            0x00, // peer address type
            0, 0, 0, 0, 0, 0, // peer address
            ALL_CHANNELS,
            0x00, // no filter
        ];
        self.command(OP_LE_SET_ADV_PARAMS, &params)
    }

    fn set_data(&mut self, opcode: u16, data: &[u8]) -> Result<(), RadioError> {
        let mut params = [0u8; LEGACY_DATA_LEN + 1];
        params[0] = data.len() as u8;
        params[1..=data.len()].copy_from_slice(data);
        self.command(opcode, &params)
    }

    fn enable(&mut self, enabled: bool) -> Result<(), RadioError> {
        self.command(OP_LE_SET_ADV_ENABLE, &[u8::from(enabled)])
    }

    /// Sends one command and waits for its Command Complete event.
    fn command(&mut self, opcode: u16, params: &[u8]) -> Result<(), RadioError> {
        let mut packet: Vec<u8, 40> = Vec::new();
        let [op_low, op_high] = opcode.to_le_bytes();
        packet
            .extend_from_slice(&[PACKET_COMMAND, op_low, op_high, params.len() as u8])
            .map_err(|_| RadioError::Rejected)?;
        packet
            .extend_from_slice(params)
            .map_err(|_| RadioError::Rejected)?;
        self.hci.write_all(&packet).map_err(|e| {
            warn!("HCI write of {:#06x} failed: {:?}", opcode, e);
            RadioError::Busy
        })?;

        for _ in 0..MAX_UNRELATED_EVENTS {
            let mut header = [0u8; 3];
            let mut event = [0u8; 255];
            self.hci
                .read_exact(&mut header)
                .map_err(|_| RadioError::Busy)?;
            let [packet_type, code, length] = header;
            let body = &mut event[..length as usize];
            self.hci.read_exact(body).map_err(|_| RadioError::Busy)?;

            if packet_type != PACKET_EVENT || code != EVENT_COMMAND_COMPLETE {
                continue;
            }
            // num_hci_command_packets, opcode, status
            if let [_, low, high, status, ..] = *body {
                if u16::from_le_bytes([low, high]) != opcode {
                    continue;
                }
                if status != 0 {
                    warn!("HCI {:#06x} rejected, status {:#04x}", opcode, status);
                    return Err(RadioError::Rejected);
                }
                return Ok(());
            }
        }
        Err(RadioError::Timeout)
    }
}

impl Radio for HciAdvertiser<'_> {
    fn start_advertising(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        let data =
            AdvertisingData::new(self.device_name, self.tx_power_dbm, self.company_id, payload)?;
        self.set_data(OP_LE_SET_ADV_DATA, &data.advertisement)?;
        self.set_data(OP_LE_SET_SCAN_RESPONSE, &data.scan_response)?;
        self.enable(true)?;
        self.done_at = Some(Instant::now() + self.airtime);
        debug!("Advertising for {} ms", self.airtime.as_millis());
        Ok(())
    }

    /// Legacy advertising has no event count, so the burst is ended once its
    /// events have had time to go out.
    fn is_advertise_complete(&mut self) -> bool {
        match self.done_at {
            Some(done_at) if Instant::now() >= done_at => {
                self.done_at = None;
                if let Err(e) = self.enable(false) {
                    warn!("Stopping advertising failed: {}", e);
                }
                true
            }
            _ => false,
        }
    }
}
