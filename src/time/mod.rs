//! APETIME clock device
//!
//! Answers the host's time queries with a 6-byte broken-down local time and
//! keeps an optional timezone override that the zoned query honours:
//!
//! - `0x93` get time in the ambient zone
//! - `0x9A` get time in the override zone, or the ambient one if none is set
//! - `0x99` set the override; the payload is the zone name, empty clears it

mod record;
pub mod zone;

pub use self::record::{TimeRecord, TIME_RECORD_LEN};

use tracing::debug;

use crate::core::{Error, Result};
use crate::protocol::{send_handshake, send_reply, CommandFrame, CommandTable, Device, Handshake};
use crate::transport::Port;

/// Bus id of the clock device
pub const APETIME_DEVICE_ID: u8 = 0x45;

/// Get time, ambient zone
pub const CMD_GET_TIME: u8 = 0x93;

/// Set the timezone override
pub const CMD_SET_TZ: u8 = 0x99;

/// Get time, honouring the override
pub const CMD_GET_TZ_TIME: u8 = 0x9A;

/// Source of the current time in seconds since the epoch
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The clock device and its timezone override
pub struct TimeDevice {
    timezone: Option<String>,
    clock: Clock,
}

impl TimeDevice {
    pub fn new() -> Self {
        Self::with_clock(system_clock)
    }

    /// Creates a device reading time from `clock`
    pub fn with_clock(clock: Clock) -> Self {
        TimeDevice {
            timezone: None,
            clock,
        }
    }

    /// The configured override, if any
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    /// Replaces the override; `None` or an empty name clears it
    pub fn set_timezone(&mut self, zone: Option<&str>) -> Result<()> {
        match zone {
            None | Some("") => {
                debug!("TZ unset");
                self.timezone = None;
            }
            Some(zone) if zone.contains('\0') => {
                return Err(Error::config("Time zone name contains NUL"));
            }
            Some(zone) => {
                debug!("TZ set to <{}>", zone);
                self.timezone = Some(zone.to_string());
            }
        }
        Ok(())
    }

    /// Local time now, in the override zone when asked to and one is set
    pub fn current_time(&self, use_timezone: bool) -> Result<TimeRecord> {
        let zone = if use_timezone { self.timezone() } else { None };
        zone::local_time((self.clock)(), zone)
    }

    fn reply_time(&self, use_timezone: bool, port: &mut dyn Port) -> Result<()> {
        if use_timezone {
            debug!("APETIME time query (timezone)");
        } else {
            debug!("APETIME time query (classic)");
        }
        let record = self.current_time(use_timezone)?;
        debug!("returning {}", record);
        send_reply(port, &record.to_bytes())
    }

    fn get_time(&mut self, _frame: &CommandFrame, port: &mut dyn Port) -> Result<()> {
        self.reply_time(false, port)
    }

    fn get_tz_time(&mut self, _frame: &CommandFrame, port: &mut dyn Port) -> Result<()> {
        self.reply_time(true, port)
    }

    fn set_tz(&mut self, _frame: &CommandFrame, payload: &[u8], port: &mut dyn Port) -> Result<()> {
        debug!("APETIME set TZ request");

        // Hosts may pad the name with NULs
        let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let name = match std::str::from_utf8(&payload[..end]) {
            Ok(name) if !name.contains('\0') => name,
            _ => {
                debug!("rejecting malformed TZ name {:?}", payload);
                return send_handshake(port, Handshake::Error);
            }
        };

        self.set_timezone(Some(name))?;
        send_handshake(port, Handshake::Complete)
    }
}

impl Default for TimeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for TimeDevice {
    fn device_id(&self) -> u8 {
        APETIME_DEVICE_ID
    }

    fn command_table() -> CommandTable<Self> {
        CommandTable::new()
            .immediate(CMD_GET_TIME, TimeDevice::get_time)
            .payload(CMD_SET_TZ, TimeDevice::set_tz)
            .immediate(CMD_GET_TZ_TIME, TimeDevice::get_tz_time)
    }
}
