//! Core types shared by the transports, the protocol handler and the devices.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{Config, TransportMode};

/// Default line speed for the serial transport
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default TCP port of a Becker (DriveWire over TCP) listener
pub const DEFAULT_BECKER_PORT: u16 = 65504;

/// Default listen address of the Becker port
pub const DEFAULT_BECKER_HOST: &str = "127.0.0.1";

/// Largest payload a command may declare
pub const MAX_PAYLOAD_SIZE: usize = 1024;
