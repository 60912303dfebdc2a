//! retrobus: device-side emulation of a vintage peripheral bus
//!
//! The same command-frame protocol engine runs over a physical serial line or
//! a Becker port (DriveWire over TCP), switchable at runtime. The bundled
//! device is the APETIME clock, which answers time queries with optional
//! timezone override.
pub mod bus;
pub mod core;
pub mod protocol;
pub mod time;
pub mod transport;
pub mod util;

// Re-export commonly used items
pub use crate::bus::BusService;
pub use crate::core::{Config, Error, Result, TransportMode};
pub use crate::protocol::{CommandFrame, Device, FrameHandler};
pub use crate::time::TimeDevice;
pub use crate::transport::{Port, TransportSelector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
