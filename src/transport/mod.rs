//! Byte-stream transports
//!
//! A [`Port`] is the uniform byte-stream contract the protocol handler talks to.
//! Two variants carry real traffic:
//!
//! - [`SerialLinePort`]: a physical serial line to a real machine
//! - [`BeckerPort`]: DriveWire over TCP, as spoken by emulators
//!
//! [`TransportSelector`] owns one instance of each and forwards every call to
//! whichever is active, so the mode can be switched at runtime without the
//! protocol layer noticing.

pub mod becker;
pub mod memory;
pub mod selector;
pub mod serial;

pub use self::becker::BeckerPort;
pub use self::memory::MemoryPort;
pub use self::selector::TransportSelector;
pub use self::serial::SerialLinePort;

use std::time::Duration;

use crate::core::Result;

/// Byte-stream capability shared by every transport variant
pub trait Port {
    /// Starts the port at the given line speed
    fn begin(&mut self, baud: u32) -> Result<()>;

    /// Stops the port; a stopped port may be started again
    fn end(&mut self);

    /// Waits up to `timeout` for activity, returning true if the port needs handling
    fn poll(&mut self, timeout: Duration) -> Result<bool>;

    /// Number of bytes that can be read without blocking
    fn available(&mut self) -> Result<usize>;

    /// Waits until all written bytes have been transmitted
    fn flush(&mut self) -> Result<()>;

    /// Discards any received but unread bytes
    fn flush_input(&mut self) -> Result<()>;

    /// Reads a single byte, `None` if nothing is available
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Reads whatever is available into `buffer`, returning the count
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Writes a single byte
    fn write_byte(&mut self, byte: u8) -> Result<usize> {
        self.write(&[byte])
    }

    /// Writes the whole buffer, returning the count
    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Current line speed
    fn baud_rate(&self) -> u32;

    /// Changes the line speed
    fn set_baud_rate(&mut self, baud: u32) -> Result<()>;
}
