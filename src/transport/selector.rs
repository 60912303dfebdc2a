use std::time::Duration;

use tracing::info;

use super::{BeckerPort, Port, SerialLinePort};
use crate::core::{Config, Result, TransportMode};

/// Owns both transport variants and forwards the byte-stream contract to the
/// active one
///
/// Both ports live for as long as the selector does, so switching keeps each
/// variant's own configuration. Calls never touch the inactive port.
pub struct TransportSelector<S: Port = SerialLinePort, B: Port = BeckerPort> {
    mode: TransportMode,
    serial: S,
    becker: B,
}

impl<S: Port, B: Port> TransportSelector<S, B> {
    /// Creates a selector over the two variants, starting in serial mode
    pub fn with_ports(serial: S, becker: B) -> Self {
        TransportSelector {
            mode: TransportMode::Serial,
            serial,
            becker,
        }
    }

    /// Currently active variant
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Points subsequent calls at the given variant without starting or stopping anything
    pub fn configure(&mut self, mode: TransportMode) {
        self.mode = mode;
    }

    /// Swaps the active variant, carrying the line speed across
    pub fn reconfigure(&mut self, mode: TransportMode) -> Result<()> {
        let baud = self.baud_rate();
        self.end();
        self.configure(mode);
        info!("transport switched to {} at {} baud", mode, baud);
        self.begin(baud)
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn becker(&self) -> &B {
        &self.becker
    }

    pub fn becker_mut(&mut self) -> &mut B {
        &mut self.becker
    }

    fn active(&self) -> &dyn Port {
        match self.mode {
            TransportMode::Serial => &self.serial,
            TransportMode::Becker => &self.becker,
        }
    }

    fn active_mut(&mut self) -> &mut dyn Port {
        match self.mode {
            TransportMode::Serial => &mut self.serial,
            TransportMode::Becker => &mut self.becker,
        }
    }
}

impl TransportSelector {
    pub fn new() -> Self {
        Self::with_ports(SerialLinePort::new(), BeckerPort::new())
    }

    /// Builds a selector with both variants preconfigured; nothing is started
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut selector = Self::new();
        selector.set_serial_device(config.serial_device.as_deref());
        selector.set_becker_host(&config.becker_host, config.becker_port);
        selector.serial.set_baud_rate(config.baud_rate)?;
        selector.becker.set_baud_rate(config.baud_rate)?;
        selector.configure(config.mode);
        Ok(selector)
    }

    pub fn set_serial_device(&mut self, device: Option<&str>) {
        self.serial.set_device(device);
    }

    pub fn serial_device(&self) -> Option<&str> {
        self.serial.device()
    }

    pub fn set_becker_host(&mut self, host: &str, port: u16) {
        self.becker.set_host(host, port);
    }

    pub fn becker_host(&self) -> (&str, u16) {
        self.becker.host()
    }
}

impl Default for TransportSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Port, B: Port> Port for TransportSelector<S, B> {
    /// A zero baud rate restarts the active port at its previous speed
    fn begin(&mut self, baud: u32) -> Result<()> {
        let baud = if baud == 0 { self.baud_rate() } else { baud };
        self.active_mut().begin(baud)
    }

    fn end(&mut self) {
        self.active_mut().end()
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        self.active_mut().poll(timeout)
    }

    fn available(&mut self) -> Result<usize> {
        self.active_mut().available()
    }

    fn flush(&mut self) -> Result<()> {
        self.active_mut().flush()
    }

    fn flush_input(&mut self) -> Result<()> {
        self.active_mut().flush_input()
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.active_mut().read_byte()
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.active_mut().read(buffer)
    }

    fn write_byte(&mut self, byte: u8) -> Result<usize> {
        self.active_mut().write_byte(byte)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.active_mut().write(buffer)
    }

    fn baud_rate(&self) -> u32 {
        self.active().baud_rate()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.active_mut().set_baud_rate(baud)
    }
}
