use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use super::Port;
use crate::core::{Error, Result, DEFAULT_BAUD_RATE};

/// Interval between checks of the receive buffer while polling
const POLL_STEP: Duration = Duration::from_millis(1);

/// Physical serial line to a real machine
pub struct SerialLinePort {
    /// Serial device path
    device: Option<String>,
    /// Configured line speed, kept while the port is closed
    baud_rate: u32,
    /// Open device handle
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLinePort {
    /// Creates a closed port with no device assigned
    pub fn new() -> Self {
        SerialLinePort {
            device: None,
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
        }
    }

    /// Sets the device used by the next `begin`
    pub fn set_device(&mut self, device: Option<&str>) {
        debug!("serial device set to {}", device.unwrap_or("<none>"));
        self.device = device.map(str::to_string);
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::invalid_state("Serial port is not open"))
    }
}

impl Default for SerialLinePort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for SerialLinePort {
    fn begin(&mut self, baud: u32) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| Error::config("No serial device configured"))?;

        self.end();
        let port = serialport::new(&device, baud)
            .timeout(Duration::from_millis(10))
            .open()?;

        info!("serial port {} opened at {} baud", device, baud);
        self.baud_rate = baud;
        self.port = Some(port);
        Ok(())
    }

    fn end(&mut self) {
        if self.port.take().is_some() {
            info!("serial port {} closed", self.device.as_deref().unwrap_or("?"));
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        let Some(port) = self.port.as_mut() else {
            thread::sleep(timeout);
            return Ok(false);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_STEP.min(deadline - now));
        }
    }

    fn available(&mut self) -> Result<usize> {
        match self.port.as_mut() {
            Some(port) => Ok(port.bytes_to_read()? as usize),
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.port_mut()?.flush()?;
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let count = self.available()?.min(buffer.len());
        if count == 0 {
            return Ok(0);
        }
        match self.port_mut()?.read(&mut buffer[..count]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.port_mut()?.write_all(buffer)?;
        Ok(buffer.len())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud)?;
        }
        self.baud_rate = baud;
        Ok(())
    }
}
