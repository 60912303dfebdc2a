use std::collections::VecDeque;
use std::time::Duration;

use super::Port;
use crate::core::{Error, Result};

/// In-memory port with a scripted receive queue and a captured transmit log
///
/// Stands in for a serial line or Becker socket when testing code built on
/// this crate: slot it into a [`TransportSelector`](super::TransportSelector)
/// or a [`BusService`](crate::BusService), queue host bytes with
/// [`push_rx`](Self::push_rx) and inspect the device's replies with
/// [`tx`](Self::tx). Writes can be made to fail to exercise fault handling.
#[derive(Debug, Default)]
pub struct MemoryPort {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    baud_rate: u32,
    open: bool,
    begin_count: usize,
    fail_writes: bool,
}

impl MemoryPort {
    /// Creates a closed port with the given line speed
    pub fn new(baud_rate: u32) -> Self {
        MemoryPort {
            baud_rate,
            ..Default::default()
        }
    }

    /// Queues bytes as if they had been received from the host
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Takes everything written so far
    pub fn take_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    /// Bytes written so far
    pub fn tx(&self) -> &[u8] {
        &self.tx
    }

    /// Bytes still waiting to be read
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of times `begin` was called
    pub fn begin_count(&self) -> usize {
        self.begin_count
    }

    /// Makes every subsequent write fail, simulating a broken line
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl Port for MemoryPort {
    fn begin(&mut self, baud: u32) -> Result<()> {
        self.baud_rate = baud;
        self.open = true;
        self.begin_count += 1;
        Ok(())
    }

    fn end(&mut self) {
        self.open = false;
    }

    // Nothing can arrive while the caller waits, so there is no point sleeping.
    fn poll(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.rx.is_empty())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.rx.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let count = buffer.len().min(self.rx.len());
        for (slot, byte) in buffer.iter_mut().zip(self.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(Error::transport("write failed"));
        }
        self.tx.extend_from_slice(buffer);
        Ok(buffer.len())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.baud_rate = baud;
        Ok(())
    }
}
