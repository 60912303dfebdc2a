//! Bus service loop
//!
//! Waits for activity on a transport, assembles command frames and hands the
//! ones addressed to our device to its [`FrameHandler`]. Exactly one exchange
//! runs at a time, on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, info, trace, warn};

use crate::core::{Config, Error, Result};
use crate::protocol::{CommandFrameCodec, Device, ExchangeOutcome, FrameHandler, COMMAND_FRAME_LEN};
use crate::transport::Port;

/// Serves one device over one transport
pub struct BusService<D: Device, P: Port> {
    handler: FrameHandler<D>,
    transport: P,
    codec: CommandFrameCodec,
    buffer: BytesMut,
    poll_interval: Duration,
}

impl<D: Device, P: Port> BusService<D, P> {
    pub fn new(device: D, transport: P, config: &Config) -> Self {
        BusService {
            handler: FrameHandler::with_timeout(device, config.payload_timeout),
            transport,
            codec: CommandFrameCodec::new(),
            buffer: BytesMut::with_capacity(COMMAND_FRAME_LEN),
            poll_interval: config.poll_interval,
        }
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    /// Transport access between exchanges, e.g. to switch variants
    pub fn transport_mut(&mut self) -> &mut P {
        &mut self.transport
    }

    pub fn handler(&self) -> &FrameHandler<D> {
        &self.handler
    }

    pub fn device(&self) -> &D {
        self.handler.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.handler.device_mut()
    }

    /// Runs at most one exchange, waiting up to the poll interval for input
    ///
    /// Returns `None` when no complete frame for this device was handled.
    pub fn service(&mut self) -> Result<Option<ExchangeOutcome>> {
        if self.transport.available()? == 0 && !self.transport.poll(self.poll_interval)? {
            return Ok(None);
        }
        self.fill_frame()?;

        let frame = match self.codec.decode(&mut self.buffer) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(Error::Protocol(msg)) => {
                warn!("dropping byte: {}", msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let device_id = self.handler.device().device_id();
        if frame.device != device_id {
            trace!("ignoring frame for device {:#04x}", frame.device);
            return Ok(None);
        }

        debug!(
            "command {:#04x} aux {:#06x} for device {:#04x}",
            frame.command,
            frame.aux(),
            frame.device
        );
        let outcome = self.handler.process(&frame, &mut self.transport)?;
        Ok(Some(outcome))
    }

    /// Like [`service`](Self::service), but survives transport faults
    ///
    /// A lost connection or failed read/write abandons the current exchange:
    /// partial frame bytes and unread input are discarded and `None` is
    /// returned. Configuration and state errors are still returned.
    pub fn step(&mut self) -> Result<Option<ExchangeOutcome>> {
        match self.service() {
            Err(fault @ (Error::Io(_) | Error::Transport(_) | Error::Serial(_))) => {
                warn!("transport fault, exchange abandoned: {}", fault);
                self.buffer.clear();
                if let Err(e) = self.transport.flush_input() {
                    debug!("flush after fault failed: {}", e);
                }
                Ok(None)
            }
            result => result,
        }
    }

    /// Services the bus until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        info!("bus service started");
        while running.load(Ordering::Relaxed) {
            self.step()?;
        }
        info!("bus service stopped");
        Ok(())
    }

    /// Reads no further than the end of the current command frame, so payload
    /// bytes stay on the transport for the handler
    fn fill_frame(&mut self) -> Result<()> {
        let wanted = COMMAND_FRAME_LEN.saturating_sub(self.buffer.len());
        if wanted == 0 {
            return Ok(());
        }
        let mut chunk = [0u8; COMMAND_FRAME_LEN];
        let count = self.transport.read(&mut chunk[..wanted])?;
        self.buffer.extend_from_slice(&chunk[..count]);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::TransportMode;
    use crate::protocol::{data_frame, CommandFrame, ACK, COMPLETE, NAK};
    use crate::time::{TimeDevice, APETIME_DEVICE_ID, CMD_GET_TZ_TIME, CMD_SET_TZ};
    use crate::transport::{MemoryPort, TransportSelector};
    use std::sync::Arc;
    use std::thread;

    fn fixed_clock() -> i64 {
        1_710_506_096
    }

    fn config() -> Config {
        Config {
            payload_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn service() -> BusService<TimeDevice, TransportSelector<MemoryPort, MemoryPort>> {
        let selector = TransportSelector::with_ports(MemoryPort::new(19200), MemoryPort::new(19200));
        BusService::new(TimeDevice::with_clock(fixed_clock), selector, &config())
    }

    #[test]
    fn test_idle_bus() {
        let mut bus = service();
        assert_eq!(bus.service().unwrap(), None);
    }

    #[test]
    fn test_set_timezone_then_query() {
        let mut bus = service();
        let port = bus.transport_mut().serial_mut();
        port.push_rx(&CommandFrame::new(APETIME_DEVICE_ID, CMD_SET_TZ, 4).to_bytes());
        port.push_rx(&data_frame(b"EST5"));
        port.push_rx(&CommandFrame::new(APETIME_DEVICE_ID, CMD_GET_TZ_TIME, 0).to_bytes());

        assert_eq!(bus.service().unwrap(), Some(ExchangeOutcome::Executed));
        assert_eq!(bus.device().timezone(), Some("EST5"));
        assert_eq!(bus.service().unwrap(), Some(ExchangeOutcome::Executed));

        let tx = bus.transport_mut().serial_mut().take_tx();
        assert_eq!(&tx[..4], &[ACK, COMPLETE, ACK, COMPLETE]);
        assert_eq!(&tx[4..10], &[15, 3, 24, 7, 34, 56]);
    }

    #[test]
    fn test_frames_for_other_devices_ignored() {
        let mut bus = service();
        let port = bus.transport_mut().serial_mut();
        port.push_rx(&CommandFrame::new(0x31, 0x52, 1).to_bytes());

        assert_eq!(bus.service().unwrap(), None);
        assert!(bus.transport().serial().tx().is_empty());
    }

    #[test]
    fn test_noise_is_skipped() {
        let mut bus = service();
        let port = bus.transport_mut().serial_mut();
        port.push_rx(&[0xAA]);
        port.push_rx(&CommandFrame::new(APETIME_DEVICE_ID, 0xFF, 0).to_bytes());

        let mut outcome = None;
        for _ in 0..4 {
            outcome = bus.service().unwrap();
            if outcome.is_some() {
                break;
            }
        }
        assert_eq!(outcome, Some(ExchangeOutcome::UnknownCommand));
        assert_eq!(bus.transport().serial().tx(), &[NAK]);
    }

    #[test]
    fn test_switch_transport_between_exchanges() {
        let mut bus = service();
        bus.transport_mut().begin(57600).unwrap();
        bus.transport_mut().reconfigure(TransportMode::Becker).unwrap();
        assert_eq!(bus.transport().baud_rate(), 57600);

        let query = CommandFrame::new(APETIME_DEVICE_ID, CMD_GET_TZ_TIME, 0).to_bytes();
        bus.transport_mut().becker_mut().push_rx(&query);
        assert_eq!(bus.service().unwrap(), Some(ExchangeOutcome::Executed));

        assert!(bus.transport().serial().tx().is_empty());
        assert_eq!(bus.transport().becker().tx()[0], ACK);
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let mut bus = service();
        let running = AtomicBool::new(false);
        bus.run(&running).unwrap();
    }

    #[test]
    fn test_step_recovers_from_transport_fault() {
        let mut bus = service();
        let query = CommandFrame::new(APETIME_DEVICE_ID, CMD_GET_TZ_TIME, 0).to_bytes();
        let port = bus.transport_mut().serial_mut();
        port.set_fail_writes(true);
        port.push_rx(&query);
        port.push_rx(&query[..2]);

        // The acknowledgement cannot be sent; unread input is discarded
        assert_eq!(bus.step().unwrap(), None);
        assert_eq!(bus.transport().serial().pending_rx(), 0);

        let port = bus.transport_mut().serial_mut();
        port.set_fail_writes(false);
        port.push_rx(&query);
        assert_eq!(bus.step().unwrap(), Some(ExchangeOutcome::Executed));
        assert_eq!(bus.transport().serial().tx()[0], ACK);
    }

    #[test]
    fn test_service_reports_transport_fault() {
        let mut bus = service();
        let port = bus.transport_mut().serial_mut();
        port.set_fail_writes(true);
        port.push_rx(&CommandFrame::new(APETIME_DEVICE_ID, CMD_GET_TZ_TIME, 0).to_bytes());

        assert!(matches!(bus.service(), Err(Error::Transport(_))));
    }

    #[test]
    fn test_run_keeps_serving_after_fault() {
        let mut bus = service();
        let port = bus.transport_mut().serial_mut();
        port.set_fail_writes(true);
        port.push_rx(&CommandFrame::new(APETIME_DEVICE_ID, CMD_GET_TZ_TIME, 0).to_bytes());

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = thread::spawn(move || {
            let result = bus.run(&flag);
            (bus, result)
        });

        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::Relaxed);
        let (bus, result) = worker.join().unwrap();

        assert!(result.is_ok());
        assert_eq!(bus.transport().serial().pending_rx(), 0);
    }
}
