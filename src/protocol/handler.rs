use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::frame::{checksum, CommandFrame};
use super::{send_handshake, Handshake};
use crate::core::{Result, MAX_PAYLOAD_SIZE};
use crate::transport::Port;

/// Default bound on the wait for a declared-length payload
pub const DEFAULT_PAYLOAD_TIMEOUT: Duration = Duration::from_millis(500);

/// Handler for a command that carries no payload
pub type ImmediateFn<D> = fn(&mut D, &CommandFrame, &mut dyn Port) -> Result<()>;

/// Handler for a command whose validated payload follows the frame
pub type PayloadFn<D> = fn(&mut D, &CommandFrame, &[u8], &mut dyn Port) -> Result<()>;

/// What a command code maps to
pub enum Operation<D> {
    /// Acknowledged at once, then executed
    Immediate(ImmediateFn<D>),
    /// Acknowledged only after `aux` payload bytes and their checksum check out
    Payload(PayloadFn<D>),
}

impl<D> Clone for Operation<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Operation<D> {}

/// Dispatch table from command code to operation
pub struct CommandTable<D> {
    operations: HashMap<u8, Operation<D>>,
}

impl<D> CommandTable<D> {
    pub fn new() -> Self {
        CommandTable {
            operations: HashMap::new(),
        }
    }

    /// Registers a command that takes no payload
    pub fn immediate(mut self, code: u8, handler: ImmediateFn<D>) -> Self {
        self.operations.insert(code, Operation::Immediate(handler));
        self
    }

    /// Registers a command that takes a payload of `aux` bytes
    pub fn payload(mut self, code: u8, handler: PayloadFn<D>) -> Self {
        self.operations.insert(code, Operation::Payload(handler));
        self
    }

    pub fn get(&self, code: u8) -> Option<Operation<D>> {
        self.operations.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<D> Default for CommandTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// A peripheral answering on the bus
pub trait Device: Sized {
    /// Bus id the device answers to
    fn device_id(&self) -> u8;

    /// Commands the device understands
    fn command_table() -> CommandTable<Self>;
}

/// Where an exchange currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Waiting for a command
    Idle,
    /// Looking the command up
    Dispatch,
    /// Reading a declared-length payload
    AwaitPayload,
    /// Running the command
    Execute,
}

/// How an exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Command accepted and run
    Executed,
    /// Command code not in the table
    UnknownCommand,
    /// Declared payload exceeds `MAX_PAYLOAD_SIZE`
    PayloadTooLarge,
    /// Payload did not arrive in time
    PayloadTimeout,
    /// Payload checksum did not match
    ChecksumMismatch,
}

/// Runs one command exchange at a time against a device
pub struct FrameHandler<D: Device> {
    device: D,
    table: CommandTable<D>,
    state: ExchangeState,
    payload_timeout: Duration,
}

impl<D: Device> FrameHandler<D> {
    pub fn new(device: D) -> Self {
        Self::with_timeout(device, DEFAULT_PAYLOAD_TIMEOUT)
    }

    pub fn with_timeout(device: D, payload_timeout: Duration) -> Self {
        FrameHandler {
            device,
            table: D::command_table(),
            state: ExchangeState::Idle,
            payload_timeout,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Handles one command frame to completion
    ///
    /// Integrity faults and unknown commands are answered with `Nak` and
    /// reported through the outcome; only transport faults are returned as
    /// errors. The handler is back in `Idle` either way.
    pub fn process(&mut self, frame: &CommandFrame, port: &mut dyn Port) -> Result<ExchangeOutcome> {
        let result = self.exchange(frame, port);
        self.transition(ExchangeState::Idle);
        if let Ok(outcome) = &result {
            debug!("command {:#04x} on device {:#04x}: {:?}", frame.command, frame.device, outcome);
        }
        result
    }

    fn exchange(&mut self, frame: &CommandFrame, port: &mut dyn Port) -> Result<ExchangeOutcome> {
        self.transition(ExchangeState::Dispatch);

        let Some(operation) = self.table.get(frame.command) else {
            send_handshake(port, Handshake::Nak)?;
            return Ok(ExchangeOutcome::UnknownCommand);
        };

        match operation {
            Operation::Immediate(handler) => {
                send_handshake(port, Handshake::Ack)?;
                self.transition(ExchangeState::Execute);
                handler(&mut self.device, frame, port)?;
            }
            Operation::Payload(handler) => {
                let length = frame.aux() as usize;
                if length > MAX_PAYLOAD_SIZE {
                    send_handshake(port, Handshake::Nak)?;
                    return Ok(ExchangeOutcome::PayloadTooLarge);
                }

                self.transition(ExchangeState::AwaitPayload);
                let payload = match self.receive_payload(length, port)? {
                    Ok(payload) => payload,
                    Err(outcome) => {
                        send_handshake(port, Handshake::Nak)?;
                        return Ok(outcome);
                    }
                };

                send_handshake(port, Handshake::LateAck)?;
                self.transition(ExchangeState::Execute);
                handler(&mut self.device, frame, &payload, port)?;
            }
        }

        Ok(ExchangeOutcome::Executed)
    }

    /// Reads `length` payload bytes and the trailing checksum
    ///
    /// A zero-length payload has no data frame on the wire.
    fn receive_payload(
        &self,
        length: usize,
        port: &mut dyn Port,
    ) -> Result<std::result::Result<Vec<u8>, ExchangeOutcome>> {
        if length == 0 {
            return Ok(Ok(Vec::new()));
        }

        let mut buffer = vec![0u8; length + 1];
        if !read_within(port, &mut buffer, self.payload_timeout)? {
            return Ok(Err(ExchangeOutcome::PayloadTimeout));
        }

        let received = buffer[length];
        buffer.truncate(length);
        if checksum(&buffer) != received {
            return Ok(Err(ExchangeOutcome::ChecksumMismatch));
        }
        Ok(Ok(buffer))
    }

    fn transition(&mut self, next: ExchangeState) {
        if self.state != next {
            trace!("exchange {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Fills `buffer` from the port, giving up once `timeout` has passed
fn read_within(port: &mut dyn Port, buffer: &mut [u8], timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    loop {
        let count = port.read(&mut buffer[filled..])?;
        filled += count;
        if filled == buffer.len() {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        if count == 0 {
            port.poll(deadline - now)?;
        }
    }
}
