use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::Port;
use crate::core::{Error, Result, DEFAULT_BAUD_RATE, DEFAULT_BECKER_HOST, DEFAULT_BECKER_PORT};

/// Interval between accept attempts while polling
const POLL_STEP: Duration = Duration::from_millis(1);

/// Upper bound on what a single `available` check reports
const PEEK_SIZE: usize = 1024;

/// DriveWire over TCP
///
/// Listens on the configured address and serves one emulator connection at a
/// time. The baud rate is kept for continuity with the serial variant but has
/// no effect on the socket.
pub struct BeckerPort {
    host: String,
    port: u16,
    baud_rate: u32,
    listener: Option<TcpListener>,
    client: Option<TcpStream>,
}

impl BeckerPort {
    pub fn new() -> Self {
        BeckerPort {
            host: DEFAULT_BECKER_HOST.to_string(),
            port: DEFAULT_BECKER_PORT,
            baud_rate: DEFAULT_BAUD_RATE,
            listener: None,
            client: None,
        }
    }

    /// Sets the listen address used by the next `begin`
    pub fn set_host(&mut self, host: &str, port: u16) {
        debug!("becker host set to {}:{}", host, port);
        self.host = host.to_string();
        self.port = port;
    }

    pub fn host(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Address the listener is bound to, if started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn bind(&self) -> Result<TcpListener> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::config(format!("Cannot resolve {}:{}", self.host, self.port)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Accepts a waiting emulator connection, returns true if one is attached
    fn accept_pending(&mut self) -> Result<bool> {
        if self.client.is_some() {
            return Ok(true);
        }
        let Some(listener) = self.listener.as_ref() else {
            return Ok(false);
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                info!("becker client connected from {}", peer);
                self.client = Some(stream);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn drop_client(&mut self) {
        if self.client.take().is_some() {
            info!("becker client disconnected");
        }
    }

    fn client_mut(&mut self) -> Result<&mut TcpStream> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::transport("No Becker client connected"))
    }
}

impl Default for BeckerPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for BeckerPort {
    fn begin(&mut self, baud: u32) -> Result<()> {
        self.end();
        let listener = self.bind()?;
        info!("becker port listening on {}:{}", self.host, self.port);
        self.listener = Some(listener);
        self.baud_rate = baud;
        Ok(())
    }

    fn end(&mut self) {
        self.drop_client();
        if self.listener.take().is_some() {
            info!("becker port closed");
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.accept_pending()? {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let client = self.client_mut()?;
                client.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;
                let mut peeked = [0u8; 1];
                let result = client.peek(&mut peeked);
                client.set_read_timeout(None)?;
                match result {
                    Ok(0) => self.drop_client(),
                    Ok(_) => return Ok(true),
                    Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                        return Ok(false)
                    }
                    Err(e) => {
                        warn!("becker client error: {}", e);
                        self.drop_client();
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_STEP.min(deadline - now));
        }
    }

    fn available(&mut self) -> Result<usize> {
        let Some(client) = self.client.as_mut() else {
            return Ok(0);
        };
        let mut peeked = [0u8; PEEK_SIZE];
        client.set_nonblocking(true)?;
        let result = client.peek(&mut peeked);
        client.set_nonblocking(false)?;
        match result {
            Ok(0) => {
                self.drop_client();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                self.drop_client();
                Err(e.into())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(client) = self.client.as_mut() {
            client.flush()?;
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        let mut scratch = [0u8; PEEK_SIZE];
        while self.read(&mut scratch)? > 0 {}
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let count = self.available()?.min(buffer.len());
        if count == 0 {
            return Ok(0);
        }
        Ok(self.client_mut()?.read(&mut buffer[..count])?)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let client = self.client_mut()?;
        if let Err(e) = client.write_all(buffer) {
            self.drop_client();
            return Err(e.into());
        }
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
