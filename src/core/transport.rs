//! Byte-stream transport to the game server
//!
//! `Transport` is the seam between a session and the network. The TCP
//! implementation speaks telnet; tests substitute an in-memory script.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::telnet::{self, TelnetFilter};

/// A connected byte stream
pub trait Transport: Send {
    /// Write the whole message
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever arrives within `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to read,
    /// `Ok(Some(0))` means the peer closed the connection.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Read bytes that are already buffered, without waiting
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Release the connection
    fn shutdown(&mut self);
}

/// Opens transports; shared by every session of an orchestrator
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn Transport>>;

    /// Human-readable peer name for logs and errors
    fn describe(&self) -> String;
}

/// Telnet over TCP
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let mut last_err = io::Error::new(ErrorKind::NotFound, "no address resolved");
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(TcpTransport::new(stream)));
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct TcpTransport {
    stream: TcpStream,
    filter: TelnetFilter,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            filter: TelnetFilter::new(),
        }
    }

    /// Run raw bytes through the telnet filter, answering negotiations.
    /// Returns how many data bytes were copied into `buf`.
    fn filter_into(&mut self, raw: &[u8], buf: &mut [u8]) -> io::Result<usize> {
        let (data, replies) = self.filter.process(raw);
        if !replies.is_empty() {
            self.stream.write_all(&replies)?;
        }
        // `raw` is never longer than `buf`, and filtering only shrinks it
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl Transport for TcpTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(&telnet::escape(data))
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        let mut raw = vec![0u8; buf.len()];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // A zero timeout would mean "block forever"
            self.stream.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

            match self.stream.read(&mut raw) {
                Ok(0) => return Ok(Some(0)),
                Ok(n) => {
                    let copied = self.filter_into(&raw[..n], buf)?;
                    // Pure negotiation traffic: keep waiting for data
                    if copied > 0 {
                        return Ok(Some(copied));
                    }
                }
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut raw = vec![0u8; buf.len()];
        self.stream.set_nonblocking(true)?;
        let result = self.stream.read(&mut raw);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(0) => Ok(Some(0)),
            Ok(n) => {
                let copied = self.filter_into(&raw[..n], buf)?;
                if copied > 0 {
                    Ok(Some(copied))
                } else {
                    Ok(None)
                }
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
