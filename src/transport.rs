use crate::error::ScopeError;
use crate::pacing::Pacing;
use log::{debug, warn};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Timeout settings for the TCP link.
///
/// The read timeout is a single per-socket setting; there is no per-call
/// override and no cancellation once a read is in flight. A timed-out read
/// ends the in-flight query with [`ScopeError::Timeout`] and leaves the
/// instrument-side state of that command undefined; callers resynchronize
/// with `*opc?` or reconnect.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Per-socket read timeout applied to every response.
    pub read_timeout: Duration,
    /// Largest single read while accumulating a query response.
    pub max_chunk: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            max_chunk: 1024,
        }
    }
}

/// One synchronous command/response exchange point.
///
/// This is the seam between the acquisition session and the wire: the session
/// sequences commands through it, tests script it in memory.
pub trait Link {
    /// Send one newline-terminated command, expecting no response.
    fn command(&mut self, text: &str) -> Result<(), ScopeError>;

    /// Send a query and accumulate its response until it ends in a newline.
    ///
    /// Returns raw bytes: most responses are ASCII, but `curve?` replies with
    /// a binary block whose framing is parsed by the caller.
    fn query(&mut self, text: &str) -> Result<Vec<u8>, ScopeError>;
}

/// TCP transport for the instrument's line-oriented protocol.
pub struct TcpLink {
    stream: TcpStream,
    config: LinkConfig,
    pacing: Box<dyn Pacing>,
}

impl TcpLink {
    /// Connect to the instrument and apply the socket read timeout.
    ///
    /// Connect failures are surfaced as-is; there is no retry at this layer.
    pub fn connect(
        host: &str,
        port: u16,
        config: LinkConfig,
        pacing: Box<dyn Pacing>,
    ) -> Result<Self, ScopeError> {
        let addr = format!("{host}:{port}");
        let socket_addr = addr
            .as_str()
            .to_socket_addrs()
            .map_err(|e| ScopeError::Connect {
                addr: addr.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| ScopeError::Connect {
                addr: addr.clone(),
                source: io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved"),
            })?;

        let stream =
            TcpStream::connect_timeout(&socket_addr, config.connect_timeout).map_err(|e| {
                warn!("failed to connect to {addr}: {e}");
                if e.kind() == ErrorKind::TimedOut {
                    ScopeError::ConnectTimeout { addr: addr.clone() }
                } else {
                    ScopeError::Connect {
                        addr: addr.clone(),
                        source: e,
                    }
                }
            })?;
        stream
            .set_read_timeout(Some(config.read_timeout))
            .map_err(|e| ScopeError::Io {
                source: e,
                context: "setting socket read timeout".to_string(),
            })?;

        debug!("connected to {addr}");
        Ok(Self {
            stream,
            config,
            pacing,
        })
    }

    fn is_timeout(e: &io::Error) -> bool {
        // WouldBlock on unix, TimedOut on windows
        matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
    }
}

impl Link for TcpLink {
    fn command(&mut self, text: &str) -> Result<(), ScopeError> {
        debug!("-> {}", text.trim_end());
        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        self.pacing.before_send(text);

        let bytes = line.as_bytes();
        let written = self.stream.write(bytes).map_err(|e| ScopeError::Io {
            source: e,
            context: format!("sending {text:?}"),
        })?;
        if written < bytes.len() {
            return Err(ScopeError::Write {
                command: text.to_string(),
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    fn query(&mut self, text: &str) -> Result<Vec<u8>, ScopeError> {
        self.command(text)?;
        self.pacing.before_read(text);

        let mut response = Vec::new();
        let mut chunk = vec![0u8; self.config.max_chunk];
        loop {
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(ScopeError::Io {
                        source: io::Error::new(
                            ErrorKind::UnexpectedEof,
                            "connection closed by instrument",
                        ),
                        context: format!("reading response to {text:?}"),
                    });
                }
                Ok(n) => n,
                Err(e) if Self::is_timeout(&e) => {
                    return Err(ScopeError::Timeout {
                        command: text.to_string(),
                    });
                }
                Err(e) => {
                    return Err(ScopeError::Io {
                        source: e,
                        context: format!("reading response to {text:?}"),
                    });
                }
            };
            response.extend_from_slice(&chunk[..n]);
            // responses are terminated by a newline; curve? payloads carry
            // their own length header but still end the line this way
            if response.last() == Some(&b'\n') {
                break;
            }
        }
        debug!("<- {} bytes", response.len());
        Ok(response)
    }
}
