use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::trace;

use crate::error::TransportError;

const READ_CHUNK: usize = 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// Opens the raw stream a session runs over.
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn dial(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>> + Send;
}

// Plain TCP, no TLS.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<TcpStream, TransportError> {
        let addr = lookup_host((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::NoAddress {
                host: host.to_string(),
            })?;

        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout: connect_timeout,
                });
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Ok(stream)
    }
}

/// One live line-oriented connection.
pub struct Connection<S> {
    stream: S,
    // The previous line ended in a bare CR; its LF may still be in flight.
    swallow_lf: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            swallow_lf: false,
        }
    }

    /// Writes `text` followed by CRLF.
    pub async fn send_line(&mut self, text: &str, limit: Duration) -> Result<(), TransportError> {
        let mut data = encode_line(text);
        data.extend_from_slice(b"\r\n");

        let write = async {
            self.stream.write_all(&data).await?;
            self.stream.flush().await
        };
        match timeout(limit, write).await {
            Ok(Ok(())) => {
                trace!("C: {text}");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Send(e)),
            Err(_) => Err(TransportError::SendTimeout(limit)),
        }
    }

    /// Reads one reply line.
    ///
    /// Bytes are accumulated until they end in CR or LF. If the peer stops sending (the stream
    /// ends) with unterminated bytes buffered, those bytes are returned as the complete reply.
    /// The deadline covers the whole call and is reset on every call.
    pub async fn receive_line(&mut self, limit: Duration) -> Result<String, TransportError> {
        let deadline = Instant::now() + limit;
        let mut data: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = match timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => 0,
                Ok(Err(e)) => return Err(TransportError::Receive(e)),
                Err(_) => return Err(TransportError::ReceiveTimeout(limit)),
            };

            if read == 0 {
                if data.is_empty() {
                    return Err(TransportError::Closed);
                }
                // Stalled without a terminator.
                break;
            }

            let mut fresh = &chunk[..read];
            if self.swallow_lf {
                self.swallow_lf = false;
                if data.is_empty() {
                    fresh = fresh.strip_prefix(b"\n").unwrap_or(fresh);
                }
            }
            data.extend_from_slice(fresh);

            match data.last() {
                Some(b'\n') => break,
                Some(b'\r') => {
                    self.swallow_lf = true;
                    break;
                }
                _ => {}
            }
        }

        let line = decode_line(&data);
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!("S: {line}");
        Ok(line)
    }

    // Sends QUIT and shuts the stream down, ignoring failures.
    pub async fn quit(mut self) {
        let _ = timeout(CLOSE_TIMEOUT, async {
            self.stream.write_all(b"QUIT\r\n").await?;
            self.stream.flush().await
        })
        .await;
        self.close().await;
    }

    pub async fn close(mut self) {
        let _ = timeout(CLOSE_TIMEOUT, self.stream.shutdown()).await;
    }
}

/// Decodes reply bytes: UTF-8 (with or without signature, ASCII included), else Latin-1.
pub fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().copied().map(char::from).collect(),
    }
}

/// Encodes a command: Latin-1 for every char that fits a byte, UTF-8 for the rest.
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(byte) => out.push(byte),
            Err(_) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}

// Utility functions for analyzing SMTP replies
pub mod response_analysis {
    pub const SUCCESS_CLASS: &str = "250";

    // Sender declaration accepted: status begins with 250.
    pub fn is_success_class(reply: &str) -> bool {
        reply.starts_with(SUCCESS_CLASS)
    }

    // Candidate exists: exactly "250 " as the first four characters.
    pub fn is_verified(reply: &str) -> bool {
        reply
            .strip_prefix(SUCCESS_CLASS)
            .is_some_and(|rest| rest.starts_with(' '))
    }

    // Three-digit status code, if the line carries one.
    pub fn status_code(reply: &str) -> Option<&str> {
        let code = reply.get(..3)?;
        code.bytes().all(|b| b.is_ascii_digit()).then_some(code)
    }
}
