//! PRELOGIN framing for the TLS handshake.
//!
//! During a TDS 7.x handshake the TLS records do not travel bare: every
//! flight the TLS engine writes is wrapped in a PRELOGIN packet, and every
//! PRELOGIN packet that arrives is unwrapped before its payload is fed back
//! to the engine. Once the handshake finishes the tunnel steps aside and the
//! stream is a plain byte pipe for the TLS engine's application data.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const HEADER_SIZE: usize = 8;
const PACKET_TYPE_PRELOGIN: u8 = 0x12;
const STATUS_END_OF_MESSAGE: u8 = 0x01;

#[derive(Debug)]
enum ReadState {
    /// Collecting the 8-byte packet header.
    Header { buf: [u8; HEADER_SIZE], pos: usize },
    /// Passing through the packet payload.
    Payload { remaining: usize },
}

/// Stream adapter that frames TLS handshake traffic in PRELOGIN packets.
///
/// Reads and writes pass through untouched after [`Self::handshake_complete`]
/// is called.
#[derive(Debug)]
pub struct PreloginTunnel<S> {
    stream: S,
    handshaking: bool,
    packet_id: u8,

    read_state: ReadState,

    /// TLS bytes buffered by `poll_write`, framed and sent on flush.
    pending: Vec<u8>,
    /// Assembled packet currently draining to the stream.
    flush_buf: Vec<u8>,
    flush_pos: usize,
}

impl<S> PreloginTunnel<S> {
    /// Wrap a stream. `packet_id` seeds the header sequence numbers so the
    /// session counter keeps spanning the handshake.
    pub fn new(stream: S, packet_id: u8) -> Self {
        Self {
            stream,
            handshaking: true,
            packet_id,
            read_state: ReadState::Header {
                buf: [0u8; HEADER_SIZE],
                pos: 0,
            },
            pending: Vec::new(),
            flush_buf: Vec::new(),
            flush_pos: 0,
        }
    }

    /// Switch to pass-through mode.
    pub fn handshake_complete(&mut self) {
        self.handshaking = false;
    }

    /// The packet id the next wrapped packet would carry.
    pub fn next_packet_id(&self) -> u8 {
        self.packet_id
    }

    /// A reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreloginTunnel<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_read(cx, buf);
        }

        loop {
            match &mut this.read_state {
                ReadState::Header { buf: header, pos } => {
                    while *pos < HEADER_SIZE {
                        let mut header_buf = ReadBuf::new(&mut header[*pos..]);
                        match Pin::new(&mut this.stream).poll_read(cx, &mut header_buf)? {
                            Poll::Ready(()) => {
                                let n = header_buf.filled().len();
                                if n == 0 {
                                    // Clean EOF surfaces as a zero-byte read.
                                    return Poll::Ready(Ok(()));
                                }
                                *pos += n;
                            }
                            Poll::Pending => return Poll::Pending,
                        }
                    }

                    if header[0] != PACKET_TYPE_PRELOGIN {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "expected PRELOGIN packet during TLS handshake, got 0x{:02X}",
                                header[0]
                            ),
                        )));
                    }
                    let length = u16::from_be_bytes([header[2], header[3]]) as usize;
                    let remaining = length.saturating_sub(HEADER_SIZE);
                    tracing::trace!(payload = remaining, "unwrapping handshake packet");
                    this.read_state = ReadState::Payload { remaining };
                }
                ReadState::Payload { remaining } => {
                    if *remaining == 0 {
                        this.read_state = ReadState::Header {
                            buf: [0u8; HEADER_SIZE],
                            pos: 0,
                        };
                        continue;
                    }

                    let want = (*remaining).min(buf.remaining());
                    if want == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let mut scratch = vec![0u8; want];
                    let mut scratch_buf = ReadBuf::new(&mut scratch);
                    match Pin::new(&mut this.stream).poll_read(cx, &mut scratch_buf)? {
                        Poll::Ready(()) => {
                            let n = scratch_buf.filled().len();
                            if n == 0 {
                                return Poll::Ready(Ok(()));
                            }
                            buf.put_slice(&scratch[..n]);
                            *remaining -= n;
                            if *remaining == 0 {
                                this.read_state = ReadState::Header {
                                    buf: [0u8; HEADER_SIZE],
                                    pos: 0,
                                };
                            }
                            return Poll::Ready(Ok(()));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreloginTunnel<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_write(cx, buf);
        }

        // Accumulate the TLS flight; it is framed and written on flush.
        this.pending.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.handshaking {
            if this.flush_buf.is_empty() && !this.pending.is_empty() {
                let total = HEADER_SIZE + this.pending.len();
                let mut packet = Vec::with_capacity(total);
                packet.push(PACKET_TYPE_PRELOGIN);
                packet.push(STATUS_END_OF_MESSAGE);
                packet.extend_from_slice(&(total as u16).to_be_bytes());
                packet.extend_from_slice(&[0, 0]); // SPID
                packet.push(this.packet_id);
                packet.push(0); // window
                packet.extend_from_slice(&this.pending);

                this.packet_id = this.packet_id.wrapping_add(1);
                this.pending.clear();
                this.flush_buf = packet;
                this.flush_pos = 0;
                tracing::trace!(len = total, "wrapping handshake flight");
            }

            while this.flush_pos < this.flush_buf.len() {
                match Pin::new(&mut this.stream)
                    .poll_write(cx, &this.flush_buf[this.flush_pos..])?
                {
                    Poll::Ready(n) => this.flush_pos += n,
                    Poll::Pending => return Poll::Pending,
                }
            }
            this.flush_buf.clear();
            this.flush_pos = 0;
        }

        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
