use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::debug;

use crate::args::{TcpFraming, TransportKind};
use crate::error::{AppError, AppResult, DistributedError, ValidationError};

use super::envelope::{self, Envelope};

/// Upper bound for one TCP message; scenario archives travel this way.
pub const MAX_TCP_MESSAGE_BYTES: usize = 64 * 1024 * 1024;
/// Largest payload a single UDP datagram can carry.
pub const MAX_UDP_MESSAGE_BYTES: usize = 65_507;
/// Bound on reading one accepted TCP connection.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Fire-and-forget sender: one connection (or datagram) per envelope.
#[derive(Debug, Clone, Copy)]
pub struct Messenger {
    protocol: TransportKind,
    framing: TcpFraming,
    send_timeout: Option<Duration>,
}

impl Messenger {
    #[must_use]
    pub const fn new(protocol: TransportKind, framing: TcpFraming) -> Self {
        Self {
            protocol,
            framing,
            send_timeout: None,
        }
    }

    #[must_use]
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Sends `envelope` to `address` without waiting for any reply.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding, connecting or writing fails, or when
    /// the configured send timeout elapses.
    pub async fn send(&self, address: &str, envelope: &Envelope) -> AppResult<()> {
        let payload = envelope::encode(envelope)?;
        let send = async {
            match self.protocol {
                TransportKind::Tcp => send_tcp(address, &payload, self.framing).await,
                TransportKind::Udp => send_udp(address, &payload).await,
            }
        };
        match self.send_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send).await.map_err(|_elapsed| {
                AppError::distributed(DistributedError::SendTimeout {
                    addr: address.to_owned(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })?,
            None => send.await,
        }
    }
}

async fn send_tcp(address: &str, payload: &[u8], framing: TcpFraming) -> AppResult<()> {
    if payload.len() > MAX_TCP_MESSAGE_BYTES {
        return Err(AppError::distributed(
            DistributedError::WireMessageTooLarge {
                max_bytes: MAX_TCP_MESSAGE_BYTES,
            },
        ));
    }
    let mut stream = TcpStream::connect(address).await.map_err(|err| {
        AppError::distributed(DistributedError::Connection {
            addr: address.to_owned(),
            source: err,
        })
    })?;
    let mut buffer = Vec::with_capacity(payload.len().saturating_add(4));
    if framing == TcpFraming::LengthPrefixed {
        let len = u32::try_from(payload.len()).map_err(|_overflow| {
            AppError::distributed(DistributedError::WireMessageTooLarge {
                max_bytes: MAX_TCP_MESSAGE_BYTES,
            })
        })?;
        buffer.extend_from_slice(&len.to_be_bytes());
    }
    buffer.extend_from_slice(payload);
    stream.write_all(&buffer).await.map_err(|err| {
        AppError::distributed(DistributedError::Io {
            context: "send tcp message",
            source: err,
        })
    })?;
    stream.shutdown().await.map_err(|err| {
        AppError::distributed(DistributedError::Io {
            context: "close tcp message",
            source: err,
        })
    })
}

async fn send_udp(address: &str, payload: &[u8]) -> AppResult<()> {
    if payload.len() > MAX_UDP_MESSAGE_BYTES {
        return Err(AppError::distributed(
            DistributedError::WireMessageTooLarge {
                max_bytes: MAX_UDP_MESSAGE_BYTES,
            },
        ));
    }
    let target = resolve(address).await?;
    let local = if target.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    let socket = UdpSocket::bind(local).await.map_err(|err| {
        AppError::distributed(DistributedError::Bind {
            addr: local.to_string(),
            source: err,
        })
    })?;
    socket.send_to(payload, target).await.map_err(|err| {
        AppError::distributed(DistributedError::Connection {
            addr: address.to_owned(),
            source: err,
        })
    })?;
    Ok(())
}

/// Resolves `host:port`, preferring an IPv4 address.
///
/// Listeners bind `0.0.0.0`, so a name that also resolves to `::1` must
/// still reach them.
///
/// # Errors
///
/// Returns an error when the lookup fails or yields nothing.
pub async fn resolve(address: &str) -> AppResult<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(address)
        .await
        .map_err(|err| {
            AppError::validation(ValidationError::InvalidAddress {
                value: address.to_owned(),
                source: err,
            })
        })?
        .collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            AppError::validation(ValidationError::UnresolvedAddress {
                value: address.to_owned(),
            })
        })
}

#[derive(Debug)]
enum Socket {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

/// Receiving side of [`Messenger`].
#[derive(Debug)]
pub struct Listener {
    socket: Socket,
    framing: TcpFraming,
}

impl Listener {
    /// Binds a listener on `address`.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be bound.
    pub async fn bind(address: &str, protocol: TransportKind, framing: TcpFraming) -> AppResult<Self> {
        let bind_err = |err: std::io::Error| {
            AppError::distributed(DistributedError::Bind {
                addr: address.to_owned(),
                source: err,
            })
        };
        let socket = match protocol {
            TransportKind::Tcp => Socket::Tcp(TcpListener::bind(address).await.map_err(bind_err)?),
            TransportKind::Udp => Socket::Udp(UdpSocket::bind(address).await.map_err(bind_err)?),
        };
        Ok(Self { socket, framing })
    }

    /// # Errors
    ///
    /// Returns an error when the socket address cannot be read.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        let addr = match &self.socket {
            Socket::Tcp(listener) => listener.local_addr(),
            Socket::Udp(socket) => socket.local_addr(),
        };
        addr.map_err(|err| {
            AppError::distributed(DistributedError::Io {
                context: "read local address",
                source: err,
            })
        })
    }

    /// Waits for the next envelope and returns it with the sender address.
    ///
    /// # Errors
    ///
    /// Returns an error when accepting, reading or decoding fails; the
    /// listener stays usable for the next message.
    pub async fn recv(&self) -> AppResult<(Envelope, SocketAddr)> {
        match &self.socket {
            Socket::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(|err| {
                    AppError::distributed(DistributedError::Io {
                        context: "accept tcp connection",
                        source: err,
                    })
                })?;
                let bytes = tokio::time::timeout(RECEIVE_TIMEOUT, read_tcp(stream, self.framing))
                    .await
                    .map_err(|_elapsed| {
                        AppError::distributed(DistributedError::Io {
                            context: "read tcp message",
                            source: std::io::ErrorKind::TimedOut.into(),
                        })
                    })??;
                debug!("Received {} bytes from {}", bytes.len(), peer);
                Ok((envelope::decode(&bytes)?, peer))
            }
            Socket::Udp(socket) => {
                let mut buffer = vec![0u8; MAX_UDP_MESSAGE_BYTES];
                let (len, peer) = socket.recv_from(&mut buffer).await.map_err(|err| {
                    AppError::distributed(DistributedError::Io {
                        context: "receive udp datagram",
                        source: err,
                    })
                })?;
                buffer.truncate(len);
                debug!("Received {} byte datagram from {}", len, peer);
                Ok((envelope::decode(&buffer)?, peer))
            }
        }
    }
}

async fn read_tcp(mut stream: TcpStream, framing: TcpFraming) -> AppResult<Vec<u8>> {
    let io_err = |err: std::io::Error| {
        AppError::distributed(DistributedError::Io {
            context: "read tcp message",
            source: err,
        })
    };
    match framing {
        TcpFraming::Eof => {
            let limit = u64::try_from(MAX_TCP_MESSAGE_BYTES)
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            let mut buffer = Vec::new();
            let mut limited = stream.take(limit);
            limited
                .read_to_end(&mut buffer)
                .await
                .map_err(io_err)?;
            if buffer.len() > MAX_TCP_MESSAGE_BYTES {
                return Err(AppError::distributed(
                    DistributedError::WireMessageTooLarge {
                        max_bytes: MAX_TCP_MESSAGE_BYTES,
                    },
                ));
            }
            Ok(buffer)
        }
        TcpFraming::LengthPrefixed => {
            let len = stream.read_u32().await.map_err(io_err)?;
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if len > MAX_TCP_MESSAGE_BYTES {
                return Err(AppError::distributed(
                    DistributedError::WireMessageTooLarge {
                        max_bytes: MAX_TCP_MESSAGE_BYTES,
                    },
                ));
            }
            let mut buffer = vec![0u8; len];
            stream.read_exact(&mut buffer).await.map_err(io_err)?;
            Ok(buffer)
        }
    }
}
