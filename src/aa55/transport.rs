use crate::aa55::packet::{Command, FrameFactory, HEADER_LEN, MIN_FRAME_LEN};
use crate::aa55::packet_decoder::FrameDecoder;
use crate::error::Error;
use crate::prelude::*;

use {
    async_trait::async_trait,
    bytes::BytesMut,
    std::net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    std::time::Duration,
    tokio::net::UdpSocket,
    tokio::time::timeout,
    tokio_util::codec::Decoder,
};

// the longest frame is 7 + 255 + 2 bytes
const MAX_DATAGRAM: usize = 512;

/// Moves one request/response exchange across the link. No retries here,
/// the polling cache decides what a failure means.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_and_receive(&self, command: Command) -> Result<Vec<u8>, Error>;
}

/// Picks the transport the inverter config asks for.
pub fn from_config(inverter: &config::Inverter) -> Result<Box<dyn Transport>, Error> {
    if inverter.mock() {
        info!("using canned responses instead of {}:{}", inverter.host(), inverter.port());
        return Ok(Box::new(MockTransport::new()));
    }

    Ok(Box::new(UdpTransport::new(
        inverter.host(),
        inverter.port(),
        inverter.read_timeout(),
    )?))
}

fn is_unreachable(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable
    )
}

// UdpTransport {{{
#[derive(Clone, Debug)]
pub struct UdpTransport {
    host: String,
    port: u16,
    read_timeout: Duration,
}

impl UdpTransport {
    pub fn new(host: &str, port: u16, read_timeout: Duration) -> Result<Self, Error> {
        if host.trim().is_empty() {
            return Err(Error::Configuration("no host to connect to".to_string()));
        }
        if port == 0 {
            return Err(Error::Configuration("no port to connect to".to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            read_timeout,
        })
    }

    async fn resolve(&self) -> Result<SocketAddr, Error> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                Error::Configuration(format!("{} does not resolve to any address", self.host))
            })
    }

    /// ICMP unreachable means nobody answered, which is how a sleeping
    /// inverter looks. Anything else is a local socket problem.
    fn link_error(&self, command: Command, e: std::io::Error) -> Error {
        if is_unreachable(&e) {
            debug!("{}:{} unreachable: {}", self.host, self.port, e);
            Error::ConnectionTimeout {
                command,
                timeout: self.read_timeout,
            }
        } else {
            Error::Io(e)
        }
    }

    async fn receive(
        &self,
        socket: &UdpSocket,
        addr: SocketAddr,
        command: Command,
    ) -> Result<Vec<u8>, Error> {
        let mut datagram = [0u8; MAX_DATAGRAM];

        let len = match timeout(self.read_timeout, socket.recv_from(&mut datagram)).await {
            Ok(Ok((len, peer))) => {
                if peer != addr {
                    debug!("{}:{} reply came from {}", self.host, self.port, peer);
                }
                len
            }
            Ok(Err(e)) => return Err(self.link_error(command, e)),
            Err(_) => {
                return Err(Error::ConnectionTimeout {
                    command,
                    timeout: self.read_timeout,
                })
            }
        };

        let first = &datagram[..len];
        if len < MIN_FRAME_LEN {
            return Err(Error::IncompleteResponse {
                command,
                expected: MIN_FRAME_LEN,
                received: first.to_vec(),
            });
        }

        // not our answer; don't wait on whatever length it claims
        if first[..HEADER_LEN] != command.expected_header() {
            debug!("{}:{} RX unexpected {:02x?}", self.host, self.port, first);
            return Ok(first.to_vec());
        }

        let mut buf = BytesMut::with_capacity(MAX_DATAGRAM);
        buf.extend_from_slice(first);
        let mut decoder = FrameDecoder::new();

        loop {
            if let Some(frame) = decoder.decode(&mut buf)? {
                if !buf.is_empty() {
                    warn!(
                        "discarding {} bytes trailing the {} response",
                        buf.len(),
                        command
                    );
                }
                debug!("{}:{} RX {:02x?}", self.host, self.port, &frame[..]);
                return Ok(frame.to_vec());
            }

            let len = match timeout(self.read_timeout, socket.recv_from(&mut datagram)).await {
                Ok(Ok((len, _))) => len,
                Ok(Err(e)) if !is_unreachable(&e) => return Err(Error::Io(e)),
                // gone quiet or unreachable mid-frame
                Ok(Err(_)) | Err(_) => {
                    return Err(Error::IncompleteResponse {
                        command,
                        expected: FrameDecoder::expected_len(&buf).unwrap_or(MIN_FRAME_LEN),
                        received: buf.to_vec(),
                    })
                }
            };
            buf.extend_from_slice(&datagram[..len]);
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_and_receive(&self, command: Command) -> Result<Vec<u8>, Error> {
        let addr = self.resolve().await?;
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        // a fresh socket per exchange, dropped on every return path. Left
        // unconnected: some inverters answer from another address or port.
        let socket = UdpSocket::bind(local).await?;

        debug!("{}:{} TX {:02x?}", self.host, self.port, command.bytes());
        socket
            .send_to(command.bytes(), addr)
            .await
            .map_err(|e| self.link_error(command, e))?;

        self.receive(&socket, addr, command).await
    }
} // }}}

// MockTransport {{{
pub const ID_INFO_PAYLOAD: [u8; 64] = [
    0x20, 0x20, 0x20, 0x20, 0x20, 0x47, 0x57, 0x31, 0x35, 0x30, 0x30, 0x2d,
    0x58, 0x53, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x35, 0x31, 0x35, 0x30, 0x30,
    0x53, 0x53, 0x58, 0x32, 0x31, 0x31, 0x57, 0x30, 0x34, 0x31, 0x33, 0x20,
    0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x20, 0x20, 0x20, 0x06,
];

pub const RUNNING_INFO_PAYLOAD: [u8; 60] = [
    0x06, 0xae, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x09, 0x4d, 0x00, 0x05,
    0x13, 0x8c, 0x00, 0x89, 0x00, 0x01, 0x00, 0xf1, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x7a, 0x90, 0x00, 0x00, 0x1b, 0xfc, 0x14, 0x1f, 0x00, 0x00,
    0x01, 0x95, 0x01, 0x40, 0x0e, 0xdd, 0x00, 0x06, 0x00, 0x00, 0x18, 0x01,
    0x1e, 0x0a, 0x1d, 0x05, 0x00, 0xeb, 0x00, 0x3d, 0x00, 0x0e, 0x00, 0x00,
];

/// Answers both commands with payloads captured from a GW1500-XS, framed
/// exactly as the inverter would frame them.
#[derive(Clone, Debug, Default)]
pub struct MockTransport;

impl MockTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_and_receive(&self, command: Command) -> Result<Vec<u8>, Error> {
        let payload: &[u8] = match command {
            Command::QueryIdInfo => &ID_INFO_PAYLOAD,
            Command::QueryRunningInfo => &RUNNING_INFO_PAYLOAD,
        };

        FrameFactory::response(command, payload)
    }
} // }}}
