use crate::config::SocketOptions;
use crate::packet::{PacketHeader, MAX_DATAGRAM_SIZE};
use crate::rate_limiter::RateLimiter;
use crate::size_literal::format_size;
use async_trait::async_trait;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::fmt::{Display, Formatter};
use std::io;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferKind {
    Recv,
    Send,
}
impl Display for BufferKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferKind::Recv => write!(f, "RCVBUF"),
            BufferKind::Send => write!(f, "SNDBUF"),
        }
    }
}

/// This is an abstraction over a UDP socket, introduced to facilitate mocking the I/O part away
///  for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> io::Result<usize>;

    fn try_send_datagram(&self, to: SocketAddr, buf: &[u8]) -> io::Result<usize>;

    /// completes when the socket is (probably) readable
    async fn readable(&self) -> io::Result<()>;

    fn try_recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn buffer_size(&self, kind: BufferKind) -> io::Result<usize>;

    fn set_buffer_size(&self, kind: BufferKind, size: usize) -> io::Result<()>;

    /// Sets the buffer size beyond the system wide maximum, which requires privileges. Fails
    ///  with `Unsupported` where the OS has no such option.
    fn force_buffer_size(&self, kind: BufferKind, size: usize) -> io::Result<()>;
}

#[async_trait]
impl DatagramSocket for UdpSocket {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> io::Result<usize> {
        self.send_to(buf, to).await
    }

    fn try_send_datagram(&self, to: SocketAddr, buf: &[u8]) -> io::Result<usize> {
        self.try_send_to(buf, to)
    }

    async fn readable(&self) -> io::Result<()> {
        UdpSocket::readable(self).await
    }

    fn try_recv_datagram(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.try_recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }

    fn buffer_size(&self, kind: BufferKind) -> io::Result<usize> {
        let sock = SockRef::from(self);
        match kind {
            BufferKind::Recv => sock.recv_buffer_size(),
            BufferKind::Send => sock.send_buffer_size(),
        }
    }

    fn set_buffer_size(&self, kind: BufferKind, size: usize) -> io::Result<()> {
        let sock = SockRef::from(self);
        match kind {
            BufferKind::Recv => sock.set_recv_buffer_size(size),
            BufferKind::Send => sock.set_send_buffer_size(size),
        }
    }

    #[cfg(target_os = "linux")]
    fn force_buffer_size(&self, kind: BufferKind, size: usize) -> io::Result<()> {
        use nix::sys::socket::{setsockopt, sockopt};

        match kind {
            BufferKind::Recv => setsockopt(self, sockopt::RcvBufForce, &size)?,
            BufferKind::Send => setsockopt(self, sockopt::SndBufForce, &size)?,
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn force_buffer_size(&self, _kind: BufferKind, _size: usize) -> io::Result<()> {
        Err(io::Error::from(ErrorKind::Unsupported))
    }
}

/// Creates an IPV4 UDP socket bound to the wildcard address and the given port, or to an
///  ephemeral port for `None`
pub fn bind_socket(port: Option<u16>) -> anyhow::Result<UdpSocket> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port.unwrap_or(0)));

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(UdpSocket::from_std(socket.into())?)
}

/// An accepted datagram whose size matches its declared type
#[derive(Debug)]
pub struct Datagram {
    pub header: PacketHeader,
    /// the complete datagram, header included
    pub bytes: BytesMut,
    pub from: SocketAddr,
}
impl Datagram {
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PacketHeader::SERIALIZED_LEN..]
    }
}

#[derive(Debug)]
pub enum Received {
    Timeout,
    Datagram(Datagram),
    InvalidSize { len: usize, from: SocketAddr },
    IoError(io::Error),
}

/// The socket of a role together with its rate limiter. Incoming datagrams are validated here,
///  so session code only ever sees datagrams whose size matches their declared type.
pub struct UdpEndpoint {
    socket: Box<dyn DatagramSocket>,
    rate_limiter: RateLimiter,
    blocking: bool,
    recv_buf: Vec<u8>,
}

impl UdpEndpoint {
    pub fn new(socket: Box<dyn DatagramSocket>, blocking: bool, rate_limit: u32) -> UdpEndpoint {
        UdpEndpoint {
            socket,
            rate_limiter: RateLimiter::new(rate_limit),
            blocking,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    /// Binds a socket and applies the configured buffer sizes. Sizes that are not configured are
    ///  left at the OS default, which is logged.
    pub fn bind(port: Option<u16>, options: &SocketOptions, rate_limit: u32) -> anyhow::Result<UdpEndpoint> {
        let socket = bind_socket(port)?;
        info!("bound UDP socket to {:?}", socket.local_addr()?);
        if options.udpc {
            info!("--udpc: using the default socket implementation");
        }

        let endpoint = UdpEndpoint::new(Box::new(socket), options.blocking, rate_limit);
        endpoint.apply_buffer_size(BufferKind::Recv, options.recv_buffer_size);
        endpoint.apply_buffer_size(BufferKind::Send, options.send_buffer_size);
        Ok(endpoint)
    }

    fn apply_buffer_size(&self, kind: BufferKind, size: Option<u32>) {
        match size {
            None => info!("{} using OS default: {}", kind, format_size(self.buffer_size(kind))),
            Some(size) => {
                let _ = self.set_buffer_size(kind, size);
            }
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limiter.max_bytes_per_sec()
    }

    pub fn set_rate_limit(&mut self, max_bytes_per_sec: u32) {
        self.rate_limiter.set_max_bytes_per_sec(max_bytes_per_sec);
    }

    /// The buffer size as reported by the OS, 0 if it can not be determined
    pub fn buffer_size(&self, kind: BufferKind) -> u32 {
        match self.socket.buffer_size(kind) {
            Ok(size) => u32::try_from(size).unwrap_or(u32::MAX),
            Err(e) => {
                error!("error reading {}: {}", kind, e);
                0
            }
        }
    }

    /// Requests a buffer size and reads it back. If the OS caps the request, the privileged
    ///  variant is tried next. The OS may grant more than requested (Linux doubles the value for
    ///  bookkeeping), which counts as success.
    pub fn set_buffer_size(&self, kind: BufferKind, size: u32) -> bool {
        if let Err(e) = self.socket.set_buffer_size(kind, size as usize) {
            debug!("set {} to {} failed: {}", kind, format_size(size), e);
        }
        let actual = self.buffer_size(kind);
        if actual >= size {
            info!("set {} to {} SUCCEEDED", kind, format_size(size));
            return true;
        }

        let force_result = self.socket.force_buffer_size(kind, size as usize);
        let actual = self.buffer_size(kind);
        if actual >= size {
            info!("set {} to {} SUCCEEDED (forced)", kind, format_size(size));
            true
        }
        else {
            match force_result {
                Ok(_) => error!("set {} to {} failed (remains {})", kind, format_size(size), format_size(actual)),
                Err(e) => error!("set {} to {} failed (remains {}): {}", kind, format_size(size), format_size(actual), e),
            }
            false
        }
    }

    /// Sends a single datagram after waiting for the rate limiter. Failures are logged and
    ///  reported as `false` so the caller can skip its counters.
    #[must_use]
    pub async fn send_to(&mut self, to: SocketAddr, datagram: &[u8]) -> bool {
        self.rate_limiter.wait_to_send(datagram.len()).await;

        let result = if self.blocking {
            self.socket.send_datagram(to, datagram).await
        }
        else {
            self.socket.try_send_datagram(to, datagram)
        };

        match result {
            Ok(n) if n > 0 => {
                trace!("sent {} bytes to {:?}", n, to);
                true
            }
            Ok(_) => {
                error!("sendto {} len:{} sent nothing", to, datagram.len());
                false
            }
            Err(e) => {
                error!("sendto {} len:{} failed: {}", to, datagram.len(), e);
                false
            }
        }
    }

    /// Returns whether a datagram is readable within the timeout. A zero timeout checks
    ///  readiness without waiting.
    pub async fn poll_read(&self, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, self.socket.readable()).await, Ok(Ok(())))
    }

    /// Receives the next datagram, waiting at most `timeout`. A zero timeout only returns a
    ///  datagram that is already available.
    ///
    /// Connection reset / refused errors are ICMP feedback for an earlier send on a
    ///  connectionless socket, and they are reported as a timeout.
    pub async fn recv_from(&mut self, timeout: Duration) -> Received {
        let deadline = Instant::now() + timeout;
        loop {
            if !timeout.is_zero() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !self.poll_read(remaining).await {
                    return Received::Timeout;
                }
            }

            match self.socket.try_recv_datagram(&mut self.recv_buf) {
                Ok((len, from)) => return self.classify(len, from),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if timeout.is_zero() {
                        return Received::Timeout;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                    trace!("ignoring {} on receive", e);
                    return Received::Timeout;
                }
                Err(e) => {
                    error!("recvfrom failed: {}", e);
                    return Received::IoError(e);
                }
            }
        }
    }

    fn classify(&self, len: usize, from: SocketAddr) -> Received {
        let raw = &self.recv_buf[..len];

        let header = match PacketHeader::deser(&mut &raw[..]) {
            Ok(header) => header,
            Err(e) => {
                warn!("recv invalid packet (size={}) from {}: {}", len, from, e);
                return Received::InvalidSize { len, from };
            }
        };

        if header.expected_datagram_len() != Some(len) {
            warn!("recv invalid packet (size={}) from {}: {:?} seqid={}", len, from, header, header.seqid);
            return Received::InvalidSize { len, from };
        }

        trace!("received {:?} from {:?}", header, from);
        Received::Datagram(Datagram {
            header,
            bytes: BytesMut::from(raw),
            from,
        })
    }
}
