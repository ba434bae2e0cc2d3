use crate::packet::{PacketHeader, MAX_DATAGRAM_SIZE};
use anyhow::bail;
use std::net::SocketAddr;

pub const DEFAULT_BURST_BYTES: u32 = 1_000_000;
pub const DEFAULT_COUNT: u32 = 5;
pub const DEFAULT_MTU: usize = 1450;

/// Which role this process plays, together with the addresses that role needs
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RoleConfig {
    Server { listen_port: u16 },
    Client { server_addr: SocketAddr },
    /// Listens on `listen_port` and relays between the client and `forward_addr` (the server)
    Bridge { listen_port: u16, forward_addr: SocketAddr },
}

/// Parameters of a measurement. The client sends them in its INIT, and server and bridge adopt
///  them from there, except for a non-zero rate limit of their own which takes precedence.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionParams {
    /// bytes per second, 0 for unlimited
    pub rate_limit: u32,
    /// bytes per burst, i.e. per iteration
    pub burst_bytes: u32,
    /// number of iterations
    pub count: u32,
    /// bytes the server sends on its own per iteration
    pub talkback_bytes: u32,
    pub echo: bool,
    /// size of every DATA datagram including the header
    pub mtu: usize,
}

impl Default for SessionParams {
    fn default() -> Self {
        SessionParams {
            rate_limit: 0,
            burst_bytes: DEFAULT_BURST_BYTES,
            count: DEFAULT_COUNT,
            talkback_bytes: 0,
            echo: false,
            mtu: DEFAULT_MTU,
        }
    }
}

impl SessionParams {
    pub fn burst_count(&self) -> u32 {
        self.burst_bytes / self.mtu as u32
    }

    pub fn talkback_count(&self) -> u32 {
        self.talkback_bytes / self.mtu as u32
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SocketOptions {
    /// `None` leaves the OS default in place
    pub recv_buffer_size: Option<u32>,
    pub send_buffer_size: Option<u32>,
    /// send by awaiting writability rather than by a single non-blocking attempt
    pub blocking: bool,
    /// accepted for command line compatibility, there is a single socket implementation
    pub udpc: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            recv_buffer_size: None,
            send_buffer_size: None,
            blocking: true,
            udpc: false,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QualityConfig {
    pub role: RoleConfig,
    pub session: SessionParams,
    pub socket: SocketOptions,
}

impl QualityConfig {
    pub fn new(role: RoleConfig) -> QualityConfig {
        QualityConfig {
            role,
            session: SessionParams::default(),
            socket: SocketOptions::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.mtu < PacketHeader::SERIALIZED_LEN {
            bail!("MTU {} is smaller than the packet header of {} bytes", self.session.mtu, PacketHeader::SERIALIZED_LEN);
        }
        if self.session.mtu > MAX_DATAGRAM_SIZE {
            bail!("MTU {} exceeds the maximum datagram size of {} bytes", self.session.mtu, MAX_DATAGRAM_SIZE);
        }
        if self.session.count == 0 {
            bail!("iteration count must be at least 1");
        }
        if self.session.count > i32::MAX as u32 {
            bail!("iteration count {} is too big", self.session.count);
        }
        if let RoleConfig::Client { .. } = self.role {
            if (self.session.burst_bytes as usize) < self.session.mtu {
                bail!("burst size of {} bytes is smaller than one MTU of {} bytes", self.session.burst_bytes, self.session.mtu);
            }
        }
        if self.session.rate_limit > i32::MAX as u32 {
            bail!("rate limit {} does not fit into a status packet", self.session.rate_limit);
        }

        Ok(())
    }

    /// The port to bind to, or `None` for an ephemeral port
    pub fn listen_port(&self) -> Option<u16> {
        match self.role {
            RoleConfig::Server { listen_port } => Some(listen_port),
            RoleConfig::Bridge { listen_port, .. } => Some(listen_port),
            RoleConfig::Client { .. } => None,
        }
    }
}
