//! The three role state machines and the state they share: counters per counterpart, the
//!  negotiated session parameters and the status handshake.

pub mod bridge;
pub mod client;
pub mod server;

use crate::config::SessionParams;
use crate::endpoint::{Datagram, UdpEndpoint};
use crate::packet::{wire_count, wire_len, EndpointRole, PacketHeader, StatusKind, MAX_DATAGRAM_SIZE};
use crate::summary::Summary;
use crate::traffic::Channels;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// how long the client waits for the reply to its INIT
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);
/// pause between the end of a burst and BURST_FINISH, so stragglers can arrive
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);
/// how long the client waits for the server's BURST_FINISH
pub const BURST_FINISH_TIMEOUT: Duration = Duration::from_millis(5000);
/// pause after the last iteration before FINISHED is sent
pub const FINISH_DELAY: Duration = Duration::from_millis(500);
/// receive timeout of the server and bridge loops when there is nothing to send
pub const IDLE_RECV_TIMEOUT: Duration = Duration::from_millis(100);
/// receive timeout while the client drains incoming packets
pub const DRAIN_POLL_TIMEOUT: Duration = Duration::from_millis(15);
/// upper bound for packets drained between two sends of a burst
pub const MAX_DRAIN_PER_SEND: usize = 20;

pub struct Session {
    pub whoami: EndpointRole,
    /// the counterpart whose counters go into outgoing STATUS packets
    pub talking_to: EndpointRole,
    pub endpoint: UdpEndpoint,
    pub status_seq_id: i32,
    pub iteration: i32,
    pub burst_count: u32,
    pub talkback_count: u32,
    pub echo: bool,
    pub mtu: usize,
    /// this role's own rate limit, which takes precedence over the client's if non-zero
    rate_override: u32,
    pub channels: Channels,
    data_buf: BytesMut,
}

impl Session {
    pub fn new(whoami: EndpointRole, talking_to: EndpointRole, endpoint: UdpEndpoint, params: &SessionParams) -> Session {
        Session {
            whoami,
            talking_to,
            endpoint,
            status_seq_id: 0,
            iteration: 0,
            burst_count: 0,
            talkback_count: 0,
            echo: params.echo,
            mtu: params.mtu,
            rate_override: params.rate_limit,
            channels: Channels::default(),
            data_buf: BytesMut::with_capacity(MAX_DATAGRAM_SIZE),
        }
    }

    /// Starts a new session from a client's INIT: all counters are cleared and the client's
    ///  parameters are adopted. Returns `false` and leaves the session untouched if the INIT
    ///  announces an MTU this implementation can not handle.
    pub fn reset(&mut self, init: &PacketHeader) -> bool {
        let mtu = match usize::try_from(init.mtu) {
            Ok(mtu) if (PacketHeader::SERIALIZED_LEN..=MAX_DATAGRAM_SIZE).contains(&mtu) => mtu,
            _ => {
                warn!("ignoring INIT with invalid mtu {}", init.mtu);
                return false;
            }
        };

        self.echo = init.echo;
        self.mtu = mtu;
        self.burst_count = init.burst_count;
        self.talkback_count = init.talkback_count;
        self.status_seq_id = 0;
        self.iteration = init.iteration;

        let rate_limit = if self.rate_override > 0 {
            self.rate_override
        }
        else {
            u32::try_from(init.max_bytes_per_second).unwrap_or(0)
        };
        self.endpoint.set_rate_limit(rate_limit);

        self.channels = Channels::default();
        true
    }

    /// Sends the next DATA packet to `to_whom`, numbered by the packets sent to that role so far
    pub async fn send_data(&mut self, to_whom: EndpointRole, to: SocketAddr) -> bool {
        let seqid = wire_count(self.channels.get(to_whom).sent);
        let header = PacketHeader::data(self.whoami, seqid, self.mtu, self.echo);

        self.data_buf.clear();
        header.ser_datagram(&mut self.data_buf);

        if self.endpoint.send_to(to, &self.data_buf).await {
            self.channels.get_mut(to_whom).sent += 1;
            true
        }
        else {
            false
        }
    }

    pub async fn send_status(&mut self, status: StatusKind, to: SocketAddr) -> bool {
        let channel = self.channels.get(self.talking_to);

        let mut header = PacketHeader::status(status, self.whoami);
        header.echo = self.echo;
        header.seqid = self.status_seq_id;
        header.iteration = self.iteration;
        header.burst_count = self.burst_count;
        header.talkback_count = self.talkback_count;
        header.data_sent = wire_count(channel.sent);
        header.data_received = wire_count(channel.received);
        header.max_bytes_per_second = wire_count(self.endpoint.rate_limit());
        header.mtu = wire_len(self.mtu);
        self.status_seq_id = self.status_seq_id.wrapping_add(1);

        log_status("send", &header);

        let mut buf = BytesMut::with_capacity(PacketHeader::SERIALIZED_LEN);
        header.ser_datagram(&mut buf);
        self.endpoint.send_to(to, &buf).await
    }

    /// Sequence tracking for a DATA packet, on the channel of its sender. Our own packets coming
    ///  back are only counted as looped.
    ///
    /// DATA whose size differs from the session MTU belongs to some other session. It is not
    ///  counted, and `false` is returned.
    pub fn on_data_received(&mut self, datagram: &Datagram) -> bool {
        if datagram.bytes.len() != self.mtu {
            warn!("ignoring {:?} from {}: session mtu is {}", datagram.header, datagram.from, self.mtu);
            return false;
        }

        let sender = datagram.header.sender;
        if sender == self.whoami {
            self.channels.get_mut(sender).on_looped(&datagram.header);
        }
        else {
            self.channels.get_mut(sender).on_data_received(&datagram.header, datagram.payload());
        }
        true
    }

    pub fn on_status_received(&mut self, header: &PacketHeader) {
        log_status("recv", header);
        self.channels.get_mut(header.sender).on_status_received(header);
    }

    pub fn summary(&self) -> Summary {
        Summary::new(self.whoami, self.iteration, self.burst_count, self.talkback_count, self.echo, &self.channels)
    }
}

fn log_status(direction: &str, header: &PacketHeader) {
    info!("{} from {} STATUS it={} {:>12}: sent:{} recv:{}",
        direction, header.sender, header.iteration, header.status, header.data_sent, header.data_received);
}
