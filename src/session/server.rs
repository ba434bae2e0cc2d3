use crate::config::SessionParams;
use crate::endpoint::{BufferKind, Datagram, Received, UdpEndpoint};
use crate::packet::{EndpointRole, PacketHeader, PacketType, StatusKind};
use crate::session::{Session, IDLE_RECV_TIMEOUT};
use crate::size_literal::{format_rate, format_size};
use crate::summary::Summary;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// The server answers a client's status handshake, optionally echoes its DATA packets and sends
///  talkback traffic of its own. It serves one client at a time, and a new INIT starts over.
pub struct Server {
    session: Session,
    /// source address of the most recent valid datagram
    client_addr: Option<SocketAddr>,
    talkback_remaining: u32,
    summaries: watch::Sender<Option<Summary>>,
}

impl Server {
    pub fn new(endpoint: UdpEndpoint, params: &SessionParams) -> Server {
        let (summaries, _) = watch::channel(None);
        Server {
            session: Session::new(EndpointRole::Server, EndpointRole::Client, endpoint, params),
            client_addr: None,
            talkback_remaining: 0,
            summaries,
        }
    }

    /// Receives the summary published after every BURST_FINISH and FINISHED
    pub fn subscribe(&self) -> watch::Receiver<Option<Summary>> {
        self.summaries.subscribe()
    }

    /// Serves until the task is cancelled or the socket fails
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            self.step().await?;
        }
    }

    /// Handles at most one incoming datagram, then sends at most one talkback packet. While
    ///  talkback is pending, receiving does not wait so sending keeps going at full pace.
    async fn step(&mut self) -> anyhow::Result<()> {
        let timeout = if self.talkback_remaining > 0 { Duration::ZERO } else { IDLE_RECV_TIMEOUT };

        match self.session.endpoint.recv_from(timeout).await {
            Received::Datagram(d) => {
                self.client_addr = Some(d.from);
                self.dispatch(d).await;
            }
            Received::IoError(e) => return Err(e.into()),
            Received::Timeout | Received::InvalidSize { .. } => {}
        }

        if self.talkback_remaining > 0 {
            if let Some(client_addr) = self.client_addr {
                let _ = self.session.send_data(EndpointRole::Client, client_addr).await;
                self.talkback_remaining -= 1;
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, d: Datagram) {
        match d.header.packet_type {
            PacketType::Data => self.on_data(d).await,
            PacketType::Status => self.on_status(&d.header, d.from).await,
            PacketType::Unknown => {}
        }
    }

    async fn on_data(&mut self, mut d: Datagram) {
        if !self.session.on_data_received(&d) || !self.session.echo {
            return;
        }

        PacketHeader::restamp_sender(&mut d.bytes, EndpointRole::Server);
        if self.session.endpoint.send_to(d.from, &d.bytes).await {
            self.session.channels.client.sent += 1;
        }
        else {
            warn!("failed to echo seqid {} to {}", d.header.seqid, d.from);
        }
    }

    async fn on_status(&mut self, header: &PacketHeader, from: SocketAddr) {
        match header.status {
            StatusKind::Init => {
                info!("--------------------------------------------------------------");
                if !self.session.reset(header) {
                    return;
                }
                self.session.on_status_received(header);
                self.talkback_remaining = 0;
                self.reply(StatusKind::Init, from).await;

                let endpoint = &self.session.endpoint;
                info!("STARTED it={} addr={} rate={} rcvbuf={} sndbuf={}",
                    self.session.iteration, from, format_rate(endpoint.rate_limit()),
                    format_size(endpoint.buffer_size(BufferKind::Recv)), format_size(endpoint.buffer_size(BufferKind::Send)));
            }
            StatusKind::BurstStart => {
                self.session.on_status_received(header);
                self.session.iteration = header.iteration;
                self.session.channels.client.received_range.reset();
                self.talkback_remaining = self.session.talkback_count;
                if self.talkback_remaining > 0 {
                    info!("SEND TALKBACK pkts:{}", self.talkback_remaining);
                }
                self.reply(StatusKind::BurstStart, from).await;
            }
            StatusKind::BurstFinish => {
                self.session.on_status_received(header);
                self.reply(StatusKind::BurstFinish, from).await;
                self.publish();
            }
            StatusKind::Finished => {
                self.session.on_status_received(header);
                self.talkback_remaining = 0;
                self.reply(StatusKind::Finished, from).await;
                self.publish();
            }
        }
    }

    async fn reply(&mut self, kind: StatusKind, to: SocketAddr) {
        if !self.session.send_status(kind, to).await {
            error!("failed to reply {} to {}", kind, to);
        }
    }

    fn publish(&self) {
        let summary = self.session.summary();
        summary.log();
        self.summaries.send_replace(Some(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MockDatagramSocket;
    use crate::packet::MAX_DATAGRAM_SIZE;
    use bytes::BytesMut;
    use std::collections::VecDeque;
    use std::io;
    use std::io::ErrorKind;
    use std::sync::{Arc, Mutex};

    fn client() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9001))
    }

    type Outbox = Arc<Mutex<Vec<(SocketAddr, PacketHeader)>>>;

    /// A server whose socket delivers the given datagrams in order and records everything sent
    fn server_receiving(inbox: Vec<PacketHeader>, params: &SessionParams) -> (Server, Outbox) {
        let inbox: Arc<Mutex<VecDeque<Vec<u8>>>> = Arc::new(Mutex::new(inbox.into_iter()
            .map(|h| {
                let mut buf = BytesMut::new();
                h.ser_datagram(&mut buf);
                buf.to_vec()
            })
            .collect()));
        let inbox2 = inbox.clone();

        let outbox = Outbox::default();
        let outbox2 = outbox.clone();

        let mut socket = MockDatagramSocket::new();
        // an empty inbox never becomes readable, so waiting receives time out right away
        socket.expect_readable()
            .returning(move || if inbox.lock().unwrap().is_empty() {
                Err(io::Error::from(ErrorKind::TimedOut))
            } else {
                Ok(())
            });
        socket.expect_try_recv_datagram()
            .returning(move |buf| match inbox2.lock().unwrap().pop_front() {
                Some(raw) => {
                    buf[..raw.len()].copy_from_slice(&raw);
                    Ok((raw.len(), client()))
                }
                None => Err(io::Error::from(ErrorKind::WouldBlock)),
            });
        socket.expect_send_datagram()
            .returning(move |to, buf| {
                let header = PacketHeader::deser(&mut &buf[..]).unwrap();
                assert!(buf.len() <= MAX_DATAGRAM_SIZE);
                outbox2.lock().unwrap().push((to, header));
                Ok(buf.len())
            });
        socket.expect_buffer_size()
            .returning(|_| Ok(212992));

        let endpoint = UdpEndpoint::new(Box::new(socket), true, params.rate_limit);
        (Server::new(endpoint, params), outbox)
    }

    fn init(echo: bool, burst_count: u32, talkback_count: u32) -> PacketHeader {
        let mut header = PacketHeader::status(StatusKind::Init, EndpointRole::Client);
        header.echo = echo;
        header.burst_count = burst_count;
        header.talkback_count = talkback_count;
        header.mtu = 100;
        header
    }

    fn client_status(kind: StatusKind, iteration: i32, data_sent: i32, data_received: i32) -> PacketHeader {
        let mut header = PacketHeader::status(kind, EndpointRole::Client);
        header.iteration = iteration;
        header.data_sent = data_sent;
        header.data_received = data_received;
        header.mtu = 100;
        header
    }

    fn data(seqid: i32) -> PacketHeader {
        PacketHeader::data(EndpointRole::Client, seqid, 100, false)
    }

    async fn steps(server: &mut Server, n: usize) {
        for _ in 0..n {
            server.step().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_without_echo() {
        let inbox = vec![
            init(false, 3, 0),
            client_status(StatusKind::BurstStart, 1, 0, 0),
            data(1),
            data(3),
            client_status(StatusKind::BurstFinish, 1, 4, 0),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());
        let mut summaries = server.subscribe();

        steps(&mut server, 5).await;

        let outbox = outbox.lock().unwrap();
        let kinds: Vec<_> = outbox.iter().map(|(_, h)| h.status).collect();
        assert_eq!(kinds, vec![StatusKind::Init, StatusKind::BurstStart, StatusKind::BurstFinish]);
        assert!(outbox.iter().all(|(to, h)| *to == client() && h.sender == EndpointRole::Server));

        let (_, finish) = &outbox[2];
        assert_eq!(finish.iteration, 1);
        assert_eq!(finish.data_received, 2);
        assert_eq!(finish.data_sent, 0);

        assert!(summaries.has_changed().unwrap());
        let summary = summaries.borrow_and_update().clone().unwrap();
        assert_eq!(summary.iteration, 1);
        let at_server = summary.get("SERVER").unwrap();
        assert_eq!((at_server.expected, at_server.actual), (4, 2));
        assert_eq!(summary.missing.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_restamps_sender() {
        let inbox = vec![
            init(true, 2, 0),
            client_status(StatusKind::BurstStart, 1, 0, 0),
            PacketHeader::data(EndpointRole::Client, 0, 100, true),
            PacketHeader::data(EndpointRole::Client, 1, 100, true),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());

        steps(&mut server, 4).await;

        let outbox = outbox.lock().unwrap();
        let echoed: Vec<_> = outbox.iter().filter(|(_, h)| h.is_data()).collect();
        assert_eq!(echoed.len(), 2);
        for (i, (to, header)) in echoed.into_iter().enumerate() {
            assert_eq!(*to, client());
            assert_eq!(header.sender, EndpointRole::Server);
            assert_eq!(header.seqid, i as i32);
        }
        assert_eq!(server.session.channels.client.sent, 2);
        assert_eq!(server.session.channels.client.received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_talkback_is_sent_after_burst_start() {
        let inbox = vec![
            init(false, 10, 4),
            client_status(StatusKind::BurstStart, 1, 0, 0),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());

        steps(&mut server, 8).await;

        let outbox = outbox.lock().unwrap();
        let talkback: Vec<_> = outbox.iter()
            .filter(|(_, h)| h.is_data())
            .map(|(_, h)| h.seqid)
            .collect();
        assert_eq!(talkback, vec![0, 1, 2, 3]);
        assert!(outbox.iter().filter(|(_, h)| h.is_data()).all(|(_, h)| h.len == 100 && h.sender == EndpointRole::Server));
        assert_eq!(server.talkback_remaining, 0);
        assert_eq!(server.session.channels.client.sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_stops_talkback() {
        let inbox = vec![
            init(false, 10, 100),
            client_status(StatusKind::BurstStart, 1, 0, 0),
            client_status(StatusKind::Finished, 1, 10, 1),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());
        let summaries = server.subscribe();

        steps(&mut server, 5).await;

        assert_eq!(server.talkback_remaining, 0);
        // one packet goes out right after BURST_START, then FINISHED cancels the rest
        let talkback = outbox.lock().unwrap().iter().filter(|(_, h)| h.is_data()).count();
        assert_eq!(talkback, 1);
        assert!(summaries.borrow().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_resets_session() {
        let inbox = vec![
            init(false, 10, 0),
            client_status(StatusKind::BurstStart, 1, 0, 0),
            data(0),
            init(false, 20, 0),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());

        steps(&mut server, 4).await;

        assert_eq!(server.session.burst_count, 20);
        assert_eq!(server.session.iteration, 0);
        assert_eq!(server.session.channels.client.received, 0);
        let inits = outbox.lock().unwrap().iter().filter(|(_, h)| h.status == StatusKind::Init).count();
        assert_eq!(inits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_of_other_mtu_is_neither_counted_nor_echoed() {
        let inbox = vec![
            init(true, 2, 0),
            client_status(StatusKind::BurstStart, 1, 0, 0),
            PacketHeader::data(EndpointRole::Client, 0, 1450, true),
            PacketHeader::data(EndpointRole::Client, 1, 100, true),
        ];
        let (mut server, outbox) = server_receiving(inbox, &SessionParams::default());

        steps(&mut server, 4).await;

        let echoed: Vec<_> = outbox.lock().unwrap().iter()
            .filter(|(_, h)| h.is_data())
            .map(|(_, h)| h.seqid)
            .collect();
        assert_eq!(echoed, vec![1]);
        assert_eq!(server.session.channels.client.received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_invalid_mtu_is_ignored() {
        let mut bad = init(false, 10, 0);
        bad.mtu = 10_000;
        let (mut server, outbox) = server_receiving(vec![bad], &SessionParams::default());

        steps(&mut server, 1).await;

        assert!(outbox.lock().unwrap().is_empty());
    }
}
