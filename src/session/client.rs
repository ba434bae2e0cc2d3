use crate::config::SessionParams;
use crate::endpoint::{Datagram, Received, UdpEndpoint};
use crate::packet::{EndpointRole, PacketType, StatusKind};
use crate::session::{Session, BURST_FINISH_TIMEOUT, DRAIN_POLL_TIMEOUT, FINISH_DELAY, HANDSHAKE_TIMEOUT, MAX_DRAIN_PER_SEND, SETTLE_DELAY};
use crate::size_literal::{format_rate, format_size};
use crate::summary::Summary;
use anyhow::{anyhow, bail};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// What the client has observed while running one burst
#[derive(Debug, Default)]
struct BurstProgress {
    /// DATA packets received back from the server during this burst
    got_talkback: u32,
    got_burst_finish: bool,
}

/// The client drives a measurement: it negotiates the session parameters with the server, sends
///  `count` bursts and reports what arrived on both sides after each of them.
pub struct Client {
    session: Session,
    server_addr: SocketAddr,
    count: u32,
}

impl Client {
    pub fn new(endpoint: UdpEndpoint, server_addr: SocketAddr, params: &SessionParams) -> Client {
        let mut session = Session::new(EndpointRole::Client, EndpointRole::Server, endpoint, params);
        session.burst_count = params.burst_count();
        session.talkback_count = params.talkback_count();
        session.endpoint.set_rate_limit(params.rate_limit);

        Client {
            session,
            server_addr,
            count: params.count,
        }
    }

    /// Runs the complete session and returns the final summary. Handshake failures and failures
    ///  to send BURST_FINISH are fatal.
    pub async fn run(mut self) -> anyhow::Result<Summary> {
        let actual_server = self.handshake().await?;

        for iteration in 1..=self.count {
            self.run_iteration(iteration as i32, actual_server).await?;
        }

        sleep(FINISH_DELAY).await;
        if !self.session.send_status(StatusKind::Finished, actual_server).await {
            error!("failed to send FINISHED to {}", actual_server);
        }

        if self.server_addr != actual_server {
            warn!("client connected to {} but received data from {}", self.server_addr, actual_server);
        }

        let summary = self.session.summary();
        summary.log();
        Ok(summary)
    }

    /// Sends INIT and waits for the server's INIT reply. The reply's source address is where all
    ///  further traffic goes, which differs from the configured address if a bridge is in the path.
    async fn handshake(&mut self) -> anyhow::Result<SocketAddr> {
        if !self.session.send_status(StatusKind::Init, self.server_addr).await {
            bail!("failed to send INIT packet to {}", self.server_addr);
        }

        match self.session.endpoint.recv_from(HANDSHAKE_TIMEOUT).await {
            Received::Datagram(d) if d.header.packet_type == PacketType::Status => {
                self.session.on_status_received(&d.header);
                if d.header.status != StatusKind::Init {
                    bail!("handshake failed: expected INIT reply, received {}", d.header.status);
                }
                info!("received HANDSHAKE: {}", d.from);
                Ok(d.from)
            }
            Received::Datagram(d) => bail!("handshake failed: expected INIT reply, received {:?}", d.header),
            Received::Timeout => bail!("handshake failed: no reply from {} within {:?}", self.server_addr, HANDSHAKE_TIMEOUT),
            Received::InvalidSize { len, from } => bail!("handshake failed: invalid packet of {} bytes from {}", len, from),
            Received::IoError(e) => Err(anyhow!(e).context("handshake failed")),
        }
    }

    async fn run_iteration(&mut self, iteration: i32, server: SocketAddr) -> anyhow::Result<()> {
        self.session.iteration = iteration;

        let burst_count = self.session.burst_count;
        let mtu = self.session.mtu;
        let total_bytes = burst_count as u64 * mtu as u64;
        info!(">> SEND BURST pkts:{}  size:{}  rate:{}", burst_count, format_size(u32::try_from(total_bytes).unwrap_or(u32::MAX)), format_rate(self.session.endpoint.rate_limit()));

        if !self.session.send_status(StatusKind::BurstStart, server).await {
            error!("failed to send BURST_START to {}", server);
        }
        self.session.channels.server.received_range.reset();

        let mut progress = BurstProgress::default();

        let start = Instant::now();
        for _ in 0..burst_count {
            let _ = self.session.send_data(EndpointRole::Server, server).await;
            self.drain_available(&mut progress).await;
        }
        let elapsed = start.elapsed();
        let actual_bytes_per_sec = (total_bytes as f64 / elapsed.as_secs_f64().max(1e-6)) as u64;
        info!(">> SEND ELAPSED {:.2}ms  actualrate:{}  recvd:{}pkts",
            elapsed.as_secs_f64() * 1000.0, format_rate(u32::try_from(actual_bytes_per_sec).unwrap_or(u32::MAX)), progress.got_talkback);

        let num_talkback = self.session.talkback_count as u64 + if self.session.echo { burst_count as u64 } else { 0 };
        if num_talkback > 0 {
            let wait_millis = num_talkback * mtu as u64 * 1000 / actual_bytes_per_sec.max(1);
            info!(">> WAITING TALKBACK {}ms expected:{}pkts", wait_millis, num_talkback);
            self.drain_for(Duration::from_millis(wait_millis), &mut progress).await;
        }

        sleep(SETTLE_DELAY).await;
        info!(">> SEND BURST FINISH recvd:{}pkts", progress.got_talkback);
        if !self.session.send_status(StatusKind::BurstFinish, server).await {
            bail!("failed to send BURST_FINISH to {}", server);
        }

        self.drain_for(BURST_FINISH_TIMEOUT, &mut progress).await;
        if !progress.got_burst_finish {
            warn!("timeout waiting BURST_FINISH ACK");
        }
        Ok(())
    }

    /// Handles packets that are already waiting, without blocking. This keeps the receive buffer
    ///  from overflowing while a burst is being sent.
    async fn drain_available(&mut self, progress: &mut BurstProgress) {
        for _ in 0..MAX_DRAIN_PER_SEND {
            if !self.session.endpoint.poll_read(Duration::ZERO).await {
                break;
            }
            if let Received::Datagram(d) = self.session.endpoint.recv_from(Duration::ZERO).await {
                self.on_received(d, progress);
            }
        }
    }

    /// Handles incoming packets until `duration` has passed, or until the server's BURST_FINISH
    ///  for the current iteration arrived
    async fn drain_for(&mut self, duration: Duration, progress: &mut BurstProgress) {
        let deadline = Instant::now() + duration;
        while !progress.got_burst_finish {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if let Received::Datagram(d) = self.session.endpoint.recv_from(remaining.min(DRAIN_POLL_TIMEOUT)).await {
                self.on_received(d, progress);
            }
        }
    }

    fn on_received(&mut self, d: Datagram, progress: &mut BurstProgress) {
        match d.header.packet_type {
            PacketType::Data => {
                if self.session.on_data_received(&d) {
                    progress.got_talkback += 1;
                }
            }
            PacketType::Status => {
                self.session.on_status_received(&d.header);
                if d.header.status == StatusKind::BurstFinish && d.header.iteration == self.session.iteration {
                    progress.got_burst_finish = true;
                    info!(">> SEND BURST FINISHED recvd:{}pkts", progress.got_talkback);
                    self.session.summary().log();
                }
            }
            PacketType::Unknown => {}
        }
    }
}
