use crate::config::SessionParams;
use crate::endpoint::{Datagram, Received, UdpEndpoint};
use crate::packet::{EndpointRole, PacketType, StatusKind};
use crate::session::{Session, IDLE_RECV_TIMEOUT};
use crate::summary::Summary;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

/// The bridge sits between client and server and relays every valid datagram unchanged,
///  counting what passes in either direction.
///
/// Datagrams are routed by the sender field in their header rather than by source address: the
///  client's address is learned from its INIT, the server's address is configured.
pub struct Bridge {
    session: Session,
    forward_addr: SocketAddr,
    client_addr: Option<SocketAddr>,
    summaries: watch::Sender<Option<Summary>>,
}

impl Bridge {
    pub fn new(endpoint: UdpEndpoint, forward_addr: SocketAddr, params: &SessionParams) -> Bridge {
        let (summaries, _) = watch::channel(None);
        Bridge {
            session: Session::new(EndpointRole::Bridge, EndpointRole::Unknown, endpoint, params),
            forward_addr,
            client_addr: None,
            summaries,
        }
    }

    /// Receives the summary published whenever the server's BURST_FINISH or FINISHED passes
    pub fn subscribe(&self) -> watch::Receiver<Option<Summary>> {
        self.summaries.subscribe()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            self.step().await?;
        }
    }

    async fn step(&mut self) -> anyhow::Result<()> {
        match self.session.endpoint.recv_from(IDLE_RECV_TIMEOUT).await {
            Received::Datagram(d) => self.relay(d).await,
            Received::IoError(e) => return Err(e.into()),
            Received::Timeout | Received::InvalidSize { .. } => {}
        }
        Ok(())
    }

    async fn relay(&mut self, d: Datagram) {
        // DATA of another session's MTU is still relayed, but not counted
        let counted_data = match d.header.packet_type {
            PacketType::Data => self.session.on_data_received(&d),
            PacketType::Status => {
                self.on_status(&d);
                false
            }
            PacketType::Unknown => false,
        };

        let (to_whom, to) = match d.header.sender {
            EndpointRole::Client => {
                if self.client_addr.is_some_and(|addr| addr != d.from) {
                    warn!("relaying packet from {} which is not the registered client", d.from);
                }
                (EndpointRole::Server, self.forward_addr)
            }
            EndpointRole::Server => match self.client_addr {
                Some(client_addr) => (EndpointRole::Client, client_addr),
                None => {
                    trace!("dropping {:?} from the server: no client yet", d.header);
                    return;
                }
            },
            EndpointRole::Bridge | EndpointRole::Unknown => {
                trace!("dropping {:?} from {}", d.header, d.from);
                return;
            }
        };

        if self.session.endpoint.send_to(to, &d.bytes).await {
            if counted_data {
                self.session.channels.get_mut(to_whom).sent += 1;
            }
        }
        else {
            error!("failed to relay {:?} to {}", d.header, to);
        }
    }

    fn on_status(&mut self, d: &Datagram) {
        let header = &d.header;
        match (header.sender, header.status) {
            (EndpointRole::Client, StatusKind::Init) => {
                self.client_addr = Some(d.from);
                info!("init client={} -> server={}", d.from, self.forward_addr);
                if !self.session.reset(header) {
                    return;
                }
            }
            (EndpointRole::Server, StatusKind::BurstStart) => {
                self.session.iteration = header.iteration;
            }
            _ => {}
        }

        self.session.on_status_received(header);

        if header.sender == EndpointRole::Server && matches!(header.status, StatusKind::BurstFinish | StatusKind::Finished) {
            self.session.iteration = header.iteration;
            let summary = self.session.summary();
            summary.log();
            self.summaries.send_replace(Some(summary));
        }
    }
}
