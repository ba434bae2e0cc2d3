use crate::packet::EndpointRole;
use crate::packet_range::{log_missing_segments, MissingSegment};
use crate::traffic::{ChannelStats, Channels};
use tracing::{error, info, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Band {
    /// more than 99.99% received
    Good,
    /// more than 90% received
    Degraded,
    Bad,
}

/// One "X RECEIVED" comparison: how many DATA packets arrived at `label` vs. how many should have
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReceivedAt {
    pub label: String,
    pub expected: i64,
    pub actual: i64,
    pub corrupted: u32,
}

impl ReceivedAt {
    pub fn new(label: &str, expected: i64, actual: i64, corrupted: u32) -> ReceivedAt {
        ReceivedAt {
            label: label.to_string(),
            expected,
            actual,
            corrupted,
        }
    }

    pub fn percent(&self) -> f64 {
        100.0 * self.actual as f64 / self.expected.max(1) as f64
    }

    pub fn lost(&self) -> i64 {
        self.expected - self.actual
    }

    pub fn band(&self) -> Band {
        let percent = self.percent();
        if percent > 99.99 {
            Band::Good
        }
        else if percent > 90.0 {
            Band::Degraded
        }
        else {
            Band::Bad
        }
    }

    pub fn log(&self) {
        let percent = self.percent();
        let line = format!("{} RECEIVED: {:6.2}% {:5}pkts  LOST: {:6.2}% {}pkts",
                           self.label, percent, self.actual, 100.0 - percent, self.lost());
        match self.band() {
            Band::Good => info!("{}", line),
            Band::Degraded => warn!("{}", line),
            Band::Bad => error!("{}", line),
        }
        if self.corrupted > 0 {
            error!("{} RECEIVED CORRUPTED: {} packets", self.label, self.corrupted);
        }
    }
}

/// The outcome of an iteration or a whole session, as seen by one role
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Summary {
    pub role: EndpointRole,
    pub iteration: i32,
    pub burst_count: u32,
    pub talkback_count: u32,
    pub echo: bool,
    pub client: ChannelStats,
    pub server: ChannelStats,
    pub received_at: Vec<ReceivedAt>,
    pub missing: Vec<MissingSegment>,
}

impl Summary {
    pub fn new(role: EndpointRole, iteration: i32, burst_count: u32, talkback_count: u32, echo: bool, channels: &Channels) -> Summary {
        let talkback_total = talkback_count as i64 * iteration.max(0) as i64;
        let client = &channels.client;
        let server = &channels.server;

        let mut received_at = Vec::new();
        let mut missing = Vec::new();
        match role {
            EndpointRole::Client => {
                received_at.push(ReceivedAt::new("SERVER", server.sent as i64, server.last_status_data_received() as i64, 0));

                let expected_from_server = if echo { server.sent as i64 } else { 0 } + talkback_total;
                if expected_from_server > 0 {
                    received_at.push(ReceivedAt::new("CLIENT", expected_from_server, server.received as i64, server.corrupted));
                }
                missing = server.received_range.missing_segments();
            }
            EndpointRole::Server => {
                received_at.push(ReceivedAt::new("SERVER", client.last_status_data_sent() as i64, client.received as i64, client.corrupted));

                let expected_at_client = if echo { client.last_status_data_sent() as i64 } else { 0 } + talkback_total;
                if expected_at_client > 0 {
                    received_at.push(ReceivedAt::new("CLIENT", expected_at_client, client.last_status_data_received() as i64, 0));
                }
                missing = client.received_range.missing_segments();
            }
            EndpointRole::Bridge => {
                received_at.push(ReceivedAt::new("CLIENT -> BRIDGE", client.last_status_data_sent() as i64, client.received as i64, client.corrupted));
                received_at.push(ReceivedAt::new("SERVER -> BRIDGE", server.last_status_data_sent() as i64, server.received as i64, server.corrupted));
            }
            EndpointRole::Unknown => {}
        }

        Summary {
            role,
            iteration,
            burst_count,
            talkback_count,
            echo,
            client: client.stats(),
            server: server.stats(),
            received_at,
            missing,
        }
    }

    pub fn get(&self, label: &str) -> Option<&ReceivedAt> {
        self.received_at.iter().find(|r| r.label == label)
    }

    pub fn log(&self) {
        info!("{} summary it={}", self.role, self.iteration);
        for r in &self.received_at {
            r.log();
        }
        for (peer, stats) in [(EndpointRole::Client, &self.client), (EndpointRole::Server, &self.server)] {
            if stats.out_of_order > 0 || stats.duplicate > 0 || stats.looped > 0 {
                warn!("{} traffic: out of order:{} duplicate:{} looped:{}", peer, stats.out_of_order, stats.duplicate, stats.looped);
            }
        }
        log_missing_segments(&self.missing);
    }
}
