use crate::packet::{EndpointRole, PacketHeader};
use crate::packet_range::PacketRange;
use crate::payload;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Snapshot of a channel's counters, detached from the per-seqid bookkeeping
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ChannelStats {
    pub sent: u32,
    pub received: u32,
    pub out_of_order: u32,
    pub duplicate: u32,
    pub looped: u32,
    pub corrupted: u32,
}

/// Everything that is known about traffic to and from one counterpart role since the last INIT
#[derive(Debug, Clone)]
pub struct TrafficChannel {
    pub peer: EndpointRole,
    /// DATA packets successfully handed to the socket for this peer
    pub sent: u32,
    /// DATA packets received from this peer
    pub received: u32,
    pub last_received_seq_id: i32,
    pub out_of_order: u32,
    pub duplicate: u32,
    /// DATA packets that carried our own role as sender, i.e. our own traffic routed back to us
    pub looped: u32,
    pub corrupted: u32,
    packets: FxHashMap<i32, u32>,
    pub received_range: PacketRange,
    pub last_status: Option<PacketHeader>,
}

impl TrafficChannel {
    pub fn new(peer: EndpointRole) -> TrafficChannel {
        TrafficChannel {
            peer,
            sent: 0,
            received: 0,
            last_received_seq_id: 0,
            out_of_order: 0,
            duplicate: 0,
            looped: 0,
            corrupted: 0,
            packets: FxHashMap::default(),
            received_range: PacketRange::default(),
            last_status: None,
        }
    }

    /// Sequence tracking for an accepted DATA packet. `payload` is the region after the header.
    pub fn on_data_received(&mut self, header: &PacketHeader, payload: &[u8]) {
        self.received += 1;

        let seqid = header.seqid;
        if seqid < self.last_received_seq_id {
            trace!("out of order: {} after {}", seqid, self.last_received_seq_id);
            self.out_of_order += 1;
        }
        else if seqid > self.last_received_seq_id {
            self.received_range.push(seqid);
        }
        self.last_received_seq_id = seqid;

        let count = self.packets.entry(seqid).or_default();
        *count += 1;
        if *count > 1 {
            debug!("duplicate packet from {}: seqid {} seen {} times", self.peer, seqid, count);
            self.duplicate += 1;
        }

        if !payload::validate(payload) {
            debug!("corrupted payload from {}: seqid {}", self.peer, seqid);
            self.corrupted += 1;
        }
    }

    pub fn on_looped(&mut self, header: &PacketHeader) {
        debug!("received own DATA packet #{} back", header.seqid);
        self.looped += 1;
    }

    pub fn on_status_received(&mut self, header: &PacketHeader) {
        self.last_status = Some(header.clone());
    }

    pub fn last_status_data_sent(&self) -> i32 {
        self.last_status.as_ref().map(|s| s.data_sent).unwrap_or(0)
    }

    pub fn last_status_data_received(&self) -> i32 {
        self.last_status.as_ref().map(|s| s.data_received).unwrap_or(0)
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent,
            received: self.received,
            out_of_order: self.out_of_order,
            duplicate: self.duplicate,
            looped: self.looped,
            corrupted: self.corrupted,
        }
    }
}

/// The three channels a session keeps, indexed by counterpart role
#[derive(Debug, Clone)]
pub struct Channels {
    pub client: TrafficChannel,
    pub server: TrafficChannel,
    pub unknown: TrafficChannel,
}

impl Default for Channels {
    fn default() -> Self {
        Channels {
            client: TrafficChannel::new(EndpointRole::Client),
            server: TrafficChannel::new(EndpointRole::Server),
            unknown: TrafficChannel::new(EndpointRole::Unknown),
        }
    }
}

impl Channels {
    pub fn get(&self, role: EndpointRole) -> &TrafficChannel {
        match role {
            EndpointRole::Client => &self.client,
            EndpointRole::Server => &self.server,
            _ => &self.unknown,
        }
    }

    pub fn get_mut(&mut self, role: EndpointRole) -> &mut TrafficChannel {
        match role {
            EndpointRole::Client => &mut self.client,
            EndpointRole::Server => &mut self.server,
            _ => &mut self.unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::StatusKind;
    use rstest::rstest;

    const MTU: usize = 100;

    fn receive(channel: &mut TrafficChannel, seqids: &[i32]) {
        let payload = valid_payload();
        for &seqid in seqids {
            let header = PacketHeader::data(EndpointRole::Server, seqid, MTU, false);
            channel.on_data_received(&header, &payload);
        }
    }

    fn valid_payload() -> Vec<u8> {
        let mut payload = vec![0u8; MTU - PacketHeader::SERIALIZED_LEN];
        payload::fill(&mut payload);
        payload
    }

    #[rstest]
    #[case::in_order(vec![0, 1, 2, 3], 4, 0, 0, 3)]
    #[case::gap(vec![0, 1, 5, 6], 4, 0, 0, 3)]
    #[case::reordered(vec![0, 2, 1, 3], 4, 1, 0, 2)]
    #[case::duplicate(vec![0, 1, 1, 2], 4, 0, 1, 2)]
    #[case::late_duplicate(vec![0, 1, 2, 1], 4, 1, 1, 2)]
    #[case::starts_late(vec![3, 4], 2, 0, 0, 2)]
    fn test_sequence_tracking(
        #[case] seqids: Vec<i32>,
        #[case] expected_received: u32,
        #[case] expected_out_of_order: u32,
        #[case] expected_duplicate: u32,
        #[case] expected_range_len: usize,
    ) {
        let mut channel = TrafficChannel::new(EndpointRole::Server);
        receive(&mut channel, &seqids);

        assert_eq!(channel.received, expected_received);
        assert_eq!(channel.out_of_order, expected_out_of_order);
        assert_eq!(channel.duplicate, expected_duplicate);
        assert_eq!(channel.received_range.len(), expected_range_len);
        assert_eq!(channel.last_received_seq_id, *seqids.last().unwrap());
        assert_eq!(channel.corrupted, 0);
    }

    #[test]
    fn test_corrupted_payload_is_counted_but_received() {
        let mut channel = TrafficChannel::new(EndpointRole::Client);
        let mut payload = valid_payload();
        payload[17] ^= 0x01;

        let header = PacketHeader::data(EndpointRole::Client, 0, MTU, false);
        channel.on_data_received(&header, &payload);

        assert_eq!(channel.received, 1);
        assert_eq!(channel.corrupted, 1);
    }

    #[test]
    fn test_looped() {
        let mut channel = TrafficChannel::new(EndpointRole::Client);
        channel.on_looped(&PacketHeader::data(EndpointRole::Client, 3, MTU, false));
        assert_eq!(channel.looped, 1);
        assert_eq!(channel.received, 0);
    }

    #[test]
    fn test_last_status() {
        let mut channel = TrafficChannel::new(EndpointRole::Server);
        assert_eq!(channel.last_status_data_sent(), 0);
        assert_eq!(channel.last_status_data_received(), 0);

        let mut status = PacketHeader::status(StatusKind::BurstFinish, EndpointRole::Server);
        status.data_sent = 12;
        status.data_received = 689;
        channel.on_status_received(&status);

        assert_eq!(channel.last_status_data_sent(), 12);
        assert_eq!(channel.last_status_data_received(), 689);
        assert_eq!(channel.last_status, Some(status));
    }

    #[rstest]
    #[case::client(EndpointRole::Client, EndpointRole::Client)]
    #[case::server(EndpointRole::Server, EndpointRole::Server)]
    #[case::bridge(EndpointRole::Bridge, EndpointRole::Unknown)]
    #[case::unknown(EndpointRole::Unknown, EndpointRole::Unknown)]
    fn test_channels_by_role(#[case] role: EndpointRole, #[case] expected_peer: EndpointRole) {
        let mut channels = Channels::default();
        assert_eq!(channels.get(role).peer, expected_peer);
        channels.get_mut(role).sent += 1;
        assert_eq!(channels.get(role).sent, 1);
    }
}
