use crate::payload;
use anyhow::bail;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Debug, Display, Formatter};

/// Upper bound for any datagram of the protocol, and therefore for the MTU
pub const MAX_DATAGRAM_SIZE: usize = 4096;

#[repr(i8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum PacketType {
    Unknown = 0,
    Data = 1,
    Status = 2,
}

#[repr(i8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum StatusKind {
    Init = 0,
    Finished = 1,
    BurstStart = 2,
    BurstFinish = 3,
}
impl Display for StatusKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusKind::Init => "INIT",
            StatusKind::Finished => "FINISHED",
            StatusKind::BurstStart => "BURST_START",
            StatusKind::BurstFinish => "BURST_FINISH",
        };
        f.pad(s)
    }
}

/// The role of a process in a measurement. It is stamped into every outgoing packet so a bridge
///  can route by identity rather than by address.
#[repr(i8)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum EndpointRole {
    #[default]
    Unknown = 0,
    Server = 1,
    Client = 2,
    Bridge = 3,
}
impl Display for EndpointRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndpointRole::Unknown => "UNKNOWN",
            EndpointRole::Server => "Server",
            EndpointRole::Client => "Client",
            EndpointRole::Bridge => "Bridge",
        };
        f.pad(s)
    }
}

/// Fixed-size header shared by DATA and STATUS packets. All multi-byte fields are little endian:
///
/// ```ascii
///  0: packet type (i8)       1=DATA 2=STATUS
///  1: status kind (i8)       0=INIT 1=FINISHED 2=BURST_START 3=BURST_FINISH
///  2: sender role (i8)       1=SERVER 2=CLIENT 3=BRIDGE
///  3: echo (u8)              0 or 1
///  4: seqid (i32)
///  8: len (i32)              total datagram length including this header
/// 12: iteration (i32)
/// 16: burst count (u32)
/// 20: talkback count (u32)
/// 24: data sent (i32)        DATA packets the sender sent to its counterpart
/// 28: data received (i32)    DATA packets the sender received from its counterpart
/// 32: max bytes per second (i32)
/// 36: mtu (i32)
/// ```
///
/// A STATUS datagram is exactly the header. A DATA datagram is the header followed by
///  `len - SERIALIZED_LEN` bytes of the reference payload sequence.
#[derive(Clone, Eq, PartialEq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub status: StatusKind,
    pub sender: EndpointRole,
    pub echo: bool,
    pub seqid: i32,
    pub len: i32,
    pub iteration: i32,
    pub burst_count: u32,
    pub talkback_count: u32,
    pub data_sent: i32,
    pub data_received: i32,
    pub max_bytes_per_second: i32,
    pub mtu: i32,
}
impl Debug for PacketHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.packet_type {
            PacketType::Data => write!(f, "DATA{{{}#{} len:{}}}", self.sender, self.seqid, self.len),
            PacketType::Status => write!(f, "STATUS{{{} {} it:{} sent:{} recv:{}}}",
                                         self.sender, self.status, self.iteration, self.data_sent, self.data_received),
            PacketType::Unknown => write!(f, "UNKNOWN{{{}}}", self.sender),
        }
    }
}

impl PacketHeader {
    pub const SERIALIZED_LEN: usize =
        4 * std::mem::size_of::<u8>()       // type, status, sender, echo
        + 3 * std::mem::size_of::<i32>()    // seqid, len, iteration
        + 2 * std::mem::size_of::<u32>()    // burst count, talkback count
        + 4 * std::mem::size_of::<i32>();   // data sent, data received, max bytes per second, mtu

    pub const SENDER_OFFSET: usize = 2;

    pub fn data(sender: EndpointRole, seqid: i32, mtu: usize, echo: bool) -> PacketHeader {
        let mtu = wire_len(mtu);
        PacketHeader {
            packet_type: PacketType::Data,
            status: StatusKind::BurstStart,
            sender,
            echo,
            seqid,
            len: mtu,
            iteration: 0,
            burst_count: 0,
            talkback_count: 0,
            data_sent: 0,
            data_received: 0,
            max_bytes_per_second: 0,
            mtu,
        }
    }

    pub fn status(status: StatusKind, sender: EndpointRole) -> PacketHeader {
        PacketHeader {
            packet_type: PacketType::Status,
            status,
            sender,
            echo: false,
            seqid: 0,
            len: wire_len(Self::SERIALIZED_LEN),
            iteration: 0,
            burst_count: 0,
            talkback_count: 0,
            data_sent: 0,
            data_received: 0,
            max_bytes_per_second: 0,
            mtu: 0,
        }
    }

    pub fn is_data(&self) -> bool {
        self.packet_type == PacketType::Data
    }

    /// The only datagram length that is valid for this header's declared type, or `None` for
    ///  a type that is never valid on the wire
    pub fn expected_datagram_len(&self) -> Option<usize> {
        match self.packet_type {
            PacketType::Data => usize::try_from(self.len).ok()
                .filter(|len| *len >= Self::SERIALIZED_LEN),
            PacketType::Status => Some(Self::SERIALIZED_LEN),
            PacketType::Unknown => None,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_i8(self.packet_type.into());
        buf.put_i8(self.status.into());
        buf.put_i8(self.sender.into());
        buf.put_u8(self.echo as u8);
        buf.put_i32_le(self.seqid);
        buf.put_i32_le(self.len);
        buf.put_i32_le(self.iteration);
        buf.put_u32_le(self.burst_count);
        buf.put_u32_le(self.talkback_count);
        buf.put_i32_le(self.data_sent);
        buf.put_i32_le(self.data_received);
        buf.put_i32_le(self.max_bytes_per_second);
        buf.put_i32_le(self.mtu);
    }

    /// Writes the complete datagram: the header, followed by the reference payload up to `len`
    ///  for DATA packets
    pub fn ser_datagram(&self, buf: &mut impl BufMut) {
        self.ser(buf);
        if self.is_data() {
            let payload_len = usize::try_from(self.len).unwrap_or(0)
                .saturating_sub(Self::SERIALIZED_LEN);
            payload::put(buf, payload_len);
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PacketHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("packet of {} bytes is too short for a header of {} bytes", buf.remaining(), Self::SERIALIZED_LEN);
        }

        let packet_type = PacketType::try_from_primitive(buf.try_get_i8()?)?;
        let status = StatusKind::try_from_primitive(buf.try_get_i8()?)?;
        let sender = EndpointRole::try_from_primitive(buf.try_get_i8()?)?;
        let echo = buf.try_get_u8()? != 0;

        Ok(PacketHeader {
            packet_type,
            status,
            sender,
            echo,
            seqid: buf.try_get_i32_le()?,
            len: buf.try_get_i32_le()?,
            iteration: buf.try_get_i32_le()?,
            burst_count: buf.try_get_u32_le()?,
            talkback_count: buf.try_get_u32_le()?,
            data_sent: buf.try_get_i32_le()?,
            data_received: buf.try_get_i32_le()?,
            max_bytes_per_second: buf.try_get_i32_le()?,
            mtu: buf.try_get_i32_le()?,
        })
    }

    /// rewrites the sender role of a serialized datagram in place, leaving everything else as is
    pub fn restamp_sender(datagram: &mut [u8], sender: EndpointRole) {
        if let Some(b) = datagram.get_mut(Self::SENDER_OFFSET) {
            *b = i8::from(sender) as u8;
        }
    }
}

/// counters are tracked as `u32` but travel as `i32` on the wire
pub fn wire_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

pub fn wire_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
