//! The fixed-layout datagram broadcast to authenticated sessions once per
//! tick (§4.8).
//!
//! Wire layout, all integers little-endian:
//!
//! ```text
//! offset  size  field
//! 0       1     packet type (always PACKET_TYPE_TICK)
//! 1       4     tick kind discriminant (i32)
//! 5       8     tick counter (u64)
//! 13      8     wall-clock timestamp, Unix epoch milliseconds (i64)
//! ```
//!
//! Total length: 21 bytes.

use bytes::Buf;
use vessel_wire::{BinaryReader, BinaryWriter, WireError};

pub const TICK_DATAGRAM_LEN: usize = 21;
const PACKET_TYPE_TICK: u8 = 0x01;

/// The kind of simulation step a tick datagram announces. Discriminants are
/// part of the wire format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TickKind {
    Movement = 0,
    Messaging = 1,
    ObjectSpawning = 2,
    ObjectCleanup = 3,
    Combat = 4,
    WorldSimulation = 5,
    AutoSave = 6,
}

impl TickKind {
    pub const ALL: [TickKind; 7] = [
        TickKind::Movement,
        TickKind::Messaging,
        TickKind::ObjectSpawning,
        TickKind::ObjectCleanup,
        TickKind::Combat,
        TickKind::WorldSimulation,
        TickKind::AutoSave,
    ];

    pub fn from_i32(value: i32) -> Option<TickKind> {
        Self::ALL.into_iter().find(|kind| *kind as i32 == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            TickKind::Movement => "movement",
            TickKind::Messaging => "messaging",
            TickKind::ObjectSpawning => "objectspawning",
            TickKind::ObjectCleanup => "objectcleanup",
            TickKind::Combat => "combat",
            TickKind::WorldSimulation => "worldsimulation",
            TickKind::AutoSave => "autosave",
        }
    }
}

/// A single tick announcement, ready to broadcast over UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDatagram {
    pub kind: TickKind,
    pub counter: u64,
    pub timestamp_millis: i64,
}

impl TickDatagram {
    pub fn new(kind: TickKind, counter: u64, timestamp_millis: i64) -> Self {
        Self {
            kind,
            counter,
            timestamp_millis,
        }
    }

    pub fn encode(&self) -> [u8; TICK_DATAGRAM_LEN] {
        let mut buf = [0u8; TICK_DATAGRAM_LEN];
        let mut writer = &mut buf[..];
        writer.write_u8(PACKET_TYPE_TICK).expect("fixed-size buffer");
        writer
            .write_i32_le(self.kind as i32)
            .expect("fixed-size buffer");
        writer
            .write_u64_le(self.counter)
            .expect("fixed-size buffer");
        writer
            .write_i64_le(self.timestamp_millis)
            .expect("fixed-size buffer");
        buf
    }

    pub fn decode(mut bytes: &[u8]) -> Result<TickDatagram, WireError> {
        if bytes.len() != TICK_DATAGRAM_LEN {
            return Err(WireError::UnexpectedEof {
                needed: TICK_DATAGRAM_LEN,
                remaining: bytes.len(),
            });
        }

        let packet_type = bytes.read_u8()?;
        if packet_type != PACKET_TYPE_TICK {
            return Err(WireError::UnexpectedEof {
                needed: TICK_DATAGRAM_LEN,
                remaining: bytes.remaining(),
            });
        }

        let kind_raw = bytes.read_i32_le()?;
        let kind = TickKind::from_i32(kind_raw).ok_or(WireError::UnexpectedEof {
            needed: TICK_DATAGRAM_LEN,
            remaining: bytes.remaining(),
        })?;
        let counter = bytes.read_u64_le()?;
        let timestamp_millis = bytes.read_i64_le()?;

        Ok(TickDatagram::new(kind, counter, timestamp_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_wire_format() {
        let datagram = TickDatagram::new(TickKind::Combat, 42, 1_700_000_000);
        let encoded = datagram.encode();
        assert_eq!(encoded.len(), TICK_DATAGRAM_LEN);

        let decoded = TickDatagram::decode(&encoded).unwrap();
        assert_eq!(decoded, datagram);
    }

    #[test]
    fn rejects_truncated_datagrams() {
        let datagram = TickDatagram::new(TickKind::AutoSave, 1, 0);
        let encoded = datagram.encode();
        assert!(TickDatagram::decode(&encoded[..TICK_DATAGRAM_LEN - 1]).is_err());
    }

    #[test]
    fn rejects_unknown_tick_kind_discriminant() {
        let mut encoded = TickDatagram::new(TickKind::Movement, 0, 0).encode();
        encoded[1..5].copy_from_slice(&99i32.to_le_bytes());
        assert!(TickDatagram::decode(&encoded).is_err());
    }

    #[test]
    fn every_tick_kind_round_trips_its_discriminant() {
        for kind in TickKind::ALL {
            assert_eq!(TickKind::from_i32(kind as i32), Some(kind));
        }
    }
}
