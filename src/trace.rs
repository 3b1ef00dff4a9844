//! 패킷 트레이스 저장/재생
//!
//! 수신 순서 그대로의 패킷 목록을 bincode로 직렬화한다.
//! 시뮬레이터가 손실/재정렬 시나리오를 기록하고 똑같이 다시 돌릴 때 쓴다.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::packet::Packet;
use crate::{Error, Result, TRACE_MAGIC, TRACE_VERSION};

/// 직렬화용 패킷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePacket {
    pub sequence_number: u32,
    pub receive_time_us: Option<i64>,
    pub marker: bool,
    pub token: i32,
    pub payload: Vec<u8>,
}

impl From<&Packet> for TracePacket {
    fn from(packet: &Packet) -> Self {
        Self {
            sequence_number: packet.sequence_number,
            receive_time_us: packet.receive_time_us,
            marker: packet.marker,
            token: packet.token,
            payload: packet.payload.to_vec(),
        }
    }
}

impl From<TracePacket> for Packet {
    fn from(trace: TracePacket) -> Self {
        Packet {
            sequence_number: trace.sequence_number,
            receive_time_us: trace.receive_time_us,
            marker: trace.marker,
            token: trace.token,
            payload: trace.payload.into(),
        }
    }
}

/// 패킷 트레이스 파일
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketTrace {
    magic: u32,
    version: u8,
    packets: Vec<TracePacket>,
}

impl Default for PacketTrace {
    fn default() -> Self {
        Self {
            magic: TRACE_MAGIC,
            version: TRACE_VERSION,
            packets: Vec::new(),
        }
    }
}

impl PacketTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: &Packet) {
        self.packets.push(packet.into());
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn into_packets(self) -> Vec<Packet> {
        self.packets.into_iter().map(Packet::from).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let trace: PacketTrace = bincode::deserialize(bytes)?;
        if trace.magic != TRACE_MAGIC {
            return Err(Error::InvalidTrace(format!(
                "bad magic {:08X}",
                trace.magic
            )));
        }
        if trace.version != TRACE_VERSION {
            return Err(Error::InvalidTrace(format!(
                "unsupported version {}",
                trace.version
            )));
        }
        Ok(trace)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl FromIterator<Packet> for PacketTrace {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        let mut trace = Self::new();
        for packet in iter {
            trace.push(&packet);
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.trace");

        let packets = vec![
            Packet::new(1, vec![0x41, 0x01]).with_receive_time(10).with_marker(true),
            Packet::new(2, vec![0x7c, 0x85, 0x02]),
        ];
        let trace: PacketTrace = packets.iter().cloned().collect();
        trace.save(&path).unwrap();

        let loaded = PacketTrace::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.into_packets(), packets);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let mut trace = PacketTrace::new();
        trace.magic = 0xdead_beef;
        let bytes = trace.to_bytes().unwrap();
        assert!(matches!(
            PacketTrace::from_bytes(&bytes),
            Err(Error::InvalidTrace(_))
        ));

        assert!(matches!(
            PacketTrace::load("/nonexistent/capture.trace"),
            Err(Error::Io(_))
        ));
    }
}
