//! H.264 → RTP 패킷화 (단일 NAL, FU-A, STAP-A)
//!
//! 어셈블러의 역방향. 시뮬레이터, 벤치마크, 테스트에서 입력 패킷을 만드는 데 쓴다.
//! 시퀀스 번호와 토큰은 패킷마다 1씩 증가한다.

use bytes::{BufMut, Bytes, BytesMut};

use crate::fragment::FU_HEADER_LEN;
use crate::nal::{NalHeader, NAL_TYPE_FU_A, NAL_TYPE_STAP_A};
use crate::packet::Packet;

/// RFC 6184 패킷화기
#[derive(Debug, Clone)]
pub struct Packetizer {
    /// 최대 RTP 페이로드 크기
    max_payload: usize,
    next_seq: u32,
}

impl Packetizer {
    pub fn new(max_payload: usize, first_seq: u32) -> Self {
        Self {
            // FU 헤더 + 최소 1바이트
            max_payload: max_payload.max(FU_HEADER_LEN + 1),
            next_seq: first_seq,
        }
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    fn packet(&mut self, payload: Bytes, receive_time_us: i64, marker: bool) -> Packet {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        Packet::new(seq, payload)
            .with_receive_time(receive_time_us)
            .with_marker(marker)
            .with_token((seq & 0xffff) as i32)
    }

    /// NAL 하나를 패킷화. 페이로드 한도를 넘으면 FU-A로 나눈다.
    /// 마커는 마지막 패킷에만 붙는다.
    pub fn packetize(&mut self, nal: &[u8], receive_time_us: i64, marker: bool) -> Vec<Packet> {
        if nal.is_empty() {
            return Vec::new();
        }

        if nal.len() <= self.max_payload {
            let packet = self.packet(Bytes::copy_from_slice(nal), receive_time_us, marker);
            return vec![packet];
        }

        let header = NalHeader(nal[0]);
        let indicator = (nal[0] & 0xe0) | NAL_TYPE_FU_A;
        let budget = self.max_payload - FU_HEADER_LEN;

        let body = &nal[1..];
        let count = (body.len() + budget - 1) / budget;

        body.chunks(budget)
            .enumerate()
            .map(|(i, piece)| {
                let start = i == 0;
                let end = i + 1 == count;

                let mut fu_header = header.nal_type();
                if start {
                    fu_header |= 0x80;
                }
                if end {
                    fu_header |= 0x40;
                }

                let mut payload = BytesMut::with_capacity(FU_HEADER_LEN + piece.len());
                payload.put_u8(indicator);
                payload.put_u8(fu_header);
                payload.extend_from_slice(piece);

                self.packet(payload.freeze(), receive_time_us, marker && end)
            })
            .collect()
    }

    /// 작은 NAL 여러 개를 STAP-A 한 패킷으로 묶는다.
    /// 페이로드 한도를 넘거나 NAL이 65535바이트를 넘으면 None.
    pub fn aggregate(&mut self, nals: &[&[u8]], receive_time_us: i64, marker: bool) -> Option<Packet> {
        if nals.is_empty() {
            return None;
        }

        let size = 1 + nals.iter().map(|n| 2 + n.len()).sum::<usize>();
        if size > self.max_payload {
            return None;
        }

        // STAP-A의 NRI는 포함된 NAL 중 최대값
        let nri = nals
            .iter()
            .filter_map(|n| n.first())
            .map(|&b| NalHeader(b).nal_ref_idc())
            .max()
            .unwrap_or(0);

        let mut payload = BytesMut::with_capacity(size);
        payload.put_u8(NalHeader::new(nri, NAL_TYPE_STAP_A).0);
        for nal in nals {
            let len = u16::try_from(nal.len()).ok()?;
            payload.put_u16(len);
            payload.extend_from_slice(nal);
        }

        Some(self.packet(payload.freeze(), receive_time_us, marker))
    }
}
