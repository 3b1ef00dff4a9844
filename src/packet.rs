//! 수신 패킷과 패킷 소스
//!
//! RTP 헤더 파싱은 상류에서 끝났다고 가정한다. 어셈블러는 시퀀스 번호,
//! 수신 시간, 마커 비트, 진단용 토큰, 그리고 페이로드만 본다.

use std::collections::VecDeque;

use bytes::Bytes;

/// 수신된 RTP 패킷 (큐에 들어간 뒤로는 불변)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 확장된 시퀀스 번호 (16비트 wrap은 상류에서 풀어서 전달)
    pub sequence_number: u32,

    /// 수신 시간 (마이크로초), 없을 수 있음
    pub receive_time_us: Option<i64>,

    /// RTP 마커 비트
    pub marker: bool,

    /// 진단용 상관 토큰 (보통 확장 전 시퀀스 번호)
    pub token: i32,

    /// RTP 페이로드 (공유 읽기 전용 버퍼)
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_number: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_number,
            receive_time_us: None,
            marker: false,
            token: sequence_number as i32,
            payload: payload.into(),
        }
    }

    pub fn with_receive_time(mut self, receive_time_us: i64) -> Self {
        self.receive_time_us = Some(receive_time_us);
        self
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_token(mut self, token: i32) -> Self {
        self.token = token;
        self
    }
}

/// 수신 순서대로 정렬된 패킷 큐
///
/// 어셈블러는 앞에서만 꺼내며, 큐 자체의 동기화는 소유자 책임이다.
pub trait PacketSource {
    fn peek_front(&self) -> Option<&Packet>;

    fn pop_front(&mut self) -> Option<Packet>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PacketSource for VecDeque<Packet> {
    fn peek_front(&self) -> Option<&Packet> {
        self.front()
    }

    fn pop_front(&mut self) -> Option<Packet> {
        VecDeque::pop_front(self)
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}
