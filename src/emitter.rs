//! 액세스 유닛 방출
//!
//! 모든 방출 경로(단일 NAL, STAP-A 멤버, 재조립된 FU-A)는 여기를 거쳐
//! 일련번호를 받고 이벤트 싱크로 전달된다.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::nal::{self, NalHeader};
use crate::packet::Packet;

/// 재구성된 액세스 유닛
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// NAL 헤더 바이트를 포함한 NAL 유닛
    pub data: Bytes,

    /// nal_ref_idc (0~3)
    pub importance: u8,

    /// 불완전하거나 일관성 없는 패킷열에서 재구성됨
    pub damaged: bool,

    pub marker: bool,

    /// 첫 기여 패킷 토큰
    pub first_token: i32,

    /// 수신 시간이 가장 이른 기여 패킷 토큰
    pub earliest_token: i32,

    /// 마지막으로 처리된 기여 패킷 토큰
    pub latest_token: i32,

    /// 프로세스 수명 동안 단조 증가하는 유닛 번호
    pub unit_index: u64,
}

impl AccessUnit {
    /// 패킷 하나로 이루어진 유닛 (단일 NAL, STAP-A 멤버)
    pub(crate) fn from_single(data: Bytes, packet: &Packet) -> Self {
        let importance = data.first().map(|&b| NalHeader(b).nal_ref_idc()).unwrap_or(0);
        Self {
            data,
            importance,
            damaged: false,
            marker: packet.marker,
            first_token: packet.token,
            earliest_token: packet.token,
            latest_token: packet.token,
            unit_index: 0,
        }
    }

    pub fn nal_type(&self) -> Option<u8> {
        self.data.first().map(|&b| NalHeader(b).nal_type())
    }

    /// SPS/PPS 여부
    pub fn is_parameter_set(&self) -> bool {
        nal::is_parameter_set(&self.data)
    }
}

/// 기여 패킷들의 진단용 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContributionTokens {
    pub first: i32,
    pub earliest: i32,
    pub latest: i32,
}

impl ContributionTokens {
    /// 수신 시간이 같으면 뒤쪽 패킷이 earliest가 된다. 수신 시간이 없는 패킷은 0으로 본다.
    pub fn scan<'a>(packets: impl IntoIterator<Item = &'a Packet>) -> Option<Self> {
        let mut iter = packets.into_iter().peekable();
        let first = *iter.peek()?;

        let mut tokens = Self {
            first: first.token,
            earliest: first.token,
            latest: first.token,
        };
        let mut earliest_time = first.receive_time_us.unwrap_or(0);

        for packet in iter {
            let t = packet.receive_time_us.unwrap_or(0);
            if t <= earliest_time {
                tokens.earliest = packet.token;
                earliest_time = t;
            }
            tokens.latest = packet.token;
        }

        Some(tokens)
    }
}

/// 싱크로 전달되는 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    AccessUnitReady(AccessUnit),
    PacketsLost { lost_sequence_numbers: Vec<u32> },
}

/// 이벤트 전달 방식과 어셈블러 코어를 분리하는 경계
pub trait EventSink {
    fn deliver(&mut self, event: AssemblerEvent);
}

impl EventSink for Vec<AssemblerEvent> {
    fn deliver(&mut self, event: AssemblerEvent) {
        self.push(event);
    }
}

impl EventSink for crossbeam_channel::Sender<AssemblerEvent> {
    fn deliver(&mut self, event: AssemblerEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<AssemblerEvent> {
    fn deliver(&mut self, event: AssemblerEvent) {
        let _ = self.send(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn deliver(&mut self, event: AssemblerEvent) {
        (**self).deliver(event);
    }
}

/// 유닛 번호를 매기고 싱크로 전달
#[derive(Debug, Default)]
pub struct Emitter {
    next_index: u64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 방출한 유닛 수
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    pub fn emit<S: EventSink + ?Sized>(&mut self, mut unit: AccessUnit, sink: &mut S) -> u64 {
        unit.unit_index = self.next_index;
        self.next_index += 1;

        trace!(
            "access unit #{} ({} bytes, marker={}, damaged={}, tokens F={} E={} L={})",
            unit.unit_index,
            unit.data.len(),
            unit.marker,
            unit.damaged,
            unit.first_token,
            unit.earliest_token,
            unit.latest_token
        );

        let index = unit.unit_index;
        sink.deliver(AssemblerEvent::AccessUnitReady(unit));
        index
    }
}
