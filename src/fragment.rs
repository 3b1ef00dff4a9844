//! FU-A 프래그먼트 재조립
//!
//! ```text
//!  FU indicator     FU header
//! +-+-+-+-+-+-+-+-+ +-+-+-+-+-+-+-+-+
//! |F|NRI|  28     | |S|E|R|  Type   |
//! +-+-+-+-+-+-+-+-+ +-+-+-+-+-+-+-+-+
//! ```
//!
//! 누산기는 한 번에 하나만 존재한다. 시퀀스 추적기가 순서대로 통과시킨
//! 패킷만 들어오므로 도착 순서가 곧 조립 순서다.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::emitter::{AccessUnit, ContributionTokens};
use crate::nal::{NalHeader, NAL_TYPE_FU_A};
use crate::packet::Packet;

/// FU indicator + FU header 크기
pub const FU_HEADER_LEN: usize = 2;

/// FU 헤더 두 바이트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuHeader {
    pub indicator: NalHeader,
    pub start: bool,
    pub end: bool,
    pub nal_type: u8,
}

impl FuHeader {
    /// 2바이트 미만이면 None
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < FU_HEADER_LEN {
            return None;
        }
        let header = payload[1];
        Some(Self {
            indicator: NalHeader(payload[0]),
            start: header & 0x80 != 0,
            end: header & 0x40 != 0,
            nal_type: header & 0x1f,
        })
    }
}

/// 진행 중인 단편화 NAL 하나
#[derive(Debug)]
pub struct FragmentAccumulator {
    nal_type: u8,
    nal_ref_idc: u8,
    fragments: Vec<Packet>,
    /// FU 헤더를 뺀 누적 바이트 수
    nal_size: usize,
    count: u32,
    damaged: bool,
}

impl FragmentAccumulator {
    fn new(nal_ref_idc: u8, nal_type: u8) -> Self {
        Self {
            nal_type,
            nal_ref_idc,
            fragments: Vec::new(),
            nal_size: 0,
            count: 0,
            damaged: false,
        }
    }

    fn push(&mut self, packet: Packet) {
        self.nal_size += packet.payload.len() - FU_HEADER_LEN;
        self.count += 1;
        self.fragments.push(packet);
    }

    pub fn nal_type(&self) -> u8 {
        self.nal_type
    }

    pub fn fragment_count(&self) -> u32 {
        self.count
    }

    pub fn nal_size(&self) -> usize {
        self.nal_size
    }

    /// 합성 헤더 + 헤더를 제거한 조각들을 도착 순서대로 이어 붙인다.
    fn finish(self) -> AccessUnit {
        let mut data = BytesMut::with_capacity(self.nal_size + 1);
        data.put_u8(NalHeader::new(self.nal_ref_idc, self.nal_type).0);
        for fragment in &self.fragments {
            data.extend_from_slice(&fragment.payload[FU_HEADER_LEN..]);
        }

        // fragments는 비어 있을 수 없다 (시작 조각과 함께 생성됨)
        let tokens = ContributionTokens::scan(&self.fragments).unwrap_or(ContributionTokens {
            first: 0,
            earliest: 0,
            latest: 0,
        });
        let marker = self.fragments.last().map_or(false, |p| p.marker);

        AccessUnit {
            data: data.freeze(),
            importance: self.nal_ref_idc,
            damaged: self.damaged,
            marker,
            first_token: tokens.first,
            earliest_token: tokens.earliest,
            latest_token: tokens.latest,
            unit_index: 0,
        }
    }
}

/// 프래그먼트 하나를 처리한 결과
#[derive(Debug, Default)]
pub struct FragmentOutcome {
    /// 패킷을 버렸음
    pub malformed: bool,

    /// 새 시작 조각 때문에 강제로 마감된 이전 유닛
    pub interrupted: Option<AccessUnit>,

    /// 끝 조각으로 완성된 유닛
    pub completed: Option<AccessUnit>,
}

impl FragmentOutcome {
    fn malformed() -> Self {
        Self {
            malformed: true,
            ..Self::default()
        }
    }
}

/// FU-A 재조립 상태 기계
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    open: Option<FragmentAccumulator>,

    /// 현재 액세스 유닛 손상 표시 (손실, 잘못된 패킷)
    unit_damaged: bool,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn accumulator(&self) -> Option<&FragmentAccumulator> {
        self.open.as_ref()
    }

    /// 현재 유닛을 손상으로 표시
    pub fn taint(&mut self) {
        self.unit_damaged = true;
    }

    pub fn is_tainted(&self) -> bool {
        self.unit_damaged
    }

    pub fn clear_taint(&mut self) {
        self.unit_damaged = false;
    }

    /// 열린 누산기를 방출하지 않고 버린다.
    pub fn discard(&mut self) -> bool {
        match self.open.take() {
            Some(acc) => {
                debug!(
                    "discarding partial FU-A (type={}, fragments={})",
                    acc.nal_type, acc.count
                );
                true
            }
            None => false,
        }
    }

    /// 끝 조각 없이 열린 누산기를 마감한다. 결과는 항상 손상으로 표시된다.
    pub fn force_finalize(&mut self) -> Option<AccessUnit> {
        let mut acc = self.open.take()?;
        debug!(
            "finalizing incomplete FU-A (type={}, fragments={}, {} bytes)",
            acc.nal_type, acc.count, acc.nal_size
        );
        acc.damaged = true;
        self.unit_damaged = false;
        Some(acc.finish())
    }

    /// FU-A 패킷 하나 처리
    pub fn push_fragment(&mut self, packet: Packet) -> FragmentOutcome {
        let fu = match FuHeader::parse(&packet.payload) {
            Some(fu) => fu,
            None => {
                warn!("Ignoring malformed FU buffer (size = {})", packet.payload.len());
                return FragmentOutcome::malformed();
            }
        };
        debug_assert_eq!(fu.indicator.nal_type(), NAL_TYPE_FU_A);

        let mut outcome = FragmentOutcome::default();

        let open_type = self.open.as_ref().map(|acc| acc.nal_type);
        match open_type {
            None if !fu.start => {
                warn!(
                    "FU-A continuation without start (seq={})",
                    packet.sequence_number
                );
                return FragmentOutcome::malformed();
            }
            None => {
                // 이전 유닛의 손상이 새 유닛으로 번지지 않게
                self.unit_damaged = false;
            }
            Some(_) if fu.start => {
                // 이전 유닛의 끝 조각이 사라졌거나 끝 비트가 없었음
                outcome.interrupted = self.force_finalize();
            }
            Some(open) if open != fu.nal_type => {
                warn!(
                    "Ignoring malformed FU buffer (fragment nal_type({}) != {})",
                    fu.nal_type, open
                );
                return FragmentOutcome::malformed();
            }
            Some(_) => {}
        }

        let acc = self
            .open
            .get_or_insert_with(|| FragmentAccumulator::new(fu.indicator.nal_ref_idc(), fu.nal_type));
        acc.push(packet);
        trace!(
            "Nal-FU-A (count:{}, total_size({}))",
            acc.count,
            acc.nal_size
        );

        if fu.end {
            if let Some(mut acc) = self.open.take() {
                if self.unit_damaged {
                    acc.damaged = true;
                }
                self.unit_damaged = false;
                outcome.completed = Some(acc.finish());
            }
        }

        outcome
    }
}
