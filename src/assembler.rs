//! H.264 액세스 유닛 어셈블러
//!
//! - 패킷 소스에서 한 번에 하나씩 꺼내 처리 (블로킹 없음)
//! - 시퀀스 추적 → NAL 타입별 분기 → 방출
//! - 손실/손상은 에러가 아니라 상태와 `damaged` 표시로 전달

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::aggregation::split_stap_a;
use crate::emitter::{AccessUnit, AssemblerEvent, Emitter, EventSink};
use crate::fragment::FragmentReassembler;
use crate::loss::LossTracker;
use crate::nal::{self, NalHeader, PayloadKind, NAL_TYPE_IDR};
use crate::packet::{Packet, PacketSource};
use crate::sequence::{Disposition, SequenceTracker};
use crate::stats::AssemblerStats;
use crate::{AssemblyStatus, Config, Result};

/// 단일 소유 어셈블러 상태
///
/// 내부 상태는 전부 이 구조체 안에 있다. 여러 실행 컨텍스트에서 호출하려면
/// 외부에서 동기화해야 한다 ([`crate::driver::AssemblerTask`] 참고).
#[derive(Debug)]
pub struct AvcAssembler {
    config: Config,
    sequence: SequenceTracker,
    fragments: FragmentReassembler,
    loss: LossTracker,
    emitter: Emitter,
    stats: AssemblerStats,
}

impl AvcAssembler {
    pub fn new(config: Config) -> Self {
        Self {
            sequence: SequenceTracker::new(config.gap_skip_threshold_us, config.resequence),
            fragments: FragmentReassembler::new(),
            loss: LossTracker::new(config.loss_record_capacity, config.loss_report_interval()),
            emitter: Emitter::new(),
            stats: AssemblerStats::new(),
            config,
        }
    }

    /// 설정 검증 후 생성
    pub fn try_new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 다음 기대 시퀀스 번호 (커서가 무효면 None)
    pub fn next_expected(&self) -> Option<u32> {
        self.sequence.next_expected()
    }

    pub fn has_open_fragment(&self) -> bool {
        self.fragments.is_open()
    }

    /// 보고 대기 중인 손실 번호 수
    pub fn pending_losses(&self) -> usize {
        self.loss.pending_count()
    }

    pub fn stats(&self) -> AssemblerStats {
        let mut stats = self.stats.clone();
        stats.stale_dropped = self.sequence.stale_dropped();
        stats
    }

    /// 패킷 하나 분량의 작업 수행
    ///
    /// `MalformedPacket`이면 현재 액세스 유닛을 손상으로 표시한다.
    pub fn assemble_more<S, K>(&mut self, source: &mut S, sink: &mut K) -> AssemblyStatus
    where
        S: PacketSource + ?Sized,
        K: EventSink + ?Sized,
    {
        let status = self.add_nal_unit(source, sink);

        if status == AssemblyStatus::MalformedPacket {
            self.stats.malformed_packets += 1;
            self.fragments.taint();
        }

        status
    }

    /// `InsufficientData` 또는 `WrongSequence`가 나올 때까지 반복 처리.
    /// 마지막 상태와 수행한 단계 수를 돌려준다.
    pub fn drain<S, K>(&mut self, source: &mut S, sink: &mut K) -> (AssemblyStatus, usize)
    where
        S: PacketSource + ?Sized,
        K: EventSink + ?Sized,
    {
        let mut steps = 0;
        loop {
            let status = self.assemble_more(source, sink);
            if !status.should_continue() {
                return (status, steps);
            }
            steps += 1;
        }
    }

    /// `WrongSequence` 해소: 기대 번호를 손실로 등록하고 커서를 1 전진
    pub fn declare_next_lost(&mut self) -> Option<u32> {
        let seq = self.sequence.next_expected()?;
        debug!("declaring seq {} lost", seq);
        self.register_lost(seq);
        Some(seq)
    }

    /// 간격 제한을 지키며 손실 보고
    pub fn report_losses<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> bool {
        self.report_losses_at(Instant::now(), sink)
    }

    pub fn report_losses_at<K: EventSink + ?Sized>(&mut self, now: Instant, sink: &mut K) -> bool {
        match self.loss.flush_at(now) {
            Some(lost_sequence_numbers) => {
                self.stats.loss_reports += 1;
                sink.deliver(AssemblerEvent::PacketsLost {
                    lost_sequence_numbers,
                });
                true
            }
            None => false,
        }
    }

    /// 커서, 손상 표시, 손실 카운트, 보고 타이머 초기화.
    /// 열린 프래그먼트 누산기는 건드리지 않는다.
    pub fn reset(&mut self) {
        info!("reset (next expected was {:?})", self.sequence.next_expected());
        self.sequence.reset();
        self.fragments.clear_taint();
        self.stats.lost_packets = 0;
        self.stats.idr_damaged = 0;
        self.loss.reset_timer();
    }

    /// 열린 프래그먼트 누산기를 방출 없이 버림
    pub fn flush_queue(&mut self) {
        self.fragments.discard();
    }

    /// 완성된 유닛의 선두 NAL이 SPS/PPS인지
    pub fn is_parameter_set(unit: &AccessUnit) -> bool {
        nal::is_parameter_set(&unit.data)
    }

    fn add_nal_unit<S, K>(&mut self, source: &mut S, sink: &mut K) -> AssemblyStatus
    where
        S: PacketSource + ?Sized,
        K: EventSink + ?Sized,
    {
        match self.sequence.inspect(source) {
            Disposition::Accept => {}
            Disposition::Empty | Disposition::Wait => return AssemblyStatus::InsufficientData,
            Disposition::WrongSequence => {
                self.stats.wrong_sequence += 1;
                return AssemblyStatus::WrongSequence;
            }
            Disposition::SkipGap { lost } => {
                self.stats.gaps_skipped += 1;
                for seq in lost {
                    self.register_lost(seq);
                }
                return AssemblyStatus::SkipGap;
            }
        }

        let packet = match source.pop_front() {
            Some(packet) => packet,
            None => return AssemblyStatus::InsufficientData,
        };
        self.sequence.advance();
        self.stats.packets_accepted += 1;

        let header = match packet.payload.first() {
            Some(&b) if b & 0x80 == 0 => NalHeader(b),
            _ => {
                warn!("Ignoring corrupt buffer (seq={})", packet.sequence_number);
                return AssemblyStatus::MalformedPacket;
            }
        };

        match PayloadKind::classify(header) {
            PayloadKind::Single => {
                // 이전 NAL의 마지막 FU-A 몇 개가 사라졌을 수 있음
                self.preempt_fragment(sink);
                let unit = AccessUnit::from_single(packet.payload.clone(), &packet);
                self.emit(unit, sink);
                AssemblyStatus::Ok
            }
            PayloadKind::StapA => {
                self.preempt_fragment(sink);
                match split_stap_a(&packet, |unit| self.emit(unit, sink)) {
                    Ok(_) => AssemblyStatus::Ok,
                    Err(_) => AssemblyStatus::MalformedPacket,
                }
            }
            PayloadKind::FuA => self.add_fragment(packet, sink),
            PayloadKind::Undefined => {
                warn!("Ignoring undefined nal type (seq={})", packet.sequence_number);
                AssemblyStatus::Ok
            }
            PayloadKind::Unsupported(nal_type) => {
                warn!("Ignoring unsupported buffer (nalType={})", nal_type);
                AssemblyStatus::MalformedPacket
            }
        }
    }

    fn add_fragment<K: EventSink + ?Sized>(&mut self, packet: Packet, sink: &mut K) -> AssemblyStatus {
        let outcome = self.fragments.push_fragment(packet);

        if let Some(unit) = outcome.interrupted {
            self.emit(unit, sink);
        }
        if let Some(unit) = outcome.completed {
            self.emit(unit, sink);
        }

        if outcome.malformed {
            AssemblyStatus::MalformedPacket
        } else {
            AssemblyStatus::Ok
        }
    }

    fn preempt_fragment<K: EventSink + ?Sized>(&mut self, sink: &mut K) {
        if let Some(unit) = self.fragments.force_finalize() {
            self.emit(unit, sink);
        }
    }

    fn register_lost(&mut self, seq: u32) {
        self.loss.register_lost(seq);
        self.sequence.advance();
        self.fragments.taint();
        self.stats.lost_packets += 1;
    }

    fn emit<K: EventSink + ?Sized>(&mut self, unit: AccessUnit, sink: &mut K) {
        self.stats.units_emitted += 1;
        if unit.damaged {
            self.stats.damaged_units += 1;
            if unit.nal_type() == Some(NAL_TYPE_IDR) {
                self.stats.idr_damaged += 1;
            }
        }
        self.emitter.emit(unit, sink);
    }
}

impl Default for AvcAssembler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
