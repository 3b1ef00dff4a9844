//! 어셈블러 통계

use std::time::{Duration, Instant};

use serde::Serialize;

/// 어셈블러 누적 통계
#[derive(Debug, Clone, Serialize)]
pub struct AssemblerStats {
    /// 생성 또는 마지막 reset 시간
    #[serde(skip)]
    pub start_time: Instant,

    /// 기대 번호로 수락한 패킷 수
    pub packets_accepted: u64,

    /// 기대 번호보다 앞서 버린 중복/지연 패킷 수
    pub stale_dropped: u64,

    /// MalformedPacket으로 버린 패킷 수
    pub malformed_packets: u64,

    /// 방출한 액세스 유닛 수
    pub units_emitted: u64,

    /// 손상 표시로 방출된 유닛 수
    pub damaged_units: u64,

    /// 손실 등록된 패킷 수 (reset 시 초기화)
    pub lost_packets: u64,

    /// 손상된 IDR 유닛 수 (reset 시 초기화)
    pub idr_damaged: u64,

    /// SkipGap 결정 횟수
    pub gaps_skipped: u64,

    /// WrongSequence 보고 횟수
    pub wrong_sequence: u64,

    /// 내보낸 손실 보고 수
    pub loss_reports: u64,
}

impl AssemblerStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_accepted: 0,
            stale_dropped: 0,
            malformed_packets: 0,
            units_emitted: 0,
            damaged_units: 0,
            lost_packets: 0,
            idr_damaged: 0,
            gaps_skipped: 0,
            wrong_sequence: 0,
            loss_reports: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 손실률 (손실 / (수락 + 손실))
    pub fn loss_rate(&self) -> f64 {
        let total = self.packets_accepted + self.lost_packets;
        if total == 0 {
            return 0.0;
        }
        self.lost_packets as f64 / total as f64
    }

    /// 손상 유닛 비율
    pub fn damage_rate(&self) -> f64 {
        if self.units_emitted == 0 {
            return 0.0;
        }
        self.damaged_units as f64 / self.units_emitted as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Packets: {} (stale {}, malformed {}) | Units: {} (damaged {:.2}%, IDR {}) | Lost: {} ({:.2}%) | Skips: {} | Reports: {}",
            self.elapsed().as_secs_f64(),
            self.packets_accepted,
            self.stale_dropped,
            self.malformed_packets,
            self.units_emitted,
            self.damage_rate() * 100.0,
            self.idr_damaged,
            self.lost_packets,
            self.loss_rate() * 100.0,
            self.gaps_skipped,
            self.loss_reports,
        )
    }
}

impl Default for AssemblerStats {
    fn default() -> Self {
        Self::new()
    }
}
