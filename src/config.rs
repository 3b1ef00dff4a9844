//! 어셈블러 설정

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, DEFAULT_GAP_SKIP_THRESHOLD_US, DEFAULT_LOSS_RECORD_CAPACITY,
    DEFAULT_LOSS_REPORT_INTERVAL_MS,
};

/// 시간 근거가 없는 시퀀스 갭을 만났을 때의 판단 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResequencePolicy {
    /// 항상 누락 패킷을 기다린다 (`InsufficientData`).
    /// 갭은 수신 시간 규칙으로만 해소된다.
    Wait,

    /// 기대 번호 이후 패킷이 `window`개 이상 큐에 쌓이면 `WrongSequence`,
    /// 그 전에는 대기
    Lookahead { window: usize },
}

impl Default for ResequencePolicy {
    fn default() -> Self {
        ResequencePolicy::Lookahead { window: 8 }
    }
}

/// AVC 어셈블러 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// 갭 전체를 손실로 선언하는 수신 시간 차이 (마이크로초)
    pub gap_skip_threshold_us: i64,

    /// 손실 보고 최소 간격 (밀리초)
    pub loss_report_interval_ms: u64,

    /// 손실 기록 버퍼 크기 (초과 시 가장 오래된 항목부터 제거)
    pub loss_record_capacity: usize,

    /// 재정렬 대기 정책
    pub resequence: ResequencePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gap_skip_threshold_us: DEFAULT_GAP_SKIP_THRESHOLD_US, // 200ms
            loss_report_interval_ms: DEFAULT_LOSS_REPORT_INTERVAL_MS, // 200ms
            loss_record_capacity: DEFAULT_LOSS_RECORD_CAPACITY,
            resequence: ResequencePolicy::default(),
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 손실 보고 간격
    pub fn loss_report_interval(&self) -> Duration {
        Duration::from_millis(self.loss_report_interval_ms)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.gap_skip_threshold_us <= 0 {
            return Err(Error::InvalidConfig {
                field: "gap_skip_threshold_us",
                reason: format!("must be positive, got {}", self.gap_skip_threshold_us),
            });
        }
        if self.loss_record_capacity == 0 {
            return Err(Error::InvalidConfig {
                field: "loss_record_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if let ResequencePolicy::Lookahead { window: 0 } = self.resequence {
            return Err(Error::InvalidConfig {
                field: "resequence",
                reason: "lookahead window must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// 저지연 설정: 갭을 빨리 포기하고 손실도 자주 보고
    pub fn low_latency() -> Self {
        Self {
            gap_skip_threshold_us: 80_000,    // 80ms
            loss_report_interval_ms: 100,
            loss_record_capacity: 32,
            resequence: ResequencePolicy::Lookahead { window: 3 },
        }
    }

    /// 불안정한 네트워크용 설정: 재정렬을 더 오래 기다림
    pub fn lossy_network() -> Self {
        Self {
            gap_skip_threshold_us: 400_000,   // 400ms
            loss_report_interval_ms: 200,
            loss_record_capacity: 256,
            resequence: ResequencePolicy::Lookahead { window: 32 },
        }
    }
}
