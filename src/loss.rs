//! 손실 추적
//!
//! 손실된 시퀀스 번호를 고정 크기 버퍼에 모아 두었다가
//! 보고 간격 제한을 지키며 한꺼번에 내보낸다.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::warn;

/// 손실 기록 + 보고 간격 제한
#[derive(Debug, Clone)]
pub struct LossTracker {
    /// 삽입 순서대로 쌓인 손실 시퀀스 번호
    records: VecDeque<u32>,

    /// 버퍼 크기
    capacity: usize,

    /// 보고 최소 간격
    report_interval: Duration,

    /// 마지막 보고 시간
    last_report: Option<Instant>,
}

impl LossTracker {
    pub fn new(capacity: usize, report_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            report_interval,
            last_report: None,
        }
    }

    /// 손실 번호 등록 (가득 차면 가장 오래된 항목 제거)
    pub fn register_lost(&mut self, seq: u32) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(seq);
    }

    /// 보고 대기 중인 손실 번호
    pub fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 현재 시각 기준 flush
    pub fn flush(&mut self) -> Option<Vec<u32>> {
        self.flush_at(Instant::now())
    }

    /// 간격 제한을 통과하면 타이머를 갱신하고, 대기 항목이 있으면 전체 목록을 꺼내고 비운다.
    /// 빈 flush도 타이머를 갱신한다. 제한에 걸린 항목은 다음 flush까지 남는다.
    pub fn flush_at(&mut self, now: Instant) -> Option<Vec<u32>> {
        if let Some(last) = self.last_report {
            if now.saturating_duration_since(last) < self.report_interval {
                return None;
            }
        }
        self.last_report = Some(now);

        if self.records.is_empty() {
            return None;
        }

        let lost: Vec<u32> = self.records.drain(..).collect();
        warn!("packet lost: {} sequence numbers reported", lost.len());
        Some(lost)
    }

    /// 간격 제한 타이머만 초기화 (기록은 유지)
    pub fn reset_timer(&mut self) {
        self.last_report = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(capacity: usize) -> LossTracker {
        LossTracker::new(capacity, Duration::from_millis(200))
    }

    #[test]
    fn test_fifo_eviction_over_capacity() {
        let mut loss = tracker(4);
        for seq in 10..15 {
            loss.register_lost(seq);
        }

        assert_eq!(loss.pending_count(), 4);
        assert_eq!(loss.pending().collect::<Vec<_>>(), vec![11, 12, 13, 14]);
    }

    #[test]
    fn test_empty_flush_starts_interval() {
        let mut loss = tracker(4);
        let now = Instant::now();
        assert_eq!(loss.flush_at(now), None);

        // 빈 flush도 간격 타이머를 시작함
        loss.register_lost(7);
        assert_eq!(loss.flush_at(now + Duration::from_millis(50)), None);
        assert_eq!(loss.pending_count(), 1);
        assert_eq!(loss.flush_at(now + Duration::from_millis(200)), Some(vec![7]));
    }

    #[test]
    fn test_flush_rate_limited() {
        let mut loss = tracker(16);
        let start = Instant::now();

        loss.register_lost(1);
        loss.register_lost(2);
        assert_eq!(loss.flush_at(start), Some(vec![1, 2]));

        loss.register_lost(3);
        assert_eq!(loss.flush_at(start + Duration::from_millis(150)), None);
        assert_eq!(loss.pending_count(), 1);

        loss.register_lost(4);
        assert_eq!(
            loss.flush_at(start + Duration::from_millis(200)),
            Some(vec![3, 4])
        );
        assert_eq!(loss.pending_count(), 0);
    }

    #[test]
    fn test_reset_timer_allows_immediate_flush() {
        let mut loss = tracker(16);
        let start = Instant::now();

        loss.register_lost(1);
        assert!(loss.flush_at(start).is_some());

        loss.register_lost(2);
        loss.reset_timer();
        assert_eq!(loss.flush_at(start + Duration::from_millis(1)), Some(vec![2]));
    }
}
