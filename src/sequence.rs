//! 시퀀스 번호 추적
//!
//! 다음에 기대하는 시퀀스 번호 커서를 관리하고 큐 선두 패킷의 처리 방향을 정한다.
//! 커서는 소비, 손실, 건너뜀 모두에 대해 정확히 1씩 전진한다.

use std::ops::Range;

use tracing::{debug, info};

use crate::config::ResequencePolicy;
use crate::packet::PacketSource;

/// 선두 패킷 판정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// 선두가 기대 번호: NAL 타입별 처리로 넘긴다
    Accept,

    /// 큐가 비었음
    Empty,

    /// 수신 시간 차이가 커서 갭 전체를 손실로 선언
    SkipGap { lost: Range<u32> },

    /// 누락 패킷을 더 기다림
    Wait,

    /// 재정렬 대기 한도 초과
    WrongSequence,
}

/// 시퀀스 커서
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    valid: bool,
    next_expected: u32,

    /// 마지막으로 수락한 패킷의 수신 시간
    last_receive_time_us: Option<i64>,

    gap_skip_threshold_us: i64,
    policy: ResequencePolicy,

    /// 기대 번호보다 앞서 있어 버린 패킷 수
    stale_dropped: u64,
}

impl SequenceTracker {
    pub fn new(gap_skip_threshold_us: i64, policy: ResequencePolicy) -> Self {
        Self {
            valid: false,
            next_expected: 0,
            last_receive_time_us: None,
            gap_skip_threshold_us,
            policy,
            stale_dropped: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 유효하지 않으면 None
    pub fn next_expected(&self) -> Option<u32> {
        self.valid.then_some(self.next_expected)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// 커서 1 전진
    pub fn advance(&mut self) {
        self.next_expected = self.next_expected.wrapping_add(1);
    }

    /// 커서와 수신 시간 기록을 무효화
    pub fn reset(&mut self) {
        self.valid = false;
        self.next_expected = 0;
        self.last_receive_time_us = None;
    }

    /// 선두 패킷 판정. 기대 번호보다 작은 패킷은 여기서 버린다.
    pub fn inspect<S: PacketSource + ?Sized>(&mut self, source: &mut S) -> Disposition {
        if self.valid {
            while let Some(head) = source.peek_front() {
                if head.sequence_number >= self.next_expected {
                    break;
                }
                debug!(
                    "drop unexpected SeqNo({}) of source queue, next expected({})",
                    head.sequence_number, self.next_expected
                );
                source.pop_front();
                self.stale_dropped += 1;
            }
        }

        let head = match source.peek_front() {
            Some(head) => head,
            None => return Disposition::Empty,
        };
        let head_seq = head.sequence_number;
        let head_time = head.receive_time_us;

        if !self.valid {
            self.valid = true;
            self.next_expected = head_seq;
            info!("first seq = {}", head_seq);
        } else if head_seq != self.next_expected {
            if let (Some(now), Some(last)) = (head_time, self.last_receive_time_us) {
                let diff = (now - last).abs();
                if diff > self.gap_skip_threshold_us {
                    debug!(
                        "skip all lost, next expected={}, now seq={}, time now({}) last({}) diff={}",
                        self.next_expected, head_seq, now, last, diff
                    );
                    return Disposition::SkipGap {
                        lost: self.next_expected..head_seq,
                    };
                }
            }
            return self.judge_gap(source.len());
        }

        self.last_receive_time_us = head_time;
        Disposition::Accept
    }

    /// 시간 근거 없는 갭 처리. 트리밍 후 큐의 모든 패킷은 갭 너머에 있다.
    fn judge_gap(&self, queued: usize) -> Disposition {
        match self.policy {
            ResequencePolicy::Wait => Disposition::Wait,
            ResequencePolicy::Lookahead { window } if queued < window => Disposition::Wait,
            ResequencePolicy::Lookahead { .. } => {
                debug!(
                    "sequence gap at {} with {} packets queued past it",
                    self.next_expected, queued
                );
                Disposition::WrongSequence
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::packet::Packet;

    fn queue(items: &[(u32, i64)]) -> VecDeque<Packet> {
        items
            .iter()
            .map(|&(seq, t)| Packet::new(seq, vec![0x41]).with_receive_time(t))
            .collect()
    }

    fn tracker(policy: ResequencePolicy) -> SequenceTracker {
        SequenceTracker::new(200_000, policy)
    }

    #[test]
    fn test_adopts_first_sequence() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(500, 0)]);
        assert_eq!(seq.next_expected(), None);
        assert_eq!(seq.inspect(&mut q), Disposition::Accept);
        assert_eq!(seq.next_expected(), Some(500));
    }

    #[test]
    fn test_empty_queue() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q: VecDeque<Packet> = VecDeque::new();
        assert_eq!(seq.inspect(&mut q), Disposition::Empty);
        assert!(!seq.is_valid());
    }

    #[test]
    fn test_drops_stale_packets() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(10, 0)]);
        seq.inspect(&mut q);
        q.pop_front();
        seq.advance();

        // 10 소비 후 기대 11
        let mut q = queue(&[(8, 1_000), (9, 2_000), (10, 3_000), (11, 4_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::Accept);
        assert_eq!(q.front().unwrap().sequence_number, 11);
        assert_eq!(seq.stale_dropped(), 3);

        let mut only_stale = queue(&[(3, 0)]);
        assert_eq!(seq.inspect(&mut only_stale), Disposition::Empty);
    }

    #[test]
    fn test_large_time_gap_skips() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(1, 0)]);
        seq.inspect(&mut q);
        q.pop_front();
        seq.advance();

        // 기대 2, 선두 5, 수신 시간 차이 250ms
        let mut q = queue(&[(5, 250_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::SkipGap { lost: 2..5 });
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_time_gap_threshold_boundary() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(1, 0)]);
        seq.inspect(&mut q);
        seq.advance();

        // 정확히 200ms는 건너뛰지 않음
        let mut q = queue(&[(3, 200_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::Wait);

        let mut q = queue(&[(3, 200_001)]);
        assert_eq!(seq.inspect(&mut q), Disposition::SkipGap { lost: 2..3 });
    }

    #[test]
    fn test_time_gap_is_absolute() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(1, 1_000_000)]);
        seq.inspect(&mut q);
        seq.advance();

        let mut q = queue(&[(3, 700_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::SkipGap { lost: 2..3 });
    }

    #[test]
    fn test_small_gap_wait_policy() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(1, 0)]);
        seq.inspect(&mut q);
        seq.advance();

        let mut q = queue(&[(3, 10_000), (4, 20_000), (5, 30_000), (6, 40_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::Wait);
    }

    #[test]
    fn test_small_gap_lookahead_policy() {
        let mut seq = tracker(ResequencePolicy::Lookahead { window: 3 });
        let mut q = queue(&[(1, 0)]);
        seq.inspect(&mut q);
        seq.advance();

        let mut q = queue(&[(3, 10_000), (4, 20_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::Wait);

        q.push_back(Packet::new(5, vec![0x41]).with_receive_time(30_000));
        assert_eq!(seq.inspect(&mut q), Disposition::WrongSequence);
    }

    #[test]
    fn test_missing_receive_time_defers_to_policy() {
        let mut seq = tracker(ResequencePolicy::Lookahead { window: 1 });
        let mut q = queue(&[(1, 0)]);
        seq.inspect(&mut q);
        seq.advance();

        let mut q: VecDeque<Packet> = vec![Packet::new(9, vec![0x41])].into();
        assert_eq!(seq.inspect(&mut q), Disposition::WrongSequence);
    }

    #[test]
    fn test_reset_readopts() {
        let mut seq = tracker(ResequencePolicy::Wait);
        let mut q = queue(&[(100, 0)]);
        seq.inspect(&mut q);
        seq.advance();
        seq.reset();

        let mut q = queue(&[(40, 5_000_000)]);
        assert_eq!(seq.inspect(&mut q), Disposition::Accept);
        assert_eq!(seq.next_expected(), Some(40));
    }
}
