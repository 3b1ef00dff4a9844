//! 비동기 드라이버
//!
//! - 어셈블러와 패킷 큐를 단일 태스크가 소유 (단일 writer)
//! - 패킷이 들어올 때마다 처리 가능한 만큼 진행
//! - 손실 보고는 주기 타이머로 flush

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::emitter::AssemblerEvent;
use crate::packet::Packet;
use crate::stats::AssemblerStats;
use crate::{AssemblyStatus, AvcAssembler, Config, Error, Result};

/// 이벤트 채널 수신기 타입
pub type EventReceiver = mpsc::UnboundedReceiver<AssemblerEvent>;

/// 내부 명령
enum DriverCmd {
    Packet(Packet),
    Reset,
    FlushQueue,
    Stop,
}

/// 드라이버 내부 상태 (단일 태스크에서만 접근)
struct DriverInner {
    assembler: AvcAssembler,
    queue: VecDeque<Packet>,
    events: mpsc::UnboundedSender<AssemblerEvent>,
}

impl DriverInner {
    /// 시퀀스 번호 순으로 삽입, 같은 번호는 버림
    fn enqueue(&mut self, packet: Packet) {
        let seq = packet.sequence_number;
        let pos = self
            .queue
            .iter()
            .rposition(|p| p.sequence_number <= seq)
            .map_or(0, |i| i + 1);

        if pos > 0 && self.queue[pos - 1].sequence_number == seq {
            debug!("duplicate packet {} dropped from queue", seq);
            return;
        }
        self.queue.insert(pos, packet);
    }

    /// 처리 가능한 만큼 진행. 재정렬 대기 한도를 넘은 갭은 손실로 확정하고 계속한다.
    fn handle_packet(&mut self, packet: Packet) {
        self.enqueue(packet);

        loop {
            let (status, _) = self.assembler.drain(&mut self.queue, &mut self.events);
            if status != AssemblyStatus::WrongSequence {
                return;
            }
            match self.assembler.declare_next_lost() {
                Some(seq) => debug!(
                    "gap at {} not filled ({} packets queued), declared lost",
                    seq,
                    self.queue.len()
                ),
                None => return,
            }
        }
    }

    /// 예정된 틱 시각 기준으로 손실 보고
    fn tick(&mut self, now: Instant) {
        self.assembler.report_losses_at(now, &mut self.events);
    }
}

/// 어셈블러 태스크 핸들 (외부에서 제어용)
pub struct AssemblerHandle {
    cmd_tx: mpsc::Sender<DriverCmd>,
    stats: Arc<RwLock<AssemblerStats>>,
    running: Arc<AtomicBool>,
}

/// 어셈블러 태스크
pub struct AssemblerTask;

impl AssemblerTask {
    /// 태스크 생성 및 시작 (tokio 런타임 안에서 호출)
    pub fn start(config: Config) -> Result<(AssemblerHandle, EventReceiver)> {
        let assembler = AvcAssembler::try_new(config.clone())?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<DriverCmd>(1000);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let stats = Arc::new(RwLock::new(assembler.stats()));
        let running = Arc::new(AtomicBool::new(true));

        let mut inner = DriverInner {
            assembler,
            queue: VecDeque::new(),
            events: event_tx,
        };

        let stats_main = stats.clone();
        let running_main = running.clone();
        let report_interval = config.loss_report_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(report_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(DriverCmd::Packet(packet)) => inner.handle_packet(packet),
                        Some(DriverCmd::Reset) => inner.assembler.reset(),
                        Some(DriverCmd::FlushQueue) => inner.assembler.flush_queue(),
                        Some(DriverCmd::Stop) | None => break,
                    },
                    at = ticker.tick() => inner.tick(at.into_std()),
                }

                // 통계 업데이트
                *stats_main.write() = inner.assembler.stats();
            }

            // 남은 손실은 간격 제한을 건너뛰고 마지막으로 한 번 보고
            inner.tick(Instant::now() + report_interval);
            *stats_main.write() = inner.assembler.stats();
            running_main.store(false, Ordering::SeqCst);
            info!("assembler task stopped");
        });

        info!("assembler task started");

        let handle = AssemblerHandle {
            cmd_tx,
            stats,
            running,
        };

        Ok((handle, event_rx))
    }
}

impl AssemblerHandle {
    /// 수신 패킷 전달
    pub async fn push(&self, packet: Packet) -> Result<()> {
        self.send(DriverCmd::Packet(packet)).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(DriverCmd::Reset).await
    }

    pub async fn flush_queue(&self) -> Result<()> {
        self.send(DriverCmd::FlushQueue).await
    }

    /// 정지
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(DriverCmd::Stop).await;
    }

    /// 통계 반환
    pub fn stats(&self) -> AssemblerStats {
        self.stats.read().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn send(&self, cmd: DriverCmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ResequencePolicy;
    use crate::packetize::Packetizer;

    async fn next_unit(rx: &mut EventReceiver) -> crate::AccessUnit {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            if let AssemblerEvent::AccessUnitReady(unit) = event {
                return unit;
            }
        }
    }

    #[tokio::test]
    async fn test_reorders_and_assembles() {
        let (handle, mut rx) = AssemblerTask::start(Config::default()).unwrap();
        let mut p = Packetizer::new(50, 100);
        let nal: Vec<u8> = std::iter::once(0x65).chain((0..200).map(|i| i as u8)).collect();
        let mut packets = p.packetize(&nal, 0, true);

        // 두 번째와 세 번째 조각 순서 뒤바꿈 + 중복
        packets.swap(1, 2);
        let dup = packets[1].clone();
        packets.push(dup);
        // 첫 패킷이 커서를 잡아야 하므로 맨 앞은 유지
        for packet in packets {
            handle.push(packet).await.unwrap();
        }

        let unit = next_unit(&mut rx).await;
        assert_eq!(&unit.data[..], &nal[..]);
        assert!(!unit.damaged);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_loss_reported_on_tick() {
        let config = Config {
            loss_report_interval_ms: 20,
            resequence: ResequencePolicy::Wait,
            ..Config::default()
        };
        let (handle, mut rx) = AssemblerTask::start(config).unwrap();

        handle
            .push(Packet::new(1, vec![0x41, 0x00]).with_receive_time(0))
            .await
            .unwrap();
        handle
            .push(Packet::new(4, vec![0x41, 0x01]).with_receive_time(300_000))
            .await
            .unwrap();

        let mut lost = None;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(AssemblerEvent::PacketsLost {
                    lost_sequence_numbers,
                })) => {
                    lost = Some(lost_sequence_numbers);
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert_eq!(lost, Some(vec![2, 3]));
        assert_eq!(handle.stats().lost_packets, 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_single_loss_does_not_stall_stream() {
        let (handle, mut rx) = AssemblerTask::start(Config::default()).unwrap();

        for seq in (1..=40u32).filter(|&seq| seq != 5) {
            let packet = Packet::new(seq, vec![0x41, seq as u8])
                .with_receive_time(seq as i64 * 20_000)
                .with_marker(true);
            handle.push(packet).await.unwrap();
        }

        let mut units = 0;
        let mut lost: Vec<u32> = Vec::new();
        while units < 39 || lost.is_empty() {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(AssemblerEvent::AccessUnitReady(_))) => units += 1,
                Ok(Some(AssemblerEvent::PacketsLost {
                    lost_sequence_numbers,
                })) => lost.extend(lost_sequence_numbers),
                _ => break,
            }
        }

        assert_eq!(units, 39);
        assert_eq!(lost, vec![5]);

        let stats = handle.stats();
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.wrong_sequence, 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_and_closed_channel() {
        let (handle, _rx) = AssemblerTask::start(Config::default()).unwrap();
        assert!(handle.is_running());
        handle.stop().await;

        for _ in 0..50 {
            if !handle.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_running());
        assert!(matches!(
            handle.push(Packet::new(1, vec![0x41])).await,
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = Config {
            loss_record_capacity: 0,
            ..Config::default()
        };
        assert!(AssemblerTask::start(config).is_err());
    }
}
