//! 어셈블러 처리량 벤치마크

use std::collections::VecDeque;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use avc_assembler::{AssemblerEvent, AssemblyStatus, AvcAssembler, Config, Packet, Packetizer};

fn fragmented_stream(frames: usize, nal_len: usize, mtu: usize) -> Vec<Packet> {
    let mut packetizer = Packetizer::new(mtu, 1000);
    let mut nal = vec![0u8; nal_len];
    nal[0] = 0x65;
    (0..frames)
        .flat_map(|frame| packetizer.packetize(&nal, frame as i64 * 33_333, true))
        .collect()
}

fn single_stream(count: usize) -> Vec<Packet> {
    let mut packetizer = Packetizer::new(1200, 1000);
    let nal = [0x41u8; 300];
    (0..count)
        .flat_map(|i| packetizer.packetize(&nal, i as i64 * 1_000, true))
        .collect()
}

/// 스트림 끝까지 처리. 메워지지 않는 갭은 손실로 확정한다.
/// 반환: (방출 유닛 수, 남은 패킷 수)
fn run(packets: &[Packet]) -> (usize, usize) {
    let mut assembler = AvcAssembler::new(Config::default());
    let mut queue: VecDeque<Packet> = packets.iter().cloned().collect();
    let mut events: Vec<AssemblerEvent> = Vec::new();

    loop {
        let (status, _) = assembler.drain(&mut queue, &mut events);
        let stuck = status == AssemblyStatus::WrongSequence
            || (status == AssemblyStatus::InsufficientData && !queue.is_empty());
        if !stuck || assembler.declare_next_lost().is_none() {
            break;
        }
    }

    let units = events
        .iter()
        .filter(|e| matches!(e, AssemblerEvent::AccessUnitReady(_)))
        .count();
    (units, queue.len())
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    let fu = fragmented_stream(100, 20_000, 1200);
    assert_eq!(run(&fu), (100, 0));
    let bytes: usize = fu.iter().map(|p| p.payload.len()).sum();
    group.throughput(Throughput::Bytes(bytes as u64));
    group.bench_function("fu_a_20k", |b| b.iter(|| run(black_box(&fu))));

    let single = single_stream(1000);
    assert_eq!(run(&single), (1000, 0));
    group.throughput(Throughput::Elements(single.len() as u64));
    group.bench_function("single_nal", |b| b.iter(|| run(black_box(&single))));

    // 10번째마다 손실
    let lossy: Vec<Packet> = fu
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 10 != 5)
        .map(|(_, p)| p.clone())
        .collect();
    let (units, left) = run(&lossy);
    assert_eq!(left, 0);
    assert!(units >= 80, "lossy stream emitted only {} units", units);
    group.throughput(Throughput::Elements(lossy.len() as u64));
    group.bench_function("fu_a_lossy", |b| b.iter(|| run(black_box(&lossy))));

    group.finish();
}

criterion_group!(benches, bench_assemble);
criterion_main!(benches);
