//! AVC 어셈블러 시뮬레이터
//!
//! 합성 H.264 스트림을 패킷화하고 손실/중복/재정렬을 섞어서 어셈블러 태스크에 넣는다.
//! 손상되지 않은 유닛은 원본 NAL의 CRC32와 대조한다.
//!
//! 사용법:
//!   cargo run --release --bin avc-sim -- [OPTIONS]
//!
//! 예시:
//!   # 5% 손실, 1% 중복
//!   cargo run --release --bin avc-sim -- --loss 0.05 --dup 0.01
//!
//!   # 시나리오 기록 후 재생
//!   cargo run --release --bin avc-sim -- --seed 7 --record lossy.trace
//!   cargo run --release --bin avc-sim -- --replay lossy.trace

use std::collections::HashSet;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use avc_assembler::nal::{NalHeader, NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SPS};
use avc_assembler::{
    AssemblerEvent, AssemblerTask, Config, Error, Packet, PacketTrace, Packetizer, Result,
};

/// 프레임 간격 (30fps, 마이크로초)
const FRAME_INTERVAL_US: i64 = 33_333;

/// 시뮬레이터 설정
struct SimConfig {
    units: usize,
    gop: usize,
    loss: f64,
    dup: f64,
    reorder: f64,
    seed: u64,
    mtu: usize,
    record: Option<PathBuf>,
    replay: Option<PathBuf>,
    preset: Config,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            units: 300,
            gop: 30,
            loss: 0.02,
            dup: 0.0,
            reorder: 0.0,
            seed: 1,
            mtu: 1200,
            record: None,
            replay: None,
            preset: Config::default(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, field: &'static str) -> Result<T> {
    let raw = args.get(i + 1).ok_or_else(|| Error::InvalidConfig {
        field,
        reason: "값이 필요합니다".to_string(),
    })?;
    raw.parse().map_err(|_| Error::InvalidConfig {
        field,
        reason: format!("잘못된 값: {}", raw),
    })
}

fn parse_probability(args: &[String], i: usize, field: &'static str) -> Result<f64> {
    let p: f64 = parse_value(args, i, field)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidConfig {
            field,
            reason: format!("0.0..=1.0 범위가 아님: {}", p),
        });
    }
    Ok(p)
}

fn parse_args() -> Result<SimConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SimConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--units" | "-n" => {
                config.units = parse_value(&args, i, "units")?;
                i += 1;
            }
            "--gop" => {
                config.gop = parse_value::<usize>(&args, i, "gop")?.max(1);
                i += 1;
            }
            "--loss" | "-l" => {
                config.loss = parse_probability(&args, i, "loss")?;
                i += 1;
            }
            "--dup" => {
                config.dup = parse_probability(&args, i, "dup")?;
                i += 1;
            }
            "--reorder" => {
                config.reorder = parse_probability(&args, i, "reorder")?;
                i += 1;
            }
            "--seed" => {
                config.seed = parse_value(&args, i, "seed")?;
                i += 1;
            }
            "--mtu" => {
                config.mtu = parse_value(&args, i, "mtu")?;
                i += 1;
            }
            "--record" => {
                config.record = Some(PathBuf::from(parse_value::<String>(&args, i, "record")?));
                i += 1;
            }
            "--replay" => {
                config.replay = Some(PathBuf::from(parse_value::<String>(&args, i, "replay")?));
                i += 1;
            }
            "--low-latency" => config.preset = Config::low_latency(),
            "--lossy" => config.preset = Config::lossy_network(),
            "--help" | "-h" => {
                println!(
                    r#"avc-sim - H.264 RTP 재조립 시뮬레이터

옵션:
  -n, --units <N>        생성할 프레임 수 (기본: 300)
  --gop <N>              IDR 간격 (기본: 30)
  -l, --loss <P>         패킷 손실 확률 (기본: 0.02)
  --dup <P>              패킷 중복 확률 (기본: 0.0)
  --reorder <P>          인접 패킷 순서 뒤바꿈 확률 (기본: 0.0)
  --seed <N>             난수 시드 (기본: 1)
  --mtu <BYTES>          최대 RTP 페이로드 (기본: 1200)
  --record <PATH>        손상 적용 후 패킷을 트레이스로 저장
  --replay <PATH>        트레이스 파일을 그대로 재생 (CRC 검증 생략)
  --low-latency          저지연 프리셋
  --lossy                손실 많은 네트워크 프리셋
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => {
                warn!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    Ok(config)
}

fn random_nal(rng: &mut StdRng, nal_type: u8, nri: u8, len: usize) -> Vec<u8> {
    let mut nal = Vec::with_capacity(len);
    nal.push(NalHeader::new(nri, nal_type).0);
    nal.extend((1..len).map(|_| rng.gen::<u8>()));
    nal
}

/// 합성 스트림 생성. 반환: (패킷, 원본 NAL CRC 집합)
fn generate(config: &SimConfig, rng: &mut StdRng) -> (Vec<Packet>, HashSet<u32>) {
    let mut packetizer = Packetizer::new(config.mtu, rng.gen_range(0..u16::MAX as u32));
    let mut packets = Vec::new();
    let mut checksums = HashSet::new();

    for frame in 0..config.units {
        let receive_time = frame as i64 * FRAME_INTERVAL_US;

        if frame % config.gop == 0 {
            let sps = random_nal(rng, NAL_TYPE_SPS, 3, 12);
            let pps = random_nal(rng, NAL_TYPE_PPS, 3, 4);
            checksums.insert(crc32fast::hash(&sps));
            checksums.insert(crc32fast::hash(&pps));
            if let Some(packet) =
                packetizer.aggregate(&[sps.as_slice(), pps.as_slice()], receive_time, false)
            {
                packets.push(packet);
            }

            let len = rng.gen_range(4_000..20_000);
            let idr = random_nal(rng, NAL_TYPE_IDR, 3, len);
            checksums.insert(crc32fast::hash(&idr));
            packets.extend(packetizer.packetize(&idr, receive_time, true));
        } else {
            let len = rng.gen_range(200..4_000);
            let slice = random_nal(rng, 1, 2, len);
            checksums.insert(crc32fast::hash(&slice));
            packets.extend(packetizer.packetize(&slice, receive_time, true));
        }
    }

    (packets, checksums)
}

/// 손실/중복/재정렬 적용
fn impair(config: &SimConfig, rng: &mut StdRng, packets: Vec<Packet>) -> Vec<Packet> {
    let mut out = Vec::with_capacity(packets.len());
    for packet in packets {
        if rng.gen_bool(config.loss) {
            continue;
        }
        if rng.gen_bool(config.dup) {
            out.push(packet.clone());
        }
        out.push(packet);
    }

    let mut i = 1;
    while i + 1 < out.len() {
        if rng.gen_bool(config.reorder) {
            out.swap(i, i + 1);
            i += 1;
        }
        i += 1;
    }
    out
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sim = parse_args()?;
    let mut rng = StdRng::seed_from_u64(sim.seed);

    let (packets, checksums) = match &sim.replay {
        Some(path) => {
            let trace = PacketTrace::load(path)?;
            info!("Replaying {} packets from {}", trace.len(), path.display());
            (trace.into_packets(), None)
        }
        None => {
            let (packets, checksums) = generate(&sim, &mut rng);
            info!(
                "Generated {} packets for {} frames (seed {})",
                packets.len(),
                sim.units,
                sim.seed
            );
            let impaired = impair(&sim, &mut rng, packets);
            (impaired, Some(checksums))
        }
    };

    if let Some(path) = &sim.record {
        let trace: PacketTrace = packets.iter().cloned().collect();
        trace.save(path)?;
        info!("Recorded {} packets to {}", trace.len(), path.display());
    }

    let report_interval = sim.preset.loss_report_interval();
    let (handle, mut events) = AssemblerTask::start(sim.preset)?;

    for packet in packets {
        handle.push(packet).await?;
    }

    // 마지막 손실 보고가 나갈 시간
    tokio::time::sleep(report_interval).await;
    let stats = handle.stats();
    handle.stop().await;

    let mut units = 0u64;
    let mut damaged = 0u64;
    let mut mismatched = 0u64;
    let mut reported_lost = 0usize;

    while let Some(event) = events.recv().await {
        match event {
            AssemblerEvent::AccessUnitReady(unit) => {
                units += 1;
                if unit.damaged {
                    damaged += 1;
                    continue;
                }
                if let Some(checksums) = &checksums {
                    if !checksums.contains(&crc32fast::hash(&unit.data)) {
                        mismatched += 1;
                        warn!(
                            "Unit #{} (type {:?}, {} bytes) does not match any source NAL",
                            unit.unit_index,
                            unit.nal_type(),
                            unit.data.len()
                        );
                    }
                }
            }
            AssemblerEvent::PacketsLost {
                lost_sequence_numbers,
            } => {
                reported_lost += lost_sequence_numbers.len();
            }
        }
    }

    info!(
        "Units: {} (damaged {}, mismatched {}) | Reported lost: {}",
        units, damaged, mismatched, reported_lost
    );
    info!("{}", stats.summary());

    if mismatched > 0 {
        warn!("{} undamaged units failed CRC verification", mismatched);
    }

    Ok(())
}
