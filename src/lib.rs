//! # RTP AVC Assembler
//!
//! RTP로 수신한 H.264 (RFC 6184) 페이로드를 디코더용 액세스 유닛으로 재조립
//!
//! ## 핵심 특징
//! - **세 가지 페이로드**: Single NAL, STAP-A 분리, FU-A 재조립
//! - **시퀀스 커서**: 중복/지연 패킷 폐기, 수신 시간 기반 갭 건너뛰기
//! - **손상 표시**: 손실 이후 유닛은 버리지 않고 `damaged`로 방출
//! - **손실 보고**: 고정 크기 FIFO + 간격 제한 flush
//! - **비동기 드라이버**: tokio 태스크 + 이벤트 채널

pub mod aggregation;
pub mod assembler;
pub mod config;
pub mod driver;
pub mod emitter;
pub mod error;
pub mod fragment;
pub mod loss;
pub mod nal;
pub mod packet;
pub mod packetize;
pub mod sequence;
pub mod stats;
pub mod status;
pub mod trace;

pub use assembler::AvcAssembler;
pub use config::{Config, ResequencePolicy};
pub use driver::{AssemblerHandle, AssemblerTask, EventReceiver};
pub use emitter::{AccessUnit, AssemblerEvent, EventSink};
pub use error::{Error, Result};
pub use packet::{Packet, PacketSource};
pub use packetize::Packetizer;
pub use stats::AssemblerStats;
pub use status::AssemblyStatus;
pub use trace::PacketTrace;

/// 갭 건너뛰기 기준 수신 시간 차이 (마이크로초)
pub const DEFAULT_GAP_SKIP_THRESHOLD_US: i64 = 200_000;

/// 손실 보고 최소 간격 (밀리초)
pub const DEFAULT_LOSS_REPORT_INTERVAL_MS: u64 = 200;

/// 손실 기록 용량
pub const DEFAULT_LOSS_RECORD_CAPACITY: usize = 64;

/// 트레이스 파일 매직 넘버
pub const TRACE_MAGIC: u32 = 0x41564354; // "AVCT"

/// 트레이스 파일 버전
pub const TRACE_VERSION: u8 = 1;
