//! 에러 타입 정의
//!
//! 패킷 단위 처리 결과는 [`crate::AssemblyStatus`]로 돌려주고,
//! 여기의 에러는 설정 검증, 트레이스 파일, 드라이버 채널처럼 실제 실패만 다룬다.

use thiserror::Error;

/// 어셈블러 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 설정: {field} ({reason})")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("유효하지 않은 트레이스: {0}")]
    InvalidTrace(String),

    #[error("채널 종료")]
    ChannelClosed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
