//! STAP-A 분해
//!
//! ```text
//! +-----------+--------+--------+-----+--------+--------+
//! | STAP-A NAL| size 1 | NALU 1 | ... | size k | NALU k |
//! |  (1 byte) | 16 BE  |        |     | 16 BE  |        |
//! +-----------+--------+--------+-----+--------+--------+
//! ```

use tracing::{debug, warn};

use crate::emitter::AccessUnit;
use crate::packet::Packet;

/// 길이 필드 크기
const STAP_LENGTH_LEN: usize = 2;

/// STAP-A 분해 실패 원인
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StapError {
    /// 3바이트 미만
    TooSmall { size: usize },

    /// 길이 필드가 남은 바이트를 넘어섬
    Truncated { offset: usize, declared: usize, remaining: usize },
}

/// STAP-A 페이로드를 NAL 유닛들로 나눠 `on_unit`에 순서대로 넘긴다.
///
/// 각 유닛은 패킷의 메타데이터를 물려받고, 마지막이 아닌 유닛은 마커 비트가 지워진다.
/// 중간에 잘린 항목을 만나면 거기서 멈추고 에러를 돌려준다 (이미 넘긴 유닛은 유효).
/// 끝의 0~1 바이트 잔여분은 패딩으로 허용한다.
pub fn split_stap_a<F>(packet: &Packet, mut on_unit: F) -> Result<usize, StapError>
where
    F: FnMut(AccessUnit),
{
    let payload = &packet.payload;
    if payload.len() < 3 {
        debug!("Discarding too small STAP-A packet ({} bytes)", payload.len());
        return Err(StapError::TooSmall { size: payload.len() });
    }

    // STAP-A indicator 건너뛰기
    let mut offset = 1;
    let mut count = 0;

    while payload.len() - offset >= STAP_LENGTH_LEN {
        let remaining = payload.len() - offset;
        let nal_size = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;

        if remaining < nal_size + STAP_LENGTH_LEN {
            warn!(
                "Discarding malformed STAP-A packet (seq={}, nal size {} > {} remaining)",
                packet.sequence_number,
                nal_size,
                remaining - STAP_LENGTH_LEN
            );
            return Err(StapError::Truncated {
                offset,
                declared: nal_size,
                remaining,
            });
        }

        let start = offset + STAP_LENGTH_LEN;
        let end = start + nal_size;
        let mut unit = AccessUnit::from_single(payload.slice(start..end), packet);

        offset = end;
        if payload.len() - offset > STAP_LENGTH_LEN {
            // 마지막 NAL이 아님
            unit.marker = false;
        }

        on_unit(unit);
        count += 1;
    }

    if offset != payload.len() {
        debug!(
            "Unexpected padding at end of STAP-A packet ({} bytes)",
            payload.len() - offset
        );
    }

    Ok(count)
}
