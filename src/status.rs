//! 호출 단위 처리 결과

use std::fmt;

/// `assemble_more` 한 번의 결과
///
/// 어느 값도 치명적이지 않다. 호출자는 `InsufficientData`가 나올 때까지
/// 반복 호출하면 된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyStatus {
    /// 패킷 하나를 소비함 (프래그먼트 누적, 유닛 방출, 또는 의도적 무시)
    Ok,

    /// 큐가 비었거나 기대 번호 패킷이 아직 없음
    InsufficientData,

    /// 손상된 패킷을 버림 (커서는 전진)
    MalformedPacket,

    /// 수신 시간 근거로 갭 전체를 손실로 선언함 (선두 패킷은 소비하지 않음)
    SkipGap,

    /// 시간 근거가 없는 갭이 재정렬 대기 한도를 넘음
    WrongSequence,
}

impl AssemblyStatus {
    pub fn is_error(self) -> bool {
        matches!(self, AssemblyStatus::MalformedPacket | AssemblyStatus::WrongSequence)
    }

    /// 같은 소스로 즉시 다시 호출해도 되는지 여부
    pub fn should_continue(self) -> bool {
        matches!(
            self,
            AssemblyStatus::Ok | AssemblyStatus::MalformedPacket | AssemblyStatus::SkipGap
        )
    }
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyStatus::Ok => "ok",
            AssemblyStatus::InsufficientData => "insufficient data",
            AssemblyStatus::MalformedPacket => "malformed packet",
            AssemblyStatus::SkipGap => "skip gap",
            AssemblyStatus::WrongSequence => "wrong sequence number",
        };
        f.write_str(name)
    }
}
