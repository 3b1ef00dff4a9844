//! H.264 NAL 헤더 한 바이트 해석
//!
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```

/// STAP-A 패킷 타입
pub const NAL_TYPE_STAP_A: u8 = 24;

/// FU-A 패킷 타입
pub const NAL_TYPE_FU_A: u8 = 28;

/// IDR 슬라이스
pub const NAL_TYPE_IDR: u8 = 5;

/// 시퀀스 파라미터 셋
pub const NAL_TYPE_SPS: u8 = 7;

/// 픽처 파라미터 셋
pub const NAL_TYPE_PPS: u8 = 8;

/// NAL 헤더 바이트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader(pub u8);

impl NalHeader {
    /// NRI와 타입으로 헤더 합성 (forbidden 비트는 0)
    pub fn new(nal_ref_idc: u8, nal_type: u8) -> Self {
        Self(((nal_ref_idc & 0x03) << 5) | (nal_type & 0x1f))
    }

    pub fn forbidden_bit(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// 참조 중요도 (0~3)
    pub fn nal_ref_idc(self) -> u8 {
        (self.0 >> 5) & 0x03
    }

    pub fn nal_type(self) -> u8 {
        self.0 & 0x1f
    }
}

/// RTP 페이로드 첫 바이트 기준 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// 1~23: 단일 NAL
    Single,
    StapA,
    FuA,
    /// 0: 정의되지 않음, 조용히 무시
    Undefined,
    /// 25~27, 29~31 (STAP-B, MTAP, FU-B 등)
    Unsupported(u8),
}

impl PayloadKind {
    pub fn classify(header: NalHeader) -> Self {
        match header.nal_type() {
            0 => PayloadKind::Undefined,
            1..=23 => PayloadKind::Single,
            NAL_TYPE_STAP_A => PayloadKind::StapA,
            NAL_TYPE_FU_A => PayloadKind::FuA,
            other => PayloadKind::Unsupported(other),
        }
    }
}

/// 선두 NAL 타입이 SPS/PPS인지 확인
pub fn is_parameter_set(nal: &[u8]) -> bool {
    match nal.first() {
        Some(&b) => matches!(NalHeader(b).nal_type(), NAL_TYPE_SPS | NAL_TYPE_PPS),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let header = NalHeader(0x65); // NRI 3, IDR
        assert!(!header.forbidden_bit());
        assert_eq!(header.nal_ref_idc(), 3);
        assert_eq!(header.nal_type(), NAL_TYPE_IDR);
        assert_eq!(NalHeader::new(3, 5), header);
        assert!(NalHeader(0x80 | 0x01).forbidden_bit());
    }

    #[test]
    fn test_classify() {
        assert_eq!(PayloadKind::classify(NalHeader(0x00)), PayloadKind::Undefined);
        assert_eq!(PayloadKind::classify(NalHeader(0x41)), PayloadKind::Single);
        assert_eq!(PayloadKind::classify(NalHeader(0x77)), PayloadKind::Single);
        assert_eq!(PayloadKind::classify(NalHeader(0x78)), PayloadKind::StapA);
        assert_eq!(PayloadKind::classify(NalHeader(0x7c)), PayloadKind::FuA);
        assert_eq!(PayloadKind::classify(NalHeader(0x79)), PayloadKind::Unsupported(25));
        assert_eq!(PayloadKind::classify(NalHeader(0x1d)), PayloadKind::Unsupported(29));
    }

    #[test]
    fn test_is_parameter_set() {
        assert!(is_parameter_set(&[0x67, 0x42]));
        assert!(is_parameter_set(&[0x68, 0xce]));
        assert!(!is_parameter_set(&[0x65, 0x88]));
        assert!(!is_parameter_set(&[]));
    }
}
