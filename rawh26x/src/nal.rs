pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcNalType {
    NonIdrSlice = 1,
    IdrSlice = 5,
    Sps = 7,
    Pps = 8,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HevcNalType {
    TrailR = 1,
    IdrWRadl = 19,
    Vps = 32,
    Sps = 33,
    Pps = 34,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalHeader {
    Avc {
        nal_type: AvcNalType,
        ref_idc: u8,
    },
    Hevc {
        nal_type: HevcNalType,
        layer_id: u8,
        temporal_id: u8,
    },
}

impl NalHeader {
    pub fn avc(nal_type: AvcNalType) -> Self {
        Self::Avc {
            nal_type,
            ref_idc: 3,
        }
    }

    pub fn hevc(nal_type: HevcNalType) -> Self {
        Self::Hevc {
            nal_type,
            layer_id: 0,
            temporal_id: 0,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Avc { nal_type, ref_idc } => {
                out.push(((ref_idc & 3) << 5) | nal_type as u8);
            }
            Self::Hevc {
                nal_type,
                layer_id,
                temporal_id,
            } => {
                let layer_id = layer_id & 0x3F;
                out.push(((nal_type as u8) << 1) | (layer_id >> 5));
                out.push(((layer_id & 0x1F) << 3) | ((temporal_id + 1) & 7));
            }
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Avc { .. } => 1,
            Self::Hevc { .. } => 2,
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(
            self,
            Self::Avc {
                nal_type: AvcNalType::Sps | AvcNalType::Pps,
                ..
            } | Self::Hevc {
                nal_type: HevcNalType::Vps | HevcNalType::Sps | HevcNalType::Pps,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub header: NalHeader,
    pub rbsp: Vec<u8>,
}

impl NalUnit {
    pub fn new(header: NalHeader, rbsp: Vec<u8>) -> Self {
        Self { header, rbsp }
    }

    /// Header followed by the escaped payload, without any framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.size() + self.rbsp.len() + self.rbsp.len() / 64);
        self.header.write_to(&mut out);
        add_emulation_prevention_into(&self.rbsp, &mut out);
        out
    }

    pub fn to_annex_b(&self) -> Vec<u8> {
        wrap_annex_b(self.header, &self.rbsp)
    }

    pub fn to_length_prefixed(&self) -> Vec<u8> {
        wrap_length_prefixed(self.header, &self.rbsp)
    }
}

pub fn wrap_annex_b(header: NalHeader, rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(START_CODE.len() + header.size() + rbsp.len() + rbsp.len() / 64);
    out.extend_from_slice(&START_CODE);
    header.write_to(&mut out);
    add_emulation_prevention_into(rbsp, &mut out);
    out
}

/// 4-byte big-endian length followed by the NAL unit. The payload carries
/// emulation prevention bytes, as NAL units stored in ISO-BMFF samples do.
pub fn wrap_length_prefixed(header: NalHeader, rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + header.size() + rbsp.len() + rbsp.len() / 64);
    out.extend_from_slice(&[0; 4]);
    header.write_to(&mut out);
    add_emulation_prevention_into(rbsp, &mut out);
    let len = (out.len() - 4) as u32;
    out[..4].copy_from_slice(&len.to_be_bytes());
    out
}

pub fn add_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    add_emulation_prevention_into(rbsp, &mut out);
    out
}

fn add_emulation_prevention_into(rbsp: &[u8], out: &mut Vec<u8>) {
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
}

pub fn remove_emulation_prevention(ebsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ebsp.len());
    let mut zeros = 0;
    for &byte in ebsp {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        out.push(byte);
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn avc_header_byte() {
        let mut out = Vec::new();
        NalHeader::avc(AvcNalType::Sps).write_to(&mut out);
        assert_eq!(out, vec![0x67]);
        out.clear();
        NalHeader::avc(AvcNalType::IdrSlice).write_to(&mut out);
        assert_eq!(out, vec![0x65]);
    }

    #[test]
    fn hevc_header_bytes() {
        let mut out = Vec::new();
        NalHeader::hevc(HevcNalType::Vps).write_to(&mut out);
        assert_eq!(out, vec![0x40, 0x01]);
        out.clear();
        NalHeader::hevc(HevcNalType::IdrWRadl).write_to(&mut out);
        assert_eq!(out, vec![0x26, 0x01]);
    }

    #[test]
    fn annex_b_starts_with_start_code() {
        let nal = wrap_annex_b(NalHeader::hevc(HevcNalType::Sps), &[0xAA]);
        assert_eq!(nal, vec![0, 0, 0, 1, 0x42, 0x01, 0xAA]);
    }

    #[test]
    fn escapes_each_reserved_pattern() {
        for x in 0..=3u8 {
            let escaped = add_emulation_prevention(&[0x00, 0x00, x]);
            assert_eq!(escaped, vec![0x00, 0x00, 0x03, x]);
        }
        assert_eq!(add_emulation_prevention(&[0x00, 0x00, 0x04]), vec![0x00, 0x00, 0x04]);
    }

    #[test]
    fn zero_run_restarts_after_insertion() {
        let escaped = add_emulation_prevention(&[0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(escaped, vec![0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn trailing_zeros_are_left_alone() {
        assert_eq!(add_emulation_prevention(&[0x80, 0x00, 0x00]), vec![0x80, 0x00, 0x00]);
    }

    #[test]
    fn length_prefix_counts_escaped_nal() {
        let out = wrap_length_prefixed(NalHeader::avc(AvcNalType::Pps), &[0x00, 0x00, 0x01]);
        assert_eq!(out, vec![0, 0, 0, 5, 0x68, 0x00, 0x00, 0x03, 0x01]);
    }

    #[test]
    fn parameter_set_classification() {
        assert!(NalHeader::hevc(HevcNalType::Vps).is_parameter_set());
        assert!(NalHeader::avc(AvcNalType::Pps).is_parameter_set());
        assert!(!NalHeader::hevc(HevcNalType::TrailR).is_parameter_set());
        assert!(!NalHeader::avc(AvcNalType::IdrSlice).is_parameter_set());
    }

    fn has_start_code_emulation(data: &[u8]) -> bool {
        data.windows(3).any(|w| w[0] == 0 && w[1] == 0 && w[2] <= 2)
    }

    proptest! {
        #[test]
        fn escape_round_trip(rbsp in proptest::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(3u8), any::<u8>()], 0..512)) {
            let escaped = add_emulation_prevention(&rbsp);
            prop_assert!(!has_start_code_emulation(&escaped));
            prop_assert_eq!(remove_emulation_prevention(&escaped), rbsp);
        }
    }
}
