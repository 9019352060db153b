use crate::nal::NalUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// IDR picture; the decoder can start here.
    Key,
    /// Intra-only picture that still follows the previous IDR.
    Intra,
}

/// One encoded picture.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Annex-B access unit. Parameter sets precede the slice of every IDR.
    pub data: Vec<u8>,
    /// The NAL units of `data`, unescaped and without framing.
    pub nal_units: Vec<NalUnit>,
    pub frame_type: FrameType,
    pub frame_number: u64,
}

impl Packet {
    pub fn is_keyframe(&self) -> bool {
        self.frame_type == FrameType::Key
    }

    /// The picture as an ISO-BMFF sample: length-prefixed slice NAL units.
    /// Parameter sets live in the sample entry instead.
    pub fn sample_data(&self) -> Vec<u8> {
        self.nal_units
            .iter()
            .filter(|nal| !nal.header.is_parameter_set())
            .flat_map(NalUnit::to_length_prefixed)
            .collect()
    }
}
