use tracing::trace;

use crate::bitwriter::BitWriter;
use crate::encoder::EncoderConfig;
use crate::error::EncoderError;
use crate::fps::Fps;
use crate::nal::{AvcNalType, NalHeader, NalUnit};
use crate::video::{Codec, EntropyCoding};

pub const PROFILE_BASELINE: u8 = 66;
pub const PROFILE_MAIN: u8 = 77;

/// constraint_set0_flag and constraint_set1_flag: Constrained Baseline.
const CONSTRAINED_BASELINE_FLAGS: u8 = 0xC0;
/// constraint_set1_flag.
const MAIN_FLAGS: u8 = 0x40;

#[derive(Clone, Copy)]
struct LevelConstraint {
    level_idc: u8,
    max_fs: u64,
    max_mbps: u64,
}

#[rustfmt::skip]
const LEVEL_CONSTRAINTS: [LevelConstraint; 19] = [
    LevelConstraint { level_idc: 10, max_fs: 99,      max_mbps: 1_485 },
    LevelConstraint { level_idc: 11, max_fs: 396,     max_mbps: 3_000 },
    LevelConstraint { level_idc: 12, max_fs: 396,     max_mbps: 6_000 },
    LevelConstraint { level_idc: 13, max_fs: 396,     max_mbps: 11_880 },
    LevelConstraint { level_idc: 20, max_fs: 396,     max_mbps: 11_880 },
    LevelConstraint { level_idc: 21, max_fs: 792,     max_mbps: 19_800 },
    LevelConstraint { level_idc: 22, max_fs: 1_620,   max_mbps: 20_250 },
    LevelConstraint { level_idc: 30, max_fs: 1_620,   max_mbps: 40_500 },
    LevelConstraint { level_idc: 31, max_fs: 3_600,   max_mbps: 108_000 },
    LevelConstraint { level_idc: 32, max_fs: 5_120,   max_mbps: 216_000 },
    LevelConstraint { level_idc: 40, max_fs: 8_192,   max_mbps: 245_760 },
    LevelConstraint { level_idc: 41, max_fs: 8_192,   max_mbps: 245_760 },
    LevelConstraint { level_idc: 42, max_fs: 8_704,   max_mbps: 522_240 },
    LevelConstraint { level_idc: 50, max_fs: 22_080,  max_mbps: 589_824 },
    LevelConstraint { level_idc: 51, max_fs: 36_864,  max_mbps: 983_040 },
    LevelConstraint { level_idc: 52, max_fs: 36_864,  max_mbps: 2_073_600 },
    LevelConstraint { level_idc: 60, max_fs: 139_264, max_mbps: 4_177_920 },
    LevelConstraint { level_idc: 61, max_fs: 139_264, max_mbps: 8_355_840 },
    LevelConstraint { level_idc: 62, max_fs: 139_264, max_mbps: 16_711_680 },
];

impl LevelConstraint {
    fn admits(&self, width_mbs: u32, height_mbs: u32, fps: Fps) -> bool {
        let frame_size = width_mbs as u64 * height_mbs as u64;
        let max_dim_sq = 8 * self.max_fs;
        let mb_rate_num = frame_size as u128 * fps.num as u128;
        frame_size <= self.max_fs
            && (width_mbs as u64).pow(2) <= max_dim_sq
            && (height_mbs as u64).pow(2) <= max_dim_sq
            && mb_rate_num <= self.max_mbps as u128 * fps.den as u128
    }
}

/// Smallest `level_idc` whose MaxFS and MaxMBPS admit the macroblock grid.
pub fn derive_level_idc(width_mbs: u32, height_mbs: u32, fps: Fps) -> Option<u8> {
    LEVEL_CONSTRAINTS
        .iter()
        .find(|level| level.admits(width_mbs, height_mbs, fps))
        .map(|level| level.level_idc)
}

fn ceil_log2(v: u32) -> u8 {
    if v <= 1 {
        0
    } else {
        (32 - (v - 1).leading_zeros()) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcParams {
    pub width: u32,
    pub height: u32,
    pub width_mbs: u32,
    pub height_mbs: u32,
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub entropy_coding: EntropyCoding,
    pub log2_max_frame_num: u8,
    pub max_num_ref_frames: u32,
    pub qp: u8,
}

impl AvcParams {
    pub fn from_config(config: &EncoderConfig) -> Result<Self, EncoderError> {
        let width_mbs = config.width.div_ceil(16);
        let height_mbs = config.height.div_ceil(16);

        let level_idc = match config.level {
            Some(level) => {
                let known = LEVEL_CONSTRAINTS.iter().find(|l| l.level_idc == level);
                match known {
                    Some(l) if l.admits(width_mbs, height_mbs, config.fps) => level,
                    _ => {
                        return Err(EncoderError::LevelTooLow {
                            level,
                            width: config.width,
                            height: config.height,
                        });
                    }
                }
            }
            None => derive_level_idc(width_mbs, height_mbs, config.fps).ok_or(
                EncoderError::NoLevel {
                    codec: Codec::H264,
                    width: config.width,
                    height: config.height,
                },
            )?,
        };

        let (profile_idc, constraint_flags) = match config.entropy_coding {
            EntropyCoding::Cabac => (PROFILE_MAIN, MAIN_FLAGS),
            EntropyCoding::Cavlc => (PROFILE_BASELINE, CONSTRAINED_BASELINE_FLAGS),
        };

        Ok(Self {
            width: config.width,
            height: config.height,
            width_mbs,
            height_mbs,
            profile_idc,
            constraint_flags,
            level_idc,
            entropy_coding: config.entropy_coding,
            log2_max_frame_num: ceil_log2(config.gop_size).clamp(4, 16),
            max_num_ref_frames: if config.gop_size > 1 { 1 } else { 0 },
            qp: config.qp,
        })
    }

    pub fn mb_count(&self) -> u32 {
        self.width_mbs * self.height_mbs
    }

    /// Right and bottom frame cropping offsets in 4:2:0 chroma units.
    pub fn frame_cropping(&self) -> (u32, u32) {
        (
            (self.width_mbs * 16 - self.width) / 2,
            (self.height_mbs * 16 - self.height) / 2,
        )
    }

    pub fn parameter_sets(&self) -> [NalUnit; 2] {
        [
            NalUnit::new(NalHeader::avc(AvcNalType::Sps), encode_sps(self)),
            NalUnit::new(NalHeader::avc(AvcNalType::Pps), encode_pps(self)),
        ]
    }
}

pub fn encode_sps(params: &AvcParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(params.profile_idc as u64, 8);
    w.write_bits(params.constraint_flags as u64, 8);
    w.write_bits(params.level_idc as u64, 8);
    w.write_ue(0); // seq_parameter_set_id
    w.write_ue((params.log2_max_frame_num - 4) as u32);
    // POC type 2: output order follows frame_num, no POC syntax in slices.
    w.write_ue(2);
    w.write_ue(params.max_num_ref_frames);
    w.write_bit(false); // gaps_in_frame_num_value_allowed_flag
    w.write_ue(params.width_mbs - 1);
    w.write_ue(params.height_mbs - 1);
    w.write_bit(true); // frame_mbs_only_flag
    w.write_bit(true); // direct_8x8_inference_flag

    let (right, bottom) = params.frame_cropping();
    let cropped = right != 0 || bottom != 0;
    w.write_flag(cropped);
    if cropped {
        w.write_ue(0);
        w.write_ue(right);
        w.write_ue(0);
        w.write_ue(bottom);
    }

    w.write_bit(false); // vui_parameters_present_flag
    let rbsp = w.trailing_bits();
    trace!(
        bytes = rbsp.len(),
        profile_idc = params.profile_idc,
        level_idc = params.level_idc,
        "avc sps"
    );
    rbsp
}

pub fn encode_pps(params: &AvcParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_ue(0); // pic_parameter_set_id
    w.write_ue(0); // seq_parameter_set_id
    w.write_flag(params.entropy_coding == EntropyCoding::Cabac);
    w.write_bit(false); // bottom_field_pic_order_in_frame_present_flag
    w.write_ue(0); // num_slice_groups_minus1
    w.write_ue(0); // num_ref_idx_l0_default_active_minus1
    w.write_ue(0); // num_ref_idx_l1_default_active_minus1
    w.write_bit(false); // weighted_pred_flag
    w.write_bits(0, 2); // weighted_bipred_idc
    w.write_se(params.qp as i32 - 26);
    w.write_se(0); // pic_init_qs_minus26
    w.write_se(0); // chroma_qp_index_offset
    w.write_bit(true); // deblocking_filter_control_present_flag
    w.write_bit(false); // constrained_intra_pred_flag
    w.write_bit(false); // redundant_pic_cnt_present_flag
    let rbsp = w.trailing_bits();
    trace!(bytes = rbsp.len(), "avc pps");
    rbsp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcSliceHeader {
    pub idr: bool,
    pub frame_num: u32,
    /// Consecutive IDR pictures must differ in `idr_pic_id`.
    pub idr_pic_id: u32,
}

impl AvcSliceHeader {
    pub fn nal_type(&self) -> AvcNalType {
        if self.idr {
            AvcNalType::IdrSlice
        } else {
            AvcNalType::NonIdrSlice
        }
    }

    /// Writes an I slice header covering the whole picture, deblocking off.
    pub fn write(&self, w: &mut BitWriter, params: &AvcParams) {
        w.write_ue(0); // first_mb_in_slice
        w.write_ue(7); // slice_type I, all slices of the picture
        w.write_ue(0); // pic_parameter_set_id
        let frame_num_mask = (1u32 << params.log2_max_frame_num) - 1;
        w.write_bits((self.frame_num & frame_num_mask) as u64, params.log2_max_frame_num);
        if self.idr {
            w.write_ue(self.idr_pic_id);
        }
        // dec_ref_pic_marking
        if self.idr {
            w.write_bit(false); // no_output_of_prior_pics_flag
            w.write_bit(false); // long_term_reference_flag
        } else {
            w.write_bit(false); // adaptive_ref_pic_marking_mode_flag
        }
        w.write_se(0); // slice_qp_delta
        w.write_ue(1); // disable_deblocking_filter_idc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: u32, height: u32, entropy_coding: EntropyCoding) -> AvcParams {
        let mut config = EncoderConfig::new(width, height);
        config.codec = Codec::H264;
        config.entropy_coding = entropy_coding;
        AvcParams::from_config(&config).unwrap()
    }

    #[test]
    fn sps_exact_bytes_main_profile() {
        let sps = encode_sps(&params(64, 64, EntropyCoding::Cabac));
        assert_eq!(sps, vec![0x4D, 0x40, 0x0A, 0xA6, 0x84, 0x26, 0x40]);
    }

    #[test]
    fn baseline_profile_for_cavlc() {
        let p = params(64, 64, EntropyCoding::Cavlc);
        assert_eq!((p.profile_idc, p.constraint_flags), (66, 0xC0));
        let sps = encode_sps(&p);
        assert_eq!(&sps[..3], &[0x42, 0xC0, 0x0A]);
    }

    #[test]
    fn pps_exact_bytes_cabac() {
        let pps = encode_pps(&params(64, 64, EntropyCoding::Cabac));
        assert_eq!(pps, vec![0xEE, 0x3C, 0x80]);
    }

    #[test]
    fn pps_entropy_flag_cleared_for_cavlc() {
        let pps = encode_pps(&params(64, 64, EntropyCoding::Cavlc));
        assert_eq!(pps[0] & 0x20, 0);
    }

    #[test]
    fn cropping_for_non_macroblock_sizes() {
        let p = params(1920, 1080, EntropyCoding::Cabac);
        assert_eq!((p.width_mbs, p.height_mbs), (120, 68));
        assert_eq!(p.frame_cropping(), (0, 4));
    }

    #[test]
    fn idr_slice_header_bits() {
        let mut config = EncoderConfig::new(64, 64);
        config.codec = Codec::H264;
        config.gop_size = 1;
        let p = AvcParams::from_config(&config).unwrap();
        assert_eq!(p.log2_max_frame_num, 4);
        assert_eq!(p.max_num_ref_frames, 0);

        let mut w = BitWriter::new();
        AvcSliceHeader {
            idr: true,
            frame_num: 0,
            idr_pic_id: 0,
        }
        .write(&mut w, &p);
        // 1 0001000 1 0000 1 0 0 1 010
        assert_eq!(w.data(), &[0x88, 0x84]);
        assert_eq!(w.bit_position(), 4);
    }

    #[test]
    fn frame_num_width_follows_gop() {
        let mut config = EncoderConfig::new(64, 64);
        config.gop_size = 300;
        assert_eq!(AvcParams::from_config(&config).unwrap().log2_max_frame_num, 9);
        config.gop_size = 25;
        assert_eq!(AvcParams::from_config(&config).unwrap().log2_max_frame_num, 5);
    }

    #[test]
    fn level_derivation() {
        let fps30 = Fps::from_int(30).unwrap();
        assert_eq!(derive_level_idc(4, 4, Fps::default()), Some(10));
        assert_eq!(derive_level_idc(80, 45, fps30), Some(31));
        assert_eq!(derive_level_idc(120, 68, fps30), Some(40));
        assert_eq!(derive_level_idc(120, 68, Fps::from_int(60).unwrap()), Some(42));
        assert_eq!(derive_level_idc(1000, 1000, fps30), None);
    }

    #[test]
    fn long_strips_are_limited_by_dimension() {
        // 8 * 99 = 792 < 29^2, so 29 macroblocks across leaves level 1.0.
        assert_eq!(derive_level_idc(29, 1, Fps::default()), Some(11));
    }

    #[test]
    fn explicit_level_is_checked() {
        let mut config = EncoderConfig::new(1920, 1080);
        config.codec = Codec::H264;
        config.level = Some(10);
        assert!(matches!(
            AvcParams::from_config(&config),
            Err(EncoderError::LevelTooLow { level: 10, width: 1920, height: 1080 })
        ));
        config.level = Some(14);
        assert!(matches!(
            AvcParams::from_config(&config),
            Err(EncoderError::LevelTooLow { level: 14, .. })
        ));
        config.level = Some(51);
        let params = AvcParams::from_config(&config).unwrap();
        assert_eq!(params.level_idc, 51);
        assert_eq!(encode_sps(&params)[2], 51);
    }

    #[test]
    fn ceil_log2_values() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(25), 5);
        assert_eq!(ceil_log2(32), 5);
        assert_eq!(ceil_log2(33), 6);
    }
}
