use tracing::trace;

use crate::bitwriter::BitWriter;
use crate::encoder::EncoderConfig;
use crate::error::EncoderError;
use crate::fps::Fps;
use crate::nal::{HevcNalType, NalHeader, NalUnit};
use crate::video::{ChromaFormat, Codec};

pub const GENERAL_PROFILE_MAIN: u8 = 1;
const PROFILE_COMPATIBILITY_MAIN: u32 = 0x6000_0000;
const LOG2_MAX_POC_LSB: u8 = 8;
const LOG2_MIN_TB_SIZE: u8 = 2;
const PCM_SAMPLE_BIT_DEPTH: u8 = 8;

#[derive(Clone, Copy)]
struct LevelConstraint {
    general_level_idc: u8,
    max_luma_ps: u64,
    max_luma_sr: u64,
}

const LEVEL_CONSTRAINTS: [LevelConstraint; 13] = [
    LevelConstraint { general_level_idc: 30, max_luma_ps: 36_864, max_luma_sr: 552_960 },
    LevelConstraint { general_level_idc: 60, max_luma_ps: 122_880, max_luma_sr: 3_686_400 },
    LevelConstraint { general_level_idc: 63, max_luma_ps: 245_760, max_luma_sr: 7_372_800 },
    LevelConstraint { general_level_idc: 90, max_luma_ps: 552_960, max_luma_sr: 16_588_800 },
    LevelConstraint { general_level_idc: 93, max_luma_ps: 983_040, max_luma_sr: 33_177_600 },
    LevelConstraint { general_level_idc: 120, max_luma_ps: 2_228_224, max_luma_sr: 66_846_720 },
    LevelConstraint { general_level_idc: 123, max_luma_ps: 2_228_224, max_luma_sr: 133_693_440 },
    LevelConstraint { general_level_idc: 150, max_luma_ps: 8_912_896, max_luma_sr: 267_386_880 },
    LevelConstraint { general_level_idc: 153, max_luma_ps: 8_912_896, max_luma_sr: 534_773_760 },
    LevelConstraint { general_level_idc: 156, max_luma_ps: 8_912_896, max_luma_sr: 1_069_547_520 },
    LevelConstraint { general_level_idc: 180, max_luma_ps: 35_651_584, max_luma_sr: 1_069_547_520 },
    LevelConstraint { general_level_idc: 183, max_luma_ps: 35_651_584, max_luma_sr: 2_139_095_040 },
    LevelConstraint { general_level_idc: 186, max_luma_ps: 35_651_584, max_luma_sr: 4_278_190_080 },
];

impl LevelConstraint {
    fn admits(&self, width: u32, height: u32, fps: Fps) -> bool {
        let pic_size = width as u64 * height as u64;
        // Neither dimension may exceed sqrt(8 * MaxLumaPs).
        let max_dim_sq = 8 * self.max_luma_ps;
        let sample_rate_num = pic_size as u128 * fps.num as u128;
        pic_size <= self.max_luma_ps
            && (width as u64).pow(2) <= max_dim_sq
            && (height as u64).pow(2) <= max_dim_sq
            && sample_rate_num <= self.max_luma_sr as u128 * fps.den as u128
    }
}

/// Smallest `general_level_idc` (30 x level number) admitting the picture.
pub fn derive_level_idc(width: u32, height: u32, fps: Fps) -> Option<u8> {
    LEVEL_CONSTRAINTS
        .iter()
        .find(|level| level.admits(width, height, fps))
        .map(|level| level.general_level_idc)
}

/// Sequence-wide values shared by the parameter sets, the slice header and
/// the coding-tree walk, all derived from one [`EncoderConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcParams {
    pub width: u32,
    pub height: u32,
    /// Picture size in the SPS, rounded up to the minimum coding block.
    pub coded_width: u32,
    pub coded_height: u32,
    pub log2_ctu_size: u8,
    pub log2_min_cb_size: u8,
    pub chroma_format: ChromaFormat,
    pub level_idc: u8,
    pub qp: u8,
}

impl HevcParams {
    pub fn from_config(config: &EncoderConfig) -> Result<Self, EncoderError> {
        let min_cb = 1u32 << config.log2_min_cb_size;
        let coded_width = config.width.next_multiple_of(min_cb);
        let coded_height = config.height.next_multiple_of(min_cb);

        let level_idc = match config.level {
            Some(level) => {
                let known = LEVEL_CONSTRAINTS.iter().find(|l| l.general_level_idc == level);
                match known {
                    Some(l) if l.admits(coded_width, coded_height, config.fps) => level,
                    _ => {
                        return Err(EncoderError::LevelTooLow {
                            level,
                            width: config.width,
                            height: config.height,
                        });
                    }
                }
            }
            None => derive_level_idc(coded_width, coded_height, config.fps).ok_or(
                EncoderError::NoLevel {
                    codec: Codec::Hevc,
                    width: config.width,
                    height: config.height,
                },
            )?,
        };

        Ok(Self {
            width: config.width,
            height: config.height,
            coded_width,
            coded_height,
            log2_ctu_size: config.log2_ctu_size,
            log2_min_cb_size: config.log2_min_cb_size,
            chroma_format: config.chroma_format,
            level_idc,
            qp: config.qp,
        })
    }

    pub fn log2_max_tb_size(&self) -> u8 {
        self.log2_ctu_size.min(5)
    }

    pub fn ctu_size(&self) -> u32 {
        1 << self.log2_ctu_size
    }

    pub fn ctu_cols(&self) -> u32 {
        self.coded_width.div_ceil(self.ctu_size())
    }

    pub fn ctu_rows(&self) -> u32 {
        self.coded_height.div_ceil(self.ctu_size())
    }

    /// Right and bottom conformance window offsets in 4:2:0 chroma units.
    pub fn conformance_window(&self) -> (u32, u32) {
        (
            (self.coded_width - self.width) / 2,
            (self.coded_height - self.height) / 2,
        )
    }

    pub fn parameter_sets(&self) -> [NalUnit; 3] {
        [
            NalUnit::new(NalHeader::hevc(HevcNalType::Vps), encode_vps(self)),
            NalUnit::new(NalHeader::hevc(HevcNalType::Sps), encode_sps(self)),
            NalUnit::new(NalHeader::hevc(HevcNalType::Pps), encode_pps(self)),
        ]
    }
}

/// `profile_tier_level(1, 0)`: Main profile, main tier, progressive frames.
/// The 12 bytes are also the general PTL fields of `hvcC`.
pub fn profile_tier_level(level_idc: u8) -> [u8; 12] {
    let mut w = BitWriter::with_capacity(12);
    w.write_bits(0, 2); // general_profile_space
    w.write_bit(false); // general_tier_flag
    w.write_bits(GENERAL_PROFILE_MAIN as u64, 5);
    w.write_bits(PROFILE_COMPATIBILITY_MAIN as u64, 32);
    w.write_bit(true); // general_progressive_source_flag
    w.write_bit(false); // general_interlaced_source_flag
    w.write_bit(false); // general_non_packed_constraint_flag
    w.write_bit(true); // general_frame_only_constraint_flag
    w.write_bits(0, 44);
    w.write_bits(level_idc as u64, 8);

    let mut out = [0u8; 12];
    out.copy_from_slice(w.data());
    out
}

pub fn encode_vps(params: &HevcParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4); // vps_video_parameter_set_id
    w.write_bit(true); // vps_base_layer_internal_flag
    w.write_bit(true); // vps_base_layer_available_flag
    w.write_bits(0, 6); // vps_max_layers_minus1
    w.write_bits(0, 3); // vps_max_sub_layers_minus1
    w.write_bit(true); // vps_temporal_id_nesting_flag
    w.write_bits(0xFFFF, 16);
    w.write_bytes(&profile_tier_level(params.level_idc));
    write_sub_layer_ordering(&mut w);
    w.write_bits(0, 6); // vps_max_layer_id
    w.write_ue(0); // vps_num_layer_sets_minus1
    w.write_bit(false); // vps_timing_info_present_flag
    w.write_bit(false); // vps_extension_flag
    let rbsp = w.trailing_bits();
    trace!(bytes = rbsp.len(), "hevc vps");
    rbsp
}

fn write_sub_layer_ordering(w: &mut BitWriter) {
    w.write_bit(true); // sub_layer_ordering_info_present_flag
    w.write_ue(0); // max_dec_pic_buffering_minus1
    w.write_ue(0); // max_num_reorder_pics
    w.write_ue(0); // max_latency_increase_plus1
}

pub fn encode_sps(params: &HevcParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4); // sps_video_parameter_set_id
    w.write_bits(0, 3); // sps_max_sub_layers_minus1
    w.write_bit(true); // sps_temporal_id_nesting_flag
    w.write_bytes(&profile_tier_level(params.level_idc));
    w.write_ue(0); // sps_seq_parameter_set_id
    w.write_ue(params.chroma_format.idc() as u32);
    if params.chroma_format == ChromaFormat::Yuv444 {
        w.write_bit(false); // separate_colour_plane_flag
    }
    w.write_ue(params.coded_width);
    w.write_ue(params.coded_height);

    let (right, bottom) = params.conformance_window();
    let cropped = right != 0 || bottom != 0;
    w.write_flag(cropped);
    if cropped {
        w.write_ue(0);
        w.write_ue(right);
        w.write_ue(0);
        w.write_ue(bottom);
    }

    w.write_ue(0); // bit_depth_luma_minus8
    w.write_ue(0); // bit_depth_chroma_minus8
    w.write_ue((LOG2_MAX_POC_LSB - 4) as u32);
    write_sub_layer_ordering(&mut w);

    w.write_ue((params.log2_min_cb_size - 3) as u32);
    w.write_ue((params.log2_ctu_size - params.log2_min_cb_size) as u32);
    w.write_ue((LOG2_MIN_TB_SIZE - 2) as u32);
    w.write_ue((params.log2_max_tb_size() - LOG2_MIN_TB_SIZE) as u32);
    w.write_ue(0); // max_transform_hierarchy_depth_inter
    w.write_ue(0); // max_transform_hierarchy_depth_intra

    w.write_bit(false); // scaling_list_enabled_flag
    w.write_bit(false); // amp_enabled_flag
    w.write_bit(false); // sample_adaptive_offset_enabled_flag

    // PCM is always on, sized to the minimum CU, so either leaf strategy is
    // legal under this SPS.
    w.write_bit(true);
    w.write_bits((PCM_SAMPLE_BIT_DEPTH - 1) as u64, 4);
    w.write_bits((PCM_SAMPLE_BIT_DEPTH - 1) as u64, 4);
    w.write_ue((params.log2_min_cb_size - 3) as u32);
    w.write_ue(0); // log2_diff_max_min_pcm_luma_coding_block_size
    w.write_bit(true); // pcm_loop_filter_disabled_flag

    w.write_ue(0); // num_short_term_ref_pic_sets
    w.write_bit(false); // long_term_ref_pics_present_flag
    w.write_bit(false); // sps_temporal_mvp_enabled_flag
    w.write_bit(false); // strong_intra_smoothing_enabled_flag
    w.write_bit(false); // vui_parameters_present_flag
    w.write_bit(false); // sps_extension_present_flag
    let rbsp = w.trailing_bits();
    trace!(
        bytes = rbsp.len(),
        width = params.coded_width,
        height = params.coded_height,
        level_idc = params.level_idc,
        "hevc sps"
    );
    rbsp
}

pub fn encode_pps(params: &HevcParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_ue(0); // pps_pic_parameter_set_id
    w.write_ue(0); // pps_seq_parameter_set_id
    w.write_bit(false); // dependent_slice_segments_enabled_flag
    w.write_bit(false); // output_flag_present_flag
    w.write_bits(0, 3); // num_extra_slice_header_bits
    w.write_bit(false); // sign_data_hiding_enabled_flag
    w.write_bit(false); // cabac_init_present_flag
    w.write_ue(0); // num_ref_idx_l0_default_active_minus1
    w.write_ue(0); // num_ref_idx_l1_default_active_minus1
    w.write_se(params.qp as i32 - 26);
    w.write_bit(false); // constrained_intra_pred_flag
    w.write_bit(false); // transform_skip_enabled_flag
    w.write_bit(false); // cu_qp_delta_enabled_flag
    w.write_se(0); // pps_cb_qp_offset
    w.write_se(0); // pps_cr_qp_offset
    w.write_bit(false); // pps_slice_chroma_qp_offsets_present_flag
    w.write_bit(false); // weighted_pred_flag
    w.write_bit(false); // weighted_bipred_flag
    w.write_bit(false); // transquant_bypass_enabled_flag
    w.write_bit(false); // tiles_enabled_flag
    w.write_bit(false); // entropy_coding_sync_enabled_flag
    w.write_bit(false); // pps_loop_filter_across_slices_enabled_flag
    w.write_bit(true); // deblocking_filter_control_present_flag
    w.write_bit(false); // deblocking_filter_override_enabled_flag
    w.write_bit(true); // pps_deblocking_filter_disabled_flag
    w.write_bit(false); // pps_scaling_list_data_present_flag
    w.write_bit(false); // lists_modification_present_flag
    w.write_ue(0); // log2_parallel_merge_level_minus2
    w.write_bit(false); // slice_segment_header_extension_present_flag
    w.write_bit(false); // pps_extension_present_flag
    let rbsp = w.trailing_bits();
    trace!(bytes = rbsp.len(), "hevc pps");
    rbsp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcSliceHeader {
    pub idr: bool,
    /// Pictures since the last IDR.
    pub poc: u32,
}

impl HevcSliceHeader {
    pub fn nal_type(&self) -> HevcNalType {
        if self.idr {
            HevcNalType::IdrWRadl
        } else {
            HevcNalType::TrailR
        }
    }

    /// Writes a single-segment I slice header followed by `byte_alignment()`,
    /// leaving the writer ready for CABAC slice data.
    pub fn write(&self, w: &mut BitWriter) {
        w.write_bit(true); // first_slice_segment_in_pic_flag
        if self.idr {
            w.write_bit(false); // no_output_of_prior_pics_flag
        }
        w.write_ue(0); // slice_pic_parameter_set_id
        w.write_ue(2); // slice_type I
        if !self.idr {
            let lsb_mask = (1u32 << LOG2_MAX_POC_LSB) - 1;
            w.write_bits((self.poc & lsb_mask) as u64, LOG2_MAX_POC_LSB);
            w.write_bit(false); // short_term_ref_pic_set_sps_flag
            w.write_ue(0); // num_negative_pics
            w.write_ue(0); // num_positive_pics
        }
        w.write_se(0); // slice_qp_delta
        w.byte_align();
    }
}
