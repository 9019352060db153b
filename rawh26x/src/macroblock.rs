use tracing::trace;

use crate::avc::AvcParams;
use crate::bitwriter::BitWriter;
use crate::cabac::CabacEncoder;
use crate::context::{AVC_I_SLICE_INIT, ContextBank, avc_ctx};
use crate::frame::FramePixels;
use crate::video::{EntropyCoding, LeafCoding};

const MB_SIZE: u32 = 16;
const MB_PCM_BYTES: usize = 256 + 2 * 64;

/// `mb_type` in an I slice.
const MB_TYPE_I16X16_DC: u32 = 3; // I_16x16_2_0_0
const MB_TYPE_I_PCM: u32 = 25;

/// Codes `slice_data()` for an H.264 I slice covering the whole picture, one
/// macroblock at a time in raster order.
pub struct MacroblockWriter<'a> {
    params: &'a AvcParams,
    frame: &'a FramePixels,
    leaf_coding: LeafCoding,
}

impl<'a> MacroblockWriter<'a> {
    pub fn new(params: &'a AvcParams, frame: &'a FramePixels, leaf_coding: LeafCoding) -> Self {
        Self {
            params,
            frame,
            leaf_coding,
        }
    }

    /// Appends slice data and `rbsp_slice_trailing_bits` to a writer that
    /// holds the slice header.
    pub fn encode_slice_data(&self, writer: BitWriter) -> BitWriter {
        let writer = match self.params.entropy_coding {
            EntropyCoding::Cabac => self.encode_cabac(writer),
            EntropyCoding::Cavlc => self.encode_cavlc(writer),
        };
        trace!(
            macroblocks = self.params.mb_count(),
            bytes = writer.data().len(),
            entropy = ?self.params.entropy_coding,
            leaf_coding = ?self.leaf_coding,
            "avc slice data"
        );
        writer
    }

    fn macroblocks(&self) -> impl Iterator<Item = (u32, u32)> {
        let cols = self.params.width_mbs;
        (0..self.params.height_mbs).flat_map(move |y| (0..cols).map(move |x| (x, y)))
    }

    fn pcm_samples(&self, mb_x: u32, mb_y: u32, out: &mut Vec<u8>) {
        out.clear();
        self.frame
            .copy_pcm_block(mb_x * MB_SIZE, mb_y * MB_SIZE, MB_SIZE, out);
    }

    fn encode_cabac(&self, mut writer: BitWriter) -> BitWriter {
        writer.align_one(); // cabac_alignment_one_bit
        let contexts = ContextBank::new(&AVC_I_SLICE_INIT, self.params.qp as i32);
        let mut cabac = CabacEncoder::new(writer, contexts);
        let mut samples = Vec::with_capacity(MB_PCM_BYTES);
        let last = self.params.mb_count() - 1;

        for (addr, (mb_x, mb_y)) in self.macroblocks().enumerate() {
            // Neighbours are never I_NxN, so availability alone decides.
            let mb_type_inc = (mb_x > 0) as usize + (mb_y > 0) as usize;
            cabac.encode_bin(true, avc_ctx::MB_TYPE_I + mb_type_inc);

            match self.leaf_coding {
                LeafCoding::Pcm => {
                    self.pcm_samples(mb_x, mb_y, &mut samples);
                    let mut pcm = cabac.enter_pcm();
                    pcm.write_samples(&samples);
                    pcm.resume();
                }
                LeafCoding::IntraDc => {
                    cabac.encode_terminate(); // not I_PCM
                    cabac.encode_bin(false, avc_ctx::MB_TYPE_I + 3); // luma cbp 0
                    cabac.encode_bin(false, avc_ctx::MB_TYPE_I + 4); // chroma cbp 0
                    // Intra16x16PredMode 2 (DC) as two bins.
                    cabac.encode_bin(true, avc_ctx::MB_TYPE_I + 6);
                    cabac.encode_bin(false, avc_ctx::MB_TYPE_I + 7);
                    cabac.encode_bin(false, avc_ctx::INTRA_CHROMA_PRED_MODE); // DC
                    cabac.encode_bin(false, avc_ctx::MB_QP_DELTA);
                    // Unavailable neighbours count as coded for an intra
                    // macroblock; available ones coded no DC coefficients.
                    let cbf_inc = (mb_x == 0) as usize + 2 * (mb_y == 0) as usize;
                    cabac.encode_bin(false, avc_ctx::CBF_LUMA_DC + cbf_inc);
                }
            }

            if addr as u32 != last {
                cabac.encode_terminate(); // end_of_slice_flag
            }
        }

        cabac.finish()
    }

    fn encode_cavlc(&self, mut writer: BitWriter) -> BitWriter {
        let mut samples = Vec::with_capacity(MB_PCM_BYTES);

        for (mb_x, mb_y) in self.macroblocks() {
            match self.leaf_coding {
                LeafCoding::Pcm => {
                    writer.write_ue(MB_TYPE_I_PCM);
                    writer.align_zero(); // pcm_alignment_zero_bit
                    self.pcm_samples(mb_x, mb_y, &mut samples);
                    writer.write_bytes(&samples);
                }
                LeafCoding::IntraDc => {
                    writer.write_ue(MB_TYPE_I16X16_DC);
                    writer.write_ue(0); // intra_chroma_pred_mode DC
                    writer.write_se(0); // mb_qp_delta
                    // Intra16x16DCLevel coeff_token, TotalCoeff 0 with nC 0.
                    writer.write_bit(true);
                }
            }
        }

        writer.byte_align();
        writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderConfig;
    use crate::video::Codec;

    fn params(width: u32, height: u32, entropy_coding: EntropyCoding) -> AvcParams {
        let mut config = EncoderConfig::new(width, height);
        config.codec = Codec::H264;
        config.entropy_coding = entropy_coding;
        AvcParams::from_config(&config).unwrap()
    }

    fn encode(p: &AvcParams, frame: &FramePixels, leaf: LeafCoding) -> Vec<u8> {
        MacroblockWriter::new(p, frame, leaf)
            .encode_slice_data(BitWriter::new())
            .finalize()
    }

    #[test]
    fn cavlc_dc_macroblock_bits() {
        let p = params(16, 16, EntropyCoding::Cavlc);
        let frame = FramePixels::solid(16, 16, 128, 128, 128);
        // ue(3) ue(0) se(0) coeff_token, then the stop bit.
        assert_eq!(encode(&p, &frame, LeafCoding::IntraDc), vec![0x27, 0x80]);
    }

    #[test]
    fn cavlc_pcm_macroblock_layout() {
        let p = params(16, 16, EntropyCoding::Cavlc);
        let frame = FramePixels::solid(16, 16, 10, 20, 30);
        let data = encode(&p, &frame, LeafCoding::Pcm);
        assert_eq!(data.len(), 2 + MB_PCM_BYTES + 1);
        // ue(25) is 000011010, then alignment zeros.
        assert_eq!(&data[..2], &[0x0D, 0x00]);
        assert!(data[2..258].iter().all(|&s| s == 10));
        assert!(data[258..322].iter().all(|&s| s == 20));
        assert!(data[322..386].iter().all(|&s| s == 30));
        assert_eq!(data[386], 0x80);
    }

    #[test]
    fn cabac_pcm_carries_every_macroblock() {
        let p = params(48, 32, EntropyCoding::Cabac);
        let frame = FramePixels::solid(48, 32, 60, 110, 170);
        let data = encode(&p, &frame, LeafCoding::Pcm);

        let mut block = vec![60u8; 256];
        block.extend([110u8; 64]);
        block.extend([170u8; 64]);
        let blocks = data.windows(block.len()).filter(|w| *w == block.as_slice()).count();
        assert_eq!(blocks, 6);
    }

    #[test]
    fn cabac_slice_data_starts_aligned() {
        let p = params(32, 32, EntropyCoding::Cabac);
        let frame = FramePixels::solid(32, 32, 128, 128, 128);
        let mut header = BitWriter::new();
        header.write_bits(0b101, 3);
        let data = MacroblockWriter::new(&p, &frame, LeafCoding::IntraDc)
            .encode_slice_data(header)
            .finalize();
        // cabac_alignment_one_bit fills the rest of the header byte.
        assert_eq!(data[0], 0b1011_1111);
        assert_ne!(*data.last().unwrap(), 0);
    }

    #[test]
    fn dc_is_far_smaller_than_pcm() {
        for entropy in [EntropyCoding::Cabac, EntropyCoding::Cavlc] {
            let p = params(64, 48, entropy);
            let frame = FramePixels::grid(64, 48, 16);
            let dc = encode(&p, &frame, LeafCoding::IntraDc);
            let pcm = encode(&p, &frame, LeafCoding::Pcm);
            assert!(dc.len() * 50 < pcm.len(), "{entropy:?}: dc {} pcm {}", dc.len(), pcm.len());
        }
    }

    #[test]
    fn cropped_pictures_replicate_edges() {
        let p = params(24, 8, EntropyCoding::Cavlc);
        assert_eq!((p.width_mbs, p.height_mbs), (2, 1));
        let frame = FramePixels::solid(24, 8, 77, 128, 128);
        let data = encode(&p, &frame, LeafCoding::Pcm);
        let luma_runs = data.windows(256).filter(|w| w.iter().all(|&s| s == 77)).count();
        assert_eq!(luma_runs, 2);
    }
}
