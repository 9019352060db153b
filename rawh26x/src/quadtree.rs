use tracing::trace;

use crate::bitwriter::BitWriter;
use crate::cabac::CabacEncoder;
use crate::context::hevc_ctx;
use crate::frame::FramePixels;
use crate::hevc::HevcParams;
use crate::video::LeafCoding;

/// Walks the CTUs of one picture and codes `slice_segment_data()`.
///
/// Every CTU is split down to the minimum coding block; each leaf is coded
/// with the slice's [`LeafCoding`]. Nodes crossing the right or bottom edge
/// of the coded picture are split without a `split_cu_flag`.
pub struct QuadtreePartitioner<'a> {
    params: &'a HevcParams,
    frame: &'a FramePixels,
    leaf_coding: LeafCoding,
}

impl<'a> QuadtreePartitioner<'a> {
    pub fn new(params: &'a HevcParams, frame: &'a FramePixels, leaf_coding: LeafCoding) -> Self {
        Self {
            params,
            frame,
            leaf_coding,
        }
    }

    /// Number of coding units per picture.
    pub fn leaf_count(&self) -> u32 {
        let min_cb = 1 << self.params.log2_min_cb_size;
        (self.params.coded_width / min_cb) * (self.params.coded_height / min_cb)
    }

    /// Codes every CTU in raster order. `end_of_slice_segment_flag` is 0
    /// between CTUs; the final 1 and the slice trailing bits come from
    /// [`CabacEncoder::finish`].
    pub fn encode_slice_data(&self, mut cabac: CabacEncoder) -> BitWriter {
        let cols = self.params.ctu_cols();
        let rows = self.params.ctu_rows();
        let ctu_size = self.params.ctu_size();
        let mut samples = Vec::with_capacity(pcm_block_len(1 << self.params.log2_min_cb_size));

        for row in 0..rows {
            for col in 0..cols {
                self.coding_quadtree(
                    &mut cabac,
                    &mut samples,
                    col * ctu_size,
                    row * ctu_size,
                    self.params.log2_ctu_size,
                );
                let last = row + 1 == rows && col + 1 == cols;
                if !last {
                    cabac.encode_terminate();
                }
            }
        }

        let writer = cabac.finish();
        trace!(
            ctus = cols * rows,
            leaves = self.leaf_count(),
            bytes = writer.data().len(),
            leaf_coding = ?self.leaf_coding,
            "hevc slice data"
        );
        writer
    }

    fn coding_quadtree(
        &self,
        cabac: &mut CabacEncoder,
        samples: &mut Vec<u8>,
        x0: u32,
        y0: u32,
        log2_size: u8,
    ) {
        let size = 1u32 << log2_size;
        let width = self.params.coded_width;
        let height = self.params.coded_height;
        let split = log2_size > self.params.log2_min_cb_size;

        if split && x0 + size <= width && y0 + size <= height {
            // Left and above neighbours, when available, are leaves at the
            // deepest level, so each contributes one to the context increment.
            let ctx_inc = (x0 > 0) as usize + (y0 > 0) as usize;
            cabac.encode_bin(true, hevc_ctx::SPLIT_CU_FLAG + ctx_inc);
        }

        if !split {
            self.coding_unit(cabac, samples, x0, y0, log2_size);
            return;
        }

        let half = size / 2;
        for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
            let (x, y) = (x0 + dx, y0 + dy);
            if x < width && y < height {
                self.coding_quadtree(cabac, samples, x, y, log2_size - 1);
            }
        }
    }

    fn coding_unit(
        &self,
        cabac: &mut CabacEncoder,
        samples: &mut Vec<u8>,
        x0: u32,
        y0: u32,
        log2_size: u8,
    ) {
        cabac.encode_bin(true, hevc_ctx::PART_MODE); // PART_2Nx2N

        match self.leaf_coding {
            LeafCoding::Pcm => {
                samples.clear();
                self.frame.copy_pcm_block(x0, y0, 1 << log2_size, samples);
                let mut pcm = cabac.enter_pcm();
                pcm.write_samples(samples);
                pcm.resume();
            }
            LeafCoding::IntraDc => {
                cabac.encode_terminate(); // pcm_flag
                cabac.encode_bin(true, hevc_ctx::PREV_INTRA_LUMA_PRED_FLAG);
                // Neighbours are DC leaves or unavailable, so the candidate
                // list is {planar, DC, vertical}; mpm_idx 1 is TR-coded "10".
                cabac.encode_bypass_bits(0b10, 2);
                cabac.encode_bin(false, hevc_ctx::INTRA_CHROMA_PRED_MODE); // mode 4
                self.transform_tree(cabac, log2_size);
            }
        }
    }

    /// A single transform unit with no coded residual.
    fn transform_tree(&self, cabac: &mut CabacEncoder, log2_size: u8) {
        debug_assert!(log2_size <= self.params.log2_max_tb_size());
        // cbf_cb and cbf_cr at depth 0, then cbf_luma.
        cabac.encode_bin(false, hevc_ctx::CBF_CHROMA);
        cabac.encode_bin(false, hevc_ctx::CBF_CHROMA);
        cabac.encode_bin(false, hevc_ctx::CBF_LUMA + 1);
    }
}

/// Bytes of one 4:2:0 PCM block of `size` luma samples across.
pub fn pcm_block_len(size: u32) -> usize {
    let size = size as usize;
    size * size + 2 * (size / 2) * (size / 2)
}
