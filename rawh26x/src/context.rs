//! CABAC probability contexts and their slice-start initialisation.
//!
//! Both codecs share one bank layout: a fixed array of `(state, mps)` pairs,
//! addressed by the per-codec index constants in [`hevc_ctx`] and [`avc_ctx`].

pub const CONTEXT_BANK_SIZE: usize = 64;

#[rustfmt::skip]
const NEXT_STATE_MPS: [u8; 64] = [
     1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

#[rustfmt::skip]
const NEXT_STATE_LPS: [u8; 64] = [
     0,  0,  1,  2,  2,  4,  4,  5,  6,  7,  8,  9,  9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextModel {
    state: u8,
    mps: bool,
}

impl ContextModel {
    pub const fn new(state: u8, mps: bool) -> Self {
        Self { state, mps }
    }

    pub fn state(self) -> u8 {
        self.state
    }

    pub fn mps(self) -> bool {
        self.mps
    }

    /// Advances the state after coding `bin` with this context.
    pub fn update(&mut self, bin: bool) {
        if bin == self.mps {
            self.state = NEXT_STATE_MPS[self.state as usize];
        } else {
            if self.state == 0 {
                self.mps = !self.mps;
            }
            self.state = NEXT_STATE_LPS[self.state as usize];
        }
    }
}

/// Linear initialisation parameters `(m, n)` shared by H.264 and HEVC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInit {
    pub m: i16,
    pub n: i16,
}

impl ContextInit {
    pub const fn avc(m: i16, n: i16) -> Self {
        Self { m, n }
    }

    /// Expands an HEVC 8-bit `initValue` into its slope and offset.
    pub const fn hevc(init_value: u8) -> Self {
        let slope_idx = (init_value >> 4) as i16;
        let offset_idx = (init_value & 15) as i16;
        Self {
            m: slope_idx * 5 - 45,
            n: (offset_idx << 3) - 16,
        }
    }

    pub fn model_for_qp(self, slice_qp: i32) -> ContextModel {
        let qp = slice_qp.clamp(0, 51);
        let pre = (((self.m as i32 * qp) >> 4) + self.n as i32).clamp(1, 126);
        if pre <= 63 {
            ContextModel::new((63 - pre) as u8, false)
        } else {
            ContextModel::new((pre - 64) as u8, true)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBank {
    models: [ContextModel; CONTEXT_BANK_SIZE],
}

impl ContextBank {
    /// Builds a bank initialised for a slice at `slice_qp`. Indices not named
    /// by `table` stay at state 0 with MPS 0.
    pub fn new(table: &[(usize, ContextInit)], slice_qp: i32) -> Self {
        let mut bank = Self {
            models: [ContextModel::default(); CONTEXT_BANK_SIZE],
        };
        bank.init(table, slice_qp);
        bank
    }

    pub fn init(&mut self, table: &[(usize, ContextInit)], slice_qp: i32) {
        for &(idx, init) in table {
            self.models[idx] = init.model_for_qp(slice_qp);
        }
    }

    pub fn get(&self, idx: usize) -> ContextModel {
        self.models[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut ContextModel {
        &mut self.models[idx]
    }
}

/// HEVC I-slice context indices (initType 0).
pub mod hevc_ctx {
    pub const SPLIT_CU_FLAG: usize = 0;
    pub const PART_MODE: usize = 3;
    pub const PREV_INTRA_LUMA_PRED_FLAG: usize = 4;
    pub const INTRA_CHROMA_PRED_MODE: usize = 5;
    pub const CBF_LUMA: usize = 6;
    pub const CBF_CHROMA: usize = 8;
}

#[rustfmt::skip]
pub const HEVC_I_SLICE_INIT: [(usize, ContextInit); 13] = [
    (hevc_ctx::SPLIT_CU_FLAG,              ContextInit::hevc(139)),
    (hevc_ctx::SPLIT_CU_FLAG + 1,          ContextInit::hevc(141)),
    (hevc_ctx::SPLIT_CU_FLAG + 2,          ContextInit::hevc(157)),
    (hevc_ctx::PART_MODE,                  ContextInit::hevc(184)),
    (hevc_ctx::PREV_INTRA_LUMA_PRED_FLAG,  ContextInit::hevc(184)),
    (hevc_ctx::INTRA_CHROMA_PRED_MODE,     ContextInit::hevc(63)),
    (hevc_ctx::CBF_LUMA,                   ContextInit::hevc(111)),
    (hevc_ctx::CBF_LUMA + 1,               ContextInit::hevc(141)),
    (hevc_ctx::CBF_CHROMA,                 ContextInit::hevc(94)),
    (hevc_ctx::CBF_CHROMA + 1,             ContextInit::hevc(138)),
    (hevc_ctx::CBF_CHROMA + 2,             ContextInit::hevc(182)),
    (hevc_ctx::CBF_CHROMA + 3,             ContextInit::hevc(154)),
    (hevc_ctx::CBF_CHROMA + 4,             ContextInit::hevc(154)),
];

/// H.264 I-slice context indices, packed. The comments give ctxIdx.
pub mod avc_ctx {
    /// ctxIdx 3..=10
    pub const MB_TYPE_I: usize = 0;
    /// ctxIdx 60..=63
    pub const MB_QP_DELTA: usize = 8;
    /// ctxIdx 64..=67
    pub const INTRA_CHROMA_PRED_MODE: usize = 12;
    /// ctxIdx 85..=88, coded_block_flag for ctxBlockCat 0
    pub const CBF_LUMA_DC: usize = 16;
}

#[rustfmt::skip]
pub const AVC_I_SLICE_INIT: [(usize, ContextInit); 20] = [
    (avc_ctx::MB_TYPE_I,                  ContextInit::avc(20, -15)),
    (avc_ctx::MB_TYPE_I + 1,              ContextInit::avc(2, 54)),
    (avc_ctx::MB_TYPE_I + 2,              ContextInit::avc(3, 74)),
    (avc_ctx::MB_TYPE_I + 3,              ContextInit::avc(-28, 127)),
    (avc_ctx::MB_TYPE_I + 4,              ContextInit::avc(-23, 104)),
    (avc_ctx::MB_TYPE_I + 5,              ContextInit::avc(-6, 53)),
    (avc_ctx::MB_TYPE_I + 6,              ContextInit::avc(-1, 54)),
    (avc_ctx::MB_TYPE_I + 7,              ContextInit::avc(7, 51)),
    (avc_ctx::MB_QP_DELTA,                ContextInit::avc(0, 41)),
    (avc_ctx::MB_QP_DELTA + 1,            ContextInit::avc(0, 63)),
    (avc_ctx::MB_QP_DELTA + 2,            ContextInit::avc(0, 63)),
    (avc_ctx::MB_QP_DELTA + 3,            ContextInit::avc(0, 63)),
    (avc_ctx::INTRA_CHROMA_PRED_MODE,     ContextInit::avc(-9, 83)),
    (avc_ctx::INTRA_CHROMA_PRED_MODE + 1, ContextInit::avc(4, 86)),
    (avc_ctx::INTRA_CHROMA_PRED_MODE + 2, ContextInit::avc(0, 97)),
    (avc_ctx::INTRA_CHROMA_PRED_MODE + 3, ContextInit::avc(-7, 72)),
    (avc_ctx::CBF_LUMA_DC,                ContextInit::avc(-17, 123)),
    (avc_ctx::CBF_LUMA_DC + 1,            ContextInit::avc(-12, 115)),
    (avc_ctx::CBF_LUMA_DC + 2,            ContextInit::avc(-16, 122)),
    (avc_ctx::CBF_LUMA_DC + 3,            ContextInit::avc(-11, 115)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hevc_init_value_expansion() {
        assert_eq!(ContextInit::hevc(154), ContextInit { m: 0, n: 64 });
        assert_eq!(ContextInit::hevc(139), ContextInit { m: -5, n: 72 });
        assert_eq!(ContextInit::hevc(63), ContextInit { m: -30, n: 104 });
    }

    #[test]
    fn hevc_states_at_qp_26() {
        assert_eq!(ContextInit::hevc(139).model_for_qp(26), ContextModel::new(0, false));
        assert_eq!(ContextInit::hevc(154).model_for_qp(26), ContextModel::new(0, true));
        assert_eq!(ContextInit::hevc(184).model_for_qp(26), ContextModel::new(0, true));
        assert_eq!(ContextInit::hevc(63).model_for_qp(26), ContextModel::new(8, false));
    }

    #[test]
    fn avc_mb_type_states_at_qp_26() {
        assert_eq!(ContextInit::avc(20, -15).model_for_qp(26), ContextModel::new(46, false));
        assert_eq!(ContextInit::avc(2, 54).model_for_qp(26), ContextModel::new(6, false));
        assert_eq!(ContextInit::avc(3, 74).model_for_qp(26), ContextModel::new(14, true));
    }

    #[test]
    fn qp_is_clipped_before_use() {
        let init = ContextInit::avc(20, -15);
        assert_eq!(init.model_for_qp(-10), init.model_for_qp(0));
        assert_eq!(init.model_for_qp(80), init.model_for_qp(51));
    }

    #[test]
    fn pre_state_is_clipped_to_1_126() {
        assert_eq!(ContextInit::avc(0, -50).model_for_qp(26), ContextModel::new(62, false));
        assert_eq!(ContextInit::avc(0, 200).model_for_qp(26), ContextModel::new(62, true));
    }

    #[test]
    fn initialised_states_never_reach_63() {
        for v in 0..=255u8 {
            for qp in 0..=51 {
                assert!(ContextInit::hevc(v).model_for_qp(qp).state() <= 62);
            }
        }
    }

    #[test]
    fn mps_transition_saturates_at_62() {
        let mut ctx = ContextModel::new(62, true);
        ctx.update(true);
        assert_eq!(ctx, ContextModel::new(62, true));
    }

    #[test]
    fn lps_at_state_zero_flips_mps() {
        let mut ctx = ContextModel::new(0, false);
        ctx.update(true);
        assert_eq!(ctx, ContextModel::new(0, true));
    }

    #[test]
    fn lps_transition_follows_table() {
        let mut ctx = ContextModel::new(20, true);
        ctx.update(false);
        assert_eq!(ctx, ContextModel::new(16, true));
    }

    #[test]
    fn bank_init_only_touches_listed_indices() {
        let bank = ContextBank::new(&HEVC_I_SLICE_INIT, 26);
        assert_eq!(bank.get(hevc_ctx::SPLIT_CU_FLAG), ContextModel::new(0, false));
        assert_eq!(bank.get(CONTEXT_BANK_SIZE - 1), ContextModel::default());
    }

    #[test]
    fn bank_init_is_deterministic() {
        let a = ContextBank::new(&AVC_I_SLICE_INIT, 26);
        let mut b = ContextBank::new(&AVC_I_SLICE_INIT, 40);
        b.init(&AVC_I_SLICE_INIT, 26);
        assert_eq!(a, b);
    }
}
