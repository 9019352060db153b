use crate::bitwriter::BitWriter;
use crate::context::ContextBank;

#[rustfmt::skip]
pub const RANGE_TAB_LPS: [[u8; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [ 95, 116, 137, 158], [ 90, 110, 130, 150], [ 85, 104, 123, 142], [ 81,  99, 117, 135],
    [ 77,  94, 111, 128], [ 73,  89, 105, 122], [ 69,  85, 100, 116], [ 66,  80,  95, 110],
    [ 62,  76,  90, 104], [ 59,  72,  86,  99], [ 56,  69,  81,  94], [ 53,  65,  77,  89],
    [ 51,  62,  73,  85], [ 48,  59,  69,  80], [ 46,  56,  66,  76], [ 43,  53,  63,  72],
    [ 41,  50,  59,  69], [ 39,  48,  56,  65], [ 37,  45,  54,  62], [ 35,  43,  51,  59],
    [ 33,  41,  48,  56], [ 32,  39,  46,  53], [ 30,  37,  43,  50], [ 29,  35,  41,  48],
    [ 27,  33,  39,  45], [ 26,  31,  37,  43], [ 24,  30,  35,  41], [ 23,  28,  33,  39],
    [ 22,  27,  32,  37], [ 21,  26,  30,  35], [ 20,  24,  29,  33], [ 19,  23,  27,  31],
    [ 18,  22,  26,  30], [ 17,  21,  25,  28], [ 16,  20,  23,  27], [ 15,  19,  22,  25],
    [ 14,  18,  21,  24], [ 14,  17,  20,  23], [ 13,  16,  19,  22], [ 12,  15,  18,  21],
    [ 12,  14,  17,  20], [ 11,  14,  16,  19], [ 11,  13,  15,  18], [ 10,  12,  15,  17],
    [ 10,  12,  14,  16], [  9,  11,  13,  15], [  9,  11,  12,  14], [  8,  10,  12,  14],
    [  8,   9,  11,  13], [  7,   9,  11,  12], [  7,   9,  10,  12], [  7,   8,  10,  11],
    [  6,   8,   9,  11], [  6,   7,   9,  10], [  6,   7,   8,   9], [  2,   2,   2,   2],
];

/// Renormalisation shift for an LPS range, indexed by `lps_range >> 3`.
#[rustfmt::skip]
const RENORM_TABLE: [u8; 32] = [
    6, 5, 4, 4, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

const INITIAL_RANGE: u32 = 510;
const INITIAL_BITS_LEFT: i32 = 23;

/// Binary arithmetic coder writing into an owned [`BitWriter`].
///
/// `low` keeps `32 - bits_left` significant bits. Completed bytes leave the
/// register through `write_out`; a byte equal to 0xFF is held back, together
/// with the byte before it, until a later byte tells whether a carry reaches
/// them.
#[derive(Debug)]
pub struct CabacEncoder {
    writer: BitWriter,
    contexts: ContextBank,
    low: u32,
    range: u32,
    bits_left: i32,
    buffered_byte: u8,
    num_buffered_bytes: u32,
}

impl CabacEncoder {
    pub fn new(writer: BitWriter, contexts: ContextBank) -> Self {
        debug_assert!(writer.is_byte_aligned(), "slice data must start byte aligned");
        Self {
            writer,
            contexts,
            low: 0,
            range: INITIAL_RANGE,
            bits_left: INITIAL_BITS_LEFT,
            buffered_byte: 0xFF,
            num_buffered_bytes: 0,
        }
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    pub fn contexts(&self) -> &ContextBank {
        &self.contexts
    }

    pub fn encode_bin(&mut self, bin: bool, ctx_idx: usize) {
        let ctx = self.contexts.get_mut(ctx_idx);
        let state = ctx.state() as usize;
        let lps = RANGE_TAB_LPS[state][((self.range >> 6) & 3) as usize] as u32;
        self.range -= lps;

        if bin != ctx.mps() {
            let num_bits = RENORM_TABLE[(lps >> 3) as usize];
            self.low = (self.low + self.range) << num_bits;
            self.range = lps << num_bits;
            self.bits_left -= num_bits as i32;
            ctx.update(bin);
        } else {
            ctx.update(bin);
            if self.range >= 256 {
                return;
            }
            self.low <<= 1;
            self.range <<= 1;
            self.bits_left -= 1;
        }

        self.test_and_write_out();
    }

    pub fn encode_bypass(&mut self, bin: bool) {
        self.low <<= 1;
        if bin {
            self.low += self.range;
        }
        self.bits_left -= 1;
        self.test_and_write_out();
    }

    /// Fixed-length bypass field, most significant bin first.
    pub fn encode_bypass_bits(&mut self, value: u32, num_bits: u8) {
        for i in (0..num_bits).rev() {
            self.encode_bypass((value >> i) & 1 == 1);
        }
    }

    /// Terminating bin equal to 0 (`pcm_flag`, `end_of_slice_segment_flag`,
    /// `end_of_slice_flag` or the I_PCM bin of `mb_type` set to 0). A
    /// terminating bin equal to 1 is coded by [`Self::enter_pcm`] or
    /// [`Self::finish`].
    pub fn encode_terminate(&mut self) {
        self.range -= 2;
        if self.range >= 256 {
            return;
        }
        self.low <<= 1;
        self.range <<= 1;
        self.bits_left -= 1;
        self.test_and_write_out();
    }

    /// Codes a terminating bin equal to 1, flushes the arithmetic coder and
    /// writes `pcm_alignment_one_bit` plus zero padding. The returned writer
    /// takes raw samples; the coder restarts when it is dropped.
    pub fn enter_pcm(&mut self) -> PcmWriter<'_> {
        self.terminate_one();
        self.flush();
        self.writer.byte_align();
        PcmWriter { cabac: self }
    }

    /// Codes a terminating bin equal to 1, flushes the coder and appends
    /// `rbsp_slice_segment_trailing_bits`.
    pub fn finish(mut self) -> BitWriter {
        self.terminate_one();
        self.flush();
        self.writer.byte_align();
        self.writer
    }

    fn terminate_one(&mut self) {
        self.range -= 2;
        self.low += self.range;
        self.low <<= 7;
        self.range = 2 << 7;
        self.bits_left -= 7;
        self.test_and_write_out();
    }

    fn test_and_write_out(&mut self) {
        if self.bits_left < 12 {
            self.write_out();
        }
    }

    fn write_out(&mut self) {
        let lead_byte = self.low >> (24 - self.bits_left);
        self.bits_left += 8;
        // `low` keeps 32 - bits_left bits once the lead byte is consumed.
        self.low &= 0xFFFF_FFFF >> self.bits_left;

        if lead_byte == 0xFF {
            self.num_buffered_bytes += 1;
        } else if self.num_buffered_bytes > 0 {
            let carry = lead_byte >> 8;
            let byte = self.buffered_byte as u32 + carry;
            self.buffered_byte = (lead_byte & 0xFF) as u8;
            self.writer.write_bits(byte as u64, 8);

            let run_byte = (0xFF + carry) & 0xFF;
            while self.num_buffered_bytes > 1 {
                self.writer.write_bits(run_byte as u64, 8);
                self.num_buffered_bytes -= 1;
            }
        } else {
            self.num_buffered_bytes = 1;
            self.buffered_byte = lead_byte as u8;
        }
    }

    fn flush(&mut self) {
        let shift = 32 - self.bits_left;
        if self.low >> shift != 0 {
            self.writer
                .write_bits(self.buffered_byte as u64 + 1, 8);
            while self.num_buffered_bytes > 1 {
                self.writer.write_bits(0x00, 8);
                self.num_buffered_bytes -= 1;
            }
            self.low -= 1 << shift;
        } else {
            if self.num_buffered_bytes > 0 {
                self.writer.write_bits(self.buffered_byte as u64, 8);
            }
            while self.num_buffered_bytes > 1 {
                self.writer.write_bits(0xFF, 8);
                self.num_buffered_bytes -= 1;
            }
        }
        self.writer
            .write_bits((self.low >> 8) as u64, (24 - self.bits_left) as u8);
        self.num_buffered_bytes = 0;
    }

    fn restart(&mut self) {
        self.low = 0;
        self.range = INITIAL_RANGE;
        self.bits_left = INITIAL_BITS_LEFT;
        self.buffered_byte = 0xFF;
        self.num_buffered_bytes = 0;
    }
}

/// Raw sample sink between `pcm_flag` and the next context-coded bin.
///
/// While it lives the encoder is mutably borrowed, so no bin can be coded.
/// Dropping it (or calling [`PcmWriter::resume`]) reinitialises the
/// arithmetic state; context models are left as they are.
#[must_use = "PCM samples must be written before coding resumes"]
pub struct PcmWriter<'a> {
    cabac: &'a mut CabacEncoder,
}

impl PcmWriter<'_> {
    pub fn write_sample(&mut self, sample: u8) {
        self.cabac.writer.write_bits(sample as u64, 8);
    }

    pub fn write_samples(&mut self, samples: &[u8]) {
        self.cabac.writer.write_bytes(samples);
    }

    pub fn resume(self) {}
}

impl Drop for PcmWriter<'_> {
    fn drop(&mut self) {
        debug_assert!(self.cabac.writer.is_byte_aligned());
        self.cabac.restart();
    }
}
