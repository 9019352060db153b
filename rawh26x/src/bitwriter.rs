#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    current_byte: u8,
    bits_in_current: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current_byte = (self.current_byte << 1) | (bit as u8);
        self.bits_in_current += 1;
        if self.bits_in_current == 8 {
            self.buf.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_current = 0;
        }
    }

    /// Appends the low `n` bits of `value`, most significant first. Bits of
    /// `value` above `n` are ignored.
    pub fn write_bits(&mut self, value: u64, n: u8) {
        debug_assert!(n <= 64);
        if n == 8 && self.bits_in_current == 0 {
            self.buf.push(value as u8);
            return;
        }
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits_in_current == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(b as u64, 8);
            }
        }
    }

    /// ue(v): `k` leading zeros followed by `v + 1` in `k + 1` bits.
    pub fn write_ue(&mut self, value: u32) {
        self.write_exp_golomb(value as u64);
    }

    pub fn write_se(&mut self, value: i32) {
        let code_num = if value <= 0 {
            value.unsigned_abs() as u64 * 2
        } else {
            value as u64 * 2 - 1
        };
        self.write_exp_golomb(code_num);
    }

    fn write_exp_golomb(&mut self, code_num: u64) {
        let code = code_num + 1;
        let len = 64 - code.leading_zeros() as u8;
        self.write_bits(0, len - 1);
        self.write_bits(code, len);
    }

    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(flag);
    }

    /// rbsp_trailing_bits: a stop bit, then zeros up to the byte boundary.
    /// The stop bit is written even when the writer is already aligned.
    pub fn byte_align(&mut self) {
        self.write_bit(true);
        self.align_zero();
    }

    pub fn align_zero(&mut self) {
        if self.bits_in_current > 0 {
            self.current_byte <<= 8 - self.bits_in_current;
            self.buf.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_current = 0;
        }
    }

    /// cabac_alignment_one_bit run used by H.264 before slice data.
    pub fn align_one(&mut self) {
        while self.bits_in_current != 0 {
            self.write_bit(true);
        }
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bits_in_current == 0
    }

    /// Bits written into the current, not yet complete, byte.
    pub fn bit_position(&self) -> u8 {
        self.bits_in_current
    }

    /// Completed bytes. A partially filled trailing byte is not included.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn finalize(mut self) -> Vec<u8> {
        self.align_zero();
        self.buf
    }

    pub fn trailing_bits(mut self) -> Vec<u8> {
        self.byte_align();
        self.buf
    }
}
