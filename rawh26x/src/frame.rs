use crate::error::EncoderError;

/// One 8-bit 4:2:0 picture. Chroma planes are `ceil(w/2) x ceil(h/2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePixels {
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Full-swing BT.601 integer transform, clamped to video range.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = luma(r, g, b);
    let cb = chroma_cb(r, g, b);
    let cr = chroma_cr(r, g, b);
    (clamp_luma(y), clamp_chroma(cb), clamp_chroma(cr))
}

fn luma(r: i32, g: i32, b: i32) -> i32 {
    (77 * r + 150 * g + 29 * b + 128) >> 8
}

fn chroma_cb(r: i32, g: i32, b: i32) -> i32 {
    ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128
}

fn chroma_cr(r: i32, g: i32, b: i32) -> i32 {
    ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128
}

fn clamp_luma(v: i32) -> u8 {
    v.clamp(16, 235) as u8
}

fn clamp_chroma(v: i32) -> u8 {
    v.clamp(16, 240) as u8
}

impl FramePixels {
    pub fn solid(width: u32, height: u32, y: u8, cb: u8, cr: u8) -> Self {
        let cw = width.div_ceil(2) as usize;
        let ch = height.div_ceil(2) as usize;
        Self {
            y: vec![y; (width * height) as usize],
            cb: vec![cb; cw * ch],
            cr: vec![cr; cw * ch],
            width,
            height,
        }
    }

    pub fn solid_rgb(width: u32, height: u32, r: u8, g: u8, b: u8) -> Self {
        let (y, cb, cr) = rgb_to_ycbcr(r, g, b);
        Self::solid(width, height, y, cb, cr)
    }

    /// Converts interleaved, row-major RGBA. Alpha is ignored; chroma is the
    /// rounded mean of each 2x2 block (edge pixels repeat on odd sizes).
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self, EncoderError> {
        if width == 0 || height == 0 {
            return Err(EncoderError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(EncoderError::PixelBufferSize {
                expected,
                got: rgba.len(),
            });
        }

        let w = width as usize;
        let h = height as usize;
        let px = |x: usize, y: usize| {
            let i = (y * w + x) * 4;
            (rgba[i] as i32, rgba[i + 1] as i32, rgba[i + 2] as i32)
        };

        let mut y_plane = Vec::with_capacity(w * h);
        for row in 0..h {
            for col in 0..w {
                let (r, g, b) = px(col, row);
                y_plane.push(clamp_luma(luma(r, g, b)));
            }
        }

        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        let mut cb_plane = Vec::with_capacity(cw * ch);
        let mut cr_plane = Vec::with_capacity(cw * ch);
        for cy in 0..ch {
            for cx in 0..cw {
                let mut sum_cb = 0;
                let mut sum_cr = 0;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let x = (cx * 2 + dx).min(w - 1);
                    let y = (cy * 2 + dy).min(h - 1);
                    let (r, g, b) = px(x, y);
                    sum_cb += chroma_cb(r, g, b);
                    sum_cr += chroma_cr(r, g, b);
                }
                cb_plane.push(clamp_chroma((sum_cb + 2) >> 2));
                cr_plane.push(clamp_chroma((sum_cr + 2) >> 2));
            }
        }

        Ok(Self {
            y: y_plane,
            cb: cb_plane,
            cr: cr_plane,
            width,
            height,
        })
    }

    /// Alternating bright and dark squares, `cell` luma samples wide.
    pub fn grid(width: u32, height: u32, cell: u32) -> Self {
        let cell = cell.max(2);
        let mut frame = Self::solid(width, height, 0, 128, 128);
        for row in 0..height {
            for col in 0..width {
                let bright = ((col / cell) + (row / cell)) % 2 == 0;
                frame.y[(row * width + col) as usize] = if bright { 235 } else { 40 };
            }
        }
        let cw = width.div_ceil(2);
        for row in 0..height.div_ceil(2) {
            for col in 0..cw {
                let i = (row * cw + col) as usize;
                let band = (col * 2 / cell) % 3;
                frame.cb[i] = [128, 90, 160][band as usize];
                frame.cr[i] = [128, 170, 100][band as usize];
            }
        }
        frame
    }

    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// Luma sample with coordinates clamped into the picture, so coding
    /// blocks overhanging the right or bottom edge repeat the edge samples.
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.y[(y * self.width + x) as usize]
    }

    fn chroma_at(&self, plane: &[u8], x: u32, y: u32) -> u8 {
        let cw = self.chroma_width();
        let x = x.min(cw - 1);
        let y = y.min(self.chroma_height() - 1);
        plane[(y * cw + x) as usize]
    }

    /// Appends a `size x size` luma block followed by its two chroma blocks,
    /// each in raster order, as PCM sample data is laid out.
    pub fn copy_pcm_block(&self, x0: u32, y0: u32, size: u32, out: &mut Vec<u8>) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                out.push(self.luma_at(x, y));
            }
        }
        let (cx0, cy0, csize) = (x0 / 2, y0 / 2, size / 2);
        for plane in [&self.cb, &self.cr] {
            for y in cy0..cy0 + csize {
                for x in cx0..cx0 + csize {
                    out.push(self.chroma_at(plane, x, y));
                }
            }
        }
    }
}
