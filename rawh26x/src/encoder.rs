use tracing::debug;

use crate::avc::{AvcParams, AvcSliceHeader};
use crate::bitwriter::BitWriter;
use crate::cabac::CabacEncoder;
use crate::context::{ContextBank, HEVC_I_SLICE_INIT};
use crate::error::EncoderError;
use crate::fps::Fps;
use crate::frame::FramePixels;
use crate::hevc::{HevcParams, HevcSliceHeader};
use crate::macroblock::MacroblockWriter;
use crate::mp4::Mp4Config;
use crate::nal::{NalHeader, NalUnit};
use crate::packet::{FrameType, Packet};
use crate::quadtree::QuadtreePartitioner;
use crate::video::{BitDepth, ChromaFormat, Codec, EntropyCoding, LeafCoding};

pub const MAX_DIMENSION: u32 = 8192;
pub const DEFAULT_GOP_SIZE: u32 = 25;
pub const DEFAULT_QP: u8 = 26;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub codec: Codec,
    /// Distance between IDR pictures.
    pub gop_size: u32,
    pub qp: u8,
    /// `level_idc` (H.264) or `general_level_idc` (HEVC); derived when `None`.
    pub level: Option<u8>,
    pub bit_depth: BitDepth,
    pub chroma_format: ChromaFormat,
    /// Leaf coding for frames sent without [`FrameOptions::leaf_coding`].
    pub leaf_coding: LeafCoding,
    /// H.264 only.
    pub entropy_coding: EntropyCoding,
    /// HEVC only.
    pub log2_ctu_size: u8,
    /// HEVC only.
    pub log2_min_cb_size: u8,
}

impl EncoderConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: Fps::default(),
            codec: Codec::Hevc,
            gop_size: DEFAULT_GOP_SIZE,
            qp: DEFAULT_QP,
            level: None,
            bit_depth: BitDepth::Eight,
            chroma_format: ChromaFormat::Yuv420,
            leaf_coding: LeafCoding::Pcm,
            entropy_coding: EntropyCoding::Cabac,
            log2_ctu_size: 6,
            log2_min_cb_size: 3,
        }
    }

    pub fn validate(&self) -> Result<(), EncoderError> {
        let (width, height) = (self.width, self.height);
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(EncoderError::InvalidDimensions { width, height });
        }
        if self.chroma_format != ChromaFormat::Yuv420 || self.bit_depth != BitDepth::Eight {
            return Err(EncoderError::UnsupportedFormat {
                chroma_format: self.chroma_format,
                bit_depth: self.bit_depth,
            });
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(EncoderError::OddDimensions { width, height });
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.gop_size == 0 {
            return Err(EncoderError::InvalidGopSize);
        }
        if self.qp > 51 {
            return Err(EncoderError::InvalidQp(self.qp));
        }
        if self.codec == Codec::Hevc {
            if self.entropy_coding != EntropyCoding::Cabac {
                return Err(EncoderError::UnsupportedEntropyCoding);
            }
            let ctu = self.log2_ctu_size;
            let min_cb = self.log2_min_cb_size;
            if !(4..=6).contains(&ctu) || !(3..=ctu.min(5)).contains(&min_cb) {
                return Err(EncoderError::InvalidCodingTree {
                    log2_ctu_size: ctu,
                    log2_min_cb_size: min_cb,
                });
            }
        }
        Ok(())
    }
}

/// Per-frame overrides for [`Encoder::send_frame_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOptions {
    pub leaf_coding: Option<LeafCoding>,
    pub force_keyframe: bool,
}

#[derive(Debug)]
enum SequenceParams {
    Avc(AvcParams),
    Hevc(HevcParams),
}

#[derive(Debug)]
pub struct Encoder {
    config: EncoderConfig,
    params: SequenceParams,
    frame_index: u64,
    frames_since_idr: u32,
    idr_pic_id: u32,
    pending_packet: Option<Packet>,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Result<Self, EncoderError> {
        config.validate()?;

        let params = match config.codec {
            Codec::H264 => SequenceParams::Avc(AvcParams::from_config(&config)?),
            Codec::Hevc => SequenceParams::Hevc(HevcParams::from_config(&config)?),
        };
        debug!(
            codec = %config.codec,
            width = config.width,
            height = config.height,
            level_idc = level_idc_of(&params),
            "encoder configured"
        );

        Ok(Self {
            config,
            params,
            frame_index: 0,
            frames_since_idr: 0,
            idr_pic_id: 0,
            pending_packet: None,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn level_idc(&self) -> u8 {
        level_idc_of(&self.params)
    }

    /// Parameter sets in stream order: SPS, PPS for H.264; VPS, SPS, PPS for
    /// HEVC.
    pub fn headers(&self) -> Vec<NalUnit> {
        match &self.params {
            SequenceParams::Avc(p) => p.parameter_sets().to_vec(),
            SequenceParams::Hevc(p) => p.parameter_sets().to_vec(),
        }
    }

    pub fn headers_annex_b(&self) -> Vec<u8> {
        self.headers().iter().flat_map(NalUnit::to_annex_b).collect()
    }

    /// Sample entry description for [`crate::mp4::Mp4Muxer`].
    pub fn mp4_config(&self) -> Mp4Config {
        Mp4Config {
            codec: self.config.codec,
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
            chroma_format: self.config.chroma_format,
            parameter_sets: self.headers(),
        }
    }

    pub fn send_frame(&mut self, pixels: &FramePixels) -> Result<(), EncoderError> {
        self.send_frame_with(pixels, FrameOptions::default())
    }

    /// Converts an RGBA picture of the configured size and encodes it.
    pub fn send_rgba(&mut self, rgba: &[u8]) -> Result<(), EncoderError> {
        let pixels = FramePixels::from_rgba(self.config.width, self.config.height, rgba)?;
        self.send_frame(&pixels)
    }

    pub fn send_frame_with(
        &mut self,
        pixels: &FramePixels,
        options: FrameOptions,
    ) -> Result<(), EncoderError> {
        if pixels.width != self.config.width || pixels.height != self.config.height {
            return Err(EncoderError::DimensionMismatch {
                expected_w: self.config.width,
                expected_h: self.config.height,
                got_w: pixels.width,
                got_h: pixels.height,
            });
        }

        let is_keyframe = self.frame_index == 0
            || options.force_keyframe
            || self.frames_since_idr >= self.config.gop_size;
        if is_keyframe {
            self.frames_since_idr = 0;
        }
        let leaf_coding = options.leaf_coding.unwrap_or(self.config.leaf_coding);

        let mut nal_units = if is_keyframe { self.headers() } else { Vec::new() };
        nal_units.push(self.encode_slice(pixels, is_keyframe, leaf_coding));

        let data: Vec<u8> = nal_units.iter().flat_map(NalUnit::to_annex_b).collect();
        let frame_type = if is_keyframe {
            FrameType::Key
        } else {
            FrameType::Intra
        };
        debug!(
            frame = self.frame_index,
            ?frame_type,
            ?leaf_coding,
            bytes = data.len(),
            "encoded frame"
        );

        self.pending_packet = Some(Packet {
            data,
            nal_units,
            frame_type,
            frame_number: self.frame_index,
        });

        if is_keyframe {
            self.idr_pic_id ^= 1;
        }
        self.frames_since_idr += 1;
        self.frame_index += 1;

        Ok(())
    }

    fn encode_slice(&self, pixels: &FramePixels, idr: bool, leaf_coding: LeafCoding) -> NalUnit {
        let capacity = pixels.y.len() + pixels.cb.len() * 2 + 1024;
        let mut writer = BitWriter::with_capacity(capacity);

        match &self.params {
            SequenceParams::Hevc(p) => {
                let header = HevcSliceHeader {
                    idr,
                    poc: self.frames_since_idr,
                };
                header.write(&mut writer);
                let contexts = ContextBank::new(&HEVC_I_SLICE_INIT, p.qp as i32);
                let cabac = CabacEncoder::new(writer, contexts);
                let rbsp = QuadtreePartitioner::new(p, pixels, leaf_coding)
                    .encode_slice_data(cabac)
                    .finalize();
                NalUnit::new(NalHeader::hevc(header.nal_type()), rbsp)
            }
            SequenceParams::Avc(p) => {
                let header = AvcSliceHeader {
                    idr,
                    frame_num: self.frames_since_idr,
                    idr_pic_id: self.idr_pic_id,
                };
                header.write(&mut writer, p);
                let rbsp = MacroblockWriter::new(p, pixels, leaf_coding)
                    .encode_slice_data(writer)
                    .finalize();
                NalUnit::new(NalHeader::avc(header.nal_type()), rbsp)
            }
        }
    }

    pub fn receive_packet(&mut self) -> Option<Packet> {
        self.pending_packet.take()
    }

    /// Every frame is emitted as soon as it is sent; nothing is buffered.
    pub fn flush(&mut self) {}
}

fn level_idc_of(params: &SequenceParams) -> u8 {
    match params {
        SequenceParams::Avc(p) => p.level_idc,
        SequenceParams::Hevc(p) => p.level_idc,
    }
}
