use thiserror::Error;

use crate::fps::FpsError;
use crate::video::{BitDepth, ChromaFormat, Codec};

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("invalid dimensions {width}x{height}: width and height must be 1..=8192")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("odd dimensions {width}x{height}: 4:2:0 output needs even width and height")]
    OddDimensions { width: u32, height: u32 },

    #[error("unsupported format {chroma_format} at {} bits: only 4:2:0 8-bit is supported", .bit_depth.bits())]
    UnsupportedFormat {
        chroma_format: ChromaFormat,
        bit_depth: BitDepth,
    },

    #[error("HEVC slices are always CABAC coded; CAVLC is H.264 only")]
    UnsupportedEntropyCoding,

    #[error(
        "invalid coding tree: log2 CTU size {log2_ctu_size} must be 4..=6 and log2 min CB size {log2_min_cb_size} must be 3..=min(ctu, 5)"
    )]
    InvalidCodingTree { log2_ctu_size: u8, log2_min_cb_size: u8 },

    #[error("GOP size must be at least 1")]
    InvalidGopSize,

    #[error("QP {0} out of range 0..=51")]
    InvalidQp(u8),

    #[error("level_idc {level} cannot carry {width}x{height} at the configured frame rate")]
    LevelTooLow { level: u8, width: u32, height: u32 },

    #[error("no {codec} level admits {width}x{height} at the configured frame rate")]
    NoLevel { codec: Codec, width: u32, height: u32 },

    #[error("frame dimension mismatch: expected {expected_w}x{expected_h}, got {got_w}x{got_h}")]
    DimensionMismatch {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error("pixel buffer holds {got} bytes, expected {expected}")]
    PixelBufferSize { expected: usize, got: usize },

    #[error(transparent)]
    Fps(#[from] FpsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_offending_values() {
        let err = EncoderError::InvalidDimensions {
            width: 0,
            height: 64,
        };
        assert!(err.to_string().contains("0x64"));

        let err = EncoderError::UnsupportedFormat {
            chroma_format: ChromaFormat::Yuv444,
            bit_depth: BitDepth::Ten,
        };
        assert_eq!(
            err.to_string(),
            "unsupported format 4:4:4 at 10 bits: only 4:2:0 8-bit is supported"
        );
    }

    #[test]
    fn fps_errors_convert() {
        let err: EncoderError = FpsError::ZeroDen.into();
        assert!(matches!(err, EncoderError::Fps(FpsError::ZeroDen)));
        assert_eq!(err.to_string(), "fps den must be > 0");
    }
}
