#![forbid(unsafe_code)]

pub mod avc;
pub mod bitwriter;
pub mod cabac;
pub mod context;
pub mod encoder;
pub mod error;
pub mod fps;
pub mod frame;
pub mod hevc;
pub mod macroblock;
pub mod mp4;
pub mod nal;
pub mod packet;
pub mod quadtree;
pub mod video;

pub use bitwriter::BitWriter;
pub use cabac::{CabacEncoder, PcmWriter};
pub use encoder::{Encoder, EncoderConfig, FrameOptions};
pub use error::EncoderError;
pub use fps::{Fps, FpsError};
pub use frame::FramePixels;
pub use mp4::{Mp4Config, Mp4Muxer};
pub use nal::{NalHeader, NalUnit};
pub use packet::{FrameType, Packet};
pub use video::{BitDepth, ChromaFormat, Codec, EntropyCoding, LeafCoding};

/// Encodes `frames` into an Annex-B elementary stream.
pub fn encode_annex_b(frames: &[FramePixels], config: &EncoderConfig) -> Result<Vec<u8>, EncoderError> {
    let mut enc = Encoder::new(config.clone())?;
    let mut output = Vec::new();

    for pixels in frames {
        enc.send_frame(pixels)?;
        while let Some(packet) = enc.receive_packet() {
            output.extend_from_slice(&packet.data);
        }
    }

    enc.flush();
    while let Some(packet) = enc.receive_packet() {
        output.extend_from_slice(&packet.data);
    }

    Ok(output)
}

/// Encodes `frames` into an MP4 file held in memory.
pub fn encode_mp4(frames: &[FramePixels], config: &EncoderConfig) -> Result<Vec<u8>, EncoderError> {
    let mut enc = Encoder::new(config.clone())?;
    let mut muxer = Mp4Muxer::new(enc.mp4_config());

    for pixels in frames {
        enc.send_frame(pixels)?;
        while let Some(packet) = enc.receive_packet() {
            muxer.add_packet(&packet);
        }
    }

    enc.flush();
    while let Some(packet) = enc.receive_packet() {
        muxer.add_packet(&packet);
    }

    Ok(muxer.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frames(n: usize) -> Vec<FramePixels> {
        (0..n).map(|_| FramePixels::solid(64, 64, 128, 128, 128)).collect()
    }

    #[test]
    fn annex_b_starts_with_parameter_sets() {
        let config = EncoderConfig::new(64, 64);
        let output = encode_annex_b(&gray_frames(1), &config).unwrap();
        let headers = Encoder::new(config).unwrap().headers_annex_b();
        assert!(output.starts_with(&headers));
        // VPS NAL header.
        assert_eq!(&output[..6], &[0, 0, 0, 1, 0x40, 0x01]);
    }

    #[test]
    fn annex_b_is_concatenation_of_packets() {
        let config = EncoderConfig::new(64, 64);
        let frames = gray_frames(3);
        let output = encode_annex_b(&frames, &config).unwrap();

        let mut enc = Encoder::new(config).unwrap();
        let mut expected = Vec::new();
        for frame in &frames {
            enc.send_frame(frame).unwrap();
            expected.extend(enc.receive_packet().unwrap().data);
        }
        assert_eq!(output, expected);
    }

    #[test]
    fn different_colors_produce_different_output() {
        let config = EncoderConfig::new(64, 64);
        let gray = encode_annex_b(&[FramePixels::solid(64, 64, 128, 128, 128)], &config).unwrap();
        let black = encode_annex_b(&[FramePixels::solid(64, 64, 16, 128, 128)], &config).unwrap();
        assert_ne!(gray, black);
        assert_eq!(gray.len(), black.len());
    }

    #[test]
    fn mismatched_frame_is_an_error() {
        let config = EncoderConfig::new(64, 64);
        let frames = [FramePixels::solid(64, 64, 0, 0, 0), FramePixels::solid(32, 32, 0, 0, 0)];
        assert!(matches!(
            encode_annex_b(&frames, &config),
            Err(EncoderError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn invalid_config_is_an_error() {
        let config = EncoderConfig::new(0, 64);
        assert!(encode_mp4(&gray_frames(1), &config).is_err());
    }

    #[test]
    fn mp4_holds_one_sample_per_frame() {
        let mut config = EncoderConfig::new(64, 64);
        config.codec = Codec::H264;
        config.leaf_coding = LeafCoding::IntraDc;
        let output = encode_mp4(&gray_frames(4), &config).unwrap();
        assert_eq!(&output[4..12], b"ftypisom");

        let mdat_size = u32::from_be_bytes(output[32..36].try_into().unwrap()) as usize;
        let mut enc = Encoder::new(config).unwrap();
        let mut payload = 0;
        for frame in gray_frames(4) {
            enc.send_frame(&frame).unwrap();
            payload += enc.receive_packet().unwrap().sample_data().len();
        }
        assert_eq!(mdat_size, 8 + payload);
    }
}
