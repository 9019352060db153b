use std::io::{self, Write};

use tracing::debug;

use crate::fps::Fps;
use crate::nal::{AvcNalType, HevcNalType, NalHeader, NalUnit};
use crate::packet::Packet;
use crate::video::{ChromaFormat, Codec};

/// Everything the sample entry needs: picture size, timing and the
/// parameter sets that go into `avcC`/`hvcC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Config {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub chroma_format: ChromaFormat,
    pub parameter_sets: Vec<NalUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Sample {
    /// Length-prefixed NAL units.
    pub data: Vec<u8>,
    pub is_sync: bool,
}

/// Collects samples in memory and lays out the whole file on
/// [`finalize`](Mp4Muxer::finalize).
#[derive(Debug)]
pub struct Mp4Muxer {
    config: Mp4Config,
    samples: Vec<Mp4Sample>,
}

impl Mp4Muxer {
    pub fn new(config: Mp4Config) -> Self {
        Self {
            config,
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, data: Vec<u8>, is_sync: bool) {
        self.samples.push(Mp4Sample { data, is_sync });
    }

    /// Appends an encoded picture. In-band parameter sets are dropped since
    /// the sample entry already carries them.
    pub fn add_packet(&mut self, packet: &Packet) {
        self.add_sample(packet.sample_data(), packet.is_keyframe());
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn finalize(self) -> Vec<u8> {
        build_file(&self.config, &self.samples)
    }
}

pub fn write_mp4<W: Write>(
    w: &mut W,
    config: &Mp4Config,
    samples: &[Mp4Sample],
) -> io::Result<()> {
    w.write_all(&build_file(config, samples))
}

fn build_file(config: &Mp4Config, samples: &[Mp4Sample]) -> Vec<u8> {
    let ftyp = build_ftyp(config.codec);

    let payload_len: u64 = samples.iter().map(|s| s.data.len() as u64).sum();
    let mdat_header = build_mdat_header(payload_len);

    // ftyp is complete before any offset is known, so the sample data starts
    // right after it and the mdat header.
    let data_offset = (ftyp.len() + mdat_header.len()) as u64;
    let offsets = chunk_offsets(samples, data_offset);
    let moov = build_moov(config, samples, &offsets);

    debug!(
        samples = samples.len(),
        mdat_bytes = payload_len,
        co64 = needs_co64(&offsets),
        "finalized mp4"
    );

    let mut out =
        Vec::with_capacity(ftyp.len() + mdat_header.len() + payload_len as usize + moov.len());
    out.extend_from_slice(&ftyp);
    out.extend_from_slice(&mdat_header);
    for s in samples {
        out.extend_from_slice(&s.data);
    }
    out.extend_from_slice(&moov);
    out
}

fn box_wrap(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (8 + payload.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

fn full_box(box_type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(4 + payload.len());
    inner.push(version);
    inner.extend_from_slice(&flags.to_be_bytes()[1..4]);
    inner.extend_from_slice(payload);
    box_wrap(box_type, &inner)
}

fn build_ftyp(codec: Codec) -> Vec<u8> {
    let compatible: &[&[u8; 4]] = match codec {
        Codec::H264 => &[b"isom", b"iso2", b"avc1", b"mp41"],
        Codec::Hevc => &[b"isom", b"iso6", b"mp41"],
    };
    let mut p = Vec::new();
    p.extend_from_slice(b"isom");
    p.extend_from_slice(&512u32.to_be_bytes());
    for brand in compatible {
        p.extend_from_slice(*brand);
    }
    box_wrap(b"ftyp", &p)
}

/// `mdat` header only; the payload is streamed after it. Switches to the
/// 64-bit `largesize` form when the box would not fit a 32-bit size.
fn build_mdat_header(payload_len: u64) -> Vec<u8> {
    let size = 8 + payload_len;
    match u32::try_from(size) {
        Ok(size) => {
            let mut out = Vec::with_capacity(8);
            out.extend_from_slice(&size.to_be_bytes());
            out.extend_from_slice(b"mdat");
            out
        }
        Err(_) => {
            let mut out = Vec::with_capacity(16);
            out.extend_from_slice(&1u32.to_be_bytes());
            out.extend_from_slice(b"mdat");
            out.extend_from_slice(&(size + 8).to_be_bytes());
            out
        }
    }
}

/// One chunk per sample, so every sample has its own offset.
fn chunk_offsets(samples: &[Mp4Sample], data_offset: u64) -> Vec<u64> {
    samples
        .iter()
        .scan(data_offset, |next, s| {
            let offset = *next;
            *next += s.data.len() as u64;
            Some(offset)
        })
        .collect()
}

fn needs_co64(offsets: &[u64]) -> bool {
    offsets.last().is_some_and(|&o| o > u32::MAX as u64)
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn build_moov(config: &Mp4Config, samples: &[Mp4Sample], offsets: &[u64]) -> Vec<u8> {
    let num_samples = samples.len() as u64;
    let media_duration = num_samples * config.fps.den as u64;
    let total_ms = (media_duration * 1000) / config.fps.num.max(1) as u64;

    let mvhd = build_mvhd(saturate_u32(total_ms));
    let trak = build_trak(
        config,
        samples,
        offsets,
        saturate_u32(media_duration),
        saturate_u32(total_ms),
    );

    let mut payload = Vec::new();
    payload.extend_from_slice(&mvhd);
    payload.extend_from_slice(&trak);
    box_wrap(b"moov", &payload)
}

#[rustfmt::skip]
const UNITY_MATRIX: [u32; 9] = [
    0x00010000, 0, 0,
    0, 0x00010000, 0,
    0, 0, 0x40000000,
];

fn build_mvhd(duration_ms: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&1000u32.to_be_bytes());
    p.extend_from_slice(&duration_ms.to_be_bytes());
    p.extend_from_slice(&0x00010000u32.to_be_bytes());
    p.extend_from_slice(&0x0100u16.to_be_bytes());
    p.extend_from_slice(&[0u8; 10]);
    for m in &UNITY_MATRIX {
        p.extend_from_slice(&m.to_be_bytes());
    }
    p.extend_from_slice(&[0u8; 24]);
    p.extend_from_slice(&2u32.to_be_bytes()); // next_track_ID
    full_box(b"mvhd", 0, 0, &p)
}

fn build_trak(
    config: &Mp4Config,
    samples: &[Mp4Sample],
    offsets: &[u64],
    media_duration: u32,
    duration_ms: u32,
) -> Vec<u8> {
    let tkhd = build_tkhd(config, duration_ms);
    let edts = build_edts(duration_ms);
    let mdia = build_mdia(config, samples, offsets, media_duration);

    let mut payload = Vec::new();
    payload.extend_from_slice(&tkhd);
    payload.extend_from_slice(&edts);
    payload.extend_from_slice(&mdia);
    box_wrap(b"trak", &payload)
}

fn build_tkhd(config: &Mp4Config, duration_ms: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&1u32.to_be_bytes()); // track_ID
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&duration_ms.to_be_bytes());
    p.extend_from_slice(&[0u8; 8]);
    p.extend_from_slice(&0u16.to_be_bytes()); // layer
    p.extend_from_slice(&0u16.to_be_bytes()); // alternate_group
    p.extend_from_slice(&0u16.to_be_bytes()); // volume
    p.extend_from_slice(&0u16.to_be_bytes());
    for m in &UNITY_MATRIX {
        p.extend_from_slice(&m.to_be_bytes());
    }
    p.extend_from_slice(&(config.width << 16).to_be_bytes());
    p.extend_from_slice(&(config.height << 16).to_be_bytes());
    full_box(b"tkhd", 0, 3, &p)
}

fn build_edts(duration_ms: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&duration_ms.to_be_bytes());
    p.extend_from_slice(&0i32.to_be_bytes());
    p.extend_from_slice(&0x00010000u32.to_be_bytes());
    let elst = full_box(b"elst", 0, 0, &p);
    box_wrap(b"edts", &elst)
}

fn build_mdia(
    config: &Mp4Config,
    samples: &[Mp4Sample],
    offsets: &[u64],
    media_duration: u32,
) -> Vec<u8> {
    let mdhd = build_mdhd(config.fps.num, media_duration);
    let hdlr = build_hdlr();
    let minf = build_minf(config, samples, offsets);

    let mut payload = Vec::new();
    payload.extend_from_slice(&mdhd);
    payload.extend_from_slice(&hdlr);
    payload.extend_from_slice(&minf);
    box_wrap(b"mdia", &payload)
}

fn build_mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&timescale.to_be_bytes());
    p.extend_from_slice(&duration.to_be_bytes());
    p.extend_from_slice(&0x55C4u16.to_be_bytes()); // "und"
    p.extend_from_slice(&0u16.to_be_bytes());
    full_box(b"mdhd", 0, 0, &p)
}

fn build_hdlr() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"vide");
    p.extend_from_slice(&[0u8; 12]);
    p.extend_from_slice(b"VideoHandler\0");
    full_box(b"hdlr", 0, 0, &p)
}

fn build_minf(config: &Mp4Config, samples: &[Mp4Sample], offsets: &[u64]) -> Vec<u8> {
    let vmhd = full_box(b"vmhd", 0, 1, &[0u8; 8]);
    let dinf = build_dinf();
    let stbl = build_stbl(config, samples, offsets);

    let mut payload = Vec::new();
    payload.extend_from_slice(&vmhd);
    payload.extend_from_slice(&dinf);
    payload.extend_from_slice(&stbl);
    box_wrap(b"minf", &payload)
}

fn build_dinf() -> Vec<u8> {
    let url = full_box(b"url ", 0, 1, &[]);

    let mut dref_payload = Vec::new();
    dref_payload.extend_from_slice(&1u32.to_be_bytes());
    dref_payload.extend_from_slice(&url);
    let dref = full_box(b"dref", 0, 0, &dref_payload);

    box_wrap(b"dinf", &dref)
}

fn build_stbl(config: &Mp4Config, samples: &[Mp4Sample], offsets: &[u64]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&build_stsd(config));
    payload.extend_from_slice(&build_stts(samples.len() as u32, config.fps.den));
    payload.extend_from_slice(&build_stsc(samples.len() as u32));
    payload.extend_from_slice(&build_stsz(samples));
    payload.extend_from_slice(&build_chunk_offset_box(offsets));
    payload.extend_from_slice(&build_stss(samples));
    box_wrap(b"stbl", &payload)
}

fn build_stsd(config: &Mp4Config) -> Vec<u8> {
    let entry = build_visual_sample_entry(config);

    let mut p = Vec::new();
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&entry);
    full_box(b"stsd", 0, 0, &p)
}

/// `avc1` or `hvc1`: parameter sets live only in the configuration record.
fn build_visual_sample_entry(config: &Mp4Config) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&[0u8; 6]);
    p.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    p.extend_from_slice(&[0u8; 16]);
    p.extend_from_slice(&(config.width as u16).to_be_bytes());
    p.extend_from_slice(&(config.height as u16).to_be_bytes());
    p.extend_from_slice(&0x00480000u32.to_be_bytes());
    p.extend_from_slice(&0x00480000u32.to_be_bytes());
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    p.extend_from_slice(&[0u8; 32]);
    p.extend_from_slice(&0x0018u16.to_be_bytes());
    p.extend_from_slice(&0xFFFFu16.to_be_bytes());

    let entry_type = match config.codec {
        Codec::H264 => {
            p.extend_from_slice(&build_avcc(&config.parameter_sets));
            b"avc1"
        }
        Codec::Hevc => {
            p.extend_from_slice(&build_hvcc(&config.parameter_sets, config.chroma_format));
            b"hvc1"
        }
    };
    p.extend_from_slice(&build_pasp());

    box_wrap(entry_type, &p)
}

fn avc_nal<'a>(units: &'a [NalUnit], wanted: AvcNalType) -> impl Iterator<Item = &'a NalUnit> {
    units
        .iter()
        .filter(move |n| matches!(n.header, NalHeader::Avc { nal_type, .. } if nal_type == wanted))
}

fn hevc_nal<'a>(units: &'a [NalUnit], wanted: HevcNalType) -> impl Iterator<Item = &'a NalUnit> {
    units
        .iter()
        .filter(move |n| matches!(n.header, NalHeader::Hevc { nal_type, .. } if nal_type == wanted))
}

fn push_nal_with_len(p: &mut Vec<u8>, nal: &NalUnit) {
    let bytes = nal.to_bytes();
    p.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    p.extend_from_slice(&bytes);
}

/// AVCDecoderConfigurationRecord.
fn build_avcc(parameter_sets: &[NalUnit]) -> Vec<u8> {
    let sps: Vec<&NalUnit> = avc_nal(parameter_sets, AvcNalType::Sps).collect();
    let pps: Vec<&NalUnit> = avc_nal(parameter_sets, AvcNalType::Pps).collect();
    // profile_idc, constraint flags and level_idc open the SPS.
    let profile = sps
        .first()
        .and_then(|s| s.rbsp.get(..3))
        .unwrap_or(&[0, 0, 0]);

    let mut p = Vec::new();
    p.push(1);
    p.extend_from_slice(profile);
    p.push(0xFC | 3); // lengthSizeMinusOne
    p.push(0xE0 | sps.len() as u8);
    for nal in &sps {
        push_nal_with_len(&mut p, nal);
    }
    p.push(pps.len() as u8);
    for nal in &pps {
        push_nal_with_len(&mut p, nal);
    }
    box_wrap(b"avcC", &p)
}

/// HEVCDecoderConfigurationRecord.
fn build_hvcc(parameter_sets: &[NalUnit], chroma_format: ChromaFormat) -> Vec<u8> {
    // The general profile_tier_level follows the first SPS byte.
    let ptl = hevc_nal(parameter_sets, HevcNalType::Sps)
        .next()
        .and_then(|s| s.rbsp.get(1..13))
        .unwrap_or(&[0; 12]);

    let mut p = Vec::new();
    p.push(1);
    p.extend_from_slice(ptl);
    p.extend_from_slice(&0xF000u16.to_be_bytes()); // min_spatial_segmentation_idc 0
    p.push(0xFC); // parallelismType 0
    p.push(0xFC | chroma_format.idc());
    p.push(0xF8); // bit_depth_luma_minus8
    p.push(0xF8); // bit_depth_chroma_minus8
    p.extend_from_slice(&0u16.to_be_bytes()); // avgFrameRate
    // numTemporalLayers 1, temporalIdNested 1, lengthSizeMinusOne 3.
    p.push(0x0F);

    let types = [HevcNalType::Vps, HevcNalType::Sps, HevcNalType::Pps];
    p.push(types.len() as u8);
    for nal_type in types {
        let units: Vec<&NalUnit> = hevc_nal(parameter_sets, nal_type).collect();
        p.push(0x80 | nal_type as u8); // array_completeness
        p.extend_from_slice(&(units.len() as u16).to_be_bytes());
        for nal in units {
            push_nal_with_len(&mut p, nal);
        }
    }
    box_wrap(b"hvcC", &p)
}

fn build_pasp() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&1u32.to_be_bytes());
    box_wrap(b"pasp", &p)
}

fn build_stts(num_samples: u32, sample_delta: u32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&1u32.to_be_bytes());
    p.extend_from_slice(&num_samples.to_be_bytes());
    p.extend_from_slice(&sample_delta.to_be_bytes());
    full_box(b"stts", 0, 0, &p)
}

fn build_stsc(num_samples: u32) -> Vec<u8> {
    let mut p = Vec::new();
    if num_samples == 0 {
        p.extend_from_slice(&0u32.to_be_bytes());
    } else {
        p.extend_from_slice(&1u32.to_be_bytes());
        p.extend_from_slice(&1u32.to_be_bytes()); // first_chunk
        p.extend_from_slice(&1u32.to_be_bytes()); // samples_per_chunk
        p.extend_from_slice(&1u32.to_be_bytes()); // sample_description_index
    }
    full_box(b"stsc", 0, 0, &p)
}

fn build_stsz(samples: &[Mp4Sample]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for s in samples {
        p.extend_from_slice(&(s.data.len() as u32).to_be_bytes());
    }
    full_box(b"stsz", 0, 0, &p)
}

/// `stco`, or `co64` once any offset needs more than 32 bits.
fn build_chunk_offset_box(offsets: &[u64]) -> Vec<u8> {
    let wide = needs_co64(offsets);
    let mut p = Vec::with_capacity(4 + offsets.len() * if wide { 8 } else { 4 });
    p.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for &offset in offsets {
        if wide {
            p.extend_from_slice(&offset.to_be_bytes());
        } else {
            p.extend_from_slice(&(offset as u32).to_be_bytes());
        }
    }
    full_box(if wide { b"co64" } else { b"stco" }, 0, 0, &p)
}

fn build_stss(samples: &[Mp4Sample]) -> Vec<u8> {
    let sync_indices: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_sync)
        .map(|(i, _)| (i + 1) as u32)
        .collect();

    let mut p = Vec::new();
    p.extend_from_slice(&(sync_indices.len() as u32).to_be_bytes());
    for idx in &sync_indices {
        p.extend_from_slice(&idx.to_be_bytes());
    }
    full_box(b"stss", 0, 0, &p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Encoder, EncoderConfig};

    fn read_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_be_bytes(buf[at..at + 4].try_into().unwrap())
    }

    /// Payload of the first box at `path`, descending through containers.
    fn find_box<'a>(mut buf: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
        for (depth, name) in path.iter().enumerate() {
            let mut found = None;
            let mut pos = 0;
            while pos + 8 <= buf.len() {
                let size = read_u32(buf, pos) as usize;
                if &buf[pos + 4..pos + 8] == *name {
                    found = Some(&buf[pos + 8..pos + size]);
                    break;
                }
                pos += size;
            }
            buf = found?;
            // stsd and the sample entries have fixed headers before children.
            if depth + 1 < path.len() {
                buf = match *name {
                    b"stsd" => &buf[8..],
                    b"avc1" | b"hvc1" => &buf[78..],
                    _ => buf,
                };
            }
        }
        Some(buf)
    }

    fn config(codec: Codec) -> Mp4Config {
        let mut enc_config = EncoderConfig::new(64, 64);
        enc_config.codec = codec;
        Encoder::new(enc_config).unwrap().mp4_config()
    }

    fn samples(sizes: &[usize]) -> Vec<Mp4Sample> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| Mp4Sample {
                data: vec![i as u8; len],
                is_sync: i % 2 == 0,
            })
            .collect()
    }

    #[test]
    fn ftyp_brands() {
        let avc = build_ftyp(Codec::H264);
        assert_eq!(avc.len(), 32);
        assert_eq!(&avc[0..4], &32u32.to_be_bytes());
        assert_eq!(&avc[4..8], b"ftyp");
        assert_eq!(&avc[8..12], b"isom");
        assert_eq!(&avc[16..32], b"isomiso2avc1mp41");

        let hevc = build_ftyp(Codec::Hevc);
        assert_eq!(hevc.len(), 28);
        assert_eq!(&hevc[16..28], b"isomiso6mp41");
    }

    #[test]
    fn write_mp4_produces_valid_boxes() {
        let config = config(Codec::Hevc);
        let samples = samples(&[10, 20]);

        let mut buf = Vec::new();
        write_mp4(&mut buf, &config, &samples).unwrap();

        assert_eq!(&buf[4..8], b"ftyp");
        let mdat_offset = 28;
        assert_eq!(&buf[mdat_offset + 4..mdat_offset + 8], b"mdat");
        let mdat_size = read_u32(&buf, mdat_offset) as usize;
        assert_eq!(mdat_size, 8 + 30);
        let moov_offset = mdat_offset + mdat_size;
        assert_eq!(&buf[moov_offset + 4..moov_offset + 8], b"moov");
        assert_eq!(read_u32(&buf, moov_offset) as usize, buf.len() - moov_offset);
    }

    #[test]
    fn chunk_offsets_follow_sample_sizes() {
        let sizes = [100, 7, 3000, 1];
        let mut muxer = Mp4Muxer::new(config(Codec::H264));
        for s in samples(&sizes) {
            muxer.add_sample(s.data, s.is_sync);
        }
        assert_eq!(muxer.sample_count(), 4);
        let buf = muxer.finalize();

        let mdat_offset = 32u32;
        let stco = find_box(&buf, &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stco"]).unwrap();
        assert_eq!(read_u32(stco, 4), sizes.len() as u32);
        let mut expected = mdat_offset + 8;
        for (i, &len) in sizes.iter().enumerate() {
            let offset = read_u32(stco, 8 + i * 4);
            assert_eq!(offset, expected);
            assert_eq!(buf[offset as usize], i as u8);
            expected += len as u32;
        }

        let stsz = find_box(&buf, &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stsz"]).unwrap();
        assert_eq!(read_u32(stsz, 8), 4);
        assert_eq!(read_u32(stsz, 12 + 2 * 4), 3000);
    }

    #[test]
    fn stss_lists_sync_samples() {
        let buf = build_file(&config(Codec::Hevc), &samples(&[5, 5, 5, 5, 5]));
        let stss = find_box(&buf, &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stss"]).unwrap();
        assert_eq!(read_u32(stss, 4), 3);
        assert_eq!(read_u32(stss, 8), 1);
        assert_eq!(read_u32(stss, 12), 3);
        assert_eq!(read_u32(stss, 16), 5);
    }

    #[test]
    fn large_offsets_switch_to_co64() {
        let offsets = [40, 1 << 31, (1u64 << 32) + 5];
        let boxed = build_chunk_offset_box(&offsets);
        assert_eq!(&boxed[4..8], b"co64");
        assert_eq!(boxed.len(), 16 + 3 * 8);
        assert_eq!(&boxed[32..40], &((1u64 << 32) + 5).to_be_bytes());

        let boxed = build_chunk_offset_box(&offsets[..2]);
        assert_eq!(&boxed[4..8], b"stco");
        assert_eq!(boxed.len(), 16 + 2 * 4);
    }

    #[test]
    fn mdat_header_uses_largesize_when_needed() {
        assert_eq!(build_mdat_header(100), [0, 0, 0, 108, b'm', b'd', b'a', b't']);
        let large = build_mdat_header(u32::MAX as u64);
        assert_eq!(large.len(), 16);
        assert_eq!(&large[0..8], &[0, 0, 0, 1, b'm', b'd', b'a', b't']);
        assert_eq!(&large[8..16], &(u32::MAX as u64 + 16).to_be_bytes());
    }

    #[test]
    fn avcc_record_layout() {
        let config = config(Codec::H264);
        let buf = build_file(&config, &samples(&[4]));
        let avcc = find_box(
            &buf,
            &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stsd", b"avc1", b"avcC"],
        )
        .unwrap();

        let sps = config.parameter_sets[0].to_bytes();
        let pps = config.parameter_sets[1].to_bytes();
        assert_eq!(avcc[0], 1);
        assert_eq!(&avcc[1..4], &config.parameter_sets[0].rbsp[..3]);
        assert_eq!(avcc[4], 0xFF);
        assert_eq!(avcc[5], 0xE1);
        assert_eq!(avcc[6..8], (sps.len() as u16).to_be_bytes());
        assert_eq!(&avcc[8..8 + sps.len()], sps.as_slice());
        let rest = &avcc[8 + sps.len()..];
        assert_eq!(rest[0], 1);
        assert_eq!(&rest[3..], pps.as_slice());
    }

    #[test]
    fn hvcc_record_layout() {
        let config = config(Codec::Hevc);
        let buf = build_file(&config, &samples(&[4]));
        let hvcc = find_box(
            &buf,
            &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stsd", b"hvc1", b"hvcC"],
        )
        .unwrap();

        assert_eq!(hvcc[0], 1);
        assert_eq!(&hvcc[1..13], &crate::hevc::profile_tier_level(30));
        assert_eq!(&hvcc[13..22], &[0xF0, 0x00, 0xFC, 0xFD, 0xF8, 0xF8, 0, 0, 0x0F]);
        assert_eq!(hvcc[22], 3);

        let mut pos = 23;
        for (nal, nal_type) in config.parameter_sets.iter().zip([32u8, 33, 34]) {
            let bytes = nal.to_bytes();
            assert_eq!(hvcc[pos], 0x80 | nal_type);
            assert_eq!(&hvcc[pos + 1..pos + 3], &[0, 1]);
            assert_eq!(hvcc[pos + 3..pos + 5], (bytes.len() as u16).to_be_bytes());
            assert_eq!(&hvcc[pos + 5..pos + 5 + bytes.len()], bytes.as_slice());
            pos += 5 + bytes.len();
        }
        assert_eq!(pos, hvcc.len());
    }

    #[test]
    fn hvcc_chroma_format_follows_config() {
        let mut config = config(Codec::Hevc);
        config.chroma_format = ChromaFormat::Monochrome;
        let hvcc = build_hvcc(&config.parameter_sets, config.chroma_format);
        assert_eq!(hvcc[8 + 16], 0xFC);
    }

    #[test]
    fn timing_follows_frame_rate() {
        let mut config = config(Codec::Hevc);
        config.fps = Fps::new(30000, 1001).unwrap();
        let buf = build_file(&config, &samples(&[1, 1, 1]));

        let mdhd = find_box(&buf, &[b"moov", b"trak", b"mdia", b"mdhd"]).unwrap();
        assert_eq!(read_u32(mdhd, 12), 30000);
        assert_eq!(read_u32(mdhd, 16), 3 * 1001);

        let stts = find_box(&buf, &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stts"]).unwrap();
        assert_eq!(read_u32(stts, 8), 3);
        assert_eq!(read_u32(stts, 12), 1001);

        let mvhd = find_box(&buf, &[b"moov", b"mvhd"]).unwrap();
        assert_eq!(read_u32(mvhd, 16), 100);
    }

    #[test]
    fn empty_movie_is_well_formed() {
        let buf = Mp4Muxer::new(config(Codec::H264)).finalize();
        assert_eq!(read_u32(&buf, 32), 8);
        let stco = find_box(&buf, &[b"moov", b"trak", b"mdia", b"minf", b"stbl", b"stco"]).unwrap();
        assert_eq!(read_u32(stco, 4), 0);
    }
}
