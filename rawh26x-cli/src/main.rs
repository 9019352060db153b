#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rawh26x::{
    Codec, Encoder, EncoderConfig, EntropyCoding, FrameOptions, FramePixels, FrameType, Fps,
    LeafCoding, Mp4Muxer,
};

/// Encode raw RGBA frames, solid colours or a test pattern to H.264 or HEVC.
#[derive(Debug, Parser)]
#[command(name = "rawh26x", version, about)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "color", "pattern"])))]
struct Cli {
    /// Raw RGBA file holding one or more frames of `--width` x `--height`.
    input: Option<PathBuf>,

    /// Output path; `.mp4`/`.m4v` writes MP4, anything else an Annex-B stream.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, default_value_t = 64)]
    width: u32,

    #[arg(long, default_value_t = 64)]
    height: u32,

    /// Solid colour frames.
    #[arg(long, value_name = "R,G,B", value_delimiter = ',', num_args = 3)]
    color: Option<Vec<u8>>,

    /// Synthetic test pattern.
    #[arg(long, value_enum)]
    pattern: Option<Pattern>,

    /// Frames to encode; for file input, at most this many are read.
    #[arg(long)]
    frames: Option<usize>,

    #[arg(long, value_enum, default_value_t = CodecArg::Hevc)]
    codec: CodecArg,

    /// Frame rate: `25`, `29.97` or `30000/1001`.
    #[arg(long, default_value = "25")]
    fps: Fps,

    /// IDR interval in frames.
    #[arg(long, default_value_t = rawh26x::encoder::DEFAULT_GOP_SIZE)]
    gop: u32,

    #[arg(long, default_value_t = rawh26x::encoder::DEFAULT_QP)]
    qp: u8,

    /// level_idc override; derived from size and rate when omitted.
    #[arg(long)]
    level: Option<u8>,

    #[arg(long, value_enum, default_value_t = LeafArg::Pcm)]
    leaf: LeafArg,

    /// H.264 entropy coding.
    #[arg(long, value_enum, default_value_t = EntropyArg::Cabac)]
    entropy: EntropyArg,

    /// log2 of the HEVC CTU size.
    #[arg(long, default_value_t = 6)]
    ctu: u8,

    /// log2 of the HEVC minimum coding block size.
    #[arg(long, default_value_t = 3)]
    min_cb: u8,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    Grid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LeafArg {
    Pcm,
    Dc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EntropyArg {
    Cabac,
    Cavlc,
}

enum OutputFormat {
    AnnexB,
    Mp4,
}

fn detect_format(path: &Path) -> OutputFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => OutputFormat::Mp4,
        _ => OutputFormat::AnnexB,
    }
}

impl Cli {
    fn encoder_config(&self) -> EncoderConfig {
        let mut config = EncoderConfig::new(self.width, self.height);
        config.codec = match self.codec {
            CodecArg::H264 => Codec::H264,
            CodecArg::Hevc => Codec::Hevc,
        };
        config.fps = self.fps;
        config.gop_size = self.gop;
        config.qp = self.qp;
        config.level = self.level;
        config.leaf_coding = match self.leaf {
            LeafArg::Pcm => LeafCoding::Pcm,
            LeafArg::Dc => LeafCoding::IntraDc,
        };
        config.entropy_coding = match self.entropy {
            EntropyArg::Cabac => EntropyCoding::Cabac,
            EntropyArg::Cavlc => EntropyCoding::Cavlc,
        };
        config.log2_ctu_size = self.ctu;
        config.log2_min_cb_size = self.min_cb;
        config
    }

    fn load_frames(&self) -> Result<Vec<FramePixels>> {
        let (w, h) = (self.width, self.height);
        if let Some(path) = &self.input {
            let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let frame_len = w as usize * h as usize * 4;
            ensure!(frame_len > 0, "--width and --height must be non-zero");
            ensure!(
                !data.is_empty() && data.len() % frame_len == 0,
                "{} holds {} bytes, not a whole number of {w}x{h} RGBA frames",
                path.display(),
                data.len()
            );
            let count = self.frames.unwrap_or(usize::MAX);
            return data
                .chunks_exact(frame_len)
                .take(count)
                .enumerate()
                .map(|(i, rgba)| {
                    FramePixels::from_rgba(w, h, rgba)
                        .with_context(|| format!("converting frame {i}"))
                })
                .collect();
        }

        let count = self.frames.unwrap_or(1);
        if let Some(rgb) = &self.color {
            let frame = FramePixels::solid_rgb(w, h, rgb[0], rgb[1], rgb[2]);
            return Ok(vec![frame; count]);
        }
        match self.pattern {
            // Cells shift with the frame index so consecutive pictures differ.
            Some(Pattern::Grid) => Ok((0..count)
                .map(|i| FramePixels::grid(w, h, 16 + (i % 16) as u32))
                .collect()),
            None => bail!("no input: pass an RGBA file, --color or --pattern"),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let frames = cli.load_frames()?;
    ensure!(!frames.is_empty(), "no input frames");

    let config = cli.encoder_config();
    let mut encoder = Encoder::new(config.clone()).context("creating encoder")?;
    debug!(?config, level_idc = encoder.level_idc(), "encoder ready");

    let format = detect_format(&cli.output);
    let mut annex_b = Vec::new();
    let mut muxer = Mp4Muxer::new(encoder.mp4_config());
    let mut keyframes = 0;

    for frame in &frames {
        encoder
            .send_frame_with(frame, FrameOptions::default())
            .context("encoding frame")?;

        while let Some(packet) = encoder.receive_packet() {
            let frame_type = match packet.frame_type {
                FrameType::Key => "KEY",
                FrameType::Intra => "INTRA",
            };
            info!(
                "frame {:>4}  {:>5}  {} bytes",
                packet.frame_number,
                frame_type,
                packet.data.len()
            );
            keyframes += packet.is_keyframe() as usize;
            match format {
                OutputFormat::AnnexB => annex_b.extend_from_slice(&packet.data),
                OutputFormat::Mp4 => muxer.add_packet(&packet),
            }
        }
    }
    encoder.flush();

    let output = match format {
        OutputFormat::AnnexB => annex_b,
        OutputFormat::Mp4 => muxer.finalize(),
    };
    fs::write(&cli.output, &output)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    info!(
        "Wrote {} bytes to {} ({} {} frames, {} keyframes, {}x{}, level_idc={}, qp={})",
        output.len(),
        cli.output.display(),
        frames.len(),
        config.codec,
        keyframes,
        config.width,
        config.height,
        encoder.level_idc(),
        config.qp
    );
    Ok(())
}
