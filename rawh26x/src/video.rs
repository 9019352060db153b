use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "H.264"),
            Codec::Hevc => write!(f, "HEVC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight = 8,
    Ten = 10,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    Monochrome = 0,
    Yuv420 = 1,
    Yuv422 = 2,
    Yuv444 = 3,
}

impl ChromaFormat {
    /// `chroma_format_idc` as signalled in the SPS.
    pub fn idc(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ChromaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChromaFormat::Monochrome => "4:0:0",
            ChromaFormat::Yuv420 => "4:2:0",
            ChromaFormat::Yuv422 => "4:2:2",
            ChromaFormat::Yuv444 => "4:4:4",
        };
        f.write_str(name)
    }
}

/// How each leaf coding block (HEVC CU or H.264 macroblock) is coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeafCoding {
    /// Raw samples.
    #[default]
    Pcm,
    /// DC intra prediction with no residual.
    IntraDc,
}

/// H.264 entropy coding mode. HEVC always uses CABAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntropyCoding {
    #[default]
    Cabac,
    Cavlc,
}
