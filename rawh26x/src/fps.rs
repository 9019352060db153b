use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FpsError {
    #[error("fps num must be > 0")]
    ZeroNum,
    #[error("fps den must be > 0")]
    ZeroDen,
    #[error("invalid frame rate: {0}")]
    Parse(String),
}

impl Fps {
    pub fn new(num: u32, den: u32) -> Result<Self, FpsError> {
        if num == 0 {
            return Err(FpsError::ZeroNum);
        }
        if den == 0 {
            return Err(FpsError::ZeroDen);
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    pub fn from_int(fps: u32) -> Result<Self, FpsError> {
        Self::new(fps, 1)
    }

    /// Maps a decimal rate onto a rational, snapping to the NTSC rates.
    pub fn from_f64(fps: f64) -> Result<Self, FpsError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(FpsError::Parse(fps.to_string()));
        }
        let drop_frame = [
            (24_000u32, 1_001u32, 23.976),
            (30_000, 1_001, 29.97),
            (60_000, 1_001, 59.94),
        ];
        for (num, den, approx) in drop_frame {
            if (fps - approx).abs() < 0.01 {
                return Self::new(num, den);
            }
        }
        let rounded = fps.round();
        if (fps - rounded).abs() < 0.001 {
            return Self::new(rounded as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 25, den: 1 }
    }
}

impl FromStr for Fps {
    type Err = FpsError;

    /// Accepts `30`, `29.97` or `30000/1001`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_u32 = |v: &str| v.trim().parse::<u32>().map_err(|_| FpsError::Parse(s.to_owned()));
        if let Some((num, den)) = s.split_once('/') {
            return Self::new(parse_u32(num)?, parse_u32(den)?);
        }
        let value: f64 = s.trim().parse().map_err(|_| FpsError::Parse(s.to_owned()))?;
        Self::from_f64(value)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    if a == 0 { 1 } else { a }
}
