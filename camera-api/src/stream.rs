//! Stream profile types shared by every brand

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ApiError;

/// Which of the two camera streams a request concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Main,
    Sub,
}

impl StreamType {
    pub const ALL: [StreamType; 2] = [StreamType::Main, StreamType::Sub];

    pub fn index(self) -> usize {
        match self {
            StreamType::Main => 0,
            StreamType::Sub => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoCodec {
    Mjpeg,
    #[default]
    H264,
    H265,
    Mpeg4,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "MJPEG",
            VideoCodec::H264 => "H.264",
            VideoCodec::H265 => "H.265",
            VideoCodec::Mpeg4 => "MPEG4",
        }
    }
}

impl FromStr for VideoCodec {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "MJPEG" | "MJPG" | "JPEG" => Ok(VideoCodec::Mjpeg),
            "H264" | "AVC" => Ok(VideoCodec::H264),
            "H265" | "HEVC" => Ok(VideoCodec::H265),
            "MPEG4" => Ok(VideoCodec::Mpeg4),
            _ => Err(ApiError::ParseError(format!("unknown codec '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitRateMode {
    #[default]
    Constant,
    Variable,
}

impl FromStr for BitRateMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CBR" | "0" => Ok(BitRateMode::Constant),
            "VBR" | "1" => Ok(BitRateMode::Variable),
            other => Err(ApiError::ParseError(format!("unknown bitrate mode '{other}'"))),
        }
    }
}

/// Bitrates the NVR offers, in kbps
const BIT_RATE_TABLE: [u32; 16] = [
    32, 64, 128, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096, 6144, 8192, 12288, 16384,
];

/// Enumerated bitrate domain
///
/// Cameras report free-form kbps values; the NVR stores the nearest table
/// entry that does not exceed the reported rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitRate(u8);

impl BitRate {
    pub const MIN: BitRate = BitRate(0);
    pub const MAX: BitRate = BitRate(15);

    pub fn from_kbps(kbps: u32) -> Self {
        let index = BIT_RATE_TABLE
            .iter()
            .rposition(|&rate| rate <= kbps)
            .unwrap_or(0);
        // Table has 16 entries
        BitRate(index as u8)
    }

    pub fn kbps(self) -> u32 {
        BIT_RATE_TABLE[usize::from(self.0).min(BIT_RATE_TABLE.len() - 1)]
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::from_kbps(2048)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X', '*'])
            .ok_or_else(|| ApiError::ParseError(format!("bad resolution '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .map_err(|_| ApiError::ParseError(format!("bad resolution '{s}'")))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// Encoder settings of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub codec: VideoCodec,
    pub resolution: Resolution,
    pub frame_rate: u8,
    /// 1 (lowest) ..= 5 (highest)
    pub quality: u8,
    pub bit_rate_mode: BitRateMode,
    pub bit_rate: BitRate,
    pub gop: u16,
    pub audio: bool,
}

impl StreamProfile {
    /// Defaults the NVR falls back to for a main stream
    pub fn main_defaults() -> Self {
        Self {
            codec: VideoCodec::H264,
            resolution: Resolution::new(1920, 1080),
            frame_rate: 25,
            quality: 4,
            bit_rate_mode: BitRateMode::Constant,
            bit_rate: BitRate::from_kbps(4096),
            gop: 50,
            audio: false,
        }
    }

    /// Defaults the NVR falls back to for a sub stream
    pub fn sub_defaults() -> Self {
        Self {
            codec: VideoCodec::H264,
            resolution: Resolution::new(640, 360),
            frame_rate: 15,
            quality: 3,
            bit_rate_mode: BitRateMode::Variable,
            bit_rate: BitRate::from_kbps(512),
            gop: 30,
            audio: false,
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.frame_rate == 0 || self.frame_rate > 60 {
            return Err(ApiError::InvalidParameter(format!(
                "frame rate {} outside 1..=60",
                self.frame_rate
            )));
        }
        if !(1..=5).contains(&self.quality) {
            return Err(ApiError::InvalidParameter(format!(
                "quality {} outside 1..=5",
                self.quality
            )));
        }
        if self.gop == 0 {
            return Err(ApiError::InvalidParameter("gop must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Settings of both streams of a camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub main: StreamProfile,
    pub sub: StreamProfile,
}

impl StreamConfig {
    pub fn profile(&self, stream: StreamType) -> &StreamProfile {
        match stream {
            StreamType::Main => &self.main,
            StreamType::Sub => &self.sub,
        }
    }

    pub fn profile_mut(&mut self, stream: StreamType) -> &mut StreamProfile {
        match stream {
            StreamType::Main => &mut self.main,
            StreamType::Sub => &mut self.sub,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            main: StreamProfile::main_defaults(),
            sub: StreamProfile::sub_defaults(),
        }
    }
}
