//! Decoder session configuration.

use serde::{Deserialize, Serialize};

use crate::color::{FourCc, PixelFormat};

/// Configuration captured when a decoder session is created.
///
/// Immutable for the lifetime of the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub width: i32,
    pub height: i32,
    /// Pixel format the session expects decoded images in. Callbacks
    /// delivering any other format are dropped.
    pub pixel_format: PixelFormat,
    /// Compressed stream format handed to the platform decoder.
    #[serde(default = "default_source_format")]
    pub source_format: FourCc,
    /// Codec configuration record (e.g. `avcC` for H.264).
    #[serde(default)]
    pub extradata: Vec<u8>,
}

fn default_source_format() -> FourCc {
    FourCc::AVC1
}

impl DecoderConfig {
    pub fn new(width: i32, height: i32, pixel_format: PixelFormat, extradata: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixel_format,
            source_format: default_source_format(),
            extradata,
        }
    }

    pub fn with_source_format(mut self, source_format: FourCc) -> Self {
        self.source_format = source_format;
        self
    }

    /// Build the configuration payload passed to the platform decoder's `create`.
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            width: self.width,
            height: self.height,
            source_format: self.source_format,
            extradata: self.extradata.clone(),
        }
    }
}

/// Configuration payload understood by the platform decoder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub width: i32,
    pub height: i32,
    pub source_format: FourCc,
    pub extradata: Vec<u8>,
}
