//! Four-character codes and decoded pixel formats.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A four-character code packed big-endian into a `u32` (e.g. `avc1`, `2vuy`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc(pub u32);

impl FourCc {
    /// H.264 elementary stream with an `avcC` configuration record.
    pub const AVC1: Self = Self::from_bytes(*b"avc1");

    pub const fn from_bytes(code: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(code))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc('{self}')")
    }
}

impl TryFrom<String> for FourCc {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = value
            .as_bytes()
            .try_into()
            .map_err(|_| format!("four-character code must be 4 bytes, got {value:?}"))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl From<FourCc> for String {
    fn from(code: FourCc) -> Self {
        code.to_string()
    }
}

/// Pixel format of a decoded image buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 4:2:2 Cb Y'0 Cr Y'1 (`2vuy`), the hardware decoder's native output.
    #[default]
    Uyvy422,
    /// Packed 4:2:2 Y'0 Cb Y'1 Cr (`yuvs`).
    Yuyv422,
    /// Bi-planar 4:2:0, video range (`420v`).
    Nv12,
    /// 32-bit BGRA (`BGRA`).
    Bgra32,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCc {
        match self {
            Self::Uyvy422 => FourCc::from_bytes(*b"2vuy"),
            Self::Yuyv422 => FourCc::from_bytes(*b"yuvs"),
            Self::Nv12 => FourCc::from_bytes(*b"420v"),
            Self::Bgra32 => FourCc::from_bytes(*b"BGRA"),
        }
    }

    pub fn from_fourcc(code: FourCc) -> Option<Self> {
        [Self::Uyvy422, Self::Yuyv422, Self::Nv12, Self::Bgra32]
            .into_iter()
            .find(|format| format.fourcc() == code)
    }

    /// Size in bytes of one tightly packed image of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Uyvy422 | Self::Yuyv422 => w * h * 2,
            Self::Nv12 => w * h * 3 / 2,
            Self::Bgra32 => w * h * 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.fourcc())
    }
}
