// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, str::FromStr};
use wuffs_imageio_sys::WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL;

/// Layout of decoded pixels. Both are 8 bits per channel, non-premultiplied
/// alpha, four bytes per pixel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Blue, green, red, alpha. The native layout.
    #[default]
    Bgra8,
    /// Red, green, blue, alpha.
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    /// Native pixel format code requested from the codec for this layout.
    pub(crate) const fn native_code(self) -> u32 {
        // RGBA is swizzled on the host from the BGRA output
        WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Bgra8 => "bgra",
            PixelFormat::Rgba8 => "rgba",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bgra" | "bgra8" => Ok(PixelFormat::Bgra8),
            "rgba" | "rgba8" => Ok(PixelFormat::Rgba8),
            other => Err(format!("unknown pixel format '{other}'")),
        }
    }
}

/// Swaps the B and R channels of every pixel in the first `width` pixels of
/// each row, turning BGRA into RGBA and back.
pub fn swap_br_rows(buf: &mut [u8], stride: usize, width: usize) {
    let row_bytes = width * 4;
    for row in buf.chunks_mut(stride) {
        let end = row_bytes.min(row.len());
        for px in row[..end].chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
}
