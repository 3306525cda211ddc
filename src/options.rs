// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{Error, Result},
    pixel::PixelFormat,
};

/// Every recognized decode option.
///
/// Limits are checked against the dimensions declared in the image header
/// before native code sees the data, and again against the codec's own probe
/// before the destination buffer is allocated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Upper bound on `width * height`.
    pub max_pixels: Option<u64>,
    pub output_format: PixelFormat,
    /// Frame to decode. The codec currently implements frame 0 only.
    pub frame_index: u32,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_width(mut self, max_width: u32) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn max_height(mut self, max_height: u32) -> Self {
        self.max_height = Some(max_height);
        self
    }

    pub fn max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = Some(max_pixels);
        self
    }

    pub fn output_format(mut self, output_format: PixelFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn frame_index(mut self, frame_index: u32) -> Self {
        self.frame_index = frame_index;
        self
    }

    /// Rejects limits that could never be satisfied.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == Some(0) {
            return Err(Error::invalid_input(None, "max_width must be positive"));
        }
        if self.max_height == Some(0) {
            return Err(Error::invalid_input(None, "max_height must be positive"));
        }
        if self.max_pixels == Some(0) {
            return Err(Error::invalid_input(None, "max_pixels must be positive"));
        }
        Ok(())
    }

    /// Checks declared dimensions against the limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let exceeded = |limit: String| Error::ResourceLimitExceeded {
            width: width as u64,
            height: height as u64,
            limit,
        };
        if let Some(max) = self.max_width {
            if width > max {
                return Err(exceeded(format!("max_width {max}")));
            }
        }
        if let Some(max) = self.max_height {
            if height > max {
                return Err(exceeded(format!("max_height {max}")));
            }
        }
        if let Some(max) = self.max_pixels {
            if width as u64 * height as u64 > max {
                return Err(exceeded(format!("max_pixels {max}")));
            }
        }
        Ok(())
    }
}
