// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Host-side header checks run before any data reaches native code.

use crate::error::{Error, Result};
use std::fmt;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Container formats the native codec recognizes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Detects the format from its magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&PNG_SIGNATURE) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&JPEG_SOI) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dimensions declared by the container header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeaderInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Reads format and declared dimensions without decoding.
///
/// Fails with [`Error::InvalidInput`] on empty, unrecognized or truncated
/// data and on zero dimensions; the offset points at the offending byte.
pub fn sniff(data: &[u8]) -> Result<HeaderInfo> {
    if data.is_empty() {
        return Err(Error::invalid_input(Some(0), "empty input"));
    }
    match ImageFormat::detect(data) {
        Some(ImageFormat::Png) => sniff_png(data),
        Some(ImageFormat::Jpeg) => sniff_jpeg(data),
        None => Err(Error::invalid_input(
            Some(0),
            "unrecognized image signature (expected PNG or JPEG)",
        )),
    }
}

// 8 byte signature, then IHDR: length (4), type (4), width (4), height (4)
fn sniff_png(data: &[u8]) -> Result<HeaderInfo> {
    if data.len() < 24 {
        return Err(truncated(data.len(), "PNG IHDR"));
    }
    if &data[12..16] != b"IHDR" {
        return Err(Error::invalid_input(Some(12), "first PNG chunk is not IHDR"));
    }
    let width = be_u32(&data[16..20]);
    let height = be_u32(&data[20..24]);
    if width == 0 {
        return Err(Error::invalid_input(Some(16), "PNG width is zero"));
    }
    if height == 0 {
        return Err(Error::invalid_input(Some(20), "PNG height is zero"));
    }
    Ok(HeaderInfo {
        format: ImageFormat::Png,
        width,
        height,
    })
}

fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

// Walks marker segments after SOI until the first SOFn.
fn sniff_jpeg(data: &[u8]) -> Result<HeaderInfo> {
    let mut pos = 2;
    loop {
        if pos >= data.len() {
            return Err(truncated(data.len(), "JPEG frame header"));
        }
        if data[pos] != 0xFF {
            return Err(Error::invalid_input(Some(pos), "expected JPEG marker"));
        }
        while pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            return Err(truncated(data.len(), "JPEG marker"));
        }
        let marker = data[pos + 1];
        let segment = pos + 2;

        match marker {
            0x01 | 0xD0..=0xD7 => {
                pos = segment;
                continue;
            }
            0xD9 | 0xDA => {
                return Err(Error::invalid_input(
                    Some(pos),
                    "JPEG scan or end before frame header",
                ))
            }
            _ => {}
        }

        if segment + 2 > data.len() {
            return Err(truncated(data.len(), "JPEG segment length"));
        }
        let len = u16::from_be_bytes([data[segment], data[segment + 1]]) as usize;
        if len < 2 {
            return Err(Error::invalid_input(Some(segment), "JPEG segment length below 2"));
        }

        if is_sof(marker) {
            // length (2) precision (1) height (2) width (2)
            if segment + 7 > data.len() {
                return Err(truncated(data.len(), "JPEG frame header"));
            }
            let height = u16::from_be_bytes([data[segment + 3], data[segment + 4]]) as u32;
            let width = u16::from_be_bytes([data[segment + 5], data[segment + 6]]) as u32;
            if height == 0 {
                // DNL-defined heights are not supported by the codec
                return Err(Error::invalid_input(Some(segment + 3), "JPEG height is zero"));
            }
            if width == 0 {
                return Err(Error::invalid_input(Some(segment + 5), "JPEG width is zero"));
            }
            return Ok(HeaderInfo {
                format: ImageFormat::Jpeg,
                width,
                height,
            });
        }
        pos = segment + len;
    }
}

fn truncated(len: usize, what: &str) -> Error {
    Error::invalid_input(Some(len), format!("truncated before {what}"))
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
