// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Test double for the native codec plus image fixtures.
//!
//! `MockCodec` implements the native entry points in Rust: PNG is decoded
//! with the `png` crate, JPEG is answered with a deterministic pattern sized
//! from the frame header. It reports a configurable frame count and counts
//! every call so tests can prove that rejected inputs never reached it.

#![allow(dead_code)]

use libc::{c_char, c_int, size_t};
use std::{
    cell::RefCell,
    ffi::CString,
    io::Cursor,
    slice,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use wuffs_imageio::{
    artifact, header, FeatureVariant, ImageFormat, NativeEntryPoints, NativeModule, PlatformTag,
};
use wuffs_imageio_sys::{
    wuffs_decode_params, wuffs_frame_result, wuffs_probe_result,
    WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL, WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT,
    WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT, WUFFS_IMAGEIO_ERR_WUFFS, WUFFS_IMAGEIO_OK,
};

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn fail(code: c_int, message: &str) -> c_int {
    LAST_ERROR.with(|last| {
        *last.borrow_mut() = CString::new(message).unwrap_or_default();
    });
    code
}

#[derive(Default, Debug)]
pub struct CallCounters {
    probes: AtomicUsize,
    decodes: AtomicUsize,
}

impl CallCounters {
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.probes() + self.decodes()
    }
}

pub struct MockCodec {
    frame_count: u32,
    avx2: bool,
    counters: Arc<CallCounters>,
}

impl MockCodec {
    pub fn new() -> Self {
        Self {
            frame_count: 1,
            avx2: true,
            counters: Arc::default(),
        }
    }

    /// Reports `frame_count` frames; frame `k` is frame 0 with `k` added to
    /// the blue channel.
    pub fn with_frames(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn without_avx2(mut self) -> Self {
        self.avx2 = false;
        self
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        self.counters.clone()
    }

    fn dimensions(data: &[u8]) -> Result<(u32, u32), (c_int, String)> {
        match ImageFormat::detect(data) {
            Some(ImageFormat::Png) => {
                let reader = png::Decoder::new(Cursor::new(data))
                    .read_info()
                    .map_err(|err| (WUFFS_IMAGEIO_ERR_WUFFS, format!("png: {err}")))?;
                let info = reader.info();
                Ok((info.width, info.height))
            }
            Some(ImageFormat::Jpeg) => header::sniff(data)
                .map(|h| (h.width, h.height))
                .map_err(|err| (WUFFS_IMAGEIO_ERR_WUFFS, format!("jpeg: {err}"))),
            None => Err((
                WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT,
                "unsupported format".to_string(),
            )),
        }
    }

    fn render(
        &self,
        data: &[u8],
        frame_index: u32,
    ) -> Result<(u32, u32, Vec<u8>), (c_int, String)> {
        let (width, height, mut bgra) = match ImageFormat::detect(data) {
            Some(ImageFormat::Png) => decode_png_bgra(data)?,
            Some(ImageFormat::Jpeg) => {
                if !data.ends_with(&[0xFF, 0xD9]) {
                    return Err((WUFFS_IMAGEIO_ERR_WUFFS, "jpeg: unexpected EOF".to_string()));
                }
                let (w, h) = Self::dimensions(data)?;
                (w, h, jpeg_pattern_bgra(w, h))
            }
            None => {
                return Err((
                    WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT,
                    "unsupported format".to_string(),
                ))
            }
        };
        for px in bgra.chunks_exact_mut(4) {
            px[0] = px[0].wrapping_add(frame_index as u8);
        }
        Ok((width, height, bgra))
    }
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl NativeEntryPoints for MockCodec {
    unsafe fn wuffs_probe_image(
        &self,
        data: *const u8,
        len: size_t,
        out: *mut wuffs_probe_result,
    ) -> c_int {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        if data.is_null() || out.is_null() || len == 0 {
            return fail(WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT, "invalid argument");
        }
        let data = slice::from_raw_parts(data, len);
        match Self::dimensions(data) {
            Ok((width, height)) => {
                *out = wuffs_probe_result {
                    width,
                    height,
                    frame_count: self.frame_count,
                    bytes_per_pixel: 4,
                    stride_bytes: width * 4,
                };
                WUFFS_IMAGEIO_OK
            }
            Err((code, message)) => fail(code, &message),
        }
    }

    unsafe fn wuffs_decode_frame_into(
        &self,
        data: *const u8,
        len: size_t,
        frame_index: u32,
        params: *const wuffs_decode_params,
        dst_pixels: *mut u8,
        dst_len: size_t,
        out: *mut wuffs_frame_result,
    ) -> c_int {
        self.counters.decodes.fetch_add(1, Ordering::SeqCst);
        if data.is_null() || len == 0 || params.is_null() || dst_pixels.is_null() || out.is_null() {
            return fail(WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT, "invalid argument");
        }
        if (*params).pixel_format != WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL {
            return fail(WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT, "invalid argument");
        }
        if frame_index >= self.frame_count {
            return fail(WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT, "frame index out of range");
        }
        let data = slice::from_raw_parts(data, len);
        let (width, height, bgra) = match self.render(data, frame_index) {
            Ok(rendered) => rendered,
            Err((code, message)) => return fail(code, &message),
        };
        if dst_len < bgra.len() {
            return fail(WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT, "invalid argument");
        }
        slice::from_raw_parts_mut(dst_pixels, bgra.len()).copy_from_slice(&bgra);
        *out = wuffs_frame_result {
            width,
            height,
            stride_bytes: width * 4,
            bytes_written: bgra.len() as u32,
        };
        WUFFS_IMAGEIO_OK
    }

    unsafe fn wuffs_cpu_supports_avx2(&self) -> c_int {
        self.avx2 as c_int
    }

    unsafe fn wuffs_error_message(&self, _code: c_int) -> *const c_char {
        LAST_ERROR.with(|last| last.borrow().as_ptr())
    }
}

/// Module backed by `codec`, as if loaded from the Linux baseline artifact.
pub fn mock_module(codec: MockCodec) -> Arc<NativeModule> {
    let descriptor = artifact::resolve(PlatformTag::X86_64Linux, FeatureVariant::Baseline)
        .expect("linux baseline resolves");
    Arc::new(NativeModule::with_entry_points(
        descriptor,
        "/mock/libwuffs_imageio.so",
        codec,
    ))
}

fn decode_png_bgra(data: &[u8]) -> Result<(u32, u32, Vec<u8>), (c_int, String)> {
    let codec_err = |err: png::DecodingError| (WUFFS_IMAGEIO_ERR_WUFFS, format!("png: {err}"));
    let mut reader = png::Decoder::new(Cursor::new(data))
        .read_info()
        .map_err(codec_err)?;
    let size = reader
        .output_buffer_size()
        .ok_or_else(|| (WUFFS_IMAGEIO_ERR_WUFFS, "png: image too large".to_string()))?;
    let mut buf = vec![0u8; size];
    let frame = reader.next_frame(&mut buf).map_err(codec_err)?;
    if frame.color_type != png::ColorType::Rgba || frame.bit_depth != png::BitDepth::Eight {
        return Err((
            WUFFS_IMAGEIO_ERR_WUFFS,
            "png: mock only handles 8-bit RGBA".to_string(),
        ));
    }
    buf.truncate(frame.buffer_size());
    for px in buf.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    Ok((frame.width, frame.height, buf))
}

/// RGBA gradient used by the PNG fixtures.
pub fn rgba_pattern(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) % 256) as u8,
                255 - (x % 128) as u8,
            ]);
        }
    }
    pixels
}

/// The pattern the mock returns for a JPEG of the given size, in BGRA.
pub fn jpeg_pattern_bgra(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x ^ y) as u8, y as u8, x as u8, 255]);
        }
    }
    pixels
}

/// PNG encoding of [`rgba_pattern`].
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let mut output = Vec::new();
    let mut encoder = png::Encoder::new(&mut output, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().expect("png header");
    writer
        .write_image_data(&rgba_pattern(width, height))
        .expect("png data");
    writer.finish().expect("png finish");
    output
}

/// A PNG whose header is fine but whose image data fails its checksum.
pub fn corrupt_png(width: u32, height: u32) -> Vec<u8> {
    let mut data = png_image(width, height);
    let idat = data
        .windows(4)
        .position(|w| w == b"IDAT")
        .expect("IDAT chunk");
    data[idat + 6] ^= 0x5A;
    data
}

/// Structurally complete baseline JPEG declaring `width` x `height`.
pub fn jpeg_image(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0,
    ]);
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 8]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[1, 1, 0x11, 0]);
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 1, 1, 0, 0, 0x3F, 0]);
    data.extend_from_slice(&[0x12, 0x34, 0x56]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// [`jpeg_image`] cut off before its end marker.
pub fn truncated_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut data = jpeg_image(width, height);
    data.truncate(data.len() - 2);
    data
}

/// Converts BGRA pixels to RGBA.
pub fn bgra_to_rgba(mut pixels: Vec<u8>) -> Vec<u8> {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    pixels
}
