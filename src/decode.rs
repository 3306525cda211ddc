// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    bridge::{Bridge, FrameMetadata, ProbeInfo, Submission},
    diagnostics::{self, PhaseTimer},
    error::{Error, Result},
    header::{self, HeaderInfo, ImageFormat},
    loader::{self, NativeModule},
    options::DecodeOptions,
    pixel::{self, PixelFormat},
};
use std::{io::Read, sync::Arc};
use tracing::info;

/// A decoded frame, owned entirely by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: u32,
    pub pixel_format: PixelFormat,
    pub source_format: ImageFormat,
    /// Frames in the source image.
    pub frame_count: u32,
}

impl DecodedImage {
    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        let end = start + self.width as usize * self.pixel_format.bytes_per_pixel();
        self.pixels.get(start..end)
    }
}

/// Description of an image, available without decoding its pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub bytes_per_pixel: u32,
    pub stride: u32,
}

impl ImageInfo {
    fn new(header: HeaderInfo, probe: ProbeInfo) -> Self {
        Self {
            format: header.format,
            width: probe.width,
            height: probe.height,
            frame_count: probe.frame_count,
            bytes_per_pixel: probe.bytes_per_pixel,
            stride: probe.stride,
        }
    }
}

/// Decodes images with a loaded native module.
///
/// Each call allocates its own native buffers, so one decoder can be shared
/// by any number of threads.
#[derive(Clone, Debug)]
pub struct Decoder {
    module: Arc<NativeModule>,
}

impl Decoder {
    /// Decoder backed by the process-wide native module, loading it on first
    /// use.
    pub fn new() -> Result<Self> {
        Ok(Self::with_module(loader::ensure_loaded()?))
    }

    pub fn with_module(module: Arc<NativeModule>) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Reports format, dimensions and frame count.
    pub fn probe(&self, data: &[u8]) -> Result<ImageInfo> {
        let header = header::sniff(data)?;
        let bridge = Bridge::new(&self.module);
        let submission = bridge.submit(data)?;
        let probed = bridge.probe(&submission);
        bridge.release(submission);
        Ok(ImageInfo::new(header, probed?))
    }

    /// Decodes one frame of a PNG or JPEG image.
    pub fn decode(&self, data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
        options.validate()?;
        let mut timer = PhaseTimer::start();

        let header = header::sniff(data)?;
        options.check_dimensions(header.width, header.height)?;

        let bridge = Bridge::new(&self.module);
        let mut submission = bridge.submit(data)?;
        let handle = submission.handle();
        timer.lap(handle, "validate");

        let outcome = self.run(&bridge, &mut submission, &header, options, &mut timer);
        bridge.release(submission);
        let (mut pixels, frame, probe) = outcome?;

        if options.output_format == PixelFormat::Rgba8 {
            pixel::swap_br_rows(&mut pixels, frame.stride as usize, frame.width as usize);
            timer.lap(handle, "swizzle");
        }

        if diagnostics::log_decode_enabled() {
            info!(
                handle,
                format = %header.format,
                width = frame.width,
                height = frame.height,
                pixel_format = %options.output_format,
                bytes = pixels.len(),
                "decoded image"
            );
        }

        Ok(DecodedImage {
            pixels,
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            pixel_format: options.output_format,
            source_format: header.format,
            frame_count: probe.frame_count,
        })
    }

    /// Reads `reader` to the end and decodes the result.
    pub fn decode_reader<R: Read>(
        &self,
        mut reader: R,
        options: &DecodeOptions,
    ) -> Result<DecodedImage> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|err| Error::invalid_input(Some(data.len()), format!("read failed: {err}")))?;
        self.decode(&data, options)
    }

    fn run(
        &self,
        bridge: &Bridge,
        submission: &mut Submission,
        header: &HeaderInfo,
        options: &DecodeOptions,
        timer: &mut PhaseTimer,
    ) -> Result<(Vec<u8>, FrameMetadata, ProbeInfo)> {
        let handle = submission.handle();
        let probe = bridge.probe(submission)?;
        timer.lap(handle, "probe");

        if probe.width != header.width || probe.height != header.height {
            return Err(Error::invalid_input(
                None,
                format!(
                    "header declares {}x{} but codec reports {}x{}",
                    header.width, header.height, probe.width, probe.height
                ),
            ));
        }
        options.check_dimensions(probe.width, probe.height)?;
        if options.frame_index >= probe.frame_count {
            return Err(Error::invalid_input(
                None,
                format!(
                    "frame {} requested, image has {} frame(s)",
                    options.frame_index, probe.frame_count
                ),
            ));
        }

        bridge.decode_into_native(submission, options.frame_index, &probe)?;
        timer.lap(handle, "decode");

        let (pixels, frame) = bridge.retrieve(submission)?;
        timer.lap(handle, "retrieve");
        Ok((pixels, frame, probe))
    }
}

/// Decodes with the process-wide native module.
pub fn decode(data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
    Decoder::new()?.decode(data, options)
}

/// Probes with the process-wide native module.
pub fn probe(data: &[u8]) -> Result<ImageInfo> {
    Decoder::new()?.probe(data)
}
