// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ownership protocol for memory crossing the native boundary.
//!
//! Input bytes are lent to the codec by shared borrow for the duration of a
//! [`Submission`], so they can neither move nor be freed while native code
//! reads them. Output pixels are written into a [`TransferBuffer`] allocated
//! with the C allocator. The buffer is owned by exactly one side at a time:
//!
//! ```text
//!  allocate ──> Native ──lend──> InTransit ──reclaim──> Native ──retrieve──> Host (Vec)
//!                  │                                       │
//!                  └────────────── free (error/release) ───┘
//! ```
//!
//! Every path frees the native region exactly once: [`Bridge::retrieve`]
//! after copying into the host, the error paths of
//! [`Bridge::decode_into_native`], or [`Bridge::release`]. `Drop` only catches
//! submissions that were abandoned without release, and logs when it does.

use crate::{
    diagnostics,
    error::{Error, Result},
    header::ImageFormat,
    loader::NativeModule,
    pixel::PixelFormat,
};
use libc::c_int;
use std::{
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::warn;
use wuffs_imageio_sys::{
    wuffs_decode_params, wuffs_frame_result, wuffs_probe_result, WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT,
    WUFFS_IMAGEIO_ERR_NOT_IMPLEMENTED, WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT,
    WUFFS_IMAGEIO_ERR_WUFFS, WUFFS_IMAGEIO_OK,
};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Which side is responsible for freeing a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Owned by safe Rust code; the native side must not touch it.
    Host,
    /// Allocated by the C allocator and owned by the bridge.
    Native,
    /// Lent to the codec for the duration of a native call.
    InTransit,
    /// Freed. No further transition is possible.
    Released,
}

/// A region allocated with `malloc`, freed with `free` exactly once.
pub struct TransferBuffer {
    ptr: Option<NonNull<u8>>,
    len: usize,
    handle: u64,
    ownership: Ownership,
}

// The region is uniquely owned; no aliases survive a native call.
unsafe impl Send for TransferBuffer {}

impl TransferBuffer {
    fn allocate(handle: u64, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::protocol("zero-length native allocation"));
        }
        let ptr = unsafe { libc::malloc(len) } as *mut u8;
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            Error::protocol(format!("native allocation of {len} bytes failed"))
        })?;
        diagnostics::record_alloc(handle, len);
        Ok(Self {
            ptr: Some(ptr),
            len,
            handle,
            ownership: Ownership::Native,
        })
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn transition(&mut self, from: Ownership, to: Ownership) -> Result<()> {
        if self.ownership != from {
            return Err(Error::protocol(format!(
                "buffer {} is {:?}, expected {:?}",
                self.handle, self.ownership, from
            )));
        }
        self.ownership = to;
        Ok(())
    }

    /// Hands the region to the codec. Must be followed by [`Self::reclaim`]
    /// once the native call has returned.
    fn lend(&mut self) -> Result<*mut u8> {
        self.transition(Ownership::Native, Ownership::InTransit)?;
        match self.ptr {
            Some(ptr) => Ok(ptr.as_ptr()),
            None => Err(Error::protocol("lending a released buffer")),
        }
    }

    fn reclaim(&mut self) -> Result<()> {
        self.transition(Ownership::InTransit, Ownership::Native)
    }

    /// Copies the first `len` bytes into host memory and frees the region.
    fn into_host(mut self, len: usize) -> Result<Vec<u8>> {
        self.transition(Ownership::Native, Ownership::Host)?;
        let ptr = self
            .ptr
            .ok_or_else(|| Error::protocol("retrieving a released buffer"))?;
        let len = len.min(self.len);
        // SAFETY: the region holds `self.len` initialized bytes written by the
        // codec and no native call holds it any more.
        let pixels = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }.to_vec();
        self.free();
        Ok(pixels)
    }

    fn free(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { libc::free(ptr.as_ptr().cast()) };
            diagnostics::record_free(self.handle, self.len);
        }
        self.ownership = Ownership::Released;
    }
}

impl Drop for TransferBuffer {
    fn drop(&mut self) {
        if self.ptr.is_some() {
            warn!(handle = self.handle, len = self.len, "native buffer freed on drop");
            self.free();
        }
    }
}

impl fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .field("ownership", &self.ownership)
            .finish()
    }
}

/// Image description reported by the codec before decoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub bytes_per_pixel: u32,
    pub stride: u32,
}

/// Layout of a decoded frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Bytes of pixel data, `stride * height`.
    pub len: usize,
    /// Layout of the pixels as produced by the codec.
    pub pixel_format: PixelFormat,
}

/// One input handed to the bridge, together with its output buffer.
pub struct Submission<'a> {
    handle: u64,
    input: &'a [u8],
    format: Option<ImageFormat>,
    output: Option<(TransferBuffer, FrameMetadata)>,
    retrieved: bool,
}

impl Submission<'_> {
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn input(&self) -> &[u8] {
        self.input
    }

    /// Ownership of the output buffer, if one is held.
    pub fn output_ownership(&self) -> Option<Ownership> {
        self.output.as_ref().map(|(buffer, _)| buffer.ownership())
    }

    pub fn is_retrieved(&self) -> bool {
        self.retrieved
    }

    fn format_name(&self) -> &'static str {
        self.format.map(ImageFormat::name).unwrap_or("image")
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if let Some((mut buffer, _)) = self.output.take() {
            warn!(handle = self.handle, "submission dropped without release");
            buffer.free();
        }
    }
}

impl fmt::Debug for Submission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("handle", &self.handle)
            .field("input_len", &self.input.len())
            .field("output", &self.output)
            .field("retrieved", &self.retrieved)
            .finish()
    }
}

/// Calls into a loaded module with explicit buffer ownership.
#[derive(Clone, Copy)]
pub struct Bridge<'m> {
    module: &'m NativeModule,
}

impl<'m> Bridge<'m> {
    pub fn new(module: &'m NativeModule) -> Self {
        Self { module }
    }

    /// Registers `input` for native calls. The borrow keeps it in place until
    /// the submission is released.
    pub fn submit<'a>(&self, input: &'a [u8]) -> Result<Submission<'a>> {
        if input.is_empty() {
            return Err(Error::invalid_input(Some(0), "empty input"));
        }
        Ok(Submission {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            input,
            format: ImageFormat::detect(input),
            output: None,
            retrieved: false,
        })
    }

    /// Asks the codec for the image description.
    pub fn probe(&self, submission: &Submission) -> Result<ProbeInfo> {
        let mut out = wuffs_probe_result::default();
        let code = unsafe {
            self.module.entry_points().wuffs_probe_image(
                submission.input.as_ptr(),
                submission.input.len(),
                &mut out,
            )
        };
        if code != WUFFS_IMAGEIO_OK {
            return Err(self.translate(code, submission.format_name()));
        }
        if out.width == 0 || out.height == 0 {
            return Err(Error::invalid_input(
                None,
                format!("codec reported {}x{} image", out.width, out.height),
            ));
        }
        if out.bytes_per_pixel != 4 || (out.stride_bytes as u64) < out.width as u64 * 4 {
            return Err(Error::protocol(format!(
                "codec reported bytes_per_pixel={} stride={} for width {}",
                out.bytes_per_pixel, out.stride_bytes, out.width
            )));
        }
        Ok(ProbeInfo {
            width: out.width,
            height: out.height,
            frame_count: out.frame_count.max(1),
            bytes_per_pixel: out.bytes_per_pixel,
            stride: out.stride_bytes,
        })
    }

    /// Decodes `frame_index` into a freshly allocated native buffer held by
    /// the submission. On failure nothing stays allocated.
    pub fn decode_into_native(
        &self,
        submission: &mut Submission,
        frame_index: u32,
        probe: &ProbeInfo,
    ) -> Result<FrameMetadata> {
        if submission.retrieved || submission.output.is_some() {
            return Err(Error::protocol(format!(
                "submission {} was already decoded",
                submission.handle
            )));
        }
        let len = (probe.stride as usize)
            .checked_mul(probe.height as usize)
            .filter(|&len| len <= u32::MAX as usize)
            .ok_or_else(|| Error::ResourceLimitExceeded {
                width: probe.width as u64,
                height: probe.height as u64,
                limit: "output buffer exceeds 4 GiB".to_string(),
            })?;

        let mut buffer = TransferBuffer::allocate(submission.handle, len)?;
        let params = wuffs_decode_params {
            pixel_format: PixelFormat::Bgra8.native_code(),
            flags: 0,
        };
        let mut out = wuffs_frame_result::default();

        let dst = buffer.lend()?;
        let code = unsafe {
            self.module.entry_points().wuffs_decode_frame_into(
                submission.input.as_ptr(),
                submission.input.len(),
                frame_index,
                &params,
                dst,
                len,
                &mut out,
            )
        };
        buffer.reclaim()?;

        if code != WUFFS_IMAGEIO_OK {
            buffer.free();
            return Err(self.translate(code, submission.format_name()));
        }

        let expected = out.stride_bytes as u64 * out.height as u64;
        if out.width != probe.width
            || out.height != probe.height
            || (out.stride_bytes as u64) < out.width as u64 * 4
            || out.bytes_written as u64 != expected
            || expected > len as u64
        {
            buffer.free();
            return Err(Error::protocol(format!(
                "codec produced {}x{} stride {} ({} bytes) for {}x{} into {len} bytes",
                out.width,
                out.height,
                out.stride_bytes,
                out.bytes_written,
                probe.width,
                probe.height
            )));
        }

        let frame = FrameMetadata {
            width: out.width,
            height: out.height,
            stride: out.stride_bytes,
            len: out.bytes_written as usize,
            pixel_format: PixelFormat::Bgra8,
        };
        submission.output = Some((buffer, frame));
        Ok(frame)
    }

    /// Moves the decoded pixels into host memory. Allowed once per
    /// submission; the native region is freed before returning.
    pub fn retrieve(&self, submission: &mut Submission) -> Result<(Vec<u8>, FrameMetadata)> {
        if submission.retrieved {
            return Err(Error::DoubleRetrieve {
                handle: submission.handle,
            });
        }
        let (buffer, frame) = submission.output.take().ok_or_else(|| {
            Error::protocol(format!(
                "submission {} has no decoded output to retrieve",
                submission.handle
            ))
        })?;
        submission.retrieved = true;
        let pixels = buffer.into_host(frame.len)?;
        Ok((pixels, frame))
    }

    /// Ends the submission, freeing anything still owned natively.
    pub fn release(&self, mut submission: Submission) {
        if let Some((mut buffer, _)) = submission.output.take() {
            buffer.free();
        }
    }

    fn translate(&self, code: c_int, format: &str) -> Error {
        let message = self.module.error_message(code);
        let describe = |fallback: &str| message.clone().unwrap_or_else(|| fallback.to_string());
        match code {
            WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT => {
                Error::invalid_input(None, describe("codec rejected the arguments"))
            }
            WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT => {
                Error::invalid_input(Some(0), describe("unsupported image format"))
            }
            WUFFS_IMAGEIO_ERR_WUFFS => Error::DecodeFailure {
                format: format.to_string(),
                message: describe("codec error"),
            },
            WUFFS_IMAGEIO_ERR_NOT_IMPLEMENTED => Error::DecodeFailure {
                format: format.to_string(),
                message: describe("not implemented"),
            },
            other => Error::protocol(format!("codec returned unknown status {other}")),
        }
    }
}
