// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Low-level bindings for the `wuffs_imageio` shared library.
//!
//! The library is opened at runtime with `libloading`, so nothing links
//! against it at build time. Every exported function is resolved when the
//! library is opened; a missing symbol fails [`WuffsImageio::new`] instead of
//! panicking on first use.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, size_t};
use libloading::Library;
use std::ffi::OsStr;
use thiserror::Error;

pub const WUFFS_IMAGEIO_OK: c_int = 0;
pub const WUFFS_IMAGEIO_ERR_INVALID_ARGUMENT: c_int = -1;
pub const WUFFS_IMAGEIO_ERR_UNSUPPORTED_FORMAT: c_int = -2;
pub const WUFFS_IMAGEIO_ERR_WUFFS: c_int = -3;
pub const WUFFS_IMAGEIO_ERR_NOT_IMPLEMENTED: c_int = -4;

/// `WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL`, the only destination layout
/// implemented by `wuffs_decode_frame_into`.
pub const WUFFS_BASE__PIXEL_FORMAT__BGRA_NONPREMUL: u32 = 0x8100_8888;

pub const SYMBOL_PROBE_IMAGE: &str = "wuffs_probe_image";
pub const SYMBOL_DECODE_FRAME_INTO: &str = "wuffs_decode_frame_into";
pub const SYMBOL_CPU_SUPPORTS_AVX2: &str = "wuffs_cpu_supports_avx2";
pub const SYMBOL_ERROR_MESSAGE: &str = "wuffs_error_message";

/// Every symbol the library must export to be accepted.
pub const REQUIRED_SYMBOLS: [&str; 4] = [
    SYMBOL_PROBE_IMAGE,
    SYMBOL_DECODE_FRAME_INTO,
    SYMBOL_CPU_SUPPORTS_AVX2,
    SYMBOL_ERROR_MESSAGE,
];

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct wuffs_probe_result {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub bytes_per_pixel: u32,
    pub stride_bytes: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct wuffs_decode_params {
    pub pixel_format: u32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct wuffs_frame_result {
    pub width: u32,
    pub height: u32,
    pub stride_bytes: u32,
    pub bytes_written: u32,
}

pub type wuffs_probe_image_fn =
    unsafe extern "C" fn(data: *const u8, len: size_t, out: *mut wuffs_probe_result) -> c_int;

pub type wuffs_decode_frame_into_fn = unsafe extern "C" fn(
    data: *const u8,
    len: size_t,
    frame_index: u32,
    params: *const wuffs_decode_params,
    dst_pixels: *mut u8,
    dst_len: size_t,
    out: *mut wuffs_frame_result,
) -> c_int;

pub type wuffs_cpu_supports_avx2_fn = unsafe extern "C" fn() -> c_int;

pub type wuffs_error_message_fn = unsafe extern "C" fn(code: c_int) -> *const c_char;

/// Failure to open the library or to bind one of its exports.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open library: {0}")]
    Open(#[source] libloading::Error),
    #[error("missing symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

/// Dynamically loaded `wuffs_imageio` library with all exports bound.
pub struct WuffsImageio {
    __library: Library,
    wuffs_probe_image: wuffs_probe_image_fn,
    wuffs_decode_frame_into: wuffs_decode_frame_into_fn,
    wuffs_cpu_supports_avx2: wuffs_cpu_supports_avx2_fn,
    wuffs_error_message: wuffs_error_message_fn,
}

impl WuffsImageio {
    /// Opens the shared library at `path` and binds every required symbol.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialisers. The caller must ensure the
    /// file at `path` is a build of `wuffs_imageio` exporting the functions
    /// with the exact signatures declared in this crate.
    pub unsafe fn new<P>(path: P) -> Result<Self, LoadError>
    where
        P: AsRef<OsStr>,
    {
        let library = Library::new(path).map_err(LoadError::Open)?;
        Self::from_library(library)
    }

    /// Binds every required symbol from an already opened library.
    ///
    /// # Safety
    ///
    /// Same contract as [`WuffsImageio::new`].
    pub unsafe fn from_library<L>(library: L) -> Result<Self, LoadError>
    where
        L: Into<Library>,
    {
        let __library = library.into();
        let wuffs_probe_image = bind::<wuffs_probe_image_fn>(&__library, SYMBOL_PROBE_IMAGE)?;
        let wuffs_decode_frame_into =
            bind::<wuffs_decode_frame_into_fn>(&__library, SYMBOL_DECODE_FRAME_INTO)?;
        let wuffs_cpu_supports_avx2 =
            bind::<wuffs_cpu_supports_avx2_fn>(&__library, SYMBOL_CPU_SUPPORTS_AVX2)?;
        let wuffs_error_message =
            bind::<wuffs_error_message_fn>(&__library, SYMBOL_ERROR_MESSAGE)?;
        Ok(WuffsImageio {
            __library,
            wuffs_probe_image,
            wuffs_decode_frame_into,
            wuffs_cpu_supports_avx2,
            wuffs_error_message,
        })
    }

    /// # Safety
    ///
    /// `data` must be readable for `len` bytes and `out` must be writable.
    pub unsafe fn wuffs_probe_image(
        &self,
        data: *const u8,
        len: size_t,
        out: *mut wuffs_probe_result,
    ) -> c_int {
        (self.wuffs_probe_image)(data, len, out)
    }

    /// # Safety
    ///
    /// `data` must be readable for `len` bytes, `dst_pixels` writable for
    /// `dst_len` bytes, `params` null or valid, and `out` writable.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn wuffs_decode_frame_into(
        &self,
        data: *const u8,
        len: size_t,
        frame_index: u32,
        params: *const wuffs_decode_params,
        dst_pixels: *mut u8,
        dst_len: size_t,
        out: *mut wuffs_frame_result,
    ) -> c_int {
        (self.wuffs_decode_frame_into)(data, len, frame_index, params, dst_pixels, dst_len, out)
    }

    /// # Safety
    ///
    /// Executes `cpuid`/`xgetbv` inside the library; safe on any x86 CPU.
    pub unsafe fn wuffs_cpu_supports_avx2(&self) -> c_int {
        (self.wuffs_cpu_supports_avx2)()
    }

    /// # Safety
    ///
    /// The returned pointer refers to static or thread-local storage inside
    /// the library and must be copied before the next call on this thread.
    pub unsafe fn wuffs_error_message(&self, code: c_int) -> *const c_char {
        (self.wuffs_error_message)(code)
    }
}

unsafe fn bind<T: Copy>(library: &Library, symbol: &'static str) -> Result<T, LoadError> {
    let mut name = Vec::with_capacity(symbol.len() + 1);
    name.extend_from_slice(symbol.as_bytes());
    name.push(0);
    library
        .get::<T>(&name)
        .map(|sym| *sym)
        .map_err(|source| LoadError::MissingSymbol { symbol, source })
}
