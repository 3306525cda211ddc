// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # wuffs-imageio
//!
//! Safe access to the native `wuffs_imageio` codec library. The crate picks
//! the prebuilt library matching the running machine, loads it once per
//! process, and moves image bytes and decoded pixels across the native
//! boundary with explicit ownership.
//!
//! ## Features
//!
//! - **Platform matrix**: macOS arm64/x86_64, Linux x86_64 and Windows x86_64,
//!   each with a baseline build and, on x86_64, an AVX2 build selected at
//!   runtime.
//! - **One-time loading**: concurrent first calls perform a single load; a
//!   failed load is reported to every caller without being retried.
//! - **Buffer bridge**: every native allocation is freed exactly once, on
//!   success and on every error path.
//! - **Host-side validation**: empty, unrecognized, truncated and oversized
//!   inputs are rejected before native code sees them.
//!
//! ## Example
//!
//! ```no_run
//! use wuffs_imageio::{DecodeOptions, PixelFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("photo.jpg")?;
//! let options = DecodeOptions::new()
//!     .max_width(8192)
//!     .max_height(8192)
//!     .output_format(PixelFormat::Rgba8);
//! let image = wuffs_imageio::decode(&data, &options)?;
//! println!("{}x{} {}", image.width, image.height, image.pixel_format);
//! # Ok(())
//! # }
//! ```
//!
//! ## Locating the native library
//!
//! Set `WUFFS_IMAGEIO_NATIVES_DIR` (or [`LoaderConfig::with_natives_dir`]) to
//! a directory holding the libraries, either flat or in per-platform
//! sub-directories. Without it the libraries are read from
//! `natives/<platform-id>/` beside the executable or from an
//! [`EmbeddedResources`] table, and extracted to a content-addressed path
//! under the temporary directory.
//!
//! ## Safety
//!
//! `unsafe` code is confined to the `wuffs-imageio-sys` bindings, the
//! [`NativeEntryPoints`] seam and the [`bridge`] module. See the [`loader`]
//! module for the one failure class that cannot be contained: a native fault
//! terminates the process.

pub mod artifact;
pub mod bridge;
pub mod config;
pub mod cpu;
pub mod decode;
pub mod diagnostics;
pub mod error;
pub mod guard;
pub mod header;
pub mod loader;
pub mod options;
pub mod pixel;
pub mod platform;
pub mod resources;

pub use artifact::NativeArtifactDescriptor;
pub use config::LoaderConfig;
pub use cpu::{FeatureVariant, VariantPreference};
pub use decode::{decode, probe, DecodedImage, Decoder, ImageInfo};
pub use diagnostics::Diagnostics;
pub use error::{Error, ErrorKind, Result};
pub use header::ImageFormat;
pub use loader::{
    configure, ensure_loaded, loaded_library_path, resource_path_for_current_platform, Loader,
    NativeEntryPoints, NativeModule,
};
pub use options::DecodeOptions;
pub use pixel::PixelFormat;
pub use platform::PlatformTag;
pub use resources::{DirectoryResources, EmbeddedResources, ResourceSource};

/// Handle to the loaded native module, shared by every decoder.
pub type LoadedNativeHandle = std::sync::Arc<NativeModule>;
