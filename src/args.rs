// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use std::path::PathBuf;
use wuffs_imageio::{
    Diagnostics, DecodeOptions, LoaderConfig, PixelFormat, VariantPreference,
};

/// Output pixel layout.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum OutputFormat {
    /// Blue, green, red, alpha (native layout)
    Bgra,
    /// Red, green, blue, alpha
    Rgba,
}

impl From<OutputFormat> for PixelFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Bgra => PixelFormat::Bgra8,
            OutputFormat::Rgba => PixelFormat::Rgba8,
        }
    }
}

/// Native library build to load.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Variant {
    /// Detect CPU features at runtime
    Auto,
    /// Portable build
    Baseline,
    /// AVX2 build, falling back to baseline where unavailable
    Avx2,
}

impl From<Variant> for VariantPreference {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Auto => VariantPreference::Auto,
            Variant::Baseline => VariantPreference::Baseline,
            Variant::Avx2 => VariantPreference::Avx2,
        }
    }
}

/// Command-line arguments for the wuffs-imageio decoder.
///
/// Decodes PNG and JPEG files with the native codec and reports what was
/// decoded. Arguments can be specified via command line or environment
/// variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// wuffs-imageio --natives-dir ./natives --format rgba photo.jpg
///
/// # Via environment variables
/// export WUFFS_IMAGEIO_NATIVES_DIR=./natives
/// wuffs-imageio --json photo.jpg icon.png
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image files to decode
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory holding the native libraries (replaces bundled resources)
    #[arg(long, env = "WUFFS_IMAGEIO_NATIVES_DIR")]
    pub natives_dir: Option<PathBuf>,

    /// Directory bundled native libraries are extracted to
    #[arg(long, env = "WUFFS_IMAGEIO_EXTRACT_DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Native library variant
    #[arg(long, env = "WUFFS_IMAGEIO_VARIANT", default_value = "auto", value_enum)]
    pub variant: Variant,

    /// Reject images wider than this many pixels
    #[arg(long, env = "MAX_WIDTH")]
    pub max_width: Option<u32>,

    /// Reject images taller than this many pixels
    #[arg(long, env = "MAX_HEIGHT")]
    pub max_height: Option<u32>,

    /// Reject images with more than this many pixels
    #[arg(long, env = "MAX_PIXELS")]
    pub max_pixels: Option<u64>,

    /// Output pixel layout
    #[arg(long, default_value = "bgra", value_enum)]
    pub format: OutputFormat,

    /// Number of decoding threads
    #[arg(short, long, default_value = "1")]
    pub threads: usize,

    /// Decode every input this many times
    #[arg(long, default_value = "1")]
    pub repeat: usize,

    /// Print one JSON object per decoded input
    #[arg(long)]
    pub json: bool,

    /// Log per-phase decode timings
    #[arg(long, env = "WUFFS_IMAGEIO_PERF")]
    pub perf: bool,

    /// Trace native allocations and report the peak
    #[arg(long, env = "WUFFS_IMAGEIO_TRACK_ALLOCATIONS")]
    pub track_allocations: bool,

    /// Log one line per successful decode
    #[arg(long, env = "WUFFS_IMAGEIO_LOG_DECODE")]
    pub log_decode: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl From<&Args> for LoaderConfig {
    fn from(args: &Args) -> Self {
        let mut config = LoaderConfig::new()
            .with_variant(args.variant.into())
            .with_diagnostics(Diagnostics {
                perf_timing: args.perf,
                allocation_tracking: args.track_allocations,
                log_decode: args.log_decode,
            });
        if let Some(dir) = &args.natives_dir {
            config = config.with_natives_dir(dir);
        }
        if let Some(dir) = &args.extract_dir {
            config = config.with_extract_dir(dir);
        }
        config
    }
}

impl From<&Args> for DecodeOptions {
    fn from(args: &Args) -> Self {
        DecodeOptions {
            max_width: args.max_width,
            max_height: args.max_height,
            max_pixels: args.max_pixels,
            output_format: args.format.into(),
            frame_index: 0,
        }
    }
}
