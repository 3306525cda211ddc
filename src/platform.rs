// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::{Error, Result};
use std::{fmt, sync::OnceLock};

/// Operating system and CPU architecture combinations with published
/// native artifacts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlatformTag {
    /// Apple silicon macOS
    Arm64MacOs,
    /// Intel macOS
    X86_64MacOs,
    /// 64-bit x86 Linux
    X86_64Linux,
    /// 64-bit x86 Windows
    X86_64Windows,
}

impl PlatformTag {
    pub const ALL: [PlatformTag; 4] = [
        PlatformTag::Arm64MacOs,
        PlatformTag::X86_64MacOs,
        PlatformTag::X86_64Linux,
        PlatformTag::X86_64Windows,
    ];

    /// Identifier used in resource paths (`natives/<id>/...`).
    pub fn id(self) -> &'static str {
        match self {
            PlatformTag::Arm64MacOs => "arm64-macos",
            PlatformTag::X86_64MacOs => "x86_64-macos",
            PlatformTag::X86_64Linux => "x86_64-linux",
            PlatformTag::X86_64Windows => "x86_64-win32",
        }
    }

    pub fn os(self) -> Os {
        match self {
            PlatformTag::Arm64MacOs | PlatformTag::X86_64MacOs => Os::MacOs,
            PlatformTag::X86_64Linux => Os::Linux,
            PlatformTag::X86_64Windows => Os::Windows,
        }
    }

    pub fn arch(self) -> Arch {
        match self {
            PlatformTag::Arm64MacOs => Arch::Arm64,
            _ => Arch::X86_64,
        }
    }

    pub fn library_extension(self) -> &'static str {
        match self.os() {
            Os::MacOs => "dylib",
            Os::Linux => "so",
            Os::Windows => "dll",
        }
    }

    /// Whether an AVX2 build is published for this platform.
    pub fn has_optimized_variant(self) -> bool {
        self.arch() == Arch::X86_64
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Linux,
    Windows,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arch {
    Arm64,
    X86_64,
}

fn normalize_os(os: &str) -> Option<Os> {
    let os = os.trim().to_ascii_lowercase();
    if os.contains("mac") || os.contains("darwin") || os.contains("osx") {
        Some(Os::MacOs)
    } else if os.contains("win") {
        Some(Os::Windows)
    } else if os.contains("linux") {
        Some(Os::Linux)
    } else {
        None
    }
}

fn normalize_arch(arch: &str) -> Option<Arch> {
    match arch.trim().to_ascii_lowercase().as_str() {
        "aarch64" | "arm64" => Some(Arch::Arm64),
        "x86_64" | "amd64" | "x64" | "x86-64" => Some(Arch::X86_64),
        _ => None,
    }
}

/// Maps raw OS and architecture spellings onto the supported matrix.
pub fn identify_from(os: &str, arch: &str) -> Result<PlatformTag> {
    let unsupported = || Error::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };
    let tag = match (
        normalize_os(os).ok_or_else(unsupported)?,
        normalize_arch(arch).ok_or_else(unsupported)?,
    ) {
        (Os::MacOs, Arch::Arm64) => PlatformTag::Arm64MacOs,
        (Os::MacOs, Arch::X86_64) => PlatformTag::X86_64MacOs,
        (Os::Linux, Arch::X86_64) => PlatformTag::X86_64Linux,
        (Os::Windows, Arch::X86_64) => PlatformTag::X86_64Windows,
        _ => return Err(unsupported()),
    };
    Ok(tag)
}

/// Platform of the running process, computed once.
pub fn identify() -> Result<PlatformTag> {
    static PLATFORM: OnceLock<Result<PlatformTag>> = OnceLock::new();
    PLATFORM
        .get_or_init(|| identify_from(std::env::consts::OS, std::env::consts::ARCH))
        .clone()
}
