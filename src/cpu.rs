// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Runtime CPU feature detection for choosing the artifact variant.

use std::{fmt, str::FromStr, sync::OnceLock};

/// Build flavour of the native library.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FeatureVariant {
    /// Portable build, correct on every CPU of the platform.
    Baseline,
    /// Build compiled with AVX2 enabled.
    Avx2,
}

impl FeatureVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureVariant::Baseline => "baseline",
            FeatureVariant::Avx2 => "avx2",
        }
    }
}

impl fmt::Display for FeatureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant the process runs with, probed once.
///
/// Anything other than a positive AVX2 answer yields `Baseline`.
pub fn detect() -> FeatureVariant {
    static VARIANT: OnceLock<FeatureVariant> = OnceLock::new();
    *VARIANT.get_or_init(probe)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn probe() -> FeatureVariant {
    // also checks that the OS saves YMM state (OSXSAVE + XCR0)
    if std::arch::is_x86_feature_detected!("avx2") {
        FeatureVariant::Avx2
    } else {
        FeatureVariant::Baseline
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn probe() -> FeatureVariant {
    FeatureVariant::Baseline
}

/// Requested variant, as configured by the user.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum VariantPreference {
    /// Use the detected CPU capabilities.
    #[default]
    Auto,
    /// Always load the portable build.
    Baseline,
    /// Prefer the AVX2 build; falls back to baseline where unavailable.
    Avx2,
}

impl VariantPreference {
    pub fn resolve(self) -> FeatureVariant {
        match self {
            VariantPreference::Auto => detect(),
            VariantPreference::Baseline => FeatureVariant::Baseline,
            VariantPreference::Avx2 => FeatureVariant::Avx2,
        }
    }
}

impl FromStr for VariantPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(VariantPreference::Auto),
            "baseline" | "base" | "generic" => Ok(VariantPreference::Baseline),
            "avx2" | "optimized" => Ok(VariantPreference::Avx2),
            other => Err(format!("unknown variant '{other}'")),
        }
    }
}
