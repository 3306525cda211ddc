// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    cpu::VariantPreference,
    diagnostics::Diagnostics,
    resources::{default_extract_dir, DirectoryResources, ResourceSource},
};
use std::{fmt, path::PathBuf, sync::Arc};
use tracing::warn;

pub const ENV_NATIVES_DIR: &str = "WUFFS_IMAGEIO_NATIVES_DIR";
pub const ENV_EXTRACT_DIR: &str = "WUFFS_IMAGEIO_EXTRACT_DIR";
pub const ENV_VARIANT: &str = "WUFFS_IMAGEIO_VARIANT";

/// Where and how the native library is found and loaded.
#[derive(Clone)]
pub struct LoaderConfig {
    /// Directory holding the native libraries. When set, bundled resources
    /// are not consulted.
    pub natives_dir: Option<PathBuf>,
    /// Directory bundled libraries are extracted below.
    pub extract_dir: PathBuf,
    pub variant: VariantPreference,
    /// Bundled resource sources, tried in order.
    pub resources: Vec<Arc<dyn ResourceSource>>,
    pub diagnostics: Diagnostics,
}

impl LoaderConfig {
    /// Configuration with no override directory, resources read from beside
    /// the executable, and every toggle off.
    pub fn new() -> Self {
        let resources = DirectoryResources::beside_executable()
            .map(|source| vec![Arc::new(source) as Arc<dyn ResourceSource>])
            .unwrap_or_default();
        Self {
            natives_dir: None,
            extract_dir: default_extract_dir(),
            variant: VariantPreference::Auto,
            resources,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Defaults overridden by the `WUFFS_IMAGEIO_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(dir) = non_empty_env(ENV_NATIVES_DIR) {
            config.natives_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty_env(ENV_EXTRACT_DIR) {
            config.extract_dir = PathBuf::from(dir);
        }
        if let Some(variant) = non_empty_env(ENV_VARIANT) {
            config.variant = variant.parse().unwrap_or_else(|err| {
                warn!("{ENV_VARIANT}: {err}, using auto");
                VariantPreference::Auto
            });
        }
        config.diagnostics = Diagnostics::from_env();
        config
    }

    pub fn with_natives_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.natives_dir = Some(dir.into());
        self
    }

    pub fn with_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = dir.into();
        self
    }

    pub fn with_variant(mut self, variant: VariantPreference) -> Self {
        self.variant = variant;
        self
    }

    /// Replaces the resource sources.
    pub fn with_resources(mut self, resources: Vec<Arc<dyn ResourceSource>>) -> Self {
        self.resources = resources;
        self
    }

    /// Adds a resource source ahead of the existing ones.
    pub fn with_resource(mut self, source: impl ResourceSource + 'static) -> Self {
        self.resources.insert(0, Arc::new(source));
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("natives_dir", &self.natives_dir)
            .field("extract_dir", &self.extract_dir)
            .field("variant", &self.variant)
            .field(
                "resources",
                &self.resources.iter().map(|r| r.describe()).collect::<Vec<_>>(),
            )
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
