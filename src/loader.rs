// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Locating, loading and binding the native codec library.
//!
//! The library is loaded at most once per [`Loader`], and the process-wide
//! loader behind [`ensure_loaded`] is never dropped, so the global module
//! stays mapped for the lifetime of the process.
//!
//! # Known risk
//!
//! The codec runs in-process. A native fault (for example an abort on input
//! the codec does not handle) terminates the process and cannot be turned
//! into an [`Error`]. The decode path rejects empty, unrecognized, truncated
//! and oversized inputs before any native call to keep that exposure small,
//! but it does not remove it. Callers decoding untrusted data at scale should
//! isolate decoding in a separate process.

use crate::{
    artifact::{self, NativeArtifactDescriptor},
    config::LoaderConfig,
    cpu::{self, FeatureVariant},
    error::{Error, Result},
    guard::LoadGate,
    platform::{self, PlatformTag},
    resources,
};
use libc::{c_char, c_int, size_t};
use std::{
    ffi::CStr,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};
use tracing::{debug, info, warn};
use wuffs_imageio_sys::{wuffs_decode_params, wuffs_frame_result, wuffs_probe_result, WuffsImageio};

/// The native entry points, one method per exported function.
///
/// # Safety
///
/// Implementations must honour the C ABI contract of each function: never
/// read past `len` input bytes, never write past `dst_len` destination bytes,
/// write the out-structure only on success, and return either null or a
/// NUL-terminated string from `wuffs_error_message` that stays valid until
/// the next call on the same thread.
pub unsafe trait NativeEntryPoints: Send + Sync {
    /// # Safety
    ///
    /// `data` must be readable for `len` bytes and `out` writable.
    unsafe fn wuffs_probe_image(
        &self,
        data: *const u8,
        len: size_t,
        out: *mut wuffs_probe_result,
    ) -> c_int;

    /// # Safety
    ///
    /// `data` must be readable for `len` bytes, `params` valid, `dst_pixels`
    /// writable for `dst_len` bytes and `out` writable.
    #[allow(clippy::too_many_arguments)]
    unsafe fn wuffs_decode_frame_into(
        &self,
        data: *const u8,
        len: size_t,
        frame_index: u32,
        params: *const wuffs_decode_params,
        dst_pixels: *mut u8,
        dst_len: size_t,
        out: *mut wuffs_frame_result,
    ) -> c_int;

    /// # Safety
    ///
    /// No preconditions beyond a correctly bound library.
    unsafe fn wuffs_cpu_supports_avx2(&self) -> c_int;

    /// # Safety
    ///
    /// The returned pointer must be copied before the next native call on
    /// this thread.
    unsafe fn wuffs_error_message(&self, code: c_int) -> *const c_char;
}

unsafe impl NativeEntryPoints for WuffsImageio {
    unsafe fn wuffs_probe_image(
        &self,
        data: *const u8,
        len: size_t,
        out: *mut wuffs_probe_result,
    ) -> c_int {
        WuffsImageio::wuffs_probe_image(self, data, len, out)
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
        WuffsImageio::wuffs_decode_frame_into(
            self,
            data,
            len,
            frame_index,
            params,
            dst_pixels,
            dst_len,
            out,
        )
    }

    unsafe fn wuffs_cpu_supports_avx2(&self) -> c_int {
        WuffsImageio::wuffs_cpu_supports_avx2(self)
    }

    unsafe fn wuffs_error_message(&self, code: c_int) -> *const c_char {
        WuffsImageio::wuffs_error_message(self, code)
    }
}

/// A bound native library together with where it came from.
pub struct NativeModule {
    entry_points: Box<dyn NativeEntryPoints>,
    descriptor: NativeArtifactDescriptor,
    path: PathBuf,
}

impl NativeModule {
    pub fn with_entry_points(
        descriptor: NativeArtifactDescriptor,
        path: impl Into<PathBuf>,
        entry_points: impl NativeEntryPoints + 'static,
    ) -> Self {
        Self::from_boxed(descriptor, path.into(), Box::new(entry_points))
    }

    fn from_boxed(
        descriptor: NativeArtifactDescriptor,
        path: PathBuf,
        entry_points: Box<dyn NativeEntryPoints>,
    ) -> Self {
        Self {
            entry_points,
            descriptor,
            path,
        }
    }

    pub fn descriptor(&self) -> &NativeArtifactDescriptor {
        &self.descriptor
    }

    /// File the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The library's own AVX2 check.
    pub fn cpu_supports_avx2(&self) -> bool {
        unsafe { self.entry_points.wuffs_cpu_supports_avx2() != 0 }
    }

    /// The calling thread's last native error message for `code`.
    pub fn error_message(&self, code: c_int) -> Option<String> {
        let ptr = unsafe { self.entry_points.wuffs_error_message(code) };
        if ptr.is_null() {
            return None;
        }
        let message = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        (!message.is_empty()).then_some(message)
    }

    pub(crate) fn entry_points(&self) -> &dyn NativeEntryPoints {
        self.entry_points.as_ref()
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("descriptor", &self.descriptor)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Binds the file at a path, producing the entry points.
pub type Binder = dyn Fn(&NativeArtifactDescriptor, &Path) -> Result<Box<dyn NativeEntryPoints>>
    + Send
    + Sync;

fn bind_library(
    _descriptor: &NativeArtifactDescriptor,
    path: &Path,
) -> Result<Box<dyn NativeEntryPoints>> {
    // SAFETY: the file was located under the artifact's deterministic name;
    // every required export is checked before the library is accepted.
    let library = unsafe { WuffsImageio::new(path) }
        .map_err(|err| Error::native_load(path.display().to_string(), err))?;
    Ok(Box::new(library))
}

/// Loads the native module once and hands out the cached outcome.
pub struct Loader {
    config: LoaderConfig,
    platform: Option<PlatformTag>,
    binder: Arc<Binder>,
    gate: LoadGate<NativeModule>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            platform: None,
            binder: Arc::new(bind_library),
            gate: LoadGate::new(),
        }
    }

    /// Uses `platform` instead of the detected one.
    pub fn with_platform(mut self, platform: PlatformTag) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Replaces the step that turns a located file into entry points.
    pub fn with_binder<F>(mut self, binder: F) -> Self
    where
        F: Fn(&NativeArtifactDescriptor, &Path) -> Result<Box<dyn NativeEntryPoints>>
            + Send
            + Sync
            + 'static,
    {
        self.binder = Arc::new(binder);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Loads the module on first call; later calls return the same module or
    /// the same error without touching the filesystem again.
    pub fn ensure_loaded(&self) -> Result<Arc<NativeModule>> {
        self.gate.get_or_load(|| self.load())
    }

    /// The module, if a load has already succeeded.
    pub fn loaded(&self) -> Option<Arc<NativeModule>> {
        self.gate.get().and_then(|outcome| outcome.ok())
    }

    /// How many load sequences have run. Never more than one.
    pub fn load_attempts(&self) -> usize {
        self.gate.attempts()
    }

    /// Descriptor the next load would start from.
    pub fn descriptor(&self) -> Result<NativeArtifactDescriptor> {
        let platform = match self.platform {
            Some(platform) => platform,
            None => platform::identify()?,
        };
        let roots: Vec<PathBuf> = self
            .config
            .resources
            .iter()
            .filter_map(|r| r.location())
            .collect();
        artifact::resolve_in(
            platform,
            self.config.variant.resolve(),
            self.config.natives_dir.as_deref(),
            &roots,
        )
    }

    /// Binds the baseline build first and only opens the AVX2 build once
    /// the baseline library confirms the CPU can run it.
    fn load(&self) -> Result<NativeModule> {
        let descriptor = self.descriptor()?;
        debug!(
            platform = %descriptor.platform,
            variant = %descriptor.variant,
            file = %descriptor.file_name,
            "resolving native library"
        );

        let baseline = descriptor.baseline();
        let module = match self.locate(&baseline)? {
            Some(path) => {
                let module = self.bind(baseline, path)?;
                if descriptor.variant == FeatureVariant::Baseline {
                    module
                } else if !module.cpu_supports_avx2() {
                    warn!(
                        path = %module.path.display(),
                        "native library reports no AVX2 support, using baseline"
                    );
                    module
                } else {
                    match self.locate(&descriptor)? {
                        Some(path) => self.bind(descriptor, path)?,
                        None => {
                            warn!(
                                missing = %descriptor.file_name,
                                fallback = %module.descriptor.file_name,
                                "optimized native library not found, using baseline"
                            );
                            module
                        }
                    }
                }
            }
            // nothing to ask, so only a host-confirmed CPU opens the AVX2 build
            None if descriptor.variant == FeatureVariant::Avx2
                && cpu::detect() == FeatureVariant::Avx2 =>
            {
                let path = self
                    .locate(&descriptor)?
                    .ok_or_else(|| self.not_found(&baseline))?;
                self.bind(descriptor, path)?
            }
            None => return Err(self.not_found(&baseline)),
        };

        info!(
            path = %module.path.display(),
            variant = %module.descriptor.variant,
            "native library loaded"
        );
        Ok(module)
    }

    fn bind(&self, descriptor: NativeArtifactDescriptor, path: PathBuf) -> Result<NativeModule> {
        debug!(path = %path.display(), "binding native library");
        let entry_points = (self.binder)(&descriptor, &path)?;
        Ok(NativeModule::from_boxed(descriptor, path, entry_points))
    }

    /// Finds the artifact on disk, extracting it from a resource source when
    /// no override directory is configured.
    fn locate(&self, descriptor: &NativeArtifactDescriptor) -> Result<Option<PathBuf>> {
        if self.config.natives_dir.is_some() {
            return Ok(descriptor
                .search_locations
                .iter()
                .find(|path| path.is_file())
                .cloned());
        }

        for source in &self.config.resources {
            let bytes = source.read(&descriptor.resource_path).map_err(|err| {
                Error::native_load(
                    descriptor.file_name.as_str(),
                    format!(
                        "reading {} from {}: {err}",
                        descriptor.resource_path,
                        source.describe()
                    ),
                )
            })?;
            if let Some(bytes) = bytes {
                debug!(
                    source = %source.describe(),
                    resource = %descriptor.resource_path,
                    "found bundled native library"
                );
                let extract_dir = &self.config.extract_dir;
                let path = resources::extract(extract_dir, &descriptor.file_name, &bytes)
                    .map_err(|err| {
                        Error::native_load(
                            descriptor.file_name.as_str(),
                            format!("extracting to {}: {err}", extract_dir.display()),
                        )
                    })?;
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

impl Loader {
    fn not_found(&self, descriptor: &NativeArtifactDescriptor) -> Error {
        let mut searched: Vec<String> = descriptor
            .search_locations
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if self.config.natives_dir.is_none() {
            searched.extend(
                self.config
                    .resources
                    .iter()
                    .filter(|r| r.location().is_none())
                    .map(|r| r.describe()),
            );
        }
        Error::native_load(
            descriptor.file_name.as_str(),
            format!("not found in [{}]", searched.join(", ")),
        )
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("load_attempts", &self.load_attempts())
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Loader> = OnceLock::new();

fn global() -> &'static Loader {
    GLOBAL.get_or_init(|| {
        let config = LoaderConfig::from_env();
        config.diagnostics.apply();
        Loader::new(config)
    })
}

/// Installs the process-wide configuration. Must run before the first
/// decode; fails once the global loader exists.
pub fn configure(config: LoaderConfig) -> Result<()> {
    let diagnostics = config.diagnostics;
    GLOBAL
        .set(Loader::new(config))
        .map_err(|_| Error::protocol("native loader already initialized"))?;
    diagnostics.apply();
    Ok(())
}

/// Loads the process-wide module on first call.
pub fn ensure_loaded() -> Result<Arc<NativeModule>> {
    global().ensure_loaded()
}

/// Path of the loaded process-wide module, if loading has succeeded.
pub fn loaded_library_path() -> Option<PathBuf> {
    GLOBAL
        .get()
        .and_then(Loader::loaded)
        .map(|module| module.path().to_path_buf())
}

/// Resource path of the baseline artifact for the running platform.
///
/// Does not create or load the process-wide loader.
pub fn resource_path_for_current_platform() -> Result<String> {
    platform::identify()
        .and_then(|platform| artifact::resolve(platform, FeatureVariant::Baseline))
        .map(|d| d.resource_path)
}
