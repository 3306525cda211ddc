// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bundled native artifacts and their extraction to disk.

use sha2::{Digest, Sha256};
use std::{
    borrow::Cow,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// A place bundled artifacts can be read from, keyed by resource path
/// (`natives/<platform-id>/<file-name>`).
pub trait ResourceSource: Send + Sync {
    /// Human readable location, used in error messages.
    fn describe(&self) -> String;

    /// Directory resource paths are resolved against, for sources that live
    /// on disk.
    fn location(&self) -> Option<PathBuf> {
        None
    }

    /// Returns the resource bytes, or `None` when this source lacks it.
    fn read(&self, resource_path: &str) -> io::Result<Option<Cow<'static, [u8]>>>;
}

/// Resources laid out on disk below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resources shipped next to the running executable.
    pub fn beside_executable() -> Option<Self> {
        let exe = std::env::current_exe().ok()?;
        exe.parent().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceSource for DirectoryResources {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn read(&self, resource_path: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        let path = self.root.join(resource_path);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Resources compiled into the binary, typically with `include_bytes!`.
///
/// ```ignore
/// static NATIVES: &[(&str, &[u8])] = &[(
///     "natives/x86_64-linux/libwuffs_imageio.so",
///     include_bytes!("../natives/x86_64-linux/libwuffs_imageio.so"),
/// )];
/// let source = EmbeddedResources::new(NATIVES);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedResources {
    entries: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedResources {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }
}

impl ResourceSource for EmbeddedResources {
    fn describe(&self) -> String {
        format!("embedded ({} entries)", self.entries.len())
    }

    fn read(&self, resource_path: &str) -> io::Result<Option<Cow<'static, [u8]>>> {
        Ok(self
            .entries
            .iter()
            .find(|(path, _)| *path == resource_path)
            .map(|(_, bytes)| Cow::Borrowed(*bytes)))
    }
}

/// Default directory extracted artifacts are written below.
pub fn default_extract_dir() -> PathBuf {
    std::env::temp_dir().join("wuffs-imageio-natives")
}

fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

/// Writes `bytes` to `<extract_dir>/<digest>/<file_name>` and returns the path.
///
/// The path depends only on the content, so concurrent processes extracting
/// the same artifact agree on it. An existing file is reused when its digest
/// matches; otherwise the bytes go to a temporary file in the same directory
/// which is then renamed into place.
pub fn extract(extract_dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let digest = content_digest(bytes);
    let dir = extract_dir.join(&digest);
    let target = dir.join(file_name);

    if let Ok(existing) = fs::read(&target) {
        if content_digest(&existing) == digest {
            debug!(path = %target.display(), "reusing extracted native library");
            return Ok(target);
        }
    }

    fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".extract-")
        .tempfile_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    set_executable(tmp.path())?;
    tmp.persist(&target).map_err(|err| err.error)?;

    debug!(path = %target.display(), len = bytes.len(), "extracted native library");
    Ok(target)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
