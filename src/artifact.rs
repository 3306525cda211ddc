// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    cpu::FeatureVariant,
    error::{Error, Result},
    platform::{Os, PlatformTag},
};
use std::path::{Path, PathBuf};

const LIBRARY_STEM: &str = "wuffs_imageio";

/// Which prebuilt binary to load and where to look for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeArtifactDescriptor {
    pub platform: PlatformTag,
    pub variant: FeatureVariant,
    pub file_name: String,
    /// Path of the bundled resource, `natives/<platform-id>/<file-name>`.
    pub resource_path: String,
    /// Candidate locations, in the order they are tried.
    pub search_locations: Vec<PathBuf>,
}

impl NativeArtifactDescriptor {
    /// The baseline artifact for the same platform and search locations.
    pub fn baseline(&self) -> Self {
        let mut descriptor = artifact_for(self.platform, FeatureVariant::Baseline);
        descriptor.search_locations =
            relocate(&self.search_locations, &self.file_name, &descriptor.file_name);
        descriptor
    }
}

/// File name of the artifact for `platform` and `variant`.
pub fn file_name(platform: PlatformTag, variant: FeatureVariant) -> String {
    let suffix = match variant {
        FeatureVariant::Baseline => "",
        FeatureVariant::Avx2 => "_avx2",
    };
    match platform.os() {
        Os::Windows => format!("{LIBRARY_STEM}{suffix}.dll"),
        _ => format!(
            "lib{LIBRARY_STEM}{suffix}.{}",
            platform.library_extension()
        ),
    }
}

fn artifact_for(platform: PlatformTag, variant: FeatureVariant) -> NativeArtifactDescriptor {
    let file_name = file_name(platform, variant);
    NativeArtifactDescriptor {
        resource_path: format!("natives/{}/{}", platform.id(), file_name),
        platform,
        variant,
        file_name,
        search_locations: Vec::new(),
    }
}

/// Published native builds.
const PUBLISHED: &[(PlatformTag, FeatureVariant)] = &[
    (PlatformTag::Arm64MacOs, FeatureVariant::Baseline),
    (PlatformTag::X86_64MacOs, FeatureVariant::Baseline),
    (PlatformTag::X86_64MacOs, FeatureVariant::Avx2),
    (PlatformTag::X86_64Linux, FeatureVariant::Baseline),
    (PlatformTag::X86_64Linux, FeatureVariant::Avx2),
    (PlatformTag::X86_64Windows, FeatureVariant::Baseline),
    (PlatformTag::X86_64Windows, FeatureVariant::Avx2),
];

/// Maps a platform and requested variant to an artifact.
///
/// A request for AVX2 on a platform without an AVX2 build yields the
/// baseline artifact.
pub fn resolve(platform: PlatformTag, variant: FeatureVariant) -> Result<NativeArtifactDescriptor> {
    resolve_from(PUBLISHED, platform, variant)
}

fn resolve_from(
    published: &[(PlatformTag, FeatureVariant)],
    platform: PlatformTag,
    variant: FeatureVariant,
) -> Result<NativeArtifactDescriptor> {
    let has = |v: FeatureVariant| published.contains(&(platform, v));
    if !has(FeatureVariant::Baseline) {
        return Err(Error::UnresolvedArtifact {
            platform: platform.to_string(),
            variant: variant.to_string(),
        });
    }
    let variant = if has(variant) {
        variant
    } else {
        FeatureVariant::Baseline
    };
    Ok(artifact_for(platform, variant))
}

/// Like [`resolve`], with search locations filled in.
///
/// With an override directory only that directory is searched, both flat
/// and with a platform sub-directory. Otherwise the locations are the
/// resource path below each on-disk resource root.
pub fn resolve_in(
    platform: PlatformTag,
    variant: FeatureVariant,
    natives_dir: Option<&Path>,
    resource_roots: &[PathBuf],
) -> Result<NativeArtifactDescriptor> {
    let mut descriptor = resolve(platform, variant)?;
    descriptor.search_locations = match natives_dir {
        Some(dir) => override_candidates(dir, platform, &descriptor.file_name),
        None => resource_roots
            .iter()
            .map(|root| root.join(&descriptor.resource_path))
            .collect(),
    };
    Ok(descriptor)
}

fn override_candidates(dir: &Path, platform: PlatformTag, file_name: &str) -> Vec<PathBuf> {
    vec![
        dir.join(file_name),
        dir.join(platform.id()).join(file_name),
    ]
}

fn relocate(locations: &[PathBuf], from: &str, to: &str) -> Vec<PathBuf> {
    locations
        .iter()
        .map(|path| match path.file_name() {
            Some(name) if name == from => path.with_file_name(to),
            _ => path.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_convention() {
        let expect = [
            (PlatformTag::Arm64MacOs, "libwuffs_imageio.dylib", None),
            (
                PlatformTag::X86_64MacOs,
                "libwuffs_imageio.dylib",
                Some("libwuffs_imageio_avx2.dylib"),
            ),
            (
                PlatformTag::X86_64Linux,
                "libwuffs_imageio.so",
                Some("libwuffs_imageio_avx2.so"),
            ),
            (
                PlatformTag::X86_64Windows,
                "wuffs_imageio.dll",
                Some("wuffs_imageio_avx2.dll"),
            ),
        ];
        for (platform, base, avx2) in expect {
            let d = resolve(platform, FeatureVariant::Baseline).unwrap();
            assert_eq!(d.file_name, base);
            assert_eq!(d.resource_path, format!("natives/{}/{}", platform.id(), base));

            let d = resolve(platform, FeatureVariant::Avx2).unwrap();
            match avx2 {
                Some(name) => {
                    assert_eq!(d.file_name, name);
                    assert_eq!(d.variant, FeatureVariant::Avx2);
                }
                None => {
                    assert_eq!(d.file_name, base);
                    assert_eq!(d.variant, FeatureVariant::Baseline);
                }
            }
        }
    }

    #[test]
    fn override_dir_candidates() {
        let d = resolve_in(
            PlatformTag::X86_64Linux,
            FeatureVariant::Avx2,
            Some(Path::new("/opt/natives")),
            &[PathBuf::from("/ignored")],
        )
        .unwrap();
        assert_eq!(
            d.search_locations,
            vec![
                PathBuf::from("/opt/natives/libwuffs_imageio_avx2.so"),
                PathBuf::from("/opt/natives/x86_64-linux/libwuffs_imageio_avx2.so"),
            ]
        );

        let base = d.baseline();
        assert_eq!(base.variant, FeatureVariant::Baseline);
        assert_eq!(
            base.search_locations,
            vec![
                PathBuf::from("/opt/natives/libwuffs_imageio.so"),
                PathBuf::from("/opt/natives/x86_64-linux/libwuffs_imageio.so"),
            ]
        );
    }

    #[test]
    fn resource_root_candidates() {
        let d = resolve_in(
            PlatformTag::X86_64Windows,
            FeatureVariant::Baseline,
            None,
            &[PathBuf::from("/app")],
        )
        .unwrap();
        assert_eq!(
            d.search_locations,
            vec![PathBuf::from("/app/natives/x86_64-win32/wuffs_imageio.dll")]
        );
    }

    #[test]
    fn platform_without_baseline_is_unresolved() {
        let published = [(PlatformTag::X86_64Linux, FeatureVariant::Avx2)];
        let err = resolve_from(&published, PlatformTag::X86_64Linux, FeatureVariant::Avx2)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnresolvedArtifact);
        assert!(err.is_fatal());

        let published = [(PlatformTag::X86_64Linux, FeatureVariant::Baseline)];
        let d = resolve_from(&published, PlatformTag::X86_64Linux, FeatureVariant::Avx2).unwrap();
        assert_eq!(d.variant, FeatureVariant::Baseline);
    }

    #[test]
    fn published_builds_match_platform_table() {
        for platform in PlatformTag::ALL {
            assert!(PUBLISHED.contains(&(platform, FeatureVariant::Baseline)));
            assert_eq!(
                PUBLISHED.contains(&(platform, FeatureVariant::Avx2)),
                platform.has_optimized_variant(),
                "{platform}"
            );
        }
    }

    #[test]
    fn resolve_is_deterministic() {
        for platform in PlatformTag::ALL {
            for variant in [FeatureVariant::Baseline, FeatureVariant::Avx2] {
                assert_eq!(resolve(platform, variant), resolve(platform, variant));
            }
        }
    }
}
