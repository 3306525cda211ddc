// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::*;
use std::{
    error::Error,
    fs,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier, Mutex,
    },
    thread,
    time::Duration,
};
use wuffs_imageio::{
    DecodeOptions, Decoder, DirectoryResources, ErrorKind, FeatureVariant, Loader, LoaderConfig,
    PlatformTag, ResourceSource, VariantPreference,
};

fn natives_dir(platform: PlatformTag, files: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join(platform.id());
    fs::create_dir_all(&sub).expect("platform dir");
    for file in files {
        fs::write(sub.join(file), b"placeholder").expect("artifact");
    }
    dir
}

#[test]
fn concurrent_first_load_happens_once() -> Result<(), Box<dyn Error>> {
    let dir = natives_dir(PlatformTag::X86_64Linux, &["libwuffs_imageio.so"]);
    let binds = Arc::new(AtomicUsize::new(0));
    let counter = binds.clone();
    let loader = Arc::new(
        Loader::new(
            LoaderConfig::new()
                .with_natives_dir(dir.path())
                .with_variant(VariantPreference::Baseline),
        )
        .with_platform(PlatformTag::X86_64Linux)
        .with_binder(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(25));
            Ok(Box::new(MockCodec::new()))
        }),
    );

    let threads = 32;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let loader = loader.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                loader.ensure_loaded()
            })
        })
        .collect();

    let modules = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(loader.load_attempts(), 1);
    assert_eq!(binds.load(Ordering::SeqCst), 1);
    for module in &modules {
        assert!(Arc::ptr_eq(module, &modules[0]));
    }
    Ok(())
}

#[test]
fn concurrent_failures_share_one_error() {
    let dir = natives_dir(PlatformTag::X86_64Linux, &[]);
    let loader = Arc::new(
        Loader::new(LoaderConfig::new().with_natives_dir(dir.path()))
            .with_platform(PlatformTag::X86_64Linux)
            .with_binder(|_, _| Ok(Box::new(MockCodec::new()))),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let loader = loader.clone();
            thread::spawn(move || loader.ensure_loaded().map(|_| ()))
        })
        .collect();
    let errors: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread").unwrap_err())
        .collect();

    assert_eq!(loader.load_attempts(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::NativeLoad);
    assert!(errors[0].is_fatal());
    assert!(errors.iter().all(|e| *e == errors[0]));
}

#[test]
fn optimized_request_on_arm64_decodes_with_baseline() -> Result<(), Box<dyn Error>> {
    let dir = natives_dir(PlatformTag::Arm64MacOs, &["libwuffs_imageio.dylib"]);
    let loader = Loader::new(
        LoaderConfig::new()
            .with_natives_dir(dir.path())
            .with_variant(VariantPreference::Avx2),
    )
    .with_platform(PlatformTag::Arm64MacOs)
    .with_binder(|_, _| Ok(Box::new(MockCodec::new())));

    let module = loader.ensure_loaded()?;
    assert_eq!(module.descriptor().variant, FeatureVariant::Baseline);
    assert_eq!(module.descriptor().file_name, "libwuffs_imageio.dylib");

    let image = Decoder::with_module(module).decode(&png_image(4, 4), &DecodeOptions::new())?;
    assert_eq!(image.width, 4);
    Ok(())
}

#[test]
fn optimized_build_is_never_opened_on_denial() -> Result<(), Box<dyn Error>> {
    let dir = natives_dir(
        PlatformTag::X86_64Windows,
        &["wuffs_imageio.dll", "wuffs_imageio_avx2.dll"],
    );
    let opened = Arc::new(Mutex::new(Vec::new()));
    let record = opened.clone();
    let loader = Loader::new(
        LoaderConfig::new()
            .with_natives_dir(dir.path())
            .with_variant(VariantPreference::Avx2),
    )
    .with_platform(PlatformTag::X86_64Windows)
    .with_binder(move |descriptor, _| {
        record.lock().expect("bind log").push(descriptor.variant);
        Ok(Box::new(MockCodec::new().without_avx2()))
    });

    let module = loader.ensure_loaded()?;
    assert_eq!(module.descriptor().variant, FeatureVariant::Baseline);
    assert!(module.path().ends_with("x86_64-win32/wuffs_imageio.dll"));
    assert_eq!(*opened.lock().expect("bind log"), vec![FeatureVariant::Baseline]);
    Ok(())
}

#[test]
fn bundled_directory_resources_are_extracted() -> Result<(), Box<dyn Error>> {
    let bundle = tempfile::tempdir()?;
    let extract = tempfile::tempdir()?;
    let resource = bundle.path().join("natives/x86_64-macos");
    fs::create_dir_all(&resource)?;
    fs::write(resource.join("libwuffs_imageio.dylib"), b"baseline")?;
    fs::write(resource.join("libwuffs_imageio_avx2.dylib"), b"optimized")?;

    let loader = Loader::new(
        LoaderConfig::new()
            .with_resources(vec![
                Arc::new(DirectoryResources::new(bundle.path())) as Arc<dyn ResourceSource>
            ])
            .with_extract_dir(extract.path())
            .with_variant(VariantPreference::Avx2),
    )
    .with_platform(PlatformTag::X86_64MacOs)
    .with_binder(|descriptor, path| {
        let expected: &[u8] = match descriptor.variant {
            FeatureVariant::Baseline => b"baseline",
            FeatureVariant::Avx2 => b"optimized",
        };
        assert_eq!(fs::read(path).expect("extracted"), expected);
        Ok(Box::new(MockCodec::new()))
    });

    let module = loader.ensure_loaded()?;
    assert_eq!(module.descriptor().variant, FeatureVariant::Avx2);
    assert!(module.path().starts_with(extract.path()));
    assert!(module.path().ends_with("libwuffs_imageio_avx2.dylib"));
    Ok(())
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[test]
fn library_missing_symbols_is_rejected() -> Result<(), Box<dyn Error>> {
    // a link to an already mapped library without the codec exports
    let Some(libc_path) = [
        "/lib/x86_64-linux-gnu/libc.so.6",
        "/usr/lib/x86_64-linux-gnu/libc.so.6",
        "/lib64/libc.so.6",
        "/usr/lib64/libc.so.6",
    ]
    .into_iter()
    .map(std::path::Path::new)
    .find(|p| p.is_file()) else {
        return Ok(());
    };

    let dir = tempfile::tempdir()?;
    std::os::unix::fs::symlink(libc_path, dir.path().join("libwuffs_imageio.so"))?;
    let loader = Loader::new(
        LoaderConfig::new()
            .with_natives_dir(dir.path())
            .with_variant(VariantPreference::Baseline),
    )
    .with_platform(PlatformTag::X86_64Linux);

    let err = loader.ensure_loaded().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NativeLoad);
    let message = err.to_string();
    assert!(message.contains("wuffs_probe_image"), "{message}");
    assert!(message.contains("libwuffs_imageio.so"), "{message}");
    assert!(loader.loaded().is_none());
    Ok(())
}
