// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use serde_json::json;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, Level};
use wuffs_imageio::{
    diagnostics, loaded_library_path, DecodeOptions, DecodedImage, Decoder, LoaderConfig,
};

mod args;

use args::Args;

struct Outcome {
    path: PathBuf,
    iteration: usize,
    elapsed: Duration,
    result: wuffs_imageio::Result<DecodedImage>,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match run(args) {
        Ok(0) => {}
        Ok(failures) => {
            error!("{failures} decode(s) failed");
            process::exit(1);
        }
        Err(err) => {
            error!("{err}");
            process::exit(2);
        }
    }
}

fn run(args: Args) -> Result<usize, Box<dyn Error>> {
    wuffs_imageio::configure(LoaderConfig::from(&args))?;
    let decoder = Decoder::new()?;
    if let Some(path) = loaded_library_path() {
        info!(
            path = %path.display(),
            variant = %decoder.module().descriptor().variant,
            "using native library"
        );
    }

    let options = DecodeOptions::from(&args);
    options.validate()?;

    let inputs = args
        .inputs
        .iter()
        .map(|path| Ok((path.clone(), fs::read(path)?)))
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    let jobs = inputs.len() * args.repeat.max(1);
    let threads = args.threads.clamp(1, jobs.max(1));
    debug!(jobs, threads, "starting decode");

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();

    let failures = thread::scope(|scope| {
        for _ in 0..threads {
            let tx = tx.clone();
            let (next, inputs, decoder, options) = (&next, &inputs, &decoder, &options);
            scope.spawn(move || loop {
                let job = next.fetch_add(1, Ordering::Relaxed);
                if job >= jobs {
                    return;
                }
                let (path, data) = &inputs[job % inputs.len()];
                let start = Instant::now();
                let result = decoder.decode(data, options);
                let outcome = Outcome {
                    path: path.clone(),
                    iteration: job / inputs.len(),
                    elapsed: start.elapsed(),
                    result,
                };
                if tx.send(outcome).is_err() {
                    // receiver gone
                    return;
                }
            });
        }
        drop(tx);

        let mut failures = 0;
        for outcome in rx {
            if outcome.result.is_err() {
                failures += 1;
            }
            report(&outcome, args.json);
        }
        failures
    });

    info!(
        jobs,
        elapsed_ms = started.elapsed().as_millis() as u64,
        outstanding = diagnostics::outstanding_native_allocations(),
        total = diagnostics::total_native_allocations(),
        "done"
    );
    if args.track_allocations {
        info!(peak = diagnostics::peak_native_allocations(), "native allocation peak");
    }
    Ok(failures)
}

fn report(outcome: &Outcome, as_json: bool) {
    let path = display(&outcome.path);
    let elapsed_us = outcome.elapsed.as_micros() as u64;
    match (&outcome.result, as_json) {
        (Ok(image), true) => println!(
            "{}",
            json!({
                "path": path,
                "iteration": outcome.iteration,
                "format": image.source_format.name(),
                "width": image.width,
                "height": image.height,
                "stride": image.stride,
                "pixel_format": image.pixel_format.name(),
                "frame_count": image.frame_count,
                "bytes": image.pixels.len(),
                "elapsed_us": elapsed_us,
            })
        ),
        (Err(err), true) => println!(
            "{}",
            json!({
                "path": path,
                "iteration": outcome.iteration,
                "error": err.to_string(),
                "kind": format!("{:?}", err.kind()),
                "elapsed_us": elapsed_us,
            })
        ),
        (Ok(image), false) => println!(
            "{path}: {} {}x{} {} ({} bytes, {elapsed_us} us)",
            image.source_format,
            image.width,
            image.height,
            image.pixel_format,
            image.pixels.len()
        ),
        (Err(err), false) => println!("{path}: error: {err}"),
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
