// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs::File;
use std::path::Path;
use std::process;

use clap::{App, Arg};
use log::{error, info};

use harmonia_bundle_flac::{EncoderOptions, FlacEncoder, StreamParameters};
use harmonia_core::errors::{Error, Result};
use harmonia_core::io::MediaSinkStream;

mod wav;

use wav::WavReader;

fn main() {
    pretty_env_logger::init();

    let matches = App::new("harmonia-enc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Encode PCM WAVE audio to FLAC with Harmonia")
        .arg(Arg::new("INPUT").help("The input WAVE file path").required(true).index(1))
        .arg(Arg::new("OUTPUT").help("The output FLAC file path").required(true).index(2))
        .try_get_matches();

    let matches = match matches {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();

            match err.kind() {
                clap::ErrorKind::DisplayHelp | clap::ErrorKind::DisplayVersion => {
                    process::exit(0)
                }
                _ => process::exit(1),
            }
        }
    };

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("OUTPUT").unwrap();

    if let Err(err) = run(Path::new(input), Path::new(output)) {
        error!("{}", err);

        process::exit(match err {
            Error::Unsupported(_) => 2,
            Error::EndOfStream => 3,
            _ => 4,
        });
    }
}

fn run(input: &Path, output: &Path) -> Result<()> {
    let mut reader = WavReader::open(input)?;
    let spec = *reader.spec();

    info!(
        "input: {} Hz, {} channel(s), {} bits, {} samples",
        spec.sample_rate, spec.n_channels, spec.bits_per_sample, spec.n_samples
    );

    let params = StreamParameters {
        channels: spec.n_channels,
        bits_per_sample: spec.bits_per_sample,
        sample_rate: spec.sample_rate,
        n_samples: spec.n_samples,
    };

    let options = EncoderOptions::default();

    let writer = MediaSinkStream::new(Box::new(File::create(output)?));
    let mut encoder = FlacEncoder::try_new(&params, &options, writer)?;

    let mut planar: Vec<Vec<i32>> = vec![Vec::new(); spec.n_channels as usize];

    loop {
        let n_frames = reader.read_block(&mut planar, options.block_size as usize)?;

        if n_frames == 0 {
            break;
        }

        let block: Vec<&[i32]> = planar.iter().map(|c| c.as_slice()).collect();
        encoder.encode(&block)?;
    }

    let info = encoder.stream_info();
    info!(
        "output: frame bytes min={}, max={}",
        info.frame_byte_len_min, info.frame_byte_len_max
    );

    encoder.finish()?;

    Ok(())
}
