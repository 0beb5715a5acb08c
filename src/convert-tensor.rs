// Copyright 2019-present, Laurent Mazare.
// Copyright 2019-present Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

extern crate tch;

use clap::Parser;
use multilingual_m2m::MultilingualError;
use std::path::PathBuf;

/// Converts a numpy `.npz` archive of named tensors to the `.ot` format read by the model
#[derive(Parser, Debug)]
#[command(name = "convert-tensor", version)]
struct Args {
    /// Source `.npz` archive
    source: PathBuf,

    /// Destination `.ot` file
    destination: PathBuf,

    /// Prefix removed from the tensor names (e.g. `model.`)
    #[arg(long)]
    strip_prefix: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn verbosity_to_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn main() -> Result<(), MultilingualError> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity_to_log_level(args.verbose)),
    )
    .init();

    let mut tensors = tch::Tensor::read_npz(&args.source)?;
    if let Some(prefix) = &args.strip_prefix {
        for (name, _) in tensors.iter_mut() {
            if let Some(stripped) = name.strip_prefix(prefix.as_str()) {
                *name = stripped.to_string();
            }
        }
    }
    log::info!(
        "writing {} tensors to {}",
        tensors.len(),
        args.destination.display()
    );
    tch::Tensor::save_multi(&tensors, &args.destination)?;

    Ok(())
}
