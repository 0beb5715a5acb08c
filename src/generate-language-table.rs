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

use anyhow::Context;
use clap::Parser;
use multilingual_m2m::language_table::{
    order_records, read_language_records, read_language_records_xlsx, write_language_table,
    LanguageTableConfig,
};
use multilingual_m2m::multilingual::LanguageFamilies;
use multilingual_m2m::Config;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Generates the `languageTable` module of the translation demo from the language metadata table
#[derive(Parser, Debug)]
#[command(name = "generate-language-table", version)]
struct Args {
    /// Spreadsheet (`.xlsx`, `.xls`, `.ods`) or CSV table with the columns `语言英文`, `语言缩写`
    /// and `语言中文`
    #[arg(short, long)]
    input: PathBuf,

    /// Generated JavaScript file
    #[arg(short, long, default_value = "data.js")]
    output: PathBuf,

    /// JSON family table: `[{"name": "family_1", "languages": ["de", "nl"]}, ...]`
    #[arg(short, long)]
    families: Option<PathBuf>,

    /// Languages listed first, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "en,zh,fr,de")]
    top: Vec<String>,

    /// Families ranked below this value provide the target languages
    #[arg(long, default_value_t = 7)]
    max_family_rank: u32,

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

fn is_spreadsheet(path: &Path) -> bool {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) => ["xlsx", "xlsm", "xls", "ods"]
            .iter()
            .any(|candidate| extension.eq_ignore_ascii_case(candidate)),
        None => false,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity_to_log_level(args.verbose)),
    )
    .init();

    let families = match &args.families {
        Some(path) => LanguageFamilies::from_file(path)
            .with_context(|| format!("loading families from {}", path.display()))?,
        None => LanguageFamilies::default(),
    };
    let config = LanguageTableConfig {
        top_languages: args.top.clone(),
        families,
        max_family_rank: args.max_family_rank,
    };
    println!("{}", config.target_languages().join(","));

    let records = if is_spreadsheet(&args.input) {
        read_language_records_xlsx(&args.input)
            .with_context(|| format!("reading {}", args.input.display()))?
    } else {
        let input = File::open(&args.input)
            .with_context(|| format!("opening {}", args.input.display()))?;
        read_language_records(input)?
    };
    let ordered = order_records(&records, &config);
    let output = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    write_language_table(BufWriter::new(output), &ordered)?;
    log::info!(
        "wrote {} languages to {}",
        ordered.len(),
        args.output.display()
    );
    Ok(())
}
