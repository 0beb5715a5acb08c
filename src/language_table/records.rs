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

use crate::MultilingualError;
use calamine::{open_workbook_auto, Data, Reader};
use pinyin::ToPinyin;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// # Entry of the demo language table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecord {
    /// English name, e.g. `German`
    pub en: String,
    /// Language code, e.g. `de`
    pub abs: String,
    /// Chinese name, e.g. `德语`
    pub chinese: String,
    /// Toneless romanization of the Chinese name, e.g. `deyu`
    pub pinyin: String,
}

impl LanguageRecord {
    pub fn new(en: &str, abs: &str, chinese: &str) -> LanguageRecord {
        LanguageRecord {
            en: en.to_string(),
            abs: abs.to_string(),
            chinese: chinese.to_string(),
            pinyin: romanize(chinese),
        }
    }
}

const EN_COLUMN: &str = "语言英文";
const ABS_COLUMN: &str = "语言缩写";
const CHINESE_COLUMN: &str = "语言中文";

#[derive(Debug, Deserialize)]
struct LanguageRow {
    #[serde(rename = "语言英文")]
    en: String,
    #[serde(rename = "语言缩写")]
    abs: String,
    #[serde(rename = "语言中文")]
    chinese: String,
}

/// Toneless pinyin of the Chinese characters of `text`, without separators. Other characters
/// are kept as is.
///
/// ```
/// use multilingual_m2m::language_table::romanize;
///
/// assert_eq!(romanize("德语"), "deyu");
/// assert_eq!(romanize("N'Ko语"), "N'Koyu");
/// ```
pub fn romanize(text: &str) -> String {
    let mut romanized = String::with_capacity(text.len() * 2);
    for character in text.chars() {
        match character.to_pinyin() {
            Some(pinyin) => romanized.push_str(pinyin.plain()),
            None => romanized.push(character),
        }
    }
    romanized
}

/// Reads the language metadata table, a CSV file with the columns `语言英文` (English name),
/// `语言缩写` (language code) and `语言中文` (Chinese name). Other columns are ignored.
pub fn read_language_records<R: Read>(
    reader: R,
) -> Result<Vec<LanguageRecord>, MultilingualError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = vec![];
    for row in csv_reader.deserialize::<LanguageRow>() {
        let row = row?;
        records.push(LanguageRecord::new(&row.en, &row.abs, &row.chinese));
    }
    log::debug!("read {} language records", records.len());
    Ok(records)
}

/// Reads the language metadata table from the first worksheet of a spreadsheet (`.xlsx`, `.xls`,
/// `.ods`). The first row holds the column names, matched as in `read_language_records`. Rows
/// without a language code are skipped.
pub fn read_language_records_xlsx<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<LanguageRecord>, MultilingualError> {
    let mut workbook = open_workbook_auto(path.as_ref())?;
    let range = workbook.worksheet_range_at(0).ok_or_else(|| {
        MultilingualError::ParseError(format!(
            "{} does not contain any worksheet",
            path.as_ref().display()
        ))
    })??;
    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| {
        MultilingualError::ParseError(format!("{} is empty", path.as_ref().display()))
    })?;
    let column = |name: &str| -> Result<usize, MultilingualError> {
        header
            .iter()
            .position(|cell| cell_text(cell) == name)
            .ok_or_else(|| MultilingualError::ParseError(format!("missing column {}", name)))
    };
    let (en, abs, chinese) = (column(EN_COLUMN)?, column(ABS_COLUMN)?, column(CHINESE_COLUMN)?);

    let mut records = vec![];
    for row in rows {
        let value = |index: usize| row.get(index).map(cell_text).unwrap_or_default();
        let code = value(abs);
        if code.is_empty() {
            continue;
        }
        records.push(LanguageRecord::new(&value(en), &code, &value(chinese)));
    }
    log::debug!("read {} language records", records.len());
    Ok(records)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}
