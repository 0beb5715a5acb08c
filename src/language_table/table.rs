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

use crate::language_table::LanguageRecord;
use crate::multilingual::LanguageFamilies;
use crate::{Config, MultilingualError};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// # Language table ordering
/// Languages listed first in the demo table: the `top_languages`, followed by the languages of
/// every family ranked below `max_family_rank`.
pub struct LanguageTableConfig {
    pub top_languages: Vec<String>,
    pub families: LanguageFamilies,
    pub max_family_rank: u32,
}

impl Config for LanguageTableConfig {}

impl Default for LanguageTableConfig {
    fn default() -> Self {
        LanguageTableConfig {
            top_languages: ["en", "zh", "fr", "de"]
                .iter()
                .map(|lang| lang.to_string())
                .collect(),
            families: LanguageFamilies::default(),
            max_family_rank: 7,
        }
    }
}

impl LanguageTableConfig {
    /// Languages of the families ranked below `max_family_rank`, in family order, without
    /// duplicates and without the top languages. Families without a rank in their name are
    /// ignored.
    pub fn target_languages(&self) -> Vec<String> {
        let mut seen = self
            .top_languages
            .iter()
            .map(String::as_str)
            .collect::<HashSet<&str>>();
        let mut target_languages = vec![];
        for family in self.families.iter() {
            match LanguageFamilies::rank(&family.name) {
                Some(rank) if rank < self.max_family_rank => {
                    for lang in &family.languages {
                        if seen.insert(lang.as_str()) {
                            target_languages.push(lang.clone());
                        }
                    }
                }
                Some(_) => {}
                None => log::debug!("family {} has no rank, ignored", family.name),
            }
        }
        target_languages
    }
}

/// Orders the records for the demo: top languages first, then the target languages, then every
/// other language in table order. Only the first record of a language code is kept.
pub fn order_records(
    records: &[LanguageRecord],
    config: &LanguageTableConfig,
) -> Vec<LanguageRecord> {
    let mut by_code: HashMap<&str, &LanguageRecord> = HashMap::new();
    let mut table_order = vec![];
    for record in records {
        if by_code.contains_key(record.abs.as_str()) {
            log::warn!("duplicate entry for {}, keeping the first one", record.abs);
            continue;
        }
        by_code.insert(record.abs.as_str(), record);
        table_order.push(record);
    }

    let target_languages = config.target_languages();
    let mut ordered = Vec::with_capacity(table_order.len());
    let mut placed = HashSet::new();
    for lang in config.top_languages.iter().chain(target_languages.iter()) {
        if placed.contains(lang.as_str()) {
            continue;
        }
        match by_code.get(lang.as_str()) {
            Some(record) => {
                ordered.push((*record).clone());
                placed.insert(lang.as_str());
            }
            None => log::warn!("language {} is not part of the table, skipped", lang),
        }
    }
    for record in table_order {
        if !placed.contains(record.abs.as_str()) {
            ordered.push(record.clone());
        }
    }
    ordered
}

/// JSON formatter writing `, ` and `: ` separators and escaping every character outside of
/// printable ASCII as `\uXXXX` (UTF-16 code units), the way Python's `json.dumps` does.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (index, character) in fragment.char_indices() {
            if character.is_ascii() && character != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in character.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + character.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Writes `records` as a JavaScript module exporting the `languageTable` array, one object per
/// line. Objects are formatted like Python's `json.dumps` output (`{"en": "German", ...}` with
/// non-ASCII text escaped), keeping the file byte-compatible with data files generated in Python.
pub fn write_language_table<W: Write>(
    mut writer: W,
    records: &[LanguageRecord],
) -> Result<(), MultilingualError> {
    writer.write_all(b"const languageTable = [ \n")?;
    for record in records {
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, AsciiFormatter);
        record.serialize(&mut serializer)?;
        writer.write_all(b",\n")?;
    }
    writer.write_all(b"];\nexport { languageTable };")?;
    writer.flush()?;
    Ok(())
}
