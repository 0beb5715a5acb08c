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

use crate::multilingual::{Dictionary, LanguagePair};
use crate::MultilingualError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// # Multilingual translation set-up
/// Language pairs the model is trained or used on, with one dictionary per language.
#[derive(Debug, Clone)]
pub struct TranslationTask {
    lang_pairs: Vec<LanguagePair>,
    dictionaries: HashMap<String, Dictionary>,
}

impl TranslationTask {
    /// Creates a task, checking that every language of `lang_pairs` has a dictionary
    pub fn new(
        lang_pairs: Vec<LanguagePair>,
        dictionaries: HashMap<String, Dictionary>,
    ) -> Result<TranslationTask, MultilingualError> {
        if lang_pairs.is_empty() {
            return Err(MultilingualError::InvalidConfigurationError(
                "at least one language pair is required".into(),
            ));
        }
        let task = TranslationTask {
            lang_pairs,
            dictionaries,
        };
        for lang in task.langs() {
            task.dictionary(&lang)?;
        }
        Ok(task)
    }

    /// Loads `dict.<lang>.txt` from `directory` for every language of `lang_pairs`
    ///
    /// ```no_run
    /// use multilingual_m2m::multilingual::{LanguagePair, TranslationTask};
    ///
    /// # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
    /// let lang_pairs = LanguagePair::parse_list("en-de,en-fr")?;
    /// let task = TranslationTask::from_dictionary_dir("path/to/data-bin", lang_pairs)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_dictionary_dir<P: AsRef<Path>>(
        directory: P,
        lang_pairs: Vec<LanguagePair>,
    ) -> Result<TranslationTask, MultilingualError> {
        let mut dictionaries = HashMap::new();
        for pair in &lang_pairs {
            for lang in [&pair.source, &pair.target].iter() {
                if !dictionaries.contains_key(lang.as_str()) {
                    let path = directory.as_ref().join(format!("dict.{}.txt", lang));
                    log::debug!("loading dictionary {}", path.display());
                    dictionaries.insert(lang.to_string(), Dictionary::from_file(path)?);
                }
            }
        }
        TranslationTask::new(lang_pairs, dictionaries)
    }

    pub fn lang_pairs(&self) -> &[LanguagePair] {
        &self.lang_pairs
    }

    pub fn dictionaries(&self) -> &HashMap<String, Dictionary> {
        &self.dictionaries
    }

    /// All languages of the task, sorted and deduplicated
    pub fn langs(&self) -> Vec<String> {
        self.lang_pairs
            .iter()
            .flat_map(|pair| vec![pair.source.clone(), pair.target.clone()])
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Source language of every pair, in pair order
    pub fn source_languages(&self) -> Vec<&str> {
        self.lang_pairs
            .iter()
            .map(|pair| pair.source.as_str())
            .collect()
    }

    /// Target language of every pair, in pair order
    pub fn target_languages(&self) -> Vec<&str> {
        self.lang_pairs
            .iter()
            .map(|pair| pair.target.as_str())
            .collect()
    }

    pub fn dictionary(&self, lang: &str) -> Result<&Dictionary, MultilingualError> {
        self.dictionaries.get(lang).ok_or_else(|| {
            MultilingualError::InvalidConfigurationError(format!(
                "no dictionary available for language {}",
                lang
            ))
        })
    }
}
