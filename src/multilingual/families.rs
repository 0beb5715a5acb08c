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

use crate::{Config, MultilingualError};
use serde::{Deserialize, Serialize};

/// # Group of languages sharing an encoder and/or a decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageFamily {
    /// Family key, e.g. `family_3`. Used as variable store path component.
    pub name: String,
    /// Language codes belonging to the family
    pub languages: Vec<String>,
}

/// # Language family table
/// Ordered list of families. A language that is not listed in any family forms a family of its
/// own, keyed by the language code.
///
/// ```
/// use multilingual_m2m::multilingual::{LanguageFamilies, LanguageFamily};
///
/// let families = LanguageFamilies::new(vec![LanguageFamily {
///     name: "family_1".to_string(),
///     languages: vec!["de".to_string(), "nl".to_string()],
/// }]);
/// assert_eq!(families.family_of("nl"), "family_1");
/// assert_eq!(families.family_of("en"), "en");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageFamilies {
    families: Vec<LanguageFamily>,
}

impl Config for LanguageFamilies {}

impl LanguageFamilies {
    pub fn new(families: Vec<LanguageFamily>) -> LanguageFamilies {
        LanguageFamilies { families }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageFamily> {
        self.families.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Returns the key of the family `lang` belongs to (first match in table order), or `lang`
    /// itself when no family lists it.
    pub fn family_of<'a>(&'a self, lang: &'a str) -> &'a str {
        self.families
            .iter()
            .find(|family| family.languages.iter().any(|member| member == lang))
            .map(|family| family.name.as_str())
            .unwrap_or(lang)
    }

    /// Rank of a family, given by the first number embedded in its name (`family_3` -> 3).
    pub fn rank(name: &str) -> Option<u32> {
        let digits: String = name
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    /// Family keys end up in parameter names: they must be non-empty and may not contain `.`.
    pub fn validate(&self) -> Result<(), MultilingualError> {
        for family in &self.families {
            if family.name.is_empty() || family.name.contains('.') {
                return Err(MultilingualError::InvalidConfigurationError(format!(
                    "invalid language family key {:?}",
                    family.name
                )));
            }
        }
        Ok(())
    }
}
