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
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// # Translation direction
/// Written `src-tgt` (e.g. `en-de`) in configurations and parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: &str, target: &str) -> LanguagePair {
        LanguagePair {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Parses a comma-separated list of pairs, such as `en-de,en-fr,fr-de`.
    pub fn parse_list(pairs: &str) -> Result<Vec<LanguagePair>, MultilingualError> {
        pairs
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for LanguagePair {
    type Err = MultilingualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(target), None) if !source.is_empty() && !target.is_empty() => {
                Ok(LanguagePair::new(source, target))
            }
            _ => Err(MultilingualError::ValueError(format!(
                "invalid language pair {:?}, expected `source-target`",
                s
            ))),
        }
    }
}

impl TryFrom<String> for LanguagePair {
    type Error = MultilingualError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguagePair> for String {
    fn from(pair: LanguagePair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}
