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
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const BOS: &str = "<s>";
const PAD: &str = "<pad>";
const EOS: &str = "</s>";
const UNK: &str = "<unk>";
const OVERWRITE_FLAG: &str = "#fairseq:overwrite";

/// # Symbol dictionary in the fairseq text format
/// Maps symbols to consecutive ids. The special symbols `<s>`, `<pad>`, `</s>` and `<unk>`
/// always take the ids 0 to 3, followed by the symbols of the dictionary file in order.
///
/// Each line of a dictionary file reads `<symbol> <count>`, optionally followed by the
/// `#fairseq:overwrite` flag allowing a symbol to be redefined.
#[derive(Debug, Clone)]
pub struct Dictionary {
    symbols: Vec<String>,
    counts: Vec<i64>,
    indices: HashMap<String, i64>,
    bos_index: i64,
    pad_index: i64,
    eos_index: i64,
    unk_index: i64,
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.symbols == other.symbols
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Dictionary::new()
    }
}

impl Dictionary {
    /// Creates a dictionary holding only the special symbols
    pub fn new() -> Dictionary {
        let mut dictionary = Dictionary {
            symbols: vec![],
            counts: vec![],
            indices: HashMap::new(),
            bos_index: 0,
            pad_index: 0,
            eos_index: 0,
            unk_index: 0,
        };
        dictionary.bos_index = dictionary.add_symbol(BOS, 1);
        dictionary.pad_index = dictionary.add_symbol(PAD, 1);
        dictionary.eos_index = dictionary.add_symbol(EOS, 1);
        dictionary.unk_index = dictionary.add_symbol(UNK, 1);
        dictionary
    }

    /// Loads a dictionary file, e.g. `dict.de.txt`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Dictionary, MultilingualError> {
        let f = File::open(path.as_ref())?;
        Dictionary::from_reader(f).map_err(|error| match error {
            MultilingualError::ParseError(message) => MultilingualError::ParseError(format!(
                "{}: {}",
                path.as_ref().display(),
                message
            )),
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Dictionary, MultilingualError> {
        let mut dictionary = Dictionary::new();
        for (line_number, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (line, overwrite) = match line.strip_suffix(OVERWRITE_FLAG) {
                Some(stripped) => (stripped.trim_end(), true),
                None => (line, false),
            };
            let (symbol, count) = line.rsplit_once(' ').ok_or_else(|| {
                MultilingualError::ParseError(format!(
                    "line {}: expected `<symbol> <count>`, got {:?}",
                    line_number + 1,
                    line
                ))
            })?;
            let count = count.parse::<i64>().map_err(|_| {
                MultilingualError::ParseError(format!(
                    "line {}: invalid count {:?}",
                    line_number + 1,
                    count
                ))
            })?;
            if dictionary.indices.contains_key(symbol) && !overwrite {
                return Err(MultilingualError::ParseError(format!(
                    "line {}: duplicate symbol {:?}, add {} to redefine it",
                    line_number + 1,
                    symbol,
                    OVERWRITE_FLAG
                )));
            }
            if overwrite {
                dictionary.overwrite_symbol(symbol, count);
            } else {
                dictionary.add_symbol(symbol, count);
            }
        }
        Ok(dictionary)
    }

    /// Adds a symbol (or increments its count if it is already known) and returns its id
    pub fn add_symbol(&mut self, symbol: &str, count: i64) -> i64 {
        if let Some(&index) = self.indices.get(symbol) {
            self.counts[index as usize] += count;
            return index;
        }
        let index = self.symbols.len() as i64;
        self.symbols.push(symbol.to_string());
        self.counts.push(count);
        self.indices.insert(symbol.to_string(), index);
        index
    }

    fn overwrite_symbol(&mut self, symbol: &str, count: i64) {
        match self.indices.get(symbol) {
            Some(&index) => self.counts[index as usize] = count,
            None => {
                self.add_symbol(symbol, count);
            }
        }
    }

    pub fn len(&self) -> i64 {
        self.symbols.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn bos(&self) -> i64 {
        self.bos_index
    }

    pub fn pad(&self) -> i64 {
        self.pad_index
    }

    pub fn eos(&self) -> i64 {
        self.eos_index
    }

    pub fn unk(&self) -> i64 {
        self.unk_index
    }

    /// Id of `symbol`, or the id of `<unk>` for unknown symbols
    pub fn index(&self, symbol: &str) -> i64 {
        self.indices
            .get(symbol)
            .copied()
            .unwrap_or(self.unk_index)
    }

    /// Id of `symbol` if it is part of the dictionary
    pub fn get(&self, symbol: &str) -> Option<i64> {
        self.indices.get(symbol).copied()
    }

    pub fn symbol(&self, index: i64) -> Option<&str> {
        if index < 0 {
            return None;
        }
        self.symbols.get(index as usize).map(String::as_str)
    }

    pub fn count(&self, index: i64) -> Option<i64> {
        if index < 0 {
            return None;
        }
        self.counts.get(index as usize).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (i64, &str)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (index as i64, symbol.as_str()))
    }
}
