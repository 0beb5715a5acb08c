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

use crate::multilingual::{Dictionary, TranslationTask};
use crate::MultilingualError;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tch::nn::{embedding, EmbeddingConfig};
use tch::{nn, no_grad, Tensor};

/// Reads a text embedding file: a header line (skipped), then one `token v1 v2 ... vn` line per
/// token.
pub fn parse_embedding<P: AsRef<Path>>(
    path: P,
) -> Result<HashMap<String, Tensor>, MultilingualError> {
    let f = File::open(path.as_ref())?;
    parse_embedding_from_reader(f)
}

pub fn parse_embedding_from_reader<R: Read>(
    reader: R,
) -> Result<HashMap<String, Tensor>, MultilingualError> {
    let mut embeddings = HashMap::new();
    for (line_number, line) in BufReader::new(reader).lines().enumerate().skip(1) {
        let line = line?;
        let mut pieces = line.split_whitespace();
        let token = match pieces.next() {
            Some(token) => token,
            None => continue,
        };
        let values = pieces
            .map(str::parse::<f32>)
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|error| {
                MultilingualError::ParseError(format!(
                    "embedding line {}: {}",
                    line_number + 1,
                    error
                ))
            })?;
        embeddings.insert(token.to_string(), Tensor::of_slice(&values));
    }
    Ok(embeddings)
}

/// Copies the vectors of `embed_dict` into the rows of `embedding` for every symbol of
/// `dictionary` that has one. Returns the number of rows set.
pub fn load_embedding(
    embed_dict: &HashMap<String, Tensor>,
    dictionary: &Dictionary,
    embedding: &nn::Embedding,
) -> Result<usize, MultilingualError> {
    let embedding_dim = embedding.ws.size()[1];
    let mut loaded = 0;
    for (index, symbol) in dictionary.symbols() {
        if let Some(vector) = embed_dict.get(symbol) {
            if vector.size()[0] != embedding_dim {
                return Err(MultilingualError::ValueError(format!(
                    "embedding for {:?} has dimension {}, expected {}",
                    symbol,
                    vector.size()[0],
                    embedding_dim
                )));
            }
            let mut row = embedding.ws.get(index);
            no_grad(|| {
                row.copy_(&vector.to_device(row.device()).to_kind(row.kind()));
            });
            loaded += 1;
        }
    }
    Ok(loaded)
}

/// Builds an embedding table for `dictionary`, with the dictionary padding symbol as padding
/// index, optionally initialized from a text embedding file.
pub fn build_embedding<'p, P>(
    p: P,
    dictionary: &Dictionary,
    embed_dim: i64,
    path: Option<&Path>,
) -> Result<nn::Embedding, MultilingualError>
where
    P: Borrow<nn::Path<'p>>,
{
    let embedding_config = EmbeddingConfig {
        padding_idx: dictionary.pad(),
        ..Default::default()
    };
    let embeddings = embedding(p, dictionary.len(), embed_dim, embedding_config);
    if let Some(path) = path {
        let embed_dict = parse_embedding(path)?;
        let loaded = load_embedding(&embed_dict, dictionary, &embeddings)?;
        log::info!(
            "loaded {} of {} embeddings from {}",
            loaded,
            dictionary.len(),
            path.display()
        );
    }
    Ok(embeddings)
}

/// Builds one embedding table shared by `langs`. All of them must use the same dictionary.
pub fn build_shared_embeddings<'p, P>(
    p: P,
    task: &TranslationTask,
    langs: &[&str],
    embed_dim: i64,
    pretrained_embed_path: Option<&Path>,
) -> Result<nn::Embedding, MultilingualError>
where
    P: Borrow<nn::Path<'p>>,
{
    let first_lang = langs.first().ok_or_else(|| {
        MultilingualError::InvalidConfigurationError(
            "shared embeddings require at least one language".into(),
        )
    })?;
    let dictionary = task.dictionary(first_lang)?;
    for lang in &langs[1..] {
        if task.dictionary(lang)? != dictionary {
            return Err(MultilingualError::InvalidConfigurationError(format!(
                "sharing embeddings requires a joined dictionary, {} and {} differ",
                first_lang, lang
            )));
        }
    }
    build_embedding(p, dictionary, embed_dim, pretrained_embed_path)
}
