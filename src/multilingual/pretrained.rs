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

use crate::multilingual::Dictionary;
use crate::resources::ResourceProvider;
use crate::MultilingualError;
use std::collections::HashMap;
use std::path::Path;
use tch::{nn, no_grad, Tensor};

const EMBEDDING_NAMES: [&str; 3] = [
    "shared.weight",
    "encoder.embed_tokens.weight",
    "decoder.embed_tokens.weight",
];

/// # Pretrained M2M100 weights
/// Named tensors of an `M2M100Model` checkpoint (Transformers naming, with or without the
/// leading `model.`), optionally with the fairseq dictionary its embedding rows follow.
pub struct PretrainedM2M {
    tensors: HashMap<String, Tensor>,
    dictionary: Option<Dictionary>,
}

impl PretrainedM2M {
    /// Loads a checkpoint saved in the `.ot` format (see the `convert-tensor` binary)
    pub fn from_file<P: AsRef<Path>>(
        checkpoint: P,
        dictionary: Option<&Path>,
    ) -> Result<PretrainedM2M, MultilingualError> {
        log::info!(
            "loading pretrained M2M100 weights from {}",
            checkpoint.as_ref().display()
        );
        let tensors = Tensor::load_multi(checkpoint.as_ref())?;
        let dictionary = dictionary.map(Dictionary::from_file).transpose()?;
        Ok(PretrainedM2M::new(tensors, dictionary))
    }

    /// Loads the checkpoint (and dictionary) from resources, downloading remote files if needed
    ///
    /// ```no_run
    /// use multilingual_m2m::m2m_100::{M2M100DictionaryResources, M2M100ModelResources};
    /// use multilingual_m2m::multilingual::PretrainedM2M;
    /// use multilingual_m2m::resources::RemoteResource;
    ///
    /// # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
    /// let checkpoint = RemoteResource::from_pretrained(M2M100ModelResources::M2M100_418M);
    /// let dictionary = RemoteResource::from_pretrained(M2M100DictionaryResources::M2M100_418M);
    /// let pretrained = PretrainedM2M::from_resources(&checkpoint, Some(&dictionary))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_resources(
        checkpoint: &dyn ResourceProvider,
        dictionary: Option<&dyn ResourceProvider>,
    ) -> Result<PretrainedM2M, MultilingualError> {
        let checkpoint = checkpoint.get_local_path()?;
        let dictionary = dictionary
            .map(|resource| resource.get_local_path())
            .transpose()?;
        PretrainedM2M::from_file(checkpoint, dictionary.as_deref())
    }

    pub fn new(tensors: Vec<(String, Tensor)>, dictionary: Option<Dictionary>) -> PretrainedM2M {
        let tensors = tensors
            .into_iter()
            .map(|(name, tensor)| match name.strip_prefix("model.") {
                Some(stripped) => (stripped.to_string(), tensor),
                None => (name, tensor),
            })
            .collect();
        PretrainedM2M {
            tensors,
            dictionary,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    fn embedding_weights(&self) -> Option<&Tensor> {
        EMBEDDING_NAMES.iter().find_map(|name| self.tensors.get(*name))
    }

    /// Initializes `embedding` (rows following `dictionary`) from the pretrained embedding matrix.
    ///
    /// With a pretrained dictionary every symbol found in both dictionaries is copied. Without
    /// one, the whole matrix is copied when the shapes match. Returns the number of rows set.
    pub fn init_embedding(
        &self,
        dictionary: &Dictionary,
        embedding: &nn::Embedding,
    ) -> Result<usize, MultilingualError> {
        let weights = match self.embedding_weights() {
            Some(weights) => weights,
            None => {
                log::warn!("pretrained checkpoint has no embedding matrix, embeddings left as is");
                return Ok(0);
            }
        };
        if weights.size()[1] != embedding.ws.size()[1] {
            return Err(MultilingualError::ValueError(format!(
                "pretrained embedding dimension {} does not match model dimension {}",
                weights.size()[1],
                embedding.ws.size()[1]
            )));
        }
        let weights = weights
            .to_device(embedding.ws.device())
            .to_kind(embedding.ws.kind());

        match &self.dictionary {
            Some(pretrained_dictionary) => {
                let pretrained_rows = weights.size()[0];
                let (target_ids, source_ids): (Vec<i64>, Vec<i64>) = dictionary
                    .symbols()
                    .filter_map(|(index, symbol)| {
                        pretrained_dictionary
                            .get(symbol)
                            .filter(|&pretrained_index| pretrained_index < pretrained_rows)
                            .map(|pretrained_index| (index, pretrained_index))
                    })
                    .unzip();
                if target_ids.is_empty() {
                    return Ok(0);
                }
                let device = embedding.ws.device();
                let target_ids = Tensor::of_slice(&target_ids).to_device(device);
                let source_ids = Tensor::of_slice(&source_ids).to_device(device);
                let rows = weights.index_select(0, &source_ids);
                let mut ws = embedding.ws.shallow_clone();
                no_grad(|| {
                    let _ = ws.index_copy_(0, &target_ids, &rows);
                });
                Ok(target_ids.size()[0] as usize)
            }
            None => {
                if weights.size() != embedding.ws.size() {
                    log::warn!(
                        "pretrained embedding shape {:?} differs from {:?} and no pretrained dictionary was given, embeddings left as is",
                        weights.size(),
                        embedding.ws.size()
                    );
                    return Ok(0);
                }
                let mut ws = embedding.ws.shallow_clone();
                no_grad(|| ws.copy_(&weights));
                Ok(weights.size()[0] as usize)
            }
        }
    }

    /// Copies the pretrained `source_prefix.*` tensors (e.g. `encoder.layers.0.fc1.weight`) into
    /// the model variables named `target_prefix.*`. Token embeddings are not part of the modules
    /// and are handled by `init_embedding`. Returns the number of tensors copied.
    pub fn load_module(
        &self,
        source_prefix: &str,
        variables: &HashMap<String, Tensor>,
        target_prefix: &str,
    ) -> Result<usize, MultilingualError> {
        let mut copied = 0;
        for (name, variable) in variables {
            let suffix = match name
                .strip_prefix(target_prefix)
                .and_then(|rest| rest.strip_prefix('.'))
            {
                Some(suffix) => suffix,
                None => continue,
            };
            match self.tensors.get(&format!("{}.{}", source_prefix, suffix)) {
                Some(value) if value.size() == variable.size() => {
                    let mut variable = variable.shallow_clone();
                    no_grad(|| {
                        variable.copy_(&value.to_device(variable.device()).to_kind(variable.kind()))
                    });
                    copied += 1;
                }
                Some(value) => log::warn!(
                    "pretrained {}.{} has shape {:?}, {} expects {:?}, skipped",
                    source_prefix,
                    suffix,
                    value.size(),
                    name,
                    variable.size()
                ),
                None => log::debug!("no pretrained value for {}", name),
            }
        }
        Ok(copied)
    }
}
