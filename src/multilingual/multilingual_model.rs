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

use crate::common::linear::{linear_no_bias, LinearNoBias, LinearNoBiasConfig};
use crate::m2m_100::{M2M100Decoder, M2M100Encoder};
use crate::multilingual::embeddings::{build_embedding, build_shared_embeddings};
use crate::multilingual::{
    Dictionary, LanguageFamilies, LanguagePair, MultilingualConfig, PretrainedM2M,
    TranslationTask,
};
use crate::MultilingualError;
use std::collections::{BTreeSet, HashMap, HashSet};
use tch::{nn, no_grad, Kind, Tensor};

const STATE_DICT_PREFIX: &str = "models";
const EMBED_TOKENS: &str = "embed_tokens.weight";
const OUTPUT_PROJECTION: &str = "output_projection.weight";

struct EmbeddingTable {
    name: String,
    embedding: nn::Embedding,
    dictionary: Dictionary,
    shared: bool,
}

struct FamilyEncoder {
    prefix: String,
    encoder: M2M100Encoder,
    embedding: usize,
}

struct FamilyDecoder {
    prefix: String,
    decoder: M2M100Decoder,
    embedding: usize,
    output_projection: Option<LinearNoBias>,
}

/// Builds the family modules lazily: a module is created the first time a language of its family
/// is requested, and reused for every other language of the family.
struct ModuleBuilder<'a, 'p> {
    p: nn::Path<'p>,
    config: &'a MultilingualConfig,
    task: &'a TranslationTask,
    families: &'a LanguageFamilies,
    embeddings: Vec<EmbeddingTable>,
    shared_encoder_embedding: Option<usize>,
    shared_decoder_embedding: Option<usize>,
    encoders: Vec<FamilyEncoder>,
    decoders: Vec<FamilyDecoder>,
    encoder_index: HashMap<String, usize>,
    decoder_index: HashMap<String, usize>,
}

impl<'a, 'p> ModuleBuilder<'a, 'p> {
    fn push_embedding(
        &mut self,
        name: &str,
        embedding: nn::Embedding,
        lang: &str,
        shared: bool,
    ) -> Result<usize, MultilingualError> {
        self.embeddings.push(EmbeddingTable {
            name: format!("{}.weight", name),
            embedding,
            dictionary: self.task.dictionary(lang)?.clone(),
            shared,
        });
        Ok(self.embeddings.len() - 1)
    }

    fn build_shared_embeddings(&mut self) -> Result<(), MultilingualError> {
        let config = self.config;
        let task = self.task;
        let source_langs = task.source_languages();
        let target_langs = task.target_languages();
        if config.share_all_embeddings {
            let langs = task.langs();
            let langs = langs.iter().map(String::as_str).collect::<Vec<&str>>();
            let embedding = build_shared_embeddings(
                &(&self.p / "embeddings") / "shared",
                task,
                &langs,
                config.encoder_embed_dim,
                config.encoder_embed_path.as_deref(),
            )?;
            let first = first_language(&langs)?;
            let index = self.push_embedding("embeddings.shared", embedding, first, true)?;
            self.shared_encoder_embedding = Some(index);
            self.shared_decoder_embedding = Some(index);
            return Ok(());
        }
        if config.share_encoder_embeddings {
            let embedding = build_shared_embeddings(
                &(&self.p / "embeddings") / "shared_encoder",
                task,
                &source_langs,
                config.encoder_embed_dim,
                config.encoder_embed_path.as_deref(),
            )?;
            let index = self.push_embedding(
                "embeddings.shared_encoder",
                embedding,
                first_language(&source_langs)?,
                true,
            )?;
            self.shared_encoder_embedding = Some(index);
        }
        if config.share_decoder_embeddings {
            let embedding = build_shared_embeddings(
                &(&self.p / "embeddings") / "shared_decoder",
                task,
                &target_langs,
                config.decoder_embed_dim,
                config.decoder_embed_path.as_deref(),
            )?;
            let index = self.push_embedding(
                "embeddings.shared_decoder",
                embedding,
                first_language(&target_langs)?,
                true,
            )?;
            self.shared_decoder_embedding = Some(index);
        }
        Ok(())
    }

    fn family_embedding(
        &mut self,
        side: &str,
        family: &str,
        lang: &str,
    ) -> Result<usize, MultilingualError> {
        let (embed_dim, embed_path) = match side {
            "encoder" => (
                self.config.encoder_embed_dim,
                self.config.encoder_embed_path.as_deref(),
            ),
            _ => (
                self.config.decoder_embed_dim,
                self.config.decoder_embed_path.as_deref(),
            ),
        };
        let embedding = build_embedding(
            &(&(&self.p / "embeddings") / side) / family,
            self.task.dictionary(lang)?,
            embed_dim,
            embed_path,
        )?;
        self.push_embedding(
            &format!("embeddings.{}.{}", side, family),
            embedding,
            lang,
            false,
        )
    }

    /// Per-family embeddings are indexed with the ids of a single dictionary
    fn check_family_dictionary(
        &self,
        embedding: usize,
        family: &str,
        lang: &str,
    ) -> Result<(), MultilingualError> {
        let table = &self.embeddings[embedding];
        if !table.shared && &table.dictionary != self.task.dictionary(lang)? {
            return Err(MultilingualError::InvalidConfigurationError(format!(
                "languages of family {} must share a dictionary, {} differs",
                family, lang
            )));
        }
        Ok(())
    }

    fn get_encoder(&mut self, lang: &str) -> Result<usize, MultilingualError> {
        let family = self.families.family_of(lang).to_string();
        if let Some(&index) = self.encoder_index.get(&family) {
            self.check_family_dictionary(self.encoders[index].embedding, &family, lang)?;
            return Ok(index);
        }
        check_module_name(&family)?;
        let embedding = match self.shared_encoder_embedding {
            Some(index) => index,
            None => self.family_embedding("encoder", &family, lang)?,
        };
        let encoder_config = self
            .config
            .encoder_config(self.embeddings[embedding].dictionary.pad());
        let encoder = M2M100Encoder::new(&(&self.p / "encoders") / family.as_str(), &encoder_config);
        log::debug!("created encoder for family {}", family);
        self.encoders.push(FamilyEncoder {
            prefix: format!("encoders.{}", family),
            encoder,
            embedding,
        });
        let index = self.encoders.len() - 1;
        self.encoder_index.insert(family, index);
        Ok(index)
    }

    fn get_decoder(&mut self, lang: &str) -> Result<usize, MultilingualError> {
        let family = self.families.family_of(lang).to_string();
        if let Some(&index) = self.decoder_index.get(&family) {
            self.check_family_dictionary(self.decoders[index].embedding, &family, lang)?;
            return Ok(index);
        }
        check_module_name(&family)?;
        let embedding = match self.shared_decoder_embedding {
            Some(index) => index,
            None => self.family_embedding("decoder", &family, lang)?,
        };
        let pad = self.embeddings[embedding].dictionary.pad();
        let vocab_size = self.embeddings[embedding].dictionary.len();
        let decoder_config = self.config.decoder_config(pad);
        let decoder_path = &(&self.p / "decoders") / family.as_str();
        let decoder = M2M100Decoder::new(&decoder_path, &decoder_config);
        let output_projection = if self.config.share_decoder_input_output_embed {
            None
        } else {
            Some(linear_no_bias(
                &decoder_path / "output_projection",
                self.config.decoder_embed_dim,
                vocab_size,
                LinearNoBiasConfig::scaled_normal(self.config.decoder_embed_dim),
            ))
        };
        log::debug!("created decoder for family {}", family);
        self.decoders.push(FamilyDecoder {
            prefix: format!("decoders.{}", family),
            decoder,
            embedding,
            output_projection,
        });
        let index = self.decoders.len() - 1;
        self.decoder_index.insert(family, index);
        Ok(index)
    }
}

fn first_language<'a>(langs: &[&'a str]) -> Result<&'a str, MultilingualError> {
    langs.first().copied().ok_or_else(|| {
        MultilingualError::InvalidConfigurationError(
            "at least one language pair is required".into(),
        )
    })
}

fn check_module_name(family: &str) -> Result<(), MultilingualError> {
    if family.is_empty() || family.contains('.') {
        return Err(MultilingualError::InvalidConfigurationError(format!(
            "{:?} cannot be used as a module name",
            family
        )));
    }
    Ok(())
}

/// # Family-shared multilingual M2M100 model
/// One M2M100 encoder per source language family and one M2M100 decoder per target language
/// family. Every language pair of the task is served by the encoder of its source family and the
/// decoder of its target family, so that languages of a family share their parameters.
///
/// Variables are created under the root of the variable store:
/// - `encoders.<family>.*` and `decoders.<family>.*` for the family modules (the decoder output
///   projection is `decoders.<family>.output_projection.weight`)
/// - `embeddings.shared.weight`, `embeddings.shared_encoder.weight`,
///   `embeddings.shared_decoder.weight` for shared token embeddings, or
///   `embeddings.encoder.<family>.weight` and `embeddings.decoder.<family>.weight`
///
/// The per-pair view (`state_dict`, `load_state_dict`) names parameters
/// `models.<src>-<tgt>.encoder.*` and `models.<src>-<tgt>.decoder.*`.
pub struct MultilingualM2M100Model {
    lang_pairs: Vec<LanguagePair>,
    families: LanguageFamilies,
    embeddings: Vec<EmbeddingTable>,
    encoders: Vec<FamilyEncoder>,
    decoders: Vec<FamilyDecoder>,
    encoder_index: HashMap<String, usize>,
    decoder_index: HashMap<String, usize>,
    share_decoder_input_output_embed: bool,
    chunks: i64,
    variables: HashMap<String, Tensor>,
}

impl MultilingualM2M100Model {
    /// Builds the model for the language pairs of `task` in the root of `vs`.
    ///
    /// The configuration and the family table are validated before any variable is created. When
    /// `pretrained_m2m_checkpoint` is set, the family modules and their embeddings are initialized
    /// from it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multilingual_m2m::multilingual::{
    ///     LanguageFamilies, LanguagePair, MultilingualConfig, MultilingualM2M100Model,
    ///     TranslationTask,
    /// };
    /// use multilingual_m2m::Config;
    /// use tch::{nn, Device};
    ///
    /// # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
    /// let config = MultilingualConfig::from_file("path/to/config.json")?;
    /// let families = LanguageFamilies::from_file("path/to/families.json")?;
    /// let lang_pairs = LanguagePair::parse_list("en-de,en-nl,de-en")?;
    /// let task = TranslationTask::from_dictionary_dir("path/to/data-bin", lang_pairs)?;
    /// let vs = nn::VarStore::new(Device::cuda_if_available());
    /// let model = MultilingualM2M100Model::build(&vs, &config, &task, &families)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(
        vs: &nn::VarStore,
        config: &MultilingualConfig,
        task: &TranslationTask,
        families: &LanguageFamilies,
    ) -> Result<MultilingualM2M100Model, MultilingualError> {
        let config = config.normalized();
        config.validate()?;
        families.validate()?;

        let mut builder = ModuleBuilder {
            p: vs.root(),
            config: &config,
            task,
            families,
            embeddings: vec![],
            shared_encoder_embedding: None,
            shared_decoder_embedding: None,
            encoders: vec![],
            decoders: vec![],
            encoder_index: HashMap::new(),
            decoder_index: HashMap::new(),
        };
        builder.build_shared_embeddings()?;

        let source_langs = task.source_languages();
        let target_langs = task.target_languages();
        let shared_encoder = if config.share_encoders {
            Some(builder.get_encoder(first_language(&source_langs)?)?)
        } else {
            None
        };
        let shared_decoder = if config.share_decoders {
            Some(builder.get_decoder(first_language(&target_langs)?)?)
        } else {
            None
        };
        for pair in task.lang_pairs() {
            match shared_encoder {
                Some(index) => {
                    let family = families.family_of(&pair.source).to_string();
                    builder.encoder_index.insert(family, index);
                }
                None => {
                    builder.get_encoder(&pair.source)?;
                }
            }
            match shared_decoder {
                Some(index) => {
                    let family = families.family_of(&pair.target).to_string();
                    builder.decoder_index.insert(family, index);
                }
                None => {
                    builder.get_decoder(&pair.target)?;
                }
            }
        }
        log::info!(
            "built {} encoder(s) and {} decoder(s) for {} language pairs",
            builder.encoders.len(),
            builder.decoders.len(),
            task.lang_pairs().len()
        );

        let model = MultilingualM2M100Model {
            lang_pairs: task.lang_pairs().to_vec(),
            families: families.clone(),
            embeddings: builder.embeddings,
            encoders: builder.encoders,
            decoders: builder.decoders,
            encoder_index: builder.encoder_index,
            decoder_index: builder.decoder_index,
            share_decoder_input_output_embed: config.share_decoder_input_output_embed,
            chunks: config.pipeline.chunks,
            variables: vs.variables(),
        };

        if let Some(checkpoint) = &config.pretrained_m2m_checkpoint {
            let pretrained = PretrainedM2M::from_file(
                checkpoint,
                config.pretrained_m2m_dictionary.as_deref(),
            )?;
            model.init_from_pretrained(
                &pretrained,
                !config.init_decoder_only,
                !config.init_encoder_only,
            )?;
        }
        Ok(model)
    }

    /// Copies the pretrained M2M100 encoder into every family encoder (if `encoders`) and the
    /// pretrained decoder into every family decoder (if `decoders`), along with the embedding
    /// tables these modules read from.
    pub fn init_from_pretrained(
        &self,
        pretrained: &PretrainedM2M,
        encoders: bool,
        decoders: bool,
    ) -> Result<(), MultilingualError> {
        let mut embeddings = BTreeSet::new();
        if encoders {
            for encoder in &self.encoders {
                let copied = pretrained.load_module("encoder", &self.variables, &encoder.prefix)?;
                log::info!("initialized {} tensors of {}", copied, encoder.prefix);
                embeddings.insert(encoder.embedding);
            }
        }
        if decoders {
            for decoder in &self.decoders {
                let copied = pretrained.load_module("decoder", &self.variables, &decoder.prefix)?;
                log::info!("initialized {} tensors of {}", copied, decoder.prefix);
                embeddings.insert(decoder.embedding);
            }
        }
        for index in embeddings {
            let table = &self.embeddings[index];
            let rows = pretrained.init_embedding(&table.dictionary, &table.embedding)?;
            log::info!(
                "initialized {} of {} rows of {}",
                rows,
                table.dictionary.len(),
                table.name
            );
        }
        Ok(())
    }

    pub fn lang_pairs(&self) -> &[LanguagePair] {
        &self.lang_pairs
    }

    /// Number of distinct encoder modules
    pub fn num_encoders(&self) -> usize {
        self.encoders.len()
    }

    /// Number of distinct decoder modules
    pub fn num_decoders(&self) -> usize {
        self.decoders.len()
    }

    /// Variable prefix of the encoder serving source language `lang`
    pub fn encoder_family(&self, lang: &str) -> Option<&str> {
        self.encoder_index
            .get(self.families.family_of(lang))
            .map(|&index| self.encoders[index].prefix.as_str())
    }

    /// Variable prefix of the decoder serving target language `lang`
    pub fn decoder_family(&self, lang: &str) -> Option<&str> {
        self.decoder_index
            .get(self.families.family_of(lang))
            .map(|&index| self.decoders[index].prefix.as_str())
    }

    /// Model variables, keyed by their variable store name
    pub fn variables(&self) -> &HashMap<String, Tensor> {
        &self.variables
    }

    fn modules(
        &self,
        lang_pair: &LanguagePair,
    ) -> Result<(&FamilyEncoder, &FamilyDecoder), MultilingualError> {
        if !self.lang_pairs.contains(lang_pair) {
            return Err(MultilingualError::ValueError(format!(
                "language pair {} is not supported by the model",
                lang_pair
            )));
        }
        let encoder = self
            .encoder_index
            .get(self.families.family_of(&lang_pair.source))
            .map(|&index| &self.encoders[index]);
        let decoder = self
            .decoder_index
            .get(self.families.family_of(&lang_pair.target))
            .map(|&index| &self.decoders[index]);
        match (encoder, decoder) {
            (Some(encoder), Some(decoder)) => Ok((encoder, decoder)),
            _ => Err(MultilingualError::ValueError(format!(
                "no modules registered for language pair {}",
                lang_pair
            ))),
        }
    }

    fn project(&self, decoder: &FamilyDecoder, hidden_states: &Tensor) -> Tensor {
        match &decoder.output_projection {
            Some(projection) => hidden_states.apply(projection),
            None => hidden_states.matmul(&self.embeddings[decoder.embedding].embedding.ws.tr()),
        }
    }

    /// Forward pass for `lang_pair` with teacher forcing.
    ///
    /// # Arguments
    ///
    /// * `lang_pair` - language pair selecting the encoder and decoder
    /// * `input_ids` - source token ids of shape (*batch size*, *source length*)
    /// * `attention_mask` - optional source mask of shape (*batch size*, *source length*), 0 for padding
    /// * `decoder_input_ids` - target token ids of shape (*batch size*, *target length*)
    /// * `train` - enables dropout
    ///
    /// # Returns
    ///
    /// * Logits of shape (*batch size*, *target length*, *target vocabulary size*). Batches are
    ///   split in up to `pipeline.chunks` micro-batches.
    pub fn forward_t(
        &self,
        lang_pair: &LanguagePair,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        decoder_input_ids: &Tensor,
        train: bool,
    ) -> Result<Tensor, MultilingualError> {
        let (encoder, decoder) = self.modules(lang_pair)?;
        let batch_size = input_ids.size()[0];
        let chunks = self.chunks.min(batch_size);
        if chunks <= 1 {
            return self.forward_chunk(
                encoder,
                decoder,
                input_ids,
                attention_mask,
                decoder_input_ids,
                train,
            );
        }
        let input_chunks = input_ids.chunk(chunks, 0);
        let decoder_input_chunks = decoder_input_ids.chunk(chunks, 0);
        let mask_chunks = attention_mask.map(|mask| mask.chunk(chunks, 0));
        let mut outputs = Vec::with_capacity(input_chunks.len());
        for (index, (input_ids, decoder_input_ids)) in input_chunks
            .iter()
            .zip(decoder_input_chunks.iter())
            .enumerate()
        {
            let attention_mask = mask_chunks.as_ref().map(|masks| &masks[index]);
            outputs.push(self.forward_chunk(
                encoder,
                decoder,
                input_ids,
                attention_mask,
                decoder_input_ids,
                train,
            )?);
        }
        Ok(Tensor::cat(&outputs, 0))
    }

    fn forward_chunk(
        &self,
        encoder: &FamilyEncoder,
        decoder: &FamilyDecoder,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        decoder_input_ids: &Tensor,
        train: bool,
    ) -> Result<Tensor, MultilingualError> {
        let encoder_output = encoder.encoder.forward_t(
            input_ids,
            attention_mask,
            &self.embeddings[encoder.embedding].embedding,
            train,
        )?;
        let decoder_output = decoder.decoder.forward_t(
            decoder_input_ids,
            &encoder_output.hidden_state,
            attention_mask,
            None,
            &self.embeddings[decoder.embedding].embedding,
            None,
            train,
        )?;
        Ok(self.project(decoder, &decoder_output.hidden_state))
    }

    /// Greedy decoding for `lang_pair`.
    ///
    /// Decoding starts from the end of sentence symbol of the target dictionary. With
    /// `forced_bos_token_id` (e.g. a target language token) the first generated token is forced.
    /// Sequences that produced the end of sentence symbol are padded until all sequences are done
    /// or `max_length` tokens were generated.
    ///
    /// # Returns
    ///
    /// * Token ids of shape (*batch size*, *generated length* + 1), starting with the initial
    ///   end of sentence symbol
    pub fn generate(
        &self,
        lang_pair: &LanguagePair,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        max_length: i64,
        forced_bos_token_id: Option<i64>,
    ) -> Result<Tensor, MultilingualError> {
        let (encoder, decoder) = self.modules(lang_pair)?;
        let dictionary = &self.embeddings[decoder.embedding].dictionary;
        let (eos, pad) = (dictionary.eos(), dictionary.pad());
        let device = input_ids.device();
        let batch_size = input_ids.size()[0];

        no_grad(|| -> Result<Tensor, MultilingualError> {
            let encoder_output = encoder.encoder.forward_t(
                input_ids,
                attention_mask,
                &self.embeddings[encoder.embedding].embedding,
                false,
            )?;
            let mut output = Tensor::full(&[batch_size, 1], eos, (Kind::Int64, device));
            let mut finished = Tensor::zeros(&[batch_size], (Kind::Bool, device));
            let mut cache = None;
            for step in 0..max_length {
                let last_tokens = output.select(1, -1).unsqueeze(1);
                let decoder_output = decoder.decoder.forward_t(
                    &last_tokens,
                    &encoder_output.hidden_state,
                    attention_mask,
                    None,
                    &self.embeddings[decoder.embedding].embedding,
                    cache,
                    false,
                )?;
                cache = decoder_output.next_decoder_cache;
                let next_tokens = match forced_bos_token_id {
                    Some(token_id) if step == 0 => {
                        Tensor::full(&[batch_size], token_id, (Kind::Int64, device))
                    }
                    _ => self
                        .project(decoder, &decoder_output.hidden_state.select(1, -1))
                        .argmax(-1, false),
                };
                let next_tokens = next_tokens.masked_fill(&finished, pad);
                finished = finished.logical_or(&next_tokens.eq(eos));
                output = Tensor::cat(&[output, next_tokens.unsqueeze(1)], 1);
                if finished.all().to_kind(Kind::Int64).int64_value(&[]) == 1 {
                    break;
                }
            }
            Ok(output)
        })
    }

    /// Parameters of every language pair, named `models.<src>-<tgt>.encoder.*` and
    /// `models.<src>-<tgt>.decoder.*`. Token embeddings appear as `embed_tokens.weight` of each
    /// side. Tensors shared by several pairs are listed once per pair.
    pub fn state_dict(&self) -> HashMap<String, Tensor> {
        let mut state = HashMap::new();
        for pair in &self.lang_pairs {
            let (encoder, decoder) = match self.modules(pair) {
                Ok(modules) => modules,
                Err(_) => continue,
            };
            let sides = [
                ("encoder", encoder.prefix.as_str(), encoder.embedding),
                ("decoder", decoder.prefix.as_str(), decoder.embedding),
            ];
            for (side, prefix, embedding) in sides.iter() {
                let key_prefix = format!("{}.{}.{}", STATE_DICT_PREFIX, pair, side);
                for (name, tensor) in &self.variables {
                    if let Some(suffix) = name
                        .strip_prefix(*prefix)
                        .and_then(|rest| rest.strip_prefix('.'))
                    {
                        state.insert(
                            format!("{}.{}", key_prefix, suffix),
                            tensor.shallow_clone(),
                        );
                    }
                }
                state.insert(
                    format!("{}.{}", key_prefix, EMBED_TOKENS),
                    self.embeddings[*embedding].embedding.ws.shallow_clone(),
                );
            }
        }
        state
    }

    /// Keeps the entries of `state` belonging to the language pairs of the model, dropping the
    /// others. Every key must start with `models.`.
    pub fn filter_state_dict(
        &self,
        state: HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>, MultilingualError> {
        let lang_pairs = self
            .lang_pairs
            .iter()
            .map(ToString::to_string)
            .collect::<HashSet<String>>();
        let mut filtered = HashMap::new();
        for (key, tensor) in state {
            let pair = key
                .strip_prefix(STATE_DICT_PREFIX)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|rest| rest.split('.').next())
                .ok_or_else(|| {
                    MultilingualError::ValueError(format!(
                        "unexpected state dict key {}, expected {}.<src>-<tgt>.*",
                        key, STATE_DICT_PREFIX
                    ))
                })?;
            if lang_pairs.contains(pair) {
                filtered.insert(key, tensor);
            } else {
                log::debug!("dropping {}, language pair not in the model", key);
            }
        }
        Ok(filtered)
    }

    /// Variable name a per-pair state dict key refers to
    fn resolve(&self, key: &str) -> Option<String> {
        let rest = key
            .strip_prefix(STATE_DICT_PREFIX)?
            .strip_prefix('.')?;
        let mut pieces = rest.splitn(3, '.');
        let pair = pieces.next()?.parse::<LanguagePair>().ok()?;
        let side = pieces.next()?;
        let name = pieces.next()?;
        let (encoder, decoder) = self.modules(&pair).ok()?;
        let (prefix, embedding) = match side {
            "encoder" => (&encoder.prefix, encoder.embedding),
            "decoder" => (&decoder.prefix, decoder.embedding),
            _ => return None,
        };
        if name == EMBED_TOKENS
            || (side == "decoder"
                && name == OUTPUT_PROJECTION
                && self.share_decoder_input_output_embed)
        {
            return Some(self.embeddings[embedding].name.clone());
        }
        let variable = format!("{}.{}", prefix, name);
        if self.variables.contains_key(&variable) {
            Some(variable)
        } else {
            None
        }
    }

    /// Loads a per-pair state dict (see `state_dict`). Entries of language pairs the model does
    /// not serve are dropped first.
    ///
    /// Several pairs may resolve to the same family variable: pairs are visited in the order of
    /// the model language pairs and the first one providing a value is kept. Every entry is
    /// resolved and shape-checked before any variable is written, so an error leaves the model
    /// untouched.
    ///
    /// With `strict`, keys that match no variable and variables left without a value are errors;
    /// otherwise they are logged. Shape mismatches are always errors.
    pub fn load_state_dict(
        &self,
        state: HashMap<String, Tensor>,
        strict: bool,
    ) -> Result<(), MultilingualError> {
        let state = self.filter_state_dict(state)?;
        let mut keys = state.keys().map(String::as_str).collect::<Vec<&str>>();
        keys.sort_unstable();
        let mut ordered: Vec<&str> = Vec::with_capacity(keys.len());
        for pair in &self.lang_pairs {
            let pair_prefix = format!("{}.{}.", STATE_DICT_PREFIX, pair);
            ordered.extend(
                keys.iter()
                    .copied()
                    .filter(|key| key.starts_with(pair_prefix.as_str())),
            );
        }

        let mut plan = Vec::with_capacity(ordered.len());
        let mut loaded = HashSet::new();
        let mut unexpected = vec![];
        for key in ordered {
            let name = match self.resolve(key) {
                Some(name) => name,
                None => {
                    unexpected.push(key);
                    continue;
                }
            };
            let variable = match self.variables.get(&name) {
                Some(variable) => variable,
                None => {
                    unexpected.push(key);
                    continue;
                }
            };
            let value = &state[key];
            if variable.size() != value.size() {
                return Err(MultilingualError::ValueError(format!(
                    "{} has shape {:?}, {} expects {:?}",
                    key,
                    value.size(),
                    name,
                    variable.size()
                )));
            }
            if loaded.contains(&name) {
                log::debug!("{} already loaded, skipping {}", name, key);
                continue;
            }
            plan.push((variable.shallow_clone(), value));
            loaded.insert(name);
        }
        no_grad(|| {
            for (variable, value) in plan.iter_mut() {
                variable.copy_(&value.to_device(variable.device()).to_kind(variable.kind()));
            }
        });

        let mut missing = self
            .variables
            .keys()
            .filter(|name| !loaded.contains(*name))
            .map(String::as_str)
            .collect::<Vec<&str>>();
        missing.sort_unstable();
        unexpected.sort_unstable();
        if strict && (!missing.is_empty() || !unexpected.is_empty()) {
            return Err(MultilingualError::ValueError(format!(
                "error loading state dict, missing: {:?}, unexpected: {:?}",
                missing, unexpected
            )));
        }
        for name in missing {
            log::warn!("no value for {} in state dict", name);
        }
        for key in unexpected {
            log::warn!("unexpected state dict key {}", key);
        }
        log::info!("loaded {} variables from state dict", loaded.len());
        Ok(())
    }
}
