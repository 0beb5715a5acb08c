// Copyright 2021 The Fairseq Authors and The HuggingFace Inc. team. All rights reserved.
// Copyright 2020 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::kind::get_min;
use crate::m2m_100::decoder::M2M100Decoder;
use crate::m2m_100::encoder::M2M100Encoder;
use crate::m2m_100::LayerState;
use crate::{Activation, Config, MultilingualError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::nn::{embedding, EmbeddingConfig};
use tch::{nn, Device, Kind, Tensor};

/// # M2M100 Pretrained model weight files
pub struct M2M100ModelResources;

/// # M2M100 Pretrained model config files
pub struct M2M100ConfigResources;

/// # M2M100 Pretrained fairseq dictionary files
pub struct M2M100DictionaryResources;

impl M2M100ModelResources {
    /// Shared under MIT license by the Facebook AI Research Fairseq team at https://github.com/pytorch/fairseq. Modified with conversion to C-array format.
    pub const M2M100_418M: (&'static str, &'static str) = (
        "m2m100-418m/model",
        "https://huggingface.co/facebook/m2m100_418M/resolve/main/rust_model.ot",
    );
}

impl M2M100ConfigResources {
    /// Shared under MIT license by the Facebook AI Research Fairseq team at https://github.com/pytorch/fairseq. Modified with conversion to C-array format.
    pub const M2M100_418M: (&'static str, &'static str) = (
        "m2m100-418m/config",
        "https://huggingface.co/facebook/m2m100_418M/resolve/main/config.json",
    );
}

impl M2M100DictionaryResources {
    /// Shared under MIT license by the Facebook AI Research Fairseq team at https://github.com/pytorch/fairseq.
    pub const M2M100_418M: (&'static str, &'static str) = (
        "m2m100-418m/dictionary",
        "https://dl.fbaipublicfiles.com/m2m_100/data_dict.128k.txt",
    );
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # M2M100 model configuration
/// Defines the M2M100 model architecture (e.g. number of layers, hidden layer size, vocabulary...)
pub struct M2M100Config {
    pub vocab_size: i64,
    pub max_position_embeddings: i64,
    pub encoder_layers: i64,
    pub encoder_attention_heads: i64,
    pub encoder_ffn_dim: i64,
    pub decoder_layers: i64,
    pub decoder_ffn_dim: i64,
    pub decoder_attention_heads: i64,
    pub activation_function: Option<Activation>,
    pub d_model: i64,
    pub dropout: f64,
    pub activation_dropout: f64,
    pub attention_dropout: f64,
    pub scale_embedding: Option<bool>,
    pub bos_token_id: Option<i64>,
    pub eos_token_id: Option<i64>,
    pub pad_token_id: Option<i64>,
    pub decoder_start_token_id: Option<i64>,
    /// Width of the encoder states attended by the decoder, when it differs from `d_model`
    pub cross_attention_dim: Option<i64>,
    pub output_attentions: Option<bool>,
    pub output_hidden_states: Option<bool>,
    pub output_past: Option<bool>,
}

impl Config for M2M100Config {}

impl M2M100Config {
    pub(crate) fn embedding_scale(&self) -> f64 {
        if self.scale_embedding.unwrap_or(false) {
            (self.d_model as f64).sqrt()
        } else {
            1.0
        }
    }
}

pub(crate) fn _shift_tokens_right(
    input_ids: &Tensor,
    pad_token_id: i64,
    decoder_start_token_id: i64,
) -> Tensor {
    let input_ids_length = input_ids.size()[1];
    let shifted_input_ids = Tensor::zeros(
        input_ids.size().as_slice(),
        (Kind::Int64, input_ids.device()),
    );
    let _ = shifted_input_ids.select(1, 0).fill_(decoder_start_token_id);
    let _ = shifted_input_ids
        .slice(1, 1, input_ids_length, 1)
        .copy_(&input_ids.slice(1, 0, input_ids_length - 1, 1));
    shifted_input_ids.masked_fill(&shifted_input_ids.eq(-100), pad_token_id)
}

/// Lower-triangular additive mask of shape (*batch size*, 1, *target_length*, *target_length + past_length*)
pub(crate) fn _make_causal_mask(
    input_ids_shape: &[i64],
    dtype: Kind,
    device: Device,
    past_key_values_length: i64,
) -> Result<Tensor, MultilingualError> {
    let batch_size = input_ids_shape[0];
    let target_length = input_ids_shape[1];

    let mut mask = Tensor::full(
        &[target_length, target_length],
        get_min(dtype)?,
        (dtype, device),
    )
    .triu(1);

    if past_key_values_length > 0 {
        mask = Tensor::cat(
            &[
                Tensor::zeros(&[target_length, past_key_values_length], (dtype, device)),
                mask,
            ],
            -1,
        );
    }
    Ok(mask.unsqueeze(0).unsqueeze(0).expand(
        &[
            batch_size,
            1,
            target_length,
            target_length + past_key_values_length,
        ],
        true,
    ))
}

/// Converts a (*batch size*, *source_length*) padding mask (1 for tokens, 0 for padding) into an
/// additive mask of shape (*batch size*, 1, *target_length*, *source_length*)
pub(crate) fn _expand_mask(
    mask: &Tensor,
    target_length: Option<i64>,
    dtype: Kind,
) -> Result<Tensor, MultilingualError> {
    let mask_size = mask.size();
    let (batch_size, source_length) = (mask_size[0], mask_size[1]);
    let target_length = target_length.unwrap_or(source_length);
    let expanded_mask = mask
        .unsqueeze(1)
        .unsqueeze(1)
        .expand(&[batch_size, 1, target_length, source_length], true)
        .to_kind(dtype);
    let inverted_mask: Tensor = 1 - expanded_mask;
    Ok(inverted_mask.masked_fill(&inverted_mask.to_kind(Kind::Bool), get_min(dtype)?))
}

/// # M2M100 Base model
/// Base architecture for M2M100 model. Usually complemented with a task-specific head, such as a language model head.
/// It is made of the following blocks:
/// - `encoder`: `M2M100Encoder` (transformer) made of a vector of encoding layers
/// - `decoder`: `M2M100Decoder` (transformer)  made of a vector of decoding layers with self attention and encoder cross-attention.
/// caching is implemented for the decoder to avoid recalculating static states (encoder key/values and previously calculated decoder key/values)
/// - `embeddings`: token embeddings shared between the encoder and the decoder
pub struct M2M100Model {
    pub(crate) encoder: M2M100Encoder,
    pub(crate) decoder: M2M100Decoder,
    pub(crate) embeddings: nn::Embedding,
    pad_token_id: i64,
    decoder_start_token_id: i64,
}

impl M2M100Model {
    /// Build a new `M2M100Model`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the M2M100 model
    /// * `config` - `M2M100Config` object defining the model architecture
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multilingual_m2m::m2m_100::{M2M100Config, M2M100Model};
    /// use multilingual_m2m::Config;
    /// use std::path::Path;
    /// use tch::{nn, Device};
    ///
    /// let config_path = Path::new("path/to/config.json");
    /// let device = Device::Cpu;
    /// let p = nn::VarStore::new(device);
    /// let config = M2M100Config::from_file(config_path).unwrap();
    /// let m2m100: M2M100Model = M2M100Model::new(&p.root() / "model", &config);
    /// ```
    pub fn new<'p, P>(p: P, config: &M2M100Config) -> M2M100Model
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let pad_token_id = config.pad_token_id.unwrap_or(1);
        let decoder_start_token_id = config.decoder_start_token_id.unwrap_or(2);
        let embedding_config = EmbeddingConfig {
            padding_idx: pad_token_id,
            ..Default::default()
        };
        let embeddings: nn::Embedding = embedding(
            p / "shared",
            config.vocab_size,
            config.d_model,
            embedding_config,
        );

        let encoder = M2M100Encoder::new(p / "encoder", config);
        let decoder = M2M100Decoder::new(p / "decoder", config);

        M2M100Model {
            encoder,
            decoder,
            embeddings,
            pad_token_id,
            decoder_start_token_id,
        }
    }

    /// Forward pass through the model
    ///
    /// # Arguments
    ///
    /// * `input_ids` - Optional input tensor of shape (*batch size*, *source_sequence_length*). Must be provided when `encoder_output` is not given
    /// * `attention_mask` - Optional attention mask of shape (*batch size*, *source_sequence_length*) for the encoder positions. Positions with a mask with value 0 will be masked.
    /// * `decoder_input_ids` - Optional input tensor of shape (*batch size*, *target_sequence_length*). Defaults to the shifted `input_ids`.
    /// * `encoder_output` - Optional encoder last hidden state of shape (*batch size*, *source_sequence_length*, *hidden_size*). When provided, the encoder hidden state will not be recalculated.
    /// * `decoder_attention_mask` - Optional attention mask of shape (*batch size*, *target_sequence_length*) for the decoder positions. Positions with a mask with value 0 will be masked.
    /// * `layer_states` - Optional decoder cache from a previous step
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `M2M100ModelOutput` containing:
    ///   - `decoder_output` - `Tensor` of shape (*batch size*, *target_sequence_length*, *hidden_size*) representing the activations of the last decoder hidden state
    ///   - `encoder_hidden_state` - `Option<Tensor>` of shape (*batch size*, *source_sequence_length*, *hidden_size*) representing the activations of the last encoder hidden state if it was not provided, otherwise None
    ///   - `cache` - `Option<Vec<(Option<LayerState>, Option<LayerState>)>>` of length *n_layer* containing the past keys and values for both the self attention and the encoder cross attention of each layer of the decoder.
    ///   - `all_encoder_hidden_states` / `all_encoder_attentions` / `all_decoder_hidden_states` / `all_decoder_attentions` - optional per-layer activations
    pub fn forward_t(
        &self,
        input_ids: Option<&Tensor>,
        attention_mask: Option<&Tensor>,
        decoder_input_ids: Option<&Tensor>,
        encoder_output: Option<&Tensor>,
        decoder_attention_mask: Option<&Tensor>,
        layer_states: Option<Vec<(Option<LayerState>, Option<LayerState>)>>,
        train: bool,
    ) -> Result<M2M100ModelOutput, MultilingualError> {
        let calc_decoder_input_ids;
        let decoder_input_ids = match (decoder_input_ids, input_ids) {
            (Some(decoder_input_ids), _) => decoder_input_ids,
            (None, Some(input_ids)) => {
                calc_decoder_input_ids = _shift_tokens_right(
                    input_ids,
                    self.pad_token_id,
                    self.decoder_start_token_id,
                );
                &calc_decoder_input_ids
            }
            (None, None) => {
                return Err(MultilingualError::ValueError(
                    "One of input ids or decoder input ids must be set".into(),
                ));
            }
        };

        let mut calc_hidden_state = None;
        let mut all_encoder_hidden_states = None;
        let mut all_encoder_attentions = None;
        if encoder_output.is_none() {
            let input_ids = input_ids.ok_or_else(|| {
                MultilingualError::ValueError(
                    "One of input ids or encoder output must be set".into(),
                )
            })?;
            let output =
                self.encoder
                    .forward_t(input_ids, attention_mask, &self.embeddings, train)?;
            calc_hidden_state = Some(output.hidden_state);
            all_encoder_hidden_states = output.all_hidden_states;
            all_encoder_attentions = output.all_attentions;
        }
        let encoder_hidden_state = match (encoder_output, calc_hidden_state.as_ref()) {
            (Some(value), _) | (None, Some(value)) => value,
            (None, None) => {
                return Err(MultilingualError::ValueError(
                    "Encoder hidden state could not be computed".into(),
                ));
            }
        };

        let decoder_output = self.decoder.forward_t(
            decoder_input_ids,
            encoder_hidden_state,
            attention_mask,
            decoder_attention_mask,
            &self.embeddings,
            layer_states,
            train,
        )?;

        Ok(M2M100ModelOutput {
            decoder_output: decoder_output.hidden_state,
            encoder_hidden_state: calc_hidden_state,
            cache: decoder_output.next_decoder_cache,
            all_decoder_hidden_states: decoder_output.all_hidden_states,
            all_decoder_attentions: decoder_output.all_attentions,
            all_encoder_hidden_states,
            all_encoder_attentions,
        })
    }
}

/// Container holding a M2M100 model output
pub struct M2M100ModelOutput {
    /// last decoder layer hidden state
    pub decoder_output: Tensor,
    /// last encoder layer hidden state (if it was computed by the forward pass)
    pub encoder_hidden_state: Option<Tensor>,
    /// Cached outputs of the decoder self-attention and cross-attention layers
    pub cache: Option<Vec<(Option<LayerState>, Option<LayerState>)>>,
    /// Hidden states for all intermediate decoder layers
    pub all_decoder_hidden_states: Option<Vec<Tensor>>,
    /// Attention weights for all intermediate decoder layers
    pub all_decoder_attentions: Option<Vec<Tensor>>,
    /// Hidden states for all intermediate encoder layers
    pub all_encoder_hidden_states: Option<Vec<Tensor>>,
    /// Attention weights for all intermediate encoder layers
    pub all_encoder_attentions: Option<Vec<Tensor>>,
}
