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

use crate::m2m_100::M2M100Config;
use crate::{Activation, Config, MultilingualError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// # Micro-batching and stage partition settings
/// The multi-device pipeline engine is not part of this crate: `chunks` splits every batch into
/// micro-batches processed in sequence, and `balance` (layers per stage) is checked against the
/// model depth so that configurations written for a pipeline launcher stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub balance: Option<Vec<i64>>,
    pub chunks: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            balance: None,
            chunks: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// # Multilingual family-shared model configuration
/// Architecture of the per-family encoders and decoders, embedding and module sharing options and
/// pretrained M2M100 initialization. Every field has a default (`MultilingualConfig::base()`),
/// so a configuration file only needs to list the values it changes.
pub struct MultilingualConfig {
    pub encoder_embed_dim: i64,
    pub encoder_ffn_embed_dim: i64,
    pub encoder_attention_heads: i64,
    pub encoder_layers: i64,
    pub decoder_embed_dim: i64,
    pub decoder_ffn_embed_dim: i64,
    pub decoder_attention_heads: i64,
    pub decoder_layers: i64,
    pub dropout: f64,
    pub attention_dropout: f64,
    pub activation_dropout: f64,
    pub activation_fn: Activation,
    pub scale_embedding: bool,
    pub max_source_positions: i64,
    pub max_target_positions: i64,
    /// Text file with pretrained encoder embeddings
    pub encoder_embed_path: Option<PathBuf>,
    /// Text file with pretrained decoder embeddings
    pub decoder_embed_path: Option<PathBuf>,
    /// One embedding table for every language, on both sides
    pub share_all_embeddings: bool,
    /// One embedding table for all source languages
    pub share_encoder_embeddings: bool,
    /// One embedding table for all target languages
    pub share_decoder_embeddings: bool,
    /// One encoder (including embeddings) for all source languages
    pub share_encoders: bool,
    /// One decoder (including embeddings) for all target languages
    pub share_decoders: bool,
    /// Use the decoder embedding matrix as output projection
    pub share_decoder_input_output_embed: bool,
    /// M2M100 weights (`.ot`) used to initialize the encoders and/or decoders
    pub pretrained_m2m_checkpoint: Option<PathBuf>,
    /// Do not initialize the decoders from the pretrained checkpoint
    pub init_encoder_only: bool,
    /// Do not initialize the encoders from the pretrained checkpoint
    pub init_decoder_only: bool,
    /// Dictionary of the pretrained checkpoint, used to map its embedding rows
    pub pretrained_m2m_dictionary: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl Config for MultilingualConfig {}

impl Default for MultilingualConfig {
    fn default() -> Self {
        MultilingualConfig::base()
    }
}

impl MultilingualConfig {
    /// Transformer base dimensions
    pub fn base() -> MultilingualConfig {
        MultilingualConfig {
            encoder_embed_dim: 512,
            encoder_ffn_embed_dim: 2048,
            encoder_attention_heads: 8,
            encoder_layers: 6,
            decoder_embed_dim: 512,
            decoder_ffn_embed_dim: 2048,
            decoder_attention_heads: 8,
            decoder_layers: 6,
            dropout: 0.1,
            attention_dropout: 0.0,
            activation_dropout: 0.0,
            activation_fn: Activation::relu,
            scale_embedding: true,
            max_source_positions: 1024,
            max_target_positions: 1024,
            encoder_embed_path: None,
            decoder_embed_path: None,
            share_all_embeddings: false,
            share_encoder_embeddings: false,
            share_decoder_embeddings: false,
            share_encoders: false,
            share_decoders: false,
            share_decoder_input_output_embed: false,
            pretrained_m2m_checkpoint: None,
            init_encoder_only: false,
            init_decoder_only: false,
            pretrained_m2m_dictionary: None,
            pipeline: PipelineConfig::default(),
        }
    }

    /// Dimensions of the 418M parameters M2M100 checkpoint
    pub fn m2m_418m() -> MultilingualConfig {
        MultilingualConfig {
            encoder_embed_dim: 1024,
            encoder_ffn_embed_dim: 4096,
            encoder_attention_heads: 16,
            encoder_layers: 12,
            decoder_embed_dim: 1024,
            decoder_ffn_embed_dim: 4096,
            decoder_attention_heads: 16,
            decoder_layers: 12,
            ..MultilingualConfig::base()
        }
    }

    /// Returns a copy with the implied sharing options switched on
    pub fn normalized(&self) -> MultilingualConfig {
        let mut config = self.clone();
        if config.share_encoders {
            config.share_encoder_embeddings = true;
        }
        if config.share_decoders {
            config.share_decoder_embeddings = true;
        }
        if config.share_all_embeddings {
            config.share_decoder_input_output_embed = true;
        }
        config
    }

    pub fn validate(&self) -> Result<(), MultilingualError> {
        if self.share_all_embeddings {
            if self.encoder_embed_dim != self.decoder_embed_dim {
                return Err(MultilingualError::InvalidConfigurationError(
                    "share_all_embeddings requires encoder_embed_dim to match decoder_embed_dim"
                        .into(),
                ));
            }
            if self.decoder_embed_path.is_some()
                && self.decoder_embed_path != self.encoder_embed_path
            {
                return Err(MultilingualError::InvalidConfigurationError(
                    "share_all_embeddings not compatible with decoder_embed_path".into(),
                ));
            }
        }
        if self.init_encoder_only && self.init_decoder_only {
            return Err(MultilingualError::InvalidConfigurationError(
                "init_encoder_only and init_decoder_only are mutually exclusive".into(),
            ));
        }
        if self.encoder_embed_dim % self.encoder_attention_heads != 0
            || self.decoder_embed_dim % self.decoder_attention_heads != 0
        {
            return Err(MultilingualError::InvalidConfigurationError(
                "embedding dimensions must be divisible by the number of attention heads".into(),
            ));
        }
        if self.pipeline.chunks < 1 {
            return Err(MultilingualError::InvalidConfigurationError(format!(
                "pipeline chunks must be at least 1, got {}",
                self.pipeline.chunks
            )));
        }
        if let Some(balance) = &self.pipeline.balance {
            let total: i64 = balance.iter().sum();
            if balance.iter().any(|&stage| stage < 1)
                || total != self.encoder_layers + self.decoder_layers
            {
                return Err(MultilingualError::InvalidConfigurationError(format!(
                    "pipeline balance {:?} does not partition {} encoder and {} decoder layers",
                    balance, self.encoder_layers, self.decoder_layers
                )));
            }
        }
        Ok(())
    }

    /// M2M100 configuration of the encoders, with `pad_token_id` taken from the source dictionaries
    pub(crate) fn encoder_config(&self, pad_token_id: i64) -> M2M100Config {
        self.m2m_100_config(
            self.encoder_embed_dim,
            None,
            self.max_source_positions,
            pad_token_id,
        )
    }

    /// M2M100 configuration of the decoders, attending to encoder states of `encoder_embed_dim`
    pub(crate) fn decoder_config(&self, pad_token_id: i64) -> M2M100Config {
        let cross_attention_dim = if self.encoder_embed_dim != self.decoder_embed_dim {
            Some(self.encoder_embed_dim)
        } else {
            None
        };
        self.m2m_100_config(
            self.decoder_embed_dim,
            cross_attention_dim,
            self.max_target_positions,
            pad_token_id,
        )
    }

    fn m2m_100_config(
        &self,
        d_model: i64,
        cross_attention_dim: Option<i64>,
        max_position_embeddings: i64,
        pad_token_id: i64,
    ) -> M2M100Config {
        M2M100Config {
            vocab_size: 0,
            max_position_embeddings,
            encoder_layers: self.encoder_layers,
            encoder_attention_heads: self.encoder_attention_heads,
            encoder_ffn_dim: self.encoder_ffn_embed_dim,
            decoder_layers: self.decoder_layers,
            decoder_ffn_dim: self.decoder_ffn_embed_dim,
            decoder_attention_heads: self.decoder_attention_heads,
            activation_function: Some(self.activation_fn),
            d_model,
            dropout: self.dropout,
            activation_dropout: self.activation_dropout,
            attention_dropout: self.attention_dropout,
            scale_embedding: Some(self.scale_embedding),
            bos_token_id: None,
            eos_token_id: None,
            pad_token_id: Some(pad_token_id),
            decoder_start_token_id: None,
            cross_attention_dim,
            output_attentions: None,
            output_hidden_states: None,
            output_past: None,
        }
    }
}
