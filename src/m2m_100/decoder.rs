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

use crate::common::activations::TensorFunction;
use crate::m2m_100::attention::M2M100Attention;
use crate::m2m_100::embeddings::SinusoidalPositionalEmbedding;
use crate::m2m_100::{LayerState, M2M100Config, _expand_mask, _make_causal_mask};
use crate::{Activation, MultilingualError};
use std::borrow::{Borrow, BorrowMut};
use tch::{nn, Tensor};

pub struct M2M100DecoderLayer {
    self_attention: M2M100Attention,
    encoder_attention: M2M100Attention,
    self_attention_layer_norm: nn::LayerNorm,
    encoder_attention_layer_norm: nn::LayerNorm,
    dropout: f64,
    activation_dropout: f64,
    activation: TensorFunction,
    fc1: nn::Linear,
    fc2: nn::Linear,
    final_layer_norm: nn::LayerNorm,
}

impl M2M100DecoderLayer {
    pub fn new<'p, P>(p: P, config: &M2M100Config) -> M2M100DecoderLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let layer_norm_config = nn::LayerNormConfig {
            eps: 1e-5,
            ..Default::default()
        };
        let output_attention = config.output_attentions.unwrap_or(false);
        let self_attention = M2M100Attention::new(
            p / "self_attn",
            config.d_model,
            config.d_model,
            config.decoder_attention_heads,
            config.attention_dropout,
            false,
            true,
            output_attention,
        );
        let encoder_attention = M2M100Attention::new(
            p / "encoder_attn",
            config.d_model,
            config.cross_attention_dim.unwrap_or(config.d_model),
            config.decoder_attention_heads,
            config.attention_dropout,
            true,
            true,
            output_attention,
        );
        let self_attention_layer_norm = nn::layer_norm(
            p / "self_attn_layer_norm",
            vec![config.d_model],
            layer_norm_config,
        );
        let encoder_attention_layer_norm = nn::layer_norm(
            p / "encoder_attn_layer_norm",
            vec![config.d_model],
            layer_norm_config,
        );

        let activation = config
            .activation_function
            .unwrap_or(Activation::relu)
            .get_function();
        let fc1 = nn::linear(
            p / "fc1",
            config.d_model,
            config.decoder_ffn_dim,
            Default::default(),
        );
        let fc2 = nn::linear(
            p / "fc2",
            config.decoder_ffn_dim,
            config.d_model,
            Default::default(),
        );

        let final_layer_norm = nn::layer_norm(
            p / "final_layer_norm",
            vec![config.d_model],
            layer_norm_config,
        );

        M2M100DecoderLayer {
            self_attention,
            encoder_attention,
            self_attention_layer_norm,
            encoder_attention_layer_norm,
            dropout: config.dropout,
            activation_dropout: config.activation_dropout,
            activation,
            fc1,
            fc2,
            final_layer_norm,
        }
    }

    pub fn forward_t(
        &self,
        x: &Tensor,
        encoder_hidden_states: &Tensor,
        encoder_attention_mask: Option<&Tensor>,
        decoder_attention_mask: Option<&Tensor>,
        layer_states: (Option<LayerState>, Option<LayerState>),
        train: bool,
    ) -> (
        Tensor,
        Option<Tensor>,
        (Option<LayerState>, Option<LayerState>),
    ) {
        let output = x.apply(&self.self_attention_layer_norm);

        let (output, attention_weights, new_self_layer_states) = self.self_attention.forward_t(
            &output,
            None,
            decoder_attention_mask,
            layer_states.0,
            train,
        );
        let output: Tensor = output.dropout(self.dropout, train) + x;

        let output1 = output.apply(&self.encoder_attention_layer_norm);
        let (output1, _, new_encoder_layer_states) = self.encoder_attention.forward_t(
            &output1,
            Some(encoder_hidden_states),
            encoder_attention_mask,
            layer_states.1,
            train,
        );
        let output1: Tensor = output1.dropout(self.dropout, train) + output;

        let output2 = output1.apply(&self.final_layer_norm);
        let output2 = (self.activation.get_fn())(&output2.apply(&self.fc1));
        let output2 = output2
            .dropout(self.activation_dropout, train)
            .apply(&self.fc2)
            .dropout(self.dropout, train);
        (
            output2 + output1,
            attention_weights,
            (new_self_layer_states, new_encoder_layer_states),
        )
    }
}

/// # M2M100 decoder stack
/// As for the encoder, token embeddings are provided at forward time.
pub struct M2M100Decoder {
    dropout: f64,
    layer_norm: nn::LayerNorm,
    layers: Vec<M2M100DecoderLayer>,
    embed_positions: SinusoidalPositionalEmbedding,
    output_attentions: bool,
    output_hidden_states: bool,
    output_past: bool,
    scale_embedding: f64,
}

impl M2M100Decoder {
    pub fn new<'p, P>(p: P, config: &M2M100Config) -> M2M100Decoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let output_past = config.output_past.unwrap_or(true);
        let output_attentions = config.output_attentions.unwrap_or(false);
        let output_hidden_states = config.output_hidden_states.unwrap_or(false);

        let layer_norm = nn::layer_norm(p / "layer_norm", vec![config.d_model], Default::default());

        let embed_positions = SinusoidalPositionalEmbedding::new(
            config.max_position_embeddings,
            config.d_model,
            config.pad_token_id.unwrap_or(1),
            p.device(),
        );

        let p_layers = p / "layers";
        let layers = (0..config.decoder_layers)
            .map(|layer_index| M2M100DecoderLayer::new(&p_layers / layer_index, config))
            .collect::<Vec<M2M100DecoderLayer>>();

        M2M100Decoder {
            dropout: config.dropout,
            layer_norm,
            layers,
            embed_positions,
            output_attentions,
            output_hidden_states,
            output_past,
            scale_embedding: config.embedding_scale(),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        encoder_hidden_states: &Tensor,
        encoder_attention_mask: Option<&Tensor>,
        decoder_attention_mask: Option<&Tensor>,
        embeddings: &nn::Embedding,
        old_layer_states: Option<Vec<(Option<LayerState>, Option<LayerState>)>>,
        train: bool,
    ) -> Result<M2M100DecoderOutput, MultilingualError> {
        let past_key_values_length = old_layer_states
            .as_ref()
            .and_then(|states| states.first())
            .and_then(|(self_state, _)| self_state.as_ref())
            .map(|state| state.prev_key.size()[2])
            .unwrap_or(0);
        let input_shape = input_ids.size();
        let sequence_length = input_shape[1];

        let x = input_ids.apply(embeddings) * self.scale_embedding;
        let positions = self
            .embed_positions
            .forward(input_ids, past_key_values_length, x.kind());
        let x = x + positions;

        let causal_mask = if sequence_length > 1 {
            Some(_make_causal_mask(
                input_shape.as_slice(),
                x.kind(),
                x.device(),
                past_key_values_length,
            )?)
        } else {
            None
        };

        let decoder_attention_mask = match (decoder_attention_mask, causal_mask) {
            (Some(attention_mask), Some(causal_mask)) => {
                Some(causal_mask + _expand_mask(attention_mask, Some(sequence_length), x.kind())?)
            }
            (Some(attention_mask), None) => {
                Some(_expand_mask(attention_mask, Some(sequence_length), x.kind())?)
            }
            (None, causal_mask) => causal_mask,
        };

        let encoder_attention_mask = encoder_attention_mask
            .map(|mask| _expand_mask(mask, Some(sequence_length), x.kind()))
            .transpose()?;

        let mut hidden_state = x.dropout(self.dropout, train);

        let mut all_hidden_states: Option<Vec<Tensor>> = if self.output_hidden_states {
            Some(Vec::with_capacity(self.layers.len()))
        } else {
            None
        };
        let mut all_attentions: Option<Vec<Tensor>> = if self.output_attentions {
            Some(Vec::with_capacity(self.layers.len()))
        } else {
            None
        };
        let mut next_decoder_cache: Option<Vec<(Option<LayerState>, Option<LayerState>)>> =
            if self.output_past {
                old_layer_states.or_else(|| Some(vec![(None, None); self.layers.len()]))
            } else {
                None
            };

        for (layer_idx, layer) in self.layers.iter().enumerate() {
            if let Some(hidden_states) = all_hidden_states.borrow_mut() {
                hidden_states.push(hidden_state.copy());
            };
            let layer_state = match &mut next_decoder_cache {
                Some(values) => std::mem::take(&mut values[layer_idx]),
                None => (None, None),
            };
            let (new_hidden_state, attention_weights, new_layer_state) = layer.forward_t(
                &hidden_state,
                encoder_hidden_states,
                encoder_attention_mask.as_ref(),
                decoder_attention_mask.as_ref(),
                layer_state,
                train,
            );
            hidden_state = new_hidden_state;
            if let (Some(attentions), Some(attention_weights)) =
                (all_attentions.borrow_mut(), attention_weights)
            {
                attentions.push(attention_weights);
            };
            if let Some(value) = &mut next_decoder_cache {
                value[layer_idx] = new_layer_state
            };
        }

        let hidden_state = hidden_state.apply(&self.layer_norm);
        if let Some(hidden_states) = all_hidden_states.borrow_mut() {
            hidden_states.push(hidden_state.copy());
        };

        Ok(M2M100DecoderOutput {
            hidden_state,
            encoder_attention_mask,
            next_decoder_cache,
            all_hidden_states,
            all_attentions,
        })
    }
}

/// Container holding a M2M100 decoder output
pub struct M2M100DecoderOutput {
    /// last decoder layer hidden state
    pub hidden_state: Tensor,
    /// Padding mask for the encoder positions to attend to
    pub encoder_attention_mask: Option<Tensor>,
    /// Cached outputs of the self-attention and cross-attention layers
    pub next_decoder_cache: Option<Vec<(Option<LayerState>, Option<LayerState>)>>,
    /// Hidden states for all intermediate layers
    pub all_hidden_states: Option<Vec<Tensor>>,
    /// Attention weights for all intermediate layers
    pub all_attentions: Option<Vec<Tensor>>,
}
