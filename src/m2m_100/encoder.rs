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
use crate::m2m_100::{M2M100Config, _expand_mask};
use crate::{Activation, MultilingualError};
use std::borrow::{Borrow, BorrowMut};
use tch::{nn, Tensor};

pub struct M2M100EncoderLayer {
    self_attention: M2M100Attention,
    self_attention_layer_norm: nn::LayerNorm,
    dropout: f64,
    activation_dropout: f64,
    activation: TensorFunction,
    fc1: nn::Linear,
    fc2: nn::Linear,
    final_layer_norm: nn::LayerNorm,
}

impl M2M100EncoderLayer {
    pub fn new<'p, P>(p: P, config: &M2M100Config) -> M2M100EncoderLayer
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
            config.encoder_attention_heads,
            config.attention_dropout,
            false,
            false,
            output_attention,
        );
        let self_attention_layer_norm = nn::layer_norm(
            p / "self_attn_layer_norm",
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
            config.encoder_ffn_dim,
            Default::default(),
        );
        let fc2 = nn::linear(
            p / "fc2",
            config.encoder_ffn_dim,
            config.d_model,
            Default::default(),
        );

        let final_layer_norm = nn::layer_norm(
            p / "final_layer_norm",
            vec![config.d_model],
            layer_norm_config,
        );

        M2M100EncoderLayer {
            self_attention,
            self_attention_layer_norm,
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
        encoder_attention_mask: Option<&Tensor>,
        train: bool,
    ) -> (Tensor, Option<Tensor>) {
        let output = x.apply(&self.self_attention_layer_norm);
        let (output, attention_weights, _) =
            self.self_attention
                .forward_t(&output, None, encoder_attention_mask, None, train);
        let output: Tensor = output.dropout(self.dropout, train) + x;

        let residual = output.copy();
        let output = output.apply(&self.final_layer_norm);
        let output = (self.activation.get_fn())(&output.apply(&self.fc1));
        let output = output
            .dropout(self.activation_dropout, train)
            .apply(&self.fc2)
            .dropout(self.dropout, train);
        (output + residual, attention_weights)
    }
}

/// # M2M100 encoder stack
/// Token embeddings are not owned by the encoder and are passed to `forward_t`, so that
/// several encoders may share one embedding table (or one encoder serve several tables).
pub struct M2M100Encoder {
    dropout: f64,
    layer_norm: nn::LayerNorm,
    layers: Vec<M2M100EncoderLayer>,
    embed_positions: SinusoidalPositionalEmbedding,
    output_attentions: bool,
    output_hidden_states: bool,
    scale_embedding: f64,
}

impl M2M100Encoder {
    pub fn new<'p, P>(p: P, config: &M2M100Config) -> M2M100Encoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
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
        let layers = (0..config.encoder_layers)
            .map(|layer_index| M2M100EncoderLayer::new(&p_layers / layer_index, config))
            .collect::<Vec<M2M100EncoderLayer>>();

        M2M100Encoder {
            dropout: config.dropout,
            layer_norm,
            layers,
            embed_positions,
            output_attentions,
            output_hidden_states,
            scale_embedding: config.embedding_scale(),
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        embeddings: &nn::Embedding,
        train: bool,
    ) -> Result<M2M100EncoderOutput, MultilingualError> {
        let x = input_ids.apply(embeddings) * self.scale_embedding;
        let x = &self.embed_positions.forward(input_ids, 0, x.kind()) + x;
        let attention_mask = attention_mask
            .map(|mask| _expand_mask(mask, None, x.kind()))
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

        for layer in &self.layers {
            if let Some(hidden_states) = all_hidden_states.borrow_mut() {
                hidden_states.push(hidden_state.copy());
            };
            let (new_hidden_state, attention_weights) =
                layer.forward_t(&hidden_state, attention_mask.as_ref(), train);
            hidden_state = new_hidden_state;
            if let (Some(attentions), Some(attention_weights)) =
                (all_attentions.borrow_mut(), attention_weights)
            {
                attentions.push(attention_weights);
            };
        }

        let hidden_state = hidden_state.apply(&self.layer_norm);
        if let Some(hidden_states) = all_hidden_states.borrow_mut() {
            hidden_states.push(hidden_state.copy());
        };

        Ok(M2M100EncoderOutput {
            hidden_state,
            all_hidden_states,
            all_attentions,
        })
    }
}

/// Container holding a M2M100 encoder output
pub struct M2M100EncoderOutput {
    /// Last encoder layer hidden state
    pub hidden_state: Tensor,
    /// Hidden states for all intermediate layers
    pub all_hidden_states: Option<Vec<Tensor>>,
    /// Attention weights for all intermediate layers
    pub all_attentions: Option<Vec<Tensor>>,
}
