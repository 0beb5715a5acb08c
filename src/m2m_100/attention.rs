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

use std::borrow::Borrow;
use tch::{nn, Tensor};

#[derive(Debug)]
/// # Cache for M2M100 attention layers
/// Stores the cached value of key and value to avoid recalculation (e.g. at each generation step)
pub struct LayerState {
    /// Cached keys, shape (*batch size*, *num_heads*, *sequence_length*, *head_dim*)
    pub prev_key: Tensor,
    /// Cached values, shape (*batch size*, *num_heads*, *sequence_length*, *head_dim*)
    pub prev_value: Tensor,
}

impl Clone for LayerState {
    fn clone(&self) -> Self {
        LayerState {
            prev_key: self.prev_key.copy(),
            prev_value: self.prev_value.copy(),
        }
    }
}

#[derive(Debug)]
pub struct M2M100Attention {
    num_heads: i64,
    head_dim: i64,
    dropout: f64,
    scaling: f64,
    encoder_decoder_attention: bool,
    output_attentions: bool,
    store_cache: bool,
    k_proj: nn::Linear,
    v_proj: nn::Linear,
    q_proj: nn::Linear,
    out_proj: nn::Linear,
}

impl M2M100Attention {
    /// Creates a multi-head attention block. `kv_dim` is the width of the states keys and values
    /// are projected from: the layer width for self-attention, the encoder width for
    /// encoder-decoder attention.
    #[allow(clippy::too_many_arguments)]
    pub fn new<'p, P>(
        p: P,
        embed_dim: i64,
        kv_dim: i64,
        num_heads: i64,
        dropout: f64,
        encoder_decoder_attention: bool,
        store_cache: bool,
        output_attentions: bool,
    ) -> M2M100Attention
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let k_proj = nn::linear(p / "k_proj", kv_dim, embed_dim, Default::default());
        let v_proj = nn::linear(p / "v_proj", kv_dim, embed_dim, Default::default());
        let q_proj = nn::linear(p / "q_proj", embed_dim, embed_dim, Default::default());
        let out_proj = nn::linear(p / "out_proj", embed_dim, embed_dim, Default::default());

        let head_dim = embed_dim / num_heads;
        let scaling = (head_dim as f64).powf(-0.5);

        M2M100Attention {
            num_heads,
            head_dim,
            dropout,
            scaling,
            encoder_decoder_attention,
            output_attentions,
            store_cache,
            k_proj,
            v_proj,
            q_proj,
            out_proj,
        }
    }

    fn _shape(&self, x: Tensor, sequence_length: i64, batch_size: i64) -> Tensor {
        x.view((batch_size, sequence_length, self.num_heads, self.head_dim))
            .transpose(1, 2)
            .contiguous()
    }

    /// Forward pass through the attention block
    ///
    /// # Arguments
    ///
    /// * `hidden_states` - query states of shape (*batch size*, *target_sequence_length*, *embed_dim*)
    /// * `key_value_states` - encoder states for encoder-decoder attention, ignored for self-attention
    /// * `attention_mask` - additive mask of shape (*batch size*, 1, *target_sequence_length*, *source_sequence_length*)
    /// * `layer_state` - cached keys and values from a previous step
    /// * `train` - enables dropout
    pub fn forward_t(
        &self,
        hidden_states: &Tensor,
        key_value_states: Option<&Tensor>,
        attention_mask: Option<&Tensor>,
        layer_state: Option<LayerState>,
        train: bool,
    ) -> (Tensor, Option<Tensor>, Option<LayerState>) {
        let input_size = hidden_states.size();
        let (batch_size, target_length, embed_dim) =
            (input_size[0], input_size[1], input_size[2]);

        let query_states = self._shape(
            hidden_states.apply(&self.q_proj) * self.scaling,
            target_length,
            batch_size,
        );

        let (key_states, value_states) = if self.encoder_decoder_attention {
            match (layer_state, key_value_states) {
                (Some(cached), _) => (cached.prev_key, cached.prev_value),
                (None, Some(encoder_states)) => (
                    self._shape(encoder_states.apply(&self.k_proj), -1, batch_size),
                    self._shape(encoder_states.apply(&self.v_proj), -1, batch_size),
                ),
                (None, None) => (
                    self._shape(hidden_states.apply(&self.k_proj), -1, batch_size),
                    self._shape(hidden_states.apply(&self.v_proj), -1, batch_size),
                ),
            }
        } else {
            let key_states = self._shape(hidden_states.apply(&self.k_proj), -1, batch_size);
            let value_states = self._shape(hidden_states.apply(&self.v_proj), -1, batch_size);
            match layer_state {
                Some(cached) => (
                    Tensor::cat(&[cached.prev_key, key_states], 2),
                    Tensor::cat(&[cached.prev_value, value_states], 2),
                ),
                None => (key_states, value_states),
            }
        };

        let new_layer_state = if self.store_cache {
            Some(LayerState {
                prev_key: key_states.copy(),
                prev_value: value_states.copy(),
            })
        } else {
            None
        };

        let proj_shape = [batch_size * self.num_heads, -1, self.head_dim];
        let query_states = query_states.view(proj_shape);
        let key_states = key_states.view(proj_shape);
        let value_states = value_states.view(proj_shape);

        let source_length = key_states.size()[1];
        let mut attention_weights = query_states.bmm(&key_states.transpose(1, 2));

        if let Some(attention_mask) = attention_mask {
            attention_weights = attention_weights.view((
                batch_size,
                self.num_heads,
                target_length,
                source_length,
            )) + attention_mask;
            attention_weights = attention_weights.view((
                batch_size * self.num_heads,
                target_length,
                source_length,
            ));
        }

        let attention_weights = attention_weights.softmax(-1, attention_weights.kind());

        let saved_attention_weights = if self.output_attentions {
            Some(attention_weights.view((
                batch_size,
                self.num_heads,
                target_length,
                source_length,
            )))
        } else {
            None
        };

        let attention_probas = attention_weights.dropout(self.dropout, train);
        let attention_output = attention_probas
            .bmm(&value_states)
            .view((batch_size, self.num_heads, target_length, self.head_dim))
            .transpose(1, 2)
            .reshape(&[batch_size, target_length, embed_dim])
            .apply(&self.out_proj);

        (attention_output, saved_attention_weights, new_layer_state)
    }
}
