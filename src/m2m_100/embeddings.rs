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

use std::sync::RwLock;
use tch::{Device, Kind, Tensor};

/// # Sinusoidal positional embeddings
/// Fixed (non-trainable) position table, rebuilt on demand when a longer sequence or a
/// different precision is requested. The table lives outside of the variable store so that it
/// never appears in saved or loaded weights.
#[derive(Debug)]
pub struct SinusoidalPositionalEmbedding {
    weights: RwLock<Tensor>,
    embedding_dim: i64,
    padding_idx: i64,
}

impl SinusoidalPositionalEmbedding {
    pub fn new(
        num_embeddings: i64,
        embedding_dim: i64,
        padding_idx: i64,
        device: Device,
    ) -> SinusoidalPositionalEmbedding {
        let offset = 2;
        let weights = SinusoidalPositionalEmbedding::build_positional_embeddings(
            num_embeddings + offset,
            embedding_dim,
            padding_idx,
            device,
        );
        SinusoidalPositionalEmbedding {
            weights: RwLock::new(weights),
            embedding_dim,
            padding_idx,
        }
    }

    fn build_positional_embeddings(
        num_embeddings: i64,
        embedding_dim: i64,
        padding_idx: i64,
        device: Device,
    ) -> Tensor {
        let half_dim = embedding_dim / 2;

        let emb = -(10000f64.ln()) / ((half_dim - 1) as f64);
        let emb = (Tensor::arange(half_dim, (Kind::Float, device)) * emb).exp();
        let emb =
            Tensor::arange(num_embeddings, (Kind::Float, device)).unsqueeze(1) * emb.unsqueeze(0);
        let mut sinusoidal_embedding =
            Tensor::cat(&[&emb.sin(), &emb.cos()], 1).view([num_embeddings, -1]);

        if embedding_dim % 2 == 1 {
            sinusoidal_embedding = Tensor::cat(
                &[
                    sinusoidal_embedding,
                    Tensor::zeros(&[num_embeddings, 1], (Kind::Float, device)),
                ],
                1,
            );
        }
        let _ = sinusoidal_embedding.select(0, padding_idx).fill_(0);
        sinusoidal_embedding
    }

    fn create_position_ids_from_input_ids(
        &self,
        input_ids: &Tensor,
        past_key_values_length: i64,
    ) -> Tensor {
        let mask = input_ids.ne(self.padding_idx).to_kind(Kind::Int64);
        let incremental_indices = (mask.cumsum(1, Kind::Int64) + past_key_values_length) * mask;
        incremental_indices + self.padding_idx
    }

    /// Returns the position embeddings of shape (*batch size*, *sequence_length*, *embedding_dim*)
    /// for `input_ids`. Padding tokens are mapped to the (zero) padding position.
    pub fn forward(&self, input_ids: &Tensor, past_key_values_length: i64, kind: Kind) -> Tensor {
        let position_ids =
            self.create_position_ids_from_input_ids(input_ids, past_key_values_length);
        let sequence_length = input_ids.size()[1];
        let max_pos = self.padding_idx + 1 + sequence_length + past_key_values_length;

        let (current_size, current_kind) = {
            let weights = self.weights.read().unwrap();
            (weights.size()[0], weights.kind())
        };
        if max_pos > current_size || current_kind != kind {
            let new_weights = SinusoidalPositionalEmbedding::build_positional_embeddings(
                max_pos.max(current_size),
                self.embedding_dim,
                self.padding_idx,
                input_ids.device(),
            )
            .to_kind(kind);
            *self.weights.write().unwrap() = new_weights;
        }

        let weights = self.weights.read().unwrap();
        weights
            .index_select(0, &position_ids.view([-1]))
            .view((position_ids.size()[0], position_ids.size()[1], -1))
    }
}
