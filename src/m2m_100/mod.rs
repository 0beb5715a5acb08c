//! # M2M-100 (Fan et al.)
//!
//! Implementation of the M2M-100 transformer ([Beyond English-Centric Multilingual Machine Translation](https://arxiv.org/abs/2010.11125) Fan, Bhosale, Schwenk, Ma, El-Kishky, Goyal, Baines, Celebi, Wenzek, Chaudhary, Goyal, Birch, Liptchinsky, Edunov, Grave, Auli, Joulin, 2020).
//! The base model is implemented in the `m2m_100_model::M2M100Model` struct. The encoder and decoder stacks
//! (`M2M100Encoder`, `M2M100Decoder`) are exposed on their own and take the token embeddings as a forward
//! argument, which allows the `multilingual` module to compose them per language family.
//!
//! # Model set-up and pre-trained weights loading
//!
//! - Configuration file expected to have a structure following the [Transformers library](https://github.com/huggingface/transformers)
//! - Model weights are expected to have a structure and parameter names following the [Transformers library](https://github.com/huggingface/transformers).
//!   A conversion of the `.npz` exported weights to the `.ot` format is available with `cargo run --bin convert-tensor`.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! #
//! use tch::{nn, Device};
//! # use std::path::PathBuf;
//! use multilingual_m2m::m2m_100::{M2M100Config, M2M100Model};
//! use multilingual_m2m::resources::{LocalResource, ResourceProvider};
//! use multilingual_m2m::Config;
//!
//! let config_resource = LocalResource {
//!     local_path: PathBuf::from("path/to/config.json"),
//! };
//! let weights_resource = LocalResource {
//!     local_path: PathBuf::from("path/to/model.ot"),
//! };
//! let config_path = config_resource.get_local_path()?;
//! let weights_path = weights_resource.get_local_path()?;
//!
//! let device = Device::cuda_if_available();
//! let mut vs = nn::VarStore::new(device);
//! let config = M2M100Config::from_file(config_path)?;
//! let m2m100_model = M2M100Model::new(&vs.root() / "model", &config);
//! vs.load(weights_path)?;
//!
//! # Ok(())
//! # }
//! ```

mod attention;
mod decoder;
mod embeddings;
mod encoder;
mod m2m_100_model;

pub use attention::LayerState;
pub use decoder::{M2M100Decoder, M2M100DecoderLayer, M2M100DecoderOutput};
pub use embeddings::SinusoidalPositionalEmbedding;
pub use encoder::{M2M100Encoder, M2M100EncoderLayer, M2M100EncoderOutput};
pub use m2m_100_model::{
    M2M100Config, M2M100ConfigResources, M2M100DictionaryResources, M2M100Model,
    M2M100ModelOutput, M2M100ModelResources,
};

pub(crate) use m2m_100_model::{_expand_mask, _make_causal_mask};
