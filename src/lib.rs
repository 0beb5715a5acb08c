//! # Family-shared multilingual M2M100 translation models
//!
//! Multilingual sequence-to-sequence models in which languages are grouped in families sharing
//! an encoder and/or a decoder, built on `tch-rs` (Rust bindings to libtorch). The crate provides:
//! - the M2M100 encoder and decoder stacks (`m2m_100`)
//! - the family-shared composition, with embedding sharing options, pretrained M2M100
//!   initialization and a per language pair state dict view (`multilingual`)
//! - the generator of the language table used by the translation demo (`language_table`)
//!
//! # Loading pretrained weights
//!
//! Pretrained M2M100 checkpoints are read in the `.ot` format. A PyTorch `state_dict` exported to
//! numpy (`.npz`) can be converted with the `convert-tensor` binary:
//!
//! ```bash
//! cargo run --bin=convert-tensor --release -- m2m100_418M.npz m2m100_418M.ot --strip-prefix model.
//! ```
//!
//! The checkpoint is then referenced by `pretrained_m2m_checkpoint` in the model configuration.
//!
//! # Quick start
//!
//! ```no_run
//! use multilingual_m2m::multilingual::{
//!     LanguageFamilies, LanguagePair, MultilingualConfig, MultilingualM2M100Model,
//!     TranslationTask,
//! };
//! use multilingual_m2m::Config;
//! use tch::{nn, Device, Tensor};
//!
//! # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
//! let config = MultilingualConfig::from_file("config.json")?;
//! let families = LanguageFamilies::from_file("families.json")?;
//! let task = TranslationTask::from_dictionary_dir(
//!     "data-bin",
//!     LanguagePair::parse_list("en-de,en-nl,en-fr")?,
//! )?;
//!
//! let vs = nn::VarStore::new(Device::cuda_if_available());
//! let model = MultilingualM2M100Model::build(&vs, &config, &task, &families)?;
//!
//! let input_ids = Tensor::of_slice(&[2i64, 1281, 754, 2]).unsqueeze(0);
//! let output = model.generate(&LanguagePair::new("en", "de"), &input_ids, None, 64, None)?;
//! # Ok(())
//! # }
//! ```

pub mod language_table;
pub mod m2m_100;
pub mod multilingual;

mod common;

pub use common::error::MultilingualError;
pub use common::resources;
pub use common::{Activation, Config};
