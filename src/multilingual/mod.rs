//! # Family-shared multilingual translation model
//!
//! Multilingual translation set-up in which languages are grouped in families: the source
//! languages of a family share one M2M100 encoder and the target languages of a family share one
//! M2M100 decoder. Token embeddings can be shared across families (per side or for both sides),
//! and the family modules can be initialized from a pretrained M2M100 checkpoint.
//!
//! The main components are:
//! - `LanguagePair`, `LanguageFamilies` and `TranslationTask` describing the languages served
//! - `Dictionary`, the fairseq symbol dictionary of a language
//! - `MultilingualConfig`, the architecture and sharing options
//! - `MultilingualM2M100Model`, the composed model with its per-pair state dict view
//! - `PretrainedM2M`, the pretrained weights used for initialization
//!
//! ```no_run
//! use multilingual_m2m::multilingual::{
//!     LanguageFamilies, LanguageFamily, LanguagePair, MultilingualConfig,
//!     MultilingualM2M100Model, TranslationTask,
//! };
//! use tch::{nn, Device, Tensor};
//!
//! # fn main() -> Result<(), multilingual_m2m::MultilingualError> {
//! let families = LanguageFamilies::new(vec![LanguageFamily {
//!     name: "family_1".into(),
//!     languages: vec!["de".into(), "nl".into()],
//! }]);
//! let lang_pairs = LanguagePair::parse_list("en-de,en-nl")?;
//! let task = TranslationTask::from_dictionary_dir("path/to/data-bin", lang_pairs)?;
//! let config = MultilingualConfig {
//!     share_encoders: true,
//!     ..MultilingualConfig::base()
//! };
//!
//! let vs = nn::VarStore::new(Device::Cpu);
//! let model = MultilingualM2M100Model::build(&vs, &config, &task, &families)?;
//! assert_eq!(model.num_decoders(), 1);
//!
//! let input_ids = Tensor::of_slice(&[2i64, 17, 25, 2]).unsqueeze(0);
//! let decoder_input_ids = Tensor::of_slice(&[2i64, 31]).unsqueeze(0);
//! let logits = model.forward_t(
//!     &LanguagePair::new("en", "de"),
//!     &input_ids,
//!     None,
//!     &decoder_input_ids,
//!     false,
//! )?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dictionary;
pub mod embeddings;
mod families;
mod language_pair;
mod multilingual_model;
mod pretrained;
mod task;

pub use config::{MultilingualConfig, PipelineConfig};
pub use dictionary::Dictionary;
pub use families::{LanguageFamilies, LanguageFamily};
pub use language_pair::LanguagePair;
pub use multilingual_model::MultilingualM2M100Model;
pub use pretrained::PretrainedM2M;
pub use task::TranslationTask;
