//! # Resource definitions for model weights, dictionaries and configuration files
//!
//! The models and tools of this crate access their files through Resources:
//! - pretrained M2M100 weights used to initialize the family encoders and decoders
//! - configuration files (model architecture, multilingual settings, language families)
//! - fairseq dictionaries and text embedding files
//!
//! Two types of resources are pre-defined:
//! - LocalResource: points to a local file
//! - RemoteResource: points to a remote file via a URL, downloaded and cached on first use
//!   (requires the `remote` feature, enabled by default)
//!
//! For both types of resources, the local location of the file can be retrieved using
//! `get_local_path`, allowing to reference the resource file location regardless if it is a remote
//! or local resource.

mod local;

use crate::common::error::MultilingualError;
pub use local::LocalResource;
use std::path::PathBuf;

/// # Resource Trait that can provide the location of the model, configuration or dictionary resources
pub trait ResourceProvider {
    /// Provides the local path for a resource.
    ///
    /// # Returns
    ///
    /// * `PathBuf` pointing to the resource file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multilingual_m2m::resources::{LocalResource, ResourceProvider};
    /// use std::path::PathBuf;
    /// let checkpoint_resource = LocalResource::from(PathBuf::from("path/to/m2m100.ot"));
    /// let checkpoint_path = checkpoint_resource.get_local_path();
    /// ```
    fn get_local_path(&self) -> Result<PathBuf, MultilingualError>;
}

#[cfg(feature = "remote")]
mod remote;
#[cfg(feature = "remote")]
pub use remote::RemoteResource;
