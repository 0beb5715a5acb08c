use super::*;
use crate::common::error::MultilingualError;
use cached_path::{Cache, Options, ProgressBar};
use dirs::cache_dir;
use lazy_static::lazy_static;
use std::path::PathBuf;

/// # Remote resource that will be downloaded and cached locally on demand
#[derive(Debug, PartialEq, Clone)]
pub struct RemoteResource {
    /// Remote path/url for the resource
    pub url: String,
    /// Local subdirectory of the cache root where this resource is saved
    pub cache_subdir: String,
}

impl RemoteResource {
    /// Creates a new RemoteResource from an URL and a cache subdirectory. Note that this does not
    /// download the resource (only declares the remote and local locations)
    ///
    /// # Arguments
    ///
    /// * `url` - `&str` Location of the remote resource
    /// * `cache_subdir` - `&str` Local subdirectory of the cache root to save the resource to
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multilingual_m2m::resources::RemoteResource;
    /// let config_resource = RemoteResource::new("http://config_json_location", "configs");
    /// ```
    pub fn new(url: &str, cache_subdir: &str) -> RemoteResource {
        RemoteResource {
            url: url.to_string(),
            cache_subdir: cache_subdir.to_string(),
        }
    }

    /// Creates a new RemoteResource from one of the `(name, url)` pretrained resource constants
    /// (e.g. `M2M100ModelResources::M2M100_418M`).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multilingual_m2m::m2m_100::M2M100ModelResources;
    /// use multilingual_m2m::resources::RemoteResource;
    /// let weights_resource = RemoteResource::from_pretrained(M2M100ModelResources::M2M100_418M);
    /// ```
    pub fn from_pretrained(name_url_tuple: (&str, &str)) -> RemoteResource {
        let cache_subdir = name_url_tuple.0.to_string();
        let url = name_url_tuple.1.to_string();
        RemoteResource { url, cache_subdir }
    }
}

impl ResourceProvider for RemoteResource {
    /// Downloads the resource if it is not cached yet and returns the path to the cached file.
    fn get_local_path(&self) -> Result<PathBuf, MultilingualError> {
        let cached_path = CACHE
            .cached_path_with_options(&self.url, &Options::default().subdir(&self.cache_subdir))?;
        Ok(cached_path)
    }
}

lazy_static! {
/// # Global cache directory
/// If the environment variable `MULTILINGUAL_M2M_CACHE` is set, will save the cache files at that
/// location. Otherwise defaults to `$XDG_CACHE_HOME/.multilingual_m2m`, or corresponding user
/// cache for the current system.
    pub static ref CACHE: Cache = Cache::builder()
        .dir(_get_cache_directory())
        .progress_bar(Some(ProgressBar::Light))
        .build()
        .expect("could not create the resource cache");
}

fn _get_cache_directory() -> PathBuf {
    match std::env::var("MULTILINGUAL_M2M_CACHE") {
        Ok(value) => PathBuf::from(value),
        Err(_) => {
            let mut home = cache_dir().unwrap_or_else(std::env::temp_dir);
            home.push(".multilingual_m2m");
            home
        }
    }
}
