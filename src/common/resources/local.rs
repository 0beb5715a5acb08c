use crate::common::error::MultilingualError;
use crate::resources::ResourceProvider;
use std::path::PathBuf;

/// # Local resource
#[derive(Debug, PartialEq, Clone)]
pub struct LocalResource {
    /// Local path for the resource
    pub local_path: PathBuf,
}

impl ResourceProvider for LocalResource {
    /// Gets the path for a local resource. The file is required to exist.
    ///
    /// # Returns
    ///
    /// * `PathBuf` pointing to the resource file
    fn get_local_path(&self) -> Result<PathBuf, MultilingualError> {
        if !self.local_path.exists() {
            return Err(MultilingualError::IOError(format!(
                "resource {} does not exist",
                self.local_path.display()
            )));
        }
        Ok(self.local_path.clone())
    }
}

impl From<PathBuf> for LocalResource {
    fn from(local_path: PathBuf) -> Self {
        LocalResource { local_path }
    }
}
