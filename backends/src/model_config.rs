use std::path::{Path, PathBuf};

use hf_hub::{
    api::sync::{ApiBuilder, ApiError},
    Repo, RepoType,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Name of a model's configuration file, in a model directory or a huggingface repo
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Key of `auto_map` pointing at a custom configuration class
const AUTO_CONFIG_KEY: &str = "AutoConfig";

/// `PretrainedConfig` - the subset of a huggingface `config.json` we care about,
/// every other key is kept in `extra`
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PretrainedConfig {
    /// Model architectures, e.g. `LlamaForCausalLM`
    pub architectures: Option<Vec<String>>,
    /// Model type, e.g. `llama`
    pub model_type: Option<String>,
    /// Mapping of auto classes to custom code shipped with the model
    pub auto_map: Option<Map<String, Value>>,
    /// Remaining configuration keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PretrainedConfig {
    /// Creates a new instance of self, from a file path
    pub fn from_file_path(path: &Path) -> Result<Self, ModelConfigError> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    /// Declared architectures of the model
    pub fn architectures(&self) -> Result<&[String], ModelConfigError> {
        self.architectures
            .as_deref()
            .ok_or(ModelConfigError::MissingArchitectures)
    }

    /// Whether loading the configuration requires running code shipped with the model
    pub fn has_remote_code(&self) -> bool {
        self.auto_map
            .as_ref()
            .map(|auto_map| auto_map.contains_key(AUTO_CONFIG_KEY))
            .unwrap_or_default()
    }
}

/// `ModelConfigLoader` - interface for loading a model's configuration
pub trait ModelConfigLoader {
    /// Loads the configuration of the model at `model_id_or_path`.
    ///
    /// # Arguments
    /// * `model_id_or_path` - A local model directory, a `config.json` file, or a huggingface model id.
    /// * `trust_remote_code` - Whether custom code shipped with the model may be trusted.
    ///
    /// # Returns
    /// `Result<PretrainedConfig, ModelConfigError>` containing the parsed configuration.
    fn load(
        &self,
        model_id_or_path: &Path,
        trust_remote_code: bool,
    ) -> Result<PretrainedConfig, ModelConfigError>;
}

/// `HubModelConfigLoader` - loads model configurations from the local filesystem,
/// falling back to the huggingface hub for anything that isn't a local path
#[derive(Clone, Debug, Default)]
pub struct HubModelConfigLoader {
    /// Huggingface API token
    api_key: Option<String>,
    /// Cache directory for downloaded files
    cache_dir: Option<PathBuf>,
    /// Model revision, the hub's default branch if not set
    revision: Option<String>,
}

impl HubModelConfigLoader {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the huggingface API token
    pub fn with_token(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the cache directory for downloaded files
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Sets the model revision to fetch from the hub
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Resolves the path of the configuration file, downloading it if needed
    fn resolve_config_path(&self, model_id_or_path: &Path) -> Result<PathBuf, ModelConfigError> {
        if model_id_or_path.is_dir() {
            return Ok(model_id_or_path.join(CONFIG_FILE_NAME));
        }
        if model_id_or_path.is_file() {
            return Ok(model_id_or_path.to_path_buf());
        }
        self.fetch(model_id_or_path.to_string_lossy().into_owned())
    }

    /// Fetches the model's `config.json` from the huggingface hub
    fn fetch(&self, model_id: String) -> Result<PathBuf, ModelConfigError> {
        info!("Fetching `{CONFIG_FILE_NAME}` for model `{model_id}` from the hub..");

        let mut builder = ApiBuilder::new().with_progress(false);
        // an unset token keeps the one from the local huggingface cache
        if let Some(api_key) = &self.api_key {
            builder = builder.with_token(Some(api_key.clone()));
        }
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build()?;

        let repo = match &self.revision {
            Some(revision) => Repo::with_revision(model_id, RepoType::Model, revision.clone()),
            None => Repo::model(model_id),
        };
        Ok(api.repo(repo).get(CONFIG_FILE_NAME)?)
    }
}

impl ModelConfigLoader for HubModelConfigLoader {
    #[instrument(skip(self))]
    fn load(
        &self,
        model_id_or_path: &Path,
        trust_remote_code: bool,
    ) -> Result<PretrainedConfig, ModelConfigError> {
        let config_path = self.resolve_config_path(model_id_or_path)?;
        debug!(config_path = %config_path.display(), "Loading model config");

        let config = PretrainedConfig::from_file_path(&config_path)?;
        if config.has_remote_code() && !trust_remote_code {
            return Err(ModelConfigError::RemoteCodeNotTrusted(
                model_id_or_path.display().to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ModelConfigError {
    #[error("Api error: `{0}`")]
    ApiError(#[from] ApiError),
    #[error("Io error: `{0}`")]
    IoError(#[from] std::io::Error),
    #[error("Serde json error: `{0}`")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Model `{0}` contains custom code which must be executed to load its configuration, set `trust_remote_code` to allow it")]
    RemoteCodeNotTrusted(String),
    #[error("Model config does not declare any `architectures`")]
    MissingArchitectures,
}
