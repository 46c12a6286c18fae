use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Serialize;

/// Name the model is served under, if not given
pub const DEFAULT_MODEL_NAME: &str = "model";
/// Argument id of vLLM's `--trust-remote-code` flag
pub const TRUST_REMOTE_CODE: &str = "trust_remote_code";

/// Serves huggingface models, with vLLM when it is available and supports the model
#[derive(Debug, Parser)]
#[command(name = "hfserver", author, version, about, long_about = None)]
pub struct Args {
    /// The name that the model is served under
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,
    /// A local path to the model directory
    #[arg(long, env = "MODEL_DIR")]
    pub model_dir: Option<PathBuf>,
    /// Huggingface model id
    #[arg(long, env = "MODEL_ID")]
    pub model_id: Option<String>,
    /// The backend to serve the model with
    #[arg(long, value_enum, default_value_t = BackendKind::Auto)]
    pub backend: BackendKind,
}

impl Args {
    /// The local model directory if given, the huggingface model id otherwise
    pub fn model_id_or_path(&self) -> Option<PathBuf> {
        self.model_dir
            .clone()
            .or_else(|| self.model_id.as_ref().map(PathBuf::from))
    }
}

/// Serving backends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// vLLM if it is available and supports the model, huggingface otherwise
    #[default]
    Auto,
    /// vLLM engine
    Vllm,
    /// Huggingface transformers
    Huggingface,
}
