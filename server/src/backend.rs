use std::path::PathBuf;

use clap::ArgMatches;
use hfserver_backends::{EngineArgsFactory, ModelConfigError, VllmAdapter, VllmEngineArgs};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::cli::{Args, BackendKind};

/// `ServingPlan` - the backend a model will be served with, and its engine arguments
#[derive(Debug, Serialize)]
pub struct ServingPlan<E> {
    /// Name the model is served under
    pub model_name: String,
    /// Model directory or huggingface model id
    pub model: PathBuf,
    /// Selected backend, never `BackendKind::Auto`
    pub backend: BackendKind,
    /// vLLM engine arguments, if the model is served with vLLM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_args: Option<VllmEngineArgs<E>>,
}

/// Builds vLLM's engine arguments, pointed at the served model unless vLLM's
/// own `--model` was given. Returns `None` if vLLM is not available.
///
/// # Errors
///
/// Any error raised by the backend's engine arguments factory is returned as is.
pub fn build_engine_args<F>(
    args: &Args,
    adapter: &VllmAdapter<F>,
    matches: &ArgMatches,
) -> Result<Option<VllmEngineArgs<F::EngineArgs>>, F::Error>
where
    F: EngineArgsFactory,
{
    let mut engine_args = adapter.build_vllm_engine_args(matches)?;
    if let (Some(engine_args), Some(model)) = (engine_args.as_mut(), args.model_id_or_path()) {
        adapter.set_vllm_model(engine_args, matches, &model);
    }
    Ok(engine_args)
}

/// Selects the backend to serve the model with.
///
/// # Arguments
///
/// * `args` - The parsed server arguments
/// * `adapter` - The vLLM adapter the command line was built with
/// * `engine_args` - vLLM engine arguments, as built by the adapter
/// * `trust_remote_code` - Whether to trust custom code shipped with the model
///
/// # Errors
///
/// Returns a `ServerError` if no model was given, if vLLM was explicitly requested
/// but isn't available, or if the model's configuration can't be loaded.
#[instrument(skip_all, fields(backend = ?args.backend))]
pub fn select_backend<F>(
    args: &Args,
    adapter: &VllmAdapter<F>,
    engine_args: Option<VllmEngineArgs<F::EngineArgs>>,
    trust_remote_code: bool,
) -> Result<ServingPlan<F::EngineArgs>, ServerError>
where
    F: EngineArgsFactory,
{
    let model = args.model_id_or_path().ok_or(ServerError::MissingModel)?;

    let engine_args = match args.backend {
        BackendKind::Huggingface => None,
        BackendKind::Vllm => Some(engine_args.ok_or(ServerError::VllmNotAvailable)?),
        BackendKind::Auto => match engine_args {
            Some(engine_args) => adapter
                .infer_vllm_supported_from_model_architecture(&model, trust_remote_code)?
                .then_some(engine_args),
            None => None,
        },
    };
    let backend = if engine_args.is_some() {
        BackendKind::Vllm
    } else {
        BackendKind::Huggingface
    };
    info!(model = %model.display(), "Serving model with the {backend:?} backend");

    Ok(ServingPlan {
        model_name: args.model_name.clone(),
        model,
        backend,
        engine_args,
    })
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Either `--model-dir` or `--model-id` must be set")]
    MissingModel,
    #[error("The vLLM backend was requested, but it is not available")]
    VllmNotAvailable,
    #[error("Model config error: `{0}`")]
    ModelConfigError(#[from] ModelConfigError),
}
