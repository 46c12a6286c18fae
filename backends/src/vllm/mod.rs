//! Availability gate and argument adapter for the optional vLLM backend.
//!
//! Every operation degrades to a no-op when the backend is not available:
//! the command line is returned untouched, no engine arguments are built, and
//! no model is reported as supported.

#[cfg(feature = "vllm")]
mod native;

use std::{path::Path, sync::Arc};

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::model_config::{HubModelConfigLoader, ModelConfigError, ModelConfigLoader};

#[cfg(feature = "vllm")]
pub use native::{NativeEngineArgsFactory, NativeModelRegistry};

/// Argument id of the speculative (draft) model
pub const SPECULATIVE_MODEL: &str = "speculative_model";
/// Argument id of the speculative model revision
pub const SPECULATIVE_MODEL_REVISION: &str = "speculative_model_revision";
/// Argument id of the number of speculative tokens
pub const NUM_SPECULATIVE_TOKENS: &str = "num_speculative_tokens";

/// `EngineArgsFactory` - the backend's own command line surface: it registers
/// the backend's native flags and builds its engine arguments from them
pub trait EngineArgsFactory {
    /// Engine arguments built by the backend
    type EngineArgs;
    /// Error raised while building the engine arguments
    type Error: std::error::Error + Send + Sync + 'static;

    /// Registers every native backend flag on `command`
    fn add_cli_args(&self, command: Command) -> Command;

    /// Builds the backend's engine arguments from parsed command line arguments
    fn from_cli_args(&self, matches: &ArgMatches) -> Result<Self::EngineArgs, Self::Error>;

    /// Points `engine_args` at `model`, unless a model was given through the
    /// backend's own flags
    fn set_default_model(
        &self,
        engine_args: &mut Self::EngineArgs,
        matches: &ArgMatches,
        model: &Path,
    );
}

/// `ArchitectureRegistry` - the set of model architectures a backend can run
pub trait ArchitectureRegistry {
    /// Every supported architecture name
    fn supported_architectures(&self) -> Vec<String>;

    /// Checks if `architecture` is supported
    fn is_supported(&self, architecture: &str) -> bool {
        self.supported_architectures()
            .iter()
            .any(|supported| supported == architecture)
    }
}

/// Whether the vLLM backend can be used, and if so, its capabilities
pub enum VllmAvailability<F> {
    /// The backend is installed
    Available {
        /// Native argument registration and engine arguments factory
        factory: F,
        /// Supported model architectures
        registry: Arc<dyn ArchitectureRegistry + Send + Sync>,
    },
    /// The backend is not installed
    Unavailable,
}

impl<F> VllmAvailability<F> {
    /// Constructor for an available backend
    pub fn available<R>(factory: F, registry: R) -> Self
    where
        R: ArchitectureRegistry + Send + Sync + 'static,
    {
        Self::Available {
            factory,
            registry: Arc::new(registry),
        }
    }

    /// Whether the backend is installed
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

impl VllmAvailability<DefaultEngineArgsFactory> {
    /// Availability of the vLLM backend compiled into this build
    #[cfg(feature = "vllm")]
    pub fn detect() -> Self {
        Self::available(NativeEngineArgsFactory, NativeModelRegistry)
    }

    /// Availability of the vLLM backend compiled into this build
    #[cfg(not(feature = "vllm"))]
    pub fn detect() -> Self {
        Self::Unavailable
    }
}

/// Engine arguments factory of the vLLM backend compiled into this build
#[cfg(feature = "vllm")]
pub type DefaultEngineArgsFactory = NativeEngineArgsFactory;

/// Engine arguments factory of the vLLM backend compiled into this build
#[cfg(not(feature = "vllm"))]
pub type DefaultEngineArgsFactory = VllmNotInstalled;

/// Stands in for the vLLM backend when the crate is built without the `vllm`
/// feature. It has no values, so the backend can only be `Unavailable`.
#[derive(Clone, Copy, Debug)]
pub enum VllmNotInstalled {}

/// Engine arguments of a backend that is not installed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NoEngineArgs {}

impl EngineArgsFactory for VllmNotInstalled {
    type EngineArgs = NoEngineArgs;
    type Error = std::convert::Infallible;

    fn add_cli_args(&self, _: Command) -> Command {
        match *self {}
    }

    fn from_cli_args(&self, _: &ArgMatches) -> Result<Self::EngineArgs, Self::Error> {
        match *self {}
    }

    fn set_default_model(&self, _: &mut Self::EngineArgs, _: &ArgMatches, _: &Path) {
        match *self {}
    }
}

/// `SpeculativeArgs` - speculative decoding arguments, not native to vLLM's
/// engine arguments
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct SpeculativeArgs {
    /// Path or identifier of the speculative (draft) model
    pub speculative_model: Option<String>,
    /// Revision of the speculative model
    pub speculative_model_revision: Option<String>,
    /// Number of tokens proposed by the speculative model per step
    pub num_speculative_tokens: Option<usize>,
}

impl SpeculativeArgs {
    /// The speculative decoding flags
    pub fn args() -> [Arg; 3] {
        [
            Arg::new(SPECULATIVE_MODEL)
                .long("speculative-model")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String))
                .help("Path to the speculative (draft) model for speculative decoding"),
            Arg::new(SPECULATIVE_MODEL_REVISION)
                .long("speculative-model-revision")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String))
                .help("Revision of the speculative model"),
            Arg::new(NUM_SPECULATIVE_TOKENS)
                .long("num-speculative-tokens")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(usize))
                .help("Number of speculative tokens to use for speculative decoding"),
        ]
    }

    /// Reads the speculative decoding arguments from `matches`. An argument
    /// that was never registered on the command, or that holds a value of
    /// another type, reads as `None`.
    pub fn from_arg_matches(matches: &ArgMatches) -> Self {
        Self {
            speculative_model: lenient_get_one::<String>(matches, SPECULATIVE_MODEL),
            speculative_model_revision: lenient_get_one::<String>(
                matches,
                SPECULATIVE_MODEL_REVISION,
            ),
            num_speculative_tokens: lenient_get_one::<usize>(matches, NUM_SPECULATIVE_TOKENS),
        }
    }
}

/// Gets the value of argument `id`, or `None` if `matches` has no such argument
pub fn lenient_get_one<T>(matches: &ArgMatches, id: &str) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    matches.try_get_one::<T>(id).ok().flatten().cloned()
}

/// `VllmEngineArgs` - the backend's engine arguments, extended with
/// speculative decoding settings
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VllmEngineArgs<E> {
    /// Native engine arguments
    pub engine_args: E,
    /// Path or identifier of the speculative (draft) model
    pub speculative_model: Option<String>,
    /// Revision of the speculative model
    pub speculative_model_revision: Option<String>,
    /// Number of tokens proposed by the speculative model per step
    pub num_speculative_tokens: Option<usize>,
}

impl<E> VllmEngineArgs<E> {
    /// Constructor, without speculative decoding
    pub fn new(engine_args: E) -> Self {
        Self {
            engine_args,
            speculative_model: None,
            speculative_model_revision: None,
            num_speculative_tokens: None,
        }
    }

    /// Copies the speculative decoding settings onto self
    pub fn set_speculative_args(&mut self, speculative_args: SpeculativeArgs) {
        let SpeculativeArgs {
            speculative_model,
            speculative_model_revision,
            num_speculative_tokens,
        } = speculative_args;
        self.speculative_model = speculative_model;
        self.speculative_model_revision = speculative_model_revision;
        self.num_speculative_tokens = num_speculative_tokens;
    }

    /// Whether a speculative model is configured
    pub fn is_speculative(&self) -> bool {
        self.speculative_model.is_some()
    }
}

/// `VllmAdapter` - gates the vLLM backend's command line arguments,
/// engine arguments and model support checks behind its availability
pub struct VllmAdapter<F> {
    /// Backend availability
    availability: VllmAvailability<F>,
    /// Model configuration loader
    config_loader: Arc<dyn ModelConfigLoader + Send + Sync>,
}

impl VllmAdapter<DefaultEngineArgsFactory> {
    /// Adapter for the vLLM backend compiled into this build, loading model
    /// configurations from disk or the huggingface hub
    pub fn detect() -> Self {
        Self::new(VllmAvailability::detect(), HubModelConfigLoader::new())
    }
}

impl<F> VllmAdapter<F>
where
    F: EngineArgsFactory,
{
    /// Constructor
    pub fn new<L>(availability: VllmAvailability<F>, config_loader: L) -> Self
    where
        L: ModelConfigLoader + Send + Sync + 'static,
    {
        Self {
            availability,
            config_loader: Arc::new(config_loader),
        }
    }

    /// Whether the vLLM backend is available
    pub fn vllm_available(&self) -> bool {
        self.availability.is_available()
    }

    /// Checks whether every architecture declared by the model's configuration
    /// is supported by vLLM. Always `false` if vLLM is not available, in which
    /// case the model configuration is not loaded.
    ///
    /// # Arguments
    /// * `model_config_path` - Model directory, `config.json` file or huggingface model id.
    /// * `trust_remote_code` - Whether custom code shipped with the model may be trusted.
    ///
    /// # Errors
    /// Any error raised while loading the model configuration is returned as is.
    #[instrument(skip_all, fields(model = %model_config_path.as_ref().display()))]
    pub fn infer_vllm_supported_from_model_architecture<P: AsRef<Path>>(
        &self,
        model_config_path: P,
        trust_remote_code: bool,
    ) -> Result<bool, ModelConfigError> {
        let VllmAvailability::Available { registry, .. } = &self.availability else {
            return Ok(false);
        };

        let model_config = self
            .config_loader
            .load(model_config_path.as_ref(), trust_remote_code)?;
        for architecture in model_config.architectures()? {
            if !registry.is_supported(architecture) {
                info!(architecture = %architecture, "not a supported model by vLLM");
                return Ok(false);
            }
        }
        debug!("Model architectures are supported by vLLM");
        Ok(true)
    }

    /// Extends `command` with vLLM's native flags and the speculative decoding
    /// flags. Returns `command` untouched if vLLM is not available.
    ///
    /// # Errors
    /// Returns `VllmCliError::DuplicateArgument` if a speculative decoding flag
    /// is already defined on the command.
    pub fn maybe_add_vllm_cli_parser(&self, command: Command) -> Result<Command, VllmCliError> {
        let VllmAvailability::Available { factory, .. } = &self.availability else {
            return Ok(command);
        };

        let mut command = factory.add_cli_args(command);
        for arg in SpeculativeArgs::args() {
            if let Some(existing) = command
                .get_arguments()
                .find(|existing| conflicts(existing, &arg))
            {
                return Err(VllmCliError::DuplicateArgument(
                    existing.get_id().to_string(),
                ));
            }
            command = command.arg(arg);
        }
        Ok(command)
    }

    /// Builds vLLM's engine arguments from parsed command line arguments,
    /// with the speculative decoding settings found in `matches`. Returns
    /// `None` if vLLM is not available.
    ///
    /// # Errors
    /// Any error raised by the backend's engine arguments factory is returned as is.
    pub fn build_vllm_engine_args(
        &self,
        matches: &ArgMatches,
    ) -> Result<Option<VllmEngineArgs<F::EngineArgs>>, F::Error> {
        let VllmAvailability::Available { factory, .. } = &self.availability else {
            return Ok(None);
        };

        let mut engine_args = VllmEngineArgs::new(factory.from_cli_args(matches)?);
        engine_args.set_speculative_args(SpeculativeArgs::from_arg_matches(matches));
        Ok(Some(engine_args))
    }

    /// Points vLLM's engine arguments at `model`, unless a model was given
    /// through vLLM's own flags. Does nothing if vLLM is not available.
    pub fn set_vllm_model(
        &self,
        engine_args: &mut VllmEngineArgs<F::EngineArgs>,
        matches: &ArgMatches,
        model: &Path,
    ) {
        if let VllmAvailability::Available { factory, .. } = &self.availability {
            factory.set_default_model(&mut engine_args.engine_args, matches, model);
        }
    }
}

/// Two arguments conflict if they share an id or a long flag name
fn conflicts(existing: &Arg, arg: &Arg) -> bool {
    existing.get_id() == arg.get_id()
        || matches!((existing.get_long(), arg.get_long()), (Some(a), Some(b)) if a == b)
}

#[derive(Debug, Error)]
pub enum VllmCliError {
    #[error("Argument `{0}` is already defined on the command line")]
    DuplicateArgument(String),
}
