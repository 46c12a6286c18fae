use std::path::Path;

use clap::{ArgMatches, Command};
use hfserver_vllm::{EngineArgs, EngineArgsError, ModelRegistry};

use super::{ArchitectureRegistry, EngineArgsFactory};

/// Registers and builds the engine arguments of the compiled-in vLLM backend
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeEngineArgsFactory;

impl EngineArgsFactory for NativeEngineArgsFactory {
    type EngineArgs = EngineArgs;
    type Error = EngineArgsError;

    fn add_cli_args(&self, command: Command) -> Command {
        EngineArgs::add_cli_args(command)
    }

    fn from_cli_args(&self, matches: &ArgMatches) -> Result<Self::EngineArgs, Self::Error> {
        EngineArgs::from_cli_args(matches)
    }

    fn set_default_model(&self, engine_args: &mut EngineArgs, matches: &ArgMatches, model: &Path) {
        engine_args.set_default_model(matches, model.to_string_lossy());
    }
}

/// Model architectures supported by the compiled-in vLLM backend
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeModelRegistry;

impl ArchitectureRegistry for NativeModelRegistry {
    fn supported_architectures(&self) -> Vec<String> {
        ModelRegistry::get_supported_archs()
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn is_supported(&self, architecture: &str) -> bool {
        ModelRegistry::is_supported_arch(architecture)
    }
}
