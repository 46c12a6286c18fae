use std::{fs, path::Path};

use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, FromArgMatches};
use hfserver_backends::{
    vllm::lenient_get_one, ArchitectureRegistry, EngineArgsFactory, HubModelConfigLoader,
    VllmAdapter, VllmAvailability,
};
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;

use crate::cli::{Args, TRUST_REMOTE_CODE};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StubEngineArgs {
    pub model: Option<String>,
    pub trust_remote_code: bool,
}

#[derive(Debug, Error)]
#[error("stub engine args error")]
pub struct StubEngineArgsError;

/// Registers a native `--trust-remote-code` flag, like vLLM does
pub struct StubEngineArgsFactory;

impl EngineArgsFactory for StubEngineArgsFactory {
    type EngineArgs = StubEngineArgs;
    type Error = StubEngineArgsError;

    fn add_cli_args(&self, command: Command) -> Command {
        command.arg(
            Arg::new(TRUST_REMOTE_CODE)
                .long("trust-remote-code")
                .action(ArgAction::SetTrue),
        )
    }

    fn from_cli_args(&self, matches: &ArgMatches) -> Result<Self::EngineArgs, Self::Error> {
        Ok(StubEngineArgs {
            model: None,
            trust_remote_code: matches.get_flag(TRUST_REMOTE_CODE),
        })
    }

    fn set_default_model(&self, engine_args: &mut StubEngineArgs, _: &ArgMatches, model: &Path) {
        engine_args.model = Some(model.display().to_string());
    }
}

pub struct StubRegistry;

impl ArchitectureRegistry for StubRegistry {
    fn supported_architectures(&self) -> Vec<String> {
        vec!["LlamaForCausalLM".to_string()]
    }
}

pub fn available_adapter() -> VllmAdapter<StubEngineArgsFactory> {
    VllmAdapter::new(
        VllmAvailability::available(StubEngineArgsFactory, StubRegistry),
        HubModelConfigLoader::new(),
    )
}

pub fn unavailable_adapter() -> VllmAdapter<StubEngineArgsFactory> {
    VllmAdapter::new(VllmAvailability::Unavailable, HubModelConfigLoader::new())
}

/// Server command line that ignores `MODEL_DIR` and `MODEL_ID`
pub fn command_without_env() -> Command {
    Args::command()
        .mut_arg("model_dir", |arg| arg.env(None::<&'static str>))
        .mut_arg("model_id", |arg| arg.env(None::<&'static str>))
}

/// Parses `args` with a command line built through `adapter`
pub fn parse<F>(adapter: &VllmAdapter<F>, args: &[&str]) -> (Args, ArgMatches)
where
    F: EngineArgsFactory,
{
    let command = adapter
        .maybe_add_vllm_cli_parser(command_without_env())
        .expect("failed to build command line");
    let matches = command
        .try_get_matches_from(std::iter::once("hfserver").chain(args.iter().copied()))
        .expect("failed to parse args");
    let args = Args::from_arg_matches(&matches).expect("failed to read args");
    (args, matches)
}

pub fn trust_remote_code(matches: &ArgMatches) -> bool {
    lenient_get_one::<bool>(matches, TRUST_REMOTE_CODE).unwrap_or_default()
}

/// Creates a model directory with the given `config.json`
pub fn model_dir(config: Value) -> TempDir {
    let model_dir = tempfile::tempdir().expect("failed to create temp dir");
    write_config(model_dir.path(), config);
    model_dir
}

fn write_config(model_dir: &Path, config: Value) {
    fs::write(model_dir.join("config.json"), config.to_string()).expect("failed to write config");
}
