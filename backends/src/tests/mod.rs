use std::{
    io,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use clap::{ArgMatches, Command};
use serde::Serialize;
use thiserror::Error;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer,
};

use crate::{
    model_config::{ModelConfigError, ModelConfigLoader, PretrainedConfig},
    vllm::{ArchitectureRegistry, EngineArgsFactory, VllmAdapter, VllmAvailability},
};


/// Engine arguments that know nothing about speculative decoding
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct DummyEngineArgs {
    pub(crate) seed: u64,
}

#[derive(Debug, Error)]
#[error("dummy engine args factory failure")]
pub(crate) struct DummyEngineArgsError;

/// Registers no flags and always builds default engine arguments
pub(crate) struct DummyEngineArgsFactory;

impl EngineArgsFactory for DummyEngineArgsFactory {
    type EngineArgs = DummyEngineArgs;
    type Error = DummyEngineArgsError;

    fn add_cli_args(&self, command: Command) -> Command {
        command
    }

    fn from_cli_args(&self, _: &ArgMatches) -> Result<Self::EngineArgs, Self::Error> {
        Ok(DummyEngineArgs::default())
    }

    fn set_default_model(&self, _: &mut Self::EngineArgs, _: &ArgMatches, _: &Path) {}
}

/// Registers the given flags and always fails to build engine arguments
pub(crate) struct FailingEngineArgsFactory(pub(crate) Vec<clap::Arg>);

impl EngineArgsFactory for FailingEngineArgsFactory {
    type EngineArgs = DummyEngineArgs;
    type Error = DummyEngineArgsError;

    fn add_cli_args(&self, command: Command) -> Command {
        command.args(self.0.clone())
    }

    fn from_cli_args(&self, _: &ArgMatches) -> Result<Self::EngineArgs, Self::Error> {
        Err(DummyEngineArgsError)
    }

    fn set_default_model(&self, _: &mut Self::EngineArgs, _: &ArgMatches, _: &Path) {}
}

pub(crate) struct StubRegistry(pub(crate) Vec<&'static str>);

impl ArchitectureRegistry for StubRegistry {
    fn supported_architectures(&self) -> Vec<String> {
        self.0.iter().map(|arch| arch.to_string()).collect()
    }
}

/// Returns a fixed configuration, or a not found error, and counts its calls
#[derive(Clone)]
pub(crate) struct StubConfigLoader {
    config: Option<PretrainedConfig>,
    calls: Arc<AtomicUsize>,
}

impl StubConfigLoader {
    pub(crate) fn with_architectures(architectures: &[&str]) -> Self {
        Self {
            config: Some(PretrainedConfig {
                architectures: Some(architectures.iter().map(|a| a.to_string()).collect()),
                ..Default::default()
            }),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_config(config: PretrainedConfig) -> Self {
        Self {
            config: Some(config),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn not_found() -> Self {
        Self {
            config: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelConfigLoader for StubConfigLoader {
    fn load(&self, model_id_or_path: &Path, _: bool) -> Result<PretrainedConfig, ModelConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.config.clone().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no config at {}", model_id_or_path.display()),
            )
            .into()
        })
    }
}

pub(crate) fn available_adapter(
    loader: StubConfigLoader,
) -> VllmAdapter<DummyEngineArgsFactory> {
    VllmAdapter::new(
        VllmAvailability::available(
            DummyEngineArgsFactory,
            StubRegistry(vec!["LlamaForCausalLM", "MistralForCausalLM"]),
        ),
        loader,
    )
}

pub(crate) fn unavailable_adapter(
    loader: StubConfigLoader,
) -> VllmAdapter<DummyEngineArgsFactory> {
    VllmAdapter::new(VllmAvailability::Unavailable, loader)
}

pub(crate) fn try_parse(command: Command, args: &[&str]) -> Result<ArgMatches, clap::Error> {
    command.try_get_matches_from(std::iter::once("hfserver").chain(args.iter().copied()))
}

/// Counts `INFO` events
struct InfoEventCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for InfoEventCounter {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        if *event.metadata().level() == Level::INFO {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` and returns its output with the number of `INFO` events it emitted
pub(crate) fn count_info_events<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(InfoEventCounter(counter.clone()));
    let output = tracing::subscriber::with_default(subscriber, f);
    (output, counter.load(Ordering::SeqCst))
}
