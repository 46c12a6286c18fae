//! This crate contains the configuration surface of the vLLM inference engine: the engine
//! arguments, their command line registration, and the registry of model architectures the
//! engine is able to run. Flag names and defaults mirror vLLM's engine arguments,
//! see https://github.com/vllm-project/vllm.

pub mod config;
pub mod registry;

pub use config::{EngineArgs, EngineArgsError};
pub use registry::ModelRegistry;
