//! Model serving backends. The vLLM backend is optional, it is compiled in
//! with the `vllm` feature; without it, every vLLM operation of the
//! [`vllm::VllmAdapter`] falls back to its "not available" behaviour.

pub mod model_config;
#[cfg(test)]
pub mod tests;
pub mod vllm;

pub use model_config::{HubModelConfigLoader, ModelConfigError, ModelConfigLoader, PretrainedConfig};
pub use vllm::{
    ArchitectureRegistry, DefaultEngineArgsFactory, EngineArgsFactory, SpeculativeArgs,
    VllmAdapter, VllmAvailability, VllmCliError, VllmEngineArgs,
};

#[cfg(feature = "vllm")]
pub use hfserver_vllm::{EngineArgs, EngineArgsError, ModelRegistry};
