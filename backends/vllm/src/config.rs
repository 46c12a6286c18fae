use std::path::PathBuf;

use clap::{parser::ValueSource, ArgMatches, Args, Command, FromArgMatches};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const GB: usize = 1 << 30;

/// Argument id of `--model`
pub const MODEL: &str = "model";
/// Default model, used when `--model` is not given
pub const DEFAULT_MODEL: &str = "facebook/opt-125m";
/// Default KV cache block size, in tokens
pub const DEFAULT_BLOCK_SIZE: usize = 16;
/// Default fraction of GPU memory reserved for the engine
pub const DEFAULT_GPU_MEMORY_UTILIZATION: f32 = 0.9;
/// Default CPU swap space per GPU, in GiB
pub const DEFAULT_SWAP_SPACE: usize = 4;
/// Default maximum number of sequences per iteration
pub const DEFAULT_MAX_NUM_SEQS: usize = 256;

/// Arguments for the vLLM engine.
///
/// Args:
///   model: Name or path of the huggingface model to use.
///   tokenizer: Name or path of the huggingface tokenizer, defaults to `model`.
///   revision: The model revision (branch name, tag or commit id).
///   tokenizer_revision: The tokenizer revision.
///   trust_remote_code: Trust remote code shipped with the model.
///   download_dir: Directory to download and load the weights.
///   dtype: Data type for model weights and activations.
///   max_model_len: Model context length. If None, will be derived from the model.
///   block_size: Size of a cache block in number of tokens.
///   gpu_memory_utilization: Fraction of GPU memory to use for the
///       vLLM execution.
///   swap_space: Size of the CPU swap space per GPU (in GiB).
///   num_gpu_blocks_override: Number of GPU blocks to use. This overrides the
///       profiled num_gpu_blocks if specified.
///   max_num_batched_tokens: Maximum number of tokens to be processed in
///      a single iteration.
///   max_num_seqs: Maximum number of sequences to be processed in a single
///      iteration.
///   enable_chunked_prefill: If true, prefill requests can be chunked based
///      on the remaining max_num_batched_tokens.
///   disable_sliding_window: Disables the sliding window of the model, if any.
///   tensor_parallel_size: Number of tensor parallel replicas.
///   seed: Random seed for operations.
#[derive(Args, Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EngineArgs {
    /// Name or path of the huggingface model to use
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
    /// Name or path of the huggingface tokenizer to use
    #[arg(long)]
    pub tokenizer: Option<String>,
    /// The specific model version to use (branch name, tag name or commit id)
    #[arg(long)]
    pub revision: Option<String>,
    /// The specific tokenizer version to use
    #[arg(long)]
    pub tokenizer_revision: Option<String>,
    /// Trust remote code from huggingface
    #[arg(long)]
    pub trust_remote_code: bool,
    /// Directory to download and load the weights
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
    /// Data type for model weights and activations
    #[arg(long, default_value = "auto")]
    pub dtype: String,
    /// Model context length
    #[arg(long)]
    pub max_model_len: Option<usize>,
    /// Token block size for contiguous chunks of tokens
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
    /// The fraction of GPU memory to be used for the model executor
    #[arg(long, default_value_t = DEFAULT_GPU_MEMORY_UTILIZATION)]
    pub gpu_memory_utilization: f32,
    /// CPU swap space size (GiB) per GPU
    #[arg(long, default_value_t = DEFAULT_SWAP_SPACE)]
    pub swap_space: usize,
    /// If specified, ignore GPU profiling result and use this number of GPU blocks
    #[arg(long)]
    pub num_gpu_blocks_override: Option<usize>,
    /// Maximum number of batched tokens per iteration
    #[arg(long)]
    pub max_num_batched_tokens: Option<usize>,
    /// Maximum number of sequences per iteration
    #[arg(long, default_value_t = DEFAULT_MAX_NUM_SEQS)]
    pub max_num_seqs: usize,
    /// Chunk prefill requests based on `max_num_batched_tokens`
    #[arg(long)]
    pub enable_chunked_prefill: bool,
    /// Disables sliding window, capping to sliding window size
    #[arg(long)]
    pub disable_sliding_window: bool,
    /// Number of tensor parallel replicas
    #[arg(long, default_value_t = 1)]
    pub tensor_parallel_size: usize,
    /// Random seed for operations
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            tokenizer: None,
            revision: None,
            tokenizer_revision: None,
            trust_remote_code: false,
            download_dir: None,
            dtype: "auto".to_string(),
            max_model_len: None,
            block_size: DEFAULT_BLOCK_SIZE,
            gpu_memory_utilization: DEFAULT_GPU_MEMORY_UTILIZATION,
            swap_space: DEFAULT_SWAP_SPACE,
            num_gpu_blocks_override: None,
            max_num_batched_tokens: None,
            max_num_seqs: DEFAULT_MAX_NUM_SEQS,
            enable_chunked_prefill: false,
            disable_sliding_window: false,
            tensor_parallel_size: 1,
            seed: 0,
        }
    }
}

impl EngineArgs {
    /// Registers every engine flag on `command`
    pub fn add_cli_args(command: Command) -> Command {
        <Self as Args>::augment_args(command)
    }

    /// Builds the engine arguments from parsed command line arguments.
    ///
    /// The matches must come from a command extended through
    /// [`EngineArgs::add_cli_args`]. The resulting arguments are verified
    /// before being returned.
    ///
    /// # Errors
    ///
    /// Returns an `EngineArgsError` if the matches can't be read back into
    /// `EngineArgs`, or if the values are inconsistent (see `verify_args`).
    #[instrument(skip_all)]
    pub fn from_cli_args(matches: &ArgMatches) -> Result<Self, EngineArgsError> {
        let this = <Self as FromArgMatches>::from_arg_matches(matches)?;
        this.verify_args()?;
        debug!(model = %this.model, dtype = %this.dtype, "Built engine arguments");
        Ok(this)
    }

    /// Verify `EngineArgs` arguments
    pub fn verify_args(&self) -> Result<(), EngineArgsError> {
        if self.gpu_memory_utilization <= 0.0 || self.gpu_memory_utilization > 1.0 {
            return Err(EngineArgsError::InvalidGpuMemoryUtilization(
                self.gpu_memory_utilization,
            ));
        }

        if self.block_size == 0 {
            return Err(EngineArgsError::InvalidCacheConfig(
                "`block_size` must be greater than zero".to_string(),
            ));
        }

        if self.swap_space_bytes().is_none() {
            return Err(EngineArgsError::InvalidCacheConfig(format!(
                "`swap_space` ({} GiB) is too large",
                self.swap_space
            )));
        }

        if self.tensor_parallel_size == 0 {
            return Err(EngineArgsError::InvalidParallelConfig(
                "`tensor_parallel_size` must be greater than zero".to_string(),
            ));
        }

        if let Some(max_num_batched_tokens) = self.max_num_batched_tokens {
            if let Some(max_model_len) = self.max_model_len {
                if max_num_batched_tokens < max_model_len && !self.enable_chunked_prefill {
                    return Err(EngineArgsError::InvalidSchedulerConfig(format!(
                        "`max_num_batched_tokens` ({}) is smaller than `max_model_len` ({}). This effectively limits the maximum sequence length to `max_num_batched_tokens` and makes the scheduler reject longer sequences. Please increase `max_num_batched_tokens` or decrease `max_model_len`.",
                        max_num_batched_tokens, max_model_len
                    )));
                }
            }

            if max_num_batched_tokens < self.max_num_seqs {
                return Err(EngineArgsError::InvalidSchedulerConfig(format!(
                    "`max_num_batched_tokens` ({}) must be greater than or equal to `max_num_seqs` ({}).",
                    max_num_batched_tokens, self.max_num_seqs
                )));
            }
        }

        Ok(())
    }

    /// Getter for the swap space, in bytes. `None` if it doesn't fit in a `usize`
    pub fn swap_space_bytes(&self) -> Option<usize> {
        self.swap_space.checked_mul(GB)
    }

    /// Sets the model to `model`, unless `--model` was given on the command line
    pub fn set_default_model(&mut self, matches: &ArgMatches, model: impl Into<String>) {
        if matches.value_source(MODEL) != Some(ValueSource::CommandLine) {
            self.model = model.into();
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineArgsError {
    #[error("Clap error: `{0}`")]
    ClapError(#[from] clap::Error),
    #[error("Invalid GPU memory utilization: `{0}`")]
    InvalidGpuMemoryUtilization(f32),
    #[error("Invalid cache config: `{0}`")]
    InvalidCacheConfig(String),
    #[error("Invalid parallel config: `{0}`")]
    InvalidParallelConfig(String),
    #[error("Invalid scheduler config: `{0}`")]
    InvalidSchedulerConfig(String),
}
