/// Model architectures the engine knows how to execute, as declared in the
/// `architectures` field of a huggingface `config.json`.
const SUPPORTED_ARCHITECTURES: &[&str] = &[
    "BaichuanForCausalLM",
    "BloomForCausalLM",
    "FalconForCausalLM",
    "GemmaForCausalLM",
    "Gemma2ForCausalLM",
    "GPT2LMHeadModel",
    "GPTBigCodeForCausalLM",
    "GPTJForCausalLM",
    "GPTNeoXForCausalLM",
    "InternLM2ForCausalLM",
    "LlamaForCausalLM",
    "MistralForCausalLM",
    "MixtralForCausalLM",
    "MPTForCausalLM",
    "OPTForCausalLM",
    "PhiForCausalLM",
    "Phi3ForCausalLM",
    "Qwen2ForCausalLM",
    "Qwen2MoeForCausalLM",
    "StableLmForCausalLM",
    "Starcoder2ForCausalLM",
];

/// `ModelRegistry` - the engine's registry of supported model architectures
pub struct ModelRegistry;

impl ModelRegistry {
    /// Returns every supported architecture name
    pub fn get_supported_archs() -> Vec<&'static str> {
        SUPPORTED_ARCHITECTURES.to_vec()
    }

    /// Checks if `architecture` is supported by the engine
    pub fn is_supported_arch(architecture: &str) -> bool {
        SUPPORTED_ARCHITECTURES.contains(&architecture)
    }
}
