use crate::error::Result;

/// Prompt text to answer text.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

/// Returns the prompt unchanged. Used for dry runs and by the offline
/// provider, where showing the grounded prompt is the useful output.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

impl Generator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Sampling settings shared by the hosted generators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 512,
        }
    }
}
