//! Code generation and debugging prompts

use crate::error::Result;
use crate::services::llm::{GenerationRequest, LlmProvider, TextStream};
use crate::types::looks_like_code;
use std::sync::Arc;
use tracing::debug;

/// Wraps prompts for coding help before handing them to the LLM
pub struct CodeAssistService {
    llm: Arc<dyn LlmProvider>,
}

impl CodeAssistService {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Prompt for a generation request
    ///
    /// Coding requests get the expert-programmer framing; anything else is
    /// answered as a short general question.
    pub fn generation_request(prompt: &str) -> GenerationRequest {
        let enhanced = if looks_like_code(prompt) {
            format!(
                "You are an expert programmer. Generate clean, concise code for: {}. \
                 Keep response under 300 words.",
                prompt
            )
        } else {
            format!(
                "You are a helpful assistant. Provide a clear, concise answer for: {}. \
                 Keep response under 200 words.",
                prompt
            )
        };
        GenerationRequest::prompt(enhanced)
    }

    pub fn debug_request(code: &str, language: &str) -> GenerationRequest {
        GenerationRequest::prompt(format!(
            "You are an expert code debugger. Analyze the following {} code and provide:\n\n\
             1. Identify any bugs or issues\n\
             2. Suggest fixes with explanations\n\
             3. Recommend improvements\n\
             4. Provide the corrected code if needed\n\n\
             Code to debug:\n```{}\n{}\n```",
            language, language, code
        ))
    }

    pub async fn generate_code(&self, prompt: &str) -> Result<String> {
        debug!("Generating code");
        self.llm.generate(&Self::generation_request(prompt)).await
    }

    pub async fn stream_code(&self, prompt: &str) -> Result<TextStream> {
        self.llm.stream(&Self::generation_request(prompt)).await
    }

    pub async fn debug_code(&self, code: &str, language: &str) -> Result<String> {
        debug!("Debugging {} code", language);
        self.llm.generate(&Self::debug_request(code, language)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::MockLlmProvider;

    #[test]
    fn test_generation_prompt_framing() {
        let code = CodeAssistService::generation_request("write a function to reverse a list");
        assert!(code.turns[0].content.starts_with("You are an expert programmer."));

        let general = CodeAssistService::generation_request("best time to visit Kyoto");
        assert!(general.turns[0].content.starts_with("You are a helpful assistant."));
        assert!(general.turns[0].content.contains("under 200 words"));
    }

    #[test]
    fn test_debug_prompt() {
        let req = CodeAssistService::debug_request("def f(: pass", "python");
        let prompt = &req.turns[0].content;
        assert!(prompt.contains("Identify any bugs"));
        assert!(prompt.contains("```python\ndef f(: pass\n```"));
    }

    #[tokio::test]
    async fn test_generate_code_passes_through() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|req| req.turns[0].content.contains("reverse a list"))
            .times(1)
            .returning(|_| Ok("def rev(xs): return xs[::-1]".to_string()));

        let service = CodeAssistService::new(Arc::new(llm));
        let code = service
            .generate_code("write a function to reverse a list")
            .await
            .unwrap();
        assert!(code.contains("xs[::-1]"));
    }
}
