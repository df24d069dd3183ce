use crate::error::GenerationError;
use crate::generation::Generator;
use crate::models::{AnswerMode, RagConfig, RetrievedChunk};
use std::sync::Arc;
use tracing::warn;

pub const UNABLE_TO_ANSWER: &str = "Unable to generate answer from the provided documents.";

const ELLIPSIS: &str = "...";

pub enum AnswerStrategy<'a> {
    Generative(&'a dyn Generator),
    Extractive,
}

impl AnswerStrategy<'_> {
    fn run(
        &self,
        prompt: &str,
        context: &str,
        limits: &AnswerLimits,
    ) -> Result<String, GenerationError> {
        match self {
            AnswerStrategy::Generative(generator) => {
                let generated = generator.generate(prompt, limits.max_output_tokens)?;
                let trimmed = generated.trim();
                if trimmed.is_empty() {
                    return Err(GenerationError::EmptyOutput);
                }
                Ok(trimmed.to_string())
            }
            AnswerStrategy::Extractive => Ok(extractive_answer(context, limits.fallback_char_limit)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AnswerLimits {
    context_char_limit: usize,
    max_output_tokens: usize,
    fallback_char_limit: usize,
}

pub struct Answerer {
    generator: Option<Arc<dyn Generator>>,
    limits: AnswerLimits,
}

impl Answerer {
    pub fn new(generator: Option<Arc<dyn Generator>>, config: &RagConfig) -> Self {
        Self {
            generator,
            limits: AnswerLimits {
                context_char_limit: config.context_char_limit,
                max_output_tokens: config.max_output_tokens,
                fallback_char_limit: config.fallback_char_limit,
            },
        }
    }

    pub fn mode(&self) -> AnswerMode {
        match self.generator {
            Some(_) => AnswerMode::Generative,
            None => AnswerMode::ExtractiveOnly,
        }
    }

    fn strategy(&self) -> AnswerStrategy<'_> {
        match &self.generator {
            Some(generator) => AnswerStrategy::Generative(generator.as_ref()),
            None => AnswerStrategy::Extractive,
        }
    }

    pub fn answer(&self, question: &str, retrieved: &[RetrievedChunk]) -> String {
        let context = build_context(retrieved);
        let prompt = build_prompt(question, &context, self.limits.context_char_limit);

        self.strategy()
            .run(&prompt, &context, &self.limits)
            .unwrap_or_else(|error| {
                warn!(%error, "generation failed, using extractive answer");
                extractive_answer(&context, self.limits.fallback_char_limit)
            })
    }
}

pub fn build_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .map(|hit| hit.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Only the first `context_char_limit` characters of the context reach the prompt.
pub fn build_prompt(question: &str, context: &str, context_char_limit: usize) -> String {
    let context: String = context.chars().take(context_char_limit).collect();
    format!(
        "Answer the question based on the context below.\n\nContext: {context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

pub fn extractive_answer(context: &str, char_limit: usize) -> String {
    match context
        .split("\n\n")
        .map(str::trim)
        .find(|paragraph| !paragraph.is_empty())
    {
        Some(paragraph) => {
            let mut answer: String = paragraph.chars().take(char_limit).collect();
            answer.push_str(ELLIPSIS);
            answer
        }
        None => UNABLE_TO_ANSWER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use std::sync::Mutex;

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn generate(&self, _prompt: &str, _max: usize) -> Result<String, GenerationError> {
            Err(GenerationError::BackendResponse {
                backend: "test".to_string(),
                details: "model crashed".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<(String, usize)>>,
        reply: String,
    }

    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }

        fn generate(&self, prompt: &str, max: usize) -> Result<String, GenerationError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push((prompt.to_string(), max));
            }
            Ok(self.reply.clone())
        }
    }

    fn hits(contents: &[&str]) -> Vec<RetrievedChunk> {
        contents
            .iter()
            .enumerate()
            .map(|(index, content)| RetrievedChunk {
                chunk: Chunk::new(*content, format!("doc.txt (Chunk {})", index + 1)),
                distance: index as f32,
            })
            .collect()
    }

    #[test]
    fn failing_generator_falls_back_to_first_paragraph() {
        let answerer = Answerer::new(Some(Arc::new(FailingGenerator)), &RagConfig::default());
        let answer = answerer.answer("anything", &hits(&["para1", "para2"]));
        assert_eq!(answer, "para1...");
    }

    #[test]
    fn missing_generator_uses_extractive_answer() {
        let answerer = Answerer::new(None, &RagConfig::default());
        assert_eq!(answerer.mode(), AnswerMode::ExtractiveOnly);
        assert_eq!(answerer.answer("q", &hits(&["first", "second"])), "first...");
    }

    #[test]
    fn generated_text_is_trimmed() {
        let generator = Arc::new(RecordingGenerator {
            reply: "  Every six months.\n".to_string(),
            ..Default::default()
        });
        let answerer = Answerer::new(Some(generator.clone()), &RagConfig::default());

        let answer = answerer.answer("How often?", &hits(&["Service every six months."]));
        assert_eq!(answer, "Every six months.");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, 200);
        assert!(prompts[0].0.contains("Context: Service every six months."));
        assert!(prompts[0].0.ends_with("Question: How often?\n\nAnswer:"));
    }

    #[test]
    fn blank_generation_falls_back() {
        let generator = Arc::new(RecordingGenerator {
            reply: "   ".to_string(),
            ..Default::default()
        });
        let answerer = Answerer::new(Some(generator), &RagConfig::default());
        assert_eq!(answerer.answer("q", &hits(&["only paragraph"])), "only paragraph...");
    }

    #[test]
    fn prompt_context_is_capped() {
        let long = "z".repeat(4_000);
        let prompt = build_prompt("q", &long, 1_500);
        assert_eq!(prompt.matches('z').count(), 1_500);
    }

    #[test]
    fn context_joins_chunks_with_blank_lines() {
        assert_eq!(build_context(&hits(&["a", "b", "c"])), "a\n\nb\n\nc");
    }

    #[test]
    fn extractive_answer_caps_paragraph_length() {
        let paragraph = "w".repeat(800);
        let answer = extractive_answer(&paragraph, 500);
        assert_eq!(answer.chars().count(), 503);
        assert!(answer.ends_with("..."));
    }

    #[test]
    fn extractive_answer_is_total() {
        assert_eq!(extractive_answer("", 500), UNABLE_TO_ANSWER);
        assert_eq!(extractive_answer("\n\n  \n\n", 500), UNABLE_TO_ANSWER);
        assert_eq!(extractive_answer("\n\nlate start", 500), "late start...");
    }

    #[test]
    fn empty_retrieval_still_answers() {
        let answerer = Answerer::new(Some(Arc::new(FailingGenerator)), &RagConfig::default());
        assert_eq!(answerer.answer("q", &[]), UNABLE_TO_ANSWER);
    }
}
