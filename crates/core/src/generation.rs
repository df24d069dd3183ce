use crate::error::GenerationError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    fn generate(&self, prompt: &str, max_output_tokens: usize) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    pub fn connect(base_url: &str, model: impl Into<String>) -> Result<Self, GenerationError> {
        let base = Url::parse(base_url)?;
        let endpoint = base.join("api/generate")?;
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;

        let tags = client
            .get(base.join("api/tags")?)
            .timeout(Duration::from_secs(10))
            .send()?;
        if !tags.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "ollama".to_string(),
                details: tags.status().to_string(),
            });
        }

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
        })
    }
}

impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, max_output_tokens: usize) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: 0.0,
                    num_predict: max_output_tokens,
                },
            })
            .send()?;

        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: GenerateResponse = response.json()?;
        Ok(payload.response)
    }
}

#[cfg(test)]
mod tests {
    use super::OllamaGenerator;

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(OllamaGenerator::connect("::::", "flan-t5").is_err());
    }
}
