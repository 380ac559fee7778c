
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, Generator, TaskType};
use crate::RagError;
use crate::config::GeminiConfig;
use crate::config::settings::API_KEY_ENV;

const API_KEY_HEADER: &str = "x-goog-api-key";
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Blocking client for the Gemini REST API.
///
/// The async trait impls move each call onto the blocking pool, so a slow
/// request never stalls the runtime.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    embedding_model: String,
    chat_model: String,
    dimension: usize,
    batch_size: u32,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
    initial_backoff: Duration,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "inputTokenLimit")]
    pub input_token_limit: Option<u64>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let base_url = config
            .api_url()
            .context("Failed to parse Gemini base URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size,
            api_key: config.api_key.clone(),
            agent,
            retry_attempts: config.retry_attempts.max(1),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> crate::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RagError::MissingCredential(format!("{} is not set", API_KEY_ENV))
        })
    }

    /// `{base}/v1beta/models/{model}[:{method}]`, keeping any path prefix of the base URL
    fn model_url(&self, model: &str, method: Option<&str>) -> Result<Url> {
        let mut url = format!(
            "{}/v1beta/models/{}",
            self.base_url.as_str().trim_end_matches('/'),
            model
        );
        if let Some(method) = method {
            url.push(':');
            url.push_str(method);
        }
        Url::parse(&url).with_context(|| format!("Failed to build API URL {}", url))
    }

    /// Check that the embedding model exists and the key is accepted
    #[inline]
    pub fn health_check(&self) -> Result<ModelInfo> {
        let api_key = self.api_key().map_err(anyhow::Error::new)?;
        let url = self.model_url(&self.embedding_model, None)?;

        debug!("Checking Gemini model at {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .header(API_KEY_HEADER, api_key)
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to reach the Gemini API")?;

        let model: ModelInfo =
            serde_json::from_str(&response_text).context("Failed to parse model response")?;

        info!("Gemini model {} is available", model.name);
        Ok(model)
    }

    /// Embed a single text
    #[inline]
    pub fn embed_text(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        let api_key = self.api_key().map_err(anyhow::Error::new)?;
        debug!("Embedding text ({} chars) as {}", text.chars().count(), task);

        let request = EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: task.as_api_str(),
            output_dimensionality: self.dimension,
        };

        let url = self.model_url(&self.embedding_model, Some("embedContent"))?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .post_json(&url, api_key, &request_json)
            .context("Failed to generate embedding")?;

        let response: EmbedContentResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        self.check_dimension(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    /// Embed many texts, `batch_size` per request, preserving input order
    #[inline]
    pub fn embed_texts(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts as {}", texts.len(), task);

        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1) as usize) {
            let batch = self
                .embed_single_batch(chunk, task)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            embeddings.extend(batch);
        }

        Ok(embeddings)
    }

    fn embed_single_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if let [text] = texts {
            return Ok(vec![self.embed_text(text, task)?]);
        }

        let api_key = self.api_key().map_err(anyhow::Error::new)?;
        let model = format!("models/{}", self.embedding_model);

        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part { text }],
                    },
                    task_type: task.as_api_str(),
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        let url = self.model_url(&self.embedding_model, Some("batchEmbedContents"))?;
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let response_text = self
            .post_json(&url, api_key, &request_json)
            .context("Failed to generate batch embeddings")?;

        let response: BatchEmbedContentsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        response
            .embeddings
            .into_iter()
            .map(|embedding| {
                self.check_dimension(&embedding.values)?;
                Ok(embedding.values)
            })
            .collect()
    }

    /// Single-turn text generation with the chat model
    #[inline]
    pub fn generate_text(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key().map_err(anyhow::Error::new)?;
        debug!(
            "Generating answer with {} (prompt {} chars)",
            self.chat_model,
            prompt.chars().count()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };

        let url = self.model_url(&self.chat_model, Some("generateContent"))?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        let response_text = self
            .post_json(&url, api_key, &request_json)
            .context("Failed to generate content")?;

        let response: GenerateContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        extract_text(response)
    }

    fn check_dimension(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dimension {
            return Err(anyhow::anyhow!(
                "Embedding has {} dimensions, expected {}",
                values.len(),
                self.dimension
            ));
        }
        Ok(())
    }

    fn post_json(&self, url: &Url, api_key: &str, body: &str) -> Result<String> {
        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header(API_KEY_HEADER, api_key)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        // Rate limiting is transient for this API
                        ureq::Error::StatusCode(status) if *status == 429 || *status >= 500 => {
                            warn!(
                                "Service error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                        }
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self
                            .initial_backoff
                            .saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt - 1));
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(anyhow::anyhow!("Generation response contained no candidates"));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "Generation returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }

    Ok(text)
}

/// Run a blocking client call on the blocking pool and classify its failure
async fn run_blocking<T, F>(client: &GeminiClient, call: F) -> crate::Result<T>
where
    T: Send + 'static,
    F: FnOnce(GeminiClient) -> Result<T> + Send + 'static,
{
    let client = client.clone();
    tokio::task::spawn_blocking(move || call(client))
        .await
        .map_err(|e| RagError::Upstream(format!("Gemini request task failed: {}", e)))?
        .map_err(|e| RagError::upstream(&e))
}

#[async_trait]
impl Embedder for GeminiClient {
    fn ensure_credentials(&self) -> crate::Result<()> {
        self.api_key().map(|_| ())
    }

    async fn embed(&self, text: &str, task: TaskType) -> crate::Result<Vec<f32>> {
        Embedder::ensure_credentials(self)?;
        let text = text.to_string();
        run_blocking(self, move |client| client.embed_text(&text, task)).await
    }

    async fn embed_batch(&self, texts: &[String], task: TaskType) -> crate::Result<Vec<Vec<f32>>> {
        Embedder::ensure_credentials(self)?;
        let texts = texts.to_vec();
        run_blocking(self, move |client| client.embed_texts(&texts, task)).await
    }
}

#[async_trait]
impl Generator for GeminiClient {
    fn ensure_credentials(&self) -> crate::Result<()> {
        self.api_key().map(|_| ())
    }

    async fn generate(&self, prompt: &str) -> crate::Result<String> {
        Generator::ensure_credentials(self)?;
        let prompt = prompt.to_string();
        run_blocking(self, move |client| client.generate_text(&prompt)).await
    }
}
