// Embedding and generation services
// Search and indexing only see the traits; the Gemini REST client implements both

pub mod gemini;

use async_trait::async_trait;

pub use gemini::GeminiClient;

/// How the embedding service should treat the input text.
///
/// Queries and documents are embedded differently by the service, so the same
/// text can produce different vectors in the two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// A user question to be matched against stored documents
    RetrievalQuery,
    /// Row text being indexed for later retrieval
    RetrievalDocument,
}

impl TaskType {
    #[inline]
    pub fn as_api_str(self) -> &'static str {
        match self {
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
        }
    }
}

impl std::fmt::Display for TaskType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_api_str())
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fails with `MissingCredential` when the service cannot be called at all
    fn ensure_credentials(&self) -> crate::Result<()>;

    async fn embed(&self, text: &str, task: TaskType) -> crate::Result<Vec<f32>>;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> crate::Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn ensure_credentials(&self) -> crate::Result<()>;

    async fn generate(&self, prompt: &str) -> crate::Result<String>;
}
