
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::Generator;
use crate::search::SearchResult;
use crate::text::truncate_with_ellipsis;
use crate::{RagError, Result};

// Answers and the prompt are in Polish, the language of the web frontend

/// What the model is told to answer when the excerpts do not cover the question.
/// Also returned directly when there is no context at all.
pub const REFUSAL_ANSWER: &str =
    "Przepraszam, ale nie mogę znaleźć odpowiedzi na to pytanie w mojej bazie wiedzy.";

/// Canned answer of the citation endpoint when nothing was retrieved
pub const NO_INFORMATION_ANSWER: &str =
    "Nie znalazłem żadnych informacji na ten temat w mojej bazie wiedzy.";

/// Prefix of the degraded answer returned when generation fails
pub const GENERATION_FAILED_PREFIX: &str = "Błąd podczas generowania odpowiedzi";

/// Characters of each context row included in the prompt
pub const EXCERPT_CHAR_BUDGET: usize = 500;

/// Prompt grounding the answer in `context`, numbered in the order given
#[inline]
pub fn build_prompt(query: &str, context: &[SearchResult]) -> String {
    let excerpts = context
        .iter()
        .enumerate()
        .map(|(index, result)| {
            format!(
                "[Źródło {} - {}.{}]:\n{}",
                index + 1,
                result.table,
                result.column,
                truncate_with_ellipsis(&result.text, EXCERPT_CHAR_BUDGET)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Jesteś pomocnym asystentem, który odpowiada na pytania użytkowników na podstawie \
         dostarczonych fragmentów treści z witryny internetowej. Twoja odpowiedź musi być \
         oparta wyłącznie na informacjach zawartych w tych fragmentach. Podaj zwięzłą i \
         precyzyjną odpowiedź. Jeśli odpowiedź nie znajduje się w dostarczonym kontekście, \
         odpowiedz: \"{REFUSAL_ANSWER}\"\n\n\
         KONTEKST:\n\n{excerpts}\n\n\
         PYTANIE UŻYTKOWNIKA:\n\n{query}\n\n\
         ODPOWIEDŹ:\n\n"
    )
}

pub struct Synthesizer {
    generator: Arc<dyn Generator>,
}

impl Synthesizer {
    #[inline]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Answer `query` from `context` with one generation call.
    ///
    /// A missing credential is an error. Any other generation failure becomes
    /// an explanatory answer so the caller still gets its context back.
    #[inline]
    pub async fn synthesize(&self, query: &str, context: &[SearchResult]) -> Result<String> {
        self.generator.ensure_credentials()?;

        if context.is_empty() {
            debug!("No context for query, returning refusal without generation");
            return Ok(REFUSAL_ANSWER.to_string());
        }

        let prompt = build_prompt(query, context);

        match self.generator.generate(&prompt).await {
            Ok(answer) => Ok(answer),
            Err(RagError::MissingCredential(message)) => Err(RagError::MissingCredential(message)),
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                Ok(format!("{}: {}", GENERATION_FAILED_PREFIX, e))
            }
        }
    }
}
