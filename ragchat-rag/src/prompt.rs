//! Retrieval-augmented prompt assembly.
//!
//! Pure string building: no I/O, deterministic for identical inputs.

use crate::document::SearchResult;

/// The phrase the model must answer with when the context does not cover
/// the question. Also used as a stop sequence for generation.
pub const FALLBACK_PHRASE: &str =
    "I don't have enough information in the provided documents to answer that.";

/// Instruction template wrapped around the retrieved context and the question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    fallback: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { fallback: FALLBACK_PHRASE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template with a custom fallback phrase.
    pub fn with_fallback(fallback: impl Into<String>) -> Self {
        Self { fallback: fallback.into() }
    }

    /// The fallback phrase this template instructs the model to use.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Render the prompt for `query` over `retrieved`, kept in index order.
    ///
    /// With nothing retrieved the context-free variant is rendered, which
    /// still tells the model to reply with the fallback phrase.
    pub fn build(&self, query: &str, retrieved: &[SearchResult]) -> String {
        let context = retrieved
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if context.is_empty() {
            return format!(
                "You are a helpful assistant. No reference documents are available for this question.\n\
                 If you cannot answer it reliably, reply exactly: \"{fallback}\"\n\
                 \n\
                 Question: {query}\n\
                 \n\
                 Answer:",
                fallback = self.fallback,
            );
        }

        format!(
            "You are a helpful assistant. Answer the question using only the information in the context below.\n\
             If the context does not contain the answer, reply exactly: \"{fallback}\"\n\
             \n\
             Context:\n\
             {context}\n\
             \n\
             Question: {query}\n\
             \n\
             Answer:",
            fallback = self.fallback,
        )
    }
}
