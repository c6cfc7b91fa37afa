//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Pluggable answer generation over retrieved chunks."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::index::Chunk;

/// Answer produced for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Generates an answer from a question and its retrieved context.
///
/// No backend ships with the service; deployments inject one via
/// [`crate::ApiState::with_answer_backend`].
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn answer(&self, question: &str, context: &[Chunk]) -> Result<Answer>;
}

/// Backend that answers with the best matching chunk verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveAnswerBackend;

#[async_trait]
impl AnswerBackend for ExtractiveAnswerBackend {
    async fn answer(&self, _question: &str, context: &[Chunk]) -> Result<Answer> {
        let answer = context
            .first()
            .map(|chunk| chunk.text.clone())
            .unwrap_or_default();
        Ok(Answer {
            answer,
            model: Some("extractive".into()),
        })
    }
}
