use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{ports::LlmService, DocumentChunk, DomainError};

/// How far the model may stray from the retrieved documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPolicy {
    /// Documents only; unanswerable questions get the fixed insufficient-context reply.
    #[default]
    Strict,
    /// Documents first, gaps filled from general knowledge.
    Permissive,
}

pub struct AnswerGenerator {
    llm: Arc<dyn LlmService>,
    policy: PromptPolicy,
    template: String,
    insufficient_context: String,
}

impl AnswerGenerator {
    /// `template` must contain `{context}` and `{question}`; under the strict
    /// policy it may also reference `{insufficient}`.
    pub fn new(
        llm: Arc<dyn LlmService>,
        policy: PromptPolicy,
        template: impl Into<String>,
        insufficient_context: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            policy,
            template: template.into(),
            insufficient_context: insufficient_context.into(),
        }
    }

    pub fn policy(&self) -> PromptPolicy {
        self.policy
    }

    pub fn render(&self, question: &str, chunks: &[DocumentChunk]) -> String {
        render_template(
            &self.template,
            &[
                ("context", format_context(chunks).as_str()),
                ("question", question),
                ("insufficient", self.insufficient_context.as_str()),
            ],
        )
    }

    #[instrument(
        skip(self, chunks),
        fields(model = self.llm.model(), policy = ?self.policy, chunks = chunks.len())
    )]
    pub async fn generate(
        &self,
        question: &str,
        chunks: &[DocumentChunk],
    ) -> Result<String, DomainError> {
        if self.policy == PromptPolicy::Strict && chunks.is_empty() {
            debug!("no context retrieved, skipping model call");
            return Ok(self.insufficient_context.clone());
        }

        let answer = self.llm.complete(&self.render(question, chunks)).await?;
        let answer = answer.trim();

        if self.policy == PromptPolicy::Strict
            && is_only_sentinel(answer, &self.insufficient_context)
        {
            return Ok(self.insufficient_context.clone());
        }

        Ok(answer.to_string())
    }
}

/// True when `reply` is the sentinel alone, give or take markdown emphasis,
/// quotes and trailing punctuation. Replies with any other content are kept.
fn is_only_sentinel(reply: &str, sentinel: &str) -> bool {
    fn bare(text: &str) -> &str {
        text.trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '*' | '_' | '`' | '"' | '\'' | '.' | '!')
        })
    }
    bare(reply).eq_ignore_ascii_case(bare(sentinel))
}

pub fn format_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Document {}:\n{}", i + 1, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitutes `{name}` placeholders in one pass, so substituted text is never
/// itself scanned for placeholders. Unknown placeholders are left as they are.
pub(crate) fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
