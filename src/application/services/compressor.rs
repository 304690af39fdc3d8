use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{ports::LlmService, DocumentChunk, DomainError};

use super::generator::render_template;

/// Asks the model to keep only the query-relevant parts of each chunk.
///
/// Chunks the model answers with the no-output marker (or nothing) are dropped.
/// One request per chunk, in order.
#[derive(Clone)]
pub struct LlmCompressor {
    llm: Arc<dyn LlmService>,
    template: String,
    no_output: String,
}

impl LlmCompressor {
    pub fn new(
        llm: Arc<dyn LlmService>,
        template: impl Into<String>,
        no_output: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            template: template.into(),
            no_output: no_output.into(),
        }
    }

    fn render(&self, question: &str, context: &str) -> String {
        render_template(
            &self.template,
            &[
                ("question", question),
                ("context", context),
                ("no_output", self.no_output.as_str()),
            ],
        )
    }

    #[instrument(skip(self, chunks), fields(model = self.llm.model(), chunks = chunks.len()))]
    pub async fn compress(
        &self,
        question: &str,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Vec<DocumentChunk>, DomainError> {
        let mut kept = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let extracted = self.llm.complete(&self.render(question, &chunk.content)).await?;
            let extracted = extracted.trim();

            if extracted.is_empty() || extracted == self.no_output {
                debug!(chunk_id = %chunk.id, "dropped irrelevant chunk");
                continue;
            }

            kept.push(DocumentChunk {
                content: extracted.to_string(),
                ..chunk
            });
        }

        Ok(kept)
    }
}
