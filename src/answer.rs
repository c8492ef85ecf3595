//! Retrieval-augmented answering.
//!
//! Embeds the query, pulls the nearest chunks from the namespace, keeps only
//! the ones above the similarity threshold, and forwards a grounded prompt to
//! the completion collaborator. An empty retained set is not a failure — the
//! answer is generated from an empty context and carries no citations.

use serde::Serialize;

use crate::completion::{ChatMessage, Completer};
use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::models::SourceDoc;
use crate::result::{ActionError, ActionResult};
use crate::vector::VectorIndex;

/// Generated answer plus the retained source documents for citation display.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub source_docs: Vec<SourceDoc>,
}

/// Strip non-ASCII characters; namespace ids sent to the index must be ASCII.
pub fn to_ascii(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii()).collect()
}

fn system_prompt(context: &str) -> String {
    format!(
        "You are a helpful AI assistant. Answer questions based on the provided context.\n\
         If you don't know the answer or can't find it in the context, say so.\n\
         Keep your answers concise and relevant to the question.\n\n\
         Context:\n{}",
        context
    )
}

/// Answer `query` against the documents indexed in `namespace`, with optional
/// prior-turn history (most recent last).
pub async fn answer(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    completer: &dyn Completer,
    retrieval: &RetrievalConfig,
    namespace: &str,
    query: &str,
    history: &[ChatMessage],
) -> ActionResult<RagAnswer> {
    if query.trim().is_empty() {
        return Err(ActionError::validation("Query is required"));
    }

    // 1. Embed the query
    let query_embedding = embedder
        .embed_query(query)
        .await
        .map_err(|e| ActionError::collaborator(format!("query embedding failed: {}", e)))?;

    // 2. Similarity search scoped to the namespace
    let namespace = to_ascii(namespace);
    let matches = index
        .query(&namespace, &query_embedding, retrieval.top_k)
        .await
        .map_err(|e| ActionError::collaborator(format!("vector query failed: {}", e)))?;

    // 3. Keep only high-similarity matches; matches arrive ranked, so the
    //    context stays in descending-similarity order
    let source_docs: Vec<SourceDoc> = matches
        .into_iter()
        .filter(|m| m.score >= retrieval.similarity_threshold)
        .filter_map(|m| m.metadata)
        .map(|meta| SourceDoc {
            text: meta.text,
            filename: meta.filename,
            source: meta.source,
        })
        .collect();

    // 4. Grounding context
    let context = source_docs
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    // 5. Assemble the prompt
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(&context)));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(query));

    // 6. Generate
    let answer = completer
        .complete(&messages)
        .await
        .map_err(|e| ActionError::collaborator(format!("completion failed: {}", e)))?;

    Ok(RagAnswer {
        answer,
        source_docs,
    })
}
