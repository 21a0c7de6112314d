//! Retrieval Orchestrator: wires the Version Hint Extractor (internal to the
//! Hybrid Searcher), Hybrid Searcher, Deduper, Reranker, and Prompt Assembler
//! together for a single user query, and derives the `SearchQualityLevel` tag
//! the Prompt Assembler's system annotation needs.
//!
//! Grounded in the "coordinator struct holding `Arc<dyn Trait>` collaborators"
//! idiom visible throughout the teacher's `state.rs`/`session.rs`; here it is
//! a pair of free functions over `&AppState` rather than its own struct, since
//! every collaborator it needs is already on `AppState`.

use ragchat_core::{Citation, Document, Error as CoreError, Turn};
use ragchat_rag::{dedupe, AssembledPrompt, SearchQualityLevel};

use crate::state::AppState;

const MAX_CITATION_SNIPPET_CHARS: usize = 240;

/// System prompt base text the Prompt Assembler appends its search-quality
/// annotation to. Grounded in the reranker's own instruction text
/// (`ragchat_rag::reranker::build_prompt`): the same priorities — domain
/// relevance, version relevance, source authority, stable over preview
/// content — apply to how the model should *use* the ranked context, not
/// just how it was ranked.
const SYSTEM_PROMPT: &str = "You are a documentation assistant for a programming-language \
documentation corpus. Answer using the provided [CTX N] context entries where they are \
relevant, citing them by marker. Prefer official and stable documentation over preview or \
third-party content. If the context does not answer the question, say so rather than \
guessing.";

/// Result of retrieval + dedup + rerank for one query: the reranked documents
/// (used as CONTEXT for prompt assembly), the citations derived from the top
/// of that ranking, and the search-quality tag.
pub struct RetrievalResult {
    pub documents: Vec<Document>,
    pub citations: Vec<Citation>,
    pub quality: SearchQualityLevel,
}

/// Runs Hybrid Search -> Dedup -> Rerank for `query` and derives citations +
/// search-quality tag from the result. Used both by the streaming chat
/// endpoint (as the context-gathering half of prompt assembly) and by the
/// standalone citations endpoint (retrieval + rerank, no generation).
pub async fn retrieve(state: &AppState, query: &str) -> Result<RetrievalResult, CoreError> {
    let search_span = tracing::info_span!("hybrid_search", query_len = query.len());
    let outcome = {
        let _enter = search_span.enter();
        state
            .searcher
            .search(query, state.config.retrieval.search_top_k)
            .await
    };
    let outcome = outcome.map_err(Into::<CoreError>::into)?;

    if !outcome.failed_collections.is_empty() {
        tracing::warn!(
            failed_collections = ?outcome.failed_collections,
            "hybrid search completed with partial collection failures"
        );
    }

    let deduped = dedupe(outcome.documents);

    let rerank_span = tracing::info_span!("rerank", candidates = deduped.len());
    let reranked = {
        let _enter = rerank_span.enter();
        state
            .reranker
            .rerank(query, deduped, state.config.retrieval.search_return_k)
            .await
    };
    let reranked = reranked.map_err(Into::<CoreError>::into)?;

    let quality = SearchQualityLevel::compute(&reranked, false);
    let citations = build_citations(&reranked, state.config.retrieval.search_citations);

    Ok(RetrievalResult {
        documents: reranked,
        citations,
        quality,
    })
}

/// Builds the Structured Prompt for one chat turn: retrieves context for
/// `query`, then assembles SYSTEM + CONTEXT + `history` + QUERY, truncating
/// to the configured token budget. `history` is the session's prior turns,
/// oldest to newest, fetched by the caller *before* the current turn is
/// appended.
pub async fn assemble_chat_prompt(
    state: &AppState,
    history: &[Turn],
    query: &str,
) -> Result<(AssembledPrompt, Vec<Citation>), CoreError> {
    let retrieval = retrieve(state, query).await?;
    let prompt = state.prompt_assembler.assemble(
        SYSTEM_PROMPT,
        query,
        history,
        &retrieval.documents,
        retrieval.quality,
    );
    Ok((prompt, retrieval.citations))
}

fn build_citations(documents: &[Document], top_n: usize) -> Vec<Citation> {
    documents
        .iter()
        .take(top_n)
        .filter_map(|doc| {
            let url = doc.url()?.to_string();
            let title = doc
                .metadata
                .title
                .clone()
                .unwrap_or_else(|| url.clone());
            let snippet: String = doc.text.chars().take(MAX_CITATION_SNIPPET_CHARS).collect();
            Some(Citation {
                url,
                title,
                snippet,
                anchor: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::DocumentMetadata;

    fn doc(id: &str, url: Option<&str>, title: Option<&str>, text: &str) -> Document {
        Document::new(id, text, 1.0, "c1").with_metadata(DocumentMetadata {
            url: url.map(str::to_string),
            title: title.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn citations_skip_documents_without_a_url() {
        let docs = vec![
            doc("a", Some("https://x/a"), Some("A"), "body a"),
            doc("b", None, Some("B"), "body b"),
        ];
        let citations = build_citations(&docs, 5);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url, "https://x/a");
    }

    #[test]
    fn citations_respect_top_n() {
        let docs = vec![
            doc("a", Some("u1"), Some("A"), "a"),
            doc("b", Some("u2"), Some("B"), "b"),
            doc("c", Some("u3"), Some("C"), "c"),
        ];
        let citations = build_citations(&docs, 2);
        assert_eq!(citations.len(), 2);
    }

    #[test]
    fn citation_title_falls_back_to_url() {
        let docs = vec![doc("a", Some("https://x/a"), None, "body")];
        let citations = build_citations(&docs, 5);
        assert_eq!(citations[0].title, "https://x/a");
    }
}
