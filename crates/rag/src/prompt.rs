//! Prompt Assembler: composes the system prompt, conversation history, and
//! reranked context into a Structured Prompt, truncating by priority to a
//! model-specific token budget.
//!
//! Segment order follows the data model: SYSTEM, CONTEXT, HISTORY, QUERY.
//! Truncation is greedy and priority-ordered (CRITICAL > HIGH > MEDIUM > LOW),
//! but survivors keep their original relative order within their own kind.

use ragchat_core::tokens::estimate_tokens;
use ragchat_core::{Document, PromptSegment, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchQualityLevel {
    None,
    KeywordSearch,
    HighQuality,
    MixedQuality { high_quality_count: usize },
}

impl SearchQualityLevel {
    /// Minimum body length (characters) a document needs to count as
    /// high-quality for the annotation.
    const HIGH_QUALITY_MIN_CHARS: usize = 100;

    /// Derives the annotation from the retrieval result. `keyword_fallback`
    /// is set by the orchestrator when the retained documents came from a
    /// keyword-only search path rather than the full hybrid fan-out.
    pub fn compute(documents: &[Document], keyword_fallback: bool) -> Self {
        if documents.is_empty() {
            return SearchQualityLevel::None;
        }
        if keyword_fallback {
            return SearchQualityLevel::KeywordSearch;
        }
        let high_quality_count = documents
            .iter()
            .filter(|d| d.text.chars().count() >= Self::HIGH_QUALITY_MIN_CHARS)
            .count();
        if high_quality_count == documents.len() {
            SearchQualityLevel::HighQuality
        } else {
            SearchQualityLevel::MixedQuality { high_quality_count }
        }
    }

    fn annotation_line(&self) -> String {
        match self {
            SearchQualityLevel::None => "[Retrieval quality: NONE]".to_string(),
            SearchQualityLevel::KeywordSearch => "[Retrieval quality: KEYWORD_SEARCH]".to_string(),
            SearchQualityLevel::HighQuality => "[Retrieval quality: HIGH_QUALITY]".to_string(),
            SearchQualityLevel::MixedQuality { high_quality_count } => format!(
                "[Retrieval quality: MIXED_QUALITY ({high_quality_count} high-quality entries)]"
            ),
        }
    }

    fn calibration_clause(&self) -> Option<&'static str> {
        match self {
            SearchQualityLevel::KeywordSearch | SearchQualityLevel::MixedQuality { .. } => Some(
                "Some retrieved context may be weakly related to the query; \
                 hedge confidence accordingly and prefer saying you are unsure \
                 over asserting unsupported specifics.",
            ),
            SearchQualityLevel::None | SearchQualityLevel::HighQuality => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptAssemblerConfig {
    /// Non-negotiable per-model input-token budget.
    pub token_budget: usize,
}

impl PromptAssemblerConfig {
    /// Budget for constrained model families (e.g. smaller context windows).
    pub const CONSTRAINED_BUDGET: usize = 7_000;
    /// Budget for the default/large-context model family.
    pub const DEFAULT_BUDGET: usize = 100_000;
}

impl Default for PromptAssemblerConfig {
    fn default() -> Self {
        Self {
            token_budget: Self::DEFAULT_BUDGET,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub segments: Vec<PromptSegment>,
    /// Set when SYSTEM + QUERY alone already exceeded the budget: the prompt
    /// contains exactly those two segments, possibly still over budget.
    pub minimal: bool,
}

impl AssembledPrompt {
    /// Concatenated segment text, in order, newline-joined — what actually
    /// gets sent to the LLM.
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(PromptSegment::rendered_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct PromptAssembler {
    config: PromptAssemblerConfig,
}

impl PromptAssembler {
    pub fn new(config: PromptAssemblerConfig) -> Self {
        Self { config }
    }

    /// Assembles and truncates a Structured Prompt.
    ///
    /// `history` is oldest-to-newest (as returned by `SessionStore::history`).
    /// `context` is reranker order (best match first).
    pub fn assemble(
        &self,
        system_base: &str,
        query: &str,
        history: &[Turn],
        context: &[Document],
        quality: SearchQualityLevel,
    ) -> AssembledPrompt {
        let mut system_text = format!("{system_base}\n\n{}", quality.annotation_line());
        if let Some(clause) = quality.calibration_clause() {
            system_text.push('\n');
            system_text.push_str(clause);
        }

        let system_segment = PromptSegment::System {
            text: system_text.clone(),
        };
        let query_segment = PromptSegment::Query {
            text: query.to_string(),
        };

        let t_system = estimate_tokens(&system_text);
        let t_query = estimate_tokens(query);

        if t_system + t_query > self.config.token_budget {
            return AssembledPrompt {
                segments: vec![system_segment, query_segment],
                minimal: true,
            };
        }

        let mut remaining = self.config.token_budget - t_system - t_query;

        // History: greedily admit newest to oldest, then restore chronological
        // order among survivors.
        let mut selected_history: Vec<&Turn> = Vec::new();
        for turn in history.iter().rev() {
            let cost = estimate_tokens(&turn.text);
            if cost > remaining {
                continue;
            }
            remaining -= cost;
            selected_history.push(turn);
        }
        selected_history.reverse();
        let history_segments: Vec<PromptSegment> = selected_history
            .into_iter()
            .map(|turn| PromptSegment::History {
                role: turn.role,
                text: turn.text.clone(),
            })
            .collect();

        // Context: greedily admit in reranker order, preserving it among
        // survivors, then re-index markers to a contiguous 1..k.
        let mut context_segments: Vec<PromptSegment> = Vec::new();
        for doc in context {
            let text = doc.text.clone();
            let cost = estimate_tokens(&text);
            if cost > remaining {
                continue;
            }
            remaining -= cost;
            context_segments.push(PromptSegment::Context {
                marker: 0,
                url: doc.url().unwrap_or_default().to_string(),
                text,
            });
        }
        for (i, segment) in context_segments.iter_mut().enumerate() {
            if let PromptSegment::Context { marker, .. } = segment {
                *marker = (i + 1) as u32;
            }
        }

        let mut segments = Vec::with_capacity(2 + history_segments.len() + context_segments.len());
        segments.push(system_segment);
        segments.extend(context_segments);
        segments.extend(history_segments);
        segments.push(query_segment);

        AssembledPrompt {
            segments,
            minimal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::TurnRole;

    fn turn(role: TurnRole, tokens: usize) -> Turn {
        // estimate_tokens(text) = ceil(len/4)+1; pick len = (tokens-1)*4 to land exactly.
        let len = (tokens.saturating_sub(1)) * 4;
        Turn {
            role,
            text: "a".repeat(len),
        }
    }

    fn doc_with_tokens(id: &str, tokens: usize) -> Document {
        let len = (tokens.saturating_sub(1)) * 4;
        Document::new(id, "a".repeat(len), 1.0, "c1")
    }

    #[test]
    fn s4_truncation_example() {
        // Budget 100. SYSTEM ~30 tokens (before annotation is appended, so we
        // craft the base so the annotated system lands near 30).
        let assembler = PromptAssembler::new(PromptAssemblerConfig { token_budget: 100 });

        // Build SYSTEM text sized so estimate_tokens(annotated) == 30.
        let quality = SearchQualityLevel::None; // annotation adds little text
        let system_base = "x".repeat(4 * 20); // ~21 tokens base; annotation adds the rest
        let query = "y".repeat(4 * 9); // 10 tokens

        let history = vec![
            turn(TurnRole::User, 20),
            turn(TurnRole::Assistant, 20),
            turn(TurnRole::User, 20),
        ];
        let context = vec![doc_with_tokens("c1", 30), doc_with_tokens("c2", 30)];

        let result = assembler.assemble(&system_base, &query, &history, &context, quality);

        // No CONTEXT should survive: after SYSTEM+QUERY+2 history turns there
        // isn't room for either 30-token context entry.
        assert!(!result
            .segments
            .iter()
            .any(|s| matches!(s, PromptSegment::Context { .. })));

        let history_segments: Vec<&PromptSegment> = result
            .segments
            .iter()
            .filter(|s| matches!(s, PromptSegment::History { .. }))
            .collect();
        assert_eq!(history_segments.len(), 2);
    }

    #[test]
    fn minimal_prompt_when_system_and_query_exceed_budget() {
        let assembler = PromptAssembler::new(PromptAssemblerConfig { token_budget: 10 });
        let result = assembler.assemble(
            &"x".repeat(200),
            &"y".repeat(200),
            &[],
            &[],
            SearchQualityLevel::None,
        );
        assert!(result.minimal);
        assert_eq!(result.segments.len(), 2);
        assert!(matches!(result.segments[0], PromptSegment::System { .. }));
        assert!(matches!(result.segments[1], PromptSegment::Query { .. }));
    }

    #[test]
    fn context_markers_are_contiguous_after_truncation() {
        let assembler = PromptAssembler::new(PromptAssemblerConfig { token_budget: 10_000 });
        let context = vec![
            doc_with_tokens("a", 5),
            doc_with_tokens("b", 5),
            doc_with_tokens("c", 5),
        ];
        let result = assembler.assemble("sys", "query", &[], &context, SearchQualityLevel::HighQuality);
        let markers: Vec<u32> = result
            .segments
            .iter()
            .filter_map(|s| match s {
                PromptSegment::Context { marker, .. } => Some(*marker),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec![1, 2, 3]);
    }

    #[test]
    fn segment_order_is_system_context_history_query() {
        let assembler = PromptAssembler::new(PromptAssemblerConfig::default());
        let history = vec![turn(TurnRole::User, 5)];
        let context = vec![doc_with_tokens("a", 5)];
        let result = assembler.assemble("sys", "q", &history, &context, SearchQualityLevel::HighQuality);
        let kinds: Vec<&str> = result
            .segments
            .iter()
            .map(|s| match s {
                PromptSegment::System { .. } => "system",
                PromptSegment::Context { .. } => "context",
                PromptSegment::History { .. } => "history",
                PromptSegment::Query { .. } => "query",
            })
            .collect();
        assert_eq!(kinds, vec!["system", "context", "history", "query"]);
    }

    #[test]
    fn search_quality_none_for_empty_documents() {
        assert_eq!(SearchQualityLevel::compute(&[], false), SearchQualityLevel::None);
    }

    #[test]
    fn search_quality_high_when_all_documents_long_enough() {
        let docs = vec![doc_with_tokens("a", 50), doc_with_tokens("b", 60)];
        assert_eq!(
            SearchQualityLevel::compute(&docs, false),
            SearchQualityLevel::HighQuality
        );
    }

    #[test]
    fn search_quality_mixed_when_some_documents_short() {
        let short = Document::new("s", "hi", 1.0, "c1");
        let long = doc_with_tokens("l", 60);
        let quality = SearchQualityLevel::compute(&[short, long], false);
        assert_eq!(quality, SearchQualityLevel::MixedQuality { high_quality_count: 1 });
    }

    #[test]
    fn search_quality_keyword_fallback_overrides() {
        let docs = vec![doc_with_tokens("a", 60)];
        assert_eq!(
            SearchQualityLevel::compute(&docs, true),
            SearchQualityLevel::KeywordSearch
        );
    }
}
