use crate::embeddings::Embedder;
use crate::error::{ChatError, ConfigError};
use crate::index::VectorIndex;
use crate::models::{ResponseMode, SourceAttribution};
use crate::ollama::{LanguageModel, TokenStream};
use crate::settings::{Settings, MAX_TOP_K};
use tracing::{error, info};

/// Character budget for one packed context window (compact_accumulate).
const CONTEXT_WINDOW_CHARS: usize = 3_000;

/// How much of each chunk survives simple summarization.
const SIMPLE_SUMMARY_CHARS: usize = 300;

const ACCUMULATE_SEPARATOR: &str = "\n---------------------\n";

/// A query engine bound to one index and one set of retrieval parameters.
/// Recreated whenever either changes; output is always a token stream.
pub struct QueryEngine<E: Embedder, L: LanguageModel> {
    index: VectorIndex,
    embedder: E,
    llm: L,
    top_k: usize,
    response_mode: ResponseMode,
}

pub struct QueryOutcome {
    pub stream: TokenStream,
    pub sources: Vec<SourceAttribution>,
}

/// Binds retrieval breadth and a response composition mode to the index.
/// Validation failures leave any previously active engine untouched — the
/// caller only replaces its engine on success.
pub fn create_query_engine<E: Embedder, L: LanguageModel>(
    index: VectorIndex,
    settings: &Settings,
    embedder: E,
    llm: L,
) -> Result<QueryEngine<E, L>, ConfigError> {
    if settings.top_k > MAX_TOP_K {
        error!(top_k = settings.top_k, "query engine creation rejected");
        return Err(ConfigError::TopK(settings.top_k));
    }

    info!(
        top_k = settings.top_k,
        mode = %settings.response_mode,
        "query engine created"
    );

    Ok(QueryEngine {
        index,
        embedder,
        llm,
        top_k: settings.top_k,
        response_mode: settings.response_mode,
    })
}

impl<E: Embedder, L: LanguageModel> QueryEngine<E, L> {
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    /// Retrieves context for the question and opens the generation stream.
    /// Provenance is returned alongside so the caller can attach it to the
    /// transcript once the stream is drained.
    pub async fn query(&self, question: &str) -> Result<QueryOutcome, ChatError> {
        let vectors = self
            .embedder
            .embed(&[question.to_string()])
            .await
            .map_err(|err| ChatError::Retrieval(err.to_string()))?;
        let query_vector = vectors
            .first()
            .ok_or_else(|| ChatError::Retrieval("embedder returned no vector".to_string()))?;

        let hits = self
            .index
            .search(query_vector, self.top_k)
            .map_err(|err| ChatError::Retrieval(err.to_string()))?;

        let sources: Vec<SourceAttribution> = hits
            .iter()
            .map(|hit| SourceAttribution::from_chunk(&hit.chunk, hit.score))
            .collect();
        let contexts: Vec<String> = hits.into_iter().map(|hit| hit.chunk.text).collect();

        let stream = self.dispatch(question, &contexts).await?;
        Ok(QueryOutcome { stream, sources })
    }

    async fn dispatch(&self, question: &str, contexts: &[String]) -> Result<TokenStream, ChatError> {
        if contexts.is_empty() {
            let prompt = answer_prompt(question, "No relevant context was retrieved.");
            return self.llm.generate_stream(&prompt).await;
        }

        match self.response_mode {
            ResponseMode::Compact => {
                let context = contexts.join("\n\n");
                self.llm
                    .generate_stream(&answer_prompt(question, &context))
                    .await
            }
            ResponseMode::SimpleSummarize => {
                let condensed: Vec<String> = contexts
                    .iter()
                    .map(|context| head_chars(context, SIMPLE_SUMMARY_CHARS))
                    .collect();
                self.llm
                    .generate_stream(&answer_prompt(question, &condensed.join("\n\n")))
                    .await
            }
            ResponseMode::Refine => {
                let mut answer = self
                    .llm
                    .generate(&answer_prompt(question, &contexts[0]))
                    .await?;

                if contexts.len() == 1 {
                    return Ok(buffered_stream(vec![answer]));
                }

                for context in &contexts[1..contexts.len() - 1] {
                    answer = self
                        .llm
                        .generate(&refine_prompt(question, &answer, context))
                        .await?;
                }

                let last = &contexts[contexts.len() - 1];
                self.llm
                    .generate_stream(&refine_prompt(question, &answer, last))
                    .await
            }
            ResponseMode::TreeSummarize => {
                let mut summaries = Vec::with_capacity(contexts.len());
                for context in contexts {
                    summaries.push(self.llm.generate(&summary_prompt(question, context)).await?);
                }
                self.llm
                    .generate_stream(&answer_prompt(question, &summaries.join("\n\n")))
                    .await
            }
            ResponseMode::Accumulate => self.accumulate(question, contexts).await,
            ResponseMode::CompactAccumulate => {
                let windows = pack_windows(contexts, CONTEXT_WINDOW_CHARS);
                self.accumulate(question, &windows).await
            }
        }
    }

    /// One buffered answer per context, emitted in order as the response
    /// stream with separators between answers.
    async fn accumulate(&self, question: &str, contexts: &[String]) -> Result<TokenStream, ChatError> {
        let mut pieces = Vec::new();
        for (position, context) in contexts.iter().enumerate() {
            if position > 0 {
                pieces.push(ACCUMULATE_SEPARATOR.to_string());
            }
            pieces.push(self.llm.generate(&answer_prompt(question, context)).await?);
        }
        Ok(buffered_stream(pieces))
    }
}

fn buffered_stream(pieces: Vec<String>) -> TokenStream {
    Box::pin(futures::stream::iter(pieces.into_iter().map(Ok)))
}

fn head_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Packs chunk texts into as few windows as possible without exceeding the
/// character budget; an oversized chunk becomes its own window.
fn pack_windows(contexts: &[String], budget: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();

    for context in contexts {
        if current.is_empty() {
            current.push_str(context);
        } else if current.chars().count() + context.chars().count() + 2 <= budget {
            current.push_str("\n\n");
            current.push_str(context);
        } else {
            windows.push(std::mem::take(&mut current));
            current.push_str(context);
        }
    }
    if !current.is_empty() {
        windows.push(current);
    }

    windows
}

fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer:"
    )
}

fn refine_prompt(question: &str, existing_answer: &str, context: &str) -> String {
    format!(
        "The original query is as follows: {question}\n\
         We have provided an existing answer: {existing_answer}\n\
         We have the opportunity to refine the existing answer with some more context below.\n\
         ------------\n\
         {context}\n\
         ------------\n\
         Given the new context, refine the original answer to better answer the query. \
         If the context isn't useful, return the original answer."
    )
}

fn summary_prompt(question: &str, context: &str) -> String {
    format!(
        "Summarize the following context so it can be used to answer the query: {question}\n\
         ------------\n\
         {context}\n\
         ------------\n\
         Summary:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::embeddings::HashingEmbedder;
    use crate::models::Document;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Echoes prompts back so tests can observe composition; counts calls
    /// so tests can observe dispatch shape.
    #[derive(Clone, Default)]
    struct EchoModel {
        buffered_calls: Arc<AtomicUsize>,
        stream_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn list_models(&self) -> Result<Vec<String>, ChatError> {
            Ok(vec!["echo".to_string()])
        }

        async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
            self.buffered_calls.fetch_add(1, Ordering::SeqCst);
            Ok(prompt.to_string())
        }

        async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ChatError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            let halfway = prompt.len() / 2;
            let split = prompt
                .char_indices()
                .map(|(index, _)| index)
                .find(|index| *index >= halfway)
                .unwrap_or(0);
            let head = prompt[..split].to_string();
            let tail = prompt[split..].to_string();
            Ok(Box::pin(futures::stream::iter(vec![Ok(head), Ok(tail)])))
        }
    }

    async fn drain(mut stream: TokenStream) -> String {
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap());
        }
        text
    }

    async fn sample_engine(mode: ResponseMode, top_k: usize, model: EchoModel) -> QueryEngine<HashingEmbedder, EchoModel> {
        let settings = Settings {
            top_k,
            response_mode: mode,
            ..Settings::default()
        };
        let mut builder = IndexBuilder::new(HashingEmbedder::default(), &settings);
        let index = builder
            .build(&[
                Document::new("The sky is blue.", "sky.txt"),
                Document::new("Grass is green.", "grass.txt"),
            ])
            .await
            .unwrap();
        create_query_engine(index, &settings, HashingEmbedder::default(), model).unwrap()
    }

    #[test]
    fn factory_rejects_top_k_above_bound() {
        let settings = Settings {
            top_k: 11,
            ..Settings::default()
        };
        let index = VectorIndex::new(Vec::new()).unwrap();
        let result = create_query_engine(
            index,
            &settings,
            HashingEmbedder::default(),
            EchoModel::default(),
        );
        assert!(matches!(result, Err(ConfigError::TopK(11))));
    }

    #[tokio::test]
    async fn compact_mode_answers_with_retrieved_context() {
        let model = EchoModel::default();
        let engine = sample_engine(ResponseMode::Compact, 1, model.clone()).await;

        let outcome = engine.query("What color is the sky?").await.unwrap();
        let response = drain(outcome.stream).await;

        assert!(response.contains("blue"));
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].file_name, "sky.txt");
        assert_eq!(model.stream_calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.buffered_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refine_mode_chains_buffered_calls_before_the_streamed_one() {
        let model = EchoModel::default();
        let engine = sample_engine(ResponseMode::Refine, 2, model.clone()).await;

        let outcome = engine.query("What color is the sky?").await.unwrap();
        drain(outcome.stream).await;

        // Two contexts: one buffered initial answer, one streamed refinement.
        assert_eq!(model.buffered_calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tree_summarize_summarizes_each_context_then_streams() {
        let model = EchoModel::default();
        let engine = sample_engine(ResponseMode::TreeSummarize, 2, model.clone()).await;

        let outcome = engine.query("What color is the sky?").await.unwrap();
        drain(outcome.stream).await;

        assert_eq!(model.buffered_calls.load(Ordering::SeqCst), 2);
        assert_eq!(model.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn accumulate_emits_one_answer_per_context() {
        let model = EchoModel::default();
        let engine = sample_engine(ResponseMode::Accumulate, 2, model.clone()).await;

        let outcome = engine.query("What color is the sky?").await.unwrap();
        let response = drain(outcome.stream).await;

        assert_eq!(model.buffered_calls.load(Ordering::SeqCst), 2);
        assert_eq!(model.stream_calls.load(Ordering::SeqCst), 0);
        assert!(response.contains(ACCUMULATE_SEPARATOR));
    }

    #[tokio::test]
    async fn top_k_zero_still_answers_without_context() {
        let model = EchoModel::default();
        let engine = sample_engine(ResponseMode::Compact, 0, model.clone()).await;

        let outcome = engine.query("What color is the sky?").await.unwrap();
        let response = drain(outcome.stream).await;

        assert!(outcome.sources.is_empty());
        assert!(response.contains("No relevant context was retrieved."));
    }

    #[test]
    fn windows_pack_under_budget_and_split_over_it() {
        let contexts = vec!["a".repeat(40), "b".repeat(40), "c".repeat(40)];
        let windows = pack_windows(&contexts, 90);

        assert_eq!(windows.len(), 2);
        assert!(windows[0].contains('a') && windows[0].contains('b'));
        assert!(windows[1].contains('c'));
    }
}
