use crate::embeddings::Embedder;
use crate::engine::QueryEngine;
use crate::error::ChatError;
use crate::models::{ChatMessage, SourceAttribution};
use crate::ollama::LanguageModel;
use crate::settings::Settings;
use crate::translate::Translator;
use chrono::Local;
use futures::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The result of one served chat turn: the fully drained response plus the
/// retrieval provenance behind it.
pub struct TurnOutcome {
    pub response: String,
    pub sources: Vec<SourceAttribution>,
}

pub struct TranscriptExport {
    pub file_name: String,
    pub json: String,
}

/// Per-session state: the transcript, the single active query engine, and
/// the settings that parameterized it. An explicit context object rather
/// than process globals, so multiple sessions and tests stay independent.
pub struct SessionContext<E: Embedder, L: LanguageModel> {
    session_id: Uuid,
    settings: Settings,
    transcript: Vec<ChatMessage>,
    engine: Option<QueryEngine<E, L>>,
    translator: Box<dyn Translator>,
    store_ready: bool,
}

impl<E: Embedder, L: LanguageModel> SessionContext<E, L> {
    pub fn new(settings: Settings, translator: Box<dyn Translator>) -> Self {
        let session_id = Uuid::new_v4();
        info!(%session_id, "chat session started");
        Self {
            session_id,
            settings,
            transcript: Vec::new(),
            engine: None,
            translator,
            store_ready: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Replaces the active engine. Last write wins; callers only reach this
    /// after the factory succeeded, so a failed rebuild never clobbers a
    /// working engine.
    pub fn install_engine(&mut self, engine: QueryEngine<E, L>) {
        self.engine = Some(engine);
    }

    /// Marks the persisted vector store usable for serving turns.
    pub fn mark_store_ready(&mut self) {
        self.store_ready = true;
    }

    pub fn store_ready(&self) -> bool {
        self.store_ready
    }

    /// Serves one chat turn: translate, guard, dispatch, append. The
    /// transcript is only touched after the response stream has fully
    /// drained; every earlier failure leaves it unchanged.
    pub async fn chat_turn(&mut self, input: &str) -> Result<TurnOutcome, ChatError> {
        let translated = if self.settings.translate_input {
            self.translator.translate(input).await.map_err(|err| {
                error!(%err, "input translation failed");
                err
            })?
        } else {
            input.to_string()
        };

        if self.engine.is_none() && !self.store_ready {
            warn!("chat attempted with no ready engine");
            return Err(ChatError::NotReady(
                "confirm settings and load documents before chatting".to_string(),
            ));
        }

        let Some(engine) = &self.engine else {
            return Err(ChatError::NotReady(
                "vector store is marked ready but no engine is loaded; rebuild the query engine"
                    .to_string(),
            ));
        };

        let outcome = engine.query(&translated).await.map_err(|err| {
            error!(%err, "query dispatch failed");
            err
        })?;

        let mut response = String::new();
        let mut stream = outcome.stream;
        while let Some(chunk) = stream.next().await {
            response.push_str(&chunk?);
        }

        self.transcript.push(ChatMessage::user(input));
        self.transcript.push(ChatMessage::assistant(response.clone()));
        info!(turns = self.transcript.len() / 2, "chat turn appended");

        Ok(TurnOutcome {
            response,
            sources: outcome.sources,
        })
    }

    /// Clears the transcript and drops the active engine and store flag.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.engine = None;
        self.store_ready = false;
        info!(session_id = %self.session_id, "session reset");
    }

    /// Serializes the transcript for download, named after the moment of
    /// export.
    pub fn export_transcript(&self) -> Result<TranscriptExport, ChatError> {
        let json = serde_json::to_string_pretty(&self.transcript)?;
        let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
        Ok(TranscriptExport {
            file_name: format!("local-rag-chat-{stamp}.json"),
            json,
        })
    }
}
