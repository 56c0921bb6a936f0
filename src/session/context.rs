//! Per-session context
//!
//! Owns the session store together with the collaborators needed to
//! (re)build its handles. Every user action maps to one method here; the
//! REPL calls `refresh` after each action to lazily rebuild whatever the
//! action invalidated.

use std::sync::Arc;

use tracing::{info, warn};

use super::lifecycle::{apply, LifecycleEvent};
use super::store::SessionStore;
use crate::agent::{
    self, AssemblyError, BundledPromptSource, ExecutorHandle, HttpPromptSource, MemoryHandle,
    ProgressObserver, PromptSource,
};
use crate::chat::{ChatLoop, TurnOutcome};
use crate::config::AppConfig;
use crate::db::{SqlToolkit, ToolkitError, ToolkitHandle};
use crate::error::Notice;
use crate::ollama::{ChatError, ModelHandle, ModelProvider, OllamaProvider};

/// One user's session: state slots plus the means to rebuild them
pub struct SessionContext {
    config: AppConfig,
    provider: Arc<dyn ModelProvider>,
    prompt_source: Arc<dyn PromptSource>,
    store: SessionStore,
    chat: ChatLoop,
    credential: Option<String>,
    language: String,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("model", &self.config.model)
            .field("database_uri", &self.config.database_uri)
            .field("language", &self.language)
            .field("has_credential", &self.credential.is_some())
            .field("store", &self.store)
            .finish()
    }
}

impl SessionContext {
    /// Create a session with explicit collaborators
    ///
    /// The initial credential and language come from `config`.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn ModelProvider>,
        prompt_source: Arc<dyn PromptSource>,
    ) -> Self {
        let credential = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        let language = config.language.clone();
        Self {
            config,
            provider,
            prompt_source,
            store: SessionStore::new(),
            chat: ChatLoop::new(),
            credential,
            language,
        }
    }

    /// Ollama provider, plus the prompt hub when one is configured
    pub fn with_defaults(config: AppConfig) -> Self {
        let provider: Arc<dyn ModelProvider> = Arc::new(OllamaProvider::new(&config.base_url));
        let prompt_source: Arc<dyn PromptSource> = match &config.prompt_hub_url {
            Some(url) => Arc::new(HttpPromptSource::new(url.as_str())),
            None => Arc::new(BundledPromptSource),
        };
        Self::new(config, provider, prompt_source)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    /// Current output-language preference
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Replace the credential and tear everything down
    ///
    /// Entering the current credential again changes nothing.
    pub fn set_credential(&mut self, credential: &str) -> Notice {
        let credential = credential.trim();
        let credential = (!credential.is_empty()).then(|| credential.to_string());
        if credential == self.credential {
            return Notice::info("API key is unchanged.");
        }
        self.credential = credential;
        apply(&mut self.store, LifecycleEvent::CredentialChanged)
    }

    /// Switch the output language; only the executor is rebuilt
    pub fn set_language(&mut self, language: &str) -> Notice {
        let language = language.trim();
        if language.is_empty() {
            return Notice::warning("Language cannot be empty.");
        }
        if language == self.language {
            return Notice::info(format!("Output language is already {}.", language));
        }
        self.language = language.to_string();
        apply(&mut self.store, LifecycleEvent::LanguageChanged)
    }

    /// Wipe the visible history; the agent keeps its memory
    pub fn clear_screen(&mut self) -> Notice {
        apply(&mut self.store, LifecycleEvent::ScreenClear)
    }

    /// Drop every handle and the history; the credential is kept
    pub fn full_reset(&mut self) -> Notice {
        apply(&mut self.store, LifecycleEvent::FullReset)
    }

    /// Return the model client, connecting it if absent
    pub fn ensure_model_client(&mut self) -> Result<ModelHandle, ChatError> {
        if let Some(model) = self.store.model_client() {
            return Ok(model.clone());
        }
        let credential = self.credential.as_deref().ok_or(ChatError::MissingCredential)?;
        let model = self.provider.connect(
            credential,
            &self.config.model,
            self.config.temperature,
        )?;
        self.store.set_model_client(model.clone());
        info!(model = %self.config.model, "Model client created");
        Ok(model)
    }

    /// Return the toolkit, opening the database if absent
    ///
    /// `Ok(None)` while there is no model client to bind it to.
    pub async fn ensure_toolkit(&mut self) -> Result<Option<ToolkitHandle>, ToolkitError> {
        if let Some(toolkit) = self.store.toolkit() {
            return Ok(Some(toolkit.clone()));
        }
        let model = match self.store.model_client() {
            Some(model) => model.clone(),
            None => return Ok(None),
        };
        let toolkit = Arc::new(SqlToolkit::connect(&self.config.database_uri, model).await?);
        self.store.set_toolkit(toolkit.clone());
        Ok(Some(toolkit))
    }

    /// The connect action
    pub async fn connect(&mut self) -> Notice {
        if self.store.toolkit().is_some() {
            return Notice::info("System is already active. Ready to query!");
        }
        if self.store.model_client().is_none() {
            return Notice::warning("API key missing! Please set it with /key.");
        }

        match self.ensure_toolkit().await {
            Ok(Some(_)) => Notice::success("Database connected! System ready."),
            Ok(None) => Notice::warning("API key missing! Please set it with /key."),
            Err(e) => {
                warn!(uri = %self.config.database_uri, error = %e, "Database connection failed");
                let lowered = e.to_string().to_lowercase();
                if lowered.contains("argumenterror") {
                    Notice::error(
                        "Invalid database URI. Please check the connection string format.",
                    )
                } else if lowered.contains("operationalerror") {
                    Notice::error("Operational error. Is the database file in the correct folder?")
                } else {
                    Notice::error(format!("Connection failed: {}", e))
                }
            }
        }
    }

    /// Return the memory, creating it once a model client exists
    pub fn ensure_memory(&mut self) -> Option<MemoryHandle> {
        agent::ensure_memory(&mut self.store)
    }

    /// Build the executor for the current language if it is missing
    pub async fn ensure_executor(&mut self) -> Result<Option<ExecutorHandle>, AssemblyError> {
        agent::ensure_executor(
            &mut self.store,
            self.prompt_source.as_ref(),
            &self.config.prompt_id,
            &self.language,
            self.config.max_iterations,
        )
        .await
    }

    /// Rebuild whatever is missing and buildable
    ///
    /// Creates the model client when a credential is set, then the memory,
    /// then the executor. Returns the notices to display.
    pub async fn refresh(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();

        if self.credential.is_some() && self.store.model_client().is_none() {
            match self.ensure_model_client() {
                Ok(_) => notices.push(Notice::success("AI engine initialized successfully!")),
                Err(e) => {
                    warn!(error = %e, "Model client creation failed");
                    notices.push(Notice::error(format!("Could not start the AI engine: {}", e)));
                }
            }
        }

        self.ensure_memory();

        if let Err(e) = self.ensure_executor().await {
            notices.push(e.kind().assembly_notice());
        }

        notices
    }

    /// Standing warnings for whatever is not set up yet
    pub fn readiness_notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        if self.credential.is_none() {
            notices.push(Notice::warning("Please set your API key with /key to proceed."));
        }
        if self.store.toolkit().is_none() {
            notices.push(Notice::warning(
                "Database not connected. Please run /connect.",
            ));
        }
        notices
    }

    /// Submit one chat input
    pub async fn submit(&mut self, input: &str, observer: &dyn ProgressObserver) -> TurnOutcome {
        self.chat.submit(&mut self.store, input, observer).await
    }
}
