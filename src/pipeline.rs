//! One ingestion run: fetch, normalize and persist every provider inside a
//! single transaction.
//!
//! Provider failures are absorbed (the provider contributes zero articles);
//! persistence failures roll the whole run back. The pipeline does not guard
//! against concurrent `run()` calls itself; see [`crate::scheduler`].

use serde::Serialize;
use sqlx::SqliteConnection;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::Config;
use crate::normalize::normalize_batch;
use crate::provider::{build_http_client, Provider, ProviderClient};
use crate::storage::{upsert_article, Database, DatabaseError};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was rolled back; nothing it wrote is visible
    #[error("Ingestion run rolled back: {0}")]
    Persistence(#[from] DatabaseError),

    /// Another run holds the overlap guard
    #[error("An ingestion run is already in progress")]
    AlreadyRunning,
}

/// Observable phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    FetchingNewsApi,
    FetchingGuardian,
    FetchingNyt,
    Committing,
    RolledBack,
}

impl RunState {
    fn fetching(provider: Provider) -> Self {
        match provider {
            Provider::NewsApi => RunState::FetchingNewsApi,
            Provider::Guardian => RunState::FetchingGuardian,
            Provider::Nyt => RunState::FetchingNyt,
        }
    }
}

/// What one provider contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOutcome {
    pub provider: Provider,
    /// Raw items received
    pub fetched: usize,
    /// Items dropped by normalization
    pub discarded: usize,
    /// Items upserted
    pub persisted: usize,
    /// Final fetch error, if the provider contributed nothing
    pub error: Option<String>,
}

impl ProviderOutcome {
    fn failed(provider: Provider, error: String) -> Self {
        Self {
            provider,
            fetched: 0,
            discarded: 0,
            persisted: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub outcomes: Vec<ProviderOutcome>,
}

impl RunResult {
    pub fn persisted(&self, provider: Provider) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.provider == provider)
            .map(|o| o.persisted)
            .sum()
    }

    pub fn total_persisted(&self) -> usize {
        self.outcomes.iter().map(|o| o.persisted).sum()
    }
}

pub struct IngestionPipeline {
    db: Database,
    clients: Vec<ProviderClient>,
    state: watch::Sender<RunState>,
}

impl IngestionPipeline {
    /// Clients run in the order given.
    pub fn new(db: Database, clients: Vec<ProviderClient>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self { db, clients, state }
    }

    /// Build the three provider clients from configuration.
    pub fn from_config(db: Database, config: &Config) -> Result<Self, reqwest::Error> {
        let http = build_http_client(&config.http)?;
        Ok(Self::new(db, ProviderClient::all_from_config(config, &http)))
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Pipeline state");
    }

    /// Execute one ingestion run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] after rolling back if the
    /// transaction cannot be opened, an upsert fails, or the commit fails.
    pub async fn run(&self) -> Result<RunResult, PipelineError> {
        tracing::info!(providers = self.clients.len(), "Starting ingestion run");

        let mut tx = match self.db.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "Could not open ingestion transaction");
                return Err(e.into());
            }
        };

        let mut result = RunResult::default();
        for client in &self.clients {
            self.transition(RunState::fetching(client.provider()));

            match self.ingest_provider(&mut tx, client).await {
                Ok(outcome) => {
                    tracing::info!(
                        provider = %outcome.provider,
                        fetched = outcome.fetched,
                        discarded = outcome.discarded,
                        processed = outcome.persisted,
                        "Provider articles processed"
                    );
                    result.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(
                        provider = %client.provider(),
                        error = %e,
                        "Persistence failed, rolling back ingestion run"
                    );
                    self.transition(RunState::RolledBack);
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "Explicit rollback failed; connection drop will abort");
                    }
                    self.transition(RunState::Idle);
                    return Err(e.into());
                }
            }
        }

        self.transition(RunState::Committing);
        if let Err(e) = tx.commit().await {
            tracing::error!(error = %e, "Commit failed, ingestion run rolled back");
            self.transition(RunState::RolledBack);
            self.transition(RunState::Idle);
            return Err(DatabaseError::from(e).into());
        }
        self.transition(RunState::Idle);

        tracing::info!(
            total = result.total_persisted(),
            "All articles processed successfully"
        );
        Ok(result)
    }

    /// Fetch, normalize and upsert one provider's articles.
    ///
    /// Fetch errors are absorbed into the outcome; only persistence errors
    /// escape.
    async fn ingest_provider(
        &self,
        conn: &mut SqliteConnection,
        client: &ProviderClient,
    ) -> Result<ProviderOutcome, DatabaseError> {
        let provider = client.provider();
        let raw = match client.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    error = %e,
                    "Provider fetch failed, contributing zero articles this run"
                );
                return Ok(ProviderOutcome::failed(provider, e.to_string()));
            }
        };

        let fetched = raw.len();
        let articles = normalize_batch(provider, raw);
        for article in &articles {
            upsert_article(&mut *conn, article).await?;
        }

        Ok(ProviderOutcome {
            provider,
            fetched,
            discarded: fetched - articles.len(),
            persisted: articles.len(),
            error: None,
        })
    }
}
