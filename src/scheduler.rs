//! Periodic and on-demand driver for the ingestion pipeline.
//!
//! At most one run is in flight at a time. A trigger that arrives while a
//! run is active is rejected, not queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::pipeline::{IngestionPipeline, PipelineError, RunResult};

pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    in_flight: Mutex<()>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self {
            pipeline,
            in_flight: Mutex::new(()),
        }
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Run the pipeline once, unless a run is already in flight.
    pub async fn trigger(&self) -> Result<RunResult, PipelineError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!("Ingestion run already in progress, skipping trigger");
            return Err(PipelineError::AlreadyRunning);
        };
        self.pipeline.run().await
    }

    /// Trigger immediately and then every `period` until `shutdown` resolves.
    ///
    /// Ticks missed while a run is active are skipped. Run errors are logged
    /// and the loop waits for the next tick. Shutdown is observed between
    /// runs only. Returns the number of runs started.
    pub async fn run_every(&self, period: Duration, shutdown: impl Future<Output = ()>) -> u64 {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs(), "Scheduler started");
        let mut runs = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(runs, "Scheduler shutting down");
                    return runs;
                }
                _ = ticker.tick() => {
                    match self.trigger().await {
                        Ok(result) => {
                            runs += 1;
                            tracing::info!(
                                run = runs,
                                persisted = result.total_persisted(),
                                "Scheduled ingestion run finished"
                            );
                        }
                        Err(PipelineError::AlreadyRunning) => {
                            tracing::debug!("Ingestion already in flight, tick skipped");
                        }
                        Err(e) => {
                            runs += 1;
                            tracing::error!(
                                run = runs,
                                error = %e,
                                "Scheduled ingestion run failed, retrying next cycle"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardianConfig;
    use crate::provider::{GuardianClient, ProviderClient, RetryPolicy};
    use crate::storage::Database;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn slow_scheduler(server: &MockServer, delay: Duration) -> Arc<Scheduler> {
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": {"status": "ok", "results": []}}))
                    .set_delay(delay),
            )
            .mount(server)
            .await;

        let client = GuardianClient::new(
            reqwest::Client::new(),
            &GuardianConfig {
                api_key: Some("k".to_string()),
                base_url: server.uri(),
                ..Default::default()
            },
            RetryPolicy::immediate(1),
        );
        let db = Database::open(":memory:").await.unwrap();
        let pipeline = IngestionPipeline::new(db, vec![ProviderClient::Search(client)]);
        Arc::new(Scheduler::new(Arc::new(pipeline)))
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_rejected() {
        let server = MockServer::start().await;
        let scheduler = slow_scheduler(&server, Duration::from_millis(400)).await;

        let first = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.trigger().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = scheduler.trigger().await;
        assert!(matches!(second, Err(PipelineError::AlreadyRunning)));

        assert!(first.await.unwrap().is_ok());
        // Guard is released once the first run finishes
        assert!(scheduler.trigger().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_ticks_are_not_counted() {
        let server = MockServer::start().await;
        let scheduler = slow_scheduler(&server, Duration::from_millis(400)).await;

        let first = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.trigger().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Every tick lands while the on-demand run holds the guard
        let runs = scheduler
            .run_every(
                Duration::from_millis(60),
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await;
        assert_eq!(runs, 0);
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_every_stops_on_shutdown() {
        let server = MockServer::start().await;
        let scheduler = slow_scheduler(&server, Duration::ZERO).await;

        let runs = scheduler
            .run_every(
                Duration::from_millis(50),
                tokio::time::sleep(Duration::from_millis(180)),
            )
            .await;
        assert!(runs >= 2, "expected at least two runs, got {runs}");
    }

    #[tokio::test]
    async fn test_run_every_survives_failed_runs() {
        let db = Database::open(":memory:").await.unwrap();
        sqlx::query("DROP TABLE articles")
            .execute(&db.pool)
            .await
            .unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"status": "ok", "results": [{
                    "webTitle": "T",
                    "webUrl": "https://g.example/t",
                    "webPublicationDate": "2024-11-08T10:00:00Z"
                }]}
            })))
            .mount(&server)
            .await;
        let client = GuardianClient::new(
            reqwest::Client::new(),
            &GuardianConfig {
                api_key: Some("k".to_string()),
                base_url: server.uri(),
                ..Default::default()
            },
            RetryPolicy::immediate(1),
        );
        let scheduler = Scheduler::new(Arc::new(IngestionPipeline::new(
            db,
            vec![ProviderClient::Search(client)],
        )));

        assert!(matches!(
            scheduler.trigger().await,
            Err(PipelineError::Persistence(_))
        ));
        let runs = scheduler
            .run_every(
                Duration::from_millis(40),
                tokio::time::sleep(Duration::from_millis(150)),
            )
            .await;
        assert!(runs >= 2);
    }
}
