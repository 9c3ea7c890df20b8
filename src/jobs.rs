//! Background execution of orchestration runs.
//!
//! Submission is fire-and-forget: the caller gets a request id back and a
//! fixed pool of workers drains the queue. Terminal results are stored once
//! per request id and handed out exactly once by [`JobProcessor::take_result`].

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::database::DbPool;
use crate::progress::{ProgressSink, StatusLogSink, StatusLogStore};
use crate::services::AgentServiceClient;
use crate::supervisor::{PipelineFailure, PipelineResult, Supervisor};

pub type JobOutcome = Result<PipelineResult, PipelineFailure>;

#[derive(Debug, Clone)]
struct JobRequest {
    request_id: String,
    chat_id: String,
    content: String,
}

enum JobState {
    Pending,
    Finished(JobOutcome),
}

pub struct JobProcessor {
    records: Arc<DashMap<String, JobState>>,
    tx: mpsc::Sender<JobRequest>,
}

impl JobProcessor {
    /// Start the worker pool. Workers share one queue and run until the
    /// processor is dropped.
    pub fn new(
        db: DbPool,
        services: Arc<AgentServiceClient>,
        status_logs: Arc<StatusLogStore>,
        worker_count: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<JobRequest>(64);
        let rx = Arc::new(Mutex::new(rx));
        let records: Arc<DashMap<String, JobState>> = Arc::new(DashMap::new());

        for worker_index in 0..worker_count.max(1) {
            let rx = Arc::clone(&rx);
            let records = Arc::clone(&records);
            let db = db.clone();
            let services = Arc::clone(&services);
            let status_logs = Arc::clone(&status_logs);

            tokio::spawn(async move {
                info!(worker_index, "Background worker started");
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        info!(worker_index, "Background worker stopping, queue closed");
                        break;
                    };

                    let sink: Arc<dyn ProgressSink> =
                        Arc::new(StatusLogSink::new(Arc::clone(&status_logs), job.chat_id.clone()));
                    let supervisor = Supervisor::new(Arc::clone(&services), Arc::clone(&sink));

                    info!(
                        request_id = %job.request_id,
                        chat_id = %job.chat_id,
                        "Processing background request"
                    );

                    let outcome = supervisor
                        .run_with_fallback(&db, &job.chat_id, &job.content)
                        .await;

                    match &outcome {
                        Ok(_) => sink.info("Request completed successfully"),
                        Err(e) => sink.error(&format!("Request failed: {e}")),
                    }

                    records.insert(job.request_id, JobState::Finished(outcome));
                }
            });
        }

        Arc::new(Self { records, tx })
    }

    /// Queue an orchestration run and return its request id immediately.
    pub async fn submit(&self, chat_id: &str, content: &str) -> anyhow::Result<String> {
        let request_id = Uuid::new_v4().to_string();
        self.records
            .insert(request_id.clone(), JobState::Pending);

        let job = JobRequest {
            request_id: request_id.clone(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        };

        if let Err(e) = self.tx.send(job).await {
            self.records.remove(&request_id);
            error!("Failed to queue background request: {e}");
            return Err(anyhow::anyhow!("background queue unavailable"));
        }

        Ok(request_id)
    }

    /// Consume-once retrieval: a finished record is returned and deleted;
    /// pending or unknown ids yield `None`.
    pub fn take_result(&self, request_id: &str) -> Option<JobOutcome> {
        let (_, state) = self
            .records
            .remove_if(request_id, |_, state| matches!(state, JobState::Finished(_)))?;
        match state {
            JobState::Finished(outcome) => Some(outcome),
            JobState::Pending => unreachable!("remove_if only takes finished records"),
        }
    }
}
