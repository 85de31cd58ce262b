use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::collections::{CollectionId, Workspace};
use crate::engine::cancel::cancel_requested;
use crate::error::{EngineError, Result};
use crate::http::client::{Dispatcher, TransportErrorKind};
use crate::http::normalize::normalize_dispatch;
use crate::store::CollectionStore;

use super::{CaseRun, record_outcome};

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum RunSignal {
    /// Every case was executed and recorded.
    Completed,
    /// Something outside a single request went wrong. Recorded results stay.
    Failed { errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    Started {
        collection_id: CollectionId,
        total: usize,
    },
    /// The case now executing.
    CaseStarted { index: usize, case_id: String },
    CaseFinished {
        index: usize,
        case_id: String,
        passed: bool,
    },
    Finished { signal: RunSignal },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub collection_id: CollectionId,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u128,
    pub results: Vec<CaseRun>,
    pub signal: RunSignal,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.signal == RunSignal::Completed
    }
}

/// Runs every case of a collection one after another.
pub struct BatchRunner<'a> {
    dispatcher: &'a Dispatcher,
    store: &'a dyn CollectionStore,
}

impl<'a> BatchRunner<'a> {
    pub fn new(dispatcher: &'a Dispatcher, store: &'a dyn CollectionStore) -> Self {
        Self { dispatcher, store }
    }

    /// Execute the cases of `collection_id` in stored order.
    ///
    /// Case N+1 starts only after case N has been normalized, written back to
    /// `workspace` and handed to the store. Request failures are recorded on
    /// their case and never stop the loop; store failures and cancellation
    /// turn the final signal into [`RunSignal::Failed`].
    pub async fn run_all(
        &self,
        workspace: &mut Workspace,
        collection_id: &str,
        cancel_rx: &mut broadcast::Receiver<()>,
        events: Option<&UnboundedSender<RunEvent>>,
    ) -> Result<RunReport> {
        let collection = workspace
            .collection(collection_id)
            .ok_or_else(|| EngineError::not_found("Collection", collection_id))?;
        let cases = collection.test_cases.clone();
        let total = cases.len();

        let started = Instant::now();
        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();

        info!(collection_id, total, "Starting batch run");
        emit(events, RunEvent::Started {
            collection_id: collection_id.to_string(),
            total,
        });

        for (index, case) in cases.iter().enumerate() {
            if cancel_requested(cancel_rx) {
                errors.push(format!("Run cancelled before case '{}'", case.id));
                break;
            }

            emit(events, RunEvent::CaseStarted {
                index,
                case_id: case.id.clone(),
            });

            let dispatch = self.dispatcher.dispatch(&case.request, cancel_rx).await;
            if matches!(&dispatch.outcome, Err(err) if err.kind == TransportErrorKind::Cancelled) {
                errors.push(format!("Run cancelled during case '{}'", case.id));
                break;
            }

            let run = record_outcome(case, normalize_dispatch(&dispatch));

            if let Some(result) = run.case.result() {
                if let Err(err) = self.store.save_result(&case.id, &result).await {
                    warn!(case_id = %case.id, error = %err, "Failed to persist test result");
                    errors.push(err.to_string());
                }
            }
            if !workspace.replace_case(&run.case) {
                warn!(case_id = %case.id, "Case disappeared from the workspace during the run");
                errors.push(EngineError::not_found("Test case", &case.id).to_string());
            }

            info!(
                case_id = %case.id,
                status = run.record.status,
                passed = run.passed,
                "Test case finished"
            );
            emit(events, RunEvent::CaseFinished {
                index,
                case_id: case.id.clone(),
                passed: run.passed,
            });
            results.push(run);
        }

        let passed = results.iter().filter(|run| run.passed).count();
        let signal = if errors.is_empty() {
            RunSignal::Completed
        } else {
            RunSignal::Failed { errors }
        };

        info!(collection_id, total, passed, signal = ?signal, "Batch run finished");
        emit(events, RunEvent::Finished {
            signal: signal.clone(),
        });

        Ok(RunReport {
            collection_id: collection_id.to_string(),
            total,
            passed,
            failed: results.len() - passed,
            duration_ms: started.elapsed().as_millis(),
            results,
            signal,
        })
    }
}

fn emit(events: Option<&UnboundedSender<RunEvent>>, event: RunEvent) {
    if let Some(events) = events {
        let _ = events.send(event);
    }
}
