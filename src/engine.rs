// src/engine.rs
//! The scan-and-delete loop.
//!
//! Pages are listed newest first and walked in the order received; every
//! message written by the target user is deleted, one call at a time, with a
//! fixed pause after each attempt. Cancellation is cooperative: the job's
//! flag is read before every list call and before every message, so an
//! in-flight delete always finishes before the run stops.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channel::MessageStore;
use crate::config::SweepConfig;
use crate::error::DeletionError;
use crate::job::Job;
use crate::message::{DeletionRequest, DeletionResult};
use crate::pacing::Pacer;

/// Tunables of a run.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Messages requested per list call.
    pub page_size: u32,
    /// Pause after every delete attempt.
    pub pace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            pace: Duration::from_millis(1500),
        }
    }
}

impl From<&SweepConfig> for EngineSettings {
    fn from(config: &SweepConfig) -> Self {
        Self {
            page_size: config.page_size,
            pace: config.pace(),
        }
    }
}

pub struct DeletionEngine<S, P> {
    store: S,
    pacer: P,
    settings: EngineSettings,
}

impl<S: MessageStore, P: Pacer> DeletionEngine<S, P> {
    pub fn new(store: S, pacer: P, settings: EngineSettings) -> Self {
        Self {
            store,
            pacer,
            settings,
        }
    }

    /// Delete every message of `request.user_id` in `request.channel_id`.
    ///
    /// Stopping at a cancellation checkpoint is a success carrying the
    /// deletions made so far. A failed list call ends the run with
    /// [`DeletionError::ListFailed`]; a failed delete is skipped.
    pub fn run(
        &self,
        job: &Job,
        request: &DeletionRequest,
    ) -> Result<DeletionResult, DeletionError> {
        request.validate()?;

        let page_size = self.settings.page_size;
        let channel_id = request.channel_id.as_str();
        let user_id = request.user_id.as_str();
        let mut result = DeletionResult::default();
        let mut before: Option<String> = None;
        let mut page_number: u32 = 0;

        info!(job = %job.id(), channel_id, user_id, page_size, "Deletion run started");

        'pages: loop {
            if job.is_cancel_requested() {
                result.mark_cancelled();
                break;
            }

            page_number += 1;
            let page = match self.store.list_messages(
                &request.credential,
                channel_id,
                before.as_deref(),
                page_size,
            ) {
                Ok(page) => page,
                Err(source) => {
                    warn!(
                        job = %job.id(),
                        page = page_number,
                        error = %source,
                        deleted = result.total(),
                        "Listing failed, aborting run"
                    );
                    return Err(DeletionError::ListFailed {
                        page: page_number,
                        source,
                        partial: result,
                    });
                }
            };
            job.record_page(page_number, page.len());
            info!(job = %job.id(), page = page_number, messages = page.len(), "Page fetched");

            if page.is_empty() {
                break;
            }

            for message in &page {
                if job.is_cancel_requested() {
                    result.mark_cancelled();
                    break 'pages;
                }
                if message.author_id() != user_id {
                    continue;
                }

                match self
                    .store
                    .delete_message(&request.credential, channel_id, &message.id)
                {
                    Ok(()) => {
                        let content = message.display_content();
                        debug!(job = %job.id(), message_id = %message.id, "Message deleted");
                        job.record_deleted(&message.id, &content);
                        result.record(content);
                    }
                    Err(e) => {
                        warn!(
                            job = %job.id(),
                            message_id = %message.id,
                            error = %e,
                            "Delete failed, skipping message"
                        );
                        job.record_skipped(&message.id, &e.to_string());
                    }
                }
                self.pacer.pause(self.settings.pace);
            }

            // Oldest message on the page, matched or not.
            before = page.last().map(|message| message.id.clone());
            if page.len() < page_size as usize {
                break;
            }
        }

        info!(
            job = %job.id(),
            deleted = result.total(),
            skipped = job.skipped(),
            pages = page_number,
            cancelled = result.is_cancelled(),
            "Deletion run finished"
        );
        Ok(result)
    }
}
