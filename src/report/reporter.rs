use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{ItemRequest, ItemSink};
use crate::aggregate::LostObject;
use crate::settings::VideoAnalysisSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub object_id: String,
    pub success: bool,
    pub item_id: Option<i64>,
    pub error: Option<String>,
    /// True when no sink call was made because the object was already reported.
    #[serde(default)]
    pub already_reported: bool,
}

impl ReportOutcome {
    fn reported(object_id: &str, item_id: i64, already_reported: bool) -> Self {
        Self {
            object_id: object_id.to_string(),
            success: true,
            item_id: Some(item_id),
            error: None,
            already_reported,
        }
    }

    fn failed(object_id: &str, error: String) -> Self {
        Self {
            object_id: object_id.to_string(),
            success: false,
            item_id: None,
            error: Some(error),
            already_reported: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    InFlight,
    Reported(i64),
}

#[derive(Debug)]
struct ClaimEntry {
    video_id: String,
    claim: Claim,
}

/// At-most-once gate in front of an `ItemSink`.
///
/// The check of an object's state and the claim to report it happen under one lock.
/// The sink call runs outside the lock so unrelated objects report in parallel.
/// A failed call releases the claim; nothing is retried automatically.
/// Settled claims are kept per video until `forget_video` drops them.
pub struct Reporter {
    sink: Arc<dyn ItemSink>,
    claims: Mutex<HashMap<String, ClaimEntry>>,
    reported_by: String,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ItemSink>) -> Self {
        Self {
            sink,
            claims: Mutex::new(HashMap::new()),
            reported_by: "AI Detection System".to_string(),
        }
    }

    pub fn with_reported_by(mut self, reported_by: &str) -> Self {
        self.reported_by = reported_by.to_string();
        self
    }

    pub fn reported_by(&self) -> &str {
        &self.reported_by
    }

    /// Report one lost object. Calling again for a reported object is a no-op that
    /// returns the stored item id.
    pub fn report(
        &self,
        lost: &LostObject,
        settings: &VideoAnalysisSettings,
        auto_reported: bool,
    ) -> ReportOutcome {
        match self.claim(lost) {
            Ok(None) => {}
            Ok(Some(outcome)) => return outcome,
            Err(e) => return ReportOutcome::failed(&lost.id, e.to_string()),
        }

        let request = ItemRequest::from_lost_object(lost, settings, auto_reported);
        let result = self.sink.create_item(&request);

        let settle = self.settle(lost, result.as_ref().ok().copied());
        match (result, settle) {
            (Ok(item_id), Ok(())) => {
                log::info!(
                    "reported {} to {} as item {}",
                    lost.id,
                    self.sink.name(),
                    item_id
                );
                ReportOutcome::reported(&lost.id, item_id, false)
            }
            (Ok(item_id), Err(e)) => {
                log::error!("item {} created for {} but claim not settled: {}", item_id, lost.id, e);
                ReportOutcome::reported(&lost.id, item_id, false)
            }
            (Err(e), _) => {
                log::warn!("report of {} to {} failed: {}", lost.id, self.sink.name(), e);
                ReportOutcome::failed(&lost.id, e.to_string())
            }
        }
    }

    /// Report and flip the record's flag on success.
    pub fn report_and_mark(
        &self,
        lost: &mut LostObject,
        settings: &VideoAnalysisSettings,
        auto_reported: bool,
    ) -> ReportOutcome {
        let outcome = self.report(lost, settings, auto_reported);
        if let (true, Some(item_id)) = (outcome.success, outcome.item_id) {
            lost.mark_reported(item_id, &self.reported_by, chrono::Utc::now());
        }
        outcome
    }

    pub fn is_reported(&self, object_id: &str) -> bool {
        self.claims
            .lock()
            .map(|claims| {
                matches!(
                    claims.get(object_id).map(|entry| entry.claim),
                    Some(Claim::Reported(_))
                )
            })
            .unwrap_or(false)
    }

    /// Drop the settled claims of one video, once its records are deleted or replaced.
    /// In-flight claims stay until their sink call settles.
    pub fn forget_video(&self, video_id: &str) -> Result<usize> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| anyhow!("report claims lock poisoned"))?;
        let before = claims.len();
        claims.retain(|_, entry| entry.video_id != video_id || entry.claim == Claim::InFlight);
        let dropped = before - claims.len();
        if dropped > 0 {
            log::debug!("forgot {} report claims of video {}", dropped, video_id);
        }
        Ok(dropped)
    }

    /// Number of objects the reporter currently remembers.
    pub fn tracked_claims(&self) -> usize {
        self.claims.lock().map(|claims| claims.len()).unwrap_or(0)
    }

    /// Returns `Some(outcome)` when no sink call should happen.
    fn claim(&self, lost: &LostObject) -> Result<Option<ReportOutcome>> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| anyhow!("report claims lock poisoned"))?;

        if lost.reported_to_db {
            return Ok(Some(match lost.item_id {
                Some(item_id) => {
                    claims.insert(
                        lost.id.clone(),
                        ClaimEntry {
                            video_id: lost.video_id.clone(),
                            claim: Claim::Reported(item_id),
                        },
                    );
                    ReportOutcome::reported(&lost.id, item_id, true)
                }
                None => ReportOutcome::failed(&lost.id, "object already reported".to_string()),
            }));
        }

        match claims.get(&lost.id).map(|entry| entry.claim) {
            Some(Claim::Reported(item_id)) => {
                Ok(Some(ReportOutcome::reported(&lost.id, item_id, true)))
            }
            Some(Claim::InFlight) => Ok(Some(ReportOutcome::failed(
                &lost.id,
                "report already in flight".to_string(),
            ))),
            None => {
                claims.insert(
                    lost.id.clone(),
                    ClaimEntry {
                        video_id: lost.video_id.clone(),
                        claim: Claim::InFlight,
                    },
                );
                Ok(None)
            }
        }
    }

    fn settle(&self, lost: &LostObject, item_id: Option<i64>) -> Result<()> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| anyhow!("report claims lock poisoned"))?;
        match item_id {
            Some(item_id) => {
                claims.insert(
                    lost.id.clone(),
                    ClaimEntry {
                        video_id: lost.video_id.clone(),
                        claim: Claim::Reported(item_id),
                    },
                );
            }
            None => {
                claims.remove(&lost.id);
            }
        }
        Ok(())
    }
}
