//! Best-effort version ledger mirroring.
//!
//! The tracker in the Setup tab is the record of truth for versions. Every
//! tracker change is also mirrored to the external ledger by publishing a
//! [`LedgerEvent`]; a background worker applies events and only logs
//! failures, so a ledger outage never fails a version operation.

use crate::project::{VersionLedger, VersionRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    VersionCreated(VersionRecord),
    ActiveChanged {
        project_id: String,
        sheet_name: String,
    },
    StatusChanged {
        project_id: String,
        sheet_name: String,
        status: String,
    },
    VersionDeleted {
        project_id: String,
        sheet_name: String,
    },
}

impl LedgerEvent {
    pub fn project_id(&self) -> &str {
        match self {
            LedgerEvent::VersionCreated(r) => &r.project_id,
            LedgerEvent::ActiveChanged { project_id, .. }
            | LedgerEvent::StatusChanged { project_id, .. }
            | LedgerEvent::VersionDeleted { project_id, .. } => project_id,
        }
    }

    pub fn sheet_name(&self) -> &str {
        match self {
            LedgerEvent::VersionCreated(r) => &r.sheet_name,
            LedgerEvent::ActiveChanged { sheet_name, .. }
            | LedgerEvent::StatusChanged { sheet_name, .. }
            | LedgerEvent::VersionDeleted { sheet_name, .. } => sheet_name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerEvent::VersionCreated(_) => "version_created",
            LedgerEvent::ActiveChanged { .. } => "active_changed",
            LedgerEvent::StatusChanged { .. } => "status_changed",
            LedgerEvent::VersionDeleted { .. } => "version_deleted",
        }
    }
}

/// Sending half of the ledger channel. Cheap to clone; publishing never
/// blocks and never fails the caller.
#[derive(Debug, Clone, Default)]
pub struct LedgerPublisher {
    tx: Option<mpsc::UnboundedSender<LedgerEvent>>,
}

impl LedgerPublisher {
    /// A publisher that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: LedgerEvent) {
        let Some(tx) = &self.tx else {
            debug!(event = event.label(), "ledger disabled, dropping event");
            return;
        };
        if let Err(e) = tx.send(event) {
            warn!(
                project_id = e.0.project_id(),
                version = e.0.sheet_name(),
                event = e.0.label(),
                "ledger worker has stopped; event dropped"
            );
        }
    }
}

/// Apply events until every publisher is dropped.
pub async fn run_ledger(
    ledger: Arc<dyn VersionLedger>,
    mut rx: mpsc::UnboundedReceiver<LedgerEvent>,
) {
    while let Some(event) = rx.recv().await {
        match ledger.apply(&event).await {
            Ok(()) => debug!(
                project_id = event.project_id(),
                version = event.sheet_name(),
                event = event.label(),
                "ledger updated"
            ),
            Err(e) => warn!(
                project_id = event.project_id(),
                version = event.sheet_name(),
                event = event.label(),
                error = %e,
                "ledger update failed"
            ),
        }
    }
}

/// Start the ledger worker on the current tokio runtime.
pub fn spawn_ledger(ledger: Arc<dyn VersionLedger>) -> (LedgerPublisher, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_ledger(ledger, rx));
    (LedgerPublisher { tx: Some(tx) }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TakeoffError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl VersionLedger for Recording {
        async fn apply(&self, event: &LedgerEvent) -> Result<()> {
            if self.fail_on == Some(event.label()) {
                return Err(TakeoffError::Upstream("ledger offline".into()));
            }
            self.seen.lock().unwrap().push(event.sheet_name().to_string());
            Ok(())
        }
    }

    fn activated(name: &str) -> LedgerEvent {
        LedgerEvent::ActiveChanged {
            project_id: "p1".into(),
            sheet_name: name.into(),
        }
    }

    #[tokio::test]
    async fn worker_applies_events_in_order() {
        let ledger = Arc::new(Recording::default());
        let (publisher, handle) = spawn_ledger(ledger.clone());
        publisher.publish(activated("a"));
        publisher.publish(activated("b"));
        drop(publisher);
        handle.await.unwrap();
        assert_eq!(*ledger.seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_worker() {
        let ledger = Arc::new(Recording {
            fail_on: Some("version_deleted"),
            ..Default::default()
        });
        let (publisher, handle) = spawn_ledger(ledger.clone());
        publisher.publish(LedgerEvent::VersionDeleted {
            project_id: "p1".into(),
            sheet_name: "gone".into(),
        });
        publisher.publish(activated("kept"));
        drop(publisher);
        handle.await.unwrap();
        assert_eq!(*ledger.seen.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn disabled_publisher_swallows_events() {
        LedgerPublisher::disabled().publish(activated("x"));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(activated("v1")).unwrap();
        assert_eq!(json["event"], "active_changed");
        assert_eq!(json["sheet_name"], "v1");
    }
}
