use std::{sync::Arc, time::Duration};

use crate::{
    domain::UserId,
    formatting::escape_html,
    messaging::{port::MessagingPort, types::SendOptions},
    state::RelayState,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    #[error("only the owner can broadcast")]
    NotOwner,
    #[error("broadcast message is empty")]
    EmptyMessage,
}

/// Aggregate outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub failed: Vec<UserId>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }
}

/// Fans one owner message out to every known visitor.
///
/// Each recipient is attempted exactly once; a failed send is counted and the
/// loop moves on.
pub struct BroadcastCoordinator {
    state: Arc<RelayState>,
    messenger: Arc<dyn MessagingPort>,
    pacing: Duration,
}

impl BroadcastCoordinator {
    pub fn new(state: Arc<RelayState>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            state,
            messenger,
            pacing: Duration::ZERO,
        }
    }

    /// Extra pause between two recipients, on top of the messenger's own pacing.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn broadcast(
        &self,
        requester: UserId,
        text: &str,
    ) -> Result<BroadcastReport, BroadcastError> {
        if !self.state.is_owner(requester).await {
            return Err(BroadcastError::NotOwner);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(BroadcastError::EmptyMessage);
        }

        // Snapshot under the state lock; the sends below run without it.
        let targets = self.state.visitor_routes().await;
        let html = escape_html(text);
        tracing::info!(recipients = targets.len(), "broadcast started");

        let mut report = BroadcastReport::default();
        for (i, (visitor, chat_id)) in targets.into_iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            match self
                .messenger
                .send_text(chat_id, &html, SendOptions::default())
                .await
            {
                Ok(_) => report.success_count += 1,
                Err(e) => {
                    tracing::debug!(visitor = visitor.0, error = %e, "broadcast send failed");
                    report.failure_count += 1;
                    report.failed.push(visitor);
                }
            }
        }

        tracing::info!(
            sent = report.success_count,
            failed = report.failure_count,
            "broadcast finished"
        );
        Ok(report)
    }
}
