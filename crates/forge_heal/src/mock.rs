//! Mock repair service for testing.
//!
//! Provides a scripted implementation of the [`RepairService`] trait so the
//! healing loop can be exercised without a language model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{HealError, HealResult};
use crate::repair::{RepairRequest, RepairService};

/// A scripted reply.
#[derive(Clone)]
pub enum MockReply {
    /// Replace the file with this content.
    Content(String),
    /// Rewrite the current content.
    Rewrite(Arc<dyn Fn(&str) -> String + Send + Sync>),
    /// Fail the call.
    Fail(String),
}

impl MockReply {
    pub fn content(content: impl Into<String>) -> Self {
        Self::Content(content.into())
    }

    /// Replace every occurrence of `from` with `to` in the current content.
    pub fn replace(from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self::Rewrite(Arc::new(move |current| current.replace(&from, &to)))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

impl std::fmt::Debug for MockReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content(content) => f.debug_tuple("Content").field(content).finish(),
            Self::Rewrite(_) => f.write_str("Rewrite(..)"),
            Self::Fail(message) => f.debug_tuple("Fail").field(message).finish(),
        }
    }
}

/// Mock repair service.
///
/// Replies come from a per-file script when one is registered, otherwise
/// from the shared sequence (cycled). With no script at all the current
/// content is returned unchanged. Every request is captured.
#[derive(Clone, Default)]
pub struct MockRepairService {
    /// Replies for any file, used in order.
    replies: Arc<RwLock<Vec<MockReply>>>,
    /// Index of the next shared reply.
    reply_index: Arc<AtomicUsize>,
    /// Replies keyed by target file, consumed front to back; the last one sticks.
    file_replies: Arc<RwLock<HashMap<String, Vec<MockReply>>>>,
    /// Captured requests for verification.
    captured: Arc<RwLock<Vec<RepairRequest>>>,
}

impl MockRepairService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reply to the shared sequence.
    pub fn add_reply(self, reply: MockReply) -> Self {
        self.replies.write().push(reply);
        self
    }

    /// Add a reply used only for `file`.
    pub fn add_file_reply(self, file: impl Into<String>, reply: MockReply) -> Self {
        self.file_replies.write().entry(file.into()).or_default().push(reply);
        self
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<RepairRequest> {
        self.captured.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured.read().len()
    }

    pub fn clear_requests(&self) {
        self.captured.write().clear();
    }

    fn next_reply(&self, file: &str) -> Option<MockReply> {
        {
            let mut by_file = self.file_replies.write();
            if let Some(queue) = by_file.get_mut(file) {
                if queue.len() > 1 {
                    return Some(queue.remove(0));
                }
                if let Some(last) = queue.first() {
                    return Some(last.clone());
                }
            }
        }

        let replies = self.replies.read();
        if replies.is_empty() {
            return None;
        }
        let index = self.reply_index.fetch_add(1, Ordering::SeqCst);
        replies.get(index % replies.len()).cloned()
    }
}

#[async_trait]
impl RepairService for MockRepairService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn repair(&self, request: RepairRequest) -> HealResult<String> {
        let reply = self.next_reply(&request.target_file);
        let current = request.current_content.clone();
        let file = request.target_file.clone();
        self.captured.write().push(request);

        match reply {
            None => Ok(current),
            Some(MockReply::Content(content)) => Ok(content),
            Some(MockReply::Rewrite(rewrite)) => Ok(rewrite(&current)),
            Some(MockReply::Fail(message)) => Err(HealError::RepairFailed { file, message }),
        }
    }
}
