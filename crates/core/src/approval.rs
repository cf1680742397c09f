//! Human approval for risky tool actions.
//!
//! Tools ask [`Approval::request`] before doing something destructive. The
//! request is published on the wire as [`WireEvent::ApprovalRequest`]; whoever
//! observes the wire answers through [`ApprovalRequest::resolve`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::event::{Wire, WireEvent};

/// A human's answer to an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResponse {
    Approve,
    /// Approve, and stop asking for this action for the rest of the session
    ApproveForSession,
    Reject,
}

/// A pending approval, shared between the asking tool and the UI.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool: String,
    pub action: String,
    pub description: String,
    responder: Mutex<Option<oneshot::Sender<ApprovalResponse>>>,
}

impl ApprovalRequest {
    /// Answer the request. Returns `false` if it was already answered or the
    /// asking side has gone away.
    pub fn resolve(&self, response: ApprovalResponse) -> bool {
        let sender = match self.responder.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }
}

/// Approval collaborator handed to tools that need a human decision.
pub struct Approval {
    yolo: bool,
    wire: Wire,
    auto_approve_actions: Mutex<HashSet<String>>,
}

impl Approval {
    pub fn new(wire: Wire, yolo: bool) -> Self {
        Self {
            yolo,
            wire,
            auto_approve_actions: Mutex::new(HashSet::new()),
        }
    }

    /// An approval that accepts everything without asking.
    pub fn yolo(wire: Wire) -> Arc<Self> {
        Arc::new(Self::new(wire, true))
    }

    pub fn is_yolo(&self) -> bool {
        self.yolo
    }

    pub fn wire(&self) -> &Wire {
        &self.wire
    }

    fn auto_approved(&self, action: &str) -> bool {
        self.auto_approve_actions
            .lock()
            .map(|set| set.contains(action))
            .unwrap_or(false)
    }

    /// Ask for approval and wait for the answer.
    ///
    /// A request nobody answers (no subscriber, or the request is dropped)
    /// counts as rejected.
    pub async fn request(&self, tool: &str, action: &str, description: &str) -> bool {
        if self.yolo || self.auto_approved(action) {
            return true;
        }

        let (tx, rx) = oneshot::channel();
        let request = Arc::new(ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            action: action.to_string(),
            description: description.to_string(),
            responder: Mutex::new(Some(tx)),
        });
        debug!(tool, action, id = %request.id, "Requesting approval");
        self.wire.send(WireEvent::ApprovalRequest(request));

        match rx.await {
            Ok(ApprovalResponse::Approve) => true,
            Ok(ApprovalResponse::ApproveForSession) => {
                if let Ok(mut set) = self.auto_approve_actions.lock() {
                    set.insert(action.to_string());
                }
                true
            }
            Ok(ApprovalResponse::Reject) | Err(_) => false,
        }
    }
}
