// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Reply table for `--wait` control callers.
//!
//! Blockers reference waiting connections through a [`WaiterId`] handle; the
//! oneshot reply channel lives here. A caller that went away simply fails
//! the send, which is ignored.

use crate::protocol::Response;
use std::collections::HashMap;
use tokio::sync::oneshot;
use vigil_core::WaiterId;

#[derive(Default)]
pub struct WaiterTable {
    next: u64,
    replies: HashMap<WaiterId, oneshot::Sender<Response>>,
}

impl WaiterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reply: oneshot::Sender<Response>) -> WaiterId {
        self.next += 1;
        let id = WaiterId(self.next);
        self.replies.insert(id, reply);
        id
    }

    /// Send the reply for a waiter, releasing its table entry.
    pub fn resolve(&mut self, id: WaiterId, response: Response) {
        if let Some(reply) = self.replies.remove(&id) {
            let _ = reply.send(response);
        }
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}
