// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lazy mesh decode queue.
//!
//! Mesh payloads are never decoded while inbound deltas are applied. The
//! scene model enqueues a ticket per payload; the host drains tasks with a
//! budget outside inbound processing and hands results back to the model.
//! Only the newest ticket per shape is current.

use std::collections::{BTreeMap, VecDeque};

use cad_scene_codec::{decode_mesh, MeshCodecError};
use cad_scene_port::{MeshBuffers, MeshPayload, ShapeId};

/// One payload waiting for decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTask {
    /// Shape the payload belongs to.
    pub shape_id: ShapeId,
    /// Ticket issued when the payload arrived.
    pub ticket: u64,
    /// Encoded payload.
    pub payload: MeshPayload,
}

impl DecodeTask {
    /// Decode the payload.
    pub fn run(&self) -> Result<MeshBuffers, MeshCodecError> {
        decode_mesh(&self.payload)
    }
}

/// FIFO of decode tasks with per-shape supersession.
#[derive(Debug, Default)]
pub struct DecodeQueue {
    next_ticket: u64,
    queue: VecDeque<DecodeTask>,
    latest: BTreeMap<ShapeId, u64>,
}

impl DecodeQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload; returns its ticket. Older tickets for the same
    /// shape stop being current.
    pub fn enqueue(&mut self, shape: &ShapeId, payload: MeshPayload) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.latest.insert(shape.clone(), ticket);
        self.queue.push_back(DecodeTask {
            shape_id: shape.clone(),
            ticket,
            payload,
        });
        ticket
    }

    /// Hand out up to `budget` current tasks, dropping superseded ones.
    pub fn take(&mut self, budget: usize) -> Vec<DecodeTask> {
        let mut out = Vec::with_capacity(budget.min(self.queue.len()));
        while out.len() < budget {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if self.is_current(&task) {
                out.push(task);
            }
        }
        out
    }

    /// True when `task` holds the newest ticket for its shape.
    pub fn is_current(&self, task: &DecodeTask) -> bool {
        self.latest.get(&task.shape_id) == Some(&task.ticket)
    }

    /// Retire a completed task. Returns false when it was not current.
    pub(crate) fn settle(&mut self, task: &DecodeTask) -> bool {
        if self.is_current(task) {
            self.latest.remove(&task.shape_id);
            true
        } else {
            false
        }
    }

    /// Abandon every pending payload of a shape.
    pub fn forget(&mut self, shape: &ShapeId) {
        self.latest.remove(shape);
        self.queue.retain(|t| &t.shape_id != shape);
    }

    /// True when the shape has a payload in flight.
    pub fn is_pending(&self, shape: &ShapeId) -> bool {
        self.latest.contains_key(shape)
    }

    /// Shapes with a payload in flight.
    pub fn pending(&self) -> usize {
        self.latest.len()
    }

    /// Abandon everything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.latest.clear();
    }
}
