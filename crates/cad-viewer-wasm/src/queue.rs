// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame queues between the JS socket and the view.

use std::collections::VecDeque;

use cad_sync_proto::wire::{decode_kernel_message, encode_client_message};
use cad_sync_proto::{ClientMessage, KernelMessage};
use cad_viewer_core::{Transport, TransportError};
use tracing::warn;

/// Transport whose two ends are plain byte queues.
///
/// JS pushes kernel frames in with [`FrameQueue::push_inbound`] and drains
/// client frames with [`FrameQueue::take_outbound`].
#[derive(Debug, Default)]
pub struct FrameQueue {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    ts: u64,
    closed: bool,
}

impl FrameQueue {
    /// Empty queue pair.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one CBOR frame from the kernel.
    pub fn push_inbound(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    /// Number of frames waiting to be pumped.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Drain encoded client frames in send order.
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    /// Refuse further sends; the socket is gone.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for FrameQueue {
    fn drain_inbound(&mut self, max: usize) -> Vec<KernelMessage> {
        let mut out = Vec::new();
        while out.len() < max {
            let Some(frame) = self.inbound.pop_front() else {
                break;
            };
            match decode_kernel_message(&frame) {
                Ok((msg, _ts)) => out.push(msg),
                Err(err) => warn!(error = %err, len = frame.len(), "dropping undecodable frame"),
            }
        }
        out
    }

    fn send(&mut self, msg: ClientMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.ts += 1;
        let frame = encode_client_message(&msg, self.ts)?;
        self.outbound.push(frame);
        Ok(())
    }
}
