// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Kernel-facing transport: port trait plus channel and recording adapters.
//!
//! The core never touches sockets. Hosts hand frames to a [`Transport`]; the
//! view drains it on its own schedule.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};

use cad_sync_proto::wire::{decode_kernel_message, encode_client_message};
use cad_sync_proto::{ClientMessage, KernelMessage, WireError};
use thiserror::Error;
use tracing::warn;

/// Error raised while sending to the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The kernel side went away.
    #[error("transport closed")]
    Closed,
    /// The message could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Abstract port for the kernel connection.
pub trait Transport {
    /// Drain up to `max` inbound messages in arrival order.
    fn drain_inbound(&mut self, max: usize) -> Vec<KernelMessage>;
    /// Send one message to the kernel.
    fn send(&mut self, msg: ClientMessage) -> Result<(), TransportError>;
}

/// Channel-backed transport carrying CBOR frames.
///
/// Frames that fail to decode are logged and skipped.
#[derive(Default)]
pub struct ChannelTransport {
    inbound: Option<Receiver<Vec<u8>>>,
    outbound: Option<Sender<Vec<u8>>>,
    ts: u64,
}

impl ChannelTransport {
    /// Construct a new, unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the underlying frame channels.
    pub fn set_channels(&mut self, inbound: Receiver<Vec<u8>>, outbound: Sender<Vec<u8>>) {
        self.inbound = Some(inbound);
        self.outbound = Some(outbound);
    }
}

impl Transport for ChannelTransport {
    fn drain_inbound(&mut self, max: usize) -> Vec<KernelMessage> {
        let mut out = Vec::new();
        let Some(rx) = &self.inbound else {
            return out;
        };
        while out.len() < max {
            match rx.try_recv() {
                Ok(frame) => match decode_kernel_message(&frame) {
                    Ok((msg, _ts)) => out.push(msg),
                    Err(err) => warn!(error = %err, len = frame.len(), "dropping undecodable frame"),
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    fn send(&mut self, msg: ClientMessage) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        self.ts += 1;
        let frame = encode_client_message(&msg, self.ts)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// In-memory transport that records everything sent.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    inbound: VecDeque<KernelMessage>,
    sent: Vec<ClientMessage>,
    closed: bool,
}

impl RecordingTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message.
    pub fn push_inbound(&mut self, msg: KernelMessage) {
        self.inbound.push_back(msg);
    }

    /// Messages sent so far.
    pub fn sent(&self) -> &[ClientMessage] {
        &self.sent
    }

    /// Drain the sent log.
    pub fn take_sent(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.sent)
    }

    /// Make every further send fail with [`TransportError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for RecordingTransport {
    fn drain_inbound(&mut self, max: usize) -> Vec<KernelMessage> {
        let n = max.min(self.inbound.len());
        self.inbound.drain(..n).collect()
    }

    fn send(&mut self, msg: ClientMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.push(msg);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cad_sync_proto::wire::{decode_client_message, encode_kernel_message};
    use cad_sync_proto::KernelCommand;
    use std::sync::mpsc;

    #[test]
    fn channel_transport_decodes_and_skips_garbage() {
        let (in_tx, in_rx) = mpsc::channel();
        let (out_tx, out_rx) = mpsc::channel();
        let mut t = ChannelTransport::new();
        t.set_channels(in_rx, out_tx);

        let cmd = KernelMessage::Command(KernelCommand::ExportImage { msg_id: 7 });
        in_tx.send(vec![0xff, 0x00]).unwrap();
        in_tx.send(encode_kernel_message(&cmd, 1).unwrap()).unwrap();
        assert_eq!(t.drain_inbound(10), vec![cmd]);

        let msg = ClientMessage::NeedsFullState { tree_version: 3 };
        t.send(msg.clone()).unwrap();
        let (decoded, ts) = decode_client_message(&out_rx.recv().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(ts, 1);
    }

    #[test]
    fn unconnected_channel_transport_is_closed() {
        let mut t = ChannelTransport::new();
        assert!(t.drain_inbound(4).is_empty());
        assert_eq!(
            t.send(ClientMessage::NeedsFullState { tree_version: 0 }),
            Err(TransportError::Closed)
        );
    }

    #[test]
    fn recording_transport_respects_max() {
        let mut t = RecordingTransport::new();
        for id in 0..3 {
            t.push_inbound(KernelMessage::Command(KernelCommand::ExportImage { msg_id: id }));
        }
        assert_eq!(t.drain_inbound(2).len(), 2);
        assert_eq!(t.drain_inbound(2).len(), 1);
    }
}
