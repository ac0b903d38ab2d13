/*!
 * Shared helpers for channel tests
 */

use cma_channel::{Channel, ChannelResult, CopyEngine, CopyRegion};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Posted send whose descriptor and completion can be awaited
pub struct PendingSend {
    pub descriptor: flume::Receiver<ChannelResult<Vec<u8>>>,
    pub done: flume::Receiver<ChannelResult<()>>,
}

impl PendingSend {
    pub fn descriptor(&self) -> ChannelResult<Vec<u8>> {
        self.descriptor.recv_timeout(WAIT).expect("descriptor callback")
    }

    pub fn done(&self) -> ChannelResult<()> {
        self.done.recv_timeout(WAIT).expect("send callback")
    }
}

pub fn post_send(channel: &Channel, source: &[u8]) -> PendingSend {
    let (descriptor_tx, descriptor) = flume::bounded(1);
    let (done_tx, done) = flume::bounded(1);
    channel.send(
        source.as_ptr(),
        source.len(),
        move |result| {
            let _ = descriptor_tx.send(result);
        },
        move |result| {
            let _ = done_tx.send(result);
        },
    );
    PendingSend { descriptor, done }
}

/// Receive into `target` and wait for the local completion
pub fn recv_blocking(channel: &Channel, descriptor: Vec<u8>, target: &mut [u8]) -> ChannelResult<()> {
    let (tx, rx) = flume::bounded(1);
    // SAFETY: `target` stays borrowed until the callback has fired
    unsafe {
        channel.recv(descriptor, target.as_mut_ptr(), target.len(), move |result| {
            tx.send(result).unwrap()
        });
    }
    rx.recv_timeout(WAIT).expect("recv callback")
}

/// Post a receive without waiting; the receiver yields every callback result
///
/// # Safety
///
/// `target` must outlive the copy, i.e. stay alive until the context joined.
pub unsafe fn post_recv(
    channel: &Channel,
    descriptor: Vec<u8>,
    target: &mut [u8],
) -> flume::Receiver<ChannelResult<()>> {
    let (tx, rx) = flume::unbounded();
    channel.recv(descriptor, target.as_mut_ptr(), target.len(), move |result| {
        let _ = tx.send(result);
    });
    rx
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Engine that pretends only half of every region could be read
pub struct HalfEngine;

impl CopyEngine for HalfEngine {
    fn copy(&self, region: &CopyRegion) -> nix::Result<usize> {
        Ok(region.length / 2)
    }
}

/// Engine failing every copy with a fixed errno
pub struct FailingEngine(pub nix::errno::Errno);

impl CopyEngine for FailingEngine {
    fn copy(&self, _region: &CopyRegion) -> nix::Result<usize> {
        Err(self.0)
    }
}

/// Engine holding each copy until the gate is opened once for it
pub struct GatedEngine {
    started: flume::Sender<()>,
    gate: flume::Receiver<()>,
}

/// Engine plus "copy started" events and the gate to release copies
pub fn gated_engine() -> (Arc<GatedEngine>, flume::Receiver<()>, flume::Sender<()>) {
    let (started_tx, started_rx) = flume::unbounded();
    let (gate_tx, gate_rx) = flume::unbounded();
    let engine = Arc::new(GatedEngine {
        started: started_tx,
        gate: gate_rx,
    });
    (engine, started_rx, gate_tx)
}

impl CopyEngine for GatedEngine {
    fn copy(&self, region: &CopyRegion) -> nix::Result<usize> {
        let _ = self.started.send(());
        let _ = self.gate.recv();
        Ok(region.length)
    }
}
