/*!
 * cma-probe
 *
 * Reports this process's domain fingerprint and whether cross-memory attach
 * works here, then pushes a buffer through a loopback channel pair.
 */

use std::error::Error;
use std::time::Duration;
use tracing::{info, warn};

use cma_channel::monitoring::init_tracing;
use cma_channel::transport::loopback;
use cma_channel::{Context, ContextConfig, CopyStats};

const PROBE_LEN: usize = 4096;
const WAIT: Duration = Duration::from_secs(5);

/// Move `source` into `target` through a loopback channel pair
///
/// Takes the context by value: it is dropped, joining the copy worker,
/// before the borrowed buffers can be released, including on early returns.
fn transfer(
    context: Context,
    source: &[u8],
    target: &mut [u8],
    wait: Duration,
) -> Result<CopyStats, Box<dyn Error>> {
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a)?;
    let receiver = context.create_channel(b)?;

    let (descriptor_tx, descriptor_rx) = flume::bounded(1);
    let (sent_tx, sent_rx) = flume::bounded(1);
    sender.send(
        source.as_ptr(),
        source.len(),
        move |descriptor| {
            let _ = descriptor_tx.send(descriptor);
        },
        move |result| {
            let _ = sent_tx.send(result);
        },
    );
    let descriptor = descriptor_rx.recv_timeout(wait)??;

    let (received_tx, received_rx) = flume::bounded(1);
    // SAFETY: `target` is borrowed for longer than `context` lives, and
    // dropping the context joins the copy worker.
    unsafe {
        receiver.recv(descriptor, target.as_mut_ptr(), target.len(), move |result| {
            let _ = received_tx.send(result);
        });
    }
    received_rx.recv_timeout(wait)??;
    sent_rx.recv_timeout(wait)??;

    Ok(context.stats())
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let context = Context::from_config(ContextConfig::from_env())?;
    println!("context:     {}", context.id());
    println!("fingerprint: {}", context.domain_fingerprint());

    let viable = context.is_viable();
    println!("viable:      {}", viable);
    if !viable {
        warn!("Cross-memory attach unavailable, skipping transfer");
        return Ok(());
    }

    let source: Vec<u8> = (0..PROBE_LEN).map(|i| (i % 251) as u8).collect();
    let mut target = vec![0u8; PROBE_LEN];
    let stats = transfer(context, &source, &mut target, WAIT)?;

    let intact = source == target;
    println!("transfer:    {} bytes, intact={}", PROBE_LEN, intact);
    info!(stats = ?stats, "Probe finished");

    if !intact {
        return Err("transferred bytes differ from source".into());
    }
    Ok(())
}
