/*!
 * Stream Transport Tests
 * Channels over socketpair control connections
 */

use super::support::{pattern, post_send, recv_blocking};
use cma_channel::{ChannelError, Context, StreamConnection};
use pretty_assertions::assert_eq;

#[test]
fn test_round_trip_over_socketpair() {
    let context = Context::new().unwrap();
    let (a, b) = StreamConnection::pair().unwrap();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    for len in [1usize, 4096, 64 * 1024] {
        let source = pattern(len);
        let mut target = vec![0u8; len];
        let send = post_send(&sender, &source);

        assert_eq!(recv_blocking(&receiver, send.descriptor().unwrap(), &mut target), Ok(()));
        assert_eq!(send.done(), Ok(()));
        assert_eq!(target, source);
    }
}

#[test]
fn test_channels_on_separate_contexts() {
    let left = Context::new().unwrap();
    let right = Context::new().unwrap();
    assert_eq!(left.domain_fingerprint(), right.domain_fingerprint());

    let (a, b) = StreamConnection::pair().unwrap();
    let sender = left.create_channel(a).unwrap();
    let receiver = right.create_channel(b).unwrap();

    let source = pattern(2048);
    let mut target = vec![0u8; 2048];
    let send = post_send(&sender, &source);

    assert_eq!(recv_blocking(&receiver, send.descriptor().unwrap(), &mut target), Ok(()));
    assert_eq!(send.done(), Ok(()));
    assert_eq!(right.stats().completed, 1);
    assert_eq!(left.stats().completed, 0);
}

#[test]
fn test_peer_shutdown_fails_pending_send() {
    let context = Context::new().unwrap();
    let (a, b) = StreamConnection::pair().unwrap();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let source = pattern(64);
    let send = post_send(&sender, &source);
    send.descriptor().unwrap();

    drop(receiver);
    assert_eq!(send.done(), Err(ChannelError::ChannelClosed));
}
