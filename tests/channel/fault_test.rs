/*!
 * Fault Tests
 * Copy failures, bad descriptors and protocol errors
 */

use super::support::{pattern, post_send, recv_blocking, FailingEngine, HalfEngine};
use cma_channel::transport::{loopback, Connection};
use cma_channel::{ChannelError, ChannelPhase, Context, ControlMessage, TransferDescriptor};
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_short_read_only_reaches_receiver() {
    let context = Context::builder()
        .with_copy_engine(Arc::new(HalfEngine))
        .build()
        .unwrap();
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let source = pattern(4096);
    let mut target = vec![0u8; 4096];
    let send = post_send(&sender, &source);

    assert_eq!(
        recv_blocking(&receiver, send.descriptor().unwrap(), &mut target),
        Err(ChannelError::ShortRead {
            expected: 4096,
            actual: 2048
        })
    );
    // The sender is still acknowledged
    assert_eq!(send.done(), Ok(()));
    assert_eq!(receiver.phase(), ChannelPhase::Active);
    assert_eq!(context.stats().failed, 1);
}

#[test]
fn test_syscall_failure_reports_errno() {
    let context = Context::builder()
        .with_copy_engine(Arc::new(FailingEngine(Errno::EPERM)))
        .build()
        .unwrap();
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let source = pattern(64);
    let mut target = vec![0u8; 64];
    let send = post_send(&sender, &source);

    assert_eq!(
        recv_blocking(&receiver, send.descriptor().unwrap(), &mut target),
        Err(ChannelError::SystemFailure {
            code: Errno::EPERM as i32
        })
    );
    assert_eq!(send.done(), Ok(()));
}

#[test]
fn test_unmapped_source_address() {
    let context = Context::new().unwrap();
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let source = pattern(64);
    let send = post_send(&sender, &source);
    let mut descriptor = TransferDescriptor::decode(&send.descriptor().unwrap()).unwrap();
    descriptor.ptr = 0;

    let mut target = vec![0u8; 64];
    assert_eq!(
        recv_blocking(&receiver, descriptor.encode().unwrap(), &mut target),
        Err(ChannelError::SystemFailure {
            code: Errno::EFAULT as i32
        })
    );
    assert_eq!(send.done(), Ok(()));
}

#[test]
fn test_invalid_descriptor_leaves_channel_usable() {
    let context = Context::new().unwrap();
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let mut target = vec![0u8; 16];
    assert!(matches!(
        recv_blocking(&receiver, vec![1, 2, 3], &mut target),
        Err(ChannelError::InvalidDescriptor(_))
    ));
    assert_eq!(receiver.phase(), ChannelPhase::Active);

    let source = pattern(16);
    let send = post_send(&sender, &source);
    assert_eq!(recv_blocking(&receiver, send.descriptor().unwrap(), &mut target), Ok(()));
    assert_eq!(send.done(), Ok(()));
    assert_eq!(target, source);
}

#[test]
fn test_unknown_notification_is_protocol_violation() {
    let context = Context::new().unwrap();
    let (a, peer) = loopback::pair();
    let sender = context.create_channel(a).unwrap();

    let source = pattern(32);
    let send = post_send(&sender, &source);
    send.descriptor().unwrap();

    let frame = ControlMessage::Notification { operation_id: 7 }
        .encode()
        .unwrap();
    peer.write(frame, Box::new(|_| {}));

    assert_eq!(
        send.done(),
        Err(ChannelError::ProtocolViolation { operation_id: 7 })
    );
    assert_eq!(sender.phase(), ChannelPhase::Closed);

    // Later sends see the same error
    let late = post_send(&sender, &source);
    assert_eq!(
        late.done(),
        Err(ChannelError::ProtocolViolation { operation_id: 7 })
    );
}

#[test]
fn test_malformed_control_frame_fails_channel() {
    let context = Context::new().unwrap();
    let (a, peer) = loopback::pair();
    let sender = context.create_channel(a).unwrap();

    let source = pattern(32);
    let send = post_send(&sender, &source);
    send.descriptor().unwrap();

    peer.write(vec![0xff, 0xff, 0xff], Box::new(|_| {}));

    assert!(matches!(send.done(), Err(ChannelError::MalformedMessage(_))));
    assert_eq!(sender.phase(), ChannelPhase::Closed);
}

#[test]
fn test_duplicate_notification_is_protocol_violation() {
    let context = Context::new().unwrap();
    let (a, b) = loopback::pair();
    let sender = context.create_channel(a).unwrap();
    let receiver = context.create_channel(b).unwrap();

    let source = pattern(32);
    let mut target = vec![0u8; 32];
    let first = post_send(&sender, &source);
    let descriptor = first.descriptor().unwrap();

    assert_eq!(recv_blocking(&receiver, descriptor.clone(), &mut target), Ok(()));
    assert_eq!(first.done(), Ok(()));

    let second = post_send(&sender, &source);
    second.descriptor().unwrap();

    // Replaying operation 0 acknowledges it a second time
    assert_eq!(recv_blocking(&receiver, descriptor, &mut target), Ok(()));
    assert_eq!(
        second.done(),
        Err(ChannelError::ProtocolViolation { operation_id: 0 })
    );
}
