/*!
 * Cross-Process Tests
 *
 * The test binary re-runs itself as a child that sends from its own address
 * space; the parent receives with its own context over a Unix socket.
 */

use super::support::{pattern, post_send, recv_blocking};
use cma_channel::{Context, StreamConnection, TransferDescriptor};
use pretty_assertions::assert_eq;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::process::Command;

const SOCKET_ENV: &str = "CMA_TEST_SENDER_SOCKET";
const CHILD_TEST: &str = "cross_process_test::test_child_sender";
const TRANSFER_LEN: usize = 8192;

/// Sending side; does nothing unless started by the parent test
#[test]
fn test_child_sender() {
    let Ok(path) = std::env::var(SOCKET_ENV) else {
        return;
    };

    let control = UnixStream::connect(&path).unwrap();
    let mut side = UnixStream::connect(&path).unwrap();

    let context = Context::new().unwrap();
    let connection = StreamConnection::from_config(control, context.config()).unwrap();
    let channel = context.create_channel(connection).unwrap();

    let source = pattern(TRANSFER_LEN);
    let send = post_send(&channel, &source);

    // Descriptor goes out of band, the way a higher layer would carry it
    side.write_all(&send.descriptor().unwrap()).unwrap();
    side.shutdown(Shutdown::Write).unwrap();

    assert_eq!(send.done(), Ok(()));
}

#[test]
fn test_round_trip_between_processes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let mut child = Command::new(std::env::current_exe().unwrap())
        .args([CHILD_TEST, "--exact", "--test-threads=1", "--nocapture"])
        .env(SOCKET_ENV, &path)
        .spawn()
        .unwrap();

    let (control, _) = listener.accept().unwrap();
    let (mut side, _) = listener.accept().unwrap();

    let mut descriptor = Vec::new();
    side.read_to_end(&mut descriptor).unwrap();

    let decoded = TransferDescriptor::decode(&descriptor).unwrap();
    assert_eq!(decoded.pid, child.id() as i32);
    assert_ne!(decoded.pid, std::process::id() as i32);

    let context = Context::new().unwrap();
    let connection = StreamConnection::from_config(control, context.config()).unwrap();
    let receiver = context.create_channel(connection).unwrap();

    let mut target = vec![0u8; TRANSFER_LEN];
    assert_eq!(recv_blocking(&receiver, descriptor, &mut target), Ok(()));
    assert_eq!(target, pattern(TRANSFER_LEN));

    // The child only exits cleanly once its send was acknowledged
    assert!(child.wait().unwrap().success());
}
