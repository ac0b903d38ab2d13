/*!
 * Core Types
 * Common types used across the channel layer
 */

/// Process ID type (matches the platform `pid_t`)
pub type Pid = i32;

/// Address type for local memory operations
pub type Address = usize;

/// Address inside another process, carried on the wire
pub type RemoteAddress = u64;

/// Size type for memory operations
pub type Size = usize;

/// Identifier assigned to every outbound send on a channel
pub type OperationId = u64;

/// Process ID of the calling process
#[inline]
#[must_use]
pub fn current_pid() -> Pid {
    nix::unistd::getpid().as_raw()
}
