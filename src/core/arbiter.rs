// src/core/arbiter.rs

//! Request-Lifecycle Arbiter (component B, spec §4.B). Grounded on
//! `original_source/.../plexi.c`'s single `inbox_msg`/`inbox_msg_lock`
//! globals for the "one buffer, one lock tag" design, and on `spineldb`'s
//! `command_router::execute_command`'s `EvalShaGuard` for the
//! RAII-release-on-every-path pattern.

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::core::dispatch::ResourceKind;
use crate::core::errors::ServiceError;
use crate::core::protocol::{Method, Response};

/// Identifies the far end of a fragmented request well enough to detect a
/// retransmitted final block (spec §4.B "Idempotence"): the transport
/// supplies message identity as a (peer address, message ID) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestOrigin {
    pub addr: SocketAddr,
    pub message_id: u16,
}

/// The lock tag held while a multi-block POST is in flight: which
/// (resource, method) pair owns the single reassembly buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTag {
    pub resource: ResourceKind,
    pub method: Method,
    pub origin: RequestOrigin,
}

/// A small fixed-size ring of recently produced responses, keyed by
/// request origin, so a retransmitted final block re-emits the prior
/// response instead of being processed twice (spec §4.B / §5
/// "Idempotence"). Hand-rolled in place of an LRU-cache dependency this
/// node-local, embedded-scale service has no other use for (see
/// DESIGN.md).
struct RecentResponses {
    entries: VecDeque<(RequestOrigin, Response)>,
    capacity: usize,
}

impl RecentResponses {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn get(&self, origin: RequestOrigin) -> Option<&Response> {
        self.entries
            .iter()
            .find(|(o, _)| *o == origin)
            .map(|(_, r)| r)
    }

    fn insert(&mut self, origin: RequestOrigin, response: Response) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((origin, response));
    }
}

/// Owns the single per-node reassembly buffer and lock tag (spec §4.B).
/// Only one (resource, method) pair may hold the lock at a time; every
/// acquisition path that can fail (busy, overflow) guarantees the lock is
/// released before returning an error.
pub struct Arbiter {
    lock: Option<LockTag>,
    buffer: Vec<u8>,
    max_buffer_bytes: usize,
    recent: RecentResponses,
}

/// Outcome of feeding one block to the Arbiter.
pub enum BlockOutcome {
    /// Not the final block: payload appended, no response due yet.
    Continuation,
    /// The final block: the fully reassembled payload, ready to hand to a
    /// handler.
    Complete(Vec<u8>),
    /// This origin's final block was already processed; re-emit the cached
    /// response rather than reprocessing (spec §4.B "Idempotence").
    Replay(Response),
}

impl Arbiter {
    pub fn new(max_buffer_bytes: usize, replay_cache_capacity: usize) -> Self {
        Self {
            lock: None,
            buffer: Vec::new(),
            max_buffer_bytes,
            recent: RecentResponses::new(replay_cache_capacity),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn held_by(&self) -> Option<LockTag> {
        self.lock
    }

    /// Records the dispatcher's final response to `origin`, for replay on a
    /// retransmitted final block.
    pub fn remember(&mut self, origin: RequestOrigin, response: Response) {
        self.recent.insert(origin, response);
    }

    /// Feeds one block of a (possibly fragmented) request through the
    /// Arbiter. `is_final` is the transport's Block1 "more" bit, inverted.
    /// Returns `Busy` if a different (resource, method) pair currently
    /// holds the lock; guarantees the lock is released before returning on
    /// any error path.
    pub fn accept_block(
        &mut self,
        tag: LockTag,
        chunk: &[u8],
        is_final: bool,
    ) -> Result<BlockOutcome, ServiceError> {
        if let Some(cached) = self.recent.get(tag.origin) {
            return Ok(BlockOutcome::Replay(cached.clone()));
        }

        match self.lock {
            Some(held) if held.resource != tag.resource || held.method != tag.method => {
                return Err(ServiceError::Busy(format!(
                    "{} {:?} is locked by another request",
                    held.method, held.resource
                )));
            }
            Some(_) => {}
            None => {
                self.lock = Some(tag);
                self.buffer.clear();
            }
        }

        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.max_buffer_bytes {
            self.release();
            return Err(ServiceError::BadRequest(format!(
                "reassembly buffer overflow: exceeded {} bytes",
                self.max_buffer_bytes
            )));
        }

        if is_final {
            let payload = std::mem::take(&mut self.buffer);
            self.lock = None;
            Ok(BlockOutcome::Complete(payload))
        } else {
            Ok(BlockOutcome::Continuation)
        }
    }

    /// Releases the lock unconditionally. Called on every handler error
    /// path and by the transport on a final-block receive timeout (spec
    /// §5 "Cancellation & timeouts").
    pub fn release(&mut self) {
        self.lock = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn origin(id: u16) -> RequestOrigin {
        RequestOrigin {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5683),
            message_id: id,
        }
    }

    fn tag(resource: ResourceKind, method: Method, id: u16) -> LockTag {
        LockTag {
            resource,
            method,
            origin: origin(id),
        }
    }

    #[test]
    fn single_block_completes_immediately() {
        let mut arbiter = Arbiter::new(1024, 4);
        let outcome = arbiter
            .accept_block(tag(ResourceKind::Stats, Method::Post, 1), b"abc", true)
            .unwrap();
        assert!(matches!(outcome, BlockOutcome::Complete(ref b) if b == b"abc"));
        assert!(!arbiter.is_locked());
    }

    #[test]
    fn competing_resource_is_busy_while_locked() {
        let mut arbiter = Arbiter::new(1024, 4);
        arbiter
            .accept_block(tag(ResourceKind::Stats, Method::Post, 1), b"part1", false)
            .unwrap();
        let err = arbiter
            .accept_block(tag(ResourceKind::CellList, Method::Get, 2), b"", true)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Busy(_)));
        assert!(arbiter.is_locked());
    }

    #[test]
    fn overflow_releases_lock_and_reports_bad_request() {
        let mut arbiter = Arbiter::new(4, 4);
        let err = arbiter
            .accept_block(
                tag(ResourceKind::Stats, Method::Post, 1),
                b"this is far too long",
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert!(!arbiter.is_locked());
    }

    #[test]
    fn multi_block_reassembles_in_order() {
        let mut arbiter = Arbiter::new(1024, 4);
        let t = tag(ResourceKind::Stats, Method::Post, 7);
        assert!(matches!(
            arbiter.accept_block(t, b"hel", false).unwrap(),
            BlockOutcome::Continuation
        ));
        let outcome = arbiter.accept_block(t, b"lo", true).unwrap();
        assert!(matches!(outcome, BlockOutcome::Complete(ref b) if b == b"hello"));
    }
}
