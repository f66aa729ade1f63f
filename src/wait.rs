//! Best-effort waiting for a member that a sub-system attaches lazily.
//!
//! [`ChildWait`] is the pollable core used from an event loop tick;
//! [`await_child`] drives the same state machine on tokio timers.

use std::{cell::RefCell, rc::Rc, time::Duration};

use serde_json::{Map, Value};
use tokio::{sync::watch, time::Instant as TokioInstant};

use crate::field::{FieldId, FieldNode, locate};

pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Something that may or may not expose a named member yet.
pub trait Members {
    fn has_member(&self, name: &str) -> bool;
}

impl Members for Map<String, Value> {
    fn has_member(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl Members for Value {
    fn has_member(&self, name: &str) -> bool {
        self.as_object().is_some_and(|map| map.contains_key(name))
    }
}

impl<T: Members + ?Sized> Members for RefCell<T> {
    fn has_member(&self, name: &str) -> bool {
        self.borrow().has_member(name)
    }
}

impl<T: Members + ?Sized> Members for Rc<T> {
    fn has_member(&self, name: &str) -> bool {
        (**self).has_member(name)
    }
}

/// A node of a field tree, viewed as a bag of named children.
pub struct FieldScope<'a, H: ?Sized> {
    pub host: &'a H,
    pub id: FieldId,
}

impl<'a, H: FieldNode + ?Sized> FieldScope<'a, H> {
    pub fn new(host: &'a H, id: FieldId) -> Self {
        Self { host, id }
    }
}

impl<H: FieldNode + ?Sized> Members for FieldScope<'_, H> {
    fn has_member(&self, name: &str) -> bool {
        locate(self.host, [name], self.id).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), 50)
    }
}

impl RetryPolicy {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            max_retries,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Ready,
    Pending,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    Found,
    Exhausted,
    Cancelled,
}

/// Polls for `name` on a parent. The first poll is the synchronous check;
/// every later absent check consumes one retry.
#[derive(Debug, Clone)]
pub struct ChildWait {
    name: String,
    policy: RetryPolicy,
    remaining: u32,
    next_check: std::time::Instant,
}

impl ChildWait {
    pub fn new(name: impl Into<String>, policy: RetryPolicy, now: std::time::Instant) -> Self {
        Self {
            name: name.into(),
            policy,
            remaining: policy.max_retries,
            next_check: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_check(&self) -> std::time::Instant {
        self.next_check
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn poll<M: Members + ?Sized>(&mut self, parent: &M, now: std::time::Instant) -> WaitStatus {
        if now < self.next_check {
            return WaitStatus::Pending;
        }
        if parent.has_member(&self.name) {
            return WaitStatus::Ready;
        }
        if self.remaining == 0 {
            return WaitStatus::Exhausted;
        }
        self.remaining -= 1;
        self.next_check = now + self.policy.interval;
        WaitStatus::Pending
    }
}

/// Run `callback` once `name` shows up on `parent`.
///
/// Gives up silently after the retry budget is spent. Sending `true` on the
/// cancel channel, or dropping its sender, abandons the wait. The member is
/// checked before the cancel flag, so a member that is already present is
/// reported as found even when the wait starts out cancelled.
pub async fn await_child<M, F>(
    parent: &M,
    name: &str,
    policy: RetryPolicy,
    mut cancel: watch::Receiver<bool>,
    callback: F,
) -> AwaitOutcome
where
    M: Members + ?Sized,
    F: FnOnce(),
{
    let mut wait = ChildWait::new(name, policy, TokioInstant::now().into_std());
    loop {
        match wait.poll(parent, TokioInstant::now().into_std()) {
            WaitStatus::Ready => {
                callback();
                return AwaitOutcome::Found;
            }
            WaitStatus::Exhausted => {
                tracing::debug!(member = name, "gave up waiting for member");
                return AwaitOutcome::Exhausted;
            }
            WaitStatus::Pending => {}
        }
        if *cancel.borrow_and_update() {
            return AwaitOutcome::Cancelled;
        }
        let deadline = TokioInstant::from_std(wait.next_check());
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            changed = cancel.changed() => {
                if changed.is_err() {
                    return AwaitOutcome::Cancelled;
                }
            }
        }
    }
}
