//! The lifecycle of a single mutation.
//!
//! ```text
//!                   remote write ok / echoed snapshot
//!   AppliedOptimistic ─────────────────────────────────▶ Confirmed
//!          │
//!          │ remote write failed (rollback collections only)
//!          ▼
//!      RolledBack
//! ```
//!
//! Only the most recent mutation's state is tracked. Each queued write carries an [`Undo`] for its
//! own change, so a failed write can be reverted even after newer mutations. There is no undo stack.

use std::{
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::{FutureExt as _, channel::oneshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub(crate) u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationState {
    AppliedOptimistic,
    Confirmed,
    RolledBack,
}

/// How a mutation ended up, as reported by its [`Confirmation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The change was a no-op (for example, stale indices), so nothing was published or written.
    Unchanged,
    /// Applied and cached. There is no remote store to confirm it.
    LocalOnly,
    /// The remote store accepted the write.
    Confirmed,
    /// The remote write failed, and the optimistic value was left in place.
    KeptOptimistic,
    /// The remote write failed, and the entries it changed went back to their pre-mutation values.
    RolledBack,
    /// The collection shut down before the remote write finished.
    Abandoned,
}

pub(crate) struct PendingMutation<T> {
    id: MutationId,
    optimistic: Rc<T>,
    state: MutationState,
}

/// The values on either side of one mutation, kept with its queued write.
pub(crate) struct Undo<T> {
    pub(crate) id: MutationId,
    pub(crate) prior: Rc<T>,
    pub(crate) optimistic: Rc<T>,
}

impl<T> PendingMutation<T> {
    pub(crate) fn applied(id: MutationId, optimistic: Rc<T>) -> Self {
        Self {
            id,
            optimistic,
            state: MutationState::AppliedOptimistic,
        }
    }

    pub(crate) fn id(&self) -> MutationId {
        self.id
    }

    pub(crate) fn state(&self) -> MutationState {
        self.state
    }

    /// Returns whether this moved the mutation out of `AppliedOptimistic`.
    pub(crate) fn confirm(&mut self) -> bool {
        if self.state != MutationState::AppliedOptimistic {
            return false;
        }
        self.state = MutationState::Confirmed;
        true
    }

    /// Returns whether this moved the mutation out of `AppliedOptimistic`.
    pub(crate) fn roll_back(&mut self) -> bool {
        if self.state != MutationState::AppliedOptimistic {
            return false;
        }
        self.state = MutationState::RolledBack;
        true
    }
}

impl<T: PartialEq> PendingMutation<T> {
    /// Whether a remote snapshot carries exactly the value this mutation published.
    pub(crate) fn is_echoed_by(&self, value: &T) -> bool {
        *self.optimistic == *value
    }
}

/// Resolves once the remote store has accepted or refused a mutation.
///
/// The optimistic value is already visible by the time this is returned. Dropping it doesn't cancel the write.
#[must_use = "a Confirmation can be dropped, but then the outcome of the remote write is never seen"]
pub struct Confirmation {
    inner: ConfirmationInner,
}

enum ConfirmationInner {
    Ready(Option<MutationOutcome>),
    Pending(oneshot::Receiver<MutationOutcome>),
}

impl Confirmation {
    pub(crate) fn ready(outcome: MutationOutcome) -> Self {
        Self {
            inner: ConfirmationInner::Ready(Some(outcome)),
        }
    }

    pub(crate) fn pending(receiver: oneshot::Receiver<MutationOutcome>) -> Self {
        Self {
            inner: ConfirmationInner::Pending(receiver),
        }
    }
}

impl Future for Confirmation {
    type Output = MutationOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            ConfirmationInner::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(MutationOutcome::Abandoned))
            }
            ConfirmationInner::Pending(receiver) => receiver
                .poll_unpin(cx)
                .map(|outcome| outcome.unwrap_or(MutationOutcome::Abandoned)),
        }
    }
}

impl std::fmt::Debug for Confirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            ConfirmationInner::Ready(outcome) => f.debug_tuple("Confirmation").field(outcome).finish(),
            ConfirmationInner::Pending(_) => f.write_str("Confirmation(pending)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn confirm_then_rollback_is_refused() {
        let mut pending = PendingMutation::applied(MutationId(1), Rc::new(1));
        assert_eq!(pending.state(), MutationState::AppliedOptimistic);

        assert!(pending.confirm());
        assert_eq!(pending.state(), MutationState::Confirmed);
        assert!(!pending.confirm());
        assert!(!pending.roll_back());
    }

    #[test]
    fn rollback_happens_once() {
        let mut pending = PendingMutation::applied(MutationId(7), Rc::new("after"));
        assert!(pending.is_echoed_by(&"after"));
        assert!(!pending.is_echoed_by(&"before"));

        assert!(pending.roll_back());
        assert_eq!(pending.state(), MutationState::RolledBack);
        assert!(!pending.roll_back());
        assert!(!pending.confirm());
    }

    #[test]
    fn dropped_sender_resolves_as_abandoned() {
        let (sender, receiver) = oneshot::channel();
        drop(sender);
        assert_eq!(
            block_on(Confirmation::pending(receiver)),
            MutationOutcome::Abandoned
        );
        assert_eq!(
            block_on(Confirmation::ready(MutationOutcome::LocalOnly)),
            MutationOutcome::LocalOnly
        );
    }
}
