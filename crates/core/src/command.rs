//! Command contracts
//!
//! A command is a unit of deferred work. Its identity is defined by the
//! producer through `Eq` + `Hash`: two equal commands are the same logical
//! reaction, regardless of which instance carries the payload.

use std::fmt::Debug;
use std::hash::Hash;

/// A schedulable reaction
///
/// Equality and hash must stay stable while the command sits in the
/// scheduler's pending set. Payload fields that change between submissions
/// must not take part in either.
pub trait Command: Debug + Eq + Hash + Send + Sync + Sized + 'static {
    /// Perform the reaction
    ///
    /// Errors (and panics) are caught by the runner and reported to the
    /// scheduler's observer; they never reach the producer.
    fn execute(&self) -> anyhow::Result<()>;

    /// Query the merge capability of this command
    ///
    /// Commands that can absorb an equal command return `Some(self)`.
    /// The scheduler resolves this once per upsert.
    fn as_mergeable(&self) -> Option<&dyn MergeableCommand<Self>> {
        None
    }
}

/// A command that can absorb an equal command
pub trait MergeableCommand<C: Command> {
    /// Combine `self` (the pending command) with `incoming`
    ///
    /// Only ever called with an `incoming` command equal to `self`. The
    /// result must stay equal to both and carry the union of their pending
    /// effects, so repeated merges converge on everything submitted since
    /// the command was first scheduled.
    fn merge(&self, incoming: C) -> C;
}
