//! The ordered, append-only-with-undo sequence of operations.
//!
//! Insertion order is application order. The only removal is of the most
//! recently appended operation, so the log behaves as a stack from the
//! editor's point of view and as a sequence from the evaluator's.

use std::sync::Arc;

use crate::operation::Operation;

/// An ordered sequence of [`Operation`]s with LIFO undo.
///
/// Arbitrary index removal is deliberately absent: editing a step means
/// popping back to it and re-appending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationLog {
    operations: Vec<Operation>,
}

impl OperationLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Append an operation to the end of the log.
    pub fn append(&mut self, operation: Operation) {
        log::trace!("log append #{}: {operation}", self.operations.len());
        self.operations.push(operation);
    }

    /// Remove the most recently appended operation.
    ///
    /// Returns `true` if an operation was removed, `false` if the log was
    /// already empty. Never fails.
    pub fn remove_last(&mut self) -> bool {
        let removed = self.operations.pop();
        if let Some(ref op) = removed {
            log::trace!("log remove #{}: {op}", self.operations.len());
        }
        removed.is_some()
    }

    /// An order-preserving, read-only snapshot for evaluation.
    ///
    /// The snapshot owns its own copy of the operations, so later edits
    /// to the log never affect an evaluation already holding it.
    #[must_use]
    pub fn to_sequence(&self) -> Arc<[Operation]> {
        Arc::from(self.operations.as_slice())
    }

    /// Number of operations in the log.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the log holds no operations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The most recently appended operation, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Operation> {
        self.operations.last()
    }

    /// Iterate over the operations in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }
}

impl<'a> IntoIterator for &'a OperationLog {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Operation> for OperationLog {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}
