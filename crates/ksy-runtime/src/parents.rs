use std::any::{Any, type_name};
use std::fmt;

use crate::error::DecodeError;

/// The chain of records enclosing the one being decoded, nearest first.
///
/// A record type may be embedded by several other record types, so the
/// links are type-erased. Generated code knows which record types can
/// sit at each depth and recovers the concrete one with [`Parents::get`],
/// or tries each candidate against [`Parents::record`].
///
/// The chain lives on the decoding call stack: a record hands
/// `parents.push(self)` to its children and nothing is stored in the
/// decoded tree.
#[derive(Clone, Copy)]
pub struct Parents<'a> {
    record: &'a (dyn Any + 'static),
    up: Option<&'a Parents<'a>>,
}

impl<'a> Parents<'a> {
    /// Start a chain whose only link is `record`, the direct parent.
    #[must_use]
    pub fn new(record: &'a (dyn Any + 'static)) -> Self {
        Self { record, up: None }
    }

    /// Extend the chain by one level: `record` becomes the direct parent
    /// and every existing link moves one level further up.
    #[must_use]
    pub fn push<'b>(&'b self, record: &'b (dyn Any + 'static)) -> Parents<'b> {
        Parents {
            record,
            up: Some(self),
        }
    }

    /// The link `depth` levels up, where depth 1 is the direct parent.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MissingParent`] if the chain is shorter than `depth`.
    pub fn link(&self, depth: usize) -> Result<&Self, DecodeError> {
        if depth == 0 {
            return Err(DecodeError::MissingParent { depth });
        }
        let mut link = self;
        for _ in 1..depth {
            link = link.up.ok_or(DecodeError::MissingParent { depth })?;
        }
        Ok(link)
    }

    /// The record held by this link.
    #[must_use]
    pub fn record(&self) -> &'a (dyn Any + 'static) {
        self.record
    }

    /// The record `depth` levels up, as its concrete type.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MissingParent`] if the chain is too short and
    /// [`DecodeError::ParentMismatch`] if that ancestor is not a `T`.
    pub fn get<T: Any>(&self, depth: usize) -> Result<&'a T, DecodeError> {
        let record = self.link(depth)?.record;
        record.downcast_ref::<T>().ok_or(DecodeError::ParentMismatch {
            depth,
            expected: type_name::<T>(),
        })
    }

    /// Number of links in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut link = self;
        while let Some(up) = link.up {
            depth += 1;
            link = up;
        }
        depth
    }
}

impl fmt::Debug for Parents<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parents")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
