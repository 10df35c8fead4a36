//! Pool-tracked resource instances and their identifiers

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pool-assigned identity of one resource instance.
///
/// Unique for the lifetime of the owning pool and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A resource instance lent out by [`Pool::acquire`](crate::Pool::acquire).
///
/// Dereferences to the instance. Hand it back with
/// [`Pool::release`](crate::Pool::release); dropping it instead keeps the
/// instance counted as checked out until the pool shuts down. The pool
/// retains its own handle so shutdown can tear the instance down, so the
/// value must not be used after release or shutdown.
pub struct Managed<T> {
    id: InstanceId,
    instance: Arc<T>,
}

impl<T> Managed<T> {
    pub(crate) fn new(id: InstanceId, instance: Arc<T>) -> Self {
        Self { id, instance }
    }

    /// The pool-assigned identifier of this instance.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }
}

impl<T> std::ops::Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T> AsRef<T> for Managed<T> {
    fn as_ref(&self) -> &T {
        &self.instance
    }
}

impl<T: fmt::Debug> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn managed_deref() {
        let managed = Managed::new(InstanceId::new(), Arc::new(42u32));
        assert_eq!(*managed, 42);
        assert_eq!(*managed.as_ref(), 42);
    }

    #[test]
    fn managed_keeps_its_id() {
        let id = InstanceId::new();
        let managed = Managed::new(id, Arc::new(String::from("conn")));
        assert_eq!(managed.id(), id);
        assert_eq!(managed.len(), 4);
    }

    #[test]
    fn display_matches_uuid() {
        let id = InstanceId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }
}
