use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::SchedError;

/// Something that can look up live objects by stable identifier, typically the
/// process Context.
pub trait Resolve<T> {
    fn resolve(&self, id: &str) -> Option<T>;
}

/// Serializable reference to an object owned by the outside world.
///
/// Memoize a `Handle` instead of the object itself; after replay the handle is
/// resolved against the current Context on every access.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Handle<T> {
    id: String,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look the object up again. Fails loudly when it has gone away.
    pub fn resolve<R>(&self, source: &R) -> Result<T, SchedError>
    where
        R: Resolve<T> + ?Sized,
    {
        source
            .resolve(&self.id)
            .ok_or_else(|| SchedError::UnresolvedHandle {
                kind: std::any::type_name::<T>(),
                id: self.id.clone(),
            })
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id).finish()
    }
}
