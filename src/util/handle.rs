//! Shared ownership for game entities
//!
//! Every entity the game thread hands out (creatures, players, tiles,
//! containers, caster and spectator sessions) is held through a
//! `SharedHandle`. The referent lives as long as its longest holder and is
//! dropped exactly once, the moment the last handle goes away.
//!
//! Handles are built on `Rc` and are therefore `!Send`: they can only exist
//! on the thread that owns the game context. Work coming from the I/O side
//! carries ids and looks entities up again when it runs.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

/// Nullable, reference-counted handle to a game entity
pub struct SharedHandle<T: ?Sized> {
    inner: Option<Rc<T>>,
}

impl<T> SharedHandle<T> {
    /// Take ownership of a fresh entity
    pub fn new(value: T) -> Self {
        Self {
            inner: Some(Rc::new(value)),
        }
    }
}

impl<T: ?Sized> SharedHandle<T> {
    /// A handle with no referent
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    pub fn from_rc(rc: Rc<T>) -> Self {
        Self { inner: Some(rc) }
    }

    pub fn is_some(&self) -> bool {
        self.inner.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Borrow the referent, if any
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.inner.as_deref()
    }

    /// Move the referent out, leaving this handle empty
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Release this holder's reference
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Number of live handles sharing the referent (0 when empty)
    pub fn holders(&self) -> usize {
        self.inner.as_ref().map_or(0, Rc::strong_count)
    }

    /// True when both handles point at the same entity
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            inner: self.inner.as_ref().map(Rc::downgrade),
        }
    }

    /// Convert to a handle of a related type, transferring this reference.
    ///
    /// Used for upcasts to trait objects, e.g.
    /// `player.coerce(|rc| rc as Rc<dyn Creature>)`.
    pub fn coerce<U: ?Sized>(self, cast: impl FnOnce(Rc<T>) -> Rc<U>) -> SharedHandle<U> {
        SharedHandle {
            inner: self.inner.map(cast),
        }
    }
}

impl SharedHandle<dyn Any> {
    /// Recover the concrete type. On mismatch the original handle is returned.
    pub fn downcast<U: Any>(self) -> Result<SharedHandle<U>, Self> {
        match self.inner {
            Some(rc) => match rc.downcast::<U>() {
                Ok(concrete) => Ok(SharedHandle::from_rc(concrete)),
                Err(rc) => Err(SharedHandle::from_rc(rc)),
            },
            None => Err(SharedHandle::empty()),
        }
    }
}

impl<T: ?Sized> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> Default for SharedHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> From<Rc<T>> for SharedHandle<T> {
    fn from(rc: Rc<T>) -> Self {
        Self::from_rc(rc)
    }
}

impl<T: ?Sized> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(rc) => write!(f, "SharedHandle({:p}, holders={})", Rc::as_ptr(rc), Rc::strong_count(rc)),
            None => write!(f, "SharedHandle(empty)"),
        }
    }
}

/// Non-owning back reference; never keeps the entity alive
pub struct WeakHandle<T: ?Sized> {
    inner: Option<Weak<T>>,
}

impl<T: ?Sized> WeakHandle<T> {
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// Returns an empty handle once the entity has been destroyed
    pub fn upgrade(&self) -> SharedHandle<T> {
        SharedHandle {
            inner: self.inner.as_ref().and_then(Weak::upgrade),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized> Default for WeakHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakHandle(alive={})", self.is_alive())
    }
}
