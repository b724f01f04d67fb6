//! Typed object pools.
//!
//! An object is either available (owned by the pool) or in use (owned by the
//! caller holding the [`Pooled`] wrapper), never both. The pool only tracks
//! tokens for lent objects, so releasing something it did not lend is a no-op.

use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide so a token never collides across re-registered pools.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Typed name of a registered pool.
pub struct PoolKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PoolKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for PoolKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolKey<T> {}

impl<T> fmt::Debug for PoolKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PoolKey").field(&self.name).finish()
    }
}

/// An object lent out by a pool.
#[derive(Debug)]
pub struct Pooled<T> {
    token: u64,
    value: T,
}

impl<T> Pooled<T> {
    /// Identity of this loan
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// What happened to a released object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Reset and pushed back onto the available stack
    Returned,
    /// Pool full; object dropped
    Discarded,
    /// Object was not lent by this pool (or the pool was cleared)
    Ignored,
}

/// Counters for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub max_size: usize,
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Reusable-object cache with a capability pair `{factory, reset}`.
pub struct ObjectPool<T> {
    available: Vec<T>,
    in_use: HashSet<u64>,
    factory: Factory<T>,
    reset: Reset<T>,
    max_size: usize,
    created: u64,
    reused: u64,
    discarded: u64,
}

impl<T> ObjectPool<T> {
    pub fn new<F, R>(factory: F, reset: R, max_size: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            available: Vec::with_capacity(max_size.min(1024)),
            in_use: HashSet::new(),
            factory: Box::new(factory),
            reset: Box::new(reset),
            max_size,
            created: 0,
            reused: 0,
            discarded: 0,
        }
    }

    /// Pop an available object or build a fresh one
    pub fn acquire(&mut self) -> Pooled<T> {
        let value = match self.available.pop() {
            Some(value) => {
                self.reused += 1;
                value
            },
            None => {
                self.created += 1;
                (self.factory)()
            },
        };

        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.in_use.insert(token);
        Pooled { token, value }
    }

    /// Take an object back
    pub fn release(&mut self, pooled: Pooled<T>) -> ReleaseOutcome {
        if !self.in_use.remove(&pooled.token) {
            return ReleaseOutcome::Ignored;
        }

        if self.available.len() < self.max_size {
            let mut value = pooled.value;
            (self.reset)(&mut value);
            self.available.push(value);
            ReleaseOutcome::Returned
        } else {
            self.discarded += 1;
            ReleaseOutcome::Discarded
        }
    }

    /// Drop every available object and forget every loan.
    ///
    /// Lent objects stay with their holders; releasing them later is ignored.
    pub fn clear(&mut self) {
        self.available.clear();
        self.in_use.clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.len(),
            in_use: self.in_use.len(),
            max_size: self.max_size,
            created: self.created,
            reused: self.reused,
            discarded: self.discarded,
        }
    }
}

/// Object-safe view of a pool so pools of different types share a registry.
pub(crate) trait ErasedPool: Send {
    fn stats(&self) -> PoolStats;
    fn clear(&mut self);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + 'static> ErasedPool for ObjectPool<T> {
    fn stats(&self) -> PoolStats {
        ObjectPool::stats(self)
    }

    fn clear(&mut self) {
        ObjectPool::clear(self);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
