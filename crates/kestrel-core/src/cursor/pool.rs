//! Two-tier cursor pool
//!
//! ```text
//!   acquire                                   release
//!      │                                         │
//!      ▼                                         ▼
//! ┌──────────────┐  miss  ┌───────────────┐ ┌──────────────┐ occupied ┌───────────────┐
//! │ thread-local │ ─────► │ shared (lock) │ │ thread-local │ ───────► │ shared (lock) │
//! │  one slot    │        │  or factory   │ │  one slot    │          │  or discard   │
//! └──────────────┘        └───────────────┘ └──────────────┘          └───────────────┘
//! ```
//!
//! The thread-local tier holds at most one cursor per pool per thread and is
//! reached without locking. Its slots belong to the pool, so dropping the pool
//! drops the cursors parked by every thread. The shared tier is a
//! mutex-guarded stack bounded by `min_shared_size`; it is the only place
//! cursors are created, and releases that find it full are discarded there.

use crate::config::PoolConfig;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thread_local::ThreadLocal;

/// Cursors that can be returned to a pool
pub trait PoolableCursor: Send + 'static {
    /// Drop every binding so no state leaks to the next user
    fn reset(&mut self);
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Pool activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Cursors built by the factory
    pub created: u64,
    /// Acquisitions served from the shared tier
    pub reused: u64,
    /// Acquisitions served from the thread-local tier
    pub local_hits: u64,
    /// Releases dropped because the shared tier was full or the pool disposed
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    reused: AtomicU64,
    local_hits: AtomicU64,
    discarded: AtomicU64,
}

/// Pool of reusable cursors of one kind
pub struct CursorPool<C: PoolableCursor> {
    id: u64,
    shared: Mutex<Vec<C>>,
    /// One parked cursor per thread
    local: ThreadLocal<RefCell<Option<C>>>,
    min_shared_size: usize,
    thread_local: bool,
    disposed: AtomicBool,
    factory: Box<dyn Fn() -> C + Send + Sync>,
    counters: Counters,
}

impl<C: PoolableCursor> CursorPool<C> {
    /// Pool that builds new cursors with `factory`
    pub fn new(config: &PoolConfig, factory: impl Fn() -> C + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            shared: Mutex::new(Vec::with_capacity(config.min_shared_size)),
            local: ThreadLocal::new(),
            min_shared_size: config.min_shared_size,
            thread_local: config.enable_thread_local,
            disposed: AtomicBool::new(false),
            factory: Box::new(factory),
            counters: Counters::default(),
        })
    }

    /// Take a cursor, creating one when both tiers are empty
    ///
    /// The cursor is reset; bind it with one of its `init*` methods.
    pub fn acquire(self: &Arc<Self>) -> Pooled<C> {
        let cursor = self.take_local().unwrap_or_else(|| self.take_shared());
        Pooled {
            cursor: Some(cursor),
            pool: Arc::clone(self),
        }
    }

    fn take_local(&self) -> Option<C> {
        if !self.thread_local {
            return None;
        }
        let parked = self.local.get()?.borrow_mut().take();
        if self.is_disposed() {
            return None;
        }
        let cursor = parked?;
        self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
        Some(cursor)
    }

    fn take_shared(&self) -> C {
        if let Some(cursor) = self.shared.lock().pop() {
            self.counters.reused.fetch_add(1, Ordering::Relaxed);
            return cursor;
        }
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        (self.factory)()
    }

    /// Return a cursor; it is reset before it becomes visible to others
    fn release(&self, mut cursor: C) {
        cursor.reset();
        if self.is_disposed() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let cursor = if self.thread_local {
            match self.put_local(cursor) {
                Ok(()) => return,
                Err(cursor) => cursor,
            }
        } else {
            cursor
        };

        let mut shared = self.shared.lock();
        if shared.len() < self.min_shared_size {
            shared.push(cursor);
        } else {
            drop(shared);
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(pool = self.id, "shared cursor pool full, discarding cursor");
        }
    }

    fn put_local(&self, cursor: C) -> std::result::Result<(), C> {
        let mut slot = self.local.get_or(|| RefCell::new(None)).borrow_mut();
        if slot.is_some() {
            return Err(cursor);
        }
        *slot = Some(cursor);
        Ok(())
    }

    /// Drop every pooled cursor and stop retaining released ones
    ///
    /// The shared tier and the calling thread's slot are emptied at once.
    /// Cursors parked by other threads are dropped when those threads next
    /// acquire from this pool, or with the pool itself. Acquiring after
    /// disposal still works but nothing is pooled again.
    pub fn dispose_all(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut shared = self.shared.lock();
            let count = shared.len();
            shared.clear();
            count
        };
        let dropped = dropped
            + self
                .local
                .get()
                .and_then(|slot| slot.borrow_mut().take())
                .map_or(0, |_| 1);
        tracing::debug!(pool = self.id, dropped, "cursor pool disposed");
    }

    /// Whether [`dispose_all`](Self::dispose_all) was called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Cursors currently held by the shared tier
    pub fn shared_len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<C: PoolableCursor> fmt::Debug for CursorPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorPool")
            .field("id", &self.id)
            .field("min_shared_size", &self.min_shared_size)
            .field("thread_local", &self.thread_local)
            .field("disposed", &self.is_disposed())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A cursor on loan from a [`CursorPool`]
///
/// Dereferences to the cursor. Dropping the guard (or calling
/// [`close`](Self::close)) resets the cursor and hands it back.
pub struct Pooled<C: PoolableCursor> {
    cursor: Option<C>,
    pool: Arc<CursorPool<C>>,
}

impl<C: PoolableCursor> Pooled<C> {
    /// Reset the cursor and return it to its pool
    pub fn close(self) {
        drop(self);
    }
}

impl<C: PoolableCursor> Deref for Pooled<C> {
    type Target = C;

    fn deref(&self) -> &C {
        match &self.cursor {
            Some(cursor) => cursor,
            None => unreachable!("pooled cursor taken before drop"),
        }
    }
}

impl<C: PoolableCursor> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut C {
        match &mut self.cursor {
            Some(cursor) => cursor,
            None => unreachable!("pooled cursor taken before drop"),
        }
    }
}

impl<C: PoolableCursor> Drop for Pooled<C> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.pool.release(cursor);
        }
    }
}

impl<C: PoolableCursor + fmt::Debug> fmt::Debug for Pooled<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.cursor).finish()
    }
}
