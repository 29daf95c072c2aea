//! Short-lived entity locks
//!
//! Readers take a read lock on a node or relationship while they resolve its
//! property chain head, then hold it until the property cursor closes. A
//! concurrent writer holding the write lock keeps readers out of the
//! half-written record. Deployments that serialize writers elsewhere install
//! [`NoOpLockService`] instead.

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Entity type for locking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Node resource
    Node,
    /// Relationship resource
    Relationship,
}

/// Lockable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Entity type
    pub resource_type: ResourceType,
    /// Entity id
    pub id: u64,
}

impl ResourceId {
    /// A node resource
    pub fn node(id: u64) -> Self {
        Self {
            resource_type: ResourceType::Node,
            id,
        }
    }

    /// A relationship resource
    pub fn relationship(id: u64) -> Self {
        Self {
            resource_type: ResourceType::Relationship,
            id,
        }
    }
}

/// Source of entity locks used by cursors
pub trait LockService: Send + Sync + Debug {
    /// Take a shared lock, waiting for a conflicting writer
    fn acquire_read(&self, resource: ResourceId) -> Result<EntityLockGuard>;

    /// Take an exclusive lock, waiting for every other holder
    fn acquire_write(&self, resource: ResourceId) -> Result<EntityLockGuard>;
}

/// Lock service that never blocks and holds nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLockService;

impl LockService for NoOpLockService {
    fn acquire_read(&self, _resource: ResourceId) -> Result<EntityLockGuard> {
        Ok(EntityLockGuard::unlocked())
    }

    fn acquire_write(&self, _resource: ResourceId) -> Result<EntityLockGuard> {
        Ok(EntityLockGuard::unlocked())
    }
}

#[derive(Debug, Clone, Copy)]
struct LockHolder {
    token: u64,
    is_write: bool,
    acquired_at: Instant,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: RwLock<HashMap<ResourceId, Vec<LockHolder>>>,
    next_token: AtomicU64,
}

impl LockTable {
    fn release(&self, token: u64, resource: ResourceId) {
        let mut locks = self.locks.write();
        if let Some(holders) = locks.get_mut(&resource) {
            if let Some(holder) = holders.iter().find(|h| h.token == token) {
                tracing::trace!(
                    ?resource,
                    held_us = holder.acquired_at.elapsed().as_micros() as u64,
                    "entity lock released"
                );
            }
            holders.retain(|h| h.token != token);
            if holders.is_empty() {
                locks.remove(&resource);
            }
        }
    }
}

/// Row-level lock service over an in-memory lock table
#[derive(Debug, Clone)]
pub struct RowLockService {
    table: Arc<LockTable>,
    timeout: Duration,
}

impl RowLockService {
    /// Create a lock service with the given wait timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(LockTable::default()),
            timeout,
        }
    }

    fn acquire(&self, resource: ResourceId, is_write: bool, timeout: Duration) -> Result<EntityLockGuard> {
        let start = Instant::now();
        let token = self.table.next_token.fetch_add(1, Ordering::Relaxed);

        loop {
            {
                let mut locks = self.table.locks.write();
                let conflict = locks
                    .get(&resource)
                    .is_some_and(|holders| holders.iter().any(|h| is_write || h.is_write));

                if !conflict {
                    locks.entry(resource).or_default().push(LockHolder {
                        token,
                        is_write,
                        acquired_at: Instant::now(),
                    });
                    return Ok(EntityLockGuard {
                        held: Some(HeldLock {
                            table: Arc::clone(&self.table),
                            token,
                            resource,
                        }),
                    });
                }
            }

            if start.elapsed() >= timeout {
                let kind = if is_write { "write" } else { "read" };
                tracing::warn!(?resource, kind, "entity lock timed out");
                return Err(Error::LockTimeout(format!(
                    "Failed to acquire {} lock on {:?} within {:?}",
                    kind, resource, timeout
                )));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Take an exclusive lock with an explicit timeout
    pub fn acquire_write_with_timeout(
        &self,
        resource: ResourceId,
        timeout: Duration,
    ) -> Result<EntityLockGuard> {
        self.acquire(resource, true, timeout)
    }

    /// Take a shared lock with an explicit timeout
    pub fn acquire_read_with_timeout(
        &self,
        resource: ResourceId,
        timeout: Duration,
    ) -> Result<EntityLockGuard> {
        self.acquire(resource, false, timeout)
    }

    /// Current lock table statistics
    pub fn stats(&self) -> LockStats {
        let locks = self.table.locks.read();
        let holders = locks.values().flatten();
        let (mut read_locks, mut write_locks) = (0, 0);
        for holder in holders {
            if holder.is_write {
                write_locks += 1;
            } else {
                read_locks += 1;
            }
        }
        LockStats {
            total_resources: locks.len(),
            read_locks,
            write_locks,
        }
    }
}

impl Default for RowLockService {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl LockService for RowLockService {
    fn acquire_read(&self, resource: ResourceId) -> Result<EntityLockGuard> {
        self.acquire(resource, false, self.timeout)
    }

    fn acquire_write(&self, resource: ResourceId) -> Result<EntityLockGuard> {
        self.acquire(resource, true, self.timeout)
    }
}

#[derive(Debug)]
struct HeldLock {
    table: Arc<LockTable>,
    token: u64,
    resource: ResourceId,
}

/// Lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct EntityLockGuard {
    held: Option<HeldLock>,
}

impl EntityLockGuard {
    /// A guard that holds nothing
    pub fn unlocked() -> Self {
        Self { held: None }
    }

    /// Whether a real lock is held
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Release now instead of at drop
    pub fn release(&mut self) {
        if let Some(held) = self.held.take() {
            held.table.release(held.token, held.resource);
        }
    }
}

impl Drop for EntityLockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Lock statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStats {
    /// Resources with at least one holder
    pub total_resources: usize,
    /// Shared holders
    pub read_locks: usize,
    /// Exclusive holders
    pub write_locks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_locks_are_shared() {
        let service = RowLockService::default();
        let resource = ResourceId::node(1);

        let guard1 = service.acquire_read(resource).unwrap();
        let guard2 = service.acquire_read(resource).unwrap();

        let stats = service.stats();
        assert_eq!(stats.total_resources, 1);
        assert_eq!(stats.read_locks, 2);

        drop(guard1);
        drop(guard2);
        assert_eq!(service.stats().total_resources, 0);
    }

    #[test]
    fn test_writer_blocks_reader() {
        let service = RowLockService::default();
        let resource = ResourceId::node(1);

        let write = service.acquire_write(resource).unwrap();
        let result = service.acquire_read_with_timeout(resource, Duration::from_millis(20));
        assert!(matches!(result, Err(Error::LockTimeout(_))));

        drop(write);
        assert!(service.acquire_read(resource).is_ok());
    }

    #[test]
    fn test_reader_blocks_writer() {
        let service = RowLockService::default();
        let resource = ResourceId::relationship(4);

        let read = service.acquire_read(resource).unwrap();
        assert!(
            service
                .acquire_write_with_timeout(resource, Duration::from_millis(20))
                .is_err()
        );
        drop(read);
        assert!(service.acquire_write(resource).is_ok());
    }

    #[test]
    fn test_distinct_resources_do_not_conflict() {
        let service = RowLockService::default();
        let _a = service.acquire_write(ResourceId::node(1)).unwrap();
        let _b = service.acquire_write(ResourceId::node(2)).unwrap();
        let _c = service.acquire_write(ResourceId::relationship(1)).unwrap();
        assert_eq!(service.stats().write_locks, 3);
    }

    #[test]
    fn test_explicit_release_is_idempotent() {
        let service = RowLockService::default();
        let mut guard = service.acquire_read(ResourceId::node(3)).unwrap();
        assert!(guard.is_held());
        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert_eq!(service.stats().total_resources, 0);
    }

    #[test]
    fn test_noop_service_holds_nothing() {
        let service = NoOpLockService;
        let guard = service.acquire_write(ResourceId::node(1)).unwrap();
        assert!(!guard.is_held());
    }
}
