//! Per-source reader/writer locks.
//!
//! Every operation takes the locks of the sources it touches before doing
//! any backend work: searches and loads take read locks, mutations take
//! write locks. Acquisition is bounded; an operation that cannot get a
//! lock within the timeout fails instead of queueing forever behind a
//! stuck writer.

use crate::error::Error;
use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// Default lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds a read lock on one source for the guard's lifetime.
pub type SourceReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Holds a write lock on one source for the guard's lifetime.
pub type SourceWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Registry of per-source reader/writer locks, keyed by source name.
///
/// Locks are created lazily on first use and never removed; the set of
/// source names is small and fixed by configuration.
pub struct SourceLocks {
    locks: DashMap<String, Arc<RwLock<()>>>,
    timeout: Duration,
}

impl SourceLocks {
    /// Create a registry with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a registry with an explicit acquisition timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    fn lock_for(&self, source: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Take a read lock on one source.
    pub fn read(&self, source: &str) -> Result<SourceReadGuard, Error> {
        let lock = self.lock_for(source);
        RwLock::try_read_arc_for(&lock, self.timeout)
            .ok_or_else(|| Error::LockTimeout(source.to_string()))
    }

    /// Take a write lock on one source.
    pub fn write(&self, source: &str) -> Result<SourceWriteGuard, Error> {
        let lock = self.lock_for(source);
        RwLock::try_write_arc_for(&lock, self.timeout)
            .ok_or_else(|| Error::LockTimeout(source.to_string()))
    }

    /// Take read locks on several sources.
    ///
    /// Names are sorted and deduplicated first so two operations locking
    /// overlapping source sets cannot deadlock each other.
    pub fn read_all<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<SourceReadGuard>, Error> {
        let mut guards = Vec::new();
        for source in ordered(sources) {
            guards.push(self.read(&source)?);
        }
        Ok(guards)
    }

    /// Take write locks on several sources, in sorted order.
    pub fn write_all<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<SourceWriteGuard>, Error> {
        let mut guards = Vec::new();
        for source in ordered(sources) {
            guards.push(self.write(&source)?);
        }
        Ok(guards)
    }
}

impl Default for SourceLocks {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered<'a>(sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = sources.into_iter().map(str::to_string).collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_readers() {
        let locks = SourceLocks::new();
        let a = locks.read("db_users").unwrap();
        let b = locks.read("db_users").unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn writer_blocks_reader_until_timeout() {
        let locks = SourceLocks::with_timeout(Duration::from_millis(20));
        let _w = locks.write("db_users").unwrap();
        match locks.read("db_users") {
            Err(Error::LockTimeout(source)) => assert_eq!(source, "db_users"),
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn write_released_on_drop() {
        let locks = SourceLocks::with_timeout(Duration::from_millis(20));
        {
            let _w = locks.write("db_users").unwrap();
        }
        assert!(locks.write("db_users").is_ok());
    }

    #[test]
    fn write_all_dedups() {
        let locks = SourceLocks::with_timeout(Duration::from_millis(20));
        let guards = locks
            .write_all(["db_emails", "db_users", "db_emails"])
            .unwrap();
        assert_eq!(guards.len(), 2);
    }

    #[test]
    fn independent_sources_do_not_contend() {
        let locks = SourceLocks::with_timeout(Duration::from_millis(20));
        let _w = locks.write("db_users").unwrap();
        assert!(locks.write("db_emails").is_ok());
    }
}
