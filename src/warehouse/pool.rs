//! Bounded connection pool

use super::connection::{WarehouseConnection, WarehouseConnector};
use crate::error::Result;
use std::sync::{Arc, Mutex, PoisonError};

/// A free list of idle warehouse sessions
///
/// Checkout reuses an idle session or opens a new one, so the number of
/// live sessions is not capped; only the number kept idle is.
pub struct ConnectionPool {
    connector: Arc<dyn WarehouseConnector>,
    idle: Mutex<Vec<Box<dyn WarehouseConnection>>>,
    capacity: usize,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create a pool that keeps at most `capacity` idle sessions
    pub fn new(connector: Arc<dyn WarehouseConnector>, capacity: usize) -> Self {
        Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take an idle session, or open a new one
    pub fn checkout(&self) -> Result<Box<dyn WarehouseConnection>> {
        if let Some(conn) = self.lock().pop() {
            return Ok(conn);
        }
        tracing::debug!("Opening warehouse connection");
        self.connector.connect()
    }

    /// Return a healthy session; it is closed if the pool is already full
    pub fn checkin(&self, conn: Box<dyn WarehouseConnection>) {
        let mut idle = self.lock();
        if idle.len() < self.capacity {
            idle.push(conn);
        } else {
            drop(idle);
            tracing::debug!(capacity = self.capacity, "Pool full, closing connection");
            drop(conn);
        }
    }

    /// Close a session whose unit of work failed
    pub fn discard(&self, conn: Box<dyn WarehouseConnection>) {
        tracing::debug!("Discarding failed warehouse connection");
        drop(conn);
    }

    /// Number of idle sessions
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn WarehouseConnection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
