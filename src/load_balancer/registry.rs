//! Server registry.
//!
//! # Responsibilities
//! - Own the catalog of registered servers and their health
//! - Linearize every mutation behind one writer lock
//! - Hand out immutable, id-ordered snapshots for selection
//!
//! Readers never take the writer lock: a snapshot is an `Arc` loaded from an
//! `ArcSwap`, and writers publish a fresh copy on every change.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::error::{BalancerError, Result};
use crate::load_balancer::server::{Health, Server, ServerId};

/// Point-in-time view of the registry, ordered by server id.
pub type Snapshot = Arc<Vec<Server>>;

/// Outcome of [`ServerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
}

/// Thread-safe catalog of backend servers.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: ArcSwap<Vec<Server>>,
    write_lock: Mutex<()>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            servers: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a new server. Fails if the id is taken or the weight is zero.
    pub fn add(&self, server: Server) -> Result<()> {
        check_weight(&server)?;
        self.mutate(|servers| match position(servers, &server.id) {
            Ok(_) => Err(BalancerError::DuplicateId(server.id.clone())),
            Err(index) => {
                let mut server = server;
                server.health = Health::initial();
                servers.insert(index, server);
                Ok(())
            }
        })
    }

    /// Insert or re-register a server.
    ///
    /// Re-registering an existing id replaces its address, weight and metadata
    /// but keeps the accumulated health history.
    pub fn register(&self, server: Server) -> Result<Registration> {
        check_weight(&server)?;
        self.mutate(|servers| match position(servers, &server.id) {
            Ok(index) => {
                let existing = &mut servers[index];
                existing.host = server.host;
                existing.port = server.port;
                existing.weight = server.weight;
                existing.metadata = server.metadata;
                Ok(Registration::Updated)
            }
            Err(index) => {
                let mut server = server;
                server.health = Health::initial();
                servers.insert(index, server);
                Ok(Registration::Created)
            }
        })
    }

    /// Remove a server, returning its last known state.
    pub fn remove(&self, id: &ServerId) -> Result<Server> {
        self.mutate(|servers| match position(servers, id) {
            Ok(index) => Ok(servers.remove(index)),
            Err(_) => Err(BalancerError::NotFound(id.clone())),
        })
    }

    /// Replace the health snapshot of a server.
    pub fn update_health(&self, id: &ServerId, health: Health) -> Result<()> {
        self.mutate(|servers| match position(servers, id) {
            Ok(index) => {
                servers[index].health = health;
                Ok(())
            }
            Err(_) => Err(BalancerError::NotFound(id.clone())),
        })
    }

    /// Compute and store a server's next health under the writer lock.
    ///
    /// `f` sees the live entry. Returning `None` leaves the registry as it was.
    pub fn update_health_with<T>(
        &self,
        id: &ServerId,
        f: impl FnOnce(&Server) -> Option<(Health, T)>,
    ) -> Result<Option<(Server, T)>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.servers.load_full();
        let index = position(&current, id).map_err(|_| BalancerError::NotFound(id.clone()))?;
        let Some((health, out)) = f(&current[index]) else {
            return Ok(None);
        };

        let mut next = Vec::clone(&current);
        next[index].health = health;
        let updated = next[index].clone();
        self.servers.store(Arc::new(next));
        Ok(Some((updated, out)))
    }

    /// Consistent, immutable copy of every registered server.
    pub fn snapshot(&self) -> Snapshot {
        self.servers.load_full()
    }

    pub fn get(&self, id: &ServerId) -> Option<Server> {
        let servers = self.servers.load();
        position(&servers, id).ok().map(|index| servers[index].clone())
    }

    pub fn len(&self) -> usize {
        self.servers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn healthy_count(&self) -> usize {
        self.servers.load().iter().filter(|s| s.is_healthy()).count()
    }

    /// Apply `f` to a private copy and publish it if `f` succeeds.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Server>) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&self.servers.load());
        let out = f(&mut next)?;
        self.servers.store(Arc::new(next));
        Ok(out)
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn position(servers: &[Server], id: &ServerId) -> std::result::Result<usize, usize> {
    servers.binary_search_by(|s| s.id.cmp(id))
}

fn check_weight(server: &Server) -> Result<()> {
    if server.weight == 0 {
        return Err(BalancerError::InvalidWeight {
            id: server.id.clone(),
        });
    }
    Ok(())
}
