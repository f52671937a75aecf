//! Client registry
//!
//! The table of currently admitted clients keyed by username. Owned by the
//! relay actor, so every insert/remove is serialized through one task.

use std::collections::HashMap;

use crate::client::Client;

/// Live clients, iterable in admission order
#[derive(Debug, Default)]
pub struct Registry {
    /// username -> Client
    clients: HashMap<String, Client>,
    /// Usernames in admission order
    order: Vec<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a client
    ///
    /// The caller must have confirmed the name is free in the same step.
    pub fn add(&mut self, client: Client) {
        let username = client.username.clone();
        if self.clients.insert(username.clone(), client).is_none() {
            self.order.push(username);
        }
    }

    /// Remove a client by name; no-op if absent
    pub fn remove(&mut self, username: &str) -> Option<Client> {
        let removed = self.clients.remove(username)?;
        self.order.retain(|name| name != username);
        Some(removed)
    }

    /// Look up a client by exact name
    pub fn find(&self, username: &str) -> Option<&Client> {
        self.clients.get(username)
    }

    /// Check whether a name is registered
    pub fn contains(&self, username: &str) -> bool {
        self.clients.contains_key(username)
    }

    /// Point-in-time copy of all clients, in admission order
    ///
    /// Broadcasts iterate this copy, so sends never hold the registry.
    pub fn snapshot(&self) -> Vec<Client> {
        self.order
            .iter()
            .filter_map(|name| self.clients.get(name))
            .cloned()
            .collect()
    }

    /// Registered usernames, in admission order
    pub fn usernames(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Drop every entry (full shutdown only)
    pub fn clear(&mut self) {
        self.clients.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
