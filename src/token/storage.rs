//! Credential Storage
//!
//! Adapter over the host's per-node credential store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{OAuth2Error, StorageError};
use crate::types::Credentials;

/// Credential store interface, keyed by node id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the record for a node.
    async fn get(&self, key: &str) -> Result<Option<Credentials>, OAuth2Error>;

    /// Replace the record for a node.
    async fn put(&self, key: &str, credentials: Credentials) -> Result<(), OAuth2Error>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory credential store implementation.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<HashMap<String, Credentials>>,
}

impl InMemoryCredentialStore {
    /// Create new in-memory credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<Credentials>, OAuth2Error> {
        Ok(lock(&self.records).get(key).cloned())
    }

    async fn put(&self, key: &str, credentials: Credentials) -> Result<(), OAuth2Error> {
        lock(&self.records).insert(key.to_string(), credentials);
        Ok(())
    }
}

/// Mock credential store for testing.
#[derive(Default)]
pub struct MockCredentialStore {
    records: Mutex<HashMap<String, Credentials>>,
    put_history: Mutex<Vec<(String, Credentials)>>,
    get_history: Mutex<Vec<String>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MockCredentialStore {
    /// Create new mock credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record.
    pub fn add_credentials(&self, key: &str, credentials: Credentials) -> &Self {
        lock(&self.records).insert(key.to_string(), credentials);
        self
    }

    /// Make every read fail.
    pub fn set_fail_reads(&self, fail: bool) -> &Self {
        *lock(&self.fail_reads) = fail;
        self
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) -> &Self {
        *lock(&self.fail_writes) = fail;
        self
    }

    /// Get put history.
    pub fn get_put_history(&self) -> Vec<(String, Credentials)> {
        lock(&self.put_history).clone()
    }

    /// Get read history.
    pub fn get_read_history(&self) -> Vec<String> {
        lock(&self.get_history).clone()
    }

    /// Current record for a node, without recording a read.
    pub fn snapshot(&self, key: &str) -> Option<Credentials> {
        lock(&self.records).get(key).cloned()
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<Credentials>, OAuth2Error> {
        if *lock(&self.fail_reads) {
            return Err(StorageError::ReadFailed {
                message: format!("mock read failure for {}", key),
            }
            .into());
        }
        lock(&self.get_history).push(key.to_string());
        Ok(lock(&self.records).get(key).cloned())
    }

    async fn put(&self, key: &str, credentials: Credentials) -> Result<(), OAuth2Error> {
        if *lock(&self.fail_writes) {
            return Err(StorageError::WriteFailed {
                message: format!("mock write failure for {}", key),
            }
            .into());
        }
        lock(&self.put_history).push((key.to_string(), credentials.clone()));
        lock(&self.records).insert(key.to_string(), credentials);
        Ok(())
    }
}

/// Create in-memory credential store.
pub fn create_in_memory_credential_store() -> InMemoryCredentialStore {
    InMemoryCredentialStore::new()
}

/// Create mock credential store for testing.
pub fn create_mock_credential_store() -> MockCredentialStore {
    MockCredentialStore::new()
}
