//! In-memory record storage shared by every product module.
//!
//! A [`Collection`] is a map of records keyed by id. Every read and write is
//! scoped to a tenant (the company id carried by the caller's session), so a
//! record owned by another tenant is indistinguishable from a missing one.

pub mod stats;

#[doc(hidden)]
pub mod __private {
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },
    #[error("{kind} conflicts with {existing}")]
    Conflict { kind: &'static str, existing: Uuid },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A value that can live in a [`Collection`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Human readable record kind used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn tenant_id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Implements [`Record`] for a struct with `id`, `company_id` and
/// `created_at` fields.
#[macro_export]
macro_rules! record {
    ($ty:ty, $kind:literal) => {
        impl $crate::Record for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> $crate::__private::Uuid {
                self.id
            }

            fn tenant_id(&self) -> $crate::__private::Uuid {
                self.company_id
            }

            fn created_at(&self) -> $crate::__private::DateTime<$crate::__private::Utc> {
                self.created_at
            }
        }
    };
}

#[derive(Debug)]
pub struct Collection<T> {
    inner: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: T) -> T {
        let mut map = self.inner.write().await;
        map.insert(record.id(), record.clone());
        record
    }

    pub async fn get(&self, tenant: Uuid, id: Uuid) -> Option<T> {
        let map = self.inner.read().await;
        map.get(&id)
            .filter(|record| record.tenant_id() == tenant)
            .cloned()
    }

    /// Like [`Collection::get`] but reports a miss as [`StoreError::NotFound`].
    pub async fn find(&self, tenant: Uuid, id: Uuid) -> StoreResult<T> {
        self.get(tenant, id).await.ok_or(StoreError::NotFound {
            kind: T::KIND,
            id,
        })
    }

    /// Inserts `record` unless a tenant record already matches `conflict`.
    /// The check and the insert happen under one write lock.
    pub async fn insert_unique<F>(&self, record: T, conflict: F) -> StoreResult<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut map = self.inner.write().await;
        let tenant = record.tenant_id();
        if let Some(existing) = map
            .values()
            .find(|other| other.tenant_id() == tenant && conflict(other))
        {
            return Err(StoreError::Conflict {
                kind: T::KIND,
                existing: existing.id(),
            });
        }
        map.insert(record.id(), record.clone());
        Ok(record)
    }

    /// Tenant records matching `predicate`, oldest first.
    pub async fn list<F>(&self, tenant: Uuid, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let map = self.inner.read().await;
        let mut rows: Vec<T> = map
            .values()
            .filter(|record| record.tenant_id() == tenant && predicate(record))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        rows
    }

    pub async fn all(&self, tenant: Uuid) -> Vec<T> {
        self.list(tenant, |_| true).await
    }

    pub async fn count(&self, tenant: Uuid) -> usize {
        let map = self.inner.read().await;
        map.values()
            .filter(|record| record.tenant_id() == tenant)
            .count()
    }

    pub async fn update<F>(&self, tenant: Uuid, id: Uuid, apply: F) -> StoreResult<T>
    where
        F: FnOnce(&mut T),
    {
        self.try_update(tenant, id, |record| {
            apply(record);
            Ok::<(), StoreError>(())
        })
        .await
    }

    /// Applies a fallible mutation. The stored record is only replaced when
    /// `apply` succeeds.
    pub async fn try_update<F, E>(&self, tenant: Uuid, id: Uuid, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut map = self.inner.write().await;
        let current = map
            .get(&id)
            .filter(|record| record.tenant_id() == tenant)
            .ok_or(StoreError::NotFound { kind: T::KIND, id })?;
        let mut draft = current.clone();
        apply(&mut draft)?;
        map.insert(id, draft.clone());
        Ok(draft)
    }

    pub async fn remove(&self, tenant: Uuid, id: Uuid) -> StoreResult<T> {
        let mut map = self.inner.write().await;
        match map.get(&id) {
            Some(record) if record.tenant_id() == tenant => {}
            _ => return Err(StoreError::NotFound { kind: T::KIND, id }),
        }
        map.remove(&id)
            .ok_or(StoreError::NotFound { kind: T::KIND, id })
    }
}
