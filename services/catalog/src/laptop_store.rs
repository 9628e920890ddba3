use crate::context::{CallContext, Interrupted};
use crate::filter::is_qualified;
use crate::pb::{Filter, Laptop};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by laptop store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("cannot emit search result: {0}")]
    Emit(String),

    #[error("store task failed: {0}")]
    Task(String),
}

/// Callback receiving each search match.
pub type Emit<'a> = dyn FnMut(Laptop) -> Result<(), StoreError> + 'a;

/// Storage for catalog records.
///
/// Implementations hand out copies only: nothing a caller does with a
/// returned laptop can reach the stored one.
pub trait LaptopStore: Send + Sync {
    /// Save a laptop, failing if its id is already taken.
    fn save(&self, laptop: &Laptop) -> Result<(), StoreError>;

    /// Look up a laptop by id. An unknown id is `Ok(None)`.
    fn find(&self, id: &str) -> Result<Option<Laptop>, StoreError>;

    /// Stream every laptop matching `filter` into `emit`.
    ///
    /// `ctx` is checked before each candidate; once it reports an
    /// interruption the search stops with [`StoreError::Interrupted`]. A
    /// failing `emit` stops the search and its error is returned as is.
    fn search(&self, ctx: &CallContext, filter: &Filter, emit: &mut Emit<'_>)
        -> Result<(), StoreError>;

    /// Number of stored laptops
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Volatile laptop store guarded by a single readers-writer lock.
///
/// Reads (`find`, `search`) share the lock; `save` is exclusive. Records
/// are never mutated after insert, so a search can hold the read lock for
/// its whole iteration.
#[derive(Default)]
pub struct InMemoryLaptopStore {
    data: RwLock<HashMap<String, Laptop>>,
}

impl InMemoryLaptopStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LaptopStore for InMemoryLaptopStore {
    fn save(&self, laptop: &Laptop) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        if data.contains_key(&laptop.id) {
            return Err(StoreError::AlreadyExists(laptop.id.clone()));
        }

        data.insert(laptop.id.clone(), laptop.clone());

        debug!(laptop_id = %laptop.id, total = data.len(), "Laptop stored");

        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<Laptop>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.get(id).cloned())
    }

    fn search(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        emit: &mut Emit<'_>,
    ) -> Result<(), StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;

        for laptop in data.values() {
            ctx.check()?;

            if is_qualified(filter, laptop) {
                trace!(laptop_id = %laptop.id, "Laptop matches filter");
                emit(laptop.clone())?;
            }
        }

        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.len())
    }
}
