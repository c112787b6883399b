//! Persistence port for top-up requests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use super::{Settlement, TopupRequest, TopupStatus};
use crate::error::{Result, VerifyError};

/// Where top-up rows live. The verifier only reads a row and, after a
/// verified reconciliation, settles it.
pub trait TopupStore {
    fn insert(&self, request: TopupRequest) -> Result<u64>;
    fn find(&self, id: u64) -> Result<Option<TopupRequest>>;
    fn settle(&self, id: u64, settlement: &Settlement) -> Result<()>;
}

impl<S: TopupStore + ?Sized> TopupStore for &S {
    fn insert(&self, request: TopupRequest) -> Result<u64> {
        (**self).insert(request)
    }

    fn find(&self, id: u64) -> Result<Option<TopupRequest>> {
        (**self).find(id)
    }

    fn settle(&self, id: u64, settlement: &Settlement) -> Result<()> {
        (**self).settle(id, settlement)
    }
}

#[derive(Debug, Default)]
struct Rows {
    next_id: u64,
    by_id: BTreeMap<u64, TopupRequest>,
}

/// In-process store, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryTopupStore {
    rows: Mutex<Rows>,
}

impl MemoryTopupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rows<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Rows) -> Result<R>,
    {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| VerifyError::Store("top-up store lock poisoned".into()))?;
        f(&mut rows)
    }
}

impl TopupStore for MemoryTopupStore {
    fn insert(&self, mut request: TopupRequest) -> Result<u64> {
        self.with_rows(|rows| {
            rows.next_id += 1;
            let id = rows.next_id;
            request.id = id;
            rows.by_id.insert(id, request);
            debug!(id, "top-up inserted");
            Ok(id)
        })
    }

    fn find(&self, id: u64) -> Result<Option<TopupRequest>> {
        self.with_rows(|rows| Ok(rows.by_id.get(&id).cloned()))
    }

    fn settle(&self, id: u64, settlement: &Settlement) -> Result<()> {
        self.with_rows(|rows| {
            let row = rows.by_id.get_mut(&id).ok_or(VerifyError::TopupNotFound(id))?;
            // Re-checked under the lock; a concurrent verification may have won.
            if row.status != TopupStatus::Pending {
                return Err(VerifyError::NotPending {
                    id,
                    status: row.status.as_str(),
                });
            }
            row.apply(settlement);
            debug!(id, "top-up settled");
            Ok(())
        })
    }
}
