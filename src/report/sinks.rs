use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::{ItemRequest, ItemSink};

/// Records every create-item call. Used by tests and dry runs.
#[derive(Debug)]
pub struct InMemoryItemSink {
    next_id: AtomicI64,
    items: Mutex<Vec<(i64, ItemRequest)>>,
}

impl InMemoryItemSink {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: i64) -> Self {
        Self {
            next_id: AtomicI64::new(first_id),
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn items(&self) -> Result<Vec<(i64, ItemRequest)>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("item sink lock poisoned"))?;
        Ok(items.clone())
    }

    pub fn call_count(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}

impl Default for InMemoryItemSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemSink for InMemoryItemSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_item(&self, request: &ItemRequest) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("item sink lock poisoned"))?;
        items.push((id, request.clone()));
        Ok(id)
    }
}
