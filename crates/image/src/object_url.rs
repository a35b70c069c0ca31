//! Session-wide table of object URLs.
//!
//! Every preview and every encoded artifact is published under a `blob:`
//! style URL so it can be handed to whatever displays or downloads it.
//! The URL is owned by an [`ObjectUrl`] guard: dropping the guard revokes
//! the URL, so an entry that is removed, cleared or replaced cannot leak
//! its bytes for the rest of the session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEME: &str = "blob:multitool/";

#[derive(Default)]
struct Table {
    next_id: u64,
    live: HashMap<String, Arc<[u8]>>,
}

/// Shared handle to the URL table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct ObjectUrlTable {
    inner: Arc<Mutex<Table>>,
}

impl ObjectUrlTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // The table stays consistent across a panic in a holder, so keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `bytes` under a fresh URL.
    pub fn create(&self, bytes: Arc<[u8]>) -> ObjectUrl {
        let mut table = self.lock();
        table.next_id += 1;
        let url = format!("{SCHEME}{}", table.next_id);
        table.live.insert(url.clone(), bytes);
        tracing::trace!(%url, outstanding = table.live.len(), "object url created");

        ObjectUrl {
            url,
            table: self.clone(),
        }
    }

    /// Bytes behind a live URL.
    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lock().live.get(url).cloned()
    }

    /// Number of URLs created and not yet revoked.
    pub fn outstanding(&self) -> usize {
        self.lock().live.len()
    }

    fn revoke(&self, url: &str) -> bool {
        let mut table = self.lock();
        let removed = table.live.remove(url).is_some();
        tracing::trace!(%url, outstanding = table.live.len(), "object url revoked");
        removed
    }
}

impl fmt::Debug for ObjectUrlTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrlTable")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// A live object URL. Revoked when dropped.
pub struct ObjectUrl {
    url: String,
    table: ObjectUrlTable,
}

impl ObjectUrl {
    /// The URL string.
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Bytes behind this URL.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.table.resolve(&self.url)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.table.revoke(&self.url);
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.url).finish()
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
