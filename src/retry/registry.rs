//! User-visible error registry.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::session::SessionId;

/// Keyed store of user-visible error messages.
///
/// Each retry session only ever calls `add` and `remove` with its own id, so
/// implementations never have to arbitrate between sessions. They must accept
/// calls from any thread.
pub trait ErrorRegistry: Send + Sync {
    /// Show (or replace) the message for a session.
    fn add(&self, id: &SessionId, message: &str);

    /// Clear the message for a session, if any.
    fn remove(&self, id: &SessionId);
}

/// An [`ErrorRegistry`] holding messages in memory.
///
/// Messages are kept in the order their session first failed. A repeated
/// `add` for the same session overwrites the text in place.
///
/// # Examples
///
/// ```rust
/// use relentless::{ErrorRegistry, InMemoryRegistry, SessionId};
///
/// let registry = InMemoryRegistry::new();
/// let id = SessionId::new();
///
/// registry.add(&id, "Couldn't load page");
/// registry.add(&id, "Still couldn't load page");
/// assert_eq!(registry.messages(), vec!["Still couldn't load page".to_string()]);
///
/// registry.remove(&id);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<Vec<(SessionId, String)>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every visible message.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// The message currently shown for `id`.
    pub fn get(&self, id: &SessionId) -> Option<String> {
        self.lock()
            .iter()
            .find(|(entry, _)| entry == id)
            .map(|(_, m)| m.clone())
    }

    /// Number of visible messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is currently shown.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SessionId, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ErrorRegistry for InMemoryRegistry {
    fn add(&self, id: &SessionId, message: &str) {
        let mut entries = self.lock();
        match entries.iter_mut().find(|(entry, _)| entry == id) {
            Some((_, existing)) => *existing = message.to_string(),
            None => entries.push((*id, message.to_string())),
        }
    }

    fn remove(&self, id: &SessionId) {
        self.lock().retain(|(entry, _)| entry != id);
    }
}
