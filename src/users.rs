use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::portal::Directory;

/// Resolves author ids to display names, caching every answer for the run.
///
/// A failed or empty lookup falls back to the raw id so one unknown user
/// never aborts an export.
pub struct UserNames<'a, D: Directory + ?Sized> {
    directory: &'a D,
    pause: Duration,
    cache: HashMap<String, String>,
    lookups: usize,
}

impl<'a, D: Directory + ?Sized> UserNames<'a, D> {
    pub fn new(directory: &'a D, pause: Duration) -> Self {
        Self {
            directory,
            pause,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    pub fn resolve(&mut self, user_id: &str) -> String {
        if let Some(name) = self.cache.get(user_id) {
            return name.clone();
        }

        if self.lookups > 0 && !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        self.lookups += 1;

        let name = match self.directory.user_name(user_id) {
            Ok(Some(name)) => name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "user lookup failed, using id");
                user_id.to_string()
            }
        };

        self.cache.insert(user_id.to_string(), name.clone());
        name
    }

    /// Number of requests sent to the directory so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}
