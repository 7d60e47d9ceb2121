//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long first-level cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocalCacheScope {
    /// Entries persist until explicit clear/commit/rollback (the default)
    #[default]
    Session,
    /// The first-level cache is wiped after every top-level call
    Statement,
}

/// Engine-wide settings.
///
/// # Example
///
/// ```
/// use sqlmapper_core::{Configuration, LocalCacheScope};
/// use std::time::Duration;
///
/// let config = Configuration::new()
///     .cache_enabled(true)
///     .local_cache_scope(LocalCacheScope::Statement)
///     .environment("staging")
///     .lock_timeout(Duration::from_millis(250));
/// assert_eq!(config.environment.as_deref(), Some("staging"));
/// ```
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Global switch for second-level caching; when off, statements run
    /// without the caching decorator regardless of their own cache handles
    pub cache_enabled: bool,
    /// First-level cache lifetime policy
    pub local_cache_scope: LocalCacheScope,
    /// Environment id mixed into every cache key when set, so keys from
    /// different environments never collide
    pub environment: Option<String>,
    /// Default bound on blocking-cache lock waits; `None` waits forever
    pub lock_timeout: Option<Duration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::default(),
            environment: None,
            lock_timeout: None,
        }
    }
}

impl Configuration {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle second-level caching.
    #[must_use]
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the first-level cache scope.
    #[must_use]
    pub fn local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    /// Set the environment id.
    #[must_use]
    pub fn environment(mut self, id: impl Into<String>) -> Self {
        self.environment = Some(id.into());
        self
    }

    /// Bound blocking-cache lock waits.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert!(config.cache_enabled);
        assert_eq!(config.local_cache_scope, LocalCacheScope::Session);
        assert!(config.environment.is_none());
        assert!(config.lock_timeout.is_none());
    }

    #[test]
    fn builder_chain() {
        let config = Configuration::new()
            .cache_enabled(false)
            .local_cache_scope(LocalCacheScope::Statement)
            .environment("test")
            .lock_timeout(Duration::from_millis(100));
        assert!(!config.cache_enabled);
        assert_eq!(config.local_cache_scope, LocalCacheScope::Statement);
        assert_eq!(config.environment.as_deref(), Some("test"));
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(100)));
    }
}
