//! The transaction resource trait.
//!
//! Executors drive a backing-store handle through this narrow surface and
//! never look inside it. Committing or rolling back here affects the store's
//! own transaction; the second-level cache keeps a separate buffering
//! protocol layered on top by the caching executor.

use crate::Result;
use std::any::Any;
use std::time::Duration;

/// An externally managed backing-store transaction.
pub trait Transaction: Send {
    /// Opaque handle to the underlying store connection.
    ///
    /// Backing-store implementations downcast this to their concrete
    /// connection type; the engine itself never inspects it.
    fn connection(&mut self) -> &mut dyn Any;

    /// Commit the underlying store transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the underlying store transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Release the handle. Called once, at executor close.
    fn close(&mut self) -> Result<()>;

    /// Statement timeout to apply to store calls, if configured.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}
