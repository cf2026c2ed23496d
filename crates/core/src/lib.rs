//! Typed document collections over pluggable backends, and a watcher that
//! turns a database's change feed into a per-document history log.

pub mod document;
pub mod error;
pub mod events;
pub mod history;
pub mod store;

pub use document::{Document, DocumentId};
pub use error::{StoreError, WatchError};
pub use history::{History, Recorder, UpdatedField, Watcher};
pub use store::{Collection, Database};
