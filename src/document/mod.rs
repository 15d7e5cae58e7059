//! Attribute document collaborator.
//!
//! The credential store only needs a flat key/value view of its backing file.
//! [`AttributeDocument`] is that view; [`DocumentLoader`] produces one from a
//! path. The shipped implementation is the XML `appSettings` format in
//! [`xml`].

use anyhow::Result;
use std::path::Path;

pub mod xml;

pub use xml::{XmlAttributeDocument, XmlDocumentLoader};

/// In-memory key/value view of a configuration file.
pub trait AttributeDocument: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<&str>;

    /// Updates `key` in memory only.
    fn set(&mut self, key: &str, value: &str);

    /// Writes the whole document to `path`, replacing its contents.
    /// Entries this document does not know about must survive the write.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Loads an [`AttributeDocument`] from disk.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn AttributeDocument>>;
}
