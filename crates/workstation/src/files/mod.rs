//! File browsing for the web file manager.
//!
//! All path operations are validated against allowed roots. Path traversal
//! is prevented by lexical cleaning before the check and by canonicalizing
//! before any directory is read.

pub mod browser;

pub use browser::{BrowserError, DirectoryBrowser, DirectoryEntry, Listing};
