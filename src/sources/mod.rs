//! Document sources.
//!
//! Everything here produces [`Document`](crate::models::Document)s with text
//! already extracted; chunking and indexing happen elsewhere.

mod local;

pub use local::{LoadReport, LocalSource, PDFTOTEXT_INSTALL_HINT};
