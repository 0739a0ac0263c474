//! # bt-core
//!
//! Core types for bintable: the error taxonomy, the column data model
//! (flat and jagged columns), and the `ChunkSource` trait that decouples
//! the aggregation engine from concrete event sources.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod error;
pub mod traits;

pub use column::{Column, DataTable, DoublyJaggedCol, JaggedCol};
pub use error::{Error, Result};
pub use traits::ChunkSource;
