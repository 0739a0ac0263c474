//! In-memory chunk of event columns.
//!
//! `TableChunk` is the reference [`ChunkSource`] implementation: a plain
//! owned table, suitable for tests and for pipelines that materialize their
//! columns up front. Derived variables added with [`TableChunk::new_variable`]
//! become visible to every subsequent `event()` call on the same chunk.

use bt_core::column::{Column, DataTable};
use bt_core::error::Result;
use bt_core::traits::ChunkSource;

/// An owned, in-memory chunk of named columns.
#[derive(Debug, Clone, Default)]
pub struct TableChunk {
    table: DataTable,
}

impl TableChunk {
    /// Create an empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a named column. All columns must agree on row count, and a
    /// name may only be defined once per chunk.
    pub fn new_variable(&mut self, name: impl Into<String>, col: Column) -> Result<()> {
        self.table.push(name, col)
    }
}

impl ChunkSource for TableChunk {
    fn n_events(&self) -> usize {
        self.table.n_rows()
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.table.column(name)
    }
}
