//! Core traits for bintable
//!
//! The aggregation engine consumes event data through `ChunkSource` so that
//! high-level binning logic does not depend on any concrete file format or
//! reader implementation.

use crate::column::Column;

/// One batch of events, exposed as named columns.
///
/// A chunk is read-only from the engine's point of view: `event()` calls
/// look up columns by name and never mutate the source. Implementations may
/// additionally let callers attach derived columns before handing the chunk
/// to the engine.
pub trait ChunkSource {
    /// Number of events (rows) in this chunk.
    fn n_events(&self) -> usize;

    /// Look up a column by name. `None` when the chunk has no such column.
    fn column(&self, name: &str) -> Option<&Column>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneColumn(Column);

    impl ChunkSource for OneColumn {
        fn n_events(&self) -> usize {
            self.0.n_rows()
        }

        fn column(&self, name: &str) -> Option<&Column> {
            (name == "x").then_some(&self.0)
        }
    }

    #[test]
    fn trait_object_lookup() {
        let chunk = OneColumn(Column::Scalar(vec![1.0, 2.0]));
        let dyn_chunk: &dyn ChunkSource = &chunk;
        assert_eq!(dyn_chunk.n_events(), 2);
        assert!(dyn_chunk.column("x").is_some());
        assert!(dyn_chunk.column("y").is_none());
    }
}
