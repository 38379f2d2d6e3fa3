use std::path::Path;

pub mod error;
pub mod geometry;
pub mod group;
pub mod identity;
pub mod logging;
pub mod merger;

pub use error::{GeometryError, MergeError, Result, SchemaError};
pub use group::{GroupingRecord, GroupingRegistry, Member};
pub use identity::{GroupingIdentity, GroupingKey, EXCLUDED_FIELDS, IDENTITY_FIELDS};
pub use merger::{LoadState, Merger};

/// Merges the commune features of `input` into one feature per EPCI and
/// writes them to `output`. Returns the number of EPCI features written.
pub fn merge_file(input: &Path, output: &Path) -> Result<usize> {
    let mut merger = Merger::new(input, output);
    merger.load()?;
    merger.save()?;
    Ok(merger.registry().len())
}
