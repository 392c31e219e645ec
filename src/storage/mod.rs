pub mod models;
pub mod queries;
pub mod sqlite;

pub use sqlite::Database;

use std::collections::{BTreeSet, HashMap};

use crate::cancel::CancellationToken;
use crate::error::Result;
use models::{FileClassification, FileNamePart, SaveSummary};

/// The store operations classification sync needs.
///
/// Writes are staged by `add_*` and become visible only after
/// `save_changes` commits them as one unit.
pub trait ClassificationStore {
    /// Classifications at the default search level whose name is in `names`,
    /// keyed by name, with their fragments loaded.
    fn existing_classifications(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, FileClassification>>;

    fn add_classifications(&mut self, classifications: Vec<FileClassification>);

    /// Stage fragments for `classification`, which may itself be staged.
    fn add_file_name_parts(&mut self, classification: &FileClassification, parts: Vec<FileNamePart>);

    fn save_changes(&mut self, token: &CancellationToken) -> Result<SaveSummary>;

    /// Drop everything staged since the last successful save.
    fn discard_changes(&mut self);

    fn all_classifications(&self) -> Result<Vec<FileClassification>>;
}
