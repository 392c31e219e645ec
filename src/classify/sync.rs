//! Bringing persisted classifications in line with the mapping table.
//!
//! Missing classifications are created and missing fragments appended;
//! nothing is ever removed. Running twice with the same mappings writes
//! nothing the second time.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::mapping::ClassificationMapping;
use crate::storage::models::{FileClassification, FileNamePart, SaveSummary};
use crate::storage::ClassificationStore;

/// Retry applied to the final save only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub target_names: usize,
    pub classifications_created: usize,
    pub parts_added: usize,
    pub saved: SaveSummary,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationSynchronizer {
    retry: RetryPolicy,
}

impl ClassificationSynchronizer {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn process<S: ClassificationStore>(
        &self,
        store: &mut S,
        mappings: &[ClassificationMapping],
        token: &CancellationToken,
    ) -> Result<SyncSummary> {
        token.check()?;
        store.discard_changes();

        let names: BTreeSet<String> = mappings
            .iter()
            .map(|mapping| mapping.database_mapping.clone())
            .collect();
        let mut summary = SyncSummary {
            target_names: names.len(),
            ..SyncSummary::default()
        };
        if names.is_empty() {
            debug!("No mappings, nothing to synchronize");
            return Ok(summary);
        }

        let mut existing = store.existing_classifications(&names)?;
        debug!(
            "{} of {} mapped classifications already exist",
            existing.len(),
            names.len()
        );

        let mut staged: Vec<FileClassification> = Vec::new();
        for name in &names {
            if existing.contains_key(name) {
                continue;
            }
            let Some(template) = mappings.iter().find(|m| &m.database_mapping == name) else {
                continue;
            };
            let classification =
                FileClassification::new(name.clone(), template.celebrity, template.searchable);
            staged.push(classification.clone());
            existing.insert(name.clone(), classification);
        }
        summary.classifications_created = staged.len();
        if !staged.is_empty() {
            store.add_classifications(staged);
        }

        token.check()?;

        let mut groups: BTreeMap<&str, Vec<&ClassificationMapping>> = BTreeMap::new();
        for mapping in mappings {
            groups
                .entry(mapping.database_mapping.as_str())
                .or_default()
                .push(mapping);
        }

        for (name, group) in groups {
            let Some(classification) = existing.get_mut(name) else {
                continue;
            };
            let mut known = classification.part_texts_lowercase();
            let missing: Vec<FileNamePart> = group
                .iter()
                .filter(|mapping| known.insert(mapping.file_name_contains.to_lowercase()))
                .map(|mapping| FileNamePart::new(mapping.file_name_contains.clone()))
                .collect();
            if missing.is_empty() {
                continue;
            }

            debug!("Adding {} fragments to '{}'", missing.len(), name);
            summary.parts_added += missing.len();
            store.add_file_name_parts(classification, missing.clone());
            classification.file_name_parts.extend(missing);
        }

        token.check()?;
        summary.saved = self.save_with_retry(store, token)?;

        if summary.saved.is_empty() {
            debug!("Classifications already up to date");
        } else {
            info!(
                "Synchronized classifications: {} created, {} fragments added",
                summary.saved.classifications_inserted, summary.saved.parts_inserted
            );
        }
        Ok(summary)
    }

    /// Save the staged changes, retrying transient failures. Whatever is
    /// still staged when this gives up is discarded.
    fn save_with_retry<S: ClassificationStore>(
        &self,
        store: &mut S,
        token: &CancellationToken,
    ) -> Result<SaveSummary> {
        let result = self.try_save(store, token);
        if result.is_err() {
            store.discard_changes();
        }
        result
    }

    fn try_save<S: ClassificationStore>(
        &self,
        store: &mut S,
        token: &CancellationToken,
    ) -> Result<SaveSummary> {
        let mut attempt = 1;
        let mut backoff = self.retry.initial_backoff;
        loop {
            match store.save_changes(token) {
                Ok(saved) => return Ok(saved),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    warn!(
                        "Saving classifications failed (attempt {} of {}), retrying in {:?}: {}",
                        attempt, self.retry.attempts, backoff, err
                    );
                    if !token.sleep(backoff) {
                        return Err(Error::Cancelled);
                    }
                    attempt += 1;
                    backoff *= 2;
                }
                Err(err) => {
                    return Err(Error::Persistence(format!(
                        "saving classifications failed after {} attempt(s): {}",
                        attempt, err
                    )))
                }
            }
        }
    }
}
