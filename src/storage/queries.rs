use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension, Params};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::models::*;
use super::sqlite::Database;
use super::ClassificationStore;
use crate::cancel::CancellationToken;
use crate::classify::handle::FileHandle;
use crate::error::{Error, Result};

/// Bound on `IN (...)` list sizes, below SQLite's historical 999 limit.
const SQLITE_PARAMETER_CHUNK: usize = 900;

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_handle_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("file_detail.file_handle")
    )
}

impl Database {
    fn query_classifications<P: Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> rusqlite::Result<Vec<FileClassification>> {
        let sql = format!(
            "SELECT c.id, c.name, c.search_level, c.parent_id, c.celebrity, \
                    c.include_in_search, p.text \
             FROM file_classification c \
             LEFT JOIN file_name_part p ON p.file_classification_id = c.id \
             {} \
             ORDER BY c.id, p.id",
            where_clause
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let mut rows = stmt.query(params)?;

        let mut classifications: Vec<FileClassification> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            if classifications.last().and_then(|c| c.id) != Some(id) {
                classifications.push(FileClassification {
                    id: Some(id),
                    name: row.get(1)?,
                    search_level: row.get(2)?,
                    parent_id: row.get(3)?,
                    celebrity: row.get(4)?,
                    include_in_search: row.get(5)?,
                    file_name_parts: Vec::new(),
                });
            }
            if let (Some(text), Some(current)) =
                (row.get::<_, Option<String>>(6)?, classifications.last_mut())
            {
                current.file_name_parts.push(FileNamePart::new(text));
            }
        }
        Ok(classifications)
    }

    // ── Files ────────────────────────────────────────────────────

    /// Every file row, soft-deleted ones included, keyed by
    /// `(directory_name, file_name)`.
    pub fn existing_files(&self) -> Result<HashMap<(String, String), ExistingFile>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, directory_name, file_name, file_handle FROM file_detail")?;
        let files = stmt
            .query_map([], |row| {
                Ok((
                    (row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                    ExistingFile {
                        id: row.get(0)?,
                        file_handle: FileHandle::from(row.get::<_, String>(3)?),
                    },
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(files)
    }

    /// Insert or update a batch of files in one transaction. Handles of
    /// existing rows are never rewritten. A file whose new handle collides
    /// with a persisted one is skipped and reported in the summary.
    pub fn upsert_file_details(&self, details: &[FileDetail], run_id: i64) -> Result<UpsertSummary> {
        let tx = self.connection().unchecked_transaction()?;
        let mut summary = UpsertSummary::default();
        {
            let mut upsert_stmt = tx.prepare_cached(
                "INSERT INTO file_detail \
                 (directory_name, file_name, file_handle, file_size, is_image, \
                  image_width, image_height, last_seen_run_id, soft_deleted_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL) \
                 ON CONFLICT(directory_name, file_name) DO UPDATE SET \
                     file_size = excluded.file_size, \
                     is_image = excluded.is_image, \
                     image_width = excluded.image_width, \
                     image_height = excluded.image_height, \
                     last_seen_run_id = excluded.last_seen_run_id, \
                     soft_deleted_at = NULL \
                 RETURNING id",
            )?;
            let mut clear_links_stmt = tx.prepare_cached(
                "DELETE FROM file_detail_classification WHERE file_detail_id = ?1",
            )?;
            let mut link_stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO file_detail_classification \
                 (file_detail_id, file_classification_id) VALUES (?1, ?2)",
            )?;

            for detail in details {
                let handle = detail.file_handle.as_ref().ok_or_else(|| {
                    Error::Persistence(format!(
                        "file {} has no handle",
                        detail.full_name_with_path().display()
                    ))
                })?;

                let (width, height) = match detail.image_detail {
                    Some(image) => (Some(image.width), Some(image.height)),
                    None => (None, None),
                };

                let file_id: i64 = match upsert_stmt.query_row(
                    params![
                        detail.directory_name,
                        detail.file_name,
                        handle.as_str(),
                        detail.file_size,
                        detail.is_image,
                        width,
                        height,
                        run_id,
                    ],
                    |row| row.get(0),
                ) {
                    Ok(id) => id,
                    Err(err) if is_handle_conflict(&err) => {
                        let path = detail.full_name_with_path().to_string_lossy().into_owned();
                        warn!("{}", Error::HandleConflict(handle.to_string()));
                        summary.handle_conflicts.push((path, handle.to_string()));
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                clear_links_stmt.execute(params![file_id])?;
                for classification_id in &detail.classification_ids {
                    link_stmt.execute(params![file_id, classification_id])?;
                }
                summary.files_upserted += 1;
            }
        }
        tx.commit()?;
        debug!(
            "Upserted {} file details ({} handle conflicts)",
            summary.files_upserted,
            summary.handle_conflicts.len()
        );
        Ok(summary)
    }

    pub fn find_file(&self, directory_name: &str, file_name: &str) -> Result<Option<FileDetail>> {
        let detail = self
            .connection()
            .query_row(
                "SELECT id, file_handle, file_size, is_image, image_width, image_height \
                 FROM file_detail WHERE directory_name = ?1 AND file_name = ?2",
                params![directory_name, file_name],
                |row| {
                    let width: Option<u32> = row.get(4)?;
                    let height: Option<u32> = row.get(5)?;
                    Ok(FileDetail {
                        id: Some(row.get(0)?),
                        directory_name: directory_name.to_string(),
                        file_name: file_name.to_string(),
                        file_handle: Some(FileHandle::from(row.get::<_, String>(1)?)),
                        file_size: row.get(2)?,
                        is_image: row.get(3)?,
                        image_detail: width
                            .zip(height)
                            .map(|(width, height)| ImageDetail { width, height }),
                        classification_ids: BTreeSet::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut detail) = detail else {
            return Ok(None);
        };
        if let Some(file_id) = detail.id {
            let mut stmt = self.connection().prepare(
                "SELECT file_classification_id FROM file_detail_classification \
                 WHERE file_detail_id = ?1",
            )?;
            detail.classification_ids = stmt
                .query_map(params![file_id], |row| row.get(0))?
                .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
        }
        Ok(Some(detail))
    }

    pub fn classification_names_for_file(&self, file_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare(
            "SELECT c.name FROM file_classification c \
             JOIN file_detail_classification l ON l.file_classification_id = c.id \
             WHERE l.file_detail_id = ?1 ORDER BY c.name",
        )?;
        let names = stmt
            .query_map(params![file_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn file_count(&self) -> Result<i64> {
        Ok(self
            .connection()
            .query_row("SELECT COUNT(*) FROM file_detail", [], |row| row.get(0))?)
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Files not currently soft-deleted, as `(id, full path)`.
    pub fn active_files(&self) -> Result<Vec<(i64, PathBuf)>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, directory_name, file_name FROM file_detail \
             WHERE soft_deleted_at IS NULL ORDER BY id",
        )?;
        let files = stmt
            .query_map([], |row| {
                let directory: String = row.get(1)?;
                let file_name: String = row.get(2)?;
                Ok((row.get(0)?, PathBuf::from(directory).join(file_name)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn mark_soft_deleted(&self, file_ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE file_detail SET soft_deleted_at = ?1 \
                 WHERE id = ?2 AND soft_deleted_at IS NULL",
            )?;
            let at = timestamp(at);
            for id in file_ids {
                count += stmt.execute(params![at, id])?;
            }
        }
        tx.commit()?;
        debug!("Soft-deleted {} file details", count);
        Ok(count)
    }

    /// Remove rows soft-deleted before `cutoff`, with their classification links.
    pub fn soft_deleted_count(&self) -> Result<usize> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM file_detail WHERE soft_deleted_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn purge_soft_deleted(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = timestamp(cutoff);
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM file_detail_classification WHERE file_detail_id IN \
             (SELECT id FROM file_detail \
              WHERE soft_deleted_at IS NOT NULL AND soft_deleted_at < ?1)",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM file_detail WHERE soft_deleted_at IS NOT NULL AND soft_deleted_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        debug!("Hard-deleted {} file details soft-deleted before {}", removed, cutoff);
        Ok(removed)
    }

    // ── Scan Runs ────────────────────────────────────────────────

    pub fn create_scan_run(&self, job: &str) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO scan_run (job, started_at, status) VALUES (?1, ?2, ?3)",
            params![job, timestamp(Utc::now()), RunStatus::Running.as_str()],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn complete_scan_run(
        &self,
        run_id: i64,
        status: RunStatus,
        files_processed: usize,
        files_classified: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.connection().execute(
            "UPDATE scan_run SET completed_at = ?1, status = ?2, files_processed = ?3, \
             files_classified = ?4, error = ?5 WHERE id = ?6",
            params![
                timestamp(Utc::now()),
                status.as_str(),
                files_processed as i64,
                files_classified as i64,
                error,
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn get_scan_run(&self, run_id: i64) -> Result<Option<ScanRun>> {
        let run = self
            .connection()
            .query_row(
                "SELECT id, job, started_at, completed_at, status, files_processed, \
                        files_classified, error \
                 FROM scan_run WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(ScanRun {
                        id: row.get(0)?,
                        job: row.get(1)?,
                        started_at: row.get(2)?,
                        completed_at: row.get(3)?,
                        status: row.get(4)?,
                        files_processed: row.get(5)?,
                        files_classified: row.get(6)?,
                        error: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

impl ClassificationStore for Database {
    fn existing_classifications(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, FileClassification>> {
        let names: Vec<&String> = names.iter().collect();
        let mut existing = HashMap::with_capacity(names.len());

        for chunk in names.chunks(SQLITE_PARAMETER_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let where_clause = format!(
                "WHERE c.search_level = {} AND c.name IN ({})",
                DEFAULT_SEARCH_LEVEL, placeholders
            );
            for classification in self.query_classifications(&where_clause, params_from_iter(chunk.iter()))? {
                existing.insert(classification.name.clone(), classification);
            }
        }
        Ok(existing)
    }

    fn add_classifications(&mut self, classifications: Vec<FileClassification>) {
        self.pending.classifications.extend(classifications);
    }

    fn add_file_name_parts(&mut self, classification: &FileClassification, parts: Vec<FileNamePart>) {
        if parts.is_empty() {
            return;
        }
        if classification.id.is_none() {
            if let Some(staged) = self.pending.classifications.iter_mut().find(|c| {
                c.name == classification.name && c.search_level == classification.search_level
            }) {
                staged.file_name_parts.extend(parts);
                return;
            }
        }
        self.pending.parts.push((
            (classification.name.clone(), classification.search_level),
            parts,
        ));
    }

    /// Commit everything staged in one transaction. On failure nothing is
    /// written and the staged changes are kept so the save can be retried.
    fn save_changes(&mut self, token: &CancellationToken) -> Result<SaveSummary> {
        token.check()?;
        if self.pending.is_empty() {
            return Ok(SaveSummary::default());
        }

        let mut summary = SaveSummary::default();
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut class_stmt = tx.prepare_cached(
                "INSERT INTO file_classification \
                 (name, search_level, parent_id, celebrity, include_in_search) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut find_stmt = tx.prepare_cached(
                "SELECT id FROM file_classification WHERE name = ?1 AND search_level = ?2",
            )?;
            let mut part_stmt = tx.prepare_cached(
                "INSERT INTO file_name_part (file_classification_id, text) VALUES (?1, ?2)",
            )?;

            for classification in &self.pending.classifications {
                class_stmt.execute(params![
                    classification.name,
                    classification.search_level,
                    classification.parent_id,
                    classification.celebrity,
                    classification.include_in_search,
                ])?;
                let id = tx.last_insert_rowid();
                summary.classifications_inserted += 1;

                for part in &classification.file_name_parts {
                    part_stmt.execute(params![id, part.text])?;
                    summary.parts_inserted += 1;
                }
            }

            for ((name, search_level), parts) in &self.pending.parts {
                let id: i64 = find_stmt.query_row(params![name, search_level], |row| row.get(0))?;
                for part in parts {
                    part_stmt.execute(params![id, part.text])?;
                    summary.parts_inserted += 1;
                }
            }
        }
        tx.commit()?;
        self.pending.clear();

        debug!(
            "Saved {} classifications and {} fragments",
            summary.classifications_inserted, summary.parts_inserted
        );
        Ok(summary)
    }

    fn discard_changes(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "Discarding {} staged classifications and {} staged fragment groups",
                self.pending.classifications.len(),
                self.pending.parts.len()
            );
            self.pending.clear();
        }
    }

    fn all_classifications(&self) -> Result<Vec<FileClassification>> {
        Ok(self.query_classifications("", [])?)
    }
}
