use std::collections::BTreeSet;

use catalog_updater::classify::FileHandle;
use catalog_updater::storage::models::*;
use catalog_updater::storage::{ClassificationStore, Database};
use catalog_updater::CancellationToken;

fn make_test_file(dir: &str, name: &str, handle: &str) -> FileDetail {
    let mut detail = FileDetail::new(dir, name, 100);
    detail.file_handle = Some(FileHandle::from(handle.to_string()));
    detail
}

fn saved_classification(db: &mut Database, name: &str, parts: &[&str]) -> FileClassification {
    let mut classification = FileClassification::new(name, false, true);
    classification.file_name_parts = parts.iter().map(|p| FileNamePart::new(*p)).collect();
    db.add_classifications(vec![classification]);
    db.save_changes(&CancellationToken::new()).unwrap();

    let names = BTreeSet::from([name.to_string()]);
    db.existing_classifications(&names).unwrap().remove(name).unwrap()
}

#[test]
fn test_create_and_complete_scan_run() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_scan_run("new_files").unwrap();
    assert!(run_id > 0);

    let running = db.get_scan_run(run_id).unwrap().unwrap();
    assert_eq!(running.status, "running");
    assert!(running.completed_at.is_none());

    db.complete_scan_run(run_id, RunStatus::Completed, 42, 7, None)
        .unwrap();

    let row: (String, i64, i64) = db
        .connection()
        .query_row(
            "SELECT status, files_processed, files_classified FROM scan_run WHERE id = ?1",
            rusqlite::params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(row.0, "completed");
    assert_eq!(row.1, 42);
    assert_eq!(row.2, 7);
}

#[test]
fn test_staged_parts_are_saved_with_new_classification() {
    let mut db = Database::open_in_memory().unwrap();
    let staged = FileClassification::new("Vacation", false, true);
    db.add_classifications(vec![staged.clone()]);
    db.add_file_name_parts(&staged, vec![FileNamePart::new("vacation"), FileNamePart::new("beach")]);
    assert!(db.has_pending_changes());

    let summary = db.save_changes(&CancellationToken::new()).unwrap();
    assert_eq!(summary.classifications_inserted, 1);
    assert_eq!(summary.parts_inserted, 2);
    assert!(!db.has_pending_changes());

    let all = db.all_classifications().unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].id.is_some());
    assert_eq!(all[0].search_level, DEFAULT_SEARCH_LEVEL);
    assert_eq!(all[0].file_name_parts.len(), 2);
}

#[test]
fn test_parts_for_saved_classification_resolve_by_name() {
    let mut db = Database::open_in_memory().unwrap();
    let vacation = saved_classification(&mut db, "Vacation", &["vacation"]);

    db.add_file_name_parts(&vacation, vec![FileNamePart::new("holiday")]);
    let summary = db.save_changes(&CancellationToken::new()).unwrap();
    assert_eq!(summary.classifications_inserted, 0);
    assert_eq!(summary.parts_inserted, 1);

    let reloaded = saved_classification_named(&db, "Vacation");
    assert!(reloaded.has_part("vacation"));
    assert!(reloaded.has_part("HOLIDAY"));
}

fn saved_classification_named(db: &Database, name: &str) -> FileClassification {
    let names = BTreeSet::from([name.to_string()]);
    db.existing_classifications(&names).unwrap().remove(name).unwrap()
}

#[test]
fn test_existing_classifications_only_returns_requested_names() {
    let mut db = Database::open_in_memory().unwrap();
    saved_classification(&mut db, "Vacation", &["vacation"]);
    saved_classification(&mut db, "Work", &["invoice"]);

    let names = BTreeSet::from(["Vacation".to_string(), "Missing".to_string()]);
    let existing = db.existing_classifications(&names).unwrap();
    assert_eq!(existing.len(), 1);
    assert!(existing.contains_key("Vacation"));
}

#[test]
fn test_duplicate_fragment_rolls_back_whole_save() {
    let mut db = Database::open_in_memory().unwrap();
    let vacation = saved_classification(&mut db, "Vacation", &["vacation"]);

    db.add_classifications(vec![FileClassification::new("Beach", false, true)]);
    db.add_file_name_parts(&vacation, vec![FileNamePart::new("VACATION")]);
    assert!(db.save_changes(&CancellationToken::new()).is_err());

    assert!(db.has_pending_changes());
    assert_eq!(db.all_classifications().unwrap().len(), 1);
}

#[test]
fn test_upsert_inserts_then_updates_in_place() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_scan_run("new_files").unwrap();

    let mut file = make_test_file("/pics", "a.jpg", "a-jpg");
    let summary = db.upsert_file_details(&[file.clone()], run_id).unwrap();
    assert_eq!(summary.files_upserted, 1);
    let first = db.find_file("/pics", "a.jpg").unwrap().unwrap();

    file.file_size = 250;
    file.is_image = true;
    file.image_detail = Some(ImageDetail { width: 10, height: 20 });
    file.file_handle = Some(FileHandle::from("ignored-new-handle".to_string()));
    db.upsert_file_details(&[file], run_id).unwrap();

    let second = db.find_file("/pics", "a.jpg").unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.file_size, 250);
    assert_eq!(second.image_detail, Some(ImageDetail { width: 10, height: 20 }));
    assert_eq!(second.file_handle.unwrap().as_str(), "a-jpg");
    assert_eq!(db.file_count().unwrap(), 1);
}

#[test]
fn test_upsert_replaces_classification_links() {
    let mut db = Database::open_in_memory().unwrap();
    let vacation = saved_classification(&mut db, "Vacation", &["vacation"]);
    let beach = saved_classification(&mut db, "Beach", &["beach"]);
    let run_id = db.create_scan_run("new_files").unwrap();

    let mut file = make_test_file("/pics", "vacation-beach.jpg", "vacation-beach-jpg");
    file.attach_classification(vacation.id.unwrap());
    file.attach_classification(beach.id.unwrap());
    db.upsert_file_details(&[file.clone()], run_id).unwrap();

    file.classification_ids.clear();
    file.attach_classification(beach.id.unwrap());
    db.upsert_file_details(&[file], run_id).unwrap();

    let stored = db.find_file("/pics", "vacation-beach.jpg").unwrap().unwrap();
    assert_eq!(
        db.classification_names_for_file(stored.id.unwrap()).unwrap(),
        vec!["Beach".to_string()]
    );
}

#[test]
fn test_persisted_handle_conflict_is_reported_not_fatal() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_scan_run("new_files").unwrap();
    db.upsert_file_details(&[make_test_file("/a", "report.pdf", "report-pdf")], run_id)
        .unwrap();

    let summary = db
        .upsert_file_details(
            &[
                make_test_file("/b", "report.pdf", "report-pdf"),
                make_test_file("/b", "other.pdf", "other-pdf"),
            ],
            run_id,
        )
        .unwrap();
    assert_eq!(summary.files_upserted, 1);
    assert_eq!(
        summary.handle_conflicts,
        vec![("/b/report.pdf".to_string(), "report-pdf".to_string())]
    );
    assert_eq!(db.file_count().unwrap(), 2);
}

#[test]
fn test_file_without_handle_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_scan_run("new_files").unwrap();
    let file = FileDetail::new("/pics", "a.jpg", 1);
    assert!(db.upsert_file_details(&[file], run_id).is_err());
    assert_eq!(db.file_count().unwrap(), 0);
}

#[test]
fn test_reappearing_file_is_undeleted() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_scan_run("new_files").unwrap();
    let file = make_test_file("/pics", "a.jpg", "a-jpg");
    db.upsert_file_details(&[file.clone()], run_id).unwrap();

    let id = db.find_file("/pics", "a.jpg").unwrap().unwrap().id.unwrap();
    assert_eq!(db.mark_soft_deleted(&[id], chrono::Utc::now()).unwrap(), 1);
    assert!(db.active_files().unwrap().is_empty());

    db.upsert_file_details(&[file], run_id).unwrap();
    assert_eq!(db.active_files().unwrap().len(), 1);
}

#[test]
fn test_truncate_all() {
    let mut db = Database::open_in_memory().unwrap();
    saved_classification(&mut db, "Vacation", &["vacation"]);
    let run_id = db.create_scan_run("new_files").unwrap();
    db.upsert_file_details(&[make_test_file("/pics", "a.jpg", "a-jpg")], run_id)
        .unwrap();

    db.truncate_all().unwrap();
    assert_eq!(db.file_count().unwrap(), 0);
    assert!(db.all_classifications().unwrap().is_empty());
}
