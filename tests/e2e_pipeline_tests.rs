use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use catalog_updater::classify::handle::MAX_HANDLE_LENGTH;
use catalog_updater::config::MappingFailurePolicy;
use catalog_updater::scanner::MemoryFileSystem;
use catalog_updater::storage::models::ImageDetail;
use catalog_updater::storage::{ClassificationStore, Database};
use catalog_updater::{AppConfig, CancellationToken, Error, ScanEngine, SilentReporter};
use image::{ImageFormat, RgbImage};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// A mapping file in a temp directory, kept alive by the returned guard.
fn write_mappings(contents: &str) -> (TempDir, String) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mappings.csv");
    fs::write(&path, contents).unwrap();
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

const VACATION_MAPPINGS: &str = "\
file_name_contains,database_mapping,celebrity,searchable
vacation,Vacation,false,true
";

fn pics() -> Arc<MemoryFileSystem> {
    Arc::new(MemoryFileSystem::with_files([
        ("/pics/Vacation_2020.jpg", png(8, 6)),
        ("/pics/random.txt", b"just text".to_vec()),
    ]))
}

#[test]
fn test_vacation_scenario() {
    let (_guard, mapping_file) = write_mappings(VACATION_MAPPINGS);
    let config = AppConfig::new("/pics", mapping_file);
    let mut engine = ScanEngine::new(config, Database::open_in_memory().unwrap(), pics());

    let report = engine
        .run_cycle(&SilentReporter, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.counters.files_processed, 2);
    assert_eq!(report.counters.files_classified, 1);
    assert_eq!(report.files_written, 2);
    assert!(report.mapping_error.is_none());

    let db = engine.database();
    let classifications = db.all_classifications().unwrap();
    assert_eq!(classifications.len(), 1);
    assert_eq!(classifications[0].name, "Vacation");
    assert_eq!(classifications[0].file_name_parts.len(), 1);
    assert_eq!(classifications[0].file_name_parts[0].text, "vacation");

    let jpg = db.find_file("/pics", "Vacation_2020.jpg").unwrap().unwrap();
    assert_eq!(
        db.classification_names_for_file(jpg.id.unwrap()).unwrap(),
        vec!["Vacation".to_string()]
    );
    let jpg_handle = jpg.file_handle.unwrap();
    assert_eq!(jpg_handle.as_str(), "vacation-2020-jpg");
    assert!(jpg.is_image);
    assert_eq!(jpg.image_detail, Some(ImageDetail { width: 8, height: 6 }));

    let txt = db.find_file("/pics", "random.txt").unwrap().unwrap();
    assert!(txt.classification_ids.is_empty());
    let txt_handle = txt.file_handle.unwrap();
    assert_eq!(txt_handle.as_str(), "random-txt");
    assert!(!txt.is_image);

    assert_ne!(jpg_handle, txt_handle);
    assert!(jpg_handle.len() <= MAX_HANDLE_LENGTH);
    assert!(txt_handle.len() <= MAX_HANDLE_LENGTH);

    let run = db.get_scan_run(report.run_id).unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.files_processed, 2);
    assert_eq!(run.files_classified, 1);
}

#[test]
fn test_second_cycle_is_idempotent() {
    let (_guard, mapping_file) = write_mappings(VACATION_MAPPINGS);
    let config = AppConfig::new("/pics", mapping_file);
    let mut engine = ScanEngine::new(config, Database::open_in_memory().unwrap(), pics());
    let token = CancellationToken::new();

    engine.run_cycle(&SilentReporter, &token).unwrap();
    let second = engine.run_cycle(&SilentReporter, &token).unwrap();

    let sync = second.sync.unwrap();
    assert!(sync.saved.is_empty());
    assert_eq!(second.counters.handles_generated, 0);
    assert!(second.handle_conflicts.is_empty());

    let db = engine.database();
    assert_eq!(db.file_count().unwrap(), 2);
    assert_eq!(db.all_classifications().unwrap().len(), 1);
    let jpg = db.find_file("/pics", "Vacation_2020.jpg").unwrap().unwrap();
    assert_eq!(jpg.file_handle.unwrap().as_str(), "vacation-2020-jpg");
}

#[test]
fn test_new_file_never_takes_a_persisted_handle() {
    let (_guard, mapping_file) = write_mappings(VACATION_MAPPINGS);
    let config = AppConfig::new("/pics", mapping_file);
    let fs = pics();
    let mut engine = ScanEngine::new(config, Database::open_in_memory().unwrap(), fs.clone());
    let token = CancellationToken::new();
    engine.run_cycle(&SilentReporter, &token).unwrap();

    fs.add_file("/pics/2021/random.txt", b"other text".to_vec());
    let report = engine.run_cycle(&SilentReporter, &token).unwrap();
    assert_eq!(report.counters.handles_generated, 1);
    assert!(report.handle_conflicts.is_empty());

    let db = engine.database();
    let newer = db.find_file("/pics/2021", "random.txt").unwrap().unwrap();
    let handle = newer.file_handle.unwrap();
    assert_ne!(handle.as_str(), "random-txt");
    assert!(handle.as_str().ends_with("-random-txt"));
    assert_eq!(db.file_count().unwrap(), 3);
}

#[test]
fn test_missing_mapping_file_skips_sync_only() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.csv").to_string_lossy().into_owned();
    let config = AppConfig::new("/pics", missing);
    let mut engine = ScanEngine::new(config, Database::open_in_memory().unwrap(), pics());

    let report = engine
        .run_cycle(&SilentReporter, &CancellationToken::new())
        .unwrap();
    assert!(report.sync.is_none());
    assert!(report.mapping_error.is_some());
    assert_eq!(report.counters.files_processed, 2);
    assert_eq!(report.counters.files_classified, 0);

    let run = engine.database().get_scan_run(report.run_id).unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert!(run.error.unwrap().contains("nope.csv"));
}

#[test]
fn test_missing_mapping_file_can_fail_the_cycle() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.csv").to_string_lossy().into_owned();
    let mut config = AppConfig::new("/pics", missing);
    config.mapping_failure_policy = MappingFailurePolicy::FailCycle;
    let mut engine = ScanEngine::new(config, Database::open_in_memory().unwrap(), pics());

    let err = engine
        .run_cycle(&SilentReporter, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::MappingLoad(_)));
    assert_eq!(engine.database().file_count().unwrap(), 0);

    let run = engine.database().get_scan_run(1).unwrap().unwrap();
    assert_eq!(run.status, "failed");
}

#[test]
fn test_scan_real_directory_tree() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("library");
    fs::create_dir_all(root.join("Holiday 2019")).unwrap();
    fs::create_dir_all(root.join("work")).unwrap();
    fs::create_dir_all(root.join(".cache")).unwrap();
    fs::write(root.join("Holiday 2019").join("beach.png"), png(3, 5)).unwrap();
    fs::write(root.join("Holiday 2019").join("broken.jpg"), b"not a jpeg").unwrap();
    fs::write(root.join("work").join("report.pdf"), b"%PDF").unwrap();
    fs::write(root.join(".cache").join("thumb.png"), png(1, 1)).unwrap();

    let (_guard, mapping_file) = write_mappings(
        "FileNameContains,DatabaseMapping,Celebrity,Searchable\n\
         holiday,Holiday,no,yes\n\
         beach,Holiday,no,yes\n\
         beach,Beach,0,1\n",
    );
    let db_dir = tempdir().unwrap();
    let db_path = db_dir.path().join("catalog.db");

    let mut config = AppConfig::new(root.to_string_lossy(), mapping_file);
    config.database_path = db_path.to_string_lossy().into_owned();
    config.ignore_patterns = vec!["**/.cache".to_string()];

    let mut engine = ScanEngine::open(config).unwrap();
    let report = engine
        .run_cycle(&SilentReporter, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.counters.files_processed, 3);
    assert_eq!(report.counters.images, 2);
    assert_eq!(report.counters.image_failures, 1);
    drop(engine);

    let db = Database::open(db_path.to_str().unwrap()).unwrap();
    let holiday_dir = root.join("Holiday 2019").to_string_lossy().into_owned();

    let beach = db.find_file(&holiday_dir, "beach.png").unwrap().unwrap();
    assert_eq!(beach.image_detail, Some(ImageDetail { width: 3, height: 5 }));
    assert_eq!(
        db.classification_names_for_file(beach.id.unwrap()).unwrap(),
        vec!["Beach".to_string(), "Holiday".to_string()]
    );

    let broken = db.find_file(&holiday_dir, "broken.jpg").unwrap().unwrap();
    assert!(broken.is_image);
    assert_eq!(broken.image_detail, None);
    assert_eq!(
        db.classification_names_for_file(broken.id.unwrap()).unwrap(),
        vec!["Holiday".to_string()]
    );

    let work_dir = root.join("work").to_string_lossy().into_owned();
    let report_pdf = db.find_file(&work_dir, "report.pdf").unwrap().unwrap();
    assert!(report_pdf.classification_ids.is_empty());
    assert!(db
        .find_file(&root.join(".cache").to_string_lossy(), "thumb.png")
        .unwrap()
        .is_none());
    assert!(Path::new(&db_path).exists());
}

#[cfg(unix)]
#[test]
fn test_non_utf8_file_name_is_skipped_not_soft_deleted() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    use catalog_updater::scheduler::Job;
    use catalog_updater::JobReport;

    let tmp = tempdir().unwrap();
    let root = tmp.path().join("library");
    fs::create_dir_all(&root).unwrap();
    let odd = root.join(OsStr::from_bytes(b"caf\xe9.txt"));
    fs::write(&odd, b"latin-1 name").unwrap();
    fs::write(root.join("notes.txt"), b"plain").unwrap();

    let (_guard, mapping_file) = write_mappings(VACATION_MAPPINGS);
    let db_dir = tempdir().unwrap();
    let mut config = AppConfig::new(root.to_string_lossy(), mapping_file);
    config.database_path = db_dir.path().join("catalog.db").to_string_lossy().into_owned();

    let mut engine = ScanEngine::open(config).unwrap();
    let token = CancellationToken::new();
    let report = engine.run_cycle(&SilentReporter, &token).unwrap();
    assert_eq!(report.counters.files_processed, 1);
    assert_eq!(report.counters.files_skipped, 1);
    assert_eq!(engine.database().file_count().unwrap(), 1);

    match engine.run_job(Job::SoftDelete, &SilentReporter, &token).unwrap() {
        JobReport::Maintenance(report) => {
            assert_eq!(report.examined, 1);
            assert_eq!(report.affected, 0);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert!(odd.exists());
    assert_eq!(engine.database().active_files().unwrap().len(), 1);
}
