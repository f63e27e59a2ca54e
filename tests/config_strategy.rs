use std::fs;
use std::path::Path;

use file_claim::config::{load_config_from_xml_path, parse_config_xml};
use file_claim::{
    Begin, CancelToken, ClaimError, Disposition, FileRef, ReadLock, ReadLockKind, SkipReason,
};
use tempfile::tempdir;

#[test]
fn xml_config_drives_a_full_transaction() {
    let td = tempdir().unwrap();
    let root = fs::canonicalize(td.path()).unwrap();
    fs::write(root.join("report.csv"), b"1,2").unwrap();
    let xml = format!(
        r#"<config>
  <root>{}</root>
  <read_lock>rename</read_lock>
  <timeout_millis>2000</timeout_millis>
  <poll_interval_millis>50</poll_interval_millis>
  <move>archive/${{date:now:%Y}}/${{file:name}}</move>
  <move_failed>.error</move_failed>
</config>"#,
        root.display()
    );
    let cfg_path = root.join("claim.xml");
    fs::write(&cfg_path, xml).unwrap();

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.read_lock, ReadLockKind::Rename);
    let strategy = cfg.build_strategy().unwrap();
    assert!(matches!(strategy.read_lock(), ReadLock::Composite(_)));

    let file = FileRef::from_path(&root, Path::new("report.csv")).unwrap();
    let Begin::Locked(tx) = strategy.begin(file, &CancelToken::new()).unwrap() else {
        panic!("expected a claim");
    };
    assert!(root.join("report.csv.lock").exists());

    let year = chrono::Local::now().format("%Y").to_string();
    match tx.commit().unwrap() {
        Disposition::Moved(moved) => {
            assert_eq!(moved.absolute_path(), root.join("archive").join(&year).join("report.csv"))
        }
        other => panic!("expected a move, got {other:?}"),
    }
    assert!(!root.join("report.csv.lock").exists());
}

#[test]
fn invalid_expression_is_rejected_at_build_time() {
    let cfg = parse_config_xml("<config><move>${file:nonsense}</move></config>").unwrap();
    assert!(matches!(
        cfg.build_strategy(),
        Err(ClaimError::InvalidExpression { .. })
    ));
}

#[test]
fn timeout_must_exceed_poll_interval_for_polling_locks() {
    let cfg = parse_config_xml(
        "<config><read_lock>fileLock</read_lock><timeout_millis>100</timeout_millis><poll_interval_millis>500</poll_interval_millis></config>",
    )
    .unwrap();
    assert!(matches!(cfg.build_strategy(), Err(ClaimError::Config(_))));
}

#[test]
fn file_repository_needs_a_path() {
    let cfg = parse_config_xml(
        "<config><read_lock>idempotent</read_lock><repository>file</repository></config>",
    )
    .unwrap();
    assert!(cfg.build_strategy().is_err());

    let td = tempdir().unwrap();
    let xml = format!(
        "<config><read_lock>idempotent</read_lock><repository>file</repository><repository_path>{}</repository_path></config>",
        td.path().join("keys.tsv").display()
    );
    let cfg = parse_config_xml(&xml).unwrap();
    assert!(matches!(cfg.build_strategy().unwrap().read_lock(), ReadLock::Idempotent(_)));
}

#[test]
fn malformed_values_name_the_element() {
    let err =
        parse_config_xml("<config><timeout_millis>soon</timeout_millis></config>").unwrap_err();
    assert!(format!("{err:#}").contains("timeout_millis"), "error: {err:#}");
}

#[test]
fn changed_lock_waits_for_data_by_default() {
    let td = tempdir().unwrap();
    let root = fs::canonicalize(td.path()).unwrap();
    fs::write(root.join("empty.csv"), b"").unwrap();
    let xml = |extra: &str| {
        format!(
            "<config><read_lock>changed</read_lock><timeout_millis>300</timeout_millis><poll_interval_millis>50</poll_interval_millis>{extra}</config>"
        )
    };
    let cancel = CancelToken::new();

    let strategy = parse_config_xml(&xml("")).unwrap().build_strategy().unwrap();
    let file = FileRef::from_path(&root, Path::new("empty.csv")).unwrap();
    assert!(matches!(
        strategy.begin(file.clone(), &cancel).unwrap(),
        Begin::Skipped(SkipReason::TimedOut)
    ));
    assert!(!root.join("empty.csv.lock").exists());

    let relaxed = parse_config_xml(&xml("<read_lock_min_length>0</read_lock_min_length>"))
        .unwrap()
        .build_strategy()
        .unwrap();
    let Begin::Locked(tx) = relaxed.begin(file, &cancel).unwrap() else {
        panic!("an empty file is claimable once the minimum is zero");
    };
    tx.abort().unwrap();
}
