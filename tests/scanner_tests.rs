//! Integration tests for the process scanner.
//!
//! These tests build fake process registries in temporary directories and
//! verify record assembly through the public API.

use ps_census::error::{CgroupError, ProcessError};
use ps_census::process::{list_pids, ProcessScanner, ScannerOptions, SequenceId};
use std::fs;
use std::path::Path;

const STATUS_DOC: &str = "Name:\tnginx\n\
    NSpid:\t3100\t7\n\
    VmPeak:\t   20480 kB\n\
    VmSize:\t   20000 kB\n\
    VmLck:\t       0 kB\n\
    VmPin:\t       0 kB\n\
    VmHWM:\t    8192 kB\n\
    VmRSS:\t    4096 kB\n\
    RssAnon:\t    2048 kB\n\
    RssFile:\t    1536 kB\n\
    RssShmem:\t     512 kB\n";

/// Helper to create one process directory with the given documents.
fn fake_process(
    root: &Path,
    pid: u32,
    cgroup: Option<&str>,
    status: Option<&str>,
    cmdline: Option<&[u8]>,
) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).unwrap();
    if let Some(c) = cgroup {
        fs::write(dir.join("cgroup"), c).unwrap();
    }
    if let Some(s) = status {
        fs::write(dir.join("status"), s).unwrap();
    }
    if let Some(c) = cmdline {
        fs::write(dir.join("cmdline"), c).unwrap();
    }
}

fn scanner_for(root: &Path) -> ProcessScanner {
    ProcessScanner::new(ScannerOptions {
        root: root.to_path_buf(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_candidate_pids_are_all_digit_entries() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["123", "abc", "45x", "6"] {
        fs::create_dir(dir.path().join(name)).unwrap();
    }

    let pids = list_pids(dir.path(), None).unwrap();
    let names: Vec<String> = pids.iter().map(|p| p.to_string()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"123".to_string()));
    assert!(names.contains(&"6".to_string()));
}

#[test]
fn test_full_record_assembly() {
    let dir = tempfile::tempdir().unwrap();
    fake_process(
        dir.path(),
        3100,
        Some("5:memory:/m\n12:pids:/system.slice/nginx.service\n11:cpu:/other\n"),
        Some(STATUS_DOC),
        Some(b"nginx:\x00master\x00process\x00"),
    );

    let scanner = scanner_for(dir.path());
    let outcomes: Vec<_> = scanner.scan(SequenceId(77)).unwrap().collect();
    assert_eq!(outcomes.len(), 1);

    let record = outcomes.into_iter().next().unwrap().unwrap();
    assert_eq!(record.pid, 3100);
    assert_eq!(record.sequence_id, SequenceId(77));
    assert_eq!(record.cgroup, "/system.slice/nginx.service");
    assert_eq!(record.namespace_pid, Some(7));
    assert_eq!(record.memory.vm_peak, Some(20480));
    assert_eq!(record.memory.vm_size, Some(20000));
    assert_eq!(record.memory.vm_lck, Some(0));
    assert_eq!(record.memory.vm_pin, Some(0));
    assert_eq!(record.memory.vm_hwm, Some(8192));
    assert_eq!(record.memory.vm_rss, Some(4096));
    assert_eq!(record.memory.rss_anon, Some(2048));
    assert_eq!(record.memory.rss_file, Some(1536));
    assert_eq!(record.memory.rss_shmem, Some(512));
    assert_eq!(record.cmdline.as_deref(), Some("nginx:masterprocess"));
}

#[test]
fn test_missing_cgroup_produces_only_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fake_process(dir.path(), 200, None, Some(STATUS_DOC), Some(b"sh\x00"));
    fake_process(dir.path(), 300, Some("1:pids:/ok\n"), None, None);

    let scanner = scanner_for(dir.path());
    let outcomes: Vec<_> = scanner.scan(SequenceId(1)).unwrap().collect();
    assert_eq!(outcomes.len(), 2);

    let for_200: Vec<_> = outcomes
        .iter()
        .filter(|o| match o {
            Ok(r) => r.pid == 200,
            Err(e) => e.pid() == 200,
        })
        .collect();
    assert_eq!(for_200.len(), 1);
    match for_200[0] {
        Err(e @ ProcessError::CgroupUnavailable { .. }) => assert!(e.is_vanished()),
        other => panic!("expected cgroup failure, got {:?}", other),
    }

    let ok: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].pid, 300);
}

#[test]
fn test_no_pids_controller_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    fake_process(dir.path(), 42, Some("11:cpu:/other\n"), Some(STATUS_DOC), None);

    let scanner = scanner_for(dir.path());
    match scanner.observe(42, SequenceId(1)) {
        Err(ProcessError::CgroupUnavailable {
            pid: 42,
            source: CgroupError::NotFound,
        }) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_unreadable_status_keeps_record_without_metrics() {
    let dir = tempfile::tempdir().unwrap();
    fake_process(dir.path(), 9, Some("3:pids:/a\n"), None, Some(b"/sbin/agetty\x00tty1"));

    let scanner = scanner_for(dir.path());
    let record = scanner.observe(9, SequenceId(3)).unwrap();
    assert_eq!(record.cgroup, "/a");
    assert_eq!(record.namespace_pid, None);
    assert_eq!(record.memory.vm_rss, None);
    assert_eq!(record.cmdline.as_deref(), Some("/sbin/agettytty1"));
}

#[test]
fn test_every_record_of_a_cycle_shares_the_sequence_id() {
    let dir = tempfile::tempdir().unwrap();
    for pid in 1..=5 {
        fake_process(dir.path(), pid, Some("1:pids:/x\n"), Some(STATUS_DOC), None);
    }

    let scanner = scanner_for(dir.path());
    let seq = SequenceId::random();
    let records: Vec<_> = scanner
        .scan(seq)
        .unwrap()
        .map(|o| o.unwrap())
        .collect();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.sequence_id == seq));
}

#[test]
fn test_unified_fallback_option() {
    let dir = tempfile::tempdir().unwrap();
    fake_process(dir.path(), 5, Some("0::/user.slice/session-1.scope\n"), None, None);

    let strict = scanner_for(dir.path());
    assert!(strict.observe(5, SequenceId(1)).is_err());

    let lenient = ProcessScanner::new(ScannerOptions {
        root: dir.path().to_path_buf(),
        unified_fallback: true,
        ..Default::default()
    })
    .unwrap();
    let record = lenient.observe(5, SequenceId(1)).unwrap();
    assert_eq!(record.cgroup, "/user.slice/session-1.scope");
}

#[test]
fn test_scan_of_missing_registry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = scanner_for(&dir.path().join("gone"));
    assert!(scanner.scan(SequenceId(1)).is_err());
}
