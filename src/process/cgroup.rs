//! Cgroup membership from `/proc/<pid>/cgroup`.
//!
//! Each line is `id:controller-list:path`. The record whose controller list
//! contains `pids` determines the process' cgroup.

use std::fs;
use std::path::Path;

use crate::error::CgroupError;

const PIDS_CONTROLLER: &str = "pids";

/// Selects the `pids` cgroup path from a cgroup document.
///
/// With `unified_fallback`, a cgroup v2 record (`0::<path>`) is used when no
/// `pids` record exists.
pub fn parse_pids_cgroup(content: &str, unified_fallback: bool) -> Option<String> {
    let mut unified = None;

    for line in content.lines() {
        let mut fields = line.splitn(3, ':');
        let (Some(id), Some(controllers), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if path.is_empty() {
            continue;
        }
        if controllers.split(',').any(|c| c == PIDS_CONTROLLER) {
            return Some(path.to_string());
        }
        if id == "0" && controllers.is_empty() && unified.is_none() {
            unified = Some(path);
        }
    }

    if unified_fallback {
        unified.map(str::to_string)
    } else {
        None
    }
}

/// Reads and resolves `<proc_path>/cgroup`.
pub fn read_cgroup(proc_path: &Path, unified_fallback: bool) -> Result<String, CgroupError> {
    let content = fs::read_to_string(proc_path.join("cgroup"))?;
    parse_pids_cgroup(&content, unified_fallback).ok_or(CgroupError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_DOC: &str = "12:pids:/user.slice/foo.slice\n11:cpu:/other";

    #[test]
    fn test_parse_pids_record() {
        assert_eq!(
            parse_pids_cgroup(V1_DOC, false),
            Some("/user.slice/foo.slice".to_string())
        );
    }

    #[test]
    fn test_parse_pids_in_controller_list() {
        let doc = "4:cpu,pids,memory:/system.slice/sshd.service\n1:name=systemd:/";
        assert_eq!(
            parse_pids_cgroup(doc, false),
            Some("/system.slice/sshd.service".to_string())
        );
    }

    #[test]
    fn test_parse_no_pids_record() {
        assert_eq!(parse_pids_cgroup("11:cpu:/other\n3:memory:/m", false), None);
        assert_eq!(parse_pids_cgroup("", false), None);
        // Controller names are matched exactly
        assert_eq!(parse_pids_cgroup("5:pidsx:/nope", false), None);
    }

    #[test]
    fn test_parse_path_with_colons() {
        let doc = "7:pids:/kubepods/pod:abc:def";
        assert_eq!(
            parse_pids_cgroup(doc, false),
            Some("/kubepods/pod:abc:def".to_string())
        );
    }

    #[test]
    fn test_unified_fallback() {
        let doc = "0::/user.slice/user-1000.slice/session-2.scope\n";
        assert_eq!(parse_pids_cgroup(doc, false), None);
        assert_eq!(
            parse_pids_cgroup(doc, true),
            Some("/user.slice/user-1000.slice/session-2.scope".to_string())
        );
        // pids record wins over the unified one
        let mixed = "0::/unified\n9:pids:/legacy";
        assert_eq!(parse_pids_cgroup(mixed, true), Some("/legacy".to_string()));
    }

    #[test]
    fn test_read_cgroup_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cgroup"), "11:cpu:/other\n").unwrap();
        assert!(matches!(
            read_cgroup(dir.path(), false),
            Err(CgroupError::NotFound)
        ));
    }

    #[test]
    fn test_read_cgroup_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        match read_cgroup(dir.path(), false) {
            Err(CgroupError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected io error, got {:?}", other),
        }
    }
}
