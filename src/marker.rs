// src/marker.rs

//! DAG marker files.
//!
//! A marker maps a remote workunit back to the DAG that owns it, so tools
//! that only see a result name can find and update the right DAG. Markers
//! live at `<project>/dag_lists/<workunit>` and hold one line:
//! `"<owner uid> <absolute dag path>\n"`.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::errors::{DagError, Result};

pub const MARKER_DIR: &str = "dag_lists";

const RESULT_NAME_PATTERN: &str = r"^(.*)_\d*$";

pub fn marker_path(project: &Path, workunit: &str) -> PathBuf {
    project.join(MARKER_DIR).join(workunit)
}

/// Write the marker for `workunit`. The `dag_lists` directory must exist.
pub fn write_marker(project: &Path, workunit: &str, dag_path: &Path) -> Result<PathBuf> {
    let dir = project.join(MARKER_DIR);
    if !dir.is_dir() {
        return Err(DagError::Config(format!(
            "missing {MARKER_DIR} in project directory: {}",
            project.display()
        )));
    }

    let dag_path = std::path::absolute(dag_path)?;
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    let path = marker_path(project, workunit);
    fs::write(&path, format!("{uid} {}\n", dag_path.display()))?;
    Ok(path)
}

/// DAG path recorded in a marker file.
pub fn read_marker(path: &Path) -> Result<PathBuf> {
    let contents = fs::read_to_string(path)?;
    let line = contents.lines().next().unwrap_or_default();
    let (_uid, dag_path) = line
        .split_once(' ')
        .ok_or_else(|| DagError::Config(format!("malformed DAG marker: {}", path.display())))?;
    Ok(PathBuf::from(dag_path.trim()))
}

/// Workunit name of a result named `<workunit>_<n>`.
pub fn workunit_from_result(result_name: &str) -> Option<String> {
    let re = Regex::new(RESULT_NAME_PATTERN).ok()?;
    re.captures(result_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find the DAG file that owns a remote result.
pub fn result_to_dag_path(project: &Path, result_name: &str) -> Result<PathBuf> {
    let workunit = workunit_from_result(result_name).ok_or_else(|| {
        DagError::InvalidArguments(format!("Malformed result name: {result_name}"))
    })?;
    let path = marker_path(project, &workunit);
    if !path.is_file() {
        return Err(DagError::NoSuchProcess(format!(
            "{workunit} (no DAG marker at {})",
            path.display()
        )));
    }
    read_marker(&path)
}
