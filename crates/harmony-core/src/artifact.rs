//! Locates build outputs on disk without running a build.
//!
//! The build wrapper's output layout drifted across toolchain versions, so
//! a short ordered list of plausible layouts is probed and the first hit
//! wins. A miss is not an error: the report carries the most-likely path
//! so the caller can tell the user where the artifact *would* be.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::target::BuildTarget;

/// Parameters identifying one expected build output.
#[derive(Debug, Clone)]
pub struct ArtifactQuery {
    pub project_dir: PathBuf,
    pub target: BuildTarget,
    pub module: String,
    pub build_mode: String,
    pub product: String,
}

impl ArtifactQuery {
    pub fn new(project_dir: PathBuf, target: BuildTarget) -> Self {
        Self {
            project_dir,
            target,
            module: "entry".to_string(),
            build_mode: "debug".to_string(),
            product: "default".to_string(),
        }
    }
}

/// What the locator found (or where it expected to find it).
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    pub path: String,
    pub exists: bool,
    pub size_bytes: Option<u64>,
    pub modified_time: Option<String>,
    pub target: BuildTarget,
    pub module: Option<String>,
    pub product: String,
    pub build_mode: String,
}

/// Probes the candidate layouts and reports the first existing match.
/// Pure filesystem inspection; never spawns a process.
pub fn find_output(query: &ArtifactQuery) -> ArtifactReport {
    if query.target.is_module_scoped() {
        find_module_output(query)
    } else {
        find_bundle_output(query)
    }
}

fn find_module_output(query: &ArtifactQuery) -> ArtifactReport {
    let candidates = module_candidate_paths(query);

    for candidate in &candidates {
        if candidate.is_file() {
            debug!("artifact found at {}", candidate.display());
            return report(query, candidate, true);
        }
    }

    // Nothing on disk: point the caller at the standard layout.
    report(query, &candidates[0], false)
}

/// Layout variants observed across build-tool versions, most recent first.
/// Extend by appending rows; order is the probe order.
fn module_candidate_paths(query: &ArtifactQuery) -> Vec<PathBuf> {
    let ArtifactQuery {
        project_dir,
        target,
        module,
        build_mode,
        product,
    } = query;
    let suffix = target.suffix();
    let build = project_dir.join(module).join("build");

    vec![
        build
            .join(product)
            .join("outputs")
            .join(product)
            .join(format!("{module}-{product}-signed{suffix}")),
        build
            .join(product)
            .join("outputs")
            .join(build_mode)
            .join(format!("{module}-{product}-signed{suffix}")),
        build.join("outputs").join(format!("{module}-signed{suffix}")),
        build
            .join("outputs")
            .join(build_mode)
            .join(format!("{module}-signed{suffix}")),
        build
            .join("outputs")
            .join(target.as_str())
            .join(build_mode)
            .join(format!("{module}{suffix}")),
    ]
}

/// Bundle artifacts carry the application's own name as the leading
/// filename segment, so candidate *directories* are scanned by suffix
/// instead of probing exact filenames.
fn find_bundle_output(query: &ArtifactQuery) -> ArtifactReport {
    let ArtifactQuery {
        project_dir,
        target,
        build_mode,
        product,
        ..
    } = query;
    let suffix = target.suffix();
    let build = project_dir.join("build");

    let scan: [(PathBuf, String); 3] = [
        (
            build.join(product).join("outputs").join(product),
            format!("-{product}-signed{suffix}"),
        ),
        (
            build.join(product).join("outputs").join(build_mode),
            format!("-{product}-signed{suffix}"),
        ),
        (
            build.join("outputs").join("app").join(build_mode),
            suffix.to_string(),
        ),
    ];

    for (dir, wanted_suffix) in &scan {
        if let Some(found) = newest_with_suffix(dir, wanted_suffix) {
            debug!("bundle artifact found at {}", found.display());
            return report(query, &found, true);
        }
    }

    let expected = build
        .join(product)
        .join("outputs")
        .join(product)
        .join(format!("app-signed{suffix}"));
    report(query, &expected, false)
}

fn newest_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
        })
        .max_by_key(|path| {
            path.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH)
        })
}

fn report(query: &ArtifactQuery, path: &Path, exists: bool) -> ArtifactReport {
    let (size_bytes, modified_time) = if exists {
        match path.metadata() {
            Ok(meta) => {
                let modified = meta
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Local>::from(t).to_rfc3339());
                (Some(meta.len()), modified)
            }
            Err(_) => (None, None),
        }
    } else {
        (None, None)
    };

    ArtifactReport {
        path: path.display().to_string(),
        exists,
        size_bytes,
        modified_time,
        target: query.target,
        module: query
            .target
            .is_module_scoped()
            .then(|| query.module.clone()),
        product: query.product.clone(),
        build_mode: query.build_mode.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_artifact(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn standard_module_layout_is_found_first() {
        let dir = tempdir().unwrap();
        let artifact = dir
            .path()
            .join("entry/build/default/outputs/default/entry-default-signed.hap");
        write_artifact(&artifact, b"hap-bytes");

        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::Hap);
        let out = find_output(&query);

        assert!(out.exists);
        assert_eq!(out.path, artifact.display().to_string());
        assert_eq!(out.size_bytes, Some(9));
        assert!(out.modified_time.is_some());
        assert_eq!(out.module.as_deref(), Some("entry"));
    }

    #[test]
    fn legacy_layout_is_probed_as_fallback() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("entry/build/outputs/hap/debug/entry.hap");
        write_artifact(&artifact, b"old-layout");

        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::Hap);
        let out = find_output(&query);

        assert!(out.exists);
        assert_eq!(out.path, artifact.display().to_string());
    }

    #[test]
    fn missing_artifact_reports_best_guess_path_not_error() {
        let dir = tempdir().unwrap();
        // Only the hap layout exists on disk; ask for an hsp.
        write_artifact(
            &dir.path()
                .join("entry/build/default/outputs/default/entry-default-signed.hap"),
            b"hap",
        );

        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::Hsp);
        let out = find_output(&query);

        assert!(!out.exists);
        assert!(out.path.ends_with("entry-default-signed.hsp"));
        assert_eq!(out.size_bytes, None);
        assert_eq!(out.modified_time, None);
    }

    #[test]
    fn bundle_artifact_is_discovered_by_suffix_scan() {
        let dir = tempdir().unwrap();
        let artifact = dir
            .path()
            .join("build/default/outputs/default/MyApp-default-signed.app");
        write_artifact(&artifact, b"app-bytes");

        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::App);
        let out = find_output(&query);

        assert!(out.exists);
        assert_eq!(out.path, artifact.display().to_string());
        assert_eq!(out.module, None);
    }

    #[test]
    fn missing_bundle_reports_expected_path() {
        let dir = tempdir().unwrap();
        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::App);
        let out = find_output(&query);

        assert!(!out.exists);
        assert!(out.path.ends_with("app-signed.app"));
    }

    #[test]
    fn locator_is_deterministic_given_fs_state() {
        let dir = tempdir().unwrap();
        let query = ArtifactQuery::new(dir.path().to_path_buf(), BuildTarget::Har);
        let first = find_output(&query);
        let second = find_output(&query);
        assert_eq!(first.path, second.path);
        assert_eq!(first.exists, second.exists);
    }
}
