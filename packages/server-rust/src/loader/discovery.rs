//! Scans the deployment directory and collects operation metadata.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::{DiscoveryError, ModuleLoadError};
use super::host::ModuleHost;
use super::metadata::OperationMetadata;
use super::pattern::GlobPattern;

/// Discovers every operation exported by the modules under `dir`.
///
/// Module files are all regular files below `dir` (recursively) whose file
/// name matches `pattern`. They are described in sorted path order, and a
/// module's operations keep its declaration order, so the result is
/// deterministic. A module that fails to describe itself is logged and
/// skipped. Duplicate names are left in place for the catalog to resolve.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the pattern is invalid or `dir` is missing,
/// not a directory, or unreadable.
pub async fn discover(
    dir: &Path,
    pattern: &str,
    host: &dyn ModuleHost,
    describe_timeout: Duration,
) -> Result<Vec<OperationMetadata>, DiscoveryError> {
    let pattern = GlobPattern::new(pattern)?;
    check_directory(dir).await?;

    let candidates = collect_candidates(dir, &pattern).await?;
    debug!(
        dir = %dir.display(),
        pattern = pattern.as_str(),
        candidates = candidates.len(),
        "module candidates collected"
    );

    let mut operations = Vec::new();
    for path in candidates {
        let described = tokio::time::timeout(describe_timeout, host.describe(&path))
            .await
            .unwrap_or_else(|_| {
                Err(ModuleLoadError::Timeout {
                    path: path.clone(),
                    timeout_ms: u64::try_from(describe_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            });

        let manifest = match described {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(
                    module = %path.display(),
                    error = %err,
                    "skipping module that failed to load"
                );
                continue;
            }
        };

        let identity = manifest.identity();
        let mut exported = 0usize;
        for descriptor in manifest.operations {
            if descriptor.name.trim().is_empty() {
                warn!(
                    module = %path.display(),
                    type_name = %descriptor.type_name,
                    "skipping operation with a blank name"
                );
                continue;
            }
            operations.push(OperationMetadata::from_descriptor(descriptor, &path, &identity));
            exported += 1;
        }
        info!(
            module = %path.display(),
            identity = %identity,
            operations = exported,
            "module described"
        );
    }

    Ok(operations)
}

async fn check_directory(dir: &Path) -> Result<(), DiscoveryError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DiscoveryError::NotADirectory {
            path: dir.to_path_buf(),
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(DiscoveryError::MissingDirectory {
                path: dir.to_path_buf(),
            })
        }
        Err(err) => Err(DiscoveryError::Unreadable {
            path: dir.to_path_buf(),
            source: Arc::new(err),
        }),
    }
}

/// Walks `root` and returns matching regular files in sorted order.
///
/// Failure to read `root` itself is an error; unreadable subdirectories are
/// logged and skipped. Each directory is entered once by canonical path, so
/// symlinks that point back up the tree cannot loop the walk.
async fn collect_candidates(
    root: &Path,
    pattern: &GlobPattern,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        match tokio::fs::canonicalize(&dir).await {
            Ok(canonical) => {
                if !visited.insert(canonical) {
                    debug!(dir = %dir.display(), "directory already scanned");
                    continue;
                }
            }
            Err(err) if dir == root => {
                return Err(DiscoveryError::Unreadable {
                    path: dir,
                    source: Arc::new(err),
                })
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unresolvable directory");
                continue;
            }
        }

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if dir == root => {
                return Err(DiscoveryError::Unreadable {
                    path: dir,
                    source: Arc::new(err),
                })
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "stopped reading directory early");
                    break;
                }
            };
            let path = entry.path();
            // Follows symlinks, so linked module files are picked up too.
            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if meta.is_dir() {
                pending.push(path);
            } else if meta.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| pattern.matches(name))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
