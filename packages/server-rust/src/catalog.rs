//! Operation catalog: name to metadata, built once per discovery run.
//!
//! A catalog is never mutated after construction. Reloading builds a new one
//! and swaps it into the shared [`CatalogHandle`], so readers always see a
//! complete catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::loader::{discover, DiscoveryError, ModuleCoordinates, ModuleHost, OperationMetadata};

// ---------------------------------------------------------------------------
// OperationCatalog
// ---------------------------------------------------------------------------

/// An operation name that lost to an earlier registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOperation {
    /// Name as spelled by the skipped operation.
    pub name: String,
    /// Where the kept operation lives.
    pub kept: ModuleCoordinates,
    /// Where the skipped operation lives.
    pub skipped: ModuleCoordinates,
}

/// Immutable, ordered set of operations with a case-insensitive name index.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<OperationMetadata>,
    index: HashMap<String, usize>,
    duplicates: Vec<DuplicateOperation>,
}

impl OperationCatalog {
    /// Creates a catalog with no operations.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a catalog from discovered metadata, in order.
    ///
    /// The first operation registered under a name wins. Later ones with the
    /// same name (compared case-insensitively) are logged and recorded in
    /// [`duplicates`](Self::duplicates).
    #[must_use]
    pub fn from_metadata(metadata: impl IntoIterator<Item = OperationMetadata>) -> Self {
        let mut catalog = Self::default();
        for operation in metadata {
            let key = operation.name.to_lowercase();
            if let Some(&kept) = catalog.index.get(&key) {
                let kept = &catalog.operations[kept];
                warn!(
                    name = %operation.name,
                    kept_module = %kept.coordinates.path.display(),
                    kept_type = %kept.coordinates.type_name,
                    skipped_module = %operation.coordinates.path.display(),
                    skipped_type = %operation.coordinates.type_name,
                    "duplicate operation name; keeping the first registration"
                );
                catalog.duplicates.push(DuplicateOperation {
                    name: operation.name,
                    kept: kept.coordinates.clone(),
                    skipped: operation.coordinates,
                });
                continue;
            }
            catalog.index.insert(key, catalog.operations.len());
            catalog.operations.push(operation);
        }
        catalog
    }

    /// Finds an operation by exact name, ignoring case.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&OperationMetadata> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.operations[position])
    }

    /// All operations in registration order.
    #[must_use]
    pub fn list(&self) -> &[OperationMetadata] {
        &self.operations
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` when no operation was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Registrations skipped because their name was already taken.
    #[must_use]
    pub fn duplicates(&self) -> &[DuplicateOperation] {
        &self.duplicates
    }
}

/// Discovers the modules under `dir` and builds a catalog from them.
///
/// # Errors
///
/// Propagates [`DiscoveryError`] from [`discover`].
pub async fn build_catalog(
    dir: &Path,
    pattern: &str,
    host: &dyn ModuleHost,
    describe_timeout: Duration,
) -> Result<OperationCatalog, DiscoveryError> {
    let metadata = discover(dir, pattern, host, describe_timeout).await?;
    let catalog = OperationCatalog::from_metadata(metadata);
    info!(
        dir = %dir.display(),
        operations = catalog.len(),
        duplicates = catalog.duplicates().len(),
        "operation catalog built"
    );
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// CatalogHandle
// ---------------------------------------------------------------------------

/// Shared, atomically swappable reference to the current catalog.
#[derive(Debug)]
pub struct CatalogHandle {
    current: ArcSwap<OperationCatalog>,
}

impl CatalogHandle {
    /// Wraps an initial catalog.
    #[must_use]
    pub fn new(catalog: OperationCatalog) -> Self {
        Self {
            current: ArcSwap::from_pointee(catalog),
        }
    }

    /// Snapshot of the current catalog. Holding it does not block reloads.
    #[must_use]
    pub fn load(&self) -> Arc<OperationCatalog> {
        self.current.load_full()
    }

    /// Replaces the current catalog.
    pub fn replace(&self, catalog: OperationCatalog) {
        self.current.store(Arc::new(catalog));
    }

    /// Rebuilds the catalog from disk and swaps it in. Returns the new size.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] and keeps the previous catalog when the
    /// directory cannot be scanned.
    pub async fn reload(
        &self,
        dir: &Path,
        pattern: &str,
        host: &dyn ModuleHost,
        describe_timeout: Duration,
    ) -> Result<usize, DiscoveryError> {
        let catalog = build_catalog(dir, pattern, host, describe_timeout).await?;
        let size = catalog.len();
        self.replace(catalog);
        Ok(size)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
