use std::path::{Path, PathBuf};

use dataservice_core::{OperationDescriptor, Parameters};

/// Where an operation lives: enough to load it again for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCoordinates {
    /// Module file discovered in the deployment directory.
    pub path: PathBuf,
    /// Fully-qualified type name the module resolves on `invoke`.
    pub type_name: String,
    /// `"<module> <version>"` as reported by the module.
    pub module_identity: String,
}

/// Static description of one discovered operation, created during
/// discovery and never mutated.
#[derive(Debug, Clone)]
pub struct OperationMetadata {
    /// Dispatch name, unique case-insensitively within a catalog.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// Declared parameters in declaration order.
    pub parameters: Parameters,
    /// Load coordinates.
    pub coordinates: ModuleCoordinates,
}

impl OperationMetadata {
    /// Builds metadata from one manifest entry of the module at `path`.
    #[must_use]
    pub fn from_descriptor(
        descriptor: OperationDescriptor,
        path: &Path,
        module_identity: &str,
    ) -> Self {
        Self {
            name: descriptor.name,
            description: descriptor.description,
            parameters: descriptor.parameters,
            coordinates: ModuleCoordinates {
                path: path.to_path_buf(),
                type_name: descriptor.type_name,
                module_identity: module_identity.to_string(),
            },
        }
    }
}
