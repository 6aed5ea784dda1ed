//! `DataService` core: the `Operation` capability, execution context, module
//! wire protocol and the module-side runtime.

pub mod context;
pub mod extras;
pub mod module;
pub mod operation;
pub mod params;
pub mod protocol;

pub use async_trait::async_trait;
pub use context::ExecutionContext;
pub use extras::Extras;
pub use module::{run_module, serve_command, ExportedOperation, ModuleDefinition, ModuleError};
pub use operation::{Operation, OperationFault, OperationOutput, Parameters, RenderMode};
pub use params::RequestParams;
pub use protocol::{InvokeReply, InvokeRequest, ModuleManifest, OperationDescriptor};
