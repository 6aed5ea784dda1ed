//! Module-side runtime.
//!
//! A deployable module is an executable whose `main` builds a
//! [`ModuleDefinition`] (its explicit list of exported operation
//! constructors) and hands it to [`run_module`]. The runtime answers the two
//! protocol commands described in [`crate::protocol`].

use std::process::ExitCode;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::operation::{Operation, OperationFault};
use crate::protocol::{
    InvokeReply, InvokeRequest, ModuleManifest, OperationDescriptor, DESCRIBE_COMMAND,
    INVOKE_COMMAND,
};

/// Constructor for a fresh operation instance.
pub type OperationConstructor = fn() -> Box<dyn Operation>;

// ---------------------------------------------------------------------------
// ExportedOperation
// ---------------------------------------------------------------------------

/// One operation type exported by a module.
#[derive(Clone)]
pub struct ExportedOperation {
    type_name: String,
    construct: OperationConstructor,
}

impl ExportedOperation {
    /// Exports `T`, using its fully-qualified Rust type name as the type name.
    #[must_use]
    pub fn of<T: Operation + Default + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>().to_string(),
            construct: construct_default::<T>,
        }
    }

    /// Exports an operation under an explicit type name.
    #[must_use]
    pub fn new(type_name: impl Into<String>, construct: OperationConstructor) -> Self {
        Self {
            type_name: type_name.into(),
            construct,
        }
    }

    /// Fully-qualified type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Builds a fresh instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Operation> {
        (self.construct)()
    }
}

impl std::fmt::Debug for ExportedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedOperation")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn construct_default<T: Operation + Default + 'static>() -> Box<dyn Operation> {
    Box::new(T::default())
}

// ---------------------------------------------------------------------------
// ModuleDefinition
// ---------------------------------------------------------------------------

/// Explicit registration list of a module.
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    name: String,
    version: String,
    exports: Vec<ExportedOperation>,
}

impl ModuleDefinition {
    /// Starts an empty definition. Modules normally pass
    /// `env!("CARGO_PKG_NAME")` and `env!("CARGO_PKG_VERSION")`.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            exports: Vec::new(),
        }
    }

    /// Exports `T` under its Rust type name.
    #[must_use]
    pub fn export<T: Operation + Default + 'static>(mut self) -> Self {
        self.exports.push(ExportedOperation::of::<T>());
        self
    }

    /// Exports an explicitly named constructor.
    #[must_use]
    pub fn export_with(
        mut self,
        type_name: impl Into<String>,
        construct: OperationConstructor,
    ) -> Self {
        self.exports.push(ExportedOperation::new(type_name, construct));
        self
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exports in declaration order.
    #[must_use]
    pub fn exports(&self) -> &[ExportedOperation] {
        &self.exports
    }

    /// Instantiates each export once to read its static metadata. These
    /// instances are dropped before this returns.
    #[must_use]
    pub fn manifest(&self) -> ModuleManifest {
        let operations = self
            .exports
            .iter()
            .map(|export| {
                let instance = export.instantiate();
                OperationDescriptor {
                    name: instance.name().to_string(),
                    description: instance.description().to_string(),
                    parameters: instance.parameters(),
                    type_name: export.type_name.clone(),
                }
            })
            .collect();

        ModuleManifest {
            module: self.name.clone(),
            version: self.version.clone(),
            operations,
        }
    }

    /// Builds a fresh instance of `type_name`, if exported.
    #[must_use]
    pub fn instantiate(&self, type_name: &str) -> Option<Box<dyn Operation>> {
        self.exports
            .iter()
            .find(|export| export.type_name == type_name)
            .map(ExportedOperation::instantiate)
    }

    /// Instantiates `type_name` and runs it against `ctx`.
    ///
    /// The operation runs on its own task so that a panic is reported as a
    /// `Panicked` fault instead of tearing the module down mid-reply.
    pub async fn invoke(&self, type_name: &str, ctx: ExecutionContext) -> InvokeReply {
        let Some(operation) = self.instantiate(type_name) else {
            return InvokeReply::UnknownType {
                type_name: type_name.to_string(),
            };
        };

        debug!(module = %self.name, type_name, "invoking operation");

        let mut task = AbortOnDrop(tokio::spawn(async move { operation.execute(&ctx).await }));
        match (&mut task.0).await {
            Ok(Ok(output)) => InvokeReply::Completed { output },
            Ok(Err(fault)) => InvokeReply::Faulted { fault },
            Err(join_err) => InvokeReply::Faulted {
                fault: OperationFault::new("Panicked", join_err.to_string())
                    .with_data("typeName", type_name),
            },
        }
    }
}

/// Aborts the operation task when the caller stops waiting for it.
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Runtime entry points
// ---------------------------------------------------------------------------

/// Errors raised by the module runtime itself (not by operations).
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("usage: <module> describe | <module> invoke <type-name> (got {0:?})")]
    Usage(Vec<String>),
    #[error("invoke request names type {requested} but the command line names {expected}")]
    TypeMismatch { expected: String, requested: String },
    #[error("no invoke request on stdin")]
    MissingRequest,
    #[error("malformed invoke request: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode reply: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs a module's `main`: answers `describe` or `invoke` over stdio.
///
/// Exit status is `0` when a reply was written, `2` on a runtime error
/// (reported on stderr). Operation faults are replies, not runtime errors.
pub async fn run_module(definition: &ModuleDefinition) -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();

    match serve_command(definition, &args, input, output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = tokio::io::stderr();
            // Nothing else can be reported if stderr is gone.
            let _ = stderr.write_all(format!("{err}\n").as_bytes()).await;
            ExitCode::from(2)
        }
    }
}

/// Answers one protocol command using the given streams.
///
/// # Errors
///
/// Returns [`ModuleError`] for bad arguments, a missing or malformed request,
/// or I/O failures on the streams.
pub async fn serve_command<R, W>(
    definition: &ModuleDefinition,
    args: &[String],
    mut input: R,
    mut output: W,
) -> Result<(), ModuleError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match args {
        [command] if command == DESCRIBE_COMMAND => {
            let line = serde_json::to_string(&definition.manifest()).map_err(ModuleError::Encode)?;
            write_line(&mut output, &line).await
        }
        [command, type_name] if command == INVOKE_COMMAND => {
            let mut line = String::new();
            if input.read_line(&mut line).await? == 0 {
                return Err(ModuleError::MissingRequest);
            }
            let request: InvokeRequest =
                serde_json::from_str(line.trim()).map_err(ModuleError::Decode)?;
            if request.type_name != *type_name {
                return Err(ModuleError::TypeMismatch {
                    expected: type_name.clone(),
                    requested: request.type_name,
                });
            }
            let reply = definition.invoke(type_name, request.context).await;
            let line = serde_json::to_string(&reply).map_err(ModuleError::Encode)?;
            write_line(&mut output, &line).await
        }
        other => Err(ModuleError::Usage(other.to_vec())),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> Result<(), ModuleError> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::operation::{OperationOutput, Parameters};
    use crate::params::RequestParams;

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Greet;

    #[async_trait]
    impl Operation for Greet {
        fn name(&self) -> &str {
            "Greet"
        }

        fn description(&self) -> &str {
            "Says hello"
        }

        fn parameters(&self) -> Parameters {
            Parameters::new().with("Name", "string: who to greet")
        }

        async fn execute(&self, ctx: &ExecutionContext) -> Result<OperationOutput, OperationFault> {
            let name = ctx.param("Name").unwrap_or("World");
            Ok(OperationOutput::new(json!({ "message": format!("Hello {name}") })))
        }
    }

    struct Counted;

    #[async_trait]
    impl Operation for Counted {
        fn name(&self) -> &str {
            "Counted"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<OperationOutput, OperationFault> {
            Err(OperationFault::failed("always fails"))
        }
    }

    fn new_counted() -> Box<dyn Operation> {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Box::new(Counted)
    }

    #[derive(Default)]
    struct Panics;

    #[async_trait]
    impl Operation for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<OperationOutput, OperationFault> {
            panic!("boom");
        }
    }

    static STALLS_DROPPED: AtomicUsize = AtomicUsize::new(0);

    struct NoteDrop;

    impl Drop for NoteDrop {
        fn drop(&mut self) {
            STALLS_DROPPED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Stall;

    #[async_trait]
    impl Operation for Stall {
        fn name(&self) -> &str {
            "Stall"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<OperationOutput, OperationFault> {
            let _note = NoteDrop;
            std::future::pending::<()>().await;
            Ok(OperationOutput::new(Value::Null))
        }
    }

    fn definition() -> ModuleDefinition {
        ModuleDefinition::new("test-module", "1.2.3")
            .export::<Greet>()
            .export_with("tests::Counted", new_counted)
            .export::<Panics>()
    }

    fn ctx(pairs: &[(&str, &str)]) -> ExecutionContext {
        let params: RequestParams = pairs.iter().copied().collect();
        ExecutionContext::new("req", params, "http://localhost/dataservice")
    }

    #[test]
    fn exported_type_name_is_fully_qualified() {
        let export = ExportedOperation::of::<Greet>();
        assert!(export.type_name().ends_with("module::tests::Greet"));
    }

    #[test]
    fn manifest_probes_each_export() {
        let before = CONSTRUCTED.load(Ordering::SeqCst);
        let manifest = definition().manifest();
        assert!(CONSTRUCTED.load(Ordering::SeqCst) > before);

        assert_eq!(manifest.module, "test-module");
        assert_eq!(manifest.version, "1.2.3");
        let names: Vec<_> = manifest.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Greet", "Counted", "Panics"]);
        assert_eq!(manifest.operations[0].description, "Says hello");
        assert_eq!(
            manifest.operations[0].parameters.get("Name"),
            Some("string: who to greet")
        );
        assert_eq!(manifest.operations[1].type_name, "tests::Counted");
    }

    #[tokio::test]
    async fn invoke_completes() {
        let def = definition();
        let type_name = std::any::type_name::<Greet>();
        let reply = def.invoke(type_name, ctx(&[("name", "Ada")])).await;
        match reply {
            InvokeReply::Completed { output } => {
                assert_eq!(output.model, json!({ "message": "Hello Ada" }));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invoke_reports_fault_and_unknown_type() {
        let def = definition();
        let reply = def.invoke("tests::Counted", ctx(&[])).await;
        assert!(matches!(
            reply,
            InvokeReply::Faulted { fault } if fault.message == "always fails"
        ));

        let reply = def.invoke("nope::Missing", ctx(&[])).await;
        assert!(matches!(
            reply,
            InvokeReply::UnknownType { type_name } if type_name == "nope::Missing"
        ));
    }

    #[tokio::test]
    async fn abandoned_invoke_aborts_operation_task() {
        let def = ModuleDefinition::new("stall-module", "0.1.0").export::<Stall>();
        let invoke = def.invoke(std::any::type_name::<Stall>(), ctx(&[]));
        assert!(tokio::time::timeout(Duration::from_millis(20), invoke)
            .await
            .is_err());

        for _ in 0..50 {
            if STALLS_DROPPED.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(STALLS_DROPPED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invoke_turns_panic_into_fault() {
        let def = definition();
        let reply = def.invoke(std::any::type_name::<Panics>(), ctx(&[])).await;
        assert!(matches!(reply, InvokeReply::Faulted { fault } if fault.kind == "Panicked"));
    }

    #[tokio::test]
    async fn serve_describe_writes_manifest_line() {
        let def = definition();
        let mut out = Vec::new();
        serve_command(&def, &["describe".to_string()], &b""[..], &mut out)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        let manifest: ModuleManifest = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(manifest.operations.len(), 3);
    }

    #[tokio::test]
    async fn serve_invoke_reads_request_and_writes_reply() {
        let def = definition();
        let type_name = std::any::type_name::<Greet>().to_string();
        let request = InvokeRequest {
            type_name: type_name.clone(),
            context: ctx(&[("Name", "Grace")]),
        };
        let input = format!("{}\n", serde_json::to_string(&request).unwrap());
        let mut out = Vec::new();
        serve_command(
            &def,
            &["invoke".to_string(), type_name],
            input.as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
        let reply: InvokeReply = serde_json::from_slice(&out).unwrap();
        assert!(matches!(
            reply,
            InvokeReply::Completed { output } if output.model["message"] == "Hello Grace"
        ));
    }

    #[tokio::test]
    async fn serve_rejects_bad_usage_and_empty_input() {
        let def = definition();
        let err = serve_command(&def, &[], &b""[..], Vec::new()).await.unwrap_err();
        assert!(matches!(err, ModuleError::Usage(_)));

        let args = ["invoke".to_string(), "tests::Counted".to_string()];
        let err = serve_command(&def, &args, &b""[..], Vec::new()).await.unwrap_err();
        assert!(matches!(err, ModuleError::MissingRequest));

        let err = serve_command(&def, &args, &b"not json\n"[..], Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::Decode(_)));
    }

    #[tokio::test]
    async fn serve_rejects_type_mismatch() {
        let def = definition();
        let request = InvokeRequest {
            type_name: "tests::Counted".to_string(),
            context: ctx(&[]),
        };
        let input = serde_json::to_string(&request).unwrap();
        let args = ["invoke".to_string(), "other::Type".to_string()];
        let err = serve_command(&def, &args, input.as_bytes(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::TypeMismatch { .. }));
    }
}
