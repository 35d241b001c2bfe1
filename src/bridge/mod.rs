//! Typed calls into a loaded module, and result delivery.
//!
//! The bridge owns the handle produced by the loader, validates the export
//! name and argument shape before any module code runs, and formats the
//! outcome for a [`ReportSink`]. Every call is a single attempt: the
//! module is treated as a stateless function, so failures are not
//! transient and nothing is retried.

use crate::instance::Instance;
use crate::value::Val;
use crate::HostError;

/// Textual surface that receives one formatted line per invocation.
pub trait ReportSink {
    fn publish(&mut self, line: &str);
}

/// Sink writing to standard output.
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn publish(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Return value(s) of a single export call, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub export: String,
    pub args: Vec<Val>,
    pub values: Vec<Val>,
}

impl InvocationResult {
    /// The report line: `Hello World! <export>Result: <value>`.
    pub fn report(&self) -> String {
        format!("Hello World! {}Result: {}", self.export, self)
    }
}

/// Decimal rendering of the returned value(s).
impl std::fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for val in &self.values {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{val}")?;
        }
        Ok(())
    }
}

/// Holds a module handle and drives single-shot invocations.
pub struct InvocationBridge {
    instance: Instance,
}

impl InvocationBridge {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Call a named export with validated arguments.
    ///
    /// Checks run in order, all before any module code executes: export
    /// lookup ([`HostError::ExportNotFound`]), then argument arity/type
    /// validation ([`HostError::ArgumentMismatch`]). A fault inside the
    /// module surfaces as [`HostError::Trap`].
    pub fn invoke(&mut self, export: &str, args: &[Val]) -> Result<InvocationResult, HostError> {
        tracing::debug!(export, ?args, "invoking");
        let values = self.instance.call_dynamic(export, args)?;
        tracing::debug!(export, ?values, "invocation returned");
        Ok(InvocationResult {
            export: export.to_string(),
            args: args.to_vec(),
            values,
        })
    }

    /// Invoke, then publish the report line to `sink`.
    ///
    /// On any failure the sink receives nothing and the error propagates.
    pub fn run_report(
        &mut self,
        sink: &mut dyn ReportSink,
        export: &str,
        args: &[Val],
    ) -> Result<InvocationResult, HostError> {
        let result = self.invoke(export, args)?;
        sink.publish(&result.report());
        Ok(result)
    }
}
