use crate::interpreter::Trap;

/// Everything that can go wrong between "here is a source location" and
/// "the sink got its line". None of these are recovered locally: each one
/// aborts the load→invoke→report sequence.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Module bytes could not be retrieved (missing file, transport failure).
    #[error("failed to load `{location}`: {reason}")]
    Load { location: String, reason: String },

    /// Retrieved bytes are not a valid module for this runtime.
    #[error("invalid module: {0}")]
    Instantiation(String),

    /// The requested export is absent from the module's export table.
    #[error("export `{0}` not found")]
    ExportNotFound(String),

    /// Caller-provided arguments (or expected results) do not match the
    /// export's declared signature. Raised before any module code runs.
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// The module faulted during execution.
    #[error("trap: {0}")]
    Trap(#[from] Trap),
}
