mod bridge;
mod engine;
mod error;
mod instance;
mod interpreter;
mod loader;
mod module;
mod parse;
mod value;

pub use bridge::{InvocationBridge, InvocationResult, ReportSink, StdoutSink};
pub use engine::Engine;
pub use error::HostError;
pub use instance::Instance;
pub use interpreter::Trap;
pub use loader::{ModuleLoader, ModuleSource};
pub use module::Module;
pub use value::{Ty, Val, WasmArgs, WasmResults, WasmVal};
