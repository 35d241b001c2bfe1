use std::collections::HashMap;

use crate::engine::Engine;
use crate::parse::func::{FuncIdx, ParsedFunction};
use crate::parse::{self, ConstInit, DataDecl, MemoryDecl};
use crate::value::Ty;
use crate::HostError;

/// A validated and decoded module (immutable).
///
/// Everything that can reject the artifact happens before a `Module`
/// exists: wasmparser validation, body decoding, and the supported-feature
/// checks. Runtime state (memory, globals) lives on [`crate::Instance`].
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) funcs: Vec<ParsedFunction>,
    pub(crate) exports: HashMap<String, FuncIdx>,
    pub(crate) memory: Option<MemoryDecl>,
    pub(crate) globals: Vec<ConstInit>,
    pub(crate) data: Vec<DataDecl>,
}

impl Module {
    /// Parse a WAT string into a module.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, HostError> {
        let bytes =
            wat::parse_str(wat).map_err(|e| HostError::Instantiation(e.to_string()))?;
        Self::from_bytes(engine, &bytes)
    }

    /// Create a module from raw bytes.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, HostError> {
        let parsed = parse::parse(engine, bytes)?;
        Ok(Module {
            funcs: parsed.funcs,
            exports: parsed.exports,
            memory: parsed.memory,
            globals: parsed.globals,
            data: parsed.data,
        })
    }

    /// Exported function names with their signatures, sorted by name.
    pub fn exports(&self) -> Vec<(&str, &[Ty], &[Ty])> {
        let mut out: Vec<_> = self
            .exports
            .iter()
            .map(|(name, idx)| {
                let func = &self.funcs[idx.0 as usize];
                (name.as_str(), &func.params[..], &func.results[..])
            })
            .collect();
        out.sort_by_key(|(name, ..)| *name);
        out
    }

    pub(crate) fn get_func(&self, func_idx: FuncIdx) -> &ParsedFunction {
        &self.funcs[func_idx.0 as usize]
    }
}
