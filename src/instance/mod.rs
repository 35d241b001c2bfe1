use crate::interpreter;
use crate::module::Module;
use crate::parse::func::FuncIdx;
use crate::parse::ConstInit;
use crate::value::{render_tys, Ty, Val, WasmArgs, WasmResults};
use crate::HostError;

pub(crate) const PAGE_SIZE: usize = 65536;

/// An instantiated module: the ModuleHandle of the host.
///
/// Holds the module's runtime state (linear memory with data segments
/// applied, mutable globals). Constructed only through a path where every
/// failure has already happened, so a handle is always fully callable.
pub struct Instance {
    pub(crate) module: Module,
    pub(crate) memory: Vec<u8>,
    pub(crate) memory_max: Option<u64>,
    pub(crate) globals: Vec<Val>,
}

impl Instance {
    pub fn new(module: &Module) -> Result<Self, HostError> {
        let mut memory = Vec::new();
        let mut memory_max = None;
        if let Some(mem) = module.memory {
            memory.resize(mem.min as usize * PAGE_SIZE, 0);
            memory_max = mem.max;
        }

        // Globals first: data segment offsets may reference them.
        let mut globals: Vec<Val> = Vec::with_capacity(module.globals.len());
        for init in &module.globals {
            let val = resolve_init(*init, &globals)?;
            globals.push(val);
        }

        for seg in &module.data {
            let offset = resolve_init(seg.offset, &globals)?.unwrap_i32() as u32 as usize;
            let end = offset
                .checked_add(seg.bytes.len())
                .filter(|end| *end <= memory.len())
                .ok_or_else(|| {
                    HostError::Instantiation("out of bounds data segment".into())
                })?;
            memory[offset..end].copy_from_slice(&seg.bytes);
        }

        Ok(Self {
            module: module.clone(),
            memory,
            memory_max,
            globals,
        })
    }

    /// Call an exported function by name (typed API).
    ///
    /// Argument and result shapes are checked by the compiler; the declared
    /// signature is still validated before dispatch.
    pub fn call<A: WasmArgs, R: WasmResults>(
        &mut self,
        name: &str,
        args: A,
    ) -> Result<R, HostError> {
        let vals = self.call_dynamic(name, &args.to_vals())?;
        R::from_vals(&vals)
    }

    /// Call an exported function by name (dynamic API).
    ///
    /// Fails with [`HostError::ExportNotFound`] for an unknown name and
    /// [`HostError::ArgumentMismatch`] when `args` do not match the
    /// export's declared arity and types — both before any module code
    /// executes.
    pub fn call_dynamic(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, HostError> {
        let func_idx = self.resolve_export_func_idx(name)?;
        self.check_args(name, func_idx, args)?;
        interpreter::call(self, func_idx, args).map_err(HostError::from)
    }

    /// Declared signature of an exported function: (params, results).
    pub fn export_types(&self, name: &str) -> Result<(&[Ty], &[Ty]), HostError> {
        let func_idx = self.resolve_export_func_idx(name)?;
        let func = self.module.get_func(func_idx);
        Ok((&func.params, &func.results))
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn resolve_export_func_idx(&self, name: &str) -> Result<FuncIdx, HostError> {
        self.module
            .exports
            .get(name)
            .copied()
            .ok_or_else(|| HostError::ExportNotFound(name.to_string()))
    }

    fn check_args(&self, name: &str, func_idx: FuncIdx, args: &[Val]) -> Result<(), HostError> {
        let params = &self.module.get_func(func_idx).params;
        let ok = args.len() == params.len()
            && args.iter().zip(params.iter()).all(|(a, p)| a.ty() == *p);
        if !ok {
            let got: Vec<Ty> = args.iter().map(Val::ty).collect();
            return Err(HostError::ArgumentMismatch(format!(
                "`{name}` expects ({}), got ({})",
                render_tys(params),
                render_tys(&got)
            )));
        }
        Ok(())
    }
}

fn resolve_init(init: ConstInit, globals: &[Val]) -> Result<Val, HostError> {
    match init {
        ConstInit::Val(val) => Ok(val),
        ConstInit::Global(idx) => globals.get(idx as usize).copied().ok_or_else(|| {
            HostError::Instantiation(format!("initializer references unknown global {idx}"))
        }),
    }
}
