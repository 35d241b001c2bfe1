pub(crate) mod body;
pub(crate) mod func;

use std::collections::HashMap;

use wasmparser::{
    ConstExpr, Data, DataKind, Export, ExportSectionReader, FunctionBody, Operator, Payload,
    ValType,
};

use crate::engine::Engine;
use crate::value::{Ty, Val};
use crate::HostError;
use body::Instruction;
use func::{FuncIdx, ParsedFunction};

/// Declared linear memory limits, in 64KiB pages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemoryDecl {
    pub(crate) min: u64,
    pub(crate) max: Option<u64>,
}

/// A global or data-segment initializer, restricted to the const-expr
/// forms the runtime supports.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ConstInit {
    Val(Val),
    /// `global.get` of an earlier module-defined global.
    Global(u32),
}

/// An active data segment for memory 0.
#[derive(Debug, Clone)]
pub(crate) struct DataDecl {
    pub(crate) offset: ConstInit,
    pub(crate) bytes: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct ParsedModule {
    pub(crate) funcs: Vec<ParsedFunction>,
    pub(crate) exports: HashMap<String, FuncIdx>,
    pub(crate) memory: Option<MemoryDecl>,
    pub(crate) globals: Vec<ConstInit>,
    pub(crate) data: Vec<DataDecl>,
}

pub(crate) fn parse(engine: &Engine, bytes: &[u8]) -> Result<ParsedModule, HostError> {
    let mut validator = engine.new_validator();
    let types = validator
        .validate_all(bytes)
        .map_err(|e| HostError::Instantiation(e.to_string()))?;

    let mut builder = ModuleBuilder::default();
    let parser = wasmparser::Parser::new(0);
    for payload in parser.parse_all(bytes) {
        let payload = payload.map_err(|e| HostError::Instantiation(e.to_string()))?;
        builder.process_payload(payload)?;
    }

    builder.build(types)
}

#[derive(Default)]
struct ModuleBuilder {
    /// Decoded function bodies with their declared locals.
    bodies: Vec<(Vec<Instruction>, Vec<Ty>)>,
    /// Function exports: name → function index.
    exports: HashMap<String, FuncIdx>,
    memory: Option<MemoryDecl>,
    globals: Vec<ConstInit>,
    data: Vec<DataDecl>,
    /// First declared import, if any. The host provides none, so any
    /// import makes the module uninstantiable.
    import: Option<String>,
}

impl ModuleBuilder {
    fn process_payload(&mut self, payload: Payload) -> Result<(), HostError> {
        match payload {
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.map_err(|e| HostError::Instantiation(e.to_string()))?;
                    if self.import.is_none() {
                        self.import = Some(format!("{}::{}", import.module, import.name));
                    }
                }
                Ok(())
            }
            Payload::MemorySection(reader) => {
                for mem in reader {
                    let mem = mem.map_err(|e| HostError::Instantiation(e.to_string()))?;
                    if mem.memory64 || mem.shared || mem.page_size_log2.is_some() {
                        return Err(HostError::Instantiation(
                            "unsupported memory type".into(),
                        ));
                    }
                    if self.memory.is_some() {
                        return Err(HostError::Instantiation(
                            "multiple memories are not supported".into(),
                        ));
                    }
                    self.memory = Some(MemoryDecl {
                        min: mem.initial,
                        max: mem.maximum,
                    });
                }
                Ok(())
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.map_err(|e| HostError::Instantiation(e.to_string()))?;
                    convert_ty(global.ty.content_type)?;
                    self.globals.push(decode_const_expr(&global.init_expr)?);
                }
                Ok(())
            }
            Payload::ExportSection(reader) => self.parse_export_section(reader),
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.map_err(|e| HostError::Instantiation(e.to_string()))?;
                    self.parse_data(data)?;
                }
                Ok(())
            }
            Payload::CodeSectionEntry(body) => self.parse_body(body),
            Payload::StartSection { .. } => Err(HostError::Instantiation(
                "start sections are not supported".into(),
            )),
            Payload::TableSection(..) | Payload::ElementSection(..) => Err(
                HostError::Instantiation("tables are not supported".into()),
            ),
            _ => Ok(()),
        }
    }

    fn parse_export_section(&mut self, reader: ExportSectionReader) -> Result<(), HostError> {
        for export in reader {
            let export = export.map_err(|e| HostError::Instantiation(e.to_string()))?;
            self.parse_export(export);
        }
        Ok(())
    }

    fn parse_export(&mut self, export: Export) {
        if export.kind == wasmparser::ExternalKind::Func {
            self.exports
                .insert(export.name.to_string(), FuncIdx(export.index));
        }
    }

    fn parse_data(&mut self, data: Data) -> Result<(), HostError> {
        match data.kind {
            DataKind::Active {
                memory_index: 0,
                offset_expr,
            } => {
                self.data.push(DataDecl {
                    offset: decode_const_expr(&offset_expr)?,
                    bytes: data.data.to_vec(),
                });
                Ok(())
            }
            DataKind::Active { .. } => Err(HostError::Instantiation(
                "unsupported data segment memory index".into(),
            )),
            // Passive segments are only reachable through memory.init,
            // which the decoder rejects.
            DataKind::Passive => Ok(()),
        }
    }

    fn parse_body(&mut self, body: FunctionBody) -> Result<(), HostError> {
        let mut body_locals = Vec::new();
        let locals_reader = body
            .get_locals_reader()
            .map_err(|e| HostError::Instantiation(e.to_string()))?;
        for local in locals_reader {
            let (count, val_type) = local.map_err(|e| HostError::Instantiation(e.to_string()))?;
            let ty = convert_ty(val_type)?;
            for _ in 0..count {
                body_locals.push(ty);
            }
        }
        let decoded = body::decode(&body)?;
        self.bodies.push((decoded, body_locals));
        Ok(())
    }

    fn build(mut self, types: wasmparser::types::Types) -> Result<ParsedModule, HostError> {
        if let Some(name) = self.import {
            return Err(HostError::Instantiation(format!(
                "unresolved import `{name}`"
            )));
        }

        let types_ref = types.as_ref();
        let total = types_ref.function_count();

        let funcs = (0..total)
            .map(|idx| {
                let core_type_id = types_ref.core_function_at(idx);
                let func_type = types_ref[core_type_id].unwrap_func();

                let params = func_type
                    .params()
                    .iter()
                    .map(|ty| convert_ty(*ty))
                    .collect::<Result<Box<[Ty]>, _>>()?;
                let results = func_type
                    .results()
                    .iter()
                    .map(|ty| convert_ty(*ty))
                    .collect::<Result<Box<[Ty]>, _>>()?;

                // Take to avoid cloning.
                let (body, locals) = std::mem::take(&mut self.bodies[idx as usize]);

                Ok(ParsedFunction {
                    params,
                    locals: locals.into(),
                    results,
                    body,
                })
            })
            .collect::<Result<Vec<_>, HostError>>()?;

        Ok(ParsedModule {
            funcs,
            exports: self.exports,
            memory: self.memory,
            globals: self.globals,
            data: self.data,
        })
    }
}

pub(crate) fn convert_ty(ty: ValType) -> Result<Ty, HostError> {
    match ty {
        ValType::I32 => Ok(Ty::I32),
        ValType::I64 => Ok(Ty::I64),
        ValType::F32 => Ok(Ty::F32),
        ValType::F64 => Ok(Ty::F64),
        other => Err(HostError::Instantiation(format!(
            "unsupported value type: {other:?}"
        ))),
    }
}

fn decode_const_expr(expr: &ConstExpr) -> Result<ConstInit, HostError> {
    let mut reader = expr.get_operators_reader();
    let op = reader
        .read()
        .map_err(|e| HostError::Instantiation(e.to_string()))?;
    let init = match op {
        Operator::I32Const { value } => ConstInit::Val(Val::I32(value)),
        Operator::I64Const { value } => ConstInit::Val(Val::I64(value)),
        Operator::F32Const { value } => ConstInit::Val(Val::F32(f32::from_bits(value.bits()))),
        Operator::F64Const { value } => ConstInit::Val(Val::F64(f64::from_bits(value.bits()))),
        Operator::GlobalGet { global_index } => ConstInit::Global(global_index),
        other => {
            return Err(HostError::Instantiation(format!(
                "unsupported constant expression: {other:?}"
            )));
        }
    };
    match reader
        .read()
        .map_err(|e| HostError::Instantiation(e.to_string()))?
    {
        Operator::End => Ok(init),
        other => Err(HostError::Instantiation(format!(
            "unsupported constant expression: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostError;

    fn parse_wat(wat: &str) -> Result<ParsedModule, HostError> {
        let bytes = wat::parse_str(wat).unwrap();
        parse(&Engine::default(), &bytes)
    }

    #[test]
    fn export_table_maps_names_to_function_indices() {
        let parsed = parse_wat(
            r#"
            (module
                (func (export "one") (result i32) i32.const 1)
                (func (export "two") (result i32) i32.const 2)
            )
        "#,
        )
        .unwrap();
        assert_eq!(parsed.exports["one"], FuncIdx(0));
        assert_eq!(parsed.exports["two"], FuncIdx(1));
        assert_eq!(parsed.funcs.len(), 2);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = parse(&Engine::default(), b"not a module").unwrap_err();
        assert!(matches!(err, HostError::Instantiation(..)));
    }

    #[test]
    fn unsupported_instructions_are_rejected_at_parse_time() {
        let err = parse_wat(
            r#"
            (module
                (func (export "trunc") (param f64) (result i32)
                    local.get 0
                    i32.trunc_f64_s
                )
            )
        "#,
        )
        .unwrap_err();
        match err {
            HostError::Instantiation(msg) => {
                assert!(msg.contains("unsupported instruction"), "{msg}");
            }
            other => panic!("expected Instantiation, got {other:?}"),
        }
    }

    #[test]
    fn start_sections_are_rejected() {
        let err = parse_wat(
            r#"
            (module
                (func $init)
                (start $init)
            )
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, HostError::Instantiation(..)));
    }

    #[test]
    fn branch_targets_are_resolved() {
        let parsed = parse_wat(
            r#"
            (module
                (func (param i32) (result i32)
                    block (result i32)
                        local.get 0
                        br 0
                    end
                )
            )
        "#,
        )
        .unwrap();
        let body = &parsed.funcs[0].body;
        match &body[0] {
            Instruction::Block { arity, end_pc } => {
                assert_eq!(*arity, 1);
                assert!(matches!(body[*end_pc as usize], Instruction::End));
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }
}
