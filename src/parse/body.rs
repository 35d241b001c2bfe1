//! Function body decoding.
//!
//! Operators are decoded once at parse time into an owned [`Instruction`]
//! stream so execution never re-parses. Structured control flow is
//! resolved here: every `block`/`if` records the index of its `end` (and
//! `else`), so the interpreter can jump without scanning.

use wasmparser::{BlockType, FunctionBody, Operator};

use crate::HostError;

/// `else_pc` sentinel for an `if` without an else arm.
pub(crate) const NO_ELSE: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub(crate) enum Instruction {
    // Control
    Unreachable,
    Nop,
    Block { arity: u32, end_pc: u32 },
    Loop,
    If { arity: u32, else_pc: u32, end_pc: u32 },
    Else { end_pc: u32 },
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(u32),
    Drop,
    Select,

    // Locals / globals
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Consts
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    // Memory (immediate = static offset; align is a hint, not stored)
    I32Load(u64),
    I64Load(u64),
    F32Load(u64),
    F64Load(u64),
    I32Load8S(u64),
    I32Load8U(u64),
    I32Load16S(u64),
    I32Load16U(u64),
    I64Load8S(u64),
    I64Load8U(u64),
    I64Load16S(u64),
    I64Load16U(u64),
    I64Load32S(u64),
    I64Load32U(u64),
    I32Store(u64),
    I64Store(u64),
    F32Store(u64),
    F64Store(u64),
    I32Store8(u64),
    I32Store16(u64),
    I64Store8(u64),
    I64Store16(u64),
    I64Store32(u64),
    MemorySize,
    MemoryGrow,

    // i32
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // i64
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // f32
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // f64
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Conversions (the non-trapping set)
    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,
}

/// Open structured-control entry awaiting its `end`.
enum Fixup {
    Block(usize),
    Loop,
    If(usize),
    Else { if_idx: usize, else_idx: usize },
}

/// Operators with no immediate map 1:1 onto instruction variants.
macro_rules! simple_ops {
    ($op:expr, { $($name:ident),* $(,)? }) => {
        match $op {
            $(Operator::$name => Some(Instruction::$name),)*
            _ => None,
        }
    };
}

/// Memory operators carry a static offset; only memory 0 is supported.
macro_rules! mem_ops {
    ($op:expr, { $($name:ident),* $(,)? }) => {
        match $op {
            $(Operator::$name { memarg } if memarg.memory == 0 => {
                Some(Instruction::$name(memarg.offset))
            })*
            _ => None,
        }
    };
}

pub(crate) fn decode(body: &FunctionBody) -> Result<Vec<Instruction>, HostError> {
    let mut ops: Vec<Instruction> = Vec::new();
    let mut fixups: Vec<Fixup> = Vec::new();

    let mut reader = body
        .get_operators_reader()
        .map_err(|e| HostError::Instantiation(e.to_string()))?;

    while !reader.eof() {
        let op = reader
            .read()
            .map_err(|e| HostError::Instantiation(e.to_string()))?;
        let cur = ops.len();

        if let Some(instr) = decode_plain(&op)? {
            ops.push(instr);
            continue;
        }

        match op {
            Operator::Block { blockty } => {
                fixups.push(Fixup::Block(cur));
                ops.push(Instruction::Block {
                    arity: block_arity(blockty)?,
                    end_pc: 0,
                });
            }
            Operator::Loop { blockty } => {
                // Loop arity only matters at the `end` fall-through, which
                // needs no fixup; branches to a loop carry no values.
                block_arity(blockty)?;
                fixups.push(Fixup::Loop);
                ops.push(Instruction::Loop);
            }
            Operator::If { blockty } => {
                fixups.push(Fixup::If(cur));
                ops.push(Instruction::If {
                    arity: block_arity(blockty)?,
                    else_pc: NO_ELSE,
                    end_pc: 0,
                });
            }
            Operator::Else => {
                match fixups.pop() {
                    Some(Fixup::If(if_idx)) => {
                        fixups.push(Fixup::Else {
                            if_idx,
                            else_idx: cur,
                        });
                    }
                    _ => {
                        return Err(HostError::Instantiation(
                            "else without matching if".into(),
                        ));
                    }
                }
                ops.push(Instruction::Else { end_pc: 0 });
            }
            Operator::End => {
                match fixups.pop() {
                    Some(Fixup::Block(idx)) | Some(Fixup::If(idx)) => {
                        patch_end(&mut ops, idx, cur);
                    }
                    Some(Fixup::Else { if_idx, else_idx }) => {
                        patch_else(&mut ops, if_idx, else_idx, cur);
                    }
                    Some(Fixup::Loop) | None => {}
                }
                ops.push(Instruction::End);
            }
            Operator::Br { relative_depth } => ops.push(Instruction::Br(relative_depth)),
            Operator::BrIf { relative_depth } => ops.push(Instruction::BrIf(relative_depth)),
            Operator::BrTable { targets } => {
                let default = targets.default();
                let targets = targets
                    .targets()
                    .collect::<Result<Vec<u32>, _>>()
                    .map_err(|e| HostError::Instantiation(e.to_string()))?;
                ops.push(Instruction::BrTable {
                    targets: targets.into(),
                    default,
                });
            }
            Operator::Call { function_index } => ops.push(Instruction::Call(function_index)),
            Operator::LocalGet { local_index } => ops.push(Instruction::LocalGet(local_index)),
            Operator::LocalSet { local_index } => ops.push(Instruction::LocalSet(local_index)),
            Operator::LocalTee { local_index } => ops.push(Instruction::LocalTee(local_index)),
            Operator::GlobalGet { global_index } => ops.push(Instruction::GlobalGet(global_index)),
            Operator::GlobalSet { global_index } => ops.push(Instruction::GlobalSet(global_index)),
            Operator::I32Const { value } => ops.push(Instruction::I32Const(value)),
            Operator::I64Const { value } => ops.push(Instruction::I64Const(value)),
            Operator::F32Const { value } => {
                ops.push(Instruction::F32Const(f32::from_bits(value.bits())))
            }
            Operator::F64Const { value } => {
                ops.push(Instruction::F64Const(f64::from_bits(value.bits())))
            }
            Operator::MemorySize { mem: 0 } => ops.push(Instruction::MemorySize),
            Operator::MemoryGrow { mem: 0 } => ops.push(Instruction::MemoryGrow),
            other => {
                return Err(HostError::Instantiation(format!(
                    "unsupported instruction: {other:?}"
                )));
            }
        }
    }

    Ok(ops)
}

fn decode_plain(op: &Operator) -> Result<Option<Instruction>, HostError> {
    if let Some(instr) = simple_ops!(op, {
        Unreachable, Nop, Return, Drop, Select,
        I32Eqz, I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU,
        I32LeS, I32LeU, I32GeS, I32GeU,
        I32Clz, I32Ctz, I32Popcnt,
        I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
        I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
        I64Eqz, I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU,
        I64LeS, I64LeU, I64GeS, I64GeU,
        I64Clz, I64Ctz, I64Popcnt,
        I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
        I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,
        F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
        F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt,
        F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
        F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,
        F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt,
        F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,
        I32WrapI64, I64ExtendI32S, I64ExtendI32U,
        F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U,
        F32DemoteF64,
        F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U,
        F64PromoteF32,
        I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
        I32Extend8S, I32Extend16S, I64Extend8S, I64Extend16S, I64Extend32S,
    }) {
        return Ok(Some(instr));
    }

    Ok(mem_ops!(op, {
        I32Load, I64Load, F32Load, F64Load,
        I32Load8S, I32Load8U, I32Load16S, I32Load16U,
        I64Load8S, I64Load8U, I64Load16S, I64Load16U,
        I64Load32S, I64Load32U,
        I32Store, I64Store, F32Store, F64Store,
        I32Store8, I32Store16, I64Store8, I64Store16, I64Store32,
    }))
}

fn block_arity(ty: BlockType) -> Result<u32, HostError> {
    match ty {
        BlockType::Empty => Ok(0),
        BlockType::Type(..) => Ok(1),
        BlockType::FuncType(..) => Err(HostError::Instantiation(
            "unsupported instruction: block with function type".into(),
        )),
    }
}

fn patch_end(ops: &mut [Instruction], idx: usize, end: usize) {
    match &mut ops[idx] {
        Instruction::Block { end_pc, .. } | Instruction::If { end_pc, .. } => {
            *end_pc = end as u32;
        }
        _ => {}
    }
}

fn patch_else(ops: &mut [Instruction], if_idx: usize, else_idx: usize, end: usize) {
    if let Instruction::If { else_pc, end_pc, .. } = &mut ops[if_idx] {
        *else_pc = else_idx as u32;
        *end_pc = end as u32;
    }
    if let Instruction::Else { end_pc } = &mut ops[else_idx] {
        *end_pc = end as u32;
    }
}
