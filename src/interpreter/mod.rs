//! Safe recursive evaluator over the decoded instruction stream.
//!
//! One Rust frame per module-level call, an explicit operand stack of
//! [`Val`], and a control-frame stack for structured control flow. Branch
//! targets were resolved at parse time, so `br` is a jump, not a scan.

use crate::instance::{Instance, PAGE_SIZE};
use crate::module::Module;
use crate::parse::body::{Instruction, NO_ELSE};
use crate::parse::func::{FuncIdx, ParsedFunction};
use crate::value::Val;

/// Maximum call depth before trapping with `CallStackExhausted`.
/// Kept low enough to avoid a native stack overflow in debug builds
/// (the recursive interpreter uses one Rust frame per module call).
const MAX_CALL_DEPTH: u32 = 1_000;

/// A fault raised by the module during execution, distinct from a normal
/// error return. Messages follow the canonical runtime phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    #[error("call stack exhausted")]
    CallStackExhausted,
}

/// Linear memory plus its declared page limit.
struct Memory<'a> {
    data: &'a mut Vec<u8>,
    max_pages: Option<u64>,
}

#[derive(Clone, Copy)]
enum CtrlKind {
    /// `block` or `if`: branches jump forward past the `end`.
    Block,
    /// `loop`: branches jump back to the body start.
    Loop,
}

/// Runtime entry for an open `block`/`loop`/`if`.
#[derive(Clone, Copy)]
struct CtrlFrame {
    kind: CtrlKind,
    target_pc: u32,
    /// Operand stack height at entry.
    height: usize,
    /// Values a branch carries past this frame.
    arity: u32,
}

pub(crate) fn call(
    instance: &mut Instance,
    func_idx: FuncIdx,
    args: &[Val],
) -> Result<Vec<Val>, Trap> {
    let Instance {
        module,
        memory,
        memory_max,
        globals,
    } = instance;

    let mut mem = Memory {
        data: memory,
        max_pages: *memory_max,
    };
    let mut depth: u32 = 0;
    call_function(module, &mut mem, globals, func_idx, args, &mut depth)
}

fn call_function(
    module: &Module,
    mem: &mut Memory,
    globals: &mut Vec<Val>,
    func_idx: FuncIdx,
    args: &[Val],
    depth: &mut u32,
) -> Result<Vec<Val>, Trap> {
    *depth += 1;
    if *depth > MAX_CALL_DEPTH {
        *depth -= 1;
        return Err(Trap::CallStackExhausted);
    }

    let func = module.get_func(func_idx);

    // locals = params ++ zero-initialized declared locals
    let mut locals: Vec<Val> = Vec::with_capacity(func.params.len() + func.locals.len());
    locals.extend_from_slice(args);
    locals.extend(func.locals.iter().map(|ty| Val::zero(*ty)));

    let result = execute(module, mem, globals, func, &mut locals, depth);
    *depth -= 1;
    result
}

/// Validation guarantees the operand stack never underflows.
#[inline]
fn pop(stack: &mut Vec<Val>) -> Val {
    match stack.pop() {
        Some(v) => v,
        None => unreachable!("operand stack underflow in validated code"),
    }
}

macro_rules! binop {
    ($stack:expr, $unwrap:ident, $wrap:ident, $f:expr) => {{
        let b = pop($stack).$unwrap();
        let a = pop($stack).$unwrap();
        $stack.push(Val::$wrap($f(a, b)));
    }};
}

macro_rules! binop_try {
    ($stack:expr, $unwrap:ident, $wrap:ident, $f:expr) => {{
        let b = pop($stack).$unwrap();
        let a = pop($stack).$unwrap();
        $stack.push(Val::$wrap($f(a, b)?));
    }};
}

macro_rules! cmpop {
    ($stack:expr, $unwrap:ident, $f:expr) => {{
        let b = pop($stack).$unwrap();
        let a = pop($stack).$unwrap();
        $stack.push(Val::I32($f(a, b) as i32));
    }};
}

macro_rules! unop {
    ($stack:expr, $unwrap:ident, $wrap:ident, $f:expr) => {{
        let a = pop($stack).$unwrap();
        $stack.push(Val::$wrap($f(a)));
    }};
}

macro_rules! load_op {
    ($stack:expr, $mem:expr, $offset:expr, $n:literal, $from:ty, $wrap:ident, $as:ty) => {{
        let addr = pop($stack).unwrap_i32();
        let bytes = load::<$n>($mem.data, addr, $offset)?;
        $stack.push(Val::$wrap(<$from>::from_le_bytes(bytes) as $as));
    }};
}

fn execute(
    module: &Module,
    mem: &mut Memory,
    globals: &mut Vec<Val>,
    func: &ParsedFunction,
    locals: &mut [Val],
    depth: &mut u32,
) -> Result<Vec<Val>, Trap> {
    let ops = &func.body;
    let mut stack: Vec<Val> = Vec::new();
    let mut control: Vec<CtrlFrame> = Vec::new();
    let mut pc: usize = 0;

    loop {
        if pc >= ops.len() {
            break;
        }
        let op = &ops[pc];
        pc += 1;

        match op {
            Instruction::Nop => {}

            Instruction::Unreachable => return Err(Trap::Unreachable),

            Instruction::Block { arity, end_pc } => control.push(CtrlFrame {
                kind: CtrlKind::Block,
                target_pc: *end_pc,
                height: stack.len(),
                arity: *arity,
            }),

            Instruction::Loop => control.push(CtrlFrame {
                kind: CtrlKind::Loop,
                target_pc: pc as u32,
                height: stack.len(),
                arity: 0,
            }),

            Instruction::If {
                arity,
                else_pc,
                end_pc,
            } => {
                let cond = pop(&mut stack).unwrap_i32();
                let frame = CtrlFrame {
                    kind: CtrlKind::Block,
                    target_pc: *end_pc,
                    height: stack.len(),
                    arity: *arity,
                };
                if cond != 0 {
                    control.push(frame);
                } else if *else_pc != NO_ELSE {
                    control.push(frame);
                    pc = *else_pc as usize + 1;
                } else {
                    pc = *end_pc as usize + 1;
                }
            }

            // Reached by falling out of the then-arm: skip the else body.
            Instruction::Else { end_pc } => {
                control.pop();
                pc = *end_pc as usize + 1;
            }

            Instruction::End => {
                if control.pop().is_none() {
                    break;
                }
            }

            Instruction::Br(rel) => {
                if branch(*rel, &mut control, &mut stack, &mut pc) {
                    break;
                }
            }

            Instruction::BrIf(rel) => {
                let cond = pop(&mut stack).unwrap_i32();
                if cond != 0 && branch(*rel, &mut control, &mut stack, &mut pc) {
                    break;
                }
            }

            Instruction::BrTable { targets, default } => {
                let idx = pop(&mut stack).unwrap_i32() as u32 as usize;
                let rel = targets.get(idx).copied().unwrap_or(*default);
                if branch(rel, &mut control, &mut stack, &mut pc) {
                    break;
                }
            }

            Instruction::Return => break,

            Instruction::Call(idx) => {
                let callee = FuncIdx(*idx);
                let n = module.get_func(callee).params.len();
                let call_args = stack.split_off(stack.len() - n);
                let results = call_function(module, mem, globals, callee, &call_args, depth)?;
                stack.extend(results);
            }

            Instruction::Drop => {
                pop(&mut stack);
            }

            Instruction::Select => {
                let cond = pop(&mut stack).unwrap_i32();
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(if cond != 0 { a } else { b });
            }

            Instruction::LocalGet(i) => stack.push(locals[*i as usize]),
            Instruction::LocalSet(i) => locals[*i as usize] = pop(&mut stack),
            Instruction::LocalTee(i) => {
                let v = pop(&mut stack);
                stack.push(v);
                locals[*i as usize] = v;
            }
            Instruction::GlobalGet(i) => stack.push(globals[*i as usize]),
            Instruction::GlobalSet(i) => globals[*i as usize] = pop(&mut stack),

            Instruction::I32Const(v) => stack.push(Val::I32(*v)),
            Instruction::I64Const(v) => stack.push(Val::I64(*v)),
            Instruction::F32Const(v) => stack.push(Val::F32(*v)),
            Instruction::F64Const(v) => stack.push(Val::F64(*v)),

            // Memory
            Instruction::I32Load(off) => load_op!(&mut stack, mem, *off, 4, i32, I32, i32),
            Instruction::I64Load(off) => load_op!(&mut stack, mem, *off, 8, i64, I64, i64),
            Instruction::F32Load(off) => load_op!(&mut stack, mem, *off, 4, f32, F32, f32),
            Instruction::F64Load(off) => load_op!(&mut stack, mem, *off, 8, f64, F64, f64),
            Instruction::I32Load8S(off) => load_op!(&mut stack, mem, *off, 1, i8, I32, i32),
            Instruction::I32Load8U(off) => load_op!(&mut stack, mem, *off, 1, u8, I32, i32),
            Instruction::I32Load16S(off) => load_op!(&mut stack, mem, *off, 2, i16, I32, i32),
            Instruction::I32Load16U(off) => load_op!(&mut stack, mem, *off, 2, u16, I32, i32),
            Instruction::I64Load8S(off) => load_op!(&mut stack, mem, *off, 1, i8, I64, i64),
            Instruction::I64Load8U(off) => load_op!(&mut stack, mem, *off, 1, u8, I64, i64),
            Instruction::I64Load16S(off) => load_op!(&mut stack, mem, *off, 2, i16, I64, i64),
            Instruction::I64Load16U(off) => load_op!(&mut stack, mem, *off, 2, u16, I64, i64),
            Instruction::I64Load32S(off) => load_op!(&mut stack, mem, *off, 4, i32, I64, i64),
            Instruction::I64Load32U(off) => load_op!(&mut stack, mem, *off, 4, u32, I64, i64),

            Instruction::I32Store(off) => {
                let v = pop(&mut stack).unwrap_i32();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &v.to_le_bytes())?;
            }
            Instruction::I64Store(off) => {
                let v = pop(&mut stack).unwrap_i64();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &v.to_le_bytes())?;
            }
            Instruction::F32Store(off) => {
                let v = pop(&mut stack).unwrap_f32();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &v.to_le_bytes())?;
            }
            Instruction::F64Store(off) => {
                let v = pop(&mut stack).unwrap_f64();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &v.to_le_bytes())?;
            }
            Instruction::I32Store8(off) => {
                let v = pop(&mut stack).unwrap_i32();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &(v as u8).to_le_bytes())?;
            }
            Instruction::I32Store16(off) => {
                let v = pop(&mut stack).unwrap_i32();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &(v as u16).to_le_bytes())?;
            }
            Instruction::I64Store8(off) => {
                let v = pop(&mut stack).unwrap_i64();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &(v as u8).to_le_bytes())?;
            }
            Instruction::I64Store16(off) => {
                let v = pop(&mut stack).unwrap_i64();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &(v as u16).to_le_bytes())?;
            }
            Instruction::I64Store32(off) => {
                let v = pop(&mut stack).unwrap_i64();
                let addr = pop(&mut stack).unwrap_i32();
                store(mem.data, addr, *off, &(v as u32).to_le_bytes())?;
            }

            Instruction::MemorySize => {
                stack.push(Val::I32((mem.data.len() / PAGE_SIZE) as i32));
            }
            Instruction::MemoryGrow => {
                let pages = pop(&mut stack).unwrap_i32();
                stack.push(Val::I32(memory_grow(mem, pages as u32)));
            }

            // i32
            Instruction::I32Eqz => unop!(&mut stack, unwrap_i32, I32, |a: i32| (a == 0) as i32),
            Instruction::I32Eq => cmpop!(&mut stack, unwrap_i32, |a, b| a == b),
            Instruction::I32Ne => cmpop!(&mut stack, unwrap_i32, |a, b| a != b),
            Instruction::I32LtS => cmpop!(&mut stack, unwrap_i32, |a, b| a < b),
            Instruction::I32LtU => cmpop!(&mut stack, unwrap_i32, |a: i32, b: i32| {
                (a as u32) < (b as u32)
            }),
            Instruction::I32GtS => cmpop!(&mut stack, unwrap_i32, |a, b| a > b),
            Instruction::I32GtU => cmpop!(&mut stack, unwrap_i32, |a: i32, b: i32| {
                (a as u32) > (b as u32)
            }),
            Instruction::I32LeS => cmpop!(&mut stack, unwrap_i32, |a, b| a <= b),
            Instruction::I32LeU => cmpop!(&mut stack, unwrap_i32, |a: i32, b: i32| {
                (a as u32) <= (b as u32)
            }),
            Instruction::I32GeS => cmpop!(&mut stack, unwrap_i32, |a, b| a >= b),
            Instruction::I32GeU => cmpop!(&mut stack, unwrap_i32, |a: i32, b: i32| {
                (a as u32) >= (b as u32)
            }),
            Instruction::I32Clz => {
                unop!(&mut stack, unwrap_i32, I32, |a: i32| a.leading_zeros() as i32)
            }
            Instruction::I32Ctz => {
                unop!(&mut stack, unwrap_i32, I32, |a: i32| a.trailing_zeros() as i32)
            }
            Instruction::I32Popcnt => {
                unop!(&mut stack, unwrap_i32, I32, |a: i32| a.count_ones() as i32)
            }
            Instruction::I32Add => binop!(&mut stack, unwrap_i32, I32, i32::wrapping_add),
            Instruction::I32Sub => binop!(&mut stack, unwrap_i32, I32, i32::wrapping_sub),
            Instruction::I32Mul => binop!(&mut stack, unwrap_i32, I32, i32::wrapping_mul),
            Instruction::I32DivS => binop_try!(&mut stack, unwrap_i32, I32, div_s_i32),
            Instruction::I32DivU => binop_try!(&mut stack, unwrap_i32, I32, div_u_i32),
            Instruction::I32RemS => binop_try!(&mut stack, unwrap_i32, I32, rem_s_i32),
            Instruction::I32RemU => binop_try!(&mut stack, unwrap_i32, I32, rem_u_i32),
            Instruction::I32And => binop!(&mut stack, unwrap_i32, I32, |a, b| a & b),
            Instruction::I32Or => binop!(&mut stack, unwrap_i32, I32, |a, b| a | b),
            Instruction::I32Xor => binop!(&mut stack, unwrap_i32, I32, |a, b| a ^ b),
            Instruction::I32Shl => binop!(&mut stack, unwrap_i32, I32, |a: i32, b: i32| {
                a.wrapping_shl(b as u32)
            }),
            Instruction::I32ShrS => binop!(&mut stack, unwrap_i32, I32, |a: i32, b: i32| {
                a.wrapping_shr(b as u32)
            }),
            Instruction::I32ShrU => binop!(&mut stack, unwrap_i32, I32, |a: i32, b: i32| {
                (a as u32).wrapping_shr(b as u32) as i32
            }),
            Instruction::I32Rotl => binop!(&mut stack, unwrap_i32, I32, |a: i32, b: i32| {
                a.rotate_left(b as u32 & 31)
            }),
            Instruction::I32Rotr => binop!(&mut stack, unwrap_i32, I32, |a: i32, b: i32| {
                a.rotate_right(b as u32 & 31)
            }),

            // i64
            Instruction::I64Eqz => unop!(&mut stack, unwrap_i64, I32, |a: i64| (a == 0) as i32),
            Instruction::I64Eq => cmpop!(&mut stack, unwrap_i64, |a, b| a == b),
            Instruction::I64Ne => cmpop!(&mut stack, unwrap_i64, |a, b| a != b),
            Instruction::I64LtS => cmpop!(&mut stack, unwrap_i64, |a, b| a < b),
            Instruction::I64LtU => cmpop!(&mut stack, unwrap_i64, |a: i64, b: i64| {
                (a as u64) < (b as u64)
            }),
            Instruction::I64GtS => cmpop!(&mut stack, unwrap_i64, |a, b| a > b),
            Instruction::I64GtU => cmpop!(&mut stack, unwrap_i64, |a: i64, b: i64| {
                (a as u64) > (b as u64)
            }),
            Instruction::I64LeS => cmpop!(&mut stack, unwrap_i64, |a, b| a <= b),
            Instruction::I64LeU => cmpop!(&mut stack, unwrap_i64, |a: i64, b: i64| {
                (a as u64) <= (b as u64)
            }),
            Instruction::I64GeS => cmpop!(&mut stack, unwrap_i64, |a, b| a >= b),
            Instruction::I64GeU => cmpop!(&mut stack, unwrap_i64, |a: i64, b: i64| {
                (a as u64) >= (b as u64)
            }),
            Instruction::I64Clz => {
                unop!(&mut stack, unwrap_i64, I64, |a: i64| a.leading_zeros() as i64)
            }
            Instruction::I64Ctz => {
                unop!(&mut stack, unwrap_i64, I64, |a: i64| a.trailing_zeros() as i64)
            }
            Instruction::I64Popcnt => {
                unop!(&mut stack, unwrap_i64, I64, |a: i64| a.count_ones() as i64)
            }
            Instruction::I64Add => binop!(&mut stack, unwrap_i64, I64, i64::wrapping_add),
            Instruction::I64Sub => binop!(&mut stack, unwrap_i64, I64, i64::wrapping_sub),
            Instruction::I64Mul => binop!(&mut stack, unwrap_i64, I64, i64::wrapping_mul),
            Instruction::I64DivS => binop_try!(&mut stack, unwrap_i64, I64, div_s_i64),
            Instruction::I64DivU => binop_try!(&mut stack, unwrap_i64, I64, div_u_i64),
            Instruction::I64RemS => binop_try!(&mut stack, unwrap_i64, I64, rem_s_i64),
            Instruction::I64RemU => binop_try!(&mut stack, unwrap_i64, I64, rem_u_i64),
            Instruction::I64And => binop!(&mut stack, unwrap_i64, I64, |a, b| a & b),
            Instruction::I64Or => binop!(&mut stack, unwrap_i64, I64, |a, b| a | b),
            Instruction::I64Xor => binop!(&mut stack, unwrap_i64, I64, |a, b| a ^ b),
            Instruction::I64Shl => binop!(&mut stack, unwrap_i64, I64, |a: i64, b: i64| {
                a.wrapping_shl(b as u32)
            }),
            Instruction::I64ShrS => binop!(&mut stack, unwrap_i64, I64, |a: i64, b: i64| {
                a.wrapping_shr(b as u32)
            }),
            Instruction::I64ShrU => binop!(&mut stack, unwrap_i64, I64, |a: i64, b: i64| {
                (a as u64).wrapping_shr(b as u32) as i64
            }),
            Instruction::I64Rotl => binop!(&mut stack, unwrap_i64, I64, |a: i64, b: i64| {
                a.rotate_left(b as u32 & 63)
            }),
            Instruction::I64Rotr => binop!(&mut stack, unwrap_i64, I64, |a: i64, b: i64| {
                a.rotate_right(b as u32 & 63)
            }),

            // f32
            Instruction::F32Eq => cmpop!(&mut stack, unwrap_f32, |a, b| a == b),
            Instruction::F32Ne => cmpop!(&mut stack, unwrap_f32, |a, b| a != b),
            Instruction::F32Lt => cmpop!(&mut stack, unwrap_f32, |a, b| a < b),
            Instruction::F32Gt => cmpop!(&mut stack, unwrap_f32, |a, b| a > b),
            Instruction::F32Le => cmpop!(&mut stack, unwrap_f32, |a, b| a <= b),
            Instruction::F32Ge => cmpop!(&mut stack, unwrap_f32, |a, b| a >= b),
            Instruction::F32Abs => unop!(&mut stack, unwrap_f32, F32, f32::abs),
            Instruction::F32Neg => unop!(&mut stack, unwrap_f32, F32, |a: f32| -a),
            Instruction::F32Ceil => unop!(&mut stack, unwrap_f32, F32, f32::ceil),
            Instruction::F32Floor => unop!(&mut stack, unwrap_f32, F32, f32::floor),
            Instruction::F32Trunc => unop!(&mut stack, unwrap_f32, F32, f32::trunc),
            Instruction::F32Nearest => unop!(&mut stack, unwrap_f32, F32, f32::round_ties_even),
            Instruction::F32Sqrt => unop!(&mut stack, unwrap_f32, F32, f32::sqrt),
            Instruction::F32Add => binop!(&mut stack, unwrap_f32, F32, |a, b| a + b),
            Instruction::F32Sub => binop!(&mut stack, unwrap_f32, F32, |a, b| a - b),
            Instruction::F32Mul => binop!(&mut stack, unwrap_f32, F32, |a, b| a * b),
            Instruction::F32Div => binop!(&mut stack, unwrap_f32, F32, |a, b| a / b),
            Instruction::F32Min => binop!(&mut stack, unwrap_f32, F32, fmin32),
            Instruction::F32Max => binop!(&mut stack, unwrap_f32, F32, fmax32),
            Instruction::F32Copysign => binop!(&mut stack, unwrap_f32, F32, f32::copysign),

            // f64
            Instruction::F64Eq => cmpop!(&mut stack, unwrap_f64, |a, b| a == b),
            Instruction::F64Ne => cmpop!(&mut stack, unwrap_f64, |a, b| a != b),
            Instruction::F64Lt => cmpop!(&mut stack, unwrap_f64, |a, b| a < b),
            Instruction::F64Gt => cmpop!(&mut stack, unwrap_f64, |a, b| a > b),
            Instruction::F64Le => cmpop!(&mut stack, unwrap_f64, |a, b| a <= b),
            Instruction::F64Ge => cmpop!(&mut stack, unwrap_f64, |a, b| a >= b),
            Instruction::F64Abs => unop!(&mut stack, unwrap_f64, F64, f64::abs),
            Instruction::F64Neg => unop!(&mut stack, unwrap_f64, F64, |a: f64| -a),
            Instruction::F64Ceil => unop!(&mut stack, unwrap_f64, F64, f64::ceil),
            Instruction::F64Floor => unop!(&mut stack, unwrap_f64, F64, f64::floor),
            Instruction::F64Trunc => unop!(&mut stack, unwrap_f64, F64, f64::trunc),
            Instruction::F64Nearest => unop!(&mut stack, unwrap_f64, F64, f64::round_ties_even),
            Instruction::F64Sqrt => unop!(&mut stack, unwrap_f64, F64, f64::sqrt),
            Instruction::F64Add => binop!(&mut stack, unwrap_f64, F64, |a, b| a + b),
            Instruction::F64Sub => binop!(&mut stack, unwrap_f64, F64, |a, b| a - b),
            Instruction::F64Mul => binop!(&mut stack, unwrap_f64, F64, |a, b| a * b),
            Instruction::F64Div => binop!(&mut stack, unwrap_f64, F64, |a, b| a / b),
            Instruction::F64Min => binop!(&mut stack, unwrap_f64, F64, fmin64),
            Instruction::F64Max => binop!(&mut stack, unwrap_f64, F64, fmax64),
            Instruction::F64Copysign => binop!(&mut stack, unwrap_f64, F64, f64::copysign),

            // Conversions
            Instruction::I32WrapI64 => unop!(&mut stack, unwrap_i64, I32, |a: i64| a as i32),
            Instruction::I64ExtendI32S => unop!(&mut stack, unwrap_i32, I64, |a: i32| a as i64),
            Instruction::I64ExtendI32U => {
                unop!(&mut stack, unwrap_i32, I64, |a: i32| a as u32 as i64)
            }
            Instruction::F32ConvertI32S => unop!(&mut stack, unwrap_i32, F32, |a: i32| a as f32),
            Instruction::F32ConvertI32U => {
                unop!(&mut stack, unwrap_i32, F32, |a: i32| a as u32 as f32)
            }
            Instruction::F32ConvertI64S => unop!(&mut stack, unwrap_i64, F32, |a: i64| a as f32),
            Instruction::F32ConvertI64U => {
                unop!(&mut stack, unwrap_i64, F32, |a: i64| a as u64 as f32)
            }
            Instruction::F32DemoteF64 => unop!(&mut stack, unwrap_f64, F32, |a: f64| a as f32),
            Instruction::F64ConvertI32S => unop!(&mut stack, unwrap_i32, F64, |a: i32| a as f64),
            Instruction::F64ConvertI32U => {
                unop!(&mut stack, unwrap_i32, F64, |a: i32| a as u32 as f64)
            }
            Instruction::F64ConvertI64S => unop!(&mut stack, unwrap_i64, F64, |a: i64| a as f64),
            Instruction::F64ConvertI64U => {
                unop!(&mut stack, unwrap_i64, F64, |a: i64| a as u64 as f64)
            }
            Instruction::F64PromoteF32 => unop!(&mut stack, unwrap_f32, F64, |a: f32| a as f64),
            Instruction::I32ReinterpretF32 => {
                unop!(&mut stack, unwrap_f32, I32, |a: f32| a.to_bits() as i32)
            }
            Instruction::I64ReinterpretF64 => {
                unop!(&mut stack, unwrap_f64, I64, |a: f64| a.to_bits() as i64)
            }
            Instruction::F32ReinterpretI32 => {
                unop!(&mut stack, unwrap_i32, F32, |a: i32| f32::from_bits(a as u32))
            }
            Instruction::F64ReinterpretI64 => {
                unop!(&mut stack, unwrap_i64, F64, |a: i64| f64::from_bits(a as u64))
            }
            Instruction::I32Extend8S => unop!(&mut stack, unwrap_i32, I32, |a: i32| a as i8 as i32),
            Instruction::I32Extend16S => {
                unop!(&mut stack, unwrap_i32, I32, |a: i32| a as i16 as i32)
            }
            Instruction::I64Extend8S => unop!(&mut stack, unwrap_i64, I64, |a: i64| a as i8 as i64),
            Instruction::I64Extend16S => {
                unop!(&mut stack, unwrap_i64, I64, |a: i64| a as i16 as i64)
            }
            Instruction::I64Extend32S => {
                unop!(&mut stack, unwrap_i64, I64, |a: i64| a as i32 as i64)
            }
        }
    }

    let n = func.results.len();
    let at = stack.len().saturating_sub(n);
    Ok(stack.split_off(at))
}

/// Take a branch. Returns true when the branch targets the function body
/// itself, which behaves like `return`.
fn branch(rel: u32, control: &mut Vec<CtrlFrame>, stack: &mut Vec<Val>, pc: &mut usize) -> bool {
    let rel = rel as usize;
    if rel >= control.len() {
        return true;
    }
    let idx = control.len() - 1 - rel;
    let frame = control[idx];
    match frame.kind {
        CtrlKind::Loop => {
            // Re-enter the loop body; the frame stays open.
            control.truncate(idx + 1);
            stack.truncate(frame.height);
            *pc = frame.target_pc as usize;
        }
        CtrlKind::Block => {
            // Carry the branch values past every frame being exited.
            let kept = stack.split_off(stack.len() - frame.arity as usize);
            control.truncate(idx);
            stack.truncate(frame.height);
            stack.extend(kept);
            *pc = frame.target_pc as usize + 1;
        }
    }
    false
}

fn memory_grow(mem: &mut Memory, pages: u32) -> i32 {
    let old_pages = (mem.data.len() / PAGE_SIZE) as u64;
    let new_pages = old_pages + pages as u64;
    if let Some(max) = mem.max_pages {
        if new_pages > max {
            return -1;
        }
    }
    // Cap at 4GiB of 32-bit address space.
    if new_pages > 65536 {
        return -1;
    }
    mem.data.resize(new_pages as usize * PAGE_SIZE, 0);
    old_pages as i32
}

fn load<const N: usize>(memory: &[u8], addr: i32, offset: u64) -> Result<[u8; N], Trap> {
    let start = addr as u32 as u64 + offset;
    let end = start + N as u64;
    if end > memory.len() as u64 {
        return Err(Trap::OutOfBoundsMemoryAccess);
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&memory[start as usize..end as usize]);
    Ok(buf)
}

fn store(memory: &mut [u8], addr: i32, offset: u64, bytes: &[u8]) -> Result<(), Trap> {
    let start = addr as u32 as u64 + offset;
    let end = start + bytes.len() as u64;
    if end > memory.len() as u64 {
        return Err(Trap::OutOfBoundsMemoryAccess);
    }
    memory[start as usize..end as usize].copy_from_slice(bytes);
    Ok(())
}

fn div_s_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else if a == i32::MIN && b == -1 {
        Err(Trap::IntegerOverflow)
    } else {
        Ok(a.wrapping_div(b))
    }
}

fn div_u_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        Ok(((a as u32) / (b as u32)) as i32)
    }
}

fn rem_s_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        // i32::MIN % -1 is 0, not a trap.
        Ok(a.wrapping_rem(b))
    }
}

fn rem_u_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        Ok(((a as u32) % (b as u32)) as i32)
    }
}

fn div_s_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else if a == i64::MIN && b == -1 {
        Err(Trap::IntegerOverflow)
    } else {
        Ok(a.wrapping_div(b))
    }
}

fn div_u_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        Ok(((a as u64) / (b as u64)) as i64)
    }
}

fn rem_s_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        Ok(a.wrapping_rem(b))
    }
}

fn rem_u_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        Err(Trap::DivideByZero)
    } else {
        Ok(((a as u64) % (b as u64)) as i64)
    }
}

fn fmin32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_positive() { a } else { b }
    } else if a > b {
        a
    } else {
        b
    }
}

fn fmin64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() { a } else { b }
    } else if a > b {
        a
    } else {
        b
    }
}
