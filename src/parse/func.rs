use super::body::Instruction;
use crate::value::Ty;

/// Index into the module's function list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FuncIdx(pub(crate) u32);

/// A decoded function definition.
#[derive(Debug, Clone)]
pub(crate) struct ParsedFunction {
    pub(crate) params: Box<[Ty]>,
    /// Body-declared locals, excluding params.
    pub(crate) locals: Box<[Ty]>,
    pub(crate) results: Box<[Ty]>,
    pub(crate) body: Vec<Instruction>,
}
