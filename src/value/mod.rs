use crate::HostError;

/// Numeric value type in an export's declared signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    I32,
    I64,
    F32,
    F64,
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::F32 => "f32",
            Ty::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Render a type list the way it appears in a signature: `i32, i32`.
pub(crate) fn render_tys(tys: &[Ty]) -> String {
    tys.iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Dynamic value for untyped calls into the module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Val {
    pub fn ty(&self) -> Ty {
        match self {
            Val::I32(..) => Ty::I32,
            Val::I64(..) => Ty::I64,
            Val::F32(..) => Ty::F32,
            Val::F64(..) => Ty::F64,
        }
    }

    pub fn zero(ty: Ty) -> Val {
        match ty {
            Ty::I32 => Val::I32(0),
            Ty::I64 => Val::I64(0),
            Ty::F32 => Val::F32(0.0),
            Ty::F64 => Val::F64(0.0),
        }
    }

    pub fn unwrap_i32(self) -> i32 {
        match self {
            Val::I32(v) => v,
            _ => panic!("expected i32, got {self:?}"),
        }
    }

    pub fn unwrap_i64(self) -> i64 {
        match self {
            Val::I64(v) => v,
            _ => panic!("expected i64, got {self:?}"),
        }
    }

    pub fn unwrap_f32(self) -> f32 {
        match self {
            Val::F32(v) => v,
            _ => panic!("expected f32, got {self:?}"),
        }
    }

    pub fn unwrap_f64(self) -> f64 {
        match self {
            Val::F64(v) => v,
            _ => panic!("expected f64, got {self:?}"),
        }
    }
}

/// Decimal rendering, as it appears in the report line.
impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::I32(v) => write!(f, "{v}"),
            Val::I64(v) => write!(f, "{v}"),
            Val::F32(v) => write!(f, "{v}"),
            Val::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Convert a single Rust value to/from a `Val`.
pub trait WasmVal: Sized {
    fn to_val(&self) -> Val;
    fn from_val(val: &Val) -> Result<Self, HostError>;
}

macro_rules! impl_wasm_val {
    ($($rust:ty => $variant:ident, $ty:ident;)*) => {
        $(
            impl WasmVal for $rust {
                fn to_val(&self) -> Val {
                    Val::$variant(*self)
                }
                fn from_val(val: &Val) -> Result<Self, HostError> {
                    match val {
                        Val::$variant(v) => Ok(*v),
                        _ => Err(HostError::ArgumentMismatch(format!(
                            "expected {}, got {}",
                            Ty::$ty,
                            val.ty()
                        ))),
                    }
                }
            }
        )*
    };
}

impl_wasm_val! {
    i32 => I32, I32;
    i64 => I64, I64;
    f32 => F32, F32;
    f64 => F64, F64;
}

/// Convert Rust types into call arguments.
pub trait WasmArgs {
    fn to_vals(&self) -> Vec<Val>;
}

/// Convert call results back into Rust types.
pub trait WasmResults: Sized {
    fn from_vals(vals: &[Val]) -> Result<Self, HostError>;
}

impl WasmArgs for () {
    fn to_vals(&self) -> Vec<Val> {
        vec![]
    }
}

impl WasmResults for () {
    fn from_vals(vals: &[Val]) -> Result<Self, HostError> {
        if !vals.is_empty() {
            return Err(HostError::ArgumentMismatch(format!(
                "expected no results, got {}",
                vals.len()
            )));
        }
        Ok(())
    }
}

macro_rules! impl_wasm_tuples {
    ($(($($T:ident),+)),* $(,)?) => {
        $(
            impl<$($T: WasmVal),+> WasmArgs for ($($T,)+) {
                #[allow(non_snake_case)]
                fn to_vals(&self) -> Vec<Val> {
                    let ($($T,)+) = self;
                    vec![$($T.to_val()),+]
                }
            }

            impl<$($T: WasmVal),+> WasmResults for ($($T,)+) {
                #[allow(non_snake_case)]
                fn from_vals(vals: &[Val]) -> Result<Self, HostError> {
                    let expected = impl_wasm_tuples!(@count $($T),+);
                    if vals.len() != expected {
                        return Err(HostError::ArgumentMismatch(format!(
                            "expected {} results, got {}",
                            expected,
                            vals.len()
                        )));
                    }
                    let mut _i = 0;
                    Ok(($({
                        let v = $T::from_val(&vals[_i])?;
                        _i += 1;
                        v
                    },)+))
                }
            }
        )*
    };

    (@count $($T:ident),+) => {
        <[()]>::len(&[$(impl_wasm_tuples!(@unit $T)),+])
    };

    (@unit $T:ident) => { () };
}

impl_wasm_tuples!(
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
    (A, B, C, D, E),
    (A, B, C, D, E, F),
    (A, B, C, D, E, F, G),
    (A, B, C, D, E, F, G, H),
);
