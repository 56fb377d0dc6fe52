//! Decoded instruction set.
//!
//! Function bodies are decoded once, at module load, from
//! `wasmparser::Operator` into a grouped opcode enum. The dispatcher routes
//! on the group variant, so the compiler checks handler coverage; there is
//! no per-instruction string matching at run time.
//!
//! Structured-control operands (`block`/`loop`/`if`/`else`) carry the index
//! of their matching `end` (and `else`), resolved by a single pass after
//! decoding. Branch handlers therefore never re-scan the instruction
//! stream.

use wasmparser::{BlockType, FunctionBody, Operator};

use crate::error::EngineError;

/// Wasm value type. Widths are 32 or 64 bits; everything else is rejected
/// at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValTy {
    I32,
    I64,
    F32,
    F64,
}

impl ValTy {
    pub fn width(self) -> u32 {
        match self {
            ValTy::I32 | ValTy::F32 => 32,
            ValTy::I64 | ValTy::F64 => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValTy::F32 | ValTy::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            ValTy::I32 => "i32",
            ValTy::I64 => "i64",
            ValTy::F32 => "f32",
            ValTy::F64 => "f64",
        }
    }
}

/// Control group.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Unreachable,
    Nop,
    Block { arity: usize, end: usize },
    Loop { arity: usize, end: usize },
    If { arity: usize, else_at: Option<usize>, end: usize },
    Else { end: usize },
    End,
    Br { depth: u32 },
    BrIf { depth: u32 },
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call { func: u32 },
    CallIndirect { type_index: u32, table: u32 },
}

/// Constant group: push a literal of the given type. The value is stored as
/// its raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Const {
    pub ty: ValTy,
    pub bits: u64,
}

/// Variable group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
}

/// Parametric group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parametric {
    Drop,
    Select,
}

/// Memory group. Loads and stores carry the access width in bytes and the
/// static offset immediate; the base address comes from the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    Load {
        ty: ValTy,
        bytes: u8,
        signed: bool,
        offset: u64,
    },
    Store {
        ty: ValTy,
        bytes: u8,
        offset: u64,
    },
    Size,
    Grow,
}

/// Operation within the numeric (logical / arithmetic / bitwise) groups.
///
/// For float types the signed comparison variants stand for the IEEE
/// ordered comparisons; unsigned variants never decode for floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    // logical
    Eqz,
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
    // arithmetic
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    Clz,
    Ctz,
    Popcnt,
    // bitwise
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
    // float-only
    Min,
    Max,
    Abs,
    Neg,
    Sqrt,
    Ceil,
    Floor,
    Truncate,
    Nearest,
    Copysign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numeric {
    pub ty: ValTy,
    pub op: NumOp,
}

/// Conversion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    I32WrapI64,
    I64ExtendI32 { signed: bool },
    /// `iN.extendM_s`: sign-extend the low `from_bits` of an `ty` value.
    ExtendS { ty: ValTy, from_bits: u32 },
    /// Float-to-integer truncation, trapping or saturating.
    TruncF { from: ValTy, to: ValTy, signed: bool, sat: bool },
    /// Integer-to-float conversion.
    ConvertI { from: ValTy, to: ValTy, signed: bool },
    F32DemoteF64,
    F64PromoteF32,
    Reinterpret { from: ValTy, to: ValTy },
}

/// A decoded instruction, tagged by dispatch group.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Control(Control),
    Const(Const),
    Variable(Variable),
    Parametric(Parametric),
    Memory(Memory),
    Numeric(Numeric),
    Conversion(Conversion),
}

impl Inst {
    pub fn group(&self) -> &'static str {
        match self {
            Inst::Control(_) => "control",
            Inst::Const(_) => "constant",
            Inst::Variable(_) => "variable",
            Inst::Parametric(_) => "parametric",
            Inst::Memory(_) => "memory",
            Inst::Numeric(_) => "numeric",
            Inst::Conversion(_) => "conversion",
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Inst::Control(Control::Call { .. }) | Inst::Control(Control::CallIndirect { .. })
        )
    }
}

/// A fully decoded function body: expanded local declarations plus the
/// instruction stream with byte offsets.
#[derive(Debug, Clone, Default)]
pub struct DecodedFunc {
    /// Declared (non-parameter) locals, one entry per local.
    pub locals: Vec<ValTy>,
    pub insts: Vec<Inst>,
    /// Byte offset of each instruction within the module.
    pub offsets: Vec<usize>,
}

pub(crate) fn val_ty(ty: wasmparser::ValType) -> Result<ValTy, EngineError> {
    match ty {
        wasmparser::ValType::I32 => Ok(ValTy::I32),
        wasmparser::ValType::I64 => Ok(ValTy::I64),
        wasmparser::ValType::F32 => Ok(ValTy::F32),
        wasmparser::ValType::F64 => Ok(ValTy::F64),
        other => Err(EngineError::Malformed(format!(
            "unsupported value type: {other:?}"
        ))),
    }
}

/// Decode one function body.
///
/// `block_arity` resolves the result arity of a block type; the analyzer
/// supplies it since multi-value blocks reference the type section.
pub fn decode_function(
    body: &FunctionBody<'_>,
    block_arity: &dyn Fn(BlockType) -> Result<usize, EngineError>,
) -> Result<DecodedFunc, EngineError> {
    let mut locals = Vec::new();
    let locals_reader = body
        .get_locals_reader()
        .map_err(|e| EngineError::Malformed(e.to_string()))?;
    for decl in locals_reader {
        let (count, ty) = decl.map_err(|e| EngineError::Malformed(e.to_string()))?;
        let ty = val_ty(ty)?;
        locals.extend(std::iter::repeat_n(ty, count as usize));
    }

    let mut insts = Vec::new();
    let mut offsets = Vec::new();
    let mut reader = body
        .get_operators_reader()
        .map_err(|e| EngineError::Malformed(e.to_string()))?;
    while !reader.eof() {
        let offset = reader.original_position();
        let op = reader
            .read()
            .map_err(|e| EngineError::Malformed(e.to_string()))?;
        insts.push(decode_op(&op, block_arity)?);
        offsets.push(offset);
    }

    resolve_structure(&mut insts)?;
    Ok(DecodedFunc {
        locals,
        insts,
        offsets,
    })
}

/// Fill in the matching `else`/`end` indices of structured-control
/// instructions.
fn resolve_structure(insts: &mut [Inst]) -> Result<(), EngineError> {
    // Indices of currently open block/loop/if instructions.
    let mut open: Vec<usize> = Vec::new();

    for i in 0..insts.len() {
        match &insts[i] {
            Inst::Control(Control::Block { .. })
            | Inst::Control(Control::Loop { .. })
            | Inst::Control(Control::If { .. }) => open.push(i),
            Inst::Control(Control::Else { .. }) => {
                let Some(&opener) = open.last() else {
                    return Err(EngineError::Malformed("else without matching if".into()));
                };
                match &mut insts[opener] {
                    Inst::Control(Control::If { else_at, .. }) => *else_at = Some(i),
                    _ => {
                        return Err(EngineError::Malformed("else without matching if".into()));
                    }
                }
            }
            Inst::Control(Control::End) => {
                // The final end closes the function body itself.
                let Some(opener) = open.pop() else { continue };
                let mut else_arm = None;
                match &mut insts[opener] {
                    Inst::Control(Control::Block { end, .. })
                    | Inst::Control(Control::Loop { end, .. }) => *end = i,
                    Inst::Control(Control::If { else_at, end, .. }) => {
                        *end = i;
                        else_arm = *else_at;
                    }
                    _ => unreachable!("opener indices only ever point at block/loop/if"),
                }
                // An if with an else arm: the else also needs its end.
                if let Some(e) = else_arm {
                    match &mut insts[e] {
                        Inst::Control(Control::Else { end }) => *end = i,
                        _ => unreachable!(),
                    }
                }
            }
            _ => {}
        }
    }

    if open.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Malformed(
            "unclosed block/loop/if at end of function".into(),
        ))
    }
}

fn mem_load(
    ty: ValTy,
    bytes: u8,
    signed: bool,
    memarg: &wasmparser::MemArg,
) -> Result<Inst, EngineError> {
    Ok(Inst::Memory(Memory::Load {
        ty,
        bytes,
        signed,
        offset: memarg.offset,
    }))
}

fn mem_store(ty: ValTy, bytes: u8, memarg: &wasmparser::MemArg) -> Result<Inst, EngineError> {
    Ok(Inst::Memory(Memory::Store {
        ty,
        bytes,
        offset: memarg.offset,
    }))
}

fn num(ty: ValTy, op: NumOp) -> Result<Inst, EngineError> {
    Ok(Inst::Numeric(Numeric { ty, op }))
}

fn decode_op(
    op: &Operator<'_>,
    block_arity: &dyn Fn(BlockType) -> Result<usize, EngineError>,
) -> Result<Inst, EngineError> {
    use Operator as O;

    // `end`/`else` placeholders are patched by `resolve_structure`.
    const UNRESOLVED: usize = usize::MAX;

    let inst = match op {
        O::Unreachable => Inst::Control(Control::Unreachable),
        O::Nop => Inst::Control(Control::Nop),
        O::Block { blockty } => Inst::Control(Control::Block {
            arity: block_arity(*blockty)?,
            end: UNRESOLVED,
        }),
        O::Loop { blockty } => Inst::Control(Control::Loop {
            arity: block_arity(*blockty)?,
            end: UNRESOLVED,
        }),
        O::If { blockty } => Inst::Control(Control::If {
            arity: block_arity(*blockty)?,
            else_at: None,
            end: UNRESOLVED,
        }),
        O::Else => Inst::Control(Control::Else { end: UNRESOLVED }),
        O::End => Inst::Control(Control::End),
        O::Br { relative_depth } => Inst::Control(Control::Br {
            depth: *relative_depth,
        }),
        O::BrIf { relative_depth } => Inst::Control(Control::BrIf {
            depth: *relative_depth,
        }),
        O::BrTable { targets } => {
            let resolved: Result<Vec<u32>, _> = targets.targets().collect();
            Inst::Control(Control::BrTable {
                targets: resolved.map_err(|e| EngineError::Malformed(e.to_string()))?,
                default: targets.default(),
            })
        }
        O::Return => Inst::Control(Control::Return),
        O::Call { function_index } => Inst::Control(Control::Call {
            func: *function_index,
        }),
        O::CallIndirect {
            type_index,
            table_index,
        } => Inst::Control(Control::CallIndirect {
            type_index: *type_index,
            table: *table_index,
        }),

        O::Drop => Inst::Parametric(Parametric::Drop),
        O::Select | O::TypedSelect { .. } => Inst::Parametric(Parametric::Select),

        O::LocalGet { local_index } => Inst::Variable(Variable::LocalGet(*local_index)),
        O::LocalSet { local_index } => Inst::Variable(Variable::LocalSet(*local_index)),
        O::LocalTee { local_index } => Inst::Variable(Variable::LocalTee(*local_index)),
        O::GlobalGet { global_index } => Inst::Variable(Variable::GlobalGet(*global_index)),
        O::GlobalSet { global_index } => Inst::Variable(Variable::GlobalSet(*global_index)),

        O::I32Const { value } => Inst::Const(Const {
            ty: ValTy::I32,
            bits: *value as u32 as u64,
        }),
        O::I64Const { value } => Inst::Const(Const {
            ty: ValTy::I64,
            bits: *value as u64,
        }),
        O::F32Const { value } => Inst::Const(Const {
            ty: ValTy::F32,
            bits: value.bits() as u64,
        }),
        O::F64Const { value } => Inst::Const(Const {
            ty: ValTy::F64,
            bits: value.bits(),
        }),

        O::I32Load { memarg } => return mem_load(ValTy::I32, 4, false, memarg),
        O::I64Load { memarg } => return mem_load(ValTy::I64, 8, false, memarg),
        O::F32Load { memarg } => return mem_load(ValTy::F32, 4, false, memarg),
        O::F64Load { memarg } => return mem_load(ValTy::F64, 8, false, memarg),
        O::I32Load8S { memarg } => return mem_load(ValTy::I32, 1, true, memarg),
        O::I32Load8U { memarg } => return mem_load(ValTy::I32, 1, false, memarg),
        O::I32Load16S { memarg } => return mem_load(ValTy::I32, 2, true, memarg),
        O::I32Load16U { memarg } => return mem_load(ValTy::I32, 2, false, memarg),
        O::I64Load8S { memarg } => return mem_load(ValTy::I64, 1, true, memarg),
        O::I64Load8U { memarg } => return mem_load(ValTy::I64, 1, false, memarg),
        O::I64Load16S { memarg } => return mem_load(ValTy::I64, 2, true, memarg),
        O::I64Load16U { memarg } => return mem_load(ValTy::I64, 2, false, memarg),
        O::I64Load32S { memarg } => return mem_load(ValTy::I64, 4, true, memarg),
        O::I64Load32U { memarg } => return mem_load(ValTy::I64, 4, false, memarg),
        O::I32Store { memarg } => return mem_store(ValTy::I32, 4, memarg),
        O::I64Store { memarg } => return mem_store(ValTy::I64, 8, memarg),
        O::F32Store { memarg } => return mem_store(ValTy::F32, 4, memarg),
        O::F64Store { memarg } => return mem_store(ValTy::F64, 8, memarg),
        O::I32Store8 { memarg } => return mem_store(ValTy::I32, 1, memarg),
        O::I32Store16 { memarg } => return mem_store(ValTy::I32, 2, memarg),
        O::I64Store8 { memarg } => return mem_store(ValTy::I64, 1, memarg),
        O::I64Store16 { memarg } => return mem_store(ValTy::I64, 2, memarg),
        O::I64Store32 { memarg } => return mem_store(ValTy::I64, 4, memarg),
        O::MemorySize { .. } => Inst::Memory(Memory::Size),
        O::MemoryGrow { .. } => Inst::Memory(Memory::Grow),

        O::I32Eqz => return num(ValTy::I32, NumOp::Eqz),
        O::I32Eq => return num(ValTy::I32, NumOp::Eq),
        O::I32Ne => return num(ValTy::I32, NumOp::Ne),
        O::I32LtS => return num(ValTy::I32, NumOp::LtS),
        O::I32LtU => return num(ValTy::I32, NumOp::LtU),
        O::I32GtS => return num(ValTy::I32, NumOp::GtS),
        O::I32GtU => return num(ValTy::I32, NumOp::GtU),
        O::I32LeS => return num(ValTy::I32, NumOp::LeS),
        O::I32LeU => return num(ValTy::I32, NumOp::LeU),
        O::I32GeS => return num(ValTy::I32, NumOp::GeS),
        O::I32GeU => return num(ValTy::I32, NumOp::GeU),
        O::I64Eqz => return num(ValTy::I64, NumOp::Eqz),
        O::I64Eq => return num(ValTy::I64, NumOp::Eq),
        O::I64Ne => return num(ValTy::I64, NumOp::Ne),
        O::I64LtS => return num(ValTy::I64, NumOp::LtS),
        O::I64LtU => return num(ValTy::I64, NumOp::LtU),
        O::I64GtS => return num(ValTy::I64, NumOp::GtS),
        O::I64GtU => return num(ValTy::I64, NumOp::GtU),
        O::I64LeS => return num(ValTy::I64, NumOp::LeS),
        O::I64LeU => return num(ValTy::I64, NumOp::LeU),
        O::I64GeS => return num(ValTy::I64, NumOp::GeS),
        O::I64GeU => return num(ValTy::I64, NumOp::GeU),

        O::I32Add => return num(ValTy::I32, NumOp::Add),
        O::I32Sub => return num(ValTy::I32, NumOp::Sub),
        O::I32Mul => return num(ValTy::I32, NumOp::Mul),
        O::I32DivS => return num(ValTy::I32, NumOp::DivS),
        O::I32DivU => return num(ValTy::I32, NumOp::DivU),
        O::I32RemS => return num(ValTy::I32, NumOp::RemS),
        O::I32RemU => return num(ValTy::I32, NumOp::RemU),
        O::I64Add => return num(ValTy::I64, NumOp::Add),
        O::I64Sub => return num(ValTy::I64, NumOp::Sub),
        O::I64Mul => return num(ValTy::I64, NumOp::Mul),
        O::I64DivS => return num(ValTy::I64, NumOp::DivS),
        O::I64DivU => return num(ValTy::I64, NumOp::DivU),
        O::I64RemS => return num(ValTy::I64, NumOp::RemS),
        O::I64RemU => return num(ValTy::I64, NumOp::RemU),

        O::I32Clz => return num(ValTy::I32, NumOp::Clz),
        O::I32Ctz => return num(ValTy::I32, NumOp::Ctz),
        O::I32Popcnt => return num(ValTy::I32, NumOp::Popcnt),
        O::I64Clz => return num(ValTy::I64, NumOp::Clz),
        O::I64Ctz => return num(ValTy::I64, NumOp::Ctz),
        O::I64Popcnt => return num(ValTy::I64, NumOp::Popcnt),

        O::I32And => return num(ValTy::I32, NumOp::And),
        O::I32Or => return num(ValTy::I32, NumOp::Or),
        O::I32Xor => return num(ValTy::I32, NumOp::Xor),
        O::I32Shl => return num(ValTy::I32, NumOp::Shl),
        O::I32ShrS => return num(ValTy::I32, NumOp::ShrS),
        O::I32ShrU => return num(ValTy::I32, NumOp::ShrU),
        O::I32Rotl => return num(ValTy::I32, NumOp::Rotl),
        O::I32Rotr => return num(ValTy::I32, NumOp::Rotr),
        O::I64And => return num(ValTy::I64, NumOp::And),
        O::I64Or => return num(ValTy::I64, NumOp::Or),
        O::I64Xor => return num(ValTy::I64, NumOp::Xor),
        O::I64Shl => return num(ValTy::I64, NumOp::Shl),
        O::I64ShrS => return num(ValTy::I64, NumOp::ShrS),
        O::I64ShrU => return num(ValTy::I64, NumOp::ShrU),
        O::I64Rotl => return num(ValTy::I64, NumOp::Rotl),
        O::I64Rotr => return num(ValTy::I64, NumOp::Rotr),

        O::F32Eq => return num(ValTy::F32, NumOp::Eq),
        O::F32Ne => return num(ValTy::F32, NumOp::Ne),
        O::F32Lt => return num(ValTy::F32, NumOp::LtS),
        O::F32Gt => return num(ValTy::F32, NumOp::GtS),
        O::F32Le => return num(ValTy::F32, NumOp::LeS),
        O::F32Ge => return num(ValTy::F32, NumOp::GeS),
        O::F64Eq => return num(ValTy::F64, NumOp::Eq),
        O::F64Ne => return num(ValTy::F64, NumOp::Ne),
        O::F64Lt => return num(ValTy::F64, NumOp::LtS),
        O::F64Gt => return num(ValTy::F64, NumOp::GtS),
        O::F64Le => return num(ValTy::F64, NumOp::LeS),
        O::F64Ge => return num(ValTy::F64, NumOp::GeS),

        O::F32Add => return num(ValTy::F32, NumOp::Add),
        O::F32Sub => return num(ValTy::F32, NumOp::Sub),
        O::F32Mul => return num(ValTy::F32, NumOp::Mul),
        O::F32Div => return num(ValTy::F32, NumOp::DivS),
        O::F32Min => return num(ValTy::F32, NumOp::Min),
        O::F32Max => return num(ValTy::F32, NumOp::Max),
        O::F32Abs => return num(ValTy::F32, NumOp::Abs),
        O::F32Neg => return num(ValTy::F32, NumOp::Neg),
        O::F32Sqrt => return num(ValTy::F32, NumOp::Sqrt),
        O::F32Ceil => return num(ValTy::F32, NumOp::Ceil),
        O::F32Floor => return num(ValTy::F32, NumOp::Floor),
        O::F32Trunc => return num(ValTy::F32, NumOp::Truncate),
        O::F32Nearest => return num(ValTy::F32, NumOp::Nearest),
        O::F32Copysign => return num(ValTy::F32, NumOp::Copysign),
        O::F64Add => return num(ValTy::F64, NumOp::Add),
        O::F64Sub => return num(ValTy::F64, NumOp::Sub),
        O::F64Mul => return num(ValTy::F64, NumOp::Mul),
        O::F64Div => return num(ValTy::F64, NumOp::DivS),
        O::F64Min => return num(ValTy::F64, NumOp::Min),
        O::F64Max => return num(ValTy::F64, NumOp::Max),
        O::F64Abs => return num(ValTy::F64, NumOp::Abs),
        O::F64Neg => return num(ValTy::F64, NumOp::Neg),
        O::F64Sqrt => return num(ValTy::F64, NumOp::Sqrt),
        O::F64Ceil => return num(ValTy::F64, NumOp::Ceil),
        O::F64Floor => return num(ValTy::F64, NumOp::Floor),
        O::F64Trunc => return num(ValTy::F64, NumOp::Truncate),
        O::F64Nearest => return num(ValTy::F64, NumOp::Nearest),
        O::F64Copysign => return num(ValTy::F64, NumOp::Copysign),

        O::I32WrapI64 => Inst::Conversion(Conversion::I32WrapI64),
        O::I64ExtendI32S => Inst::Conversion(Conversion::I64ExtendI32 { signed: true }),
        O::I64ExtendI32U => Inst::Conversion(Conversion::I64ExtendI32 { signed: false }),
        O::I32Extend8S => Inst::Conversion(Conversion::ExtendS {
            ty: ValTy::I32,
            from_bits: 8,
        }),
        O::I32Extend16S => Inst::Conversion(Conversion::ExtendS {
            ty: ValTy::I32,
            from_bits: 16,
        }),
        O::I64Extend8S => Inst::Conversion(Conversion::ExtendS {
            ty: ValTy::I64,
            from_bits: 8,
        }),
        O::I64Extend16S => Inst::Conversion(Conversion::ExtendS {
            ty: ValTy::I64,
            from_bits: 16,
        }),
        O::I64Extend32S => Inst::Conversion(Conversion::ExtendS {
            ty: ValTy::I64,
            from_bits: 32,
        }),

        O::I32TruncF32S => conv_trunc(ValTy::F32, ValTy::I32, true, false),
        O::I32TruncF32U => conv_trunc(ValTy::F32, ValTy::I32, false, false),
        O::I32TruncF64S => conv_trunc(ValTy::F64, ValTy::I32, true, false),
        O::I32TruncF64U => conv_trunc(ValTy::F64, ValTy::I32, false, false),
        O::I64TruncF32S => conv_trunc(ValTy::F32, ValTy::I64, true, false),
        O::I64TruncF32U => conv_trunc(ValTy::F32, ValTy::I64, false, false),
        O::I64TruncF64S => conv_trunc(ValTy::F64, ValTy::I64, true, false),
        O::I64TruncF64U => conv_trunc(ValTy::F64, ValTy::I64, false, false),
        O::I32TruncSatF32S => conv_trunc(ValTy::F32, ValTy::I32, true, true),
        O::I32TruncSatF32U => conv_trunc(ValTy::F32, ValTy::I32, false, true),
        O::I32TruncSatF64S => conv_trunc(ValTy::F64, ValTy::I32, true, true),
        O::I32TruncSatF64U => conv_trunc(ValTy::F64, ValTy::I32, false, true),
        O::I64TruncSatF32S => conv_trunc(ValTy::F32, ValTy::I64, true, true),
        O::I64TruncSatF32U => conv_trunc(ValTy::F32, ValTy::I64, false, true),
        O::I64TruncSatF64S => conv_trunc(ValTy::F64, ValTy::I64, true, true),
        O::I64TruncSatF64U => conv_trunc(ValTy::F64, ValTy::I64, false, true),

        O::F32ConvertI32S => conv_int(ValTy::I32, ValTy::F32, true),
        O::F32ConvertI32U => conv_int(ValTy::I32, ValTy::F32, false),
        O::F32ConvertI64S => conv_int(ValTy::I64, ValTy::F32, true),
        O::F32ConvertI64U => conv_int(ValTy::I64, ValTy::F32, false),
        O::F64ConvertI32S => conv_int(ValTy::I32, ValTy::F64, true),
        O::F64ConvertI32U => conv_int(ValTy::I32, ValTy::F64, false),
        O::F64ConvertI64S => conv_int(ValTy::I64, ValTy::F64, true),
        O::F64ConvertI64U => conv_int(ValTy::I64, ValTy::F64, false),

        O::F32DemoteF64 => Inst::Conversion(Conversion::F32DemoteF64),
        O::F64PromoteF32 => Inst::Conversion(Conversion::F64PromoteF32),

        O::I32ReinterpretF32 => conv_reinterpret(ValTy::F32, ValTy::I32),
        O::I64ReinterpretF64 => conv_reinterpret(ValTy::F64, ValTy::I64),
        O::F32ReinterpretI32 => conv_reinterpret(ValTy::I32, ValTy::F32),
        O::F64ReinterpretI64 => conv_reinterpret(ValTy::I64, ValTy::F64),

        other => {
            return Err(EngineError::Malformed(format!(
                "unknown opcode group for operator: {other:?}"
            )));
        }
    };
    Ok(inst)
}

fn conv_trunc(from: ValTy, to: ValTy, signed: bool, sat: bool) -> Inst {
    Inst::Conversion(Conversion::TruncF {
        from,
        to,
        signed,
        sat,
    })
}

fn conv_int(from: ValTy, to: ValTy, signed: bool) -> Inst {
    Inst::Conversion(Conversion::ConvertI { from, to, signed })
}

fn conv_reinterpret(from: ValTy, to: ValTy) -> Inst {
    Inst::Conversion(Conversion::Reinterpret { from, to })
}
