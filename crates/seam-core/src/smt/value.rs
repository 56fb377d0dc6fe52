//! Symbolic values.
//!
//! A `SymValue` is either a concrete integer/float with an explicit bit
//! width, or a solver expression of known sort. All arithmetic preserves
//! width; mixing widths is a programming error surfaced as
//! `EngineError::WidthMismatch`.

use z3::ast::{Ast, BV, Bool, Float};

use crate::error::EngineError;
use crate::smt::SmtContext;
use crate::wasm::instr::ValTy;

/// Truthiness of a value used as a branch condition.
pub enum Cond<'ctx> {
    Concrete(bool),
    /// Boolean expression equivalent to `value != 0`.
    Sym(Bool<'ctx>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymValue<'ctx> {
    /// Concrete two's-complement integer; `bits` is masked to `width`.
    Int { bits: u64, width: u32 },
    /// Concrete IEEE 754 float stored as its bit pattern.
    Fp { bits: u64, width: u32 },
    /// Symbolic bitvector expression.
    Bv(BV<'ctx>),
    /// Symbolic float expression. The width rides along because the sort
    /// is awkward to recover from the handle.
    Float(Float<'ctx>, u32),
}

impl<'ctx> SymValue<'ctx> {
    pub fn from_i32(v: i32) -> Self {
        SymValue::Int {
            bits: v as u32 as u64,
            width: 32,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        SymValue::Int {
            bits: v as u64,
            width: 64,
        }
    }

    /// Concrete value of `ty` from raw bits.
    pub fn from_bits(ty: ValTy, bits: u64) -> Self {
        let bits = mask(bits, ty.width());
        if ty.is_float() {
            SymValue::Fp {
                bits,
                width: ty.width(),
            }
        } else {
            SymValue::Int {
                bits,
                width: ty.width(),
            }
        }
    }

    /// Zero of the given type, the initial value of declared locals.
    pub fn zero(ty: ValTy) -> Self {
        Self::from_bits(ty, 0)
    }

    pub fn width(&self) -> u32 {
        match self {
            SymValue::Int { width, .. } | SymValue::Fp { width, .. } => *width,
            SymValue::Bv(bv) => bv.get_size(),
            SymValue::Float(_, width) => *width,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SymValue::Fp { .. } | SymValue::Float(..))
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, SymValue::Int { .. } | SymValue::Fp { .. })
    }

    /// Raw bits when concrete.
    pub fn as_const_bits(&self) -> Option<u64> {
        match self {
            SymValue::Int { bits, .. } | SymValue::Fp { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SymValue::Fp { bits, width: 32 } => Some(f32::from_bits(*bits as u32)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SymValue::Fp { bits, width: 64 } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// Bitvector view. Concrete values lift to numerals; concrete floats
    /// lift to their bit pattern. Symbolic floats have no bit pattern the
    /// façade can produce, so they are a type mismatch here.
    pub fn to_bv(&self, smt: &SmtContext<'ctx>) -> Result<BV<'ctx>, EngineError> {
        match self {
            SymValue::Int { bits, width } | SymValue::Fp { bits, width } => {
                Ok(smt.bv_const(*bits, *width))
            }
            SymValue::Bv(bv) => Ok(bv.clone()),
            SymValue::Float(..) => Err(EngineError::TypeMismatch(
                "expected a bitvector, found a symbolic float".into(),
            )),
        }
    }

    /// Float view; lifts concrete floats to float numerals.
    pub fn to_float(&self, smt: &SmtContext<'ctx>) -> Result<(Float<'ctx>, u32), EngineError> {
        match self {
            SymValue::Fp { bits, width: 32 } => Ok((
                Float::from_f32(smt.z3(), f32::from_bits(*bits as u32)),
                32,
            )),
            SymValue::Fp { bits, width: 64 } => {
                Ok((Float::from_f64(smt.z3(), f64::from_bits(*bits)), 64))
            }
            SymValue::Float(f, width) => Ok((f.clone(), *width)),
            _ => Err(EngineError::TypeMismatch(
                "expected a float, found a bitvector".into(),
            )),
        }
    }

    /// Truthiness for branch conditions (`cond != 0`).
    pub fn nonzero(&self, smt: &SmtContext<'ctx>) -> Result<Cond<'ctx>, EngineError> {
        match self {
            SymValue::Int { bits, .. } => Ok(Cond::Concrete(*bits != 0)),
            SymValue::Fp { .. } | SymValue::Float(..) => Err(EngineError::TypeMismatch(
                "float used as a branch condition".into(),
            )),
            SymValue::Bv(bv) => {
                let zero = smt.bv_const(0, bv.get_size());
                Ok(Cond::Sym(bv._eq(&zero).not()))
            }
        }
    }

    /// Simplify a bitvector expression and fold it back to a concrete
    /// value when it reduces to a numeral. Lazy simplification happens
    /// exactly here, once per produced value.
    pub fn lower_bv(bv: BV<'ctx>) -> Self {
        let simplified = bv.simplify();
        match simplified.as_u64() {
            Some(bits) => SymValue::Int {
                bits: mask(bits, simplified.get_size()),
                width: simplified.get_size(),
            },
            None => SymValue::Bv(simplified),
        }
    }

    /// Simplify a float expression. Float numerals stay symbolic handles;
    /// the reporter evaluates them through the model instead.
    pub fn lower_float(f: Float<'ctx>, width: u32) -> Self {
        SymValue::Float(f.simplify(), width)
    }
}

pub(crate) fn mask(bits: u64, width: u32) -> u64 {
    if width >= 64 { bits } else { bits & ((1u64 << width) - 1) }
}

/// Check two operands share a width before a binary operation.
pub fn require_same_width(a: &SymValue<'_>, b: &SymValue<'_>) -> Result<(), EngineError> {
    if a.width() == b.width() {
        Ok(())
    } else {
        Err(EngineError::WidthMismatch(a.width(), b.width()))
    }
}
