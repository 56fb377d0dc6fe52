//! Constant group: push a literal of the declared width.

use crate::error::EngineError;
use crate::exec::Flow;
use crate::smt::SymValue;
use crate::state::VmState;
use crate::wasm::instr::Const;

pub fn exec_const<'ctx>(
    state: &mut VmState<'ctx>,
    c: &Const,
) -> Result<Flow<'ctx>, EngineError> {
    state.push(SymValue::from_bits(c.ty, c.bits));
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::instr::ValTy;

    #[test]
    fn pushes_typed_literals() {
        let mut state = crate::exec::test_support::state_for_tests();
        exec_const(
            &mut state,
            &Const {
                ty: ValTy::I64,
                bits: u64::MAX,
            },
        )
        .unwrap();
        let v = state.pop().unwrap();
        assert_eq!(v.width(), 64);
        assert_eq!(v.as_const_bits(), Some(u64::MAX));
        assert!(!v.is_float());
    }

    #[test]
    fn float_literals_keep_their_bit_pattern() {
        let mut state = crate::exec::test_support::state_for_tests();
        let bits = 1.5f32.to_bits() as u64;
        exec_const(
            &mut state,
            &Const {
                ty: ValTy::F32,
                bits,
            },
        )
        .unwrap();
        let v = state.pop().unwrap();
        assert!(v.is_float());
        assert_eq!(v.as_f32(), Some(1.5));
    }
}
