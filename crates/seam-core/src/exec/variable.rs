//! Variable group: moves between the stack and local/global slots.
//!
//! Slot indices come from a validated module, so a miss is a programming
//! error, not a trap. Width changes on `set` likewise indicate a decoder
//! or handler bug and abort the run.

use crate::error::EngineError;
use crate::exec::Flow;
use crate::smt::SymValue;
use crate::state::VmState;
use crate::wasm::instr::Variable;

pub fn exec_variable<'ctx>(
    state: &mut VmState<'ctx>,
    v: &Variable,
) -> Result<Flow<'ctx>, EngineError> {
    match v {
        Variable::LocalGet(idx) => {
            let v = slot(&state.locals, *idx, "local")?.clone();
            state.push(v);
        }
        Variable::LocalSet(idx) => {
            let value = state.pop()?;
            set_slot(&mut state.locals, *idx, value, "local")?;
        }
        Variable::LocalTee(idx) => {
            let value = state
                .stack
                .last()
                .cloned()
                .ok_or_else(|| EngineError::StackUnderflow("local.tee".into()))?;
            set_slot(&mut state.locals, *idx, value, "local")?;
        }
        Variable::GlobalGet(idx) => {
            let v = slot(&state.globals, *idx, "global")?.clone();
            state.push(v);
        }
        Variable::GlobalSet(idx) => {
            let value = state.pop()?;
            set_slot(&mut state.globals, *idx, value, "global")?;
        }
    }
    Ok(Flow::Continue)
}

fn slot<'a, 'ctx>(
    slots: &'a [SymValue<'ctx>],
    idx: u32,
    kind: &str,
) -> Result<&'a SymValue<'ctx>, EngineError> {
    slots
        .get(idx as usize)
        .ok_or_else(|| EngineError::Malformed(format!("{kind} index {idx} out of range")))
}

fn set_slot<'ctx>(
    slots: &mut [SymValue<'ctx>],
    idx: u32,
    value: SymValue<'ctx>,
    kind: &str,
) -> Result<(), EngineError> {
    let slot = slots
        .get_mut(idx as usize)
        .ok_or_else(|| EngineError::Malformed(format!("{kind} index {idx} out of range")))?;
    if slot.width() != value.width() {
        return Err(EngineError::WidthMismatch(slot.width(), value.width()));
    }
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::state_for_tests;

    #[test]
    fn get_set_tee_roundtrip() {
        let mut state = state_for_tests();
        state.locals = vec![SymValue::from_i32(0), SymValue::from_i32(0)];

        state.push(SymValue::from_i32(7));
        exec_variable(&mut state, &Variable::LocalSet(0)).unwrap();
        exec_variable(&mut state, &Variable::LocalGet(0)).unwrap();
        assert_eq!(state.pop().unwrap().as_const_bits(), Some(7));

        state.push(SymValue::from_i32(9));
        exec_variable(&mut state, &Variable::LocalTee(1)).unwrap();
        // tee keeps the value on the stack and writes the local.
        assert_eq!(state.stack.len(), 1);
        assert_eq!(state.locals[1].as_const_bits(), Some(9));
    }

    #[test]
    fn globals_are_independent_slots() {
        let mut state = state_for_tests();
        state.globals = vec![SymValue::from_i64(3)];
        state.push(SymValue::from_i64(4));
        exec_variable(&mut state, &Variable::GlobalSet(0)).unwrap();
        exec_variable(&mut state, &Variable::GlobalGet(0)).unwrap();
        assert_eq!(state.pop().unwrap().as_const_bits(), Some(4));
    }

    #[test]
    fn width_change_on_set_is_fatal() {
        let mut state = state_for_tests();
        state.locals = vec![SymValue::from_i32(0)];
        state.push(SymValue::from_i64(1));
        let err = exec_variable(&mut state, &Variable::LocalSet(0));
        assert!(matches!(err, Err(EngineError::WidthMismatch(32, 64))));
    }

    #[test]
    fn out_of_range_index_is_fatal() {
        let mut state = state_for_tests();
        let err = exec_variable(&mut state, &Variable::LocalGet(5));
        assert!(err.is_err());
    }
}
