//! Wasm binary front half: artifact loading, module analysis, instruction
//! decoding.

pub mod analyzer;
pub mod instr;
pub mod read;
