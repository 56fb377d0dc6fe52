//! C library models.
//!
//! Programs compiled from C carry libc routines in the binary; descending
//! into them costs thousands of instructions and concretizes nothing
//! useful. Calls to the routines named here are modeled directly against
//! the VM state instead. `scanf` conversions become fresh input symbols,
//! `malloc` is a per-state bump allocator, and the printing family appends
//! to the captured output.
//!
//! Format-string handling is deliberately minimal: enough for the `%d`,
//! `%u`, `%x`, `%c`, `%s`, and float specifiers that observed binaries
//! use. A symbolic numeric argument is concretized for display only; no
//! constraint is added.

use tracing::{info, warn};

use crate::error::EngineError;
use crate::exec::ExecEnv;
use crate::host::{HostOutcome, concretize, host_trap, load_or_trap, store_or_trap, wasi};
use crate::smt::SymValue;
use crate::state::{Terminal, TrapReason, VmState};
use crate::wasm::analyzer::FuncProto;

/// Longest string walked byte by byte before giving up.
const MAX_STR_WALK: u64 = 4096;
/// Longest run of symbolic bytes copied before a model stops.
const MAX_SYM_RUN: usize = 64;

/// Canonical name, tolerating leading underscores the toolchain adds.
fn canonical(name: &str) -> &str {
    let stripped = name.trim_start_matches('_');
    match stripped {
        "iprintf" => "printf",
        other => other,
    }
}

pub fn is_modeled(name: &str) -> bool {
    matches!(
        canonical(name),
        "printf"
            | "puts"
            | "putchar"
            | "scanf"
            | "strlen"
            | "strcpy"
            | "memcpy"
            | "memset"
            | "malloc"
            | "calloc"
            | "free"
            | "exit"
            | "atoi"
    )
}

/// Apply the model for `name`. `args` are the call arguments in
/// declaration order; the caller already popped them.
pub fn call_named<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    proto: &FuncProto,
    name: &str,
    args: Vec<SymValue<'ctx>>,
) -> Result<HostOutcome, EngineError> {
    let name = canonical(name);
    info!(func = name, "modeling C library call");
    match name {
        "printf" => printf(env, state, &args),
        "puts" => puts(env, state, &args),
        "putchar" => putchar(state, &args),
        "scanf" => scanf(env, state, &args),
        "strlen" => strlen(env, state, &args),
        "strcpy" => strcpy(env, state, &args),
        "memcpy" => memcpy(env, state, &args),
        "memset" => memset(env, state, &args),
        "malloc" => malloc(env, state, &args),
        "calloc" => calloc(env, state, &args),
        "free" => {
            let _ = args;
            Ok(HostOutcome::Done)
        }
        "exit" => exit_model(env, state, &args),
        "atoi" => atoi(env, state, &args),
        other => Err(EngineError::Malformed(format!(
            "no model for C routine `{other}` (proto {})",
            proto.name
        ))),
    }
}

fn low_byte<'ctx>(env: &ExecEnv<'_, 'ctx>, v: &SymValue<'ctx>) -> Result<SymValue<'ctx>, EngineError> {
    match v.as_const_bits() {
        Some(b) => Ok(SymValue::Int {
            bits: b & 0xff,
            width: 8,
        }),
        None => Ok(SymValue::lower_bv(v.to_bv(env.smt)?.extract(7, 0))),
    }
}

fn arg<'ctx>(args: &[SymValue<'ctx>], idx: usize, what: &str) -> Result<SymValue<'ctx>, EngineError> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| EngineError::Malformed(format!("C model missing argument {idx} ({what})")))
}

/// Walk a NUL-terminated string in memory. Bytes may be symbolic; the walk
/// stops at a concrete NUL, after a bounded symbolic run, or at the walk
/// limit.
fn read_c_bytes<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    addr: u64,
) -> Result<Option<Vec<SymValue<'ctx>>>, EngineError> {
    let mut bytes = Vec::new();
    let mut sym_run = 0usize;
    for k in 0..MAX_STR_WALK {
        let Some(b) = load_or_trap(env, state, addr + k, 1)? else {
            return Ok(None); // trapped
        };
        match b.as_const_bits() {
            Some(0) => return Ok(Some(bytes)),
            Some(_) => {
                sym_run = 0;
                bytes.push(b);
            }
            None => {
                sym_run += 1;
                bytes.push(b);
                if sym_run >= MAX_SYM_RUN {
                    warn!(addr, "string walk stopped after a long symbolic run");
                    return Ok(Some(bytes));
                }
            }
        }
    }
    warn!(addr, "string walk hit the length limit");
    Ok(Some(bytes))
}

fn concrete_string(bytes: &[SymValue<'_>]) -> Option<String> {
    bytes
        .iter()
        .map(|b| b.as_const_bits().map(|v| v as u8))
        .collect::<Option<Vec<u8>>>()
        .map(|v| String::from_utf8_lossy(&v).into_owned())
}

fn emit_str<'ctx>(state: &mut VmState<'ctx>, s: &str) {
    for b in s.bytes() {
        wasi::append_to_fd(
            state,
            1,
            SymValue::Int {
                bits: b as u64,
                width: 8,
            },
        );
    }
}

fn align_up(v: u64, a: u64) -> u64 {
    (v + a - 1) & !(a - 1)
}

/// Display value of a possibly-symbolic integer: concretized against the
/// current constraints, without pinning the path.
fn display_int<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &VmState<'ctx>,
    v: &SymValue<'ctx>,
) -> Result<u64, EngineError> {
    if let Some(b) = v.as_const_bits() {
        return Ok(b);
    }
    let bv = v.to_bv(env.smt)?;
    let e = env.smt.enumerate(&bv, &state.constraints, 1);
    let value = e.values.first().copied().unwrap_or(0);
    warn!(value, "symbolic printf argument concretized for display only");
    Ok(value)
}

fn printf<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let fmt_ptr = arg(args, 0, "format")?;
    let Some(fmt_ptr) = concretize(env, state, &fmt_ptr, "format pointer")? else {
        state.push(SymValue::from_i32(-1));
        return Ok(HostOutcome::Done);
    };
    let Some(fmt_bytes) = read_c_bytes(env, state, fmt_ptr)? else {
        return Ok(HostOutcome::Terminal);
    };
    let Some(fmt) = concrete_string(&fmt_bytes) else {
        warn!("symbolic printf format; emitting nothing");
        state.push(SymValue::from_i32(0));
        return Ok(HostOutcome::Done);
    };

    // The wasm C ABI passes varargs through a buffer pointer.
    let mut vararg_cursor = match args.get(1) {
        Some(v) => concretize(env, state, v, "vararg buffer")?.unwrap_or(0),
        None => 0,
    };
    let mut written = 0usize;

    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            let mut buf = [0u8; 4];
            emit_str(state, c.encode_utf8(&mut buf));
            written += c.len_utf8();
            continue;
        }
        // Skip flags, width, and precision; note length modifiers.
        let mut long_long = false;
        let spec = loop {
            match chars.next() {
                Some(m @ ('l' | 'h' | 'z')) => {
                    if m == 'l' && chars.peek() == Some(&'l') {
                        chars.next();
                        long_long = true;
                    }
                }
                Some(m) if m.is_ascii_digit() || "+-. #".contains(m) => {}
                Some(m) => break Some(m),
                None => break None,
            }
        };
        let Some(spec) = spec else { break };

        match spec {
            '%' => {
                emit_str(state, "%");
                written += 1;
            }
            'c' => {
                vararg_cursor = align_up(vararg_cursor, 4);
                let Some(v) = load_or_trap(env, state, vararg_cursor, 4)? else {
                    return Ok(HostOutcome::Terminal);
                };
                vararg_cursor += 4;
                let b = display_int(env, state, &v)? as u8;
                emit_str(state, &(b as char).to_string());
                written += 1;
            }
            'd' | 'i' | 'u' | 'x' | 'X' => {
                let size = if long_long { 8 } else { 4 };
                vararg_cursor = align_up(vararg_cursor, size);
                let Some(v) = load_or_trap(env, state, vararg_cursor, size as u32)? else {
                    return Ok(HostOutcome::Terminal);
                };
                vararg_cursor += size;
                let bits = display_int(env, state, &v)?;
                let text = match spec {
                    'd' | 'i' if size == 4 => (bits as u32 as i32).to_string(),
                    'd' | 'i' => (bits as i64).to_string(),
                    'u' => bits.to_string(),
                    'x' => format!("{bits:x}"),
                    _ => format!("{bits:X}"),
                };
                written += text.len();
                emit_str(state, &text);
            }
            'f' | 'g' | 'e' => {
                vararg_cursor = align_up(vararg_cursor, 8);
                let Some(v) = load_or_trap(env, state, vararg_cursor, 8)? else {
                    return Ok(HostOutcome::Terminal);
                };
                vararg_cursor += 8;
                let bits = display_int(env, state, &v)?;
                let text = format!("{}", f64::from_bits(bits));
                written += text.len();
                emit_str(state, &text);
            }
            's' => {
                vararg_cursor = align_up(vararg_cursor, 4);
                let Some(p) = load_or_trap(env, state, vararg_cursor, 4)? else {
                    return Ok(HostOutcome::Terminal);
                };
                vararg_cursor += 4;
                let Some(p) = concretize(env, state, &p, "%s pointer")? else {
                    continue;
                };
                let Some(bytes) = read_c_bytes(env, state, p)? else {
                    return Ok(HostOutcome::Terminal);
                };
                written += bytes.len();
                for b in bytes {
                    wasi::append_to_fd(state, 1, b);
                }
            }
            other => {
                warn!(spec = %other, "unsupported printf conversion; emitted verbatim");
                emit_str(state, &format!("%{other}"));
                written += 2;
            }
        }
    }

    state.push(SymValue::from_i32(written as i32));
    Ok(HostOutcome::Done)
}

fn puts<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let ptr = arg(args, 0, "string")?;
    let Some(ptr) = concretize(env, state, &ptr, "puts pointer")? else {
        state.push(SymValue::from_i32(-1));
        return Ok(HostOutcome::Done);
    };
    let Some(bytes) = read_c_bytes(env, state, ptr)? else {
        return Ok(HostOutcome::Terminal);
    };
    let n = bytes.len();
    for b in bytes {
        wasi::append_to_fd(state, 1, b);
    }
    wasi::append_to_fd(
        state,
        1,
        SymValue::Int {
            bits: b'\n' as u64,
            width: 8,
        },
    );
    state.push(SymValue::from_i32(n as i32 + 1));
    Ok(HostOutcome::Done)
}

fn putchar<'ctx>(
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let c = arg(args, 0, "char")?;
    let byte = match c.as_const_bits() {
        Some(b) => SymValue::Int {
            bits: b & 0xff,
            width: 8,
        },
        None => c.clone(),
    };
    // Symbolic chars stay symbolic in the output and resolve at report
    // time.
    let byte = match byte {
        SymValue::Bv(ref bv) if bv.get_size() > 8 => SymValue::lower_bv(bv.extract(7, 0)),
        other => other,
    };
    wasi::append_to_fd(state, 1, byte);
    state.push(c);
    Ok(HostOutcome::Done)
}

fn scanf<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let fmt_ptr = arg(args, 0, "format")?;
    let Some(fmt_ptr) = concretize(env, state, &fmt_ptr, "format pointer")? else {
        state.push(SymValue::from_i32(-1));
        return Ok(HostOutcome::Done);
    };
    let Some(fmt_bytes) = read_c_bytes(env, state, fmt_ptr)? else {
        return Ok(HostOutcome::Terminal);
    };
    let fmt = concrete_string(&fmt_bytes).unwrap_or_default();

    let mut vararg_cursor = match args.get(1) {
        Some(v) => concretize(env, state, v, "vararg buffer")?.unwrap_or(0),
        None => 0,
    };
    let mut converted = 0i32;

    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        let spec = loop {
            match chars.next() {
                Some(m) if m.is_ascii_digit() || "lhz".contains(m) => {}
                Some(m) => break Some(m),
                None => break None,
            }
        };
        let Some(spec) = spec else { break };

        vararg_cursor = align_up(vararg_cursor, 4);
        let Some(dest) = load_or_trap(env, state, vararg_cursor, 4)? else {
            return Ok(HostOutcome::Terminal);
        };
        vararg_cursor += 4;
        let Some(dest) = concretize(env, state, &dest, "scanf destination")? else {
            continue;
        };

        match spec {
            'd' | 'i' | 'u' | 'x' => {
                let name = env.smt.unique_name("scanf_int");
                let sym = env.smt.fresh_input_bv(&name, 32);
                if !store_or_trap(env, state, dest, SymValue::Bv(sym), 4)? {
                    return Ok(HostOutcome::Terminal);
                }
                converted += 1;
            }
            'c' => {
                let name = env.smt.unique_name("scanf_char");
                let sym = env.smt.fresh_input_bv(&name, 8);
                if !store_or_trap(env, state, dest, SymValue::Bv(sym), 1)? {
                    return Ok(HostOutcome::Terminal);
                }
                converted += 1;
            }
            's' => {
                let len = env.config.sym_arg_len.max(1);
                let name = env.smt.unique_name("scanf_str");
                let sym = env.smt.fresh_input_bv(&name, len * 8);
                if !store_or_trap(env, state, dest, SymValue::Bv(sym), len)? {
                    return Ok(HostOutcome::Terminal);
                }
                if !store_or_trap(env, state, dest + len as u64, SymValue::from_i32(0), 1)? {
                    return Ok(HostOutcome::Terminal);
                }
                converted += 1;
            }
            other => {
                warn!(spec = %other, "unsupported scanf conversion skipped");
            }
        }
    }

    state.push(SymValue::from_i32(converted));
    Ok(HostOutcome::Done)
}

fn strlen<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let ptr = arg(args, 0, "string")?;
    let Some(ptr) = concretize(env, state, &ptr, "strlen pointer")? else {
        state.push(SymValue::from_i32(0));
        return Ok(HostOutcome::Done);
    };
    let Some(bytes) = read_c_bytes(env, state, ptr)? else {
        return Ok(HostOutcome::Terminal);
    };
    if bytes.iter().all(|b| b.is_concrete()) {
        state.push(SymValue::from_i32(bytes.len() as i32));
    } else {
        warn!("strlen over symbolic bytes modeled as a fresh length");
        let name = env.smt.unique_name("strlen_ret");
        state.push(SymValue::Bv(env.smt.fresh_bv(&name, 32)));
    }
    Ok(HostOutcome::Done)
}

fn strcpy<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let dst = arg(args, 0, "dst")?;
    let src = arg(args, 1, "src")?;
    let (Some(dst_addr), Some(src_addr)) = (
        concretize(env, state, &dst, "strcpy dst")?,
        concretize(env, state, &src, "strcpy src")?,
    ) else {
        state.push(dst);
        return Ok(HostOutcome::Done);
    };

    let Some(bytes) = read_c_bytes(env, state, src_addr)? else {
        return Ok(HostOutcome::Terminal);
    };
    let mut cursor = dst_addr;
    for b in bytes {
        if !store_or_trap(env, state, cursor, b, 1)? {
            return Ok(HostOutcome::Terminal);
        }
        cursor += 1;
    }
    if !store_or_trap(env, state, cursor, SymValue::from_i32(0), 1)? {
        return Ok(HostOutcome::Terminal);
    }
    state.push(dst);
    Ok(HostOutcome::Done)
}

fn memcpy<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let dst = arg(args, 0, "dst")?;
    let (Some(dst_addr), Some(src_addr), Some(n)) = (
        concretize(env, state, &dst, "memcpy dst")?,
        concretize(env, state, &arg(args, 1, "src")?, "memcpy src")?,
        concretize(env, state, &arg(args, 2, "len")?, "memcpy len")?,
    ) else {
        state.push(dst);
        return Ok(HostOutcome::Done);
    };

    for k in 0..n {
        let Some(b) = load_or_trap(env, state, src_addr + k, 1)? else {
            return Ok(HostOutcome::Terminal);
        };
        if !store_or_trap(env, state, dst_addr + k, b, 1)? {
            return Ok(HostOutcome::Terminal);
        }
    }
    state.push(dst);
    Ok(HostOutcome::Done)
}

fn memset<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let dst = arg(args, 0, "dst")?;
    let fill = low_byte(env, &arg(args, 1, "fill")?)?;
    let (Some(dst_addr), Some(n)) = (
        concretize(env, state, &dst, "memset dst")?,
        concretize(env, state, &arg(args, 2, "len")?, "memset len")?,
    ) else {
        state.push(dst);
        return Ok(HostOutcome::Done);
    };

    for k in 0..n {
        if !store_or_trap(env, state, dst_addr + k, fill.clone(), 1)? {
            return Ok(HostOutcome::Terminal);
        }
    }
    state.push(dst);
    Ok(HostOutcome::Done)
}

fn malloc<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let n = concretize(env, state, &arg(args, 0, "size")?, "malloc size")?.unwrap_or(0);
    state.heap_ptr = align_up(state.heap_ptr, 16);
    let ptr = state.heap_ptr;
    state.heap_ptr += n.max(1);
    info!(ptr, size = n, "malloc");
    state.push(SymValue::from_i32(ptr as i32));
    Ok(HostOutcome::Done)
}

fn calloc<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let count = concretize(env, state, &arg(args, 0, "count")?, "calloc count")?.unwrap_or(0);
    let size = concretize(env, state, &arg(args, 1, "size")?, "calloc size")?.unwrap_or(0);
    let total = count.saturating_mul(size);
    state.heap_ptr = align_up(state.heap_ptr, 16);
    let ptr = state.heap_ptr;
    state.heap_ptr += total.max(1);
    for k in 0..total {
        if !store_or_trap(env, state, ptr + k, SymValue::from_i32(0), 1)? {
            return Ok(HostOutcome::Terminal);
        }
    }
    state.push(SymValue::from_i32(ptr as i32));
    Ok(HostOutcome::Done)
}

fn exit_model<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let code = arg(args, 0, "status")?;
    use z3::ast::Ast;
    let exit_sym = env.smt.fresh_bv(&env.smt.unique_name("exit_code"), 32);
    let code_bv = code.to_bv(env.smt)?;
    state.constrain(exit_sym._eq(&code_bv));
    state.terminal = Some(Terminal::Exit(code));
    Ok(HostOutcome::Terminal)
}

fn atoi<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let ptr = arg(args, 0, "string")?;
    let Some(ptr) = concretize(env, state, &ptr, "atoi pointer")? else {
        return Ok(host_trap(
            state,
            TrapReason::OutOfBoundsMemory { addr: 0, len: 1 },
        ));
    };
    let Some(bytes) = read_c_bytes(env, state, ptr)? else {
        return Ok(HostOutcome::Terminal);
    };
    match concrete_string(&bytes) {
        Some(s) => {
            let parsed: i32 = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
                .collect::<String>()
                .parse()
                .unwrap_or(0);
            state.push(SymValue::from_i32(parsed));
        }
        None => {
            warn!("atoi over symbolic bytes modeled as a fresh integer");
            let name = env.smt.unique_name("atoi_ret");
            state.push(SymValue::Bv(env.smt.fresh_bv(&name, 32)));
        }
    }
    Ok(HostOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};
    use crate::smt::SmtContext;
    use crate::state::files::FileTable;

    fn with_env(f: impl for<'a, 'ctx> FnOnce(&'a ExecEnv<'a, 'ctx>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);
        f(&env);
    }

    fn write_str<'a, 'ctx>(env: &ExecEnv<'a, 'ctx>, state: &mut VmState<'ctx>, addr: u64, s: &[u8]) {
        for (k, b) in s.iter().enumerate() {
            store_or_trap(env, state, addr + k as u64, SymValue::from_i32(*b as i32), 1).unwrap();
        }
        store_or_trap(env, state, addr + s.len() as u64, SymValue::from_i32(0), 1).unwrap();
    }

    fn stdout_text(state: &VmState<'_>) -> String {
        let bytes: Vec<u8> = state
            .output
            .iter()
            .filter(|(fd, _)| *fd == 1)
            .map(|(_, b)| b.as_const_bits().unwrap() as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn name_matching_tolerates_underscores() {
        assert!(is_modeled("printf"));
        assert!(is_modeled("_malloc"));
        assert!(is_modeled("iprintf"));
        assert!(!is_modeled("qsort"));
    }

    #[test]
    fn puts_appends_string_and_newline() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            write_str(env, &mut state, 100, b"a");
            puts(env, &mut state, &[SymValue::from_i32(100)]).unwrap();
            assert_eq!(stdout_text(&state), "a\n");
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(2));
        });
    }

    #[test]
    fn printf_formats_decimal_arguments() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            write_str(env, &mut state, 100, b"n=%d!");
            // vararg buffer at 200 holding the i32 42.
            store_or_trap(env, &mut state, 200, SymValue::from_i32(42), 4).unwrap();
            printf(
                env,
                &mut state,
                &[SymValue::from_i32(100), SymValue::from_i32(200)],
            )
            .unwrap();
            assert_eq!(stdout_text(&state), "n=42!");
        });
    }

    #[test]
    fn printf_copies_percent_s_bytes() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            write_str(env, &mut state, 100, b"[%s]");
            write_str(env, &mut state, 300, b"ok");
            store_or_trap(env, &mut state, 200, SymValue::from_i32(300), 4).unwrap();
            printf(
                env,
                &mut state,
                &[SymValue::from_i32(100), SymValue::from_i32(200)],
            )
            .unwrap();
            assert_eq!(stdout_text(&state), "[ok]");
        });
    }

    #[test]
    fn scanf_materializes_fresh_inputs() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            write_str(env, &mut state, 100, b"%d");
            // vararg buffer at 200 holds the destination pointer 400.
            store_or_trap(env, &mut state, 200, SymValue::from_i32(400), 4).unwrap();
            scanf(
                env,
                &mut state,
                &[SymValue::from_i32(100), SymValue::from_i32(200)],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(1));
            assert!(
                env.smt
                    .inputs()
                    .iter()
                    .any(|(name, _)| name.starts_with("scanf_int"))
            );
        });
    }

    #[test]
    fn strlen_and_strcpy_concrete_roundtrip() {
        with_env(|env| {
            let mut state = state_for_tests();
            write_str(env, &mut state, 100, b"hello");
            strlen(env, &mut state, &[SymValue::from_i32(100)]).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(5));

            strcpy(
                env,
                &mut state,
                &[SymValue::from_i32(300), SymValue::from_i32(100)],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(300));
            strlen(env, &mut state, &[SymValue::from_i32(300)]).unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(5));
        });
    }

    #[test]
    fn malloc_bumps_and_aligns() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.heap_ptr = 1000;
            malloc(env, &mut state, &[SymValue::from_i32(10)]).unwrap();
            let first = state.pop().unwrap().as_const_bits().unwrap();
            malloc(env, &mut state, &[SymValue::from_i32(10)]).unwrap();
            let second = state.pop().unwrap().as_const_bits().unwrap();
            assert_eq!(first % 16, 0);
            assert_eq!(second % 16, 0);
            assert!(second >= first + 10);
        });
    }

    #[test]
    fn exit_behaves_like_proc_exit() {
        with_env(|env| {
            let mut state = state_for_tests();
            let outcome = exit_model(env, &mut state, &[SymValue::from_i32(3)]).unwrap();
            assert!(matches!(outcome, HostOutcome::Terminal));
            assert!(matches!(state.terminal, Some(Terminal::Exit(_))));
        });
    }
}
