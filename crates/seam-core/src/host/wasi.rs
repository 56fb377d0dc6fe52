//! WASI import models.
//!
//! Each model extracts its parameters in declaration order, applies its
//! effect to the VM state (memory, file table, argv, constraints), and
//! pushes the errno-style result the real host would. Success is 0;
//! errno 8 (BADF) covers bad descriptors.
//!
//! `fd_fdstat_get` concretizes `fs_filetype = 2` and `fs_flags = 0`; the
//! symbolic disjunction over all filetypes is deliberately not modeled.

use tracing::{debug, info, warn};
use z3::ast::Ast;

use crate::error::EngineError;
use crate::exec::ExecEnv;
use crate::host::{HostOutcome, concretize, load_or_trap, store_or_trap};
use crate::smt::SymValue;
use crate::state::files::{FdContent, FdStatus};
use crate::state::{ArgvEntry, Terminal, VmState};
use crate::wasm::analyzer::FuncProto;

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_BADF: i32 = 8;

/// First and last fd modeled as a preopened directory.
const PREOPEN_FIRST: u64 = 3;
const PREOPEN_LAST: u64 = 4;

/// Dispatch a WASI import by field name; `None` means the name is not
/// modeled and the generic unknown-import path applies.
pub fn try_call<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    proto: &FuncProto,
    field: &str,
) -> Result<Option<HostOutcome>, EngineError> {
    if !matches!(
        field,
        "args_sizes_get"
            | "args_get"
            | "environ_sizes_get"
            | "environ_get"
            | "fd_fdstat_get"
            | "fd_prestat_get"
            | "fd_prestat_dir_name"
            | "path_open"
            | "fd_read"
            | "fd_write"
            | "fd_seek"
            | "fd_tell"
            | "fd_advise"
            | "fd_close"
            | "proc_exit"
    ) {
        return Ok(None);
    }

    let args = state.popn(proto.params.len())?;
    let outcome = match field {
        "args_sizes_get" => args_sizes_get(env, state, &args)?,
        "args_get" => args_get(env, state, &args)?,
        "environ_sizes_get" => environ_sizes_get(env, state, &args)?,
        "environ_get" => push_errno(state, ERRNO_SUCCESS),
        "fd_fdstat_get" => fd_fdstat_get(env, state, &args)?,
        "fd_prestat_get" => fd_prestat_get(env, state, &args)?,
        "fd_prestat_dir_name" => fd_prestat_dir_name(env, state, &args)?,
        "path_open" => path_open(env, state, &args)?,
        "fd_read" => fd_read(env, state, &args)?,
        "fd_write" => fd_write(env, state, &args)?,
        "fd_seek" => fd_seek(env, state, &args)?,
        "fd_tell" => fd_tell(env, state, &args)?,
        "fd_advise" => push_errno(state, ERRNO_SUCCESS),
        "fd_close" => fd_close(env, state, &args)?,
        "proc_exit" => proc_exit(env, state, &args)?,
        _ => unreachable!("filtered above"),
    };
    Ok(Some(outcome))
}

fn push_errno<'ctx>(state: &mut VmState<'ctx>, errno: i32) -> HostOutcome {
    state.push(SymValue::from_i32(errno));
    HostOutcome::Done
}

fn scalar<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
    idx: usize,
    what: &str,
) -> Result<Option<u64>, EngineError> {
    let Some(v) = args.get(idx) else {
        return Err(EngineError::Malformed(format!(
            "WASI call missing parameter {idx} ({what})"
        )));
    };
    concretize(env, state, v, what)
}

/// `args_sizes_get(argc_addr, argv_buf_size_addr)`
fn args_sizes_get<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(argc_addr), Some(size_addr)) = (
        scalar(env, state, args, 0, "argc_addr")?,
        scalar(env, state, args, 1, "argv_buf_size_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(argc_addr, size_addr, "args_sizes_get");

    let argc = state.argv.len() as i32;
    // Every argument is NUL terminated in the buffer.
    let buf_size: u64 = state.argv.iter().map(|a| a.byte_len() as u64 + 1).sum();

    if !store_or_trap(env, state, argc_addr, SymValue::from_i32(argc), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    if !store_or_trap(env, state, size_addr, SymValue::from_i32(buf_size as i32), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// `args_get(argv_addr, argv_buf_addr)`: strings land consecutively at
/// `argv_buf_addr`; their pointers land at `argv_addr`.
fn args_get<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(argv_addr), Some(buf_addr)) = (
        scalar(env, state, args, 0, "argv_addr")?,
        scalar(env, state, args, 1, "argv_buf_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(argv_addr, buf_addr, "args_get");

    let argv = state.argv.clone();
    let mut cursor = buf_addr;
    for (i, arg) in argv.iter().enumerate() {
        if !store_or_trap(
            env,
            state,
            argv_addr + 4 * i as u64,
            SymValue::from_i32(cursor as i32),
            4,
        )? {
            return Ok(HostOutcome::Terminal);
        }
        match arg {
            ArgvEntry::Concrete(bytes) => {
                for (k, b) in bytes.iter().enumerate() {
                    if !store_or_trap(
                        env,
                        state,
                        cursor + k as u64,
                        SymValue::from_i32(*b as i32),
                        1,
                    )? {
                        return Ok(HostOutcome::Terminal);
                    }
                }
                cursor += bytes.len() as u64;
            }
            ArgvEntry::Sym { bv, len } => {
                if !store_or_trap(env, state, cursor, SymValue::Bv(bv.clone()), *len)? {
                    return Ok(HostOutcome::Terminal);
                }
                cursor += *len as u64;
            }
        }
        if !store_or_trap(env, state, cursor, SymValue::from_i32(0), 1)? {
            return Ok(HostOutcome::Terminal);
        }
        cursor += 1;
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// The modeled environment is empty.
fn environ_sizes_get<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(count_addr), Some(size_addr)) = (
        scalar(env, state, args, 0, "environ_count_addr")?,
        scalar(env, state, args, 1, "environ_buf_size_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    if !store_or_trap(env, state, count_addr, SymValue::from_i32(0), 4)?
        || !store_or_trap(env, state, size_addr, SymValue::from_i32(0), 4)?
    {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// Minimal 24-byte fdstat: filetype 2 (character device), no flags, no
/// rights.
fn fd_fdstat_get<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(fd), Some(stat_addr)) = (
        scalar(env, state, args, 0, "fd")?,
        scalar(env, state, args, 1, "fd_stat_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    debug!(fd, stat_addr, "fd_fdstat_get");

    let fields: [(u64, i64, u32); 6] = [
        (0, 2, 1),  // fs_filetype
        (1, 0, 1),  // pad
        (2, 0, 2),  // fs_flags
        (4, 0, 4),  // pad
        (8, 0, 8),  // fs_rights_base
        (16, 0, 8), // fs_rights_inheriting
    ];
    for (off, value, width) in fields {
        let v = SymValue::Int {
            bits: value as u64,
            width: width * 8,
        };
        if !store_or_trap(env, state, stat_addr + off, v, width)? {
            return Ok(HostOutcome::Terminal);
        }
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// A single preopened directory at fds 3..4; anything later is BADF so the
/// libc preopen scan terminates.
fn fd_prestat_get<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(fd), Some(prestat_addr)) = (
        scalar(env, state, args, 0, "fd")?,
        scalar(env, state, args, 1, "prestat_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    debug!(fd, prestat_addr, "fd_prestat_get");

    if !(PREOPEN_FIRST..=PREOPEN_LAST).contains(&fd) {
        return Ok(push_errno(state, ERRNO_BADF));
    }

    // Tag 0 is __WASI_PREOPENTYPE_DIR; the remaining bytes pad the union.
    if !store_or_trap(env, state, prestat_addr, SymValue::from_i32(0), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    let name_len = preopen_name(state, fd).len() as i32;
    if !store_or_trap(env, state, prestat_addr + 4, SymValue::from_i32(name_len), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

fn preopen_name(state: &VmState<'_>, fd: u64) -> String {
    state
        .files
        .get(fd as u32)
        .filter(|r| !r.name.is_empty())
        .map(|r| r.name.clone())
        .unwrap_or_else(|| "a.txt".to_string())
}

fn fd_prestat_dir_name<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(fd), Some(path_addr), Some(path_len)) = (
        scalar(env, state, args, 0, "fd")?,
        scalar(env, state, args, 1, "path_addr")?,
        scalar(env, state, args, 2, "path_len")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    debug!(fd, path_addr, path_len, "fd_prestat_dir_name");

    let name = preopen_name(state, fd);
    for (k, b) in name.as_bytes().iter().take(path_len as usize).enumerate() {
        if !store_or_trap(env, state, path_addr + k as u64, SymValue::from_i32(*b as i32), 1)? {
            return Ok(HostOutcome::Terminal);
        }
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// `path_open` aliases the opened fd onto the parent directory fd.
fn path_open<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(dir_fd), Some(fd_addr)) = (
        scalar(env, state, args, 0, "dir_fd")?,
        scalar(env, state, args, args.len() - 1, "opened_fd_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(dir_fd, fd_addr, "path_open");

    // The opened descriptor aliases the parent directory fd.
    if !store_or_trap(env, state, fd_addr, SymValue::from_i32(dir_fd as i32), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// `fd_read(fd, iovs, n_iovs, nread_addr)`: fill each iov buffer from the
/// descriptor contents, advancing the content cursor.
fn fd_read<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(fd), Some(iovs_addr), Some(n_iovs), Some(nread_addr)) = (
        scalar(env, state, args, 0, "fd")?,
        scalar(env, state, args, 1, "iovs_addr")?,
        scalar(env, state, args, 2, "n_iovs")?,
        scalar(env, state, args, 3, "nread_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(fd, iovs_addr, n_iovs, nread_addr, "fd_read");

    let readable = state
        .files
        .get(fd as u32)
        .is_some_and(|r| r.status == FdStatus::Open && r.flag.readable());
    if !readable {
        warn!(fd, "fd_read on a descriptor that is not open for reading");
        return Ok(push_errno(state, ERRNO_BADF));
    }

    let mut read_count: u64 = 0;
    'iovs: for i in 0..n_iovs {
        let Some(buf_ptr) = load_or_trap(env, state, iovs_addr + 8 * i, 4)? else {
            return Ok(HostOutcome::Terminal);
        };
        let Some(buf_len) = load_or_trap(env, state, iovs_addr + 8 * i + 4, 4)? else {
            return Ok(HostOutcome::Terminal);
        };
        let (Some(buf_ptr), Some(buf_len)) = (
            concretize(env, state, &buf_ptr, "iov_base")?,
            concretize(env, state, &buf_len, "iov_len")?,
        ) else {
            return Ok(push_errno(state, ERRNO_BADF));
        };

        for k in 0..buf_len {
            let byte = state
                .files
                .get_mut(fd as u32)
                .and_then(|record| record.content.take_byte());
            let Some(byte) = byte else {
                break 'iovs; // contents drained
            };
            if !store_or_trap(env, state, buf_ptr + k, byte, 1)? {
                return Ok(HostOutcome::Terminal);
            }
            read_count += 1;
        }
    }

    info!(read_count, "fd_read complete");
    if !store_or_trap(env, state, nread_addr, SymValue::from_i32(read_count as i32), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// `fd_write(fd, iovs, n_iovs, nwritten_addr)`: append each iov's bytes to
/// the descriptor contents; fds 1 and 2 also feed the captured output.
fn fd_write<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let (Some(fd), Some(iovs_addr), Some(n_iovs), Some(nwritten_addr)) = (
        scalar(env, state, args, 0, "fd")?,
        scalar(env, state, args, 1, "iovs_addr")?,
        scalar(env, state, args, 2, "n_iovs")?,
        scalar(env, state, args, 3, "nwritten_addr")?,
    ) else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(fd, iovs_addr, n_iovs, nwritten_addr, "fd_write");

    let writable = state
        .files
        .get(fd as u32)
        .is_some_and(|r| r.status == FdStatus::Open && r.flag.writable());
    if !writable {
        warn!(fd, "fd_write on a descriptor that is not open for writing");
        return Ok(push_errno(state, ERRNO_BADF));
    }

    let mut written: u64 = 0;
    for i in 0..n_iovs {
        let Some(data_ptr) = load_or_trap(env, state, iovs_addr + 8 * i, 4)? else {
            return Ok(HostOutcome::Terminal);
        };
        let Some(data_len) = load_or_trap(env, state, iovs_addr + 8 * i + 4, 4)? else {
            return Ok(HostOutcome::Terminal);
        };
        let (Some(data_ptr), Some(data_len)) = (
            concretize(env, state, &data_ptr, "iov_base")?,
            concretize(env, state, &data_len, "iov_len")?,
        ) else {
            return Ok(push_errno(state, ERRNO_BADF));
        };

        for k in 0..data_len {
            let Some(byte) = load_or_trap(env, state, data_ptr + k, 1)? else {
                return Ok(HostOutcome::Terminal);
            };
            append_to_fd(state, fd as u32, byte);
        }
        written += data_len;
    }

    info!(written, "fd_write complete");
    if !store_or_trap(env, state, nwritten_addr, SymValue::from_i32(written as i32), 4)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

pub(crate) fn append_to_fd<'ctx>(state: &mut VmState<'ctx>, fd: u32, byte: SymValue<'ctx>) {
    state.capture_output(fd, byte.clone());
    if let Some(record) = state.files.get_mut(fd) {
        match &mut record.content {
            FdContent::Sink(sink) => sink.push(byte),
            FdContent::Bytes { data, .. } => match byte.as_const_bits() {
                Some(b) => data.push(b as u8),
                None => warn!(fd, "dropping symbolic byte written to a concrete file"),
            },
            FdContent::Sym { .. } => {
                warn!(fd, "write to a symbolic-content descriptor ignored");
            }
        }
    }
}

/// `fd_seek`/`fd_tell` report a fresh symbolic offset.
fn fd_seek<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let Some(new_offset_addr) = scalar(env, state, args, 3, "new_offset_addr")? else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    let sym = env.smt.fresh_bv(&env.smt.unique_name("fd_seek"), 64);
    if !store_or_trap(env, state, new_offset_addr, SymValue::Bv(sym), 8)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

fn fd_tell<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let Some(offset_addr) = scalar(env, state, args, 1, "offset_addr")? else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    let sym = env.smt.fresh_bv(&env.smt.unique_name("fd_tell"), 64);
    if !store_or_trap(env, state, offset_addr, SymValue::Bv(sym), 8)? {
        return Ok(HostOutcome::Terminal);
    }
    Ok(push_errno(state, ERRNO_SUCCESS))
}

fn fd_close<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let Some(fd) = scalar(env, state, args, 0, "fd")? else {
        return Ok(push_errno(state, ERRNO_BADF));
    };
    info!(fd, "fd_close");
    state.files.close(fd as u32);
    Ok(push_errno(state, ERRNO_SUCCESS))
}

/// `proc_exit(code)`: record `exit_code == code` and terminate the path.
fn proc_exit<'ctx>(
    env: &ExecEnv<'_, 'ctx>,
    state: &mut VmState<'ctx>,
    args: &[SymValue<'ctx>],
) -> Result<HostOutcome, EngineError> {
    let code = args
        .first()
        .cloned()
        .ok_or_else(|| EngineError::Malformed("proc_exit without a status code".into()))?;
    info!("proc_exit");

    let exit_sym = env.smt.fresh_bv(&env.smt.unique_name("exit_code"), 32);
    let code_bv = code.to_bv(env.smt)?;
    state.constrain(exit_sym._eq(&code_bv));
    state.terminal = Some(Terminal::Exit(code));
    Ok(HostOutcome::Terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{Harness, state_for_tests};
    use crate::smt::SmtContext;
    use crate::state::files::FileTable;
    use crate::state::memory::MemRead;

    fn with_env(f: impl for<'a, 'ctx> FnOnce(&'a ExecEnv<'a, 'ctx>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        let h = Harness::new();
        let env = h.env(&smt);
        f(&env);
    }

    fn read_u32<'a>(env: &ExecEnv<'a, 'a>, state: &mut VmState<'a>, addr: u64) -> u64 {
        let addr = SymValue::Int {
            bits: addr,
            width: 64,
        };
        match state
            .mem_load(env.smt, env.data, &addr, 4, env.fanout())
            .unwrap()
        {
            MemRead::Value(v) => v.as_const_bits().unwrap(),
            MemRead::Trap(t) => panic!("trap: {t}"),
        }
    }

    fn read_byte<'a>(env: &ExecEnv<'a, 'a>, state: &mut VmState<'a>, addr: u64) -> u64 {
        let addr = SymValue::Int {
            bits: addr,
            width: 64,
        };
        match state
            .mem_load(env.smt, env.data, &addr, 1, env.fanout())
            .unwrap()
        {
            MemRead::Value(v) => v.as_const_bits().unwrap(),
            MemRead::Trap(t) => panic!("trap: {t}"),
        }
    }

    #[test]
    fn args_sizes_then_args_get_roundtrip() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            state.argv = vec![
                ArgvEntry::Concrete(b"prog".to_vec()),
                ArgvEntry::Concrete(b"xy".to_vec()),
            ];

            let outcome = args_sizes_get(
                env,
                &mut state,
                &[SymValue::from_i32(100), SymValue::from_i32(104)],
            )
            .unwrap();
            assert!(matches!(outcome, HostOutcome::Done));
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0)); // errno
            assert_eq!(read_u32(env, &mut state, 100), 2); // argc
            assert_eq!(read_u32(env, &mut state, 104), 5 + 3); // "prog\0xy\0"

            args_get(
                env,
                &mut state,
                &[SymValue::from_i32(200), SymValue::from_i32(300)],
            )
            .unwrap();
            state.pop().unwrap();
            // argv[0] pointer, then the bytes themselves.
            assert_eq!(read_u32(env, &mut state, 200), 300);
            assert_eq!(read_u32(env, &mut state, 204), 305);
            assert_eq!(read_byte(env, &mut state, 300), b'p' as u64);
            assert_eq!(read_byte(env, &mut state, 304), 0);
            assert_eq!(read_byte(env, &mut state, 305), b'x' as u64);
            assert_eq!(read_byte(env, &mut state, 307), 0);
        });
    }

    #[test]
    fn fdstat_concretizes_filetype_two() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            fd_fdstat_get(
                env,
                &mut state,
                &[SymValue::from_i32(1), SymValue::from_i32(64)],
            )
            .unwrap();
            state.pop().unwrap();
            assert_eq!(read_byte(env, &mut state, 64), 2);
            assert_eq!(read_u32(env, &mut state, 66) & 0xffff, 0);
        });
    }

    #[test]
    fn prestat_rejects_fd_five_and_beyond() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);
            fd_prestat_get(
                env,
                &mut state,
                &[SymValue::from_i32(5), SymValue::from_i32(64)],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(8)); // BADF

            fd_prestat_get(
                env,
                &mut state,
                &[SymValue::from_i32(3), SymValue::from_i32(64)],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0));
        });
    }

    #[test]
    fn fd_write_appends_to_output_buffer() {
        with_env(|env| {
            let mut state = state_for_tests();
            state.files = FileTable::from_context(env.smt, env.config);

            // Place "xyz" at 500 and an iovec (base=500, len=3) at 400.
            for (k, b) in b"xyz".iter().enumerate() {
                store_or_trap(env, &mut state, 500 + k as u64, SymValue::from_i32(*b as i32), 1)
                    .unwrap();
            }
            store_or_trap(env, &mut state, 400, SymValue::from_i32(500), 4).unwrap();
            store_or_trap(env, &mut state, 404, SymValue::from_i32(3), 4).unwrap();

            fd_write(
                env,
                &mut state,
                &[
                    SymValue::from_i32(1),
                    SymValue::from_i32(400),
                    SymValue::from_i32(1),
                    SymValue::from_i32(408),
                ],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0));
            assert_eq!(read_u32(env, &mut state, 408), 3); // nwritten

            let bytes: Vec<u64> = state
                .output
                .iter()
                .filter(|(fd, _)| *fd == 1)
                .map(|(_, b)| b.as_const_bits().unwrap())
                .collect();
            assert_eq!(bytes, vec![b'x' as u64, b'y' as u64, b'z' as u64]);
        });
    }

    #[test]
    fn fd_read_consumes_preset_content() {
        with_env(|env| {
            let mut state = state_for_tests();
            let mut config = crate::config::Context::default();
            config.files.push(crate::config::FilePreset {
                name: "in.txt".into(),
                content: b"AB".to_vec(),
            });
            state.files = FileTable::from_context(env.smt, &config);

            // iovec at 400: base=600, len=16.
            store_or_trap(env, &mut state, 400, SymValue::from_i32(600), 4).unwrap();
            store_or_trap(env, &mut state, 404, SymValue::from_i32(16), 4).unwrap();

            fd_read(
                env,
                &mut state,
                &[
                    SymValue::from_i32(3),
                    SymValue::from_i32(400),
                    SymValue::from_i32(1),
                    SymValue::from_i32(408),
                ],
            )
            .unwrap();
            assert_eq!(state.pop().unwrap().as_const_bits(), Some(0));
            assert_eq!(read_u32(env, &mut state, 408), 2);
            assert_eq!(read_byte(env, &mut state, 600), b'A' as u64);
            assert_eq!(read_byte(env, &mut state, 601), b'B' as u64);
            // Content is drained; a second read returns zero bytes.
            fd_read(
                env,
                &mut state,
                &[
                    SymValue::from_i32(3),
                    SymValue::from_i32(400),
                    SymValue::from_i32(1),
                    SymValue::from_i32(408),
                ],
            )
            .unwrap();
            state.pop().unwrap();
            assert_eq!(read_u32(env, &mut state, 408), 0);
        });
    }

    #[test]
    fn proc_exit_terminalizes_with_exit_constraint() {
        with_env(|env| {
            let mut state = state_for_tests();
            let outcome = proc_exit(env, &mut state, &[SymValue::from_i32(7)]).unwrap();
            assert!(matches!(outcome, HostOutcome::Terminal));
            assert!(matches!(state.terminal, Some(Terminal::Exit(_))));
            assert_eq!(state.constraints.len(), 1);
        });
    }

    #[test]
    fn unmodeled_field_reports_none() {
        with_env(|env| {
            let mut state = state_for_tests();
            let proto = FuncProto {
                name: "sock_send".into(),
                params: vec![],
                results: vec![],
                type_index: 0,
                import: Some(("wasi_snapshot_preview1".into(), "sock_send".into())),
            };
            let out = try_call(env, &mut state, &proto, "sock_send").unwrap();
            assert!(out.is_none());
        });
    }
}
