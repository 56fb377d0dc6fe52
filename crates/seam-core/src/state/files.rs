//! Per-state file descriptor table.
//!
//! Descriptors 0 (stdin), 1 (stdout), and 2 (stderr) always exist.
//! Additional descriptors are populated from configuration before
//! exploration begins; WASI preopens alias onto them.

use z3::ast::BV;

use crate::config::Context;
use crate::smt::{SmtContext, SymValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdFlag {
    Read,
    Write,
    ReadWrite,
}

impl FdFlag {
    pub fn readable(self) -> bool {
        matches!(self, FdFlag::Read | FdFlag::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, FdFlag::Write | FdFlag::ReadWrite)
    }
}

/// Contents of one descriptor.
#[derive(Debug, Clone)]
pub enum FdContent<'ctx> {
    /// Concrete readable bytes with a consumption cursor.
    Bytes { data: Vec<u8>, cursor: usize },
    /// Symbolic readable contents; the cursor counts consumed bytes,
    /// lowest byte first.
    Sym { bv: BV<'ctx>, cursor: u32 },
    /// Append-only sink for written bytes (each 8 bits wide, possibly
    /// symbolic).
    Sink(Vec<SymValue<'ctx>>),
}

impl<'ctx> FdContent<'ctx> {
    /// Bytes still available for reading.
    pub fn remaining(&self) -> usize {
        match self {
            FdContent::Bytes { data, cursor } => data.len().saturating_sub(*cursor),
            FdContent::Sym { bv, cursor } => {
                (bv.get_size() / 8).saturating_sub(*cursor) as usize
            }
            FdContent::Sink(_) => 0,
        }
    }

    /// Consume and return the next byte, if any.
    pub fn take_byte(&mut self) -> Option<SymValue<'ctx>> {
        match self {
            FdContent::Bytes { data, cursor } => {
                let b = *data.get(*cursor)?;
                *cursor += 1;
                Some(SymValue::Int {
                    bits: b as u64,
                    width: 8,
                })
            }
            FdContent::Sym { bv, cursor } => {
                if *cursor >= bv.get_size() / 8 {
                    return None;
                }
                let lo = *cursor * 8;
                *cursor += 1;
                Some(SymValue::lower_bv(bv.extract(lo + 7, lo)))
            }
            FdContent::Sink(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord<'ctx> {
    pub name: String,
    pub status: FdStatus,
    pub flag: FdFlag,
    pub content: FdContent<'ctx>,
}

#[derive(Debug, Clone, Default)]
pub struct FileTable<'ctx> {
    fds: Vec<(u32, FileRecord<'ctx>)>,
}

impl<'ctx> FileTable<'ctx> {
    /// Standard descriptors plus configured presets at fds 3, 4, ...
    pub fn from_context(smt: &SmtContext<'ctx>, ctx: &Context) -> Self {
        let stdin_content = if ctx.sym_stdin > 0 {
            FdContent::Sym {
                bv: smt.fresh_input_bv("sym_stdin", ctx.sym_stdin * 8),
                cursor: 0,
            }
        } else {
            FdContent::Bytes {
                data: Vec::new(),
                cursor: 0,
            }
        };

        let mut fds = vec![
            (
                0,
                FileRecord {
                    name: "stdin".to_string(),
                    status: FdStatus::Open,
                    flag: FdFlag::Read,
                    content: stdin_content,
                },
            ),
            (
                1,
                FileRecord {
                    name: "stdout".to_string(),
                    status: FdStatus::Open,
                    flag: FdFlag::Write,
                    content: FdContent::Sink(Vec::new()),
                },
            ),
            (
                2,
                FileRecord {
                    name: "stderr".to_string(),
                    status: FdStatus::Open,
                    flag: FdFlag::Write,
                    content: FdContent::Sink(Vec::new()),
                },
            ),
        ];

        for (i, preset) in ctx.files.iter().enumerate() {
            fds.push((
                3 + i as u32,
                FileRecord {
                    name: preset.name.clone(),
                    status: FdStatus::Open,
                    flag: FdFlag::ReadWrite,
                    content: FdContent::Bytes {
                        data: preset.content.clone(),
                        cursor: 0,
                    },
                },
            ));
        }

        Self { fds }
    }

    pub fn get(&self, fd: u32) -> Option<&FileRecord<'ctx>> {
        self.fds.iter().find(|(n, _)| *n == fd).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, fd: u32) -> Option<&mut FileRecord<'ctx>> {
        self.fds.iter_mut().find(|(n, _)| *n == fd).map(|(_, r)| r)
    }

    pub fn contains(&self, fd: u32) -> bool {
        self.get(fd).is_some()
    }

    /// Alias `new_fd` onto the record of `dir_fd` (path_open model).
    pub fn alias(&mut self, new_fd: u32, dir_fd: u32) {
        if let Some(record) = self.get(dir_fd).cloned()
            && self.get(new_fd).is_none()
        {
            self.fds.push((new_fd, record));
        }
    }

    pub fn close(&mut self, fd: u32) {
        if let Some(r) = self.get_mut(fd) {
            r.name.clear();
            r.status = FdStatus::Closed;
            r.content = FdContent::Sink(Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_smt(f: impl FnOnce(&SmtContext<'_>)) {
        let cfg = z3::Config::new();
        let ctx = z3::Context::new(&cfg);
        let smt = SmtContext::new(&ctx);
        f(&smt);
    }

    #[test]
    fn standard_descriptors_always_present() {
        with_smt(|smt| {
            let files = FileTable::from_context(smt, &Context::default());
            for fd in 0..3 {
                let r = files.get(fd).expect("stdio fd present");
                assert_eq!(r.status, FdStatus::Open);
            }
            assert!(files.get(1).unwrap().flag.writable());
            assert!(files.get(0).unwrap().flag.readable());
        });
    }

    #[test]
    fn presets_populate_from_fd_three() {
        with_smt(|smt| {
            let mut ctx = Context::default();
            ctx.files.push(crate::config::FilePreset {
                name: "a.txt".into(),
                content: b"hi".to_vec(),
            });
            let files = FileTable::from_context(smt, &ctx);
            let r = files.get(3).expect("preset at fd 3");
            assert_eq!(r.name, "a.txt");
            assert_eq!(r.content.remaining(), 2);
        });
    }

    #[test]
    fn concrete_content_consumes_in_order() {
        let mut c = FdContent::Bytes {
            data: b"ab".to_vec(),
            cursor: 0,
        };
        let a = c.take_byte().unwrap();
        assert_eq!(a.as_const_bits(), Some(b'a' as u64));
        assert_eq!(c.remaining(), 1);
        let b = c.take_byte().unwrap();
        assert_eq!(b.as_const_bits(), Some(b'b' as u64));
        assert!(c.take_byte().is_none());
    }

    #[test]
    fn symbolic_content_yields_lowest_byte_first() {
        with_smt(|smt| {
            let bv = smt.bv_const(0x0201, 16);
            let mut c = FdContent::Sym { bv, cursor: 0 };
            assert_eq!(c.take_byte().unwrap().as_const_bits(), Some(1));
            assert_eq!(c.take_byte().unwrap().as_const_bits(), Some(2));
            assert!(c.take_byte().is_none());
        });
    }

    #[test]
    fn close_marks_descriptor_unusable() {
        with_smt(|smt| {
            let mut files = FileTable::from_context(smt, &Context::default());
            files.close(1);
            assert_eq!(files.get(1).unwrap().status, FdStatus::Closed);
        });
    }

    #[test]
    fn symbolic_stdin_registers_an_input() {
        with_smt(|smt| {
            let mut ctx = Context::default();
            ctx.sym_stdin = 4;
            let files = FileTable::from_context(smt, &ctx);
            assert_eq!(files.get(0).unwrap().content.remaining(), 4);
            assert!(smt.inputs().iter().any(|(n, _)| n == "sym_stdin"));
        });
    }
}
