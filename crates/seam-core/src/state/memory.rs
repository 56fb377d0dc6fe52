//! Interval-keyed symbolic linear memory.
//!
//! The store maps byte intervals `[lo, hi)` to either raw bytes or a
//! little-endian bitvector covering the interval. Overlapping writes carve
//! the older entries so the newest covering entry always wins; reads fall
//! back to the module's static data section for untouched addresses, and
//! to zero elsewhere (grown pages read as fresh symbols, materialized
//! lazily so repeated reads agree).
//!
//! Symbolic addresses are concretized first: if the current constraints
//! admit exactly one address value within the enumeration bound, the access
//! proceeds concretely. A store that stays ambiguous becomes a guarded
//! entry keyed by the address expression; a later load materializes an
//! equality-guarded `ite` chain over the candidates.

use std::collections::BTreeMap;

use tracing::warn;
use z3::ast::{Ast, BV};

use crate::error::EngineError;
use crate::smt::{SmtContext, SymValue};
use crate::state::TrapReason;
use crate::wasm::analyzer::ModuleAnalyzer;

pub const PAGE_SIZE: u64 = 65536;

/// Result of a memory access along one path.
pub enum MemRead<'ctx> {
    Value(SymValue<'ctx>),
    Trap(TrapReason),
}

/// Read-only data-section view, interval-keyed like the mutable store but
/// produced once from the module and never mutated.
#[derive(Debug, Default)]
pub struct DataSection {
    segs: BTreeMap<u64, Vec<u8>>,
}

impl DataSection {
    pub fn from_analyzer(analyzer: &ModuleAnalyzer) -> Self {
        let mut segs = BTreeMap::new();
        for d in &analyzer.datas {
            segs.insert(d.offset, d.data.clone());
        }
        Self { segs }
    }

    pub fn byte_at(&self, addr: u64) -> Option<u8> {
        let (lo, bytes) = self.segs.range(..=addr).next_back()?;
        bytes.get((addr - lo) as usize).copied()
    }

    /// Concrete bytes `[addr, addr + n)` when fully covered by one segment.
    pub fn read_bytes(&self, addr: u64, n: usize) -> Option<&[u8]> {
        let (lo, bytes) = self.segs.range(..=addr).next_back()?;
        let start = (addr - lo) as usize;
        bytes.get(start..start + n)
    }
}

#[derive(Debug, Clone)]
enum Chunk<'ctx> {
    Bytes(Vec<u8>),
    /// Little-endian value; bit width is eight times the interval length.
    Bv(BV<'ctx>),
}

impl<'ctx> Chunk<'ctx> {
    fn byte(&self, k: u64) -> ByteVal<'ctx> {
        match self {
            Chunk::Bytes(b) => ByteVal::Concrete(b[k as usize]),
            Chunk::Bv(bv) => {
                let lo_bit = (k as u32) * 8;
                ByteVal::Sym(bv.extract(lo_bit + 7, lo_bit))
            }
        }
    }

    fn slice(&self, from: u64, len: u64) -> Chunk<'ctx> {
        match self {
            Chunk::Bytes(b) => {
                Chunk::Bytes(b[from as usize..(from + len) as usize].to_vec())
            }
            Chunk::Bv(bv) => {
                let lo_bit = (from as u32) * 8;
                Chunk::Bv(bv.extract(lo_bit + (len as u32) * 8 - 1, lo_bit))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ByteVal<'ctx> {
    Concrete(u8),
    Sym(BV<'ctx>),
}

#[derive(Debug, Clone)]
struct Segment<'ctx> {
    hi: u64,
    chunk: Chunk<'ctx>,
}

/// A store whose address could not be concretized to a single value.
#[derive(Debug, Clone)]
struct GuardedStore<'ctx> {
    addr: BV<'ctx>,
    value: BV<'ctx>,
}

#[derive(Debug, Clone, Default)]
pub struct SymMemory<'ctx> {
    segs: BTreeMap<u64, Segment<'ctx>>,
    guarded: Vec<GuardedStore<'ctx>>,
    pub pages: u64,
    pub max_pages: Option<u64>,
    /// Start of the region added by `memory.grow`, if any.
    grown_from: Option<u64>,
}

impl<'ctx> SymMemory<'ctx> {
    pub fn new(pages: u64, max_pages: Option<u64>) -> Self {
        Self {
            segs: BTreeMap::new(),
            guarded: Vec::new(),
            pages,
            max_pages,
            grown_from: None,
        }
    }

    pub fn limit(&self) -> u64 {
        self.pages * PAGE_SIZE
    }

    /// Grow by `delta` pages, returning the previous page count, or -1 when
    /// the declared maximum would be exceeded.
    pub fn grow(&mut self, delta: u64) -> i64 {
        let new_pages = self.pages + delta;
        if let Some(max) = self.max_pages
            && new_pages > max
        {
            return -1;
        }
        let old = self.pages;
        self.grown_from.get_or_insert(old * PAGE_SIZE);
        self.pages = new_pages;
        old as i64
    }

    /// Store `nbytes` of `value` at `addr`.
    pub fn store(
        &mut self,
        smt: &SmtContext<'ctx>,
        constraints: &[z3::ast::Bool<'ctx>],
        addr: &SymValue<'ctx>,
        value: &SymValue<'ctx>,
        nbytes: u32,
        fanout: usize,
    ) -> Result<Option<TrapReason>, EngineError> {
        if let Some(a) = addr.as_const_bits() {
            return self.store_at(a, value, nbytes);
        }

        let addr_bv = addr.to_bv(smt)?;
        let e = smt.enumerate(&addr_bv, constraints, fanout);
        if e.exhausted && e.values.len() == 1 {
            return self.store_at(e.values[0], value, nbytes);
        }
        if e.values.is_empty() {
            // No feasible address at all: the path itself is infeasible,
            // treat as an out-of-bounds fault.
            return Ok(Some(TrapReason::OutOfBoundsMemory {
                addr: 0,
                len: nbytes,
            }));
        }

        let value_bv = resize_bv(value.to_bv(smt)?, nbytes * 8);
        self.guarded.push(GuardedStore {
            addr: addr_bv,
            value: value_bv,
        });
        Ok(None)
    }

    /// Load `nbytes` from `addr`.
    pub fn load(
        &mut self,
        smt: &SmtContext<'ctx>,
        constraints: &[z3::ast::Bool<'ctx>],
        data: &DataSection,
        addr: &SymValue<'ctx>,
        nbytes: u32,
        fanout: usize,
    ) -> Result<MemRead<'ctx>, EngineError> {
        if let Some(a) = addr.as_const_bits() {
            return self.load_at(smt, data, a, nbytes);
        }

        let addr_bv = addr.to_bv(smt)?;
        let e = smt.enumerate(&addr_bv, constraints, fanout);
        if !e.exhausted {
            warn!(
                candidates = e.values.len(),
                "symbolic load address exceeded the enumeration bound; \
                 later candidates are not modeled"
            );
        }

        let mut alternatives: Vec<(u64, BV<'ctx>)> = Vec::new();
        for a in &e.values {
            match self.load_at(smt, data, *a, nbytes)? {
                MemRead::Value(v) => alternatives.push((*a, v.to_bv(smt)?)),
                MemRead::Trap(_) => {
                    warn!(addr = *a, "skipping out-of-bounds candidate address");
                }
            }
        }
        let Some((_, first)) = alternatives.first().cloned() else {
            return Ok(MemRead::Trap(TrapReason::OutOfBoundsMemory {
                addr: e.values.first().copied().unwrap_or(0),
                len: nbytes,
            }));
        };

        let mut acc = first;
        for (a, v) in alternatives.iter().skip(1) {
            let guard = addr_bv._eq(&smt.bv_const(*a, addr_bv.get_size()));
            acc = guard.ite(v, &acc);
        }
        Ok(MemRead::Value(SymValue::lower_bv(acc)))
    }

    fn store_at(
        &mut self,
        lo: u64,
        value: &SymValue<'ctx>,
        nbytes: u32,
    ) -> Result<Option<TrapReason>, EngineError> {
        let hi = lo + nbytes as u64;
        if hi > self.limit() {
            return Ok(Some(TrapReason::OutOfBoundsMemory {
                addr: lo,
                len: nbytes,
            }));
        }

        let chunk = match value {
            SymValue::Int { bits, .. } | SymValue::Fp { bits, .. } => {
                Chunk::Bytes(bits.to_le_bytes()[..nbytes as usize].to_vec())
            }
            SymValue::Bv(bv) => Chunk::Bv(resize_bv(bv.clone(), nbytes * 8)),
            SymValue::Float(..) => {
                return Err(EngineError::TypeMismatch(
                    "symbolic float reached a raw memory store".into(),
                ));
            }
        };

        self.carve(lo, hi);
        self.segs.insert(lo, Segment { hi, chunk });
        Ok(None)
    }

    fn load_at(
        &mut self,
        smt: &SmtContext<'ctx>,
        data: &DataSection,
        lo: u64,
        nbytes: u32,
    ) -> Result<MemRead<'ctx>, EngineError> {
        let hi = lo + nbytes as u64;
        if hi > self.limit() {
            return Ok(MemRead::Trap(TrapReason::OutOfBoundsMemory {
                addr: lo,
                len: nbytes,
            }));
        }

        let bytes: Vec<ByteVal<'ctx>> = (lo..hi).map(|a| self.byte_at(smt, data, a)).collect();

        let all_concrete = bytes
            .iter()
            .all(|b| matches!(b, ByteVal::Concrete(_)));
        let base = if all_concrete {
            let mut bits: u64 = 0;
            for (k, b) in bytes.iter().enumerate() {
                if let ByteVal::Concrete(v) = b {
                    bits |= (*v as u64) << (8 * k);
                }
            }
            SymValue::Int {
                bits,
                width: nbytes * 8,
            }
        } else {
            // Little-endian concatenation: highest byte first.
            let as_bv = |b: &ByteVal<'ctx>| match b {
                ByteVal::Concrete(v) => smt.bv_const(*v as u64, 8),
                ByteVal::Sym(bv) => bv.clone(),
            };
            let mut acc = as_bv(&bytes[nbytes as usize - 1]);
            for k in (0..nbytes as usize - 1).rev() {
                acc = acc.concat(&as_bv(&bytes[k]));
            }
            SymValue::lower_bv(acc)
        };

        if self.guarded.is_empty() {
            return Ok(MemRead::Value(base));
        }

        // Guarded entries may alias this address; newest wins, so it wraps
        // the chain outermost.
        let addr_bv = smt.bv_const(lo, 32);
        let mut acc = base.to_bv(smt)?;
        for g in &self.guarded {
            if g.value.get_size() == nbytes * 8 {
                acc = g.addr._eq(&addr_bv).ite(&g.value, &acc);
            }
        }
        Ok(MemRead::Value(SymValue::lower_bv(acc)))
    }

    fn byte_at(&mut self, smt: &SmtContext<'ctx>, data: &DataSection, addr: u64) -> ByteVal<'ctx> {
        if let Some((seg_lo, seg)) = self.segs.range(..=addr).next_back()
            && addr < seg.hi
        {
            return seg.chunk.byte(addr - seg_lo);
        }
        if let Some(b) = data.byte_at(addr) {
            return ByteVal::Concrete(b);
        }
        if let Some(grown) = self.grown_from
            && addr >= grown
        {
            // Fresh pages hold unconstrained bytes; memoize so repeated
            // reads observe the same symbol.
            let sym = smt.fresh_bv(&smt.unique_name("grown_mem"), 8);
            self.segs.insert(
                addr,
                Segment {
                    hi: addr + 1,
                    chunk: Chunk::Bv(sym.clone()),
                },
            );
            return ByteVal::Sym(sym);
        }
        ByteVal::Concrete(0)
    }

    /// Remove (or trim) every segment intersecting `[lo, hi)`.
    fn carve(&mut self, lo: u64, hi: u64) {
        let mut touched: Vec<u64> = Vec::new();
        for (&seg_lo, seg) in self.segs.range(..hi).rev() {
            if seg.hi <= lo {
                break;
            }
            touched.push(seg_lo);
        }
        for seg_lo in touched {
            let Some(seg) = self.segs.remove(&seg_lo) else {
                continue;
            };
            if seg_lo < lo {
                let left = seg.chunk.slice(0, lo - seg_lo);
                self.segs.insert(
                    seg_lo,
                    Segment {
                        hi: lo,
                        chunk: left,
                    },
                );
            }
            if seg.hi > hi {
                let right = seg.chunk.slice(hi - seg_lo, seg.hi - hi);
                self.segs.insert(
                    hi,
                    Segment {
                        hi: seg.hi,
                        chunk: right,
                    },
                );
            }
        }
    }
}

fn resize_bv<'ctx>(bv: BV<'ctx>, width: u32) -> BV<'ctx> {
    let have = bv.get_size();
    if have == width {
        bv
    } else if have > width {
        bv.extract(width - 1, 0)
    } else {
        bv.zero_ext(width - have)
    }
}
