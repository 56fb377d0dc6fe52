//! Module analyzer.
//!
//! A single deterministic pass over the binary extracts everything the
//! engine consumes: function prototypes (imports first), exports, globals
//! with their initializers, active data segments, table elements, memory
//! limits, and decoded function bodies. Custom name-section entries provide
//! function names; a user-supplied index-to-name map takes precedence.
//!
//! No execution policy lives here. The analyzer is read-only after
//! construction and is shared by reference across all explored states.

use std::collections::HashMap;

use wasmparser::{BlockType, ConstExpr, KnownCustom, Name, Parser, Payload, TypeRef};

use crate::error::EngineError;
use crate::wasm::instr::{self, DecodedFunc, ValTy};

/// Prototype of one function, imported or defined.
#[derive(Debug, Clone)]
pub struct FuncProto {
    pub name: String,
    pub params: Vec<ValTy>,
    pub results: Vec<ValTy>,
    pub type_index: u32,
    /// `Some((module, field))` when the function is an import.
    pub import: Option<(String, String)>,
}

/// How a global receives its initial value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalInit {
    /// Constant initializer from the global section, stored as raw bits.
    Const(u64),
    /// Imported global, or an initializer the engine treats as unknown.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub ty: ValTy,
    pub mutable: bool,
    pub init: GlobalInit,
}

/// Active data segment placed into linear memory before execution.
#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExportItem {
    pub name: String,
    /// External kind: "func" | "memory" | "table" | "global".
    pub kind: &'static str,
    pub index: u32,
}

/// Read-only view of a parsed module.
#[derive(Debug, Default)]
pub struct ModuleAnalyzer {
    /// Function signatures from the type section.
    pub types: Vec<(Vec<ValTy>, Vec<ValTy>)>,
    /// All function prototypes; the first `num_imported_funcs` are imports.
    pub protos: Vec<FuncProto>,
    pub exports: Vec<ExportItem>,
    pub globals: Vec<GlobalDecl>,
    pub datas: Vec<DataSegment>,
    /// Table 0 contents: slot index to function index.
    pub elements: Vec<Option<u32>>,
    /// Initial linear-memory size in 64 KiB pages.
    pub mem_initial_pages: u64,
    pub mem_max_pages: Option<u64>,
    /// Decoded bodies, parallel to `protos[num_imported_funcs..]`.
    pub bodies: Vec<DecodedFunc>,
    pub num_imported_funcs: usize,
}

impl ModuleAnalyzer {
    /// Parse a module. `name_map` overrides name-section function names.
    pub fn parse(bytes: &[u8], name_map: &HashMap<u32, String>) -> Result<Self, EngineError> {
        let mut a = ModuleAnalyzer::default();
        let mut section_names: HashMap<u32, String> = HashMap::new();

        for payload in Parser::new(0).parse_all(bytes) {
            let payload = payload.map_err(|e| EngineError::Malformed(e.to_string()))?;
            match payload {
                Payload::TypeSection(reader) => {
                    for group in reader {
                        let group = group.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        for sub in group.into_types() {
                            let func = sub.unwrap_func();
                            let params = func
                                .params()
                                .iter()
                                .map(|t| instr::val_ty(*t))
                                .collect::<Result<Vec<_>, _>>()?;
                            let results = func
                                .results()
                                .iter()
                                .map(|t| instr::val_ty(*t))
                                .collect::<Result<Vec<_>, _>>()?;
                            a.types.push((params, results));
                        }
                    }
                }
                Payload::ImportSection(reader) => {
                    for import in reader.into_imports() {
                        let import = import.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        match import.ty {
                            TypeRef::Func(type_index) => {
                                let (params, results) = a.signature(type_index)?;
                                a.protos.push(FuncProto {
                                    name: import.name.to_string(),
                                    params,
                                    results,
                                    type_index,
                                    import: Some((
                                        import.module.to_string(),
                                        import.name.to_string(),
                                    )),
                                });
                            }
                            TypeRef::Global(g) => {
                                a.globals.push(GlobalDecl {
                                    ty: instr::val_ty(g.content_type)?,
                                    mutable: g.mutable,
                                    init: GlobalInit::Unknown,
                                });
                            }
                            TypeRef::Memory(m) => {
                                a.mem_initial_pages = m.initial;
                                a.mem_max_pages = m.maximum;
                            }
                            // Imported tables keep their declared size; the
                            // element section still populates slots.
                            TypeRef::Table(t) => {
                                a.elements.resize(t.initial as usize, None);
                            }
                            other => {
                                return Err(EngineError::Malformed(format!(
                                    "unsupported import kind: {other:?}"
                                )));
                            }
                        }
                    }
                    a.num_imported_funcs = a.protos.len();
                }
                Payload::FunctionSection(reader) => {
                    for idx in reader {
                        let type_index = idx.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        let (params, results) = a.signature(type_index)?;
                        let index = a.protos.len();
                        a.protos.push(FuncProto {
                            name: format!("func_{index}"),
                            params,
                            results,
                            type_index,
                            import: None,
                        });
                    }
                }
                Payload::TableSection(reader) => {
                    for table in reader {
                        let table = table.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        if a.elements.len() < table.ty.initial as usize {
                            a.elements.resize(table.ty.initial as usize, None);
                        }
                    }
                }
                Payload::MemorySection(reader) => {
                    for mem in reader {
                        let mem = mem.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        a.mem_initial_pages = mem.initial;
                        a.mem_max_pages = mem.maximum;
                    }
                }
                Payload::GlobalSection(reader) => {
                    for global in reader {
                        let global = global.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        let ty = instr::val_ty(global.ty.content_type).map_err(|_| {
                            EngineError::UnsupportedGlobal(format!(
                                "global content type {:?}",
                                global.ty.content_type
                            ))
                        })?;
                        let init = match const_expr_bits(&global.init_expr) {
                            Some(bits) => GlobalInit::Const(bits),
                            None => GlobalInit::Unknown,
                        };
                        a.globals.push(GlobalDecl {
                            ty,
                            mutable: global.ty.mutable,
                            init,
                        });
                    }
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        let kind = match export.kind {
                            wasmparser::ExternalKind::Func => "func",
                            wasmparser::ExternalKind::Memory => "memory",
                            wasmparser::ExternalKind::Table => "table",
                            wasmparser::ExternalKind::Global => "global",
                            _ => "other",
                        };
                        a.exports.push(ExportItem {
                            name: export.name.to_string(),
                            kind,
                            index: export.index,
                        });
                    }
                }
                Payload::ElementSection(reader) => {
                    for element in reader {
                        let element = element.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        let wasmparser::ElementKind::Active {
                            table_index,
                            offset_expr,
                        } = element.kind
                        else {
                            continue;
                        };
                        if table_index.unwrap_or(0) != 0 {
                            continue;
                        }
                        let base = const_expr_bits(&offset_expr).ok_or_else(|| {
                            EngineError::Malformed("non-constant element offset".into())
                        })? as usize;
                        let wasmparser::ElementItems::Functions(items) = element.items else {
                            continue;
                        };
                        for (i, item) in items.into_iter().enumerate() {
                            let func = item.map_err(|e| EngineError::Malformed(e.to_string()))?;
                            let slot = base + i;
                            if a.elements.len() <= slot {
                                a.elements.resize(slot + 1, None);
                            }
                            a.elements[slot] = Some(func);
                        }
                    }
                }
                Payload::DataSection(reader) => {
                    for data in reader {
                        let data = data.map_err(|e| EngineError::Malformed(e.to_string()))?;
                        let wasmparser::DataKind::Active { offset_expr, .. } = data.kind else {
                            continue;
                        };
                        let offset = const_expr_bits(&offset_expr).ok_or_else(|| {
                            EngineError::Malformed("non-constant data segment offset".into())
                        })?;
                        a.datas.push(DataSegment {
                            offset,
                            data: data.data.to_vec(),
                        });
                    }
                }
                Payload::CodeSectionEntry(body) => {
                    let types = a.types.clone();
                    let arity = move |bt: BlockType| block_arity_in(&types, bt);
                    a.bodies.push(instr::decode_function(&body, &arity)?);
                }
                Payload::CustomSection(c) => {
                    if let KnownCustom::Name(reader) = c.as_known() {
                        for entry in reader {
                            let Ok(Name::Function(map)) = entry else {
                                continue;
                            };
                            for naming in map {
                                let naming =
                                    naming.map_err(|e| EngineError::Malformed(e.to_string()))?;
                                section_names.insert(naming.index, naming.name.to_string());
                            }
                        }
                    }
                }
                Payload::End(_) => {}
                _ => {}
            }
        }

        if a.bodies.len() != a.protos.len() - a.num_imported_funcs {
            return Err(EngineError::Malformed(format!(
                "function section declares {} bodies, code section has {}",
                a.protos.len() - a.num_imported_funcs,
                a.bodies.len()
            )));
        }

        // Apply names: section names first, user map wins.
        for (idx, name) in &section_names {
            if let Some(proto) = a.protos.get_mut(*idx as usize) {
                proto.name = cleanup_name(name);
            }
        }
        for (idx, name) in name_map {
            if let Some(proto) = a.protos.get_mut(*idx as usize) {
                proto.name = cleanup_name(name);
            }
        }

        Ok(a)
    }

    fn signature(&self, type_index: u32) -> Result<(Vec<ValTy>, Vec<ValTy>), EngineError> {
        self.types
            .get(type_index as usize)
            .cloned()
            .ok_or_else(|| EngineError::Malformed(format!("type index {type_index} out of range")))
    }

    /// Result arity of a block type.
    pub fn block_arity(&self, bt: BlockType) -> Result<usize, EngineError> {
        block_arity_in(&self.types, bt)
    }

    pub fn proto(&self, func: u32) -> Result<&FuncProto, EngineError> {
        self.protos
            .get(func as usize)
            .ok_or_else(|| EngineError::Malformed(format!("function index {func} out of range")))
    }

    /// Decoded body of a defined function; `None` for imports.
    pub fn body(&self, func: u32) -> Option<&DecodedFunc> {
        let idx = (func as usize).checked_sub(self.num_imported_funcs)?;
        self.bodies.get(idx)
    }

    pub fn func_name(&self, func: u32) -> &str {
        self.protos
            .get(func as usize)
            .map(|p| p.name.as_str())
            .unwrap_or("unknown")
    }

    /// Resolve an entry name: exported functions first, then any function
    /// whose (name-section) name matches.
    pub fn find_func(&self, name: &str) -> Option<u32> {
        if let Some(e) = self
            .exports
            .iter()
            .find(|e| e.kind == "func" && e.name == name)
        {
            return Some(e.index);
        }
        self.protos
            .iter()
            .position(|p| p.name == name)
            .map(|i| i as u32)
    }

    /// Whether `func` is reachable from outside the module via an export.
    pub fn is_exported_func(&self, func: u32) -> bool {
        self.exports
            .iter()
            .any(|e| e.kind == "func" && e.index == func)
    }
}

fn block_arity_in(
    types: &[(Vec<ValTy>, Vec<ValTy>)],
    bt: BlockType,
) -> Result<usize, EngineError> {
    match bt {
        BlockType::Empty => Ok(0),
        BlockType::Type(_) => Ok(1),
        BlockType::FuncType(idx) => {
            let (params, results) = types
                .get(idx as usize)
                .ok_or_else(|| EngineError::Malformed(format!("block type {idx} out of range")))?;
            if !params.is_empty() {
                return Err(EngineError::Malformed(
                    "multi-value block parameters are not supported".into(),
                ));
            }
            Ok(results.len())
        }
    }
}

/// Evaluate a constant initializer to its raw bits, if it is a plain
/// `*.const`.
fn const_expr_bits(expr: &ConstExpr<'_>) -> Option<u64> {
    let mut reader = expr.get_operators_reader();
    match reader.read().ok()? {
        wasmparser::Operator::I32Const { value } => Some(value as u32 as u64),
        wasmparser::Operator::I64Const { value } => Some(value as u64),
        wasmparser::Operator::F32Const { value } => Some(value.bits() as u64),
        wasmparser::Operator::F64Const { value } => Some(value.bits()),
        _ => None,
    }
}

/// Strip the leading `$` some toolchains keep on name-section entries.
fn cleanup_name(name: &str) -> String {
    name.strip_prefix('$').unwrap_or(name).to_string()
}
