use serde::{Deserialize, Serialize};

use super::constant::Constant;
use super::inst::InstKind;
use super::metadata::IntrinsicKind;
use super::ty::Ty;
use super::value::{BlockId, FuncId, Global, Inst, ValueData, ValueId, ValueKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub name: String,
    pub params: Vec<ValueId>,
    pub ret_ty: Ty,
    pub blocks: Vec<BlockId>,
    /// Marked by the analysis: calls to this function may trigger cloning.
    pub clone_source: bool,
    /// Runtime support functions that must never be cloned.
    pub special: bool,
    pub intrinsic: Option<IntrinsicKind>,
    /// The function does not access memory (pure).
    pub readnone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub func: FuncId,
    pub name: Option<String>,
    /// Ordered instruction list; the terminator is the last entry.
    pub insts: Vec<ValueId>,
}

/// A whole translation unit: a value arena shared by all functions, plus
/// the function and block tables. Value ids stay stable across erasures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    values: Vec<Option<ValueData>>,
    functions: Vec<Option<FunctionData>>,
    blocks: Vec<BlockData>,
    globals: Vec<ValueId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            functions: Vec::new(),
            blocks: Vec::new(),
            globals: Vec::new(),
        }
    }

    // ----- values -----

    fn alloc_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId::new(self.values.len() as u32);
        self.values.push(Some(data));
        id
    }

    pub fn value(&self, v: ValueId) -> &ValueData {
        self.values[v.index()].as_ref().expect("use of erased value")
    }

    pub fn value_mut(&mut self, v: ValueId) -> &mut ValueData {
        self.values[v.index()].as_mut().expect("use of erased value")
    }

    pub fn try_value(&self, v: ValueId) -> Option<&ValueData> {
        self.values.get(v.index()).and_then(|slot| slot.as_ref())
    }

    pub fn is_erased(&self, v: ValueId) -> bool {
        self.try_value(v).is_none()
    }

    pub fn ty_of(&self, v: ValueId) -> Ty {
        self.value(v).ty.clone()
    }

    pub fn name_of(&self, v: ValueId) -> Option<&str> {
        self.value(v).name.as_deref()
    }

    /// Copy debug location and analysis annotation from `src` onto `dst`.
    pub fn copy_meta(&mut self, dst: ValueId, src: ValueId) {
        let (dbg, anno) = {
            let s = self.value(src);
            (s.dbg, s.anno.clone())
        };
        let d = self.value_mut(dst);
        if dbg.is_some() {
            d.dbg = dbg;
        }
        if anno.is_some() {
            d.anno = anno;
        }
    }

    // ----- constants -----

    pub fn constant(&mut self, c: Constant) -> ValueId {
        let ty = c.ty().clone();
        self.alloc_value(ValueData {
            kind: ValueKind::Constant(c),
            ty,
            name: None,
            dbg: None,
            anno: None,
        })
    }

    pub fn const_int(&mut self, ty: Ty, value: i128) -> ValueId {
        debug_assert!(ty.is_int());
        self.constant(Constant::Int { value, ty })
    }

    pub fn const_float(&mut self, ty: Ty, value: f64) -> ValueId {
        debug_assert!(ty.is_float());
        self.constant(Constant::Float { value, ty })
    }

    pub fn const_undef(&mut self, ty: Ty) -> ValueId {
        self.constant(Constant::Undef(ty))
    }

    // ----- globals -----

    /// A global's value type is a pointer to its content type.
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        content_ty: Ty,
        init: Option<Constant>,
    ) -> ValueId {
        let id = self.alloc_value(ValueData {
            kind: ValueKind::Global(Global { init, is_const: false }),
            ty: content_ty.ptr_to(),
            name: Some(name.into()),
            dbg: None,
            anno: None,
        });
        self.globals.push(id);
        id
    }

    pub fn globals(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.globals.iter().copied().filter(|v| !self.is_erased(*v))
    }

    // ----- functions -----

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        param_tys: Vec<Ty>,
        ret_ty: Ty,
    ) -> FuncId {
        let func = FuncId::new(self.functions.len() as u32);
        let params = param_tys
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.alloc_value(ValueData {
                    kind: ValueKind::Argument { func, index: index as u32 },
                    ty,
                    name: None,
                    dbg: None,
                    anno: None,
                })
            })
            .collect();
        self.functions.push(Some(FunctionData {
            name: name.into(),
            params,
            ret_ty,
            blocks: Vec::new(),
            clone_source: false,
            special: false,
            intrinsic: None,
            readnone: false,
        }));
        func
    }

    pub fn func(&self, f: FuncId) -> &FunctionData {
        self.functions[f.index()].as_ref().expect("use of erased function")
    }

    pub fn func_mut(&mut self, f: FuncId) -> &mut FunctionData {
        self.functions[f.index()].as_mut().expect("use of erased function")
    }

    pub fn try_func(&self, f: FuncId) -> Option<&FunctionData> {
        self.functions.get(f.index()).and_then(|slot| slot.as_ref())
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| FuncId::new(i as u32))
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.function_ids().find(|f| self.func(*f).name == name)
    }

    /// Remove a function and every value inside it from the module.
    pub fn erase_function(&mut self, f: FuncId) {
        let data = self.functions[f.index()].take().expect("function erased twice");
        for p in &data.params {
            self.values[p.index()] = None;
        }
        for b in &data.blocks {
            let insts = std::mem::take(&mut self.blocks[b.index()].insts);
            for v in insts {
                self.values[v.index()] = None;
            }
        }
    }

    pub fn entry_block(&self, f: FuncId) -> BlockId {
        *self.func(f).blocks.first().expect("function has no blocks")
    }

    // ----- blocks -----

    pub fn add_block(&mut self, func: FuncId, name: Option<&str>) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            func,
            name: name.map(str::to_string),
            insts: Vec::new(),
        });
        self.func_mut(func).blocks.push(id);
        id
    }

    pub fn block(&self, b: BlockId) -> &BlockData {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: BlockId) -> &mut BlockData {
        &mut self.blocks[b.index()]
    }

    // ----- instructions -----

    pub fn push_inst(&mut self, block: BlockId, kind: InstKind, ty: Ty) -> ValueId {
        let id = self.alloc_value(ValueData {
            kind: ValueKind::Inst(Inst { kind, block }),
            ty,
            name: None,
            dbg: None,
            anno: None,
        });
        self.blocks[block.index()].insts.push(id);
        id
    }

    pub fn insert_inst_at(&mut self, block: BlockId, index: usize, kind: InstKind, ty: Ty) -> ValueId {
        let id = self.alloc_value(ValueData {
            kind: ValueKind::Inst(Inst { kind, block }),
            ty,
            name: None,
            dbg: None,
            anno: None,
        });
        self.blocks[block.index()].insts.insert(index, id);
        id
    }

    /// Block and in-block position of an instruction.
    pub fn position_of(&self, v: ValueId) -> (BlockId, usize) {
        let inst = self.value(v).as_inst().expect("not an instruction");
        let block = inst.block;
        let index = self.blocks[block.index()]
            .insts
            .iter()
            .position(|i| *i == v)
            .expect("instruction not in its block");
        (block, index)
    }

    pub fn inst_kind(&self, v: ValueId) -> &InstKind {
        &self.value(v).as_inst().expect("not an instruction").kind
    }

    /// Function containing a value, when it has one.
    pub fn func_of_value(&self, v: ValueId) -> Option<FuncId> {
        match &self.try_value(v)?.kind {
            ValueKind::Inst(inst) => Some(self.block(inst.block).func),
            ValueKind::Argument { func, .. } => Some(*func),
            ValueKind::Placeholder { block } => Some(self.block(*block).func),
            _ => None,
        }
    }

    pub fn create_placeholder(
        &mut self,
        ty: Ty,
        block: BlockId,
        name: impl Into<String>,
    ) -> ValueId {
        self.alloc_value(ValueData {
            kind: ValueKind::Placeholder { block },
            ty,
            name: Some(name.into()),
            dbg: None,
            anno: None,
        })
    }

    // ----- def-use -----

    /// Every instruction that uses `v` as an operand, in program order.
    pub fn users(&self, v: ValueId) -> Vec<ValueId> {
        let mut out = Vec::new();
        for f in self.function_ids() {
            for &b in &self.func(f).blocks {
                for &i in &self.block(b).insts {
                    let Some(data) = self.try_value(i) else { continue };
                    let Some(inst) = data.as_inst() else { continue };
                    if inst.kind.operands().contains(&v) {
                        out.push(i);
                    }
                }
            }
        }
        out
    }

    pub fn use_empty(&self, v: ValueId) -> bool {
        self.users(v).is_empty()
    }

    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        debug_assert_eq!(
            self.value(old).ty,
            self.value(new).ty,
            "replacement must have the same type"
        );
        self.replace_all_uses_unchecked(old, new);
    }

    /// Use rewrite without the same-type check. Function cloning needs this
    /// to redirect a retyped parameter to a placeholder of the original type.
    pub fn replace_all_uses_unchecked(&mut self, old: ValueId, new: ValueId) {
        for user in self.users(old) {
            if let Some(inst) = self.value_mut(user).as_inst_mut() {
                inst.kind.for_each_operand_mut(|op| {
                    if *op == old {
                        *op = new;
                    }
                });
            }
        }
    }

    /// Detach an instruction from its block and tombstone its value.
    pub fn erase_inst(&mut self, v: ValueId) {
        debug_assert!(self.use_empty(v), "erasing an instruction that still has uses");
        let (block, index) = self.position_of(v);
        self.blocks[block.index()].insts.remove(index);
        self.values[v.index()] = None;
    }

    /// Drop an unused placeholder slot.
    pub fn erase_placeholder(&mut self, v: ValueId) {
        debug_assert!(self.value(v).is_placeholder());
        debug_assert!(self.use_empty(v), "erasing a placeholder that still has uses");
        self.values[v.index()] = None;
    }

    // ----- type navigation -----

    /// Result type of a `gep` over `base_ty` (a pointer) with the given
    /// indices: the first index steps the pointer, subsequent indices step
    /// into arrays and (by constant index) struct fields.
    pub fn gep_result_ty(&self, base_ty: &Ty, indices: &[ValueId]) -> Option<Ty> {
        let mut cur = base_ty.pointee()?.clone();
        for idx in &indices[1..] {
            cur = match cur {
                Ty::Array(elem, _) => (*elem).clone(),
                Ty::Struct(s) => {
                    let field = self.value(*idx).as_constant()?.as_int()? as usize;
                    s.fields.get(field)?.clone()
                }
                _ => return None,
            };
        }
        Some(cur.ptr_to())
    }
}
