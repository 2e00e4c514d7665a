use super::inst::InstKind;
use super::module::Module;
use super::ty::Ty;
use super::value::{BlockId, FuncId, ValueId};

/// Where newly built instructions go. `After` keeps advancing as
/// instructions are emitted, so a sequence lands in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    Before(ValueId),
    After(ValueId),
    BlockStart(BlockId),
    BlockEnd(BlockId),
}

/// Instruction builder over a module, in the spirit of a positioned IR
/// builder: every emitted instruction is placed at the current insert point
/// and the point advances past it.
pub struct Builder<'m> {
    pub module: &'m mut Module,
    ip: InsertPoint,
}

impl<'m> Builder<'m> {
    pub fn at(module: &'m mut Module, ip: InsertPoint) -> Self {
        Self { module, ip }
    }

    pub fn after(module: &'m mut Module, inst: ValueId) -> Self {
        debug_assert!(module.value(inst).is_inst());
        Self { module, ip: InsertPoint::After(inst) }
    }

    /// First insertion point of a function: the start of its entry block.
    pub fn at_entry(module: &'m mut Module, func: FuncId) -> Self {
        let entry = module.entry_block(func);
        Self { module, ip: InsertPoint::BlockStart(entry) }
    }

    pub fn insert_point(&self) -> InsertPoint {
        self.ip
    }

    pub fn emit(&mut self, kind: InstKind, ty: Ty) -> ValueId {
        let new = match self.ip {
            InsertPoint::Before(next) => {
                let (block, index) = self.module.position_of(next);
                self.module.insert_inst_at(block, index, kind, ty)
            }
            InsertPoint::After(prev) => {
                let (block, index) = self.module.position_of(prev);
                self.module.insert_inst_at(block, index + 1, kind, ty)
            }
            InsertPoint::BlockStart(block) => self.module.insert_inst_at(block, 0, kind, ty),
            InsertPoint::BlockEnd(block) => self.module.push_inst(block, kind, ty),
        };
        self.ip = InsertPoint::After(new);
        new
    }

    /// Emit and copy debug location and annotation from `src`.
    pub fn emit_with_meta(&mut self, kind: InstKind, ty: Ty, src: ValueId) -> ValueId {
        let new = self.emit(kind, ty);
        self.module.copy_meta(new, src);
        new
    }

    /// Integer-to-integer cast by width: sign- or zero-extend when
    /// widening, truncate when narrowing, and fold away when the width
    /// already matches.
    pub fn int_cast(&mut self, v: ValueId, to_bits: u32, signed: bool, meta_src: ValueId) -> ValueId {
        let from_bits = self
            .module
            .ty_of(v)
            .int_bits()
            .expect("int_cast requires an integer operand");
        if from_bits == to_bits {
            return v;
        }
        let kind = if from_bits > to_bits {
            InstKind::Trunc(v)
        } else if signed {
            InstKind::SExt(v)
        } else {
            InstKind::ZExt(v)
        };
        self.emit_with_meta(kind, Ty::Int(to_bits), meta_src)
    }

    pub fn sext_or_trunc(&mut self, v: ValueId, to_bits: u32, meta_src: ValueId) -> ValueId {
        self.int_cast(v, to_bits, true, meta_src)
    }

    pub fn zext_or_trunc(&mut self, v: ValueId, to_bits: u32, meta_src: ValueId) -> ValueId {
        self.int_cast(v, to_bits, false, meta_src)
    }

    /// Shift by a constant amount of the operand's own width.
    pub fn shl_const(&mut self, v: ValueId, amount: u32, meta_src: ValueId) -> ValueId {
        let ty = self.module.ty_of(v);
        let amt = self.module.const_int(ty.clone(), amount as i128);
        self.emit_with_meta(InstKind::Shl(v, amt), ty, meta_src)
    }

    pub fn ashr_const(&mut self, v: ValueId, amount: u32, meta_src: ValueId) -> ValueId {
        let ty = self.module.ty_of(v);
        let amt = self.module.const_int(ty.clone(), amount as i128);
        self.emit_with_meta(InstKind::AShr(v, amt), ty, meta_src)
    }

    pub fn lshr_const(&mut self, v: ValueId, amount: u32, meta_src: ValueId) -> ValueId {
        let ty = self.module.ty_of(v);
        let amt = self.module.const_int(ty.clone(), amount as i128);
        self.emit_with_meta(InstKind::LShr(v, amt), ty, meta_src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_after_advances() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        let first = m.push_inst(bb, InstKind::Unreachable, Ty::Void);

        let mut b = Builder::at(&mut m, InsertPoint::BlockStart(bb));
        let c = b.module.const_int(Ty::Int(16), 1);
        let x = b.emit(InstKind::Shl(c, c), Ty::Int(16));
        let y = b.emit(InstKind::AShr(x, c), Ty::Int(16));

        assert_eq!(m.block(bb).insts, vec![x, y, first]);
    }

    #[test]
    fn int_cast_folds_same_width() {
        let mut m = Module::new("t");
        let f = m.add_function("f", vec![Ty::Int(32)], Ty::Void);
        let bb = m.add_block(f, Some("entry"));
        let arg = m.func(f).params[0];

        let mut b = Builder::at(&mut m, InsertPoint::BlockEnd(bb));
        assert_eq!(b.int_cast(arg, 32, true, arg), arg);
        let widened = b.int_cast(arg, 64, true, arg);
        assert_eq!(m.inst_kind(widened), &InstKind::SExt(arg));
        assert_eq!(m.ty_of(widened), Ty::Int(64));
    }
}
