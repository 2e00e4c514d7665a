use serde::{Deserialize, Serialize};
use std::fmt;

use super::constant::Constant;
use super::inst::InstKind;
use super::metadata::{DebugLoc, FixpAnnotation};
use super::ty::Ty;

/// Type-safe value reference. Values are instructions, arguments, globals,
/// constants, and placeholders; the id is stable across erasures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(u32);

impl ValueId {
    pub fn new(index: u32) -> Self {
        ValueId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(u32);

impl FuncId {
    pub fn new(index: u32) -> Self {
        FuncId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    pub fn new(index: u32) -> Self {
        BlockId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub kind: InstKind,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub init: Option<Constant>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    Inst(Inst),
    Argument { func: FuncId, index: u32 },
    Global(Global),
    Constant(Constant),
    /// Synthetic value standing in for a not-yet-known converted value
    /// during cycle resolution or function cloning. Not placed in any
    /// instruction list.
    Placeholder { block: BlockId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: Ty,
    pub name: Option<String>,
    pub dbg: Option<DebugLoc>,
    pub anno: Option<FixpAnnotation>,
}

impl ValueData {
    pub fn as_inst(&self) -> Option<&Inst> {
        match &self.kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_inst_mut(&mut self) -> Option<&mut Inst> {
        match &mut self.kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<&Global> {
        match &self.kind {
            ValueKind::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn is_inst(&self) -> bool {
        matches!(self.kind, ValueKind::Inst(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ValueKind::Constant(_))
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, ValueKind::Argument { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, ValueKind::Placeholder { .. })
    }
}
