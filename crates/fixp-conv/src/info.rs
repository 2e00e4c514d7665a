//! Side tables the pass keeps while rewriting a module: per-value
//! conversion metadata, the original-to-converted operand pool, the
//! function clone pool, and phi placeholder records.

use std::collections::{BTreeSet, HashMap};

use fixp_core::fixed_point::FixedPointType;
use fixp_core::ir::{FuncId, Ty, ValueId};

/// Conversion metadata for one IR value.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    /// Target fixed-point format (possibly invalid).
    pub fixp_type: FixedPointType,
    /// Type the value had before any rewriting.
    pub orig_type: Option<Ty>,
    /// The value keeps its representation; only operands may change.
    pub no_type_conversion: bool,
    /// Synthetic value introduced while cloning a function.
    pub is_argument_placeholder: bool,
    pub is_root: bool,
    /// Root that is an instruction other than a stack allocation; such
    /// roots arose from backtracking during the analysis.
    pub is_backtracking_node: bool,
    /// Annotated seeds this value derives from.
    pub roots: BTreeSet<ValueId>,
    /// Distance from the annotated seed; return instructions inherit their
    /// format at distance zero.
    pub fixp_type_root_distance: u32,
}

impl Default for ValueInfo {
    fn default() -> Self {
        Self {
            fixp_type: FixedPointType::invalid(),
            orig_type: None,
            no_type_conversion: false,
            is_argument_placeholder: false,
            is_root: false,
            is_backtracking_node: false,
            roots: BTreeSet::new(),
            fixp_type_root_distance: u32::MAX,
        }
    }
}

#[derive(Debug, Default)]
pub struct ValueInfoStore {
    map: HashMap<ValueId, ValueInfo>,
}

impl ValueInfoStore {
    pub fn has(&self, v: ValueId) -> bool {
        self.map.contains_key(&v)
    }

    pub fn get(&self, v: ValueId) -> Option<&ValueInfo> {
        self.map.get(&v)
    }

    pub fn get_mut(&mut self, v: ValueId) -> Option<&mut ValueInfo> {
        self.map.get_mut(&v)
    }

    /// Fetch or create the record for a value.
    pub fn demand(&mut self, v: ValueId) -> &mut ValueInfo {
        self.map.entry(v).or_default()
    }

    /// Overwrite a record wholesale; warns when replacing an existing one
    /// from a previous conversion.
    pub fn overwrite(&mut self, v: ValueId, info: ValueInfo) {
        if self.map.insert(v, info).is_some() {
            tracing::debug!("value {} already had conversion info; overwriting", v);
        }
    }

    pub fn fixp_type(&self, v: ValueId) -> FixedPointType {
        self.get(v).map(|i| i.fixp_type.clone()).unwrap_or_default()
    }
}

/// State of one original value in the operand pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converted {
    /// Scheduled but could not be converted.
    Error,
    /// The converted replacement; may equal the original (self-conversion).
    Value(ValueId),
}

/// Bidirectional original-to-converted map. Absent keys have not been
/// processed yet.
#[derive(Debug, Default)]
pub struct OperandPool {
    map: HashMap<ValueId, Converted>,
}

impl OperandPool {
    pub fn get(&self, v: ValueId) -> Option<Converted> {
        self.map.get(&v).copied()
    }

    /// The converted counterpart, if conversion succeeded.
    pub fn converted(&self, v: ValueId) -> Option<ValueId> {
        match self.map.get(&v) {
            Some(Converted::Value(c)) => Some(*c),
            _ => None,
        }
    }

    /// Register a result unless the key was already decided (placeholders
    /// registered during cloning keep their mapping).
    pub fn insert_if_absent(&mut self, v: ValueId, c: Converted) {
        self.map.entry(v).or_insert(c);
    }

    /// Unconditional write; cloning rewires placeholder entries this way.
    pub fn set(&mut self, v: ValueId, c: Converted) {
        self.map.insert(v, c);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Original function to retyped clone; write-once per original.
#[derive(Debug, Default)]
pub struct FunctionPool {
    map: HashMap<FuncId, FuncId>,
}

impl FunctionPool {
    pub fn get(&self, f: FuncId) -> Option<FuncId> {
        self.map.get(&f).copied()
    }

    pub fn insert(&mut self, original: FuncId, clone: FuncId) {
        let prev = self.map.insert(original, clone);
        debug_assert!(prev.is_none(), "function cloned twice");
    }

    pub fn contains_original(&self, f: FuncId) -> bool {
        self.map.contains_key(&f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, FuncId)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }
}

/// Placeholder pair opened for a convertible phi. When the phi needs no
/// representation change the two placeholders are the same value.
#[derive(Debug, Clone, Copy)]
pub struct PhiReplacement {
    pub phi: ValueId,
    pub placeh_noconv: ValueId,
    pub placeh_conv: ValueId,
}
