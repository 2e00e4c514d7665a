// fixp-conv: the floating-point to fixed-point conversion pass.
//
// Architecture:
// - pass: phase sequencing over a module (the entry point)
// - queue: metadata reading, work-set expansion, ordering
// - clone: retyped function clones for calls whose signature changes
// - rewriter: per-opcode value rewriting
// - codec / fold: scalar scaling IR and constant conversion
// - phi / cleanup: cycle resolution and dead-original removal

pub mod cleanup;
pub mod clone;
pub mod codec;
pub mod fold;
pub mod info;
pub mod pass;
pub mod phi;
pub mod queue;
pub mod rewriter;
pub mod stats;
pub mod type_mapper;

pub use fold::FoldPolicy;
pub use info::{Converted, OperandPool, ValueInfo, ValueInfoStore};
pub use pass::{ConversionOutcome, ConversionRecord, FloatToFixed, PassInfo};
pub use stats::ConversionStats;
