pub mod builder;
pub mod constant;
pub mod inst;
pub mod metadata;
pub mod module;
pub mod pretty;
pub mod ty;
pub mod value;

pub use builder::{Builder, InsertPoint};
pub use constant::Constant;
pub use inst::{FloatPred, InstKind, IntPred, PhiIncoming};
pub use metadata::{DebugLoc, FixpAnnotation, IntrinsicKind, ValueRange};
pub use module::{BlockData, FunctionData, Module};
pub use ty::{FloatKind, StructTy, Ty};
pub use value::{BlockId, FuncId, Global, Inst, ValueData, ValueId, ValueKind};
