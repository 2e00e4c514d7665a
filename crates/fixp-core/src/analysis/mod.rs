pub mod loops;

pub use loops::LoopInfo;
