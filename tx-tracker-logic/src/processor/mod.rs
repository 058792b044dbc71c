mod source;
mod target;

pub use source::{SourceTxParams, SourceTxProcessor};
pub use target::{TargetTxParams, TargetTxProcessor};
