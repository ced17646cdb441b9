pub mod bindings;
pub mod dispatch;
pub mod script;
pub mod walker;

pub use bindings::*;
pub use dispatch::*;
pub use script::{Operation, OpsEvaluator, ScriptEnv, ScriptEvaluator};
pub use walker::*;
