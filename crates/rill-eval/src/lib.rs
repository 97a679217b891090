//! Rill evaluator: runtime values, the tree-walking interpreter, the
//! relational operators, the backend bridge, and value printing.

pub mod backend;
pub mod builtins;
pub mod env;
pub mod eval;
pub mod print;
pub mod relational;
pub mod value;

pub use backend::{Backend, MemoryBackend};
pub use builtins::initial_env;
pub use env::Env;
pub use eval::Evaluator;
pub use print::print_value;
pub use value::{cmp_values, values_equal, EvalResult, ExnValue, Packet, Value};
