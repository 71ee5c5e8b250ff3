/*!
 * Script
 * Small embedded language evaluated inside execution contexts
 *
 * # Grammar
 *
 * Statements are separated by newlines or `;`:
 * - `def name(a, b=1): [return] expr`
 * - `import a.b [as x]`, `from a import f [as g]`
 * - `name = expr`
 * - bare expressions
 *
 * Expressions cover literals, lists, string-keyed dicts, attribute access,
 * calls with keywords, indexing, arithmetic, comparisons, boolean
 * operators, `x if c else y` and `lambda`.
 */

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod namespace;
pub mod ops;
pub mod parser;
pub mod session;

// Re-export public API
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use eval::{call_with_values, eval_expr, exec, exec_program, invoke, run};
pub use namespace::{Args, NativeFunction, Namespace, Object, ScriptFunction};
pub use parser::{parse_expression, parse_program};
pub use session::{Scope, Session};
