//! # agent-script-rs
//!
//! **Embeddable scripting runtime for an AI-augmented interactive shell.**
//! Scripts declare models, agents, and event handlers; a tree-walking
//! evaluator runs them against a lexical environment and a dynamically
//! typed value model.
//!
//! ## Shape
//! | Capability | This crate | Why it's split this way |
//! |---|---|---|
//! | Evaluation | [`eval::eval_program`] over an externally-produced [`ast::Program`] | The lexer/parser is a host concern, not this crate's |
//! | Values | [`value::Value`] — `Arc<RwLock<_>>` containers, never `Rc<RefCell<_>>` | Event handlers may run on a different thread than the script that registered them |
//! | Agents | [`engine::execute_agent`], driven by the `\|` pipe operator | One tool-calling loop, explicit iteration cap, provider-agnostic |
//! | Modules | [`module::ModuleLoader`] | Embedded-FS and real-FS origins, cycle detection, selective import |
//! | Events | [`events::EventManager`] | Ordered middleware chain with `next`-style continuations |
//! | Tools | [`tools::default_tools`] | `exec`, `grep`, `view_file`, `edit_file`, surfaced under `gsh.tools` |
//!
//! Concrete LLM providers, the bash-command runner, the MCP client,
//! persistence, and the terminal UI are external collaborators this crate
//! only defines capability traits for (see [`llm::ChatCompletion`],
//! [`runtime::ShellRunner`]).
//!
//! ## Quickstart
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_script::ast::Program;
//! use agent_script::module::ScriptParser;
//! use agent_script::runtime::{Runtime, RuntimeConfig};
//! use agent_script::tools::default_tools;
//! use agent_script::eval::eval_program;
//!
//! struct NoopParser;
//! impl ScriptParser for NoopParser {
//!     fn parse(&self, _source: &str) -> Result<Program, String> {
//!         Ok(Program { statements: vec![] })
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::default();
//! let rt = Arc::new(Runtime::new(Arc::new(NoopParser), default_tools(&config)));
//! let program = Program { statements: vec![] };
//! let ctx = agent_script::eval::EvalContext::default();
//! eval_program(&rt, &ctx, &program, &rt.global_env).await?;
//! # Ok(())
//! # }
//! ```

/// AST node definitions the evaluator walks; the lexer/parser is external.
pub mod ast;
/// Per-execution-identity call-stack substrate.
pub mod callstack;
/// Lexically-scoped environment underlying every evaluation frame.
pub mod env;
/// Crate-wide error hierarchy.
pub mod error;
/// Agent execution engine: the tool-calling loop behind the pipe operator.
pub mod engine;
/// The tree-walking evaluator.
pub mod eval;
/// Event middleware chain (`gsh.use`, `EmitEvent`).
pub mod events;
/// LLM provider capability and thin provider adapters.
pub mod llm;
/// Module system: origins, resolution, cycle detection, selective import.
pub mod module;
/// Runtime handle tying the evaluator to shared process-wide state.
pub mod runtime;
/// Native tools surfaced to scripts under `gsh.tools`.
pub mod tools;
/// The dynamic value model every expression evaluates to.
pub mod value;

pub use engine::execute_agent;
pub use env::Environment;
pub use error::{AgentError, EvalError, ModuleError, RuntimeError, ToolError};
pub use eval::{EvalContext, Flow, eval_program};
pub use runtime::{CancellationContext, Runtime, RuntimeConfig, ShellRunner};
pub use value::Value;
