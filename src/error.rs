use thiserror::Error;

/// Errors raised by [`crate::env::Environment`] operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already defined in current scope: {0}")]
    AlreadyDefined(String),
}

/// Errors raised while walking the AST.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("bad pipe: cannot pipe {left} into {right}")]
    BadPipe { left: String, right: String },
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("break outside of loop")]
    BreakOutsideLoop,
    #[error("continue outside of loop")]
    ContinueOutsideLoop,
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the module system (spec.md §4.3, §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModuleError {
    #[error("parse error in {file}: {message}")]
    ParseError { file: String, message: String },
    #[error("module not found: {0}")]
    NotFound(String),
    #[error("bare module names are not supported: {0}")]
    BareModuleName(String),
    #[error("circular import: {0}")]
    CircularImport(String),
    #[error("no such export '{export}' in module {module}")]
    NoSuchExport { module: String, export: String },
    #[error("embedded filesystem has no module at {0}")]
    EmbedFsMissing(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Errors raised by native and script tools (spec.md §4.6, §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("tool invocation failed: {0}")]
    Invocation(String),
    /// Raised verbatim by `edit_file` (spec.md §8): no "tool invocation
    /// failed:" prefix, since scripts match on this exact wording.
    #[error("{0}")]
    NotExactlyOnce(String),
}

/// Errors raised talking to an LLM provider.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

/// Errors raised by [`crate::engine::execute_agent`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("agent configuration error: {0}")]
    Config(String),
    #[error("tool loop exceeded {max_iterations} iterations")]
    MaxIterationsReached { max_iterations: u32 },
}

/// Errors raised by the event middleware chain (spec.md §4.5).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    #[error("event handler failed: {0}")]
    Handler(String),
}

/// Cancellation is a distinct error kind (spec.md §7): it must not be
/// converted into a tool-response message the way a tool invocation error is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// The crate-wide error type. Every evaluation, import, tool dispatch, and
/// agent-loop path that can fail surfaces one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
