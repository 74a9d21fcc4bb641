/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for lexing, parsing, registration and execution.
//!
//! Every error raised while working on template source carries a
//! [`Position`]. Execution errors fall in two groups: recoverable errors
//! ([`PromptyError::Resolver`] and [`PromptyError::Expression`]) are routed
//! through the active error strategy, while fatal errors (resource limits,
//! circular includes, cancellation) always abort the execution.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::position::Position;

/// Structural problem found while parsing a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A block was opened but never closed.
    UnclosedTag,
    /// A close tag with no matching open tag.
    UnexpectedCloseTag,
    /// A close tag naming a different tag than the innermost open one.
    MismatchedCloseTag,
    /// A required attribute is absent.
    MissingAttribute,
    /// An attribute has an unusable value (e.g. a negative `limit`).
    InvalidAttribute,
    /// The same attribute key appears twice on one tag.
    DuplicateAttribute,
    /// `elseif`/`else` outside a conditional, or after the fallback branch.
    MisplacedBranch,
    /// `else` carries an `eval` attribute.
    ElseWithCondition,
    /// A `case` has both `value` and `eval`, or neither.
    AmbiguousCase,
    /// `case`/`casedefault` outside a switch, or foreign content inside one.
    MisplacedCase,
    /// More than one `casedefault`, or a `casedefault` that is not last.
    MisplacedDefault,
    /// An `eval` attribute that does not parse as an expression.
    InvalidExpression,
    /// A built-in tag used with the wrong form (e.g. self-closing `for`).
    InvalidTagForm,
    /// Blocks nested deeper than the parser allows.
    NestingTooDeep,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::UnclosedTag => "unclosed tag",
            ParseErrorKind::UnexpectedCloseTag => "unexpected close tag",
            ParseErrorKind::MismatchedCloseTag => "mismatched close tag",
            ParseErrorKind::MissingAttribute => "missing attribute",
            ParseErrorKind::InvalidAttribute => "invalid attribute",
            ParseErrorKind::DuplicateAttribute => "duplicate attribute",
            ParseErrorKind::MisplacedBranch => "misplaced branch",
            ParseErrorKind::ElseWithCondition => "else with condition",
            ParseErrorKind::AmbiguousCase => "ambiguous case",
            ParseErrorKind::MisplacedCase => "misplaced case",
            ParseErrorKind::MisplacedDefault => "misplaced default",
            ParseErrorKind::InvalidExpression => "invalid expression",
            ParseErrorKind::InvalidTagForm => "invalid tag form",
            ParseErrorKind::NestingTooDeep => "nesting too deep",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category of an expression evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionErrorKind {
    /// Malformed expression text.
    Syntax,
    /// Ordering comparison between values of different types.
    TypeMismatch,
    /// Call to a function that is not in the function registry.
    UnknownFunction,
    /// Call with too few or too many arguments.
    ArityMismatch,
    /// Operator the evaluator does not implement.
    UnknownOperator,
    /// The function body itself returned an error.
    FunctionFailed,
}

impl ExpressionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpressionErrorKind::Syntax => "syntax",
            ExpressionErrorKind::TypeMismatch => "type mismatch",
            ExpressionErrorKind::UnknownFunction => "unknown function",
            ExpressionErrorKind::ArityMismatch => "arity mismatch",
            ExpressionErrorKind::UnknownOperator => "unknown operator",
            ExpressionErrorKind::FunctionFailed => "function failed",
        }
    }
}

impl fmt::Display for ExpressionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource limit that was exceeded, with its configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    MaxDepth(usize),
    MaxLoopIterations(usize),
    MaxOutputBytes(usize),
    ExecutionTimeout(Duration),
    ResolverTimeout(Duration),
    FunctionTimeout(Duration),
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::MaxDepth(n) => write!(f, "maximum include depth of {} exceeded", n),
            LimitKind::MaxLoopIterations(n) => {
                write!(f, "maximum of {} loop iterations exceeded", n)
            }
            LimitKind::MaxOutputBytes(n) => write!(f, "maximum output size of {} bytes exceeded", n),
            LimitKind::ExecutionTimeout(d) => write!(f, "execution timeout of {:?} exceeded", d),
            LimitKind::ResolverTimeout(d) => write!(f, "resolver timeout of {:?} exceeded", d),
            LimitKind::FunctionTimeout(d) => write!(f, "function timeout of {:?} exceeded", d),
        }
    }
}

/// Error returned by a [`Resolver`](crate::resolver::Resolver) plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("missing required attribute `{0}`")]
    MissingAttribute(String),

    #[error("invalid attribute `{name}`: {message}")]
    InvalidAttribute { name: String, message: String },

    #[error("variable `{0}` not found")]
    VariableNotFound(String),

    #[error("template `{0}` not found")]
    TemplateNotFound(String),

    #[error("no resolver registered for tag `{0}`")]
    UnknownTag(String),

    #[error("{0}")]
    Message(String),
}

impl ResolveError {
    /// Create a free-form resolver error.
    pub fn msg(message: impl Into<String>) -> Self {
        ResolveError::Message(message.into())
    }
}

/// Error returned by a [`Function`](crate::functions::Function) body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        FunctionError(message.into())
    }
}

/// Which registry an operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Resolver,
    Function,
    Template,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistryKind::Resolver => "resolver",
            RegistryKind::Function => "function",
            RegistryKind::Template => "template",
        })
    }
}

/// Errors from registering or unregistering resolvers, functions and templates.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} `{name}` is already registered")]
    AlreadyRegistered { kind: RegistryKind, name: String },

    #[error("{kind} name `{name}` uses the reserved `prompty.` prefix")]
    ReservedName { kind: RegistryKind, name: String },

    #[error("{kind} name must not be empty")]
    EmptyName { kind: RegistryKind },

    #[error("{kind} `{name}` is not registered")]
    NotFound { kind: RegistryKind, name: String },

    #[error("built-in {kind} `{name}` cannot be unregistered")]
    BuiltIn { kind: RegistryKind, name: String },

    #[error("template `{name}` failed to parse: {source}")]
    InvalidTemplate {
        name: String,
        #[source]
        source: Box<PromptyError>,
    },
}

/// Errors that can occur while parsing or executing templates.
#[derive(Debug, Error)]
pub enum PromptyError {
    /// Malformed tag syntax found by the lexer.
    #[error("{position}: lex error: {message}")]
    Lex { message: String, position: Position },

    /// Structural error found by the parser.
    #[error("{position}: parse error ({kind}): {message}")]
    Parse {
        kind: ParseErrorKind,
        message: String,
        position: Position,
    },

    /// A resolver rejected its attributes or failed to resolve.
    #[error("{position}: tag `{tag}` failed: {source}")]
    Resolver {
        tag: String,
        position: Position,
        #[source]
        source: ResolveError,
    },

    /// An `eval` expression failed to evaluate.
    #[error("{position}: expression error ({kind}): {message}")]
    Expression {
        kind: ExpressionErrorKind,
        message: String,
        position: Position,
    },

    /// A configured resource limit was exceeded.
    #[error("{position}: {limit}")]
    ResourceLimit { limit: LimitKind, position: Position },

    /// An include chain referenced a template already being rendered.
    #[error("{position}: circular include of template `{name}` ({})", .chain.join(" -> "))]
    CircularInclude {
        name: String,
        chain: Vec<String>,
        position: Position,
    },

    /// The cancellation signal fired.
    #[error("{position}: execution cancelled")]
    Cancelled { position: Position },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Execution data that is not a mapping.
    #[error("invalid execution data: {message}")]
    InvalidData { message: String },
}

impl PromptyError {
    pub(crate) fn parse(kind: ParseErrorKind, message: impl Into<String>, position: Position) -> Self {
        PromptyError::Parse {
            kind,
            message: message.into(),
            position,
        }
    }

    pub(crate) fn expression(
        kind: ExpressionErrorKind,
        message: impl Into<String>,
        position: Position,
    ) -> Self {
        PromptyError::Expression {
            kind,
            message: message.into(),
            position,
        }
    }

    /// Fatal errors bypass the error strategy table.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PromptyError::ResourceLimit { .. }
                | PromptyError::CircularInclude { .. }
                | PromptyError::Cancelled { .. }
        )
    }

    /// Source position of the error, when it relates to template source.
    pub fn position(&self) -> Option<Position> {
        match self {
            PromptyError::Lex { position, .. }
            | PromptyError::Parse { position, .. }
            | PromptyError::Resolver { position, .. }
            | PromptyError::Expression { position, .. }
            | PromptyError::ResourceLimit { position, .. }
            | PromptyError::CircularInclude { position, .. }
            | PromptyError::Cancelled { position } => Some(*position),
            PromptyError::Registry(RegistryError::InvalidTemplate { source, .. }) => {
                source.position()
            }
            PromptyError::Registry(_) | PromptyError::InvalidData { .. } => None,
        }
    }
}

/// Result type for template operations.
pub type PromptyResult<T> = Result<T, PromptyError>;
