use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    UndefinedVariable(String),
    UnknownOperator(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedVariable(name) => write!(f, "[CompileError] undefined variable '{}'", name),
            CompileError::UnknownOperator(op) => write!(f, "[CompileError] unknown operator '{}'", op),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    TypeMismatch { op: String, left: &'static str, right: &'static str },
    UnknownOperator { op: String, operand: &'static str },
    NotCallable(&'static str),
    UnknownIndexOperator(&'static str),
    DivisionByZero,
    UnhashableKey(&'static str),
    WrongArgumentCount { expected: String, got: usize },
    StackOverflow,
    BadOpcode(u8),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeMismatch { op, left, right } =>
                write!(f, "[RuntimeError] type mismatch: {} {} {}", left, op, right),
            RuntimeError::UnknownOperator { op, operand } =>
                write!(f, "[RuntimeError] unknown operator: {}{}", op, operand),
            RuntimeError::NotCallable(t) => write!(f, "[RuntimeError] calling non-function and non-built-in: {}", t),
            RuntimeError::UnknownIndexOperator(t) => write!(f, "[RuntimeError] index operator not supported: {}", t),
            RuntimeError::DivisionByZero => write!(f, "[RuntimeError] division by zero"),
            RuntimeError::UnhashableKey(t) => write!(f, "[RuntimeError] unusable as hash key: {}", t),
            RuntimeError::WrongArgumentCount { expected, got } =>
                write!(f, "[RuntimeError] wrong number of arguments: want={}, got={}", expected, got),
            RuntimeError::StackOverflow => write!(f, "[RuntimeError] stack overflow"),
            RuntimeError::BadOpcode(b) => write!(f, "[RuntimeError] unrecognized opcode {}", b),
        }
    }
}

impl std::error::Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Umbrella error for callers (the CLI, the REPL) that don't care which
/// phase failed.
#[derive(Debug, Clone, PartialEq)]
pub enum MonkeyError {
    Syntax(String),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl fmt::Display for MonkeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonkeyError::Syntax(msg) => write!(f, "[SyntaxError] {}", msg),
            MonkeyError::Compile(e) => write!(f, "{}", e),
            MonkeyError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MonkeyError {}

impl From<CompileError> for MonkeyError {
    fn from(e: CompileError) -> Self {
        MonkeyError::Compile(e)
    }
}

impl From<RuntimeError> for MonkeyError {
    fn from(e: RuntimeError) -> Self {
        MonkeyError::Runtime(e)
    }
}

pub type MonkeyResult<T> = Result<T, MonkeyError>;
