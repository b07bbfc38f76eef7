//! Structured error types for every subsystem in this crate.
//!
//! Each subsystem gets its own small enum of causes: a fine-grained inner enum naming the
//! exact failure, wrapped by one outer error type per public operation.

use std::io;

use thiserror::Error;

/// A malformed date string, per the three accepted formats (dump, RFC3339, git-log).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed date: {0:?}")]
pub struct DateError(pub Vec<u8>);

/// A malformed `Name <email> <date>` attribution line.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AttributionError {
    #[error("malformed attribution: {0:?}")]
    Malformed(Vec<u8>),
    #[error("malformed attribution date: {0}")]
    Date(#[from] DateError),
}

/// A malformed file-operation line (`M`, `D`, `R`, `C`, `N`, `deleteall`).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FileOpError {
    #[error("empty file-operation line")]
    Empty,
    #[error("unrecognized file-operation kind {0:?}")]
    UnknownKind(Vec<u8>),
    #[error("file-operation missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid file mode {0:?}")]
    InvalidMode(Vec<u8>),
    #[error("unterminated quoted path")]
    UnterminatedQuote,
    #[error("invalid escape in quoted path")]
    InvalidEscape,
}

/// A malformed message-block envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed envelope header line: {0:?}")]
    MalformedHeader(Vec<u8>),
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("envelope is missing the blank line separating headers from body")]
    NoHeaderBodySeparator,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The precise reason a byte stream failed to parse as a fast-import stream.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("invalid mark: {0:?}")]
    InvalidMark(Vec<u8>),
    #[error("explicit `:0` mark is not allowed")]
    ZeroMark,
    #[error("expected a `data` command")]
    ExpectedDataCommand,
    #[error("invalid data length: {0:?}")]
    InvalidDataLength(Vec<u8>),
    #[error("unexpected end of stream while reading data payload")]
    DataUnexpectedEof,
    #[error("data delimiter contains NUL")]
    DataDelimContainsNul,
    #[error("empty data delimiter")]
    EmptyDelim,
    #[error("unterminated delimited data")]
    UnterminatedData,
    #[error("unsupported command: {0:?}")]
    UnsupportedCommand(Vec<u8>),
    #[error("commit is missing a `committer` line")]
    MissingCommitter,
    #[error("reference to undefined mark :{0}")]
    UnresolvedMark(u64),
    #[error("malformed file-operation: {0}")]
    FileOp(#[from] FileOpError),
    #[error("malformed attribution: {0}")]
    Attribution(#[from] AttributionError),
}

/// An error produced while parsing (or skipping through) a fast-import stream.
///
/// Carries the raw line that triggered the error, for diagnostics.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: Vec<u8>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, line: impl Into<Vec<u8>>) -> Self {
        ParseError { kind, line: line.into() }
    }
}

/// Any error that can occur while reading a fast-import stream, including I/O failure.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An error produced while writing a fast-import stream.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("reference to mark :{0} that was never defined")]
    UnresolvedMark(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
}
