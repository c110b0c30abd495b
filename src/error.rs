use std::fmt;

/// Result codes surfaced by the runtime half of the crate (lexing and
/// parsing). Build-time failures use [`SchemaError`] instead.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorCode {
	/// Ran out of input bytes in the middle of a token or event; the caller
	/// must supply more data (or grow the buffer) and retry.
	BufferOutOfBounds,
	/// The input source has no more bytes.
	EndOfFile,
	/// Null-ish or inconsistent arguments (e.g. an offset past the buffer).
	BadParam,
	/// The underlying reader failed with an OS error.
	Errno(i32),
	FileNotFound,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::BufferOutOfBounds => fmt.write_str("ran out of input mid-event"),
			Self::EndOfFile => fmt.write_str("end of input"),
			Self::BadParam => fmt.write_str("invalid argument"),
			Self::Errno(errno) => write!(fmt, "read failed with errno {errno}"),
			Self::FileNotFound => fmt.write_str("file not found"),
		}
	}
}

impl std::error::Error for ErrorCode {}

/// A build-time schema failure, attributed to a line of the schema text when
/// one is known (lines are 1-based; `line == 0` means "not from text").
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SchemaError {
	pub line: usize,
	pub kind: SchemaErrorKind,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SchemaErrorKind {
	/// The line is neither a delimiters line, a variable line, nor a comment.
	MalformedLine(String),
	/// A `delimiters:` line with an empty character set.
	EmptyDelimiters,
	/// Non-timestamp variables exist but no delimiters line was given.
	MissingDelimiters,
	/// A variable name was declared twice.
	DuplicateRule(String),
	/// The reserved rule names (`newLine`, `firstTimestamp`, ...) cannot be
	/// declared directly.
	ReservedRuleName(String),
	/// Two captures (possibly in different rules) share a name.
	DuplicateCapture(String),
	/// A non-timestamp variable can match a delimiter byte.
	RuleContainsDelimiter { rule: String, delimiter: u8 },
	/// The variable's regex pattern failed to parse; the payload is the
	/// rendered [`crate::regex::RegexError`].
	BadPattern { rule: String, error: String },
}

impl SchemaError {
	pub fn new(line: usize, kind: SchemaErrorKind) -> Self {
		Self { line, kind }
	}
}

impl fmt::Display for SchemaError {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.line > 0 {
			write!(fmt, "schema line {}: ", self.line)?;
		}
		match &self.kind {
			SchemaErrorKind::MalformedLine(line) => write!(fmt, "malformed schema line {line:?}"),
			SchemaErrorKind::EmptyDelimiters => fmt.write_str("delimiters line declares no characters"),
			SchemaErrorKind::MissingDelimiters => {
				fmt.write_str("a delimiters line is required when non-timestamp variables are used")
			},
			SchemaErrorKind::DuplicateRule(name) => write!(fmt, "variable {name:?} is declared twice"),
			SchemaErrorKind::ReservedRuleName(name) => write!(fmt, "variable name {name:?} is reserved"),
			SchemaErrorKind::DuplicateCapture(name) => {
				write!(fmt, "capture name {name:?} is used by more than one capture group")
			},
			SchemaErrorKind::RuleContainsDelimiter { rule, delimiter } => write!(
				fmt,
				"variable {rule:?} has a regex pattern which contains delimiter {:?}",
				char::from(*delimiter)
			),
			SchemaErrorKind::BadPattern { rule, error } => {
				write!(fmt, "variable {rule:?} has a malformed regex pattern: {error}")
			},
		}
	}
}

impl std::error::Error for SchemaError {}
