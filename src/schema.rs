use nom::AsChar;
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while1;
use nom::error::Error as NomError;

use crate::error::SchemaError;
use crate::error::SchemaErrorKind;
use crate::regex::RegexAst;
use crate::token::SYMBOL_NAME_FIRST_TIMESTAMP;
use crate::token::SYMBOL_NAME_NEWLINE;
use crate::token::SYMBOL_NAME_NEWLINE_TIMESTAMP;
use crate::token::SYMBOL_NAME_TIMESTAMP;

/// The delimiter set and variable rules a lexer is generated from.
///
/// Built either programmatically ([`Schema::set_delimiters`],
/// [`Schema::add_variable`]) or from schema text ([`Schema::from_text`]):
///
/// ```text
/// // comments run to the end of the line
/// delimiters: \n\r\[:,
/// timestamp:\d{4}\-\d{2}\-\d{2} \d{2}:\d{2}:\d{2}
/// myVar:userID=(?<uid>\d+)
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
	delimiters: Vec<u32>,
	rules: Vec<SchemaRule>,
	has_delimiters_line: bool,
}

#[derive(Debug, Clone)]
pub struct SchemaRule {
	pub name: String,
	pub ast: RegexAst,
	/// 1-based schema-text line, 0 for programmatic rules.
	pub line: usize,
}

const RESERVED_RULE_NAMES: &[&str] = &[
	SYMBOL_NAME_NEWLINE,
	SYMBOL_NAME_FIRST_TIMESTAMP,
	SYMBOL_NAME_NEWLINE_TIMESTAMP,
];

impl Schema {
	pub fn new() -> Self {
		Self {
			delimiters: Vec::new(),
			rules: Vec::new(),
			has_delimiters_line: false,
		}
	}

	pub fn from_text(text: &str) -> Result<Self, SchemaError> {
		let mut schema: Self = Self::new();
		for (i, raw_line) in text.lines().enumerate() {
			let line_number: usize = i + 1;
			let raw_line: &str = raw_line.trim_end_matches('\r');
			// Comments run to the end of the line; the whitespace separating
			// the pattern from a trailing comment goes with the comment.
			let line: &str = match raw_line.find("//") {
				Some(comment) => raw_line[..comment].trim_end(),
				None => raw_line,
			};
			if line.trim().is_empty() {
				continue;
			}

			let Ok((rest, name)) = parse_rule_name(line) else {
				return Err(SchemaError::new(
					line_number,
					SchemaErrorKind::MalformedLine(raw_line.to_owned()),
				));
			};

			if name == "delimiters" {
				// Everything after the colon is charset, leading space
				// included (a space is a delimiter in most schemas).
				schema
					.add_delimiters(rest)
					.map_err(|kind| SchemaError::new(line_number, kind))?;
			} else {
				schema.add_rule(name, rest, line_number)?;
			}
		}
		Ok(schema)
	}

	/// Adds the characters of `charset` (with `\n`-style escapes unescaped)
	/// to the delimiter set. An empty set is rejected.
	pub fn set_delimiters(&mut self, charset: &str) -> Result<(), SchemaError> {
		self.add_delimiters(charset).map_err(|kind| SchemaError::new(0, kind))
	}

	fn add_delimiters(&mut self, charset: &str) -> Result<(), SchemaErrorKind> {
		let unescaped: Vec<u32> = unescape_charset(charset);
		if unescaped.is_empty() {
			return Err(SchemaErrorKind::EmptyDelimiters);
		}
		self.delimiters.extend(unescaped);
		self.delimiters.sort_unstable();
		self.delimiters.dedup();
		self.has_delimiters_line = true;
		Ok(())
	}

	pub fn add_variable(&mut self, name: &str, pattern: &str) -> Result<(), SchemaError> {
		self.add_rule(name, pattern, 0)
	}

	fn add_rule(&mut self, name: &str, pattern: &str, line: usize) -> Result<(), SchemaError> {
		if RESERVED_RULE_NAMES.contains(&name) {
			return Err(SchemaError::new(line, SchemaErrorKind::ReservedRuleName(name.to_owned())));
		}
		// Multiple timestamp patterns are allowed and get merged into one
		// alternation by the lexer; any other name may appear only once.
		if name != SYMBOL_NAME_TIMESTAMP && self.rules.iter().any(|rule| rule.name == name) {
			return Err(SchemaError::new(line, SchemaErrorKind::DuplicateRule(name.to_owned())));
		}
		let ast: RegexAst = RegexAst::from_pattern(pattern).map_err(|err| {
			SchemaError::new(
				line,
				SchemaErrorKind::BadPattern {
					rule: name.to_owned(),
					error: err.to_string(),
				},
			)
		})?;
		self.rules.push(SchemaRule {
			name: name.to_owned(),
			ast,
			line,
		});
		Ok(())
	}

	pub fn delimiters(&self) -> &[u32] {
		&self.delimiters
	}

	pub fn has_delimiters(&self) -> bool {
		self.has_delimiters_line
	}

	pub fn rules(&self) -> &[SchemaRule] {
		&self.rules
	}
}

impl Default for Schema {
	fn default() -> Self {
		Self::new()
	}
}

fn parse_rule_name(line: &str) -> IResult<&str, &str, NomError<&str>> {
	let (rest, name): (&str, &str) =
		take_while1(|ch: char| ch.is_alphanum() || ch == '_' || ch == '$').parse(line)?;
	let (rest, _): (&str, &str) = tag(":").parse(rest)?;
	Ok((rest, name))
}

fn unescape_charset(charset: &str) -> Vec<u32> {
	let mut output: Vec<u32> = Vec::new();
	let mut chars: std::str::Chars<'_> = charset.chars();
	while let Some(ch) = chars.next() {
		if ch != '\\' {
			output.push(u32::from(ch));
			continue;
		}
		let Some(escaped) = chars.next() else {
			// A trailing backslash stands for itself.
			output.push(u32::from('\\'));
			break;
		};
		let unescaped: char = match escaped {
			'n' => '\n',
			'r' => '\r',
			't' => '\t',
			'v' => '\u{b}',
			'f' => '\u{c}',
			other => other,
		};
		output.push(u32::from(unescaped));
	}
	output
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parses_schema_text() {
		let schema: Schema = Schema::from_text(
			"// default-ish schema\n\
			delimiters: \\n\\r\\[:,\n\
			\n\
			timestamp:\\d{4}\\-\\d{2}\\-\\d{2}\n\
			int:\\-{0,1}[0-9]+ // trailing comment\n",
		)
		.unwrap();
		assert!(schema.has_delimiters());
		assert_eq!(
			schema.delimiters(),
			&[
				u32::from('\n'),
				u32::from('\r'),
				u32::from(' '),
				u32::from(','),
				u32::from(':'),
				u32::from('[')
			]
		);
		assert_eq!(schema.rules().len(), 2);
		assert_eq!(schema.rules()[0].name, "timestamp");
		assert_eq!(schema.rules()[1].name, "int");
		assert_eq!(schema.rules()[1].line, 5);
	}

	#[test]
	fn rejects_empty_delimiters() {
		let err: SchemaError = Schema::from_text("delimiters:\n").unwrap_err();
		assert_eq!(err.kind, SchemaErrorKind::EmptyDelimiters);
		assert_eq!(err.line, 1);
	}

	#[test]
	fn rejects_duplicate_rule() {
		let err: SchemaError = Schema::from_text("delimiters: ,\nvar:a\nvar:b\n").unwrap_err();
		assert_eq!(err.kind, SchemaErrorKind::DuplicateRule("var".to_owned()));
		assert_eq!(err.line, 3);
	}

	#[test]
	fn multiple_timestamp_patterns_are_allowed() {
		let schema: Schema = Schema::from_text("timestamp:\\d{4}\ntimestamp:\\d{2}\n").unwrap();
		assert_eq!(schema.rules().len(), 2);
	}

	#[test]
	fn rejects_reserved_names() {
		let err: SchemaError = Schema::from_text("newLine:x\n").unwrap_err();
		assert_eq!(err.kind, SchemaErrorKind::ReservedRuleName("newLine".to_owned()));
	}

	#[test]
	fn rejects_bad_pattern_with_line_number() {
		let err: SchemaError = Schema::from_text("delimiters: ,\nbroken:a{\n").unwrap_err();
		assert_eq!(err.line, 2);
		assert!(matches!(err.kind, SchemaErrorKind::BadPattern { ref rule, .. } if rule == "broken"));
	}

	#[test]
	fn rejects_malformed_line() {
		let err: SchemaError = Schema::from_text("no colon here\n").unwrap_err();
		assert!(matches!(err.kind, SchemaErrorKind::MalformedLine(_)));
	}

	#[test]
	fn programmatic_construction() {
		let mut schema: Schema = Schema::new();
		schema.set_delimiters(" \t").unwrap();
		schema.add_variable("word", "[a-z]+").unwrap();
		assert_eq!(schema.delimiters(), &[u32::from('\t'), u32::from(' ')]);
		assert_eq!(schema.rules().len(), 1);
	}
}
