use std::fmt;
use std::str::Chars;

use nom::Err as NomErr;
use nom::IResult;
use nom::Parser;
use nom::error::ErrorKind as NomErrorKind;
use nom::error::FromExternalError;
use nom::error::ParseError;

use crate::interval_tree::Interval;

/// Characters that must be escaped to match literally.
const SPECIAL_CHARACTERS: &str = r"\()[]{}<>*+?-.|^";

pub const UNICODE_MAX: u32 = 0x10_FFFF;

/// The regex surface tree of the schema language.
///
/// `Multiplication` with `max == 0` means unbounded repetition; the surface
/// syntax cannot produce a literal `{m,0}` bound, so the encoding is
/// unambiguous.
#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub enum RegexAst {
	Literal(u32),
	Group {
		negated: bool,
		ranges: Vec<(u32, u32)>,
		is_wildcard: bool,
	},
	Cat(Box<RegexAst>, Box<RegexAst>),
	Or(Box<RegexAst>, Box<RegexAst>),
	Multiplication {
		min: u32,
		max: u32,
		item: Box<RegexAst>,
	},
	Capture {
		name: String,
		item: Box<RegexAst>,
	},
}

#[derive(Debug)]
pub struct RegexError<'a> {
	pub consumed: &'a str,
	pub remaining: &'a str,
	pub kind: RegexErrorKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RegexErrorKind {
	/// Expected a certain character, e.g. '<' after '?' in a capture group.
	ExpectedChar(char),
	/// Missing the closing delimiter for the following pair.
	MissingClose(char, char),
	/// "General" error kind, e.g. an isolated repetition suffix operator (the pattern "*").
	InvalidTerm,
	/// A valid literal character was expected but not found;
	/// should only appear from an invalid group.
	InvalidLiteral,
	/// Invalid escape character.
	InvalidEscape,
	/// Invalid repetition bound; `min > max` or `max == 0`.
	InvalidRepetitionBound(u32, u32),
	/// Too large of a repetition bound.
	NumberTooBig,
	/// Expected decimal digits (for repetition bound).
	ExpectedDecimalDigits,
	/// Expected hex digits (for unicode escape).
	ExpectedHexDigits,
	/// Invalid code point in unicode escape.
	InvalidCodePoint(u32),
	/// Invalid capture name.
	InvalidCaptureName,
	/// An escape class (e.g. "\\d") was used as the start/end point of a range in a group.
	EscapeClassInGroupRange,
	/// An inverted escape class (e.g. "\\D") was used inside a group.
	InvertedEscapeClassInGroup,
	/// Used for parsing a non-special character (`negate == true`)
	/// and for parsing an escaped special character (`negate == false`).
	/// This shouldn't actually bubble up publicly; it'll either get consumed
	/// by/turned into `InvalidLiteral` or `InvalidTerm`.
	ExpectedOneOf { characters: &'static str, negate: bool },
	/// An error from nom; shouldn't happen, but used to implement [`nom::error::ParseError`].
	Nom(NomErrorKind),
}

impl fmt::Display for RegexError<'_> {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			fmt,
			"{:?} after consuming {:?} (remaining {:?})",
			self.kind, self.consumed, self.remaining
		)
	}
}

#[derive(Debug)]
struct RegexParsingError<'a> {
	pub input: &'a str,
	pub kind: RegexErrorKind,
}

#[derive(Debug)]
enum Literals {
	Single(char),
	Group { negated: bool, items: Vec<(char, char)> },
}

impl<'a> ParseError<&'a str> for RegexParsingError<'a> {
	fn from_error_kind(input: &'a str, nom: NomErrorKind) -> Self {
		Self {
			input,
			kind: RegexErrorKind::Nom(nom),
		}
	}

	fn append(_input: &'a str, _kind: NomErrorKind, other: Self) -> Self {
		other
	}
}

impl<'a> FromExternalError<&'a str, Self> for RegexParsingError<'a> {
	fn from_external_error(_input: &'a str, _kind: NomErrorKind, e: Self) -> Self {
		e
	}
}

impl<'a> RegexParsingError<'a> {
	fn new(input: &'a str, kind: RegexErrorKind) -> Self {
		Self { input, kind }
	}
}

type ParsingResult<'a, T> = IResult<&'a str, T, RegexParsingError<'a>>;

impl RegexAst {
	pub fn from_pattern(pattern: &str) -> Result<Self, RegexError<'_>> {
		match parse_to_end(pattern) {
			Ok((remaining, regex)) => {
				debug_assert_eq!(remaining, "");
				Ok(regex)
			},
			Err(NomErr::Incomplete(_)) => {
				unreachable!("streaming combinators are not used");
			},
			Err(NomErr::Error(err) | NomErr::Failure(err)) => {
				let consumed: &str = pattern
					.strip_suffix(err.input)
					.expect("parser errors always point into the original pattern");
				Err(RegexError {
					consumed,
					remaining: err.input,
					kind: err.kind,
				})
			},
		}
	}

	/// A group matching exactly the given byte set. Used for the delimiter
	/// prefix that variable rules get during lexer generation.
	pub fn group_of(literals: &[u32]) -> Self {
		Self::Group {
			negated: false,
			ranges: literals.iter().map(|&b| (b, b)).collect::<Vec<_>>(),
			is_wildcard: false,
		}
	}

	pub fn cat(left: Self, right: Self) -> Self {
		Self::Cat(Box::new(left), Box::new(right))
	}
}

// AST operations consumed by the lexer and the NFA builder.
impl RegexAst {
	/// Collects the intervals of code points this pattern can possibly
	/// consume. Used for the delimiter-containment build check.
	pub fn collect_possible_inputs(&self, inputs: &mut Vec<Interval>) {
		match self {
			&Self::Literal(ch) => {
				inputs.push(Interval::new(ch, ch));
			},
			Self::Group { .. } => {
				for interval in self.group_intervals() {
					inputs.push(interval);
				}
			},
			Self::Cat(left, right) | Self::Or(left, right) => {
				left.collect_possible_inputs(inputs);
				right.collect_possible_inputs(inputs);
			},
			Self::Multiplication { item, .. } | Self::Capture { item, .. } => {
				item.collect_possible_inputs(inputs);
			},
		}
	}

	/// Replaces every wildcard group (the result of `.`) with the complement
	/// of the delimiter set.
	pub fn remove_delimiters_from_wildcard(&mut self, delimiters: &[u32]) {
		if delimiters.is_empty() {
			return;
		}
		match self {
			Self::Literal(..) => (),
			Self::Group {
				negated,
				ranges,
				is_wildcard,
			} => {
				if *is_wildcard {
					let mut delimiter_intervals: Vec<Interval> =
						delimiters.iter().map(|&d| Interval::new(d, d)).collect::<Vec<_>>();
					*negated = false;
					*ranges = Interval::complement(&mut delimiter_intervals)
						.into_iter()
						.filter(|interval| interval.start() <= UNICODE_MAX)
						.map(|interval| (interval.start(), interval.end().min(UNICODE_MAX)))
						.collect::<Vec<_>>();
				}
			},
			Self::Cat(left, right) | Self::Or(left, right) => {
				left.remove_delimiters_from_wildcard(delimiters);
				right.remove_delimiters_from_wildcard(delimiters);
			},
			Self::Multiplication { item, .. } | Self::Capture { item, .. } => {
				item.remove_delimiters_from_wildcard(delimiters);
			},
		}
	}

	/// Capture names in this subtree. Nested captures are listed before the
	/// capture containing them, which is also the order tag IDs get allocated
	/// in.
	pub fn subtree_captures(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		self.collect_captures(&mut names);
		names
	}

	fn collect_captures<'a>(&'a self, names: &mut Vec<&'a str>) {
		match self {
			Self::Literal(..) | Self::Group { .. } => (),
			Self::Cat(left, right) | Self::Or(left, right) => {
				left.collect_captures(names);
				right.collect_captures(names);
			},
			Self::Multiplication { item, .. } => {
				item.collect_captures(names);
			},
			Self::Capture { name, item } => {
				item.collect_captures(names);
				names.push(name);
			},
		}
	}

	/// Capture names in this subtree that sit inside a repetition which can
	/// run more than once; their positions must all be retained.
	pub fn repeated_captures(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		self.collect_repeated_captures(false, &mut names);
		names
	}

	fn collect_repeated_captures<'a>(&'a self, repeated: bool, names: &mut Vec<&'a str>) {
		match self {
			Self::Literal(..) | Self::Group { .. } => (),
			Self::Cat(left, right) | Self::Or(left, right) => {
				left.collect_repeated_captures(repeated, names);
				right.collect_repeated_captures(repeated, names);
			},
			&Self::Multiplication { max, ref item, .. } => {
				item.collect_repeated_captures(repeated || max != 1, names);
			},
			Self::Capture { name, item } => {
				if repeated {
					names.push(name);
				}
				item.collect_repeated_captures(repeated, names);
			},
		}
	}

	/// The effective (sorted, merged) intervals of a `Group` node.
	pub fn group_intervals(&self) -> Vec<Interval> {
		let Self::Group { negated, ranges, .. } = self else {
			panic!("group_intervals called on a non-group node");
		};
		let mut intervals: Vec<Interval> = ranges
			.iter()
			.filter(|&&(start, end)| start <= end)
			.map(|&(start, end)| Interval::new(start, end))
			.collect::<Vec<_>>();
		if *negated {
			Interval::complement(&mut intervals)
				.into_iter()
				.filter(|interval| interval.start() <= UNICODE_MAX)
				.map(|interval| Interval::new(interval.start(), interval.end().min(UNICODE_MAX)))
				.collect::<Vec<_>>()
		} else {
			intervals.sort_unstable();
			intervals
		}
	}
}

impl RegexErrorKind {
	fn error(self, input: &str) -> NomErr<RegexParsingError<'_>> {
		NomErr::Error(RegexParsingError::new(input, self))
	}

	fn diagnostic<'a, T>(self) -> impl Fn(&'a str) -> ParsingResult<'a, T> {
		move |input| Err(self.error(input))
	}
}

// ==================================

fn parse_to_end(input: &str) -> ParsingResult<'_, RegexAst> {
	// `parse_sequence` (and consequently `parse_alternation`) may swallow
	// errors from `parse_suffixed`, since the former two are "lists" that
	// simply terminate when no more elements can be parsed. Here, after
	// reaching the end of the list, we ensure we're at the end of input,
	// otherwise "reproduce" the invalid term error.
	let (input, regex): (&str, RegexAst) = parse_alternation(input)?;

	if !input.is_empty() {
		return Err(RegexErrorKind::InvalidTerm.error(input));
	}

	Ok((input, regex))
}

fn parse_alternation(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	// Cut: Any time we're "trying" to parse an alternation,
	// we necessarily are expecting at least one item.
	let (mut input, mut regex): (&str, RegexAst) = cut(parse_sequence).parse(input)?;

	loop {
		let maybe_bar: Option<char>;
		(input, maybe_bar) = opt(parse_char::<'|'>).parse(input)?;
		if maybe_bar.is_none() {
			break;
		}

		// Cut: After seeing a '|', we necessarily are expecting a sequence.
		match cut(parse_sequence).parse(input) {
			Ok((remaining, item)) => {
				input = remaining;
				regex = RegexAst::Or(Box::new(regex), Box::new(item));
			},
			Err(err) => {
				return Err(err);
			},
		}
	}

	Ok((input, regex))
}

fn parse_sequence(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::combinator::cut;

	// Cut: Any time we're "trying" to parse a sequence,
	// we necessarily are expecting at least one item.
	let (mut input, mut regex): (&str, RegexAst) = cut(parse_suffixed).parse(input)?;

	loop {
		match parse_suffixed(input) {
			Ok((remaining, item)) => {
				input = remaining;
				regex = RegexAst::Cat(Box::new(regex), Box::new(item));
			},
			Err(NomErr::Error(_)) => {
				break;
			},
			Err(err @ (NomErr::Incomplete(_) | NomErr::Failure(_))) => {
				return Err(err);
			},
		}
	}

	Ok((input, regex))
}

fn parse_suffixed(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::branch::alt;
	use nom::combinator::opt;

	enum Suffix {
		Range(u32, u32),
		Star,
		Plus,
		Question,
	}

	let (input, regex): (&str, RegexAst) = parse_term(input)?;

	let (input, maybe_suffix): (&str, Option<Suffix>) = opt(alt((
		parse_char::<'*'>.map(|_| Suffix::Star),
		parse_char::<'+'>.map(|_| Suffix::Plus),
		parse_char::<'?'>.map(|_| Suffix::Question),
		parse_repetition_suffix.map(|(min, max)| Suffix::Range(min, max)),
	)))
	.parse(input)?;

	let regex: RegexAst = match maybe_suffix {
		None => regex,
		Some(suffix) => {
			let (min, max): (u32, u32) = match suffix {
				Suffix::Range(min, max) => (min, max),
				Suffix::Star => (0, 0),
				Suffix::Plus => (1, 0),
				Suffix::Question => (0, 1),
			};
			RegexAst::Multiplication {
				min,
				max,
				item: Box::new(regex),
			}
		},
	};

	Ok((input, regex))
}

fn parse_repetition_suffix(input: &str) -> ParsingResult<'_, (u32, u32)> {
	combinator_surrounded_cut::<'{', '}', _, _>(parse_repetition_bounds).parse(input)
}

fn parse_repetition_bounds(original_input: &str) -> ParsingResult<'_, (u32, u32)> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	let (input, x): (&str, u32) = parse_digits(original_input)?;

	let (input_after_comma, have_comma): (&str, bool) = opt(parse_char::<','>)
		.map(|maybe_comma| maybe_comma.is_some())
		.parse(input)?;

	if have_comma {
		// Cut: After seeing a ',', we necessarily are expecting an upper bound.
		let (input, y): (&str, u32) = cut(parse_digits).parse(input_after_comma)?;
		if y > 0 && x <= y {
			Ok((input, (x, y)))
		} else {
			Err(RegexErrorKind::InvalidRepetitionBound(x, y).error(input_after_comma))
		}
	} else if x > 0 {
		Ok((input, (x, x)))
	} else {
		Err(RegexErrorKind::InvalidRepetitionBound(x, x).error(original_input))
	}
}

fn parse_term(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::branch::alt;

	alt((
		parse_char::<'.'>.map(|_| RegexAst::Group {
			negated: false,
			ranges: vec![(0, UNICODE_MAX)],
			is_wildcard: true,
		}),
		parse_literal_character.map(|literal| match literal {
			Literals::Single(ch) => RegexAst::Literal(u32::from(ch)),
			Literals::Group { negated, items } => RegexAst::Group {
				negated,
				ranges: items
					.into_iter()
					.map(|(start, end)| (u32::from(start), u32::from(end)))
					.collect::<Vec<_>>(),
				is_wildcard: false,
			},
		}),
		parse_parenthesized,
		parse_group,
		RegexErrorKind::InvalidTerm.diagnostic(),
	))
	.parse(input)
}

fn parse_parenthesized(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::branch::alt;

	combinator_surrounded_cut::<'(', ')', _, _>(alt((parse_capture, parse_alternation))).parse(input)
}

fn parse_capture(input: &str) -> ParsingResult<'_, RegexAst> {
	use nom::combinator::cut;

	let (input, _): (&str, char) = parse_char::<'?'>(input)?;

	// Cut: After seeing a '?', we necessarily are expecting a capture.
	let (input, name): (&str, &str) =
		cut(combinator_surrounded_cut::<'<', '>', _, _>(parse_capture_name)).parse(input)?;

	let (input, regex): (&str, RegexAst) = parse_alternation(input)?;

	Ok((
		input,
		RegexAst::Capture {
			name: name.to_owned(),
			item: Box::new(regex),
		},
	))
}

// ========================================

fn parse_group(input: &str) -> ParsingResult<'_, RegexAst> {
	let (input, (negated, items)): (&str, (bool, Vec<(char, char)>)) =
		combinator_surrounded_cut::<'[', ']', _, _>(parse_group_inside).parse(input)?;

	Ok((
		input,
		RegexAst::Group {
			negated,
			ranges: items
				.into_iter()
				.map(|(start, end)| (u32::from(start), u32::from(end)))
				.collect::<Vec<_>>(),
			is_wildcard: false,
		},
	))
}

fn parse_group_inside(input: &str) -> ParsingResult<'_, (bool, Vec<(char, char)>)> {
	use nom::combinator::opt;

	let (input, negated): (&str, Option<char>) = opt(parse_char::<'^'>).parse(input)?;

	let (mut input, mut items): (&str, Vec<(char, char)>) = parse_group_item(input)?;
	loop {
		match parse_group_item(input) {
			Ok((new_input, new_items)) => {
				input = new_input;
				items.extend(&new_items);
			},
			Err(NomErr::Error(_)) => {
				break;
			},
			Err(err @ (NomErr::Failure(_) | NomErr::Incomplete(_))) => {
				return Err(err);
			},
		}
	}

	Ok((input, (negated.is_some(), items)))
}

fn parse_group_item(original_input: &str) -> ParsingResult<'_, Vec<(char, char)>> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	let (input, start): (&str, Literals) = parse_literal_character(original_input)?;

	let (input_after_dash, maybe_dash): (&str, Option<char>) = opt(parse_char::<'-'>).parse(input)?;

	if maybe_dash.is_some() {
		match start {
			Literals::Single(start) => {
				let (input, end): (&str, Literals) = cut(parse_literal_character).parse(input_after_dash)?;
				match end {
					Literals::Single(end) => Ok((input, vec![(start, end)])),
					Literals::Group { .. } => Err(RegexErrorKind::EscapeClassInGroupRange.error(input_after_dash)),
				}
			},
			Literals::Group { .. } => Err(RegexErrorKind::EscapeClassInGroupRange.error(original_input)),
		}
	} else {
		match start {
			Literals::Single(ch) => Ok((input, vec![(ch, ch)])),
			Literals::Group { negated, items } => {
				if negated {
					return Err(RegexErrorKind::InvertedEscapeClassInGroup.error(original_input));
				}
				Ok((input, items))
			},
		}
	}
}

// ========================================

fn parse_literal_character(input: &str) -> ParsingResult<'_, Literals> {
	use nom::branch::alt;

	alt((
		parse_escaped_character,
		parse_one_char_of::<true>(SPECIAL_CHARACTERS).map(Literals::Single),
		RegexErrorKind::InvalidLiteral.diagnostic(),
	))
	.parse(input)
}

fn parse_escaped_character(original_input: &str) -> ParsingResult<'_, Literals> {
	use nom::branch::alt;
	use nom::combinator::cut;

	let (input, _): (&str, char) = parse_char::<'\\'>(original_input)?;

	// Cut: If we parsed a '\\', we necessarily are looking for an escape character.
	cut(alt((
		parse_one_char_of::<false>(SPECIAL_CHARACTERS).map(Literals::Single),
		parse_standard_escape,
	))
	// Outside of the `alt` since the error starts at the original input.
	.or(|_| Err(RegexErrorKind::InvalidEscape.error(original_input))))
	.parse(input)
}

fn parse_one_char_of<'a, const NEGATE: bool>(
	any: &'static str,
) -> impl Parser<&'a str, Output = char, Error = RegexParsingError<'a>> {
	move |input: &'a str| {
		let mut chars: Chars<'_> = input.chars();

		if let Some(ch) = chars.next() {
			if any.contains(ch) {
				if !NEGATE {
					return Ok((chars.as_str(), ch));
				} else {
					return Err(RegexErrorKind::ExpectedOneOf {
						characters: any,
						negate: NEGATE,
					}
					.error(input));
				}
			} else if NEGATE {
				return Ok((chars.as_str(), ch));
			}
		}

		Err(RegexErrorKind::ExpectedOneOf {
			characters: any,
			negate: NEGATE,
		}
		.error(input))
	}
}

fn parse_standard_escape(input: &str) -> ParsingResult<'_, Literals> {
	let mut chars: Chars<'_> = input.chars();

	// We use the NUL character as a marker/equivalent to EOF; it's not a valid
	// escape character, and will be caught in the default branch below.
	let ch: char = chars.next().unwrap_or('\0');

	let unescaped: char = match ch {
		't' => '\t',
		'r' => '\r',
		'n' => '\n',
		'v' => '\u{b}',
		'f' => '\u{c}',
		'u' => {
			return combinator_surrounded_cut::<'{', '}', _, _>(parse_hex_code_point)
				.map(Literals::Single)
				.parse(chars.as_str());
		},
		'd' | 's' | 'w' | 'D' | 'S' | 'W' => {
			let ch_lowered: char = ch.to_ascii_lowercase();
			return Ok((
				chars.as_str(),
				Literals::Group {
					negated: ch != ch_lowered,
					items: match ch_lowered {
						'd' => vec![('0', '9')],
						's' => vec![
							(' ', ' '),
							('\t', '\t'),
							('\r', '\r'),
							('\n', '\n'),
							('\u{b}', '\u{b}'),
							('\u{c}', '\u{c}'),
						],
						'w' => vec![('0', '9'), ('a', 'z'), ('A', 'Z'), ('_', '_')],
						_ => unreachable!("covered by the outer match"),
					},
				},
			));
		},
		_ => {
			return Err(RegexErrorKind::InvalidEscape.error(input));
		},
	};

	Ok((chars.as_str(), Literals::Single(unescaped)))
}

fn parse_char<const CHAR: char>(input: &str) -> ParsingResult<'_, char> {
	let mut chars: Chars<'_> = input.chars();

	if let Some(ch) = chars.next() {
		if ch == CHAR {
			return Ok((chars.as_str(), ch));
		}
	}

	Err(RegexErrorKind::ExpectedChar(CHAR).error(input))
}

// =======================================

fn parse_capture_name(input: &str) -> ParsingResult<'_, &str> {
	use nom::AsChar;
	use nom::bytes::take_while1;

	take_while1(|ch| AsChar::is_alphanum(ch) || ch == '_')
		.or(RegexErrorKind::InvalidCaptureName.diagnostic())
		.parse(input)
}

fn parse_digits(input: &str) -> ParsingResult<'_, u32> {
	use nom::character::complete::digit1;

	match digit1(input) {
		Ok((remaining, lexeme)) => match lexeme.parse::<u32>() {
			Ok(n) => Ok((remaining, n)),
			Err(_) => Err(NomErr::Error(RegexParsingError::new(
				input,
				RegexErrorKind::NumberTooBig,
			))),
		},
		Err(err @ NomErr::Incomplete(_)) => Err(err),
		Err(NomErr::Error(_) | NomErr::Failure(_)) => Err(NomErr::Error(RegexParsingError::new(
			input,
			RegexErrorKind::ExpectedDecimalDigits,
		))),
	}
}

fn parse_hex_code_point(input: &str) -> ParsingResult<'_, char> {
	use nom::AsChar;
	use nom::bytes::take_while_m_n;

	let (remaining, lexeme): (&str, &str) = take_while_m_n(1, 6, AsChar::is_hex_digit)
		.parse(input)
		.map_err(|_: NomErr<RegexParsingError<'_>>| RegexErrorKind::ExpectedHexDigits.error(input))?;

	let code_point: u32 = u32::from_str_radix(lexeme, 16)
		.map_err(|_| RegexErrorKind::InvalidCodePoint(u32::MAX).error(input))?;

	if let Some(ch) = char::from_u32(code_point) {
		Ok((remaining, ch))
	} else {
		Err(RegexErrorKind::InvalidCodePoint(code_point).error(input))
	}
}

// ==================================

fn combinator_surrounded_cut<'a, const OPEN: char, const CLOSE: char, O, F>(
	mut inside: F,
) -> impl Parser<&'a str, Output = O, Error = RegexParsingError<'a>>
where
	F: Parser<&'a str, Output = O, Error = RegexParsingError<'a>>,
{
	use nom::combinator::cut;

	move |input| {
		let (input, _): (&str, char) = parse_char::<OPEN>(input)?;

		let (input, output): (&str, O) = match inside.parse(input) {
			Ok(ok) => ok,
			Err(err @ NomErr::Incomplete(_)) => {
				return Err(err);
			},
			Err(NomErr::Error(err) | NomErr::Failure(err)) => {
				// Since we already matched the opening character, we require
				// the inside to match too; fold `Error` (meaning "something
				// else may match") to a `Failure` ("input is malformed").
				return Err(NomErr::Failure(err));
			},
		};

		let (input, _): (&str, char) =
			cut(parse_char::<CLOSE>.or(RegexErrorKind::MissingClose(OPEN, CLOSE).diagnostic())).parse(input)?;

		Ok((input, output))
	}
}
