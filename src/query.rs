use std::collections::BTreeSet;

use crate::dfa::Dfa;
use crate::nfa::Nfa;
use crate::nfa::RuleId;
use crate::regex::RegexAst;
use crate::schema::Schema;
use crate::token::SymbolId;

/// Characters that must be escaped when a query substring is rebuilt as a
/// regex pattern.
const SPECIAL_REGEX_CHARACTERS: &str = r"\()[]{}<>*+?-.|^";

/// A wildcard query classified character by character: `*` matches any run of
/// bytes, `?` a single byte, `\` escapes the next character. Runs of
/// wildcards collapse so that any run containing a `*` becomes a single `*`.
#[derive(Debug, Clone)]
pub struct WildcardExpression {
	chars: Vec<ExpressionChar>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct ExpressionChar {
	value: char,
	kind: ExpressionCharKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ExpressionCharKind {
	Normal,
	GreedyWildcard,
	NonGreedyWildcard,
	Escape,
}

/// A view of a contiguous range of a [`WildcardExpression`].
#[derive(Debug, Clone, Copy)]
pub struct WildcardExpressionView<'expression> {
	expression: &'expression WildcardExpression,
	begin_idx: usize,
	end_idx: usize,
}

/// One canonical reading of a query: a sequence of static-text and
/// variable-token pieces with no two adjacent static pieces.
#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd, Default)]
pub struct QueryInterpretation {
	tokens: Vec<QueryToken>,
}

#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub enum QueryToken {
	Static(String),
	Variable(VariableQueryToken),
}

#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub struct VariableQueryToken {
	pub rule: SymbolId,
	pub substring: String,
	pub contains_wildcard: bool,
}

/// Compiles wildcard queries into the set of token sequences a built lexer
/// could produce for a matching log line. Variable interpretations come from
/// intersecting a tiny per-substring DFA with a DFA over the schema's raw
/// rules (no delimiter prefixing, no timestamp rewriting).
pub struct QueryEngine {
	rule_dfa: Dfa,
	rule_ids: Vec<SymbolId>,
	delimiters: Vec<u32>,
}

impl WildcardExpression {
	/// Classifies and canonicalizes `query`: escapes are honored, and each
	/// run of wildcards collapses to either a single `*` or the `?`s it is
	/// made of.
	pub fn new(query: &str) -> Self {
		let mut canonical: Vec<ExpressionChar> = Vec::new();
		let mut pending_wildcards: Vec<ExpressionChar> = Vec::new();
		let mut pending_contains_greedy: bool = false;
		let mut prev_is_escape: bool = false;

		for value in query.chars() {
			let kind: ExpressionCharKind = if prev_is_escape {
				ExpressionCharKind::Normal
			} else {
				match value {
					'*' => ExpressionCharKind::GreedyWildcard,
					'?' => ExpressionCharKind::NonGreedyWildcard,
					'\\' => ExpressionCharKind::Escape,
					_ => ExpressionCharKind::Normal,
				}
			};
			prev_is_escape = kind == ExpressionCharKind::Escape;

			if matches!(
				kind,
				ExpressionCharKind::GreedyWildcard | ExpressionCharKind::NonGreedyWildcard
			) {
				pending_contains_greedy |= kind == ExpressionCharKind::GreedyWildcard;
				pending_wildcards.push(ExpressionChar { value, kind });
				continue;
			}

			flush_wildcards(&mut canonical, &mut pending_wildcards, &mut pending_contains_greedy);
			canonical.push(ExpressionChar { value, kind });
		}
		flush_wildcards(&mut canonical, &mut pending_wildcards, &mut pending_contains_greedy);

		Self { chars: canonical }
	}

	pub fn len(&self) -> usize {
		self.chars.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chars.is_empty()
	}

	pub fn view(&self, begin_idx: usize, end_idx: usize) -> WildcardExpressionView<'_> {
		let end_idx: usize = end_idx.min(self.chars.len());
		WildcardExpressionView {
			expression: self,
			begin_idx: begin_idx.min(end_idx),
			end_idx,
		}
	}

	fn search_string(&self, begin_idx: usize, end_idx: usize) -> String {
		self.chars[begin_idx..end_idx]
			.iter()
			.map(|ch| ch.value)
			.collect::<String>()
	}
}

fn ends_with_unescaped_star(text: &str) -> bool {
	if !text.ends_with('*') {
		return false;
	}
	let backslashes: usize = text[..text.len() - 1]
		.chars()
		.rev()
		.take_while(|&ch| ch == '\\')
		.count();
	backslashes % 2 == 0
}

fn flush_wildcards(
	canonical: &mut Vec<ExpressionChar>,
	pending: &mut Vec<ExpressionChar>,
	contains_greedy: &mut bool,
) {
	if pending.is_empty() {
		return;
	}
	if *contains_greedy {
		canonical.push(ExpressionChar {
			value: '*',
			kind: ExpressionCharKind::GreedyWildcard,
		});
	} else {
		canonical.append(pending);
	}
	pending.clear();
	*contains_greedy = false;
}

impl WildcardExpressionView<'_> {
	/// A view is malformed when it cuts an escape pair in half.
	pub fn is_well_formed(&self) -> bool {
		if self.begin_idx == self.end_idx {
			return true;
		}
		if self.begin_idx > 0 && self.expression.chars[self.begin_idx - 1].kind == ExpressionCharKind::Escape {
			return false;
		}
		self.expression.chars[self.end_idx - 1].kind != ExpressionCharKind::Escape
	}

	/// Extends the view over any greedy wildcards directly adjacent to it, so
	/// they are not lost when the view is interpreted on its own.
	pub fn extend_to_adjacent_greedy_wildcards(&self) -> WildcardExpressionView<'_> {
		let mut begin_idx: usize = self.begin_idx;
		let mut end_idx: usize = self.end_idx;
		if begin_idx > 0 && self.expression.chars[begin_idx - 1].kind == ExpressionCharKind::GreedyWildcard {
			begin_idx -= 1;
		}
		if end_idx < self.expression.chars.len()
			&& self.expression.chars[end_idx].kind == ExpressionCharKind::GreedyWildcard
		{
			end_idx += 1;
		}
		WildcardExpressionView {
			expression: self.expression,
			begin_idx,
			end_idx,
		}
	}

	pub fn starts_with_greedy_wildcard(&self) -> bool {
		self.begin_idx < self.end_idx
			&& self.expression.chars[self.begin_idx].kind == ExpressionCharKind::GreedyWildcard
	}

	pub fn ends_with_greedy_wildcard(&self) -> bool {
		self.begin_idx < self.end_idx
			&& self.expression.chars[self.end_idx - 1].kind == ExpressionCharKind::GreedyWildcard
	}

	/// Whether a variable could match here: the neighbours on both sides must
	/// be delimiters, wildcards, or the ends of the query.
	pub fn is_surrounded_by_delims_or_wildcards(&self, delimiters: &[u32]) -> bool {
		let before: Option<&ExpressionChar> = self.begin_idx.checked_sub(1).map(|i| &self.expression.chars[i]);
		let after: Option<&ExpressionChar> = self.expression.chars.get(self.end_idx);
		let is_boundary = |maybe_char: Option<&ExpressionChar>| match maybe_char {
			None => true,
			Some(ch) => match ch.kind {
				ExpressionCharKind::GreedyWildcard | ExpressionCharKind::NonGreedyWildcard => true,
				ExpressionCharKind::Normal | ExpressionCharKind::Escape => {
					delimiters.contains(&u32::from(ch.value))
				},
			},
		};
		is_boundary(before) && is_boundary(after)
	}

	pub fn search_string(&self) -> String {
		self.expression.search_string(self.begin_idx, self.end_idx)
	}

	/// Rebuilds the view as a regex pattern: `*` becomes `.*`, `?` becomes
	/// `.`, everything else matches literally. Also reports whether the view
	/// contains any wildcard.
	pub fn generate_regex_string(&self) -> (String, bool) {
		let mut pattern: String = String::new();
		let mut contains_wildcard: bool = false;
		for ch in self.expression.chars[self.begin_idx..self.end_idx].iter() {
			match ch.kind {
				ExpressionCharKind::Escape => (),
				ExpressionCharKind::GreedyWildcard => {
					pattern.push_str(".*");
					contains_wildcard = true;
				},
				ExpressionCharKind::NonGreedyWildcard => {
					pattern.push('.');
					contains_wildcard = true;
				},
				ExpressionCharKind::Normal => {
					if SPECIAL_REGEX_CHARACTERS.contains(ch.value) {
						pattern.push('\\');
					}
					pattern.push(ch.value);
				},
			}
		}
		(pattern, contains_wildcard)
	}
}

impl QueryInterpretation {
	pub fn from_static(text: &str) -> Self {
		let mut interpretation: Self = Self::default();
		interpretation.append_static_token(text);
		interpretation
	}

	pub fn from_variable(rule: SymbolId, substring: String, contains_wildcard: bool) -> Self {
		Self {
			tokens: vec![QueryToken::Variable(VariableQueryToken {
				rule,
				substring,
				contains_wildcard,
			})],
		}
	}

	pub fn tokens(&self) -> &[QueryToken] {
		&self.tokens
	}

	/// Appends another interpretation, merging a static/static seam so the
	/// canonical form (no two adjacent static tokens) is preserved.
	pub fn append(&mut self, suffix: &QueryInterpretation) {
		for token in suffix.tokens.iter() {
			match token {
				QueryToken::Static(text) => self.append_static_token(text),
				QueryToken::Variable(variable) => {
					self.tokens.push(QueryToken::Variable(variable.clone()));
				},
			}
		}
	}

	pub fn append_static_token(&mut self, text: &str) {
		if text.is_empty() {
			return;
		}
		if let Some(QueryToken::Static(prev)) = self.tokens.last_mut() {
			// A greedy-wildcard seam collapses: "a*" + "*b" reads "a*b",
			// keeping run length out of interpretation equality.
			let mut text: &str = text;
			if ends_with_unescaped_star(prev) {
				text = text.trim_start_matches('*');
			}
			prev.push_str(text);
		} else {
			self.tokens.push(QueryToken::Static(text.to_owned()));
		}
	}
}

impl QueryEngine {
	/// Builds the engine's intersection DFA from the schema's raw rules. Rule
	/// IDs follow the lexer's numbering (reserved symbols, the newline rule,
	/// then schema rules in order, a timestamp taking two IDs), so
	/// interpretations can be matched up with scan results. Timestamps are
	/// not variables and stay out of the intersection.
	pub fn from_schema(schema: &Schema) -> Self {
		let mut nfa: Nfa = Nfa::new();
		let mut rule_ids: Vec<SymbolId> = Vec::new();
		let mut next_plain_id: RuleId = 0;
		let mut next_lexer_id: SymbolId = crate::token::SYMBOL_FIRST_RULE + 1;
		let mut saw_timestamp: bool = false;
		for rule in schema.rules().iter() {
			if rule.name == crate::token::SYMBOL_NAME_TIMESTAMP {
				if !saw_timestamp {
					saw_timestamp = true;
					next_lexer_id += 2;
				}
				continue;
			}
			nfa.add_rule(next_plain_id, &rule.ast);
			rule_ids.push(next_lexer_id);
			next_plain_id += 1;
			next_lexer_id += 1;
		}
		Self {
			rule_dfa: Dfa::determinize(&nfa),
			rule_ids,
			delimiters: schema.delimiters().to_vec(),
		}
	}

	/// All canonical tokenizations of `query` over the schema, via dynamic
	/// programming over the substring splits of the whole query.
	pub fn get_all_multi_token_interpretations(&self, query: &str) -> BTreeSet<QueryInterpretation> {
		let expression: WildcardExpression = WildcardExpression::new(query);
		if expression.is_empty() {
			return BTreeSet::new();
		}

		let mut prefix_interpretations: Vec<BTreeSet<QueryInterpretation>> =
			vec![BTreeSet::new(); expression.len()];

		for end_idx in 1..=expression.len() {
			for begin_idx in 0..end_idx {
				let view: WildcardExpressionView<'_> = expression.view(begin_idx, end_idx);
				// Substrings that start or end on a greedy wildcard are
				// redundant with the extension of their neighbours, except
				// when the wildcard is the whole substring.
				if end_idx - begin_idx >= 2 && (view.starts_with_greedy_wildcard() || view.ends_with_greedy_wildcard())
				{
					continue;
				}

				let extended: WildcardExpressionView<'_> = view.extend_to_adjacent_greedy_wildcards();
				let single: Vec<QueryInterpretation> = self.get_all_single_token_interpretations(&extended);
				if single.is_empty() {
					continue;
				}

				if begin_idx == 0 {
					prefix_interpretations[end_idx - 1].extend(single);
				} else {
					// Clone-and-extend every interpretation of the prefix.
					let prefixes: Vec<QueryInterpretation> =
						prefix_interpretations[begin_idx - 1].iter().cloned().collect::<Vec<_>>();
					for prefix in prefixes.into_iter() {
						for suffix in single.iter() {
							let mut combined: QueryInterpretation = prefix.clone();
							combined.append(suffix);
							prefix_interpretations[end_idx - 1].insert(combined);
						}
					}
				}
			}
		}

		prefix_interpretations
			.pop()
			.expect("the expression is non-empty")
	}

	/// The ways one substring can be read as a single token.
	pub fn get_all_single_token_interpretations(
		&self,
		view: &WildcardExpressionView<'_>,
	) -> Vec<QueryInterpretation> {
		let mut interpretations: Vec<QueryInterpretation> = Vec::new();

		if !view.is_well_formed() {
			return interpretations;
		}
		let search_string: String = view.search_string();
		if search_string == "*" {
			interpretations.push(QueryInterpretation::from_static("*"));
			return interpretations;
		}
		if !view.is_surrounded_by_delims_or_wildcards(&self.delimiters) {
			// A variable cannot begin or end inside undelimited text.
			interpretations.push(QueryInterpretation::from_static(&search_string));
			return interpretations;
		}

		let (pattern, contains_wildcard): (String, bool) = view.generate_regex_string();
		let matching_rules: BTreeSet<SymbolId> = self.matching_rule_ids(&pattern);

		if matching_rules.is_empty() || contains_wildcard {
			interpretations.push(QueryInterpretation::from_static(&search_string));
		}
		for rule in matching_rules.into_iter() {
			interpretations.push(QueryInterpretation::from_variable(
				rule,
				search_string.clone(),
				contains_wildcard,
			));
			if !contains_wildcard {
				// Without a wildcard the substring is one exact string; any
				// matching rule describes the same token, and the
				// highest-priority one wins at scan time.
				break;
			}
		}
		interpretations
	}

	/// The schema rules whose language intersects the pattern's.
	fn matching_rule_ids(&self, pattern: &str) -> BTreeSet<SymbolId> {
		let Ok(ast) = RegexAst::from_pattern(pattern) else {
			return BTreeSet::new();
		};
		let mut nfa: Nfa = Nfa::new();
		nfa.add_rule(0, &ast);
		let search_dfa: Dfa = Dfa::determinize(&nfa);
		self.rule_dfa
			.intersect(&search_dfa)
			.into_iter()
			.map(|plain_id| self.rule_ids[plain_id as usize])
			.collect::<BTreeSet<_>>()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn engine() -> QueryEngine {
		let schema: Schema = Schema::from_text(
			"delimiters: \n\
			int:\\-{0,1}[0-9]+\n\
			hex:[a-fA-F]+\n\
			hasNumber:.*\\d.*\n",
		)
		.unwrap();
		QueryEngine::from_schema(&schema)
	}

	fn statics(interpretations: &BTreeSet<QueryInterpretation>) -> Vec<String> {
		interpretations
			.iter()
			.filter_map(|interpretation| match interpretation.tokens() {
				[QueryToken::Static(text)] => Some(text.clone()),
				_ => None,
			})
			.collect::<Vec<_>>()
	}

	#[test]
	fn wildcard_runs_collapse() {
		let expression: WildcardExpression = WildcardExpression::new("a**?*b??c");
		let rendered: String = expression.view(0, expression.len()).search_string();
		assert_eq!(rendered, "a*b??c");
	}

	#[test]
	fn escaped_wildcards_are_literal() {
		let expression: WildcardExpression = WildcardExpression::new(r"a\*b");
		let view: WildcardExpressionView<'_> = expression.view(0, expression.len());
		let (pattern, contains_wildcard): (String, bool) = view.generate_regex_string();
		assert_eq!(pattern, r"a\*b");
		assert!(!contains_wildcard);
	}

	#[test]
	fn view_cutting_an_escape_is_malformed() {
		let expression: WildcardExpression = WildcardExpression::new(r"a\*b");
		assert!(!expression.view(0, 2).is_well_formed());
		assert!(!expression.view(2, 4).is_well_formed());
		assert!(expression.view(0, 4).is_well_formed());
	}

	#[test]
	fn lone_star_is_static() {
		let engine: QueryEngine = engine();
		let interpretations: BTreeSet<QueryInterpretation> = engine.get_all_multi_token_interpretations("*");
		assert_eq!(interpretations.len(), 1);
		assert_eq!(statics(&interpretations), vec!["*".to_owned()]);
	}

	#[test]
	fn exact_number_matches_highest_priority_rule() {
		let engine: QueryEngine = engine();
		let interpretations: BTreeSet<QueryInterpretation> = engine.get_all_multi_token_interpretations("123");
		// Without a wildcard only the highest-priority matching rule is
		// kept: int (id 3), never hasNumber; character-by-character
		// tokenizations still compose the all-static reading.
		let mut rules: Vec<SymbolId> = Vec::new();
		let mut statics_seen: Vec<String> = Vec::new();
		for interpretation in interpretations.iter() {
			match interpretation.tokens() {
				[QueryToken::Variable(variable)] => {
					rules.push(variable.rule);
					assert_eq!(variable.substring, "123");
					assert!(!variable.contains_wildcard);
				},
				[QueryToken::Static(text)] => {
					statics_seen.push(text.clone());
				},
				tokens => panic!("unexpected interpretation {tokens:?}"),
			}
		}
		assert_eq!(rules, vec![3]);
		assert_eq!(statics_seen, vec!["123".to_owned()]);
	}

	#[test]
	fn wildcard_substring_keeps_static_reading() {
		let engine: QueryEngine = engine();
		let interpretations: BTreeSet<QueryInterpretation> = engine.get_all_multi_token_interpretations("1*");
		// "1*" reads as an int-or-hasNumber variable (with the star folded
		// into the substring) or as static text; the star-collapsed static
		// reading is exactly "1*".
		assert!(
			interpretations.iter().any(|interpretation| matches!(
				interpretation.tokens().first(),
				Some(QueryToken::Variable(variable)) if variable.rule == 3 && variable.contains_wildcard
			)),
			"{interpretations:?}"
		);
		assert!(
			interpretations
				.iter()
				.any(|interpretation| matches!(interpretation.tokens(), [QueryToken::Static(text)] if text == "1*")),
			"{interpretations:?}"
		);
	}

	#[test]
	fn no_adjacent_static_tokens() {
		let engine: QueryEngine = engine();
		for query in ["abc", "a*c", "12?4", "=a*1"] {
			for interpretation in engine.get_all_multi_token_interpretations(query) {
				let mut prev_was_static: bool = false;
				for token in interpretation.tokens() {
					let is_static: bool = matches!(token, QueryToken::Static(_));
					assert!(
						!(is_static && prev_was_static),
						"adjacent statics in {interpretation:?} for {query}"
					);
					prev_was_static = is_static;
				}
			}
		}
	}

	#[test]
	fn star_run_length_does_not_matter() {
		let engine: QueryEngine = engine();
		assert_eq!(
			engine.get_all_multi_token_interpretations("a*1"),
			engine.get_all_multi_token_interpretations("a***1")
		);
		assert_eq!(
			engine.get_all_multi_token_interpretations("a*?*1"),
			engine.get_all_multi_token_interpretations("a*1")
		);
	}

	#[test]
	fn undelimited_text_stays_static() {
		let engine: QueryEngine = engine();
		let interpretations: BTreeSet<QueryInterpretation> = engine.get_all_multi_token_interpretations("abc123");
		// No delimiter splits "abc" from "123", so no variable reading of
		// either half may appear on its own.
		assert!(
			interpretations.iter().any(|interpretation| matches!(
				interpretation.tokens(),
				[QueryToken::Static(text)] if text == "abc123"
			)),
			"{interpretations:?}"
		);
		for interpretation in interpretations.iter() {
			assert!(
				!interpretation.tokens().iter().any(|token| matches!(
					token,
					QueryToken::Variable(variable) if !variable.contains_wildcard && variable.substring.len() < 6
				)),
				"{interpretation:?}"
			);
		}
	}
}
