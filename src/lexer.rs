use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::buffer::CHAR_EOF;
use crate::buffer::CHAR_START_OF_INPUT;
use crate::buffer::InputBuffer;
use crate::dfa::Dfa;
use crate::dfa::DfaStateId;
use crate::dfa::RegisterOperation;
use crate::dfa::RegisterOperationKind;
use crate::error::ErrorCode;
use crate::error::SchemaError;
use crate::error::SchemaErrorKind;
use crate::interval_tree::Interval;
use crate::nfa::Nfa;
use crate::nfa::TagId;
use crate::prefix_tree::Position;
use crate::prefix_tree::RegisterHandler;
use crate::prefix_tree::UNMATCHED_POSITION;
use crate::regex::RegexAst;
use crate::schema::Schema;
use crate::token::SYMBOL_END;
use crate::token::SYMBOL_FIRST_RULE;
use crate::token::SYMBOL_NAME_END;
use crate::token::SYMBOL_NAME_FIRST_TIMESTAMP;
use crate::token::SYMBOL_NAME_NEWLINE;
use crate::token::SYMBOL_NAME_NEWLINE_TIMESTAMP;
use crate::token::SYMBOL_NAME_TIMESTAMP;
use crate::token::SYMBOL_NAME_UNCAUGHT_STRING;
use crate::token::SYMBOL_UNCAUGHT_STRING;
use crate::token::SymbolId;
use crate::token::Token;

/// Runs the schema's DFA over an input buffer, producing one token per call.
///
/// Rules other than the timestamps are compiled with a leading
/// delimiter-class byte, so a variable token's span includes the delimiter
/// that introduced it. A virtual start-of-input byte stands in for that
/// delimiter at position 0 (and is what the `firstTimestamp` rule consumes),
/// so the start of input behaves as if preceded by a delimiter.
#[derive(Debug)]
pub struct Lexer {
	symbol_ids: BTreeMap<String, SymbolId>,
	symbol_names: BTreeMap<SymbolId, String>,
	dfa: Dfa,
	registers: RegisterHandler,
	rule_captures: BTreeMap<SymbolId, Vec<String>>,
	capture_tags: BTreeMap<String, (TagId, TagId)>,
	is_delimiter: [bool; 256],
	is_first_char: [bool; 256],
	has_delimiters: bool,

	// Scan state; kept across calls so a scan can resume after the caller
	// supplies more input.
	state: DfaStateId,
	start_pos: usize,
	start_line: usize,
	line: usize,
	matched: bool,
	match_pos: usize,
	match_line: usize,
	match_type_ids: Vec<SymbolId>,
	/// Real bytes consumed for the token being scanned; distinguishes a scan
	/// that has not started from one that wrapped the whole ring.
	consumed_in_token: usize,
	asked_for_more_data: bool,
	at_input_start: bool,
	token_at_input_start: bool,
}

impl Lexer {
	pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
		let delimiters: Vec<u32> = schema.delimiters().to_vec();
		let mut is_delimiter: [bool; 256] = [false; 256];
		for &delimiter in delimiters.iter() {
			if delimiter < 256 {
				is_delimiter[delimiter as usize] = true;
			}
		}

		let mut prefix_class: Vec<u32> = delimiters.clone();
		prefix_class.push(u32::from(CHAR_START_OF_INPUT));

		let mut symbol_ids: BTreeMap<String, SymbolId> = BTreeMap::new();
		let mut symbol_names: BTreeMap<SymbolId, String> = BTreeMap::new();
		let mut next_symbol: SymbolId = 0;
		let mut intern = |name: &str, ids: &mut BTreeMap<String, SymbolId>, names: &mut BTreeMap<SymbolId, String>| {
			let id: SymbolId = next_symbol;
			next_symbol += 1;
			ids.insert(name.to_owned(), id);
			names.insert(id, name.to_owned());
			id
		};
		intern(SYMBOL_NAME_END, &mut symbol_ids, &mut symbol_names);
		intern(SYMBOL_NAME_UNCAUGHT_STRING, &mut symbol_ids, &mut symbol_names);
		debug_assert_eq!(symbol_ids[SYMBOL_NAME_UNCAUGHT_STRING], SYMBOL_UNCAUGHT_STRING);

		let mut rules: Vec<(SymbolId, RegexAst)> = Vec::new();
		let newline_id: SymbolId = intern(SYMBOL_NAME_NEWLINE, &mut symbol_ids, &mut symbol_names);
		debug_assert_eq!(newline_id, SYMBOL_FIRST_RULE);
		rules.push((newline_id, RegexAst::Literal(u32::from(b'\n'))));

		let mut timestamp_ids: Option<(SymbolId, SymbolId)> = None;
		for rule in schema.rules().iter() {
			if rule.name == SYMBOL_NAME_TIMESTAMP {
				match timestamp_ids {
					None => {
						let first_id: SymbolId =
							intern(SYMBOL_NAME_FIRST_TIMESTAMP, &mut symbol_ids, &mut symbol_names);
						let newline_id: SymbolId =
							intern(SYMBOL_NAME_NEWLINE_TIMESTAMP, &mut symbol_ids, &mut symbol_names);
						timestamp_ids = Some((first_id, newline_id));
						rules.push((
							first_id,
							RegexAst::cat(RegexAst::Literal(u32::from(CHAR_START_OF_INPUT)), rule.ast.clone()),
						));
						rules.push((
							newline_id,
							RegexAst::cat(RegexAst::Literal(u32::from(b'\n')), rule.ast.clone()),
						));
					},
					Some((first_id, newline_id)) => {
						// Additional timestamp patterns fold into the two
						// existing rules as alternation branches.
						for id in [first_id, newline_id] {
							let entry: &mut (SymbolId, RegexAst) = rules
								.iter_mut()
								.find(|(rule_id, _)| *rule_id == id)
								.expect("timestamp rules were just added");
							let RegexAst::Cat(prefix, body) = entry.1.clone() else {
								unreachable!("timestamp rules are prefixed concatenations");
							};
							entry.1 = RegexAst::Cat(prefix, Box::new(RegexAst::Or(body, Box::new(rule.ast.clone()))));
						}
					},
				}
				continue;
			}

			if !schema.has_delimiters() {
				return Err(SchemaError::new(rule.line, SchemaErrorKind::MissingDelimiters));
			}

			let mut ast: RegexAst = rule.ast.clone();
			ast.remove_delimiters_from_wildcard(&delimiters);

			let mut possible_inputs: Vec<Interval> = Vec::new();
			ast.collect_possible_inputs(&mut possible_inputs);
			for &delimiter in delimiters.iter() {
				if possible_inputs.iter().any(|interval| interval.contains(delimiter)) {
					return Err(SchemaError::new(
						rule.line,
						SchemaErrorKind::RuleContainsDelimiter {
							rule: rule.name.clone(),
							delimiter: delimiter.min(255) as u8,
						},
					));
				}
			}

			let id: SymbolId = intern(&rule.name, &mut symbol_ids, &mut symbol_names);
			rules.push((id, RegexAst::cat(RegexAst::group_of(&prefix_class), ast)));
		}

		// Capture names must be unique across all rules; tag IDs are
		// allocated from a single flat namespace.
		let mut seen_captures: BTreeSet<&str> = BTreeSet::new();
		for (_, ast) in rules.iter() {
			for name in ast.subtree_captures() {
				if !seen_captures.insert(name) {
					return Err(SchemaError::new(0, SchemaErrorKind::DuplicateCapture(name.to_owned())));
				}
			}
		}

		let mut nfa: Nfa = Nfa::new();
		let mut rule_captures: BTreeMap<SymbolId, Vec<String>> = BTreeMap::new();
		for (id, ast) in rules.iter() {
			nfa.add_rule(*id, ast);
			let captures: Vec<String> = ast
				.subtree_captures()
				.into_iter()
				.map(str::to_owned)
				.collect::<Vec<_>>();
			if !captures.is_empty() {
				rule_captures.insert(*id, captures);
			}
		}

		let capture_tags: BTreeMap<String, (TagId, TagId)> = nfa
			.captures()
			.iter()
			.map(|(name, tags)| (name.clone(), (tags.start_tag, tags.end_tag)))
			.collect::<BTreeMap<_, _>>();

		let dfa: Dfa = Dfa::determinize(&nfa);
		let mut registers: RegisterHandler = RegisterHandler::new();
		registers.add_registers(dfa.num_registers());

		let mut is_first_char: [bool; 256] = [false; 256];
		for byte in 0..=u8::MAX {
			is_first_char[byte as usize] = dfa[dfa.root()].transition(byte).is_some();
		}

		debug!(
			rules = rules.len(),
			dfa_states = dfa.num_states(),
			captures = capture_tags.len(),
			"lexer generated"
		);

		let root: DfaStateId = dfa.root();
		Ok(Self {
			symbol_ids,
			symbol_names,
			dfa,
			registers,
			rule_captures,
			capture_tags,
			is_delimiter,
			is_first_char,
			has_delimiters: schema.has_delimiters(),
			state: root,
			start_pos: 0,
			start_line: 0,
			line: 0,
			matched: false,
			match_pos: 0,
			match_line: 0,
			match_type_ids: Vec::new(),
			consumed_in_token: 0,
			asked_for_more_data: false,
			at_input_start: true,
			token_at_input_start: false,
		})
	}

	/// Clears all scan state so the next token starts a fresh input.
	pub fn reset(&mut self) {
		self.state = self.dfa.root();
		self.start_pos = 0;
		self.start_line = 0;
		self.line = 0;
		self.matched = false;
		self.match_pos = 0;
		self.match_line = 0;
		self.match_type_ids.clear();
		self.consumed_in_token = 0;
		self.asked_for_more_data = false;
		self.at_input_start = true;
		self.token_at_input_start = false;
		self.registers.reset();
	}

	/// Lexes the next token. Returns `BufferOutOfBounds` when more input is
	/// needed; the caller refills or grows the buffer and calls again, and
	/// the scan resumes where it stopped. At end of input, any outstanding
	/// bytes flush as one uncaught token, then a token of type `$end` is
	/// returned.
	pub fn scan(&mut self, input: &mut InputBuffer) -> Result<Token, ErrorCode> {
		if !self.asked_for_more_data {
			self.begin_token(input);
		}
		self.asked_for_more_data = false;

		loop {
			let byte: u8 = match input.get_next_character() {
				Ok(byte) => byte,
				Err(ErrorCode::BufferOutOfBounds) => {
					self.asked_for_more_data = true;
					return Err(ErrorCode::BufferOutOfBounds);
				},
				Err(err) => {
					return Err(err);
				},
			};

			if byte == CHAR_EOF && input.log_fully_consumed() {
				return Ok(self.emit_at_end_of_input(input));
			}

			self.consumed_in_token += 1;
			if byte == b'\n' {
				self.line += 1;
			}

			// `get_next_character` already advanced past the byte.
			let byte_pos: usize = if input.pos() == 0 { input.size() - 1 } else { input.pos() - 1 };

			let Some(transition) = self.dfa[self.state].transition(byte) else {
				return Ok(self.emit_on_dead_state(input));
			};
			let target: DfaStateId = transition.target;
			apply_operations(&mut self.registers, &transition.reg_ops, byte_pos as Position);
			self.state = target;
			if self.dfa[self.state].is_accepting() {
				self.checkpoint(input);
			}
		}
	}

	/// Like [`Self::scan`], but `wildcard` bytes in the input act as a
	/// match-anything escape: the token is extended to the next delimiter and
	/// its possible types are every rule still reachable from the current
	/// DFA state.
	pub fn scan_with_wildcard(&mut self, input: &mut InputBuffer, wildcard: u8) -> Result<Token, ErrorCode> {
		if !self.asked_for_more_data {
			self.begin_token(input);
		}
		self.asked_for_more_data = false;

		loop {
			let byte: u8 = match input.get_next_character() {
				Ok(byte) => byte,
				Err(err) => {
					// A wildcard scan does not keep resumable state; restart
					// the token once more input is available.
					input.set_pos(self.start_pos);
					self.line = self.start_line;
					return Err(err);
				},
			};

			if byte == CHAR_EOF && input.log_fully_consumed() {
				return Ok(self.emit_at_end_of_input(input));
			}

			self.consumed_in_token += 1;
			if byte == b'\n' {
				self.line += 1;
			}

			if byte == wildcard {
				let mut type_ids: Vec<SymbolId> = self.reachable_rules(self.state).into_iter().collect::<Vec<_>>();
				if type_ids.is_empty() {
					type_ids.push(SYMBOL_UNCAUGHT_STRING);
				}
				self.glob_to_delimiter(input)?;
				let token: Token = Token {
					start_pos: self.start_pos,
					end_pos: input.pos(),
					buffer_size: input.size(),
					line: self.start_line,
					type_ids,
					at_input_start: self.token_at_input_start,
				};
				return Ok(token);
			}

			let byte_pos: usize = if input.pos() == 0 { input.size() - 1 } else { input.pos() - 1 };
			let Some(transition) = self.dfa[self.state].transition(byte) else {
				return Ok(self.emit_on_dead_state(input));
			};
			let target: DfaStateId = transition.target;
			apply_operations(&mut self.registers, &transition.reg_ops, byte_pos as Position);
			self.state = target;
			if self.dfa[self.state].is_accepting() {
				self.checkpoint(input);
			}
		}
	}

	fn begin_token(&mut self, input: &mut InputBuffer) {
		self.start_pos = input.pos();
		self.start_line = self.line;
		self.matched = false;
		self.match_pos = 0;
		self.match_line = 0;
		self.match_type_ids.clear();
		self.consumed_in_token = 0;
		self.state = self.dfa.root();
		self.token_at_input_start = false;

		if self.at_input_start {
			self.at_input_start = false;
			self.token_at_input_start = true;
			// The virtual start-of-input byte consumes no buffer position; a
			// rule can only accept once it has consumed real bytes, so no
			// checkpoint is taken here.
			if let Some(transition) = self.dfa[self.state].transition(CHAR_START_OF_INPUT) {
				let target: DfaStateId = transition.target;
				apply_operations(&mut self.registers, &transition.reg_ops, self.start_pos as Position);
				self.state = target;
			}
		}
	}

	fn checkpoint(&mut self, input: &InputBuffer) {
		self.matched = true;
		self.match_pos = input.pos();
		self.match_line = self.line;
		self.match_type_ids.clear();
		self.match_type_ids
			.extend(self.dfa[self.state].matching_rules().iter().copied());
		// Final register assignments are applied at every accept; copies
		// first, so repeated visits rebuild rather than extend the final
		// histories.
		let accepting_ops: &[RegisterOperation] = self.dfa[self.state].accepting_ops();
		apply_operations(&mut self.registers, accepting_ops, self.match_pos as Position);
	}

	fn emit_on_dead_state(&mut self, input: &mut InputBuffer) -> Token {
		if self.matched {
			input.set_pos(self.match_pos);
			self.line = self.match_line;
			return Token {
				start_pos: self.start_pos,
				end_pos: self.match_pos,
				buffer_size: input.size(),
				line: self.start_line,
				type_ids: self.match_type_ids.clone(),
				at_input_start: self.token_at_input_start,
			};
		}

		// No rule ever accepted: emit the first byte alone as uncaught text
		// and rescan from the byte after it.
		let end_pos: usize = (self.start_pos + 1) % input.size();
		input.set_pos(end_pos);
		self.line = self.start_line + usize::from(input.byte_at(self.start_pos) == b'\n');
		Token {
			start_pos: self.start_pos,
			end_pos,
			buffer_size: input.size(),
			line: self.start_line,
			type_ids: vec![SYMBOL_UNCAUGHT_STRING],
			at_input_start: self.token_at_input_start,
		}
	}

	fn emit_at_end_of_input(&mut self, input: &mut InputBuffer) -> Token {
		if self.matched {
			input.set_pos(self.match_pos);
			self.line = self.match_line;
			return Token {
				start_pos: self.start_pos,
				end_pos: self.match_pos,
				buffer_size: input.size(),
				line: self.start_line,
				type_ids: self.match_type_ids.clone(),
				at_input_start: self.token_at_input_start,
			};
		}

		if input.pos() == self.start_pos {
			return Token {
				start_pos: self.start_pos,
				end_pos: self.start_pos,
				buffer_size: input.size(),
				line: self.start_line,
				type_ids: vec![SYMBOL_END],
				at_input_start: self.token_at_input_start,
			};
		}

		// Mid-token end of input: flush everything scanned so far as one
		// best-effort uncaught token.
		Token {
			start_pos: self.start_pos,
			end_pos: input.pos(),
			buffer_size: input.size(),
			line: self.start_line,
			type_ids: vec![SYMBOL_UNCAUGHT_STRING],
			at_input_start: self.token_at_input_start,
		}
	}

	fn glob_to_delimiter(&mut self, input: &mut InputBuffer) -> Result<(), ErrorCode> {
		loop {
			let pos_before: usize = input.pos();
			match input.get_next_character() {
				Ok(byte) => {
					if byte == CHAR_EOF && input.log_fully_consumed() {
						return Ok(());
					}
					if self.is_delimiter[byte as usize] {
						input.set_pos(pos_before);
						return Ok(());
					}
					if byte == b'\n' {
						self.line += 1;
					}
				},
				Err(err) => {
					input.set_pos(self.start_pos);
					self.line = self.start_line;
					return Err(err);
				},
			}
		}
	}

	fn reachable_rules(&self, from: DfaStateId) -> BTreeSet<SymbolId> {
		let mut rules: BTreeSet<SymbolId> = BTreeSet::new();
		let mut visited: BTreeSet<DfaStateId> = BTreeSet::new();
		let mut stack: Vec<DfaStateId> = vec![from];
		visited.insert(from);
		while let Some(state) = stack.pop() {
			rules.extend(self.dfa[state].matching_rules().iter().copied());
			for byte in 0..=u8::MAX {
				if let Some(transition) = self.dfa[state].transition(byte) {
					if visited.insert(transition.target) {
						stack.push(transition.target);
					}
				}
			}
		}
		rules
	}

	/// Grows the input buffer for an event larger than the ring, remapping
	/// every stored position if the two halves had to be flipped. Returns
	/// the old ring size and whether a flip happened, so the caller can remap
	/// positions it holds itself.
	pub fn increase_buffer_capacity(&mut self, input: &mut InputBuffer) -> (usize, bool) {
		// A scan that has consumed nothing yet has its start at the read
		// cursor, which the growth moves; it must follow the cursor rather
		// than be remapped like a data position.
		let scan_is_pristine: bool = self.asked_for_more_data && self.consumed_in_token == 0;
		let (old_size, flipped): (usize, bool) = input.increase_capacity();
		if flipped {
			self.flip_states(old_size);
		}
		if scan_is_pristine {
			self.start_pos = input.pos();
		}
		debug!(old_size, flipped, new_size = input.size(), "input buffer grown");
		(old_size, flipped)
	}

	/// The start of the token currently being scanned, if a scan is
	/// suspended mid-token waiting for more input.
	pub fn pending_token_start(&self) -> Option<usize> {
		self.asked_for_more_data.then_some(self.start_pos)
	}

	/// Remaps scan positions after a growth that re-linearized a flipped
	/// ring: the half that was logically second now sits first.
	pub fn flip_states(&mut self, old_storage_size: usize) {
		let half: usize = old_storage_size / 2;
		let remap = |pos: usize| if pos >= half { pos - half } else { pos + half };
		self.start_pos = remap(self.start_pos);
		if self.matched {
			self.match_pos = remap(self.match_pos);
		}
		self.registers.remap_positions(|pos| {
			if pos < 0 {
				pos
			} else {
				remap(pos as usize) as Position
			}
		});
	}
}

// Accessors
impl Lexer {
	pub fn symbol_id(&self, symbol: &str) -> Option<SymbolId> {
		self.symbol_ids.get(symbol).copied()
	}

	pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
		self.symbol_names.get(&id).map(String::as_str)
	}

	pub fn has_delimiters(&self) -> bool {
		self.has_delimiters
	}

	pub fn is_delimiter(&self, byte: u8) -> bool {
		self.is_delimiter[byte as usize]
	}

	/// Whether `byte` can begin any token other than uncaught text.
	pub fn is_first_char(&self, byte: u8) -> bool {
		self.is_first_char[byte as usize]
	}

	pub fn dfa(&self) -> &Dfa {
		&self.dfa
	}

	/// Capture names of a rule, or `None` if the rule has no captures.
	pub fn rule_captures(&self, rule: SymbolId) -> Option<&[String]> {
		self.rule_captures.get(&rule).map(Vec::as_slice)
	}

	pub fn capture_tag_pair(&self, capture: &str) -> Option<(TagId, TagId)> {
		self.capture_tags.get(capture).copied()
	}

	/// The recorded positions of a capture, most recent occurrence first, as
	/// of the last accepted token. An unmatched capture yields the `-1`
	/// sentinel pair.
	pub fn capture_positions(&self, capture: &str) -> Option<(Vec<Position>, Vec<Position>)> {
		let (start_tag, end_tag): (TagId, TagId) = self.capture_tag_pair(capture)?;
		let mut starts: Vec<Position> = self
			.registers
			.get_reversed_positions(self.dfa.final_register(start_tag));
		let mut ends: Vec<Position> = self.registers.get_reversed_positions(self.dfa.final_register(end_tag));
		if starts.is_empty() {
			starts.push(UNMATCHED_POSITION);
		}
		if ends.is_empty() {
			ends.push(UNMATCHED_POSITION);
		}
		Some((starts, ends))
	}
}

fn apply_operations(registers: &mut RegisterHandler, ops: &[RegisterOperation], pos: Position) {
	for op in ops.iter() {
		match &op.kind {
			RegisterOperationKind::Copy(source) => {
				registers.copy_register(op.register, *source);
			},
			RegisterOperationKind::Set => {
				if op.multi_valued {
					registers.append_position(op.register, pos);
				} else {
					registers.set_register(op.register, pos);
				}
			},
			RegisterOperationKind::Negate => {
				if op.multi_valued {
					registers.append_position(op.register, UNMATCHED_POSITION);
				} else {
					registers.set_register(op.register, UNMATCHED_POSITION);
				}
			},
		}
	}
}
