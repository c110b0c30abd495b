use crate::buffer::InputBuffer;
use crate::lexer::Lexer;
use crate::prefix_tree::Position;
use crate::prefix_tree::UNMATCHED_POSITION;
use crate::token::SYMBOL_NAME_TIMESTAMP;
use crate::token::SYMBOL_UNCAUGHT_STRING;
use crate::token::SymbolId;
use crate::token::Token;

/// A token of an assembled event plus the capture positions recorded while it
/// was lexed. Positions are ring positions in the input buffer, most recent
/// occurrence first, with `-1` marking an unmatched capture.
#[derive(Debug, Clone)]
pub struct EventToken {
	pub token: Token,
	pub captures: Vec<TokenCaptures>,
}

#[derive(Debug, Clone)]
pub struct TokenCaptures {
	pub name: String,
	pub starts: Vec<Position>,
	pub ends: Vec<Position>,
}

/// The parser's output buffer: the ordered tokens of one log event. Slot 0
/// is reserved for the timestamp token; a timestamp-less event leaves it
/// empty and its tokens start at slot 1.
#[derive(Debug, Default)]
pub struct TokenStore {
	tokens: Vec<Option<EventToken>>,
	pos: usize,
	has_timestamp: bool,
	has_delimiters: bool,
	multiline: bool,
}

impl TokenStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reset(&mut self) {
		self.tokens.clear();
		self.pos = 0;
		self.has_timestamp = false;
		self.has_delimiters = false;
		self.multiline = false;
	}

	pub fn set_token(&mut self, pos: usize, token: EventToken) {
		if self.tokens.len() <= pos {
			self.tokens.resize_with(pos + 1, || None);
		}
		self.tokens[pos] = Some(token);
	}

	pub fn set_curr_token(&mut self, token: EventToken) {
		let pos: usize = self.pos;
		self.set_token(pos, token);
	}

	pub fn advance_to_next_token(&mut self) {
		self.pos += 1;
	}

	pub fn pos(&self) -> usize {
		self.pos
	}

	pub fn set_pos(&mut self, pos: usize) {
		self.pos = pos;
	}

	pub fn get_token(&self, pos: usize) -> Option<&EventToken> {
		self.tokens.get(pos).and_then(Option::as_ref)
	}

	pub fn curr_token(&self) -> Option<&EventToken> {
		self.get_token(self.pos)
	}

	pub fn set_has_timestamp(&mut self, has_timestamp: bool) {
		self.has_timestamp = has_timestamp;
	}

	pub fn has_timestamp(&self) -> bool {
		self.has_timestamp
	}

	pub fn set_has_delimiters(&mut self, has_delimiters: bool) {
		self.has_delimiters = has_delimiters;
	}

	pub fn has_delimiters(&self) -> bool {
		self.has_delimiters
	}

	pub fn set_multiline(&mut self, multiline: bool) {
		self.multiline = multiline;
	}

	pub fn is_multiline(&self) -> bool {
		self.multiline
	}

	/// Index of the first content slot.
	pub fn start_index(&self) -> usize {
		if self.has_timestamp { 0 } else { 1 }
	}

	/// The event's filled slots in order.
	pub fn event_tokens(&self) -> impl Iterator<Item = &EventToken> {
		self.tokens[..self.pos.min(self.tokens.len())]
			.iter()
			.skip(self.start_index())
			.filter_map(Option::as_ref)
	}

	/// Remaps every stored position after a buffer growth that flipped the
	/// ring halves, and refreshes the ring size the tokens carry.
	pub fn remap_after_growth(&mut self, old_size: usize, flipped: bool, new_size: usize) {
		let half: usize = old_size / 2;
		for slot in self.tokens.iter_mut() {
			let Some(event_token) = slot else {
				continue;
			};
			if flipped {
				event_token.token.start_pos = remap_pos(event_token.token.start_pos, half);
				event_token.token.end_pos = remap_pos(event_token.token.end_pos, half);
				for captures in event_token.captures.iter_mut() {
					for pos in captures.starts.iter_mut().chain(captures.ends.iter_mut()) {
						if *pos >= 0 {
							*pos = remap_pos(*pos as usize, half) as Position;
						}
					}
				}
			}
			event_token.token.buffer_size = new_size;
		}
	}
}

fn remap_pos(pos: usize, half: usize) -> usize {
	if pos >= half { pos - half } else { pos + half }
}

/// A parsed log event whose tokens point into the parser's input buffer.
/// Valid until the parser produces the next event (or resets); use
/// [`LogEventView::deep_copy`] to keep an event around longer.
pub struct LogEventView<'parser> {
	lexer: &'parser Lexer,
	input: &'parser InputBuffer,
	store: &'parser TokenStore,
}

impl<'parser> LogEventView<'parser> {
	pub fn new(lexer: &'parser Lexer, input: &'parser InputBuffer, store: &'parser TokenStore) -> Self {
		Self { lexer, input, store }
	}

	pub fn store(&self) -> &TokenStore {
		self.store
	}

	pub fn is_multiline(&self) -> bool {
		self.store.is_multiline()
	}

	pub fn get_timestamp(&self) -> Option<&EventToken> {
		if self.store.has_timestamp() {
			self.store.get_token(0)
		} else {
			None
		}
	}

	/// Tokens of one type, in event order.
	pub fn get_variables(&self, type_id: SymbolId) -> Vec<&EventToken> {
		self.store
			.event_tokens()
			.filter(|event_token| event_token.token.token_type() == type_id)
			.collect::<Vec<_>>()
	}

	/// The raw bytes of the event, reassembled from its tokens.
	pub fn to_string_lossy(&self) -> String {
		let mut raw: Vec<u8> = Vec::new();
		for event_token in self.store.event_tokens() {
			raw.extend_from_slice(&event_token.token.to_bytes(self.input));
		}
		String::from_utf8_lossy(&raw).into_owned()
	}

	/// The static skeleton of the event: variable tokens replaced by
	/// `<name>` (or an expanded form interpolating their captures), uncaught
	/// text kept verbatim.
	pub fn get_logtype(&self) -> String {
		let mut logtype: String = String::new();
		for (i, event_token) in self.store.event_tokens().enumerate() {
			let is_timestamp_slot: bool = i == 0 && self.store.has_timestamp();
			// The first content token of a timestamp-less event has no
			// preceding delimiter, even when its span was carried over from
			// an event boundary.
			let delimiter: Option<u8> = if i == 0 && !self.store.has_timestamp() {
				None
			} else {
				event_token.token.get_delimiter(self.input)
			};
			append_logtype(
				&mut logtype,
				self.lexer,
				event_token,
				event_token.token.to_bytes(self.input),
				delimiter,
				is_timestamp_slot,
			);
		}
		logtype
	}

	/// Copies the event's bytes into an owned buffer, rewriting every token
	/// and capture position to point into it. The result no longer aliases
	/// the input buffer.
	pub fn deep_copy(&self) -> LogEvent<'parser> {
		let mut buffer: Vec<u8> = Vec::new();
		let mut tokens: Vec<EventToken> = Vec::new();
		for event_token in self.store.event_tokens() {
			let bytes: Vec<u8> = event_token.token.to_bytes(self.input);
			let start: usize = buffer.len();
			let token_start: usize = event_token.token.start_pos;
			let ring: usize = event_token.token.buffer_size;
			let mut copied: EventToken = event_token.clone();
			copied.token.start_pos = start;
			copied.token.end_pos = start + bytes.len();
			for captures in copied.captures.iter_mut() {
				for pos in captures.starts.iter_mut().chain(captures.ends.iter_mut()) {
					if *pos >= 0 {
						let relative: usize = (*pos as usize + ring - token_start) % ring;
						*pos = (start + relative) as Position;
					}
				}
			}
			buffer.extend_from_slice(&bytes);
			tokens.push(copied);
		}
		for event_token in tokens.iter_mut() {
			event_token.token.buffer_size = buffer.len().max(1);
		}
		LogEvent {
			lexer: self.lexer,
			has_timestamp: self.store.has_timestamp(),
			multiline: self.store.is_multiline(),
			buffer,
			tokens,
		}
	}
}

/// An owned log event: a contiguous copy of the raw bytes plus tokens that
/// point into it. Outlives the parser's input buffer; only the lexer (for
/// symbol names) is still borrowed.
pub struct LogEvent<'lexer> {
	lexer: &'lexer Lexer,
	has_timestamp: bool,
	multiline: bool,
	buffer: Vec<u8>,
	tokens: Vec<EventToken>,
}

impl LogEvent<'_> {
	pub fn is_multiline(&self) -> bool {
		self.multiline
	}

	pub fn has_timestamp(&self) -> bool {
		self.has_timestamp
	}

	pub fn tokens(&self) -> &[EventToken] {
		&self.tokens
	}

	pub fn bytes(&self) -> &[u8] {
		&self.buffer
	}

	pub fn token_bytes(&self, event_token: &EventToken) -> &[u8] {
		&self.buffer[event_token.token.start_pos..event_token.token.end_pos]
	}

	pub fn to_string_lossy(&self) -> String {
		String::from_utf8_lossy(&self.buffer).into_owned()
	}

	pub fn get_logtype(&self) -> String {
		let mut logtype: String = String::new();
		for (i, event_token) in self.tokens.iter().enumerate() {
			let is_timestamp_slot: bool = i == 0 && self.has_timestamp;
			let delimiter: Option<u8> = if event_token.token.at_input_start || (i == 0 && !self.has_timestamp) {
				None
			} else {
				self.token_bytes(event_token).first().copied()
			};
			append_logtype(
				&mut logtype,
				self.lexer,
				event_token,
				self.token_bytes(event_token).to_vec(),
				delimiter,
				is_timestamp_slot,
			);
		}
		logtype
	}
}

fn append_logtype(
	logtype: &mut String,
	lexer: &Lexer,
	event_token: &EventToken,
	bytes: Vec<u8>,
	delimiter: Option<u8>,
	is_timestamp_slot: bool,
) {
	let type_id: SymbolId = event_token.token.token_type();
	if type_id == SYMBOL_UNCAUGHT_STRING {
		logtype.push_str(&String::from_utf8_lossy(&bytes));
		return;
	}
	if is_timestamp_slot {
		logtype.push('<');
		logtype.push_str(SYMBOL_NAME_TIMESTAMP);
		logtype.push('>');
		return;
	}

	let name: &str = lexer.symbol_name(type_id).unwrap_or("?");
	let is_newline: bool = lexer.symbol_id(crate::token::SYMBOL_NAME_NEWLINE) == Some(type_id);
	if !is_newline {
		if let Some(delimiter) = delimiter {
			logtype.push(char::from(delimiter));
		}
	}

	if event_token.captures.is_empty() {
		logtype.push('<');
		logtype.push_str(name);
		logtype.push('>');
		return;
	}

	// Expanded form: the token's bytes with each capture occurrence replaced
	// by its name.
	let token_start: usize = event_token.token.start_pos;
	let ring: usize = event_token.token.buffer_size;
	let skip: usize = usize::from(delimiter.is_some() && !is_newline);
	let mut spans: Vec<(usize, usize, &str)> = Vec::new();
	for captures in event_token.captures.iter() {
		for (&start, &end) in captures.starts.iter().zip(captures.ends.iter()) {
			if start == UNMATCHED_POSITION || end == UNMATCHED_POSITION {
				continue;
			}
			let relative_start: usize = (start as usize + ring - token_start) % ring;
			let relative_end: usize = (end as usize + ring - token_start) % ring;
			spans.push((relative_start, relative_end, captures.name.as_str()));
		}
	}
	spans.sort_by_key(|&(start, end, _)| (start, usize::MAX - end));

	let mut last: usize = skip;
	for (start, end, name) in spans.into_iter() {
		if start < last {
			continue;
		}
		logtype.push_str(&String::from_utf8_lossy(&bytes[last..start]));
		logtype.push('<');
		logtype.push_str(name);
		logtype.push('>');
		last = end;
	}
	logtype.push_str(&String::from_utf8_lossy(&bytes[last..]));
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn slot_zero_is_reserved() {
		let mut store: TokenStore = TokenStore::new();
		store.set_has_timestamp(false);
		store.set_token(
			1,
			EventToken {
				token: Token {
					start_pos: 0,
					end_pos: 1,
					buffer_size: 8,
					line: 0,
					type_ids: vec![SYMBOL_UNCAUGHT_STRING],
					at_input_start: true,
				},
				captures: Vec::new(),
			},
		);
		store.set_pos(2);
		assert_eq!(store.start_index(), 1);
		assert_eq!(store.event_tokens().count(), 1);
	}

	#[test]
	fn remap_after_flip() {
		let mut store: TokenStore = TokenStore::new();
		store.set_has_timestamp(true);
		store.set_token(
			0,
			EventToken {
				token: Token {
					start_pos: 6,
					end_pos: 1,
					buffer_size: 8,
					line: 0,
					type_ids: vec![2],
					at_input_start: false,
				},
				captures: vec![TokenCaptures {
					name: "cap".to_owned(),
					starts: vec![7, -1],
					ends: vec![0, -1],
				}],
			},
		);
		store.set_pos(1);
		store.remap_after_growth(8, true, 16);
		let token: &EventToken = store.get_token(0).unwrap();
		// Positions in the old second half moved down, the rest moved up.
		assert_eq!(token.token.start_pos, 2);
		assert_eq!(token.token.end_pos, 5);
		assert_eq!(token.token.buffer_size, 16);
		assert_eq!(token.captures[0].starts, vec![3, -1]);
		assert_eq!(token.captures[0].ends, vec![4, -1]);
	}
}
