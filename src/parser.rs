use crate::buffer::InputBuffer;
pub use crate::buffer::Reader;
pub use crate::buffer::SliceReader;
use crate::error::ErrorCode;
use crate::error::SchemaError;
use crate::lexer::Lexer;
use crate::log_event::EventToken;
use crate::log_event::LogEventView;
use crate::log_event::TokenCaptures;
use crate::log_event::TokenStore;
use crate::prefix_tree::Position;
use crate::schema::Schema;
use crate::token::SYMBOL_END;
use crate::token::SYMBOL_NAME_FIRST_TIMESTAMP;
use crate::token::SYMBOL_NAME_NEWLINE;
use crate::token::SYMBOL_NAME_NEWLINE_TIMESTAMP;
use crate::token::SYMBOL_UNCAUGHT_STRING;
use crate::token::SymbolId;
use crate::token::Token;

/// What the caller should do with the event that was just completed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ParsingAction {
	/// An event was completed; more input remains.
	Compress,
	/// An event (possibly empty) was completed and the input is exhausted.
	CompressAndFinish,
}

/// The log-event state machine: drives the lexer's token stream and decides
/// where one event ends and the next begins.
///
/// Events start either at the start of input or at a newline followed by a
/// timestamp. In timestamp-less mode any token beginning with a newline byte
/// closes the current event instead.
#[derive(Debug)]
pub struct LogParser {
	lexer: Lexer,
	input_buffer: InputBuffer,
	has_start_of_log: bool,
	start_of_log_message: Option<EventToken>,
	/// Ring position of the running event's first byte; bytes from here on
	/// must survive until the event is released.
	event_start: Option<usize>,
	newline_id: SymbolId,
	first_timestamp_id: Option<SymbolId>,
	newline_timestamp_id: Option<SymbolId>,
}

impl LogParser {
	pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
		Self::with_input_capacity(schema, crate::buffer::DEFAULT_STORAGE_SIZE)
	}

	/// Like [`LogParser::from_schema`] with an explicit initial ring size;
	/// mostly useful for exercising the wrap-around and growth paths.
	pub fn with_input_capacity(schema: &Schema, capacity: usize) -> Result<Self, SchemaError> {
		let lexer: Lexer = Lexer::from_schema(schema)?;
		let newline_id: SymbolId = lexer
			.symbol_id(SYMBOL_NAME_NEWLINE)
			.expect("the newline rule is always registered");
		let first_timestamp_id: Option<SymbolId> = lexer.symbol_id(SYMBOL_NAME_FIRST_TIMESTAMP);
		let newline_timestamp_id: Option<SymbolId> = lexer.symbol_id(SYMBOL_NAME_NEWLINE_TIMESTAMP);
		Ok(Self {
			lexer,
			input_buffer: InputBuffer::with_capacity(capacity),
			has_start_of_log: false,
			start_of_log_message: None,
			event_start: None,
			newline_id,
			first_timestamp_id,
			newline_timestamp_id,
		})
	}

	pub fn from_schema_text(text: &str) -> Result<Self, SchemaError> {
		Self::from_schema(&Schema::from_text(text)?)
	}

	pub fn reset(&mut self) {
		self.input_buffer.reset();
		self.lexer.reset();
		self.has_start_of_log = false;
		self.start_of_log_message = None;
		self.event_start = None;
	}

	/// Parses until one complete event sits in `output`. Returns
	/// `BufferOutOfBounds` when input runs out mid-event; the parser is left
	/// consistent, and the same call can be retried after more input arrives.
	pub fn parse(&mut self, output: &mut TokenStore) -> Result<ParsingAction, ErrorCode> {
		if output.pos() == 0 {
			output.set_has_delimiters(self.lexer.has_delimiters());
			let next_token: EventToken = if self.has_start_of_log {
				self.start_of_log_message
					.take()
					.expect("has_start_of_log implies a saved token")
			} else {
				self.next_symbol()?
			};
			if next_token.token.token_type() == SYMBOL_END {
				output.set_token(0, next_token);
				output.set_pos(1);
				return Ok(ParsingAction::CompressAndFinish);
			}
			let type_id: SymbolId = next_token.token.token_type();
			self.event_start = Some(next_token.token.start_pos);
			if Some(type_id) == self.first_timestamp_id || Some(type_id) == self.newline_timestamp_id {
				output.set_has_timestamp(true);
				output.set_token(0, next_token);
				output.set_pos(1);
			} else {
				output.set_has_timestamp(false);
				output.set_token(1, next_token);
				output.set_pos(2);
			}
			self.has_start_of_log = false;
		}

		loop {
			let next_token: EventToken = self.next_symbol()?;
			let type_id: SymbolId = next_token.token.token_type();
			if type_id == SYMBOL_END {
				return Ok(ParsingAction::CompressAndFinish);
			}
			output.set_curr_token(next_token);
			let curr: &EventToken = output.curr_token().expect("just stored");

			let found_start_of_next_message: bool = (output.has_timestamp()
				&& Some(type_id) == self.newline_timestamp_id)
				|| (!output.has_timestamp()
					&& curr.token.get_char(0, &self.input_buffer) == b'\n'
					&& type_id != self.newline_id);

			if !output.has_timestamp() && type_id == self.newline_id {
				let end_pos: usize = curr.token.end_pos;
				self.input_buffer.set_consumed_pos(end_pos);
				output.advance_to_next_token();
				self.event_start = None;
				trace!(tokens = output.pos(), "event closed at newline");
				return Ok(ParsingAction::Compress);
			}

			if found_start_of_next_message {
				// The token starts the next event; its newline byte stays
				// with the current event as a one-byte uncaught token.
				let mut start_of_next: EventToken = curr.clone();
				if start_of_next.token.start_pos == start_of_next.token.buffer_size - 1 {
					start_of_next.token.start_pos = 0;
				} else {
					start_of_next.token.start_pos += 1;
				}
				let mut newline_token: EventToken = curr.clone();
				newline_token.token.end_pos = newline_token.token.start_pos + 1;
				newline_token.token.type_ids = vec![SYMBOL_UNCAUGHT_STRING];
				newline_token.captures.clear();
				output.set_curr_token(newline_token);

				if start_of_next.token.start_pos == 0 {
					self.input_buffer.set_consumed_pos(self.input_buffer.size() - 1);
				} else {
					self.input_buffer.set_consumed_pos(start_of_next.token.start_pos - 1);
				}
				self.start_of_log_message = Some(start_of_next);
				self.has_start_of_log = true;
				output.advance_to_next_token();
				self.event_start = None;
				trace!(tokens = output.pos(), "event closed at next event's start");
				return Ok(ParsingAction::Compress);
			}

			output.advance_to_next_token();
		}
	}

	fn next_symbol(&mut self) -> Result<EventToken, ErrorCode> {
		let token: Token = self.lexer.scan(&mut self.input_buffer)?;
		let captures: Vec<TokenCaptures> = self.snapshot_captures(&token);
		Ok(EventToken { token, captures })
	}

	/// Register values describe only the most recently accepted token of each
	/// rule, so capture positions are snapshotted as soon as a token is
	/// produced.
	fn snapshot_captures(&self, token: &Token) -> Vec<TokenCaptures> {
		let Some(names) = self.lexer.rule_captures(token.token_type()) else {
			return Vec::new();
		};
		names
			.iter()
			.map(|name| {
				let (starts, ends): (Vec<Position>, Vec<Position>) = self
					.lexer
					.capture_positions(name)
					.expect("rule captures always have registers");
				TokenCaptures {
					name: name.clone(),
					starts,
					ends,
				}
			})
			.collect::<Vec<_>>()
	}

	pub fn read_into_input(&mut self, reader: &mut dyn Reader) -> Result<(), ErrorCode> {
		self.input_buffer.read_if_safe(reader)
	}

	/// Grows the input buffer when the current event has outgrown it,
	/// remapping every position held by the lexer and by `output` if the ring
	/// had to be flipped. A refill that would overwrite the running event's
	/// bytes also forces growth: the consumed position alone cannot express a
	/// fully-unconsumed ring.
	pub fn increase_capacity_if_needed(&mut self, output: &mut TokenStore) {
		if self.input_buffer.finished_reading_input() {
			return;
		}
		let protected_start: Option<usize> = self.event_start.or_else(|| self.lexer.pending_token_start());
		let overwrites_event: bool =
			protected_start.is_some_and(|start| self.input_buffer.next_read_overwrites(start));
		if self.input_buffer.read_is_safe() && !overwrites_event {
			return;
		}
		let (old_size, flipped): (usize, bool) = self.lexer.increase_buffer_capacity(&mut self.input_buffer);
		output.remap_after_growth(old_size, flipped, self.input_buffer.size());
		if flipped {
			let half: usize = old_size / 2;
			let remap = |pos: usize| if pos >= half { pos - half } else { pos + half };
			if let Some(start_of_next) = self.start_of_log_message.as_mut() {
				start_of_next.token.start_pos = remap(start_of_next.token.start_pos);
				start_of_next.token.end_pos = remap(start_of_next.token.end_pos);
			}
			self.event_start = self.event_start.map(remap);
		}
		if let Some(start_of_next) = self.start_of_log_message.as_mut() {
			start_of_next.token.buffer_size = self.input_buffer.size();
		}
	}

	pub fn set_input_buffer(&mut self, data: &[u8], pos: usize, finished_reading_input: bool) {
		self.input_buffer.set_storage(data, pos, finished_reading_input);
	}

	pub fn input_pos(&self) -> usize {
		self.input_buffer.pos()
	}

	pub fn get_symbol_id(&self, symbol: &str) -> Option<SymbolId> {
		self.lexer.symbol_id(symbol)
	}

	pub fn lexer(&self) -> &Lexer {
		&self.lexer
	}

	pub fn input_buffer(&self) -> &InputBuffer {
		&self.input_buffer
	}
}

/// Computes the multi-line flag for a finished event: a timestamped event
/// with a newline token followed by at least one more token.
fn compute_multiline(store: &mut TokenStore, newline_id: SymbolId) {
	if !store.has_timestamp() {
		return;
	}
	let mut first_newline_pos: usize = 0;
	for (i, event_token) in store.event_tokens().enumerate() {
		if event_token.token.token_type() == newline_id {
			first_newline_pos = i + store.start_index();
			break;
		}
	}
	if first_newline_pos > 0 && first_newline_pos + 1 < store.pos() {
		store.set_multiline(true);
	}
}

/// Parses events out of caller-supplied byte buffers. The caller owns the
/// buffer and the offset cursor; when `BufferOutOfBounds` comes back, the
/// bytes from `offset` on hold an incomplete event, and the caller re-calls
/// with those bytes (plus more) in the next buffer.
pub struct BufferParser {
	log_parser: LogParser,
	store: TokenStore,
	done: bool,
}

impl BufferParser {
	pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
		Ok(Self {
			log_parser: LogParser::from_schema(schema)?,
			store: TokenStore::new(),
			done: false,
		})
	}

	pub fn from_schema_text(text: &str) -> Result<Self, SchemaError> {
		Self::from_schema(&Schema::from_text(text)?)
	}

	pub fn reset(&mut self) {
		self.log_parser.reset();
		self.store.reset();
		self.done = false;
	}

	/// Parses the next event out of `buf[*offset..]`. On success `offset`
	/// advances to the first unparsed byte and the event is available from
	/// [`BufferParser::event_view`]. `finished_reading_input` marks the end
	/// of the final buffer, allowing the last event to flush.
	pub fn parse_next_event(
		&mut self,
		buf: &[u8],
		offset: &mut usize,
		finished_reading_input: bool,
	) -> Result<(), ErrorCode> {
		if *offset > buf.len() {
			return Err(ErrorCode::BadParam);
		}
		self.store.reset();
		self.log_parser.set_input_buffer(buf, *offset, finished_reading_input);

		match self.log_parser.parse(&mut self.store) {
			Ok(action) => {
				if action == ParsingAction::CompressAndFinish {
					self.done = true;
				}
				*offset = self.log_parser.input_pos().min(buf.len());
				compute_multiline(&mut self.store, self.log_parser.newline_id);
				Ok(())
			},
			Err(err) => {
				// Rewind to the start of the incomplete event so the caller
				// can re-present it with more data.
				let event_start: Option<usize> = self
					.store
					.get_token(0)
					.or_else(|| self.store.get_token(1))
					.map(|event_token| event_token.token.start_pos);
				if let Some(event_start) = event_start {
					*offset = event_start.min(buf.len());
				}
				self.log_parser.reset();
				self.store.reset();
				Err(err)
			},
		}
	}

	/// The event produced by the last successful
	/// [`BufferParser::parse_next_event`] call.
	pub fn event_view(&self) -> LogEventView<'_> {
		LogEventView::new(
			self.log_parser.lexer(),
			self.log_parser.input_buffer(),
			&self.store,
		)
	}

	pub fn log_parser(&self) -> &LogParser {
		&self.log_parser
	}

	pub fn get_variable_id(&self, name: &str) -> Option<SymbolId> {
		self.log_parser.get_symbol_id(name)
	}

	/// True once the final event of the input has been produced; only
	/// possible after a call with `finished_reading_input` set.
	pub fn done(&self) -> bool {
		self.done
	}
}

/// Parses events by pulling bytes from a [`Reader`]; I/O, buffer growth, and
/// resumption are handled internally, so every successful call yields one
/// event.
pub struct ReaderParser<R: Reader> {
	log_parser: LogParser,
	store: TokenStore,
	reader: R,
	done: bool,
}

impl<R: Reader> ReaderParser<R> {
	pub fn from_schema(schema: &Schema, reader: R) -> Result<Self, SchemaError> {
		Ok(Self {
			log_parser: LogParser::from_schema(schema)?,
			store: TokenStore::new(),
			reader,
			done: false,
		})
	}

	/// Like [`ReaderParser::from_schema`] with an explicit initial ring size.
	pub fn with_input_capacity(schema: &Schema, reader: R, capacity: usize) -> Result<Self, SchemaError> {
		Ok(Self {
			log_parser: LogParser::with_input_capacity(schema, capacity)?,
			store: TokenStore::new(),
			reader,
			done: false,
		})
	}

	pub fn from_schema_text(text: &str, reader: R) -> Result<Self, SchemaError> {
		Self::from_schema(&Schema::from_text(text)?, reader)
	}

	pub fn parse_next_event(&mut self) -> Result<(), ErrorCode> {
		self.store.reset();
		match self.log_parser.read_into_input(&mut self.reader) {
			Ok(()) | Err(ErrorCode::EndOfFile) => (),
			Err(err) => {
				return Err(err);
			},
		}
		loop {
			match self.log_parser.parse(&mut self.store) {
				Ok(action) => {
					if action == ParsingAction::CompressAndFinish {
						self.done = true;
					}
					compute_multiline(&mut self.store, self.log_parser.newline_id);
					return Ok(());
				},
				Err(ErrorCode::BufferOutOfBounds) => {
					self.log_parser.increase_capacity_if_needed(&mut self.store);
					match self.log_parser.read_into_input(&mut self.reader) {
						Ok(()) | Err(ErrorCode::EndOfFile) => (),
						Err(err) => {
							return Err(err);
						},
					}
				},
				Err(err) => {
					return Err(err);
				},
			}
		}
	}

	pub fn event_view(&self) -> LogEventView<'_> {
		LogEventView::new(
			self.log_parser.lexer(),
			self.log_parser.input_buffer(),
			&self.store,
		)
	}

	pub fn done(&self) -> bool {
		self.done
	}

	pub fn log_parser(&self) -> &LogParser {
		&self.log_parser
	}
}
