use log_tailor::parser::BufferParser;
use log_tailor::parser::ReaderParser;
use log_tailor::parser::SliceReader;
use log_tailor::schema::Schema;

const DEFAULT_DELIMITERS: &str = "delimiters: \\n\\r\\[:,\n";

fn parse_all_events(schema_text: &str, input: &str) -> Vec<(String, String, bool)> {
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> = ReaderParser::from_schema(&schema, reader).unwrap();

	let mut events: Vec<(String, String, bool)> = Vec::new();
	while !parser.done() {
		parser.parse_next_event().unwrap();
		let view = parser.event_view();
		let raw: String = view.to_string_lossy();
		if raw.is_empty() && parser.done() {
			break;
		}
		events.push((raw, view.get_logtype(), view.is_multiline()));
	}
	events
}

#[test]
fn single_variable_schema_tokenizes_at_delimiters() {
	// Scenario: one variable rule, no captures.
	let schema_text: String = format!("{DEFAULT_DELIMITERS}myVar:userID=123\n");
	let input: &str = "userID=123 userID=234 userID=123 123 userID=123";

	let events: Vec<(String, String, bool)> = parse_all_events(&schema_text, input);
	assert_eq!(events.len(), 1);
	let (raw, logtype, multiline): &(String, String, bool) = &events[0];
	assert_eq!(raw, input);
	assert_eq!(logtype, "<myVar> userID=234 <myVar> 123 <myVar>");
	assert!(!multiline);
}

#[test]
fn capture_positions_are_reported_per_token() {
	let schema_text: String = format!("{DEFAULT_DELIMITERS}myVar:userID=(?<uid>123)\n");
	let input: &str = "userID=123 userID=234 userID=123 123 userID=123";

	let schema: Schema = Schema::from_text(&schema_text).unwrap();
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> = ReaderParser::from_schema(&schema, reader).unwrap();
	parser.parse_next_event().unwrap();

	let view = parser.event_view();
	assert_eq!(
		view.get_logtype(),
		"userID=<uid> userID=234 userID=<uid> 123 userID=<uid>"
	);

	let my_var: u32 = parser.log_parser().get_symbol_id("myVar").unwrap();
	let mut uid_spans: Vec<(i32, i32)> = Vec::new();
	for event_token in view.get_variables(my_var) {
		assert_eq!(event_token.captures.len(), 1);
		assert_eq!(event_token.captures[0].name, "uid");
		uid_spans.push((event_token.captures[0].starts[0], event_token.captures[0].ends[0]));
	}
	assert_eq!(uid_spans, vec![(7, 10), (29, 32), (44, 47)]);
}

#[test]
fn optional_capture_is_unmatched_when_absent() {
	let schema_text: String = format!("{DEFAULT_DELIMITERS}myVar:userID=(?<uid>123){{0,1}}\n");
	let input: &str = "userID=123 userID= userID=456";

	let schema: Schema = Schema::from_text(&schema_text).unwrap();
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> = ReaderParser::from_schema(&schema, reader).unwrap();
	parser.parse_next_event().unwrap();

	let view = parser.event_view();
	let my_var: u32 = parser.log_parser().get_symbol_id("myVar").unwrap();
	let tokens: Vec<&log_tailor::log_event::EventToken> = view.get_variables(my_var);
	assert_eq!(tokens.len(), 3);
	assert_eq!(
		(tokens[0].captures[0].starts[0], tokens[0].captures[0].ends[0]),
		(7, 10)
	);
	for token in &tokens[1..] {
		assert_eq!((token.captures[0].starts[0], token.captures[0].ends[0]), (-1, -1));
	}
	// The digits that failed to extend the third match fall out as static
	// text.
	assert!(view.to_string_lossy().ends_with("userID=456"));
}

#[test]
fn timestamped_events_split_on_newline_timestamp() {
	// A default-flavoured schema: timestamp, int, float, hex, a key-value
	// pair with a capture, and a catch-all has-number variable.
	let schema_text: String = format!(
		"{DEFAULT_DELIMITERS}\
		timestamp:\\d{{4}}\\-\\d{{2}}\\-\\d{{2}} \\d{{2}}:\\d{{2}}:\\d{{2}}\\.\\d{{3}}\n\
		int:\\-{{0,1}}[0-9]+\n\
		float:\\-{{0,1}}[0-9]+\\.[0-9]+\n\
		hex:[a-fA-F]+\n\
		keyValuePair:userID=(?<val>\\d+)\n\
		hasNumber:.*\\d.*\n"
	);
	let input: &str =
		"2012-12-12 12:12:12.123 123 123.123 abc userID=123 text user123 \n2012-12-12 12:12:12.123";

	let events: Vec<(String, String, bool)> = parse_all_events(&schema_text, input);
	assert_eq!(events.len(), 2);

	let (raw, logtype, multiline): &(String, String, bool) = &events[0];
	assert_eq!(raw, "2012-12-12 12:12:12.123 123 123.123 abc userID=123 text user123 \n");
	assert_eq!(
		logtype,
		"<timestamp> <int> <float> <hex> userID=<val> text <hasNumber> \n"
	);
	assert!(!multiline);

	let (raw, logtype, _): &(String, String, bool) = &events[1];
	assert_eq!(raw, "2012-12-12 12:12:12.123");
	assert_eq!(logtype, "<timestamp>");
}

#[test]
fn timestamp_less_events_split_on_newline() {
	let schema_text: &str = "delimiters: \\n\nint:\\-{0,1}[0-9]+\n";
	let input: &str = "1234567\nText 1234567";

	let events: Vec<(String, String, bool)> = parse_all_events(schema_text, input);
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].0, "1234567\n");
	assert_eq!(events[0].1, "<int><newLine>");
	assert_eq!(events[1].0, "Text 1234567");
	assert_eq!(events[1].1, "Text <int>");
}

#[test]
fn events_concatenate_back_to_the_input() {
	let schema_text: String = format!("{DEFAULT_DELIMITERS}int:\\-{{0,1}}[0-9]+\nword:[a-z]+\n");
	let input: &str = "12 alpha\nbeta 34\n56 gamma\n";

	let events: Vec<(String, String, bool)> = parse_all_events(&schema_text, input);
	let concatenated: String = events.iter().map(|(raw, _, _)| raw.as_str()).collect::<String>();
	assert_eq!(concatenated, input);
}

#[test]
fn multiline_events_are_flagged() {
	let schema_text: String = format!(
		"{DEFAULT_DELIMITERS}timestamp:\\d{{4}}\\-\\d{{2}}\\-\\d{{2}} \\d{{2}}:\\d{{2}}:\\d{{2}}\n\
		int:\\-{{0,1}}[0-9]+\n"
	);
	let input: &str = "2024-01-01 10:00:00 11\nmore 22\n2024-01-01 10:00:01 33";

	let events: Vec<(String, String, bool)> = parse_all_events(&schema_text, input);
	assert_eq!(events.len(), 2);
	// Event one continues past its newline, so it is multi-line.
	assert!(events[0].0.contains('\n'));
	assert!(events[0].2);
	assert!(!events[1].2);
}

#[test]
fn newline_prefixed_variable_splits_events() {
	// In timestamp-less mode a token whose first byte is a newline signals
	// the start of the next event even when its type is not the newline
	// rule (the delimiter class includes the newline, so a variable can
	// swallow it).
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let input: &str = "abc\ndef";

	let events: Vec<(String, String, bool)> = parse_all_events(schema_text, input);
	assert_eq!(events.len(), 2);
	assert_eq!(events[0].0, "abc\n");
	assert_eq!(events[1].0, "def");
}

#[test]
fn buffer_parser_advances_offset_per_event() {
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let mut parser: BufferParser = BufferParser::from_schema(&schema).unwrap();

	let buf: &[u8] = b"abc\ndef\n";
	let mut offset: usize = 0;

	parser.parse_next_event(buf, &mut offset, true).unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "abc\n");
	assert_eq!(offset, 4);
	assert!(!parser.done());

	parser.parse_next_event(buf, &mut offset, true).unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "def\n");
	assert_eq!(offset, 8);
}

#[test]
fn buffer_parser_rewinds_on_incomplete_event() {
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let mut parser: BufferParser = BufferParser::from_schema(&schema).unwrap();

	// Without `finished_reading_input` the trailing bytes may be a partial
	// event, so parsing them must fail and leave the offset at the event
	// start for the caller to re-present.
	let buf: &[u8] = b"abc\ndef";
	let mut offset: usize = 0;
	parser.parse_next_event(buf, &mut offset, false).unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "abc\n");

	let err = parser.parse_next_event(buf, &mut offset, false).unwrap_err();
	assert_eq!(err, log_tailor::error::ErrorCode::BufferOutOfBounds);
	assert_eq!(offset, 4);

	// Re-present with the rest of the data.
	let buf: &[u8] = b"abc\ndefgh\n";
	parser.parse_next_event(buf, &mut offset, true).unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "defgh\n");
}

#[test]
fn small_ring_wraps_and_grows() {
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let input: &str = "abcde\nfghij\nklmno\n";
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> =
		ReaderParser::with_input_capacity(&schema, reader, 8).unwrap();

	let mut raws: Vec<String> = Vec::new();
	while !parser.done() {
		parser.parse_next_event().unwrap();
		let raw: String = parser.event_view().to_string_lossy();
		if raw.is_empty() && parser.done() {
			break;
		}
		raws.push(raw);
	}
	assert_eq!(raws, vec!["abcde\n", "fghij\n", "klmno\n"]);
}

#[test]
fn event_larger_than_ring_forces_growth() {
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let input: &str = "abcdefghijklmnopqrstuvwxyz\nabc\n";
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> =
		ReaderParser::with_input_capacity(&schema, reader, 8).unwrap();

	parser.parse_next_event().unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "abcdefghijklmnopqrstuvwxyz\n");
	parser.parse_next_event().unwrap();
	assert_eq!(parser.event_view().to_string_lossy(), "abc\n");
}

#[test]
fn deep_copy_owns_its_bytes() {
	let schema_text: String = format!("{DEFAULT_DELIMITERS}myVar:userID=(?<uid>123)\n");
	let schema: Schema = Schema::from_text(&schema_text).unwrap();
	let input: &str = "userID=123 userID=123";
	let reader: SliceReader<'_> = SliceReader::new(input.as_bytes());
	let mut parser: ReaderParser<SliceReader<'_>> = ReaderParser::from_schema(&schema, reader).unwrap();
	parser.parse_next_event().unwrap();

	let view = parser.event_view();
	let owned = view.deep_copy();
	assert_eq!(owned.to_string_lossy(), view.to_string_lossy());
	assert_eq!(owned.get_logtype(), view.get_logtype());
	assert_eq!(owned.tokens().len(), view.store().event_tokens().count());

	// Capture positions now index the owned buffer.
	let my_var_token = owned
		.tokens()
		.iter()
		.find(|event_token| !event_token.captures.is_empty())
		.unwrap();
	let start: usize = my_var_token.captures[0].starts[0] as usize;
	let end: usize = my_var_token.captures[0].ends[0] as usize;
	assert_eq!(&owned.bytes()[start..end], b"123");
}

#[test]
fn empty_input_finishes_immediately() {
	let schema_text: &str = "delimiters: \\n\nword:[a-z]+\n";
	let schema: Schema = Schema::from_text(schema_text).unwrap();
	let reader: SliceReader<'_> = SliceReader::new(b"");
	let mut parser: ReaderParser<SliceReader<'_>> = ReaderParser::from_schema(&schema, reader).unwrap();
	parser.parse_next_event().unwrap();
	assert!(parser.done());
	assert_eq!(parser.event_view().to_string_lossy(), "");
}
