use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::fmt::Write as _;

use crate::interval_tree::Interval;
use crate::interval_tree::IntervalTree;
use crate::regex::RegexAst;

pub type TagId = u32;
pub type RuleId = u32;

#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct NfaStateId(u32);

impl std::fmt::Debug for NfaStateId {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt.debug_tuple("NfaStateId").field(&self.0).finish()
	}
}

#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum TagOperationKind {
	/// Record the current input position for the tag.
	Set,
	/// Mark the tag as not taken on this path.
	Negate,
}

#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct TagOperation {
	pub tag: TagId,
	pub kind: TagOperationKind,
	/// Repeated occurrences of the tag must all be retained (the capture sits
	/// inside a repetition).
	pub multi_valued: bool,
}

/// A zero-width transition. An empty `tag_ops` list is a plain epsilon move.
#[derive(Debug, Clone)]
pub struct SpontaneousTransition {
	pub tag_ops: Vec<TagOperation>,
	pub target: NfaStateId,
}

#[derive(Debug)]
pub struct NfaState {
	byte_transitions: [Vec<NfaStateId>; 256],
	/// Transitions for code points past the byte range. The byte-oriented
	/// determinization does not consume these; they are kept so group ranges
	/// above 0xFF survive construction and serialization.
	interval_transitions: IntervalTree<Vec<NfaStateId>>,
	spontaneous_transitions: Vec<SpontaneousTransition>,
	accepting_rule: Option<RuleId>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CaptureTags {
	pub start_tag: TagId,
	pub end_tag: TagId,
	pub multi_valued: bool,
}

/// A tagged NFA over bytes. One root state fans out to every rule's fragment;
/// each rule has its own accepting state labeled with the rule ID. Tag IDs are
/// allocated on first use of a capture name and are global to the automaton.
#[derive(Debug)]
pub struct Nfa {
	states: Vec<NfaState>,
	captures: BTreeMap<String, CaptureTags>,
	next_tag: TagId,
}

impl Nfa {
	pub fn new() -> Self {
		Self {
			states: vec![NfaState::empty()],
			captures: BTreeMap::new(),
			next_tag: 0,
		}
	}

	pub fn root(&self) -> NfaStateId {
		NfaStateId(0)
	}

	/// Compiles one rule's pattern into the automaton, fanning out from the
	/// root to a fresh accepting state.
	pub fn add_rule(&mut self, rule: RuleId, ast: &RegexAst) {
		let repeated: BTreeSet<&str> = ast.repeated_captures().into_iter().collect::<BTreeSet<_>>();
		let accept: NfaStateId = self.new_state();
		self[accept].accepting_rule = Some(rule);
		let root: NfaStateId = self.root();
		self.build(ast, &repeated, root, accept);
	}

	pub fn num_tags(&self) -> u32 {
		self.next_tag
	}

	pub fn captures(&self) -> &BTreeMap<String, CaptureTags> {
		&self.captures
	}

	pub fn num_states(&self) -> usize {
		self.states.len()
	}

	fn new_state(&mut self) -> NfaStateId {
		let idx: NfaStateId = NfaStateId(self.states.len() as u32);
		self.states.push(NfaState::empty());
		idx
	}

	fn get_or_create_tag_pair(&mut self, name: &str, multi_valued: bool) -> CaptureTags {
		if let Some(&tags) = self.captures.get(name) {
			return tags;
		}
		let tags: CaptureTags = CaptureTags {
			start_tag: self.next_tag,
			end_tag: self.next_tag + 1,
			multi_valued,
		};
		self.next_tag += 2;
		self.captures.insert(name.to_owned(), tags);
		tags
	}

	fn build(&mut self, ast: &RegexAst, repeated: &BTreeSet<&str>, current: NfaStateId, target: NfaStateId) {
		match ast {
			&RegexAst::Literal(ch) => {
				self.add_interval(current, Interval::new(ch, ch), target);
			},
			RegexAst::Group { .. } => {
				for interval in ast.group_intervals() {
					self.add_interval(current, interval, target);
				}
			},
			RegexAst::Cat(left, right) => {
				let middle: NfaStateId = self.new_state();
				self.build(left, repeated, current, middle);
				self.build(right, repeated, middle, target);
			},
			RegexAst::Or(left, right) => {
				self.build_branch(left, right, repeated, current, target);
				self.build_branch(right, left, repeated, current, target);
			},
			&RegexAst::Multiplication { min, max, ref item } => {
				self.build_multiplication(item, repeated, min, max, current, target);
			},
			RegexAst::Capture { name, item } => {
				let tags: CaptureTags = self.get_or_create_tag_pair(name, repeated.contains(name.as_str()));
				let body_start: NfaStateId = self.new_state();
				let body_end: NfaStateId = self.new_state();
				self[current].spontaneous_transitions.push(SpontaneousTransition {
					tag_ops: vec![TagOperation {
						tag: tags.start_tag,
						kind: TagOperationKind::Set,
						multi_valued: tags.multi_valued,
					}],
					target: body_start,
				});
				self.build(item, repeated, body_start, body_end);
				self[body_end].spontaneous_transitions.push(SpontaneousTransition {
					tag_ops: vec![TagOperation {
						tag: tags.end_tag,
						kind: TagOperationKind::Set,
						multi_valued: tags.multi_valued,
					}],
					target,
				});
			},
		}
	}

	/// One branch of an alternation. If the other branch contains captures,
	/// the branch ends with a spontaneous transition negating them, so that
	/// determinization knows those captures did not occur on this path.
	fn build_branch(
		&mut self,
		branch: &RegexAst,
		other: &RegexAst,
		repeated: &BTreeSet<&str>,
		current: NfaStateId,
		target: NfaStateId,
	) {
		let other_captures: Vec<&str> = other.subtree_captures();
		if other_captures.is_empty() {
			self.build(branch, repeated, current, target);
			return;
		}

		let branch_end: NfaStateId = self.new_state();
		self.build(branch, repeated, current, branch_end);

		let mut tag_ops: Vec<TagOperation> = Vec::new();
		for name in other_captures.into_iter() {
			let tags: CaptureTags = self.get_or_create_tag_pair(name, repeated.contains(name));
			for tag in [tags.start_tag, tags.end_tag] {
				tag_ops.push(TagOperation {
					tag,
					kind: TagOperationKind::Negate,
					multi_valued: tags.multi_valued,
				});
			}
		}
		self[branch_end]
			.spontaneous_transitions
			.push(SpontaneousTransition { tag_ops, target });
	}

	/// `min` copies in sequence, then either a loop copy anchored on the exit
	/// state (unbounded, `max == 0`) or `max - min` optional copies that can
	/// each skip straight to the exit.
	fn build_multiplication(
		&mut self,
		item: &RegexAst,
		repeated: &BTreeSet<&str>,
		min: u32,
		max: u32,
		current: NfaStateId,
		target: NfaStateId,
	) {
		let mut current: NfaStateId = current;

		if max == 0 {
			let chained_copies: u32 = min.max(1);
			for i in 0..chained_copies {
				let next: NfaStateId = if i + 1 == chained_copies {
					target
				} else {
					self.new_state()
				};
				if min == 0 {
					// The single chained copy of an optional repetition is
					// itself skippable.
					self[current].spontaneous_transitions.push(SpontaneousTransition {
						tag_ops: Vec::new(),
						target: next,
					});
				}
				self.build(item, repeated, current, next);
				current = next;
			}
			self.build(item, repeated, target, target);
			return;
		}

		for i in 0..min {
			let next: NfaStateId = if i + 1 == min && min == max {
				target
			} else {
				self.new_state()
			};
			self.build(item, repeated, current, next);
			current = next;
		}

		for i in min..max {
			let next: NfaStateId = if i + 1 == max { target } else { self.new_state() };
			self[current].spontaneous_transitions.push(SpontaneousTransition {
				tag_ops: Vec::new(),
				target,
			});
			self.build(item, repeated, current, next);
			current = next;
		}
	}

	fn add_interval(&mut self, current: NfaStateId, interval: Interval, target: NfaStateId) {
		let mut start: u32 = interval.start();
		if start < 0x100 {
			let bound: u32 = interval.end().min(0xFF);
			for byte in start..=bound {
				self[current].byte_transitions[byte as usize].push(target);
			}
			start = 0x100;
		}
		if start <= interval.end() {
			self[current].interval_transitions.insert(
				Interval::new(start, interval.end()),
				vec![target],
				|existing, new| {
					let mut merged: Vec<NfaStateId> = existing.clone();
					merged.extend_from_slice(new);
					merged
				},
			);
		}
	}
}

// Serialization; the textual form is the ground truth for unit tests.
impl Nfa {
	/// States in breadth-first order from the root; determinization and
	/// serialization both use this ordering.
	pub fn bfs_order(&self) -> Vec<NfaStateId> {
		let mut queue: VecDeque<NfaStateId> = VecDeque::new();
		let mut visited: BTreeSet<NfaStateId> = BTreeSet::new();
		let mut order: Vec<NfaStateId> = Vec::new();

		queue.push_back(self.root());
		visited.insert(self.root());
		while let Some(current) = queue.pop_front() {
			order.push(current);
			let state: &NfaState = &self[current];
			for targets in state.byte_transitions.iter() {
				for &target in targets.iter() {
					if visited.insert(target) {
						queue.push_back(target);
					}
				}
			}
			for (_, targets) in state.interval_transitions.iter() {
				for &target in targets.iter() {
					if visited.insert(target) {
						queue.push_back(target);
					}
				}
			}
			for transition in state.spontaneous_transitions.iter() {
				if visited.insert(transition.target) {
					queue.push_back(transition.target);
				}
			}
		}
		order
	}

	pub fn serialize(&self) -> String {
		let order: Vec<NfaStateId> = self.bfs_order();
		let mut ids: BTreeMap<NfaStateId, usize> = BTreeMap::new();
		for (i, &state) in order.iter().enumerate() {
			ids.insert(state, i);
		}

		let mut buf: String = String::new();
		for &state_id in order.iter() {
			let state: &NfaState = &self[state_id];
			let _ = write!(buf, "{}:", ids[&state_id]);
			if let Some(rule) = state.accepting_rule {
				let _ = write!(buf, "accepting_tag={rule},");
			}
			buf.push_str("byte_transitions={");
			let mut first: bool = true;
			for (byte, targets) in state.byte_transitions.iter().enumerate() {
				for &target in targets.iter() {
					if !first {
						buf.push(',');
					}
					first = false;
					serialize_byte(&mut buf, byte as u8);
					let _ = write!(buf, "-->{}", ids[&target]);
				}
			}
			buf.push_str("},spontaneous_transition={");
			let mut first: bool = true;
			for transition in state.spontaneous_transitions.iter() {
				if !first {
					buf.push(',');
				}
				first = false;
				let _ = write!(buf, "{}[", ids[&transition.target]);
				for (i, op) in transition.tag_ops.iter().enumerate() {
					if i > 0 {
						buf.push(',');
					}
					buf.push_str(&op.serialize());
				}
				buf.push(']');
			}
			buf.push_str("}\n");
		}
		buf
	}
}

impl TagOperation {
	pub fn serialize(&self) -> String {
		format!(
			"{}{}{}",
			self.tag,
			match self.kind {
				TagOperationKind::Set => 'p',
				TagOperationKind::Negate => 'n',
			},
			if self.multi_valued { "+" } else { "" }
		)
	}
}

pub(crate) fn serialize_byte(buf: &mut String, byte: u8) {
	if (0x20..=0x7E).contains(&byte) {
		buf.push(char::from(byte));
	} else {
		let _ = write!(buf, "\\x{byte:02x}");
	}
}

impl NfaState {
	fn empty() -> Self {
		Self {
			byte_transitions: std::array::from_fn(|_| Vec::new()),
			interval_transitions: IntervalTree::new(),
			spontaneous_transitions: Vec::new(),
			accepting_rule: None,
		}
	}

	pub fn byte_targets(&self, byte: u8) -> &[NfaStateId] {
		&self.byte_transitions[byte as usize]
	}

	pub fn spontaneous_transitions(&self) -> &[SpontaneousTransition] {
		&self.spontaneous_transitions
	}

	pub fn accepting_rule(&self) -> Option<RuleId> {
		self.accepting_rule
	}

	/// Bytes with at least one outgoing consuming transition.
	pub fn outgoing_bytes(&self) -> impl Iterator<Item = u8> + '_ {
		self.byte_transitions
			.iter()
			.enumerate()
			.filter(|(_, targets)| !targets.is_empty())
			.map(|(byte, _)| byte as u8)
	}
}

impl std::ops::Index<NfaStateId> for Nfa {
	type Output = NfaState;

	fn index(&self, i: NfaStateId) -> &Self::Output {
		&self.states[i.0 as usize]
	}
}

impl std::ops::IndexMut<NfaStateId> for Nfa {
	fn index_mut(&mut self, i: NfaStateId) -> &mut Self::Output {
		&mut self.states[i.0 as usize]
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn nfa_for(pattern: &str) -> Nfa {
		let ast: RegexAst = RegexAst::from_pattern(pattern).unwrap();
		let mut nfa: Nfa = Nfa::new();
		nfa.add_rule(0, &ast);
		nfa
	}

	#[test]
	fn simple_capture() {
		let nfa: Nfa = nfa_for("userID=(?<uid>123)");
		let expected: &str = "0:byte_transitions={u-->1},spontaneous_transition={}\n\
			1:byte_transitions={s-->2},spontaneous_transition={}\n\
			2:byte_transitions={e-->3},spontaneous_transition={}\n\
			3:byte_transitions={r-->4},spontaneous_transition={}\n\
			4:byte_transitions={I-->5},spontaneous_transition={}\n\
			5:byte_transitions={D-->6},spontaneous_transition={}\n\
			6:byte_transitions={=-->7},spontaneous_transition={}\n\
			7:byte_transitions={},spontaneous_transition={8[0p]}\n\
			8:byte_transitions={1-->9},spontaneous_transition={}\n\
			9:byte_transitions={2-->10},spontaneous_transition={}\n\
			10:byte_transitions={3-->11},spontaneous_transition={}\n\
			11:byte_transitions={},spontaneous_transition={12[1p]}\n\
			12:accepting_tag=0,byte_transitions={},spontaneous_transition={}\n";
		assert_eq!(nfa.serialize(), expected);
	}

	#[test]
	fn alternation_negates_other_branch() {
		let nfa: Nfa = nfa_for("Z|(A(?<letter>((?<letter1>(a)|(b))|(?<letter2>(c)|(d))))B(?<containerID>\\d+)C)");
		// Tag allocation is inner-first: letter1 (0,1), letter2 (2,3),
		// letter (4,5), containerID (6,7).
		assert_eq!(
			nfa.captures().get("letter1"),
			Some(&CaptureTags {
				start_tag: 0,
				end_tag: 1,
				multi_valued: false,
			})
		);
		assert_eq!(nfa.captures().get("letter").map(|tags| tags.start_tag), Some(4));
		assert_eq!(nfa.captures().get("containerID").map(|tags| tags.end_tag), Some(7));

		let serialized: String = nfa.serialize();
		// The Z branch carries a negation for every capture of the other
		// branch; the other branch joins the accept state directly.
		assert!(serialized.contains("[0n,1n,2n,3n,4n,5n,6n,7n]"), "{serialized}");
		assert!(serialized.contains("[2n,3n]"), "{serialized}");
		assert!(serialized.contains("[0n,1n]"), "{serialized}");
	}

	#[test]
	fn repetition_marks_captures_multi_valued() {
		let nfa: Nfa = nfa_for("a*(?<one>1)+");
		let expected: &str = "0:byte_transitions={a-->1},spontaneous_transition={1[]}\n\
			1:byte_transitions={a-->1},spontaneous_transition={2[0p+]}\n\
			2:byte_transitions={1-->3},spontaneous_transition={}\n\
			3:byte_transitions={},spontaneous_transition={4[1p+]}\n\
			4:accepting_tag=0,byte_transitions={},spontaneous_transition={5[0p+]}\n\
			5:byte_transitions={1-->6},spontaneous_transition={}\n\
			6:byte_transitions={},spontaneous_transition={4[1p+]}\n";
		assert_eq!(nfa.serialize(), expected);
	}

	#[test]
	fn optional_capture_can_skip() {
		let nfa: Nfa = nfa_for("=(?<uid>1){0,1}");
		let serialized: String = nfa.serialize();
		// The optional copy is skippable via a plain epsilon move and the
		// capture stays single-valued.
		assert!(serialized.contains("[]"), "{serialized}");
		assert!(serialized.contains("[0p]"), "{serialized}");
		assert!(!serialized.contains("0p+"), "{serialized}");
	}

	#[test]
	fn bounded_repetition_chains_copies() {
		let nfa: Nfa = nfa_for("a{2,3}");
		let expected: &str = "0:byte_transitions={a-->1},spontaneous_transition={}\n\
			1:byte_transitions={a-->2},spontaneous_transition={}\n\
			2:byte_transitions={a-->3},spontaneous_transition={3[]}\n\
			3:accepting_tag=0,byte_transitions={},spontaneous_transition={}\n";
		assert_eq!(nfa.serialize(), expected);
	}

	#[test]
	fn multiple_rules_share_the_root() {
		let mut nfa: Nfa = Nfa::new();
		nfa.add_rule(0, &RegexAst::from_pattern("ab").unwrap());
		nfa.add_rule(1, &RegexAst::from_pattern("ac").unwrap());
		let serialized: String = nfa.serialize();
		assert!(serialized.contains("accepting_tag=0"), "{serialized}");
		assert!(serialized.contains("accepting_tag=1"), "{serialized}");
		// Both rules' fragments hang off state 0.
		assert!(serialized.starts_with("0:byte_transitions={a-->1,a-->2}"), "{serialized}");
	}

	#[test]
	fn wide_group_ranges_stay_off_the_byte_table() {
		let nfa: Nfa = nfa_for("[\\u{100}-\\u{200}]");
		// Nothing below 0x100 can consume, so the byte table of the root is
		// empty and the range lives in the interval transitions.
		let root: &NfaState = &nfa[nfa.root()];
		assert_eq!(root.outgoing_bytes().count(), 0);
		assert_eq!(root.interval_transitions.len(), 1);
	}

	#[test]
	fn non_printable_bytes_escape_in_serialized_form() {
		let nfa: Nfa = nfa_for("\\n");
		assert!(nfa.serialize().starts_with("0:byte_transitions={\\x0a-->1}"));
	}
}
