//! Tagged determinization in the style of Borsotti & Trofimovich,
//! "A closer look at TDFA":
//! - <https://re2c.org/2022_borsotti_trofimovich_a_closer_look_at_tdfa.pdf>
//! - <https://arxiv.org/abs/2206.01398>

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::nfa::Nfa;
use crate::nfa::NfaStateId;
use crate::nfa::RuleId;
use crate::nfa::TagId;
use crate::nfa::TagOperation;
use crate::nfa::TagOperationKind;
use crate::nfa::serialize_byte;
use crate::prefix_tree::RegisterId;

#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct DfaStateId(u32);

#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub enum RegisterOperationKind {
	/// Record the current input position in the register.
	Set,
	/// Record the unmatched sentinel in the register.
	Negate,
	/// Share the source register's history.
	Copy(RegisterId),
}

#[derive(Debug, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub struct RegisterOperation {
	pub register: RegisterId,
	pub kind: RegisterOperationKind,
	/// For `Set`/`Negate`: append to the register's history instead of
	/// starting a fresh one. Derived from the tag, so it does not take part in
	/// the serialized form.
	pub multi_valued: bool,
}

#[derive(Debug, Clone)]
pub struct DfaTransition {
	pub reg_ops: Vec<RegisterOperation>,
	pub target: DfaStateId,
}

#[derive(Debug)]
pub struct DfaState {
	/// Rule IDs accepted here, ascending; the state is accepting iff this is
	/// non-empty, and the smallest ID wins a tie.
	matching_rules: Vec<RuleId>,
	/// Final register assignments for the highest-priority accepted rule,
	/// applied at each visit of this state during a scan.
	accepting_ops: Vec<RegisterOperation>,
	byte_transitions: Vec<Option<DfaTransition>>,
}

/// The result of determinizing a tagged [`Nfa`].
///
/// Register numbering: register `t` is tag `t`'s initial register and is never
/// written (an unmatched placeholder), `num_tags + t` is tag `t`'s final
/// register, and determinization allocates working registers from
/// `2 * num_tags` upward.
#[derive(Debug)]
pub struct Dfa {
	states: Vec<DfaState>,
	num_tags: u32,
	num_registers: u32,
}

/// An NFA state together with the register assignment and lookahead
/// tag-operation sequence that distinguish it inside one DFA state. `history`
/// records the operations materialized by the consuming transition that
/// produced the configuration; it is diagnostic only and takes no part in
/// state identity.
#[derive(Debug, Clone)]
struct Configuration {
	state: NfaStateId,
	/// Per tag: the register currently holding that tag's positions.
	registers: Vec<RegisterId>,
	/// Tag operations collected on spontaneous transitions since the last
	/// consuming transition.
	sequence: Vec<TagOperation>,
	history: Vec<TagOperation>,
}

type KernelKey = Vec<(NfaStateId, Vec<RegisterId>, Vec<TagOperation>)>;

struct Determinization<'nfa> {
	nfa: &'nfa Nfa,
	num_tags: u32,
	next_register: RegisterId,
	states: Vec<DfaState>,
	kernels: Vec<Vec<Configuration>>,
	kernel_ids: BTreeMap<KernelKey, DfaStateId>,
}

impl Dfa {
	pub fn determinize(nfa: &Nfa) -> Self {
		let num_tags: u32 = nfa.num_tags();
		let mut determinization: Determinization<'_> = Determinization {
			nfa,
			num_tags,
			next_register: 2 * num_tags,
			states: Vec::new(),
			kernels: Vec::new(),
			kernel_ids: BTreeMap::new(),
		};
		determinization.run();
		debug!(
			nfa_states = nfa.num_states(),
			dfa_states = determinization.states.len(),
			registers = determinization.next_register,
			"determinization finished"
		);
		Self {
			states: determinization.states,
			num_tags,
			num_registers: determinization.next_register,
		}
	}

	pub fn root(&self) -> DfaStateId {
		DfaStateId(0)
	}

	pub fn num_states(&self) -> usize {
		self.states.len()
	}

	pub fn num_tags(&self) -> u32 {
		self.num_tags
	}

	/// Total number of registers a scan needs, final registers included.
	pub fn num_registers(&self) -> u32 {
		self.num_registers
	}

	/// The register holding tag `tag`'s final positions once a match has been
	/// accepted.
	pub fn final_register(&self, tag: TagId) -> RegisterId {
		self.num_tags + tag
	}

	/// The set of rule IDs in `self` reachable by some input that `other`
	/// also accepts (with any rule). BFS over pairs of states; a pair accepts
	/// when both components do.
	pub fn intersect(&self, other: &Dfa) -> BTreeSet<RuleId> {
		let mut rules: BTreeSet<RuleId> = BTreeSet::new();
		let mut visited: BTreeSet<(DfaStateId, DfaStateId)> = BTreeSet::new();
		let mut stack: Vec<(DfaStateId, DfaStateId)> = vec![(self.root(), other.root())];
		visited.insert((self.root(), other.root()));

		while let Some((ours, theirs)) = stack.pop() {
			if !self[ours].matching_rules.is_empty() && !other[theirs].matching_rules.is_empty() {
				rules.extend(self[ours].matching_rules.iter().copied());
			}
			for byte in 0..=u8::MAX {
				let (Some(our_transition), Some(their_transition)) =
					(self[ours].transition(byte), other[theirs].transition(byte))
				else {
					continue;
				};
				let pair: (DfaStateId, DfaStateId) = (our_transition.target, their_transition.target);
				if visited.insert(pair) {
					stack.push(pair);
				}
			}
		}
		rules
	}

	pub fn serialize(&self) -> String {
		let mut buf: String = String::new();
		for (i, state) in self.states.iter().enumerate() {
			let _ = write!(buf, "{i}:");
			if !state.matching_rules.is_empty() {
				buf.push_str("accepting_tags={");
				for (j, rule) in state.matching_rules.iter().enumerate() {
					if j > 0 {
						buf.push(',');
					}
					let _ = write!(buf, "{rule}");
				}
				buf.push_str("},accepting_operations={");
				serialize_operations(&mut buf, &state.accepting_ops);
				buf.push_str("},");
			}
			buf.push_str("byte_transitions={");
			let mut first: bool = true;
			for byte in 0..=u8::MAX {
				let Some(transition) = state.transition(byte) else {
					continue;
				};
				if !first {
					buf.push(',');
				}
				first = false;
				serialize_byte(&mut buf, byte);
				buf.push_str("-(");
				serialize_operations(&mut buf, &transition.reg_ops);
				let _ = write!(buf, ")->{}", transition.target.0);
			}
			buf.push_str("}\n");
		}
		buf
	}
}

fn serialize_operations(buf: &mut String, ops: &[RegisterOperation]) {
	for (i, op) in ops.iter().enumerate() {
		if i > 0 {
			buf.push(',');
		}
		match &op.kind {
			RegisterOperationKind::Set => {
				let _ = write!(buf, "{}p", op.register);
			},
			RegisterOperationKind::Negate => {
				let _ = write!(buf, "{}n", op.register);
			},
			RegisterOperationKind::Copy(source) => {
				let _ = write!(buf, "{}c{}", op.register, source);
			},
		}
	}
}

impl DfaState {
	pub fn is_accepting(&self) -> bool {
		!self.matching_rules.is_empty()
	}

	pub fn matching_rules(&self) -> &[RuleId] {
		&self.matching_rules
	}

	pub fn accepting_ops(&self) -> &[RegisterOperation] {
		&self.accepting_ops
	}

	pub fn transition(&self, byte: u8) -> Option<&DfaTransition> {
		self.byte_transitions[byte as usize].as_ref()
	}
}

impl std::ops::Index<DfaStateId> for Dfa {
	type Output = DfaState;

	fn index(&self, i: DfaStateId) -> &Self::Output {
		&self.states[i.0 as usize]
	}
}

// The subset construction.
impl Determinization<'_> {
	fn run(&mut self) {
		let initial: Configuration = Configuration {
			state: self.nfa.root(),
			registers: (0..self.num_tags).collect::<Vec<_>>(),
			sequence: Vec::new(),
			history: Vec::new(),
		};
		let initial: Vec<(Configuration, Vec<TagOperation>)> =
			self.epsilon_closure(vec![(initial, Vec::new())]);
		let mut initial_ops: Vec<RegisterOperation> = Vec::new();
		self.add_state(initial, &mut initial_ops);
		debug_assert!(initial_ops.is_empty());

		// New states are appended while the loop runs.
		let mut i: usize = 0;
		while i < self.states.len() {
			let kernel: Vec<Configuration> = self.kernels[i].clone();
			let mut register_memo: BTreeMap<(TagId, Vec<TagOperation>, RegisterId), RegisterId> = BTreeMap::new();

			let mut outgoing_bytes: BTreeSet<u8> = BTreeSet::new();
			for config in kernel.iter() {
				outgoing_bytes.extend(self.nfa[config.state].outgoing_bytes());
			}

			for byte in outgoing_bytes.into_iter() {
				let stepped: Vec<(Configuration, Vec<TagOperation>)> = Self::step_on_byte(self.nfa, &kernel, byte);
				debug_assert!(!stepped.is_empty());
				let closed: Vec<(Configuration, Vec<TagOperation>)> = self.epsilon_closure(stepped);
				let (closed, mut reg_ops): (Vec<(Configuration, Vec<TagOperation>)>, Vec<RegisterOperation>) =
					self.transition_operations(closed, &mut register_memo);
				let target: DfaStateId = self.add_state(closed, &mut reg_ops);
				self.states[i].byte_transitions[byte as usize] = Some(DfaTransition {
					reg_ops,
					target,
				});
			}

			i += 1;
		}
	}

	/// Consuming step: follow `byte` out of every configuration, keeping the
	/// inherited lookahead sequence alongside so it can be turned into
	/// register operations. The first configuration to reach an NFA state
	/// claims it.
	fn step_on_byte(
		nfa: &Nfa,
		kernel: &[Configuration],
		byte: u8,
	) -> Vec<(Configuration, Vec<TagOperation>)> {
		let mut stepped: Vec<(Configuration, Vec<TagOperation>)> = Vec::new();
		let mut seen: BTreeSet<NfaStateId> = BTreeSet::new();

		for config in kernel.iter() {
			for &target in nfa[config.state].byte_targets(byte) {
				if !seen.insert(target) {
					continue;
				}
				stepped.push((
					Configuration {
						state: target,
						registers: config.registers.clone(),
						sequence: Vec::new(),
						history: config.sequence.clone(),
					},
					config.sequence.clone(),
				));
			}
		}
		stepped
	}

	/// Depth-first closure over spontaneous transitions, accumulating tag
	/// operations into each configuration's sequence. Only the first path to
	/// reach an NFA state is kept.
	fn epsilon_closure(
		&self,
		configurations: Vec<(Configuration, Vec<TagOperation>)>,
	) -> Vec<(Configuration, Vec<TagOperation>)> {
		let mut closure: Vec<(Configuration, Vec<TagOperation>)> = Vec::new();
		let mut visited: BTreeSet<NfaStateId> = configurations
			.iter()
			.map(|(config, _)| config.state)
			.collect::<BTreeSet<_>>();

		let mut stack: Vec<(Configuration, Vec<TagOperation>)> = configurations;
		stack.reverse();

		while let Some((config, inherited)) = stack.pop() {
			closure.push((config.clone(), inherited.clone()));

			for transition in self.nfa[config.state].spontaneous_transitions().iter() {
				if !visited.insert(transition.target) {
					continue;
				}
				let mut new_config: Configuration = config.clone();
				new_config.state = transition.target;
				new_config.sequence.extend(transition.tag_ops.iter().copied());
				stack.push((new_config, inherited.clone()));
			}
		}
		closure
	}

	/// Turns each configuration's inherited lookahead operations into register
	/// operations on the pending transition. Configurations with identical
	/// (tag, operations, source register) share a freshly allocated register;
	/// the memo is scoped to the source DFA state, so transitions on different
	/// bytes reuse registers consistently.
	fn transition_operations(
		&mut self,
		configurations: Vec<(Configuration, Vec<TagOperation>)>,
		register_memo: &mut BTreeMap<(TagId, Vec<TagOperation>, RegisterId), RegisterId>,
	) -> (Vec<(Configuration, Vec<TagOperation>)>, Vec<RegisterOperation>) {
		let mut reg_ops: Vec<RegisterOperation> = Vec::new();
		let mut new_configurations: Vec<(Configuration, Vec<TagOperation>)> = Vec::new();

		for (mut config, inherited) in configurations.into_iter() {
			for tag in 0..self.num_tags {
				let tag_ops: Vec<TagOperation> = inherited
					.iter()
					.filter(|op| op.tag == tag)
					.copied()
					.collect::<Vec<_>>();
				if tag_ops.is_empty() {
					continue;
				}
				let source: RegisterId = config.registers[tag as usize];
				let dest: RegisterId = *register_memo
					.entry((tag, tag_ops.clone(), source))
					.or_insert_with(|| {
						let register: RegisterId = self.next_register;
						self.next_register += 1;
						register
					});
				// The initial register is never written, so copying it is a
				// no-op and gets elided. Multi-valued operations append, so
				// their copy is kept even then: it restarts the history
				// rather than extending a previous scan's.
				if source != tag || tag_ops[0].multi_valued {
					push_unique(
						&mut reg_ops,
						RegisterOperation {
							register: dest,
							kind: RegisterOperationKind::Copy(source),
							multi_valued: false,
						},
					);
				}
				for op in tag_ops.into_iter() {
					push_unique(&mut reg_ops, materialize(dest, op));
				}
				config.registers[tag as usize] = dest;
			}
			new_configurations.push((config, inherited));
		}

		(new_configurations, reg_ops)
	}

	/// Adds a DFA state for the given closure, or returns an existing state:
	/// either an exact kernel match, or a state whose kernel differs from the
	/// new one by a register bijection, in which case the pending transition
	/// operations are rewritten into the existing state's register names.
	fn add_state(
		&mut self,
		configurations: Vec<(Configuration, Vec<TagOperation>)>,
		reg_ops: &mut Vec<RegisterOperation>,
	) -> DfaStateId {
		let mut kernel: Vec<Configuration> = configurations
			.into_iter()
			.map(|(config, _)| config)
			.collect::<Vec<_>>();
		kernel.sort_by_key(|config| config.state);

		let key: KernelKey = Self::kernel_key(&kernel);
		if let Some(&id) = self.kernel_ids.get(&key) {
			return id;
		}

		for id in 0..self.kernels.len() {
			if let Some(new_ops) = self.try_map_onto(&kernel, &self.kernels[id], reg_ops.clone()) {
				*reg_ops = new_ops;
				return DfaStateId(id as u32);
			}
		}

		let (matching_rules, accepting_ops): (Vec<RuleId>, Vec<RegisterOperation>) = self.acceptance(&kernel);
		let id: DfaStateId = DfaStateId(self.states.len() as u32);
		self.states.push(DfaState {
			matching_rules,
			accepting_ops,
			byte_transitions: (0..256).map(|_| None).collect::<Vec<_>>(),
		});
		self.kernels.push(kernel);
		self.kernel_ids.insert(key, id);
		id
	}

	fn kernel_key(kernel: &[Configuration]) -> KernelKey {
		kernel
			.iter()
			.map(|config| (config.state, config.registers.clone(), config.sequence.clone()))
			.collect::<Vec<_>>()
	}

	/// Accepting rules plus the final register operations of the
	/// highest-priority accepting configuration.
	fn acceptance(&self, kernel: &[Configuration]) -> (Vec<RuleId>, Vec<RegisterOperation>) {
		let mut matching_rules: BTreeSet<RuleId> = BTreeSet::new();
		let mut best: Option<(RuleId, &Configuration)> = None;
		for config in kernel.iter() {
			let Some(rule) = self.nfa[config.state].accepting_rule() else {
				continue;
			};
			matching_rules.insert(rule);
			if best.map_or(true, |(best_rule, _)| rule < best_rule) {
				best = Some((rule, config));
			}
		}

		let mut accepting_ops: Vec<RegisterOperation> = Vec::new();
		if let Some((_, config)) = best {
			for tag in 0..self.num_tags {
				let final_register: RegisterId = self.num_tags + tag;
				let source: RegisterId = config.registers[tag as usize];
				let tag_ops: Vec<TagOperation> = config
					.sequence
					.iter()
					.filter(|op| op.tag == tag)
					.copied()
					.collect::<Vec<_>>();
				if tag_ops.is_empty() {
					accepting_ops.push(RegisterOperation {
						register: final_register,
						kind: RegisterOperationKind::Copy(source),
						multi_valued: false,
					});
				} else {
					// As with transitions, multi-valued operations keep the
					// copy so each accept rebuilds the final history instead
					// of appending to a stale one.
					if source != tag || tag_ops[0].multi_valued {
						accepting_ops.push(RegisterOperation {
							register: final_register,
							kind: RegisterOperationKind::Copy(source),
							multi_valued: false,
						});
					}
					for op in tag_ops.into_iter() {
						accepting_ops.push(materialize(final_register, op));
					}
				}
			}
		}

		(matching_rules.into_iter().collect::<Vec<_>>(), accepting_ops)
	}

	/// Checks whether `kernel` is `other` up to a bijection of registers; on
	/// success returns the transition operations rewritten into `other`'s
	/// register names, extended with the copies the mapping requires.
	fn try_map_onto(
		&self,
		kernel: &[Configuration],
		other: &[Configuration],
		mut reg_ops: Vec<RegisterOperation>,
	) -> Option<Vec<RegisterOperation>> {
		if kernel.len() != other.len() {
			return None;
		}

		// Both kernels are sorted by NFA state; require the same states with
		// the same lookahead sequences, position by position.
		let mut ours_to_theirs: BTreeMap<RegisterId, RegisterId> = BTreeMap::new();
		let mut theirs_to_ours: BTreeMap<RegisterId, RegisterId> = BTreeMap::new();
		for (ours, theirs) in kernel.iter().zip(other.iter()) {
			if ours.state != theirs.state || ours.sequence != theirs.sequence {
				return None;
			}
			for tag in 0..self.num_tags as usize {
				let i: RegisterId = ours.registers[tag];
				let j: RegisterId = theirs.registers[tag];
				match (ours_to_theirs.get(&i), theirs_to_ours.get(&j)) {
					(None, None) => {
						ours_to_theirs.insert(i, j);
						theirs_to_ours.insert(j, i);
					},
					(Some(&mapped), Some(&mapped_back)) => {
						if mapped != j || mapped_back != i {
							return None;
						}
					},
					_ => {
						return None;
					},
				}
			}
		}

		// Rewrite the pending operations' destinations into the other
		// kernel's register names.
		let mut mapped_destinations: BTreeSet<RegisterId> = BTreeSet::new();
		for op in reg_ops.iter_mut() {
			let mapped: RegisterId = *ours_to_theirs.get(&op.register)?;
			mapped_destinations.insert(op.register);
			op.register = mapped;
		}
		if reg_ops
			.iter()
			.any(|op| matches!(op.kind, RegisterOperationKind::Copy(source) if source == op.register))
		{
			reg_ops.retain(|op| !matches!(op.kind, RegisterOperationKind::Copy(source) if source == op.register));
		}

		// Registers that simply need to move into the right name.
		for (&ours, &theirs) in ours_to_theirs.iter() {
			if ours == theirs || mapped_destinations.contains(&ours) {
				continue;
			}
			reg_ops.push(RegisterOperation {
				register: theirs,
				kind: RegisterOperationKind::Copy(ours),
				multi_valued: false,
			});
		}

		order_operations(reg_ops)
	}
}

fn materialize(register: RegisterId, op: TagOperation) -> RegisterOperation {
	RegisterOperation {
		register,
		kind: match op.kind {
			TagOperationKind::Set => RegisterOperationKind::Set,
			TagOperationKind::Negate => RegisterOperationKind::Negate,
		},
		multi_valued: op.multi_valued,
	}
}

fn push_unique(ops: &mut Vec<RegisterOperation>, op: RegisterOperation) {
	if !ops.contains(&op) {
		ops.push(op);
	}
}

/// Orders operations so every register is read before it is overwritten.
/// Operations sharing a destination form an atomic group whose internal order
/// is preserved. Returns `None` on a copy cycle.
fn order_operations(ops: Vec<RegisterOperation>) -> Option<Vec<RegisterOperation>> {
	let mut groups: Vec<(RegisterId, Vec<RegisterOperation>)> = Vec::new();
	for op in ops.into_iter() {
		if let Some(group) = groups.iter_mut().find(|(register, _)| *register == op.register) {
			group.1.push(op);
		} else {
			groups.push((op.register, vec![op]));
		}
	}

	let reads = |group: &[RegisterOperation]| -> Vec<RegisterId> {
		group
			.iter()
			.filter_map(|op| match op.kind {
				RegisterOperationKind::Copy(source) => Some(source),
				_ => None,
			})
			.collect::<Vec<_>>()
	};

	let mut ordered: Vec<RegisterOperation> = Vec::new();
	while !groups.is_empty() {
		let ready: Option<usize> = groups.iter().position(|(register, _)| {
			groups
				.iter()
				.all(|(other, group)| other == register || !reads(group).contains(register))
		});
		let (_, group): (RegisterId, Vec<RegisterOperation>) = groups.remove(ready?);
		ordered.extend(group);
	}
	Some(ordered)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::regex::RegexAst;

	fn dfa_for(patterns: &[&str]) -> Dfa {
		let mut nfa: Nfa = Nfa::new();
		for (i, pattern) in patterns.iter().enumerate() {
			nfa.add_rule(i as RuleId, &RegexAst::from_pattern(pattern).unwrap());
		}
		Dfa::determinize(&nfa)
	}

	#[test]
	fn no_capture_linear() {
		let dfa: Dfa = dfa_for(&["userID=123"]);
		let expected: &str = "0:byte_transitions={u-()->1}\n\
			1:byte_transitions={s-()->2}\n\
			2:byte_transitions={e-()->3}\n\
			3:byte_transitions={r-()->4}\n\
			4:byte_transitions={I-()->5}\n\
			5:byte_transitions={D-()->6}\n\
			6:byte_transitions={=-()->7}\n\
			7:byte_transitions={1-()->8}\n\
			8:byte_transitions={2-()->9}\n\
			9:byte_transitions={3-()->10}\n\
			10:accepting_tags={0},accepting_operations={},byte_transitions={}\n";
		assert_eq!(dfa.serialize(), expected);
	}

	#[test]
	fn no_capture_alternation() {
		let dfa: Dfa = dfa_for(&["Z|(A[abcd]B\\d+C)"]);
		let expected: &str = "0:byte_transitions={A-()->1,Z-()->2}\n\
			1:byte_transitions={a-()->3,b-()->3,c-()->3,d-()->3}\n\
			2:accepting_tags={0},accepting_operations={},byte_transitions={}\n\
			3:byte_transitions={B-()->4}\n\
			4:byte_transitions={0-()->5,1-()->5,2-()->5,3-()->5,4-()->5,5-()->5,6-()->5,7-()->5,\
			8-()->5,9-()->5}\n\
			5:byte_transitions={0-()->5,1-()->5,2-()->5,3-()->5,4-()->5,5-()->5,6-()->5,7-()->5,\
			8-()->5,9-()->5,C-()->2}\n";
		assert_eq!(dfa.serialize(), expected);
	}

	#[test]
	fn capture() {
		let dfa: Dfa = dfa_for(&["userID=(?<uID>123)"]);
		let expected: &str = "0:byte_transitions={u-()->1}\n\
			1:byte_transitions={s-()->2}\n\
			2:byte_transitions={e-()->3}\n\
			3:byte_transitions={r-()->4}\n\
			4:byte_transitions={I-()->5}\n\
			5:byte_transitions={D-()->6}\n\
			6:byte_transitions={=-()->7}\n\
			7:byte_transitions={1-(4p)->8}\n\
			8:byte_transitions={2-()->9}\n\
			9:byte_transitions={3-()->10}\n\
			10:accepting_tags={0},accepting_operations={2c4,3p},byte_transitions={}\n";
		assert_eq!(dfa.serialize(), expected);
	}

	#[test]
	fn int_var() {
		let dfa: Dfa = dfa_for(&["\\-{0,1}\\d+"]);
		let expected: &str = "0:byte_transitions={--()->1,0-()->2,1-()->2,2-()->2,3-()->2,4-()->2,5-()->2,6-()->2,7-\
			()->2,8-()->2,9-()->2}\n\
			1:byte_transitions={0-()->2,1-()->2,2-()->2,3-()->2,4-()->2,5-()->2,6-()->2,7-()->2,8-\
			()->2,9-()->2}\n\
			2:accepting_tags={0},accepting_operations={},byte_transitions={0-()->2,1-()->2,2-()->\
			2,3-()->2,4-()->2,5-()->2,6-()->2,7-()->2,8-()->2,9-()->2}\n";
		assert_eq!(dfa.serialize(), expected);
	}

	#[test]
	fn kv_pair_capture() {
		let dfa: Dfa = dfa_for(&["[A]+=(?<val>[=AB]*A[=AB]*)"]);
		let expected: &str = "0:byte_transitions={A-()->1}\n\
			1:byte_transitions={=-()->2,A-()->1}\n\
			2:byte_transitions={=-(4p)->3,A-(4p)->4,B-(4p)->3}\n\
			3:byte_transitions={=-()->3,A-()->4,B-()->3}\n\
			4:accepting_tags={0},accepting_operations={2c4,3p},byte_transitions={=-()->5,A-()->4,\
			B-()->5}\n\
			5:accepting_tags={0},accepting_operations={2c4,3p},byte_transitions={=-()->5,A-()->4,\
			B-()->5}\n";
		assert_eq!(dfa.serialize(), expected);
	}

	#[test]
	fn priority_prefers_earlier_rule() {
		let dfa: Dfa = dfa_for(&["abc", "abc", "ab"]);
		let serialized: String = dfa.serialize();
		// "ab" accepts alone at its length; "abc" ties between rules 0 and 1.
		assert!(serialized.contains("accepting_tags={2}"), "{serialized}");
		assert!(serialized.contains("accepting_tags={0,1}"), "{serialized}");
	}

	#[test]
	fn intersect_finds_shared_language() {
		let lexer_dfa: Dfa = dfa_for(&["\\d+", "[a-z]+", "[a-z]+\\d"]);
		let search_dfa: Dfa = dfa_for(&["[a-z0-9]*1"]);
		// "1" is all digits and ends in 1 (rule 0); "a1" fits rule 2; a pure
		// letter string can never end in '1'.
		let rules: BTreeSet<RuleId> = lexer_dfa.intersect(&search_dfa);
		assert_eq!(rules, BTreeSet::from([0, 2]));
	}

	#[test]
	fn intersect_with_disjoint_language_is_empty() {
		let lexer_dfa: Dfa = dfa_for(&["[a-z]+"]);
		let search_dfa: Dfa = dfa_for(&["\\d+"]);
		assert!(lexer_dfa.intersect(&search_dfa).is_empty());
	}

	#[test]
	fn order_operations_respects_reads() {
		// 5 := 4 must run before 4 := 3.
		let ops: Vec<RegisterOperation> = vec![
			RegisterOperation {
				register: 4,
				kind: RegisterOperationKind::Copy(3),
				multi_valued: false,
			},
			RegisterOperation {
				register: 5,
				kind: RegisterOperationKind::Copy(4),
				multi_valued: false,
			},
		];
		let ordered: Vec<RegisterOperation> = order_operations(ops).unwrap();
		assert_eq!(ordered[0].register, 5);
		assert_eq!(ordered[1].register, 4);
	}

	#[test]
	fn order_operations_rejects_cycles() {
		let ops: Vec<RegisterOperation> = vec![
			RegisterOperation {
				register: 4,
				kind: RegisterOperationKind::Copy(5),
				multi_valued: false,
			},
			RegisterOperation {
				register: 5,
				kind: RegisterOperationKind::Copy(4),
				multi_valued: false,
			},
		];
		assert!(order_operations(ops).is_none());
	}

	#[test]
	fn multi_valued_capture_repeats_registers() {
		let dfa: Dfa = dfa_for(&["([a]+=(?<val>1+),)+"]);
		// Every multi-valued set is preceded by a copy (4c0, 5c1, 6c4) that
		// restarts the register's history, so one scan cannot extend a
		// previous scan's positions. The second iteration's set lands on a
		// fresh register seeded from the first (6c4,6p), and closing the loop
		// carries it back into the first iteration's register (5p,4c6) so the
		// accepting copies (2c4,3c5) see every occurrence.
		let expected: &str = "0:byte_transitions={a-()->1}\n\
			1:byte_transitions={=-()->2,a-()->1}\n\
			2:byte_transitions={1-(4c0,4p)->3}\n\
			3:byte_transitions={,-(5c1,5p)->4,1-()->3}\n\
			4:accepting_tags={0},accepting_operations={2c4,3c5},byte_transitions={a-()->5}\n\
			5:byte_transitions={=-()->6,a-()->5}\n\
			6:byte_transitions={1-(6c4,6p)->7}\n\
			7:byte_transitions={,-(5p,4c6)->4,1-()->7}\n";
		assert_eq!(dfa.serialize(), expected);
	}
}
