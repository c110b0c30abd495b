/// Position value stored in prefix tree nodes; `-1` marks "unmatched".
pub type Position = i32;

pub const UNMATCHED_POSITION: Position = -1;

/// Index of a node inside a [`PrefixTree`].
pub type NodeId = u32;

/// Index of a register inside a [`RegisterHandler`].
pub type RegisterId = u32;

/// An append-only tree of positions. Each node stores the position at which a
/// tag was matched plus the node of the previous match of the same tag, so a
/// path from any node to the root is the reversed history of one register.
///
/// Nodes are never removed; registers re-point, append children, or rewrite a
/// node's position, keeping the tree monotone for the lifetime of a scan.
#[derive(Debug, Clone)]
pub struct PrefixTree {
	nodes: Vec<PrefixTreeNode>,
}

#[derive(Debug, Clone, Copy)]
struct PrefixTreeNode {
	predecessor: NodeId,
	position: Position,
}

impl PrefixTree {
	pub const ROOT: NodeId = 0;

	pub fn new() -> Self {
		Self {
			nodes: vec![PrefixTreeNode {
				predecessor: Self::ROOT,
				position: UNMATCHED_POSITION,
			}],
		}
	}

	/// Appends a node and returns its id.
	///
	/// # Panics
	/// If `predecessor` is out of range.
	pub fn insert(&mut self, predecessor: NodeId, position: Position) -> NodeId {
		assert!(
			(predecessor as usize) < self.nodes.len(),
			"prefix tree predecessor index out of range"
		);
		self.nodes.push(PrefixTreeNode { predecessor, position });
		(self.nodes.len() - 1) as NodeId
	}

	/// Rewrites an existing node's position.
	///
	/// # Panics
	/// If `node` is out of range.
	pub fn set(&mut self, node: NodeId, position: Position) {
		assert!((node as usize) < self.nodes.len(), "prefix tree index out of range");
		self.nodes[node as usize].position = position;
	}

	/// Walks the predecessor chain from `node`, returning positions tip to
	/// root. The root itself is excluded, so a register still pointing at the
	/// root yields an empty history.
	///
	/// # Panics
	/// If `node` is out of range.
	pub fn get_reversed_positions(&self, node: NodeId) -> Vec<Position> {
		assert!((node as usize) < self.nodes.len(), "prefix tree index out of range");
		let mut reversed_positions: Vec<Position> = Vec::new();
		let mut current: NodeId = node;
		while current != Self::ROOT {
			let node: PrefixTreeNode = self.nodes[current as usize];
			reversed_positions.push(node.position);
			current = node.predecessor;
		}
		reversed_positions
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Rewrites every recorded position; the unmatched sentinel is left
	/// alone. Used when buffer growth re-linearizes the ring the positions
	/// index into.
	pub fn remap_positions(&mut self, remap: impl Fn(Position) -> Position) {
		for node in self.nodes.iter_mut().skip(1) {
			if node.position != UNMATCHED_POSITION {
				node.position = remap(node.position);
			}
		}
	}
}

/// Owns a [`PrefixTree`] plus the registers naming leaves in it, and performs
/// the set/copy/append operations the DFA emits.
///
/// A fresh register points at the tree root, which denotes "unmatched".
#[derive(Debug, Clone)]
pub struct RegisterHandler {
	prefix_tree: PrefixTree,
	registers: Vec<NodeId>,
}

impl RegisterHandler {
	pub fn new() -> Self {
		Self {
			prefix_tree: PrefixTree::new(),
			registers: Vec::new(),
		}
	}

	pub fn add_registers(&mut self, count: u32) {
		for _ in 0..count {
			self.add_register();
		}
	}

	pub fn add_register(&mut self) -> RegisterId {
		self.registers.push(PrefixTree::ROOT);
		(self.registers.len() - 1) as RegisterId
	}

	/// Starts a fresh single-position history for `register`.
	pub fn set_register(&mut self, register: RegisterId, position: Position) {
		let node: NodeId = self.prefix_tree.insert(PrefixTree::ROOT, position);
		*self.register_mut(register) = node;
	}

	/// `dest` now shares `source`'s history.
	pub fn copy_register(&mut self, dest: RegisterId, source: RegisterId) {
		let node: NodeId = self.register(source);
		*self.register_mut(dest) = node;
	}

	/// Extends `register`'s history with one more position; used for captures
	/// inside repetition, where every occurrence must be retained.
	pub fn append_position(&mut self, register: RegisterId, position: Position) {
		let node: NodeId = self.prefix_tree.insert(self.register(register), position);
		*self.register_mut(register) = node;
	}

	/// Positions recorded for `register`, most recent first; empty when the
	/// register was never written.
	pub fn get_reversed_positions(&self, register: RegisterId) -> Vec<Position> {
		self.prefix_tree.get_reversed_positions(self.register(register))
	}

	pub fn num_registers(&self) -> u32 {
		self.registers.len() as u32
	}

	/// Drops the scan's accumulated history; registers keep existing but
	/// revert to unmatched.
	pub fn reset(&mut self) {
		self.prefix_tree = PrefixTree::new();
		for register in self.registers.iter_mut() {
			*register = PrefixTree::ROOT;
		}
	}

	/// See [`PrefixTree::remap_positions`].
	pub fn remap_positions(&mut self, remap: impl Fn(Position) -> Position) {
		self.prefix_tree.remap_positions(remap);
	}

	fn register(&self, register: RegisterId) -> NodeId {
		*self
			.registers
			.get(register as usize)
			.unwrap_or_else(|| panic!("register {register} out of range"))
	}

	fn register_mut(&mut self, register: RegisterId) -> &mut NodeId {
		let len: usize = self.registers.len();
		self.registers
			.get_mut(register as usize)
			.unwrap_or_else(|| panic!("register {register} out of range (have {len})"))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn reversed_positions_walk_to_root() {
		let mut tree: PrefixTree = PrefixTree::new();
		let a: NodeId = tree.insert(PrefixTree::ROOT, 4);
		let b: NodeId = tree.insert(a, 7);
		let c: NodeId = tree.insert(b, 9);
		assert_eq!(tree.get_reversed_positions(c), vec![9, 7, 4]);
		assert_eq!(tree.get_reversed_positions(a), vec![4]);
		assert_eq!(tree.get_reversed_positions(PrefixTree::ROOT), Vec::<Position>::new());
	}

	#[test]
	fn set_rewrites_in_place() {
		let mut tree: PrefixTree = PrefixTree::new();
		let a: NodeId = tree.insert(PrefixTree::ROOT, 4);
		let b: NodeId = tree.insert(a, 7);
		tree.set(a, 5);
		assert_eq!(tree.get_reversed_positions(b), vec![7, 5]);
	}

	#[test]
	#[should_panic(expected = "out of range")]
	fn insert_checks_predecessor() {
		let mut tree: PrefixTree = PrefixTree::new();
		tree.insert(42, 0);
	}

	#[test]
	fn register_set_and_copy() {
		let mut handler: RegisterHandler = RegisterHandler::new();
		handler.add_registers(3);

		handler.set_register(0, 5);
		assert_eq!(handler.get_reversed_positions(0), vec![5]);
		handler.set_register(0, 10);
		assert_eq!(handler.get_reversed_positions(0), vec![10]);

		handler.copy_register(1, 0);
		assert_eq!(handler.get_reversed_positions(1), vec![10]);

		// Untouched registers have no history.
		assert_eq!(handler.get_reversed_positions(2), Vec::<Position>::new());
	}

	#[test]
	fn append_accumulates() {
		let mut handler: RegisterHandler = RegisterHandler::new();
		handler.add_registers(2);

		handler.append_position(0, 5);
		handler.append_position(0, 7);
		assert_eq!(handler.get_reversed_positions(0), vec![7, 5]);

		// Copy shares history; appending to the copy does not disturb the
		// original.
		handler.copy_register(1, 0);
		handler.append_position(1, 9);
		assert_eq!(handler.get_reversed_positions(1), vec![9, 7, 5]);
		assert_eq!(handler.get_reversed_positions(0), vec![7, 5]);
	}

	#[test]
	fn append_unmatched_sentinel() {
		let mut handler: RegisterHandler = RegisterHandler::new();
		handler.add_registers(1);
		handler.append_position(0, UNMATCHED_POSITION);
		assert_eq!(handler.get_reversed_positions(0), vec![-1]);
	}

	#[test]
	fn reset_reverts_to_unmatched() {
		let mut handler: RegisterHandler = RegisterHandler::new();
		handler.add_registers(2);
		handler.set_register(0, 3);
		handler.append_position(1, 8);
		handler.reset();
		assert_eq!(handler.num_registers(), 2);
		assert_eq!(handler.get_reversed_positions(0), Vec::<Position>::new());
		assert_eq!(handler.get_reversed_positions(1), Vec::<Position>::new());
	}

	#[test]
	#[should_panic(expected = "out of range")]
	fn register_bounds_are_checked() {
		let mut handler: RegisterHandler = RegisterHandler::new();
		handler.add_registers(1);
		handler.set_register(10, 5);
	}
}
