#[macro_use(debug, trace)]
extern crate tracing;

pub mod buffer;
pub mod dfa;
pub mod error;
pub mod interval_tree;
pub mod lexer;
pub mod log_event;
pub mod nfa;
pub mod parser;
pub mod prefix_tree;
pub mod query;
pub mod regex;
pub mod schema;
pub mod token;
