//! Translates VM stack-machine code into Hack assembly.
//!
//! The pipeline is `parser` (one source line to one [`ast::Command`]),
//! `translator` (commands to assembly, including the function call
//! protocol) and `linker` (one or more modules through a single
//! translator). `target` maps files and directories on disk onto that
//! pipeline.

pub mod ast;
pub mod error;
pub mod linker;
pub mod parser;
pub mod target;
pub mod translator;

pub use ast::{ArithmeticOp, Command, Line, Segment};
pub use error::{SyntaxError, UnsupportedOperation, VmError};
pub use linker::{link, link_to_lines, Module, Options};
pub use translator::Translator;
