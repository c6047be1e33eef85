use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Segment;

/// A source line that matches none of the command grammars.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("line {line}: cannot parse `{text}`")]
pub struct SyntaxError {
    pub line: usize,
    pub text: String,
}

/// A well-formed command the target machine cannot express.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnsupportedOperation {
    #[error("cannot pop into the constant segment")]
    PopConstant,

    #[error("constant {0} does not fit in an A-instruction (max 32767)")]
    ConstantOutOfRange(u16),

    #[error("index {index} is out of range for segment {segment}")]
    SegmentIndexOutOfRange { segment: Segment, index: u16 },

    #[error("call with {0} arguments cannot address its frame (max 32762)")]
    TooManyArguments(u16),
}

#[derive(Error, Debug)]
pub enum VmError {
    #[error("{module}: {source}")]
    Syntax {
        module: String,
        #[source]
        source: SyntaxError,
    },

    #[error("{module}: line {line}: `{command}`: {source}")]
    Unsupported {
        module: String,
        line: usize,
        command: String,
        #[source]
        source: UnsupportedOperation,
    },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to overwrite source file {}", .0.display())]
    WouldOverwrite(PathBuf),

    #[error("no .vm sources found in {}", .0.display())]
    NoSources(PathBuf),

    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),
}
