use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info, trace};

use crate::error::VmError;
#[cfg(test)]
use crate::error::{SyntaxError, UnsupportedOperation};
use crate::parser;
use crate::translator::Translator;

/// Knobs shared by every module of one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Emit the bootstrap (SP = 256, call Sys.init) ahead of the first module.
    pub bootstrap: bool,
    /// Precede each command's assembly with a `// <command>` comment.
    pub annotate: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            bootstrap: false,
            annotate: true,
        }
    }
}

/// One VM translation unit. Its name scopes the static segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub source: String,
}

impl Module {
    pub fn new(name: &str, source: &str) -> Self {
        Module {
            name: name.to_string(),
            source: source.to_string(),
        }
    }

    /// Reads a `.vm` file; the module is named after the file stem.
    pub fn from_path(path: &Path) -> Result<Self, VmError> {
        let source = fs::read_to_string(path).map_err(|source| VmError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Module { name, source })
    }
}

/// Translates every module through one translator, handing each emitted
/// line to `sink`. Stops at the first error, whether from translation or
/// from the sink.
fn link_with<F>(modules: &[Module], options: &Options, mut sink: F) -> Result<(), VmError>
where
    F: FnMut(&str) -> Result<(), VmError>,
{
    info!(
        "linking {} module(s), bootstrap: {}",
        modules.len(),
        options.bootstrap
    );

    let first = modules.first().map(|m| m.name.as_str()).unwrap_or_default();
    let mut translator = Translator::new(first).annotated(options.annotate);

    if options.bootstrap {
        for instruction in translator.init() {
            sink(&instruction)?;
        }
    }

    for module in modules {
        translator.set_module(&module.name);

        let lines = parser::parse(&module.source).map_err(|source| VmError::Syntax {
            module: module.name.clone(),
            source,
        })?;
        debug!("module {}: {} command(s)", module.name, lines.len());

        for line in &lines {
            trace!("{}:{}: {}", module.name, line.number, line.command);
            let translated =
                translator
                    .translate(&line.command)
                    .map_err(|source| VmError::Unsupported {
                        module: module.name.clone(),
                        line: line.number,
                        command: line.command.to_string(),
                        source,
                    })?;
            for instruction in translated {
                sink(&instruction)?;
            }
        }
    }

    Ok(())
}

/// Streams the linked program to `out`, one instruction per line.
/// `output` names the destination in write errors.
pub fn link<W: Write>(
    modules: &[Module],
    options: &Options,
    out: &mut W,
    output: &Path,
) -> Result<(), VmError> {
    link_with(modules, options, |instruction| {
        writeln!(out, "{}", instruction).map_err(|source| VmError::Write {
            path: output.to_path_buf(),
            source,
        })
    })
}

/// Links into memory; handy for tests and for embedding.
pub fn link_to_lines(modules: &[Module], options: &Options) -> Result<Vec<String>, VmError> {
    let mut instructions = vec![];
    link_with(modules, options, |instruction| {
        instructions.push(instruction.to_string());
        Ok(())
    })?;
    Ok(instructions)
}

#[cfg(test)]
fn plain() -> Options {
    Options {
        bootstrap: false,
        annotate: false,
    }
}

#[test]
fn bootstrap_is_emitted_once_before_any_module() {
    let modules = [
        Module::new("Main", "function Main.main 0\npush constant 1\nreturn\n"),
        Module::new("Sys", "function Sys.init 0\ncall Main.main 0\nreturn\n"),
    ];
    let options = Options {
        bootstrap: true,
        ..plain()
    };
    let lines = link_to_lines(&modules, &options).unwrap();

    assert_eq!(lines[0], "@256");
    assert_eq!(
        lines.iter().filter(|l| *l == "(Sys.init$ret.1)").count(),
        1
    );
    // call-site counter continues across modules
    assert!(lines.contains(&"(Main.main$ret.2)".to_string()));
}

#[test]
fn statics_are_namespaced_per_module() {
    let modules = [
        Module::new("A", "push constant 9\npop static 0\n"),
        Module::new("B", "push constant 9\npop static 0\n"),
    ];
    let lines = link_to_lines(&modules, &plain()).unwrap();
    assert!(lines.contains(&"@A.0".to_string()));
    assert!(lines.contains(&"@B.0".to_string()));
}

#[test]
fn comparison_counter_spans_modules() {
    let modules = [
        Module::new("A", "push constant 1\npush constant 2\neq\n"),
        Module::new("B", "push constant 1\npush constant 2\neq\n"),
    ];
    let lines = link_to_lines(&modules, &plain()).unwrap();
    assert!(lines.contains(&"(CMP$TRUE.1)".to_string()));
    assert!(lines.contains(&"(CMP$TRUE.2)".to_string()));
}

#[test]
fn syntax_errors_name_the_module() {
    let modules = [Module::new("Broken", "push constant 1\npush nowhere 3\n")];
    match link_to_lines(&modules, &plain()) {
        Err(VmError::Syntax { module, source }) => {
            assert_eq!(module, "Broken");
            assert_eq!(
                source,
                SyntaxError {
                    line: 2,
                    text: "push nowhere 3".to_string()
                }
            );
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn unsupported_operations_carry_line_and_command() {
    let modules = [Module::new("Main", "// pop into a literal\n\npop constant 4\n")];
    let err = link_to_lines(&modules, &plain()).unwrap_err();
    match &err {
        VmError::Unsupported {
            module,
            line,
            command,
            source,
        } => {
            assert_eq!(module, "Main");
            assert_eq!(*line, 3);
            assert_eq!(command, "pop constant 4");
            assert_eq!(*source, UnsupportedOperation::PopConstant);
        }
        other => panic!("expected an unsupported operation, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "Main: line 3: `pop constant 4`: cannot pop into the constant segment"
    );
}

#[test]
fn streams_to_writer() {
    let modules = [Module::new("Main", "push constant 2\nneg\n")];
    let mut out = Vec::new();
    link(&modules, &Options::default(), &mut out, Path::new("Main.asm")).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("// push constant 2\n@2\nD=A\n"));
    assert!(text.contains("// neg\n@SP\nA=M-1\nM=-M\n"));
}

#[test]
fn out_of_range_operands_abort_the_link() {
    let modules = [Module::new("Main", "push local 1\npush local 40000\n")];
    match link_to_lines(&modules, &plain()) {
        Err(VmError::Unsupported { line, source, .. }) => {
            assert_eq!(line, 2);
            assert!(matches!(
                source,
                UnsupportedOperation::SegmentIndexOutOfRange { index: 40000, .. }
            ));
        }
        other => panic!("expected an unsupported operation, got {:?}", other),
    }

    let modules = [Module::new("Main", "call Main.f 40000\n")];
    assert!(matches!(
        link_to_lines(&modules, &plain()),
        Err(VmError::Unsupported {
            source: UnsupportedOperation::TooManyArguments(40000),
            ..
        })
    ));
}
