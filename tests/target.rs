mod common;

use std::fs;
use std::path::Path;

use common::Machine;
use vm_translator::target::{compile, resolve, Unit};
use vm_translator::{Options, VmError};

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).expect("writing fixture");
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("reading output")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test_log::test]
fn file_target_writes_asm_beside_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Simple.vm");
    write(&source, "push constant 7\npush constant 8\nadd\n");

    let output = compile(&source, &Options::default()).unwrap();
    assert_eq!(output, dir.path().join("Simple.asm"));

    let lines = read_lines(&output);
    assert_eq!(lines[0], "// push constant 7");
    assert!(!lines.iter().any(|line| line == "@256"));
}

#[test]
fn no_comments_option_strips_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Plain.vm");
    write(&source, "push constant 1\n");

    let options = Options {
        annotate: false,
        ..Options::default()
    };
    let output = compile(&source, &options).unwrap();
    assert!(read_lines(&output).iter().all(|line| !line.starts_with("//")));
}

#[test]
fn directory_target_links_sorted_sources() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("Prog");
    fs::create_dir(&project).unwrap();
    write(&project.join("Sys.vm"), "function Sys.init 0\n");
    write(&project.join("Main.vm"), "function Main.main 0\n");
    write(&project.join("notes.txt"), "not a vm file\n");

    let unit = resolve(&project).unwrap();
    assert_eq!(
        unit,
        Unit {
            output: project.join("Prog.asm"),
            sources: vec![project.join("Main.vm"), project.join("Sys.vm")],
        }
    );
}

#[test_log::test]
fn directory_with_bootstrap_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("Twice");
    fs::create_dir(&project).unwrap();
    write(
        &project.join("Sys.vm"),
        "// entry point\n\
         function Sys.init 0\n\
         push constant 21\n\
         call Main.double 1\n\
         pop static 0\n\
         push static 0\n\
         label HALT\n\
         goto HALT\n",
    );
    write(
        &project.join("Main.vm"),
        "function Main.double 0\n\
         push argument 0\n\
         push argument 0\n\
         add\n\
         return\n",
    );

    let options = Options {
        bootstrap: true,
        ..Options::default()
    };
    let output = compile(&project, &options).unwrap();
    let lines = read_lines(&output);
    assert_eq!(lines[0], "// bootstrap");

    let mut machine = Machine::load(&lines);
    machine.run(100_000);
    assert_eq!(machine.top(), 42);
    assert_eq!(machine.peek(machine.symbol("Sys.0")), 42);
}

#[test]
fn asm_source_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Prog.asm");
    write(&source, "@0\n");

    match compile(&source, &Options::default()) {
        Err(VmError::WouldOverwrite(path)) => assert_eq!(path, source),
        other => panic!("expected WouldOverwrite, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&source).unwrap(), "@0\n");
}

#[test]
fn empty_directory_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        resolve(dir.path()),
        Err(VmError::NoSources(_))
    ));
}

#[test]
fn missing_target_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Nope.vm");
    assert!(matches!(compile(&missing, &Options::default()), Err(VmError::NotFound(_))));
}

#[test]
fn syntax_error_aborts_the_compile() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Bad.vm");
    write(&source, "push constant 1\npush constant\n");

    let err = compile(&source, &Options::default()).unwrap_err();
    assert_eq!(err.to_string(), "Bad: line 2: cannot parse `push constant`");
}
