use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{all_consuming, map, map_res, value, verify},
    sequence::tuple,
    IResult,
};

use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::SyntaxError;

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Constant, tag("constant")),
        value(Local, tag("local")),
        value(Static, tag("static")),
        value(Argument, tag("argument")),
        value(This, tag("this")),
        value(That, tag("that")),
        value(Pointer, tag("pointer")),
        value(Temp, tag("temp")),
    ))(input)
}

fn push(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("push"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Push(segment, arg),
    )(input)
}

#[test]
fn test_push() {
    assert_eq!(push("push  pointer  32"), Ok(("", Push(Pointer, 32))));
}

// `pop constant` is accepted here; the translator refuses to emit it
fn pop(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("pop"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Pop(segment, arg),
    )(input)
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            value(Add, tag("add")),
            value(Sub, tag("sub")),
            value(Neg, tag("neg")),
            value(Eq, tag("eq")),
            value(Gt, tag("gt")),
            value(Lt, tag("lt")),
            value(And, tag("and")),
            value(Or, tag("or")),
            value(Not, tag("not")),
        )),
        Arithmetic,
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Arithmetic(Neg))));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            |c: &str| !is_digit(c.as_bytes()[0]),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

#[test]
fn test_symbol() {
    assert_eq!(symbol("Main.fib$1:x"), Ok(("", "Main.fib$1:x".to_string())));
    assert!(symbol("9lives").is_err());
}

fn branching(input: &str) -> IResult<&str, Command> {
    alt((
        map(tuple((tag("label"), space1, symbol)), |(_, _, sym)| Label(sym)),
        map(tuple((tag("goto"), space1, symbol)), |(_, _, sym)| Goto(sym)),
        map(tuple((tag("if-goto"), space1, symbol)), |(_, _, sym)| {
            IfGoto(sym)
        }),
    ))(input)
}

fn function(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("function"), space1, symbol, space1, integer)),
        |(_, _, name, _, locals)| Function(name, locals),
    )(input)
}

#[test]
fn test_function() {
    assert_eq!(
        function("function Main.main 2"),
        Ok(("", Function("Main.main".to_string(), 2)))
    );
}

fn call(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("call"), space1, symbol, space1, integer)),
        |(_, _, name, _, args)| Call(name, args),
    )(input)
}

fn ret(input: &str) -> IResult<&str, Command> {
    value(Return, tag("return"))(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((push, pop, prim, branching, function, call, ret))(input)
}

/// Strips a trailing `//` comment and surrounding whitespace.
pub fn clean_line(line: &str) -> &str {
    line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim()
}

/// Classifies one cleaned line. The whole line must be consumed.
pub fn classify(number: usize, line: &str) -> Result<Command, SyntaxError> {
    all_consuming(command)(line)
        .map(|(_, command)| command)
        .map_err(|_| SyntaxError {
            line: number,
            text: line.to_string(),
        })
}

#[test]
fn test_classify_rejects_trailing_parts() {
    assert!(classify(1, "add 3").is_err());
    assert!(classify(1, "push constant 3 4").is_err());
    assert!(classify(1, "returns").is_err());
    assert_eq!(
        classify(7, "push constant 70000"),
        Err(SyntaxError {
            line: 7,
            text: "push constant 70000".to_string()
        })
    );
}

#[test]
fn test_classify_every_kind() {
    let cases = [
        ("sub", Arithmetic(Sub)),
        ("not", Arithmetic(Not)),
        ("pop local 0", Pop(Local, 0)),
        ("pop constant 1", Pop(Constant, 1)),
        ("push static 3", Push(Static, 3)),
        ("label LOOP_START", Label("LOOP_START".to_string())),
        ("goto END", Goto("END".to_string())),
        ("if-goto END", IfGoto("END".to_string())),
        ("call Math.multiply 2", Call("Math.multiply".to_string(), 2)),
        ("return", Return),
    ];
    for (line, expected) in cases {
        assert_eq!(classify(1, line), Ok(expected));
    }
}

/// Classifies every line of a source, skipping blank and comment-only lines.
pub fn parse(input: &str) -> Result<Vec<Line>, SyntaxError> {
    let mut lines = vec![];

    for (i, raw) in input.lines().enumerate() {
        let line = clean_line(raw);
        if line.is_empty() {
            continue;
        }

        let command = classify(i + 1, line).map_err(|err| SyntaxError {
            text: raw.trim().to_string(),
            ..err
        })?;
        lines.push(Line {
            number: i + 1,
            command,
        });
    }

    Ok(lines)
}

#[test]
fn test_parse_skips_comments_and_reports_line_numbers() {
    let source = "// header\n\n  push constant 7   // seven\n\tpush\tconstant 8\nadd\n";
    let lines = parse(source).unwrap();
    assert_eq!(
        lines,
        vec![
            Line { number: 3, command: Push(Constant, 7) },
            Line { number: 4, command: Push(Constant, 8) },
            Line { number: 5, command: Arithmetic(Add) },
        ]
    );

    let err = parse("push constant 1\nfrobnicate // what\n").unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.text, "frobnicate // what");
}
