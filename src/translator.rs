use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::UnsupportedOperation;

/// First address of the stack on the Hack platform
pub const STACK_BASE: u16 = 256;
/// Function the bootstrap hands control to
pub const ENTRY_FUNCTION: &str = "Sys.init";
/// Largest value a single A-instruction can load
pub const MAX_CONSTANT: u16 = 32767;

const TEMP_BASE: u16 = 5;
const TEMP_SIZE: u16 = 8;

// Scratch registers for pop addresses and the return protocol
const FRAME: &str = "R13";
const RETURN_ADDRESS: &str = "R14";

macro_rules! svec {
    ($($x:expr),* $(,)?) => (vec![$($x.to_string()),*]);
}

fn at_c(arg: &u16) -> String {
    format!("@{arg}", arg = arg)
}

fn at_s(arg: &str) -> String {
    format!("@{arg}", arg = arg)
}

fn def_s(label: &str) -> String {
    format!("({})", label)
}

fn pointer_arg(arg: &u16) -> Result<&'static str, UnsupportedOperation> {
    match arg {
        0 => Ok("THIS"),
        1 => Ok("THAT"),
        _ => Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Pointer,
            index: *arg,
        }),
    }
}

fn temp_arg(arg: &u16) -> Result<String, UnsupportedOperation> {
    if *arg < TEMP_SIZE {
        Ok(format!("R{}", TEMP_BASE + arg))
    } else {
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Temp,
            index: *arg,
        })
    }
}

/// Offsets into the pointer-based segments are loaded with one A-instruction.
fn base_arg<'a>(segment: &Segment, arg: &'a u16) -> Result<&'a u16, UnsupportedOperation> {
    if *arg <= MAX_CONSTANT {
        Ok(arg)
    } else {
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: *segment,
            index: *arg,
        })
    }
}

/// Push the value in D. Leaves A pointing at the new top of stack.
fn push_d() -> Vec<String> {
    svec![
        "@SP",
        "M=M+1",
        "A=M-1", // Don't need to refetch SP; this is safe
        "M=D"
    ]
}

/// Push microcode for the four pointer-based segments
fn seg_push(seg: &str, arg: &u16) -> Vec<String> {
    let mut code = svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "A=D+A", // A = SEG+arg
        "D=M"    // D = value to push
    ];
    code.extend(push_d());
    code
}

fn seg_push_direct(label: &str) -> Vec<String> {
    let mut code = svec![at_s(label), "D=M"];
    code.extend(push_d());
    code
}

fn seg_pop(seg: &str, arg: &u16) -> Vec<String> {
    svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "D=D+A", // D = SEG+arg
        at_s(FRAME),
        "M=D", // Store target addr in R13
        "@SP",
        "AM=M-1", // SP--, A <- new SP (val to be popped)
        "D=M",
        at_s(FRAME),
        "A=M", // At the target address...
        "M=D"  // ... store the popped val
    ]
}

fn seg_pop_direct(label: &str) -> Vec<String> {
    svec!["@SP", "AM=M-1", "D=M", at_s(label), "M=D"]
}

fn simple_un_op(comp: &str) -> Vec<String> {
    svec!["@SP", "A=M-1", format!("M={}", comp)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(comp: &str) -> Vec<String> {
    svec![
        "@SP",
        "AM=M-1",             // SP--, looking at top of stack now
        "D=M",                // Right arg in D
        "A=A-1",              // Looking at second arg of stack, will overwrite
        format!("M={}", comp) // Op and overwrite second element
    ]
}

/// Emits Hack assembly for VM commands.
///
/// One translator is shared by every module of a linked program so that the
/// generated comparison and return labels never collide.
pub struct Translator {
    module: String,
    function: String,
    comparisons: usize,
    call_sites: usize,
    annotate: bool,
}

impl Translator {
    pub fn new(module: &str) -> Self {
        Translator {
            module: module.to_string(),
            function: String::new(),
            comparisons: 0,
            call_sites: 0,
            annotate: false,
        }
    }

    /// Prefix each command's output with a `// <command>` comment.
    pub fn annotated(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Switch the namespace used for the static segment.
    pub fn set_module(&mut self, module: &str) {
        self.module = module.to_string();
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    fn next_comparison(&mut self) -> usize {
        self.comparisons += 1;
        self.comparisons
    }

    fn next_call_site(&mut self) -> usize {
        self.call_sites += 1;
        self.call_sites
    }

    fn static_sym(&self, arg: &u16) -> String {
        format!("{}.{}", self.module, arg)
    }

    fn push(&self, segment: &Segment, arg: &u16) -> Result<Vec<String>, UnsupportedOperation> {
        Ok(match segment {
            Constant => {
                if *arg > MAX_CONSTANT {
                    return Err(UnsupportedOperation::ConstantOutOfRange(*arg));
                }
                let mut code = svec![at_c(arg), "D=A"];
                code.extend(push_d());
                code
            }
            Local => seg_push("LCL", base_arg(segment, arg)?),
            Argument => seg_push("ARG", base_arg(segment, arg)?),
            This => seg_push("THIS", base_arg(segment, arg)?),
            That => seg_push("THAT", base_arg(segment, arg)?),
            Static => seg_push_direct(&self.static_sym(arg)),
            Temp => seg_push_direct(&temp_arg(arg)?),
            Pointer => seg_push_direct(pointer_arg(arg)?),
        })
    }

    fn pop(&self, segment: &Segment, arg: &u16) -> Result<Vec<String>, UnsupportedOperation> {
        Ok(match segment {
            Constant => return Err(UnsupportedOperation::PopConstant),
            Local => seg_pop("LCL", base_arg(segment, arg)?),
            Argument => seg_pop("ARG", base_arg(segment, arg)?),
            This => seg_pop("THIS", base_arg(segment, arg)?),
            That => seg_pop("THAT", base_arg(segment, arg)?),
            Static => seg_pop_direct(&self.static_sym(arg)),
            Temp => seg_pop_direct(&temp_arg(arg)?),
            Pointer => seg_pop_direct(pointer_arg(arg)?),
        })
    }

    fn compare(&mut self, jump: &str) -> Vec<String> {
        let sym = self.next_comparison();
        let true_sym = format!("CMP$TRUE.{}", sym);
        let end_sym = format!("CMP$END.{}", sym);
        svec![
            "@SP",
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at second arg of stack, will overwrite
            "D=M-D",
            at_s(&true_sym),
            format!("D;J{}", jump),
            "D=0",
            at_s(&end_sym),
            "0;JMP",
            def_s(&true_sym),
            "D=-1",
            def_s(&end_sym),
            "@SP",
            "A=M-1",
            "M=D"
        ]
    }

    fn arithmetic(&mut self, op: &ArithmeticOp) -> Vec<String> {
        match op {
            Not => simple_un_op("!M"),
            Neg => simple_un_op("-M"),
            Add => simple_bin_op("D+M"),
            Sub => simple_bin_op("M-D"),
            And => simple_bin_op("D&M"),
            Or => simple_bin_op("D|M"),
            Eq => self.compare("EQ"),
            Gt => self.compare("GT"),
            Lt => self.compare("LT"),
        }
    }

    /// Convert VM label to Hack ASM symbol, scoped to the enclosing function
    fn label_to_sym(&self, label: &str) -> String {
        format!("{}.{}", self.function, label)
    }

    fn label(&self, label: &str) -> Vec<String> {
        svec![def_s(&self.label_to_sym(label))]
    }

    fn goto(&self, label: &str) -> Vec<String> {
        svec![
            at_s(&self.label_to_sym(label)),
            "0;JMP" // Unconditional jump
        ]
    }

    fn if_goto(&self, label: &str) -> Vec<String> {
        svec![
            "@SP",
            "AM=M-1",
            "D=M", // Stack popped into D
            at_s(&self.label_to_sym(label)),
            "D;JNE" // False is 0
        ]
    }

    fn function_entry(&mut self, name: &str, locals: &u16) -> Vec<String> {
        self.function = name.to_string();

        let mut code = svec![def_s(name)];
        for _ in 0..*locals {
            code.extend(svec!["@SP", "M=M+1", "A=M-1", "M=0"]);
        }
        code
    }

    fn call(&mut self, name: &str, args: &u16) -> Result<Vec<String>, UnsupportedOperation> {
        // ARG = SP - args - 5 needs args + 5 as an A-instruction operand
        if *args > MAX_CONSTANT - 5 {
            return Err(UnsupportedOperation::TooManyArguments(*args));
        }
        Ok(self.call_sequence(name, args))
    }

    fn call_sequence(&mut self, name: &str, args: &u16) -> Vec<String> {
        let return_sym = format!("{}$ret.{}", name, self.next_call_site());

        let mut code = svec![at_s(&return_sym), "D=A"];
        code.extend(push_d());
        // Saved frame: return() reads these back at FRAME-4..FRAME-1
        for register in ["LCL", "ARG", "THIS", "THAT"] {
            code.extend(svec![at_s(register), "D=M"]);
            code.extend(push_d());
        }
        code.extend(svec![
            "@SP",
            "D=M",
            "@LCL",
            "M=D", // LCL = SP
            at_c(&(args + 5)),
            "D=D-A",
            "@ARG",
            "M=D", // ARG = SP - args - 5
            at_s(name),
            "0;JMP",
            def_s(&return_sym)
        ]);
        code
    }

    fn ret(&self) -> Vec<String> {
        svec![
            "@LCL",
            "D=M",
            at_s(FRAME),
            "M=D", // FRAME = LCL
            "@5",
            "A=D-A",
            "D=M",
            at_s(RETURN_ADDRESS),
            "M=D", // RET = *(FRAME-5)
            "@SP",
            "AM=M-1",
            "D=M",
            "@ARG",
            "A=M",
            "M=D", // *ARG = pop()
            "@ARG",
            "D=M+1",
            "@SP",
            "M=D", // SP = ARG+1
            at_s(FRAME),
            "AM=M-1",
            "D=M",
            "@THAT",
            "M=D", // THAT = *(FRAME-1)
            at_s(FRAME),
            "AM=M-1",
            "D=M",
            "@THIS",
            "M=D", // THIS = *(FRAME-2)
            at_s(FRAME),
            "AM=M-1",
            "D=M",
            "@ARG",
            "M=D", // ARG = *(FRAME-3)
            at_s(FRAME),
            "AM=M-1",
            "D=M",
            "@LCL",
            "M=D", // LCL = *(FRAME-4)
            at_s(RETURN_ADDRESS),
            "A=M",
            "0;JMP"
        ]
    }

    /// Bootstrap: SP = 256, then call Sys.init with no arguments.
    pub fn init(&mut self) -> Vec<String> {
        let mut code = if self.annotate {
            svec!["// bootstrap"]
        } else {
            vec![]
        };
        code.extend(svec![at_c(&STACK_BASE), "D=A", "@SP", "M=D"]);
        code.extend(self.call_sequence(ENTRY_FUNCTION, &0));
        code
    }

    pub fn translate(&mut self, command: &Command) -> Result<Vec<String>, UnsupportedOperation> {
        let translated = match command {
            Arithmetic(op) => self.arithmetic(op),
            Push(seg, arg) => self.push(seg, arg)?,
            Pop(seg, arg) => self.pop(seg, arg)?,
            Label(sym) => self.label(sym),
            Goto(sym) => self.goto(sym),
            IfGoto(sym) => self.if_goto(sym),
            Function(name, locals) => self.function_entry(name, locals),
            Call(name, args) => self.call(name, args)?,
            Return => self.ret(),
        };

        if self.annotate {
            let mut instructions = vec![format!("// {}", command)];
            instructions.extend(translated);
            Ok(instructions)
        } else {
            Ok(translated)
        }
    }
}

#[cfg(test)]
fn translate_all(translator: &mut Translator, commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .flat_map(|command| translator.translate(command).unwrap())
        .collect()
}

#[test]
fn test_push_constant() {
    let mut translator = Translator::new("Main");
    assert_eq!(
        translator.translate(&Push(Constant, 7)).unwrap(),
        svec!["@7", "D=A", "@SP", "M=M+1", "A=M-1", "M=D"]
    );
}

#[test]
fn test_static_uses_module_namespace() {
    let mut translator = Translator::new("Foo");
    let code = translator.translate(&Pop(Static, 3)).unwrap();
    assert!(code.contains(&"@Foo.3".to_string()));

    translator.set_module("Bar");
    assert_eq!(translator.module(), "Bar");
    let code = translator.translate(&Push(Static, 3)).unwrap();
    assert!(code.contains(&"@Bar.3".to_string()));
}

#[test]
fn test_unsupported_operations() {
    let mut translator = Translator::new("Main");
    assert_eq!(
        translator.translate(&Pop(Constant, 0)),
        Err(UnsupportedOperation::PopConstant)
    );
    assert_eq!(
        translator.translate(&Push(Pointer, 2)),
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Pointer,
            index: 2
        })
    );
    assert_eq!(
        translator.translate(&Pop(Temp, 8)),
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Temp,
            index: 8
        })
    );
    assert_eq!(
        translator.translate(&Push(Constant, 32768)),
        Err(UnsupportedOperation::ConstantOutOfRange(32768))
    );
    assert_eq!(
        translator.translate(&Push(Temp, 7)).unwrap()[0],
        "@R12".to_string()
    );
}

#[test]
fn test_segment_offsets_fit_an_a_instruction() {
    let mut translator = Translator::new("Main");
    assert_eq!(
        translator.translate(&Push(Local, 40000)),
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Local,
            index: 40000
        })
    );
    assert_eq!(
        translator.translate(&Pop(Argument, 33000)),
        Err(UnsupportedOperation::SegmentIndexOutOfRange {
            segment: Argument,
            index: 33000
        })
    );
    assert!(translator
        .translate(&Pop(That, MAX_CONSTANT))
        .unwrap()
        .contains(&"@32767".to_string()));
}

#[test]
fn test_call_argument_count_fits_an_a_instruction() {
    let mut translator = Translator::new("Main");
    assert_eq!(
        translator.translate(&Call("Main.f".to_string(), 40000)),
        Err(UnsupportedOperation::TooManyArguments(40000))
    );
    assert_eq!(
        translator.translate(&Call("Main.f".to_string(), MAX_CONSTANT - 4)),
        Err(UnsupportedOperation::TooManyArguments(MAX_CONSTANT - 4))
    );

    // rejected calls do not consume a call site
    let code = translator
        .translate(&Call("Main.f".to_string(), MAX_CONSTANT - 5))
        .unwrap();
    assert_eq!(code[0], "@Main.f$ret.1");
    assert!(code.contains(&"@32767".to_string()));
}

#[test]
fn test_comparison_labels_are_unique() {
    let mut translator = Translator::new("Main");
    let code = translate_all(
        &mut translator,
        &[Arithmetic(Eq), Arithmetic(Lt), Arithmetic(Gt)],
    );
    for n in 1..=3 {
        let def = format!("(CMP$TRUE.{})", n);
        assert_eq!(code.iter().filter(|line| **line == def).count(), 1);
    }

    translator.set_module("Other");
    let code = translator.translate(&Arithmetic(Eq)).unwrap();
    assert!(code.contains(&"(CMP$END.4)".to_string()));
}

#[test]
fn test_labels_are_scoped_to_function() {
    let mut translator = Translator::new("Main");
    let code = translate_all(
        &mut translator,
        &[
            Label("TOP".to_string()),
            Function("Main.loop".to_string(), 0),
            Label("TOP".to_string()),
            Goto("TOP".to_string()),
            IfGoto("TOP".to_string()),
        ],
    );
    assert_eq!(translator.function(), "Main.loop");
    assert!(code.contains(&"(.TOP)".to_string()));
    assert!(code.contains(&"(Main.loop)".to_string()));
    assert!(code.contains(&"(Main.loop.TOP)".to_string()));
    assert_eq!(
        code.iter().filter(|line| *line == "@Main.loop.TOP").count(),
        2
    );
}

#[test]
fn test_function_reserves_locals() {
    let mut translator = Translator::new("Main");
    let code = translator
        .translate(&Function("Main.f".to_string(), 3))
        .unwrap();
    assert_eq!(code[0], "(Main.f)");
    assert_eq!(code.iter().filter(|line| *line == "M=0").count(), 3);
}

#[test]
fn test_call_frame_layout() {
    let mut translator = Translator::new("Main");
    let code = translator
        .translate(&Call("Math.max".to_string(), 2))
        .unwrap();
    assert_eq!(code[0], "@Math.max$ret.1");
    assert_eq!(code.last().unwrap(), "(Math.max$ret.1)");
    let saved: Vec<&String> = code
        .iter()
        .filter(|line| ["@LCL", "@ARG", "@THIS", "@THAT"].contains(&line.as_str()))
        .take(4)
        .collect();
    assert_eq!(saved, vec!["@LCL", "@ARG", "@THIS", "@THAT"]);
    assert!(code.contains(&"@7".to_string()));

    let code = translator
        .translate(&Call("Math.max".to_string(), 2))
        .unwrap();
    assert_eq!(code[0], "@Math.max$ret.2");
}

#[test]
fn test_init_calls_entry_function() {
    let mut translator = Translator::new("Main").annotated(true);
    let code = translator.init();
    assert_eq!(code[0], "// bootstrap");
    assert_eq!(&code[1..5], &svec!["@256", "D=A", "@SP", "M=D"][..]);
    assert!(code.contains(&"@Sys.init".to_string()));
    assert_eq!(code.last().unwrap(), "(Sys.init$ret.1)");
}

#[test]
fn test_annotation() {
    let mut translator = Translator::new("Main").annotated(true);
    let code = translator.translate(&Pop(Local, 2)).unwrap();
    assert_eq!(code[0], "// pop local 2");
}
