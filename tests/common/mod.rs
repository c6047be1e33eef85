//! A small Hack assembler and CPU for running translated programs in tests.
//!
//! The assembler is deliberately strict: comp expressions outside the
//! standard Hack table and duplicate label definitions are rejected, the
//! same way a real two-pass assembler would reject them.

#![allow(dead_code)]

use std::collections::HashMap;

use vm_translator::{link_to_lines, Module, Options};

const RAM_SIZE: usize = 32768;
const FIRST_VARIABLE: u16 = 16;

const COMPS: [&str; 28] = [
    "0", "1", "-1", "D", "A", "!D", "!A", "-D", "-A", "D+1", "A+1", "D-1", "A-1", "D+A", "D-A",
    "A-D", "D&A", "D|A", "M", "!M", "-M", "M+1", "M-1", "D+M", "D-M", "M-D", "D&M", "D|M",
];
const DESTS: [&str; 8] = ["", "M", "D", "MD", "A", "AM", "AD", "AMD"];
const JUMPS: [&str; 8] = ["", "JGT", "JEQ", "JGE", "JLT", "JNE", "JLE", "JMP"];

#[derive(Debug, Clone, PartialEq)]
enum Instruction {
    Address(u16),
    Compute {
        dest: String,
        comp: String,
        jump: String,
    },
}

fn predefined() -> HashMap<String, u16> {
    let mut symbols: HashMap<String, u16> = [
        ("SP", 0),
        ("LCL", 1),
        ("ARG", 2),
        ("THIS", 3),
        ("THAT", 4),
        ("SCREEN", 16384),
        ("KBD", 24576),
    ]
    .iter()
    .map(|(name, addr)| (name.to_string(), *addr))
    .collect();
    for r in 0..16 {
        symbols.insert(format!("R{}", r), r);
    }
    symbols
}

fn strip(line: &str) -> &str {
    line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim()
}

fn assemble(lines: &[String]) -> (Vec<Instruction>, HashMap<String, u16>) {
    let mut symbols = predefined();

    // first pass: labels
    let mut address = 0u16;
    for line in lines {
        let line = strip(line);
        if line.is_empty() {
            continue;
        }
        if let Some(label) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
            assert!(
                symbols.insert(label.to_string(), address).is_none(),
                "duplicate label ({})",
                label
            );
        } else {
            address += 1;
        }
    }

    // second pass: instructions and variables
    let mut next_variable = FIRST_VARIABLE;
    let mut rom = vec![];
    for line in lines {
        let line = strip(line);
        if line.is_empty() || line.starts_with('(') {
            continue;
        }
        if let Some(value) = line.strip_prefix('@') {
            let value = match value.parse::<u16>() {
                Ok(literal) => {
                    assert!(literal < 32768, "A-instruction out of range: {}", line);
                    literal
                }
                Err(_) => *symbols.entry(value.to_string()).or_insert_with(|| {
                    next_variable += 1;
                    next_variable - 1
                }),
            };
            rom.push(Instruction::Address(value));
        } else {
            let (rest, jump) = line.split_once(';').unwrap_or((line, ""));
            let (dest, comp) = rest.split_once('=').unwrap_or(("", rest));
            assert!(COMPS.contains(&comp), "invalid comp in `{}`", line);
            assert!(DESTS.contains(&dest), "invalid dest in `{}`", line);
            assert!(JUMPS.contains(&jump), "invalid jump in `{}`", line);
            rom.push(Instruction::Compute {
                dest: dest.to_string(),
                comp: comp.to_string(),
                jump: jump.to_string(),
            });
        }
    }

    (rom, symbols)
}

fn eval(comp: &str, a: u16, d: u16, m: u16) -> u16 {
    let reg = |c: char| match c {
        'A' => a,
        'D' => d,
        'M' => m,
        _ => panic!("unknown register {}", c),
    };
    match comp {
        "0" => return 0,
        "1" => return 1,
        "-1" => return 0xFFFF,
        _ => {}
    }
    let chars: Vec<char> = comp.chars().collect();
    match chars.as_slice() {
        [x] => reg(*x),
        ['!', x] => !reg(*x),
        ['-', x] => reg(*x).wrapping_neg(),
        [x, '+', '1'] => reg(*x).wrapping_add(1),
        [x, '-', '1'] => reg(*x).wrapping_sub(1),
        [x, '+', y] => reg(*x).wrapping_add(reg(*y)),
        [x, '-', y] => reg(*x).wrapping_sub(reg(*y)),
        [x, '&', y] => reg(*x) & reg(*y),
        [x, '|', y] => reg(*x) | reg(*y),
        _ => panic!("unknown comp {}", comp),
    }
}

pub struct Machine {
    pub ram: Vec<u16>,
    rom: Vec<Instruction>,
    symbols: HashMap<String, u16>,
    pc: usize,
    a: u16,
    d: u16,
}

impl Machine {
    pub fn load(lines: &[String]) -> Self {
        let (rom, symbols) = assemble(lines);
        Machine {
            ram: vec![0; RAM_SIZE],
            rom,
            symbols,
            pc: 0,
            a: 0,
            d: 0,
        }
    }

    pub fn peek(&self, address: u16) -> i16 {
        self.ram[address as usize] as i16
    }

    pub fn poke(&mut self, address: u16, value: i16) {
        self.ram[address as usize] = value as u16;
    }

    pub fn sp(&self) -> u16 {
        self.ram[0]
    }

    /// Value on top of the stack
    pub fn top(&self) -> i16 {
        self.peek(self.sp() - 1)
    }

    /// Address the assembler gave a label or variable
    pub fn symbol(&self, name: &str) -> u16 {
        self.symbols[name]
    }

    /// The `(L) @L 0;JMP` idiom parks the CPU for good.
    fn halted(&self) -> bool {
        match (self.rom.get(self.pc), self.rom.get(self.pc + 1)) {
            (Some(Instruction::Address(target)), Some(Instruction::Compute { comp, jump, .. })) => {
                *target as usize == self.pc && comp == "0" && jump == "JMP"
            }
            _ => false,
        }
    }

    fn step(&mut self) {
        match &self.rom[self.pc] {
            Instruction::Address(value) => {
                self.a = *value;
                self.pc += 1;
            }
            Instruction::Compute { dest, comp, jump } => {
                let address = self.a;
                let m = if comp.contains('M') {
                    self.ram[address as usize]
                } else {
                    0
                };
                let out = eval(comp, self.a, self.d, m);
                if dest.contains('M') {
                    self.ram[address as usize] = out;
                }
                if dest.contains('A') {
                    self.a = out;
                }
                if dest.contains('D') {
                    self.d = out;
                }
                let value = out as i16;
                let taken = match jump.as_str() {
                    "JGT" => value > 0,
                    "JEQ" => value == 0,
                    "JGE" => value >= 0,
                    "JLT" => value < 0,
                    "JNE" => value != 0,
                    "JLE" => value <= 0,
                    "JMP" => true,
                    _ => false,
                };
                if taken {
                    self.pc = address as usize;
                } else {
                    self.pc += 1;
                }
            }
        }
    }

    /// Runs until the program falls off the end of ROM or parks in a halt loop.
    pub fn run(&mut self, max_steps: usize) {
        for _ in 0..max_steps {
            if self.pc >= self.rom.len() || self.halted() {
                return;
            }
            self.step();
        }
        panic!("program did not halt within {} steps", max_steps);
    }
}

pub fn translate(modules: &[(&str, &str)], bootstrap: bool) -> Vec<String> {
    let modules: Vec<Module> = modules
        .iter()
        .map(|(name, source)| Module::new(name, source))
        .collect();
    let options = Options {
        bootstrap,
        ..Options::default()
    };
    link_to_lines(&modules, &options).expect("translation failed")
}

/// Stack and segment pointers for programs run without bootstrap.
pub const SP: i16 = 256;
pub const LCL: i16 = 300;
pub const ARG: i16 = 400;
pub const THIS: i16 = 3000;
pub const THAT: i16 = 3010;

/// Loads a single module with the segment registers preset, as test
/// scripts do for code that has no bootstrap.
pub fn machine_for(source: &str) -> Machine {
    let mut machine = Machine::load(&translate(&[("Main", source)], false));
    machine.poke(0, SP);
    machine.poke(1, LCL);
    machine.poke(2, ARG);
    machine.poke(3, THIS);
    machine.poke(4, THAT);
    machine
}
