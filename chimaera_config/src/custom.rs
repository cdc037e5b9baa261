//! Custom expression engine.
//!
//! Each item binds an output path to a reverse polish expression over the
//! contact registers. Items fire on one of the engine callbacks selected
//! by their [`Destination`]; every value left on the stack becomes a
//! float argument of the emitted message.
//!
//! ```text
//! "$x $z *"  ──compile──▶ [X, Z, Mul] ──run(regs)──▶ /path ,f x*z
//! ```
//!
//! Tokens: `$f` frame id, `$s` session id, `$g` group id, `$p` pid,
//! `$x`, `$z`, numeric literals, `+ - * / %` and `neg`.

use chimaera_common::consts::{
    CUSTOM_EXPR_LEN, CUSTOM_PATH_LEN, CUSTOM_PROGRAM_LEN, CUSTOM_STACK_DEPTH,
};
use chimaera_common::osc::{OscArg, OscMessage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{Contact, FrameInfo, OutputEngine};
use crate::registry::Config;

/// Expression compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Token is neither a register, literal nor operator.
    #[error("unknown token '{0}'")]
    UnknownToken(String),

    /// Operator applied with too few operands.
    #[error("stack underflow")]
    StackUnderflow,

    /// Expression leaves nothing on the stack.
    #[error("expression yields no value")]
    EmptyResult,

    /// Stack grows beyond its fixed depth.
    #[error("stack depth exceeds {0}")]
    TooDeep(usize),

    /// Program exceeds its fixed length.
    #[error("expression exceeds {0} instructions")]
    TooLong(usize),
}

/// Engine callback an item is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Frame = 0,
    On = 1,
    Off = 2,
    Set = 3,
    End = 4,
    Idle = 5,
}

impl Destination {
    /// All destinations in wire order.
    pub const ALL: [Destination; 6] = [
        Destination::Frame,
        Destination::On,
        Destination::Off,
        Destination::Set,
        Destination::End,
        Destination::Idle,
    ];

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::On => "on",
            Self::Off => "off",
            Self::Set => "set",
            Self::End => "end",
            Self::Idle => "idle",
        }
    }

    /// Destination by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }

    /// Destination by wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// One VM instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    Push(f32),
    Fid,
    Sid,
    Gid,
    Pid,
    X,
    Z,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
}

/// Values the expressions can read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Registers {
    pub fid: u32,
    pub sid: u32,
    pub gid: u16,
    pub pid: u16,
    pub x: f32,
    pub z: f32,
}

/// Compiled expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    code: heapless::Vec<Instr, CUSTOM_PROGRAM_LEN>,
    outputs: usize,
}

impl Program {
    /// Number of values the program leaves on the stack.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Whether nothing was compiled.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Evaluate against `regs`.
    pub fn run(&self, regs: &Registers) -> heapless::Vec<f32, CUSTOM_STACK_DEPTH> {
        let mut stack: heapless::Vec<f32, CUSTOM_STACK_DEPTH> = heapless::Vec::new();
        for instr in &self.code {
            let value = match *instr {
                Instr::Push(v) => v,
                Instr::Fid => regs.fid as f32,
                Instr::Sid => regs.sid as f32,
                Instr::Gid => regs.gid as f32,
                Instr::Pid => regs.pid as f32,
                Instr::X => regs.x,
                Instr::Z => regs.z,
                Instr::Neg => -stack.pop().unwrap_or(0.0),
                binary => {
                    let rhs = stack.pop().unwrap_or(0.0);
                    let lhs = stack.pop().unwrap_or(0.0);
                    match binary {
                        Instr::Add => lhs + rhs,
                        Instr::Sub => lhs - rhs,
                        Instr::Mul => lhs * rhs,
                        Instr::Div => lhs / rhs,
                        _ => lhs % rhs,
                    }
                }
            };
            // depth verified at compile time
            let _ = stack.push(value);
        }
        stack
    }
}

/// Compile `src` into a program.
///
/// # Errors
/// Unknown tokens, operator underflow, an empty result and programs that
/// exceed the fixed stack depth or length are rejected.
pub fn compile(src: &str) -> Result<Program, CompileError> {
    let mut code = heapless::Vec::new();
    let mut depth = 0usize;

    for token in src.split_whitespace() {
        let (instr, pops) = match token {
            "$f" => (Instr::Fid, 0),
            "$s" => (Instr::Sid, 0),
            "$g" => (Instr::Gid, 0),
            "$p" => (Instr::Pid, 0),
            "$x" => (Instr::X, 0),
            "$z" => (Instr::Z, 0),
            "+" => (Instr::Add, 2),
            "-" => (Instr::Sub, 2),
            "*" => (Instr::Mul, 2),
            "/" => (Instr::Div, 2),
            "%" => (Instr::Mod, 2),
            "neg" => (Instr::Neg, 1),
            literal => match literal.parse::<f32>() {
                Ok(v) if v.is_finite() => (Instr::Push(v), 0),
                _ => return Err(CompileError::UnknownToken(literal.to_string())),
            },
        };

        if depth < pops {
            return Err(CompileError::StackUnderflow);
        }
        depth = depth - pops + 1;
        if depth > CUSTOM_STACK_DEPTH {
            return Err(CompileError::TooDeep(CUSTOM_STACK_DEPTH));
        }
        code.push(instr)
            .map_err(|_| CompileError::TooLong(CUSTOM_PROGRAM_LEN))?;
    }

    if depth == 0 {
        return Err(CompileError::EmptyResult);
    }
    Ok(Program {
        code,
        outputs: depth,
    })
}

/// One custom output item. A free slot has no destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomItem {
    pub destination: Option<Destination>,
    pub path: heapless::String<CUSTOM_PATH_LEN>,
    pub expression: heapless::String<CUSTOM_EXPR_LEN>,
    pub program: Program,
}

impl CustomItem {
    /// Whether the slot is free.
    pub fn is_free(&self) -> bool {
        self.destination.is_none()
    }

    /// Free the slot.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Evaluate into an output message.
    pub fn message(&self, regs: &Registers) -> OscMessage {
        let args = self
            .program
            .run(regs)
            .into_iter()
            .map(OscArg::Float)
            .collect();
        OscMessage::new(self.path.as_str(), args)
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// Output engine evaluating the configured items.
#[derive(Debug, Default)]
pub struct CustomEngine {
    regs: Registers,
}

impl CustomEngine {
    /// Create an engine with cleared registers.
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, config: &Config, dest: Destination, out: &mut Vec<OscMessage>) {
        out.extend(
            config
                .custom
                .items
                .iter()
                .filter(|item| item.destination == Some(dest))
                .map(|item| item.message(&self.regs)),
        );
    }

    fn load_contact(&mut self, contact: &Contact) {
        self.regs.sid = contact.sid;
        self.regs.gid = contact.gid;
        self.regs.pid = contact.pid;
        self.regs.x = contact.x;
        self.regs.z = contact.z;
    }
}

impl OutputEngine for CustomEngine {
    fn frame(&mut self, config: &Config, frame: &FrameInfo, out: &mut Vec<OscMessage>) {
        self.regs = Registers {
            fid: frame.fid,
            ..Registers::default()
        };
        let dest = if frame.blobs_old + frame.blobs_new > 0 {
            Destination::Frame
        } else {
            Destination::Idle
        };
        self.emit(config, dest, out);
    }

    fn on(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>) {
        self.load_contact(contact);
        self.emit(config, Destination::On, out);
    }

    fn off(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>) {
        self.load_contact(contact);
        self.regs.x = 0.0;
        self.regs.z = 0.0;
        self.emit(config, Destination::Off, out);
    }

    fn set(&mut self, config: &Config, contact: &Contact, out: &mut Vec<OscMessage>) {
        self.load_contact(contact);
        self.emit(config, Destination::Set, out);
    }

    fn end(&mut self, config: &Config, _frame: &FrameInfo, out: &mut Vec<OscMessage>) {
        self.emit(config, Destination::End, out);
    }
}
