use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::register_type::RegisterType;
use crate::dex::instruction::Instruction;
use crate::dex::opcodes::Opcode;

/// Incoming control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: usize,
    /// Edge from a throwing instruction to one of its handlers.
    pub exceptional: bool,
}

/// What the analyzer did to an odex-only instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Replacement {
    Deodexed(Instruction),
    /// The object register never holds a usable type, so the instruction
    /// can only throw at runtime. Emitted as `throw vObject`.
    Unresolvable { instruction: Instruction, object_register: u16 },
}

/// One instruction of a method together with its control-flow neighbours
/// and the register types before and after it.
#[derive(Debug, Clone)]
pub struct AnalyzedInstruction {
    pub index: usize,
    /// Code address in 16-bit units.
    pub address: u32,
    /// The instruction as read from the input.
    pub original: Instruction,
    /// Current form; differs from `original` once an odex instruction was
    /// rewritten.
    pub instruction: Instruction,
    pub pre: Vec<RegisterType>,
    pub post: Vec<RegisterType>,
    pub predecessors: Vec<Edge>,
    /// Normal successors: fallthrough, branch and switch targets.
    pub successors: Vec<usize>,
    /// Handler entries reachable when this instruction throws, in try order.
    pub handlers: Vec<usize>,
    /// First instruction of the method.
    pub method_entry: bool,
    pub(crate) unresolvable: Option<u16>,
    pub(crate) reached: bool,
    pub(crate) analyzed: bool,
    pub(crate) visits: u32,
}

impl AnalyzedInstruction {
    pub(crate) fn new(index: usize, address: u32, instruction: Instruction, registers: u16) -> Self {
        AnalyzedInstruction {
            index,
            address,
            original: instruction.clone(),
            instruction,
            pre: vec![RegisterType::UNKNOWN; registers as usize],
            post: vec![RegisterType::UNKNOWN; registers as usize],
            predecessors: Vec::new(),
            successors: Vec::new(),
            handlers: Vec::new(),
            method_entry: false,
            unresolvable: None,
            reached: false,
            analyzed: false,
            visits: 0,
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.instruction.opcode
    }

    /// Whether control can reach this instruction at all.
    pub fn is_reachable(&self) -> bool {
        self.reached
    }

    /// Whether the post-state was computed.
    pub fn is_analyzed(&self) -> bool {
        self.analyzed
    }

    /// Times the instruction was taken off the work queue.
    pub fn visits(&self) -> u32 {
        self.visits
    }

    /// True for an odex-only instruction that is still not rewritten.
    /// throw-verification-error has no symbolic form and stays as is.
    pub fn is_odexed(&self) -> bool {
        let opcode = self.instruction.opcode;
        opcode.odex_only() && opcode != Opcode::ThrowVerificationError && self.unresolvable.is_none()
    }

    pub fn replacement(&self) -> Option<Replacement> {
        if let Some(object_register) = self.unresolvable {
            return Some(Replacement::Unresolvable { instruction: self.original.clone(), object_register });
        }
        if self.instruction != self.original {
            return Some(Replacement::Deodexed(self.instruction.clone()));
        }
        None
    }

    /// Instructions to emit in place of this one. Unresolvable instructions
    /// turn into a throw padded with nops so code addresses do not move.
    pub fn emitted(&self) -> Vec<Instruction> {
        match self.unresolvable {
            Some(object_register) => {
                let mut out = vec![Instruction::new(Opcode::Throw, &[object_register])];
                for _ in 1..self.original.code_units() {
                    out.push(Instruction::new(Opcode::Nop, &[]));
                }
                out
            }
            None => vec![self.instruction.clone()],
        }
    }

    pub fn pre_type(&self, register: u16) -> Option<&RegisterType> {
        self.pre.get(register as usize)
    }

    pub fn post_type(&self, register: u16) -> Option<&RegisterType> {
        self.post.get(register as usize)
    }
}

impl fmt::Display for AnalyzedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: {}", self.address, self.instruction)
    }
}

/// How a register type was recovered when normal propagation gave nothing
/// usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    /// Followed the register back to the instruction that defined it.
    Retraced,
    /// Took the type of the nearest preceding instance-of on the register.
    InstanceOf,
    /// Took the type of the debug-info local variable.
    DebugLocal,
    /// The register is written by a move-exception, assumed a Throwable.
    ThrowableHandler,
    /// No type recovered, the instruction was replaced by a throw.
    Unresolvable,
}

/// Diagnostic recorded when analysis succeeded with a caveat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisNote {
    pub code_address: u32,
    pub kind: NoteKind,
    pub register: u16,
    pub type_desc: Option<String>,
    pub instruction: String,
}

impl fmt::Display for AnalysisNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.type_desc) {
            (NoteKind::Unresolvable, _) => write!(
                f,
                "{:#x}: replaced unresolvable odex instruction `{}` with a throw of v{}",
                self.code_address, self.instruction, self.register
            ),
            (kind, Some(type_desc)) => write!(
                f,
                "{:#x}: using {} for v{} in `{}` ({:?})",
                self.code_address, type_desc, self.register, self.instruction, kind
            ),
            (kind, None) => write!(f, "{:#x}: {:?} for v{} in `{}`", self.code_address, kind, self.register, self.instruction),
        }
    }
}
