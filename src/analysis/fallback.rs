//! Heuristics for recovering the type of a register when dataflow alone
//! leaves an odex instruction without a usable object type. They are tried
//! in a fixed order and the first one that lets the instruction resolve
//! wins.

use crate::analysis::analyzed_instruction::{AnalyzedInstruction, NoteKind};
use crate::analysis::method_analyzer::MethodAnalyzer;
use crate::analysis::register_type::RegisterType;
use crate::dex::descriptor;
use crate::dex::instruction::Instruction;
use crate::dex::opcodes::Opcode;

/// How far back the retrace and instance-of searches look.
const MAX_LOOKBEHIND: usize = 64;

pub(crate) struct Candidate {
    pub kind: NoteKind,
    pub register_type: RegisterType,
}

type Heuristic = fn(&MethodAnalyzer<'_>, usize, u16) -> Option<String>;

const HEURISTICS: [(NoteKind, Heuristic); 4] = [
    (NoteKind::Retraced, retrace),
    (NoteKind::InstanceOf, preceding_instance_of),
    (NoteKind::DebugLocal, debug_local),
    (NoteKind::ThrowableHandler, exception_register),
];

/// Distinct reference types for `register` at instruction `ix`, in the
/// order they should be tried.
pub(crate) fn candidates(analyzer: &MethodAnalyzer<'_>, ix: usize, register: u16) -> Vec<Candidate> {
    let mut found: Vec<Candidate> = Vec::new();
    for (kind, heuristic) in HEURISTICS {
        let type_desc = match heuristic(analyzer, ix, register) {
            Some(t) if descriptor::is_reference(&t) => t,
            _ => continue,
        };
        if found.iter().any(|c| c.register_type.class_descriptor() == Some(type_desc.as_str())) {
            continue;
        }
        let register_type = RegisterType::reference(analyzer.class_path().class(&type_desc));
        found.push(Candidate { kind, register_type });
    }
    found
}

fn writes(insn: &Instruction, register: u16) -> bool {
    let Some(dest) = insn.register(0) else {
        return false;
    };
    insn.opcode.sets_register() && (dest == register || (insn.opcode.sets_wide_register() && dest.checked_add(1) == Some(register)))
}

fn lookbehind(instructions: &[AnalyzedInstruction], ix: usize) -> impl Iterator<Item = &AnalyzedInstruction> {
    instructions[..ix].iter().rev().take(MAX_LOOKBEHIND)
}

/// Follows the register back through moves to the instruction that
/// defined it and takes the type that instruction names.
fn retrace(analyzer: &MethodAnalyzer<'_>, ix: usize, register: u16) -> Option<String> {
    let instructions = analyzer.instructions();
    let mut register = register;
    for node in lookbehind(instructions, ix) {
        let insn = &node.instruction;
        if !writes(insn, register) {
            continue;
        }
        match insn.opcode {
            Opcode::MoveObject | Opcode::MoveObjectFrom16 | Opcode::MoveObject16 => {
                register = insn.register(1)?;
            }
            Opcode::CheckCast | Opcode::NewInstance | Opcode::NewArray => return insn.type_ref().map(String::from),
            Opcode::ConstString | Opcode::ConstStringJumbo => return Some(descriptor::STRING.to_string()),
            Opcode::ConstClass => return Some(descriptor::CLASS.to_string()),
            Opcode::IgetObject | Opcode::SgetObject => return insn.field_ref().map(|f| f.type_desc.clone()),
            Opcode::MoveResultObject => {
                let producer = &instructions[node.index.checked_sub(1)?].instruction;
                return match producer.opcode {
                    Opcode::FilledNewArray | Opcode::FilledNewArrayRange => producer.type_ref().map(String::from),
                    _ => producer.method_ref().map(|m| m.proto.return_type.clone()),
                };
            }
            _ => return None,
        }
    }
    None
}

/// Type checked by the closest instance-of on the register, provided the
/// register was not redefined in between.
fn preceding_instance_of(analyzer: &MethodAnalyzer<'_>, ix: usize, register: u16) -> Option<String> {
    for node in lookbehind(analyzer.instructions(), ix) {
        let insn = &node.instruction;
        if insn.opcode == Opcode::InstanceOf && insn.register(1) == Some(register) {
            return insn.type_ref().map(String::from);
        }
        if writes(insn, register) {
            return None;
        }
    }
    None
}

/// Declared type of the local variable held in the register.
fn debug_local(analyzer: &MethodAnalyzer<'_>, ix: usize, register: u16) -> Option<String> {
    let address = analyzer.address(ix);
    analyzer
        .code()
        .locals
        .iter()
        .find(|l| l.register == register && l.start_address <= address && address < l.end_address)
        .map(|l| l.type_desc.clone())
}

/// Compiler generated exception plumbing (e.g. addSuppressed calls in
/// try-with-resources) only ever sees caught exceptions in this register.
fn exception_register(analyzer: &MethodAnalyzer<'_>, _ix: usize, register: u16) -> Option<String> {
    analyzer
        .instructions()
        .iter()
        .any(|n| n.instruction.opcode == Opcode::MoveException && n.instruction.register(0) == Some(register))
        .then(|| descriptor::THROWABLE.to_string())
}
