//! Context-free unquickening. The compiler records, for every instruction it
//! quickened, the constant pool index the instruction used to carry; replaying
//! that record restores the symbolic form without any dataflow.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::dex::error::DexError;
use crate::dex::instruction::{Instruction, RefResolver, Reference};
use crate::dex::opcodes::Opcode;
use crate::dex::{read_u2, read_uleb128, write_u2, write_uleb128};

/// Index recorded for a quickened nop that stood for an ordinary nop.
pub const NO_INDEX: u32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuickenedIndex {
    /// Code address the index belongs to, when the table records one.
    dex_pc: Option<u32>,
    index: u32,
}

/// Recorded indices of one method, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickeningInfo {
    entries: VecDeque<QuickenedIndex>,
}

impl QuickeningInfo {
    /// Table of ULEB128 `(dex_pc, index)` pairs.
    pub fn from_pc_index_pairs(bytes: &[u8]) -> Result<Self, DexError> {
        let mut entries = VecDeque::new();
        let mut ix = 0;
        while ix < bytes.len() {
            let dex_pc = read_uleb128(bytes, &mut ix).map_err(|e| err!(e, "quickening entry {}", entries.len()))?;
            let index = read_uleb128(bytes, &mut ix).map_err(|e| err!(e, "quickening entry {}", entries.len()))?;
            entries.push_back(QuickenedIndex { dex_pc: Some(dex_pc), index });
        }
        Ok(QuickeningInfo { entries })
    }

    /// Table of little-endian u16 indices without code addresses.
    pub fn from_indices(bytes: &[u8]) -> Result<Self, DexError> {
        if bytes.len() % 2 != 0 {
            fail!("Quickening info of {} bytes is not a list of u16 indices", bytes.len());
        }
        let mut entries = VecDeque::new();
        let mut ix = 0;
        while ix < bytes.len() {
            let index = read_u2(bytes, &mut ix)?;
            entries.push_back(QuickenedIndex { dex_pc: None, index: index as u32 });
        }
        Ok(QuickeningInfo { entries })
    }

    pub fn from_pairs(pairs: &[(u32, u32)]) -> Self {
        let entries = pairs.iter().map(|&(dex_pc, index)| QuickenedIndex { dex_pc: Some(dex_pc), index }).collect();
        QuickeningInfo { entries }
    }

    pub fn from_index_list(indices: &[u16]) -> Self {
        let entries = indices.iter().map(|&index| QuickenedIndex { dex_pc: None, index: index as u32 }).collect();
        QuickeningInfo { entries }
    }

    /// Encodes the table as ULEB128 pairs. Entries without an address are
    /// written at address 0.
    pub fn to_pc_index_pairs(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            write_uleb128(&mut out, entry.dex_pc.unwrap_or(0));
            write_uleb128(&mut out, entry.index);
        }
        out
    }

    pub fn to_indices(&self) -> Result<Vec<u8>, DexError> {
        let mut out = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            match u16::try_from(entry.index) {
                Ok(index) => write_u2(&mut out, index),
                Err(_) => fail!("Quickened index {} does not fit in 16 bits", entry.index),
            };
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Next index if it belongs to `dex_pc`. Tables without addresses match
    /// any position.
    fn peek_at(&self, dex_pc: u32) -> Option<u32> {
        let entry = self.entries.front()?;
        match entry.dex_pc {
            Some(pc) if pc != dex_pc => None,
            _ => Some(entry.index),
        }
    }

    fn take(&mut self, dex_pc: u32, what: Opcode) -> Result<u32, DexError> {
        match self.peek_at(dex_pc) {
            Some(index) => {
                self.entries.pop_front();
                Ok(index)
            }
            None if self.entries.is_empty() => fail!("Not enough quickening info for {} at {:#x}", what, dex_pc),
            None => fail!("No quickening info for {} at {:#x}", what, dex_pc),
        }
    }
}

fn unquickened_opcode(opcode: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match opcode {
        IgetQuick => Iget,
        IgetWideQuick => IgetWide,
        IgetObjectQuick => IgetObject,
        IgetBooleanQuick => IgetBoolean,
        IgetByteQuick => IgetByte,
        IgetCharQuick => IgetChar,
        IgetShortQuick => IgetShort,
        IputQuick => Iput,
        IputWideQuick => IputWide,
        IputObjectQuick => IputObject,
        IputBooleanQuick => IputBoolean,
        IputByteQuick => IputByte,
        IputCharQuick => IputChar,
        IputShortQuick => IputShort,
        InvokeVirtualQuick => InvokeVirtual,
        InvokeVirtualQuickRange => InvokeVirtualRange,
        _ => return None,
    })
}

/// Rewrites the quickened instructions of one method. A check-cast the
/// compiler turned into two nops comes back as a single check-cast.
/// Instructions the table does not cover pass through unchanged.
pub fn unquicken(
    instructions: &[Instruction],
    mut info: QuickeningInfo,
    resolver: &dyn RefResolver,
) -> Result<Vec<Instruction>, DexError> {
    let mut out = Vec::with_capacity(instructions.len());
    let mut dex_pc = 0u32;
    let mut absorb_nop = false;

    for insn in instructions {
        let pc = dex_pc;
        dex_pc += insn.code_units() as u32;
        if absorb_nop && insn.opcode == Opcode::Nop {
            absorb_nop = false;
            continue;
        }
        absorb_nop = false;

        match insn.opcode {
            Opcode::ReturnVoidNoBarrier | Opcode::ReturnVoidBarrier => out.push(insn.with_opcode(Opcode::ReturnVoid)),
            Opcode::Nop => match info.peek_at(pc) {
                None => out.push(insn.clone()),
                Some(NO_INDEX) => {
                    info.entries.pop_front();
                    out.push(insn.clone());
                }
                Some(register) => {
                    info.entries.pop_front();
                    let type_index = info.take(pc, Opcode::CheckCast)?;
                    let type_desc = resolver.type_desc(type_index).map_err(|e| err!(e, "check-cast at {:#x}", pc))?;
                    let register = u16::try_from(register).map_err(|_| err!("Register v{} out of range at {:#x}", register, pc))?;
                    trace!("Recovered check-cast v{}, {} at {:#x}", register, type_desc, pc);
                    out.push(Instruction::new(Opcode::CheckCast, &[register]).with_reference(Reference::Type(type_desc)));
                    absorb_nop = true;
                }
            },
            opcode => match unquickened_opcode(opcode) {
                Some(plain) => {
                    if info.peek_at(pc).is_none() && !info.is_empty() {
                        // table is ahead of this instruction
                        out.push(insn.clone());
                        continue;
                    }
                    let index = info.take(pc, opcode)?;
                    let reference = if plain == Opcode::InvokeVirtual || plain == Opcode::InvokeVirtualRange {
                        Reference::Method(resolver.method_ref(index).map_err(|e| err!(e, "{} at {:#x}", opcode, pc))?)
                    } else {
                        Reference::Field(resolver.field_ref(index).map_err(|e| err!(e, "{} at {:#x}", opcode, pc))?)
                    };
                    let mut plain_insn = insn.with_opcode(plain);
                    plain_insn.reference = Some(reference);
                    out.push(plain_insn);
                }
                None => out.push(insn.clone()),
            },
        }
    }

    if !info.is_empty() {
        fail!("Failed to use all values in quickening info, {} left", info.len());
    }
    debug!("Unquickened {} instructions", instructions.len());
    Ok(out)
}
