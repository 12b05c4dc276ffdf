//! Register type inference over one method, rewriting odex-only instructions
//! as soon as the types they depend on are known.
//!
//! A `MethodAnalyzer` is a single-use session: it owns the control flow
//! graph and every register vector of the method and is consumed by
//! [`MethodAnalyzer::analyze`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use log::{debug, info, trace, warn};

use crate::analysis::analyzed_instruction::{AnalysisNote, AnalyzedInstruction, Edge, NoteKind, Replacement};
use crate::analysis::class_path::ClassPath;
use crate::analysis::class_proto::ClassProto;
use crate::analysis::error::AnalysisError;
use crate::analysis::fallback;
use crate::analysis::register_type::{Category, RegisterType};
use crate::analysis::transfer;
use crate::dex::class_def::{ClassDef, MethodDef, MethodImpl, MethodRef};
use crate::dex::descriptor;
use crate::dex::instruction::{Instruction, Payload};
use crate::dex::opcodes::Opcode;

/// Odex instruction waiting for a usable object type.
#[derive(Debug, Clone)]
pub(crate) struct PendingOdex {
    pub object_register: u16,
    /// Set when the object type was known but the lookup on it failed.
    pub failure: Option<AnalysisError>,
}

pub struct MethodAnalyzer<'a> {
    class_path: &'a ClassPath,
    class_def: &'a ClassDef,
    method: &'a MethodDef,
    code: &'a MethodImpl,
    instructions: Vec<AnalyzedInstruction>,
    index_by_address: HashMap<u32, usize>,
    start_state: Vec<RegisterType>,
    /// Register values replaced along one edge, used to narrow a register
    /// after an instance-of check.
    overrides: HashMap<(usize, usize), Vec<(u16, RegisterType)>>,
    pending: BTreeMap<usize, PendingOdex>,
    hints: HashMap<usize, RegisterType>,
    recovery_tried: HashSet<usize>,
    worklist: VecDeque<usize>,
    queued: Vec<bool>,
    notes: Vec<AnalysisNote>,
}

/// Analyzes `method` of `class_def` and rewrites its odex instructions.
pub fn analyze_method(
    class_path: &ClassPath,
    class_def: &ClassDef,
    method: &MethodDef,
) -> Result<MethodAnalysis, AnalysisError> {
    MethodAnalyzer::new(class_path, class_def, method)?.analyze()
}

impl<'a> MethodAnalyzer<'a> {
    pub fn new(class_path: &'a ClassPath, class_def: &'a ClassDef, method: &'a MethodDef) -> Result<Self, AnalysisError> {
        let method_ref = method.reference(&class_def.descriptor);
        let code = match &method.code {
            Some(code) => code,
            None => analysis_fail!("{} has no code", method_ref),
        };

        let mut instructions = Vec::with_capacity(code.instructions.len());
        let mut address = 0u32;
        for (index, insn) in code.instructions.iter().enumerate() {
            instructions.push(AnalyzedInstruction::new(index, address, insn.clone(), code.registers));
            address += insn.code_units() as u32;
        }
        let index_by_address = instructions.iter().map(|i| (i.address, i.index)).collect();
        let count = instructions.len();

        let mut analyzer = MethodAnalyzer {
            class_path,
            class_def,
            method,
            code,
            instructions,
            index_by_address,
            start_state: Vec::new(),
            overrides: HashMap::new(),
            pending: BTreeMap::new(),
            hints: HashMap::new(),
            recovery_tried: HashSet::new(),
            worklist: VecDeque::new(),
            queued: vec![false; count],
            notes: Vec::new(),
        };
        analyzer.start_state = analyzer.initial_registers().map_err(|e| e.with_context(format!("method: {}", method_ref)))?;
        analyzer.build_cfg().map_err(|e| e.with_context(format!("method: {}", method_ref)))?;
        Ok(analyzer)
    }

    /// Registers on entry: `this`, then the declared parameters in the last
    /// registers of the frame, everything else uninitialized.
    fn initial_registers(&self) -> Result<Vec<RegisterType>, AnalysisError> {
        let registers = self.code.registers;
        let parameter_registers = self.method.parameter_register_count();
        if parameter_registers > registers {
            analysis_fail!("{} parameter registers do not fit in {} registers", parameter_registers, registers);
        }

        let mut state = vec![RegisterType::UNINIT; registers as usize];
        let mut reg = (registers - parameter_registers) as usize;
        if !self.method.is_static() {
            let this = self.class_path.class(&self.class_def.descriptor);
            state[reg] = if self.method.name == "<init>" && self.class_def.descriptor != descriptor::OBJECT {
                RegisterType::uninit_this(this)
            } else {
                RegisterType::reference(this)
            };
            reg += 1;
        }
        for param in &self.method.proto.params {
            let value = RegisterType::for_type(self.class_path, param);
            if let Some(high) = value.wide_high() {
                state[reg] = value;
                state[reg + 1] = high;
                reg += 2;
            } else {
                state[reg] = value;
                reg += 1;
            }
        }
        Ok(state)
    }

    fn index_at(&self, from: u32, offset: i32) -> Result<usize, AnalysisError> {
        let address = from as i64 + offset as i64;
        match u32::try_from(address).ok().and_then(|a| self.index_by_address.get(&a)) {
            Some(ix) => Ok(*ix),
            None => Err(AnalysisError::at(from, format!("Invalid branch or payload target {:+}", offset))),
        }
    }

    fn handler_index(&self, from: u32, handler_address: u32) -> Result<usize, AnalysisError> {
        match self.index_by_address.get(&handler_address) {
            Some(ix) => Ok(*ix),
            None => Err(AnalysisError::at(from, format!("Invalid exception handler address {:#x}", handler_address))),
        }
    }

    /// Normal successors and exception handlers of one instruction.
    fn successors_of(&self, ix: usize) -> Result<(Vec<usize>, Vec<usize>), AnalysisError> {
        let node = &self.instructions[ix];
        let insn = &node.instruction;
        let mut normal = Vec::new();

        if insn.opcode.can_continue() {
            if ix + 1 >= self.instructions.len() {
                return Err(AnalysisError::at(node.address, "Execution can continue past the last instruction"));
            }
            normal.push(ix + 1);
        }
        if let Some(target) = insn.target {
            if insn.opcode.is_switch() {
                let payload_ix = self.index_at(node.address, target)?;
                match (&insn.opcode, &self.instructions[payload_ix].instruction.payload) {
                    (Opcode::PackedSwitch, Some(Payload::PackedSwitch { targets, .. }))
                    | (Opcode::SparseSwitch, Some(Payload::SparseSwitch { targets, .. })) => {
                        for t in targets {
                            normal.push(self.index_at(node.address, *t)?);
                        }
                    }
                    _ => return Err(AnalysisError::at(node.address, "Switch does not point at a matching payload")),
                }
            } else if insn.opcode != Opcode::FillArrayData {
                normal.push(self.index_at(node.address, target)?);
            }
        }
        dedup(&mut normal);

        let mut handlers = Vec::new();
        if insn.opcode.can_throw() {
            for try_block in self.code.tries.iter().filter(|t| t.covers(node.address)) {
                for handler in &try_block.handlers {
                    handlers.push(self.handler_index(node.address, handler.handler_address)?);
                }
            }
        }
        dedup(&mut handlers);
        Ok((normal, handlers))
    }

    /// Wires successors breadth first from the method entry. Only reachable
    /// instructions get edges.
    fn build_cfg(&mut self) -> Result<(), AnalysisError> {
        if self.instructions.is_empty() {
            return Ok(());
        }
        if self.instructions[0].opcode() == Opcode::MoveException {
            analysis_fail!("Method can not start with a move-exception instruction");
        }
        self.instructions[0].method_entry = true;

        let mut seen = vec![false; self.instructions.len()];
        let mut queue = VecDeque::new();
        seen[0] = true;
        queue.push_back(0);
        while let Some(ix) = queue.pop_front() {
            let (normal, handlers) = self.successors_of(ix)?;
            for &s in &normal {
                if self.instructions[s].opcode() == Opcode::MoveException {
                    return Err(AnalysisError::at(
                        self.instructions[ix].address,
                        format!(
                            "Execution can pass from the {} instruction at code address {:#x} to the move-exception instruction at address {:#x}",
                            self.instructions[ix].opcode(),
                            self.instructions[ix].address,
                            self.instructions[s].address
                        ),
                    ));
                }
                self.instructions[s].predecessors.push(Edge { from: ix, exceptional: false });
            }
            for &h in &handlers {
                self.instructions[h].predecessors.push(Edge { from: ix, exceptional: true });
            }
            for &s in normal.iter().chain(handlers.iter()) {
                if !seen[s] {
                    seen[s] = true;
                    queue.push_back(s);
                }
            }
            self.instructions[ix].successors = normal;
            self.instructions[ix].handlers = handlers;
        }
        Ok(())
    }

    /// Runs the dataflow to its fixpoint, recovering types for stuck odex
    /// instructions once nothing else changes.
    pub fn analyze(mut self) -> Result<MethodAnalysis, AnalysisError> {
        if !self.instructions.is_empty() {
            self.update_pre(0);
        }
        loop {
            self.run_worklist()?;
            if self.pending.is_empty() {
                break;
            }
            if !self.recover_pending() {
                self.give_up_pending()?;
            }
        }

        let analysis = MethodAnalysis {
            method: self.method_ref(),
            instructions: self.instructions,
            notes: self.notes,
        };
        info!(
            "Analyzed {}: {} instructions, {} rewritten, {} notes",
            analysis.method,
            analysis.instructions.len(),
            analysis.replacements().len(),
            analysis.notes.len()
        );
        Ok(analysis)
    }

    fn run_worklist(&mut self) -> Result<(), AnalysisError> {
        while let Some(ix) = self.worklist.pop_front() {
            self.queued[ix] = false;
            self.instructions[ix].visits += 1;
            trace!("Visiting {} (visit {})", self.instructions[ix], self.instructions[ix].visits);

            if self.instructions[ix].unresolvable.is_some() {
                self.propagate(ix, false);
                continue;
            }
            let resolved = match self.analyze_instruction(ix) {
                Ok(resolved) => resolved,
                Err(e) => return Err(self.decorate(ix, e)),
            };
            if resolved {
                self.pending.remove(&ix);
            }
            self.instructions[ix].analyzed = resolved;
            self.propagate(ix, resolved);
        }
        Ok(())
    }

    /// Computes the post-state of one instruction from its pre-state.
    /// `Ok(false)` means the instruction is an odex instruction whose object
    /// type is not usable yet.
    fn analyze_instruction(&mut self, ix: usize) -> Result<bool, AnalysisError> {
        let node = &mut self.instructions[ix];
        node.post = node.pre.clone();
        let rule = transfer::rule_for(node.instruction.opcode);
        rule(self, ix)
    }

    fn enqueue(&mut self, ix: usize) {
        if !self.queued[ix] {
            self.queued[ix] = true;
            self.worklist.push_back(ix);
        }
    }

    fn propagate(&mut self, ix: usize, normal: bool) {
        let node = &self.instructions[ix];
        let mut targets = if normal { node.successors.clone() } else { Vec::new() };
        targets.extend(node.handlers.iter().copied());
        for s in targets {
            self.update_pre(s);
        }
    }

    fn update_pre(&mut self, ix: usize) {
        let merged = self.merged_pre(ix);
        let node = &mut self.instructions[ix];
        if !node.reached || node.pre != merged {
            node.pre = merged;
            node.reached = true;
            self.enqueue(ix);
        }
    }

    /// Join of the values flowing in over every edge. Normal edges carry the
    /// predecessor's post-state, exception edges the state before the
    /// throwing instruction.
    fn merged_pre(&self, ix: usize) -> Vec<RegisterType> {
        let class_path = self.class_path;
        let node = &self.instructions[ix];
        let mut state = if node.method_entry {
            self.start_state.clone()
        } else {
            vec![RegisterType::UNKNOWN; self.code.registers as usize]
        };

        for edge in &node.predecessors {
            let from = &self.instructions[edge.from];
            if edge.exceptional {
                if from.reached {
                    merge_into(class_path, &mut state, &from.pre);
                }
                continue;
            }
            if !from.analyzed {
                continue;
            }
            match self.overrides.get(&(edge.from, ix)) {
                Some(overrides) => {
                    let mut values = from.post.clone();
                    for (reg, value) in overrides {
                        values[*reg as usize] = value.clone();
                    }
                    merge_into(class_path, &mut state, &values);
                }
                None => merge_into(class_path, &mut state, &from.post),
            }
        }
        state
    }

    /// Tries the fallback heuristics on one stuck instruction at a time.
    /// Returns true as soon as one instruction got resolved.
    fn recover_pending(&mut self) -> bool {
        let stuck: Vec<(usize, u16)> = self.pending.iter().map(|(ix, p)| (*ix, p.object_register)).collect();
        for (ix, register) in stuck {
            if !self.recovery_tried.insert(ix) {
                continue;
            }
            let saved = self.pending.get(&ix).cloned();
            for candidate in fallback::candidates(self, ix, register) {
                self.hints.insert(ix, candidate.register_type.clone());
                match self.analyze_instruction(ix) {
                    Ok(true) => {
                        let note = AnalysisNote {
                            code_address: self.instructions[ix].address,
                            kind: candidate.kind,
                            register,
                            type_desc: candidate.register_type.class_descriptor().map(String::from),
                            instruction: self.instructions[ix].original.to_string(),
                        };
                        warn!("{}: {}", self.method_ref(), note);
                        self.notes.push(note);
                        self.pending.remove(&ix);
                        self.instructions[ix].analyzed = true;
                        self.propagate(ix, true);
                        return true;
                    }
                    Ok(false) | Err(_) => {
                        self.hints.remove(&ix);
                        if let Some(saved) = &saved {
                            self.pending.insert(ix, saved.clone());
                        }
                    }
                }
            }
        }
        false
    }

    /// Every heuristic failed. A lookup that failed on a known type is fatal;
    /// an instruction whose object is never a usable reference can only throw
    /// and is replaced by a throw.
    fn give_up_pending(&mut self) -> Result<(), AnalysisError> {
        let pending = std::mem::take(&mut self.pending);
        for (ix, stuck) in pending {
            if let Some(failure) = stuck.failure {
                return Err(self.decorate(ix, failure));
            }
            let note = AnalysisNote {
                code_address: self.instructions[ix].address,
                kind: NoteKind::Unresolvable,
                register: stuck.object_register,
                type_desc: None,
                instruction: self.instructions[ix].original.to_string(),
            };
            warn!("{}: {}", self.method_ref(), note);
            self.notes.push(note);
            self.instructions[ix].unresolvable = Some(stuck.object_register);
            self.instructions[ix].analyzed = false;
            self.propagate(ix, false);
        }
        Ok(())
    }

    /// Adds the opcode, address, method, source line and neighbouring
    /// instructions to a failure.
    fn decorate(&self, ix: usize, e: AnalysisError) -> AnalysisError {
        let node = &self.instructions[ix];
        let mut e = e
            .with_address(node.address)
            .with_context(format!("opcode: {}", node.original.opcode))
            .with_context(format!("code address: {:#x}", node.address))
            .with_context(format!("method: {}", self.method_ref()));
        if let Some(line) = self.code.line_at(node.address) {
            e = e.with_context(format!("line: {}", line));
        }
        let end = (ix + 3).min(self.instructions.len());
        for i in ix.saturating_sub(2)..end {
            let marker = if i == ix { ">" } else { " " };
            e = e.with_context(format!("{} {}", marker, self.instructions[i]));
        }
        e
    }

    pub fn method_ref(&self) -> MethodRef {
        self.method.reference(&self.class_def.descriptor)
    }

    pub(crate) fn class_path(&self) -> &'a ClassPath {
        self.class_path
    }

    pub(crate) fn class_def(&self) -> &'a ClassDef {
        self.class_def
    }

    pub(crate) fn code(&self) -> &'a MethodImpl {
        self.code
    }

    pub(crate) fn instructions(&self) -> &[AnalyzedInstruction] {
        &self.instructions
    }

    pub(crate) fn instruction(&self, ix: usize) -> &Instruction {
        &self.instructions[ix].instruction
    }

    pub(crate) fn address(&self, ix: usize) -> u32 {
        self.instructions[ix].address
    }

    /// Operand register `operand` of instruction `ix`.
    pub(crate) fn operand(&self, ix: usize, operand: usize) -> Result<u16, AnalysisError> {
        match self.instructions[ix].instruction.register(operand) {
            Some(reg) => Ok(reg),
            None => analysis_fail!("Missing register operand {}", operand),
        }
    }

    pub(crate) fn pre(&self, ix: usize, reg: u16) -> Result<RegisterType, AnalysisError> {
        match self.instructions[ix].pre.get(reg as usize) {
            Some(value) => Ok(value.clone()),
            None => analysis_fail!("Register v{} out of range", reg),
        }
    }

    /// Type of the object register of an odex instruction: a recovered type
    /// when the fallbacks supplied one, the pre-state otherwise.
    pub(crate) fn object_type(&self, ix: usize, reg: u16) -> Result<RegisterType, AnalysisError> {
        match self.hints.get(&ix) {
            Some(hint) => Ok(hint.clone()),
            None => self.pre(ix, reg),
        }
    }

    /// Sets a register in the post-state; a wide low half also sets the
    /// high half in the next register.
    pub(crate) fn set(&mut self, ix: usize, reg: u16, value: RegisterType) -> Result<(), AnalysisError> {
        let registers = self.code.registers;
        if reg >= registers {
            analysis_fail!("Register v{} out of range", reg);
        }
        let high = value.wide_high();
        if high.is_some() && reg + 1 >= registers {
            analysis_fail!("Wide register pair v{}/v{} out of range", reg, reg + 1);
        }
        let node = &mut self.instructions[ix];
        node.post[reg as usize] = value;
        if let Some(high) = high {
            node.post[reg as usize + 1] = high;
        }
        Ok(())
    }

    /// Records the rewritten form of an odex instruction.
    pub(crate) fn replace(&mut self, ix: usize, insn: Instruction) {
        debug!("Deodexed {} at {:#x} to {}", self.instructions[ix].original, self.instructions[ix].address, insn);
        self.instructions[ix].instruction = insn;
    }

    /// Parks an odex instruction until its object type becomes usable.
    pub(crate) fn defer(&mut self, ix: usize, object_register: u16, failure: Option<AnalysisError>) -> Result<bool, AnalysisError> {
        trace!("Deferring {} at {:#x}", self.instructions[ix].instruction, self.instructions[ix].address);
        self.pending.insert(ix, PendingOdex { object_register, failure });
        Ok(false)
    }

    /// Exception types caught by handlers starting at `address`; `None`
    /// stands for a catch-all.
    pub(crate) fn handler_types(&self, address: u32) -> Vec<Option<&'a str>> {
        self.code
            .tries
            .iter()
            .flat_map(|t| t.handlers.iter())
            .filter(|h| h.handler_address == address)
            .map(|h| h.exception_type.as_deref())
            .collect()
    }

    /// After `instance-of vA, vB, T` directly followed by `if-eqz vA` or
    /// `if-nez vA`, vB holds a T on the path where the check succeeded.
    /// Only ART verifies code this way.
    pub(crate) fn narrow_after_instance_of(&mut self, ix: usize) {
        self.overrides.retain(|(from, _), _| *from != ix);
        if !self.class_path.is_art() {
            return;
        }
        if let Some((successor, narrowed)) = self.narrowing(ix) {
            self.overrides.insert((ix, successor), narrowed);
        }
    }

    fn narrowing(&self, ix: usize) -> Option<(usize, Vec<(u16, RegisterType)>)> {
        let node = &self.instructions[ix];
        let [edge] = node.predecessors.as_slice() else {
            return None;
        };
        if edge.exceptional {
            return None;
        }
        let check = &self.instructions[edge.from];
        if check.instruction.opcode != Opcode::InstanceOf {
            return None;
        }
        let dest = check.instruction.register(0)?;
        let object = check.instruction.register(1)?;
        if node.instruction.register(0)? != dest || dest == object {
            return None;
        }

        let narrowed = RegisterType::for_type(self.class_path, check.instruction.type_ref()?);
        let class = narrowed.class.clone()?;
        if !matches!(class.is_interface(), Ok(false)) {
            return None;
        }
        let original = node.pre.get(object as usize)?;
        if !is_not_widening(self.class_path, original, &class) {
            return None;
        }

        let fallthrough = ix + 1;
        let target = self.index_at(node.address, node.instruction.target?).ok()?;
        if target == fallthrough {
            return None;
        }
        let successor = if node.instruction.opcode == Opcode::IfEqz { fallthrough } else { target };

        let mut registers = vec![(object, narrowed.clone())];
        // a move-object right before the check leaves a copy of the same value
        if let [copy_edge] = check.predecessors.as_slice() {
            let copy = &self.instructions[copy_edge.from].instruction;
            if !copy_edge.exceptional
                && matches!(copy.opcode, Opcode::MoveObject | Opcode::MoveObjectFrom16 | Opcode::MoveObject16)
                && copy.register(0) == Some(object)
            {
                if let Some(source) = copy.register(1) {
                    if source != dest && check.pre.get(source as usize) == Some(original) {
                        registers.push((source, narrowed));
                    }
                }
            }
        }
        Some((successor, registers))
    }
}

fn dedup(indices: &mut Vec<usize>) {
    let mut seen = HashSet::new();
    indices.retain(|ix| seen.insert(*ix));
}

fn merge_into(class_path: &ClassPath, state: &mut [RegisterType], values: &[RegisterType]) {
    for (slot, value) in state.iter_mut().zip(values) {
        if value.category != Category::Unknown {
            *slot = slot.merge(value, class_path);
        }
    }
}

/// Whether replacing `original` by `narrowed` keeps or tightens the type.
fn is_not_widening(class_path: &ClassPath, original: &RegisterType, narrowed: &Rc<ClassProto>) -> bool {
    match original.category {
        Category::Null => true,
        Category::Reference => match &original.class {
            None => true,
            Some(class) => match class.is_interface() {
                Ok(true) => matches!(narrowed.implements_interface(class_path, class.descriptor()), Ok(true)),
                Ok(false) => narrowed.common_superclass(class_path, class).descriptor() == class.descriptor(),
                Err(_) => false,
            },
        },
        _ => false,
    }
}

/// Result of analyzing one method.
#[derive(Debug, Clone)]
pub struct MethodAnalysis {
    method: MethodRef,
    instructions: Vec<AnalyzedInstruction>,
    notes: Vec<AnalysisNote>,
}

impl MethodAnalysis {
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    pub fn instructions(&self) -> &[AnalyzedInstruction] {
        &self.instructions
    }

    pub fn instruction_at(&self, address: u32) -> Option<&AnalyzedInstruction> {
        self.instructions.iter().find(|i| i.address == address)
    }

    /// Recovery steps taken, in the order they happened.
    pub fn notes(&self) -> &[AnalysisNote] {
        &self.notes
    }

    /// Rewritten instructions by code address.
    pub fn replacements(&self) -> Vec<(u32, Replacement)> {
        self.instructions.iter().filter_map(|i| i.replacement().map(|r| (i.address, r))).collect()
    }

    /// The method body with every rewrite applied. Code addresses are
    /// preserved.
    pub fn deodexed_instructions(&self) -> Vec<Instruction> {
        self.instructions.iter().flat_map(|i| i.emitted()).collect()
    }

    /// No reachable instruction is left in odex form.
    pub fn is_fully_deodexed(&self) -> bool {
        !self.instructions.iter().any(|i| i.reached && i.is_odexed())
    }

    /// Highest number of times any instruction was analyzed.
    pub fn max_visits(&self) -> u32 {
        self.instructions.iter().map(|i| i.visits).max().unwrap_or(0)
    }
}
