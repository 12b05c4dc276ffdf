//! Per-opcode transfer functions. Each rule computes the post-state of one
//! instruction from its pre-state and, for odex instructions, rewrites the
//! instruction once its operands resolve.
//!
//! A rule returns `Ok(false)` when it parked the instruction with
//! [`MethodAnalyzer::defer`].

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::analysis::class_path::ClassPath;
use crate::analysis::class_proto::ClassProto;
use crate::analysis::error::AnalysisError;
use crate::analysis::method_analyzer::MethodAnalyzer;
use crate::analysis::odex::{deodexed_field_opcode, resolve_field_offset, resolve_vtable_index};
use crate::analysis::register_type::{Category, RegisterType};
use crate::dex::class_def::MethodRef;
use crate::dex::descriptor::{self, MethodProto};
use crate::dex::instruction::{Instruction, Reference};
use crate::dex::opcodes::Opcode;

pub(crate) type Rule = fn(&mut MethodAnalyzer<'_>, usize) -> Result<bool, AnalysisError>;

static RULES: Lazy<HashMap<Opcode, Rule>> = Lazy::new(|| {
    use Opcode::*;
    let mut rules: HashMap<Opcode, Rule> = HashMap::new();
    register(&mut rules, &[Move, MoveFrom16, Move16, MoveWide, MoveWideFrom16, MoveWide16], move_register);
    register(&mut rules, &[MoveObject, MoveObjectFrom16, MoveObject16], move_register);
    register(&mut rules, &[MoveResult, MoveResultWide, MoveResultObject], move_result);
    register(&mut rules, &[MoveException], move_exception);
    register(&mut rules, &[ReturnVoidBarrier, ReturnVoidNoBarrier], return_void_barrier);
    register(&mut rules, &[Const4, Const16, Const], const_literal);
    register(&mut rules, &[ConstHigh16], |a, ix| set_dest(a, ix, Category::Integer));
    register(&mut rules, &[ConstWide16, ConstWide32, ConstWide, ConstWideHigh16], |a, ix| set_dest(a, ix, Category::LongLo));
    register(&mut rules, &[ConstString, ConstStringJumbo], |a, ix| set_dest_class(a, ix, descriptor::STRING));
    register(&mut rules, &[ConstClass], |a, ix| set_dest_class(a, ix, descriptor::CLASS));
    register(&mut rules, &[ConstMethodHandle], |a, ix| set_dest_class(a, ix, descriptor::METHOD_HANDLE));
    register(&mut rules, &[ConstMethodType], |a, ix| set_dest_class(a, ix, descriptor::METHOD_TYPE));
    register(&mut rules, &[CheckCast, NewArray], dest_of_type_ref);
    register(&mut rules, &[InstanceOf], |a, ix| set_dest(a, ix, Category::Boolean));
    register(&mut rules, &[ArrayLength], |a, ix| set_dest(a, ix, Category::Integer));
    register(&mut rules, &[NewInstance], new_instance);
    register(&mut rules, &[CmplFloat, CmpgFloat, CmplDouble, CmpgDouble, CmpLong], |a, ix| set_dest(a, ix, Category::Byte));
    register(&mut rules, &[IfEqz, IfNez], if_zero);
    register(&mut rules, &[Aget], |a, ix| set_dest(a, ix, Category::Integer));
    register(&mut rules, &[AgetBoolean], |a, ix| set_dest(a, ix, Category::Boolean));
    register(&mut rules, &[AgetByte], |a, ix| set_dest(a, ix, Category::Byte));
    register(&mut rules, &[AgetChar], |a, ix| set_dest(a, ix, Category::Char));
    register(&mut rules, &[AgetShort], |a, ix| set_dest(a, ix, Category::Short));
    register(&mut rules, &[AgetWide], aget_wide);
    register(&mut rules, &[AgetObject], aget_object);
    register(&mut rules, &[Iget, IgetWide, IgetObject, IgetBoolean, IgetByte, IgetChar, IgetShort], field_get);
    register(&mut rules, &[Sget, SgetWide, SgetObject, SgetBoolean, SgetByte, SgetChar, SgetShort], field_get);
    register(&mut rules, &[InvokeDirect, InvokeDirectRange], invoke_direct);
    register(
        &mut rules,
        &[
            NegInt, NotInt, NegLong, NotLong, NegFloat, NegDouble, IntToLong, IntToFloat, IntToDouble,
            LongToInt, LongToFloat, LongToDouble, FloatToInt, FloatToLong, FloatToDouble, DoubleToInt,
            DoubleToLong, DoubleToFloat, IntToByte, IntToChar, IntToShort,
        ],
        unary,
    );
    register(
        &mut rules,
        &[
            AddInt, SubInt, MulInt, DivInt, RemInt, ShlInt, ShrInt, UshrInt, AddInt2addr, SubInt2addr,
            MulInt2addr, DivInt2addr, RemInt2addr, ShlInt2addr, ShrInt2addr, UshrInt2addr, AddIntLit16,
            RsubInt, MulIntLit16, DivIntLit16, RemIntLit16, AddIntLit8, RsubIntLit8, MulIntLit8, DivIntLit8,
            RemIntLit8, ShlIntLit8,
        ],
        |a, ix| set_dest(a, ix, Category::Integer),
    );
    register(&mut rules, &[AndInt, OrInt, XorInt], |a, ix| bitwise(a, ix, 1, 2));
    register(&mut rules, &[AndInt2addr, OrInt2addr, XorInt2addr], |a, ix| bitwise(a, ix, 0, 1));
    register(&mut rules, &[AndIntLit16, OrIntLit16, XorIntLit16, AndIntLit8, OrIntLit8, XorIntLit8], bitwise_literal);
    register(&mut rules, &[ShrIntLit8], |a, ix| shift_right_literal(a, ix, false));
    register(&mut rules, &[UshrIntLit8], |a, ix| shift_right_literal(a, ix, true));
    register(
        &mut rules,
        &[
            AddLong, SubLong, MulLong, DivLong, RemLong, AndLong, OrLong, XorLong, ShlLong, ShrLong, UshrLong,
            AddLong2addr, SubLong2addr, MulLong2addr, DivLong2addr, RemLong2addr, AndLong2addr, OrLong2addr,
            XorLong2addr, ShlLong2addr, ShrLong2addr, UshrLong2addr,
        ],
        |a, ix| set_dest(a, ix, Category::LongLo),
    );
    register(
        &mut rules,
        &[
            AddFloat, SubFloat, MulFloat, DivFloat, RemFloat, AddFloat2addr, SubFloat2addr, MulFloat2addr,
            DivFloat2addr, RemFloat2addr,
        ],
        |a, ix| set_dest(a, ix, Category::Float),
    );
    register(
        &mut rules,
        &[
            AddDouble, SubDouble, MulDouble, DivDouble, RemDouble, AddDouble2addr, SubDouble2addr,
            MulDouble2addr, DivDouble2addr, RemDouble2addr,
        ],
        |a, ix| set_dest(a, ix, Category::DoubleLo),
    );
    register(
        &mut rules,
        &[
            IgetQuick, IgetWideQuick, IgetObjectQuick, IgetBooleanQuick, IgetByteQuick, IgetCharQuick,
            IgetShortQuick, IputQuick, IputWideQuick, IputObjectQuick, IputBooleanQuick, IputByteQuick,
            IputCharQuick, IputShortQuick,
        ],
        quick_field,
    );
    register(&mut rules, &[InvokeVirtualQuick, InvokeVirtualQuickRange], invoke_virtual_quick);
    register(&mut rules, &[InvokeSuperQuick, InvokeSuperQuickRange], invoke_super_quick);
    register(&mut rules, &[ExecuteInline, ExecuteInlineRange], execute_inline);
    register(&mut rules, &[InvokeDirectEmpty], invoke_direct_empty);
    register(&mut rules, &[InvokeObjectInitRange], invoke_object_init);
    register(
        &mut rules,
        &[
            IgetVolatile, IgetWideVolatile, IgetObjectVolatile, IputVolatile, IputWideVolatile, IputObjectVolatile,
            SgetVolatile, SgetWideVolatile, SgetObjectVolatile, SputVolatile, SputWideVolatile, SputObjectVolatile,
        ],
        volatile_field,
    );
    rules
});

fn register(rules: &mut HashMap<Opcode, Rule>, ops: &[Opcode], rule: Rule) {
    for op in ops {
        rules.insert(*op, rule);
    }
}

/// Rule for `opcode`. Opcodes without an entry leave every register as it
/// was.
pub(crate) fn rule_for(opcode: Opcode) -> Rule {
    RULES.get(&opcode).copied().unwrap_or(passthrough)
}

fn passthrough(_: &mut MethodAnalyzer<'_>, _: usize) -> Result<bool, AnalysisError> {
    Ok(true)
}

fn set_dest(a: &mut MethodAnalyzer<'_>, ix: usize, category: Category) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    a.set(ix, dest, RegisterType::of(category))?;
    Ok(true)
}

fn set_dest_class(a: &mut MethodAnalyzer<'_>, ix: usize, class: &str) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let value = RegisterType::reference(a.class_path().class(class));
    a.set(ix, dest, value)?;
    Ok(true)
}

fn move_register(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let source = a.operand(ix, 1)?;
    let value = a.pre(ix, source)?;
    a.set(ix, dest, value)?;
    Ok(true)
}

/// Type a result-producing invoke-custom leaves behind. The call site is
/// not resolved, so only the shape of the move-result is known.
fn custom_result(class_path: &ClassPath, move_op: Opcode) -> RegisterType {
    match move_op {
        Opcode::MoveResultWide => RegisterType::of(Category::LongLo),
        Opcode::MoveResultObject => RegisterType::reference(class_path.object_class()),
        _ => RegisterType::of(Category::Integer),
    }
}

fn move_result(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let move_op = a.instruction(ix).opcode;
    let producer = match ix.checked_sub(1) {
        Some(p) if a.instruction(p).opcode.sets_result() => a.instruction(p).clone(),
        _ => analysis_fail!("{} must occur after an invoke-*/fill-new-array instruction", move_op),
    };

    let value = match producer.opcode {
        Opcode::FilledNewArray | Opcode::FilledNewArrayRange => match producer.type_ref() {
            Some(array) => RegisterType::for_type(a.class_path(), array),
            None => analysis_fail!("{} has no array type", producer.opcode),
        },
        Opcode::InvokePolymorphic | Opcode::InvokePolymorphicRange => match &producer.reference2 {
            Some(Reference::MethodProto(proto)) => RegisterType::for_type(a.class_path(), &proto.return_type),
            _ => analysis_fail!("{} has no prototype", producer.opcode),
        },
        Opcode::InvokeCustom | Opcode::InvokeCustomRange => custom_result(a.class_path(), move_op),
        _ => match producer.method_ref() {
            Some(method) if method.proto.return_type != "V" => RegisterType::for_type(a.class_path(), &method.proto.return_type),
            Some(method) => analysis_fail!("Cannot use {} after {}, which returns void", move_op, method),
            None => analysis_fail!("Cannot use {} after an unresolved {}", move_op, producer.opcode),
        },
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn move_exception(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let caught = a.handler_types(a.address(ix));
    if caught.is_empty() {
        analysis_fail!("move-exception must be the first instruction of an exception handler");
    }
    let class_path = a.class_path();
    let mut value = RegisterType::UNKNOWN;
    for exception_type in caught {
        let handler = RegisterType::reference(class_path.class(exception_type.unwrap_or(descriptor::THROWABLE)));
        value = value.merge(&handler, class_path);
    }
    a.set(ix, dest, value)?;
    Ok(true)
}

fn return_void_barrier(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).with_opcode(Opcode::ReturnVoid);
    a.replace(ix, insn);
    Ok(true)
}

fn const_literal(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let value = match a.instruction(ix).literal {
        Some(literal) => RegisterType::for_literal(literal),
        None => analysis_fail!("Constant without a literal"),
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn dest_of_type_ref(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let value = match a.instruction(ix).type_ref() {
        Some(type_desc) => RegisterType::for_type(a.class_path(), type_desc),
        None => analysis_fail!("{} has no type reference", a.instruction(ix).opcode),
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn new_instance(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let value = match a.instruction(ix).type_ref() {
        Some(type_desc) => RegisterType::uninit_ref(a.class_path().class(type_desc)),
        None => analysis_fail!("new-instance has no type reference"),
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn if_zero(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    a.narrow_after_instance_of(ix);
    Ok(true)
}

fn aget_wide(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let array_reg = a.operand(ix, 1)?;
    let array = a.object_type(ix, array_reg)?;
    let value = match (array.category, array.class_descriptor()) {
        (Category::Null, _) => RegisterType::of(Category::LongLo),
        (Category::Reference, Some("[J")) => RegisterType::of(Category::LongLo),
        (Category::Reference, Some("[D")) => RegisterType::of(Category::DoubleLo),
        _ => {
            let failure = AnalysisError::new(format!("Cannot use aget-wide with array type {}", array));
            return a.defer(ix, array_reg, Some(failure));
        }
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn aget_object(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let array_reg = a.operand(ix, 1)?;
    let array = a.object_type(ix, array_reg)?;
    let element = match (array.category, &array.class) {
        (Category::Null, _) => None,
        (Category::Reference, Some(class)) => match class.immediate_element_type() {
            Some(element) if descriptor::is_reference(element) => Some(element.to_string()),
            _ => {
                let failure = AnalysisError::new(format!("Cannot use aget-object with non-object array type {}", array));
                return a.defer(ix, array_reg, Some(failure));
            }
        },
        _ => {
            let failure = AnalysisError::new(format!("Cannot use aget-object with non-array type {}", array));
            return a.defer(ix, array_reg, Some(failure));
        }
    };
    let value = match element {
        Some(element) => RegisterType::for_type(a.class_path(), &element),
        None => RegisterType::NULL,
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

fn field_get(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let dest = a.operand(ix, 0)?;
    let value = match a.instruction(ix).field_ref() {
        Some(field) => RegisterType::for_type(a.class_path(), &field.type_desc),
        None => analysis_fail!("{} has no field reference", a.instruction(ix).opcode),
    };
    a.set(ix, dest, value)?;
    Ok(true)
}

/// A constructor call initializes every copy of the uninitialized
/// reference it is called on.
fn invoke_direct(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).clone();
    let Some(method) = insn.method_ref() else {
        return Ok(true);
    };
    if method.name != "<init>" {
        return Ok(true);
    }
    let object_reg = a.operand(ix, 0)?;
    let object = a.pre(ix, object_reg)?;
    if !matches!(object.category, Category::UninitRef | Category::UninitThis) {
        return Ok(true);
    }
    let Some(class) = object.class.clone() else {
        return Ok(true);
    };

    let initialized = RegisterType::reference(class);
    let registers = a.code().registers;
    for reg in 0..registers {
        if a.pre(ix, reg)? == object {
            a.set(ix, reg, initialized.clone())?;
        }
    }
    Ok(true)
}

fn unary(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    use Opcode::*;
    let category = match a.instruction(ix).opcode {
        NegInt | NotInt | LongToInt | FloatToInt | DoubleToInt => Category::Integer,
        NegLong | NotLong | IntToLong | FloatToLong | DoubleToLong => Category::LongLo,
        NegFloat | IntToFloat | LongToFloat | DoubleToFloat => Category::Float,
        NegDouble | IntToDouble | LongToDouble | FloatToDouble => Category::DoubleLo,
        IntToByte => Category::Byte,
        IntToChar => Category::Char,
        IntToShort => Category::Short,
        other => analysis_fail!("{} is not a unary operation", other),
    };
    set_dest(a, ix, category)
}

/// and, or and xor of two booleans stay boolean.
fn bitwise(a: &mut MethodAnalyzer<'_>, ix: usize, left: usize, right: usize) -> Result<bool, AnalysisError> {
    let left = a.pre(ix, a.operand(ix, left)?)?;
    let right = a.pre(ix, a.operand(ix, right)?)?;
    let category = if left.category.is_boolean_compatible() && right.category.is_boolean_compatible() {
        Category::Boolean
    } else {
        Category::Integer
    };
    set_dest(a, ix, category)
}

fn bitwise_literal(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let source = a.pre(ix, a.operand(ix, 1)?)?;
    let literal = a.instruction(ix).literal.unwrap_or(-1);
    let category = if source.category.is_boolean_compatible() && (literal == 0 || literal == 1) {
        Category::Boolean
    } else {
        Category::Integer
    };
    set_dest(a, ix, category)
}

/// Narrowest type left after shifting a value of `source` right by a
/// literal.
pub(crate) fn literal_shift_type(source: Category, shift: i64, unsigned: bool) -> Category {
    if shift == 0 {
        return source;
    }
    let shift = shift & 0x1f;
    let narrowed = match source {
        Category::Integer | Category::Float if unsigned && shift > 24 => Some(Category::PosByte),
        Category::Integer | Category::Float if unsigned && shift >= 16 => Some(Category::Char),
        Category::Integer | Category::Float if !unsigned && shift >= 24 => Some(Category::Byte),
        Category::Integer | Category::Float if !unsigned && shift >= 16 => Some(Category::Short),
        Category::Short if !unsigned && shift >= 8 => Some(Category::Byte),
        Category::PosShort if shift >= 8 => Some(Category::PosByte),
        Category::Char if shift > 8 => Some(Category::PosByte),
        Category::PosByte => Some(Category::PosByte),
        Category::Null | Category::One | Category::Boolean => Some(Category::Null),
        _ => None,
    };
    match narrowed {
        Some(category) => category,
        None if unsigned => Category::Integer,
        None => source,
    }
}

fn shift_right_literal(a: &mut MethodAnalyzer<'_>, ix: usize, unsigned: bool) -> Result<bool, AnalysisError> {
    let source = a.pre(ix, a.operand(ix, 1)?)?;
    let shift = a.instruction(ix).literal.unwrap_or(0);
    set_dest(a, ix, literal_shift_type(source.category, shift, unsigned))
}

/// Class an odex instruction is applied to, or a deferral when the object
/// register does not hold a usable reference yet.
enum ObjectClass {
    Known(Rc<ClassProto>),
    /// Always null; stays unresolvable unless a fallback supplies a type.
    Null,
    Unusable(AnalysisError),
}

fn object_class(a: &MethodAnalyzer<'_>, ix: usize, object_reg: u16) -> Result<ObjectClass, AnalysisError> {
    let object = a.object_type(ix, object_reg)?;
    let opcode = a.instruction(ix).opcode;
    Ok(match (object.category, &object.class) {
        (Category::Null, _) => ObjectClass::Null,
        (Category::Reference | Category::UninitRef | Category::UninitThis, Some(class)) if !class.is_unknown() => {
            ObjectClass::Known(class.clone())
        }
        _ => ObjectClass::Unusable(AnalysisError::new(format!(
            "Cannot use {} with a non-reference register type {}",
            opcode, object
        ))),
    })
}

fn quick_field(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).clone();
    let offset = match insn.reference {
        Some(Reference::FieldOffset(offset)) => offset,
        _ => analysis_fail!("{} has no field offset", insn.opcode),
    };
    let object_reg = a.operand(ix, 1)?;
    let class = match object_class(a, ix, object_reg)? {
        ObjectClass::Known(class) => class,
        ObjectClass::Null => return a.defer(ix, object_reg, None),
        ObjectClass::Unusable(failure) => return a.defer(ix, object_reg, Some(failure)),
    };

    let accessor = a.class_def().descriptor.as_str();
    let field = match resolve_field_offset(a.class_path(), accessor, &class, offset) {
        Ok(field) => field,
        Err(failure) => return a.defer(ix, object_reg, Some(failure)),
    };
    let Some(opcode) = deodexed_field_opcode(insn.opcode, &field.type_desc) else {
        let failure = AnalysisError::new(format!("Incorrect field type {} for {}", field.type_desc, insn.opcode));
        return a.defer(ix, object_reg, Some(failure));
    };

    let mut deodexed = insn.with_opcode(opcode);
    deodexed.reference = Some(Reference::Field(field));
    a.replace(ix, deodexed);
    rule_for(opcode)(a, ix)
}

fn invoke_virtual_quick(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).clone();
    let index = match insn.reference {
        Some(Reference::VtableIndex(index)) => index,
        _ => analysis_fail!("{} has no vtable index", insn.opcode),
    };
    let object_reg = a.operand(ix, 0)?;
    let class = match object_class(a, ix, object_reg)? {
        ObjectClass::Known(class) => class,
        ObjectClass::Null => return a.defer(ix, object_reg, None),
        ObjectClass::Unusable(failure) => return a.defer(ix, object_reg, Some(failure)),
    };

    let accessor = a.class_def().descriptor.as_str();
    let method = match resolve_vtable_index(a.class_path(), accessor, &class, index, false) {
        Ok(method) => method,
        Err(failure) => return a.defer(ix, object_reg, Some(failure)),
    };
    let opcode = if insn.opcode.format().is_range() { Opcode::InvokeVirtualRange } else { Opcode::InvokeVirtual };
    let mut deodexed = insn.with_opcode(opcode);
    deodexed.reference = Some(Reference::Method(method));
    a.replace(ix, deodexed);
    Ok(true)
}

/// The target is looked up in the superclass of the class being analyzed,
/// so no register type is involved.
fn invoke_super_quick(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).clone();
    let index = match insn.reference {
        Some(Reference::VtableIndex(index)) => index,
        _ => analysis_fail!("{} has no vtable index", insn.opcode),
    };
    let class_def = a.class_def();
    let Some(superclass) = &class_def.superclass else {
        analysis_fail!("{} in {}, which has no superclass", insn.opcode, class_def.descriptor);
    };
    let class = a.class_path().class(superclass);
    let method = resolve_vtable_index(a.class_path(), &class_def.descriptor, &class, index, true)?;
    let opcode = if insn.opcode.format().is_range() { Opcode::InvokeSuperRange } else { Opcode::InvokeSuper };
    let mut deodexed = insn.with_opcode(opcode);
    deodexed.reference = Some(Reference::Method(method));
    a.replace(ix, deodexed);
    Ok(true)
}

fn execute_inline(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).clone();
    let index = match insn.reference {
        Some(Reference::InlineIndex(index)) => index,
        _ => analysis_fail!("{} has no inline index", insn.opcode),
    };
    let Some(inline) = a.class_path().inline_resolver().resolve(index) else {
        analysis_fail!("Invalid inline index {}", index);
    };
    let mut deodexed = insn.with_opcode(inline.invoke_opcode(insn.opcode.format().is_range()));
    deodexed.reference = Some(Reference::Method(inline.method.clone()));
    a.replace(ix, deodexed);
    Ok(true)
}

fn invoke_direct_empty(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn = a.instruction(ix).with_opcode(Opcode::InvokeDirect);
    a.replace(ix, insn);
    invoke_direct(a, ix)
}

fn invoke_object_init(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let mut insn = a.instruction(ix).with_opcode(Opcode::InvokeDirectRange);
    let init = MethodRef::new(descriptor::OBJECT, "<init>", MethodProto::new(&[], "V"));
    insn.reference = Some(Reference::Method(init));
    a.replace(ix, insn);
    invoke_direct(a, ix)
}

fn volatile_field(a: &mut MethodAnalyzer<'_>, ix: usize) -> Result<bool, AnalysisError> {
    let insn: Instruction = a.instruction(ix).clone();
    let Some(field) = insn.field_ref() else {
        analysis_fail!("{} has no field reference", insn.opcode);
    };
    let Some(opcode) = deodexed_field_opcode(insn.opcode, &field.type_desc) else {
        analysis_fail!("Incorrect field type {} for {}", field.type_desc, insn.opcode);
    };
    a.replace(ix, insn.with_opcode(opcode));
    rule_for(opcode)(a, ix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_shifts_narrow_integers() {
        assert_eq!(literal_shift_type(Category::Integer, 24, false), Category::Byte);
        assert_eq!(literal_shift_type(Category::Integer, 16, false), Category::Short);
        assert_eq!(literal_shift_type(Category::Integer, 25, true), Category::PosByte);
        assert_eq!(literal_shift_type(Category::Integer, 24, true), Category::Char);
        assert_eq!(literal_shift_type(Category::Integer, 8, true), Category::Integer);
        // only the low five bits of the shift count
        assert_eq!(literal_shift_type(Category::Integer, 56, false), Category::Byte);
    }

    #[test]
    fn literal_shifts_of_small_values() {
        assert_eq!(literal_shift_type(Category::Short, 8, false), Category::Byte);
        assert_eq!(literal_shift_type(Category::Short, 8, true), Category::Integer);
        assert_eq!(literal_shift_type(Category::PosShort, 8, true), Category::PosByte);
        assert_eq!(literal_shift_type(Category::Char, 9, true), Category::PosByte);
        assert_eq!(literal_shift_type(Category::Char, 8, true), Category::Integer);
        assert_eq!(literal_shift_type(Category::Boolean, 1, false), Category::Null);
        assert_eq!(literal_shift_type(Category::Byte, 0, true), Category::Byte);
        assert_eq!(literal_shift_type(Category::Float, 4, false), Category::Float);
    }

    #[test]
    fn unregistered_opcodes_pass_through() {
        assert_eq!(rule_for(Opcode::Nop) as usize, passthrough as Rule as usize);
        assert_ne!(rule_for(Opcode::IgetQuick) as usize, passthrough as Rule as usize);
    }
}
