//! Lookups that turn odex operands (field offsets, vtable indices) back
//! into symbolic references.

use std::rc::Rc;

use crate::analysis::class_path::ClassPath;
use crate::analysis::class_proto::ClassProto;
use crate::analysis::error::AnalysisError;
use crate::dex::class_def::{ClassDef, FieldRef, MethodRef};
use crate::dex::descriptor;
use crate::dex::opcodes::Opcode;

/// Whether code in `accessor` may name `class`: it is public or lives in
/// the same package.
pub fn can_access_class(accessor: &str, class: &ClassDef) -> bool {
    class.access.is_public() || descriptor::same_package(accessor, &class.descriptor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldWidth {
    /// Any 32-bit or narrower primitive.
    Narrow,
    Wide,
    Object,
    /// Exactly this slot of an accessor group.
    Exact(usize),
}

const IGET: [Opcode; 7] = [
    Opcode::Iget, Opcode::IgetWide, Opcode::IgetObject, Opcode::IgetBoolean,
    Opcode::IgetByte, Opcode::IgetChar, Opcode::IgetShort,
];
const IPUT: [Opcode; 7] = [
    Opcode::Iput, Opcode::IputWide, Opcode::IputObject, Opcode::IputBoolean,
    Opcode::IputByte, Opcode::IputChar, Opcode::IputShort,
];
const SGET: [Opcode; 7] = [
    Opcode::Sget, Opcode::SgetWide, Opcode::SgetObject, Opcode::SgetBoolean,
    Opcode::SgetByte, Opcode::SgetChar, Opcode::SgetShort,
];
const SPUT: [Opcode; 7] = [
    Opcode::Sput, Opcode::SputWide, Opcode::SputObject, Opcode::SputBoolean,
    Opcode::SputByte, Opcode::SputChar, Opcode::SputShort,
];

fn field_accessor(odex: Opcode) -> Option<(&'static [Opcode; 7], FieldWidth)> {
    use FieldWidth::*;
    use Opcode::*;
    Some(match odex {
        IgetQuick | IgetVolatile => (&IGET, Narrow),
        IgetWideQuick | IgetWideVolatile => (&IGET, Wide),
        IgetObjectQuick | IgetObjectVolatile => (&IGET, Object),
        IgetBooleanQuick => (&IGET, Exact(3)),
        IgetByteQuick => (&IGET, Exact(4)),
        IgetCharQuick => (&IGET, Exact(5)),
        IgetShortQuick => (&IGET, Exact(6)),
        IputQuick | IputVolatile => (&IPUT, Narrow),
        IputWideQuick | IputWideVolatile => (&IPUT, Wide),
        IputObjectQuick | IputObjectVolatile => (&IPUT, Object),
        IputBooleanQuick => (&IPUT, Exact(3)),
        IputByteQuick => (&IPUT, Exact(4)),
        IputCharQuick => (&IPUT, Exact(5)),
        IputShortQuick => (&IPUT, Exact(6)),
        SgetVolatile => (&SGET, Narrow),
        SgetWideVolatile => (&SGET, Wide),
        SgetObjectVolatile => (&SGET, Object),
        SputVolatile => (&SPUT, Narrow),
        SputWideVolatile => (&SPUT, Wide),
        SputObjectVolatile => (&SPUT, Object),
        _ => return None,
    })
}

/// Slot of a field type in an accessor group.
fn field_slot(field_type: &str) -> Option<usize> {
    match field_type.as_bytes().first()? {
        b'I' | b'F' => Some(0),
        b'J' | b'D' => Some(1),
        b'L' | b'[' => Some(2),
        b'Z' => Some(3),
        b'B' => Some(4),
        b'C' => Some(5),
        b'S' => Some(6),
        _ => None,
    }
}

/// Plain field accessor replacing a quick or volatile one, chosen by the
/// resolved field type. `None` when the field type does not fit the odex
/// opcode, e.g. a wide field under iget-quick.
pub fn deodexed_field_opcode(odex: Opcode, field_type: &str) -> Option<Opcode> {
    let (group, width) = field_accessor(odex)?;
    let slot = field_slot(field_type)?;
    let fits = match width {
        FieldWidth::Narrow => !matches!(slot, 1 | 2),
        FieldWidth::Wide => slot == 1,
        FieldWidth::Object => slot == 2,
        FieldWidth::Exact(expected) => slot == expected,
    };
    if fits {
        Some(group[slot])
    } else {
        None
    }
}

/// First class walking up from `start` that `accessor` may name.
fn first_accessible(class_path: &ClassPath, accessor: &str, start: &str, what: &str) -> Result<Rc<ClassDef>, AnalysisError> {
    let mut class = class_path.class_def(start)?;
    while !can_access_class(accessor, &class) {
        class = match &class.superclass {
            Some(superclass) => class_path.class_def(superclass)?,
            None => analysis_fail!("Couldn't find accessible class while resolving {}", what),
        };
    }
    Ok(class)
}

/// Field at `offset` in instances of `object`. When the declaring class is
/// not accessible from `accessor`, the field is named through the first
/// accessible class above `object` instead, as the runtime would.
pub fn resolve_field_offset(
    class_path: &ClassPath,
    accessor: &str,
    object: &Rc<ClassProto>,
    offset: u32,
) -> Result<FieldRef, AnalysisError> {
    let field = match object.field_by_offset(class_path, offset)? {
        Some(field) => field,
        None => analysis_fail!("Could not resolve the field in class {} at offset {}", object.descriptor(), offset),
    };
    let declaring = class_path.class_def(&field.class)?;
    if can_access_class(accessor, &declaring) {
        return Ok(field);
    }

    let class = first_accessible(class_path, accessor, object.descriptor(), &field.to_string())?;
    match class_path.class(&class.descriptor).field_by_offset(class_path, offset)? {
        Some(visible) => Ok(FieldRef::new(&class.descriptor, &visible.name, &visible.type_desc)),
        None => analysis_fail!("Couldn't find accessible class while resolving field {}", field),
    }
}

/// Method in vtable slot `index` of `object`, with the same accessibility
/// walk as [`resolve_field_offset`]. Super calls skip the walk since a
/// class can always name its superclass.
pub fn resolve_vtable_index(
    class_path: &ClassPath,
    accessor: &str,
    object: &Rc<ClassProto>,
    index: u32,
    is_super: bool,
) -> Result<MethodRef, AnalysisError> {
    let entry = match object.method_by_vtable_index(class_path, index as usize)? {
        Some(entry) => entry,
        None => analysis_fail!("Could not resolve the method in class {} at index {}", object.descriptor(), index),
    };
    let method = entry.method;
    if is_super || object.is_array() {
        return Ok(method);
    }
    let declaring = class_path.class_def(&method.class)?;
    if can_access_class(accessor, &declaring) {
        return Ok(method);
    }

    let class = first_accessible(class_path, accessor, object.descriptor(), &method.to_string())?;
    match class_path.class(&class.descriptor).method_by_vtable_index(class_path, index as usize)? {
        Some(visible) => Ok(visible.method.with_class(&class.descriptor)),
        None => analysis_fail!("Couldn't find accessible class while resolving method {}", method),
    }
}
