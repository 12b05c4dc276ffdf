//! Instance field offset assignment, replicating Dalvik's
//! `computeFieldOffsets` and ART's `ClassLinker::LinkFields` for the two
//! generations of ART field ordering.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{trace, warn};
use num_traits::PrimInt;

use crate::analysis::class_path::{ArtLayoutVariant, ClassPath, FieldLayoutStrategy};
use crate::analysis::error::Resolved;
use crate::dex::class_def::{ClassDef, FieldDef, FieldRef};
use crate::dex::descriptor;

/// Instance fields of a class and all its superclasses by byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLayout {
    fields: BTreeMap<u32, FieldRef>,
    size: u32,
}

impl FieldLayout {
    pub fn field_at(&self, offset: u32) -> Option<&FieldRef> {
        self.fields.get(&offset)
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.fields.iter().rev().find(|(_, f)| f.name == name).map(|(offset, _)| *offset)
    }

    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldRef)> {
        self.fields.iter().map(|(offset, field)| (*offset, field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Object size, which is also where a subclass starts placing fields.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// End of the field with the highest offset.
    fn last_field_end(&self, size_of: fn(&str) -> u32) -> Option<u32> {
        self.fields.iter().next_back().map(|(offset, field)| offset + size_of(&field.type_desc))
    }
}

fn align_up<T: PrimInt>(value: T, alignment: T) -> T {
    let mask = alignment - T::one();
    (value + mask) & !mask
}

fn is_aligned<T: PrimInt>(value: T, alignment: T) -> bool {
    value & (alignment - T::one()) == T::zero()
}

pub(crate) fn compute(class_path: &ClassPath, def: &ClassDef) -> Resolved<FieldLayout> {
    let mut complete = true;
    let inherited = match &def.superclass {
        Some(superclass) => match class_path.class(superclass).field_layout(class_path) {
            Ok(layout) => {
                complete = layout.complete;
                Some(layout.value.clone())
            }
            Err(e) => {
                warn!("{} while laying out {}, assuming no inherited fields", e, def.descriptor);
                complete = false;
                None
            }
        },
        None => None,
    };

    let own: Vec<&FieldDef> = def.instance_fields().collect();
    let layout = match class_path.field_layout_strategy() {
        FieldLayoutStrategy::Dalvik => dalvik_layout(&def.descriptor, inherited, own),
        FieldLayoutStrategy::Art(variant) => art_layout(&def.descriptor, inherited, own, variant),
    };
    trace!("{} field layout: {:?}", def.descriptor, layout.fields);
    Resolved { value: layout, complete }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DalvikKind {
    Reference,
    Wide,
    Other,
}

fn dalvik_kind(type_desc: &str) -> DalvikKind {
    if descriptor::is_reference(type_desc) {
        DalvikKind::Reference
    } else if descriptor::is_wide(type_desc) {
        DalvikKind::Wide
    } else {
        DalvikKind::Other
    }
}

fn dalvik_size(type_desc: &str) -> u32 {
    if descriptor::is_wide(type_desc) {
        8
    } else {
        4
    }
}

/// Moves fields of `kind` to the front of `fields[front..]` by swapping the
/// first non-matching field with the last matching one. Returns the index of
/// the first non-matching field afterwards.
fn group_to_front(fields: &mut [(DalvikKind, &FieldDef)], mut front: usize, kind: DalvikKind) -> usize {
    let count = fields.len();
    let mut back = count;
    while front < count {
        if fields[front].0 != kind {
            while back > front + 1 {
                back -= 1;
                if fields[back].0 == kind {
                    fields.swap(front, back);
                    break;
                }
            }
        }
        if fields[front].0 != kind {
            break;
        }
        front += 1;
    }
    front
}

fn dalvik_layout(class: &str, inherited: Option<FieldLayout>, own: Vec<&FieldDef>) -> FieldLayout {
    // dex order: fields are stored sorted by name, then type
    let mut sorted = own;
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.type_desc.cmp(&b.type_desc)));
    let mut fields: Vec<(DalvikKind, &FieldDef)> = sorted.into_iter().map(|f| (dalvik_kind(&f.type_desc), f)).collect();
    let count = fields.len();

    let mut front = group_to_front(&mut fields, 0, DalvikKind::Reference);

    let mut layout = inherited.unwrap_or_default();
    let mut offset = layout.last_field_end(dalvik_size).unwrap_or(8);

    // wide fields must land on 8 byte boundaries; if the first one would not,
    // pull a 32-bit field in front of it
    let field_index_mod = if offset % 8 == 0 { 0 } else { 1 };
    if front < count && front % 2 != field_index_mod {
        if fields[front].0 == DalvikKind::Wide {
            let mut back = count - 1;
            while back > front {
                if fields[back].0 == DalvikKind::Other {
                    fields.swap(front, back);
                    front += 1;
                    break;
                }
                back -= 1;
            }
        } else {
            front += 1;
        }
    }

    group_to_front(&mut fields, front, DalvikKind::Wide);

    let mut seen_wide = false;
    for (kind, field) in fields {
        if kind == DalvikKind::Wide && !seen_wide {
            if offset % 8 != 0 {
                offset += 4;
            }
            seen_wide = true;
        }
        layout.fields.insert(offset, field.reference(class));
        offset += dalvik_size(&field.type_desc);
    }
    layout.size = offset;
    layout
}

/// Field size in bytes as laid out by ART.
pub fn art_size(type_desc: &str) -> u32 {
    match type_desc.as_bytes().first() {
        Some(b'J') | Some(b'D') => 8,
        Some(b'L') | Some(b'[') | Some(b'I') | Some(b'F') => 4,
        Some(b'S') | Some(b'C') => 2,
        _ => 1,
    }
}

/// Position in ART's `Primitive::Type` enumeration.
fn art_primitive_order(type_desc: &str) -> u8 {
    match type_desc {
        "Z" => 1,
        "B" => 2,
        "C" => 3,
        "S" => 4,
        "I" => 5,
        "J" => 6,
        "F" => 7,
        "D" => 8,
        _ => 0,
    }
}

fn legacy_group(type_desc: &str) -> u8 {
    if descriptor::is_reference(type_desc) {
        0
    } else if descriptor::is_wide(type_desc) {
        1
    } else {
        2
    }
}

fn compare_legacy(a: &FieldDef, b: &FieldDef) -> Ordering {
    legacy_group(&a.type_desc)
        .cmp(&legacy_group(&b.type_desc))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.type_desc.cmp(&b.type_desc))
}

fn compare_current(a: &FieldDef, b: &FieldDef) -> Ordering {
    let a_ref = descriptor::is_reference(&a.type_desc);
    let b_ref = descriptor::is_reference(&b.type_desc);
    // same group: dex field index order, i.e. name then type
    let by_index = || a.name.cmp(&b.name).then_with(|| a.type_desc.cmp(&b.type_desc));
    match (a_ref, b_ref) {
        (true, true) => by_index(),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => art_size(&b.type_desc)
            .cmp(&art_size(&a.type_desc))
            .then_with(|| art_primitive_order(&a.type_desc).cmp(&art_primitive_order(&b.type_desc)))
            .then_with(by_index),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldGap {
    offset: u32,
    size: u32,
}

/// Unused byte ranges left behind by alignment, handed out in the order the
/// runtime's priority queue would.
struct FieldGaps {
    gaps: Vec<FieldGap>,
    variant: ArtLayoutVariant,
}

impl FieldGaps {
    fn new(variant: ArtLayoutVariant) -> Self {
        FieldGaps { gaps: Vec::new(), variant }
    }

    fn priority(&self, a: &FieldGap, b: &FieldGap) -> Ordering {
        match self.variant {
            ArtLayoutVariant::Current => b.size.cmp(&a.size).then_with(|| a.offset.cmp(&b.offset)),
            ArtLayoutVariant::Legacy => a.size.cmp(&b.size).then_with(|| b.offset.cmp(&a.offset)),
        }
    }

    /// Splits `[start, end)` into naturally aligned 4, 2 and 1 byte gaps.
    fn add(&mut self, start: u32, end: u32) {
        let mut offset = start;
        while offset < end {
            let remaining = end - offset;
            let size = if remaining >= 4 && is_aligned(offset, 4) {
                4
            } else if remaining >= 2 && is_aligned(offset, 2) {
                2
            } else {
                1
            };
            self.gaps.push(FieldGap { offset, size });
            offset += size;
        }
    }

    fn peek(&self) -> Option<(usize, FieldGap)> {
        self.gaps
            .iter()
            .copied()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.priority(a, b))
    }

    fn take(&mut self, ix: usize) -> FieldGap {
        self.gaps.swap_remove(ix)
    }
}

fn art_layout(
    class: &str,
    inherited: Option<FieldLayout>,
    own: Vec<&FieldDef>,
    variant: ArtLayoutVariant,
) -> FieldLayout {
    let mut fields = own;
    match variant {
        ArtLayoutVariant::Legacy => fields.sort_by(|a, b| compare_legacy(a, b)),
        ArtLayoutVariant::Current => fields.sort_by(|a, b| compare_current(a, b)),
    }

    let mut layout = inherited.unwrap_or_default();
    let mut offset = layout.last_field_end(art_size).unwrap_or(0);
    let mut gaps = FieldGaps::new(variant);
    let mut ix = 0;

    while ix < fields.len() && descriptor::is_reference(&fields[ix].type_desc) {
        if !is_aligned(offset, 4) {
            let aligned = align_up(offset, 4);
            gaps.add(offset, aligned);
            offset = aligned;
        }
        layout.fields.insert(offset, fields[ix].reference(class));
        offset += 4;
        ix += 1;
    }

    for n in [8, 4, 2, 1] {
        ix = shuffle_forward(class, &fields, ix, n, &mut offset, &mut gaps, &mut layout);
    }

    layout.size = offset;
    layout
}

/// Places fields from `start` while they are at least `n` bytes wide,
/// aligning the frontier to `n` and reusing gaps that fit. Returns the index
/// of the first field left for a narrower pass.
fn shuffle_forward(
    class: &str,
    fields: &[&FieldDef],
    start: usize,
    n: u32,
    offset: &mut u32,
    gaps: &mut FieldGaps,
    layout: &mut FieldLayout,
) -> usize {
    let mut ix = start;
    while ix < fields.len() {
        let field = fields[ix];
        let size = art_size(&field.type_desc);
        if size < n {
            break;
        }
        if !is_aligned(*offset, n) {
            let aligned = align_up(*offset, n);
            gaps.add(*offset, aligned);
            *offset = aligned;
        }
        match gaps.peek() {
            Some((gap_ix, gap)) if gap.size >= size => {
                gaps.take(gap_ix);
                layout.fields.insert(gap.offset, field.reference(class));
                if gap.size > size {
                    gaps.add(gap.offset + size, gap.offset + gap.size);
                }
            }
            _ => {
                layout.fields.insert(*offset, field.reference(class));
                *offset += size;
            }
        }
        ix += 1;
    }
    ix
}
