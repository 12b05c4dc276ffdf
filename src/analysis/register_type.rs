//! Register type lattice used by the method analyzer.

use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::analysis::class_path::ClassPath;
use crate::analysis::class_proto::ClassProto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Nothing flowed here yet; identity of the join.
    Unknown,
    /// Register never written on some path.
    Uninit,
    /// `this` inside a constructor before the superclass constructor ran.
    UninitThis,
    /// Result of new-instance before its constructor ran.
    UninitRef,
    Null,
    One,
    Boolean,
    Byte,
    PosByte,
    Short,
    PosShort,
    Char,
    Integer,
    Float,
    LongLo,
    LongHi,
    DoubleLo,
    DoubleHi,
    Reference,
    /// Incompatible values merged.
    Conflict,
}

const CATEGORY_COUNT: usize = 20;

const ALL_CATEGORIES: [Category; CATEGORY_COUNT] = [
    Category::Unknown,
    Category::Uninit,
    Category::UninitThis,
    Category::UninitRef,
    Category::Null,
    Category::One,
    Category::Boolean,
    Category::Byte,
    Category::PosByte,
    Category::Short,
    Category::PosShort,
    Category::Char,
    Category::Integer,
    Category::Float,
    Category::LongLo,
    Category::LongHi,
    Category::DoubleLo,
    Category::DoubleHi,
    Category::Reference,
    Category::Conflict,
];

/// Immediate "is narrower than" edges of the lattice. Unknown sits below
/// everything and Conflict above everything.
const NARROWER_THAN: &[(Category, Category)] = &[
    (Category::Null, Category::Boolean),
    (Category::One, Category::Boolean),
    (Category::Null, Category::Reference),
    (Category::Boolean, Category::PosByte),
    (Category::Boolean, Category::Float),
    (Category::PosByte, Category::Byte),
    (Category::PosByte, Category::PosShort),
    (Category::Byte, Category::Short),
    (Category::PosShort, Category::Short),
    (Category::PosShort, Category::Char),
    (Category::Short, Category::Integer),
    (Category::Char, Category::Integer),
    (Category::Float, Category::Integer),
    (Category::DoubleLo, Category::LongLo),
    (Category::DoubleHi, Category::LongHi),
];

/// For every category, the bit set of categories at or above it.
static UPPER_SETS: Lazy<[u32; CATEGORY_COUNT]> = Lazy::new(|| {
    let mut upper = [0u32; CATEGORY_COUNT];
    for c in ALL_CATEGORIES {
        upper[c as usize] = c.bit() | Category::Conflict.bit();
    }
    upper[Category::Unknown as usize] = u32::MAX >> (32 - CATEGORY_COUNT);
    // transitive closure; the edge list is short, iterate until stable
    let mut changed = true;
    while changed {
        changed = false;
        for (lower, higher) in NARROWER_THAN {
            let merged = upper[*lower as usize] | upper[*higher as usize];
            if merged != upper[*lower as usize] {
                upper[*lower as usize] = merged;
                changed = true;
            }
        }
    }
    upper
});

impl Category {
    fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Least upper bound of two categories.
    pub fn join(self, other: Category) -> Category {
        let upper = &*UPPER_SETS;
        let common = upper[self as usize] & upper[other as usize];
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| upper[*c as usize] == common)
            .unwrap_or(Category::Conflict)
    }

    /// Whether `self` is at or below `other`.
    pub fn is_narrower_or_equal(self, other: Category) -> bool {
        UPPER_SETS[self as usize] & other.bit() != 0
    }

    pub fn is_wide_low(self) -> bool {
        matches!(self, Category::LongLo | Category::DoubleLo)
    }

    pub fn is_wide_high(self) -> bool {
        matches!(self, Category::LongHi | Category::DoubleHi)
    }

    /// Categories that may be used as a boolean operand.
    pub fn is_boolean_compatible(self) -> bool {
        matches!(self, Category::Null | Category::One | Category::Boolean)
    }

    pub fn is_reference_like(self) -> bool {
        matches!(self, Category::Null | Category::Reference | Category::UninitRef | Category::UninitThis)
    }

    pub fn all() -> &'static [Category] {
        &ALL_CATEGORIES
    }
}

/// Inferred type of one register at one program point.
#[derive(Clone)]
pub struct RegisterType {
    pub category: Category,
    /// Class for reference, uninit-ref and uninit-this categories.
    pub class: Option<Rc<ClassProto>>,
}

impl PartialEq for RegisterType {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.class_descriptor() == other.class_descriptor()
    }
}

impl Eq for RegisterType {}

impl fmt::Debug for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class_descriptor() {
            Some(class) => write!(f, "{:?},{}", self.category, class),
            None => write!(f, "{:?}", self.category),
        }
    }
}

impl RegisterType {
    pub const fn of(category: Category) -> Self {
        RegisterType { category, class: None }
    }

    pub fn reference(class: Rc<ClassProto>) -> Self {
        RegisterType { category: Category::Reference, class: Some(class) }
    }

    pub fn uninit_ref(class: Rc<ClassProto>) -> Self {
        RegisterType { category: Category::UninitRef, class: Some(class) }
    }

    pub fn uninit_this(class: Rc<ClassProto>) -> Self {
        RegisterType { category: Category::UninitThis, class: Some(class) }
    }

    pub const UNKNOWN: RegisterType = RegisterType::of(Category::Unknown);
    pub const UNINIT: RegisterType = RegisterType::of(Category::Uninit);
    pub const NULL: RegisterType = RegisterType::of(Category::Null);
    pub const CONFLICT: RegisterType = RegisterType::of(Category::Conflict);

    pub fn class_descriptor(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.descriptor())
    }

    /// Register type for a value of the given type descriptor. Wide types
    /// yield the low half.
    pub fn for_type(class_path: &ClassPath, type_desc: &str) -> RegisterType {
        match type_desc {
            "Z" => RegisterType::of(Category::Boolean),
            "B" => RegisterType::of(Category::Byte),
            "S" => RegisterType::of(Category::Short),
            "C" => RegisterType::of(Category::Char),
            "I" => RegisterType::of(Category::Integer),
            "F" => RegisterType::of(Category::Float),
            "J" => RegisterType::of(Category::LongLo),
            "D" => RegisterType::of(Category::DoubleLo),
            "V" => RegisterType::UNKNOWN,
            _ => RegisterType::reference(class_path.class(type_desc)),
        }
    }

    /// Narrowest category that can hold a 32-bit literal.
    pub fn for_literal(value: i64) -> RegisterType {
        let category = if value < -32768 {
            Category::Integer
        } else if value < -128 {
            Category::Short
        } else if value < 0 {
            Category::Byte
        } else if value == 0 {
            Category::Null
        } else if value == 1 {
            Category::One
        } else if value < 128 {
            Category::PosByte
        } else if value < 32768 {
            Category::PosShort
        } else if value < 65536 {
            Category::Char
        } else {
            Category::Integer
        };
        RegisterType::of(category)
    }

    /// High half matching a wide low half.
    pub fn wide_high(&self) -> Option<RegisterType> {
        match self.category {
            Category::LongLo => Some(RegisterType::of(Category::LongHi)),
            Category::DoubleLo => Some(RegisterType::of(Category::DoubleHi)),
            _ => None,
        }
    }

    /// Least upper bound. Reference classes merge to their common superclass;
    /// uninitialized references of different classes conflict.
    pub fn merge(&self, other: &RegisterType, class_path: &ClassPath) -> RegisterType {
        if self == other || other.category == Category::Unknown {
            return self.clone();
        }
        if self.category == Category::Unknown {
            return other.clone();
        }
        let category = self.category.join(other.category);
        match category {
            Category::Reference => {
                let class = match (&self.class, &other.class) {
                    (Some(a), Some(b)) => Some(a.common_superclass(class_path, b)),
                    (Some(a), None) if other.category == Category::Null => Some(a.clone()),
                    (None, Some(b)) if self.category == Category::Null => Some(b.clone()),
                    _ => None,
                };
                RegisterType { category, class }
            }
            // equal uninitialized values were handled above
            Category::UninitRef | Category::UninitThis => RegisterType::CONFLICT,
            _ => RegisterType::of(category),
        }
    }
}
