//! Class hierarchy model and the method analyzer built on top of it.

#[macro_use]
pub mod error;

pub mod analyzed_instruction;
pub mod class_path;
pub mod class_proto;
pub mod deodexer;
mod fallback;
pub mod field_layout;
pub mod inline;
pub mod method_analyzer;
pub mod odex;
pub mod quickening;
pub mod register_type;
mod transfer;
pub mod vtable;

pub use analyzed_instruction::{AnalysisNote, AnalyzedInstruction, NoteKind, Replacement};
pub use class_path::{ClassPath, ClassPathConfig, ClassProvider, ClassSet};
pub use class_proto::ClassProto;
pub use deodexer::{deodex_class, deodex_classes, ClassDeodex, MethodOutcome};
pub use error::{AnalysisError, Resolved, UnresolvedClass};
pub use method_analyzer::{analyze_method, MethodAnalysis, MethodAnalyzer};
pub use quickening::{unquicken, QuickeningInfo};
pub use register_type::{Category, RegisterType};
