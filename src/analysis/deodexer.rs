use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::analyzed_instruction::AnalysisNote;
use crate::analysis::class_path::ClassPath;
use crate::analysis::error::AnalysisError;
use crate::analysis::method_analyzer::analyze_method;
use crate::dex::class_def::{ClassDef, MethodRef};

/// What happened to one method that carried odex instructions.
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    /// Rewritten, possibly with notes about recovered types.
    Deodexed { method: MethodRef, notes: Vec<AnalysisNote> },
    /// Analysis failed; the method body was left as it was.
    Failed { method: MethodRef, error: AnalysisError },
}

impl MethodOutcome {
    pub fn method(&self) -> &MethodRef {
        match self {
            MethodOutcome::Deodexed { method, .. } | MethodOutcome::Failed { method, .. } => method,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MethodOutcome::Failed { .. })
    }
}

/// Summary counts for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeodexStats {
    pub methods: usize,
    pub deodexed: usize,
    pub failed: usize,
    pub notes: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDeodex {
    pub class_def: ClassDef,
    pub outcomes: Vec<MethodOutcome>,
}

impl ClassDeodex {
    pub fn stats(&self) -> DeodexStats {
        let mut stats = DeodexStats { methods: self.outcomes.len(), ..Default::default() };
        for outcome in &self.outcomes {
            match outcome {
                MethodOutcome::Deodexed { notes, .. } => {
                    stats.deodexed += 1;
                    stats.notes += notes.len();
                }
                MethodOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }

    pub fn failures(&self) -> impl Iterator<Item = (&MethodRef, &AnalysisError)> {
        self.outcomes.iter().filter_map(|o| match o {
            MethodOutcome::Failed { method, error } => Some((method, error)),
            MethodOutcome::Deodexed { .. } => None,
        })
    }
}

/// Deodexes every method of `class_def` that contains odex instructions.
/// A method that fails to analyze keeps its original body and is reported
/// in the outcomes; the rest of the class is still processed.
pub fn deodex_class(class_path: &ClassPath, class_def: &ClassDef) -> ClassDeodex {
    let mut rewritten = class_def.clone();
    let mut outcomes = Vec::new();

    for (i, method) in class_def.methods.iter().enumerate() {
        match &method.code {
            Some(code) if code.has_odex_instructions() => (),
            _ => continue,
        }
        let method_ref = method.reference(&class_def.descriptor);
        match analyze_method(class_path, class_def, method) {
            Ok(analysis) => {
                if let Some(code) = rewritten.methods[i].code.as_mut() {
                    code.instructions = analysis.deodexed_instructions();
                }
                outcomes.push(MethodOutcome::Deodexed { method: method_ref, notes: analysis.notes().to_vec() });
            }
            Err(error) => {
                warn!("Could not deodex {}: {}", method_ref, error.message());
                outcomes.push(MethodOutcome::Failed { method: method_ref, error });
            }
        }
    }

    let result = ClassDeodex { class_def: rewritten, outcomes };
    let stats = result.stats();
    if stats.methods > 0 {
        info!(
            "Deodexed {}: {} of {} methods, {} failed, {} notes",
            class_def.descriptor, stats.deodexed, stats.methods, stats.failed, stats.notes
        );
    }
    result
}

/// [`deodex_class`] over a whole class set, in input order.
pub fn deodex_classes<'c>(class_path: &ClassPath, classes: impl IntoIterator<Item = &'c ClassDef>) -> Vec<ClassDeodex> {
    classes.into_iter().map(|c| deodex_class(class_path, c)).collect()
}
