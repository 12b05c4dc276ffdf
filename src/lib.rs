//! # Deodex
//!
//! Type-inferring analysis of Android dex bytecode, used to turn odexed and
//! quickened instructions back into their symbolic form.
//!
//! A [`ClassPath`](analysis::ClassPath) models classes the way a given
//! Dalvik or ART release lays them out (field offsets, vtables, interface
//! tables), [`analyze_method`](analysis::analyze_method) infers register
//! types over a method and rewrites every odex instruction it can resolve,
//! and [`dex::partition`] spreads a class set over as many dex files as the
//! id limits require.
//!
//! # Examples
//!
//! ```no_run
//!  use deodex::analysis::{deodex_class, ClassPath, ClassPathConfig};
//!  use deodex::dex::class_def::ClassDef;
//!
//!  # fn load_boot_classes() -> Vec<ClassDef> { vec![] }
//!  let classes = load_boot_classes();
//!  let class_path = ClassPath::from_classes(ClassPathConfig::dalvik(19), classes.clone());
//!  for class in &classes {
//!      let result = deodex_class(&class_path, class);
//!      for (method, error) in result.failures() {
//!          eprintln!("{}: {}", method, error);
//!      }
//!  }
//! ```

#[macro_use]
pub mod dex;
pub mod analysis;
#[cfg(test)]
mod tests;
