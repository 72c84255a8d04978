//! Build-time optimization of CSS Modules.
//!
//! Member accesses on imported stylesheet objects (`styles.btn`) are
//! replaced by the generated class name, and rules whose class no script
//! can reach are dropped from the compiled stylesheet.
//!
//! # Examples
//!
//! ```no_run
//! use modcss_optimize::{Config, print_report, run_optimize};
//! use std::io::{BufWriter, Write};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = Config {
//!     root: Some(std::path::PathBuf::from("/path/to/project")),
//!     manifest: "css-modules.json".into(),
//!     out_dir: Some("dist".into()),
//!     entry_glob: None,
//!     stylesheet_exts: Vec::new(),
//!     locals_convention: Default::default(),
//!     aliases: Vec::new(),
//! };
//!
//! let result = run_optimize(cfg)?;
//!
//! let mut stdout = BufWriter::new(std::io::stdout());
//! print_report(&mut stdout, &result)?;
//! stdout.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! The engine can also be driven directly by a bundler through
//! [`OptimizeContext`]: register modules as they are discovered, set each
//! stylesheet's export map, then finalize it.

mod config;
mod context;
mod graph;
mod manifest;
mod parents;
mod patch;
mod prune;
mod reporter;
mod runner;
mod stylesheet;
mod types;

pub use config::Config;
pub use context::{FinalizeSummary, OptimizeContext};
pub use graph::{
    BuildPass, Dependency, GraphError, ModuleGraph, ModuleKind, ModuleNode, ScriptModule,
    StylesheetModule,
};
pub use manifest::{Manifest, StylesheetEntry};
pub use parents::{Consumer, Reach, find_consumers};
pub use patch::{BindingShape, InlinedUsage, PatchOutcome, TargetedBinding, UsedKeys, targeted_bindings};
pub use prune::{PrunedRule, prune, prune_rules};
pub use reporter::{print_nothing_to_optimize, print_report};
pub use runner::run_optimize;
pub use stylesheet::{ExportMap, LocalsConvention, Rule, RuleTree, camel_case, dashes_camel_case};
pub use types::{InlinedSite, ModuleError, OptimizeResult, PrunedSelector};
