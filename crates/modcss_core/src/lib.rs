//! Core building blocks for modcss.
//!
//! This crate knows about script modules only:
//! - Extracting stylesheet import bindings, member-access usages and
//!   re-exports from JS/TS sources
//! - Offset-stable replacement lists for rewriting those sources
//! - Resolving module requests (relative, tsconfig paths, node_modules)
//! - Collecting entry scripts from a project

mod collector;
mod config;
mod constants;
mod error;
mod extractor;
mod replace;
mod resolver;
mod types;

// Re-export public API
pub use collector::{CollectorConfig, collect_entries, is_script};
pub use config::{PathAlias, find_git_root, read_path_aliases};
pub use constants::{
    INDEX_FILES, JS_TS_EXTENSIONS, RESOLVE_EXTENSIONS, STYLESHEET_EXTENSIONS,
    default_stylesheet_extensions, has_stylesheet_extension,
};
pub use error::{ExtractError, MergeError};
pub use extractor::{ScannedScript, extract_usages, scan_script, source_type_for};
pub use replace::{PendingReplacement, ReplacementList};
pub use resolver::Resolver;
pub use types::{
    ImportBinding, ImportedName, ModuleId, Property, Reexport, ReexportSource, ScriptRecords,
    SpecKind, Specifier, UsageRecord, canonical_request,
};

pub use oxc_span::Span;
