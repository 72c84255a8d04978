use std::fmt;

use oxc_span::Span;

/// A module request as seen by the build, possibly prefixed by a loader chain
/// (`"css-loader!./a.css"`).
///
/// Equality and hashing use the raw request. Use [`ModuleId::canonical`] and
/// [`ModuleId::same_module`] to compare modules across compilation passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(request: impl Into<String>) -> Self {
        Self(request.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The request with its leading loader segment (up to and including the
    /// first `!`) removed. A request without a loader is its own canonical form.
    pub fn canonical(&self) -> &str {
        canonical_request(&self.0)
    }

    pub fn same_module(&self, other: &ModuleId) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

pub fn canonical_request(request: &str) -> &str {
    match request.split_once('!') {
        Some((_, rest)) => rest,
        None => request,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub request: String,
    pub kind: SpecKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    Static,
    Dynamic,
}

/// What an import binding refers to in the imported module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportedName {
    /// `import s from "x"` or `const s = require("x")`
    Default,
    /// `import * as s from "x"`
    Namespace,
    /// `import { k } from "x"` / `import { k as s } from "x"`
    Named(String),
}

impl ImportedName {
    /// Export name this binding reads, `None` for a namespace import.
    pub fn export_name(&self) -> Option<&str> {
        match self {
            ImportedName::Default => Some("default"),
            ImportedName::Namespace => None,
            ImportedName::Named(name) => Some(name),
        }
    }

    pub fn from_export_name(name: &str) -> Self {
        if name == "default" { ImportedName::Default } else { ImportedName::Named(name.to_string()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub request: String,
    pub imported: ImportedName,
    /// Range of the declaring statement
    pub span: Span,
    /// Whether `request` passed the stylesheet-like predicate
    pub stylesheet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// `s.btn`, `s["btn"]`
    Static(String),
    /// Computed key that is not a literal, or a position that must not be rewritten
    Dynamic,
    /// The binding referenced on its own, not as a member-access object
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    /// Index into [`ScriptRecords::bindings`]
    pub binding: usize,
    pub property: Property,
    /// Range of the whole expression
    pub span: Span,
    /// Range of the object sub-expression (the identifier)
    pub object_span: Span,
    /// Literal the expression was replaced with, set by patching
    pub value: Option<String>,
}

impl UsageRecord {
    pub fn new(binding: usize, property: Property, span: Span, object_span: Span) -> Self {
        Self { binding, property, span, object_span, value: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReexportSource {
    /// `export { s as styles }` or `export default s`
    Binding(usize),
    /// `export { default as styles } from "x"` or `export * as styles from "x"`.
    /// A bare `export * from "x"` is recorded with the exported name `*`.
    Request { request: String, imported: ImportedName },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reexport {
    pub exported: String,
    pub source: ReexportSource,
}

/// Everything the usage extractor records for one script module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRecords {
    pub bindings: Vec<ImportBinding>,
    pub usages: Vec<UsageRecord>,
    pub reexports: Vec<Reexport>,
    pub specifiers: Vec<Specifier>,
    /// Requests whose module value is also reached outside any recorded
    /// binding: an inline or nested `require`, a destructured `require`,
    /// `import()`.
    pub untracked_requests: Vec<String>,
}

impl ScriptRecords {
    pub fn register_binding(&mut self, binding: ImportBinding) -> usize {
        self.bindings.push(binding);
        self.bindings.len() - 1
    }

    pub fn register_usage(&mut self, usage: UsageRecord) {
        self.usages.push(usage);
    }

    pub fn register_untracked(&mut self, request: &str) {
        if !self.untracked_requests.iter().any(|r| r == request) {
            self.untracked_requests.push(request.to_string());
        }
    }

    pub fn binding_by_local(&self, local: &str) -> Option<usize> {
        self.bindings.iter().position(|b| b.local == local)
    }

    pub fn usages_of(&self, binding: usize) -> impl Iterator<Item = &UsageRecord> {
        self.usages.iter().filter(move |u| u.binding == binding)
    }

    pub fn stylesheet_bindings(&self) -> impl Iterator<Item = (usize, &ImportBinding)> {
        self.bindings.iter().enumerate().filter(|(_, b)| b.stylesheet)
    }
}
