use std::path::PathBuf;

/// A member access replaced by its generated class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedSite {
    /// Script path relative to the root
    pub file: String,
    pub line: usize,
    pub column: usize,
    /// Original source text of the replaced expression
    pub expression: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedSelector {
    /// Stylesheet path relative to the root
    pub stylesheet: String,
    pub selector: String,
    pub keys: Vec<String>,
}

/// A script whose usages could not be extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeResult {
    /// Project root the reported paths are relative to
    pub root: PathBuf,
    pub inlined: Vec<InlinedSite>,
    pub pruned: Vec<PrunedSelector>,
    pub errors: Vec<ModuleError>,
    /// Usages that resolved to a class name but could not be inlined
    pub missed: usize,
    pub files_analyzed: usize,
    pub stylesheets: usize,
    /// Files written to the output directory
    pub written: Vec<PathBuf>,
}
