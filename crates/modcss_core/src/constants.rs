//! Constants for file extensions and module classification.
//!
//! Script extensions drive parsing, collection and resolution of consumer
//! modules. Stylesheet extensions back the default "is stylesheet-like"
//! predicate used by the usage extractor.
//!
//! ## Script Extensions
//!
//! - **TypeScript**: `.ts`, `.tsx`, `.mts` (ES module), `.cts` (CommonJS)
//! - **JavaScript**: `.js`, `.jsx`, `.mjs` (ES module), `.cjs` (CommonJS)

/// File extensions for JavaScript/TypeScript files that should be analyzed
pub const JS_TS_EXTENSIONS: &[&str] = &[
    "ts",  // TypeScript
    "tsx", // TypeScript with JSX
    "mts", // TypeScript module
    "cts", // TypeScript CommonJS
    "js",  // JavaScript
    "jsx", // JavaScript with JSX
    "mjs", // JavaScript module
    "cjs", // JavaScript CommonJS
];

/// Extensions to try when resolving module imports (in priority order)
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Index file names to try when resolving directory imports
pub const INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.mts",
    "index.cts",
    "index.js",
    "index.jsx",
    "index.mjs",
    "index.cjs",
];

/// Extensions whose imports are treated as stylesheet modules by default
pub const STYLESHEET_EXTENSIONS: &[&str] = &["css", "less", "scss", "sass"];

/// Extension-based stylesheet predicate.
///
/// The loader chain (`loader!path`) and any query or fragment are ignored, so
/// `"style-loader!./a.css?inline"` matches `css`.
pub fn has_stylesheet_extension(request: &str, extensions: &[String]) -> bool {
    let path = request.rsplit('!').next().unwrap_or(request);
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}

/// The default stylesheet extensions as owned strings
pub fn default_stylesheet_extensions() -> Vec<String> {
    STYLESHEET_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}
