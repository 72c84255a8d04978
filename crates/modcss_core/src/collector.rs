use anyhow::Result;
use ignore::WalkBuilder;
use log::{debug, trace};
use std::path::{Path, PathBuf};

use crate::constants::JS_TS_EXTENSIONS;

pub struct CollectorConfig {
    pub root: PathBuf,
    /// Only scripts whose root-relative path contains this string are entries
    pub entry_glob: Option<String>,
}

/// Collects the script files the optimizer starts from.
///
/// Honors `.gitignore`, skips `node_modules` and test files (`*.test.*`,
/// `*.spec.*`). Scripts reachable from these entries are discovered later
/// through their imports.
pub fn collect_entries(cfg: &CollectorConfig) -> Result<Vec<PathBuf>> {
    debug!("Collecting entry scripts under {}", cfg.root.display());
    let walker = WalkBuilder::new(&cfg.root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| entry.file_name() != "node_modules" && entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();
    for res in walker {
        let dent = res?;
        let p = dent.path();
        if !p.is_file() || !is_script(p) {
            continue;
        }

        let rel = p.strip_prefix(&cfg.root).unwrap_or(p).to_string_lossy();
        if rel.contains(".test.") || rel.contains(".spec.") {
            trace!("Skipping test file: {}", rel);
            continue;
        }
        if let Some(pattern) = &cfg.entry_glob
            && !rel.contains(pattern.as_str())
        {
            continue;
        }
        trace!("Found entry script: {}", rel);
        files.push(p.to_path_buf());
    }

    files.sort();
    debug!("Collected {} entry scripts", files.len());
    Ok(files)
}

pub fn is_script(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|ext| JS_TS_EXTENSIONS.contains(&ext))
}
