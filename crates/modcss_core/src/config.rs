use anyhow::{Result, anyhow};
use ignore::WalkBuilder;
use log::{debug, trace};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Walks up from `start` to the first directory containing `.git`.
pub fn find_git_root(start: &Path) -> Result<PathBuf> {
    debug!("Searching for git root from {}", start.display());
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            debug!("Found git root at: {}", dir.display());
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(anyhow!("Could not find .git directory above {}", start.display()))
}

/// A `compilerOptions.paths` alias with its targets resolved against `baseUrl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlias {
    /// Alias prefix without the trailing `/*`
    pub prefix: String,
    pub targets: Vec<PathBuf>,
}

/// Reads path aliases from every `tsconfig.json` under `root`.
///
/// Aliases are returned longest prefix first, so `@app/styles` is tried
/// before `@app`. When two configs declare the same alias the first one
/// found wins.
pub fn read_path_aliases(root: &Path) -> Vec<PathAlias> {
    debug!("Reading tsconfig path aliases under {}", root.display());
    let mut aliases: Vec<PathAlias> = Vec::new();

    let walker = WalkBuilder::new(root).hidden(false).git_ignore(true).build();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) != Some("tsconfig.json") {
            continue;
        }
        trace!("Found tsconfig at: {}", path.display());
        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&strip_json_comments(&content))
        else {
            debug!("Ignoring unparsable tsconfig: {}", path.display());
            continue;
        };
        let Some(options) = json.get("compilerOptions") else {
            continue;
        };
        let Some(paths) = options.get("paths").and_then(|p| p.as_object()) else {
            continue;
        };

        let base_url = options.get("baseUrl").and_then(|b| b.as_str()).unwrap_or(".");
        let base = path.parent().unwrap_or(root).join(base_url);

        for (alias, targets) in paths {
            let prefix = alias.trim_end_matches("/*").to_string();
            if aliases.iter().any(|a| a.prefix == prefix) {
                continue;
            }
            let targets: Vec<PathBuf> = targets
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|t| t.as_str())
                .map(|t| base.join(t.trim_end_matches("/*")))
                .collect();
            if targets.is_empty() {
                continue;
            }
            trace!("Alias '{}' -> {:?}", prefix, targets);
            aliases.push(PathAlias { prefix, targets });
        }
    }

    aliases.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    debug!("Loaded {} tsconfig path aliases", aliases.len());
    aliases
}

// tsconfig allows // and /* */ comments; string contents are left alone
fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}
