use dashmap::DashMap;
use log::{debug, trace};
use path_clean::clean;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::PathAlias,
    constants::{INDEX_FILES, RESOLVE_EXTENSIONS},
};

/// Resolves module requests to files, the way a bundler would for the
/// subset of requests this tool follows: relative and absolute paths,
/// tsconfig path aliases and `node_modules` packages.
///
/// Loader prefixes (`style-loader!./a.css`) and query strings are ignored.
/// Results are memoized per `(importer directory, request)` and the cache is
/// safe to share across rayon workers.
pub struct Resolver {
    root: PathBuf,
    aliases: Vec<PathAlias>,
    cache: DashMap<(PathBuf, String), Option<PathBuf>>,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>, aliases: Vec<PathAlias>) -> Self {
        Self { root: root.into(), aliases, cache: DashMap::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, from_file: &Path, request: &str) -> Option<PathBuf> {
        let dir = from_file.parent().unwrap_or(&self.root).to_path_buf();
        let key = (dir, request.to_string());
        if let Some(hit) = self.cache.get(&key) {
            trace!("Cache hit for resolve: '{}' from {}", request, from_file.display());
            return hit.clone();
        }

        let resolved = self.resolve_uncached(&key.0, request);
        match &resolved {
            Some(path) => debug!("Resolved '{}' to {}", request, path.display()),
            None => trace!("Could not resolve '{}' from {}", request, from_file.display()),
        }
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, dir: &Path, request: &str) -> Option<PathBuf> {
        let path = strip_request(request);
        if path.is_empty() {
            return None;
        }

        if path.starts_with("./") || path.starts_with("../") || path == "." || path == ".." {
            return resolve_file(Path::new(&clean(dir.join(path).to_string_lossy().to_string())));
        }
        if path.starts_with('/') {
            return resolve_file(Path::new(path));
        }

        for alias in &self.aliases {
            let Some(rest) = path.strip_prefix(alias.prefix.as_str()) else {
                continue;
            };
            // `@ui` must not match `@uikit`
            if !rest.is_empty() && !rest.starts_with('/') {
                continue;
            }
            let rest = rest.trim_start_matches('/');
            trace!("Trying alias '{}' for '{}'", alias.prefix, request);
            for target in &alias.targets {
                let candidate = if rest.is_empty() { target.clone() } else { target.join(rest) };
                if let Some(found) = resolve_file(&candidate) {
                    return Some(found);
                }
            }
        }

        self.resolve_package(dir, path)
    }

    fn resolve_package(&self, dir: &Path, request: &str) -> Option<PathBuf> {
        let (package, subpath) = split_package(request);
        let mut current = Some(dir);
        while let Some(d) = current {
            let package_dir = d.join("node_modules").join(package);
            if package_dir.is_dir() {
                trace!("Checking package at {}", package_dir.display());
                return match subpath {
                    Some(sub) => resolve_file(&package_dir.join(sub)),
                    None => resolve_package_entry(&package_dir),
                };
            }
            if d == self.root {
                break;
            }
            current = d.parent();
        }
        None
    }
}

/// Drops loader prefixes, query and fragment: `a!b!./x.css?inline` -> `./x.css`.
fn strip_request(request: &str) -> &str {
    let path = request.rsplit('!').next().unwrap_or(request);
    path.split(['?', '#']).next().unwrap_or(path)
}

/// `@scope/pkg/a.css` -> (`@scope/pkg`, Some(`a.css`))
fn split_package(request: &str) -> (&str, Option<&str>) {
    let mut slashes = request.match_indices('/');
    let cut = if request.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((i, _)) => (&request[..i], Some(&request[i + 1..])),
        None => (request, None),
    }
}

fn resolve_package_entry(package_dir: &Path) -> Option<PathBuf> {
    let manifest = fs::read_to_string(package_dir.join("package.json"))
        .ok()
        .and_then(|txt| serde_json::from_str::<serde_json::Value>(&txt).ok());

    if let Some(json) = manifest {
        let mut fields: Vec<&str> = Vec::new();
        if let Some(exports) = json.get("exports") {
            let dot = exports.get(".").unwrap_or(exports);
            if let Some(s) = dot.as_str() {
                fields.push(s);
            }
            for condition in ["import", "require", "default"] {
                if let Some(s) = dot.get(condition).and_then(|v| v.as_str()) {
                    fields.push(s);
                }
            }
        }
        // stylesheet packages commonly point at their CSS through "style"
        for field in ["module", "main", "style"] {
            if let Some(s) = json.get(field).and_then(|v| v.as_str()) {
                fields.push(s);
            }
        }
        for entry in fields {
            if let Some(found) = resolve_file(&package_dir.join(entry.trim_start_matches("./"))) {
                return Some(found);
            }
        }
    }

    INDEX_FILES.iter().map(|index| package_dir.join(index)).find(|p| p.is_file()).map(canonical)
}

fn resolve_file(p: &Path) -> Option<PathBuf> {
    if p.is_file() {
        return Some(canonical(p.to_path_buf()));
    }
    for ext in RESOLVE_EXTENSIONS {
        let mut candidate = p.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(canonical(candidate));
        }
    }
    INDEX_FILES.iter().map(|index| p.join(index)).find(|c| c.is_file()).map(canonical)
}

fn canonical(p: PathBuf) -> PathBuf {
    p.canonicalize().unwrap_or(p)
}
