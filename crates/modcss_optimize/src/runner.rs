use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, trace, warn};
use modcss_core::{
    CollectorConfig, ModuleId, Resolver, ScannedScript, canonical_request, collect_entries, is_script,
    scan_script,
};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    thread,
};

use crate::{
    config::Config,
    context::OptimizeContext,
    graph::{BuildPass, ModuleGraph, ModuleNode},
    manifest::{Manifest, StylesheetEntry},
    types::{InlinedSite, ModuleError, OptimizeResult, PrunedSelector},
};

struct ParsedScript {
    scanned: ScannedScript,
    /// Each request with the file it resolved to
    deps: Vec<(String, Option<PathBuf>)>,
}

pub fn run_optimize(mut cfg: Config) -> Result<OptimizeResult> {
    info!("Starting CSS Modules optimization");
    let root = cfg.initialize()?;

    let manifest_path = cfg.manifest_path(&root);
    let manifest = Manifest::load(&manifest_path)?;
    info!("Loaded {} stylesheets from {}", manifest.stylesheets.len(), manifest_path.display());

    debug!("Collecting entry files with glob: {:?}", cfg.entry_glob);
    let entries =
        collect_entries(&CollectorConfig { root: root.clone(), entry_glob: cfg.entry_glob.clone() })?;
    if entries.is_empty() {
        warn!("No entry files found under {}", root.display());
        return Err(anyhow!("No entry files found under {}", root.display()));
    }
    info!("Found {} entry files", entries.len());

    let resolver = Resolver::new(&root, cfg.aliases.clone());
    let scripts = scan_project(&cfg, &resolver, entries);

    let mut result = OptimizeResult {
        root: root.clone(),
        files_analyzed: scripts.len(),
        stylesheets: manifest.stylesheets.len(),
        ..Default::default()
    };
    let mut ctx = OptimizeContext::new();
    // file names of stylesheet requests that did not resolve
    let mut unresolved_sheets: HashSet<String> = HashSet::new();

    for ParsedScript { scanned, deps } in scripts {
        let id = module_id(&scanned.path);
        let node = match scanned.records {
            Ok(records) => ModuleNode::script(id, scanned.source, records),
            Err(e) => {
                warn!("Failed to extract usages from {}: {}", scanned.path.display(), e);
                result.errors.push(ModuleError {
                    file: relative(&root, &scanned.path),
                    message: e.to_string(),
                });
                ModuleNode::failed_script(id, scanned.source, e.to_string())
            }
        };
        for (request, _) in deps.iter().filter(|(r, t)| t.is_none() && cfg.is_stylesheet(r)) {
            warn!("Could not resolve '{}' from {}", request, scanned.path.display());
            unresolved_sheets.insert(request_file_name(request).to_string());
        }
        let node = deps.into_iter().fold(node, |node, (request, target)| {
            node.with_dependency(request, target.as_deref().map(module_id))
        });
        ctx.register(node);
    }
    queue_reference_placeholders(ctx.graph_mut());

    let stylesheet_ids = register_stylesheets(&mut ctx, &manifest, &root, &cfg)?;
    for id in &stylesheet_ids {
        let path = Path::new(id.as_str());
        let unscanned = !path.starts_with(&root) || in_node_modules(path);
        let unresolved = path
            .file_name()
            .is_some_and(|name| unresolved_sheets.contains(&*name.to_string_lossy()));
        if unscanned || unresolved {
            debug!("Not every consumer of {} is known", id);
            ctx.keep_all_rules(id);
        }
    }

    for (entry, id) in manifest.stylesheets.iter().zip(&stylesheet_ids) {
        let Some(summary) = ctx.finalize(id)? else {
            continue;
        };
        result.missed += summary.missed;

        for (module, usage) in &summary.inlined {
            let Some(script) = ctx.graph().get(module).and_then(|n| n.as_script()) else {
                continue;
            };
            let (line, column) = line_col(&script.source, usage.span.start as usize);
            result.inlined.push(InlinedSite {
                file: relative(&root, Path::new(module.as_str())),
                line,
                column,
                expression: script
                    .source
                    .get(usage.span.start as usize..usage.span.end as usize)
                    .unwrap_or_default()
                    .to_string(),
                value: usage.value.clone(),
            });
        }
        for rule in summary.pruned {
            result.pruned.push(PrunedSelector {
                stylesheet: entry.path.to_string_lossy().to_string(),
                selector: rule.selector,
                keys: rule.keys,
            });
        }
    }

    if let Some(out_dir) = &cfg.out_dir {
        let file_name = manifest_path.file_name().map(PathBuf::from).unwrap_or_else(|| "css-modules.json".into());
        result.written = write_outputs(out_dir, &root, ctx.graph(), &manifest, &stylesheet_ids, &file_name)?;
        info!("Wrote {} files to {}", result.written.len(), out_dir.display());
    }

    info!(
        "Optimization complete: {} usages inlined, {} rules pruned, {} module errors",
        result.inlined.len(),
        result.pruned.len(),
        result.errors.len()
    );
    Ok(result)
}

/// Parses scripts in waves: the entries first, then every script under the
/// root that a previous wave imports and that is not a package dependency.
fn scan_project(cfg: &Config, resolver: &Resolver, entries: Vec<PathBuf>) -> Vec<ParsedScript> {
    let root = resolver.root();
    let mut wave: Vec<PathBuf> =
        entries.into_iter().map(|p| p.canonicalize().unwrap_or(p)).collect();
    let mut seen: HashSet<PathBuf> = wave.iter().cloned().collect();
    let mut parsed = Vec::new();

    while !wave.is_empty() {
        debug!("Scanning {} scripts in parallel", wave.len());
        let results: Vec<ParsedScript> = wave
            .par_iter()
            .map(|file| {
                trace!("Thread {:?} scanning: {}", thread::current().id(), file.display());
                let scanned = scan_script(file, &|request: &str| cfg.is_stylesheet(request));
                let deps = match &scanned.records {
                    Ok(records) => records
                        .specifiers
                        .iter()
                        .map(|s| (s.request.clone(), resolver.resolve(file, &s.request)))
                        .collect(),
                    Err(_) => Vec::new(),
                };
                ParsedScript { scanned, deps }
            })
            .collect();

        let mut next = Vec::new();
        for target in results.iter().flat_map(|p| p.deps.iter()).filter_map(|(_, t)| t.as_ref()) {
            let followed = is_script(target) && target.starts_with(root) && !in_node_modules(target);
            if followed && seen.insert(target.clone()) {
                next.push(target.clone());
            }
        }
        parsed.extend(results);
        wave = next;
    }

    debug!("Scanned {} scripts", parsed.len());
    parsed
}

/// Queues the placeholder a generic codegen emits for each reference to an
/// imported binding. The placeholder reproduces the identifier.
fn queue_reference_placeholders(graph: &mut ModuleGraph) {
    for idx in 0..graph.len() {
        let Some(script) = graph.node_mut(idx).as_script_mut() else {
            continue;
        };
        for usage in &script.records.usages {
            let span = usage.object_span;
            if let Some(text) = script.source.get(span.start as usize..span.end as usize) {
                script.replacements.queue(span, text);
            }
        }
    }
}

fn register_stylesheets(
    ctx: &mut OptimizeContext,
    manifest: &Manifest,
    root: &Path,
    cfg: &Config,
) -> Result<Vec<ModuleId>> {
    let mut ids = Vec::with_capacity(manifest.stylesheets.len());
    for entry in &manifest.stylesheets {
        let path = root.join(&entry.path);
        let id = module_id(&path.canonicalize().unwrap_or(path));
        trace!("Registering stylesheet {}", id);
        ctx.register(ModuleNode::stylesheet(id.clone(), entry.rules.clone()));
        if let Some(loader) = &entry.extract_loader {
            ctx.register(
                ModuleNode::stylesheet(format!("{}!{}", loader, id), entry.rules.clone())
                    .with_pass(BuildPass::Extraction),
            );
        }
        ctx.set_export_map(&id, entry.exports.with_convention(cfg.locals_convention))
            .with_context(|| format!("Failed to register exports of {}", entry.path.display()))?;
        ids.push(id);
    }
    Ok(ids)
}

fn write_outputs(
    out_dir: &Path,
    root: &Path,
    graph: &ModuleGraph,
    manifest: &Manifest,
    stylesheet_ids: &[ModuleId],
    manifest_name: &Path,
) -> Result<Vec<PathBuf>> {
    if out_dir.canonicalize().is_ok_and(|out| out == root) {
        bail!("Output directory {} is the project root", out_dir.display());
    }
    let mut written = Vec::new();

    for (_, node) in graph.iter() {
        let Some(script) = node.as_script() else {
            continue;
        };
        // unreadable, nothing to copy
        if script.failure.is_some() && script.source.is_empty() {
            continue;
        }
        let Ok(rel) = Path::new(node.id.as_str()).strip_prefix(root) else {
            continue;
        };
        written.push(write_file(&out_dir.join(rel), &script.replacements.apply(&script.source))?);
    }

    let mut updated = Vec::with_capacity(manifest.stylesheets.len());
    for (entry, id) in manifest.stylesheets.iter().zip(stylesheet_ids) {
        let rules = graph
            .get(id)
            .and_then(|n| n.as_stylesheet())
            .map(|s| s.rules.clone())
            .unwrap_or_default();
        let exports = graph.export_map(id).cloned().unwrap_or_default();

        match Path::new(id.as_str()).strip_prefix(root) {
            Ok(rel) => {
                let css = out_dir.join(rel);
                written.push(write_file(&css, &rules.to_css())?);
                let mut locals = css.into_os_string();
                locals.push(".js");
                written.push(write_file(Path::new(&locals), &exports.to_locals_module())?);
            }
            Err(_) => warn!("Not writing {}: outside of {}", id, root.display()),
        }

        updated.push(StylesheetEntry {
            path: entry.path.clone(),
            exports,
            rules,
            extract_loader: entry.extract_loader.clone(),
        });
    }

    let manifest_out = out_dir.join(manifest_name);
    Manifest { stylesheets: updated }.save(&manifest_out)?;
    written.push(manifest_out);
    Ok(written)
}

fn write_file(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    trace!("Wrote {}", path.display());
    Ok(path.to_path_buf())
}

fn in_node_modules(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "node_modules")
}

/// `loader!../styles/a.module.css?inline` -> `a.module.css`
fn request_file_name(request: &str) -> &str {
    let path = canonical_request(request);
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

fn module_id(path: &Path) -> ModuleId {
    ModuleId::new(path.to_string_lossy())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string()
}

/// 1-based line and column of a byte offset.
fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}
