use std::{
    collections::BTreeMap,
    env,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use colored::Colorize;
use log::{debug, trace};

use crate::types::{InlinedSite, OptimizeResult, PrunedSelector};

/// Root-relative path rewritten relative to the working directory so
/// terminals can link it.
fn display_path(root: &Path, relative_to_root: &str) -> String {
    let Ok(cwd) = env::current_dir() else {
        return relative_to_root.to_string();
    };
    if root.as_os_str().is_empty() {
        return relative_to_root.to_string();
    }
    let abs = root.join(relative_to_root);
    match relative_path(&abs, &cwd) {
        Some(rel) => {
            trace!("Displaying '{}' as '{}'", relative_to_root, rel.display());
            rel.to_string_lossy().to_string()
        }
        None => relative_to_root.to_string(),
    }
}

/// Path of `target` as seen from `base`; `None` when they share no root.
fn relative_path(target: &Path, base: &Path) -> Option<PathBuf> {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    if target.first() != base.first() {
        return None;
    }

    let shared = target.iter().zip(&base).take_while(|(t, b)| t == b).count();
    let mut out = PathBuf::new();
    for _ in shared..base.len() {
        out.push("..");
    }
    for component in &target[shared..] {
        match component {
            Component::Normal(p) => out.push(p),
            Component::ParentDir => out.push(".."),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if out.as_os_str().is_empty() { Some(PathBuf::from(".")) } else { Some(out) }
}

fn one_line(expression: &str) -> String {
    expression.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn print_nothing_to_optimize<W: Write>(writer: &mut W, files: usize) -> io::Result<()> {
    debug!("Nothing to optimize");
    writeln!(
        writer,
        "{} Nothing to optimize in {} files.",
        "✓".green().bold(),
        files.to_string().cyan()
    )?;
    writer.flush()
}

/// Prints inlined usages per script, pruned rules per stylesheet, then
/// module errors and a summary.
pub fn print_report<W: Write>(writer: &mut W, result: &OptimizeResult) -> io::Result<()> {
    let root = result.root.as_path();
    debug!(
        "Printing report for {} inlined usages and {} pruned rules",
        result.inlined.len(),
        result.pruned.len()
    );

    if !result.inlined.is_empty() {
        writeln!(writer, "{} Inlined class names\n", "●".bright_blue().bold())?;
        let mut by_file: BTreeMap<&str, Vec<&InlinedSite>> = BTreeMap::new();
        for site in &result.inlined {
            by_file.entry(site.file.as_str()).or_default().push(site);
        }
        for (file, mut sites) in by_file {
            sites.sort_by_key(|s| (s.line, s.column));
            writeln!(writer, "{}", display_path(root, file).blue())?;
            for (idx, site) in sites.iter().enumerate() {
                let prefix = if idx + 1 == sites.len() { "└──" } else { "├──" };
                writeln!(
                    writer,
                    "{}  {}:{} {} {} {}",
                    prefix.dimmed(),
                    site.line,
                    site.column,
                    one_line(&site.expression),
                    "→".dimmed(),
                    format!("\"{}\"", site.value).green()
                )?;
            }
            writeln!(writer)?;
        }
    }

    if !result.pruned.is_empty() {
        writeln!(writer, "{} Pruned rules\n", "✂".yellow().bold())?;
        let mut by_sheet: BTreeMap<&str, Vec<&PrunedSelector>> = BTreeMap::new();
        for rule in &result.pruned {
            by_sheet.entry(rule.stylesheet.as_str()).or_default().push(rule);
        }
        for (sheet, rules) in by_sheet {
            writeln!(writer, "{}", display_path(root, sheet).blue())?;
            for (idx, rule) in rules.iter().enumerate() {
                let prefix = if idx + 1 == rules.len() { "└──" } else { "├──" };
                writeln!(
                    writer,
                    "{}  {} ({})",
                    prefix.dimmed(),
                    rule.selector.red(),
                    rule.keys.join(", ").dimmed()
                )?;
            }
            writeln!(writer)?;
        }
    }

    if !result.errors.is_empty() {
        writeln!(writer, "{} Modules left unoptimized\n", "⚠".yellow().bold())?;
        for error in &result.errors {
            writeln!(writer, "{}", display_path(root, &error.file).bright_white().bold())?;
            writeln!(writer, "{}  {}", "└──".dimmed(), error.message.red())?;
        }
        writeln!(writer)?;
    }

    print_summary(writer, result)?;
    writer.flush()
}

fn print_summary<W: Write>(writer: &mut W, result: &OptimizeResult) -> io::Result<()> {
    writeln!(writer, "{}", "─".repeat(60).dimmed())?;
    writeln!(writer, "{}", "Summary".bold())?;
    writeln!(writer, "  Stylesheets: {}", result.stylesheets.to_string().cyan())?;
    writeln!(writer, "  Usages inlined: {}", result.inlined.len().to_string().green().bold())?;
    writeln!(writer, "  Rules pruned: {}", result.pruned.len().to_string().yellow().bold())?;
    if result.missed > 0 {
        writeln!(writer, "  Usages not inlined: {}", result.missed.to_string().yellow())?;
    }
    if !result.errors.is_empty() {
        writeln!(writer, "  Module errors: {}", result.errors.len().to_string().red().bold())?;
    }
    if !result.written.is_empty() {
        writeln!(writer, "  Files written: {}", result.written.len().to_string().cyan())?;
    }
    Ok(())
}
