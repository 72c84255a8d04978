//! Stylesheet compilation output: export maps and rule trees.
//!
//! Both arrive from the stylesheet compiler already built. The optimizer only
//! reads export maps, removes entries from them, and deletes top-level rules.

use std::fmt::Write as _;

use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from a class name as written in the stylesheet to its
/// generated string.
///
/// Inserting an existing key overwrites its value but keeps the position of
/// the first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportMap(IndexMap<String, String>);

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Removes `key` keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    /// Every key whose generated value is `value`.
    pub fn keys_for_value(&self, value: &str) -> Vec<&str> {
        self.0.iter().filter(|(_, v)| v.as_str() == value).map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-keys the map the way the stylesheet loader exposes locals.
    pub fn with_convention(&self, convention: LocalsConvention) -> ExportMap {
        let mut out = ExportMap::new();
        for (key, value) in self.iter() {
            match convention {
                LocalsConvention::AsIs => out.insert(key, value),
                LocalsConvention::CamelCase => {
                    out.insert(key, value);
                    out.insert(camel_case(key), value);
                }
                LocalsConvention::CamelCaseOnly => out.insert(camel_case(key), value),
                LocalsConvention::Dashes => {
                    out.insert(key, value);
                    out.insert(dashes_camel_case(key), value);
                }
                LocalsConvention::DashesOnly => out.insert(dashes_camel_case(key), value),
            }
        }
        out
    }

    /// Source of the script module a stylesheet compiles to.
    pub fn to_locals_module(&self) -> String {
        let mut out = String::from("export default {\n");
        for (key, value) in self.iter() {
            let _ = writeln!(out, "  {}: {},", json_quote(key), json_quote(value));
        }
        out.push_str("};\n");
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExportMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = ExportMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// How class names are exported to scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalsConvention {
    /// Class names exactly as written
    #[default]
    AsIs,
    /// Original names plus camelCased aliases
    CamelCase,
    /// camelCased names only
    CamelCaseOnly,
    /// Original names plus aliases with only dashes camelized
    Dashes,
    /// Names with only dashes camelized
    DashesOnly,
}

/// `btn-primary_lg` -> `btnPrimaryLg`
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | ' ') {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `btn-primary_lg` -> `btnPrimary_lg`
pub fn dashes_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_alphanumeric() => {
                out.extend(next.to_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn json_quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// One node of a compiled stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Rule {
    #[serde(rename = "style")]
    Style {
        selector: String,
        #[serde(default)]
        declarations: Vec<String>,
        #[serde(default)]
        children: Vec<Rule>,
    },
    #[serde(rename = "at")]
    At {
        name: String,
        #[serde(default)]
        params: String,
        /// `None` for statement at-rules such as `@import`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        children: Option<Vec<Rule>>,
    },
}

impl Rule {
    pub fn style(selector: impl Into<String>, declarations: &[&str]) -> Self {
        Rule::Style {
            selector: selector.into(),
            declarations: declarations.iter().map(|d| d.to_string()).collect(),
            children: Vec::new(),
        }
    }

    /// Class name of a `.name` selector.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Rule::Style { selector, .. } => {
                selector.trim().strip_prefix('.').map(str::trim).filter(|s| !s.is_empty())
            }
            Rule::At { .. } => None,
        }
    }

    fn write_css(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            Rule::Style { selector, declarations, children } => {
                let _ = writeln!(out, "{indent}{} {{", selector.trim());
                for decl in declarations {
                    let _ = writeln!(out, "{indent}  {};", decl.trim().trim_end_matches(';'));
                }
                for child in children {
                    child.write_css(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}}}");
            }
            Rule::At { name, params, children: None } => {
                let _ = writeln!(out, "{indent}{};", at_prelude(name, params));
            }
            Rule::At { name, params, children: Some(children) } => {
                let _ = writeln!(out, "{indent}{} {{", at_prelude(name, params));
                for child in children {
                    child.write_css(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}}}");
            }
        }
    }
}

fn at_prelude(name: &str, params: &str) -> String {
    let name = name.trim_start_matches('@');
    if params.trim().is_empty() { format!("@{name}") } else { format!("@{name} {}", params.trim()) }
}

/// The top-level rules of a compiled stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTree {
    pub rules: Vec<Rule>,
}

impl RuleTree {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            rule.write_css(&mut out, 0);
        }
        out
    }
}
