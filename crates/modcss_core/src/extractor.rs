use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{SourceType, Span};
use oxc_syntax::{operator::UnaryOperator, reference::ReferenceId, symbol::SymbolId};
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::ExtractError,
    types::{
        ImportBinding, ImportedName, Property, Reexport, ReexportSource, ScriptRecords, SpecKind,
        Specifier, UsageRecord,
    },
};

/// A script module read from disk together with its extraction outcome.
#[derive(Debug, Clone)]
pub struct ScannedScript {
    pub path: PathBuf,
    pub source: String,
    pub records: Result<ScriptRecords, ExtractError>,
}

/// Reads and extracts one script file. Failures are kept on the result so the
/// caller can report them per module.
pub fn scan_script(file: &Path, is_stylesheet: &dyn Fn(&str) -> bool) -> ScannedScript {
    trace!("Scanning script: {}", file.display());
    match fs::read_to_string(file) {
        Ok(source) => {
            let records = extract_usages(&source, source_type_for(file), is_stylesheet);
            if let Err(e) = &records {
                debug!("Extraction failed for {}: {}", file.display(), e);
            }
            ScannedScript { path: file.to_path_buf(), source, records }
        }
        Err(e) => ScannedScript {
            path: file.to_path_buf(),
            source: String::new(),
            records: Err(ExtractError::io(&e)),
        },
    }
}

/// Records import bindings, member-access usages and re-exports of one script
/// module in a single pass over its syntax tree.
///
/// Identifiers are matched to bindings through scope analysis, so a local that
/// shadows an import is never reported as a usage.
pub fn extract_usages(
    source: &str,
    source_type: SourceType,
    is_stylesheet: &dyn Fn(&str) -> bool,
) -> Result<ScriptRecords, ExtractError> {
    let allocator = Allocator::default();
    let ParserReturn { program, errors, panicked, .. } =
        OxcParser::new(&allocator, source, source_type).parse();

    if panicked || !errors.is_empty() {
        let message = errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser aborted".to_string());
        return Err(ExtractError::Syntax { message, errors: errors.len() });
    }

    let semantic = SemanticBuilder::new().build(&program).semantic;
    let mut collector = UsageCollector::new(semantic.scoping(), is_stylesheet);
    collector.collect_imports(&program);
    collector.collect_exports(&program);
    collector.visit_program(&program);

    let records = collector.records;
    debug!(
        "Extracted {} bindings, {} usages, {} re-exports",
        records.bindings.len(),
        records.usages.len(),
        records.reexports.len()
    );
    Ok(records)
}

struct UsageCollector<'s> {
    scoping: &'s Scoping,
    is_stylesheet: &'s dyn Fn(&str) -> bool,
    records: ScriptRecords,
    symbols: HashMap<SymbolId, usize>,
    claimed: HashSet<ReferenceId>,
    // `require` calls bound to a top-level const
    bound_requires: HashSet<Span>,
    // >0 while inside an assignment or update target
    write_depth: usize,
}

impl<'s> UsageCollector<'s> {
    fn new(scoping: &'s Scoping, is_stylesheet: &'s dyn Fn(&str) -> bool) -> Self {
        Self {
            scoping,
            is_stylesheet,
            records: ScriptRecords::default(),
            symbols: HashMap::new(),
            claimed: HashSet::new(),
            bound_requires: HashSet::new(),
            write_depth: 0,
        }
    }

    fn collect_imports(&mut self, program: &Program<'_>) {
        for stmt in &program.body {
            match stmt {
                Statement::ImportDeclaration(decl) => self.collect_import(decl),
                Statement::VariableDeclaration(vd) if vd.kind == VariableDeclarationKind::Const => {
                    for declarator in &vd.declarations {
                        self.collect_require(declarator, vd.span);
                    }
                }
                _ => {}
            }
        }
    }

    // Runs after collect_imports: exports may precede the imports they forward.
    fn collect_exports(&mut self, program: &Program<'_>) {
        for stmt in &program.body {
            match stmt {
                Statement::ExportNamedDeclaration(decl) => self.collect_export_named(decl),
                Statement::ExportDefaultDeclaration(decl) => {
                    if let ExportDefaultDeclarationKind::Identifier(ident) = &decl.declaration
                        && let Some(binding) = self.claim(ident)
                    {
                        trace!("Found default re-export of '{}'", ident.name);
                        self.records.reexports.push(Reexport {
                            exported: "default".to_string(),
                            source: ReexportSource::Binding(binding),
                        });
                    }
                }
                Statement::ExportAllDeclaration(decl) => {
                    if decl.export_kind.is_type() {
                        continue;
                    }
                    let request = decl.source.value.to_string();
                    self.push_specifier(&request, SpecKind::Static);
                    // `export * from "x"` forwards every named export
                    let exported =
                        decl.exported.as_ref().map_or_else(|| "*".to_string(), |e| e.name().to_string());
                    self.records.reexports.push(Reexport {
                        exported,
                        source: ReexportSource::Request { request, imported: ImportedName::Namespace },
                    });
                }
                _ => {}
            }
        }
    }

    fn collect_import(&mut self, decl: &ImportDeclaration<'_>) {
        // Skip type-only imports (import type { Foo } from 'bar')
        if decl.import_kind.is_type() {
            return;
        }
        let request = decl.source.value.as_str();

        let has_runtime_import = match &decl.specifiers {
            Some(specifiers) => specifiers.iter().any(|spec| match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => !s.import_kind.is_type(),
                _ => true,
            }),
            // import 'side-effect'
            None => true,
        };
        if !has_runtime_import {
            return;
        }
        self.push_specifier(request, SpecKind::Static);

        let stylesheet = (self.is_stylesheet)(request);
        let Some(specifiers) = &decl.specifiers else {
            return;
        };
        for spec in specifiers {
            let (local, imported) = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    (&s.local, ImportedName::from_export_name(s.imported.name().as_str()))
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => (&s.local, ImportedName::Default),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    (&s.local, ImportedName::Namespace)
                }
            };
            self.add_binding(local, request, imported, decl.span, stylesheet);
        }
    }

    // const s = require('./a.css')
    // Other forms of `require` leave the request untracked.
    fn collect_require(&mut self, declarator: &VariableDeclarator<'_>, span: Span) {
        let Some(Expression::CallExpression(call)) = &declarator.init else {
            return;
        };
        let Some(request) = require_request(call) else {
            return;
        };
        let Some(local) = declarator.id.get_binding_identifier() else {
            return;
        };
        let stylesheet = (self.is_stylesheet)(request);
        if self.add_binding(local, request, ImportedName::Default, span, stylesheet) {
            self.bound_requires.insert(call.span);
        }
    }

    fn collect_export_named(&mut self, decl: &ExportNamedDeclaration<'_>) {
        if decl.export_kind.is_type() {
            return;
        }
        match &decl.source {
            Some(source) => {
                let request = source.value.to_string();
                self.push_specifier(&request, SpecKind::Static);
                for spec in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                    self.records.reexports.push(Reexport {
                        exported: spec.exported.name().to_string(),
                        source: ReexportSource::Request {
                            request: request.clone(),
                            imported: ImportedName::from_export_name(spec.local.name().as_str()),
                        },
                    });
                }
            }
            None => {
                for spec in &decl.specifiers {
                    if let ModuleExportName::IdentifierReference(ident) = &spec.local
                        && let Some(binding) = self.claim(ident)
                    {
                        self.records.reexports.push(Reexport {
                            exported: spec.exported.name().to_string(),
                            source: ReexportSource::Binding(binding),
                        });
                    }
                }
            }
        }
    }

    fn add_binding(
        &mut self,
        local: &BindingIdentifier<'_>,
        request: &str,
        imported: ImportedName,
        span: Span,
        stylesheet: bool,
    ) -> bool {
        let Some(symbol_id) = local.symbol_id.get() else {
            return false;
        };
        trace!("Found binding '{}' from '{}' (stylesheet: {})", local.name, request, stylesheet);
        let idx = self.records.register_binding(ImportBinding {
            local: local.name.to_string(),
            request: request.to_string(),
            imported,
            span,
            stylesheet,
        });
        self.symbols.insert(symbol_id, idx);
        true
    }

    fn push_specifier(&mut self, request: &str, kind: SpecKind) {
        self.records.specifiers.push(Specifier { request: request.to_string(), kind });
    }

    fn binding_of(&self, ident: &IdentifierReference<'_>) -> Option<usize> {
        let reference_id = ident.reference_id.get()?;
        let symbol_id = self.scoping.get_reference(reference_id).symbol_id()?;
        self.symbols.get(&symbol_id).copied()
    }

    /// Resolves `ident` to a binding and marks the reference as handled.
    fn claim(&mut self, ident: &IdentifierReference<'_>) -> Option<usize> {
        let binding = self.binding_of(ident)?;
        if let Some(reference_id) = ident.reference_id.get() {
            self.claimed.insert(reference_id);
        }
        Some(binding)
    }

    fn record(&mut self, ident: &IdentifierReference<'_>, property: Property, span: Span) {
        if let Some(binding) = self.claim(ident) {
            trace!("Usage of '{}' as {:?}", ident.name, property);
            self.records.register_usage(UsageRecord::new(binding, property, span, ident.span));
        }
    }
}

impl<'a> Visit<'a> for UsageCollector<'_> {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(ident) = &it.object {
            let property = if self.write_depth > 0 {
                Property::Dynamic
            } else {
                Property::Static(it.property.name.to_string())
            };
            self.record(ident, property, it.span);
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_computed_member_expression(&mut self, it: &ComputedMemberExpression<'a>) {
        if let Expression::Identifier(ident) = &it.object {
            let property = if self.write_depth > 0 {
                Property::Dynamic
            } else {
                literal_key(&it.expression).map_or(Property::Dynamic, Property::Static)
            };
            self.record(ident, property, it.span);
        }
        walk::walk_computed_member_expression(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        // `{ s }` cannot be rewritten in place
        if it.shorthand
            && let Expression::Identifier(ident) = &it.value
        {
            self.record(ident, Property::Dynamic, ident.span);
        }
        walk::walk_object_property(self, it);
    }

    fn visit_simple_assignment_target(&mut self, it: &SimpleAssignmentTarget<'a>) {
        self.write_depth += 1;
        walk::walk_simple_assignment_target(self, it);
        self.write_depth -= 1;
    }

    // `delete s.btn` mutates the object
    fn visit_unary_expression(&mut self, it: &UnaryExpression<'a>) {
        let delete = it.operator == UnaryOperator::Delete;
        if delete {
            self.write_depth += 1;
        }
        walk::walk_unary_expression(self, it);
        if delete {
            self.write_depth -= 1;
        }
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if let Some(reference_id) = it.reference_id.get()
            && self.claimed.contains(&reference_id)
        {
            return;
        }
        let property = if self.write_depth > 0 { Property::Dynamic } else { Property::Bare };
        self.record(it, property, it.span);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(request) = require_request(it) {
            trace!("Found require() call: '{}'", request);
            self.push_specifier(request, SpecKind::Static);
            if !self.bound_requires.contains(&it.span) {
                self.records.register_untracked(request);
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(sl) = &it.source {
            trace!("Found dynamic import(): '{}'", sl.value);
            self.push_specifier(sl.value.as_str(), SpecKind::Dynamic);
            self.records.register_untracked(sl.value.as_str());
        }
        walk::walk_import_expression(self, it);
    }
}

fn require_request<'b>(call: &'b CallExpression<'_>) -> Option<&'b str> {
    if let Expression::Identifier(callee) = &call.callee
        && callee.name.as_str() == "require"
        && call.arguments.len() == 1
        && let Some(Expression::StringLiteral(sl)) = call.arguments[0].as_expression()
    {
        return Some(sl.value.as_str());
    }
    None
}

/// Statically known key of a computed member access: `s["btn"]`, ``s[`btn`]``.
fn literal_key(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::StringLiteral(sl) => Some(sl.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => {
            tpl.quasis.first().and_then(|q| q.value.cooked.as_ref()).map(|c| c.to_string())
        }
        _ => None,
    }
}

pub fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str());
    let typescript = matches!(ext, Some("ts") | Some("tsx") | Some("mts") | Some("cts"));

    // JSX is common in plain .js files; .ts keeps it off for `<T>` casts
    SourceType::default()
        .with_typescript(typescript)
        .with_jsx(!typescript || ext == Some("tsx"))
        .with_module(!matches!(ext, Some("cjs") | Some("cts")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{default_stylesheet_extensions, has_stylesheet_extension};
    use std::fs;
    use tempfile::TempDir;

    fn is_css(request: &str) -> bool {
        has_stylesheet_extension(request, &default_stylesheet_extensions())
    }

    fn extract(source: &str) -> ScriptRecords {
        extract_usages(source, source_type_for(Path::new("test.js")), &is_css).unwrap()
    }

    fn span_of(source: &str, needle: &str) -> Span {
        let start = source.find(needle).expect("needle present") as u32;
        Span::new(start, start + needle.len() as u32)
    }

    #[test]
    fn test_default_import_member_usage() {
        let src = "import s from './a.css';\nel.className = s.btn;";
        let records = extract(src);
        assert_eq!(records.bindings.len(), 1);
        let binding = &records.bindings[0];
        assert_eq!(binding.local, "s");
        assert_eq!(binding.request, "./a.css");
        assert_eq!(binding.imported, ImportedName::Default);
        assert!(binding.stylesheet);

        assert_eq!(records.usages.len(), 1);
        let usage = &records.usages[0];
        assert_eq!(usage.property, Property::Static("btn".to_string()));
        assert_eq!(usage.span, span_of(src, "s.btn"));
        assert_eq!(usage.object_span, Span::new(usage.span.start, usage.span.start + 1));
        assert_eq!(usage.value, None);
    }

    #[test]
    fn test_non_stylesheet_import_is_flagged() {
        let records = extract("import React from 'react';\nReact.createElement('div');");
        assert_eq!(records.bindings.len(), 1);
        assert!(!records.bindings[0].stylesheet);
        assert!(records.stylesheet_bindings().next().is_none());
    }

    #[test]
    fn test_computed_literal_and_dynamic_keys() {
        let src = "import s from './a.css';\nf(s['card'], s[`btn`], s[key]);";
        let records = extract(src);
        let props: Vec<&Property> = records.usages.iter().map(|u| &u.property).collect();
        assert_eq!(
            props,
            vec![
                &Property::Static("card".to_string()),
                &Property::Static("btn".to_string()),
                &Property::Dynamic
            ]
        );
        assert_eq!(records.usages[0].span, span_of(src, "s['card']"));
    }

    #[test]
    fn test_shadowed_binding_not_recorded() {
        let src = "import s from './a.css';\nfunction f(s) { return s.btn; }\nuse(s.card);";
        let records = extract(src);
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.usages[0].property, Property::Static("card".to_string()));
    }

    #[test]
    fn test_bare_reference_recorded() {
        let src = "import s from './a.css';\ncx(s);";
        let records = extract(src);
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.usages[0].property, Property::Bare);
        assert_eq!(records.usages[0].span, records.usages[0].object_span);
    }

    #[test]
    fn test_assignment_target_is_dynamic() {
        let src = "import s from './a.css';\ns.btn = 'x';";
        let records = extract(src);
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.usages[0].property, Property::Dynamic);
    }

    #[test]
    fn test_shorthand_property_is_dynamic() {
        let src = "import { btn } from './a.css';\nconst o = { btn };";
        let records = extract(src);
        assert_eq!(records.bindings[0].imported, ImportedName::Named("btn".to_string()));
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.usages[0].property, Property::Dynamic);
    }

    #[test]
    fn test_named_import_bare_usage() {
        let src = "import { primary as p } from './a.css';\nel.className = p;";
        let records = extract(src);
        assert_eq!(records.bindings[0].local, "p");
        assert_eq!(records.bindings[0].imported, ImportedName::Named("primary".to_string()));
        assert_eq!(records.usages[0].property, Property::Bare);
        let start = src.find("= p;").unwrap() as u32 + 2;
        assert_eq!(records.usages[0].span, Span::new(start, start + 1));
    }

    #[test]
    fn test_require_binding() {
        let src = "const s = require('./a.css');\nuse(s.btn);";
        let records = extract(src);
        assert_eq!(records.bindings.len(), 1);
        assert_eq!(records.bindings[0].imported, ImportedName::Default);
        assert!(records.bindings[0].stylesheet);
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.specifiers.len(), 1);
        assert_eq!(records.specifiers[0].request, "./a.css");
    }

    #[test]
    fn test_unbound_requires_are_untracked() {
        let cases = [
            "const { card } = require('./a.css');\nel.className = card;",
            "function f() { const s = require('./a.css'); return s.card; }",
            "el.className = require('./a.css').card;",
            "let s = require('./a.css');\nuse(s.card);",
            "module.exports = require('./a.css');",
            "import('./a.css').then((m) => use(m.default.card));",
        ];
        for src in cases {
            let records = extract(src);
            assert!(records.bindings.is_empty(), "{}", src);
            assert_eq!(records.untracked_requests, vec!["./a.css"], "{}", src);
        }
    }

    #[test]
    fn test_bound_require_is_tracked() {
        let records = extract("const s = require('./a.css');\nconst t = require('./t.css');\nuse(s.btn, require('./t.css'));");
        assert_eq!(records.bindings.len(), 2);
        assert_eq!(records.untracked_requests, vec!["./t.css"]);
    }

    #[test]
    fn test_delete_operand_is_dynamic() {
        let records = extract("import s from './a.css';\ndelete s.btn;\nuse(s.card);");
        let properties: Vec<&Property> = records.usages.iter().map(|u| &u.property).collect();
        assert_eq!(properties, vec![&Property::Dynamic, &Property::Static("card".to_string())]);
    }

    #[test]
    fn test_reexports_recorded_not_counted_as_usage() {
        let src = "import s from './a.css';\nexport default s;\nexport { s as styles };";
        let records = extract(src);
        assert!(records.usages.is_empty());
        assert_eq!(
            records.reexports,
            vec![
                Reexport { exported: "default".to_string(), source: ReexportSource::Binding(0) },
                Reexport { exported: "styles".to_string(), source: ReexportSource::Binding(0) },
            ]
        );
    }

    #[test]
    fn test_reexport_from_request() {
        let src = "export { default as styles } from './a.css';\nexport * as theme from './t.css';\nexport * from './u.js';";
        let records = extract(src);
        assert_eq!(records.reexports.len(), 3);
        assert_eq!(records.reexports[2].exported, "*");
        assert_eq!(
            records.reexports[0].source,
            ReexportSource::Request { request: "./a.css".to_string(), imported: ImportedName::Default }
        );
        assert_eq!(
            records.reexports[1].source,
            ReexportSource::Request { request: "./t.css".to_string(), imported: ImportedName::Namespace }
        );
        let requests: Vec<&str> = records.specifiers.iter().map(|s| s.request.as_str()).collect();
        assert_eq!(requests, vec!["./a.css", "./t.css", "./u.js"]);
    }

    #[test]
    fn test_specifiers_include_dynamic_and_side_effect() {
        let records = extract("import './reset.css';\nimport('./lazy');\nconst x = require('./x');");
        let kinds: Vec<(&str, SpecKind)> =
            records.specifiers.iter().map(|s| (s.request.as_str(), s.kind)).collect();
        assert!(kinds.contains(&("./reset.css", SpecKind::Static)));
        assert!(kinds.contains(&("./lazy", SpecKind::Dynamic)));
        assert!(kinds.contains(&("./x", SpecKind::Static)));
        assert!(records.bindings.iter().all(|b| b.request != "./reset.css"));
    }

    #[test]
    fn test_type_only_import_skipped() {
        let src = "import type { Theme } from './a.css';\nlet t: Theme;";
        let records =
            extract_usages(src, source_type_for(Path::new("test.ts")), &is_css).unwrap();
        assert!(records.bindings.is_empty());
        assert!(records.specifiers.is_empty());
    }

    #[test]
    fn test_jsx_usage() {
        let src = "import s from './a.module.css';\nexport const B = () => <div className={s.btn} />;";
        let records = extract(src);
        assert_eq!(records.usages.len(), 1);
        assert_eq!(records.usages[0].property, Property::Static("btn".to_string()));
    }

    #[test]
    fn test_syntax_error_is_module_level() {
        let err = extract_usages("import s from './a.css';\ns.btn(;", SourceType::mjs(), &is_css)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Syntax { .. }));
    }

    #[test]
    fn test_scan_script_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("app.tsx");
        fs::write(&file, "import s from './a.css';\nexport const c = s.card;").unwrap();
        let scanned = scan_script(&file, &is_css);
        let records = scanned.records.unwrap();
        assert_eq!(records.usages.len(), 1);
        assert!(scanned.source.contains("s.card"));
    }

    #[test]
    fn test_scan_script_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let scanned = scan_script(&temp_dir.path().join("missing.js"), &is_css);
        assert!(matches!(scanned.records, Err(ExtractError::Io { .. })));
    }
}
