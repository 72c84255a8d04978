//! Inlining generated class names at their use sites.

use std::collections::HashSet;

use log::{debug, trace};
use modcss_core::{
    ImportedName, Property, Reexport, ReexportSource, ReplacementList, ScriptRecords, Span,
};

use crate::{
    graph::ModuleGraph,
    stylesheet::{ExportMap, json_quote},
};

/// Class names confirmed used across all consumers of one stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedKeys {
    keys: HashSet<String>,
    all: bool,
}

impl UsedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    /// Records a usage that may read any key.
    pub fn mark_all(&mut self) {
        self.all = true;
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn contains(&self, key: &str) -> bool {
        self.all || self.keys.contains(key)
    }

    pub fn merge(&mut self, other: UsedKeys) {
        self.keys.extend(other.keys);
        self.all |= other.all;
    }

    /// Keys recorded individually, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// What a consumer binding holds of the stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingShape {
    /// The whole export map (`import s from "./a.css"`)
    Object,
    /// A single generated class name (`import { btn } from "./a.css"`)
    Key(String),
    /// Something containing the export map, like the namespace of a module
    /// that re-exports it
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetedBinding {
    pub binding: usize,
    pub shape: BindingShape,
}

/// Bindings of `consumer` that resolve to the stylesheet with canonical
/// identity `target`, following re-exports through script modules.
pub fn targeted_bindings(graph: &ModuleGraph, consumer: usize, target: &str) -> Vec<TargetedBinding> {
    let Some(script) = graph.node(consumer).as_script() else {
        return Vec::new();
    };
    script
        .records
        .bindings
        .iter()
        .enumerate()
        .filter_map(|(binding, b)| {
            let mut visited = HashSet::new();
            follow(graph, consumer, &b.request, &b.imported, target, &mut visited)
                .map(|shape| TargetedBinding { binding, shape })
        })
        .collect()
}

fn follow(
    graph: &ModuleGraph,
    from: usize,
    request: &str,
    imported: &ImportedName,
    target: &str,
    visited: &mut HashSet<(usize, ImportedName)>,
) -> Option<BindingShape> {
    let dep = graph.node(from).dependency_for(request)?;
    if dep.canonical() == target {
        return Some(match imported {
            ImportedName::Named(key) => BindingShape::Key(key.clone()),
            ImportedName::Default | ImportedName::Namespace => BindingShape::Object,
        });
    }

    let idx = graph.index_of(dep)?;
    let script = graph.node(idx).as_script()?;
    if script.failure.is_some() || !visited.insert((idx, imported.clone())) {
        return None;
    }
    let records = &script.records;
    match imported.export_name() {
        None => records
            .reexports
            .iter()
            .any(|re| forward(graph, idx, records, re, None, target, visited).is_some())
            .then_some(BindingShape::Opaque),
        Some(name) => records
            .reexports
            .iter()
            .filter(|re| re.exported == name || (re.exported == "*" && name != "default"))
            .find_map(|re| forward(graph, idx, records, re, Some(name), target, visited)),
    }
}

fn forward(
    graph: &ModuleGraph,
    idx: usize,
    records: &ScriptRecords,
    re: &Reexport,
    name: Option<&str>,
    target: &str,
    visited: &mut HashSet<(usize, ImportedName)>,
) -> Option<BindingShape> {
    match &re.source {
        ReexportSource::Binding(b) => {
            let binding = records.bindings.get(*b)?;
            follow(graph, idx, &binding.request, &binding.imported, target, visited)
        }
        ReexportSource::Request { request, imported } => {
            let imported = match (re.exported.as_str(), name) {
                ("*", Some(name)) => ImportedName::from_export_name(name),
                _ => imported.clone(),
            };
            follow(graph, idx, request, &imported, target, visited)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedUsage {
    /// Range of the replaced expression in the original source
    pub span: Span,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    pub used: UsedKeys,
    pub inlined: Vec<InlinedUsage>,
    /// Usages whose placeholder was missing or could not be extended
    pub missed: usize,
}

/// Rewrites the usages of `targets` in one consumer and reports the keys
/// they use.
///
/// A usage resolving to an export key counts as used even when it could not
/// be inlined. Usages that already carry a value were inlined before and are
/// only counted.
pub fn apply(
    records: &mut ScriptRecords,
    targets: &[TargetedBinding],
    export_map: &ExportMap,
    replacements: &mut ReplacementList,
) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();

    for usage in records.usages.iter_mut() {
        let Some(target) = targets.iter().find(|t| t.binding == usage.binding) else {
            continue;
        };
        let (key, extended) = match (&target.shape, &usage.property) {
            (BindingShape::Opaque, _)
            | (BindingShape::Object, Property::Dynamic | Property::Bare) => {
                trace!("Usage at {}..{} may read any key", usage.span.start, usage.span.end);
                outcome.used.mark_all();
                continue;
            }
            (BindingShape::Object, Property::Static(key)) => (key.as_str(), usage.span),
            (BindingShape::Key(key), property) => {
                if export_map.contains_key(key) {
                    outcome.used.insert(key.as_str());
                }
                // only a bare reference is the class name itself
                if *property != Property::Bare {
                    continue;
                }
                (key.as_str(), usage.object_span)
            }
        };

        let Some(value) = export_map.get(key) else {
            trace!("'{}' is not exported, leaving it", key);
            continue;
        };
        outcome.used.insert(key);
        if usage.value.is_some() {
            continue;
        }

        match replacements.merge(usage.object_span, extended, json_quote(value)) {
            Ok(()) => {
                usage.value = Some(value.to_string());
                outcome.inlined.push(InlinedUsage {
                    span: extended,
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            Err(e) => {
                debug!("Not inlining '{}': {}", key, e);
                outcome.missed += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleNode;
    use modcss_core::{ImportBinding, UsageRecord};

    fn binding(local: &str, request: &str, imported: ImportedName) -> ImportBinding {
        ImportBinding {
            local: local.into(),
            request: request.into(),
            imported,
            span: Span::new(0, 1),
            stylesheet: request.ends_with(".css"),
        }
    }

    fn exports() -> ExportMap {
        [("btn", "a1b2"), ("card", "c3d4")].into_iter().collect()
    }

    fn object_target() -> Vec<TargetedBinding> {
        vec![TargetedBinding { binding: 0, shape: BindingShape::Object }]
    }

    /// `el.className = s.btn;`
    fn scenario_one() -> (ScriptRecords, ReplacementList) {
        let mut records = ScriptRecords::default();
        records.register_binding(binding("s", "./a.css", ImportedName::Default));
        records.register_usage(UsageRecord::new(
            0,
            Property::Static("btn".into()),
            Span::new(15, 20),
            Span::new(15, 16),
        ));
        let mut replacements = ReplacementList::new();
        replacements.queue(Span::new(15, 16), "s");
        (records, replacements)
    }

    #[test]
    fn test_apply_inlines_static_usage() {
        let (mut records, mut replacements) = scenario_one();
        let outcome = apply(&mut records, &object_target(), &exports(), &mut replacements);

        assert_eq!(replacements.apply("el.className = s.btn;"), "el.className = \"a1b2\";");
        assert!(outcome.used.contains("btn"));
        assert!(!outcome.used.contains("card"));
        assert_eq!(outcome.inlined.len(), 1);
        assert_eq!(outcome.missed, 0);
        assert_eq!(records.usages[0].value.as_deref(), Some("a1b2"));
    }

    #[test]
    fn test_apply_twice_is_stable() {
        let (mut records, mut replacements) = scenario_one();
        apply(&mut records, &object_target(), &exports(), &mut replacements);
        let snapshot = replacements.clone();
        let again = apply(&mut records, &object_target(), &exports(), &mut replacements);
        assert_eq!(replacements, snapshot);
        assert!(again.used.contains("btn"));
        assert!(again.inlined.is_empty());
    }

    #[test]
    fn test_apply_missing_placeholder_still_counts() {
        let (mut records, _) = scenario_one();
        let mut replacements = ReplacementList::new();
        let outcome = apply(&mut records, &object_target(), &exports(), &mut replacements);
        assert!(outcome.used.contains("btn"));
        assert_eq!(outcome.missed, 1);
        assert!(replacements.is_empty());
        assert_eq!(records.usages[0].value, None);
    }

    #[test]
    fn test_apply_unknown_key_is_skipped() {
        let (mut records, mut replacements) = scenario_one();
        records.usages[0].property = Property::Static("toString".into());
        let outcome = apply(&mut records, &object_target(), &exports(), &mut replacements);
        assert!(!outcome.used.contains("toString"));
        assert_eq!(outcome.missed, 0);
        assert_eq!(replacements.iter().next().unwrap().content, "s");
    }

    #[test]
    fn test_apply_dynamic_and_bare_mark_all() {
        for property in [Property::Dynamic, Property::Bare] {
            let (mut records, mut replacements) = scenario_one();
            records.usages[0].property = property;
            let outcome = apply(&mut records, &object_target(), &exports(), &mut replacements);
            assert!(outcome.used.all());
            assert!(outcome.used.contains("card"));
            assert!(outcome.inlined.is_empty());
        }
    }

    #[test]
    fn test_apply_named_import_bare_usage() {
        // el.className = btn;
        let mut records = ScriptRecords::default();
        records.register_binding(binding("btn", "./a.css", ImportedName::Named("btn".into())));
        records.register_usage(UsageRecord::new(0, Property::Bare, Span::new(15, 18), Span::new(15, 18)));
        records.register_usage(UsageRecord::new(
            0,
            Property::Static("length".into()),
            Span::new(19, 29),
            Span::new(19, 22),
        ));
        let mut replacements = ReplacementList::new();
        replacements.queue(Span::new(15, 18), "btn");
        replacements.queue(Span::new(19, 22), "btn");

        let targets = vec![TargetedBinding { binding: 0, shape: BindingShape::Key("btn".into()) }];
        let outcome = apply(&mut records, &targets, &exports(), &mut replacements);
        assert_eq!(outcome.inlined.len(), 1);
        assert!(outcome.used.contains("btn"));
        assert!(!outcome.used.all());
        assert_eq!(replacements.apply("el.className = btn;btn.length"), "el.className = \"a1b2\";btn.length");
    }

    #[test]
    fn test_apply_ignores_untargeted_bindings() {
        let (mut records, mut replacements) = scenario_one();
        let outcome = apply(&mut records, &[], &exports(), &mut replacements);
        assert!(!outcome.used.contains("btn"));
        assert_eq!(replacements.iter().next().unwrap().content, "s");
    }

    fn script(id: &str, records: ScriptRecords, deps: &[(&str, &str)]) -> ModuleNode {
        deps.iter().fold(ModuleNode::script(id, "", records), |node, (request, target)| {
            node.with_dependency(*request, Some((*target).into()))
        })
    }

    #[test]
    fn test_targeted_bindings_direct_shapes() {
        let mut records = ScriptRecords::default();
        records.register_binding(binding("s", "./a.css", ImportedName::Default));
        records.register_binding(binding("React", "react", ImportedName::Default));
        records.register_binding(binding("card", "./a.css", ImportedName::Named("card".into())));
        let mut graph = ModuleGraph::new();
        let c = graph.register(script("C", records, &[("./a.css", "loaderA!S"), ("react", "R")]));

        assert_eq!(
            targeted_bindings(&graph, c, "S"),
            vec![
                TargetedBinding { binding: 0, shape: BindingShape::Object },
                TargetedBinding { binding: 2, shape: BindingShape::Key("card".into()) },
            ]
        );
    }

    #[test]
    fn test_targeted_bindings_through_reexports() {
        let mut graph = ModuleGraph::new();

        // M: import s from './a.css'; export { s as styles }; export * from './a.css';
        let mut m = ScriptRecords::default();
        m.register_binding(binding("s", "./a.css", ImportedName::Default));
        m.reexports.push(Reexport { exported: "styles".into(), source: ReexportSource::Binding(0) });
        m.reexports.push(Reexport {
            exported: "*".into(),
            source: ReexportSource::Request {
                request: "./a.css".into(),
                imported: ImportedName::Namespace,
            },
        });
        graph.register(script("M", m, &[("./a.css", "S")]));

        // C: import { styles } from './m'; import { btn } from './m'; import * as ns from './m';
        let mut c = ScriptRecords::default();
        c.register_binding(binding("styles", "./m", ImportedName::Named("styles".into())));
        c.register_binding(binding("btn", "./m", ImportedName::Named("btn".into())));
        c.register_binding(binding("ns", "./m", ImportedName::Namespace));
        c.register_binding(binding("other", "./m", ImportedName::Default));
        let c = graph.register(script("C", c, &[("./m", "M")]));

        assert_eq!(
            targeted_bindings(&graph, c, "S"),
            vec![
                TargetedBinding { binding: 0, shape: BindingShape::Object },
                TargetedBinding { binding: 1, shape: BindingShape::Key("btn".into()) },
                TargetedBinding { binding: 2, shape: BindingShape::Opaque },
            ]
        );
    }

    #[test]
    fn test_targeted_bindings_cycle_terminates() {
        let mut graph = ModuleGraph::new();
        let mut a = ScriptRecords::default();
        a.register_binding(binding("x", "./b", ImportedName::Named("x".into())));
        a.reexports.push(Reexport { exported: "x".into(), source: ReexportSource::Binding(0) });
        let a = graph.register(script("A", a, &[("./b", "B")]));
        let mut b = ScriptRecords::default();
        b.register_binding(binding("x", "./a", ImportedName::Named("x".into())));
        b.reexports.push(Reexport { exported: "x".into(), source: ReexportSource::Binding(0) });
        graph.register(script("B", b, &[("./a", "A")]));

        assert!(targeted_bindings(&graph, a, "S").is_empty());
    }
}
