use log::{debug, info, trace};
use modcss_core::{ImportBinding, ModuleId, UsageRecord};

use crate::{
    graph::{GraphError, ModuleGraph, ModuleKind, ModuleNode, ScriptModule},
    parents::{Consumer, find_consumers, untracked_dependents},
    patch::{self, InlinedUsage, UsedKeys},
    prune::{PrunedRule, drop_keys, prune_rules},
    stylesheet::ExportMap,
};

/// What finalizing one stylesheet did.
#[derive(Debug, Clone)]
pub struct FinalizeSummary {
    /// Canonical identity of the stylesheet
    pub stylesheet: String,
    pub consumers: Vec<Consumer>,
    /// Inlined usages with the module they were inlined in
    pub inlined: Vec<(ModuleId, InlinedUsage)>,
    pub missed: usize,
    pub used: UsedKeys,
    pub pruned: Vec<PrunedRule>,
}

/// Per-build optimization state.
///
/// Scripts and stylesheets are registered while the build discovers them;
/// each stylesheet is finalized once all of its consumers are known.
#[derive(Debug, Default)]
pub struct OptimizeContext {
    graph: ModuleGraph,
}

impl OptimizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ModuleGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> ModuleGraph {
        self.graph
    }

    pub fn register(&mut self, node: ModuleNode) -> usize {
        self.graph.register(node)
    }

    pub fn register_binding(
        &mut self,
        module: &ModuleId,
        binding: ImportBinding,
    ) -> Result<usize, GraphError> {
        let script = self.script_mut(module)?;
        Ok(script.records.register_binding(binding))
    }

    pub fn register_usage(&mut self, module: &ModuleId, usage: UsageRecord) -> Result<(), GraphError> {
        let script = self.script_mut(module)?;
        if usage.binding >= script.records.bindings.len() {
            return Err(GraphError::UnknownBinding { module: module.clone(), binding: usage.binding });
        }
        script.records.register_usage(usage);
        Ok(())
    }

    pub fn set_export_map(&mut self, id: &ModuleId, map: ExportMap) -> Result<(), GraphError> {
        self.graph.set_export_map(id, map)
    }

    /// Marks a stylesheet whose consumers are not all registered, such as
    /// one shipped inside a package the build does not scan.
    pub fn keep_all_rules(&mut self, id: &ModuleId) {
        self.graph.keep_all_rules(id)
    }

    /// Freezes the export map of `stylesheet`, inlines its keys in every
    /// consumer and prunes its unused rules.
    ///
    /// Runs once per canonical identity; later calls return `Ok(None)`.
    pub fn finalize(&mut self, stylesheet: &ModuleId) -> Result<Option<FinalizeSummary>, GraphError> {
        let canonical = stylesheet.canonical().to_string();
        let Some(export_map) = self.graph.export_map(stylesheet).cloned() else {
            return Err(GraphError::MissingExportMap(canonical));
        };
        if !self.graph.mark_finalized(stylesheet) {
            debug!("{} is already finalized", canonical);
            return Ok(None);
        }

        let consumers = find_consumers(&self.graph, stylesheet);
        let mut summary = FinalizeSummary {
            stylesheet: canonical.clone(),
            consumers: consumers.clone(),
            inlined: Vec::new(),
            missed: 0,
            used: UsedKeys::new(),
            pruned: Vec::new(),
        };

        for failed in self.graph.opaque_failures() {
            debug!("{} failed extraction, keeping all rules of {}", failed.id, canonical);
            summary.used.mark_all();
        }
        for idx in untracked_dependents(&self.graph, stylesheet) {
            debug!("{} reaches {} untracked, keeping all rules", self.graph.node(idx).id, canonical);
            summary.used.mark_all();
        }
        if self.graph.keeps_all_rules(stylesheet) {
            summary.used.mark_all();
        }

        for consumer in &consumers {
            let targets = patch::targeted_bindings(&self.graph, consumer.node, &canonical);
            let node = self.graph.node_mut(consumer.node);
            let ModuleKind::Script(ScriptModule { records, replacements, failure, .. }) =
                &mut node.kind
            else {
                continue;
            };
            if failure.is_some() {
                summary.used.mark_all();
                continue;
            }
            trace!("Patching {} ({} bindings)", node.id, targets.len());
            let outcome = patch::apply(records, &targets, &export_map, replacements);
            summary.missed += outcome.missed;
            summary.used.merge(outcome.used);
            summary.inlined.extend(outcome.inlined.into_iter().map(|u| (node.id.clone(), u)));
        }

        summary.pruned = self.prune_rule_tree(stylesheet, &summary.used)?;
        info!(
            "Finalized {}: {} consumers, {} inlined, {} rules pruned",
            canonical,
            summary.consumers.len(),
            summary.inlined.len(),
            summary.pruned.len()
        );
        Ok(Some(summary))
    }

    /// Prunes the rule tree of every node sharing the stylesheet's canonical
    /// identity against its export map, then drops the keys of removed rules.
    pub fn prune_rule_tree(
        &mut self,
        stylesheet: &ModuleId,
        used: &UsedKeys,
    ) -> Result<Vec<PrunedRule>, GraphError> {
        let canonical = stylesheet.canonical();
        let Some(snapshot) = self.graph.export_map(stylesheet).cloned() else {
            return Err(GraphError::MissingExportMap(canonical.to_string()));
        };

        let mut pruned: Vec<PrunedRule> = Vec::new();
        for idx in self.graph.nodes_with_canonical(canonical) {
            let ModuleKind::Stylesheet(sheet) = &mut self.graph.node_mut(idx).kind else {
                continue;
            };
            for rule in prune_rules(&mut sheet.rules, &snapshot, used) {
                if !pruned.contains(&rule) {
                    pruned.push(rule);
                }
            }
        }

        if let Some(map) = self.graph.export_map_mut(stylesheet) {
            drop_keys(map, &pruned);
        }
        Ok(pruned)
    }

    fn script_mut(&mut self, module: &ModuleId) -> Result<&mut ScriptModule, GraphError> {
        let node =
            self.graph.get_mut(module).ok_or_else(|| GraphError::UnknownModule(module.clone()))?;
        node.as_script_mut().ok_or_else(|| GraphError::NotAScript(module.clone()))
    }
}
