use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use modcss_core::{ModuleId, ReplacementList, ScriptRecords};
use thiserror::Error;

use crate::stylesheet::{ExportMap, RuleTree};

/// Misuse of the module graph index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown module '{0}'")]
    UnknownModule(ModuleId),

    #[error("module '{0}' is not a script")]
    NotAScript(ModuleId),

    #[error("module '{module}' has no binding #{binding}")]
    UnknownBinding { module: ModuleId, binding: usize },

    #[error("export map of '{0}' is already finalized")]
    ExportMapFinalized(String),

    #[error("no export map registered for '{0}'")]
    MissingExportMap(String),
}

/// Which compilation registered a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildPass {
    #[default]
    Primary,
    /// Secondary pass producing statically extracted stylesheets
    Extraction,
}

/// Edge from a consumer to one of its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub request: String,
    /// `None` when the request could not be resolved
    pub target: Option<ModuleId>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptModule {
    pub source: String,
    pub records: ScriptRecords,
    pub replacements: ReplacementList,
    /// Set when extraction failed; `records` is then empty
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StylesheetModule {
    pub rules: RuleTree,
}

#[derive(Debug, Clone)]
pub enum ModuleKind {
    Script(ScriptModule),
    Stylesheet(StylesheetModule),
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub pass: BuildPass,
    pub dependencies: Vec<Dependency>,
    pub kind: ModuleKind,
}

impl ModuleNode {
    pub fn script(id: impl Into<ModuleId>, source: impl Into<String>, records: ScriptRecords) -> Self {
        Self::new(
            id.into(),
            ModuleKind::Script(ScriptModule {
                source: source.into(),
                records,
                replacements: ReplacementList::new(),
                failure: None,
            }),
        )
    }

    /// A script whose usages could not be extracted. The source is kept so
    /// the module can still be emitted unchanged.
    pub fn failed_script(
        id: impl Into<ModuleId>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            id.into(),
            ModuleKind::Script(ScriptModule {
                source: source.into(),
                failure: Some(message.into()),
                ..Default::default()
            }),
        )
    }

    pub fn stylesheet(id: impl Into<ModuleId>, rules: RuleTree) -> Self {
        Self::new(id.into(), ModuleKind::Stylesheet(StylesheetModule { rules }))
    }

    fn new(id: ModuleId, kind: ModuleKind) -> Self {
        Self { id, pass: BuildPass::Primary, dependencies: Vec::new(), kind }
    }

    pub fn with_pass(mut self, pass: BuildPass) -> Self {
        self.pass = pass;
        self
    }

    pub fn with_dependency(mut self, request: impl Into<String>, target: Option<ModuleId>) -> Self {
        self.dependencies.push(Dependency { request: request.into(), target });
        self
    }

    pub fn is_script(&self) -> bool {
        matches!(self.kind, ModuleKind::Script(_))
    }

    pub fn as_script(&self) -> Option<&ScriptModule> {
        match &self.kind {
            ModuleKind::Script(script) => Some(script),
            ModuleKind::Stylesheet(_) => None,
        }
    }

    pub fn as_script_mut(&mut self) -> Option<&mut ScriptModule> {
        match &mut self.kind {
            ModuleKind::Script(script) => Some(script),
            ModuleKind::Stylesheet(_) => None,
        }
    }

    pub fn as_stylesheet(&self) -> Option<&StylesheetModule> {
        match &self.kind {
            ModuleKind::Stylesheet(sheet) => Some(sheet),
            ModuleKind::Script(_) => None,
        }
    }

    /// Resolved target of the first edge for `request`.
    pub fn dependency_for(&self, request: &str) -> Option<&ModuleId> {
        self.dependencies.iter().find(|d| d.request == request).and_then(|d| d.target.as_ref())
    }
}

/// Compilation-scoped registry of modules and stylesheet export maps.
///
/// Nodes are keyed by their raw identity, so the same stylesheet registered
/// by two passes is two nodes. Export maps and finalization state are keyed
/// by canonical identity and therefore shared between those nodes.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    index: HashMap<ModuleId, usize>,
    export_maps: HashMap<String, ExportMap>,
    finalized: HashSet<String>,
    // stylesheets that may have consumers outside the graph
    keep_all: HashSet<String>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node`, replacing any node with the same identity wholesale.
    pub fn register(&mut self, node: ModuleNode) -> usize {
        match self.index.get(&node.id) {
            Some(&idx) => {
                trace!("Re-registering module {}", node.id);
                self.nodes[idx] = node;
                idx
            }
            None => {
                trace!("Registering module {}", node.id);
                let idx = self.nodes.len();
                self.index.insert(node.id.clone(), idx);
                self.nodes.push(node);
                idx
            }
        }
    }

    pub fn index_of(&self, id: &ModuleId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.index_of(id).map(|idx| &self.nodes[idx])
    }

    pub fn get_mut(&mut self, id: &ModuleId) -> Option<&mut ModuleNode> {
        self.index_of(id).map(|idx| &mut self.nodes[idx])
    }

    pub fn node(&self, idx: usize) -> &ModuleNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut ModuleNode {
        &mut self.nodes[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ModuleNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes of every pass sharing the canonical identity `canonical`.
    pub fn nodes_with_canonical(&self, canonical: &str) -> Vec<usize> {
        self.iter().filter(|(_, n)| n.id.canonical() == canonical).map(|(idx, _)| idx).collect()
    }

    /// Targets of a node's dependency edges, each once.
    pub fn distinct_dependencies(&self, idx: usize) -> Vec<&ModuleId> {
        let mut seen = HashSet::new();
        self.nodes[idx]
            .dependencies
            .iter()
            .filter_map(|d| d.target.as_ref())
            .filter(|target| seen.insert(*target))
            .collect()
    }

    pub fn set_export_map(&mut self, id: &ModuleId, map: ExportMap) -> Result<(), GraphError> {
        let canonical = id.canonical();
        if self.finalized.contains(canonical) {
            return Err(GraphError::ExportMapFinalized(canonical.to_string()));
        }
        debug!("Export map for {} has {} entries", canonical, map.len());
        self.export_maps.insert(canonical.to_string(), map);
        Ok(())
    }

    /// Appends one entry to an unfinalized export map, creating it if needed.
    pub fn extend_export_map(
        &mut self,
        id: &ModuleId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let canonical = id.canonical();
        if self.finalized.contains(canonical) {
            return Err(GraphError::ExportMapFinalized(canonical.to_string()));
        }
        self.export_maps.entry(canonical.to_string()).or_default().insert(key, value);
        Ok(())
    }

    pub fn export_map(&self, id: &ModuleId) -> Option<&ExportMap> {
        self.export_maps.get(id.canonical())
    }

    pub(crate) fn export_map_mut(&mut self, id: &ModuleId) -> Option<&mut ExportMap> {
        self.export_maps.get_mut(id.canonical())
    }

    pub fn is_finalized(&self, id: &ModuleId) -> bool {
        self.finalized.contains(id.canonical())
    }

    /// Returns `false` when the identity was already finalized.
    pub(crate) fn mark_finalized(&mut self, id: &ModuleId) -> bool {
        self.finalized.insert(id.canonical().to_string())
    }

    /// Keeps every rule of the stylesheet regardless of recorded usages.
    pub fn keep_all_rules(&mut self, id: &ModuleId) {
        debug!("Keeping all rules of {}", id.canonical());
        self.keep_all.insert(id.canonical().to_string());
    }

    pub fn keeps_all_rules(&self, id: &ModuleId) -> bool {
        self.keep_all.contains(id.canonical())
    }

    /// Failed scripts whose imports are unknown and may reach any stylesheet.
    pub fn opaque_failures(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter().filter(|n| {
            n.dependencies.is_empty() && n.as_script().is_some_and(|s| s.failure.is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ExportMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_register_replaces_wholesale() {
        let mut graph = ModuleGraph::new();
        let mut records = ScriptRecords::default();
        records.specifiers.push(modcss_core::Specifier {
            request: "./a.css".into(),
            kind: modcss_core::SpecKind::Static,
        });
        let first = graph.register(ModuleNode::script("/src/app.js", "old", records));
        let second = graph.register(ModuleNode::script("/src/app.js", "new", ScriptRecords::default()));

        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
        let script = graph.get(&"/src/app.js".into()).unwrap().as_script().unwrap();
        assert_eq!(script.source, "new");
        assert!(script.records.specifiers.is_empty());
    }

    #[test]
    fn test_export_map_shared_across_passes() {
        let mut graph = ModuleGraph::new();
        graph.set_export_map(&"loaderA!/src/a.css".into(), map(&[("btn", "a1b2")])).unwrap();
        assert_eq!(graph.export_map(&"loaderB!/src/a.css".into()).unwrap().get("btn"), Some("a1b2"));
        assert_eq!(graph.export_map(&"/src/a.css".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_export_map_frozen_after_finalize() {
        let mut graph = ModuleGraph::new();
        let id: ModuleId = "/src/a.css".into();
        graph.extend_export_map(&id, "btn", "a1b2").unwrap();
        graph.extend_export_map(&id, "btn", "ffff").unwrap();
        assert_eq!(graph.export_map(&id).unwrap().get("btn"), Some("ffff"));

        assert!(graph.mark_finalized(&id));
        assert!(!graph.mark_finalized(&"x!/src/a.css".into()));
        assert_eq!(
            graph.set_export_map(&id, ExportMap::new()),
            Err(GraphError::ExportMapFinalized("/src/a.css".into()))
        );
        assert!(graph.extend_export_map(&id, "card", "c3d4").is_err());
    }

    #[test]
    fn test_distinct_dependencies_dedupes_targets() {
        let mut graph = ModuleGraph::new();
        let idx = graph.register(
            ModuleNode::script("/src/app.js", "", ScriptRecords::default())
                .with_dependency("./a.css", Some("/src/a.css".into()))
                .with_dependency("./a.css?x", Some("/src/a.css".into()))
                .with_dependency("missing", None)
                .with_dependency("./b.js", Some("/src/b.js".into())),
        );
        let deps: Vec<&str> = graph.distinct_dependencies(idx).iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["/src/a.css", "/src/b.js"]);
    }

    #[test]
    fn test_nodes_with_canonical() {
        let mut graph = ModuleGraph::new();
        graph.register(ModuleNode::stylesheet("/src/a.css", RuleTree::default()));
        graph.register(
            ModuleNode::stylesheet("extract!/src/a.css", RuleTree::default())
                .with_pass(BuildPass::Extraction),
        );
        graph.register(ModuleNode::stylesheet("/src/b.css", RuleTree::default()));
        assert_eq!(graph.nodes_with_canonical("/src/a.css"), vec![0, 1]);
    }

    #[test]
    fn test_opaque_failures() {
        let mut graph = ModuleGraph::new();
        graph.register(ModuleNode::failed_script("/src/broken.js", "s.(", "syntax error"));
        graph.register(ModuleNode::script("/src/ok.js", "", ScriptRecords::default()));
        let failed: Vec<&str> = graph.opaque_failures().map(|n| n.id.as_str()).collect();
        assert_eq!(failed, vec!["/src/broken.js"]);
        assert_eq!(graph.node(0).as_script().unwrap().source, "s.(");
    }

    #[test]
    fn test_keep_all_rules_by_canonical_identity() {
        let mut graph = ModuleGraph::new();
        graph.keep_all_rules(&"extract!/lib/a.css".into());
        assert!(graph.keeps_all_rules(&"/lib/a.css".into()));
        assert!(!graph.keeps_all_rules(&"/lib/b.css".into()));
    }
}
