use log::{debug, trace};

use crate::{
    patch::UsedKeys,
    stylesheet::{ExportMap, Rule, RuleTree},
};

/// A top-level rule removed from a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedRule {
    pub selector: String,
    /// Export keys that pointed at the rule's class
    pub keys: Vec<String>,
}

/// Removes top-level `.class` rules whose class is exported only under
/// unused keys. The export map is left as is.
///
/// Rules whose class no key maps to, nested rules and at-rules are kept.
/// A selector list (`.a, .b`) is compared as one string.
pub fn prune_rules(rules: &mut RuleTree, export_map: &ExportMap, used: &UsedKeys) -> Vec<PrunedRule> {
    if used.all() {
        debug!("Pruning disabled, a usage may read any key");
        return Vec::new();
    }

    let mut pruned = Vec::new();
    rules.rules.retain(|rule| {
        let (Rule::Style { selector, .. }, Some(class)) = (rule, rule.class_name()) else {
            return true;
        };
        let keys = export_map.keys_for_value(class);
        if keys.is_empty() || keys.iter().any(|k| used.contains(k)) {
            return true;
        }
        trace!("Removing unused rule '{}'", selector.trim());
        pruned.push(PrunedRule {
            selector: selector.trim().to_string(),
            keys: keys.into_iter().map(String::from).collect(),
        });
        false
    });
    pruned
}

/// Prunes `rules` and deletes the keys of every removed rule from `export_map`.
pub fn prune(rules: &mut RuleTree, export_map: &mut ExportMap, used: &UsedKeys) -> Vec<PrunedRule> {
    let pruned = prune_rules(rules, export_map, used);
    drop_keys(export_map, &pruned);
    pruned
}

pub(crate) fn drop_keys(export_map: &mut ExportMap, pruned: &[PrunedRule]) {
    for key in pruned.iter().flat_map(|p| &p.keys) {
        export_map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RuleTree {
        RuleTree::new(vec![
            Rule::style(".a1b2", &["color: red"]),
            Rule::style(".c3d4", &["padding: 0"]),
            Rule::style(" .e5f6 ", &["margin: 0"]),
            Rule::style(".global", &["all: unset"]),
            Rule::style(".a1b2, .c3d4", &["border: 0"]),
            Rule::At {
                name: "media".into(),
                params: "print".into(),
                children: Some(vec![Rule::style(".c3d4", &["display: none"])]),
            },
        ])
    }

    fn exports() -> ExportMap {
        [("btn", "a1b2"), ("card", "c3d4"), ("spacer", "e5f6")].into_iter().collect()
    }

    fn selectors(tree: &RuleTree) -> Vec<String> {
        tree.rules
            .iter()
            .map(|r| match r {
                Rule::Style { selector, .. } => selector.trim().to_string(),
                Rule::At { name, .. } => format!("@{name}"),
            })
            .collect()
    }

    #[test]
    fn test_prune_removes_unused_top_level_rules() {
        let mut rules = tree();
        let mut map = exports();
        let mut used = UsedKeys::new();
        used.insert("btn");

        let pruned = prune(&mut rules, &mut map, &used);
        assert_eq!(
            pruned,
            vec![
                PrunedRule { selector: ".c3d4".into(), keys: vec!["card".into()] },
                PrunedRule { selector: ".e5f6".into(), keys: vec!["spacer".into()] },
            ]
        );
        assert_eq!(selectors(&rules), vec![".a1b2", ".global", ".a1b2, .c3d4", "@media"]);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["btn"]);
    }

    #[test]
    fn test_prune_keeps_rule_when_any_alias_used() {
        let mut rules = RuleTree::new(vec![Rule::style(".x1", &[])]);
        let mut map: ExportMap = [("btn-primary", "x1"), ("btnPrimary", "x1")].into_iter().collect();
        let mut used = UsedKeys::new();
        used.insert("btnPrimary");
        assert!(prune(&mut rules, &mut map, &used).is_empty());
        assert_eq!(map.len(), 2);

        let pruned = prune(&mut rules, &mut map, &UsedKeys::new());
        assert_eq!(pruned[0].keys, vec!["btn-primary", "btnPrimary"]);
        assert!(map.is_empty());
        assert!(rules.is_empty());
    }

    #[test]
    fn test_prune_disabled_when_all_used() {
        let mut rules = tree();
        let mut map = exports();
        let mut used = UsedKeys::new();
        used.mark_all();
        assert!(prune(&mut rules, &mut map, &used).is_empty());
        assert_eq!(rules, tree());
        assert_eq!(map, exports());
    }

    #[test]
    fn test_prune_rules_leaves_export_map() {
        let mut rules = tree();
        let map = exports();
        let pruned = prune_rules(&mut rules, &map, &UsedKeys::new());
        assert_eq!(pruned.len(), 3);
        assert_eq!(map.len(), 3);
    }
}
