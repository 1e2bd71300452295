use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::Serialize;

/// ファイル / モジュール間の参照グラフ。
///
/// ノードはファイルの相対パスやモジュール名、辺は「from が to を参照している」。
/// 各ノードの参照先は初出順で重複しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_edge(&mut self, from: &str, to: impl Into<String>) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.into());
    }

    /// 参照先をまとめて追加する。空なら何もしない (ノードも作らない)
    pub fn extend<I, S>(&mut self, from: &str, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut targets = targets.into_iter().peekable();
        if targets.peek().is_none() {
            return;
        }
        for target in targets {
            self.add_edge(from, target);
        }
    }

    /// 別のグラフを取り込む。既存ノードの参照先は後ろに追加される
    pub fn merge(&mut self, other: DependencyGraph) {
        for (from, targets) in other.edges {
            self.extend(&from, targets);
        }
    }

    pub fn dependencies_of(&self, node: &str) -> Option<&IndexSet<String>> {
        self.edges.get(node)
    }

    /// `target` を参照しているノード (名前順)
    pub fn dependents_of(&self, target: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.contains(target))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    pub fn is_referenced(&self, target: &str) -> bool {
        self.edges.values().any(|targets| targets.contains(target))
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edges_keep_first_seen_order() {
        let mut graph = DependencyGraph::new();
        graph.extend("app.js", ["b", "a", "b", "c"]);
        let deps: Vec<_> = graph.dependencies_of("app.js").unwrap().iter().collect();
        assert_eq!(deps, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_extend_creates_no_node() {
        let mut graph = DependencyGraph::new();
        graph.extend("app.js", Vec::<String>::new());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_merge_and_dependents() {
        let mut left = DependencyGraph::new();
        left.add_edge("views/home.html", "userCard");
        let mut right = DependencyGraph::new();
        right.add_edge("views/home.html", "navBar");
        right.add_edge("views/list.html", "userCard");

        left.merge(right);
        assert_eq!(left.node_count(), 2);
        assert_eq!(left.edge_count(), 3);
        assert_eq!(
            left.dependents_of("userCard"),
            vec!["views/home.html", "views/list.html"]
        );
        assert!(!left.is_referenced("footer"));
    }

    #[test]
    fn test_serializes_as_map_of_lists() {
        let mut graph = DependencyGraph::new();
        graph.extend("a.js", ["x", "y"]);
        let json = serde_json::to_string(&graph).unwrap();
        assert_eq!(json, r#"{"a.js":["x","y"]}"#);
    }
}
