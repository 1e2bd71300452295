//! コンポーネントカタログ。
//!
//! controller / service / directive / filter / module の宣言を集め、
//! 名前 → 定義ファイルの対応表を作る。規約ディレクトリ (`b-controllers` など)
//! のファイルを先に、それ以外でキーワードを含むファイルを後に処理し、
//! 同名は後勝ち。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use tracing::{debug, warn};

use crate::comments::CommentMap;
use crate::config::AnalyzerConfig;
use crate::deps::{DependencyFilter, RESERVED_SIGIL};
use crate::error::SkipReason;
use crate::fields::strip_controller_alias;
use crate::graph::DependencyGraph;
use crate::resolver::{collect_files, relative_key, ProjectLayout};
use crate::source::read_source;

static CONTROLLER_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.controller\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
static CONTROLLER_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.controller\s*\(\s*['"][^'"\n]+['"]\s*,\s*\[([^\]]*)\]"#).unwrap()
});
static SERVICE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.(service|factory|provider|value|constant)\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#)
        .unwrap()
});
static RESOURCE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\$resource\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
static DIRECTIVE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.directive\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
static FILTER_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.filter\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
/// 依存配列付きの `angular.module('x', [...])` だけが定義
static MODULE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"angular\s*\.\s*module\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")\s*,\s*\[([^\]]*)\]"#)
        .unwrap()
});
static CONTROLLER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcontroller\s*:").unwrap());
static FIRST_FUNCTION_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"function\s*[\w$]*\s*\(([^)]*)\)").unwrap());
static QUOTED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^'\n]*)'|"([^"\n]*)""#).unwrap());

/// カタログ対象の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Controller,
    Service,
    Directive,
    Filter,
    Module,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Controller,
        ComponentKind::Service,
        ComponentKind::Directive,
        ComponentKind::Filter,
        ComponentKind::Module,
    ];

    /// 規約ディレクトリ名
    pub fn dir_name(self) -> &'static str {
        match self {
            ComponentKind::Controller => "controllers",
            ComponentKind::Service => "services",
            ComponentKind::Directive => "directives",
            ComponentKind::Filter => "filters",
            ComponentKind::Module => "modules",
        }
    }

    fn declaration(self) -> &'static Regex {
        match self {
            ComponentKind::Controller => &*CONTROLLER_DECL,
            ComponentKind::Service => &*SERVICE_DECL,
            ComponentKind::Directive => &*DIRECTIVE_DECL,
            ComponentKind::Filter => &*FILTER_DECL,
            ComponentKind::Module => &*MODULE_DECL,
        }
    }
}

/// 読み込み済みのスクリプトファイル
#[derive(Debug, Clone)]
pub struct ScriptFile {
    pub path: PathBuf,
    /// プロジェクトルートからの相対パス
    pub key: String,
    pub text: String,
    comments: CommentMap,
}

impl ScriptFile {
    pub fn new(path: PathBuf, key: String, text: String) -> Self {
        let comments = CommentMap::new(&text);
        Self {
            path,
            key,
            text,
            comments,
        }
    }

    /// コメント外の出現だけを列挙する
    fn declarations<'a>(&'a self, pattern: &'a Regex) -> impl Iterator<Item = regex::Captures<'a>> {
        pattern.captures_iter(&self.text).filter(|caps| {
            caps.get(0)
                .is_some_and(|m| !self.comments.is_commented(m.start()))
        })
    }
}

/// スクリプトを名前順にすべて読み込む。読めなかったファイルは理由と一緒に返す
pub fn load_scripts(
    layout: &ProjectLayout,
    config: &AnalyzerConfig,
) -> (Vec<ScriptFile>, Vec<SkipReason>) {
    let mut scripts = Vec::new();
    let mut skipped = Vec::new();
    for path in collect_files(&layout.root, &layout.root, &[".js"], config) {
        match read_source(&path) {
            Ok(text) => {
                let key = relative_key(&layout.root, &path);
                scripts.push(ScriptFile::new(path, key, text));
            }
            Err(reason) => {
                warn!("Skipping {}", reason);
                skipped.push(reason);
            }
        }
    }
    (scripts, skipped)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentCatalog {
    pub controllers: BTreeMap<String, String>,
    pub services: BTreeMap<String, String>,
    pub directives: BTreeMap<String, String>,
    pub filters: BTreeMap<String, String>,
    pub modules: BTreeMap<String, String>,
    /// コントローラ → 配列記法で注入されているサービス
    pub service_dependencies: BTreeMap<String, Vec<String>>,
    /// スクリプトファイル → モジュール依存と注入パラメータ
    pub graph: DependencyGraph,
}

fn name_of(caps: &regex::Captures<'_>, skip: usize) -> Option<String> {
    caps.iter()
        .skip(1 + skip)
        .flatten()
        .next()
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn quoted_strings(text: &str) -> impl Iterator<Item = String> + '_ {
    QUOTED_STRING
        .captures_iter(text)
        .filter_map(|caps| name_of(&caps, 0))
}

/// 種類ごとの処理順: 規約ディレクトリ内のファイル (優先順) → キーワードを含むその他のファイル
fn ordered_files<'a>(
    scripts: &'a [ScriptFile],
    layout: &ProjectLayout,
    kind: ComponentKind,
) -> Vec<&'a ScriptFile> {
    let dirs = layout.conventional_dirs(kind.dir_name());
    let mut order: IndexSet<usize> = IndexSet::new();
    for dir in &dirs {
        for (i, script) in scripts.iter().enumerate() {
            if script.path.starts_with(dir) {
                order.insert(i);
            }
        }
    }
    for (i, script) in scripts.iter().enumerate() {
        if kind.declaration().is_match(&script.text) {
            order.insert(i);
        }
    }
    order.into_iter().map(|i| &scripts[i]).collect()
}

impl ComponentCatalog {
    pub fn build(scripts: &[ScriptFile], layout: &ProjectLayout, config: &AnalyzerConfig) -> Self {
        let mut catalog = Self::default();
        let filter = DependencyFilter::new(config);

        for kind in ComponentKind::ALL {
            for script in ordered_files(scripts, layout, kind) {
                catalog.record(kind, script, &filter);
            }
        }

        // 宣言を含むファイルだけ依存グラフに載せる
        for script in scripts {
            if ComponentKind::ALL
                .iter()
                .any(|kind| script.declarations(kind.declaration()).next().is_some())
            {
                catalog.graph.merge(script_dependencies(script));
            }
        }

        debug!(
            "catalog: {} controllers, {} services, {} directives, {} filters, {} modules",
            catalog.controllers.len(),
            catalog.services.len(),
            catalog.directives.len(),
            catalog.filters.len(),
            catalog.modules.len()
        );
        catalog
    }

    fn record(&mut self, kind: ComponentKind, script: &ScriptFile, filter: &DependencyFilter<'_>) {
        let file = script.key.clone();
        match kind {
            ComponentKind::Controller => {
                for caps in script.declarations(&CONTROLLER_DECL) {
                    if let Some(name) = name_of(&caps, 0) {
                        self.controllers
                            .insert(strip_controller_alias(&name), file.clone());
                    }
                }
                for caps in script.declarations(&CONTROLLER_INJECTION) {
                    let Some(name) = CONTROLLER_DECL
                        .captures(caps.get(0).map_or("", |m| m.as_str()))
                        .and_then(|c| name_of(&c, 0))
                    else {
                        continue;
                    };
                    let injected = caps.get(1).map_or("", |m| m.as_str());
                    let services = filter.filter(
                        quoted_strings(injected).filter(|s| !s.starts_with(RESERVED_SIGIL)),
                    );
                    self.service_dependencies
                        .insert(strip_controller_alias(&name), services);
                }
            }
            ComponentKind::Service => {
                for caps in script.declarations(&SERVICE_DECL) {
                    let Some(name) = name_of(&caps, 1) else { continue };
                    let key = match caps.get(1).map(|m| m.as_str()) {
                        Some("value") => format!("Value_{name}"),
                        Some("constant") => format!("Constant_{name}"),
                        _ => name,
                    };
                    self.services.insert(key, file.clone());
                }
                for caps in script.declarations(&RESOURCE_DECL) {
                    if let Some(endpoint) = name_of(&caps, 0) {
                        self.services
                            .insert(format!("Resource_{endpoint}"), file.clone());
                    }
                }
            }
            ComponentKind::Directive => {
                let found: Vec<(usize, String)> = script
                    .declarations(&DIRECTIVE_DECL)
                    .filter_map(|caps| Some((caps.get(0)?.end(), name_of(&caps, 0)?)))
                    .collect();
                for (i, (end, name)) in found.iter().enumerate() {
                    self.directives.insert(name.clone(), file.clone());
                    // 次の directive 宣言までに controller を持つなら別キーで controller にも載せる
                    let until = found
                        .get(i + 1)
                        .map_or(script.text.len(), |(next_end, _)| *next_end);
                    if CONTROLLER_KEY.is_match(&script.text[*end..until]) {
                        self.controllers
                            .insert(format!("Directive_{name}"), file.clone());
                    }
                }
            }
            ComponentKind::Filter => {
                for caps in script.declarations(&FILTER_DECL) {
                    if let Some(name) = name_of(&caps, 0) {
                        self.filters.insert(name, file.clone());
                    }
                }
            }
            ComponentKind::Module => {
                for caps in script.declarations(&MODULE_DECL) {
                    if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
                        self.modules.insert(name.as_str().to_string(), file.clone());
                    }
                }
            }
        }
    }
}

/// 1 ファイル分の依存: モジュールの依存配列と、最初の関数の `$` 以外の引数
pub fn script_dependencies(script: &ScriptFile) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for caps in script.declarations(&MODULE_DECL) {
        let deps = caps.get(3).map_or("", |m| m.as_str());
        graph.extend(
            &script.key,
            quoted_strings(deps).filter(|d| !d.starts_with(RESERVED_SIGIL)),
        );
    }
    if let Some(caps) = FIRST_FUNCTION_PARAMS.captures(&script.text) {
        let params = caps.get(1).map_or("", |m| m.as_str());
        graph.extend(
            &script.key,
            params
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty() && !p.starts_with(RESERVED_SIGIL))
                .map(str::to_string),
        );
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn build(root: &Path) -> ComponentCatalog {
        let config = AnalyzerConfig::default();
        let layout = ProjectLayout::discover(root, &config);
        let (scripts, skipped) = load_scripts(&layout, &config);
        assert!(skipped.is_empty());
        ComponentCatalog::build(&scripts, &layout, &config)
    }

    #[test]
    fn test_components_are_cataloged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/scripts/app.js", "angular.module('shop', ['ngRoute', 'shop.core']);");
        write(
            root,
            "app/scripts/controllers/home.js",
            "angular.module('shop').controller('HomeCtrl', ['$scope', 'CartService', 'UserService', function ($scope, CartService, UserService) {}]);\n// .controller('OldCtrl', function () {})",
        );
        write(
            root,
            "app/scripts/services/cart.js",
            "angular.module('shop')\n  .factory('CartService', function ($resource) { return $resource('/api/cart'); })\n  .value('taxRate', 0.2)\n  .constant('API', '/api');",
        );
        write(
            root,
            "app/scripts/directives/card.js",
            "app.directive('userCard', function () { return { controller: function () {} }; })\n.directive('plain', function () { return { template: '<p/>' }; });",
        );
        write(root, "app/scripts/filters/money.js", "app.filter('money', function () {});");

        let catalog = build(root);
        assert_eq!(
            catalog.controllers.keys().collect::<Vec<_>>(),
            vec!["Directive_userCard", "HomeCtrl"]
        );
        assert_eq!(
            catalog.services.keys().collect::<Vec<_>>(),
            vec!["CartService", "Constant_API", "Resource_/api/cart", "Value_taxRate"]
        );
        assert_eq!(catalog.directives.len(), 2);
        assert_eq!(catalog.filters["money"], "app/scripts/filters/money.js");
        assert_eq!(catalog.modules["shop"], "app/scripts/app.js");
        assert_eq!(
            catalog.service_dependencies["HomeCtrl"],
            vec!["CartService", "UserService"]
        );
        let app_deps: Vec<_> = catalog
            .graph
            .dependencies_of("app/scripts/app.js")
            .unwrap()
            .iter()
            .collect();
        assert_eq!(app_deps, vec!["ngRoute", "shop.core"]);
    }

    #[test]
    fn test_last_declaration_wins_with_conventional_dir_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/scripts/app.js", "");
        write(root, "app/scripts/b-controllers/a.js", "app.controller('SharedCtrl', f);");
        write(root, "app/scripts/misc/z.js", "app.controller('SharedCtrl', g);");
        let catalog = build(root);
        assert_eq!(catalog.controllers["SharedCtrl"], "app/scripts/misc/z.js");
    }

    #[test]
    fn test_injected_parameters_become_edges() {
        let script = ScriptFile::new(
            PathBuf::from("x.js"),
            "x.js".to_string(),
            "app.controller('A', function ($scope, Orders, Users) {});".to_string(),
        );
        let graph = script_dependencies(&script);
        let deps: Vec<_> = graph.dependencies_of("x.js").unwrap().iter().collect();
        assert_eq!(deps, vec!["Orders", "Users"]);
    }
}
