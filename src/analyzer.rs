//! 解析の全体の流れ。
//!
//! ルートファイルを 1 つずつ読み、方言ごとの候補抽出 → ふるい分け → フィールド
//! 抽出を行って [`FileAnalysis`] にする。結果はファイルの処理順に畳み込み、
//! ファイルをまたいだ同名ルートは先に出たものを残す。その後に検証パス、
//! カタログ、テンプレートなどの収集を行う。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use path_absolutize::Absolutize;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::catalog::{load_scripts, ComponentCatalog};
use crate::comments::CommentMap;
use crate::config::AnalyzerConfig;
use crate::deps::DependencyFilter;
use crate::dialect::{
    screen_candidates, FlatDialect, HierarchicalDialect, MalformedBlock, RouteDialect,
};
use crate::error::{AnalyzerError, SkipReason};
use crate::fields::decode_route;
use crate::graph::DependencyGraph;
use crate::model::{AnalysisReport, DeclarationStats, FileStage, Route, Summary};
use crate::report::{
    unresolved_controllers, unresolved_templates, DialectDiagnostics, Diagnostics,
    FileDiagnostics, SkippedFile,
};
use crate::resolver::{relative_key, ProjectLayout};
use crate::source::read_source;
use crate::templates::{
    directive_usage, index_assets, index_styles, index_templates, vendor_libraries,
};
use crate::verify::verify_routes;

/// `require([...])` / `define([...])` の依存配列
static MODULE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:require|define)\s*\(\s*\[([^\]]*)\]").unwrap()
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^'\n]*)'|"([^"\n]*)""#).unwrap());
/// ルートファイル中の `.js` / `.css` ファイル参照
static FILE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]([^'"\s]+\.(?:js|css))['"]"#).unwrap()
});

/// 1 ルートファイル分の解析結果
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub file: String,
    pub stage: FileStage,
    pub routes: Vec<Route>,
    pub stats: DeclarationStats,
    pub dialects: Vec<DialectDiagnostics>,
    pub excluded: Vec<String>,
    /// キーワードはあるが採用されなかった宣言名
    pub unprocessed: Vec<String>,
    pub malformed: Vec<MalformedBlock>,
    /// require / define の依存とファイル参照 (フィルタ済み)
    pub dependencies: Vec<String>,
    /// ブロックコメントの (開始行, 終了行)。1 始まり
    pub comment_blocks: Vec<(usize, usize)>,
}

/// 解析結果: JSON に出すモデルと、人が読む診断情報
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: AnalysisReport,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

fn quoted_values(text: &str) -> impl Iterator<Item = &str> {
    QUOTED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
}

/// ルートファイルが参照しているモジュールとファイル
fn route_file_dependencies(
    text: &str,
    comments: &CommentMap,
    filter: &DependencyFilter<'_>,
) -> Vec<String> {
    let mut tokens: Vec<&str> = Vec::new();
    for caps in MODULE_LIST.captures_iter(text) {
        let (Some(all), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !comments.is_commented(all.start()) {
            tokens.extend(quoted_values(list.as_str()));
        }
    }
    for caps in FILE_REFERENCE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if !comments.is_commented(m.start()) {
                tokens.push(m.as_str());
            }
        }
    }
    filter.filter(tokens)
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// 1 ファイル分のソースからルートを取り出す。ファイル内の処理は
    /// 候補抽出 → ふるい分け → フィールド抽出の順に進む
    pub fn analyze_route_source(&self, key: &str, text: &str) -> FileAnalysis {
        let comments = CommentMap::new(text);
        let filter = DependencyFilter::new(&self.config);
        let dialects: [&dyn RouteDialect; 2] = [&HierarchicalDialect, &FlatDialect];

        let mut analysis = FileAnalysis {
            file: key.to_string(),
            stage: FileStage::Unscanned,
            routes: Vec::new(),
            stats: DeclarationStats::default(),
            dialects: Vec::new(),
            excluded: Vec::new(),
            unprocessed: Vec::new(),
            malformed: Vec::new(),
            dependencies: Vec::new(),
            comment_blocks: comments
                .block_line_spans()
                .into_iter()
                .map(|(start, end)| (start + 1, end + 1))
                .collect(),
        };

        // 1) 方言ごとの候補抽出
        let scans: Vec<_> = dialects
            .iter()
            .map(|dialect| (dialect.kind(), dialect.find_candidates(text, &comments, &self.config)))
            .collect();
        analysis.stage.advance(FileStage::CandidatesFound);

        // 2) ふるい分け
        let mut accepted = Vec::new();
        for (kind, scan) in &scans {
            if scan.raw > 0 {
                debug!(
                    "{}: {} {} declarations ({} commented), yields {:?}",
                    key,
                    scan.raw,
                    kind.label(),
                    scan.commented,
                    scan.strategy_yields
                );
            }
            for block in &scan.malformed {
                warn!(
                    "{}:{}: config block of '{}' is never closed",
                    key, block.line, block.name
                );
                analysis.malformed.push(MalformedBlock {
                    file: key.to_string(),
                    ..block.clone()
                });
            }

            let screened = screen_candidates(scan, &comments, &self.config);
            analysis.stats.merge(&screened.stats);
            analysis.excluded.extend(screened.excluded);
            analysis.dialects.push(DialectDiagnostics {
                dialect: *kind,
                raw: scan.raw,
                commented: scan.commented,
                strategy_yields: scan.strategy_yields.clone(),
                used_fallback: scan.used_fallback,
            });
            accepted.extend(screened.accepted.into_iter().map(|c| (*kind, c)));
        }
        analysis.stage.advance(FileStage::Deduplicated);

        // 3) フィールド抽出
        analysis.routes = accepted
            .iter()
            .map(|(kind, candidate)| decode_route(candidate, *kind, text, key, &filter))
            .collect();
        analysis.stage.advance(FileStage::FieldDecoded);

        // 名前だけのスキャンとの差分を未処理として残す
        let handled: HashSet<&str> = analysis
            .routes
            .iter()
            .map(|r| r.name.as_str())
            .chain(analysis.excluded.iter().map(String::as_str))
            .collect();
        analysis.unprocessed = dialects
            .iter()
            .flat_map(|dialect| dialect.declared_names(text, &comments))
            .filter(|name| !handled.contains(name.as_str()))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        analysis.dependencies = route_file_dependencies(text, &comments, &filter);
        analysis
    }

    /// ルートファイルを読んで解析する。内容は検証パスのために一緒に返す
    fn analyze_route_file(
        &self,
        root: &Path,
        path: &Path,
    ) -> Result<(FileAnalysis, String), SkipReason> {
        let text = read_source(path)?;
        let analysis = self.analyze_route_source(&relative_key(root, path), &text);
        Ok((analysis, text))
    }

    /// プロジェクト全体を解析する。止まるのはルートがディレクトリでないときだけ
    pub fn analyze(&self, project_root: &Path) -> Result<Analysis, AnalyzerError> {
        if !project_root.is_dir() {
            return Err(AnalyzerError::InvalidRoot(project_root.to_path_buf()));
        }
        let root = project_root.absolutize()?.to_path_buf();
        info!("Analyzing {}", root.display());

        // 1) 構成の推定
        let layout = ProjectLayout::discover(&root, &self.config);
        let mut diagnostics = Diagnostics {
            missing_paths: layout.missing.clone(),
            ..Diagnostics::default()
        };

        // 2) ルートファイルの解析 (メイン → routes.js / config.js)
        let mut route_files: Vec<PathBuf> = Vec::new();
        if layout.route_file.is_file() {
            route_files.push(layout.route_file.clone());
        }
        route_files.extend(layout.additional_route_files(&self.config));

        let mut routes: Vec<Route> = Vec::new();
        let mut stages: Vec<FileStage> = Vec::new();
        let mut sources: HashMap<String, String> = HashMap::new();
        let mut graph = DependencyGraph::new();
        let mut seen: HashSet<String> = HashSet::new();

        for path in &route_files {
            let (mut file, text) = match self.analyze_route_file(&root, path) {
                Ok(result) => result,
                Err(reason) => {
                    warn!("Skipping {}", reason);
                    diagnostics.skipped.push(skipped_file(&root, &reason));
                    continue;
                }
            };
            info!("{}: {} routes", file.file, file.routes.len());

            // ファイルをまたいだ重複は先勝ち
            let before = file.routes.len();
            file.routes.retain(|route| {
                if seen.insert(route.name.clone()) {
                    true
                } else {
                    debug!("duplicate route '{}' in {}", route.name, route.source_file);
                    false
                }
            });
            let dropped = before - file.routes.len();
            file.stats.duplicate += dropped;
            file.stats.processed -= dropped;

            graph.extend(&file.file, file.dependencies.iter().cloned());
            sources.insert(file.file.clone(), text);

            diagnostics.totals.merge(&file.stats);
            diagnostics.excluded.extend(file.excluded.iter().cloned());
            diagnostics.unprocessed.extend(file.unprocessed.iter().cloned());
            diagnostics.malformed.extend(file.malformed.iter().cloned());
            diagnostics.files.push(FileDiagnostics {
                file: file.file.clone(),
                stage: file.stage,
                stats: file.stats,
                dialects: file.dialects.clone(),
                comment_blocks: file.comment_blocks.clone(),
            });
            stages.push(file.stage);
            routes.extend(file.routes);
        }

        // 3) 検証パス
        if self.config.verify_routes {
            let outcome = verify_routes(&mut routes, &sources);
            info!(
                "verification: {} routes, {} controller fixes, {} template fixes, {} templateUrl fixes, {} abstract fixes, {} not found",
                outcome.stats.routes_verified,
                outcome.stats.controller_fixes,
                outcome.stats.template_fixes,
                outcome.stats.template_url_fixes,
                outcome.stats.abstract_fixes,
                outcome.stats.not_found
            );
            diagnostics.verification = Some(outcome.stats);
            diagnostics.corrections = outcome.corrections;
            for stage in &mut stages {
                stage.advance(FileStage::Verified);
            }
        }
        for (file, stage) in diagnostics.files.iter_mut().zip(stages.iter_mut()) {
            stage.advance(FileStage::Reported);
            file.stage = *stage;
        }
        diagnostics.accepted = routes.iter().map(|r| r.name.clone()).collect();

        // 4) コンポーネントカタログ
        let (scripts, skipped) = load_scripts(&layout, &self.config);
        for reason in &skipped {
            let entry = skipped_file(&root, reason);
            if !diagnostics.skipped.contains(&entry) {
                diagnostics.skipped.push(entry);
            }
        }
        let mut catalog = ComponentCatalog::build(&scripts, &layout, &self.config);
        graph.merge(std::mem::take(&mut catalog.graph));

        // 5) テンプレート・スタイル・アセット
        let mut templates = index_templates(&layout, &self.config);
        let linked = templates.link_routes(&routes, &root, &self.config.template_prefix);
        debug!("linked {} route templates outside the conventional dirs", linked);

        // ルートが参照しているのに見つからないもの
        diagnostics.unresolved_controllers = unresolved_controllers(&routes, &catalog.controllers);
        diagnostics.unresolved_templates = unresolved_templates(&routes, &templates);
        for r in diagnostics
            .unresolved_controllers
            .iter()
            .chain(&diagnostics.unresolved_templates)
        {
            warn!("route '{}' references unknown {}", r.route, r.target);
        }

        let usage = directive_usage(&root, &templates.files, catalog.directives.keys());
        diagnostics.unreferenced_directives = catalog
            .directives
            .keys()
            .filter(|name| !usage.is_referenced(name))
            .cloned()
            .collect();
        graph.merge(usage);

        let (styles, style_graph) = index_styles(&layout, &self.config);
        graph.merge(style_graph);
        let assets = index_assets(&layout, &self.config);
        let vendor = vendor_libraries(&layout, &self.config);

        let plugins: Vec<String> = routes
            .iter()
            .flat_map(|r| r.plugins.iter().cloned())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();

        // 6) レポート
        let summary = Summary {
            routes_count: routes.len(),
            controllers_count: catalog.controllers.len(),
            services_count: catalog.services.len(),
            directives_count: catalog.directives.len(),
            filters_count: catalog.filters.len(),
            modules_count: catalog.modules.len(),
            templates_count: templates.files.len(),
            styles_count: styles.len(),
            assets_count: assets.len(),
            plugins_count: plugins.len(),
            vendor_libraries_count: vendor.len(),
            dependency_files_count: graph.node_count(),
            dependency_edges_count: graph.edge_count(),
        };
        let report = AnalysisReport {
            project_root: root.to_string_lossy().into_owned(),
            routes,
            controllers: catalog.controllers,
            services: catalog.services,
            directives: catalog.directives,
            filters: catalog.filters,
            modules: catalog.modules,
            templates: templates.aliases,
            styles,
            assets,
            dependencies: graph,
            service_dependencies: catalog.service_dependencies,
            vendor_libraries: vendor,
            plugins,
            summary,
        };
        info!("Found {} routes", report.summary.routes_count);

        Ok(Analysis {
            report,
            diagnostics,
        })
    }
}

fn skipped_file(root: &Path, reason: &SkipReason) -> SkippedFile {
    SkippedFile {
        path: relative_key(root, reason.path()),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DialectKind;
    use pretty_assertions::assert_eq;

    fn analyze(text: &str) -> FileAnalysis {
        Analyzer::default().analyze_route_source("app/scripts/app.js", text)
    }

    #[test]
    fn test_file_reaches_field_decoded() {
        let file = analyze("$stateProvider.state('home', { url: '/', template: '<p/>' });");
        assert_eq!(file.stage, FileStage::FieldDecoded);
        assert_eq!(file.routes.len(), 1);
        assert_eq!(file.routes[0].source_file, "app/scripts/app.js");
        assert_eq!(file.routes[0].line, 1);
    }

    #[test]
    fn test_empty_file_still_progresses() {
        let file = analyze("// nothing to see\n");
        assert_eq!(file.stage, FileStage::FieldDecoded);
        assert!(file.routes.is_empty());
        assert_eq!(file.stats, DeclarationStats::default());
    }

    #[test]
    fn test_both_dialects_in_one_file() {
        let text = r#"
angular.module('app').config(function ($stateProvider, $routeProvider) {
    $stateProvider.state('home', { url: '/home', controller: 'HomeCtrl' });
    $routeProvider.when('/legacy', { templateUrl: 'views/legacy.html' });
});
"#;
        let file = analyze(text);
        let dialects: Vec<_> = file.routes.iter().map(|r| (r.name.as_str(), r.dialect)).collect();
        assert_eq!(
            dialects,
            vec![("home", DialectKind::Hierarchical), ("/legacy", DialectKind::Flat)]
        );
    }

    #[test]
    fn test_excluded_and_unprocessed_names() {
        let text = r#"
$stateProvider
    .state('root.login', { url: '/login', template: '<login/>' })
    .state('broken', {)
    .state('ok', { url: '/ok' });
"#;
        let file = analyze(text);
        assert_eq!(file.excluded, vec!["root.login"]);
        let names: Vec<_> = file.routes.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"ok"));
        assert!(!file.unprocessed.contains(&"ok".to_string()));
        assert!(!file.unprocessed.contains(&"root.login".to_string()));
    }

    #[test]
    fn test_route_file_dependencies() {
        let text = r#"
define(['angular', 'ui-router', 'jquery.min.js', 'scripts/cart.service.js'], function () {});
// require(['commented-module'])
var extra = 'styles/app.css';
"#;
        let file = analyze(text);
        assert_eq!(
            file.dependencies,
            vec!["angular", "ui-router", "scripts/cart.service.js", "styles/app.css"]
        );
    }
}
