//! 抽出品質を人が確認するための診断情報。
//!
//! 構造化モデル (JSON) とは別に、宣言の件数・採用名・未処理名・スキップした
//! ファイルなどを集め、プレーンテキストに整形する。

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::dialect::MalformedBlock;
use crate::model::{DeclarationStats, DialectKind, FileStage, Route, ViewConfig};
use crate::resolver::MissingPath;
use crate::templates::TemplateIndex;
use crate::verify::{Correction, VerificationStats};

/// 方言ごとの候補抽出の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialectDiagnostics {
    pub dialect: DialectKind,
    pub raw: usize,
    pub commented: usize,
    pub strategy_yields: Vec<(&'static str, usize)>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiagnostics {
    pub file: String,
    pub stage: FileStage,
    pub stats: DeclarationStats,
    pub dialects: Vec<DialectDiagnostics>,
    /// ブロックコメントの (開始行, 終了行)。1 始まり
    pub comment_blocks: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// ルートが参照しているのにプロジェクト内に見つからない名前やパス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedReference {
    pub route: String,
    /// view の中の参照なら view 名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    pub target: String,
}

impl UnresolvedReference {
    fn label(&self) -> String {
        match &self.view {
            Some(view) => format!("{} (view '{}'): {}", self.route, view, self.target),
            None => format!("{}: {}", self.route, self.target),
        }
    }
}

/// ルート本体と各 view の参照を並べる
fn route_references<'a>(
    route: &'a Route,
    top: &'a Option<String>,
    view_value: impl Fn(&'a ViewConfig) -> &'a Option<String>,
) -> Vec<UnresolvedReference> {
    let mut refs = Vec::new();
    if let Some(target) = top {
        refs.push(UnresolvedReference {
            route: route.name.clone(),
            view: None,
            target: target.clone(),
        });
    }
    for (name, view) in &route.views {
        if let Some(target) = view_value(view) {
            refs.push(UnresolvedReference {
                route: route.name.clone(),
                view: Some(name.clone()),
                target: target.clone(),
            });
        }
    }
    refs
}

/// カタログに無いコントローラ名
pub fn unresolved_controllers(
    routes: &[Route],
    controllers: &BTreeMap<String, String>,
) -> Vec<UnresolvedReference> {
    routes
        .iter()
        .flat_map(|route| route_references(route, &route.controller, |v| &v.controller))
        .filter(|r| !controllers.contains_key(&r.target))
        .collect()
}

/// どのテンプレートの別名にも当たらない templateUrl
pub fn unresolved_templates(routes: &[Route], templates: &TemplateIndex) -> Vec<UnresolvedReference> {
    routes
        .iter()
        .flat_map(|route| route_references(route, &route.template_url, |v| &v.template_url))
        .filter(|r| templates.lookup(&r.target).is_none())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub files: Vec<FileDiagnostics>,
    /// 全ルートファイルの合計 (ファイルをまたいだ重複も含む)
    pub totals: DeclarationStats,
    pub accepted: Vec<String>,
    /// キーワードは見つかったが採用されなかった宣言名
    pub unprocessed: Vec<String>,
    pub excluded: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub missing_paths: Vec<MissingPath>,
    pub malformed: Vec<MalformedBlock>,
    pub verification: Option<VerificationStats>,
    pub corrections: Vec<Correction>,
    /// どのテンプレートからも使われていないディレクティブ
    pub unreferenced_directives: Vec<String>,
    pub unresolved_controllers: Vec<UnresolvedReference>,
    pub unresolved_templates: Vec<UnresolvedReference>,
}

fn write_names(out: &mut String, title: &str, names: &[String]) {
    let _ = writeln!(out, "{} ({}):", title, names.len());
    for name in names {
        let _ = writeln!(out, "  - {name}");
    }
}

fn write_references(out: &mut String, title: &str, refs: &[UnresolvedReference]) {
    if refs.is_empty() {
        return;
    }
    let _ = writeln!(out, "{} ({}):", title, refs.len());
    for r in refs {
        let _ = writeln!(out, "  - {}", r.label());
    }
}

impl Diagnostics {
    /// プレーンテキストのサマリ
    pub fn render(&self) -> String {
        let mut out = String::new();
        let t = &self.totals;

        let _ = writeln!(out, "=== Route declaration summary ===");
        let _ = writeln!(out, "raw declarations:       {}", t.raw);
        let _ = writeln!(out, "commented:              {}", t.commented);
        let _ = writeln!(out, "duplicates:             {}", t.duplicate);
        let _ = writeln!(out, "invalid config blocks:  {}", t.invalid);
        let _ = writeln!(out, "excluded:               {}", t.excluded);
        let _ = writeln!(out, "malformed blocks:       {}", t.malformed);
        let _ = writeln!(out, "processed:              {}", t.processed);

        if let Some(v) = &self.verification {
            let _ = writeln!(out);
            let _ = writeln!(out, "=== Verification ===");
            let _ = writeln!(out, "routes verified:        {}", v.routes_verified);
            let _ = writeln!(out, "controller fixes:       {}", v.controller_fixes);
            let _ = writeln!(out, "template fixes:         {}", v.template_fixes);
            let _ = writeln!(out, "templateUrl fixes:      {}", v.template_url_fixes);
            let _ = writeln!(out, "abstract fixes:         {}", v.abstract_fixes);
            let _ = writeln!(out, "not found in source:    {}", v.not_found);
            for c in &self.corrections {
                let after = if c.field == "abstract" { "false" } else { "null" };
                let _ = writeln!(out, "  {}: {} '{}' -> {}", c.route, c.field, c.before, after);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "=== Files ===");
        for file in &self.files {
            let _ = writeln!(
                out,
                "{} [{}] raw={} commented={} processed={}",
                file.file,
                file.stage.label(),
                file.stats.raw,
                file.stats.commented,
                file.stats.processed
            );
            for (start, end) in &file.comment_blocks {
                let _ = writeln!(out, "  block comment: lines {start}-{end}");
            }
            for d in &file.dialects {
                let yields: Vec<String> = d
                    .strategy_yields
                    .iter()
                    .map(|(name, n)| format!("{name}={n}"))
                    .collect();
                let _ = writeln!(
                    out,
                    "  {}: {}{}",
                    d.dialect.label(),
                    yields.join(", "),
                    if d.used_fallback { " (fallback)" } else { "" }
                );
            }
        }

        let _ = writeln!(out);
        write_names(&mut out, "Accepted", &self.accepted);
        write_names(&mut out, "Unprocessed", &self.unprocessed);
        write_names(&mut out, "Excluded", &self.excluded);
        write_names(&mut out, "Unreferenced directives", &self.unreferenced_directives);
        write_references(&mut out, "Unresolved controllers", &self.unresolved_controllers);
        write_references(&mut out, "Unresolved templates", &self.unresolved_templates);

        if !self.malformed.is_empty() {
            let _ = writeln!(out, "Malformed blocks ({}):", self.malformed.len());
            for m in &self.malformed {
                let _ = writeln!(out, "  - {} ({}:{})", m.name, m.file, m.line);
            }
        }
        if !self.skipped.is_empty() {
            let _ = writeln!(out, "Skipped files ({}):", self.skipped.len());
            for s in &self.skipped {
                let _ = writeln!(out, "  - {}: {}", s.path, s.reason);
            }
        }
        if !self.missing_paths.is_empty() {
            let _ = writeln!(out, "Missing paths ({}):", self.missing_paths.len());
            for m in &self.missing_paths {
                let _ = writeln!(out, "  - {} (using {})", m.what, m.fallback);
            }
        }
        out
    }
}
