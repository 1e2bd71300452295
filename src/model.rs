// src/model.rs
use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;

use crate::graph::DependencyGraph;

/// ルート宣言の方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// `$stateProvider.state('a.b', {...})` 形式 (ui-router)
    Hierarchical,
    /// `$routeProvider.when('/path', {...})` 形式 (ngRoute)
    Flat,
}

impl DialectKind {
    pub fn label(self) -> &'static str {
        match self {
            DialectKind::Hierarchical => "hierarchical",
            DialectKind::Flat => "flat",
        }
    }
}

/// 名前付き view (ui-view) ごとの設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_url: Option<String>,
}

impl ViewConfig {
    pub fn is_empty(&self) -> bool {
        self.controller.is_none() && self.template_url.is_none()
    }
}

/// 解析した各ルートの情報を保持する構造体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// ルート名 (state 方言ではドット区切りの階層名、flat 方言ではパス)
    pub name: String,

    /// URL (`^` で始まる絶対 URL 指定もそのまま保持)
    pub url: Option<String>,

    pub controller: Option<String>,
    pub template_url: Option<String>,

    /// インラインテンプレート
    pub template: Option<String>,

    /// 親 state (名前のドット区切りから導出、state 方言のみ)
    pub parent: Option<String>,

    #[serde(rename = "abstract")]
    pub is_abstract: bool,

    /// 名前付き view
    pub views: BTreeMap<String, ViewConfig>,

    /// resolve に現れる依存 (初出順、重複なし)
    pub resolve_dependencies: Vec<String>,

    /// 遅延ロードされるファイル (初出順、重複なし)
    pub plugins: Vec<String>,

    pub dialect: DialectKind,

    /// `redirectTo` の遷移先
    pub redirect: Option<String>,

    /// このルート定義が書かれているファイル (プロジェクトルートからの相対パス)
    pub source_file: String,

    /// 宣言の行番号 (1 始まり)
    pub line: usize,

    /// 宣言キーワードのバイトオフセット
    #[serde(skip)]
    pub offset: usize,

    /// 採用した設定ブロックのバイト範囲。検証パスが宣言を探し直すときに使う
    #[serde(skip)]
    pub span: Option<Range<usize>>,
}

impl Route {
    pub fn new(name: impl Into<String>, dialect: DialectKind) -> Self {
        Self {
            name: name.into(),
            url: None,
            controller: None,
            template_url: None,
            template: None,
            parent: None,
            is_abstract: false,
            views: BTreeMap::new(),
            resolve_dependencies: Vec::new(),
            plugins: Vec::new(),
            dialect,
            redirect: None,
            source_file: String::new(),
            line: 0,
            offset: 0,
            span: None,
        }
    }
}

/// ファイル単位の処理段階。前にしか進まない
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStage {
    #[default]
    Unscanned,
    CandidatesFound,
    Deduplicated,
    FieldDecoded,
    Verified,
    Reported,
}

impl FileStage {
    /// `next` が今より後の段階なら進める。戻る遷移は無視して false を返す
    pub fn advance(&mut self, next: FileStage) -> bool {
        if next <= *self {
            return false;
        }
        *self = next;
        true
    }

    pub fn label(self) -> &'static str {
        match self {
            FileStage::Unscanned => "unscanned",
            FileStage::CandidatesFound => "candidates-found",
            FileStage::Deduplicated => "deduplicated",
            FileStage::FieldDecoded => "field-decoded",
            FileStage::Verified => "verified",
            FileStage::Reported => "reported",
        }
    }
}

/// 宣言の集計値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationStats {
    /// 宣言キーワードの出現数 (コメント内も含む)
    pub raw: usize,
    /// コメント内の出現数
    pub commented: usize,
    pub duplicate: usize,
    /// 設定ブロックが短すぎるもの
    pub invalid: usize,
    /// 除外リストに該当したもの
    pub excluded: usize,
    /// 閉じ括弧が見つからなかったもの
    pub malformed: usize,
    /// 採用されたもの
    pub processed: usize,
}

impl DeclarationStats {
    pub fn merge(&mut self, other: &DeclarationStats) {
        self.raw += other.raw;
        self.commented += other.commented;
        self.duplicate += other.duplicate;
        self.invalid += other.invalid;
        self.excluded += other.excluded;
        self.malformed += other.malformed;
        self.processed += other.processed;
    }
}

/// レポートの件数サマリ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub routes_count: usize,
    pub controllers_count: usize,
    pub services_count: usize,
    pub directives_count: usize,
    pub filters_count: usize,
    pub modules_count: usize,
    pub templates_count: usize,
    pub styles_count: usize,
    pub assets_count: usize,
    pub plugins_count: usize,
    pub vendor_libraries_count: usize,
    /// 依存グラフのノード数と辺の数
    pub dependency_files_count: usize,
    pub dependency_edges_count: usize,
}

/// 解析結果の構造化モデル。JSON にそのまま書き出す
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub project_root: String,
    pub routes: Vec<Route>,
    pub controllers: BTreeMap<String, String>,
    pub services: BTreeMap<String, String>,
    pub directives: BTreeMap<String, String>,
    pub filters: BTreeMap<String, String>,
    pub modules: BTreeMap<String, String>,
    /// 論理パス (別名を含む) → テンプレートファイル
    pub templates: BTreeMap<String, String>,
    pub styles: Vec<String>,
    pub assets: Vec<String>,
    /// ファイル → 参照しているモジュール・ファイル・ディレクティブ
    pub dependencies: DependencyGraph,
    /// コントローラ → 注入されているサービス
    pub service_dependencies: BTreeMap<String, Vec<String>>,
    pub vendor_libraries: BTreeMap<String, Vec<String>>,
    /// 全ルートの遅延ロードファイル (vendor/minified を除く)
    pub plugins: Vec<String>,
    pub summary: Summary,
}

impl AnalysisReport {
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
