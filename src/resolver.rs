use path_absolutize::Absolutize;
use path_slash::PathExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::AnalyzerConfig;
use crate::deps::DependencyFilter;

const APP_DIRS: &[&str] = &["app", "src", "client", "www"];

const ROUTE_FILES: &[&str] = &[
    "app/scripts/app.js",
    "app/app.js",
    "src/app.js",
    "src/app/app.js",
    "www/js/app.js",
    "scripts/app.js",
    "js/app.js",
];

/// `app*.js` が見つからないときに探すファイル名 (優先順)
const ALTERNATE_ROUTE_FILES: &[&str] = &["app.module.js", "routes.js", "config.js"];

const SCRIPTS_DIRS: &[&str] = &[
    "app/scripts",
    "app/js",
    "src/scripts",
    "src/js",
    "www/js",
    "scripts",
    "js",
];

const VIEWS_DIRS: &[&str] = &[
    "app/views",
    "views",
    "src/views",
    "src/app/views",
    "templates",
    "src/templates",
];

const STYLES_DIRS: &[&str] = &[
    "app/sass",
    "app/scss",
    "app/css",
    "app/styles",
    "src/sass",
    "src/scss",
    "src/css",
    "src/styles",
    "sass",
    "scss",
    "css",
    "styles",
];

const ASSETS_DIRS: &[&str] = &[
    "app/assets",
    "src/assets",
    "assets",
    "public/assets",
    "static/assets",
    "www/assets",
];

/// 規約上の場所が見つからず既定値を使ったことの記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingPath {
    pub what: &'static str,
    pub fallback: String,
}

/// 推定したプロジェクトの構成
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub app_dir: PathBuf,
    pub route_file: PathBuf,
    pub scripts_dir: PathBuf,
    pub views_dir: PathBuf,
    pub styles_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub fonts_dir: Option<PathBuf>,
    pub images_dir: Option<PathBuf>,
    pub missing: Vec<MissingPath>,
}

/// 候補 (ルートからの相対パス) を優先順に試し、最初に存在するものを返す
pub fn resolve_conventional_path(root: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.exists())
}

/// プロジェクトルートからの相対パスを `/` 区切りで返す
pub fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_slash_lossy()
        .into_owned()
}

/// 無視ルール: 無視ディレクトリ・無視ファイル名・vendor/minified の判定
pub fn should_ignore(root: &Path, path: &Path, config: &AnalyzerConfig) -> bool {
    let rel = relative_key(root, path);
    config.is_ignored_path(&rel) || DependencyFilter::new(config).is_vendor_or_minified(&rel)
}

/// `base` 以下の指定拡張子のファイルを名前順に集める。無視ルールに当たるものは除く
pub fn collect_files(
    root: &Path,
    base: &Path,
    extensions: &[&str],
    config: &AnalyzerConfig,
) -> Vec<PathBuf> {
    if !base.is_dir() {
        return Vec::new();
    }
    WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !config.is_ignored_dir_name(&e.file_name().to_string_lossy())
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            extensions.iter().any(|ext| name.ends_with(ext))
        })
        .filter(|path| !should_ignore(root, path, config))
        .collect()
}

/// ツリー内で名前が一致する最初のディレクトリ (名前順の走査で最初に見つかったもの)
fn find_dir_named(root: &Path, name: &str, config: &AnalyzerConfig) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !config.is_ignored_dir_name(&e.file_name().to_string_lossy())
        })
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_dir() && e.depth() > 0 && e.file_name() == name)
        .map(|e| e.into_path())
}

fn find_file_where(
    root: &Path,
    config: &AnalyzerConfig,
    predicate: impl Fn(&str) -> bool,
) -> Option<PathBuf> {
    collect_files(root, root, &[".js"], config)
        .into_iter()
        .find(|path| {
            path.file_name()
                .map(|n| predicate(&n.to_string_lossy()))
                .unwrap_or(false)
        })
}

impl ProjectLayout {
    /// ルートディレクトリから構成を推定する。見つからなかった場所は既定値で埋め、
    /// `missing` に記録する
    pub fn discover(root: &Path, config: &AnalyzerConfig) -> Self {
        let mut missing = Vec::new();
        let mut or_default = |found: Option<PathBuf>, what: &'static str, default: PathBuf| {
            match found {
                Some(path) => {
                    info!("Found {} at {}", what, path.display());
                    path
                }
                None => {
                    warn!("Could not find {}, using {}", what, default.display());
                    missing.push(MissingPath {
                        what,
                        fallback: relative_key(root, &default),
                    });
                    default
                }
            }
        };

        let app_dir = or_default(
            resolve_conventional_path(root, APP_DIRS).filter(|p| p.is_dir()),
            "app directory",
            root.join("app"),
        );

        // 1) 典型的な場所 2) app*.js 3) app.module.js / routes.js / config.js
        let route_file = resolve_conventional_path(root, ROUTE_FILES)
            .or_else(|| find_file_where(root, config, |name| name.starts_with("app")))
            .or_else(|| {
                ALTERNATE_ROUTE_FILES
                    .iter()
                    .find_map(|wanted| find_file_where(root, config, |name| name == *wanted))
            });
        let route_file = or_default(route_file, "route file", root.join(ROUTE_FILES[0]));

        let scripts_dir = or_default(
            resolve_conventional_path(root, SCRIPTS_DIRS).filter(|p| p.is_dir()),
            "scripts directory",
            root.join(SCRIPTS_DIRS[0]),
        );
        let views_dir = or_default(
            resolve_conventional_path(root, VIEWS_DIRS).filter(|p| p.is_dir()),
            "views directory",
            root.join(VIEWS_DIRS[0]),
        );
        let styles_dir = or_default(
            resolve_conventional_path(root, STYLES_DIRS).filter(|p| p.is_dir()),
            "styles directory",
            root.join(STYLES_DIRS[0]),
        );
        let assets_dir = or_default(
            resolve_conventional_path(root, ASSETS_DIRS).filter(|p| p.is_dir()),
            "assets directory",
            root.join(ASSETS_DIRS[0]),
        );

        let fonts_dir = find_dir_named(root, "fonts", config);
        let images_dir = find_dir_named(root, "images", config);

        Self {
            root: root.to_path_buf(),
            app_dir,
            route_file,
            scripts_dir,
            views_dir,
            styles_dir,
            assets_dir,
            fonts_dir,
            images_dir,
            missing,
        }
    }

    /// 規約ディレクトリ (`b-<kind>` を優先) のうち存在するもの
    pub fn conventional_dirs(&self, kind: &str) -> Vec<PathBuf> {
        let prefixed = format!("b-{kind}");
        [
            self.scripts_dir.join(&prefixed),
            self.app_dir.join(&prefixed),
            self.scripts_dir.join(kind),
            self.app_dir.join(kind),
        ]
        .into_iter()
        .filter(|p| p.is_dir())
        .fold(Vec::new(), |mut dirs, dir| {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
            dirs
        })
    }

    /// `b-tmpl` テンプレートディレクトリ
    pub fn b_tmpl_dir(&self) -> Option<PathBuf> {
        [
            self.views_dir.join("b-tmpl"),
            self.app_dir.join("b-tmpl"),
            self.root.join("views").join("b-tmpl"),
        ]
        .into_iter()
        .find(|p| p.is_dir())
    }

    /// メインのルートファイルの後に解析する `routes.js` / `config.js` (名前順)
    pub fn additional_route_files(&self, config: &AnalyzerConfig) -> Vec<PathBuf> {
        collect_files(&self.root, &self.scripts_dir, &[".js"], config)
            .into_iter()
            .filter(|path| *path != self.route_file)
            .filter(|path| {
                path.file_name()
                    .is_some_and(|n| n == "routes.js" || n == "config.js")
            })
            .collect()
    }
}

/// テンプレート URL をファイルに解決する。
///
/// `<root>/<prefix>/<url>`、`<root>/<url>`、`<root>/views/<url>` の順に試し、
/// 見つかったものを絶対パスで返す
pub fn probe_template_path(
    root: &Path,
    template_prefix: &str,
    template_url: &str,
) -> Result<Option<PathBuf>, std::io::Error> {
    let url = template_url.trim_start_matches('/');
    let candidates = [
        root.join(template_prefix.trim_end_matches('/')).join(url),
        root.join(url),
        root.join("views").join(url),
    ];

    for cand in candidates {
        let abs = cand.absolutize()?.to_path_buf();
        if abs.is_file() {
            debug!("resolved template {} -> {}", template_url, abs.display());
            return Ok(Some(abs));
        }
    }
    Ok(None)
}
