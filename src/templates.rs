//! テンプレート・スタイル・アセット・vendor ライブラリの索引。

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::AnalyzerConfig;
use crate::graph::DependencyGraph;
use crate::model::Route;
use crate::resolver::{collect_files, probe_template_path, relative_key, ProjectLayout};
use crate::source::read_source;

static STYLE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@import\s+(?:url\(\s*)?['"]([^'"\n]+)['"]"#).unwrap());

const STYLE_EXTENSIONS: &[&str] = &[".css", ".scss", ".sass", ".less"];

const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".bmp", ".woff", ".woff2", ".ttf",
    ".eot", ".otf", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".csv", ".mp3", ".mp4", ".webm",
    ".ogg", ".wav",
];

/// 論理パス → テンプレートファイル
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    pub aliases: BTreeMap<String, String>,
    /// 索引に載せたファイル (相対パス、重複なし)
    pub files: Vec<String>,
}

/// 1 つのテンプレートファイルに付ける別名
fn aliases_for(rel: &str, prefix: &str, b_tmpl_rel: Option<&str>) -> Vec<String> {
    let mut aliases: IndexSet<String> = IndexSet::new();
    aliases.insert(rel.to_string());

    if !prefix.is_empty() {
        if let Some(stripped) = rel.strip_prefix(prefix) {
            aliases.insert(stripped.to_string());
        }
    }
    if let Some(pos) = rel.find("/views/") {
        aliases.insert(rel[pos + 1..].to_string());
    }
    if let Some(inner) = b_tmpl_rel.and_then(|dir| rel.strip_prefix(dir)?.strip_prefix('/')) {
        aliases.insert(format!("b-tmpl/{inner}"));
        aliases.insert(format!("views/b-tmpl/{inner}"));
    }
    aliases.into_iter().collect()
}

/// `app/`・views・`b-tmpl` 以下の HTML を別名付きで索引する
pub fn index_templates(layout: &ProjectLayout, config: &AnalyzerConfig) -> TemplateIndex {
    let b_tmpl = layout.b_tmpl_dir();
    let b_tmpl_rel = b_tmpl.as_ref().map(|dir| relative_key(&layout.root, dir));

    let mut files: IndexSet<PathBuf> = IndexSet::new();
    for dir in [Some(&layout.views_dir), b_tmpl.as_ref(), Some(&layout.app_dir)]
        .into_iter()
        .flatten()
    {
        files.extend(collect_files(&layout.root, dir, &[".html"], config));
    }

    let mut index = TemplateIndex::default();
    for path in files {
        let rel = relative_key(&layout.root, &path);
        for alias in aliases_for(&rel, &config.template_prefix, b_tmpl_rel.as_deref()) {
            index.aliases.insert(alias, rel.clone());
        }
        index.files.push(rel);
    }
    debug!(
        "indexed {} templates under {} keys",
        index.files.len(),
        index.aliases.len()
    );
    index
}

impl TemplateIndex {
    pub fn lookup(&self, template_url: &str) -> Option<&String> {
        self.aliases
            .get(template_url)
            .or_else(|| self.aliases.get(template_url.trim_start_matches('/')))
    }

    /// ルートが参照している templateUrl のうち索引にないものを、ファイルを探して追加する。
    /// 追加した数を返す
    pub fn link_routes(&mut self, routes: &[Route], root: &Path, prefix: &str) -> usize {
        let urls: IndexSet<&str> = routes
            .iter()
            .flat_map(|route| {
                route.template_url.iter().chain(
                    route
                        .views
                        .values()
                        .filter_map(|view| view.template_url.as_ref()),
                )
            })
            .map(String::as_str)
            .collect();

        let mut linked = 0;
        for url in urls {
            if self.lookup(url).is_some() {
                continue;
            }
            match probe_template_path(root, prefix, url) {
                Ok(Some(path)) => {
                    let rel = relative_key(root, &path);
                    debug!("linked template {} -> {}", url, rel);
                    self.aliases.insert(url.to_string(), rel);
                    linked += 1;
                }
                Ok(None) => debug!("template {} not found on disk", url),
                Err(e) => warn!("could not resolve template {}: {}", url, e),
            }
        }
        linked
    }
}

/// `userCard` → `user-card`
pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// テンプレートの中で使われているディレクティブを辺にする
pub fn directive_usage<'a>(
    root: &Path,
    templates: &[String],
    directives: impl IntoIterator<Item = &'a String> + Clone,
) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for rel in templates {
        let content = match read_source(&root.join(rel)) {
            Ok(content) => content,
            Err(reason) => {
                warn!("Skipping {}", reason);
                continue;
            }
        };
        let used = directives.clone().into_iter().filter(|name| {
            content.contains(camel_to_kebab(name).as_str()) || content.contains(name.as_str())
        });
        graph.extend(rel, used.cloned());
    }
    graph
}

/// app ディレクトリ (とスタイルディレクトリ) のスタイルシートを集め、`@import` を辺にする
pub fn index_styles(
    layout: &ProjectLayout,
    config: &AnalyzerConfig,
) -> (Vec<String>, DependencyGraph) {
    let mut files: BTreeSet<String> = BTreeSet::new();
    let mut graph = DependencyGraph::new();

    let dirs = [&layout.app_dir, &layout.styles_dir];
    for dir in dirs {
        for path in collect_files(&layout.root, dir, STYLE_EXTENSIONS, config) {
            let rel = relative_key(&layout.root, &path);
            if !files.insert(rel.clone()) {
                continue;
            }
            match read_source(&path) {
                Ok(content) => graph.extend(
                    &rel,
                    STYLE_IMPORT
                        .captures_iter(&content)
                        .filter_map(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string()),
                ),
                Err(reason) => warn!("Skipping {}", reason),
            }
        }
    }
    (files.into_iter().collect(), graph)
}

/// assets / fonts / images ディレクトリの静的ファイル
pub fn index_assets(layout: &ProjectLayout, config: &AnalyzerConfig) -> Vec<String> {
    let dirs = [
        Some(&layout.assets_dir),
        layout.fonts_dir.as_ref(),
        layout.images_dir.as_ref(),
    ];
    dirs.into_iter()
        .flatten()
        .flat_map(|dir| collect_files(&layout.root, dir, ASSET_EXTENSIONS, config))
        .map(|path| relative_key(&layout.root, &path))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `<scripts>/vendor` の許可リストにあるライブラリと、その minified でない `.js`
pub fn vendor_libraries(
    layout: &ProjectLayout,
    config: &AnalyzerConfig,
) -> BTreeMap<String, Vec<String>> {
    let vendor_dir = layout.scripts_dir.join("vendor");
    let mut libraries = BTreeMap::new();
    if !vendor_dir.is_dir() {
        return libraries;
    }

    for entry in WalkDir::new(&vendor_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !config.allowed_vendor_libs.iter().any(|lib| *lib == name) {
            continue;
        }
        let files: Vec<String> = WalkDir::new(entry.path())
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| relative_key(&layout.root, e.path()))
            .filter(|rel| rel.ends_with(".js"))
            .filter(|rel| {
                let file_name = rel.rsplit('/').next().unwrap_or(rel);
                !config.is_ignored_file(file_name) && !is_minified(config, rel)
            })
            .collect();
        libraries.insert(name, files);
    }
    libraries
}

fn is_minified(config: &AnalyzerConfig, rel: &str) -> bool {
    let lower = rel.to_lowercase();
    config
        .minified_indicators
        .iter()
        .any(|indicator| lower.contains(indicator.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            aliases_for("app/views/home.html", "app/", None),
            vec!["app/views/home.html", "views/home.html"]
        );
        assert_eq!(
            aliases_for("app/views/b-tmpl/card.html", "app/", Some("app/views/b-tmpl")),
            vec![
                "app/views/b-tmpl/card.html",
                "views/b-tmpl/card.html",
                "b-tmpl/card.html",
            ]
        );
        assert_eq!(
            aliases_for("src/partials/x.html", "app/", None),
            vec!["src/partials/x.html"]
        );
    }

    #[test]
    fn test_index_and_link_templates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/scripts/app.js", "");
        write(root, "app/views/home.html", "<user-card></user-card>");
        write(root, "partials/extra.html", "<p/>");

        let config = AnalyzerConfig::default();
        let layout = ProjectLayout::discover(root, &config);
        let mut index = index_templates(&layout, &config);
        assert_eq!(index.files, vec!["app/views/home.html"]);
        assert_eq!(
            index.lookup("/views/home.html").map(String::as_str),
            Some("app/views/home.html")
        );

        let mut route = Route::new("extra", crate::model::DialectKind::Hierarchical);
        route.template_url = Some("partials/extra.html".to_string());
        assert_eq!(index.link_routes(&[route], root, &config.template_prefix), 1);
        assert_eq!(
            index.lookup("partials/extra.html").map(String::as_str),
            Some("partials/extra.html")
        );
    }

    #[test]
    fn test_directive_usage_in_markup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "views/a.html", "<div><user-card user='u'></user-card></div>");
        write(root, "views/b.html", "<div nav-bar></div>");
        let directives = vec!["userCard".to_string(), "navBar".to_string(), "footer".to_string()];
        let graph = directive_usage(
            root,
            &["views/a.html".to_string(), "views/b.html".to_string()],
            &directives,
        );
        assert_eq!(graph.dependents_of("userCard"), vec!["views/a.html"]);
        assert_eq!(graph.dependents_of("navBar"), vec!["views/b.html"]);
        assert!(!graph.is_referenced("footer"));
    }

    #[test]
    fn test_styles_assets_and_vendor_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/scripts/app.js", "");
        write(root, "app/styles/main.scss", "@import 'variables';\n@import \"mixins/grid\";");
        write(root, "app/styles/print.css", "@import 'ignored.css';");
        write(root, "app/images/logo.png", "");
        write(root, "app/assets/docs/guide.pdf", "");
        write(root, "app/scripts/vendor/ui-router/release/ui-router.js", "");
        write(root, "app/scripts/vendor/ui-router/release/ui-router.min.js", "");
        write(root, "app/scripts/vendor/moment/moment.js", "");

        let config = AnalyzerConfig::default();
        let layout = ProjectLayout::discover(root, &config);

        let (styles, graph) = index_styles(&layout, &config);
        assert_eq!(styles, vec!["app/styles/main.scss", "app/styles/print.css"]);
        let imports: Vec<_> = graph
            .dependencies_of("app/styles/main.scss")
            .unwrap()
            .iter()
            .collect();
        assert_eq!(imports, vec!["variables", "mixins/grid"]);
        assert_eq!(
            graph.dependents_of("ignored.css"),
            vec!["app/styles/print.css"]
        );

        assert_eq!(
            index_assets(&layout, &config),
            vec!["app/assets/docs/guide.pdf", "app/images/logo.png"]
        );

        let libs = vendor_libraries(&layout, &config);
        assert_eq!(libs.keys().collect::<Vec<_>>(), vec!["ui-router"]);
        assert_eq!(
            libs["ui-router"],
            vec!["app/scripts/vendor/ui-router/release/ui-router.js"]
        );
    }

    #[test]
    fn test_camel_to_kebab() {
        assert_eq!(camel_to_kebab("userCard"), "user-card");
        assert_eq!(camel_to_kebab("nav"), "nav");
        assert_eq!(camel_to_kebab("myHTTPThing"), "my-h-t-t-p-thing");
    }
}
