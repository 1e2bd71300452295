use std::fs;
use std::path::Path;

use serde::Deserialize;

/// 解析の設定値。
///
/// 一度組み立てたら変更せず、各コンポーネントには参照で渡す。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    /// 無視するディレクトリ。`/` を含むものはパス中の部分一致、
    /// 含まないものはディレクトリ名の完全一致
    pub ignore_dirs: Vec<String>,
    /// ファイル名にこの文字列を含むファイルは無視する (minified など)
    pub ignore_files: Vec<String>,
    /// テンプレートの論理キーから取り除くプレフィックス
    pub template_prefix: String,
    /// 検証パスを実行するか
    pub verify_routes: bool,
    /// 技術的なルート名の除外リスト (完全一致、または末尾 `.` でプレフィックス一致)
    pub excluded_routes: Vec<String>,
    pub vendor_indicators: Vec<String>,
    pub minified_indicators: Vec<String>,
    /// vendor と判定されても残すライブラリ
    pub allowed_vendor_libs: Vec<String>,
    /// 依存として認める拡張子
    pub file_extensions: Vec<String>,
    /// 拡張子なしのモジュール名として認める最小長 (この長さを超える必要がある)
    pub min_bare_name_len: usize,
    /// これより短い設定ブロックは壊れたパースとみなす
    pub min_config_len: usize,
    /// パターン抽出の取りこぼしがこの比率を下回ったら行単位のフォールバックに切り替える
    pub fallback_yield_ratio: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: strings(&[
                "v1",
                "scripts/vendor",
                "vendor",
                "node_modules",
                "dist",
                "build",
                "tmp",
            ]),
            ignore_files: strings(&[
                ".min.js",
                ".min.css",
                "-min.js",
                "-min.css",
                ".bundle.js",
                ".bundle.css",
                ".pack.js",
                ".compiled.js",
                ".prod.js",
                ".compressed.js",
                "dist.js",
                "compressed.css",
                "minimized.js",
            ]),
            template_prefix: "app/".to_string(),
            verify_routes: true,
            excluded_routes: strings(&[
                "root.access-denied",
                "root.not-found",
                "root.error",
                "root.login",
                "root.logout",
                "root.locked",
                "root.debug",
                "root.internal",
                "404",
                "error",
            ]),
            vendor_indicators: strings(&[
                "vendor/",
                "angular-",
                "jquery",
                "bootstrap",
                "datatables",
                "footable",
                "flot",
                "jqvmap",
                "magnific",
                "mixitup",
                "slider",
                "touchspin",
                "qrcode",
                "barcode",
                "libs/",
                "/lib/",
                "node_modules/",
            ]),
            minified_indicators: strings(&[
                ".min.js",
                ".min.css",
                "-min.js",
                "-min.css",
                ".bundle.js",
                ".bundle.css",
                ".pack.js",
                ".compiled.js",
                ".prod.js",
                ".compressed.js",
                "dist.js",
                "compressed.css",
                "minimized.js",
                "alasql",
                "xlsx.core",
                "columnfilter.js",
                "filestyle",
                ".googleapis.com",
                "cloudflare.com",
            ]),
            allowed_vendor_libs: strings(&[
                "angular-qrcode",
                "qrcode-generator",
                "barcode-generator",
                "slider",
                "table-to-excel",
                "ui-router",
                "ui-bootstrap",
            ]),
            file_extensions: strings(&[
                ".js", ".css", ".html", ".json", ".svg", ".png", ".jpg", ".jpeg", ".gif",
            ]),
            min_bare_name_len: 3,
            min_config_len: 5,
            fallback_yield_ratio: 0.9,
        }
    }
}

impl AnalyzerConfig {
    /// JSON の設定ファイルを読み込む。存在しなければデフォルト値
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// ディレクトリ名だけで無視と判定できるか (走査の枝刈り用)
    pub fn is_ignored_dir_name(&self, name: &str) -> bool {
        self.ignore_dirs
            .iter()
            .any(|d| !d.contains('/') && d == name)
    }

    pub fn is_ignored_file(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.ignore_files.iter().any(|p| lower.contains(p.as_str()))
    }

    /// プロジェクトルートからの相対パス (`/` 区切り) が無視対象か
    pub fn is_ignored_path(&self, rel: &str) -> bool {
        let mut parts: Vec<&str> = rel.split('/').collect();
        let file_name = parts.pop().unwrap_or_default();
        let in_ignored_dir = self.ignore_dirs.iter().any(|d| {
            if d.contains('/') {
                rel.contains(d.as_str())
            } else {
                parts.iter().any(|p| p == d)
            }
        });
        in_ignored_dir || self.is_ignored_file(file_name)
    }

    /// 除外リストに該当するルート名か
    pub fn is_excluded_route(&self, name: &str) -> bool {
        self.excluded_routes.iter().any(|pattern| {
            pattern == name || (pattern.ends_with('.') && name.starts_with(pattern.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.template_prefix, "app/");
        assert!(config.verify_routes);
        assert_eq!(config.min_bare_name_len, 3);
    }

    #[test]
    fn test_partial_config() {
        let json = r#"{
            "templatePrefix": "client/",
            "verifyRoutes": false
        }"#;

        let config: AnalyzerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.template_prefix, "client/");
        assert!(!config.verify_routes);
        assert!(config.ignore_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzer.json");
        fs::write(&path, "{ not json").unwrap();
        let config = AnalyzerConfig::load_from_path(&path);
        assert_eq!(config.template_prefix, "app/");
    }

    #[test]
    fn test_ignored_paths() {
        let config = AnalyzerConfig::default();
        assert!(config.is_ignored_path("node_modules/angular/angular.js"));
        assert!(config.is_ignored_path("app/scripts/vendor/jquery.js"));
        assert!(config.is_ignored_path("app/scripts/app.min.js"));
        assert!(!config.is_ignored_path("app/scripts/distance.js"));
        assert!(!config.is_ignored_path("app/scripts/dist.service/x.js.map"));
        assert!(config.is_ignored_path("dist/app.js"));
        assert!(config.is_ignored_dir_name("node_modules"));
        assert!(!config.is_ignored_dir_name("scripts"));
    }

    #[test]
    fn test_excluded_route_matching() {
        let config = AnalyzerConfig {
            excluded_routes: vec!["root.login".to_string(), "admin.".to_string()],
            ..AnalyzerConfig::default()
        };
        assert!(config.is_excluded_route("root.login"));
        assert!(!config.is_excluded_route("root.login.help"));
        assert!(config.is_excluded_route("admin.users"));
        assert!(!config.is_excluded_route("administration"));
    }
}
