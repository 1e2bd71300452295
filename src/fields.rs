//! 設定ブロックからルートのフィールドを取り出す。
//!
//! どのフィールドも「まず文字列リテラルの形、だめなら素の識別子の形」の順に
//! 正規表現を試し、最初に当たったものを採る。キーはブロックの最上位にある
//! ものだけを数え、入れ子の view や resolve の中の同名キーは無視する。

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::{Captures, Regex};

use crate::block::{matching_brace, matching_delimiter, top_level_mask};
use crate::deps::{is_keyword, DependencyFilter, RESERVED_SIGIL};
use crate::dialect::Candidate;
use crate::model::{DialectKind, Route, ViewConfig};

static URL_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\burl\s*:\s*(?:'([^'\n]*)'|"([^"\n]*)")"#).unwrap());
static URL_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\burl\s*:\s*([^,\s}\n]+)").unwrap());

static CONTROLLER_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bcontroller\s*:\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
static CONTROLLER_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bcontroller\s*:\s*([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)").unwrap()
});

static TEMPLATE_URL_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btemplateUrl\s*:\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});
static TEMPLATE_URL_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\btemplateUrl\s*:\s*function\s*\([^)]*\)\s*\{\s*return\s+(?:'([^'\n]+)'|"([^"\n]+)")"#,
    )
    .unwrap()
});

static TEMPLATE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btemplate\s*:\s*(?:'((?:\\.|[^'\\])*)'|"((?:\\.|[^"\\])*)"|`((?:\\.|[^`\\])*)`)"#)
        .unwrap()
});
static TEMPLATE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btemplate\s*:\s*([^,}\n]+)").unwrap());

static ABSTRACT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\babstract\s*[:=]\s*(!?[\w$]+)").unwrap());

static PARENT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bparent\s*:\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap());

static REDIRECT_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bredirectTo\s*:\s*(?:'([^'\n]*)'|"([^"\n]*)")"#).unwrap()
});
static REDIRECT_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bredirectTo\s*:").unwrap());

static VIEWS_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bviews\s*:\s*\{").unwrap());
static VIEW_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:'([^'\n]*)'|"([^"\n]*)"|([A-Za-z_$][\w$]*))\s*:\s*\{"#).unwrap()
});

static RESOLVE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bresolve\s*:\s*\{").unwrap());
static LAZY_LOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$ocLazyLoad\s*\.\s*load\s*\(").unwrap());

/// 動的に決まるリダイレクト先
pub const DYNAMIC_REDIRECT: &str = "<dynamic>";

const NON_CONTROLLER_WORDS: &[&str] = &["function", "true", "false", "null", "undefined"];

fn first_group(caps: &Captures<'_>) -> Option<String> {
    caps.iter().skip(1).flatten().next().map(|m| m.as_str().to_string())
}

/// 最上位のコード中から始まる最初の一致
fn top_level_captures<'a>(pattern: &Regex, config: &'a str) -> Option<Captures<'a>> {
    let mask = top_level_mask(config);
    let mut pos = 0;
    while let Some(caps) = pattern.captures_at(config, pos) {
        let m = caps.get(0)?;
        if mask.get(m.start()).copied().unwrap_or(false) {
            return Some(caps);
        }
        pos = m.start() + m.as_str().chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// `'Name as vm'` の別名部分を落とす
pub fn strip_controller_alias(value: &str) -> String {
    value
        .split(" as ")
        .next()
        .unwrap_or(value)
        .trim()
        .to_string()
}

pub fn decode_url(config: &str) -> Option<String> {
    if let Some(caps) = top_level_captures(&URL_QUOTED, config) {
        return first_group(&caps);
    }
    let value = top_level_captures(&URL_BARE, config)?.get(1)?.as_str();
    (!value.starts_with(RESERVED_SIGIL) && !value.starts_with("function"))
        .then(|| value.to_string())
}

pub fn decode_controller(config: &str) -> Option<String> {
    if let Some(caps) = top_level_captures(&CONTROLLER_QUOTED, config) {
        return first_group(&caps)
            .map(|v| strip_controller_alias(&v))
            .filter(|v| !v.is_empty());
    }
    let value = top_level_captures(&CONTROLLER_BARE, config)?.get(1)?.as_str();
    (!NON_CONTROLLER_WORDS.contains(&value)).then(|| value.to_string())
}

pub fn decode_template_url(config: &str) -> Option<String> {
    top_level_captures(&TEMPLATE_URL_QUOTED, config)
        .or_else(|| top_level_captures(&TEMPLATE_URL_FN, config))
        .and_then(|caps| first_group(&caps))
}

pub fn decode_template(config: &str) -> Option<String> {
    if let Some(caps) = top_level_captures(&TEMPLATE_QUOTED, config) {
        return first_group(&caps).or_else(|| Some(String::new()));
    }
    let value = top_level_captures(&TEMPLATE_BARE, config)?.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `!0` や `1` のような圧縮済みの書き方も評価する。識別子ならファイル内の宣言を探す
pub fn decode_abstract(config: &str, source: &str) -> bool {
    let Some(value) = top_level_captures(&ABSTRACT_VALUE, config)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return false;
    };
    match literal_truthiness(value) {
        Some(truthy) => truthy,
        None => resolve_identifier(value.trim_start_matches('!'), source)
            .map(|v| v != value.starts_with('!'))
            .unwrap_or(!value.starts_with('!')),
    }
}

fn literal_truthiness(value: &str) -> Option<bool> {
    match value {
        "true" | "!0" | "1" => Some(true),
        "false" | "!1" | "0" | "null" | "undefined" => Some(false),
        _ => None,
    }
}

/// `var ident = false` のような宣言から真偽を求める
fn resolve_identifier(ident: &str, source: &str) -> Option<bool> {
    let pattern = format!(
        r"\b(?:var|let|const)\s+{}\s*=\s*([^;,\n]+)",
        regex::escape(ident)
    );
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(source)?.get(1)?.as_str().trim().to_string();
    Some(literal_truthiness(&value).unwrap_or(true))
}

/// 明示的な `parent:` が優先。なければ名前の最後のドットより前
pub fn decode_parent(config: &str, name: &str) -> Option<String> {
    if let Some(caps) = top_level_captures(&PARENT_KEY, config) {
        return first_group(&caps);
    }
    name.rsplit_once('.').map(|(parent, _)| parent.to_string())
}

pub fn decode_redirect(config: &str) -> Option<String> {
    if let Some(caps) = top_level_captures(&REDIRECT_QUOTED, config) {
        return first_group(&caps);
    }
    top_level_captures(&REDIRECT_ANY, config).map(|_| DYNAMIC_REDIRECT.to_string())
}

/// 最上位の `key: {` で始まる入れ子のオブジェクトの中身 (外側の括弧を含む)
fn nested_object(config: &str, key: &Regex) -> Option<Range<usize>> {
    let m = top_level_captures(key, config)?.get(0)?;
    let open = m.end() - 1;
    let close = matching_brace(config, open)?;
    Some(open..close)
}

/// `views: { 'name@parent': { controller, templateUrl } }` を取り出す。
/// controller も templateUrl もない view は捨てる
pub fn decode_views(config: &str) -> BTreeMap<String, ViewConfig> {
    let mut views = BTreeMap::new();
    let Some(range) = nested_object(config, &VIEWS_KEY) else {
        return views;
    };
    // 外側の `{` の次から読む
    let body = &config[range.start + 1..range.end.saturating_sub(1)];
    let mut pos = 0;
    while let Some(caps) = VIEW_ENTRY.captures_at(body, pos) {
        let Some(whole) = caps.get(0) else { break };
        let key = first_group(&caps).unwrap_or_default();
        let open = whole.end() - 1;
        let Some(close) = matching_brace(body, open) else {
            break;
        };
        let entry = &body[open..close];
        let view = ViewConfig {
            controller: decode_controller(entry),
            template_url: decode_template_url(entry),
        };
        if !view.is_empty() {
            views.insert(key, view);
        }
        pos = close;
    }
    views
}

/// resolve ブロックの字句
#[derive(Debug, Default)]
struct ResolveTokens {
    /// 文字列リテラルと識別子 (出現順)
    dependencies: Vec<String>,
    /// `$ocLazyLoad.load(...)` の中の文字列
    lazy_loaded: Vec<String>,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

/// 文字列・識別子・コメントを区別しながら resolve ブロックを走査する
fn scan_resolve(body: &str) -> ResolveTokens {
    let lazy_spans: Vec<Range<usize>> = LAZY_LOAD
        .find_iter(body)
        .filter_map(|m| {
            let open = m.end() - 1;
            matching_delimiter(body, open).map(|close| m.start()..close)
        })
        .collect();
    let in_lazy = |pos: usize| lazy_spans.iter().any(|s| s.contains(&pos));

    let bytes = body.as_bytes();
    let mut tokens = ResolveTokens::default();
    let mut prev_significant: u8 = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = body[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = body[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            b'\'' | b'"' | b'`' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != b {
                    if bytes[j] == b'\\' {
                        j += 1;
                    } else if bytes[j] == b'\n' && b != b'`' {
                        break;
                    }
                    j += 1;
                }
                let value = body.get(start..j.min(bytes.len())).unwrap_or_default();
                if in_lazy(i) {
                    tokens.lazy_loaded.push(value.to_string());
                } else {
                    tokens.dependencies.push(value.to_string());
                }
                i = j + 1;
                prev_significant = b;
                continue;
            }
            _ if is_ident_start(b) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let ident = &body[start..i];
                let member_access = prev_significant == b'.';
                if !member_access
                    && !in_lazy(start)
                    && !ident.starts_with(RESERVED_SIGIL)
                    && !is_keyword(ident)
                {
                    tokens.dependencies.push(ident.to_string());
                }
                prev_significant = b'a';
                continue;
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                prev_significant = b'0';
                continue;
            }
            _ if b.is_ascii_whitespace() => {}
            _ => prev_significant = b,
        }
        i += 1;
    }
    tokens
}

/// 遅延ロード対象として残すか (ファイルらしいものだけ)
fn is_plugin_path(value: &str, filter: &DependencyFilter<'_>) -> bool {
    (filter.has_file_extension(value) || value.contains("/js/") || value.contains("scripts/"))
        && !filter.is_vendor_or_minified(value)
        && !value.starts_with(RESERVED_SIGIL)
}

/// resolve の依存と遅延ロードのプラグインを返す
pub fn decode_resolve(config: &str, filter: &DependencyFilter<'_>) -> (Vec<String>, Vec<String>) {
    let Some(range) = nested_object(config, &RESOLVE_KEY) else {
        return (Vec::new(), Vec::new());
    };
    let body = &config[range.start + 1..range.end.saturating_sub(1)];
    let tokens = scan_resolve(body);

    let plugins: IndexSet<String> = tokens
        .lazy_loaded
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| is_plugin_path(v, filter))
        .collect();
    let dependencies = filter
        .filter(tokens.dependencies)
        .into_iter()
        .filter(|d| !plugins.contains(d))
        .collect();

    (dependencies, plugins.into_iter().collect())
}

/// 採用された候補からルートを組み立てる
pub fn decode_route(
    candidate: &Candidate,
    dialect: DialectKind,
    source: &str,
    source_file: &str,
    filter: &DependencyFilter<'_>,
) -> Route {
    let config = candidate.config.as_str();
    let mut route = Route::new(candidate.name.clone(), dialect);

    route.url = match dialect {
        DialectKind::Hierarchical => decode_url(config),
        DialectKind::Flat => candidate.url.clone(),
    };
    route.controller = decode_controller(config);
    route.template_url = decode_template_url(config);
    route.template = decode_template(config);
    route.is_abstract = decode_abstract(config, source);
    route.parent = match dialect {
        DialectKind::Hierarchical => decode_parent(config, &candidate.name),
        DialectKind::Flat => None,
    };
    route.views = decode_views(config);
    (route.resolve_dependencies, route.plugins) = decode_resolve(config, filter);
    route.redirect = decode_redirect(config);
    route.source_file = source_file.to_string();
    route.line = candidate.line;
    route.offset = candidate.offset;
    route.span = candidate.block.as_ref().map(|b| b.range.clone());
    route
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("{ url: '/home' }", Some("/home"))]
    #[case("{ url: \"^/abs\" }", Some("^/abs"))]
    #[case("{ url: HOME_URL, x: 1 }", Some("HOME_URL"))]
    #[case("{ url: $urlFor('x') }", None)]
    #[case("{ template: '<p/>' }", None)]
    fn test_decode_url(#[case] config: &str, #[case] expected: Option<&str>) {
        assert_eq!(decode_url(config).as_deref(), expected);
    }

    #[rstest]
    #[case("{ controller: 'HomeCtrl' }", Some("HomeCtrl"))]
    #[case("{ controller: 'HomeCtrl as vm' }", Some("HomeCtrl"))]
    #[case("{ controller: HomeCtrl }", Some("HomeCtrl"))]
    #[case("{ controller: app.controllers.Home }", Some("app.controllers.Home"))]
    #[case("{ controller: function ($scope) {} }", None)]
    #[case("{ controllerAs: 'vm' }", None)]
    fn test_decode_controller(#[case] config: &str, #[case] expected: Option<&str>) {
        assert_eq!(decode_controller(config).as_deref(), expected);
    }

    #[test]
    fn test_decode_template_url_forms() {
        assert_eq!(
            decode_template_url("{ templateUrl: 'views/a.html' }").as_deref(),
            Some("views/a.html")
        );
        assert_eq!(
            decode_template_url("{ templateUrl: function ($p) { return 'views/b.html'; } }")
                .as_deref(),
            Some("views/b.html")
        );
        assert_eq!(decode_template_url("{ template: '<p/>' }"), None);
    }

    #[test]
    fn test_decode_template() {
        assert_eq!(
            decode_template(r"{ template: '<div class=\'x\'>hi</div>' }").as_deref(),
            Some(r"<div class=\'x\'>hi</div>")
        );
        assert_eq!(decode_template("{ template: '' }").as_deref(), Some(""));
        assert_eq!(decode_template("{ template: tpl, url: '/' }").as_deref(), Some("tpl"));
        assert_eq!(decode_template("{ templateUrl: 'a.html' }"), None);
    }

    #[rstest]
    #[case("{ abstract: true }", true)]
    #[case("{ abstract: false }", false)]
    #[case("{ abstract: !0 }", true)]
    #[case("{ abstract: 1 }", true)]
    #[case("{ abstract: !1 }", false)]
    #[case("{ url: '/' }", false)]
    #[case("{ abstract: IS_ABSTRACT }", false)]
    #[case("{ abstract: UNKNOWN }", true)]
    fn test_decode_abstract(#[case] config: &str, #[case] expected: bool) {
        let source = "var IS_ABSTRACT = false;\n";
        assert_eq!(decode_abstract(config, source), expected);
    }

    #[test]
    fn test_decode_parent() {
        assert_eq!(decode_parent("{}", "root.users.detail").as_deref(), Some("root.users"));
        assert_eq!(decode_parent("{}", "home"), None);
        assert_eq!(
            decode_parent("{ parent: 'shell' }", "home").as_deref(),
            Some("shell")
        );
    }

    #[test]
    fn test_decode_redirect() {
        assert_eq!(decode_redirect("{ redirectTo: '/' }").as_deref(), Some("/"));
        assert_eq!(
            decode_redirect("{ redirectTo: function () { return '/x'; } }").as_deref(),
            Some(DYNAMIC_REDIRECT)
        );
        assert_eq!(decode_redirect("{ url: '/' }"), None);
    }

    #[test]
    fn test_decode_views() {
        let config = r#"{
            url: '/dash',
            views: {
                '': { templateUrl: 'views/dash.html' },
                "sidebar@root": { controller: 'SideCtrl as side', templateUrl: 'views/side.html' },
                header: { controller: HeaderCtrl },
                empty: { resolve: {} }
            }
        }"#;
        let views = decode_views(config);
        assert_eq!(views.len(), 3);
        assert_eq!(views[""].template_url.as_deref(), Some("views/dash.html"));
        assert_eq!(views["sidebar@root"].controller.as_deref(), Some("SideCtrl"));
        assert_eq!(views["header"].controller.as_deref(), Some("HeaderCtrl"));
        assert!(!views.contains_key("empty"));
    }

    #[test]
    fn test_decode_resolve_sources() {
        let config = r#"{
            resolve: {
                user: ['UserService', '$stateParams', function (UserService, $stateParams) {
                    return UserService.get($stateParams.id);
                }],
                deps: ['$ocLazyLoad', function ($ocLazyLoad) {
                    return $ocLazyLoad.load(['scripts/plugins/chart.js', 'styles/chart.css', 'jquery.min.js']);
                }]
            }
        }"#;
        let config_values = AnalyzerConfig::default();
        let filter = DependencyFilter::new(&config_values);
        let (deps, plugins) = decode_resolve(config, &filter);
        assert_eq!(deps, vec!["user", "UserService", "deps"]);
        assert_eq!(plugins, vec!["scripts/plugins/chart.js", "styles/chart.css"]);
    }

    #[test]
    fn test_nested_keys_do_not_shadow_top_level_fields() {
        let config = r#"{
            views: {
                side: { controller: 'SideCtrl', url: '/side', templateUrl: 'views/side.html' }
            },
            resolve: {
                data: function ($http) { return $http({ url: '/api/data', method: 'GET' }); }
            },
            controller: 'DashCtrl',
            url: '/dash'
        }"#;
        assert_eq!(decode_controller(config).as_deref(), Some("DashCtrl"));
        assert_eq!(decode_url(config).as_deref(), Some("/dash"));
        assert_eq!(decode_template_url(config), None);
        assert_eq!(decode_views(config)["side"].controller.as_deref(), Some("SideCtrl"));
    }

    #[rstest]
    #[case("{ resolve: { data: function ($http) { return $http({ url: '/api/data' }); } } }")]
    #[case("{ views: { main: { templateUrl: 'views/main.html', template: '<p/>' } } }")]
    #[case("{ data: { abstract: true, parent: 'shell', redirectTo: '/x' } }")]
    fn test_nested_only_keys_are_not_top_level(#[case] config: &str) {
        assert_eq!(decode_url(config), None);
        assert_eq!(decode_template_url(config), None);
        assert_eq!(decode_template(config), None);
        assert!(!decode_abstract(config, ""));
        assert_eq!(decode_parent(config, "home"), None);
        assert_eq!(decode_redirect(config), None);
    }

    #[test]
    fn test_keys_inside_strings_and_comments_are_ignored() {
        let config = "{ template: '<a controller: x>', // controller: 'Old'\n controller: 'NewCtrl' }";
        assert_eq!(decode_controller(config).as_deref(), Some("NewCtrl"));
    }

    #[test]
    fn test_decode_route_for_flat_dialect() {
        let candidate = Candidate {
            name: "/cart/:id".to_string(),
            offset: 4,
            line: 2,
            config: "{ templateUrl: 'views/cart.html', controller: 'CartCtrl as cart', redirectTo: '/' }"
                .to_string(),
            block: None,
            strategy: "when-entry",
            url: Some("/cart/:id".to_string()),
        };
        let config = AnalyzerConfig::default();
        let route = decode_route(
            &candidate,
            DialectKind::Flat,
            "",
            "app/scripts/app.js",
            &DependencyFilter::new(&config),
        );
        assert_eq!(route.url.as_deref(), Some("/cart/:id"));
        assert_eq!(route.controller.as_deref(), Some("CartCtrl"));
        assert_eq!(route.parent, None);
        assert_eq!(route.redirect.as_deref(), Some("/"));
        assert_eq!(route.line, 2);
    }
}
