//! 検証パス。
//!
//! 各ルートの宣言をソースから探し直し、最上位のテキストに `controller` /
//! `template` / `templateUrl` / `abstract` のキーが無ければ値を取り消す。
//! 宣言が見つからないルートは数えるだけで値には触れない。

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::block::{
    extract_config_block, extract_object_argument, returned_object, top_level_text,
};
use crate::comments::CommentMap;
use crate::dialect::route_table::OTHERWISE_NAME;
use crate::model::{DialectKind, Route};

static TOP_CONTROLLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcontroller\s*:").unwrap());
static TOP_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\btemplate\s*:").unwrap());
static TOP_TEMPLATE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btemplateUrl\s*:").unwrap());
static TOP_ABSTRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\babstract\s*[:=]").unwrap());
static STATE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.state\s*\(\s*\{").unwrap());
static OTHERWISE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.otherwise\s*\(\s*\{").unwrap());

/// 取り消したフィールド
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub route: String,
    pub field: &'static str,
    pub before: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub routes_verified: usize,
    pub controller_fixes: usize,
    pub template_fixes: usize,
    pub template_url_fixes: usize,
    pub abstract_fixes: usize,
    /// 宣言をソースから見つけ直せなかったルート
    pub not_found: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    pub stats: VerificationStats,
    pub corrections: Vec<Correction>,
}

/// ルートの宣言の設定ブロック (インライン関数なら返り値) を探し直す。
///
/// 抽出時に記録した範囲があればそれを使い、なければ名前で探す。
/// コメント内の出現は飛ばす
pub fn locate_declaration(text: &str, comments: &CommentMap, route: &Route) -> Option<String> {
    if let Some(block) = route.span.clone().and_then(|span| text.get(span)) {
        return Some(block.to_string());
    }

    // 名前の前後の空白は抽出時に落としているので、ここでも許す
    let quoted = format!(r"\s*{}\s*", regex::escape(&route.name));
    let keyword = match route.dialect {
        DialectKind::Hierarchical => "state",
        DialectKind::Flat => "when",
    };

    if route.dialect == DialectKind::Flat && route.name == OTHERWISE_NAME {
        return OTHERWISE_OBJECT
            .find_iter(text)
            .filter(|m| !comments.is_commented(m.start()))
            .find_map(|m| extract_object_argument(text, m.end() - 1))
            .map(|block| block.text(text).to_string());
    }

    let pattern = format!(r#"\.{keyword}\s*\(\s*(?:'{quoted}'|"{quoted}"|`{quoted}`)"#);
    let declaration = Regex::new(&pattern).ok()?;
    for m in declaration.find_iter(text) {
        if comments.is_commented(m.start()) {
            continue;
        }
        if let Some(block) = extract_config_block(text, m.end()) {
            return Some(returned_object(text, &block).text(text).to_string());
        }
    }

    if route.dialect == DialectKind::Hierarchical {
        let name_key = Regex::new(&format!(r#"\bname\s*:\s*(?:'{quoted}'|"{quoted}")"#)).ok()?;
        for m in STATE_OBJECT.find_iter(text) {
            if comments.is_commented(m.start()) {
                continue;
            }
            if let Some(block) = extract_object_argument(text, m.end() - 1) {
                let body = block.text(text);
                if name_key.is_match(&top_level_text(body)) {
                    return Some(body.to_string());
                }
            }
        }
    }
    None
}

fn clear_field(
    route_name: &str,
    field: &'static str,
    slot: &mut Option<String>,
    corrections: &mut Vec<Correction>,
) -> bool {
    let Some(before) = slot.take() else {
        return false;
    };
    info!("route '{}': {} '{}' -> null", route_name, field, before);
    corrections.push(Correction {
        route: route_name.to_string(),
        field,
        before,
    });
    true
}

/// 全ルートを検証する。`sources` はルートの `source_file` → ファイル内容
pub fn verify_routes(routes: &mut [Route], sources: &HashMap<String, String>) -> VerificationOutcome {
    let mut outcome = VerificationOutcome::default();
    let mut comment_maps: HashMap<String, CommentMap> = HashMap::new();

    for route in routes.iter_mut() {
        let Some(text) = sources.get(&route.source_file) else {
            warn!("no source for {}, skipping verification of '{}'", route.source_file, route.name);
            continue;
        };
        let comments = comment_maps
            .entry(route.source_file.clone())
            .or_insert_with(|| CommentMap::new(text));
        let name = route.name.clone();

        match locate_declaration(text, comments, route) {
            Some(block) => {
                let top = top_level_text(&block);
                if !TOP_CONTROLLER.is_match(&top)
                    && clear_field(&name, "controller", &mut route.controller, &mut outcome.corrections)
                {
                    outcome.stats.controller_fixes += 1;
                }
                if !TOP_TEMPLATE.is_match(&top)
                    && clear_field(&name, "template", &mut route.template, &mut outcome.corrections)
                {
                    outcome.stats.template_fixes += 1;
                }
                if !TOP_TEMPLATE_URL.is_match(&top)
                    && clear_field(
                        &name,
                        "templateUrl",
                        &mut route.template_url,
                        &mut outcome.corrections,
                    )
                {
                    outcome.stats.template_url_fixes += 1;
                }
                if route.is_abstract && !TOP_ABSTRACT.is_match(&top) {
                    info!("route '{}': abstract 'true' -> false", name);
                    route.is_abstract = false;
                    outcome.corrections.push(Correction {
                        route: name.clone(),
                        field: "abstract",
                        before: "true".to_string(),
                    });
                    outcome.stats.abstract_fixes += 1;
                }
            }
            None => {
                warn!("declaration of '{}' not found during verification, fields kept", name);
                outcome.stats.not_found += 1;
            }
        }
        outcome.stats.routes_verified += 1;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FILE: &str = "app/scripts/app.js";

    fn route(name: &str, controller: Option<&str>, template: Option<&str>) -> Route {
        let mut route = Route::new(name, DialectKind::Hierarchical);
        route.controller = controller.map(str::to_string);
        route.template = template.map(str::to_string);
        route.source_file = FILE.to_string();
        route
    }

    fn sources(text: &str) -> HashMap<String, String> {
        HashMap::from([(FILE.to_string(), text.to_string())])
    }

    #[test]
    fn test_controller_only_in_views_is_cleared() {
        let text = r#"
$stateProvider.state('dash', {
    url: '/dash',
    views: {
        main: { controller: 'DashCtrl', templateUrl: 'views/dash.html' }
    }
});
"#;
        let mut routes = vec![route("dash", Some("DashCtrl"), None)];
        let outcome = verify_routes(&mut routes, &sources(text));
        assert_eq!(routes[0].controller, None);
        assert_eq!(outcome.stats.controller_fixes, 1);
        assert_eq!(
            outcome.corrections,
            vec![Correction {
                route: "dash".to_string(),
                field: "controller",
                before: "DashCtrl".to_string(),
            }]
        );
    }

    #[test]
    fn test_top_level_fields_are_kept() {
        let text = "$stateProvider.state('home', { controller : 'HomeCtrl', template: '<p/>' });";
        let mut routes = vec![route("home", Some("HomeCtrl"), Some("<p/>"))];
        let outcome = verify_routes(&mut routes, &sources(text));
        assert_eq!(routes[0].controller.as_deref(), Some("HomeCtrl"));
        assert_eq!(routes[0].template.as_deref(), Some("<p/>"));
        assert_eq!(outcome.stats.routes_verified, 1);
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_commented_copy_is_skipped() {
        let text = "// .state('a', { controller: 'Old' })\n.state('a', { url: '/a', views: { x: { controller: 'New' } } })";
        let mut routes = vec![route("a", Some("New"), None)];
        verify_routes(&mut routes, &sources(text));
        assert_eq!(routes[0].controller, None);
    }

    #[test]
    fn test_object_form_is_located() {
        let text = "$stateProvider.state({ name: 'obj', url: '/obj', controller: 'ObjCtrl' });";
        let comments = CommentMap::new(text);
        let found = locate_declaration(text, &comments, &route("obj", None, None)).unwrap();
        assert!(found.contains("ObjCtrl"));
    }

    #[test]
    fn test_unlocatable_route_is_left_alone() {
        let mut routes = vec![route("ghost", Some("GhostCtrl"), Some("<p/>"))];
        let outcome = verify_routes(&mut routes, &sources("nothing here"));
        assert_eq!(outcome.stats.not_found, 1);
        assert_eq!(routes[0].controller.as_deref(), Some("GhostCtrl"));
        assert_eq!(routes[0].template.as_deref(), Some("<p/>"));
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_recorded_span_is_used() {
        // 抽出範囲の外に同名の別宣言があっても範囲の方を検証する
        let text = "$stateProvider.state('b', { url: '/b', controller: 'BCtrl' }, extra);
.state('b', { url: '/x' });";
        let mut b = route("b", Some("BCtrl"), None);
        let open = text.find('{').unwrap();
        let close = text.find('}').unwrap() + 1;
        b.span = Some(open..close);
        let mut routes = vec![b];
        let outcome = verify_routes(&mut routes, &sources(text));
        assert_eq!(routes[0].controller.as_deref(), Some("BCtrl"));
        assert_eq!(outcome.stats.not_found, 0);
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_padded_name_is_located() {
        let text = "$stateProvider.state(' home ', { controller: 'HomeCtrl' });";
        let comments = CommentMap::new(text);
        let found = locate_declaration(text, &comments, &route("home", None, None));
        assert_eq!(found.as_deref(), Some("{ controller: 'HomeCtrl' }"));
    }

    #[test]
    fn test_nested_template_url_and_abstract_are_cleared() {
        let text = r#"
$stateProvider.state('shell', {
    url: '/shell',
    views: {
        main: { templateUrl: 'views/shell.html' }
    },
    data: { abstract: true }
});
"#;
        let mut shell = route("shell", None, None);
        shell.template_url = Some("views/shell.html".to_string());
        shell.is_abstract = true;
        let mut routes = vec![shell];
        let outcome = verify_routes(&mut routes, &sources(text));

        assert_eq!(routes[0].template_url, None);
        assert!(!routes[0].is_abstract);
        assert_eq!(outcome.stats.template_url_fixes, 1);
        assert_eq!(outcome.stats.abstract_fixes, 1);
        assert_eq!(
            outcome
                .corrections
                .iter()
                .map(|c| c.field)
                .collect::<Vec<_>>(),
            vec!["templateUrl", "abstract"]
        );
    }

    #[test]
    fn test_top_level_template_url_and_abstract_are_kept() {
        let text = "$stateProvider.state('root', { abstract: true, templateUrl: 'views/root.html' });";
        let mut root = route("root", None, None);
        root.template_url = Some("views/root.html".to_string());
        root.is_abstract = true;
        let mut routes = vec![root];
        let outcome = verify_routes(&mut routes, &sources(text));
        assert_eq!(routes[0].template_url.as_deref(), Some("views/root.html"));
        assert!(routes[0].is_abstract);
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn test_flat_routes_are_located_by_path() {
        let text = "$routeProvider.when('/a/:id', { templateUrl: 'a.html', controller: 'ACtrl' }).otherwise({ redirectTo: '/' });";
        let comments = CommentMap::new(text);
        let mut when = Route::new("/a/:id", DialectKind::Flat);
        when.source_file = FILE.to_string();
        assert!(locate_declaration(text, &comments, &when).is_some());
        let otherwise = Route::new("otherwise", DialectKind::Flat);
        assert_eq!(
            locate_declaration(text, &comments, &otherwise).as_deref(),
            Some("{ redirectTo: '/' }")
        );
    }
}
