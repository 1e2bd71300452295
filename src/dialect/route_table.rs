// src/dialect/route_table.rs
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{line_of, Candidate, CandidateScan, MalformedBlock, RouteDialect, StrategyOutcome};
use crate::block::{extract_config_block, extract_object_argument, matching_delimiter};
use crate::comments::CommentMap;
use crate::config::AnalyzerConfig;
use crate::model::DialectKind;

static CONFIG_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.config\s*\(").unwrap());

static PROVIDER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$routeProvider\b").unwrap());

static WHEN_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.when\s*\(").unwrap());

/// `.when('/path'` / `.when("/path"`
static WHEN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.when\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)")"#).unwrap()
});

static OTHERWISE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.otherwise\s*\(\s*").unwrap());

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:'([^'\n]*)'|"([^"\n]*)")"#).unwrap());

/// フォールバックルートの名前と URL
pub const OTHERWISE_NAME: &str = "otherwise";
pub const OTHERWISE_URL: &str = "*";

const WHEN_ENTRY: &str = "when-entry";
const OTHERWISE_ENTRY: &str = "otherwise-entry";

/// `$routeProvider.when('/path', {...})` 形式の方言
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatDialect;

fn first_group(caps: &regex::Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// `$routeProvider` を使っている登録ブロックの範囲。
///
/// `.config(...)` の呼び出しのうち本体にマーカーを含むもの。見つからなければ
/// コメント外の最初のマーカーからファイル末尾まで。
pub fn registration_regions(text: &str, comments: &CommentMap) -> Vec<Range<usize>> {
    let mut regions: Vec<Range<usize>> = Vec::new();

    for m in CONFIG_CALL.find_iter(text) {
        if comments.is_commented(m.start()) || regions.iter().any(|r| r.contains(&m.start())) {
            continue;
        }
        let open = m.end() - 1;
        let Some(close) = matching_delimiter(text, open) else {
            continue;
        };
        let has_marker = PROVIDER_MARKER
            .find_iter(&text[open..close])
            .any(|p| !comments.is_commented(open + p.start()));
        if has_marker {
            regions.push(open..close);
        }
    }

    if regions.is_empty() {
        if let Some(first) = PROVIDER_MARKER
            .find_iter(text)
            .find(|m| !comments.is_commented(m.start()))
        {
            debug!("no config block wraps $routeProvider, scanning from line {}", line_of(text, first.start()));
            regions.push(first.start()..text.len());
        }
    }
    regions
}

fn when_entries(text: &str, region: &Range<usize>) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for caps in WHEN_PATH.captures_iter(&text[region.clone()]) {
        let Some(whole) = caps.get(0) else { continue };
        let offset = region.start + whole.start();
        let after = region.start + whole.end();
        let path = first_group(&caps);
        outcomes.push(match extract_config_block(text, after) {
            Some(block) => StrategyOutcome::Found(Candidate {
                name: path.clone(),
                offset,
                line: line_of(text, offset),
                config: block.text(text).to_string(),
                block: Some(block),
                strategy: WHEN_ENTRY,
                url: Some(path),
            }),
            None => StrategyOutcome::Malformed(MalformedBlock {
                name: path,
                offset,
                line: line_of(text, offset),
                file: String::new(),
            }),
        });
    }
    outcomes
}

/// `.otherwise({...})` と `.otherwise('/path')` の両方を受け付ける
fn otherwise_entries(text: &str, region: &Range<usize>) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for m in OTHERWISE_CALL.find_iter(&text[region.clone()]) {
        let offset = region.start + m.start();
        let arg = region.start + m.end();
        let line = line_of(text, offset);
        let candidate = |config: String, block| Candidate {
            name: OTHERWISE_NAME.to_string(),
            offset,
            line,
            config,
            block,
            strategy: OTHERWISE_ENTRY,
            url: Some(OTHERWISE_URL.to_string()),
        };

        if text.as_bytes().get(arg) == Some(&b'{') {
            outcomes.push(match extract_object_argument(text, arg) {
                Some(block) => StrategyOutcome::Found(candidate(
                    block.text(text).to_string(),
                    Some(block),
                )),
                None => StrategyOutcome::Malformed(MalformedBlock {
                    name: OTHERWISE_NAME.to_string(),
                    offset,
                    line,
                    file: String::new(),
                }),
            });
        } else if let Some(caps) = QUOTED.captures(&text[arg..]) {
            // 文字列だけ渡す形式はリダイレクト先の指定
            let target = first_group(&caps);
            let config = format!("{{ redirectTo: '{target}' }}");
            outcomes.push(StrategyOutcome::Found(candidate(config, None)));
        }
    }
    outcomes
}

impl RouteDialect for FlatDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Flat
    }

    fn find_candidates(
        &self,
        text: &str,
        comments: &CommentMap,
        _config: &AnalyzerConfig,
    ) -> CandidateScan {
        let mut scan = CandidateScan::empty(DialectKind::Flat);
        let regions = registration_regions(text, comments);

        for region in &regions {
            let body = &text[region.clone()];
            for m in WHEN_CALL
                .find_iter(body)
                .chain(OTHERWISE_CALL.find_iter(body))
            {
                scan.raw += 1;
                if comments.is_commented(region.start + m.start()) {
                    scan.commented += 1;
                }
            }
            scan.absorb(WHEN_ENTRY, when_entries(text, region));
            scan.absorb(OTHERWISE_ENTRY, otherwise_entries(text, region));
        }

        scan
    }

    fn declared_names(&self, text: &str, comments: &CommentMap) -> Vec<String> {
        let mut names = Vec::new();
        for region in registration_regions(text, comments) {
            let body = &text[region.clone()];
            for caps in WHEN_PATH.captures_iter(body) {
                if caps
                    .get(0)
                    .is_some_and(|m| !comments.is_commented(region.start + m.start()))
                {
                    names.push(first_group(&caps));
                }
            }
            if OTHERWISE_CALL
                .find_iter(body)
                .any(|m| !comments.is_commented(region.start + m.start()))
            {
                names.push(OTHERWISE_NAME.to_string());
            }
        }
        names
    }
}
