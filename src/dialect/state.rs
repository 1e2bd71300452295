// src/dialect/state.rs
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::{
    count_occurrences, line_of, Candidate, CandidateScan, MalformedBlock, RouteDialect,
    StrategyOutcome,
};
use crate::block::{
    extract_config_block, extract_object_argument, returned_object, top_level_text, BraceTracker,
    ConfigBlock,
};
use crate::comments::CommentMap;
use crate::config::AnalyzerConfig;
use crate::model::DialectKind;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.state\s*\(").unwrap());

/// `.state('name'` / `.state("name"`
static QUOTED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.state\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});

/// `.state({ name: 'x', ... })`
static OBJECT_FORM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.state\s*\(\s*\{").unwrap());

static NAME_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bname\s*:\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).unwrap()
});

/// フォールバック用。テンプレートリテラルの名前も受け付ける
static LOOSE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.state\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)"|`([^`\n]*)`)"#).unwrap()
});

const LITERAL_CONFIG: &str = "literal-config";
const OBJECT_ARGUMENT: &str = "object-argument";
const INLINE_FUNCTION: &str = "inline-function";
const LINE_FALLBACK: &str = "line-fallback";

/// `$stateProvider.state('a.b', {...})` 形式の方言
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalDialect;

fn captured_name(caps: &regex::Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// 第 2 引数がインライン関数か
fn second_argument_is_function(text: &str, after_name: usize) -> bool {
    text[after_name..]
        .trim_start()
        .strip_prefix(',')
        .is_some_and(|rest| rest.trim_start().starts_with("function"))
}

fn found(
    text: &str,
    name: String,
    offset: usize,
    block: ConfigBlock,
    strategy: &'static str,
) -> StrategyOutcome {
    StrategyOutcome::Found(Candidate {
        name,
        offset,
        line: line_of(text, offset),
        config: block.text(text).to_string(),
        block: Some(block),
        strategy,
        url: None,
    })
}

fn malformed(text: &str, name: String, offset: usize) -> StrategyOutcome {
    StrategyOutcome::Malformed(MalformedBlock {
        name,
        offset,
        line: line_of(text, offset),
        file: String::new(),
    })
}

/// 1) 引用符付きの名前 + オブジェクトリテラル
fn literal_config(text: &str) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for caps in QUOTED_NAME.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if second_argument_is_function(text, whole.end()) {
            continue;
        }
        let name = captured_name(&caps);
        outcomes.push(match extract_config_block(text, whole.end()) {
            Some(block) => found(text, name, whole.start(), block, LITERAL_CONFIG),
            None => malformed(text, name, whole.start()),
        });
    }
    outcomes
}

/// 2) オブジェクト 1 つを渡す形式。名前は最上位の `name:` から取る
fn object_argument(text: &str) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for m in OBJECT_FORM.find_iter(text) {
        let open = m.end() - 1;
        match extract_object_argument(text, open) {
            Some(block) => {
                let top = top_level_text(block.text(text));
                let Some(caps) = NAME_KEY.captures(&top) else {
                    debug!("object-form state at line {} has no name", line_of(text, m.start()));
                    continue;
                };
                let name = captured_name(&caps);
                outcomes.push(found(text, name, m.start(), block, OBJECT_ARGUMENT));
            }
            None => {
                let window_end = (open + 400).min(text.len());
                let window = text.get(open..window_end).unwrap_or_default();
                let name = NAME_KEY
                    .captures(window)
                    .map(|caps| captured_name(&caps))
                    .unwrap_or_else(|| "<anonymous>".to_string());
                outcomes.push(malformed(text, name, m.start()));
            }
        }
    }
    outcomes
}

/// 3) `function () { return {...}; }` を渡す形式
fn inline_function(text: &str) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for caps in QUOTED_NAME.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if !second_argument_is_function(text, whole.end()) {
            continue;
        }
        let name = captured_name(&caps);
        outcomes.push(match extract_config_block(text, whole.end()) {
            Some(block) => {
                let config = returned_object(text, &block);
                found(text, name, whole.start(), config, INLINE_FUNCTION)
            }
            None => malformed(text, name, whole.start()),
        });
    }
    outcomes
}

/// 名前の直後から行単位で深さを数えて設定ブロックを探す。
///
/// 最初の `{` より前に呼び出しが閉じたら設定なし。閉じ括弧 `}` の行に
/// `)` がなければ壊れたブロックとみなす。
fn scan_lines_for_block(text: &str, after_name: usize) -> Option<Range<usize>> {
    let mut tracker = BraceTracker::new();
    let mut open: Option<usize> = None;
    let mut parens = 0i64;
    let mut pos = after_name;

    for line in text[after_name..].split_inclusive('\n') {
        for (i, c) in line.char_indices() {
            let before = tracker.depth();
            let was_code = tracker.in_code();
            tracker.feed(c);
            if !was_code || !tracker.in_code() {
                continue;
            }
            match c {
                '{' if before == 0 && open.is_none() => open = Some(pos + i),
                '}' if tracker.depth() == 0 => {
                    let start = open?;
                    return line[i..].contains(')').then_some(start..pos + i + 1);
                }
                '(' if open.is_none() => parens += 1,
                ')' if open.is_none() => {
                    parens -= 1;
                    if parens < 0 {
                        return None;
                    }
                }
                _ => {}
            }
            if tracker.depth() < 0 {
                return None;
            }
        }
        pos += line.len();
    }
    None
}

/// 4) 行単位のフォールバック。前の戦略で取れなかった宣言だけを扱う
fn line_fallback(
    text: &str,
    comments: &CommentMap,
    scan: &CandidateScan,
) -> Vec<StrategyOutcome> {
    let mut outcomes = Vec::new();
    for caps in LOOSE_NAME.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let offset = whole.start();
        if scan.is_claimed(offset) || comments.is_commented(offset) {
            continue;
        }
        let name = captured_name(&caps);
        if name.is_empty() {
            continue;
        }
        outcomes.push(match scan_lines_for_block(text, whole.end()) {
            Some(range) => {
                let block = ConfigBlock {
                    call_end: range.end,
                    range,
                };
                let config = returned_object(text, &block);
                found(text, name, offset, config, LINE_FALLBACK)
            }
            None => malformed(text, name, offset),
        });
    }
    outcomes
}

impl RouteDialect for HierarchicalDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Hierarchical
    }

    fn find_candidates(
        &self,
        text: &str,
        comments: &CommentMap,
        config: &AnalyzerConfig,
    ) -> CandidateScan {
        let mut scan = CandidateScan::empty(DialectKind::Hierarchical);
        let (raw, commented) = count_occurrences(&DECLARATION, text, comments);
        scan.raw = raw;
        scan.commented = commented;
        if raw == 0 {
            return scan;
        }

        scan.absorb(LITERAL_CONFIG, literal_config(text));
        scan.absorb(OBJECT_ARGUMENT, object_argument(text));
        scan.absorb(INLINE_FUNCTION, inline_function(text));

        // 取りこぼしが多いときだけ行単位で拾い直す
        let expected = raw.saturating_sub(commented) as f64;
        let claimed = scan.claimed_in_code(comments) as f64;
        if claimed < config.fallback_yield_ratio * expected {
            info!(
                "pattern strategies matched {} of {} state declarations, using line fallback",
                claimed, expected
            );
            let outcomes = line_fallback(text, comments, &scan);
            scan.absorb(LINE_FALLBACK, outcomes);
            scan.used_fallback = true;
        }

        scan
    }

    fn declared_names(&self, text: &str, comments: &CommentMap) -> Vec<String> {
        LOOSE_NAME
            .captures_iter(text)
            .filter(|caps| {
                caps.get(0)
                    .is_some_and(|m| !comments.is_commented(m.start()))
            })
            .map(|caps| captured_name(&caps))
            .filter(|name| !name.is_empty())
            .collect()
    }
}
