//! ルート宣言の方言ごとの候補抽出。
//!
//! 方言は「宣言の候補をソース順に見つける」ことだけを受け持ち、
//! コメント・短すぎるブロック・重複・除外リストの判定は [`screen_candidates`]
//! で両方言共通に行う。

pub mod route_table;
pub mod state;

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::block::ConfigBlock;
use crate::comments::CommentMap;
use crate::config::AnalyzerConfig;
use crate::model::{DeclarationStats, DialectKind};

pub use route_table::FlatDialect;
pub use state::HierarchicalDialect;

/// 抽出戦略の結果
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    /// 宣言と設定ブロックが取れた
    Found(Candidate),
    /// 宣言は見つかったが設定ブロックが閉じていない
    Malformed(MalformedBlock),
}

/// 設定ブロックまで切り出せた宣言の候補
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    /// 宣言キーワード (`.state` / `.when` など) の位置
    pub offset: usize,
    /// 1 始まりの行番号
    pub line: usize,
    /// 設定ブロックのテキスト
    pub config: String,
    pub block: Option<ConfigBlock>,
    /// どの戦略で見つかったか
    pub strategy: &'static str,
    /// flat 方言のパス
    pub url: Option<String>,
}

/// 閉じていない設定ブロック (ファイル内の位置で一意)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedBlock {
    pub name: String,
    pub offset: usize,
    pub line: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
}

/// 1 ファイル分の候補抽出の結果
#[derive(Debug, Clone)]
pub struct CandidateScan {
    pub dialect: DialectKind,
    /// 宣言キーワードの出現数 (コメント内も含む)
    pub raw: usize,
    pub commented: usize,
    /// オフセット昇順、同じオフセットは一度だけ
    pub candidates: Vec<Candidate>,
    pub malformed: Vec<MalformedBlock>,
    /// 戦略ごとの採用数
    pub strategy_yields: Vec<(&'static str, usize)>,
    pub used_fallback: bool,
}

impl CandidateScan {
    pub fn empty(dialect: DialectKind) -> Self {
        Self {
            dialect,
            raw: 0,
            commented: 0,
            candidates: Vec::new(),
            malformed: Vec::new(),
            strategy_yields: Vec::new(),
            used_fallback: false,
        }
    }

    /// 戦略の結果を取り込む。すでに取られたオフセットは後の戦略では無視する
    pub(crate) fn absorb(&mut self, strategy: &'static str, outcomes: Vec<StrategyOutcome>) {
        let mut taken = 0;
        for outcome in outcomes {
            match outcome {
                StrategyOutcome::Found(candidate) => {
                    if self.is_claimed(candidate.offset) {
                        continue;
                    }
                    // 同じ位置の壊れたブロック報告は、別の戦略で取れたら取り消す
                    self.malformed.retain(|m| m.offset != candidate.offset);
                    self.candidates.push(candidate);
                    taken += 1;
                }
                StrategyOutcome::Malformed(block) => {
                    if self.is_claimed(block.offset)
                        || self.malformed.iter().any(|m| m.offset == block.offset)
                    {
                        continue;
                    }
                    self.malformed.push(block);
                }
            }
        }
        self.candidates.sort_by_key(|c| c.offset);
        self.malformed.sort_by_key(|m| m.offset);
        self.strategy_yields.push((strategy, taken));
    }

    pub fn is_claimed(&self, offset: usize) -> bool {
        self.candidates.iter().any(|c| c.offset == offset)
    }

    /// コメント外で取れた宣言の数
    pub fn claimed_in_code(&self, comments: &CommentMap) -> usize {
        self.candidates
            .iter()
            .filter(|c| !comments.is_commented(c.offset))
            .count()
    }
}

/// ルート宣言の方言
pub trait RouteDialect {
    fn kind(&self) -> DialectKind;

    /// ソース中の宣言候補をすべて見つける (コメント内の候補も含む)
    fn find_candidates(
        &self,
        text: &str,
        comments: &CommentMap,
        config: &AnalyzerConfig,
    ) -> CandidateScan;

    /// 安価な名前だけのスキャン。未処理の宣言の報告に使う
    fn declared_names(&self, text: &str, comments: &CommentMap) -> Vec<String>;
}

/// ふるい分けの結果
#[derive(Debug, Clone, Default)]
pub struct ScreenedCandidates {
    pub accepted: Vec<Candidate>,
    pub stats: DeclarationStats,
    pub excluded: Vec<String>,
    pub invalid: Vec<String>,
    pub duplicates: Vec<String>,
}

/// 方言共通のふるい分け。
///
/// 候補ごとに (a) コメント内 (b) 短すぎる設定ブロック (c) 同名の重複
/// (d) 除外リスト の順に判定し、残ったものを採用する。
pub fn screen_candidates(
    scan: &CandidateScan,
    comments: &CommentMap,
    config: &AnalyzerConfig,
) -> ScreenedCandidates {
    let mut out = ScreenedCandidates {
        stats: DeclarationStats {
            raw: scan.raw,
            commented: scan.commented,
            malformed: scan.malformed.len(),
            ..DeclarationStats::default()
        },
        ..ScreenedCandidates::default()
    };
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for candidate in &scan.candidates {
        if comments.is_commented(candidate.offset) {
            debug!("skipping commented declaration '{}'", candidate.name);
            continue;
        }

        if candidate.config.trim().len() < config.min_config_len {
            warn!(
                "declaration '{}' at line {} has an invalid config block",
                candidate.name, candidate.line
            );
            out.stats.invalid += 1;
            out.invalid.push(candidate.name.clone());
            continue;
        }

        if let Some(&first) = seen.get(candidate.name.as_str()) {
            if first != candidate.offset {
                debug!(
                    "duplicate declaration '{}' at line {}",
                    candidate.name, candidate.line
                );
                out.stats.duplicate += 1;
                out.duplicates.push(candidate.name.clone());
            }
            continue;
        }
        seen.insert(candidate.name.as_str(), candidate.offset);

        if config.is_excluded_route(&candidate.name) {
            debug!("excluding technical route '{}'", candidate.name);
            out.stats.excluded += 1;
            out.excluded.push(candidate.name.clone());
            continue;
        }

        out.accepted.push(candidate.clone());
    }

    out.stats.processed = out.accepted.len();
    out
}

/// バイトオフセットを 1 始まりの行番号に変換する
pub fn line_of(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset.min(text.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// 正規表現の出現をコメント内外に分けて数える
pub(crate) fn count_occurrences(
    pattern: &Regex,
    text: &str,
    comments: &CommentMap,
) -> (usize, usize) {
    let mut raw = 0;
    let mut commented = 0;
    for m in pattern.find_iter(text) {
        raw += 1;
        if comments.is_commented(m.start()) {
            commented += 1;
        }
    }
    (raw, commented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(name: &str, offset: usize, config: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            offset,
            line: 1,
            config: config.to_string(),
            block: None,
            strategy: "test",
            url: None,
        }
    }

    #[test]
    fn test_absorb_claims_each_offset_once() {
        let mut scan = CandidateScan::empty(DialectKind::Hierarchical);
        scan.absorb(
            "first",
            vec![StrategyOutcome::Found(candidate("a", 10, "{ url: '/a' }"))],
        );
        scan.absorb(
            "second",
            vec![
                StrategyOutcome::Found(candidate("a", 10, "{ url: '/other' }")),
                StrategyOutcome::Found(candidate("b", 5, "{ url: '/b' }")),
            ],
        );
        let names: Vec<_> = scan.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(scan.candidates[1].config, "{ url: '/a' }");
        assert_eq!(scan.strategy_yields, vec![("first", 1), ("second", 1)]);
    }

    #[test]
    fn test_absorb_replaces_malformed_with_later_success() {
        let mut scan = CandidateScan::empty(DialectKind::Hierarchical);
        scan.absorb(
            "strict",
            vec![StrategyOutcome::Malformed(MalformedBlock {
                name: "x".to_string(),
                offset: 3,
                line: 1,
                file: String::new(),
            })],
        );
        assert_eq!(scan.malformed.len(), 1);
        scan.absorb(
            "loose",
            vec![StrategyOutcome::Found(candidate("x", 3, "{ url: '/x' }"))],
        );
        assert!(scan.malformed.is_empty());
        assert_eq!(scan.candidates.len(), 1);
    }

    #[test]
    fn test_screen_order() {
        let text = "0123456789012345678901234567890123456789";
        let comments = CommentMap::new(text);
        let config = AnalyzerConfig::default();
        let mut scan = CandidateScan::empty(DialectKind::Hierarchical);
        scan.candidates = vec![
            candidate("home", 0, "{ url: '/' }"),
            candidate("short", 5, "{ }"),
            candidate("home", 10, "{ url: '/again' }"),
            candidate("root.login", 15, "{ url: '/login' }"),
            candidate("about", 20, "{ url: '/about' }"),
        ];
        scan.raw = 5;

        let screened = screen_candidates(&scan, &comments, &config);
        let names: Vec<_> = screened.accepted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["home", "about"]);
        assert_eq!(screened.stats.invalid, 1);
        assert_eq!(screened.stats.duplicate, 1);
        assert_eq!(screened.stats.excluded, 1);
        assert_eq!(screened.stats.processed, 2);
        assert_eq!(screened.excluded, vec!["root.login"]);
    }

    #[test]
    fn test_line_of() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 4), 3);
    }
}
