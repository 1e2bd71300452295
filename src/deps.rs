//! 依存トークンのフィルタ。
//!
//! 抽出した文字列・識別子から、実ファイルの依存かモジュール名だけを残し、
//! vendor / minified ファイルとフレームワーク組み込み (`$http` など) を落とす。

use indexmap::IndexSet;

use crate::config::AnalyzerConfig;

/// フレームワーク組み込みサービスの接頭辞
pub const RESERVED_SIGIL: char = '$';

/// 依存名として扱わない言語キーワード
pub const KEYWORDS: &[&str] = &[
    "true", "false", "null", "undefined", "function", "return", "const", "let", "var", "this",
    "new", "typeof", "if", "else", "for", "while", "switch", "case", "break", "default", "try",
    "catch", "finally", "throw", "delete", "void", "in", "of", "instanceof", "async", "await",
];

/// 長いファイル名 + 数字は minified とみなす
const LONG_FILENAME: usize = 50;

pub fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(&token.to_ascii_lowercase().as_str())
}

#[derive(Debug, Clone, Copy)]
pub struct DependencyFilter<'a> {
    config: &'a AnalyzerConfig,
}

impl<'a> DependencyFilter<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self { config }
    }

    /// vendor または minified のファイル・パスか。許可リストのライブラリは除く
    pub fn is_vendor_or_minified(&self, path: &str) -> bool {
        let lower = path.to_lowercase();

        if self
            .config
            .allowed_vendor_libs
            .iter()
            .any(|lib| lower.contains(&lib.to_lowercase()))
        {
            return false;
        }

        if self
            .config
            .vendor_indicators
            .iter()
            .chain(self.config.minified_indicators.iter())
            .any(|indicator| lower.contains(&indicator.to_lowercase()))
        {
            return true;
        }

        let filename = lower.rsplit('/').next().unwrap_or(&lower);
        filename.len() > LONG_FILENAME && filename.chars().any(|c| c.is_ascii_digit())
    }

    pub fn has_file_extension(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.config
            .file_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    /// 拡張子のないモジュール・サービス名として認められるか
    fn is_bare_name(&self, token: &str) -> bool {
        let last = token.rsplit('/').next().unwrap_or(token);
        !last.contains('.')
            && token.chars().count() > self.config.min_bare_name_len
            && !token.chars().any(char::is_whitespace)
            && !is_keyword(token)
    }

    /// 1 トークンを残すか
    pub fn keep(&self, token: &str) -> bool {
        if token.is_empty() || token.starts_with(RESERVED_SIGIL) {
            return false;
        }
        if self.is_vendor_or_minified(token) {
            return false;
        }
        self.has_file_extension(token) || self.is_bare_name(token)
    }

    /// フィルタして初出順を保ったまま重複を除く
    pub fn filter<I, S>(&self, tokens: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| self.keep(t))
            .collect::<IndexSet<String>>()
            .into_iter()
            .collect()
    }
}
