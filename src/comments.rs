//! コメント判定。
//!
//! テキストを一度だけ走査して `//` 行コメントと `/* */` ブロックコメントの
//! 範囲を記録し、任意のオフセットがコメント内かどうかを答える。
//! 文字列リテラル内の `//` (URL など) はコメントとして扱わない。

use std::ops::Range;

/// コメントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
}

/// 1 つのコメント範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    pub kind: CommentKind,
    /// バイトオフセットの範囲 (終端を含まない)
    pub range: Range<usize>,
    /// 0 始まりの開始行
    pub start_line: usize,
    /// 0 始まりの終了行
    pub end_line: usize,
    /// 閉じられていないブロックコメント (ファイル末尾まで)
    pub unterminated: bool,
}

/// テキスト全体のコメント範囲の一覧
#[derive(Debug, Clone, Default)]
pub struct CommentMap {
    spans: Vec<CommentSpan>,
}

impl CommentMap {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut spans = Vec::new();
        let mut line = 0usize;
        let mut quote: Option<u8> = None;
        let mut i = 0usize;

        while i < bytes.len() {
            let b = bytes[i];

            if let Some(q) = quote {
                match b {
                    b'\\' => {
                        // エスケープされた改行も行数に数える
                        if bytes.get(i + 1) == Some(&b'\n') {
                            line += 1;
                        }
                        i += 2;
                        continue;
                    }
                    b'\n' => {
                        line += 1;
                        // 閉じられていない ' と " は行末で終わる
                        if q != b'`' {
                            quote = None;
                        }
                    }
                    _ if b == q => quote = None,
                    _ => {}
                }
                i += 1;
                continue;
            }

            match b {
                b'\n' => line += 1,
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    let end = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
                    spans.push(CommentSpan {
                        kind: CommentKind::Line,
                        range: i..end,
                        start_line: line,
                        end_line: line,
                        unterminated: false,
                    });
                    i = end;
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let start_line = line;
                    let (end, unterminated) = match text[i + 2..].find("*/") {
                        Some(n) => (i + 2 + n + 2, false),
                        None => (bytes.len(), true),
                    };
                    line += text[i..end].matches('\n').count();
                    spans.push(CommentSpan {
                        kind: CommentKind::Block,
                        range: i..end,
                        start_line,
                        end_line: line,
                        unterminated,
                    });
                    i = end;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }

        Self { spans }
    }

    /// オフセットがコメント内にあるか
    pub fn is_commented(&self, offset: usize) -> bool {
        self.span_at(offset).is_some()
    }

    /// オフセットを含むコメント範囲
    pub fn span_at(&self, offset: usize) -> Option<&CommentSpan> {
        // spans は開始位置の昇順で重なりがない
        let idx = self.spans.partition_point(|s| s.range.start <= offset);
        let span = self.spans.get(idx.checked_sub(1)?)?;
        span.range.contains(&offset).then_some(span)
    }

    /// ブロックコメントの (開始行, 終了行) 一覧
    pub fn block_line_spans(&self) -> Vec<(usize, usize)> {
        self.spans
            .iter()
            .filter(|s| s.kind == CommentKind::Block)
            .map(|s| (s.start_line, s.end_line))
            .collect()
    }

    pub fn spans(&self) -> &[CommentSpan] {
        &self.spans
    }
}
