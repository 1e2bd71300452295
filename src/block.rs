//! 波括弧の対応を数えて設定ブロックを切り出す小さな状態機械。
//!
//! 正規表現では入れ子の `{ }` を扱えないため、ここだけは文字単位で
//! 深さカウンタと引用符の状態を追いかける。

use std::ops::Range;

/// 深さカウンタ + 引用符状態
#[derive(Debug, Clone, Default)]
pub struct BraceTracker {
    depth: i64,
    quote: Option<char>,
    escaped: bool,
    /// 直前の文字が `/` だったか (コメント開始の検出用)
    slash: bool,
    in_line_comment: bool,
    in_block_comment: bool,
    /// ブロックコメント内で直前が `*` だったか
    star: bool,
}

impl BraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// 文字列やコメントの外にいるか
    pub fn in_code(&self) -> bool {
        self.quote.is_none() && !self.in_line_comment && !self.in_block_comment
    }

    /// 1 文字進める。コード中の `{` / `}` のときだけ深さが変わる
    pub fn feed(&mut self, c: char) {
        if self.in_line_comment {
            if c == '\n' {
                self.in_line_comment = false;
            }
            return;
        }
        if self.in_block_comment {
            if self.star && c == '/' {
                self.in_block_comment = false;
            }
            self.star = c == '*';
            return;
        }
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == q || (c == '\n' && q != '`') {
                self.quote = None;
            }
            return;
        }

        if self.slash {
            self.slash = false;
            match c {
                '/' => {
                    self.in_line_comment = true;
                    return;
                }
                '*' => {
                    self.in_block_comment = true;
                    self.star = false;
                    return;
                }
                _ => {}
            }
        }

        match c {
            '\'' | '"' | '`' => self.quote = Some(c),
            '{' => self.depth += 1,
            '}' => self.depth -= 1,
            '/' => self.slash = true,
            _ => {}
        }
    }
}

/// 切り出した設定ブロック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    /// `{` から対応する `}` までのバイト範囲
    pub range: Range<usize>,
    /// 呼び出しを閉じる `)` の直後
    pub call_end: usize,
}

impl ConfigBlock {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range.clone()]
    }
}

/// `open` の位置にある `{` と対応する `}` の直後のオフセットを返す
pub fn matching_brace(text: &str, open: usize) -> Option<usize> {
    if text.as_bytes().get(open) != Some(&b'{') {
        return None;
    }
    let mut tracker = BraceTracker::new();
    for (i, c) in text[open..].char_indices() {
        tracker.feed(c);
        if tracker.in_code() && c == '}' && tracker.depth() == 0 {
            return Some(open + i + 1);
        }
    }
    None
}

/// `open` の位置にある開き括弧 (`(` または `[`) に対応する閉じ括弧の直後を返す。
/// 文字列とコメントは読み飛ばす
pub fn matching_delimiter(text: &str, open: usize) -> Option<usize> {
    let (open_c, close_c) = match text.as_bytes().get(open)? {
        b'(' => ('(', ')'),
        b'[' => ('[', ']'),
        b'{' => return matching_brace(text, open),
        _ => return None,
    };
    let mut tracker = BraceTracker::new();
    let mut depth = 0i64;
    for (i, c) in text[open..].char_indices() {
        let was_code = tracker.in_code();
        tracker.feed(c);
        if !was_code || !tracker.in_code() {
            continue;
        }
        if c == open_c {
            depth += 1;
        } else if c == close_c {
            depth -= 1;
            if depth == 0 {
                return Some(open + i + 1);
            }
        }
    }
    None
}

fn skip_whitespace(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// 宣言の第 1 引数の直後 (`after_name`) から第 2 引数の設定ブロックを切り出す。
///
/// `, {` に続くオブジェクトリテラル、または `, function (...) {` のような
/// インライン関数を受け付ける。対応する `}` の後に `)` が続かなければ `None`。
pub fn extract_config_block(text: &str, after_name: usize) -> Option<ConfigBlock> {
    let mut pos = skip_whitespace(text, after_name);
    if text.as_bytes().get(pos) != Some(&b',') {
        return None;
    }
    pos = skip_whitespace(text, pos + 1);

    let rest = &text[pos..];
    let open = if rest.starts_with('{') {
        pos
    } else if rest.starts_with("function") {
        // 引数リストの中に `{` は現れない前提で最初の `{` を本体とする
        let params_end = rest.find(')')?;
        let brace = rest[params_end..].find('{')?;
        pos + params_end + brace
    } else {
        return None;
    };

    let close = matching_brace(text, open)?;
    let after = skip_whitespace(text, close);
    if text.as_bytes().get(after) != Some(&b')') {
        return None;
    }
    Some(ConfigBlock {
        range: open..close,
        call_end: after + 1,
    })
}

/// `{` の位置から始まるオブジェクトそのものを宣言とみなす形式 (`.state({ ... })`)
pub fn extract_object_argument(text: &str, open: usize) -> Option<ConfigBlock> {
    let close = matching_brace(text, open)?;
    let after = skip_whitespace(text, close);
    if text.as_bytes().get(after) != Some(&b')') {
        return None;
    }
    Some(ConfigBlock {
        range: open..close,
        call_end: after + 1,
    })
}

/// インライン関数の本体なら `return { ... }` のオブジェクトを設定ブロックとみなす。
/// それ以外はそのまま返す
pub fn returned_object(text: &str, block: &ConfigBlock) -> ConfigBlock {
    let body = block.text(text);
    let top = top_level_text(body);
    if !top.contains("return") {
        return block.clone();
    }
    // top_level_text は入れ子の中身を落とすので、本体側で同じ `return` を探し直す
    let mut tracker = BraceTracker::new();
    for (i, c) in body.char_indices() {
        if tracker.depth() == 1 && tracker.in_code() && body[i..].starts_with("return") {
            let open = skip_whitespace(body, i + "return".len());
            if body.as_bytes().get(open) == Some(&b'{') {
                if let Some(close) = matching_brace(body, open) {
                    return ConfigBlock {
                        range: block.range.start + open..block.range.start + close,
                        call_end: block.call_end,
                    };
                }
            }
            break;
        }
        tracker.feed(c);
    }
    block.clone()
}

/// ブロックの最上位 (深さ 1) のテキストだけを残し、入れ子のオブジェクトの中身を取り除く
pub fn top_level_text(block: &str) -> String {
    let mut tracker = BraceTracker::new();
    let mut out = String::with_capacity(block.len());
    for c in block.chars() {
        let before = tracker.depth();
        tracker.feed(c);
        let after = tracker.depth();
        if before <= 1 && after <= 1 {
            out.push(c);
        }
    }
    out
}

/// 各バイト位置がブロックの最上位のコード中にあるか。
///
/// `{` で始まるブロックなら深さ 1、そうでなければ深さ 0 を最上位とする
pub fn top_level_mask(block: &str) -> Vec<bool> {
    let base = if block.trim_start().starts_with('{') { 1 } else { 0 };
    let mut tracker = BraceTracker::new();
    let mut mask = vec![false; block.len()];
    for (i, c) in block.char_indices() {
        mask[i] = tracker.depth() == base && tracker.in_code();
        tracker.feed(c);
    }
    mask
}
