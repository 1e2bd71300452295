use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::SkipReason;

/// ファイルをテキストとして読み込む。
///
/// UTF-8 で読めなければ latin-1 として一度だけ再解釈する。
/// NUL バイトを含む内容はバイナリとみなしてスキップする。
pub fn read_source(path: &Path) -> Result<String, SkipReason> {
    let bytes = fs::read(path).map_err(|source| SkipReason::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            let bytes = err.into_bytes();
            if bytes.contains(&0) {
                return Err(SkipReason::Decode {
                    path: path.to_path_buf(),
                });
            }
            warn!("{} is not UTF-8 encoded, decoding as latin-1", path.display());
            Ok(decode_latin1(&bytes))
        }
    }
}

/// ISO-8859-1 は各バイトがそのまま U+0000..U+00FF に対応する
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
