use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 解析全体を止めるエラー (これ以外はすべて診断情報として記録して続行する)
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("project root {0} does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// ファイル単位でスキップした理由
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("could not read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not decode {path} as text (utf-8 and latin-1 both failed)")]
    Decode { path: PathBuf },
}

impl SkipReason {
    pub fn path(&self) -> &PathBuf {
        match self {
            SkipReason::Unreadable { path, .. } | SkipReason::Decode { path } => path,
        }
    }
}
