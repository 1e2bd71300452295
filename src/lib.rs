//! AngularJS 1.x プロジェクトのルーティング解析。
//!
//! ui-router の `.state(...)` と ngRoute の `$routeProvider.when(...)` を
//! 正規表現と小さな括弧スキャナで取り出し、コントローラ・サービス・
//! テンプレートなどのカタログと一緒に構造化モデルにまとめる。

pub mod analyzer;
pub mod block;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod deps;
pub mod dialect;
pub mod error;
pub mod fields;
pub mod graph;
pub mod model;
pub mod report;
pub mod resolver;
pub mod source;
pub mod templates;
pub mod verify;

pub use analyzer::{Analysis, Analyzer};
pub use config::AnalyzerConfig;
pub use error::AnalyzerError;
pub use model::{AnalysisReport, Route};
