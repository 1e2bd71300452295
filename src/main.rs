// src/main.rs

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use angularjs_route_analyzer::{Analyzer, AnalyzerConfig};

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "AngularJS Route Analyzer",
    version,
    about = "AngularJS プロジェクトのルート・コンポーネント・テンプレートを解析して JSON 出力する CLI ツール"
)]
struct Cli {
    /// 解析対象の AngularJS プロジェクトルート
    /// 例: `--project-root ./my-angularjs-app`
    #[arg(short = 'r', long = "project-root", value_name = "DIR")]
    project_root: PathBuf,

    /// 設定ファイル (JSON)。省略時はデフォルト値
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 検証パスを実行しない
    #[arg(long)]
    no_verify: bool,

    /// 宣言の集計を標準エラーに出力する
    #[arg(long)]
    diagnostics: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) ログは標準エラーへ (標準出力は JSON だけにする)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // 2) CLI 引数と設定
    let cli = Cli::parse();
    let mut config = cli
        .config
        .as_deref()
        .map(AnalyzerConfig::load_from_path)
        .unwrap_or_default();
    if cli.no_verify {
        config.verify_routes = false;
    }

    // 3) 解析
    let analysis = Analyzer::new(config).analyze(&cli.project_root)?;

    // 4) 構造化モデルを JSON 化して標準出力
    println!("{}", analysis.report.to_json()?);
    if cli.diagnostics {
        eprintln!("{}", analysis.diagnostics.render());
    }

    Ok(())
}
