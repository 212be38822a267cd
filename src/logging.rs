//! # Logging モジュール
//!
//! シミュレーションのログ出力を初期化します。
//!
//! コンソールには簡潔な形式、ファイルには JSON 形式で出力し、
//! ファイル書き込みは tracing-appender の非同期ライタで行います。
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ
//! - `File`: ファイルのみ（logs/swarmsim.log.YYYY-MM-DD）
//! - `Both`: コンソールとファイルの両方

use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(Self::Console),
            "file" => Ok(Self::File),
            "both" | "all" => Ok(Self::Both),
            other => Err(format!("無効な出力先: {}. 利用可能: console, file, both", other)),
        }
    }
}

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ（File または Both の場合）
    pub log_dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "swarmsim.log".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// 環境変数 `RUST_LOG` が設定されていれば `config.level` より優先します。
///
/// # 戻り値
///
/// ファイル出力を行う場合は非同期ライタのガード。
/// ガードを破棄すると未書き込みのログが失われるため、プロセス終了まで保持すること。
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = || fmt::layer().with_target(true).with_thread_ids(false).compact();

    match config.output {
        LogOutput::Console => {
            Registry::default().with(env_filter).with(console_layer()).try_init()?;
            Ok(None)
        }
        LogOutput::File | LogOutput::Both => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (writer, guard) = non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(false)
                .json();

            let console = (config.output == LogOutput::Both).then(console_layer);
            Registry::default()
                .with(env_filter)
                .with(console)
                .with(file_layer)
                .try_init()?;
            Ok(Some(guard))
        }
    }
}

/// ログレベルを文字列から解析（無効な値は INFO）
pub fn parse_log_level(level_str: &str) -> Level {
    Level::from_str(level_str.trim()).unwrap_or_else(|_| {
        eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
        Level::INFO
    })
}

/// `-v` の回数からログレベルを決定
pub fn level_from_verbosity(base: Level, verbose: u8) -> Level {
    match verbose {
        0 => base,
        1 => Level::DEBUG.max(base),
        _ => Level::TRACE,
    }
}

pub fn ensure_log_directory(log_dir: &str) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_output_from_str() {
        assert_eq!(LogOutput::from_str("console"), Ok(LogOutput::Console));
        assert_eq!(LogOutput::from_str("FILE"), Ok(LogOutput::File));
        assert_eq!(LogOutput::from_str("all"), Ok(LogOutput::Both));
        assert!(LogOutput::from_str("syslog").is_err());
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(level_from_verbosity(Level::INFO, 0), Level::INFO);
        assert_eq!(level_from_verbosity(Level::INFO, 1), Level::DEBUG);
        assert_eq!(level_from_verbosity(Level::TRACE, 1), Level::TRACE);
        assert_eq!(level_from_verbosity(Level::WARN, 3), Level::TRACE);
    }
}
