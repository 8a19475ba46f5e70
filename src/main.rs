use aws_source::config::{Environment, FileConfig};
use aws_source::utils::{logger, validation::Validate};
use aws_source::{CliConfig, Settings};
use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 日誌尚未初始化，載入失敗直接由 anyhow 輸出到 stderr
    let file = cli
        .config
        .as_ref()
        .map(|path| {
            FileConfig::from_file(path)
                .with_context(|| format!("loading config file {}", path.display()))
        })
        .transpose()?;

    // 合併命令列、環境變數與設定檔
    let settings = Settings::resolve(cli, file, Environment::from_env())
        .context("resolving settings")?;

    // 初始化日誌
    logger::init_logger(&settings.log, settings.run_mode);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "🚀 Starting aws-source");
    tracing::debug!("Settings: {:?}", settings);

    // 驗證配置
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    // 運行引擎
    if let Err(e) = aws_source::app::run(settings).await {
        tracing::error!(error = %e, config_error = e.is_config_error(), "❌ aws-source stopped");
        std::process::exit(1);
    }

    tracing::info!("✅ aws-source shut down cleanly");
    Ok(())
}
