//! 程序啟動：查詢帳號、註冊資料來源、連線傳輸層，並與健康檢查一起執行引擎

use crate::adapters::{self, ApiGatewayClient, NatsTransport, SsmClient};
use crate::config::Settings;
use crate::core::engine::Engine;
use crate::domain::model::Scope;
use crate::domain::ports::Connectivity;
use crate::health;
use crate::sources::{RestApiSource, SsmParameterSource};
use crate::utils::error::{Result, SourceError};
use aws_config::SdkConfig;
use std::sync::Arc;

/// 取得主機名稱 (附加在 NATS 連線名稱後)
pub fn hostname() -> Result<String> {
    sysinfo::System::host_name()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| SourceError::StartupError {
            message: "could not determine hostname".to_string(),
        })
}

/// 載入每個區域的 SDK 配置，以及所屬帳號
pub async fn load_regions(settings: &Settings) -> Result<(String, Vec<(String, SdkConfig)>)> {
    let profile = settings.aws.profile.as_deref();

    let mut configs = Vec::new();
    if settings.aws.regions.is_empty() {
        let config = adapters::load_sdk_config(None, profile).await;
        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| SourceError::MissingConfigError {
                field: "aws_regions".to_string(),
            })?;
        configs.push((region, config));
    } else {
        for region in &settings.aws.regions {
            configs.push((
                region.clone(),
                adapters::load_sdk_config(Some(region), profile).await,
            ));
        }
    }

    // 憑證以帳號為單位，查一次即可涵蓋所有區域
    let account_id = adapters::account_id(&configs[0].1).await?;
    Ok((account_id, configs))
}

pub fn build_engine(
    settings: &Settings,
    hostname: &str,
    account_id: &str,
    regions: &[(String, SdkConfig)],
) -> Engine {
    let mut engine = Engine::new(
        adapters::nats::connection_name(&settings.nats.name_prefix, hostname),
        settings.max_parallel,
    );

    for (region, config) in regions {
        let scope = Scope::new(account_id, region);
        engine.add_source(Arc::new(SsmParameterSource::new(
            SsmClient::new(config),
            scope.clone(),
            settings.ssm_parameter_path.clone(),
        )));
        engine.add_source(Arc::new(RestApiSource::new(ApiGatewayClient::new(config), scope)));
    }

    engine
}

pub async fn run(settings: Settings) -> Result<()> {
    let hostname = hostname()?;

    if settings.honeycomb_api_key.is_some() {
        tracing::info!("Trace exporter key present; exporting is not enabled in this build");
    }
    if settings.sentry_dsn.is_some() {
        tracing::info!("Sentry DSN present; error reporting is not enabled in this build");
    }

    // 載入 AWS 配置與帳號
    let (account_id, regions) = load_regions(&settings).await?;
    tracing::info!(
        account = %account_id,
        regions = ?regions.iter().map(|(r, _)| r.as_str()).collect::<Vec<_>>(),
        "📋 Loaded AWS configuration"
    );

    // 建立引擎並註冊每個區域的來源
    let engine = Arc::new(build_engine(&settings, &hostname, &account_id, &regions));

    // 連線 NATS 並綁定健康檢查埠
    let transport = Arc::new(NatsTransport::connect(&settings.nats, &hostname).await?);
    let listener = health::bind(settings.health_check_port).await?;

    let connectivity: Arc<dyn Connectivity> = transport.clone();

    tracing::info!(
        engine = engine.name(),
        sources = engine.sources().len(),
        max_parallel = engine.max_parallel(),
        "🚀 Starting engine"
    );
    health::run_alongside(listener, connectivity, engine.serve(transport, shutdown_signal())).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
