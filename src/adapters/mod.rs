// 適配器層：以 AWS 與 NATS 實作各個 port

pub mod apigateway;
pub mod nats;
pub mod ssm;

pub use apigateway::ApiGatewayClient;
pub use nats::NatsTransport;
pub use ssm::SsmClient;

use crate::utils::error::{Result, SourceError};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::error::DisplayErrorContext;

/// 包裝 SDK 錯誤 (含操作名稱與完整錯誤鏈)
pub fn aws_error<E>(operation: &str, err: E) -> SourceError
where
    E: std::error::Error + 'static,
{
    SourceError::aws(operation, DisplayErrorContext(err).to_string())
}

/// 載入預設憑證鏈，有指定 `region` 時固定區域
pub async fn load_sdk_config(region: Option<&str>, profile: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// 透過 STS GetCallerIdentity 取得帳號 id
pub async fn account_id(config: &SdkConfig) -> Result<String> {
    let client = aws_sdk_sts::Client::new(config);
    let output = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| aws_error("GetCallerIdentity", e))?;

    output
        .account()
        .map(str::to_string)
        .ok_or_else(|| SourceError::aws("GetCallerIdentity", "response carried no account"))
}
