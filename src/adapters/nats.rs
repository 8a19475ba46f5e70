use crate::config::NatsSettings;
use crate::domain::ports::{Connectivity, Message, Transport};
use crate::utils::error::{Result, SourceError};
use async_nats::connection::State;
use async_nats::{ConnectOptions, ServerAddr};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 引擎與健康檢查共用的 NATS 連線
#[derive(Debug, Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
    name: String,
}

impl NatsTransport {
    /// 只連線一次，失敗即結束程序 (不重試)
    pub async fn connect(settings: &NatsSettings, hostname: &str) -> Result<Self> {
        let name = connection_name(&settings.name_prefix, hostname);

        let servers = settings
            .servers
            .iter()
            .map(|url| {
                url.parse::<ServerAddr>().map_err(|e| SourceError::InvalidConfigValueError {
                    field: "nats_servers".to_string(),
                    value: url.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut options = ConnectOptions::new()
            .name(&name)
            .connection_timeout(CONNECT_TIMEOUT)
            .event_callback(|event| async move {
                tracing::info!(%event, "NATS connection event");
            });

        if let Some(token) = &settings.token {
            options = options.token(token.expose().to_string());
        }
        if let Some(creds) = &settings.creds_file {
            options = options
                .credentials_file(creds)
                .await
                .map_err(|e| {
                    SourceError::transport(format!("reading creds file {}: {}", creds.display(), e))
                })?;
        }
        if let Some(ca) = &settings.ca_file {
            options = options.add_root_certificates(ca.clone()).require_tls(true);
        }
        if let (Some(cert), Some(key)) = (&settings.client_cert_file, &settings.client_key_file) {
            options = options
                .add_client_certificate(cert.clone(), key.clone())
                .require_tls(true);
        }

        tracing::info!(connection = %name, servers = ?settings.servers, "🔌 Connecting to NATS");
        let client = options
            .connect(servers)
            .await
            .map_err(|e| SourceError::transport(format!("connecting as {}: {}", name, e)))?;

        tracing::info!(connection = %name, "✅ Connected to NATS");
        Ok(Self { client, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub fn connection_name(prefix: &str, hostname: &str) -> String {
    format!("{}.{}", prefix, hostname)
}

impl Connectivity for NatsTransport {
    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn subscribe(&self, subject: &str) -> Result<BoxStream<'static, Message>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| SourceError::transport(format!("subscribing to {}: {}", subject, e)))?;

        tracing::debug!(subject, "Subscribed");
        Ok(subscriber
            .map(|message| Message {
                subject: message.subject.to_string(),
                reply: message.reply.map(|reply| reply.to_string()),
                payload: message.payload.to_vec(),
            })
            .boxed())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| SourceError::transport(format!("publishing to {}: {}", subject, e)))
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| SourceError::transport(format!("flushing: {}", e)))
    }
}
