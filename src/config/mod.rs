pub mod toml_config;

pub use toml_config::FileConfig;

use crate::utils::error::{Result, SourceError};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_NATS_SERVER: &str = "nats://localhost:4222";
pub const DEFAULT_NAME_PREFIX: &str = "aws-source";
pub const DEFAULT_HEALTH_CHECK_PORT: u16 = 8080;
pub const DEFAULT_SSM_PARAMETER_PATH: &str = "/";
const MAX_PARALLEL_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "aws-source")]
#[command(about = "Discovers AWS resources and serves them to a discovery engine over NATS")]
pub struct CliConfig {
    /// TOML settings file; flags and environment variables take precedence
    #[arg(long, env = "AWS_SOURCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG")]
    pub log: Option<String>,

    /// Comma-separated NATS server URLs
    #[arg(long, env = "NATS_SERVERS", value_delimiter = ',')]
    pub nats_servers: Vec<String>,

    /// Prefix of the NATS connection name; the hostname is appended
    #[arg(long, env = "NATS_NAME_PREFIX")]
    pub nats_name_prefix: Option<String>,

    /// CA certificate used to verify the NATS server
    #[arg(long, env = "NATS_CA_FILE")]
    pub nats_ca_file: Option<PathBuf>,

    /// Client certificate for mutual TLS
    #[arg(long, env = "NATS_CLIENT_CERT_FILE")]
    pub nats_client_cert_file: Option<PathBuf>,

    /// Private key matching --nats-client-cert-file
    #[arg(long, env = "NATS_CLIENT_KEY_FILE")]
    pub nats_client_key_file: Option<PathBuf>,

    /// NATS credentials (.creds) file
    #[arg(long, env = "NATS_CREDS_FILE")]
    pub nats_creds_file: Option<PathBuf>,

    /// Maximum number of source executions running at once
    #[arg(long, env = "MAX_PARALLEL")]
    pub max_parallel: Option<usize>,

    /// Port of the /healthz endpoint
    #[arg(long, env = "HEALTH_CHECK_PORT")]
    pub health_check_port: Option<u16>,

    /// Comma-separated AWS regions to discover; defaults to the SDK's region
    #[arg(long, env = "AWS_REGIONS", value_delimiter = ',')]
    pub aws_regions: Vec<String>,

    /// Named AWS profile to load credentials from
    #[arg(long, env = "AWS_PROFILE")]
    pub aws_profile: Option<String>,

    /// Root of the SSM parameter hierarchy that LIST queries walk
    #[arg(long, env = "SSM_PARAMETER_PATH")]
    pub ssm_parameter_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Release,
    Debug,
    Test,
}

impl FromStr for RunMode {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "debug" => Ok(Self::Debug),
            "test" => Ok(Self::Test),
            other => Err(SourceError::InvalidConfigValueError {
                field: "RUN_MODE".to_string(),
                value: other.to_string(),
                reason: "expected release, debug or test".to_string(),
            }),
        }
    }
}

/// 不會出現在日誌中的憑證
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 僅從環境變數讀取的值
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub nats_token: Option<Secret>,
    pub honeycomb_api_key: Option<Secret>,
    pub sentry_dsn: Option<Secret>,
    pub run_mode: Option<String>,
}

impl Environment {
    pub fn from_env() -> Self {
        let secret = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(Secret::new)
        };
        Self {
            nats_token: secret("NATS_TOKEN"),
            honeycomb_api_key: secret("HONEYCOMB_API_KEY"),
            sentry_dsn: secret("SENTRY_DSN"),
            run_mode: std::env::var("RUN_MODE").ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatsSettings {
    pub servers: Vec<String>,
    pub name_prefix: String,
    pub ca_file: Option<PathBuf>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
    pub creds_file: Option<PathBuf>,
    pub token: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AwsSettings {
    pub regions: Vec<String>,
    pub profile: Option<String>,
}

/// 合併後的執行期設定
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log: String,
    pub run_mode: RunMode,
    pub max_parallel: usize,
    pub health_check_port: u16,
    pub nats: NatsSettings,
    pub aws: AwsSettings,
    pub ssm_parameter_path: String,
    pub honeycomb_api_key: Option<Secret>,
    pub sentry_dsn: Option<Secret>,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    (!values.is_empty()).then_some(values)
}

impl Settings {
    /// 合併設定：命令列/環境變數 > 設定檔 > 預設值
    pub fn resolve(cli: CliConfig, file: Option<FileConfig>, env: Environment) -> Result<Self> {
        let file = file.unwrap_or_default();

        let run_mode = env
            .run_mode
            .as_deref()
            .map(RunMode::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            log: cli.log.or(file.log).unwrap_or_else(|| "info".to_string()),
            run_mode,
            max_parallel: cli
                .max_parallel
                .or(file.max_parallel)
                .unwrap_or_else(default_parallelism),
            health_check_port: cli
                .health_check_port
                .or(file.health_check_port)
                .unwrap_or(DEFAULT_HEALTH_CHECK_PORT),
            nats: NatsSettings {
                servers: non_empty(cli.nats_servers)
                    .or(file.nats.servers)
                    .unwrap_or_else(|| vec![DEFAULT_NATS_SERVER.to_string()]),
                name_prefix: cli
                    .nats_name_prefix
                    .or(file.nats.name_prefix)
                    .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string()),
                ca_file: cli.nats_ca_file.or(file.nats.ca_file),
                client_cert_file: cli.nats_client_cert_file.or(file.nats.client_cert_file),
                client_key_file: cli.nats_client_key_file.or(file.nats.client_key_file),
                creds_file: cli.nats_creds_file.or(file.nats.creds_file),
                token: env.nats_token,
            },
            aws: AwsSettings {
                regions: non_empty(cli.aws_regions)
                    .or(file.aws.regions)
                    .unwrap_or_default(),
                profile: cli.aws_profile.or(file.aws.profile),
            },
            ssm_parameter_path: cli
                .ssm_parameter_path
                .or(file.ssm.parameter_path)
                .unwrap_or_else(|| DEFAULT_SSM_PARAMETER_PATH.to_string()),
            honeycomb_api_key: env.honeycomb_api_key,
            sentry_dsn: env.sentry_dsn,
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        if tracing::Level::from_str(&self.log).is_err() {
            return Err(SourceError::InvalidConfigValueError {
                field: "log".to_string(),
                value: self.log.clone(),
                reason: "expected one of error, warn, info, debug, trace".to_string(),
            });
        }

        for server in &self.nats.servers {
            validation::validate_nats_url("nats_servers", server)?;
        }
        validation::validate_non_empty_string("nats_name_prefix", &self.nats.name_prefix)?;

        for (field, path) in [
            ("nats_ca_file", &self.nats.ca_file),
            ("nats_client_cert_file", &self.nats.client_cert_file),
            ("nats_client_key_file", &self.nats.client_key_file),
            ("nats_creds_file", &self.nats.creds_file),
        ] {
            if let Some(path) = path {
                validation::validate_path(field, &path.to_string_lossy())?;
            }
        }

        match (&self.nats.client_cert_file, &self.nats.client_key_file) {
            (Some(_), None) => {
                return Err(SourceError::MissingConfigError {
                    field: "nats_client_key_file".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(SourceError::MissingConfigError {
                    field: "nats_client_cert_file".to_string(),
                })
            }
            _ => {}
        }

        validation::validate_range("max_parallel", self.max_parallel, 1, MAX_PARALLEL_LIMIT)?;

        for region in &self.aws.regions {
            validation::validate_aws_region("aws_regions", region)?;
        }
        validation::validate_ssm_path("ssm_parameter_path", &self.ssm_parameter_path)?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
