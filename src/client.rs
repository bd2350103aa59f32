//! CLI interface to build the AWS clients of one account.
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudwatch::config::Credentials;
use clap::Parser;
use tracing::info;

use crate::accounts::AccountConfig;

/// Cost Explorer only has an endpoint in this region.
const COST_EXPLORER_REGION: &str = "us-east-1";

/// CLI config for the AWS clients.
#[derive(Debug, Clone, Parser)]
pub struct ClientCLIConfig {
    /// Time limit of a single AWS operation, retries included.
    #[clap(long, default_value = "60s", value_parser = humantime::parse_duration)]
    operation_timeout: Duration,

    /// Time limit of a single attempt of an AWS operation.
    #[clap(long, default_value = "20s", value_parser = humantime::parse_duration)]
    attempt_timeout: Duration,

    /// Time limit to establish a connection.
    #[clap(long, default_value = "5s", value_parser = humantime::parse_duration)]
    connect_timeout: Duration,

    /// Max attempts per AWS operation.
    #[clap(long, default_value_t = 3)]
    max_attempts: u32,
}

/// Service clients for one account.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub kafka: aws_sdk_kafka::Client,
    pub cloudwatch: aws_sdk_cloudwatch::Client,
    pub cost_explorer: aws_sdk_costexplorer::Client,
}

/// Build the clients for `account`.
pub async fn build_clients(config: &ClientCLIConfig, account: &AccountConfig) -> AwsClients {
    let sdk_config = load_sdk_config(config, account).await;

    let cost_explorer_config = aws_sdk_costexplorer::config::Builder::from(&sdk_config)
        .region(Region::new(COST_EXPLORER_REGION))
        .build();

    AwsClients {
        kafka: aws_sdk_kafka::Client::new(&sdk_config),
        cloudwatch: aws_sdk_cloudwatch::Client::new(&sdk_config),
        cost_explorer: aws_sdk_costexplorer::Client::from_conf(cost_explorer_config),
    }
}

async fn load_sdk_config(config: &ClientCLIConfig, account: &AccountConfig) -> SdkConfig {
    let timeout_config = TimeoutConfig::builder()
        .operation_timeout(config.operation_timeout)
        .operation_attempt_timeout(config.attempt_timeout)
        .connect_timeout(config.connect_timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(account.region.clone()))
        .timeout_config(timeout_config)
        .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts.max(1)));

    match &account.credentials {
        Some(creds) => {
            info!(account = %account.name, "using credentials from config file");
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                creds.session_token.clone(),
                None,
                "config-file",
            ));
        }
        None => {
            info!(
                account = %account.name,
                profile = account.profile.as_deref().unwrap_or("default"),
                "using default credential chain",
            );
            if let Some(profile) = &account.profile {
                loader = loader.profile_name(profile);
            }
        }
    }

    if let Some(endpoint_url) = &account.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}

#[cfg(test)]
mod tests {
    use crate::{
        accounts::StaticCredentials,
        source::{AwsSource, StatsSource},
    };

    use super::*;

    fn account(endpoint_url: Option<&str>) -> AccountConfig {
        AccountConfig {
            name: "main".to_string(),
            region: "eu-west-1".to_string(),
            credentials: Some(StaticCredentials {
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            }),
            profile: None,
            endpoint_url: endpoint_url.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_client_config() {
        let config = ClientCLIConfig::try_parse_from([
            "test",
            "--operation-timeout",
            "30s",
            "--attempt-timeout",
            "10s",
            "--connect-timeout",
            "2s",
            "--max-attempts",
            "4",
        ])
        .unwrap();
        let clients = build_clients(&config, &account(None)).await;

        let kafka = clients.kafka.config();
        assert_eq!(kafka.region(), Some(&Region::new("eu-west-1")));
        assert_eq!(
            clients.cloudwatch.config().region(),
            Some(&Region::new("eu-west-1"))
        );
        assert_eq!(
            clients.cost_explorer.config().region(),
            Some(&Region::new(COST_EXPLORER_REGION))
        );

        let timeouts = kafka.timeout_config().unwrap();
        assert_eq!(timeouts.operation_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            timeouts.operation_attempt_timeout(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(timeouts.connect_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(kafka.retry_config().unwrap().max_attempts(), 4);

        // Cost Explorer keeps the shared timeouts despite the region override
        let timeouts = clients.cost_explorer.config().timeout_config().unwrap();
        assert_eq!(timeouts.operation_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_zero_attempts_means_one() {
        let config = ClientCLIConfig::try_parse_from(["test", "--max-attempts", "0"]).unwrap();
        let clients = build_clients(&config, &account(None)).await;
        assert_eq!(
            clients.kafka.config().retry_config().unwrap().max_attempts(),
            1
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let config = ClientCLIConfig::try_parse_from([
            "test",
            "--operation-timeout",
            "2s",
            "--attempt-timeout",
            "1s",
            "--connect-timeout",
            "500ms",
            "--max-attempts",
            "1",
        ])
        .unwrap();
        let clients = build_clients(&config, &account(Some("http://127.0.0.1:1"))).await;
        let source = AwsSource::new(clients);

        let res = tokio::time::timeout(Duration::from_secs(10), source.active_clusters())
            .await
            .expect("listing clusters must not hang");
        let err = res.unwrap_err();
        assert_eq!(err.to_string(), "list MSK clusters");
    }
}
