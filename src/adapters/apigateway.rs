use crate::adapters::aws_error;
use crate::core::pagination::Page;
use crate::sources::ApiGatewayApi;
use crate::utils::error::{Result, SourceError};
use async_trait::async_trait;
use aws_sdk_apigateway::types::RestApi;
use aws_sdk_apigateway::Client;
use std::collections::HashMap;

/// GetRestApis 單頁上限
const PAGE_LIMIT: i32 = 500;

#[derive(Debug, Clone)]
pub struct ApiGatewayClient {
    client: Client,
}

impl ApiGatewayClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ApiGatewayApi for ApiGatewayClient {
    async fn get_rest_api(&self, id: &str) -> Result<Option<RestApi>> {
        let output = match self.client.get_rest_api().rest_api_id(id).send().await {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_not_found_exception()) =>
            {
                return Ok(None)
            }
            Err(err) => return Err(aws_error("GetRestApi", err)),
        };

        Ok(Some(
            RestApi::builder()
                .set_id(output.id)
                .set_name(output.name)
                .set_description(output.description)
                .set_created_date(output.created_date)
                .set_version(output.version)
                .set_warnings(output.warnings)
                .set_binary_media_types(output.binary_media_types)
                .set_minimum_compression_size(output.minimum_compression_size)
                .set_api_key_source(output.api_key_source)
                .set_endpoint_configuration(output.endpoint_configuration)
                .set_policy(output.policy)
                .set_tags(output.tags)
                .disable_execute_api_endpoint(output.disable_execute_api_endpoint)
                .set_root_resource_id(output.root_resource_id)
                .build(),
        ))
    }

    async fn get_rest_apis(&self, position: Option<String>) -> Result<Page<RestApi>> {
        let output = self
            .client
            .get_rest_apis()
            .set_position(position)
            .limit(PAGE_LIMIT)
            .send()
            .await
            .map_err(|e| aws_error("GetRestApis", e))?;

        Ok(Page::new(
            output.items().to_vec(),
            output.position().map(str::to_string),
        ))
    }

    async fn create_rest_api(&self, name: &str, tags: &HashMap<String, String>) -> Result<String> {
        let output = self
            .client
            .create_rest_api()
            .name(name)
            .set_tags(Some(tags.clone()))
            .send()
            .await
            .map_err(|e| aws_error("CreateRestApi", e))?;

        output
            .id()
            .map(str::to_string)
            .ok_or_else(|| SourceError::aws("CreateRestApi", "response carried no id"))
    }

    async fn delete_rest_api(&self, id: &str) -> Result<()> {
        self.client
            .delete_rest_api()
            .rest_api_id(id)
            .send()
            .await
            .map_err(|e| aws_error("DeleteRestApi", e))?;

        tracing::debug!(rest_api = id, "Deleted REST API");
        Ok(())
    }
}
