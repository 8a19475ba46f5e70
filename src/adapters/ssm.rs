use crate::adapters::aws_error;
use crate::core::pagination::{paginate, Page};
use crate::sources::SsmApi;
use crate::utils::error::{Result, SourceError};
use async_trait::async_trait;
use aws_sdk_ssm::types::{
    Parameter, ParameterMetadata, ParameterStringFilter, ParameterType, ResourceTypeForTagging, Tag,
};
use aws_sdk_ssm::Client;
use std::collections::HashMap;

/// DeleteParameters 單次最多參數數
pub const DELETE_BATCH_SIZE: usize = 10;
/// DescribeParameters 單頁上限
const DESCRIBE_PAGE_SIZE: i32 = 50;

#[derive(Debug, Clone)]
pub struct SsmClient {
    client: Client,
}

impl SsmClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn describe_page(
        &self,
        filter: Option<ParameterStringFilter>,
        next_token: Option<String>,
    ) -> Result<Page<ParameterMetadata>> {
        let output = self
            .client
            .describe_parameters()
            .set_parameter_filters(filter.map(|f| vec![f]))
            .max_results(DESCRIBE_PAGE_SIZE)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| aws_error("DescribeParameters", e))?;

        Ok(Page::new(
            output.parameters().to_vec(),
            output.next_token().map(str::to_string),
        ))
    }
}

fn string_filter(key: &str, option: &str, values: Vec<String>) -> Result<ParameterStringFilter> {
    ParameterStringFilter::builder()
        .key(key)
        .option(option)
        .set_values(Some(values))
        .build()
        .map_err(|e| aws_error("DescribeParameters", e))
}

#[async_trait]
impl SsmApi for SsmClient {
    async fn get_parameter(&self, name: &str) -> Result<Option<Parameter>> {
        let result = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(false)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.parameter().cloned()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found()) =>
            {
                Ok(None)
            }
            Err(err) => Err(aws_error("GetParameter", err)),
        }
    }

    async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .client
            .get_parameters()
            .set_names(Some(names.to_vec()))
            .with_decryption(false)
            .send()
            .await
            .map_err(|e| aws_error("GetParameters", e))?;

        if !output.invalid_parameters().is_empty() {
            tracing::debug!(missing = ?output.invalid_parameters(), "Parameters gone before GetParameters");
        }
        Ok(output.parameters().to_vec())
    }

    async fn describe_parameters(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<Page<ParameterMetadata>> {
        // Path 篩選只會比對階層名稱，根路徑不加篩選
        let filter = if path == "/" {
            None
        } else {
            Some(string_filter("Path", "Recursive", vec![path.to_string()])?)
        };
        self.describe_page(filter, next_token).await
    }

    async fn describe_named(&self, names: &[String]) -> Result<Vec<ParameterMetadata>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let filter = string_filter("Name", "Equals", names.to_vec())?;
        let mut found = Vec::with_capacity(names.len());
        paginate(
            |token| self.describe_page(Some(filter.clone()), token),
            |metadata| found.push(metadata),
        )
        .await?;
        Ok(found)
    }

    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<Page<Parameter>> {
        let output = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .with_decryption(false)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| aws_error("GetParametersByPath", e))?;

        Ok(Page::new(
            output.parameters().to_vec(),
            output.next_token().map(str::to_string),
        ))
    }

    async fn list_tags(&self, name: &str) -> Result<HashMap<String, String>> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_type(ResourceTypeForTagging::Parameter)
            .resource_id(name)
            .send()
            .await
            .map_err(|e| aws_error("ListTagsForResource", e))?;

        Ok(output
            .tag_list()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String);

        for (key, tag_value) in tags {
            let tag = Tag::builder()
                .key(key)
                .value(tag_value)
                .build()
                .map_err(|e| aws_error("PutParameter", e))?;
            request = request.tags(tag);
        }

        request
            .send()
            .await
            .map_err(|e| aws_error("PutParameter", e))?;

        tracing::debug!(parameter = name, "Created SSM parameter");
        Ok(())
    }

    async fn delete_parameters(&self, names: &[String]) -> Result<Vec<String>> {
        if names.len() > DELETE_BATCH_SIZE {
            return Err(SourceError::aws(
                "DeleteParameters",
                format!(
                    "{} names requested, at most {} allowed per call",
                    names.len(),
                    DELETE_BATCH_SIZE
                ),
            ));
        }

        let output = self
            .client
            .delete_parameters()
            .set_names(Some(names.to_vec()))
            .send()
            .await
            .map_err(|e| aws_error("DeleteParameters", e))?;

        if !output.invalid_parameters().is_empty() {
            tracing::warn!(
                invalid = ?output.invalid_parameters(),
                "Some SSM parameters could not be deleted"
            );
        }

        Ok(output.deleted_parameters().to_vec())
    }
}
