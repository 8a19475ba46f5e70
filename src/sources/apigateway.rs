use crate::core::pagination::{paginate, Page};
use crate::domain::model::{Item, Query, QueryError, QueryMethod, Scope};
use crate::domain::ports::{QueryStream, Source};
use crate::sources::{rfc3339, Attributes, SourceInfo};
use crate::utils::error::Result;
use async_trait::async_trait;
use aws_sdk_apigateway::types::{EndpointType, RestApi};
use std::collections::HashMap;

pub const ITEM_TYPE: &str = "apigateway-rest-api";
const UNIQUE_ATTRIBUTE: &str = "Id";

#[async_trait]
pub trait ApiGatewayApi: Send + Sync {
    /// 找不到此 id 時回傳 `Ok(None)`
    async fn get_rest_api(&self, id: &str) -> Result<Option<RestApi>>;

    async fn get_rest_apis(&self, position: Option<String>) -> Result<Page<RestApi>>;

    /// 回傳新建 API 的 id
    async fn create_rest_api(&self, name: &str, tags: &HashMap<String, String>) -> Result<String>;

    async fn delete_rest_api(&self, id: &str) -> Result<()>;
}

pub struct RestApiSource<C: ApiGatewayApi> {
    client: C,
    info: SourceInfo,
}

impl<C: ApiGatewayApi> RestApiSource<C> {
    pub fn new(client: C, scope: Scope) -> Self {
        Self {
            client,
            info: SourceInfo::new(ITEM_TYPE, scope),
        }
    }

    fn to_item(&self, api: &RestApi) -> Item {
        let scope = self.info.scope.to_string();
        let endpoint = api.endpoint_configuration();
        let endpoint_types: Vec<&str> = endpoint
            .map(|e| e.types().iter().map(EndpointType::as_str).collect())
            .unwrap_or_default();
        let vpc_endpoint_ids: Vec<String> = endpoint
            .map(|e| e.vpc_endpoint_ids().to_vec())
            .unwrap_or_default();

        let mut attrs = Attributes::new();
        attrs
            .set_opt(UNIQUE_ATTRIBUTE, api.id())
            .set_opt("Name", api.name())
            .set_opt("Description", api.description())
            .set_opt(
                "CreatedDate",
                api.created_date()
                    .and_then(|d| rfc3339(d.secs(), d.subsec_nanos())),
            )
            .set_opt("Version", api.version())
            .set_opt("ApiKeySource", api.api_key_source().map(|s| s.as_str()))
            .set("EndpointTypes", endpoint_types)
            .set("VpcEndpointIds", vpc_endpoint_ids.clone())
            .set("DisableExecuteApiEndpoint", api.disable_execute_api_endpoint())
            .set("BinaryMediaTypes", api.binary_media_types().to_vec());
        if let Some(tags) = api.tags() {
            attrs.set("Tags", serde_json::json!(tags));
        }

        let mut links: Vec<Query> = vpc_endpoint_ids
            .into_iter()
            .map(|id| Query::new("ec2-vpc-endpoint", QueryMethod::Get, id, scope.as_str()))
            .collect();
        if let Some(id) = api.id() {
            links.push(Query::new(
                "apigateway-resource",
                QueryMethod::Search,
                id,
                scope.as_str(),
            ));
        }

        attrs.into_item(ITEM_TYPE, UNIQUE_ATTRIBUTE, &self.info.scope, links)
    }

    async fn walk(&self, scope: &str, stream: &mut dyn QueryStream, name: Option<&str>) {
        if let Err(e) = self.info.check_scope(scope) {
            stream.error(e);
            return;
        }

        let client = &self.client;
        let result = paginate(
            move |position| client.get_rest_apis(position),
            |api| {
                if name.map_or(true, |wanted| api.name() == Some(wanted)) {
                    stream.item(self.to_item(&api));
                }
            },
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(scope, error = %e, "❌ Listing REST APIs failed");
            stream.error(self.info.other(scope, e));
        }
    }
}

#[async_trait]
impl<C: ApiGatewayApi> Source for RestApiSource<C> {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn item_type(&self) -> &str {
        ITEM_TYPE
    }

    fn scopes(&self) -> Vec<String> {
        vec![self.info.scope.to_string()]
    }

    async fn get(&self, scope: &str, query: &str) -> std::result::Result<Item, QueryError> {
        self.info.check_scope(scope)?;

        let api = self
            .client
            .get_rest_api(query)
            .await
            .map_err(|e| self.info.other(scope, e))?
            .ok_or_else(|| self.info.not_found(scope, query))?;

        Ok(self.to_item(&api))
    }

    async fn list(&self, scope: &str, stream: &mut dyn QueryStream) {
        self.walk(scope, stream, None).await;
    }

    /// REST API 名稱不唯一，依名稱搜尋可能回傳多筆
    async fn search(&self, scope: &str, query: &str, stream: &mut dyn QueryStream) {
        self.walk(scope, stream, Some(query)).await;
    }
}
