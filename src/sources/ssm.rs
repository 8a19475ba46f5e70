use crate::core::pagination::{paginate, Page};
use crate::domain::model::{Item, Query, QueryError, QueryMethod, Scope};
use crate::domain::ports::{QueryStream, Source};
use crate::sources::{rfc3339, Attributes, SourceInfo};
use crate::utils::error::{Result, SourceError};
use async_trait::async_trait;
use aws_sdk_ssm::primitives::DateTime;
use aws_sdk_ssm::types::{Parameter, ParameterMetadata, ParameterType};
use std::collections::HashMap;

pub const ITEM_TYPE: &str = "ssm-parameter";
const UNIQUE_ATTRIBUTE: &str = "Name";

/// GetParameters 單次最多名稱數
pub const GET_BATCH_SIZE: usize = 10;
/// DescribeParameters `Name` 篩選單次最多值數
pub const DESCRIBE_NAME_LIMIT: usize = 50;

/// 參數來源與測試工具使用的 SSM 呼叫
#[async_trait]
pub trait SsmApi: Send + Sync {
    /// 參數不存在時回傳 `Ok(None)`
    async fn get_parameter(&self, name: &str) -> Result<Option<Parameter>>;

    /// 不存在的名稱不會出現在結果中，單次最多 10 個
    async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>>;

    /// `path` 為 `/` 時列出所有參數 (含非階層名稱)
    async fn describe_parameters(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<Page<ParameterMetadata>>;

    /// 取得指定名稱的中繼資料，單次最多 50 個
    async fn describe_named(&self, names: &[String]) -> Result<Vec<ParameterMetadata>>;

    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<Page<Parameter>>;

    async fn list_tags(&self, name: &str) -> Result<HashMap<String, String>>;

    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()>;

    /// 回傳 SSM 回報已刪除的名稱，單次最多 10 個
    async fn delete_parameters(&self, names: &[String]) -> Result<Vec<String>>;
}

/// 單一參數轉成 item 前收集到的所有資料
///
/// GET、LIST、SEARCH 各自從不同的 SSM 呼叫開始，再補齊其餘欄位，
/// 同一個參數不論從哪條路徑取得都產生相同的 item
#[derive(Debug, Default)]
struct ParameterRecord {
    parameter: Option<Parameter>,
    metadata: Option<ParameterMetadata>,
    tags: Option<HashMap<String, String>>,
}

impl ParameterRecord {
    fn name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(ParameterMetadata::name)
            .or_else(|| self.parameter.as_ref().and_then(Parameter::name))
    }
}

pub struct SsmParameterSource<C: SsmApi> {
    client: C,
    info: SourceInfo,
    root_path: String,
}

impl<C: SsmApi> SsmParameterSource<C> {
    pub fn new(client: C, scope: Scope, root_path: impl Into<String>) -> Self {
        Self {
            client,
            info: SourceInfo::new(ITEM_TYPE, scope),
            root_path: root_path.into(),
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    fn kms_link(&self, key_id: Option<&str>) -> Vec<Query> {
        key_id
            .map(|key| {
                vec![Query::new(
                    "kms-key",
                    QueryMethod::Get,
                    key,
                    self.info.scope.to_string(),
                )]
            })
            .unwrap_or_default()
    }

    fn to_item(&self, record: &ParameterRecord) -> Item {
        let parameter = record.parameter.as_ref();
        let metadata = record.metadata.as_ref();
        let param_type = metadata
            .and_then(ParameterMetadata::r#type)
            .or_else(|| parameter.and_then(Parameter::r#type));
        let modified = metadata
            .and_then(ParameterMetadata::last_modified_date)
            .or_else(|| parameter.and_then(Parameter::last_modified_date));
        let version = metadata
            .map(ParameterMetadata::version)
            .or_else(|| parameter.map(Parameter::version));
        let key_id = metadata.and_then(ParameterMetadata::key_id);

        let mut attrs = Attributes::new();
        attrs
            .set_opt(UNIQUE_ATTRIBUTE, record.name())
            .set_opt("Type", param_type.map(ParameterType::as_str))
            .set_opt("Version", version)
            .set_opt("LastModifiedDate", modified.and_then(timestamp))
            .set_opt(
                "ARN",
                parameter
                    .and_then(Parameter::arn)
                    .or_else(|| metadata.and_then(ParameterMetadata::arn)),
            )
            .set_opt(
                "DataType",
                metadata
                    .and_then(ParameterMetadata::data_type)
                    .or_else(|| parameter.and_then(Parameter::data_type)),
            )
            .set_opt("Tier", metadata.and_then(|m| m.tier()).map(|t| t.as_str()))
            .set_opt("Description", metadata.and_then(ParameterMetadata::description))
            .set_opt("KeyId", key_id);

        if carries_value(param_type) {
            attrs.set_opt("Value", parameter.and_then(Parameter::value));
        }
        if let Some(tags) = &record.tags {
            attrs.set("Tags", serde_json::json!(tags));
        }

        attrs.into_item(ITEM_TYPE, UNIQUE_ATTRIBUTE, &self.info.scope, self.kms_link(key_id))
    }

    /// 標籤盡力取得：途中被刪除的參數仍會產生 item
    async fn attach_tags(&self, records: &mut [ParameterRecord]) {
        for record in records.iter_mut() {
            let Some(name) = record.name().map(str::to_string) else {
                continue;
            };
            match self.client.list_tags(&name).await {
                Ok(tags) => record.tags = Some(tags),
                Err(e) => tracing::debug!(parameter = %name, error = %e, "Skipping tags"),
            }
        }
    }

    /// LIST 只有中繼資料，值由 GetParameters 補上
    async fn complete_metadata(&self, page: Vec<ParameterMetadata>) -> Result<Vec<ParameterRecord>> {
        let names: Vec<String> = page
            .iter()
            .filter_map(|m| m.name().map(str::to_string))
            .collect();

        let mut parameters = HashMap::new();
        for batch in names.chunks(GET_BATCH_SIZE) {
            for parameter in self.client.get_parameters(batch).await? {
                if let Some(name) = parameter.name().map(str::to_string) {
                    parameters.insert(name, parameter);
                }
            }
        }

        let mut records: Vec<ParameterRecord> = page
            .into_iter()
            .map(|metadata| ParameterRecord {
                parameter: metadata.name().and_then(|n| parameters.remove(n)),
                metadata: Some(metadata),
                tags: None,
            })
            .collect();
        self.attach_tags(&mut records).await;
        Ok(records)
    }

    /// GET 與 SEARCH 從參數開始，Tier、KeyId、Description 由中繼資料補上
    async fn complete_parameters(&self, page: Vec<Parameter>) -> Result<Vec<ParameterRecord>> {
        let names: Vec<String> = page
            .iter()
            .filter_map(|p| p.name().map(str::to_string))
            .collect();

        let mut metadata = HashMap::new();
        for batch in names.chunks(DESCRIBE_NAME_LIMIT) {
            for meta in self.client.describe_named(batch).await? {
                if let Some(name) = meta.name().map(str::to_string) {
                    metadata.insert(name, meta);
                }
            }
        }

        let mut records: Vec<ParameterRecord> = page
            .into_iter()
            .map(|parameter| ParameterRecord {
                metadata: parameter.name().and_then(|n| metadata.remove(n)),
                parameter: Some(parameter),
                tags: None,
            })
            .collect();
        self.attach_tags(&mut records).await;
        Ok(records)
    }
}

fn timestamp(date: &DateTime) -> Option<String> {
    rfc3339(date.secs(), date.subsec_nanos())
}

/// SecureString 的值永遠不會放進 item
fn carries_value(param_type: Option<&ParameterType>) -> bool {
    matches!(
        param_type,
        Some(ParameterType::String) | Some(ParameterType::StringList)
    )
}

#[async_trait]
impl<C: SsmApi> Source for SsmParameterSource<C> {
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

        let parameter = self
            .client
            .get_parameter(query)
            .await
            .map_err(|e| self.info.other(scope, e))?
            .ok_or_else(|| self.info.not_found(scope, query))?;

        let records = self
            .complete_parameters(vec![parameter])
            .await
            .map_err(|e| self.info.other(scope, e))?;

        records
            .first()
            .map(|record| self.to_item(record))
            .ok_or_else(|| self.info.not_found(scope, query))
    }

    async fn list(&self, scope: &str, stream: &mut dyn QueryStream) {
        if let Err(e) = self.info.check_scope(scope) {
            stream.error(e);
            return;
        }

        let this = self;
        let root = self.root_path.as_str();
        let result = paginate(
            move |token| async move {
                let page = this.client.describe_parameters(root, token).await?;
                let records = this.complete_metadata(page.items).await?;
                Ok::<_, SourceError>(Page::new(records, page.next_token))
            },
            |record| stream.item(self.to_item(&record)),
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(scope, error = %e, "❌ Listing SSM parameters failed");
            stream.error(self.info.other(scope, e));
        }
    }

    async fn search(&self, scope: &str, query: &str, stream: &mut dyn QueryStream) {
        if let Err(e) = self.info.check_scope(scope) {
            stream.error(e);
            return;
        }

        let this = self;
        let result = paginate(
            move |token| async move {
                let page = this.client.get_parameters_by_path(query, token).await?;
                let records = this.complete_parameters(page.items).await?;
                Ok::<_, SourceError>(Page::new(records, page.next_token))
            },
            |record| stream.item(self.to_item(&record)),
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(scope, path = query, error = %e, "Searching SSM parameters failed");
            stream.error(self.info.other(scope, e));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::model::{ErrorType, QueryResult};
    use aws_sdk_ssm::types::ParameterTier;
    use std::sync::Mutex;

    /// 記憶體內的 Parameter Store，供來源與測試工具的測試使用
    #[derive(Default)]
    pub(crate) struct MockSsm {
        pub(crate) parameters: Mutex<Vec<(Parameter, HashMap<String, String>)>>,
        pub(crate) page_size: usize,
        pub(crate) fail_describe: bool,
        /// 每個參數的 KMS 金鑰，由 DescribeParameters 回報
        pub(crate) key_ids: HashMap<String, String>,
        /// 仍會被列出，但讀取標籤失敗 (模擬中途被刪除)
        pub(crate) vanished: Vec<String>,
        pub(crate) delete_calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockSsm {
        pub(crate) fn with_parameters(names: &[(&str, ParameterType)], page_size: usize) -> Self {
            let parameters = names
                .iter()
                .map(|(name, kind)| {
                    let parameter = Parameter::builder()
                        .name(*name)
                        .r#type(kind.clone())
                        .value(format!("value-of-{}", name))
                        .version(1)
                        .build();
                    (parameter, HashMap::new())
                })
                .collect();
            Self {
                parameters: Mutex::new(parameters),
                page_size,
                ..Default::default()
            }
        }

        pub(crate) fn with_key(mut self, name: &str, key_id: &str) -> Self {
            self.key_ids.insert(name.to_string(), key_id.to_string());
            self
        }

        pub(crate) fn with_tags(self, name: &str, tags: &[(&str, &str)]) -> Self {
            for (parameter, existing) in self.parameters.lock().unwrap().iter_mut() {
                if parameter.name() == Some(name) {
                    existing.extend(tags.iter().map(|(k, v)| (k.to_string(), v.to_string())));
                }
            }
            self
        }

        fn page<T: Clone>(&self, all: Vec<T>, token: Option<String>) -> Page<T> {
            let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(all.len());
            let next = (end < all.len()).then(|| end.to_string());
            Page::new(all[start..end].to_vec(), next)
        }

        fn metadata(&self, parameter: &Parameter) -> ParameterMetadata {
            let key_id = parameter.name().and_then(|n| self.key_ids.get(n)).cloned();
            ParameterMetadata::builder()
                .set_name(parameter.name().map(str::to_string))
                .set_type(parameter.r#type().cloned())
                .version(parameter.version())
                .tier(ParameterTier::Standard)
                .description("fixture")
                .set_key_id(key_id)
                .build()
        }

        pub(crate) fn names(&self) -> Vec<String> {
            self.parameters
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(p, _)| p.name().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl SsmApi for MockSsm {
        async fn get_parameter(&self, name: &str) -> Result<Option<Parameter>> {
            Ok(self
                .parameters
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p.name() == Some(name))
                .map(|(p, _)| p.clone()))
        }

        async fn get_parameters(&self, names: &[String]) -> Result<Vec<Parameter>> {
            assert!(names.len() <= GET_BATCH_SIZE, "GetParameters takes at most 10 names");
            Ok(self
                .parameters
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p.name().is_some_and(|n| names.iter().any(|w| w == n)))
                .map(|(p, _)| p.clone())
                .collect())
        }

        async fn describe_parameters(
            &self,
            path: &str,
            next_token: Option<String>,
        ) -> Result<Page<ParameterMetadata>> {
            if self.fail_describe {
                return Err(SourceError::aws("DescribeParameters", "AccessDenied"));
            }
            let all: Vec<ParameterMetadata> = self
                .parameters
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p.name().is_some_and(|n| n.starts_with(path)))
                .map(|(p, _)| self.metadata(p))
                .collect();
            Ok(self.page(all, next_token))
        }

        async fn describe_named(&self, names: &[String]) -> Result<Vec<ParameterMetadata>> {
            assert!(names.len() <= DESCRIBE_NAME_LIMIT);
            if self.fail_describe {
                return Err(SourceError::aws("DescribeParameters", "AccessDenied"));
            }
            Ok(self
                .parameters
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p.name().is_some_and(|n| names.iter().any(|w| w == n)))
                .map(|(p, _)| self.metadata(p))
                .collect())
        }

        async fn get_parameters_by_path(
            &self,
            path: &str,
            next_token: Option<String>,
        ) -> Result<Page<Parameter>> {
            let all: Vec<Parameter> = self
                .parameters
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p.name().is_some_and(|n| n.starts_with(path)))
                .map(|(p, _)| p.clone())
                .collect();
            Ok(self.page(all, next_token))
        }

        async fn list_tags(&self, name: &str) -> Result<HashMap<String, String>> {
            if self.vanished.iter().any(|v| v == name) {
                return Err(SourceError::aws("ListTagsForResource", "InvalidResourceId"));
            }
            self.parameters
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p.name() == Some(name))
                .map(|(_, tags)| tags.clone())
                .ok_or_else(|| SourceError::aws("ListTagsForResource", "InvalidResourceId"))
        }

        async fn put_parameter(
            &self,
            name: &str,
            value: &str,
            tags: &HashMap<String, String>,
        ) -> Result<()> {
            let parameter = Parameter::builder()
                .name(name)
                .r#type(ParameterType::String)
                .value(value)
                .version(1)
                .build();
            self.parameters
                .lock()
                .unwrap()
                .push((parameter, tags.clone()));
            Ok(())
        }

        async fn delete_parameters(&self, names: &[String]) -> Result<Vec<String>> {
            assert!(names.len() <= 10, "DeleteParameters takes at most 10 names");
            self.delete_calls.lock().unwrap().push(names.to_vec());
            let mut parameters = self.parameters.lock().unwrap();
            parameters.retain(|(p, _)| !p.name().is_some_and(|n| names.iter().any(|d| d == n)));
            Ok(names.to_vec())
        }
    }

    fn scope() -> Scope {
        Scope::new("123456789012", "eu-west-2")
    }

    fn source(mock: MockSsm) -> SsmParameterSource<MockSsm> {
        SsmParameterSource::new(mock, scope(), "/")
    }

    #[tokio::test]
    async fn test_get_maps_parameter() {
        let mock = MockSsm::with_parameters(&[("/app/db-host", ParameterType::String)], 10);
        let source = source(mock);

        let item = source
            .get("123456789012.eu-west-2", "/app/db-host")
            .await
            .unwrap();

        assert_eq!(item.item_type, "ssm-parameter");
        assert_eq!(item.unique_attribute_value().as_deref(), Some("/app/db-host"));
        assert_eq!(item.attributes["Type"], "String");
        assert_eq!(item.attributes["Value"], "value-of-/app/db-host");
        assert_eq!(item.attributes["Version"], 1);
        assert!(item.attributes.contains_key("Tags"));
    }

    #[tokio::test]
    async fn test_get_never_exposes_secure_value() {
        let mock = MockSsm::with_parameters(&[("/app/password", ParameterType::SecureString)], 10);
        let source = source(mock);

        let item = source
            .get("123456789012.eu-west-2", "/app/password")
            .await
            .unwrap();

        assert_eq!(item.attributes["Type"], "SecureString");
        assert!(!item.attributes.contains_key("Value"));
    }

    #[tokio::test]
    async fn test_get_missing_parameter() {
        let source = source(MockSsm::with_parameters(&[], 10));
        let err = source
            .get("123456789012.eu-west-2", "/nope")
            .await
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_get_wrong_scope() {
        let source = source(MockSsm::with_parameters(&[("/a", ParameterType::String)], 10));
        let err = source.get("999999999999.eu-west-2", "/a").await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::NoScope);
    }

    #[tokio::test]
    async fn test_list_walks_all_pages() {
        let names: Vec<(&str, ParameterType)> = ["/a", "/b", "/c", "/d", "/e"]
            .iter()
            .map(|n| (*n, ParameterType::String))
            .collect();
        let source = source(MockSsm::with_parameters(&names, 2));

        let mut results: Vec<QueryResult> = Vec::new();
        source.list("123456789012.eu-west-2", &mut results).await;

        let listed: Vec<String> = results
            .iter()
            .map(|r| match r {
                QueryResult::Item(item) => item.unique_attribute_value().unwrap(),
                QueryResult::Error(e) => panic!("unexpected error {}", e),
            })
            .collect();
        assert_eq!(listed, vec!["/a", "/b", "/c", "/d", "/e"]);
    }

    #[tokio::test]
    async fn test_list_reports_sdk_failure() {
        let mut mock = MockSsm::with_parameters(&[("/a", ParameterType::String)], 10);
        mock.fail_describe = true;
        let source = source(mock);

        let mut results: Vec<QueryResult> = Vec::new();
        source.list("123456789012.eu-west-2", &mut results).await;

        assert_eq!(results.len(), 1);
        match &results[0] {
            QueryResult::Error(e) => {
                assert_eq!(e.error_type, ErrorType::Other);
                assert!(e.error_string.contains("AccessDenied"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_by_path() {
        let source = source(MockSsm::with_parameters(
            &[
                ("/app/prod/a", ParameterType::String),
                ("/app/dev/b", ParameterType::String),
                ("/app/prod/c", ParameterType::StringList),
            ],
            1,
        ));

        let mut results: Vec<QueryResult> = Vec::new();
        source
            .search("123456789012.eu-west-2", "/app/prod", &mut results)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, QueryResult::Item(i) if i.unique_attribute_value().unwrap().starts_with("/app/prod"))));
    }

    fn only_item(results: Vec<QueryResult>) -> Item {
        match results.as_slice() {
            [QueryResult::Item(item)] => item.clone(),
            other => panic!("expected one item, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_and_list_agree_on_secure_parameter() {
        let mock = MockSsm::with_parameters(&[("/app/api-key", ParameterType::SecureString)], 10)
            .with_key("/app/api-key", "alias/app")
            .with_tags("/app/api-key", &[("team", "payments")]);
        let source = source(mock);

        let fetched = source
            .get("123456789012.eu-west-2", "/app/api-key")
            .await
            .unwrap();

        let mut results: Vec<QueryResult> = Vec::new();
        source.list("123456789012.eu-west-2", &mut results).await;
        let listed = only_item(results);

        assert_eq!(fetched.attributes, listed.attributes);
        assert_eq!(fetched.attributes["KeyId"], "alias/app");
        assert_eq!(fetched.attributes["Tier"], "Standard");
        assert_eq!(fetched.attributes["Description"], "fixture");
        assert_eq!(fetched.attributes["Tags"]["team"], "payments");
        assert!(!fetched.attributes.contains_key("Value"));

        let links: Vec<(&str, &str)> = listed
            .linked_item_queries
            .iter()
            .map(|q| (q.item_type.as_str(), q.query.as_str()))
            .collect();
        assert_eq!(links, vec![("kms-key", "alias/app")]);
        assert_eq!(fetched.linked_item_queries.len(), 1);
        assert_eq!(fetched.linked_item_queries[0].query, "alias/app");
    }

    #[tokio::test]
    async fn test_list_and_search_carry_plain_values() {
        let source = source(MockSsm::with_parameters(
            &[("/app/db-host", ParameterType::String)],
            10,
        ));

        let mut listed: Vec<QueryResult> = Vec::new();
        source.list("123456789012.eu-west-2", &mut listed).await;
        let mut searched: Vec<QueryResult> = Vec::new();
        source
            .search("123456789012.eu-west-2", "/app", &mut searched)
            .await;

        let listed = only_item(listed);
        assert_eq!(listed.attributes["Value"], "value-of-/app/db-host");
        assert!(listed.linked_item_queries.is_empty());
        assert_eq!(listed.attributes, only_item(searched).attributes);
    }

    #[tokio::test]
    async fn test_list_survives_tag_lookup_failure() {
        let mut mock = MockSsm::with_parameters(
            &[("/a", ParameterType::String), ("/b", ParameterType::String)],
            10,
        );
        mock.vanished = vec!["/a".to_string()];
        let source = source(mock);

        let mut results: Vec<QueryResult> = Vec::new();
        source.list("123456789012.eu-west-2", &mut results).await;

        assert_eq!(results.len(), 2);
        match &results[0] {
            QueryResult::Item(item) => assert!(!item.attributes.contains_key("Tags")),
            other => panic!("expected item, got {:?}", other),
        }
        match &results[1] {
            QueryResult::Item(item) => assert!(item.attributes.contains_key("Tags")),
            other => panic!("expected item, got {:?}", other),
        }
    }
}
