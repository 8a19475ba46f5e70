//! 資料來源：每種 AWS 資源類型一個
//!
//! 每個來源持有自己服務的客戶端 port，只服務一個 scope，並把 SDK 記錄轉成 [`Item`]

pub mod apigateway;
pub mod ssm;

pub use apigateway::{ApiGatewayApi, RestApiSource};
pub use ssm::{SsmApi, SsmParameterSource};

use crate::domain::model::{ErrorType, Item, Query, QueryError, Scope};
use crate::utils::error::SourceError;
use serde_json::{Map, Value};

/// 建構中的 item 屬性
#[derive(Debug, Default)]
pub(crate) struct Attributes(Map<String, Value>);

impl Attributes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// 略過空值，item 只保留 AWS 有回傳的欄位
    pub(crate) fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.0.insert(key.to_string(), value.into());
        }
        self
    }

    pub(crate) fn into_item(
        self,
        item_type: &str,
        unique_attribute: &str,
        scope: &Scope,
        linked_item_queries: Vec<Query>,
    ) -> Item {
        Item {
            item_type: item_type.to_string(),
            unique_attribute: unique_attribute.to_string(),
            attributes: self.0,
            scope: scope.to_string(),
            linked_item_queries,
        }
    }
}

/// AWS 時間戳 (秒 + 奈秒) 轉 RFC 3339
pub(crate) fn rfc3339(secs: i64, nanos: u32) -> Option<String> {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, nanos).map(|dt| dt.to_rfc3339())
}

/// 來源共用的 scope 與名稱資訊
#[derive(Debug, Clone)]
pub(crate) struct SourceInfo {
    pub(crate) name: String,
    pub(crate) item_type: &'static str,
    pub(crate) scope: Scope,
}

impl SourceInfo {
    pub(crate) fn new(item_type: &'static str, scope: Scope) -> Self {
        Self {
            name: format!("{}-source", item_type),
            item_type,
            scope,
        }
    }

    pub(crate) fn check_scope(&self, scope: &str) -> Result<(), QueryError> {
        if scope == self.scope.to_string() {
            Ok(())
        } else {
            Err(self.error(
                ErrorType::NoScope,
                scope,
                format!("requested scope {} does not match source scope {}", scope, self.scope),
            ))
        }
    }

    pub(crate) fn not_found(&self, scope: &str, what: &str) -> QueryError {
        self.error(
            ErrorType::NotFound,
            scope,
            format!("{} {} not found", self.item_type, what),
        )
    }

    pub(crate) fn other(&self, scope: &str, err: SourceError) -> QueryError {
        self.error(ErrorType::Other, scope, err.to_string())
    }

    fn error(&self, error_type: ErrorType, scope: &str, message: String) -> QueryError {
        QueryError::new(error_type, message, scope, &self.name, self.item_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            rfc3339(1_700_000_000, 0).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_check_scope() {
        let info = SourceInfo::new("ssm-parameter", Scope::new("123456789012", "eu-west-2"));
        assert!(info.check_scope("123456789012.eu-west-2").is_ok());

        let err = info.check_scope("123456789012.us-east-1").unwrap_err();
        assert_eq!(err.error_type, ErrorType::NoScope);
        assert_eq!(err.source_name, "ssm-parameter-source");
    }

    #[test]
    fn test_attributes_skip_missing() {
        let scope = Scope::new("1", "r");
        let mut attrs = Attributes::new();
        attrs.set("Name", "x").set_opt::<String>("Description", None);
        let item = attrs.into_item("ssm-parameter", "Name", &scope, vec![]);
        assert_eq!(item.attributes.len(), 1);
        assert_eq!(item.scope, "1.r");
    }
}
