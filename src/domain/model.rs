use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 查詢中代表所有 scope 或所有類型
pub const WILDCARD: &str = "*";

/// item 所在的帳號與區域，格式為 `<account>.<region>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub account_id: String,
    pub region: String,
}

impl Scope {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.account_id, self.region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryMethod {
    Get,
    List,
    Search,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default = "uuid::Uuid::new_v4")]
    pub uuid: uuid::Uuid,
    #[serde(rename = "type")]
    pub item_type: String,
    pub method: QueryMethod,
    #[serde(default)]
    pub query: String,
    pub scope: String,
}

impl Query {
    pub fn new(
        item_type: impl Into<String>,
        method: QueryMethod,
        query: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4(),
            item_type: item_type.into(),
            method,
            query: query.into(),
            scope: scope.into(),
        }
    }

    pub fn matches_type(&self, item_type: &str) -> bool {
        self.item_type == WILDCARD || self.item_type == item_type
    }

    pub fn matches_scope(&self, scope: &str) -> bool {
        self.scope == WILDCARD || self.scope == scope
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "type")]
    pub item_type: String,
    pub unique_attribute: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub scope: String,
    #[serde(default)]
    pub linked_item_queries: Vec<Query>,
}

impl Item {
    pub fn unique_attribute_value(&self) -> Option<String> {
        match self.attributes.get(&self.unique_attribute)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn globally_unique_name(&self) -> Option<String> {
        self.unique_attribute_value()
            .map(|value| format!("{}.{}.{}", self.scope, self.item_type, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    NotFound,
    NoScope,
    Other,
}

/// 唯一會跨出引擎邊界的錯誤
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{error_type:?} from {source_name} ({item_type} in {scope}): {error_string}")]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub error_type: ErrorType,
    pub error_string: String,
    pub scope: String,
    pub source_name: String,
    pub item_type: String,
}

impl QueryError {
    pub fn new(
        error_type: ErrorType,
        error_string: impl Into<String>,
        scope: impl Into<String>,
        source_name: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            error_string: error_string.into(),
            scope: scope.into(),
            source_name: source_name.into(),
            item_type: item_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Item(Item),
    Error(QueryError),
}

/// 查詢的回應：每筆結果，最後是 `Done`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Response {
    Item {
        item: Item,
    },
    Error {
        error: QueryError,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        query: uuid::Uuid,
        items: usize,
        errors: usize,
    },
}

impl From<QueryResult> for Response {
    fn from(result: QueryResult) -> Self {
        match result {
            QueryResult::Item(item) => Response::Item { item },
            QueryResult::Error(error) => Response::Error { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(attributes: serde_json::Value) -> Item {
        Item {
            item_type: "ssm-parameter".to_string(),
            unique_attribute: "Name".to_string(),
            attributes: attributes.as_object().unwrap().clone(),
            scope: Scope::new("123456789012", "eu-west-2").to_string(),
            linked_item_queries: vec![],
        }
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(
            Scope::new("123456789012", "eu-west-2").to_string(),
            "123456789012.eu-west-2"
        );
    }

    #[test]
    fn test_globally_unique_name() {
        let found = item(json!({"Name": "/app/db-host"}));
        assert_eq!(
            found.globally_unique_name().as_deref(),
            Some("123456789012.eu-west-2.ssm-parameter./app/db-host")
        );

        let missing = item(json!({"Type": "String"}));
        assert_eq!(missing.unique_attribute_value(), None);
        assert_eq!(missing.globally_unique_name(), None);
    }

    #[test]
    fn test_query_wildcards() {
        let query = Query::new(WILDCARD, QueryMethod::List, "", WILDCARD);
        assert!(query.matches_type("ssm-parameter"));
        assert!(query.matches_scope("123456789012.eu-west-2"));

        let query = Query::new("ssm-parameter", QueryMethod::Get, "/x", "1.us-east-1");
        assert!(!query.matches_type("apigateway-rest-api"));
        assert!(!query.matches_scope("1.eu-west-2"));
    }

    #[test]
    fn test_query_decodes_without_uuid() {
        let query: Query = serde_json::from_value(json!({
            "type": "ssm-parameter",
            "method": "SEARCH",
            "query": "/app",
            "scope": "*"
        }))
        .unwrap();
        assert_eq!(query.method, QueryMethod::Search);
        assert_eq!(query.query, "/app");
    }
}
