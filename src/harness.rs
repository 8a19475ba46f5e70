//! 整合測試用的建立與清理 (針對真實帳號)
//!
//! 每次執行建立的資源都帶有 `test-id` 標籤，清理時只刪除標籤完全相符的資源，
//! 多個執行可以共用同一個帳號而不會刪到彼此的資源

use crate::adapters::ssm::DELETE_BATCH_SIZE;
use crate::core::pagination::paginate;
use crate::sources::{ApiGatewayApi, SsmApi};
use crate::utils::error::Result;
use std::collections::HashMap;

pub const TEST_TAG_KEY: &str = "test-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    id: String,
}

impl TestRun {
    pub fn new() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!(
                "aws-source-{}-{}",
                chrono::Utc::now().format("%Y%m%d%H%M%S"),
                &suffix[..8]
            ),
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tags(&self) -> HashMap<String, String> {
        HashMap::from([(TEST_TAG_KEY.to_string(), self.id.clone())])
    }

    pub fn owns(&self, tags: &HashMap<String, String>) -> bool {
        tags.get(TEST_TAG_KEY) == Some(&self.id)
    }
}

impl Default for TestRun {
    fn default() -> Self {
        Self::new()
    }
}

/// 該次執行的參數路徑：`<path>/<run id>`
pub fn run_path(path: &str, run: &TestRun) -> String {
    format!("{}/{}", path.trim_end_matches('/'), run.id())
}

/// 在 `path` 下建立 `count` 個 String 參數並標上本次執行
pub async fn setup_parameters<C: SsmApi + ?Sized>(
    client: &C,
    run: &TestRun,
    path: &str,
    count: usize,
) -> Result<Vec<String>> {
    let tags = run.tags();
    let base = run_path(path, run);
    let mut names = Vec::with_capacity(count);

    for i in 0..count {
        let name = format!("{}/param-{}", base, i);
        client
            .put_parameter(&name, &format!("value-{}", i), &tags)
            .await?;
        names.push(name);
    }

    tracing::info!(run = run.id(), count, "📝 Created test parameters");
    Ok(names)
}

/// 刪除本次執行在 `path` 下建立的參數
///
/// 只走訪本次執行的子路徑，只刪除仍帶本次標籤的參數；
/// 讀不到標籤的參數直接略過，不讓整個清理失敗
pub async fn teardown_parameters<C: SsmApi + ?Sized>(
    client: &C,
    run: &TestRun,
    path: &str,
) -> Result<Vec<String>> {
    let subtree = run_path(path, run);
    let subtree = subtree.as_str();
    let mut candidates = Vec::new();
    paginate(
        move |token| client.get_parameters_by_path(subtree, token),
        |parameter| candidates.extend(parameter.name().map(str::to_string)),
    )
    .await?;

    let mut owned = Vec::new();
    for name in candidates {
        match client.list_tags(&name).await {
            Ok(tags) if run.owns(&tags) => owned.push(name),
            Ok(_) => tracing::debug!(parameter = %name, "Not tagged for this run, keeping"),
            Err(e) => tracing::debug!(parameter = %name, error = %e, "Tags unreadable, skipping"),
        }
    }

    let mut deleted = Vec::with_capacity(owned.len());
    for batch in owned.chunks(DELETE_BATCH_SIZE) {
        deleted.extend(client.delete_parameters(batch).await?);
    }

    tracing::info!(run = run.id(), deleted = deleted.len(), "🧹 Removed test parameters");
    Ok(deleted)
}

pub async fn setup_rest_api<C: ApiGatewayApi + ?Sized>(
    client: &C,
    run: &TestRun,
    name: &str,
) -> Result<String> {
    let id = client.create_rest_api(name, &run.tags()).await?;
    tracing::info!(run = run.id(), rest_api = %id, "Created test REST API");
    Ok(id)
}

/// 刪除所有標記本次執行 id 的 REST API
pub async fn teardown_rest_apis<C: ApiGatewayApi + ?Sized>(
    client: &C,
    run: &TestRun,
) -> Result<Vec<String>> {
    let mut owned = Vec::new();
    paginate(
        move |position| client.get_rest_apis(position),
        |api| {
            let tagged = api.tags().is_some_and(|tags| run.owns(tags));
            if let (true, Some(id)) = (tagged, api.id()) {
                owned.push(id.to_string());
            }
        },
    )
    .await?;

    for id in &owned {
        client.delete_rest_api(id).await?;
    }

    tracing::info!(run = run.id(), deleted = owned.len(), "🧹 Removed test REST APIs");
    Ok(owned)
}
