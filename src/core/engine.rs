use crate::domain::model::{ErrorType, Query, QueryError, QueryMethod, QueryResult, Response};
use crate::domain::ports::{Message, QueryStream, Source, Transport};
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// 關閉時等待執行中查詢完成的時間
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 所有引擎都會訂閱的 subject
pub const ALL_SUBJECT: &str = "request.all";

pub fn scope_subject(scope: &str) -> String {
    format!("request.scope.{}", scope)
}

/// 持有已註冊的來源並執行查詢
pub struct Engine {
    name: String,
    sources: Vec<Arc<dyn Source>>,
    permits: Arc<Semaphore>,
    max_parallel: usize,
}

impl Engine {
    pub fn new(name: impl Into<String>, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            name: name.into(),
            sources: Vec::new(),
            permits: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn add_source(&mut self, source: Arc<dyn Source>) {
        tracing::debug!(
            source = source.name(),
            item_type = source.item_type(),
            scopes = ?source.scopes(),
            "Registered source"
        );
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    pub fn scopes(&self) -> BTreeSet<String> {
        self.sources.iter().flat_map(|s| s.scopes()).collect()
    }

    /// 查詢要執行的所有 (來源, scope) 組合
    pub fn targets(&self, query: &Query) -> Vec<(Arc<dyn Source>, String)> {
        self.sources
            .iter()
            .filter(|source| query.matches_type(source.item_type()))
            .flat_map(|source| {
                source
                    .scopes()
                    .into_iter()
                    .filter(|scope| query.matches_scope(scope))
                    .map(move |scope| (Arc::clone(source), scope))
            })
            .collect()
    }

    /// 對所有符合的來源執行 `query`，結果依到達順序串流回傳
    ///
    /// 同一個引擎上所有查詢合計最多 `max_parallel` 個來源同時執行。回傳執行次數
    pub async fn execute(&self, query: &Query, stream: &mut dyn QueryStream) -> usize {
        let targets = self.targets(query);
        if targets.is_empty() {
            stream.error(QueryError::new(
                ErrorType::NoScope,
                format!(
                    "no source handles type {} in scope {}",
                    query.item_type, query.scope
                ),
                &query.scope,
                &self.name,
                &query.item_type,
            ));
            return 0;
        }

        let executions = targets.len();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (source, scope) in targets {
            let permits = Arc::clone(&self.permits);
            let query = query.clone();
            let mut tx = tx.clone();
            tasks.spawn(async move {
                // semaphore 不會被關閉
                let _permit = permits.acquire_owned().await.ok();
                run_source(source.as_ref(), &scope, &query, &mut tx).await;
            });
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            match result {
                QueryResult::Item(item) => stream.item(item),
                QueryResult::Error(error) => stream.error(error),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(query = %query.uuid, error = %e, "❌ Source task failed");
                stream.error(QueryError::new(
                    ErrorType::Other,
                    format!("source task failed: {}", e),
                    &query.scope,
                    &self.name,
                    &query.item_type,
                ));
            }
        }

        executions
    }

    /// 處理 `transport` 上的查詢直到 `shutdown` 完成
    pub async fn serve<T>(self: Arc<Self>, transport: Arc<T>, shutdown: impl Future<Output = ()>) -> Result<()>
    where
        T: Transport + 'static,
    {
        // 訂閱廣播與每個 scope 的 subject
        let mut subjects = vec![ALL_SUBJECT.to_string()];
        subjects.extend(self.scopes().iter().map(|scope| scope_subject(scope)));

        let mut subscriptions = Vec::with_capacity(subjects.len());
        for subject in &subjects {
            subscriptions.push(transport.subscribe(subject).await?);
        }
        let mut messages = stream::select_all(subscriptions);

        tracing::info!(
            engine = %self.name,
            sources = self.sources.len(),
            subjects = ?subjects,
            "📡 Engine serving queries"
        );

        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested, stopping request loop");
                    break;
                }
                next = messages.next() => match next {
                    Some(message) => {
                        let engine = Arc::clone(&self);
                        let transport = Arc::clone(&transport);
                        in_flight.spawn(async move {
                            engine.handle_message(transport.as_ref(), message).await;
                        });
                    }
                    None => {
                        tracing::warn!("All subscriptions closed");
                        break;
                    }
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        // 等待執行中的查詢送出 Done，逾時才中止
        if !in_flight.is_empty() {
            tracing::info!(in_flight = in_flight.len(), "⏳ Waiting for running queries");
            let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
                while in_flight.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    aborted = in_flight.len(),
                    "Queries still running after grace period, aborting"
                );
                in_flight.abort_all();
            }
        }

        transport.flush().await
    }

    async fn handle_message<T: Transport + ?Sized>(&self, transport: &T, message: Message) {
        let Some(reply) = message.reply else {
            tracing::warn!(subject = %message.subject, "Dropping query without reply subject");
            return;
        };

        let query: Query = match serde_json::from_slice(&message.payload) {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(subject = %message.subject, error = %e, "Dropping undecodable query");
                return;
            }
        };

        // 廣播查詢只由能處理的引擎回應
        if message.subject == ALL_SUBJECT && self.targets(&query).is_empty() {
            tracing::trace!(query = %query.uuid, "No matching sources for broadcast query");
            return;
        }

        // 一邊執行一邊把結果送回 reply subject
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel::<QueryResult>();

        let execution = async move {
            let mut tx = tx;
            self.execute(&query, &mut tx).await;
            query.uuid
        };

        let publisher = async {
            let (mut items, mut errors) = (0, 0);
            while let Some(result) = rx.recv().await {
                match &result {
                    QueryResult::Item(_) => items += 1,
                    QueryResult::Error(_) => errors += 1,
                }
                publish(transport, &reply, &Response::from(result)).await;
            }
            (items, errors)
        };

        let (uuid, (items, errors)) = tokio::join!(execution, publisher);
        publish(transport, &reply, &Response::Done { query: uuid, items, errors }).await;

        tracing::debug!(
            query = %uuid,
            items,
            errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query complete"
        );
    }
}

async fn run_source(source: &dyn Source, scope: &str, query: &Query, stream: &mut dyn QueryStream) {
    let started = Instant::now();
    match query.method {
        QueryMethod::Get => match source.get(scope, &query.query).await {
            Ok(item) => stream.item(item),
            Err(error) => stream.error(error),
        },
        QueryMethod::List => source.list(scope, stream).await,
        QueryMethod::Search => source.search(scope, &query.query, stream).await,
    }
    tracing::debug!(
        source = source.name(),
        scope,
        method = ?query.method,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Source finished"
    );
}

async fn publish<T: Transport + ?Sized>(transport: &T, subject: &str, response: &Response) {
    let payload = match serde_json::to_vec(response) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response");
            return;
        }
    };
    if let Err(e) = transport.publish(subject, payload).await {
        tracing::warn!(subject, error = %e, "❌ Failed to publish response");
    }
}
