use crate::domain::model::{Item, QueryError, QueryResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc::UnboundedSender;

/// 來源回傳結果的串流介面
pub trait QueryStream: Send {
    fn item(&mut self, item: Item);
    fn error(&mut self, error: QueryError);
}

impl QueryStream for Vec<QueryResult> {
    fn item(&mut self, item: Item) {
        self.push(QueryResult::Item(item));
    }

    fn error(&mut self, error: QueryError) {
        self.push(QueryResult::Error(error));
    }
}

impl QueryStream for UnboundedSender<QueryResult> {
    // 接收端已關閉代表沒有人在等結果了
    fn item(&mut self, item: Item) {
        let _ = self.send(QueryResult::Item(item));
    }

    fn error(&mut self, error: QueryError) {
        let _ = self.send(QueryResult::Error(error));
    }
}

/// 將一種 AWS 資源轉成 item 的來源
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;
    fn item_type(&self) -> &str;
    fn scopes(&self) -> Vec<String>;

    async fn get(&self, scope: &str, query: &str) -> std::result::Result<Item, QueryError>;
    async fn list(&self, scope: &str, stream: &mut dyn QueryStream);
    async fn search(&self, scope: &str, query: &str, stream: &mut dyn QueryStream);
}

/// 回報傳輸層目前是否連線中
pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// 從傳輸層收到的訊息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

/// 引擎接收查詢與發送結果的訊息連線
#[async_trait]
pub trait Transport: Connectivity {
    async fn subscribe(&self, subject: &str) -> Result<BoxStream<'static, Message>>;
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// 把緩衝中的訊息送出
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
