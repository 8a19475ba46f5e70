use crate::utils::error::{Result, SourceError};
use std::collections::HashSet;
use std::future::Future;

/// AWS 列表的一頁以及下一頁的 token
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        // AWS 有時回傳空字串而不是省略 token
        let next_token = next_token.filter(|token| !token.is_empty());
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// 走訪分頁列表，每筆記錄交給 `visit`
///
/// 回傳取得的頁數。同一個 token 出現第二次時中止走訪
pub async fn paginate<T, F, Fut, V>(mut fetch: F, mut visit: V) -> Result<usize>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    V: FnMut(T),
{
    let mut seen = HashSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = fetch(token.take()).await?;
        pages += 1;

        tracing::trace!(
            page = pages,
            records = page.items.len(),
            "Fetched page"
        );

        page.items.into_iter().for_each(&mut visit);

        match page.next_token.filter(|t| !t.is_empty()) {
            Some(next) => {
                if !seen.insert(next.clone()) {
                    return Err(SourceError::PaginationError {
                        message: format!("continuation token {} returned twice", next),
                    });
                }
                token = Some(next);
            }
            None => return Ok(pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn pages() -> Vec<Page<u32>> {
        vec![
            Page::new(vec![1, 2], Some("a".to_string())),
            Page::new(vec![3], Some("b".to_string())),
            Page::new(vec![4, 5], None),
        ]
    }

    #[tokio::test]
    async fn test_visits_every_page_once() {
        let source = pages();
        let requested = Arc::new(Mutex::new(Vec::new()));
        let mut visited = Vec::new();

        let fetched = paginate(
            |token: Option<String>| {
                requested.lock().unwrap().push(token.clone());
                let index = match token.as_deref() {
                    None => 0,
                    Some("a") => 1,
                    Some("b") => 2,
                    Some(other) => panic!("unexpected token {}", other),
                };
                let page = source[index].clone();
                async move { Ok(page) }
            },
            |n| visited.push(n),
        )
        .await
        .unwrap();

        assert_eq!(fetched, 3);
        assert_eq!(visited, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            *requested.lock().unwrap(),
            vec![None, Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_token_ends_walk() {
        let mut visited = Vec::new();
        let fetched = paginate(
            |_token| async { Ok(Page::new(vec![7], Some(String::new()))) },
            |n: u32| visited.push(n),
        )
        .await
        .unwrap();

        assert_eq!(fetched, 1);
        assert_eq!(visited, vec![7]);
    }

    #[tokio::test]
    async fn test_repeated_token_aborts() {
        let mut visited = Vec::new();
        let result = paginate(
            |_token| async { Ok(Page::new(vec![1], Some("loop".to_string()))) },
            |n: u32| visited.push(n),
        )
        .await;

        assert!(matches!(result, Err(SourceError::PaginationError { .. })));
        // 第一頁，接著是 token 重複的那一頁
        assert_eq!(visited, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_error_stops_walk() {
        let mut calls = 0;
        let mut visited = Vec::new();
        let result = paginate(
            |token: Option<String>| {
                calls += 1;
                async move {
                    match token {
                        None => Ok(Page::new(vec![1], Some("next".to_string()))),
                        Some(_) => Err(SourceError::aws("ListThings", "throttled")),
                    }
                }
            },
            |n: u32| visited.push(n),
        )
        .await;

        assert!(matches!(result, Err(SourceError::AwsError { .. })));
        assert_eq!(calls, 2);
        assert_eq!(visited, vec![1]);
    }
}
