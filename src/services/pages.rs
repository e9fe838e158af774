// src/services/pages.rs

//! Paginated listing fetcher.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Category;
use crate::services::CatalogEndpoints;
use crate::services::extract::extract_ids;
use crate::transport::Transport;

/// Fetches raw listing pages for a category.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    endpoints: Arc<CatalogEndpoints>,
}

/// Ids extracted from one non-empty listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number within the category
    pub number: usize,
    pub offset: usize,
    pub ids: Vec<String>,
}

impl PageFetcher {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Arc<CatalogEndpoints>) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Fetch one raw listing page.
    pub async fn fetch_page(
        &self,
        category: &Category,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<u8>> {
        let request = self.endpoints.page_request(category, offset, page_size);
        let response = self.transport.send(request).await.map_err(|e| {
            e.with_context(format!("category {} offset {}", category.label(), offset))
        })?;
        Ok(response.body)
    }

    /// Walk the category page by page.
    pub fn cursor<'a>(
        &'a self,
        category: &'a Category,
        page_size: usize,
        max_pages: usize,
    ) -> PageCursor<'a> {
        PageCursor {
            fetcher: self,
            category,
            page_size,
            max_pages,
            offset: 0,
            fetched: 0,
            exhausted: false,
        }
    }
}

/// Sequential walk over one category's listing.
///
/// The upstream range is inclusive, so the offset advances by
/// `page_size + 1`. The walk ends on the first page without ids and fails
/// once `max_pages` pages were fetched without reaching one.
pub struct PageCursor<'a> {
    fetcher: &'a PageFetcher,
    category: &'a Category,
    page_size: usize,
    max_pages: usize,
    offset: usize,
    fetched: usize,
    exhausted: bool,
}

impl PageCursor<'_> {
    /// Fetch the next page, or `None` once an empty page was seen.
    pub async fn next_page(&mut self, cancel: &CancellationToken) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(AppError::cancelled(format!(
                "listing {} offset {}",
                self.category.label(),
                self.offset
            )));
        }
        if self.fetched >= self.max_pages {
            return Err(AppError::PageLimit {
                category: self.category.label(),
                max_pages: self.max_pages,
            });
        }

        let payload = self
            .fetcher
            .fetch_page(self.category, self.offset, self.page_size)
            .await?;
        self.fetched += 1;

        let ids = extract_ids(&payload);
        if ids.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        let page = Page {
            number: self.fetched,
            offset: self.offset,
            ids,
        };
        self.offset += self.page_size + 1;
        Ok(Some(page))
    }

    /// Pages fetched so far, including the terminating empty one.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::{CatalogConfig, Secrets};
    use crate::transport::Body;
    use crate::transport::mock::{MockTransport, ok, status};

    fn fetcher(transport: Arc<MockTransport>) -> PageFetcher {
        let endpoints = CatalogEndpoints::new(&CatalogConfig::default(), &Secrets::default());
        PageFetcher::new(transport, Arc::new(endpoints))
    }

    fn requested_range(body: &Body) -> String {
        match body {
            Body::Multipart(fields) => fields[0].1.clone(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stops_after_first_empty_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport = Arc::new(MockTransport::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                ok(format!(r#"{{"v":["Video:{n}00","Video:{n}01"]}}"#))
            } else {
                ok(r#"{"v":[]}"#)
            }
        }));
        let fetcher = fetcher(Arc::clone(&transport));
        let category = Category::new("1365", "Movies");
        let cancel = CancellationToken::new();

        let mut cursor = fetcher.cursor(&category, 100, 50);
        let mut pages = Vec::new();
        while let Some(page) = cursor.next_page(&cancel).await.unwrap() {
            pages.push(page);
        }

        assert_eq!(pages.len(), 3);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(cursor.pages_fetched(), 4);
        assert_eq!(pages[1].ids, vec!["100", "101"]);
        assert_eq!(
            pages.iter().map(|p| p.offset).collect::<Vec<_>>(),
            vec![0, 101, 202]
        );

        // Exhausted cursors stay exhausted without new calls.
        assert!(cursor.next_page(&cancel).await.unwrap().is_none());
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_offsets_sent_upstream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport = Arc::new(MockTransport::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                ok("Video:1")
            } else {
                ok("")
            }
        }));
        let fetcher = fetcher(Arc::clone(&transport));
        let category = Category::new("43040", "");
        let mut cursor = fetcher.cursor(&category, 10, 5);
        let cancel = CancellationToken::new();
        while cursor.next_page(&cancel).await.unwrap().is_some() {}

        let requests = transport.requests();
        assert!(requested_range(&requests[0].body).contains(r#"{"from":0,"to":10}"#));
        assert!(requested_range(&requests[1].body).contains(r#"{"from":11,"to":21}"#));
    }

    #[tokio::test]
    async fn test_page_limit_guards_endless_listing() {
        let transport = Arc::new(MockTransport::new(|_| ok("Video:1")));
        let fetcher = fetcher(Arc::clone(&transport));
        let category = Category::new("1365", "Movies");
        let cancel = CancellationToken::new();

        let mut cursor = fetcher.cursor(&category, 100, 3);
        let mut result = Ok(None);
        for _ in 0..10 {
            result = cursor.next_page(&cancel).await;
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(
            result,
            Err(AppError::PageLimit { max_pages: 3, .. })
        ));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_error_carries_offset() {
        let transport = Arc::new(MockTransport::new(|_| status(503)));
        let fetcher = fetcher(transport);
        let category = Category::new("1365", "Movies");
        let mut cursor = fetcher.cursor(&category, 100, 3);

        let err = cursor
            .next_page(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport { .. }));
        assert!(err.to_string().contains("Movies (1365) offset 0"));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let transport = Arc::new(MockTransport::new(|_| ok("Video:1")));
        let fetcher = fetcher(Arc::clone(&transport));
        let category = Category::new("1365", "Movies");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut cursor = fetcher.cursor(&category, 100, 3);
        let err = cursor.next_page(&cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
        assert_eq!(transport.call_count(), 0);
    }
}
