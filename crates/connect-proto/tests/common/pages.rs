#![allow(dead_code)]

use async_trait::async_trait;
use connect_proto::context::{ContextError, ContextPage, ContextTrack, PageFetcher};
use std::collections::HashMap;

pub fn track(n: usize) -> ContextTrack {
    ContextTrack::new(format!("spotify:track:{n:022}"), format!("uid-{n}"))
}

/// Pages of the given sizes, numbered consecutively from zero.
pub fn numbered_pages(sizes: &[usize]) -> Vec<ContextPage> {
    let mut n = 0;
    sizes
        .iter()
        .map(|&size| {
            let tracks = (n..n + size).map(track).collect();
            n += size;
            ContextPage::new(tracks)
        })
        .collect()
}

pub fn uid(t: &ContextTrack) -> &str {
    &t.uid
}

/// Fetcher that serves pages strictly by continuation token, the way a
/// backend does, and records every token it was asked for.
pub struct KeyedFetcher {
    pages: HashMap<Option<String>, ContextPage>,
    pub requests: Vec<Option<String>>,
}

impl KeyedFetcher {
    /// Chains `sizes` into pages linked by tokens `"page-1"`, `"page-2"`...
    pub fn chained(sizes: &[usize]) -> Self {
        let count = sizes.len();
        let pages = numbered_pages(sizes)
            .into_iter()
            .enumerate()
            .map(|(i, mut page)| {
                let key = (i > 0).then(|| format!("page-{i}"));
                page.next_page_token = (i + 1 < count).then(|| format!("page-{}", i + 1));
                (key, page)
            })
            .collect();
        Self {
            pages,
            requests: Vec::new(),
        }
    }
}

#[async_trait]
impl PageFetcher for KeyedFetcher {
    async fn next_page(
        &mut self,
        continuation: Option<String>,
    ) -> Result<Option<ContextPage>, ContextError> {
        self.requests.push(continuation.clone());
        Ok(self.pages.get(&continuation).cloned())
    }
}
