//! Lazily paged playback contexts.
//!
//! A context (playlist, album, station...) is a sequence of tracks fetched
//! page by page from a [`PageFetcher`].  [`PagedContext`] keeps every fetched
//! page in an append-only arena and walks it with a `(page, track)` cursor,
//! so `previous()` never refetches and `seek_to_absolute_index` only fetches
//! past the end of what is already cached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use crate::error::ContextError;

/// Consecutive empty pages tolerated before a fetch is treated as exhausted.
pub const MAX_EMPTY_PAGES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTrack {
    #[serde(default)]
    pub uid: String,
    pub uri: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ContextTrack {
    pub fn new(uri: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            uri: uri.into(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextPage {
    pub tracks: Vec<ContextTrack>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl ContextPage {
    pub fn new(tracks: Vec<ContextTrack>) -> Self {
        Self {
            tracks,
            next_page_token: None,
        }
    }
}

/// Source of context pages.
#[async_trait]
pub trait PageFetcher: Send {
    /// Fetch the page after the last one returned.  `continuation` is that
    /// page's `next_page_token`, `None` only for the first page.  A page
    /// without a token is the last one and is never followed by another
    /// call.  `Ok(None)` means there are no more pages right now.
    async fn next_page(
        &mut self,
        continuation: Option<String>,
    ) -> Result<Option<ContextPage>, ContextError>;
}

/// Navigation over a playback context.
#[async_trait]
pub trait PlaybackContext: Send {
    async fn next(&mut self) -> Result<Option<ContextTrack>, ContextError>;
    async fn previous(&mut self) -> Result<Option<ContextTrack>, ContextError>;
    /// Position the cursor so that the following `next()` yields the track
    /// at cumulative index `index`.
    async fn seek_to_absolute_index(&mut self, index: usize) -> Result<bool, ContextError>;
    async fn skip(&mut self, count: usize) -> Result<bool, ContextError>;
    fn current(&self) -> Option<&ContextTrack>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Start,
    /// On a track already yielded.
    At(usize, usize),
    /// Just before a track; `next()` yields it.
    Before(usize, usize),
}

pub struct PagedContext<F> {
    fetcher: F,
    pages: Vec<ContextPage>,
    cursor: Cursor,
}

impl<F: PageFetcher> PagedContext<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            pages: Vec::new(),
            cursor: Cursor::Start,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn cached_tracks(&self) -> usize {
        self.pages.iter().map(|p| p.tracks.len()).sum()
    }

    /// First materialized position at or after `(page, track)`.
    fn settle(&self, mut page: usize, mut track: usize) -> Option<(usize, usize)> {
        while let Some(p) = self.pages.get(page) {
            if track < p.tracks.len() {
                return Some((page, track));
            }
            page += 1;
            track = 0;
        }
        None
    }

    fn predecessor(&self, page: usize, track: usize) -> Option<(usize, usize)> {
        if track > 0 {
            return Some((page, track - 1));
        }
        (0..page)
            .rev()
            .find(|&p| !self.pages[p].tracks.is_empty())
            .map(|p| (p, self.pages[p].tracks.len() - 1))
    }

    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut seen = 0;
        for (i, page) in self.pages.iter().enumerate() {
            if index < seen + page.tracks.len() {
                return Some((i, index - seen));
            }
            seen += page.tracks.len();
        }
        None
    }

    fn track(&self, (page, track): (usize, usize)) -> Option<&ContextTrack> {
        self.pages.get(page).and_then(|p| p.tracks.get(track))
    }

    /// Fetch and cache one page.  Returns its track count, `None` on
    /// exhaustion.
    async fn fetch_page(&mut self) -> Result<Option<usize>, ContextError> {
        let continuation = match self.pages.last() {
            None => None,
            Some(ContextPage {
                next_page_token: Some(token),
                ..
            }) => Some(token.clone()),
            // Last page of the context
            Some(_) => return Ok(None),
        };
        match self.fetcher.next_page(continuation).await? {
            Some(page) => {
                let len = page.tracks.len();
                debug!(page = self.pages.len(), tracks = len, "context page fetched");
                self.pages.push(page);
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }

    /// Fetch until a non-empty page arrives.  `false` on exhaustion or after
    /// `MAX_EMPTY_PAGES` empty pages in a row.
    async fn fetch_non_empty(&mut self) -> Result<bool, ContextError> {
        for _ in 0..MAX_EMPTY_PAGES {
            match self.fetch_page().await? {
                None => return Ok(false),
                Some(0) => continue,
                Some(_) => return Ok(true),
            }
        }
        warn!(
            limit = MAX_EMPTY_PAGES,
            "context returned too many empty pages, treating as exhausted"
        );
        Ok(false)
    }
}

#[async_trait]
impl<F: PageFetcher> PlaybackContext for PagedContext<F> {
    async fn next(&mut self) -> Result<Option<ContextTrack>, ContextError> {
        loop {
            let candidate = match self.cursor {
                Cursor::Start => (0, 0),
                Cursor::At(page, track) => (page, track + 1),
                Cursor::Before(page, track) => (page, track),
            };
            if let Some(pos) = self.settle(candidate.0, candidate.1) {
                self.cursor = Cursor::At(pos.0, pos.1);
                return Ok(self.track(pos).cloned());
            }
            if !self.fetch_non_empty().await? {
                return Ok(None);
            }
        }
    }

    async fn previous(&mut self) -> Result<Option<ContextTrack>, ContextError> {
        let target = match self.cursor {
            Cursor::Start => None,
            Cursor::At(page, track) | Cursor::Before(page, track) => {
                self.predecessor(page, track)
            }
        };
        let Some(pos) = target else {
            return Ok(None);
        };
        self.cursor = Cursor::At(pos.0, pos.1);
        Ok(self.track(pos).cloned())
    }

    async fn seek_to_absolute_index(&mut self, index: usize) -> Result<bool, ContextError> {
        loop {
            if let Some((page, track)) = self.locate(index) {
                self.cursor = Cursor::Before(page, track);
                return Ok(true);
            }
            if !self.fetch_non_empty().await? {
                return Ok(false);
            }
        }
    }

    async fn skip(&mut self, count: usize) -> Result<bool, ContextError> {
        for _ in 0..count {
            if self.next().await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn current(&self) -> Option<&ContextTrack> {
        match self.cursor {
            Cursor::At(page, track) => self.track((page, track)),
            _ => None,
        }
    }
}

/// A context of exactly one known track.
pub struct SingleTrackContext {
    track: ContextTrack,
    yielded: bool,
}

impl SingleTrackContext {
    pub fn new(track: ContextTrack) -> Self {
        Self {
            track,
            yielded: false,
        }
    }
}

#[async_trait]
impl PlaybackContext for SingleTrackContext {
    async fn next(&mut self) -> Result<Option<ContextTrack>, ContextError> {
        if self.yielded {
            return Ok(None);
        }
        self.yielded = true;
        Ok(Some(self.track.clone()))
    }

    async fn previous(&mut self) -> Result<Option<ContextTrack>, ContextError> {
        Ok(None)
    }

    async fn seek_to_absolute_index(&mut self, index: usize) -> Result<bool, ContextError> {
        Ok(index == 0)
    }

    async fn skip(&mut self, _count: usize) -> Result<bool, ContextError> {
        Ok(false)
    }

    fn current(&self) -> Option<&ContextTrack> {
        self.yielded.then_some(&self.track)
    }
}

/// Serves a fixed list of pages addressed by continuation token.
///
/// Tokens on the given pages are replaced by positional ones (`"1"`, `"2"`,
/// ...), the last page carrying none.
#[derive(Debug, Default)]
pub struct VecPageFetcher {
    pages: Vec<ContextPage>,
    calls: usize,
}

impl VecPageFetcher {
    pub fn new(pages: impl IntoIterator<Item = ContextPage>) -> Self {
        let mut pages: Vec<ContextPage> = pages.into_iter().collect();
        let count = pages.len();
        for (i, page) in pages.iter_mut().enumerate() {
            page.next_page_token = (i + 1 < count).then(|| (i + 1).to_string());
        }
        Self { pages, calls: 0 }
    }

    /// Number of `next_page` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[async_trait]
impl PageFetcher for VecPageFetcher {
    async fn next_page(
        &mut self,
        continuation: Option<String>,
    ) -> Result<Option<ContextPage>, ContextError> {
        self.calls += 1;
        let index = match continuation {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ContextError::msg(format!("unknown page token {token:?}")))?,
        };
        Ok(self.pages.get(index).cloned())
    }
}
