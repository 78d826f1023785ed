use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::fetcher::{FetchError, PostSource};
use crate::models::Post;

/// Number of posts revealed per page when no search is active
pub const PAGE_SIZE: usize = 20;

/// Which stage of its lifecycle the list is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InitialLoading,
    Refreshing,
    LoadingMore,
    Success,
    Empty,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    Refresh,
}

/// Issued when a fetch starts, handed back with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    id: u64,
    kind: FetchKind,
}

impl FetchTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }
}

/// Which message an empty list should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyState {
    Loading,
    NoMatches { query: String },
    NoPosts,
}

impl EmptyState {
    pub fn message(&self) -> String {
        match self {
            EmptyState::Loading => "Loading posts...".to_string(),
            EmptyState::NoMatches { query } => format!("No posts found for \"{}\"", query),
            EmptyState::NoPosts => "No posts".to_string(),
        }
    }
}

/// What the list shows for a given `(items, query, page)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedView {
    /// Indices into the full item list, in source order
    pub indices: Vec<usize>,
    pub has_more: bool,
}

/// Computes the visible slice of `items`.
///
/// A blank query reveals the first `page * PAGE_SIZE` items. Anything else
/// filters the whole list by case-insensitive substring on title or body and
/// never paginates.
pub fn derive_view(items: &[Post], query: &str, page: usize) -> DerivedView {
    if query.trim().is_empty() {
        let end = page.saturating_mul(PAGE_SIZE);
        let shown = items.len().min(end);
        DerivedView {
            indices: (0..shown).collect(),
            has_more: items.len() > end,
        }
    } else {
        let needle = query.to_lowercase();
        DerivedView {
            indices: items
                .iter()
                .enumerate()
                .filter(|(_, post)| post.matches(&needle))
                .map(|(i, _)| i)
                .collect(),
            has_more: false,
        }
    }
}

/// Client-side paginated, searchable list over a remotely fetched collection.
///
/// Fetching is split in two: `begin_*` issues a [`FetchTicket`] and the
/// caller feeds the outcome back through [`FeedList::complete_fetch`]. Only
/// the most recently issued ticket is applied.
#[derive(Debug)]
pub struct FeedList {
    items: Vec<Post>,
    query: String,
    page: usize,
    view: DerivedView,
    phase: Phase,
    next_ticket: u64,
    latest_ticket: Option<u64>,
    last_error: Option<String>,
    last_fetched: Option<DateTime<Utc>>,
}

impl Default for FeedList {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedList {
    /// Starts `Idle`; the empty list reports [`EmptyState::Loading`] until the
    /// first fetch resolves, since a screen kicks off the load on mount.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            query: String::new(),
            page: 1,
            view: DerivedView::default(),
            phase: Phase::Idle,
            next_ticket: 0,
            latest_ticket: None,
            last_error: None,
            last_fetched: None,
        }
    }

    pub fn begin_initial_load(&mut self) -> FetchTicket {
        self.phase = Phase::InitialLoading;
        self.issue(FetchKind::Initial)
    }

    /// Discards the search and the revealed pages, then starts a full refetch
    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.phase = Phase::Refreshing;
        self.query.clear();
        self.page = 1;
        self.recompute();
        self.issue(FetchKind::Refresh)
    }

    fn issue(&mut self, kind: FetchKind) -> FetchTicket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.latest_ticket = Some(id);
        FetchTicket { id, kind }
    }

    /// Applies a fetch outcome. Returns false when the ticket was superseded
    /// by a later fetch and the outcome was dropped.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Post>, FetchError>,
    ) -> bool {
        if self.latest_ticket != Some(ticket.id) {
            debug!(
                ticket = ticket.id,
                latest = ?self.latest_ticket,
                "discarding stale fetch result"
            );
            return false;
        }
        self.latest_ticket = None;

        match result {
            Ok(posts) => {
                info!(count = posts.len(), kind = ?ticket.kind, "loaded posts");
                self.items = posts;
                self.page = 1;
                self.last_error = None;
                self.last_fetched = Some(Utc::now());
                self.phase = if self.items.is_empty() {
                    Phase::Empty
                } else {
                    Phase::Success
                };
            }
            Err(e) => {
                let message = format!("{:#}", anyhow::Error::new(e));
                error!(error = %message, kind = ?ticket.kind, "error fetching posts");
                self.last_error = Some(message);
                self.phase = Phase::Error;
            }
        }

        self.recompute();
        true
    }

    pub async fn load_initial<S: PostSource + ?Sized>(&mut self, source: &S) {
        let ticket = self.begin_initial_load();
        let result = source.fetch_posts().await;
        self.complete_fetch(ticket, result);
    }

    pub async fn refresh<S: PostSource + ?Sized>(&mut self, source: &S) {
        let ticket = self.begin_refresh();
        let result = source.fetch_posts().await;
        self.complete_fetch(ticket, result);
    }

    /// Reveals the next page of already fetched posts. Silently does nothing
    /// while searching, when everything is shown, or before any data arrived.
    pub fn load_more(&mut self) {
        if self.is_loading_more()
            || !self.view.has_more
            || !self.query.trim().is_empty()
            || self.items.is_empty()
        {
            return;
        }

        let resume = self.phase;
        self.phase = Phase::LoadingMore;
        self.page += 1;
        self.recompute();
        debug!(page = self.page, visible = self.view.indices.len(), "revealed next page");
        self.phase = resume;
    }

    pub fn set_query(&mut self, text: impl Into<String>) {
        self.query = text.into();
        self.page = 1;
        self.recompute();
    }

    pub fn clear_query(&mut self) {
        self.set_query(String::new());
    }

    fn recompute(&mut self) {
        self.view = derive_view(&self.items, &self.query, self.page);
    }

    pub fn visible_items(&self) -> Vec<&Post> {
        self.view.indices.iter().map(|&i| &self.items[i]).collect()
    }

    pub fn visible_len(&self) -> usize {
        self.view.indices.len()
    }

    pub fn all_items(&self) -> &[Post] {
        &self.items
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.view.has_more
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_initial_loading(&self) -> bool {
        self.phase == Phase::InitialLoading
    }

    pub fn is_refreshing(&self) -> bool {
        self.phase == Phase::Refreshing
    }

    pub fn is_loading_more(&self) -> bool {
        self.phase == Phase::LoadingMore
    }

    pub fn is_searching(&self) -> bool {
        !self.query.trim().is_empty()
    }

    /// Number of hits for the active search, if any
    pub fn match_count(&self) -> Option<usize> {
        self.is_searching().then(|| self.view.indices.len())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched
    }

    pub fn empty_state(&self) -> Option<EmptyState> {
        if !self.view.indices.is_empty() {
            return None;
        }
        if matches!(
            self.phase,
            Phase::Idle | Phase::InitialLoading | Phase::Refreshing
        ) {
            Some(EmptyState::Loading)
        } else if self.is_searching() {
            Some(EmptyState::NoMatches {
                query: self.query.clone(),
            })
        } else {
            Some(EmptyState::NoPosts)
        }
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
