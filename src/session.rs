use futures::FutureExt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::feed::{FeedList, FetchTicket};
use crate::fetcher::{FetchError, PostSource};
use crate::models::Post;

struct Completion {
    ticket: FetchTicket,
    result: Result<Vec<Post>, FetchError>,
}

/// Drives a [`FeedList`] from an event loop: fetches run on the tokio
/// runtime while the list itself is only touched by the owner of the session.
///
/// Dropping the session aborts every fetch still in flight.
pub struct FeedSession {
    feed: FeedList,
    source: Arc<dyn PostSource>,
    handle: Handle,
    tasks: JoinSet<()>,
    /// Fetches spawned whose result has not been received yet
    pending: usize,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl FeedSession {
    pub fn new(feed: FeedList, source: Arc<dyn PostSource>, handle: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            feed,
            source,
            handle,
            tasks: JoinSet::new(),
            pending: 0,
            tx,
            rx,
        }
    }

    pub fn feed(&self) -> &FeedList {
        &self.feed
    }

    /// Mutable access for the synchronous operations (search, load more)
    pub fn feed_mut(&mut self) -> &mut FeedList {
        &mut self.feed
    }

    pub fn load_initial(&mut self) {
        let ticket = self.feed.begin_initial_load();
        self.spawn_fetch(ticket);
    }

    pub fn refresh(&mut self) {
        let ticket = self.feed.begin_refresh();
        self.spawn_fetch(ticket);
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        self.reap_finished();

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        self.tasks.spawn_on(
            async move {
                let result = source.fetch_posts().await;
                // Receiver only goes away with the session, which aborts us first
                let _ = tx.send(Completion { ticket, result });
            },
            &self.handle,
        );
        self.pending += 1;
        debug!(ticket = ticket.id(), in_flight = self.pending, "spawned fetch");
    }

    fn reap_finished(&mut self) {
        while let Some(Some(_)) = self.tasks.join_next().now_or_never() {}
    }

    /// Applies every completed fetch without waiting. Returns how many
    /// results were applied to the list.
    pub fn poll_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            self.pending -= 1;
            if self.feed.complete_fetch(completion.ticket, completion.result) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next fetch to finish and applies it. Returns whether the
    /// result was applied: false for a superseded fetch, and immediately
    /// false when nothing is in flight.
    pub async fn next_completion(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        match self.rx.recv().await {
            Some(completion) => {
                self.pending -= 1;
                self.feed.complete_fetch(completion.ticket, completion.result)
            }
            None => false,
        }
    }

    /// Number of fetches whose result has not been delivered to the list
    pub fn in_flight(&self) -> usize {
        self.pending
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        if self.pending > 0 {
            debug!(count = self.pending, "aborting in-flight fetches");
        }
        self.tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Phase;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{oneshot, Mutex};

    fn create_posts(count: i64) -> Vec<Post> {
        (1..=count)
            .map(|id| Post {
                author_id: 1,
                id,
                title: format!("Title {}", id),
                body: format!("Body {}", id),
            })
            .collect()
    }

    struct CountingSource {
        posts: Vec<Post>,
        calls: AtomicUsize,
    }

    impl PostSource for CountingSource {
        fn fetch_posts(&self) -> BoxFuture<'_, Result<Vec<Post>, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(self.posts.clone())).boxed()
        }
    }

    /// Each fetch waits on the next gate handed out by the test
    struct GatedSource {
        gates: Mutex<Vec<oneshot::Receiver<Vec<Post>>>>,
    }

    impl PostSource for GatedSource {
        fn fetch_posts(&self) -> BoxFuture<'_, Result<Vec<Post>, FetchError>> {
            async move {
                let gate = self.gates.lock().await.remove(0);
                Ok(gate.await.unwrap_or_default())
            }
            .boxed()
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct PendingSource {
        dropped: Arc<AtomicBool>,
    }

    impl PostSource for PendingSource {
        fn fetch_posts(&self) -> BoxFuture<'_, Result<Vec<Post>, FetchError>> {
            let flag = DropFlag(Arc::clone(&self.dropped));
            async move {
                let _flag = flag;
                futures::future::pending::<()>().await;
                Ok(Vec::new())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_load_initial_applies_result() {
        let source = Arc::new(CountingSource {
            posts: create_posts(45),
            calls: AtomicUsize::new(0),
        });
        let mut session = FeedSession::new(FeedList::new(), source.clone(), Handle::current());

        session.load_initial();
        assert!(session.feed().is_initial_loading());
        assert!(session.next_completion().await);

        assert_eq!(session.feed().phase(), Phase::Success);
        assert_eq!(session.feed().visible_len(), 20);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        session.feed_mut().load_more();
        assert_eq!(session.feed().visible_len(), 40);
        // Revealing pages never goes back to the network
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_completions_does_not_block() {
        let (tx, rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            gates: Mutex::new(vec![rx]),
        });
        let mut session = FeedSession::new(FeedList::new(), source, Handle::current());

        session.load_initial();
        assert_eq!(session.poll_completions(), 0);
        assert!(session.feed().is_initial_loading());

        tx.send(create_posts(3)).unwrap();
        assert!(session.next_completion().await);
        assert_eq!(session.feed().visible_len(), 3);
        assert_eq!(session.poll_completions(), 0);
    }

    #[tokio::test]
    async fn test_refresh_during_initial_load_keeps_latest() {
        let (initial_tx, initial_rx) = oneshot::channel();
        let (refresh_tx, refresh_rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            gates: Mutex::new(vec![initial_rx, refresh_rx]),
        });
        let mut session = FeedSession::new(FeedList::new(), source, Handle::current());

        session.load_initial();
        // Let the first fetch claim its gate before the refresh is issued
        tokio::task::yield_now().await;
        session.refresh();
        assert!(session.feed().is_refreshing());

        refresh_tx.send(create_posts(8)).unwrap();
        assert!(session.next_completion().await);
        initial_tx.send(create_posts(60)).unwrap();
        assert!(!session.next_completion().await);

        assert_eq!(session.feed().all_items().len(), 8);
        assert_eq!(session.feed().phase(), Phase::Success);
    }

    #[tokio::test]
    async fn test_drop_aborts_in_flight_fetch() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = Arc::new(PendingSource {
            dropped: Arc::clone(&dropped),
        });
        let mut session = FeedSession::new(FeedList::new(), source, Handle::current());
        session.load_initial();
        assert_eq!(session.in_flight(), 1);

        // Let the fetch start so there is something to abort
        tokio::task::yield_now().await;
        assert!(!dropped.load(Ordering::SeqCst));

        drop(session);
        for _ in 0..10 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_in_flight_counts_undelivered_fetches() {
        let (initial_tx, initial_rx) = oneshot::channel();
        let (refresh_tx, refresh_rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            gates: Mutex::new(vec![initial_rx, refresh_rx]),
        });
        let mut session = FeedSession::new(FeedList::new(), source, Handle::current());
        assert_eq!(session.in_flight(), 0);

        session.load_initial();
        tokio::task::yield_now().await;
        session.refresh();
        assert_eq!(session.in_flight(), 2);

        refresh_tx.send(create_posts(2)).unwrap();
        assert!(session.next_completion().await);
        assert_eq!(session.in_flight(), 1);

        initial_tx.send(create_posts(4)).unwrap();
        assert!(!session.next_completion().await);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.poll_completions(), 0);
    }

    #[tokio::test]
    async fn test_next_completion_returns_when_idle() {
        let source = Arc::new(CountingSource {
            posts: create_posts(1),
            calls: AtomicUsize::new(0),
        });
        let mut session = FeedSession::new(FeedList::new(), source, Handle::current());
        assert!(!session.next_completion().await);

        session.load_initial();
        assert!(session.next_completion().await);
        assert_eq!(session.in_flight(), 0);
        assert!(!session.next_completion().await);
    }
}
