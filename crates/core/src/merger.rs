//! Incremental result merger.
//!
//! Owns the accumulated list of games for the active context and is the only
//! place that list changes. Each outgoing page request carries a [`RequestTag`];
//! a response is applied only when its tag belongs to the current epoch, so a
//! late answer for a superseded search, source or reset is dropped on arrival.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::CatalogError,
    models::{Context, Game, Source},
    source::Sources,
    validate::validate_page,
};

/// Identifies the context an outgoing request was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    /// Merger epoch at issue time.
    pub epoch: u64,
    /// Source and search the page belongs to.
    pub context: Context,
    /// Requested page, 1-based.
    pub page: u32,
}

/// A tagged page request waiting to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Tag to hand back with the response.
    pub tag: RequestTag,
}

/// Raw result of fetching a [`PageRequest`].
#[derive(Debug)]
pub struct PageResponse {
    /// Tag of the originating request.
    pub tag: RequestTag,
    /// Raw records, or the normalized transport failure.
    pub result: Result<Vec<Value>, CatalogError>,
}

/// Counts describing one applied page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Whether the accumulated list was replaced rather than extended.
    pub replaced: bool,
    /// Games that became part of the list.
    pub added: usize,
    /// Valid games skipped because their id was already present.
    pub duplicates: usize,
    /// Records dropped by validation.
    pub rejected: usize,
}

/// What happened when a response was applied.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// The page was merged into the list.
    Merged(MergeReport),
    /// The local store has no further records for this context.
    Exhausted(MergeReport),
    /// The response belonged to a superseded context and was ignored.
    Stale,
    /// The source failed; the list was left as it was.
    Failed(CatalogError),
}

impl PageOutcome {
    /// Exhaustion marker for the pager.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Merge counts, when the page was applied.
    pub fn report(&self) -> Option<&MergeReport> {
        match self {
            Self::Merged(report) | Self::Exhausted(report) => Some(report),
            Self::Stale | Self::Failed(_) => None,
        }
    }

    /// Express an applied outcome as a result, mapping exhaustion to
    /// [`CatalogError::NotFoundExhausted`]. Stale outcomes yield `None`.
    pub fn into_result(self) -> Option<Result<MergeReport, CatalogError>> {
        match self {
            Self::Merged(report) => Some(Ok(report)),
            Self::Exhausted(_) => Some(Err(CatalogError::NotFoundExhausted)),
            Self::Stale => None,
            Self::Failed(err) => Some(Err(err)),
        }
    }
}

/// Accumulated results for the active context.
#[derive(Debug)]
pub struct ResultMerger {
    accumulated: Vec<Game>,
    current_page: u32,
    page_applied: bool,
    active: Context,
    requested: Context,
    epoch: u64,
    last_error: Option<CatalogError>,
    rejected_total: usize,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self::new(Source::Remote)
    }
}

impl ResultMerger {
    /// Empty merger whose active context is `source` with no search.
    pub fn new(source: Source) -> Self {
        let context = Context::new(source, "");
        Self {
            accumulated: Vec::new(),
            current_page: 1,
            page_applied: false,
            active: context.clone(),
            requested: context,
            epoch: 0,
            last_error: None,
            rejected_total: 0,
        }
    }

    /// Games in first-seen order.
    pub fn games(&self) -> &[Game] {
        &self.accumulated
    }

    /// Number of accumulated games.
    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    /// True when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    /// Last page applied for the active context.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Whether a page of the active context has been applied since the last
    /// context switch or reset. An applied page may still have added nothing.
    pub fn has_applied_page(&self) -> bool {
        self.page_applied
    }

    /// Context of the accumulated list.
    pub fn context(&self) -> &Context {
        &self.active
    }

    /// Context of the most recent request, which may still be in flight.
    pub fn requested_context(&self) -> &Context {
        &self.requested
    }

    /// Source of the accumulated list.
    pub fn active_source(&self) -> Source {
        self.active.source
    }

    /// Search term of the accumulated list.
    pub fn active_search(&self) -> &str {
        &self.active.search
    }

    /// Failure of the most recent request, cleared by the next successful page.
    pub fn last_error(&self) -> Option<&CatalogError> {
        self.last_error.as_ref()
    }

    /// Records dropped by validation since the merger was created.
    pub fn rejected_total(&self) -> usize {
        self.rejected_total
    }

    /// Tag an outgoing request for `page` of `(source, search)`.
    ///
    /// Asking for a context other than the last requested one moves to a new
    /// epoch, which turns every older in-flight response stale.
    pub fn begin(&mut self, source: Source, search: &str, page: u32) -> PageRequest {
        let context = Context::new(source, search);
        if context != self.requested {
            self.epoch += 1;
            debug!(epoch = self.epoch, %source, search, "context switched");
            self.requested = context.clone();
            self.page_applied = false;
        }
        PageRequest {
            tag: RequestTag {
                epoch: self.epoch,
                context,
                page: page.max(1),
            },
        }
    }

    /// Reconcile a fetched page into the accumulated list.
    pub fn apply(&mut self, response: PageResponse) -> PageOutcome {
        let PageResponse { tag, result } = response;
        if tag.epoch != self.epoch {
            debug!(
                tag_epoch = tag.epoch,
                epoch = self.epoch,
                page = tag.page,
                "discarding stale page"
            );
            return PageOutcome::Stale;
        }

        let records = match result {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, page = tag.page, "page request failed; keeping current results");
                self.last_error = Some(err.clone());
                return PageOutcome::Failed(err);
            }
        };

        let page = validate_page(records);
        let rejected = page.rejected.len();
        self.rejected_total += rejected;

        let replace = tag.context != self.active || self.accumulated.is_empty();
        let mut report = MergeReport {
            replaced: replace,
            rejected,
            ..MergeReport::default()
        };
        let valid = page.games.len();

        let mut seen: HashSet<i64> = if replace {
            self.accumulated.clear();
            HashSet::new()
        } else {
            self.accumulated.iter().map(|game| game.id).collect()
        };
        for game in page.games {
            if seen.insert(game.id) {
                self.accumulated.push(game);
                report.added += 1;
            } else {
                report.duplicates += 1;
            }
        }

        self.active = tag.context;
        self.current_page = tag.page;
        self.page_applied = true;
        self.last_error = None;

        info!(
            source = %self.active.source,
            search = %self.active.search,
            page = self.current_page,
            added = report.added,
            duplicates = report.duplicates,
            rejected,
            total = self.accumulated.len(),
            "page merged"
        );

        if valid == 0 && self.active.source == Source::Local {
            return PageOutcome::Exhausted(report);
        }
        PageOutcome::Merged(report)
    }

    /// Reset after a local create, update or delete.
    ///
    /// Clears the list, returns to page 1 and hands back the request that
    /// refetches the active context. Responses issued before the reset become
    /// stale.
    pub fn notify_mutation(&mut self) -> PageRequest {
        self.epoch += 1;
        self.accumulated.clear();
        self.current_page = 1;
        self.page_applied = false;
        self.last_error = None;
        let context = self.requested.clone();
        info!(source = %context.source, search = %context.search, "collection changed; reloading");
        self.begin(context.source, &context.search, 1)
    }

    /// Fetch and apply one page.
    pub async fn request_page(
        &mut self,
        sources: &Sources,
        source: Source,
        search: &str,
        page: u32,
    ) -> PageOutcome {
        let request = self.begin(source, search, page);
        let response = sources.fetch(request).await;
        self.apply(response)
    }

    /// [`ResultMerger::notify_mutation`] followed by the refetch.
    pub async fn refresh_after_mutation(&mut self, sources: &Sources) -> PageOutcome {
        let request = self.notify_mutation();
        let response = sources.fetch(request).await;
        self.apply(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::source::{LocalStore, MemoryStore};

    fn record(id: i64, name: &str) -> Value {
        json!({
            "id": id,
            "slug": format!("game-{id}"),
            "name": name,
            "released": "2021-06-11",
            "background_image": "",
            "rating": 3.5,
            "rating_top": 5,
            "platforms": []
        })
    }

    fn page_of(ids: &[i64]) -> Vec<Value> {
        ids.iter().map(|id| record(*id, &format!("Game {id}"))).collect()
    }

    fn ids(merger: &ResultMerger) -> Vec<i64> {
        merger.games().iter().map(|game| game.id).collect()
    }

    fn respond(request: PageRequest, records: Vec<Value>) -> PageResponse {
        PageResponse {
            tag: request.tag,
            result: Ok(records),
        }
    }

    #[test]
    fn appends_new_ids_in_first_seen_order() {
        let mut merger = ResultMerger::new(Source::Remote);
        let first = merger.begin(Source::Remote, "", 1);
        merger.apply(respond(first, page_of(&[1, 2, 3])));
        let second = merger.begin(Source::Remote, "", 2);
        let outcome = merger.apply(respond(second, page_of(&[3, 4, 5])));

        assert_eq!(ids(&merger), vec![1, 2, 3, 4, 5]);
        assert_eq!(merger.current_page(), 2);
        let report = outcome.report().copied().unwrap();
        assert!(!report.replaced);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn never_holds_duplicate_ids_across_many_pages() {
        let mut merger = ResultMerger::new(Source::Remote);
        for page in 1..=6u32 {
            let base = i64::from(page) * 2;
            let request = merger.begin(Source::Remote, "zelda", page);
            merger.apply(respond(request, page_of(&[base - 1, base, base + 1, base])));
        }
        let seen = ids(&merger);
        let unique: HashSet<i64> = seen.iter().copied().collect();
        assert_eq!(seen.len(), unique.len());
        assert_eq!(seen, (1..=13).collect::<Vec<_>>());
    }

    #[test]
    fn search_change_replaces_results() {
        let mut merger = ResultMerger::new(Source::Remote);
        let request = merger.begin(Source::Remote, "a", 1);
        merger.apply(respond(request, page_of(&[1, 2, 3])));

        let request = merger.begin(Source::Remote, "b", 1);
        let outcome = merger.apply(respond(request, page_of(&[9, 10])));

        assert_eq!(ids(&merger), vec![9, 10]);
        assert_eq!(merger.active_search(), "b");
        assert!(outcome.report().unwrap().replaced);
    }

    #[test]
    fn source_change_replaces_results() {
        let mut merger = ResultMerger::new(Source::Remote);
        let request = merger.begin(Source::Remote, "", 1);
        merger.apply(respond(request, page_of(&[1, 2])));

        let request = merger.begin(Source::Local, "", 1);
        merger.apply(respond(request, page_of(&[2, 7])));
        assert_eq!(ids(&merger), vec![2, 7]);
        assert_eq!(merger.active_source(), Source::Local);
    }

    #[test]
    fn invalid_records_are_dropped_and_counted() {
        let mut merger = ResultMerger::new(Source::Remote);
        let mut records = page_of(&[1, 2, 3]);
        records[1]["rating"] = json!("n/a");
        let request = merger.begin(Source::Remote, "", 1);
        let outcome = merger.apply(respond(request, records));

        assert_eq!(ids(&merger), vec![1, 3]);
        assert_eq!(outcome.report().unwrap().rejected, 1);
        assert_eq!(merger.rejected_total(), 1);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut merger = ResultMerger::new(Source::Remote);
        let old = merger.begin(Source::Remote, "a", 1);
        let new = merger.begin(Source::Remote, "b", 1);

        merger.apply(respond(new, page_of(&[9])));
        let outcome = merger.apply(respond(old, page_of(&[1, 2])));

        assert!(matches!(outcome, PageOutcome::Stale));
        assert_eq!(ids(&merger), vec![9]);
        assert_eq!(merger.active_search(), "b");
    }

    #[test]
    fn failure_keeps_stale_data_and_page() {
        let mut merger = ResultMerger::new(Source::Remote);
        let request = merger.begin(Source::Remote, "", 1);
        merger.apply(respond(request, page_of(&[1, 2])));

        let request = merger.begin(Source::Remote, "", 2);
        let outcome = merger.apply(PageResponse {
            tag: request.tag,
            result: Err(CatalogError::unavailable(Source::Remote, "timeout")),
        });

        assert!(matches!(outcome, PageOutcome::Failed(_)));
        assert_eq!(ids(&merger), vec![1, 2]);
        assert_eq!(merger.current_page(), 1);
        assert!(merger.last_error().is_some());

        let retry = merger.begin(Source::Remote, "", 2);
        merger.apply(respond(retry, page_of(&[3])));
        assert!(merger.last_error().is_none());
        assert_eq!(ids(&merger), vec![1, 2, 3]);
    }

    #[test]
    fn empty_local_page_signals_exhaustion() {
        let mut merger = ResultMerger::new(Source::Local);
        let request = merger.begin(Source::Local, "", 1);
        merger.apply(respond(request, page_of(&[1])));

        let request = merger.begin(Source::Local, "", 2);
        let outcome = merger.apply(respond(request, Vec::new()));
        assert!(outcome.is_exhausted());
        assert!(matches!(
            outcome.into_result(),
            Some(Err(CatalogError::NotFoundExhausted))
        ));
        assert_eq!(ids(&merger), vec![1]);

        let request = merger.begin(Source::Remote, "", 1);
        let outcome = merger.apply(respond(request, Vec::new()));
        assert!(!outcome.is_exhausted());
    }

    #[test]
    fn stale_outcome_has_no_result() {
        let mut merger = ResultMerger::new(Source::Remote);
        let old = merger.begin(Source::Remote, "a", 1);
        merger.begin(Source::Remote, "b", 1);
        let outcome = merger.apply(respond(old, page_of(&[1])));
        assert!(outcome.into_result().is_none());
        assert!(merger.is_empty());
    }

    #[test]
    fn applied_page_is_tracked_per_context() {
        let mut merger = ResultMerger::new(Source::Remote);
        assert!(!merger.has_applied_page());

        let request = merger.begin(Source::Remote, "", 1);
        merger.apply(respond(request, Vec::new()));
        assert!(merger.has_applied_page());
        assert!(merger.is_empty());

        merger.begin(Source::Remote, "zelda", 1);
        assert!(!merger.has_applied_page());

        let request = merger.begin(Source::Remote, "zelda", 1);
        merger.apply(respond(request, page_of(&[4])));
        assert!(merger.has_applied_page());
        merger.notify_mutation();
        assert!(!merger.has_applied_page());
    }

    #[test]
    fn mutation_resets_to_first_page() {
        let mut merger = ResultMerger::new(Source::Local);
        for page in 1..=2 {
            let request = merger.begin(Source::Local, "", page);
            merger.apply(respond(request, page_of(&[i64::from(page)])));
        }
        let in_flight = merger.begin(Source::Local, "", 3);

        let refetch = merger.notify_mutation();
        assert!(merger.is_empty());
        assert_eq!(merger.current_page(), 1);
        assert_eq!(refetch.tag.page, 1);
        assert_eq!(refetch.tag.context, Context::new(Source::Local, ""));

        assert!(matches!(
            merger.apply(respond(in_flight, page_of(&[3]))),
            PageOutcome::Stale
        ));
        merger.apply(respond(refetch, page_of(&[1, 2, 3])));
        assert_eq!(ids(&merger), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn request_page_and_refresh_go_through_sources() {
        let remote = MemoryStore::with_records(Source::Remote, 2, page_of(&[1, 2, 3]));
        let local = MemoryStore::new(Source::Local, 2);
        let sources = Sources::new(Arc::new(remote.clone()), Arc::new(local.clone()));

        let mut merger = ResultMerger::new(Source::Remote);
        merger.request_page(&sources, Source::Remote, "", 1).await;
        merger.request_page(&sources, Source::Remote, "", 2).await;
        assert_eq!(ids(&merger), vec![1, 2, 3]);

        let outcome = merger.request_page(&sources, Source::Local, "", 1).await;
        assert!(outcome.is_exhausted());
        assert!(merger.is_empty());

        let game = merger_game(&remote).await;
        local.create(game).await.unwrap();
        let outcome = merger.refresh_after_mutation(&sources).await;
        assert!(matches!(outcome, PageOutcome::Merged(_)));
        assert_eq!(ids(&merger), vec![1]);
        assert_eq!(local.fetches(), vec![(String::new(), 1), (String::new(), 1)]);
    }

    async fn merger_game(remote: &MemoryStore) -> Game {
        use crate::source::GameSource;
        let raw = remote.fetch_page("", 1).await.unwrap();
        crate::validate::validate_record(&raw[0]).unwrap()
    }
}
