//! Scroll-triggered pager.
//!
//! Watches a single sentinel (the "load more" row at the end of the list) and
//! asks the merger for the next page when it becomes visible.

use tracing::debug;

use crate::merger::{PageOutcome, PageRequest, RequestTag, ResultMerger};

/// Pager states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    /// Ready to request the next page.
    Idle,
    /// A request is in flight.
    Loading,
    /// The current context has no more records.
    Exhausted,
}

/// State machine driving infinite scroll.
#[derive(Debug)]
pub struct Pager {
    state: PagerState,
    in_flight: Option<RequestTag>,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager {
    /// Idle pager with nothing in flight.
    pub fn new() -> Self {
        Self {
            state: PagerState::Idle,
            in_flight: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> PagerState {
        self.state
    }

    /// True while a tracked request is in flight.
    pub fn is_loading(&self) -> bool {
        self.state == PagerState::Loading
    }

    /// True once the current context ran out of records.
    pub fn is_exhausted(&self) -> bool {
        self.state == PagerState::Exhausted
    }

    /// Record a request issued by anyone (search, tab switch, reset or the
    /// pager itself). A request for a different context lifts exhaustion.
    pub fn track(&mut self, request: &PageRequest) {
        if let Some(previous) = &self.in_flight {
            if previous.context != request.tag.context || previous.epoch != request.tag.epoch {
                self.on_context_change();
            }
        }
        self.in_flight = Some(request.tag.clone());
        self.state = PagerState::Loading;
    }

    /// Sentinel became visible: request the page after the merger's current one.
    pub fn on_sentinel_visible(&mut self, merger: &mut ResultMerger) -> Option<PageRequest> {
        if self.state != PagerState::Idle {
            return None;
        }
        // A context whose first page never arrived starts over at page 1.
        let (context, next) = if merger.requested_context() != merger.context() {
            (merger.requested_context().clone(), 1)
        } else if !merger.has_applied_page() {
            (merger.context().clone(), 1)
        } else {
            (merger.context().clone(), merger.current_page() + 1)
        };
        let request = merger.begin(context.source, &context.search, next);
        debug!(page = next, source = %context.source, "sentinel visible; loading next page");
        self.track(&request);
        Some(request)
    }

    /// A response for `tag` was applied with `outcome`.
    ///
    /// Only the tracked request moves the pager; anything else is ignored.
    pub fn on_outcome(&mut self, tag: &RequestTag, outcome: &PageOutcome) {
        if self.in_flight.as_ref() != Some(tag) {
            return;
        }
        self.in_flight = None;
        self.state = match outcome {
            PageOutcome::Exhausted(_) => PagerState::Exhausted,
            PageOutcome::Merged(_) | PageOutcome::Failed(_) | PageOutcome::Stale => {
                PagerState::Idle
            }
        };
    }

    /// New search, new source or a local mutation: exhaustion no longer applies.
    pub fn on_context_change(&mut self) {
        self.in_flight = None;
        self.state = PagerState::Idle;
    }
}
