//! Pagination over esearch/efetch.
//!
//! A run alternates between one search request (a page of identifiers) and one
//! fetch request (the GenBank records behind those identifiers) until every page
//! of the result set has been fetched or a stage fails:
//!
//! ```text
//! Idle -> Searching -> Fetching -> Searching (next page)
//!                  \            \-> Finished
//!                   \-> Finished (empty page on the last offset)
//! any stage -> Failed
//! ```
//!
//! Every transition is a synchronous handler on [`QueryController`]; [`QueryController::run`]
//! only performs the requests and hands each decoded reply to the matching handler.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Endpoint, QueryConfig};
use crate::efetch::{FetchResult, SequenceRecord};
use crate::error::QueryError;
use crate::esearch::SearchResult;
use crate::ncbi::{EutilsResponse, EutilsTransport, EutilsUrls};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPhase {
    Idle,
    Searching { offset: u64 },
    Fetching { offset: u64 },
    Finished,
    Failed,
}

impl QueryPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryPhase::Finished | QueryPhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Search,
    Fetch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Search => write!(f, "search"),
            Stage::Fetch => write!(f, "fetch"),
        }
    }
}

/// A value that can be written once; later writes are refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOnce<T>(Option<T>);

impl<T: Copy> SetOnce<T> {
    pub fn get(&self) -> Option<T> {
        self.0
    }

    /// Returns `false` and leaves the stored value alone when already set.
    pub fn set(&mut self, value: T) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(value);
        true
    }
}

/// Mutable state of one run, owned by the controller.
#[derive(Debug, Clone)]
pub struct QueryState {
    query: QueryConfig,
    total_count: SetOnce<u64>,
    next_offset: u64,
    pending_identifiers: Vec<u64>,
    records_processed: u64,
    done: bool,
}

impl QueryState {
    pub fn new(query: QueryConfig) -> Self {
        Self {
            query,
            total_count: SetOnce::default(),
            next_offset: 0,
            pending_identifiers: Vec::new(),
            records_processed: 0,
            done: false,
        }
    }

    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count.get()
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn pending_identifiers(&self) -> &[u64] {
        &self.pending_identifiers
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn page_size(&self) -> u64 {
        self.query.page_size.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueryEvent {
    SearchIssued {
        offset: u64,
    },
    SearchCompleted {
        offset: u64,
        count: u64,
        identifiers: usize,
    },
    FetchIssued {
        offset: u64,
        identifiers: usize,
    },
    PageCompleted {
        offset: u64,
        records: u64,
        processed: u64,
        total: u64,
    },
    Finished {
        processed: u64,
        total: u64,
    },
    Failed {
        stage: Stage,
        message: String,
    },
}

/// Receives progress and the records decoded from each fetch.
pub trait QuerySink {
    fn event(&self, event: QueryEvent);

    fn record(&self, _record: &SequenceRecord) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub phase: QueryPhase,
    pub total_count: Option<u64>,
    pub records_processed: u64,
    pub pages_searched: u64,
    /// `records_processed == total_count` at the end of a finished run.
    pub complete: bool,
    pub error: Option<String>,
}

pub struct QueryController<T: EutilsTransport> {
    transport: T,
    urls: EutilsUrls,
    state: QueryState,
    phase: QueryPhase,
    pages_searched: u64,
    last_error: Option<String>,
}

impl<T: EutilsTransport> QueryController<T> {
    pub fn new(transport: T, query: QueryConfig, endpoint: Endpoint) -> Self {
        Self {
            transport,
            urls: EutilsUrls::new(endpoint),
            state: QueryState::new(query),
            phase: QueryPhase::Idle,
            pages_searched: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn phase(&self) -> QueryPhase {
        self.phase
    }

    /// Idle -> Searching at `offset` (0 for a fresh run). Ignored once started.
    pub fn start(&mut self, offset: u64) -> QueryPhase {
        if self.phase != QueryPhase::Idle {
            warn!(phase = ?self.phase, "query already started");
            return self.phase;
        }
        self.state.next_offset = offset;
        self.phase = QueryPhase::Searching { offset };
        self.phase
    }

    /// Searching -> Fetching, or straight to the page check when the page is empty.
    pub fn on_search_result(&mut self, result: SearchResult) -> QueryPhase {
        if !matches!(self.phase, QueryPhase::Searching { .. }) {
            warn!(phase = ?self.phase, "search result outside the searching phase, ignored");
            return self.phase;
        }
        if !self.state.total_count.set(result.count) {
            let total = self.state.total_count.get().unwrap_or_default();
            if total != result.count {
                debug!(total, reported = result.count, "server count changed, keeping first");
            }
        }
        if result.offset != self.state.next_offset {
            debug!(
                expected = self.state.next_offset,
                echoed = result.offset,
                "RetStart differs from requested offset"
            );
        }

        self.state.pending_identifiers = result.identifiers;
        if self.state.pending_identifiers.is_empty() {
            debug!(offset = self.state.next_offset, "empty page, nothing to fetch");
            return self.advance();
        }
        self.phase = QueryPhase::Fetching {
            offset: self.state.next_offset,
        };
        self.phase
    }

    /// Fetching -> Searching (next page) or Finished.
    pub fn on_fetch_result(&mut self, result: &FetchResult) -> QueryPhase {
        if !matches!(self.phase, QueryPhase::Fetching { .. }) {
            warn!(phase = ?self.phase, "fetch result outside the fetching phase, ignored");
            return self.phase;
        }
        self.state.records_processed += result.record_count;
        self.advance()
    }

    /// Any non-terminal phase -> Failed. No request is issued afterwards.
    pub fn on_failure(&mut self, stage: Stage, err: &QueryError) -> QueryPhase {
        if self.phase.is_terminal() {
            warn!(phase = ?self.phase, %stage, "failure after the run ended, ignored: {err}");
            return self.phase;
        }
        let kind = if err.is_transport() { "transport" } else { "decode" };
        error!(
            %stage,
            kind,
            offset = self.state.next_offset,
            processed = self.state.records_processed,
            "{err}"
        );
        self.last_error = Some(err.to_string());
        self.phase = QueryPhase::Failed;
        self.phase
    }

    fn advance(&mut self) -> QueryPhase {
        let total = self.state.total_count.get().unwrap_or_default();
        let page_size = self.state.page_size();
        // An offset past u64::MAX cannot name another page.
        let next = self.state.next_offset.checked_add(page_size);
        if let Some(next) = next.filter(|next| *next < total) {
            self.state.next_offset = next;
            self.phase = QueryPhase::Searching {
                offset: self.state.next_offset,
            };
            return self.phase;
        }

        self.state.done = true;
        self.phase = QueryPhase::Finished;
        if self.state.records_processed == total {
            info!(processed = self.state.records_processed, total, "all records fetched");
        } else {
            warn!(
                processed = self.state.records_processed,
                total, "result set exhausted before every counted record was fetched"
            );
        }
        self.phase
    }

    /// Identifiers for the fetch about to be issued; the pending batch is left empty.
    fn take_pending(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.state.pending_identifiers)
    }

    pub async fn run(&mut self, start_offset: u64, sink: &dyn QuerySink) -> RunSummary {
        let mut phase = self.start(start_offset);
        while !phase.is_terminal() {
            phase = match phase {
                QueryPhase::Searching { offset } => self.search(offset, sink).await,
                QueryPhase::Fetching { offset } => self.fetch(offset, sink).await,
                QueryPhase::Idle | QueryPhase::Finished | QueryPhase::Failed => break,
            };
        }

        let summary = self.summary();
        if summary.phase == QueryPhase::Finished {
            sink.event(QueryEvent::Finished {
                processed: summary.records_processed,
                total: summary.total_count.unwrap_or_default(),
            });
        }
        summary
    }

    async fn search(&mut self, offset: u64, sink: &dyn QuerySink) -> QueryPhase {
        let url = match self.urls.search(self.state.query(), offset) {
            Ok(url) => url,
            Err(err) => return self.fail(Stage::Search, err, sink),
        };
        debug!(%url, "esearch");
        sink.event(QueryEvent::SearchIssued { offset });
        self.pages_searched += 1;

        let outcome = self
            .transport
            .get(url.as_str())
            .await
            .and_then(EutilsResponse::into_body)
            .and_then(|body| SearchResult::parse(&body));

        match outcome {
            Ok(result) => {
                sink.event(QueryEvent::SearchCompleted {
                    offset,
                    count: result.count,
                    identifiers: result.identifiers.len(),
                });
                self.on_search_result(result)
            }
            Err(err) => self.fail(Stage::Search, err, sink),
        }
    }

    async fn fetch(&mut self, offset: u64, sink: &dyn QuerySink) -> QueryPhase {
        let identifiers = self.take_pending();
        let url = match self.urls.fetch(self.state.query(), &identifiers) {
            Ok(url) => url,
            Err(err) => return self.fail(Stage::Fetch, err, sink),
        };
        debug!(%url, "efetch");
        sink.event(QueryEvent::FetchIssued {
            offset,
            identifiers: identifiers.len(),
        });

        let outcome = self
            .transport
            .get(url.as_str())
            .await
            .and_then(EutilsResponse::into_body)
            .and_then(|body| FetchResult::parse(&body));

        match outcome {
            Ok(result) => {
                for record in &result.records {
                    sink.record(record);
                }
                let phase = self.on_fetch_result(&result);
                sink.event(QueryEvent::PageCompleted {
                    offset,
                    records: result.record_count,
                    processed: self.state.records_processed,
                    total: self.state.total_count().unwrap_or_default(),
                });
                phase
            }
            Err(err) => self.fail(Stage::Fetch, err, sink),
        }
    }

    fn fail(&mut self, stage: Stage, err: QueryError, sink: &dyn QuerySink) -> QueryPhase {
        let phase = self.on_failure(stage, &err);
        sink.event(QueryEvent::Failed {
            stage,
            message: err.to_string(),
        });
        phase
    }

    pub fn summary(&self) -> RunSummary {
        let total_count = self.state.total_count();
        RunSummary {
            phase: self.phase,
            total_count,
            records_processed: self.state.records_processed,
            pages_searched: self.pages_searched,
            complete: self.phase == QueryPhase::Finished
                && Some(self.state.records_processed) == total_count,
            error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unused;

    impl EutilsTransport for Unused {
        async fn get(&self, _url: &str) -> Result<EutilsResponse, QueryError> {
            Err(QueryError::EutilsHttp("not wired".to_string()))
        }
    }

    fn controller(page_size: u64) -> QueryController<Unused> {
        let query = QueryConfig::new("Idotea".parse().unwrap(), "COI".parse().unwrap())
            .with_page_size(crate::domain::PageSize::new(page_size).unwrap());
        QueryController::new(Unused, query, Endpoint::default())
    }

    fn page(count: u64, offset: u64, ids: &[u64]) -> SearchResult {
        SearchResult {
            count,
            page_size: ids.len() as u64,
            offset,
            identifiers: ids.to_vec(),
        }
    }

    fn fetched(records: u64) -> FetchResult {
        FetchResult {
            record_count: records,
            records: vec![SequenceRecord::default(); records as usize],
        }
    }

    #[test]
    fn set_once_refuses_second_write() {
        let mut value = SetOnce::default();
        assert!(value.set(10));
        assert!(!value.set(20));
        assert_eq!(value.get(), Some(10));
    }

    #[test]
    fn total_count_is_kept_from_first_page() {
        let mut ctl = controller(2);
        ctl.start(0);
        ctl.on_search_result(page(4, 0, &[1, 2]));
        ctl.on_fetch_result(&fetched(2));
        ctl.on_search_result(page(7, 2, &[3, 4]));
        assert_eq!(ctl.state().total_count(), Some(4));
    }

    #[test]
    fn empty_last_page_finishes() {
        let mut ctl = controller(20);
        ctl.start(0);
        assert_eq!(ctl.on_search_result(page(0, 0, &[])), QueryPhase::Finished);
        assert!(ctl.state().is_done());
        assert!(ctl.summary().complete);
    }

    #[test]
    fn empty_middle_page_moves_on() {
        let mut ctl = controller(20);
        ctl.start(0);
        assert_eq!(
            ctl.on_search_result(page(30, 0, &[])),
            QueryPhase::Searching { offset: 20 }
        );
    }

    #[test]
    fn offset_near_the_limit_finishes() {
        let mut ctl = controller(20);
        ctl.start(u64::MAX - 5);
        assert_eq!(ctl.on_search_result(page(10, u64::MAX - 5, &[])), QueryPhase::Finished);
        assert!(ctl.state().is_done());
    }

    #[test]
    fn fetch_result_after_failure_is_ignored() {
        let mut ctl = controller(2);
        ctl.start(0);
        ctl.on_search_result(page(4, 0, &[1, 2]));
        let err = QueryError::EutilsHttp("connection reset".to_string());
        assert_eq!(ctl.on_failure(Stage::Fetch, &err), QueryPhase::Failed);

        assert_eq!(ctl.on_fetch_result(&fetched(2)), QueryPhase::Failed);
        assert_eq!(ctl.state().records_processed(), 0);
        assert_eq!(ctl.phase(), QueryPhase::Failed);
    }

    #[test]
    fn search_result_after_failure_is_ignored() {
        let mut ctl = controller(2);
        ctl.start(0);
        let err = QueryError::xml("eSearchResult", "premature end of document");
        ctl.on_failure(Stage::Search, &err);

        assert_eq!(ctl.on_search_result(page(4, 0, &[1, 2])), QueryPhase::Failed);
        assert_eq!(ctl.state().total_count(), None);
        assert!(ctl.state().pending_identifiers().is_empty());
    }

    #[test]
    fn finished_run_stays_finished() {
        let mut ctl = controller(20);
        ctl.start(0);
        ctl.on_search_result(page(0, 0, &[]));

        assert_eq!(ctl.on_fetch_result(&fetched(3)), QueryPhase::Finished);
        assert_eq!(ctl.on_search_result(page(5, 0, &[1])), QueryPhase::Finished);
        let err = QueryError::EutilsHttp("late".to_string());
        assert_eq!(ctl.on_failure(Stage::Search, &err), QueryPhase::Finished);
        assert_eq!(ctl.state().records_processed(), 0);
        assert_eq!(ctl.summary().error, None);
    }

    #[test]
    fn handlers_out_of_order_are_ignored() {
        let mut ctl = controller(20);
        assert_eq!(ctl.on_fetch_result(&fetched(1)), QueryPhase::Idle);
        ctl.start(0);
        assert_eq!(
            ctl.on_fetch_result(&fetched(1)),
            QueryPhase::Searching { offset: 0 }
        );
        assert_eq!(ctl.state().records_processed(), 0);
    }

    #[test]
    fn start_twice_is_ignored() {
        let mut ctl = controller(20);
        ctl.start(0);
        assert_eq!(ctl.start(40), QueryPhase::Searching { offset: 0 });
    }
}
