//! Action log engine
//!
//! Holds the ingested window of bot-taken actions and derives filtered,
//! sorted, paginated views plus status aggregates. The working set is only
//! ever replaced wholesale by ingestion or emptied by a confirmed clear;
//! there is no incremental merge, so overlapping fetch windows cannot
//! duplicate or reorder entries. Views are pure functions of
//! (log, filter, sort, page, page_size).

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, BackendApi};
use crate::types::{ActionRecord, ActionStatus};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Sort direction over the record timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    Oldest,
}

/// Filter over the working set. `None` status/type means "all".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub status: Option<ActionStatus>,
    pub action_type: Option<String>,
    /// Case-insensitive substring match over the record's searchable text.
    pub search: String,
}

impl LogFilter {
    fn matches(&self, record: &ActionRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(action_type) = &self.action_type {
            if &record.action_type != action_type {
                return false;
            }
        }
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        search_text(record).contains(&needle)
    }
}

/// Concatenated lowercase haystack for free-text search.
fn search_text(record: &ActionRecord) -> String {
    let mut text = format!(
        "{} {} {} {} {}",
        record.action_type, record.symbol, record.side, record.status, record.reason
    );
    for value in [record.qty, record.notional, record.price].into_iter().flatten() {
        text.push(' ');
        text.push_str(&value.to_string());
    }
    text.to_lowercase()
}

/// Full view query: what to keep, how to order it, which window to return.
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub filter: LogFilter,
    pub sort: SortOrder,
    pub page: usize,
    pub page_size: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            filter: LogFilter::default(),
            sort: SortOrder::Newest,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One derived page of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogView {
    pub items: Vec<ActionRecord>,
    /// Always >= 1, even over an empty log.
    pub total_pages: usize,
    /// The page actually returned, after clamping.
    pub page: usize,
    pub filtered_count: usize,
}

/// Derive one page: filter, stable sort by timestamp (ingest order breaks
/// ties), then window. Pure over its inputs.
pub fn build_view(records: &[ActionRecord], query: &LogQuery) -> LogView {
    let mut filtered: Vec<ActionRecord> = records
        .iter()
        .filter(|r| query.filter.matches(r))
        .cloned()
        .collect();

    match query.sort {
        SortOrder::Newest => filtered.sort_by(|a, b| b.ts.cmp(&a.ts)),
        SortOrder::Oldest => filtered.sort_by(|a, b| a.ts.cmp(&b.ts)),
    }

    let filtered_count = filtered.len();
    let page_size = query.page_size.max(1);
    let total_pages = filtered_count.div_ceil(page_size).max(1);
    let page = query.page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let items = filtered
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    LogView {
        items,
        total_pages,
        page,
        filtered_count,
    }
}

/// Status histogram over the unfiltered working set.
pub fn status_counts(records: &[ActionRecord]) -> HashMap<ActionStatus, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.status).or_insert(0) += 1;
    }
    counts
}

/// Failures of the guarded bulk clear.
#[derive(Debug, Error)]
pub enum ClearError {
    /// `confirm_clear` called without a preceding `arm_clear`.
    #[error("clear has not been armed")]
    NotArmed,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Stateful engine over the ingested action window.
pub struct ActionLogEngine {
    records: Vec<ActionRecord>,
    query: LogQuery,
    expanded: Option<u64>,
    clear_armed: bool,
}

impl ActionLogEngine {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            query: LogQuery::default(),
            expanded: None,
            clear_armed: false,
        }
    }

    /// Replace the working set with the latest fetched window.
    pub fn ingest(&mut self, records: Vec<ActionRecord>) {
        debug!("Ingesting {} action records", records.len());
        self.records = records;
        self.clamp_page();
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn query(&self) -> &LogQuery {
        &self.query
    }

    pub fn view(&self) -> LogView {
        build_view(&self.records, &self.query)
    }

    pub fn status_counts(&self) -> HashMap<ActionStatus, usize> {
        status_counts(&self.records)
    }

    /// Any filter change restarts pagination at page 1.
    pub fn set_status_filter(&mut self, status: Option<ActionStatus>) {
        self.query.filter.status = status;
        self.query.page = 1;
    }

    pub fn set_type_filter(&mut self, action_type: Option<String>) {
        self.query.filter.action_type = action_type;
        self.query.page = 1;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.query.filter.search = search.into();
        self.query.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.query.sort = sort;
        self.query.page = 1;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.query.page_size = page_size.max(1);
        self.query.page = 1;
    }

    /// Request a page; out-of-range values are clamped into
    /// `[1, total_pages]`.
    pub fn set_page(&mut self, page: usize) {
        self.query.page = page;
        self.clamp_page();
    }

    fn clamp_page(&mut self) {
        let total_pages = build_view(
            &self.records,
            &LogQuery {
                page: 1,
                ..self.query.clone()
            },
        )
        .total_pages;
        self.query.page = self.query.page.clamp(1, total_pages);
    }

    /// Toggle detail disclosure for one record; selecting a new id collapses
    /// the previous one.
    pub fn toggle_expanded(&mut self, id: u64) {
        self.expanded = if self.expanded == Some(id) {
            None
        } else {
            Some(id)
        };
    }

    pub fn expanded(&self) -> Option<u64> {
        self.expanded
    }

    // ── Guarded bulk clear ──────────────────────────────────────────────

    /// Enter the armed state; `confirm_clear` is only accepted while armed.
    pub fn arm_clear(&mut self) {
        self.clear_armed = true;
    }

    pub fn disarm_clear(&mut self) {
        self.clear_armed = false;
    }

    pub fn is_clear_armed(&self) -> bool {
        self.clear_armed
    }

    /// Perform the remote clear. The engine disarms on every outcome so a
    /// stale confirm button cannot fire twice; the working set is emptied
    /// only when the backend reports success.
    pub async fn confirm_clear(&mut self, api: &dyn BackendApi) -> Result<u64, ClearError> {
        if !self.clear_armed {
            return Err(ClearError::NotArmed);
        }
        self.clear_armed = false;

        let removed = api.clear_actions().await?;
        self.records.clear();
        self.expanded = None;
        self.query.page = 1;
        info!("Cleared {} action records", removed);
        Ok(removed)
    }
}

impl Default for ActionLogEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, ts: i64, status: ActionStatus, action_type: &str) -> ActionRecord {
        ActionRecord {
            id,
            ts,
            action_type: action_type.to_string(),
            symbol: "BTC/USD".to_string(),
            side: "buy".to_string(),
            status,
            reason: format!("reason {}", id),
            ..ActionRecord::default()
        }
    }

    fn sample_log() -> Vec<ActionRecord> {
        vec![
            record(3, 3000, ActionStatus::Success, "entry"),
            record(2, 2000, ActionStatus::Error, "entry"),
            record(1, 1000, ActionStatus::Blocked, "risk_block"),
        ]
    }

    #[test]
    fn test_status_filter_keeps_only_matching_records() {
        let mut engine = ActionLogEngine::new();
        engine.ingest(sample_log());
        engine.set_status_filter(Some(ActionStatus::Error));
        let view = engine.view();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].id, 2);
    }

    #[test]
    fn test_type_filter_and_status_filter_combine() {
        let mut engine = ActionLogEngine::new();
        engine.ingest(sample_log());
        engine.set_type_filter(Some("entry".to_string()));
        engine.set_status_filter(Some(ActionStatus::Success));
        let view = engine.view();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].id, 3);
    }

    #[test]
    fn test_search_is_case_insensitive_over_concatenated_fields() {
        let mut engine = ActionLogEngine::new();
        let mut rec = record(9, 100, ActionStatus::Info, "dca_buy");
        rec.notional = Some(12.5);
        engine.ingest(vec![rec, record(10, 200, ActionStatus::Info, "entry")]);

        engine.set_search("DCA");
        assert_eq!(engine.view().filtered_count, 1);

        engine.set_search("12.5");
        assert_eq!(engine.view().filtered_count, 1);

        engine.set_search("btc/usd");
        assert_eq!(engine.view().filtered_count, 2);
    }

    #[test]
    fn test_sort_newest_and_oldest_with_stable_ties() {
        let records = vec![
            record(1, 1000, ActionStatus::Info, "a"),
            record(2, 1000, ActionStatus::Info, "b"),
            record(3, 500, ActionStatus::Info, "c"),
        ];
        let newest = build_view(
            &records,
            &LogQuery {
                sort: SortOrder::Newest,
                ..LogQuery::default()
            },
        );
        // Ties keep ingest order.
        assert_eq!(
            newest.items.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let oldest = build_view(
            &records,
            &LogQuery {
                sort: SortOrder::Oldest,
                ..LogQuery::default()
            },
        );
        assert_eq!(
            oldest.items.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![3, 1, 2]
        );
    }

    #[test]
    fn test_pagination_clamps_out_of_range_page() {
        let records: Vec<ActionRecord> = (0..25)
            .map(|i| record(i, i as i64, ActionStatus::Info, "entry"))
            .collect();
        let mut engine = ActionLogEngine::new();
        engine.ingest(records);
        engine.set_page(3);
        let view = engine.view();
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.page, 2);
        assert_eq!(view.items.len(), 5);
    }

    #[test]
    fn test_filter_change_resets_page() {
        let records: Vec<ActionRecord> = (0..50)
            .map(|i| record(i, i as i64, ActionStatus::Info, "entry"))
            .collect();
        let mut engine = ActionLogEngine::new();
        engine.ingest(records);
        engine.set_page(3);
        assert_eq!(engine.view().page, 3);
        engine.set_search("entry");
        assert_eq!(engine.view().page, 1);
    }

    #[test]
    fn test_view_is_pure() {
        let records = sample_log();
        let query = LogQuery::default();
        assert_eq!(build_view(&records, &query), build_view(&records, &query));
    }

    #[test]
    fn test_narrowing_filter_never_grows_count() {
        let mut engine = ActionLogEngine::new();
        engine.ingest(sample_log());
        let all = engine.view().filtered_count;
        engine.set_type_filter(Some("entry".to_string()));
        let typed = engine.view().filtered_count;
        engine.set_status_filter(Some(ActionStatus::Error));
        let narrowed = engine.view().filtered_count;
        assert!(typed <= all);
        assert!(narrowed <= typed);
    }

    #[test]
    fn test_status_counts_ignore_active_filter() {
        let mut engine = ActionLogEngine::new();
        engine.ingest(sample_log());
        engine.set_status_filter(Some(ActionStatus::Error));
        let counts = engine.status_counts();
        assert_eq!(counts.get(&ActionStatus::Success), Some(&1));
        assert_eq!(counts.get(&ActionStatus::Error), Some(&1));
        assert_eq!(counts.get(&ActionStatus::Blocked), Some(&1));
    }

    #[test]
    fn test_empty_log_still_has_one_page() {
        let engine = ActionLogEngine::new();
        let view = engine.view();
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.page, 1);
        assert!(view.items.is_empty());
    }

    #[test]
    fn test_expand_is_exclusive_and_toggles() {
        let mut engine = ActionLogEngine::new();
        engine.ingest(sample_log());
        engine.toggle_expanded(1);
        assert_eq!(engine.expanded(), Some(1));
        engine.toggle_expanded(2);
        assert_eq!(engine.expanded(), Some(2));
        engine.toggle_expanded(2);
        assert_eq!(engine.expanded(), None);
    }
}
