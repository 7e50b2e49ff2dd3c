//! Table reconciliation engine.
//!
//! Owns the paginated window of attention records. Pagination and server
//! filter changes refetch; column filters, sorting, visibility and selection
//! are applied client-side over the current page. Concurrent refetches are
//! resolved last-request-wins with a monotonically increasing token.

use crate::persistence::PersistedState;
use crate::traits::{AttentionSource, InvalidationSink};
use dialdesk_core::{
    parse_timestamp, search_text, AttentionRecord, ColumnFilters, DateRange, ListAttentionsQuery,
    PagePointer, ServerFilter, ServerFilters, TriState, ValidationError,
};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Filter control bound to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFilterKind {
    None,
    DateRange,
    TriState,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub id: &'static str,
    pub header: &'static str,
    pub filter: ColumnFilterKind,
    pub hideable: bool,
}

const fn column(
    id: &'static str,
    header: &'static str,
    filter: ColumnFilterKind,
    hideable: bool,
) -> ColumnDef {
    ColumnDef { id, header, filter, hideable }
}

pub const COLUMNS: &[ColumnDef] = &[
    column("select", "", ColumnFilterKind::None, false),
    column("id_atencion", "ID atención", ColumnFilterKind::None, false),
    column("tipo_solicitud", "Tipo", ColumnFilterKind::None, true),
    column("estado", "Estado", ColumnFilterKind::None, true),
    column("gestor_asignado", "Gestor asignado", ColumnFilterKind::None, true),
    column("id_llamada", "ID llamada", ColumnFilterKind::None, true),
    column("phone", "Teléfono", ColumnFilterKind::None, true),
    column("duracion", "Duración", ColumnFilterKind::None, true),
    column("nombre_cliente", "Cliente", ColumnFilterKind::None, true),
    column("empresa_cliente", "Empresa", ColumnFilterKind::None, true),
    column("es_vip", "VIP", ColumnFilterKind::TriState, true),
    column("en_horario", "En horario", ColumnFilterKind::TriState, true),
    column("extracted_variables", "Variables", ColumnFilterKind::None, true),
    column("transcript_chat", "Transcripción", ColumnFilterKind::None, true),
    column("recording_url", "Grabación", ColumnFilterKind::None, true),
    column("started_at", "Inicio", ColumnFilterKind::DateRange, true),
    column("ended_at", "Fin", ColumnFilterKind::None, true),
    column("created_at", "Creado", ColumnFilterKind::None, true),
    column("search", "Buscar", ColumnFilterKind::Search, true),
];

pub fn column_def(id: &str) -> Option<&'static ColumnDef> {
    COLUMNS.iter().find(|c| c.id == id)
}

/// Boolean columns with a tri-state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    EsVip,
    EnHorario,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    StartedAt,
    EndedAt,
    CreatedAt,
}

impl SortColumn {
    fn key(self, record: &AttentionRecord) -> i64 {
        let raw = match self {
            SortColumn::StartedAt => record.started_at.as_deref(),
            SortColumn::EndedAt => record.ended_at.as_deref(),
            SortColumn::CreatedAt => Some(record.created_at.as_str()),
        };
        raw.and_then(parse_timestamp)
            .map(|ts| ts.timestamp_millis())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: SortColumn,
    pub descending: bool,
}

/// A derived row: the record plus its validation outcome and search text.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub record: AttentionRecord,
    pub schema_valid: bool,
    pub issue: Option<String>,
    pub search: String,
}

impl TableRow {
    pub fn from_wire(value: serde_json::Value) -> Self {
        let validated = AttentionRecord::from_wire(value);
        if let Some(issue) = &validated.issue {
            tracing::debug!(
                id = validated.record.id,
                issue = %issue,
                "Row failed strict validation, coerced"
            );
        }
        let search = search_text(&validated.record);
        Self {
            record: validated.record,
            schema_valid: validated.schema_valid,
            issue: validated.issue,
            search,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableState {
    pub pointer: PagePointer,
    pub server_filters: ServerFilters,
    pub column_filters: ColumnFilters,
    pub rows: Vec<TableRow>,
    pub loading: bool,
    pub error: Option<String>,
    pub hidden_columns: BTreeSet<String>,
    pub sort: Option<SortSpec>,
    pub selected: BTreeSet<i64>,
}

impl TableState {
    fn new(page_size: u32) -> Self {
        let mut hidden_columns = BTreeSet::new();
        hidden_columns.insert("search".to_string());
        Self {
            pointer: PagePointer::new(page_size),
            server_filters: ServerFilters::default(),
            column_filters: ColumnFilters::default(),
            rows: Vec::new(),
            loading: false,
            error: None,
            hidden_columns,
            sort: None,
            selected: BTreeSet::new(),
        }
    }

    /// Rows passing every column filter, in display order.
    pub fn visible_rows(&self) -> Vec<TableRow> {
        let mut rows: Vec<TableRow> = self
            .rows
            .iter()
            .filter(|row| self.column_filters.matches(&row.record, &row.search))
            .cloned()
            .collect();
        if let Some(sort) = self.sort {
            rows.sort_by(|a, b| compare_rows(a, b, sort));
        }
        rows
    }
}

/// Outcome of one refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOutcome {
    Applied,
    Failed,
    /// A newer request was issued before this one completed.
    Superseded,
}

#[derive(Clone)]
pub struct TableEngine {
    source: Arc<dyn AttentionSource>,
    state: Arc<Mutex<TableState>>,
    latest_token: Arc<AtomicU64>,
    page_size_options: Arc<Vec<u32>>,
}

impl TableEngine {
    pub fn new(
        source: Arc<dyn AttentionSource>,
        page_size: u32,
        page_size_options: Vec<u32>,
    ) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(TableState::new(page_size))),
            latest_token: Arc::new(AtomicU64::new(0)),
            page_size_options: Arc::new(page_size_options),
        }
    }

    pub fn snapshot(&self) -> TableState {
        self.lock().clone()
    }

    pub fn pointer(&self) -> PagePointer {
        self.lock().pointer
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn rows(&self) -> Vec<TableRow> {
        self.lock().rows.clone()
    }

    pub fn visible_rows(&self) -> Vec<TableRow> {
        self.lock().visible_rows()
    }

    /// Fetch the current page. Safe to call concurrently; only the most
    /// recently issued request applies its result and clears `loading`.
    pub async fn refetch(&self) -> RefetchOutcome {
        let (token, query) = {
            let mut state = self.lock();
            let token = self.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            (token, ListAttentionsQuery::new(&state.pointer, &state.server_filters))
        };
        tracing::debug!(
            token,
            page = query.page,
            page_size = query.page_size,
            "Fetching attentions"
        );

        let result = self.source.list_attentions(&query).await;

        let mut state = self.lock();
        if self.latest_token.load(Ordering::SeqCst) != token {
            tracing::debug!(token, "Discarding superseded page response");
            return RefetchOutcome::Superseded;
        }
        state.loading = false;
        match result {
            Ok(page) => {
                state.rows = page.items.into_iter().map(TableRow::from_wire).collect();
                state.pointer.total = page.total;
                state.error = None;
                let ids: BTreeSet<i64> = state.rows.iter().map(|row| row.record.id).collect();
                state.selected.retain(|id| ids.contains(id));
                tracing::info!(
                    count = state.rows.len(),
                    total = page.total,
                    "Attention page applied"
                );
                RefetchOutcome::Applied
            }
            Err(e) => {
                tracing::error!(error = %e, "Attention fetch failed");
                state.rows.clear();
                state.selected.clear();
                state.error = Some(e.to_string());
                RefetchOutcome::Failed
            }
        }
    }

    pub async fn set_page(&self, page_index: u32) -> RefetchOutcome {
        self.lock().pointer.page_index = page_index;
        self.refetch().await
    }

    pub async fn next_page(&self) -> Option<RefetchOutcome> {
        let next = {
            let state = self.lock();
            if !state.pointer.has_next() {
                return None;
            }
            state.pointer.page_index + 1
        };
        Some(self.set_page(next).await)
    }

    pub async fn previous_page(&self) -> Option<RefetchOutcome> {
        let previous = {
            let state = self.lock();
            if !state.pointer.has_previous() {
                return None;
            }
            state.pointer.page_index - 1
        };
        Some(self.set_page(previous).await)
    }

    /// Change the page size; the window returns to the first page.
    pub async fn set_page_size(&self, page_size: u32) -> Result<RefetchOutcome, ValidationError> {
        if !self.page_size_options.contains(&page_size) {
            return Err(ValidationError::invalid(
                "page_size",
                format!("{} is not one of {:?}", page_size, self.page_size_options),
            ));
        }
        {
            let mut state = self.lock();
            state.pointer.page_size = page_size;
            state.pointer.page_index = 0;
        }
        Ok(self.refetch().await)
    }

    /// Set or clear (blank value) a server filter; the window returns to the
    /// first page.
    pub async fn set_server_filter(
        &self,
        name: &str,
        value: Option<&str>,
    ) -> Result<RefetchOutcome, ValidationError> {
        let filter = ServerFilter::parse(name)?;
        {
            let mut state = self.lock();
            state.server_filters.set(filter, value);
            state.pointer.page_index = 0;
        }
        Ok(self.refetch().await)
    }

    pub fn set_date_range(&self, range: DateRange) {
        self.lock().column_filters.started_at = range;
    }

    pub fn set_flag_filter(&self, column: FlagColumn, value: TriState) {
        let mut state = self.lock();
        match column {
            FlagColumn::EsVip => state.column_filters.es_vip = value,
            FlagColumn::EnHorario => state.column_filters.en_horario = value,
        }
    }

    pub fn set_search(&self, needle: impl Into<String>) {
        self.lock().column_filters.search = needle.into();
    }

    pub fn clear_column_filters(&self) {
        self.lock().column_filters = ColumnFilters::default();
    }

    pub fn set_sort(&self, sort: Option<SortSpec>) {
        self.lock().sort = sort;
    }

    /// Toggle a hideable column. Returns whether it is now visible.
    pub fn toggle_column(&self, id: &str) -> Result<bool, ValidationError> {
        let def = column_def(id)
            .ok_or_else(|| ValidationError::invalid("column", format!("unknown column {}", id)))?;
        if !def.hideable {
            return Err(ValidationError::invalid("column", format!("{} cannot be hidden", id)));
        }
        let mut state = self.lock();
        if state.hidden_columns.remove(id) {
            Ok(true)
        } else {
            state.hidden_columns.insert(id.to_string());
            Ok(false)
        }
    }

    pub fn visible_columns(&self) -> Vec<&'static ColumnDef> {
        let state = self.lock();
        COLUMNS
            .iter()
            .filter(|c| !state.hidden_columns.contains(c.id))
            .collect()
    }

    /// Toggle selection of a row on the current page.
    pub fn toggle_selected(&self, id: i64) -> bool {
        let mut state = self.lock();
        if !state.rows.iter().any(|row| row.record.id == id) {
            return false;
        }
        if !state.selected.remove(&id) {
            state.selected.insert(id);
        }
        state.selected.contains(&id)
    }

    pub fn selected_ids(&self) -> Vec<i64> {
        self.lock().selected.iter().copied().collect()
    }

    pub fn clear_selection(&self) {
        self.lock().selected.clear();
    }

    pub fn persisted_state(&self) -> PersistedState {
        let state = self.lock();
        PersistedState {
            page_size: state.pointer.page_size,
            server_filters: state.server_filters.clone(),
            hidden_columns: state.hidden_columns.iter().cloned().collect(),
        }
    }

    /// Restore persisted UI state. Unknown page sizes and columns are
    /// ignored. Does not fetch.
    pub fn restore(&self, persisted: &PersistedState) {
        let mut state = self.lock();
        if self.page_size_options.contains(&persisted.page_size) {
            state.pointer.page_size = persisted.page_size;
        }
        state.server_filters = persisted.server_filters.clone();
        state.pointer.page_index = 0;
        state.hidden_columns = persisted
            .hidden_columns
            .iter()
            .filter(|id| column_def(id).is_some_and(|c| c.hideable))
            .cloned()
            .collect();
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl InvalidationSink for TableEngine {
    /// Every recognized push event triggers its own refetch; no debouncing.
    fn invalidate(&self, event_type: &str) {
        tracing::debug!(event_type, "Push invalidation, refetching");
        let engine = self.clone();
        tokio::spawn(async move {
            engine.refetch().await;
        });
    }
}

/// Row order under `sort`; unparsable timestamps sort as the epoch.
pub fn compare_rows(a: &TableRow, b: &TableRow, sort: SortSpec) -> CmpOrdering {
    let ord = sort.column.key(&a.record).cmp(&sort.column.key(&b.record));
    if sort.descending {
        ord.reverse()
    } else {
        ord
    }
}
