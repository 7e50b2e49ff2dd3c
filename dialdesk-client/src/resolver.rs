//! Row enrichment: extension → agent display name.
//!
//! Sentinels and cache hits resolve synchronously. A miss spawns exactly one
//! lookup per row; the row's [`AgentCell`] cancels it on drop or when the
//! extension changes, and a cancelled lookup never publishes.

use crate::cache::ResolutionCache;
use crate::traits::AgentDirectory;
use dialdesk_core::{EMPTY_CELL, UNASSIGNED_EXTENSION};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What the agent column shows for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentDisplay {
    /// No extension on the record.
    Placeholder,
    /// Extension `-1`.
    Unassigned,
    Loading { extension: i64 },
    Resolved { name: String, extension: i64 },
    /// Lookup found nobody, or failed.
    Bare { extension: i64 },
}

impl AgentDisplay {
    pub fn is_pending(&self) -> bool {
        matches!(self, AgentDisplay::Loading { .. })
    }
}

impl fmt::Display for AgentDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentDisplay::Placeholder => f.write_str(EMPTY_CELL),
            AgentDisplay::Unassigned => f.write_str("Unassigned"),
            AgentDisplay::Loading { .. } => f.write_str("Loading…"),
            AgentDisplay::Resolved { name, extension } => {
                write!(f, "{} (ext. {})", name, extension)
            }
            AgentDisplay::Bare { extension } => write!(f, "Ext. {}", extension),
        }
    }
}

#[derive(Clone)]
pub struct ExtensionResolver {
    cache: ResolutionCache,
    directory: Arc<dyn AgentDirectory>,
}

impl ExtensionResolver {
    pub fn new(cache: ResolutionCache, directory: Arc<dyn AgentDirectory>) -> Self {
        Self { cache, directory }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolution that needs no network: sentinels and cache hits.
    pub fn resolve_now(&self, extension: Option<i64>) -> Option<AgentDisplay> {
        match extension {
            None => Some(AgentDisplay::Placeholder),
            Some(UNASSIGNED_EXTENSION) => Some(AgentDisplay::Unassigned),
            Some(ext) if ext <= 0 => Some(AgentDisplay::Placeholder),
            Some(ext) => self.cache.get(ext).map(|agent| AgentDisplay::Resolved {
                name: agent.name,
                extension: ext,
            }),
        }
    }

    /// Look one extension up remotely, writing a found name through to the
    /// cache. Misses and failures are not cached.
    pub async fn lookup(&self, extension: i64) -> AgentDisplay {
        match self.directory.lookup_extension(extension).await {
            Ok(Some(agent)) => match agent.display_name() {
                Some(name) => {
                    self.cache.insert(extension, name.clone());
                    AgentDisplay::Resolved { name, extension }
                }
                None => AgentDisplay::Bare { extension },
            },
            Ok(None) => {
                tracing::debug!(extension, "No agent for extension");
                AgentDisplay::Bare { extension }
            }
            Err(e) => {
                tracing::warn!(extension, error = %e, "Extension lookup failed");
                AgentDisplay::Bare { extension }
            }
        }
    }

    /// Full resolution: synchronous when possible, else one lookup.
    pub async fn resolve(&self, extension: Option<i64>) -> AgentDisplay {
        if let Some(display) = self.resolve_now(extension) {
            return display;
        }
        match extension {
            Some(ext) => self.lookup(ext).await,
            None => AgentDisplay::Placeholder,
        }
    }

    pub fn attach(&self, extension: Option<i64>) -> AgentCell {
        AgentCell::new(self.clone(), extension)
    }
}

/// Per-row resolver state. Owns the row's pending lookup.
pub struct AgentCell {
    resolver: ExtensionResolver,
    extension: Option<i64>,
    display: Arc<watch::Sender<AgentDisplay>>,
    token: CancellationToken,
}

impl AgentCell {
    fn new(resolver: ExtensionResolver, extension: Option<i64>) -> Self {
        let (tx, _rx) = watch::channel(AgentDisplay::Placeholder);
        let mut cell = Self {
            resolver,
            extension,
            display: Arc::new(tx),
            token: CancellationToken::new(),
        };
        cell.start();
        cell
    }

    pub fn extension(&self) -> Option<i64> {
        self.extension
    }

    pub fn display(&self) -> AgentDisplay {
        self.display.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentDisplay> {
        self.display.subscribe()
    }

    /// Point the row at a new extension, abandoning any pending lookup.
    pub fn set_extension(&mut self, extension: Option<i64>) {
        if extension == self.extension {
            return;
        }
        self.token.cancel();
        self.token = CancellationToken::new();
        self.extension = extension;
        self.start();
    }

    /// Wait until the cell holds a settled (non-loading) value.
    pub async fn settled(&self) -> AgentDisplay {
        let mut rx = self.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if !current.is_pending() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.display();
            }
        }
    }

    fn start(&mut self) {
        if let Some(display) = self.resolver.resolve_now(self.extension) {
            self.display.send_replace(display);
            return;
        }
        let Some(extension) = self.extension else {
            return;
        };
        self.display.send_replace(AgentDisplay::Loading { extension });

        let resolver = self.resolver.clone();
        let display = Arc::clone(&self.display);
        let token = self.token.clone();
        tokio::spawn(async move {
            let resolved = tokio::select! {
                _ = token.cancelled() => return,
                resolved = resolver.lookup(extension) => resolved,
            };
            display.send_if_modified(|current| {
                if token.is_cancelled() {
                    return false;
                }
                *current = resolved;
                true
            });
        });
    }
}

impl Drop for AgentCell {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Agent cells for the rows currently on screen, keyed by row id.
pub struct AgentColumn {
    resolver: ExtensionResolver,
    cells: HashMap<i64, AgentCell>,
}

impl AgentColumn {
    pub fn new(resolver: ExtensionResolver) -> Self {
        Self {
            resolver,
            cells: HashMap::new(),
        }
    }

    /// Track exactly `rows` (row id, extension). Cells of rows that left
    /// the page are dropped, cancelling their lookups.
    pub fn sync(&mut self, rows: impl IntoIterator<Item = (i64, Option<i64>)>) {
        let mut next = HashMap::new();
        for (id, extension) in rows {
            let cell = match self.cells.remove(&id) {
                Some(mut cell) => {
                    cell.set_extension(extension);
                    cell
                }
                None => self.resolver.attach(extension),
            };
            next.insert(id, cell);
        }
        self.cells = next;
    }

    /// Current value for a row; never waits on a lookup.
    pub fn display(&self, id: i64) -> AgentDisplay {
        self.cells
            .get(&id)
            .map(AgentCell::display)
            .unwrap_or(AgentDisplay::Placeholder)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
