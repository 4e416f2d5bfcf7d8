//! Per-visitor state: the ledger and its history for edition 1, the selected client
//! tab and its edit state for editions 2/3.
//!
//! A session starts on the first request without a valid cookie and ends when it has
//! been idle longer than the configured TTL (or when the process exits). Nothing in a
//! session is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::connector::Connection;
use crate::error::{InventoryError, Result};
use crate::ledger::{self, Direction, History, Ledger, Movement};
use crate::loader;
use crate::remote::{Revision, Worksheet};
use crate::saving;
use crate::table::{InventoryRow, InventoryTable};
use crate::tabs::{self, TabNotice};

/// Where the selected tab stands relative to the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabState {
    Unloaded,
    /// Loaded and unchanged since.
    Clean,
    /// Edited since the last load or save.
    Dirty,
    /// Written to the sheet; clean until the next edit.
    Saved,
}

pub struct GridTab {
    pub client: String,
    pub table: InventoryTable,
    pub state: TabState,
    worksheet: Option<Arc<dyn Worksheet>>,
    revision: Option<Revision>,
}

#[derive(Default)]
pub struct Session {
    ledger: Option<Ledger>,
    history: History,
    ad_hoc_clients: Vec<String>,
    grid: Option<GridTab>,
}

fn stock_sheet(connection: &Connection) -> Result<Option<Arc<dyn Worksheet>>> {
    match &connection.document {
        Some(document) => Ok(Some(document.first_worksheet()?)),
        None => Ok(None),
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// The ledger, loaded from the stock sheet on first use. Offline it starts empty.
    pub fn ledger(&mut self, connection: &Connection) -> Result<&Ledger> {
        if self.ledger.is_none() {
            self.reload_ledger(connection)?;
        }
        Ok(&*self.ledger.get_or_insert_with(Ledger::new))
    }

    /// Drop the in-memory ledger and read it again from the sheet.
    pub fn reload_ledger(&mut self, connection: &Connection) -> Result<&Ledger> {
        let ledger = match stock_sheet(connection)? {
            Some(sheet) => loader::load_ledger(sheet.as_ref())?,
            None => Ledger::new(),
        };
        Ok(&*self.ledger.insert(ledger))
    }

    /// Stock in or out, persisted immediately, then logged to the session history.
    pub fn move_stock(
        &mut self,
        connection: &Connection,
        product: &str,
        quantity: i64,
        direction: Direction,
    ) -> Result<Movement> {
        // typed names are normalized; outbound names come from the ledger and must match
        let product = match direction {
            Direction::Inbound => ledger::normalize_product(product),
            Direction::Outbound => product.to_string(),
        };
        self.ledger(connection)?;
        let sheet = stock_sheet(connection)?;
        let ledger = self.ledger.get_or_insert_with(Ledger::new);

        let movement = ledger::apply_delta(ledger, sheet.as_deref(), &product, quantity, direction)?;
        self.history.record(&movement);
        Ok(movement)
    }

    /// Configured clients, then tabs found in the document, then names typed during this
    /// session, without duplicates.
    pub fn clients(&self, configured: &[String], connection: &Connection) -> Vec<String> {
        let mut names: Vec<String> = configured.to_vec();
        if let Some(document) = &connection.document {
            match document.worksheets() {
                Ok(titles) => names.extend(titles),
                Err(e) => warn!("could not list tabs: {e}"),
            }
        }
        names.extend(self.ad_hoc_clients.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        names
    }

    /// Select a client tab, creating it if needed, and load it. Any unsaved edits of the
    /// previously selected tab are discarded.
    ///
    /// Offline the tab is selected with an empty table and no notice.
    pub fn select_client(
        &mut self,
        configured: &[String],
        connection: &Connection,
        name: &str,
    ) -> Result<Option<TabNotice>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::Validation(
                "client name cannot be empty".to_string(),
            ));
        }

        let Some(document) = &connection.document else {
            self.remember_client(configured, name);
            self.grid = Some(GridTab {
                client: name.to_string(),
                table: InventoryTable::default(),
                state: TabState::Clean,
                worksheet: None,
                revision: None,
            });
            return Ok(None);
        };

        let resolved = tabs::resolve_or_create(document.as_ref(), name)?;
        let loaded = loader::load_table(resolved.worksheet.as_ref())?;
        self.remember_client(configured, name);
        if let Some(previous) = &self.grid {
            if previous.state == TabState::Dirty {
                debug!("discarding unsaved edits of {}", previous.client);
            }
        }
        self.grid = Some(GridTab {
            client: name.to_string(),
            table: loaded.table,
            state: TabState::Clean,
            worksheet: Some(resolved.worksheet),
            revision: Some(loaded.revision),
        });
        Ok(Some(resolved.notice))
    }

    fn remember_client(&mut self, configured: &[String], name: &str) {
        if !configured.iter().any(|c| c == name) && !self.ad_hoc_clients.iter().any(|c| c == name) {
            self.ad_hoc_clients.push(name.to_string());
        }
    }

    pub fn grid(&self) -> Option<&GridTab> {
        self.grid.as_ref()
    }

    pub fn tab_state(&self) -> TabState {
        self.grid.as_ref().map_or(TabState::Unloaded, |g| g.state)
    }

    fn selected_mut(&mut self) -> Result<&mut GridTab> {
        self.grid
            .as_mut()
            .ok_or_else(|| InventoryError::Validation("no client selected".to_string()))
    }

    /// Replace the in-memory table with the edited grid. Nothing is written.
    pub fn edit_table(&mut self, rows: Vec<InventoryRow>) -> Result<&GridTab> {
        let grid = self.selected_mut()?;
        grid.table = InventoryTable::new(rows);
        grid.state = TabState::Dirty;
        Ok(&*grid)
    }

    /// Overwrite the selected tab with the in-memory table.
    ///
    /// With `guard_stale_writes` the save fails if the tab changed since it was loaded
    /// (or last saved). On failure the tab stays dirty.
    pub fn save(&mut self, guard_stale_writes: bool) -> Result<&GridTab> {
        let grid = self.selected_mut()?;
        let worksheet = grid.worksheet.clone().ok_or(InventoryError::Offline)?;
        let expected = if guard_stale_writes { grid.revision } else { None };

        let revision = saving::save_table(worksheet.as_ref(), &grid.table, expected)?;
        grid.revision = Some(revision);
        grid.state = TabState::Saved;
        Ok(&*grid)
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// All live sessions, keyed by the id stored in the visitor's cookie.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the session for `id`, or start a new one when `id` is unknown or expired.
    /// Expired sessions are dropped on the way.
    pub fn open(&self, id: Option<&str>) -> (String, SessionHandle) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().expect("session store poisoned");
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.ttl);

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(id) {
                entry.last_seen = now;
                return (id.to_string(), entry.handle.clone());
            }
        }

        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(Session::new()));
        sessions.insert(
            id.clone(),
            Entry {
                handle: handle.clone(),
                last_seen: now,
            },
        );
        debug!("session {id} started");
        (id, handle)
    }

    pub fn end(&self, id: &str) -> bool {
        self.sessions
            .write()
            .expect("session store poisoned")
            .remove(id)
            .is_some()
    }

    /// Drop sessions idle for longer than the TTL.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().expect("session store poisoned");
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= self.ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
