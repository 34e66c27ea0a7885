use std::fmt;
use std::rc::Rc;

use log::debug;

/// Title shown for a tab before the page reports one.
pub const DEFAULT_TITLE: &str = "New Tab";

/// Maximum number of characters shown in a tab label.
pub const TAB_LABEL_MAX: usize = 15;

/// Stable identifier for a browser tab, unique for the process lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TabId(u64);

impl TabId {
    /// Creates a new `TabId` from a raw numeric value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Navigation lifecycle of a single tab.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadState {
    /// Opened, nothing requested yet.
    Created,
    /// A load is in flight.
    Navigating,
    /// The last load completed.
    Loaded,
}

/// Notification sink for session changes.
///
/// Supplied when the collection is built and handed to every session it
/// creates. All methods default to no-ops.
pub trait SessionObserver {
    fn url_changed(&self, _session: &TabSession) {}

    fn title_changed(&self, _session: &TabSession) {}

    fn progress_changed(&self, _session: &TabSession) {}

    /// Called on the session that just became the active one.
    fn active_changed(&self, _session: &TabSession) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Navigation state of one open tab.
pub struct TabSession {
    id: TabId,
    url: String,
    title: String,
    progress: u8,
    state: LoadState,
    active: bool,
    observer: Rc<dyn SessionObserver>,
}

impl fmt::Debug for TabSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabSession")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("title", &self.title)
            .field("progress", &self.progress)
            .field("state", &self.state)
            .field("active", &self.active)
            .finish()
    }
}

impl TabSession {
    fn new(id: TabId, observer: Rc<dyn SessionObserver>) -> Self {
        Self {
            id,
            url: String::new(),
            title: DEFAULT_TITLE.to_string(),
            progress: 0,
            state: LoadState::Created,
            active: false,
            observer,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    /// Current URL; empty until the first navigation.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Load progress in percent (0-100).
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Title shortened for display in a tab strip.
    pub fn label(&self) -> String {
        if self.title.chars().count() > TAB_LABEL_MAX {
            let short: String = self.title.chars().take(TAB_LABEL_MAX).collect();
            format!("{short}...")
        } else {
            self.title.clone()
        }
    }

    /// Starts a navigation to `url`, abandoning any load in flight.
    pub fn begin_navigation(&mut self, url: &str) {
        self.state = LoadState::Navigating;
        self.progress = 0;
        if self.url != url {
            self.url = url.to_string();
            self.observer.url_changed(self);
        }
        self.observer.progress_changed(self);
    }

    /// The engine started a load on its own (link click, history step).
    pub fn load_started(&mut self) {
        self.state = LoadState::Navigating;
        self.progress = 0;
        self.observer.progress_changed(self);
    }

    /// Applies a progress report from the engine.
    ///
    /// Progress never moves backwards within one navigation. A report that
    /// arrives while the tab is idle means the engine began a new load.
    pub fn update_progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        match self.state {
            LoadState::Navigating if percent < self.progress => return,
            LoadState::Loaded if percent == 100 => return,
            LoadState::Created | LoadState::Loaded => self.state = LoadState::Navigating,
            LoadState::Navigating => {}
        }

        self.progress = percent;
        if percent == 100 {
            self.state = LoadState::Loaded;
        }
        self.observer.progress_changed(self);
    }

    /// The engine reported the current load as complete.
    pub fn finish_load(&mut self) {
        if self.state == LoadState::Loaded {
            return;
        }
        self.state = LoadState::Loaded;
        self.progress = 100;
        self.observer.progress_changed(self);
    }

    /// Sets the page title; blank titles fall back to [`DEFAULT_TITLE`].
    pub fn set_title(&mut self, title: &str) {
        let title = match title.trim() {
            "" => DEFAULT_TITLE,
            trimmed => trimmed,
        };
        if self.title != title {
            self.title = title.to_string();
            self.observer.title_changed(self);
        }
    }

    /// Records the URL the engine is currently showing.
    pub fn set_url(&mut self, url: &str) {
        if self.url != url {
            self.url = url.to_string();
            self.observer.url_changed(self);
        }
    }

    fn set_active(&mut self, active: bool) {
        let became_active = active && !self.active;
        self.active = active;
        if became_active {
            self.observer.active_changed(self);
        }
    }
}

/// Result of a close request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CloseOutcome {
    /// The tab was removed; `next_active` is now selected.
    Closed { next_active: TabId },
    /// Refused: the last remaining tab cannot be closed.
    LastTab,
    /// No tab with that id exists.
    Unknown,
}

/// Interface for tab lifecycle and selection.
pub trait TabManager {
    /// Opens a new tab at the end of the strip and makes it active.
    fn open_tab(&mut self) -> TabId;

    /// Closes a tab, keeping at least one open.
    fn close_tab(&mut self, id: TabId) -> CloseOutcome;

    /// Marks the specified tab as active.
    fn set_active(&mut self, id: TabId) -> bool;

    /// Returns the currently active tab.
    fn active_tab(&self) -> TabId;

    /// Returns the tabs in display order.
    fn tabs(&self) -> &[TabSession];
}

/// Ordered, never-empty set of tab sessions with exactly one active member.
pub struct SessionCollection {
    tabs: Vec<TabSession>,
    active: usize,
    next_id: u64,
    observer: Rc<dyn SessionObserver>,
}

impl fmt::Debug for SessionCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCollection")
            .field("tabs", &self.tabs)
            .field("active", &self.active)
            .finish()
    }
}

impl SessionCollection {
    /// Creates a collection holding one fresh, active session.
    pub fn new(observer: Rc<dyn SessionObserver>) -> Self {
        let mut collection = Self {
            tabs: Vec::new(),
            active: 0,
            next_id: 1,
            observer,
        };
        let mut first = collection.allocate();
        first.active = true;
        collection.tabs.push(first);
        collection
    }

    fn allocate(&mut self) -> TabSession {
        let id = TabId::new(self.next_id);
        self.next_id += 1;
        TabSession::new(id, Rc::clone(&self.observer))
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabSession> {
        self.tabs.iter()
    }

    pub fn get(&self, id: TabId) -> Option<&TabSession> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn get_mut(&mut self, id: TabId) -> Option<&mut TabSession> {
        self.tabs.iter_mut().find(|tab| tab.id == id)
    }

    pub fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    pub fn active(&self) -> &TabSession {
        &self.tabs[self.active]
    }

    pub fn active_mut(&mut self) -> &mut TabSession {
        &mut self.tabs[self.active]
    }

    /// Tab after `id` in display order, wrapping around.
    pub fn next_tab(&self, id: TabId) -> Option<TabId> {
        let idx = self.position(id)?;
        let next_idx = (idx + 1) % self.tabs.len();
        Some(self.tabs[next_idx].id)
    }

    fn activate_index(&mut self, idx: usize) {
        if idx == self.active && self.tabs[idx].active {
            return;
        }
        for (i, tab) in self.tabs.iter_mut().enumerate() {
            if i != idx {
                tab.active = false;
            }
        }
        self.active = idx;
        self.tabs[idx].set_active(true);
    }
}

impl TabManager for SessionCollection {
    fn open_tab(&mut self) -> TabId {
        let session = self.allocate();
        let id = session.id;
        self.tabs.push(session);
        self.activate_index(self.tabs.len() - 1);
        id
    }

    fn close_tab(&mut self, id: TabId) -> CloseOutcome {
        let Some(idx) = self.position(id) else {
            return CloseOutcome::Unknown;
        };
        if self.tabs.len() == 1 {
            debug!("refusing to close tab {id}: last open tab");
            return CloseOutcome::LastTab;
        }

        self.tabs.remove(idx);
        if idx == self.active {
            // The right-hand neighbour slides into the closed slot.
            let next = idx.min(self.tabs.len() - 1);
            self.active = usize::MAX;
            self.activate_index(next);
        } else if idx < self.active {
            self.active -= 1;
        }

        CloseOutcome::Closed {
            next_active: self.tabs[self.active].id,
        }
    }

    fn set_active(&mut self, id: TabId) -> bool {
        let Some(idx) = self.position(id) else {
            return false;
        };
        self.activate_index(idx);
        true
    }

    fn active_tab(&self) -> TabId {
        self.tabs[self.active].id
    }

    fn tabs(&self) -> &[TabSession] {
        &self.tabs
    }
}
