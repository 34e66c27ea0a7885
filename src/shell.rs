use std::collections::HashMap;
use std::rc::Rc;

use engine::{EngineController, PageObserver};
use log::{debug, info, warn};
use resolver::{NavigationTarget, UrlResolver};
use storage::{Bookmark, BookmarkStore, HistoryLog, StorageError};
use tabs::{CloseOutcome, SessionCollection, SessionObserver, TabId, TabManager, TabSession};

/// Owns the tab sessions and drives the engine for them.
///
/// Toolkit-free: widgets hear about session changes through the
/// [`SessionObserver`] given at construction, and engine events come back in
/// through the `handle_*` methods.
pub struct BrowserShell<E: EngineController> {
    engine: Rc<E>,
    sessions: SessionCollection,
    subscriptions: HashMap<TabId, E::Subscription>,
    resolver: UrlResolver,
    history: Rc<dyn HistoryLog>,
    page_observer: Rc<dyn PageObserver<E::View>>,
}

impl<E: EngineController> BrowserShell<E> {
    /// Builds a shell with one blank tab whose view is ready but idle.
    pub fn new(
        engine: Rc<E>,
        resolver: UrlResolver,
        history: Rc<dyn HistoryLog>,
        session_observer: Rc<dyn SessionObserver>,
        page_observer: Rc<dyn PageObserver<E::View>>,
    ) -> Self {
        let sessions = SessionCollection::new(session_observer);
        let first = sessions.active_tab();
        let mut shell = Self {
            engine,
            sessions,
            subscriptions: HashMap::new(),
            resolver,
            history,
            page_observer,
        };
        let view = shell.engine.create_view(None);
        shell.attach(first, &view);
        shell
    }

    /// Loads the first pages: the restored URLs if any, the home page
    /// otherwise. The first tab ends up active.
    pub fn start(&mut self, restore: &[String]) {
        let first = self.sessions.active_tab();
        let mut urls = restore.iter().map(|u| u.trim()).filter(|u| !u.is_empty());

        match urls.next() {
            Some(url) => {
                info!("Restoring {} tab(s) from last session", restore.len());
                self.load(first, url);
                for url in urls {
                    let id = self.add_tab(None);
                    self.load(id, url);
                }
                self.activate(first);
            }
            None => self.navigate_home(first),
        }
    }

    /// Opens a tab at the end of the strip and makes it active. `input` is
    /// resolved like address-bar text; without it the home page loads.
    pub fn open_tab(&mut self, input: Option<&str>) -> TabId {
        let id = self.add_tab(None);
        let navigated = input.is_some_and(|input| self.navigate(id, input).is_some());
        if !navigated {
            self.navigate_home(id);
        }
        id
    }

    /// Creates the tab a page asked for (e.g. `target="_blank"`) and returns
    /// the view the engine should load the new page into.
    pub fn open_popup_tab(&mut self, opener: TabId) -> Option<E::View> {
        let Some(opener_view) = self.engine.view(opener) else {
            warn!("New window requested by unknown tab {opener}");
            return None;
        };
        let id = self.add_tab(Some(&opener_view));
        debug!("Tab {opener} opened tab {id}");
        self.engine.view(id)
    }

    fn add_tab(&mut self, related: Option<&E::View>) -> TabId {
        let id = self.sessions.open_tab();
        let view = self.engine.create_view(related);
        self.attach(id, &view);
        id
    }

    fn attach(&mut self, tab: TabId, view: &E::View) {
        self.engine.register_view(tab, view);
        let subscription = self
            .engine
            .subscribe(tab, view, Rc::clone(&self.page_observer));
        self.subscriptions.insert(tab, subscription);
    }

    /// Closes a tab unless it is the last one.
    pub fn close_tab(&mut self, tab: TabId) -> CloseOutcome {
        let outcome = self.sessions.close_tab(tab);
        if let CloseOutcome::Closed { .. } = outcome {
            if let Some(view) = self.engine.unregister_view(tab) {
                self.engine.stop_loading(&view);
                if let Some(subscription) = self.subscriptions.remove(&tab) {
                    self.engine.unsubscribe(&view, subscription);
                }
            }
        }
        outcome
    }

    pub fn activate(&mut self, tab: TabId) -> bool {
        self.sessions.set_active(tab)
    }

    /// Activates the tab after the active one, wrapping around.
    pub fn next_tab(&mut self) -> TabId {
        let active = self.sessions.active_tab();
        let next = self.sessions.next_tab(active).unwrap_or(active);
        self.sessions.set_active(next);
        next
    }

    /// Resolves address-bar input and loads it into `tab`, recording the
    /// visit. Blank input and unknown tabs are ignored.
    pub fn navigate(&mut self, tab: TabId, input: &str) -> Option<NavigationTarget> {
        self.sessions.get(tab)?;
        let target = self.resolver.resolve(input)?;
        self.history.record_visit(target.url());
        self.load(tab, target.url());
        Some(target)
    }

    pub fn navigate_active(&mut self, input: &str) -> Option<NavigationTarget> {
        self.navigate(self.sessions.active_tab(), input)
    }

    pub fn navigate_home(&mut self, tab: TabId) {
        let home = self.resolver.home_url();
        self.load(tab, &home);
    }

    fn load(&mut self, tab: TabId, url: &str) {
        let Some(view) = self.engine.view(tab) else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(tab) {
            session.begin_navigation(url);
        }
        self.engine.load_uri(&view, url);
    }

    pub fn go_back(&self, tab: TabId) {
        if let Some(view) = self.engine.view(tab) {
            self.engine.go_back(&view);
        }
    }

    pub fn go_forward(&self, tab: TabId) {
        if let Some(view) = self.engine.view(tab) {
            self.engine.go_forward(&view);
        }
    }

    /// Reloads the current page; the tab goes back to `Navigating`. A tab
    /// that has not loaded anything yet is left alone.
    pub fn reload(&mut self, tab: TabId) {
        let Some(view) = self.engine.view(tab) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(tab) else {
            return;
        };
        if session.url().is_empty() {
            return;
        }
        let url = session.url().to_string();
        session.begin_navigation(&url);
        self.engine.reload(&view);
    }

    pub fn stop(&self, tab: TabId) {
        if let Some(view) = self.engine.view(tab) {
            self.engine.stop_loading(&view);
        }
    }

    /// `(can_go_back, can_go_forward)` for the tab's view.
    pub fn history_nav(&self, tab: TabId) -> (bool, bool) {
        match self.engine.view(tab) {
            Some(view) => (self.engine.can_go_back(&view), self.engine.can_go_forward(&view)),
            None => (false, false),
        }
    }

    /// Bookmarks the active page. `Ok(false)` if there is nothing to
    /// bookmark or it is already bookmarked.
    pub fn bookmark_active(&self, store: &dyn BookmarkStore) -> Result<bool, StorageError> {
        let active = self.sessions.active();
        if active.url().is_empty() {
            return Ok(false);
        }
        store.add(Bookmark {
            title: active.title().to_string(),
            url: active.url().to_string(),
        })
    }

    pub fn handle_url_changed(&mut self, tab: TabId, url: &str) {
        if let Some(session) = self.sessions.get_mut(tab) {
            session.set_url(url);
        }
    }

    pub fn handle_title_changed(&mut self, tab: TabId, title: &str) {
        if let Some(session) = self.sessions.get_mut(tab) {
            session.set_title(title);
        }
    }

    pub fn handle_load_started(&mut self, tab: TabId) {
        if let Some(session) = self.sessions.get_mut(tab) {
            session.load_started();
        }
    }

    pub fn handle_load_progress(&mut self, tab: TabId, percent: u8) {
        if let Some(session) = self.sessions.get_mut(tab) {
            session.update_progress(percent);
        }
    }

    pub fn handle_load_finished(&mut self, tab: TabId) {
        if let Some(session) = self.sessions.get_mut(tab) {
            session.finish_load();
        }
    }

    pub fn active_tab(&self) -> TabId {
        self.sessions.active_tab()
    }

    pub fn view(&self, tab: TabId) -> Option<E::View> {
        self.engine.view(tab)
    }

    /// Tabs and their views in display order.
    pub fn tab_views(&self) -> Vec<(TabId, E::View)> {
        self.sessions
            .iter()
            .filter_map(|session| Some((session.id(), self.engine.view(session.id())?)))
            .collect()
    }

    /// URLs of the open tabs in display order, skipping blank tabs.
    pub fn session_urls(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(TabSession::url)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn sessions(&self) -> &SessionCollection {
        &self.sessions
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver::ResolverConfig;
    use std::cell::{Cell, RefCell};
    use storage::JsonBookmarkStore;
    use tabs::{LoadState, NoopObserver};

    const HOME: &str = "http://localhost:8000/home_page.html";

    #[derive(Default)]
    struct FakeEngine {
        next_view: Cell<u32>,
        views: RefCell<HashMap<TabId, u32>>,
        subscribed: RefCell<Vec<u32>>,
        calls: RefCell<Vec<String>>,
        related: RefCell<Vec<(u32, u32)>>,
    }

    impl FakeEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl EngineController for FakeEngine {
        type View = u32;
        type Subscription = u32;

        fn create_view(&self, related: Option<&u32>) -> u32 {
            let view = self.next_view.get() + 1;
            self.next_view.set(view);
            if let Some(opener) = related {
                self.related.borrow_mut().push((*opener, view));
            }
            view
        }

        fn load_uri(&self, view: &u32, uri: &str) {
            self.log(format!("load {view} {uri}"));
        }

        fn go_back(&self, view: &u32) {
            self.log(format!("back {view}"));
        }

        fn go_forward(&self, view: &u32) {
            self.log(format!("forward {view}"));
        }

        fn reload(&self, view: &u32) {
            self.log(format!("reload {view}"));
        }

        fn stop_loading(&self, view: &u32) {
            self.log(format!("stop {view}"));
        }

        fn can_go_back(&self, view: &u32) -> bool {
            *view == 1
        }

        fn can_go_forward(&self, _view: &u32) -> bool {
            false
        }

        fn register_view(&self, tab: TabId, view: &u32) {
            self.views.borrow_mut().insert(tab, *view);
        }

        fn unregister_view(&self, tab: TabId) -> Option<u32> {
            self.views.borrow_mut().remove(&tab)
        }

        fn view(&self, tab: TabId) -> Option<u32> {
            self.views.borrow().get(&tab).copied()
        }

        fn subscribe(
            &self,
            _tab: TabId,
            view: &u32,
            _observer: Rc<dyn PageObserver<u32>>,
        ) -> u32 {
            self.subscribed.borrow_mut().push(*view);
            *view
        }

        fn unsubscribe(&self, view: &u32, subscription: u32) {
            assert_eq!(*view, subscription);
            self.subscribed.borrow_mut().retain(|v| *v != subscription);
        }
    }

    struct IgnorePages;

    impl PageObserver<u32> for IgnorePages {
        fn url_changed(&self, _tab: TabId, _url: &str) {}
        fn title_changed(&self, _tab: TabId, _title: &str) {}
        fn load_started(&self, _tab: TabId) {}
        fn load_progress(&self, _tab: TabId, _percent: u8) {}
        fn load_finished(&self, _tab: TabId) {}
        fn new_window_requested(&self, _opener: TabId) -> Option<u32> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingHistory {
        visits: RefCell<Vec<String>>,
    }

    impl HistoryLog for RecordingHistory {
        fn record_visit(&self, url: &str) {
            self.visits.borrow_mut().push(url.to_string());
        }
    }

    struct Fixture {
        engine: Rc<FakeEngine>,
        history: Rc<RecordingHistory>,
        shell: BrowserShell<FakeEngine>,
    }

    fn fixture() -> Fixture {
        let engine = Rc::new(FakeEngine::default());
        let history = Rc::new(RecordingHistory::default());
        let shell = BrowserShell::new(
            Rc::clone(&engine),
            UrlResolver::new(ResolverConfig::local(8000)),
            Rc::clone(&history) as Rc<dyn HistoryLog>,
            Rc::new(NoopObserver),
            Rc::new(IgnorePages),
        );
        Fixture {
            engine,
            history,
            shell,
        }
    }

    #[test]
    fn new_shell_has_one_idle_tab() {
        let f = fixture();
        assert_eq!(f.shell.sessions().len(), 1);
        assert_eq!(f.shell.sessions().active().state(), LoadState::Created);
        assert!(f.engine.calls().is_empty());
        assert_eq!(*f.engine.subscribed.borrow(), [1]);
    }

    #[test]
    fn start_without_session_loads_home() {
        let mut f = fixture();
        f.shell.start(&[]);
        assert_eq!(f.engine.calls(), [format!("load 1 {HOME}")]);
        assert_eq!(f.shell.sessions().active().url(), HOME);
        assert!(f.history.visits.borrow().is_empty());
    }

    #[test]
    fn start_restores_last_session() {
        let mut f = fixture();
        let restore = vec![
            "https://a.example/".to_string(),
            " ".to_string(),
            "https://b.example/".to_string(),
        ];
        f.shell.start(&restore);

        assert_eq!(f.shell.sessions().len(), 2);
        assert_eq!(f.shell.sessions().active().url(), "https://a.example/");
        assert_eq!(
            f.shell.session_urls(),
            ["https://a.example/", "https://b.example/"]
        );
        assert_eq!(
            f.engine.calls(),
            ["load 1 https://a.example/", "load 2 https://b.example/"]
        );
    }

    #[test]
    fn navigate_records_resolved_url() {
        let mut f = fixture();
        let target = f.shell.navigate_active("hello world").unwrap();
        assert!(target.is_search());

        let url = "http://localhost:8000/search.html?q=hello+world";
        assert_eq!(*f.history.visits.borrow(), [url]);
        assert_eq!(f.engine.calls(), [format!("load 1 {url}")]);
        assert_eq!(f.shell.sessions().active().state(), LoadState::Navigating);
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut f = fixture();
        assert!(f.shell.navigate_active("   ").is_none());
        assert!(f.engine.calls().is_empty());
        assert!(f.history.visits.borrow().is_empty());
    }

    #[test]
    fn interrupted_navigation_binds_to_second_url() {
        let mut f = fixture();
        let tab = f.shell.active_tab();
        f.shell.navigate(tab, "first.example");
        f.shell.handle_load_progress(tab, 60);
        f.shell.navigate(tab, "second.example");

        let session = f.shell.sessions().active();
        assert_eq!(session.state(), LoadState::Navigating);
        assert_eq!(session.url(), "https://second.example");
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn engine_events_drive_session_state() {
        let mut f = fixture();
        let tab = f.shell.active_tab();
        f.shell.navigate(tab, "example.com");
        f.shell.handle_load_started(tab);
        f.shell.handle_url_changed(tab, "https://www.example.com/");
        f.shell.handle_title_changed(tab, "Example Domain");
        f.shell.handle_load_progress(tab, 40);
        f.shell.handle_load_finished(tab);

        let session = f.shell.sessions().active();
        assert_eq!(session.state(), LoadState::Loaded);
        assert_eq!(session.progress(), 100);
        assert_eq!(session.url(), "https://www.example.com/");
        assert_eq!(session.title(), "Example Domain");
    }

    #[test]
    fn reload_reenters_navigating() {
        let mut f = fixture();
        let tab = f.shell.active_tab();
        f.shell.navigate(tab, "example.com");
        f.shell.handle_load_finished(tab);
        f.shell.reload(tab);

        assert_eq!(f.shell.sessions().active().state(), LoadState::Navigating);
        assert_eq!(f.engine.calls().last().map(String::as_str), Some("reload 1"));
        assert_eq!(f.history.visits.borrow().len(), 1);
    }

    #[test]
    fn reload_of_blank_tab_is_ignored() {
        let mut f = fixture();
        let opener = f.shell.active_tab();
        f.shell.open_popup_tab(opener);
        let popup = f.shell.active_tab();
        f.shell.reload(popup);

        assert_eq!(f.shell.sessions().active().state(), LoadState::Created);
        assert_eq!(f.shell.sessions().active().progress(), 0);
        assert!(f.engine.calls().is_empty());
    }

    #[test]
    fn open_tab_activates_and_loads() {
        let mut f = fixture();
        let first = f.shell.active_tab();
        let second = f.shell.open_tab(None);
        let third = f.shell.open_tab(Some("rust-lang.org"));

        assert_eq!(f.shell.active_tab(), third);
        let active: Vec<bool> = f.shell.sessions().iter().map(|s| s.is_active()).collect();
        assert_eq!(active, [false, false, true]);
        assert_eq!(f.shell.sessions().get(second).unwrap().url(), HOME);
        assert_eq!(
            f.shell.sessions().get(third).unwrap().url(),
            "https://rust-lang.org"
        );
        assert_eq!(*f.history.visits.borrow(), ["https://rust-lang.org"]);
        assert_ne!(first, second);
    }

    #[test]
    fn closing_last_tab_is_refused() {
        let mut f = fixture();
        let only = f.shell.active_tab();
        assert_eq!(f.shell.close_tab(only), CloseOutcome::LastTab);
        assert_eq!(f.shell.sessions().len(), 1);
        assert!(f.shell.view(only).is_some());
        assert!(f.engine.calls().is_empty());
    }

    #[test]
    fn close_releases_view_and_subscription() {
        let mut f = fixture();
        let first = f.shell.active_tab();
        let second = f.shell.open_tab(None);

        assert_eq!(
            f.shell.close_tab(second),
            CloseOutcome::Closed { next_active: first }
        );
        assert!(f.shell.view(second).is_none());
        assert_eq!(*f.engine.subscribed.borrow(), [1]);
        assert_eq!(f.engine.calls().last().map(String::as_str), Some("stop 2"));
        assert_eq!(f.shell.tab_views(), [(first, 1)]);
    }

    #[test]
    fn popup_tab_shares_opener_context() {
        let mut f = fixture();
        let opener = f.shell.active_tab();
        let view = f.shell.open_popup_tab(opener).unwrap();

        assert_eq!(view, 2);
        assert_eq!(*f.engine.related.borrow(), [(1, 2)]);
        assert_eq!(f.shell.sessions().len(), 2);
        assert_ne!(f.shell.active_tab(), opener);
        assert_eq!(f.shell.sessions().active().state(), LoadState::Created);
        // The engine loads the popup itself.
        assert!(f.engine.calls().is_empty());
    }

    #[test]
    fn popup_from_unknown_tab_is_refused() {
        let mut f = fixture();
        assert!(f.shell.open_popup_tab(TabId::new(99)).is_none());
        assert_eq!(f.shell.sessions().len(), 1);
    }

    #[test]
    fn next_tab_wraps() {
        let mut f = fixture();
        let first = f.shell.active_tab();
        let second = f.shell.open_tab(None);
        assert_eq!(f.shell.next_tab(), first);
        assert_eq!(f.shell.next_tab(), second);
    }

    #[test]
    fn navigation_controls_reach_the_engine() {
        let mut f = fixture();
        let tab = f.shell.active_tab();
        f.shell.go_back(tab);
        f.shell.go_forward(tab);
        f.shell.stop(tab);
        assert_eq!(f.engine.calls(), ["back 1", "forward 1", "stop 1"]);
        assert_eq!(f.shell.history_nav(tab), (true, false));
        assert_eq!(f.shell.history_nav(TabId::new(42)), (false, false));
    }

    #[test]
    fn bookmark_active_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBookmarkStore::new(dir.path().join("bookmarks.json"));
        let mut f = fixture();
        assert!(!f.shell.bookmark_active(&store).unwrap());

        let tab = f.shell.active_tab();
        f.shell.navigate(tab, "example.com");
        f.shell.handle_title_changed(tab, "Example");
        assert!(f.shell.bookmark_active(&store).unwrap());
        assert!(!f.shell.bookmark_active(&store).unwrap());

        let saved = store.load();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Example");
        assert_eq!(saved[0].url, "https://example.com");
    }
}
