use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gtk::glib;
use gtk::prelude::*;
use log::{debug, warn};
use tabs::TabId;
use webkit6::prelude::*;

/// Receives page events for one tab.
///
/// Calls arrive on the UI thread, possibly while the caller that triggered
/// them (e.g. a `load_uri`) is still on the stack.
pub trait PageObserver<V> {
    fn url_changed(&self, tab: TabId, url: &str);

    fn title_changed(&self, tab: TabId, title: &str);

    fn load_started(&self, tab: TabId);

    /// Estimated progress in percent (0-100).
    fn load_progress(&self, tab: TabId, percent: u8);

    /// The load completed, successfully or not.
    fn load_finished(&self, tab: TabId);

    /// The page in `opener` asked for a new browsing context. Returns the
    /// view that should host it, or `None` to refuse.
    fn new_window_requested(&self, opener: TabId) -> Option<V>;
}

/// Interface to the web engine implementation.
pub trait EngineController {
    type View: Clone;
    type Subscription;

    /// Creates a new view. `related` is the opener for popup windows, whose
    /// new view must share its browsing context.
    fn create_view(&self, related: Option<&Self::View>) -> Self::View;

    /// Loads a URI into the provided view.
    fn load_uri(&self, view: &Self::View, uri: &str);

    fn go_back(&self, view: &Self::View);

    fn go_forward(&self, view: &Self::View);

    fn reload(&self, view: &Self::View);

    fn stop_loading(&self, view: &Self::View);

    fn can_go_back(&self, view: &Self::View) -> bool;

    fn can_go_forward(&self, view: &Self::View) -> bool;

    /// Associates a view with a tab id.
    fn register_view(&self, tab: TabId, view: &Self::View);

    /// Forgets the view of a destroyed tab and hands it back.
    fn unregister_view(&self, tab: TabId) -> Option<Self::View>;

    fn view(&self, tab: TabId) -> Option<Self::View>;

    /// Routes the view's page events to `observer`, tagged with `tab`.
    fn subscribe(
        &self,
        tab: TabId,
        view: &Self::View,
        observer: Rc<dyn PageObserver<Self::View>>,
    ) -> Self::Subscription;

    fn unsubscribe(&self, view: &Self::View, subscription: Self::Subscription);
}

/// On-disk locations handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProfile {
    /// Profile directory; cookies and site data live here.
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl EngineProfile {
    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir.join("cookies.sqlite")
    }
}

/// WebKitGTK-backed engine controller.
#[derive(Debug)]
pub struct WebKitEngine {
    session: webkit6::NetworkSession,
    views: RefCell<HashMap<TabId, webkit6::WebView>>,
}

impl WebKitEngine {
    /// Engine whose views share one network session rooted in `profile`.
    pub fn new(profile: &EngineProfile) -> Self {
        let session = webkit6::NetworkSession::new(
            path_str(&profile.data_dir),
            path_str(&profile.cache_dir),
        );

        let cookie_file = profile.cookie_file();
        match (session.cookie_manager(), cookie_file.to_str()) {
            (Some(manager), Some(file)) => {
                manager.set_persistent_storage(file, webkit6::CookiePersistentStorage::Sqlite);
            }
            _ => warn!("Cookies will not persist: no cookie manager or unusable path"),
        }

        Self {
            session,
            views: RefCell::new(HashMap::new()),
        }
    }

    fn settings() -> webkit6::Settings {
        webkit6::Settings::builder()
            .allow_file_access_from_file_urls(true)
            .enable_javascript(true)
            .build()
    }
}

fn path_str(path: &Path) -> Option<&str> {
    let s = path.to_str();
    if s.is_none() {
        warn!("Ignoring non UTF-8 engine path {}", path.display());
    }
    s
}

fn percent(progress: f64) -> u8 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u8
}

impl EngineController for WebKitEngine {
    type View = webkit6::WebView;
    type Subscription = Vec<glib::SignalHandlerId>;

    fn create_view(&self, related: Option<&Self::View>) -> Self::View {
        let settings = Self::settings();
        let builder = webkit6::WebView::builder().settings(&settings);
        // A related view inherits the opener's session.
        let view = match related {
            Some(opener) => builder.related_view(opener).build(),
            None => builder.network_session(&self.session).build(),
        };
        view.set_hexpand(true);
        view.set_vexpand(true);
        view
    }

    fn load_uri(&self, view: &Self::View, uri: &str) {
        view.load_uri(uri);
    }

    fn go_back(&self, view: &Self::View) {
        view.go_back();
    }

    fn go_forward(&self, view: &Self::View) {
        view.go_forward();
    }

    fn reload(&self, view: &Self::View) {
        view.reload();
    }

    fn stop_loading(&self, view: &Self::View) {
        view.stop_loading();
    }

    fn can_go_back(&self, view: &Self::View) -> bool {
        view.can_go_back()
    }

    fn can_go_forward(&self, view: &Self::View) -> bool {
        view.can_go_forward()
    }

    fn register_view(&self, tab: TabId, view: &Self::View) {
        self.views.borrow_mut().insert(tab, view.clone());
    }

    fn unregister_view(&self, tab: TabId) -> Option<Self::View> {
        self.views.borrow_mut().remove(&tab)
    }

    fn view(&self, tab: TabId) -> Option<Self::View> {
        self.views.borrow().get(&tab).cloned()
    }

    fn subscribe(
        &self,
        tab: TabId,
        view: &Self::View,
        observer: Rc<dyn PageObserver<Self::View>>,
    ) -> Self::Subscription {
        let mut handlers = Vec::with_capacity(6);

        let obs = Rc::clone(&observer);
        handlers.push(view.connect_uri_notify(move |view| {
            if let Some(uri) = view.uri() {
                obs.url_changed(tab, &uri);
            }
        }));

        let obs = Rc::clone(&observer);
        handlers.push(view.connect_title_notify(move |view| {
            let title = view.title().map(|t| t.to_string()).unwrap_or_default();
            obs.title_changed(tab, &title);
        }));

        let obs = Rc::clone(&observer);
        handlers.push(view.connect_estimated_load_progress_notify(move |view| {
            obs.load_progress(tab, percent(view.estimated_load_progress()));
        }));

        let obs = Rc::clone(&observer);
        handlers.push(view.connect_load_changed(move |_, event| match event {
            webkit6::LoadEvent::Started => obs.load_started(tab),
            webkit6::LoadEvent::Finished => obs.load_finished(tab),
            _ => {}
        }));

        let obs = Rc::clone(&observer);
        handlers.push(view.connect_load_failed(move |_, _event, uri, error| {
            debug!("Load of {uri} failed in tab {tab}: {error}");
            obs.load_finished(tab);
            // Let the engine show its own error page.
            false
        }));

        handlers.push(view.connect_create(move |_, _action| {
            observer
                .new_window_requested(tab)
                .map(|view| view.upcast::<gtk::Widget>())
        }));

        handlers
    }

    fn unsubscribe(&self, view: &Self::View, subscription: Self::Subscription) {
        for handler in subscription {
            view.disconnect(handler);
        }
    }
}
