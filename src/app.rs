use adw::prelude::*;
use gtk::{gio, glib};
use log::{error, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use engine::{PageObserver, WebKitEngine};
use resolver::UrlResolver;
use storage::{
    AppPaths, FileHistoryLog, HistoryLog, JsonBookmarkStore, JsonSettingsStore, SettingsStore,
};
use tabs::{CloseOutcome, LoadState, SessionObserver, TabId, TabSession};

use crate::assets;
use crate::config::ShellConfig;
use crate::shell::BrowserShell;

const APP_ID: &str = "org.eclipsebrowse.EclipseBrowse";
pub const APP_TITLE: &str = "EclipseBrowse";

type View = webkit6::WebView;
type Shell = BrowserShell<WebKitEngine>;

/// Window accelerators, by action name.
const ACCELS: &[(&str, &str)] = &[
    ("win.new-tab", "<Control>t"),
    ("win.close-tab", "<Control>w"),
    ("win.focus-url", "<Control>l"),
    ("win.bookmark", "<Control>d"),
    ("win.next-tab", "<Control>Tab"),
    ("win.reload", "F5"),
    ("win.quit", "<Control>q"),
];

pub fn run(config: ShellConfig, pages_base: String) -> glib::ExitCode {
    let app = adw::Application::builder().application_id(APP_ID).build();
    let window: Rc<RefCell<Option<adw::ApplicationWindow>>> = Rc::default();

    app.connect_activate(move |app| {
        if let Some(window) = window.borrow().as_ref() {
            window.present();
            return;
        }
        let built = build_ui(app, &config, &pages_base);
        *window.borrow_mut() = Some(built);
    });
    app.run()
}

/// Maps the settings theme onto the libadwaita colour scheme.
fn color_scheme(theme: &str) -> adw::ColorScheme {
    match theme {
        "dark" => adw::ColorScheme::ForceDark,
        "light" => adw::ColorScheme::ForceLight,
        _ => adw::ColorScheme::Default,
    }
}

fn window_title(page_title: &str) -> String {
    format!("{page_title} - {APP_TITLE}")
}

fn status_text(session: &TabSession) -> String {
    match session.state() {
        LoadState::Navigating => format!("Loading... {}%", session.progress()),
        LoadState::Created | LoadState::Loaded => String::new(),
    }
}

fn build_ui(
    app: &adw::Application,
    config: &ShellConfig,
    pages_base: &str,
) -> adw::ApplicationWindow {
    let settings_store = JsonSettingsStore::new(config.paths.settings_file());
    let settings = settings_store.load();
    adw::StyleManager::default().set_color_scheme(color_scheme(&settings.theme));

    let chrome = Rc::new(Chrome::build(app, config));
    if let Some(display) = gtk::gdk::Display::default() {
        if let Some(icon_name) = assets::register_icon(&config.paths, &display) {
            chrome.window.set_icon_name(Some(icon_name));
        }
    }

    let engine = Rc::new(WebKitEngine::new(&config.engine_profile()));
    let resolver = UrlResolver::new(config.resolver_config(pages_base));
    let history: Rc<dyn HistoryLog> = Rc::new(FileHistoryLog::new(config.paths.history_file()));
    let bookmarks = JsonBookmarkStore::new(config.paths.bookmarks_file());

    let shell = Rc::new_cyclic(|weak: &Weak<RefCell<Shell>>| {
        let pages = Controller::new(weak.clone(), Rc::clone(&chrome), bookmarks.clone());
        RefCell::new(BrowserShell::new(
            engine,
            resolver,
            history,
            Rc::clone(&chrome) as Rc<dyn SessionObserver>,
            Rc::new(pages) as Rc<dyn PageObserver<View>>,
        ))
    });
    let controller = Controller::new(Rc::downgrade(&shell), Rc::clone(&chrome), bookmarks);

    shell.borrow_mut().start(&settings.last_session);
    let (views, active, labels) = {
        let shell = shell.borrow();
        let labels: HashMap<TabId, String> = shell
            .sessions()
            .iter()
            .map(|session| (session.id(), session.label()))
            .collect();
        (shell.tab_views(), shell.active_tab(), labels)
    };
    for (tab, view) in &views {
        let label = labels.get(tab).map(String::as_str).unwrap_or_default();
        controller.attach_page(*tab, view, label);
    }
    chrome.show(active);

    controller.connect_widgets();
    install_actions(app, &controller);

    let shell_for_close = Rc::clone(&shell);
    chrome.window.connect_close_request(move |_| {
        let mut settings = settings.clone();
        match shell_for_close.try_borrow() {
            Ok(shell) => settings.last_session = shell.session_urls(),
            Err(_) => warn!("Shell busy at shutdown; keeping previous session"),
        }
        match settings_store.save(&settings) {
            Ok(()) => info!("Saved {} tab(s) for next session", settings.last_session.len()),
            Err(e) => error!("Error saving settings: {e}"),
        }
        glib::Propagation::Proceed
    });

    chrome.window.present();
    chrome.window.clone()
}

fn install_actions(app: &adw::Application, controller: &Controller) {
    let window = &controller.chrome.window;

    let c = controller.clone();
    add_action(window, "new-tab", move || c.open_tab(None));
    let c = controller.clone();
    add_action(window, "close-tab", move || c.close_active());
    let c = controller.clone();
    add_action(window, "focus-url", move || c.chrome.focus_url());
    let c = controller.clone();
    add_action(window, "bookmark", move || c.bookmark());
    let c = controller.clone();
    add_action(window, "next-tab", move || c.next_tab());
    let c = controller.clone();
    add_action(window, "reload", move || c.reload());
    let c = controller.clone();
    add_action(window, "about", move || c.chrome.show_about());
    let w = window.clone();
    add_action(window, "quit", move || w.close());

    for (action, accel) in ACCELS {
        app.set_accels_for_action(action, &[*accel]);
    }
}

fn add_action(window: &adw::ApplicationWindow, name: &str, activate: impl Fn() + 'static) {
    let action = gio::SimpleAction::new(name, None);
    action.connect_activate(move |_, _| activate());
    window.add_action(&action);
}

/// Runs `f` against the shell now, or on the next idle if the shell is
/// already borrowed further up the stack.
///
/// Engine signals can fire synchronously from inside a shell call (e.g. the
/// URI notification during `load_uri`); deferring keeps the UI thread the
/// only writer without tripping the `RefCell`.
fn dispatch<F>(shell: &Weak<RefCell<Shell>>, f: F)
where
    F: FnOnce(&mut Shell) + 'static,
{
    let Some(shell) = shell.upgrade() else {
        return;
    };
    if let Ok(mut borrowed) = shell.try_borrow_mut() {
        f(&mut borrowed);
        return;
    }

    let weak = Rc::downgrade(&shell);
    glib::idle_add_local_once(move || {
        if let Some(shell) = weak.upgrade() {
            match shell.try_borrow_mut() {
                Ok(mut borrowed) => f(&mut borrowed),
                Err(_) => warn!("Dropping deferred shell update: shell still busy"),
            };
        }
    });
}

struct TabPage {
    view: View,
    label: gtk::Label,
}

struct Toolbar {
    back: gtk::Button,
    forward: gtk::Button,
    reload: gtk::Button,
    home: gtk::Button,
    new_tab: gtk::Button,
}

/// Window widgets. Mirrors session state; owns none of it.
struct Chrome {
    window: adw::ApplicationWindow,
    notebook: gtk::Notebook,
    url_entry: gtk::Entry,
    status: gtk::Label,
    toolbar: Toolbar,
    pages: RefCell<HashMap<TabId, TabPage>>,
    paths: AppPaths,
}

impl Chrome {
    fn build(app: &adw::Application, config: &ShellConfig) -> Self {
        let toolbar = Toolbar {
            back: icon_button("go-previous-symbolic", "Back"),
            forward: icon_button("go-next-symbolic", "Forward"),
            reload: icon_button("view-refresh-symbolic", "Reload"),
            home: icon_button("go-home-symbolic", "Home"),
            new_tab: icon_button("tab-new-symbolic", "New Tab"),
        };
        toolbar.back.set_sensitive(false);
        toolbar.forward.set_sensitive(false);

        let url_entry = gtk::Entry::builder()
            .placeholder_text("Enter URL or search...")
            .hexpand(true)
            .input_purpose(gtk::InputPurpose::Url)
            .build();

        let menu = gio::Menu::new();
        menu.append(Some("New Tab"), Some("win.new-tab"));
        menu.append(Some("Close Tab"), Some("win.close-tab"));
        menu.append(Some("Bookmark Page"), Some("win.bookmark"));
        menu.append(Some("About"), Some("win.about"));
        menu.append(Some("Quit"), Some("win.quit"));
        let menu_button = gtk::MenuButton::builder()
            .icon_name("open-menu-symbolic")
            .menu_model(&menu)
            .build();

        let header = adw::HeaderBar::new();
        header.pack_start(&toolbar.back);
        header.pack_start(&toolbar.forward);
        header.pack_start(&toolbar.reload);
        header.pack_start(&toolbar.home);
        header.pack_start(&toolbar.new_tab);
        header.set_title_widget(Some(&url_entry));
        header.pack_end(&menu_button);

        let notebook = gtk::Notebook::builder()
            .scrollable(true)
            .hexpand(true)
            .vexpand(true)
            .build();

        let status = gtk::Label::builder()
            .halign(gtk::Align::Start)
            .margin_start(8)
            .margin_end(8)
            .margin_top(2)
            .margin_bottom(2)
            .build();
        status.add_css_class("dim-label");
        status.add_css_class("caption");

        let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
        content.append(&header);
        content.append(&notebook);
        content.append(&status);

        let window = adw::ApplicationWindow::builder()
            .application(app)
            .title(APP_TITLE)
            .default_width(config.window.default_width)
            .default_height(config.window.default_height)
            .content(&content)
            .build();
        window.set_size_request(config.window.min_width, config.window.min_height);

        Self {
            window,
            notebook,
            url_entry,
            status,
            toolbar,
            pages: RefCell::new(HashMap::new()),
            paths: config.paths.clone(),
        }
    }

    fn add_page(&self, tab: TabId, view: &View, title: &str, on_close: impl Fn() + 'static) {
        let label = gtk::Label::new(Some(title));
        let close = gtk::Button::from_icon_name("window-close-symbolic");
        close.add_css_class("flat");
        close.set_tooltip_text(Some("Close Tab"));
        close.connect_clicked(move |_| on_close());

        let tab_box = gtk::Box::new(gtk::Orientation::Horizontal, 4);
        tab_box.append(&label);
        tab_box.append(&close);

        // The page must be known before the notebook emits switch-page.
        self.pages.borrow_mut().insert(
            tab,
            TabPage {
                view: view.clone(),
                label,
            },
        );
        self.notebook.append_page(view, Some(&tab_box));
    }

    fn remove_page(&self, tab: TabId) {
        let Some(page) = self.pages.borrow_mut().remove(&tab) else {
            return;
        };
        if let Some(index) = self.notebook.page_num(&page.view) {
            self.notebook.remove_page(Some(index));
        }
    }

    fn show(&self, tab: TabId) {
        let view = self.pages.borrow().get(&tab).map(|page| page.view.clone());
        if let Some(index) = view.and_then(|view| self.notebook.page_num(&view)) {
            self.notebook.set_current_page(Some(index));
        }
    }

    fn tab_for_page(&self, widget: &gtk::Widget) -> Option<TabId> {
        self.pages
            .borrow()
            .iter()
            .find(|(_, page)| page.view.upcast_ref::<gtk::Widget>() == widget)
            .map(|(tab, _)| *tab)
    }

    fn set_history_nav(&self, (back, forward): (bool, bool)) {
        self.toolbar.back.set_sensitive(back);
        self.toolbar.forward.set_sensitive(forward);
    }

    fn focus_url(&self) {
        self.url_entry.grab_focus();
        self.url_entry.select_region(0, -1);
    }

    fn show_about(&self) {
        let about = gtk::AboutDialog::builder()
            .transient_for(&self.window)
            .modal(true)
            .program_name(APP_TITLE)
            .version(env!("CARGO_PKG_VERSION"))
            .comments(about_comments(&self.paths))
            .logo_icon_name(assets::ICON_NAME)
            .license_type(gtk::License::MitX11)
            .build();
        about.present();
    }
}

/// About-dialog blurb with the directories the browser writes to.
fn about_comments(paths: &AppPaths) -> String {
    format!(
        "A tabbed web browser with a built-in home and search page.\n\n\
         Data: {}\nCache: {}\nLogs: {}",
        paths.root().display(),
        paths.cache().display(),
        paths.logs().display()
    )
}

fn icon_button(icon: &str, tooltip: &str) -> gtk::Button {
    let button = gtk::Button::from_icon_name(icon);
    button.set_tooltip_text(Some(tooltip));
    button
}

impl SessionObserver for Chrome {
    fn url_changed(&self, session: &TabSession) {
        if session.is_active() {
            self.url_entry.set_text(session.url());
        }
    }

    fn title_changed(&self, session: &TabSession) {
        if let Some(page) = self.pages.borrow().get(&session.id()) {
            page.label.set_text(&session.label());
            page.label.set_tooltip_text(Some(session.title()));
        }
        if session.is_active() {
            self.window.set_title(Some(&window_title(session.title())));
        }
    }

    fn progress_changed(&self, session: &TabSession) {
        if session.is_active() {
            self.status.set_text(&status_text(session));
        }
    }

    fn active_changed(&self, session: &TabSession) {
        self.show(session.id());
        self.url_entry.set_text(session.url());
        self.window.set_title(Some(&window_title(session.title())));
        self.status.set_text(&status_text(session));
    }
}

/// Bridges widget signals and engine events into the shell.
#[derive(Clone)]
struct Controller {
    shell: Weak<RefCell<Shell>>,
    chrome: Rc<Chrome>,
    bookmarks: JsonBookmarkStore,
}

impl Controller {
    fn new(shell: Weak<RefCell<Shell>>, chrome: Rc<Chrome>, bookmarks: JsonBookmarkStore) -> Self {
        Self {
            shell,
            chrome,
            bookmarks,
        }
    }

    fn with_shell<F>(&self, f: F)
    where
        F: FnOnce(&mut Shell, &Chrome) + 'static,
    {
        let chrome = Rc::clone(&self.chrome);
        dispatch(&self.shell, move |shell| f(shell, &chrome));
    }

    fn connect_widgets(&self) {
        let chrome = &self.chrome;

        let c = self.clone();
        chrome
            .url_entry
            .connect_activate(move |entry| c.navigate(entry.text().to_string()));

        let c = self.clone();
        chrome.toolbar.back.connect_clicked(move |_| {
            c.with_shell(|shell, _| shell.go_back(shell.active_tab()));
        });
        let c = self.clone();
        chrome.toolbar.forward.connect_clicked(move |_| {
            c.with_shell(|shell, _| shell.go_forward(shell.active_tab()));
        });
        let c = self.clone();
        chrome.toolbar.reload.connect_clicked(move |_| c.reload());
        let c = self.clone();
        chrome.toolbar.home.connect_clicked(move |_| {
            c.with_shell(|shell, _| shell.navigate_home(shell.active_tab()));
        });
        let c = self.clone();
        chrome.toolbar.new_tab.connect_clicked(move |_| c.open_tab(None));

        let c = self.clone();
        chrome.notebook.connect_switch_page(move |_, page, _| {
            if let Some(tab) = c.chrome.tab_for_page(page) {
                c.with_shell(move |shell, chrome| {
                    shell.activate(tab);
                    chrome.set_history_nav(shell.history_nav(tab));
                });
            }
        });
    }

    fn attach_page(&self, tab: TabId, view: &View, label: &str) {
        let c = self.clone();
        self.chrome.add_page(tab, view, label, move || c.close_tab(tab));
    }

    fn navigate(&self, input: String) {
        self.with_shell(move |shell, _| {
            if shell.navigate_active(&input).is_none() {
                info!("Ignoring blank address-bar input");
            }
        });
    }

    fn open_tab(&self, input: Option<String>) {
        let c = self.clone();
        self.with_shell(move |shell, chrome| {
            let tab = shell.open_tab(input.as_deref());
            let label = shell.sessions().active().label();
            if let Some(view) = shell.view(tab) {
                c.attach_page(tab, &view, &label);
                chrome.show(tab);
            }
            chrome.focus_url();
        });
    }

    fn close_tab(&self, tab: TabId) {
        self.with_shell(move |shell, chrome| match shell.close_tab(tab) {
            CloseOutcome::Closed { next_active } => {
                chrome.show(next_active);
                chrome.remove_page(tab);
                chrome.set_history_nav(shell.history_nav(next_active));
            }
            CloseOutcome::LastTab => info!("Not closing the last tab"),
            CloseOutcome::Unknown => warn!("Close requested for unknown tab {tab}"),
        });
    }

    fn close_active(&self) {
        let c = self.clone();
        self.with_shell(move |shell, _| {
            let tab = shell.active_tab();
            // Re-dispatched: closing touches the notebook.
            c.close_tab(tab);
        });
    }

    fn next_tab(&self) {
        self.with_shell(|shell, chrome| {
            let tab = shell.next_tab();
            chrome.set_history_nav(shell.history_nav(tab));
        });
    }

    fn reload(&self) {
        self.with_shell(|shell, _| shell.reload(shell.active_tab()));
    }

    fn bookmark(&self) {
        let store = self.bookmarks.clone();
        self.with_shell(move |shell, chrome| match shell.bookmark_active(&store) {
            Ok(true) => chrome.status.set_text("Bookmark added"),
            Ok(false) => chrome.status.set_text("Already bookmarked"),
            Err(e) => error!("Error saving bookmark: {e}"),
        });
    }
}

impl PageObserver<View> for Controller {
    fn url_changed(&self, tab: TabId, url: &str) {
        let url = url.to_string();
        self.with_shell(move |shell, chrome| {
            shell.handle_url_changed(tab, &url);
            if shell.active_tab() == tab {
                chrome.set_history_nav(shell.history_nav(tab));
            }
        });
    }

    fn title_changed(&self, tab: TabId, title: &str) {
        let title = title.to_string();
        self.with_shell(move |shell, _| shell.handle_title_changed(tab, &title));
    }

    fn load_started(&self, tab: TabId) {
        self.with_shell(move |shell, _| shell.handle_load_started(tab));
    }

    fn load_progress(&self, tab: TabId, percent: u8) {
        self.with_shell(move |shell, _| shell.handle_load_progress(tab, percent));
    }

    fn load_finished(&self, tab: TabId) {
        self.with_shell(move |shell, chrome| {
            shell.handle_load_finished(tab);
            if shell.active_tab() == tab {
                chrome.set_history_nav(shell.history_nav(tab));
            }
        });
    }

    fn new_window_requested(&self, opener: TabId) -> Option<View> {
        let shell = self.shell.upgrade()?;
        let Ok(mut borrowed) = shell.try_borrow_mut() else {
            warn!("New window from tab {opener} refused: shell busy");
            return None;
        };
        let view = borrowed.open_popup_tab(opener)?;
        let tab = borrowed.active_tab();
        let label = borrowed.sessions().active().label();
        drop(borrowed);

        self.attach_page(tab, &view, &label);
        self.chrome.show(tab);
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabs::{NoopObserver, SessionCollection, TabManager};

    #[test]
    fn theme_maps_to_color_scheme() {
        assert_eq!(color_scheme("dark"), adw::ColorScheme::ForceDark);
        assert_eq!(color_scheme("light"), adw::ColorScheme::ForceLight);
        assert_eq!(color_scheme("solarized"), adw::ColorScheme::Default);
    }

    #[test]
    fn about_lists_app_directories() {
        let paths = AppPaths::new("/data/EclipseBrowse");
        let comments = about_comments(&paths);
        assert!(comments.contains("Data: /data/EclipseBrowse\n"));
        assert!(comments.contains("Cache: /data/EclipseBrowse/Cache\n"));
        assert!(comments.ends_with("Logs: /data/EclipseBrowse/Logs"));
    }

    #[test]
    fn window_title_format() {
        assert_eq!(window_title("Example Domain"), "Example Domain - EclipseBrowse");
    }

    #[test]
    fn status_shows_progress_while_loading() {
        let mut sessions = SessionCollection::new(Rc::new(NoopObserver));
        let tab = sessions.active_tab();
        let session = sessions.get_mut(tab).unwrap();
        assert_eq!(status_text(session), "");

        session.begin_navigation("https://example.com");
        session.update_progress(42);
        assert_eq!(status_text(session), "Loading... 42%");

        session.finish_load();
        assert_eq!(status_text(session), "");
    }
}
