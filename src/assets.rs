use gtk::gio::prelude::*;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use storage::AppPaths;
use thiserror::Error;

/// Name the application icon is registered under.
pub const ICON_NAME: &str = "eclipse-browse";

/// Pages written into the app-data root.
const PAGES: &[(&str, &str)] = &[
    ("home_page.html", include_str!("../pages/home_page.html")),
    ("search.html", include_str!("../pages/search.html")),
];

/// Files written into `<app-data>/assets`.
const ASSET_FILES: &[(&str, &[u8])] = &[(
    "eclipse-browse.svg",
    include_bytes!("../pages/assets/eclipse-browse.svg"),
)];

#[derive(Debug, Error)]
#[error("could not install {path}: {source}")]
pub struct AssetError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

/// Mirrors the bundled pages and assets into the app-data root so the local
/// server (or `file://` fallback) can serve them.
///
/// Files are rewritten on every start so upgrades replace stale copies.
pub fn install(paths: &AppPaths) -> Result<(), AssetError> {
    for (name, contents) in PAGES {
        write(&paths.root().join(name), contents.as_bytes())?;
    }

    let assets_dir = paths.assets();
    fs::create_dir_all(&assets_dir).map_err(|source| AssetError {
        path: assets_dir.clone(),
        source,
    })?;
    for (name, contents) in ASSET_FILES {
        write(&assets_dir.join(name), contents)?;
    }

    info!("Bundled pages installed in {}", paths.root().display());
    Ok(())
}

fn write(path: &Path, contents: &[u8]) -> Result<(), AssetError> {
    if fs::read(path).is_ok_and(|existing| existing == contents) {
        debug!("{} is up to date", path.display());
        return Ok(());
    }
    fs::write(path, contents).map_err(|source| AssetError {
        path: path.to_path_buf(),
        source,
    })
}

/// Makes the mirrored icon available to the display's icon theme.
pub fn register_icon(paths: &AppPaths, display: &gtk::gdk::Display) -> Option<&'static str> {
    let assets_dir = paths.assets();
    if !assets_dir.join(format!("{ICON_NAME}.svg")).exists() {
        return None;
    }

    let icon_theme = gtk::IconTheme::for_display(display);
    icon_theme.add_search_path(&assets_dir);
    gtk::Window::set_default_icon_name(ICON_NAME);
    Some(ICON_NAME)
}

/// `file://` URI for a local path.
pub fn file_uri(path: &Path) -> String {
    gtk::gio::File::for_path(path).uri().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_mirrors_pages_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        install(&paths).unwrap();

        let home = fs::read_to_string(dir.path().join("home_page.html")).unwrap();
        assert!(home.contains(r#"src="assets/eclipse-browse.svg""#));
        assert!(home.contains(r#"action="search.html""#));
        assert!(dir.path().join("search.html").is_file());
        assert!(paths.assets().join("eclipse-browse.svg").is_file());
    }

    #[test]
    fn pages_link_relative_to_their_directory() {
        // Pages must work from both the local server and a file:// base.
        for (name, html) in PAGES {
            for attr in ["src=", "href=", "action="] {
                for quote in ['"', '\''] {
                    let absolute = format!("{attr}{quote}/");
                    assert!(!html.contains(&absolute), "{name} has {absolute}");
                }
            }
        }
    }

    #[test]
    fn install_replaces_stale_copies() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        fs::write(dir.path().join("search.html"), "old").unwrap();
        install(&paths).unwrap();
        let search = fs::read_to_string(dir.path().join("search.html")).unwrap();
        assert!(search.contains("URLSearchParams"));
    }

    #[test]
    fn install_reports_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let paths = AppPaths::new(blocker.join("nested"));
        assert!(install(&paths).is_err());
    }

    #[test]
    fn file_uri_is_absolute() {
        let uri = file_uri(Path::new("/tmp/eclipse/home_page.html"));
        assert_eq!(uri, "file:///tmp/eclipse/home_page.html");
    }
}
