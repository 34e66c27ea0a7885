//! Turns raw address-bar input into something a tab can load.
//!
//! Resolution is a pure string transform: no network access, no filesystem,
//! no global state. Rules are applied in order:
//!
//! 1. blank input resolves to nothing;
//! 2. a local search-page URL passes through untouched;
//! 3. `http://`, `https://` and `file://` URLs, and anything under the
//!    configured pages base, pass through untouched;
//! 4. `about:home` / `about:search` map to the bundled pages;
//! 5. a dotted word without whitespace is a bare domain and gets a scheme;
//! 6. anything else is a search phrase.

use std::fmt;

/// Host prefix of the local content server as seen by the engine.
pub const LOCAL_HOST_PREFIX: &str = "http://localhost:";

/// Path and query prefix of the bundled search page.
pub const SEARCH_PATH_PREFIX: &str = "/search.html?q=";

/// Scheme added to bare domains such as `example.com`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum BareDomainScheme {
    Http,
    #[default]
    Https,
}

impl BareDomainScheme {
    fn prefix(self) -> &'static str {
        match self {
            Self::Http => "http://",
            Self::Https => "https://",
        }
    }
}

/// Where search phrases are sent.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum SearchRouting {
    /// The bundled search page, served next to the home page.
    #[default]
    LocalPage,
    /// An external engine; the encoded query is appended to this prefix.
    Engine(String),
}

/// Settings the resolver needs from the shell configuration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolverConfig {
    /// Base URL the bundled pages live under, without trailing slash.
    /// Normally `http://localhost:<port>`; a `file://` URL in degraded mode.
    pub pages_base: String,
    pub home_page: String,
    pub search_page: String,
    pub bare_domain_scheme: BareDomainScheme,
    pub search: SearchRouting,
}

impl ResolverConfig {
    /// Configuration pointing at the local content server on `port`.
    pub fn local(port: u16) -> Self {
        Self::with_base(format!("{LOCAL_HOST_PREFIX}{port}"))
    }

    /// Configuration for pages under an arbitrary base URL.
    pub fn with_base(pages_base: impl Into<String>) -> Self {
        let pages_base: String = pages_base.into();
        Self {
            pages_base: pages_base.trim_end_matches('/').to_string(),
            home_page: "home_page.html".to_string(),
            search_page: "search.html".to_string(),
            bare_domain_scheme: BareDomainScheme::default(),
            search: SearchRouting::default(),
        }
    }
}

/// Resolved classification of address-bar input.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NavigationTarget {
    /// A URL to load as-is.
    DirectUrl(String),
    /// A search phrase and the URL that runs it.
    SearchQuery { query: String, url: String },
    /// One of the bundled pages.
    InternalPage { path: String, url: String },
}

impl NavigationTarget {
    /// URL the engine should load.
    pub fn url(&self) -> &str {
        match self {
            Self::DirectUrl(url) => url,
            Self::SearchQuery { url, .. } | Self::InternalPage { url, .. } => url,
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::SearchQuery { .. })
    }
}

impl fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

/// Returns true for `http://localhost:<port>/search.html?q=...`.
pub fn is_local_search_url(input: &str) -> bool {
    let Some(rest) = input.strip_prefix(LOCAL_HOST_PREFIX) else {
        return false;
    };
    let port_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    port_len > 0 && rest[port_len..].starts_with(SEARCH_PATH_PREFIX)
}

/// Percent-encodes a search phrase, spaces becoming `+`.
pub fn encode_query(query: &str) -> String {
    urlencoding::encode(query).replace("%20", "+")
}

/// Address-bar resolver bound to one configuration.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    config: ResolverConfig,
}

impl UrlResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// URL of the bundled home page.
    pub fn home_url(&self) -> String {
        self.page_url(&self.config.home_page)
    }

    /// URL that runs `query` according to the search routing policy.
    pub fn search_url(&self, query: &str) -> String {
        let encoded = encode_query(query);
        match &self.config.search {
            SearchRouting::LocalPage => {
                format!("{}?q={encoded}", self.page_url(&self.config.search_page))
            }
            SearchRouting::Engine(prefix) => format!("{prefix}{encoded}"),
        }
    }

    /// True for URLs under the pages base, whatever its scheme.
    fn is_page_url(&self, input: &str) -> bool {
        input
            .strip_prefix(self.config.pages_base.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn page_url(&self, page: &str) -> String {
        format!("{}/{}", self.config.pages_base, page.trim_start_matches('/'))
    }

    /// Resolves input using the standard local-search detection.
    pub fn resolve(&self, input: &str) -> Option<NavigationTarget> {
        self.resolve_with(input, is_local_search_url)
    }

    /// Resolves input, with `is_internal_search` deciding which inputs are
    /// already search-page URLs and must pass through verbatim.
    pub fn resolve_with<P>(&self, input: &str, is_internal_search: P) -> Option<NavigationTarget>
    where
        P: Fn(&str) -> bool,
    {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if is_internal_search(trimmed) {
            return Some(NavigationTarget::DirectUrl(trimmed.to_string()));
        }

        if ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme))
            || self.is_page_url(trimmed)
        {
            return Some(NavigationTarget::DirectUrl(trimmed.to_string()));
        }

        let has_whitespace = trimmed.chars().any(char::is_whitespace);

        if !has_whitespace {
            let internal = match trimmed {
                "about:home" => Some(&self.config.home_page),
                "about:search" => Some(&self.config.search_page),
                _ => None,
            };
            if let Some(path) = internal {
                return Some(NavigationTarget::InternalPage {
                    path: path.clone(),
                    url: self.page_url(path),
                });
            }

            if trimmed.contains('.') {
                let scheme = self.config.bare_domain_scheme.prefix();
                return Some(NavigationTarget::DirectUrl(format!("{scheme}{trimmed}")));
            }
        }

        Some(NavigationTarget::SearchQuery {
            query: trimmed.to_string(),
            url: self.search_url(trimmed),
        })
    }
}
