use std::env;
use std::path::PathBuf;

use engine::EngineProfile;
use resolver::{BareDomainScheme, ResolverConfig, SearchRouting};
use server::ServerConfig;
use storage::AppPaths;
use thiserror::Error;

/// Overrides the application-data root.
pub const DATA_DIR_ENV: &str = "ECLIPSE_BROWSE_DATA_DIR";

const DATA_DIR_NAME: &str = "EclipseBrowse";
const PROFILE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no application data directory; set ECLIPSE_BROWSE_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub default_width: i32,
    pub default_height: i32,
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_width: 1200,
            default_height: 800,
            min_width: 800,
            min_height: 600,
        }
    }
}

/// Everything the shell needs to know at startup, built once in `main`.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub paths: AppPaths,
    pub server: ServerConfig,
    pub bare_domain_scheme: BareDomainScheme,
    pub search: SearchRouting,
    pub window: WindowConfig,
}

impl ShellConfig {
    /// Locates the data root from the environment or the platform data dir.
    pub fn discover() -> Result<Self, ConfigError> {
        let root = match env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join(DATA_DIR_NAME),
        };
        Ok(Self::with_data_dir(root))
    }

    pub fn with_data_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: AppPaths::new(root),
            server: ServerConfig::default(),
            bare_domain_scheme: BareDomainScheme::Https,
            search: SearchRouting::LocalPage,
            window: WindowConfig::default(),
        }
    }

    /// Resolver settings for pages reachable under `pages_base`.
    pub fn resolver_config(&self, pages_base: &str) -> ResolverConfig {
        ResolverConfig {
            home_page: self.server.index.clone(),
            bare_domain_scheme: self.bare_domain_scheme,
            search: self.search.clone(),
            ..ResolverConfig::with_base(pages_base)
        }
    }

    pub fn engine_profile(&self) -> EngineProfile {
        EngineProfile {
            data_dir: self.paths.profile(PROFILE_NAME),
            cache_dir: self.paths.cache(),
        }
    }
}
