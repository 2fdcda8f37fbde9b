//! Serve a local directory tree over HTTP.
//!
//! Directories list as JSON, files download with range and conditional
//! request support, and POST/PUT create or replace files. Browsers asking for
//! `text/html` get a rendered listing page instead of the JSON API.

pub mod config;
pub mod content;
pub mod error;
pub mod handler;
pub mod path;
pub mod routes;
pub mod store;
pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;
pub use error::FileServerError;
pub use handler::{CompositeRouter, RequestHandler};

use content::ContentHandler;
use store::FileStore;
use ui::{UiAssets, UiHandler};

/// Process-wide state, built once before serving and never mutated.
#[derive(Clone)]
pub struct AppState {
    /// Root directory to serve files from
    pub root_dir: PathBuf,
    /// Configuration
    pub config: Arc<Config>,
    /// Embedded UI bundle and parsed listing template
    pub assets: Arc<UiAssets>,
}

impl AppState {
    /// Create a new AppState with the given root directory and default config.
    pub fn new(root_dir: PathBuf) -> Result<Self, FileServerError> {
        Self::with_config(root_dir, Config::default())
    }

    /// Create a new AppState with the given root directory and config.
    pub fn with_config(root_dir: PathBuf, config: Config) -> Result<Self, FileServerError> {
        Ok(Self {
            root_dir,
            config: Arc::new(config),
            assets: Arc::new(UiAssets::load()?),
        })
    }

    /// The handler chain: UI first so browsers get the rendered listing,
    /// then the file API which accepts everything.
    pub fn handlers(&self) -> CompositeRouter {
        let content = Arc::new(ContentHandler::new(FileStore::new(self.root_dir.clone())));

        let mut router = CompositeRouter::default();
        if self.config.ui {
            router = router.push(Arc::new(UiHandler::new(
                content.clone(),
                self.assets.clone(),
            )));
        }
        router.push(content)
    }
}
