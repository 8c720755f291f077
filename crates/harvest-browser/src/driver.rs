//! The seam to the actual browser driver. Everything above this module
//! talks to these traits; the concrete CDP-speaking implementation is an
//! external collaborator, and tests run against `scripted`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::fingerprint::Fingerprint;

/// What the driver needs to materialise a context: a persistent profile
/// directory per account/persona, the fingerprint to honour, and an
/// optional proxy URL.
#[derive(Debug, Clone)]
pub struct ContextSpec {
    pub profile_dir: PathBuf,
    pub fingerprint: Fingerprint,
    pub proxy: Option<String>,
}

/// Result of a navigation, as far as the detector cares: final status,
/// response headers, landing URL.
#[derive(Debug, Clone)]
pub struct NavigationInfo {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub url: String,
}

impl NavigationInfo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<NavigationInfo>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    /// Full visible document text (not markup).
    async fn text(&self) -> Result<String>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    async fn click(&self, selector: &str) -> Result<()>;
    /// Type into `selector` with one delay entry consumed per character.
    async fn type_text(&self, selector: &str, text: &str, delays: &[Duration]) -> Result<()>;
    async fn press_key(&self, key: &str) -> Result<()>;
    /// Wheel-scroll by `dy` pixels (negative is up).
    async fn scroll(&self, dy: i64) -> Result<()>;
    /// Move the pointer to viewport coordinates.
    async fn mouse_move(&self, x: f64, y: f64) -> Result<()>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;
    async fn inner_text(&self, selector: &str) -> Result<Option<String>>;
    /// DOM-level removal; last resort for dialogs that refuse dismissal.
    async fn remove_element(&self, selector: &str) -> Result<bool>;
    /// Console messages emitted since the last drain.
    async fn drain_console(&self) -> Result<Vec<String>>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Must be called before the first navigation; the driver injects the
    /// script into every new document.
    async fn add_init_script(&self, script: &str) -> Result<()>;
    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()>;
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
    async fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, spec: ContextSpec) -> Result<Arc<dyn BrowserContext>>;
}
