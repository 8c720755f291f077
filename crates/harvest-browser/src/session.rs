//! Scoped browser session lifecycle. Contexts are expensive and
//! observable; exactly one exists per persona at a time and it is always
//! released, whatever path the flow exits through.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use harvest_rand::SecureRng;
use harvest_types::{Account, Persona};

use crate::driver::{BrowserContext, BrowserDriver, ContextSpec, Page};
use crate::error::{BrowserError, Result};
use crate::fingerprint::Fingerprint;
use crate::version_cache::EdgeVersionCache;

/// Anti-detection payload installed into a context before any navigation:
/// init scripts and the header rewrite set. Produced by the stealth layer;
/// opaque to this crate.
#[derive(Debug, Clone, Default)]
pub struct StealthBundle {
    pub init_scripts: Vec<String>,
    pub extra_headers: Vec<(String, String)>,
}

pub struct SessionFactory {
    driver: Arc<dyn BrowserDriver>,
    versions: EdgeVersionCache,
    profiles_dir: PathBuf,
    home_url: String,
    timezone: String,
    locale: String,
    rng: SecureRng,
}

impl SessionFactory {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        profiles_dir: impl Into<PathBuf>,
        home_url: impl Into<String>,
        timezone: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            versions: EdgeVersionCache::default(),
            profiles_dir: profiles_dir.into(),
            home_url: home_url.into(),
            timezone: timezone.into(),
            locale: locale.into(),
            rng: SecureRng::new(),
        }
    }

    pub fn with_version_cache(mut self, versions: EdgeVersionCache) -> Self {
        self.versions = versions;
        self
    }

    /// Fresh fingerprint for a new session. Exposed separately so the
    /// stealth bundle can be rendered for exactly this fingerprint before
    /// the context exists.
    pub async fn fingerprint(&self, persona: Persona) -> Fingerprint {
        let version = self.versions.get().await;
        Fingerprint::generate(persona, version, &self.timezone, &self.locale, &self.rng)
    }

    /// Launch a context for `account`, install the stealth bundle, open
    /// one page on the rewards home. On any failure past launch the
    /// context is closed before the error propagates.
    pub async fn build(
        &self,
        account: &Account,
        fingerprint: Fingerprint,
        bundle: &StealthBundle,
    ) -> Result<SessionGuard> {
        let profile_dir = self
            .profiles_dir
            .join(profile_name(&account.email))
            .join(fingerprint.persona.as_str());

        let spec = ContextSpec {
            profile_dir,
            fingerprint: fingerprint.clone(),
            proxy: account.proxy.as_ref().map(|p| p.url()),
        };

        let context = self.driver.launch(spec).await?;
        match Self::prepare(&context, &self.home_url, bundle).await {
            Ok(page) => {
                debug!(persona = %fingerprint.persona, "browser session ready");
                Ok(SessionGuard {
                    context,
                    page,
                    fingerprint,
                    closed: AtomicBool::new(false),
                })
            }
            Err(err) => {
                if let Err(close_err) = context.close().await {
                    warn!(%close_err, "context close after failed setup also failed");
                }
                Err(err)
            }
        }
    }

    async fn prepare(
        context: &Arc<dyn BrowserContext>,
        home_url: &str,
        bundle: &StealthBundle,
    ) -> Result<Arc<dyn Page>> {
        for script in &bundle.init_scripts {
            context.add_init_script(script).await?;
        }
        if !bundle.extra_headers.is_empty() {
            context.set_extra_headers(&bundle.extra_headers).await?;
        }
        let page = context.new_page().await?;
        page.goto(home_url).await?;
        Ok(page)
    }
}

/// A live session. `close` is idempotent; dropping an unclosed guard
/// schedules the close on the runtime so no context leaks even on panic
/// paths.
pub struct SessionGuard {
    context: Arc<dyn BrowserContext>,
    page: Arc<dyn Page>,
    fingerprint: Fingerprint,
    closed: AtomicBool,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("fingerprint", &self.fingerprint)
            .field("closed", &self.closed)
            .finish()
    }
}

impl SessionGuard {
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    pub fn context(&self) -> &Arc<dyn BrowserContext> {
        &self.context
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Open an additional page in this context (activity handlers run in
    /// their own tab and must close it themselves).
    pub async fn new_page(&self) -> Result<Arc<dyn Page>> {
        if self.context.is_closed() {
            return Err(BrowserError::TargetClosed("context already closed".into()));
        }
        self.context.new_page().await
    }

    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.context.close().await
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let context = Arc::clone(&self.context);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = context.close().await {
                    warn!(%err, "context close on drop failed");
                }
            });
        } else {
            warn!("session guard dropped outside a runtime; context may leak");
        }
    }
}

fn profile_name(email: &str) -> String {
    email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
