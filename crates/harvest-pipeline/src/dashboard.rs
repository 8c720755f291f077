//! Dashboard scraping and the search progress probe built on it.

use async_trait::async_trait;

use harvest_browser::Page;
use harvest_search::ProgressProbe;
use harvest_types::{DashboardData, FlowError};

/// The portal exposes its state object on the window; older renders embed
/// it as an inline script instead.
pub const DASHBOARD_SCRIPT: &str = r#"(() => {
  if (window.dashboard) { return window.dashboard; }
  const body = document.body ? document.body.innerHTML : '';
  const m = body.match(/var dashboard = ({[\s\S]*?});/);
  if (m) { try { return JSON.parse(m[1]); } catch (e) {} }
  return null;
})()"#;

/// Navigate to the rewards home and read the dashboard object.
pub async fn fetch(page: &dyn Page, home_url: &str) -> Result<DashboardData, FlowError> {
    page.goto(home_url).await.map_err(FlowError::from)?;
    let value = page.evaluate(DASHBOARD_SCRIPT).await.map_err(FlowError::from)?;
    if value.is_null() {
        return Err(FlowError::TransientBrowser("dashboard object not present".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| FlowError::TransientBrowser(format!("dashboard shape changed: {e}")))
}

/// Search progress probe: refetches the dashboard and reads the persona's
/// search counter.
pub struct DashboardProbe<'a> {
    pub page: &'a dyn Page,
    pub home_url: &'a str,
    pub mobile: bool,
}

#[async_trait]
impl ProgressProbe for DashboardProbe<'_> {
    async fn remaining(&self) -> Result<i64, String> {
        let data = fetch(self.page, self.home_url).await.map_err(|e| e.to_string())?;
        Ok(data.search_counter(self.mobile).map(|c| c.remaining()).unwrap_or(0))
    }
}
