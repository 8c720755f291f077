//! In-memory browser driver for tests. A page is a small state machine:
//! actions (`click:…`, `type:…`, `goto:…`, `press:…`, `remove:…`,
//! `eval:…`) move it between prepared states, and every observation the
//! real driver could make (url, title, visibility, text, attributes,
//! console) is read from the current state.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::driver::{BrowserContext, BrowserDriver, ContextSpec, NavigationInfo, Page};
use crate::error::{BrowserError, Result};

#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub visible: HashSet<String>,
    pub text: String,
    /// `(selector, attribute)` → value.
    pub attributes: HashMap<(String, String), String>,
    /// selector → innerText.
    pub texts: HashMap<String, String>,
    /// Script substring → evaluation result.
    pub eval: Vec<(String, serde_json::Value)>,
    pub console: Vec<String>,
    /// Action key → index of the state to move to.
    pub transitions: Vec<(String, usize)>,
    pub fail_navigation: Option<String>,
    /// Every interaction on this state errors with TargetClosed.
    pub target_closed: bool,
}

pub struct PageStateBuilder {
    state: PageState,
}

impl PageStateBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        let mut state = PageState { url: url.into(), status: 200, ..Default::default() };
        state.title = String::new();
        Self { state }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.state.title = title.into();
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.state.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.headers.push((name.into(), value.into()));
        self
    }

    pub fn visible(mut self, selector: impl Into<String>) -> Self {
        self.state.visible.insert(selector.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.state.text = text.into();
        self
    }

    pub fn attr(
        mut self,
        selector: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.state.attributes.insert((selector.into(), name.into()), value.into());
        self
    }

    pub fn inner_text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.state.texts.insert(selector.into(), text.into());
        self
    }

    pub fn eval(mut self, script_substring: impl Into<String>, result: serde_json::Value) -> Self {
        self.state.eval.push((script_substring.into(), result));
        self
    }

    pub fn console(mut self, message: impl Into<String>) -> Self {
        self.state.console.push(message.into());
        self
    }

    /// `action` is an action key: `click:<sel>`, `type:<sel>`,
    /// `press:<key>`, `goto:<url-prefix>`, `remove:<sel>`, `eval:<substr>`.
    pub fn on(mut self, action: impl Into<String>, target: usize) -> Self {
        self.state.transitions.push((action.into(), target));
        self
    }

    pub fn fail_navigation(mut self, message: impl Into<String>) -> Self {
        self.state.fail_navigation = Some(message.into());
        self
    }

    pub fn target_closed(mut self) -> Self {
        self.state.target_closed = true;
        self
    }

    pub fn build(self) -> PageState {
        self.state
    }
}

pub struct ScriptedPage {
    states: Vec<PageState>,
    current: Mutex<usize>,
    current_url: Mutex<String>,
    actions: Mutex<Vec<String>>,
    pending_console: Mutex<Vec<String>>,
    closed: AtomicBool,
    navigations: Arc<AtomicUsize>,
}

impl ScriptedPage {
    fn new(states: Vec<PageState>, navigations: Arc<AtomicUsize>) -> Arc<Self> {
        let url = states.first().map(|s| s.url.clone()).unwrap_or_default();
        let console = states.first().map(|s| s.console.clone()).unwrap_or_default();
        Arc::new(Self {
            states,
            current: Mutex::new(0),
            current_url: Mutex::new(url),
            actions: Mutex::new(Vec::new()),
            pending_console: Mutex::new(console),
            closed: AtomicBool::new(false),
            navigations,
        })
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn current_index(&self) -> usize {
        *self.current.lock().unwrap()
    }

    fn state(&self) -> PageState {
        let idx = *self.current.lock().unwrap();
        self.states[idx].clone()
    }

    fn guard_alive(&self) -> Result<PageState> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::TargetClosed("page closed".into()));
        }
        let state = self.state();
        if state.target_closed {
            return Err(BrowserError::TargetClosed("Target closed".into()));
        }
        Ok(state)
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }

    fn transition(&self, key: &str) {
        let state = self.state();
        let target = state.transitions.iter().find_map(|(k, t)| (k == key).then_some(*t));
        if let Some(target) = target {
            self.enter(target, None);
        }
    }

    fn transition_goto(&self, url: &str) -> bool {
        let state = self.state();
        for (key, target) in &state.transitions {
            if let Some(prefix) = key.strip_prefix("goto:") {
                if url.starts_with(prefix) {
                    self.enter(*target, Some(url));
                    return true;
                }
            }
        }
        false
    }

    fn enter(&self, index: usize, requested_url: Option<&str>) {
        let index = index.min(self.states.len() - 1);
        *self.current.lock().unwrap() = index;
        let state = &self.states[index];
        let url = if state.url.is_empty() {
            requested_url.unwrap_or("").to_string()
        } else {
            state.url.clone()
        };
        if !url.is_empty() {
            *self.current_url.lock().unwrap() = url;
        }
        self.pending_console.lock().unwrap().extend(state.console.iter().cloned());
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<NavigationInfo> {
        let state = self.guard_alive()?;
        if let Some(message) = &state.fail_navigation {
            return Err(BrowserError::Navigation(message.clone()));
        }
        self.record(format!("goto:{url}"));
        self.navigations.fetch_add(1, Ordering::SeqCst);

        if !self.transition_goto(url) {
            *self.current_url.lock().unwrap() = url.to_string();
        }
        let state = self.state();
        Ok(NavigationInfo {
            status: state.status,
            headers: state.headers.clone(),
            url: self.current_url.lock().unwrap().clone(),
        })
    }

    async fn current_url(&self) -> Result<String> {
        self.guard_alive()?;
        Ok(self.current_url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.guard_alive()?.title)
    }

    async fn text(&self) -> Result<String> {
        Ok(self.guard_alive()?.text)
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.guard_alive()?.visible.contains(selector))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let state = self.guard_alive()?;
        if !state.visible.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.record(format!("click:{selector}"));
        self.transition(&format!("click:{selector}"));
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, _delays: &[Duration]) -> Result<()> {
        let state = self.guard_alive()?;
        if !state.visible.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.record(format!("type:{selector}={text}"));
        self.transition(&format!("type:{selector}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.guard_alive()?;
        self.record(format!("press:{key}"));
        self.transition(&format!("press:{key}"));
        Ok(())
    }

    async fn scroll(&self, dy: i64) -> Result<()> {
        self.guard_alive()?;
        self.record(format!("scroll:{dy}"));
        Ok(())
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<()> {
        self.guard_alive()?;
        self.record("mouse_move".to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let state = self.guard_alive()?;
        self.record("evaluate".to_string());
        for (substr, value) in &state.eval {
            if script.contains(substr.as_str()) {
                let key = format!("eval:{substr}");
                self.transition(&key);
                return Ok(value.clone());
            }
        }
        Ok(serde_json::Value::Null)
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let state = self.guard_alive()?;
        Ok(state.attributes.get(&(selector.to_string(), name.to_string())).cloned())
    }

    async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
        let state = self.guard_alive()?;
        Ok(state.texts.get(selector).cloned())
    }

    async fn remove_element(&self, selector: &str) -> Result<bool> {
        let state = self.guard_alive()?;
        self.record(format!("remove:{selector}"));
        let existed = state.visible.contains(selector);
        self.transition(&format!("remove:{selector}"));
        Ok(existed)
    }

    async fn drain_console(&self) -> Result<Vec<String>> {
        self.guard_alive()?;
        Ok(std::mem::take(&mut *self.pending_console.lock().unwrap()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One blueprint per page the context will hand out; re-used (fresh
/// instance) when handlers open more tabs than were scripted.
pub struct ScriptedContext {
    blueprints: Mutex<VecDeque<Vec<PageState>>>,
    last_blueprint: Mutex<Vec<PageState>>,
    pages: Mutex<Vec<Arc<ScriptedPage>>>,
    init_scripts: Mutex<Vec<String>>,
    headers: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    navigations: Arc<AtomicUsize>,
    script_after_navigation: AtomicBool,
}

impl ScriptedContext {
    fn new(blueprints: Vec<Vec<PageState>>) -> Arc<Self> {
        let last = blueprints.last().cloned().unwrap_or_default();
        Arc::new(Self {
            blueprints: Mutex::new(blueprints.into_iter().collect()),
            last_blueprint: Mutex::new(last),
            pages: Mutex::new(Vec::new()),
            init_scripts: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            navigations: Arc::new(AtomicUsize::new(0)),
            script_after_navigation: AtomicBool::new(false),
        })
    }

    pub fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().unwrap().clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn scripts_installed_before_first_navigation(&self) -> bool {
        !self.script_after_navigation.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> Vec<Arc<ScriptedPage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserContext for ScriptedContext {
    async fn add_init_script(&self, script: &str) -> Result<()> {
        if self.navigations.load(Ordering::SeqCst) > 0 {
            self.script_after_navigation.store(true, Ordering::SeqCst);
        }
        self.init_scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()> {
        *self.headers.lock().unwrap() = headers.to_vec();
        Ok(())
    }

    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        if self.is_closed() {
            return Err(BrowserError::TargetClosed("context closed".into()));
        }
        let blueprint = self
            .blueprints
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last_blueprint.lock().unwrap().clone());
        let blueprint = if blueprint.is_empty() {
            vec![PageState { status: 200, ..Default::default() }]
        } else {
            blueprint
        };
        let page = ScriptedPage::new(blueprint, Arc::clone(&self.navigations));
        self.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedDriver {
    contexts_to_serve: Mutex<VecDeque<Vec<Vec<PageState>>>>,
    served: Mutex<Vec<Arc<ScriptedContext>>>,
    fail_next_launch: Mutex<Option<String>>,
    launches: AtomicUsize,
}

impl ScriptedDriver {
    /// One context whose single page has a single state.
    pub fn single_page(state: PageState) -> Arc<Self> {
        Self::contexts(vec![vec![vec![state]]])
    }

    /// One context whose single page walks the given states.
    pub fn with_pages(states: Vec<PageState>) -> Arc<Self> {
        Self::contexts(vec![vec![states]])
    }

    /// Full control: contexts → pages → states. When more contexts are
    /// launched than scripted, the last context blueprint is reused.
    pub fn contexts(contexts: Vec<Vec<Vec<PageState>>>) -> Arc<Self> {
        Arc::new(Self {
            contexts_to_serve: Mutex::new(contexts.into_iter().collect()),
            served: Mutex::new(Vec::new()),
            fail_next_launch: Mutex::new(None),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_launch(&self, message: impl Into<String>) {
        *self.fail_next_launch.lock().unwrap() = Some(message.into());
    }

    pub fn last_context(&self) -> Option<Arc<ScriptedContext>> {
        self.served.lock().unwrap().last().cloned()
    }

    pub fn contexts_served(&self) -> Vec<Arc<ScriptedContext>> {
        self.served.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn launch(&self, _spec: ContextSpec) -> Result<Arc<dyn BrowserContext>> {
        if let Some(message) = self.fail_next_launch.lock().unwrap().take() {
            return Err(BrowserError::Driver(message));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let blueprint = {
            let mut queue = self.contexts_to_serve.lock().unwrap();
            let next = queue.pop_front();
            match next {
                Some(blueprint) => {
                    if queue.is_empty() {
                        queue.push_back(blueprint.clone());
                    }
                    blueprint
                }
                None => vec![Vec::new()],
            }
        };
        let context = ScriptedContext::new(blueprint);
        self.served.lock().unwrap().push(Arc::clone(&context));
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitions_walk_states() {
        let states = vec![
            PageStateBuilder::new("https://login.example/start")
                .visible("input[type=email]")
                .on("type:input[type=email]", 1)
                .build(),
            PageStateBuilder::new("https://login.example/password")
                .visible("input[type=password]")
                .build(),
        ];
        let driver = ScriptedDriver::with_pages(states);
        let ctx = driver
            .launch(ContextSpec {
                profile_dir: "/tmp/p".into(),
                fingerprint: crate::fingerprint::Fingerprint::generate(
                    harvest_types::Persona::Desktop,
                    126,
                    "UTC",
                    "en-US",
                    &harvest_rand::SecureRng::new(),
                ),
                proxy: None,
            })
            .await
            .unwrap();
        let page = ctx.new_page().await.unwrap();
        assert!(page.is_visible("input[type=email]").await.unwrap());
        page.type_text("input[type=email]", "a@x", &[]).await.unwrap();
        assert!(page.is_visible("input[type=password]").await.unwrap());
        assert_eq!(page.current_url().await.unwrap(), "https://login.example/password");
    }

    #[tokio::test]
    async fn click_on_missing_element_errors() {
        let driver = ScriptedDriver::single_page(PageStateBuilder::new("https://x").build());
        let ctx = driver
            .launch(ContextSpec {
                profile_dir: "/tmp/p".into(),
                fingerprint: crate::fingerprint::Fingerprint::generate(
                    harvest_types::Persona::Desktop,
                    126,
                    "UTC",
                    "en-US",
                    &harvest_rand::SecureRng::new(),
                ),
                proxy: None,
            })
            .await
            .unwrap();
        let page = ctx.new_page().await.unwrap();
        assert!(matches!(
            page.click("#missing").await.unwrap_err(),
            BrowserError::ElementNotFound(_)
        ));
    }
}
