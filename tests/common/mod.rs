//! Shared test doubles: a fully scripted in-memory browser and a
//! notification channel that records deliveries.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stockhawk::browser::{BrowserResult, BrowserSession, ElementHandle, Locator};
use stockhawk::notify::NotifyChannel;
use stockhawk::secrets::{PaymentCard, StoreCredentials};
use stockhawk::utils::error::{BrowserError, NotifyError};

/// What clicking (or submitting) an element does to the scripted world.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    None,
    /// Navigate to another page, invalidating all outstanding handles.
    Goto(String),
    /// Make another element on the same page visible.
    Display(Locator),
}

#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub displayed: bool,
    pub enabled: bool,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub on_click: ClickEffect,
}

impl ElementSpec {
    pub fn new() -> Self {
        Self {
            displayed: true,
            enabled: true,
            text: String::new(),
            attributes: HashMap::new(),
            on_click: ClickEffect::None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn goto(mut self, url: &str) -> Self {
        self.on_click = ClickEffect::Goto(url.to_string());
        self
    }

    pub fn displays(mut self, locator: Locator) -> Self {
        self.on_click = ClickEffect::Display(locator);
        self
    }
}

impl Default for ElementSpec {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    pub title: String,
    pub elements: HashMap<Locator, ElementSpec>,
}

impl PageSpec {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            elements: HashMap::new(),
        }
    }

    pub fn with(mut self, locator: Locator, spec: ElementSpec) -> Self {
        self.elements.insert(locator, spec);
        self
    }
}

struct World {
    pages: HashMap<String, PageSpec>,
    current: String,
    generation: u64,
    cookies: HashSet<String>,
    /// Scripted answers for `current_url()`, consumed front to back. Used
    /// to simulate the excursion through an external payment-approval page.
    url_script: VecDeque<String>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
}

/// In-memory `BrowserSession`: a set of pages keyed by URL, with elements
/// keyed by the exact locators the funnel uses. Handles go stale on every
/// navigation, which is how the funnel detects page changes.
pub struct ScriptedBrowser {
    world: Mutex<World>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            world: Mutex::new(World {
                pages: HashMap::new(),
                current: String::new(),
                generation: 0,
                cookies: HashSet::new(),
                url_script: VecDeque::new(),
                navigations: Vec::new(),
                clicks: Vec::new(),
                typed: Vec::new(),
            }),
        }
    }

    pub fn page(self, url: &str, page: PageSpec) -> Self {
        self.world
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), page);
        self
    }

    pub fn with_cookie(self, name: &str) -> Self {
        self.world.lock().unwrap().cookies.insert(name.to_string());
        self
    }

    pub fn with_url_script(self, urls: &[&str]) -> Self {
        self.world
            .lock()
            .unwrap()
            .url_script
            .extend(urls.iter().map(|u| u.to_string()));
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.world.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.world.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.world.lock().unwrap().typed.clone()
    }

    fn resolve_spec(world: &World, handle: &ElementHandle) -> BrowserResult<ElementSpec> {
        if handle.generation != world.generation {
            return Err(BrowserError::Stale(handle.locator.to_string()));
        }
        world
            .pages
            .get(&world.current)
            .and_then(|page| page.elements.get(&handle.locator))
            .cloned()
            .ok_or_else(|| BrowserError::Stale(handle.locator.to_string()))
    }

    fn lookup(world: &World, locator: &Locator) -> Option<ElementSpec> {
        world
            .pages
            .get(&world.current)
            .and_then(|page| page.elements.get(locator))
            .cloned()
    }

    fn apply_effect(world: &mut World, effect: &ClickEffect) {
        match effect {
            ClickEffect::None => {}
            ClickEffect::Goto(url) => {
                world.current = url.clone();
                world.generation += 1;
            }
            ClickEffect::Display(locator) => {
                let current = world.current.clone();
                if let Some(spec) = world
                    .pages
                    .get_mut(&current)
                    .and_then(|page| page.elements.get_mut(locator))
                {
                    spec.displayed = true;
                }
            }
        }
    }

    fn click_impl(&self, handle: &ElementHandle) -> BrowserResult<()> {
        let mut world = self.world.lock().unwrap();
        let spec = Self::resolve_spec(&world, handle)?;
        world.clicks.push(handle.locator.to_string());
        Self::apply_effect(&mut world, &spec.on_click);
        Ok(())
    }
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut world = self.world.lock().unwrap();
        world.navigations.push(url.to_string());
        world.current = url.to_string();
        world.generation += 1;
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> BrowserResult<ElementHandle> {
        let world = self.world.lock().unwrap();
        match Self::lookup(&world, locator) {
            Some(_) => Ok(ElementHandle::new(locator.clone(), world.generation)),
            None => Err(BrowserError::NotFound(locator.to_string())),
        }
    }

    async fn wait_present(
        &self,
        locator: &Locator,
        _timeout: std::time::Duration,
    ) -> BrowserResult<ElementHandle> {
        let world = self.world.lock().unwrap();
        match Self::lookup(&world, locator) {
            Some(_) => Ok(ElementHandle::new(locator.clone(), world.generation)),
            None => Err(BrowserError::Timeout(locator.to_string())),
        }
    }

    async fn wait_clickable(
        &self,
        locator: &Locator,
        _timeout: std::time::Duration,
    ) -> BrowserResult<ElementHandle> {
        let world = self.world.lock().unwrap();
        match Self::lookup(&world, locator) {
            Some(spec) if spec.displayed && spec.enabled => {
                Ok(ElementHandle::new(locator.clone(), world.generation))
            }
            _ => Err(BrowserError::Timeout(locator.to_string())),
        }
    }

    async fn wait_stale(
        &self,
        handle: &ElementHandle,
        _timeout: std::time::Duration,
    ) -> BrowserResult<bool> {
        let world = self.world.lock().unwrap();
        Ok(Self::resolve_spec(&world, handle).is_err())
    }

    async fn click(&self, handle: &ElementHandle) -> BrowserResult<()> {
        self.click_impl(handle)
    }

    async fn click_parent(&self, handle: &ElementHandle) -> BrowserResult<()> {
        self.click_impl(handle)
    }

    async fn type_text(&self, handle: &ElementHandle, text: &str) -> BrowserResult<()> {
        let mut world = self.world.lock().unwrap();
        Self::resolve_spec(&world, handle)?;
        world
            .typed
            .push((handle.locator.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, handle: &ElementHandle) -> BrowserResult<()> {
        self.click_impl(handle)
    }

    async fn is_displayed(&self, handle: &ElementHandle) -> BrowserResult<bool> {
        let world = self.world.lock().unwrap();
        Ok(Self::resolve_spec(&world, handle)?.displayed)
    }

    async fn is_stale(&self, handle: &ElementHandle) -> BrowserResult<bool> {
        let world = self.world.lock().unwrap();
        Ok(Self::resolve_spec(&world, handle).is_err())
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        let world = self.world.lock().unwrap();
        Ok(Self::resolve_spec(&world, handle)?.attributes.get(name).cloned())
    }

    async fn text(&self, handle: &ElementHandle) -> BrowserResult<String> {
        let world = self.world.lock().unwrap();
        Ok(Self::resolve_spec(&world, handle)?.text)
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let mut world = self.world.lock().unwrap();
        if let Some(next) = world.url_script.pop_front() {
            world.current = next.clone();
            world.generation += 1;
            return Ok(next);
        }
        Ok(world.current.clone())
    }

    async fn title(&self) -> BrowserResult<String> {
        let world = self.world.lock().unwrap();
        world
            .pages
            .get(&world.current)
            .map(|page| page.title.clone())
            .ok_or_else(|| BrowserError::Session("no such page".to_string()))
    }

    async fn has_cookie(&self, name: &str) -> BrowserResult<bool> {
        Ok(self.world.lock().unwrap().cookies.contains(name))
    }
}

pub struct RecordingChannel {
    delivered: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// A notifier whose deliveries can be inspected after the fact.
pub fn recording_notifier() -> (Arc<stockhawk::notify::Notifier>, Arc<Mutex<Vec<String>>>) {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let notifier = Arc::new(stockhawk::notify::Notifier::new(Box::new(
        RecordingChannel {
            delivered: Arc::clone(&delivered),
        },
    )));
    (notifier, delivered)
}

pub fn test_credentials() -> StoreCredentials {
    StoreCredentials {
        user: "alice@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}

pub fn test_card() -> PaymentCard {
    PaymentCard {
        number: "4970000000000000".to_string(),
        exp_date: "12/27".to_string(),
        owner: "Alice Example".to_string(),
        cpt: "123".to_string(),
    }
}
