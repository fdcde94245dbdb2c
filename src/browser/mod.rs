use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::utils::error::BrowserError;

pub mod chrome;

pub use chrome::ChromeSession;

pub type BrowserResult<T> = Result<T, BrowserError>;

/// How to locate an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    Id(String),
    LinkText(String),
    PartialLinkText(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn id(id: &str) -> Self {
        Locator::Id(id.to_string())
    }

    pub fn link_text(text: &str) -> Self {
        Locator::LinkText(text.to_string())
    }

    pub fn partial_link_text(text: &str) -> Self {
        Locator::PartialLinkText(text.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::Id(s) => write!(f, "id:{}", s),
            Locator::LinkText(s) => write!(f, "link:{}", s),
            Locator::PartialLinkText(s) => write!(f, "link*:{}", s),
        }
    }
}

/// Reference to a previously located element.
///
/// Implementations resolve the locator again on every operation; a handle
/// whose element can no longer be resolved reports stale. Staleness of a
/// just-clicked element is the funnel's navigation-success heuristic, so
/// the `generation` field lets fakes invalidate handles across page loads.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub locator: Locator,
    pub generation: u64,
}

impl ElementHandle {
    pub fn new(locator: Locator, generation: u64) -> Self {
        Self {
            locator,
            generation,
        }
    }
}

/// Capability interface over a browser-automation engine.
///
/// The purchase funnel depends only on this trait; `ChromeSession` is one
/// implementation, tests script their own.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    /// Locate an element on the current page without waiting.
    async fn find(&self, locator: &Locator) -> BrowserResult<ElementHandle>;

    /// Wait until the element is present in the DOM.
    async fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> BrowserResult<ElementHandle>;

    /// Wait until the element is present, visible and enabled.
    async fn wait_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> BrowserResult<ElementHandle>;

    /// Wait for the element to go stale. Returns whether it did within the
    /// timeout; a still-live element is not an error.
    async fn wait_stale(&self, handle: &ElementHandle, timeout: Duration) -> BrowserResult<bool>;

    async fn click(&self, handle: &ElementHandle) -> BrowserResult<()>;

    /// Click the element's direct parent (radio options on the store are
    /// toggled through their wrapping div).
    async fn click_parent(&self, handle: &ElementHandle) -> BrowserResult<()>;

    async fn type_text(&self, handle: &ElementHandle, text: &str) -> BrowserResult<()>;

    /// Send a Return key press to the element, submitting its form.
    async fn press_enter(&self, handle: &ElementHandle) -> BrowserResult<()>;

    async fn is_displayed(&self, handle: &ElementHandle) -> BrowserResult<bool>;

    async fn is_stale(&self, handle: &ElementHandle) -> BrowserResult<bool>;

    async fn attribute(&self, handle: &ElementHandle, name: &str)
        -> BrowserResult<Option<String>>;

    async fn text(&self, handle: &ElementHandle) -> BrowserResult<String>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn title(&self) -> BrowserResult<String>;

    async fn has_cookie(&self, name: &str) -> BrowserResult<bool>;
}
