use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::browser::tab::element::Element;
use headless_chrome::{Browser, LaunchOptions, Tab};

use super::{BrowserResult, BrowserSession, ElementHandle, Locator};
use crate::config::BrowserConfig;
use crate::utils::error::BrowserError;

const RESOLVE_POLL: Duration = Duration::from_millis(100);

/// `BrowserSession` over a headless Chrome instance.
///
/// Handles are resolved fresh on every operation: a handle whose locator no
/// longer matches anything reports stale, which is exactly the signal the
/// funnel uses to infer navigation.
pub struct ChromeSession {
    // Keeps the Chrome process alive for the lifetime of the session.
    _browser: Browser,
    tab: Arc<Tab>,
    generation: AtomicU64,
}

impl ChromeSession {
    pub fn launch(config: &BrowserConfig) -> BrowserResult<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Often needed in containerized environments
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| BrowserError::Session(format!("launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| BrowserError::Session(format!("failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Session(format!("failed to create tab: {}", e)))?;
        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| BrowserError::Session(format!("failed to set user agent: {}", e)))?;

        Ok(Self {
            _browser: browser,
            tab,
            generation: AtomicU64::new(0),
        })
    }

    fn resolve(&self, locator: &Locator) -> BrowserResult<Element<'_>> {
        let result = match locator {
            Locator::Css(selector) => self.tab.find_element(selector),
            Locator::Id(id) => self.tab.find_element(&format!("#{}", id)),
            Locator::LinkText(text) => self
                .tab
                .find_element_by_xpath(&format!("//a[normalize-space(text())='{}']", text)),
            Locator::PartialLinkText(text) => self
                .tab
                .find_element_by_xpath(&format!("//a[contains(normalize-space(.), '{}')]", text)),
        };
        result.map_err(|_| BrowserError::NotFound(locator.to_string()))
    }

    /// Resolve a handle's locator; absence means the element went stale.
    fn resolve_handle(&self, handle: &ElementHandle) -> BrowserResult<Element<'_>> {
        self.resolve(&handle.locator)
            .map_err(|_| BrowserError::Stale(handle.locator.to_string()))
    }

    fn handle_for(&self, locator: &Locator) -> ElementHandle {
        ElementHandle::new(locator.clone(), self.generation.load(Ordering::Relaxed))
    }

    fn element_js_bool(&self, handle: &ElementHandle, body: &str) -> BrowserResult<bool> {
        let element = self.resolve_handle(handle)?;
        let result = element
            .call_js_fn(body, vec![], false)
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::Session(format!("navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| BrowserError::Session(format!("page load failed: {}", e)))?;
        self.generation.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> BrowserResult<ElementHandle> {
        self.resolve(locator)?;
        Ok(self.handle_for(locator))
    }

    async fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> BrowserResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.resolve(locator).is_ok() {
                return Ok(self.handle_for(locator));
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(locator.to_string()));
            }
            tokio::time::sleep(RESOLVE_POLL).await;
        }
    }

    async fn wait_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> BrowserResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            let handle = self.handle_for(locator);
            if self.resolve(locator).is_ok()
                && self
                    .element_js_bool(
                        &handle,
                        "function() { return !this.disabled && !!this.offsetParent; }",
                    )
                    .unwrap_or(false)
            {
                return Ok(handle);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(locator.to_string()));
            }
            tokio::time::sleep(RESOLVE_POLL).await;
        }
    }

    async fn wait_stale(&self, handle: &ElementHandle, timeout: Duration) -> BrowserResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.resolve(&handle.locator).is_err() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(RESOLVE_POLL).await;
        }
    }

    async fn click(&self, handle: &ElementHandle) -> BrowserResult<()> {
        let element = self.resolve_handle(handle)?;
        element
            .click()
            .map_err(|e| BrowserError::Session(format!("click failed: {}", e)))?;
        Ok(())
    }

    async fn click_parent(&self, handle: &ElementHandle) -> BrowserResult<()> {
        let element = self.resolve_handle(handle)?;
        element
            .call_js_fn(
                "function() { this.parentElement.click(); }",
                vec![],
                false,
            )
            .map_err(|e| BrowserError::Session(format!("parent click failed: {}", e)))?;
        Ok(())
    }

    async fn type_text(&self, handle: &ElementHandle, text: &str) -> BrowserResult<()> {
        let element = self.resolve_handle(handle)?;
        element
            .type_into(text)
            .map_err(|e| BrowserError::Session(format!("typing failed: {}", e)))?;
        Ok(())
    }

    async fn press_enter(&self, handle: &ElementHandle) -> BrowserResult<()> {
        let element = self.resolve_handle(handle)?;
        element
            .call_js_fn(
                r#"function() {
                    const ev = new KeyboardEvent('keydown', { key: 'Enter', keyCode: 13, bubbles: true });
                    this.dispatchEvent(ev);
                    if (this.form) {
                        this.form.requestSubmit ? this.form.requestSubmit() : this.form.submit();
                    }
                }"#,
                vec![],
                false,
            )
            .map_err(|e| BrowserError::Session(format!("enter press failed: {}", e)))?;
        Ok(())
    }

    async fn is_displayed(&self, handle: &ElementHandle) -> BrowserResult<bool> {
        self.element_js_bool(handle, "function() { return !!this.offsetParent; }")
    }

    async fn is_stale(&self, handle: &ElementHandle) -> BrowserResult<bool> {
        Ok(self.resolve(&handle.locator).is_err())
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        let element = self.resolve_handle(handle)?;
        let result = element
            .call_js_fn(
                &format!("function() {{ return this.getAttribute('{}'); }}", name),
                vec![],
                false,
            )
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    async fn text(&self, handle: &ElementHandle) -> BrowserResult<String> {
        let element = self.resolve_handle(handle)?;
        let result = element
            .call_js_fn("function() { return this.innerText; }", vec![], false)
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.tab.get_url())
    }

    async fn title(&self) -> BrowserResult<String> {
        let result = self
            .tab
            .evaluate("document.title", false)
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default())
    }

    async fn has_cookie(&self, name: &str) -> BrowserResult<bool> {
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(cookies.iter().any(|c| c.name == name))
    }
}
