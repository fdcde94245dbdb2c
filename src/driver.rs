use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::browser::{BrowserSession, ElementHandle, Locator};
use crate::config::StoreConfig;
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::secrets::{PaymentCard, StoreCredentials};
use crate::utils::error::{BrowserError, BuyError};

/// Write side of the bot: something that can drive one purchase to
/// completion for a given URL.
#[async_trait]
pub trait Purchaser: Send + Sync {
    async fn buy(&self, url: &str) -> Result<(), BuyError>;
}

/// Outcome of probing a freshly loaded product page. Page presence and
/// absence markers collapse into one tagged state so the funnel branches
/// over an enumeration instead of nested existence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Ready,
    Expired,
    NotFound,
    Maintenance,
    Unknown,
}

/// Timing knobs for the funnel.
#[derive(Debug, Clone)]
pub struct DriverTimings {
    /// Base wait for elements and page events.
    pub step: Duration,
    /// Longer wait for slow overlays (consent banner, warranty prompt).
    pub extended: Duration,
    /// Small settle pause after loads that tend to re-render.
    pub settle: Duration,
    /// Interval between checks while waiting for the 3-D-Secure return.
    pub confirmation_poll: Duration,
}

impl DriverTimings {
    pub fn from_step(step: Duration) -> Self {
        Self {
            step,
            extended: step * 3,
            settle: Duration::from_secs(1),
            confirmation_poll: Duration::from_secs(1),
        }
    }
}

/// Drives the store checkout funnel over a `BrowserSession`.
///
/// One exclusively owned browser session, one cart: all calls are strictly
/// sequential. `buy()` wraps the five-step funnel in the retry policy;
/// definitive outcomes (`UrlNotAvailable`, `CartAddFailure`,
/// `PaymentRefused`) propagate immediately, transient UI glitches are
/// retried until the attempt budget runs out.
pub struct PurchaseDriver {
    session: Arc<dyn BrowserSession>,
    notifier: Arc<Notifier>,
    credentials: StoreCredentials,
    card: PaymentCard,
    store: StoreConfig,
    retry: RetryPolicy,
    timings: DriverTimings,
}

impl PurchaseDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<dyn BrowserSession>,
        notifier: Arc<Notifier>,
        credentials: StoreCredentials,
        card: PaymentCard,
        store: StoreConfig,
        retry: RetryPolicy,
        timings: DriverTimings,
    ) -> Self {
        Self {
            session,
            notifier,
            credentials,
            card,
            store,
            retry,
            timings,
        }
    }

    /// Accept the consent banner if this session has not yet.
    pub async fn accept_cookies(&self) -> Result<(), BuyError> {
        self.session.navigate(&self.store.base_url).await?;

        if !self.session.has_cookie(&self.store.consent_cookie).await? {
            tracing::info!("accepting cookies");
            let accept = self
                .session
                .wait_clickable(
                    &Locator::id(&self.store.cookie_accept_button),
                    self.timings.extended,
                )
                .await?;
            self.session.click(&accept).await?;
        }
        Ok(())
    }

    pub async fn login(&self) -> Result<(), BuyError> {
        self.retry
            .run(
                "login",
                BuyError::is_definitive,
                |attempts| BuyError::CallFailed { attempts },
                || self.login_once(),
            )
            .await
    }

    async fn login_once(&self) -> Result<(), BuyError> {
        self.session.navigate(&self.store.base_url).await?;

        // Small wait, the front page often serves an interstitial on login
        tokio::time::sleep(self.timings.settle).await;

        tracing::info!("logging in");
        let account = self
            .session
            .find(&Locator::id(&self.store.account_control))
            .await?;
        self.session.click(&account).await?;

        let stay_connected = self
            .session
            .find(&Locator::id(&self.store.long_session_checkbox))
            .await?;
        self.session.click(&stay_connected).await?;

        let email = self
            .session
            .find(&Locator::id(&self.store.email_field))
            .await?;
        self.session.type_text(&email, &self.credentials.user).await?;

        let password = self
            .session
            .find(&Locator::id(&self.store.password_field))
            .await?;
        self.session
            .type_text(&password, &self.credentials.password)
            .await?;
        self.session.press_enter(&password).await?;

        // The logout link only renders for an authenticated session
        self.session
            .wait_present(&Locator::css(&self.store.logout_link), self.timings.step)
            .await?;
        self.notifier.push("Login successful").await;
        Ok(())
    }

    async fn buy_attempt(&self, url: &str) -> Result<(), BuyError> {
        match self.buy_once(url).await {
            Err(e) if !e.is_definitive() => {
                let title = self.session.title().await.unwrap_or_default();
                if title
                    .to_lowercase()
                    .contains(&self.store.maintenance_title)
                {
                    tracing::warn!("store is under maintenance");
                } else {
                    tracing::warn!(%title, "funnel failed: {}", e);
                }
                Err(e)
            }
            other => other,
        }
    }

    async fn buy_once(&self, url: &str) -> Result<(), BuyError> {
        self.ensure_empty_basket().await?;
        self.open_product(url).await?;
        self.checkout().await?;
        self.select_delivery().await?;
        self.submit_payment().await?;
        self.await_payment_confirmation().await?;

        // Final small wait while the order confirmation settles
        tokio::time::sleep(self.timings.settle).await;
        Ok(())
    }

    /// Step 1: a leftover item in the cart would corrupt the order, so
    /// empty it. Absence of the item-count badge already means success.
    async fn ensure_empty_basket(&self) -> Result<(), BuyError> {
        self.session.navigate(&self.store.base_url).await?;

        let basket = self
            .session
            .find(&Locator::id(&self.store.basket_control))
            .await?;
        let badge = Locator::css(&self.store.basket_count_badge);
        if self.session.find(&badge).await.is_err() {
            return Ok(());
        }

        tracing::info!("basket is not empty");
        self.session.click(&basket).await?;

        let trash = Locator::css(&self.store.basket_trash_icon);
        let trash_icon = self
            .session
            .wait_clickable(&trash, self.timings.step)
            .await?;
        self.session.click_parent(&trash_icon).await?;

        // Deletion re-renders the cart and pops a confirmation dialog
        self.session.wait_clickable(&trash, self.timings.step).await?;
        let confirm = self
            .session
            .wait_clickable(
                &Locator::partial_link_text(&self.store.basket_confirm_text),
                self.timings.step,
            )
            .await?;
        self.session.click(&confirm).await?;
        tracing::info!("successfully emptied the basket");
        Ok(())
    }

    /// Step 2: load the product page and give up on the definitively dead
    /// variants without burning further attempts.
    async fn open_product(&self, url: &str) -> Result<(), BuyError> {
        tracing::info!("get {}", url);
        self.session.navigate(url).await?;

        match self.probe_page().await {
            PageStatus::Ready => Ok(()),
            PageStatus::Expired | PageStatus::NotFound => {
                self.notifier
                    .humble_push(&format!("{} is not ready", url), Duration::from_secs(60))
                    .await;
                Err(BuyError::UrlNotAvailable)
            }
            PageStatus::Maintenance | PageStatus::Unknown => Err(BuyError::Browser(
                BrowserError::Session("product page did not load".to_string()),
            )),
        }
    }

    async fn probe_page(&self) -> PageStatus {
        if self
            .session
            .find(&Locator::css(&self.store.expired_marker))
            .await
            .is_ok()
        {
            return PageStatus::Expired;
        }
        if self
            .session
            .find(&Locator::css(&self.store.not_found_marker))
            .await
            .is_ok()
        {
            return PageStatus::NotFound;
        }
        match self.session.title().await {
            Ok(title)
                if title
                    .to_lowercase()
                    .contains(&self.store.maintenance_title) =>
            {
                PageStatus::Maintenance
            }
            Ok(_) => PageStatus::Ready,
            Err(_) => PageStatus::Unknown,
        }
    }

    /// Step 3: add the product and reach the order page, through the
    /// instant-buy control when present, the regular cart otherwise.
    async fn checkout(&self) -> Result<(), BuyError> {
        tracing::info!("adding product to cart");

        let one_click = Locator::css(&self.store.one_click_button);
        let left_the_page = match self
            .session
            .wait_clickable(&one_click, self.timings.step)
            .await
        {
            Ok(buy_control) => self.one_click_checkout(&buy_control).await?,
            Err(BrowserError::Timeout(_)) => self.cart_checkout().await?,
            Err(e) => return Err(e.into()),
        };

        // Still on the product page means we have most likely been offered
        // an extended warranty: refuse it
        if !left_the_page {
            tracing::info!("still on the page, refusing extended warranty");
            match self
                .session
                .wait_clickable(
                    &Locator::link_text(&self.store.warranty_refusal_text),
                    self.timings.extended,
                )
                .await
            {
                Ok(refuse) => {
                    self.session.click(&refuse).await?;
                    tracing::info!("refused extended warranty");
                }
                Err(_) => tracing::info!("warranty refusal failed"),
            }
        }
        Ok(())
    }

    async fn one_click_checkout(&self, buy_control: &ElementHandle) -> Result<bool, BuyError> {
        // Grab the generic modals before clicking; checking them afterwards
        // doubles as the navigation probe
        let default_modal = self
            .session
            .find(&Locator::id(&self.store.default_modal))
            .await
            .ok();
        let error_modal = self
            .session
            .find(&Locator::id(&self.store.error_modal))
            .await
            .ok();

        self.session.click(buy_control).await?;
        tracing::info!("instant checkout was available");

        let mut modal_shown = false;
        for modal in [default_modal, error_modal].into_iter().flatten() {
            match self.session.is_displayed(&modal).await {
                Ok(true) => modal_shown = true,
                Ok(false) => {}
                // The modal went stale: navigation won the race, the click
                // worked regardless of what the modal was about to say
                Err(BrowserError::Stale(_)) => return Ok(true),
                Err(e) => return Err(e.into()),
            }
        }

        if modal_shown {
            self.notifier
                .humble_push("Modal error: cart add failed", Duration::from_secs(60))
                .await;
            return Err(BuyError::CartAddFailure);
        }
        Ok(false)
    }

    async fn cart_checkout(&self) -> Result<bool, BuyError> {
        tracing::info!("switching to manual cart checkout");
        let add_to_cart = self
            .session
            .wait_clickable(
                &Locator::css(&self.store.add_to_cart_button),
                self.timings.extended,
            )
            .await?;
        self.session.click(&add_to_cart).await?;

        let see_cart = self
            .session
            .wait_clickable(
                &Locator::partial_link_text(&self.store.view_cart_text),
                self.timings.extended,
            )
            .await?;
        self.session.click(&see_cart).await?;

        let checkout_control = self
            .session
            .find(&Locator::css(&self.store.order_checkout_button))
            .await?;
        self.session.click(&checkout_control).await?;

        // A stale checkout control means we left the cart page
        Ok(self.session.is_stale(&checkout_control).await?)
    }

    /// Step 4: land on the standard home-delivery option. Selecting it
    /// triggers an asynchronous re-render of the payment section, so wait
    /// for the card-number field to settle before moving on.
    async fn select_delivery(&self) -> Result<(), BuyError> {
        tracing::info!("ensuring home delivery");

        let standard = Locator::id(&self.store.home_delivery_option);
        let standard_radio = self.wait_settled(&standard).await?;

        if self.store.prefer_express {
            match self
                .session
                .find(&Locator::id(&self.store.express_delivery_option))
                .await
            {
                Ok(express_radio) => {
                    return self.pick_delivery_option(&express_radio, "express").await;
                }
                Err(_) => tracing::info!("express delivery unavailable"),
            }
        }

        self.pick_delivery_option(&standard_radio, "standard").await
    }

    async fn pick_delivery_option(
        &self,
        radio: &ElementHandle,
        label: &str,
    ) -> Result<(), BuyError> {
        let selected = self.session.attribute(radio, "selected").await?;
        if selected.as_deref() == Some("true") {
            tracing::info!("{} delivery already selected", label);
            return Ok(());
        }

        tracing::info!("switching to {} delivery", label);
        self.session.click_parent(radio).await?;
        self.wait_settled(&Locator::id(&self.store.card_number_field))
            .await?;
        Ok(())
    }

    /// Wait for an element to appear, survive an optional re-render, and
    /// reappear.
    async fn wait_settled(&self, locator: &Locator) -> Result<ElementHandle, BuyError> {
        tracing::debug!("waiting for DOM stabilization on {}", locator);

        let element = self
            .session
            .wait_present(locator, self.timings.step)
            .await?;
        let went_stale = self
            .session
            .wait_stale(&element, self.timings.step)
            .await?;
        if !went_stale {
            tracing::debug!("DOM stabilization not needed");
            return Ok(element);
        }
        Ok(self
            .session
            .wait_present(locator, self.timings.step)
            .await?)
    }

    /// Step 5: fill the payment form and submit.
    async fn submit_payment(&self) -> Result<(), BuyError> {
        tracing::info!("filling payment information");
        for (field, value) in [
            (&self.store.card_number_field, &self.card.number),
            (&self.store.expiration_field, &self.card.exp_date),
            (&self.store.owner_field, &self.card.owner),
            (&self.store.cryptogram_field, &self.card.cpt),
        ] {
            let input = self.session.find(&Locator::id(field)).await?;
            self.session.type_text(&input, value).await?;
        }

        tracing::info!("submitting payment");
        let pay = self
            .session
            .find(&Locator::css(&self.store.payment_submit_button))
            .await?;
        self.session.click(&pay).await?;

        match self
            .session
            .wait_present(
                &Locator::css(&self.store.payment_error),
                self.timings.extended,
            )
            .await
        {
            Ok(error_element) => {
                let reason = self.session.text(&error_element).await.unwrap_or_default();
                self.notifier
                    .push(&format!("Payment error: {}", reason))
                    .await;
                Err(BuyError::PaymentRefused { reason })
            }
            Err(BrowserError::Timeout(_)) => {
                tracing::info!("payment accepted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Step 6: the payment may redirect through a third-party 3-D-Secure
    /// approval page. Poll until control returns to the store domain; the
    /// payment network controls the duration, so this wait is unbounded
    /// and only the enclosing process timeout can cut it short.
    async fn await_payment_confirmation(&self) -> Result<(), BuyError> {
        self.notifier.push("Waiting for 3DS approval").await;
        tokio::time::sleep(self.timings.settle).await;

        loop {
            let current = self.session.current_url().await?;
            if self.on_store_domain(&current) {
                break;
            }
            tokio::time::sleep(self.timings.confirmation_poll).await;
        }

        let title = self.session.title().await.unwrap_or_default();
        self.notifier
            .push(&format!("Back on {} in page '{}'", self.store.domain, title))
            .await;
        Ok(())
    }

    fn on_store_domain(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .is_some_and(|host| {
                host == self.store.domain || host.ends_with(&format!(".{}", self.store.domain))
            })
    }
}

#[async_trait]
impl Purchaser for PurchaseDriver {
    async fn buy(&self, url: &str) -> Result<(), BuyError> {
        self.retry
            .run(
                "buy",
                BuyError::is_definitive,
                |attempts| BuyError::CallFailed { attempts },
                || self.buy_attempt(url),
            )
            .await
    }
}
