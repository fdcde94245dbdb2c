use thiserror::Error;

/// Errors from the stock-availability API layer. Never fatal to the polling
/// loop; the orchestrator counts them and escalates after a tolerance.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("availability API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("availability payload scrapping failed: {context}")]
    Schema { context: String },

    #[error("availability request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors from the page-automation capability.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element went stale: {0}")]
    Stale(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("browser session error: {0}")]
    Session(String),
}

/// Terminal outcomes of one `buy()` call.
///
/// The first three are definitive for the attempt and are never retried by
/// the funnel wrapper. Everything else (wrapped browser errors) is treated
/// as a transient UI glitch and retried until the attempt budget runs out,
/// at which point `CallFailed` is raised.
#[derive(Error, Debug)]
pub enum BuyError {
    #[error("purchase URL is not available")]
    UrlNotAvailable,

    #[error("store refused the cart add")]
    CartAddFailure,

    #[error("payment refused: {reason}")]
    PaymentRefused { reason: String },

    #[error("gave up after {attempts} purchase attempts")]
    CallFailed { attempts: u32 },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl BuyError {
    /// Definitive outcomes represent a confirmed store decision, not a UI
    /// hiccup; retrying them burns attempts without benefit.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            BuyError::UrlNotAvailable
                | BuyError::CartAddFailure
                | BuyError::PaymentRefused { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret '{name}' not found")]
    Missing { name: String },

    #[error("secret '{name}' is not valid JSON: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected with HTTP {0}")]
    Rejected(u16),
}
