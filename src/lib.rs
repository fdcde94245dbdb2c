pub mod bot;
pub mod browser;
pub mod config;
pub mod driver;
pub mod notify;
pub mod retry;
pub mod scraper;
pub mod secrets;
pub mod utils;

// Re-export commonly used types
pub use bot::Bot;
pub use config::AppConfig;
pub use driver::PurchaseDriver;
pub use notify::Notifier;
pub use scraper::StockScraper;
