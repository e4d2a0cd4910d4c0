pub mod browser_manager;
pub mod network_log;

pub use browser_manager::BrowserSession;
pub use network_log::NetworkLog;
