//! Built-in plugins seeded into every [`ToolManager`](crate::ToolManager)
//! created with [`ToolManager::new`](crate::ToolManager::new).

use std::sync::Arc;

use crate::plugin::ToolPlugin;

pub mod mail;
pub mod search;
pub mod weather;

pub use mail::{
    HttpMailTransport, MailConfig, MailCredentials, MailPlugin, MailReceipt, MailTransport,
    OutgoingMail,
};
pub use search::{HttpSearchBackend, SearchBackend, SearchConfig, SearchHit, SearchPlugin};
pub use weather::{Forecast, WeatherPlugin};

/// Registry key of the deterministic forecast plugin.
pub const WEATHER_KEY: &str = "weather";
/// Registry key of the outbound mail plugin.
pub const MAIL_KEY: &str = "gmail";
/// Registry key of the web search plugin.
pub const SEARCH_KEY: &str = "search";

/// Configuration consumed by the built-in plugins.
#[derive(Clone, Debug, Default)]
pub struct BuiltinConfig {
    /// Outbound mail settings.
    pub mail: MailConfig,
    /// Search backend settings.
    pub search: SearchConfig,
}

impl BuiltinConfig {
    /// Loads every built-in configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            mail: MailConfig::from_env(),
            search: SearchConfig::from_env(),
        }
    }

    /// Replaces the mail configuration.
    #[must_use]
    pub fn with_mail(mut self, mail: MailConfig) -> Self {
        self.mail = mail;
        self
    }

    /// Replaces the search configuration.
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

pub(crate) fn plugins(config: &BuiltinConfig) -> Vec<(&'static str, Arc<dyn ToolPlugin>)> {
    vec![
        (WEATHER_KEY, Arc::new(WeatherPlugin::new()) as Arc<dyn ToolPlugin>),
        (MAIL_KEY, Arc::new(MailPlugin::new(config.mail.clone()))),
        (SEARCH_KEY, Arc::new(SearchPlugin::new(config.search.clone()))),
    ]
}
