use std::sync::Arc;

use crate::config::Config;
use crate::export::NotificationSink;
use crate::fonts::FontCatalog;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Render sources and orchestrators are per request; only long-lived collaborators
/// live here.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Font files are loaded once and shared across exports.
    pub fonts: Arc<dyn FontCatalog>,
    pub notifier: Arc<dyn NotificationSink>,
}
