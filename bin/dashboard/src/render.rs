//! Plain-text rendering of the dashboard.

use std::fmt::Write;
use switchboard_integration::{IntegrationItem, Notice, NoticeLevel, ServiceDescriptor};
use tracing::warn;

/// Actions offered on a card.
#[must_use]
pub fn card_actions(descriptor: &ServiceDescriptor) -> &'static [&'static str] {
    if descriptor.is_connected {
        &["View Items", "Disconnect"]
    } else {
        &["Connect"]
    }
}

/// One card per service, in registry order.
#[must_use]
pub fn render_cards(descriptors: &[ServiceDescriptor]) -> String {
    let mut out = String::new();
    for (i, descriptor) in descriptors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let state = if descriptor.is_connected {
            "connected"
        } else {
            "not connected"
        };
        let auth = descriptor
            .auth_url
            .as_ref()
            .map_or("unavailable", |url| url.as_str());

        // Writing to a String cannot fail.
        let _ = writeln!(out, "{} [{state}]", descriptor.name);
        let _ = writeln!(out, "  {}", descriptor.description);
        let _ = writeln!(out, "  icon: {}", descriptor.icon);
        let _ = writeln!(out, "  auth: {auth}");
        let _ = writeln!(out, "  actions: {}", card_actions(descriptor).join(", "));
    }
    out
}

/// Items as pretty-printed JSON.
#[must_use]
pub fn render_items(items: &[IntegrationItem]) -> String {
    serde_json::to_string_pretty(items).unwrap_or_else(|e| {
        warn!(error = %e, "could not render items");
        "[]".to_string()
    })
}

/// A single notice line.
#[must_use]
pub fn render_notice(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Info => "ok",
        NoticeLevel::Error => "error",
    };
    format!("[{marker}] {}: {}", notice.title, notice.description)
}
