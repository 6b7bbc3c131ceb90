//! Viewer page rendering

use std::path::Path;

/// Token replaced by the stream URL
pub const URL_PLACEHOLDER: &str = "{URL}";

/// Page served when no template file is configured
pub const DEFAULT_TEMPLATE: &str = include_str!("viewer.html");

/// Substitute the stream URL into a viewer template
pub fn render_viewer(template: &str, url: &str) -> String {
    template.replace(URL_PLACEHOLDER, url)
}

/// Load the viewer template
///
/// Reads `path` on every call so edits show up without a restart.
pub async fn load_template(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}
