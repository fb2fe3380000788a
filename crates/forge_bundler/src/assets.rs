//! Placeholder modules for binary asset imports.
//!
//! Generated projects reference images and fonts that never exist in the
//! virtual filesystem. Such imports resolve to a tiny inline data URI so the
//! module graph still links.

use crate::path::extension;

/// Gray square used in place of any `.svg` import.
pub const SVG_PLACEHOLDER: &str = "data:image/svg+xml,%3Csvg%20xmlns%3D%27http%3A%2F%2Fwww.w3.org%2F2000%2Fsvg%27%20width%3D%27100%27%20height%3D%27100%27%3E%3Crect%20width%3D%27100%27%20height%3D%27100%27%20fill%3D%27%23e5e7eb%27%2F%3E%3C%2Fsvg%3E";

/// 1x1 transparent GIF used in place of raster images.
pub const RASTER_PLACEHOLDER: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

const RASTER_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "avif", "bmp", "ico"];

const OTHER_ASSET_EXTENSIONS: [&str; 9] = [
    "woff", "woff2", "ttf", "otf", "eot", "mp4", "webm", "mp3", "wav",
];

/// Whether a specifier points at a known binary asset.
pub fn is_asset(specifier: &str) -> bool {
    let bare = specifier.split(['?', '#']).next().unwrap_or(specifier);
    match extension(bare) {
        Some(ext) => {
            ext == "svg"
                || RASTER_EXTENSIONS.contains(&ext.as_str())
                || OTHER_ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Data URI substituted for an asset specifier.
pub fn placeholder_uri(specifier: &str) -> &'static str {
    let bare = specifier.split(['?', '#']).next().unwrap_or(specifier);
    match extension(bare).as_deref() {
        Some("svg") => SVG_PLACEHOLDER,
        Some(ext) if RASTER_EXTENSIONS.contains(&ext) => RASTER_PLACEHOLDER,
        _ => "",
    }
}

/// Module source exporting the placeholder as its default export.
pub fn placeholder_module(specifier: &str) -> String {
    let uri = serde_json::Value::String(placeholder_uri(specifier).to_string());
    format!("export default {uri};\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_asset() {
        assert!(is_asset("./logo.svg"));
        assert!(is_asset("@/assets/hero.PNG"));
        assert!(is_asset("./font.woff2?v=3"));
        assert!(!is_asset("./Button"));
        assert!(!is_asset("./styles.css"));
    }

    #[test]
    fn test_placeholder_by_kind() {
        assert_eq!(placeholder_uri("logo.svg"), SVG_PLACEHOLDER);
        assert_eq!(placeholder_uri("photo.jpeg"), RASTER_PLACEHOLDER);
        assert_eq!(placeholder_uri("font.ttf"), "");
        assert!(placeholder_module("a.png").starts_with("export default \"data:image/gif"));
        assert_eq!(placeholder_module("a.mp3"), "export default \"\";\n");
    }
}
