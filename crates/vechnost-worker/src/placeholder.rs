//! Placeholder served when an image cannot be fetched

use vechnost_network::{Response, StatusCode};

pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

/// A flat square in the storefront's navy
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="300" viewBox="0 0 300 300"><rect width="100%" height="100%" fill="#0a1f44"/></svg>"##;

pub fn placeholder_response() -> Response {
    Response::synthesized(StatusCode::OK, PLACEHOLDER_CONTENT_TYPE, PLACEHOLDER_SVG)
}
