//! The Open Graph record produced for every request.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata harvested from a single HTML document.
///
/// Serialized with camelCase keys; absent optional fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGraphData {
    /// The normalized URL the caller asked for.
    pub request_url: String,
    /// The final URL after redirects.
    pub resolved_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_lang: Option<String>,
    /// Every `og:*` property without a dedicated field, keyed without the prefix.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Parsed `application/ld+json` blocks in document order.
    #[serde(default)]
    pub ld_jsons: Vec<serde_json::Value>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Request context attached to the record. Not derived from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Edge location that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_colo: Option<String>,
    /// Cache status of the origin response (`HIT`, `MISS`, or the upstream value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_cache_status: Option<String>,
    /// Raw response body, only filled in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

impl OpenGraphData {
    /// An empty record for the given URLs.
    pub fn new(request_url: impl Into<String>, resolved_url: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self { request_url: request_url.into(), resolved_url: resolved_url.into(), diagnostics, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_omits_absent_fields() {
        let data = OpenGraphData::new("http://example.com/", "http://example.com/", Diagnostics::default());
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(
            value,
            json!({
                "requestUrl": "http://example.com/",
                "resolvedUrl": "http://example.com/",
                "metadata": {},
                "ldJsons": [],
                "diagnostics": {}
            })
        );
    }

    #[test]
    fn test_serialize_camel_case_keys() {
        let mut data = OpenGraphData::new(
            "http://example.com/",
            "https://example.com/",
            Diagnostics { cf_colo: Some("SJC".into()), cf_cache_status: Some("MISS".into()), response_text: None },
        );
        data.site_name = Some("Example".into());
        data.og_type = Some("website".into());
        data.html_lang = Some("en".into());

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["siteName"], "Example");
        assert_eq!(value["type"], "website");
        assert_eq!(value["htmlLang"], "en");
        assert_eq!(value["diagnostics"]["cfColo"], "SJC");
        assert_eq!(value["diagnostics"]["cfCacheStatus"], "MISS");
        assert!(value["diagnostics"].get("responseText").is_none());
    }
}
