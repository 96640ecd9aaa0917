//! Element handlers that populate an [`OpenGraphData`] record.

use ogproxy_core::OpenGraphData;

use super::scanner::{Element, ElementHandler};

const LD_JSON_TYPE: &str = "application/ld+json";

/// Captures the document language from `<html lang>`.
pub struct HtmlHandler;

impl ElementHandler for HtmlHandler {
    fn element(&mut self, element: &Element<'_>, data: &mut OpenGraphData) {
        if let Some(lang) = element.get_attribute("lang").filter(|lang| !lang.is_empty()) {
            data.html_lang = Some(lang.to_string());
        }
    }
}

/// Maps `<meta property="og:*">` tags onto the record.
pub struct MetaHandler;

impl ElementHandler for MetaHandler {
    fn element(&mut self, element: &Element<'_>, data: &mut OpenGraphData) {
        let property = non_empty(element.get_attribute("property")).or_else(|| non_empty(element.get_attribute("name")));
        let (Some(property), Some(content)) = (property, non_empty(element.get_attribute("content"))) else {
            return;
        };

        let property = property.to_lowercase();
        if let Some(key) = property.strip_prefix("og:") {
            apply_property(data, key, content);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Store one `og:` property. Later occurrences overwrite earlier ones.
pub(crate) fn apply_property(data: &mut OpenGraphData, key: &str, content: &str) {
    let content = content.to_string();
    match key {
        "title" => data.title = Some(content),
        "description" => data.description = Some(content),
        "image" => data.image = Some(content),
        "site_name" => data.site_name = Some(content),
        "type" => data.og_type = Some(content),
        other => {
            data.metadata.insert(other.to_string(), content);
        }
    }
}

/// Collects `<script type="application/ld+json">` blocks.
///
/// Blocks that fail to parse are dropped without affecting the rest of the
/// scan.
#[derive(Debug, Default)]
pub struct ScriptHandler {
    tracking: bool,
    buffer: String,
}

impl ElementHandler for ScriptHandler {
    fn element(&mut self, element: &Element<'_>, _data: &mut OpenGraphData) {
        self.tracking = element
            .get_attribute("type")
            .is_some_and(|t| t.eq_ignore_ascii_case(LD_JSON_TYPE));
        self.buffer.clear();
    }

    fn text(&mut self, text: &str, _data: &mut OpenGraphData) {
        if self.tracking {
            self.buffer.push_str(text);
        }
    }

    fn end_tag(&mut self, data: &mut OpenGraphData) {
        if !std::mem::take(&mut self.tracking) {
            return;
        }

        let raw = std::mem::take(&mut self.buffer);
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => data.ld_jsons.push(value),
            Err(e) => tracing::debug!(len = raw.len(), "discarding malformed JSON-LD block: {}", e),
        }
    }
}
