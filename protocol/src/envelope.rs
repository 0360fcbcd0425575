use serde::Deserialize;
use serde::Serialize;

/// Single-resource response body: `{ success, data, message? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// List response body: `{ success, data, metadata?, message? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ListEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total_count: u64,
    pub has_more: bool,
}

impl PageMeta {
    /// Metadata for a list endpoint that does not paginate.
    pub fn single(count: usize) -> Self {
        Self {
            page: 1,
            limit: count as u32,
            total_count: count as u64,
            has_more: false,
        }
    }
}

/// One fetched page of a collection, as the repository layer hands it out and
/// as the cache store snapshots it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Pagination parameters for list calls, sent as `page`/`limit` query
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn query(self) -> [(&'static str, String); 2] {
        [
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn list_envelope_tolerates_missing_fields() {
        let parsed: ListEnvelope<String> =
            serde_json::from_str(r#"{"success":true}"#).expect("decode");
        assert!(parsed.success);
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.metadata, None);
    }

    #[test]
    fn page_meta_uses_camel_case_on_the_wire() {
        let meta: PageMeta = serde_json::from_str(
            r#"{"page":2,"limit":20,"totalCount":55,"hasMore":true}"#,
        )
        .expect("decode");
        assert_eq!(meta.total_count, 55);
        assert!(meta.has_more);
    }
}
