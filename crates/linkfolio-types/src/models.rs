use serde::{Deserialize, Serialize};

/// A typed outbound link. Reward and secondary link lists are both stored as
/// JSON arrays of these.
///
/// Unknown keys on incoming objects are dropped, which is how link lists get
/// normalized to `{type, link}` before they are persisted. Either key may be
/// missing; it is then left out when the entry is written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl LinkEntry {
    pub fn new(link_type: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            link_type: Some(link_type.into()),
            link: Some(link.into()),
        }
    }
}

/// A full account row, with both link columns already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub niche: Option<String>,
    pub name: Option<String>,
    pub aboutme: Option<String>,
    #[serde(rename = "uniqueUrl")]
    pub unique_url: String,
    pub image: Option<String>,
    pub reward_links: Vec<LinkEntry>,
    pub secondary_links: Vec<LinkEntry>,
    /// Opaque; never written by this service.
    pub ecommerce: serde_json::Value,
}

/// Public-facing profile entry returned by the bulk listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub username: String,
    pub image: Option<String>,
    pub name: Option<String>,
    pub niche: Option<String>,
    pub aboutme: Option<String>,
    pub reward_links: Vec<LinkEntry>,
    pub secondary_links: Vec<LinkEntry>,
    pub ecommerce: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_entries_keep_what_they_have() {
        let entries: Vec<LinkEntry> =
            serde_json::from_value(json!([{ "type": "shop" }, { "link": "x", "extra": 1 }, {}]))
                .unwrap();
        assert_eq!(entries[0].link_type.as_deref(), Some("shop"));
        assert_eq!(entries[0].link, None);

        assert_eq!(
            serde_json::to_value(&entries).unwrap(),
            json!([{ "type": "shop" }, { "link": "x" }, {}])
        );
    }

    #[test]
    fn non_string_values_are_rejected() {
        let parsed = serde_json::from_value::<LinkEntry>(json!({ "type": "shop", "link": 7 }));
        assert!(parsed.is_err());
    }
}
