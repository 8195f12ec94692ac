use serde::{Deserialize, Deserializer, Serialize};

/// A bookmark exported from the source service. Read-only input for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_status", deserialize_with = "de_status")]
    pub status: String,
    /// Pipe-joined tag string, e.g. `programming|_reading`.
    #[serde(default)]
    pub tags: String,
    /// Epoch seconds; 0 when unknown.
    #[serde(rename = "time_added", default, deserialize_with = "de_epoch")]
    pub added_at: i64,
}

impl SourceRecord {
    pub fn new(url: &str, title: &str, tags: &str, status: &str, added_at: i64) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            status: status.trim().to_lowercase(),
            tags: tags.to_string(),
            added_at,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == "archive"
    }

    /// First declared tag, if any.
    pub fn first_tag(&self) -> Option<&str> {
        self.tags
            .split('|')
            .map(str::trim)
            .find(|t| !t.is_empty())
    }
}

fn default_status() -> String {
    "unread".to_string()
}

fn de_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let status = raw.trim().to_lowercase();
    if status.is_empty() {
        Ok(default_status())
    } else {
        Ok(status)
    }
}

// Exports leave `time_added` blank for some rows.
fn de_epoch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tag_skips_blank_segments() {
        let record = SourceRecord::new("https://a.example", "A", " |rust|python", "unread", 0);
        assert_eq!(record.first_tag(), Some("rust"));

        let untagged = SourceRecord::new("https://a.example", "A", "", "unread", 0);
        assert_eq!(untagged.first_tag(), None);
    }

    #[test]
    fn status_is_normalized() {
        let record = SourceRecord::new("https://a.example", "A", "", " Archive ", 0);
        assert!(record.is_archived());
    }
}
