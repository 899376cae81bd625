//! Case-insensitive header map shared by requests and responses.

/// An order-preserving, case-insensitive, multi-value header map.
///
/// ```
/// use crmgate::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "image/png");
/// assert_eq!(headers.get("content-type"), Some("image/png"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Repeated names are kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries named `name`. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Access-Control-Allow-Origin", "https://app.example.com");
        assert_eq!(
            h.get("access-control-allow-origin"),
            Some("https://app.example.com")
        );
        assert!(h.contains("ACCESS-CONTROL-ALLOW-ORIGIN"));
    }

    #[test]
    fn set_replaces_all_previous_values() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        h.insert("content-type", "text/html");
        h.set("Content-Type", "application/json");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("content-type"), Some("application/json"));
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("apikey", "k");
        assert!(h.remove("APIKEY"));
        assert!(h.is_empty());
        assert!(!h.remove("apikey"));
    }
}
