//! Literal query matching against trace rows
use crate::tree::NodeValue;
use memchr::memmem::Finder;

/// Case-sensitive literal query, compiled once per scan
///
/// Substring checks go through a `memmem` finder; identifier and level
/// checks are exact comparisons. No normalization is applied to either side.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    query: String,
    finder: Finder<'static>,
}

impl QueryMatcher {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            finder: Finder::new(query.as_bytes()).into_owned(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    fn contains(&self, haystack: Option<&str>) -> bool {
        haystack.is_some_and(|text| self.finder.find(text.as_bytes()).is_some())
    }

    fn equals(&self, value: Option<&str>) -> bool {
        value == Some(self.query.as_str())
    }

    /// Test one row. An empty query never matches.
    pub fn matches(&self, value: &NodeValue) -> bool {
        if self.is_empty() {
            return false;
        }

        match value {
            NodeValue::Span(span) => {
                self.contains(span.op.as_deref())
                    || self.contains(span.description.as_deref())
                    || self.equals(Some(&span.span_id))
            }
            NodeValue::Transaction(txn) => {
                self.contains(txn.op.as_deref())
                    || self.contains(Some(&txn.transaction))
                    || self.equals(Some(&txn.event_id))
            }
            NodeValue::Autogroup(group) => {
                self.contains(group.op.as_deref()) || self.contains(group.description.as_deref())
            }
            NodeValue::Error(error) => {
                self.equals(error.level.as_deref()) || self.contains(error.title.as_deref())
            }
            NodeValue::MissingInstrumentation(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{
        AutogroupValue, ErrorValue, MissingInstrumentationValue, SpanValue, TransactionValue,
    };

    fn span() -> NodeValue {
        NodeValue::Span(SpanValue {
            span_id: "a1b2c3".to_string(),
            op: Some("db.query".to_string()),
            description: Some("SELECT * FROM users".to_string()),
        })
    }

    fn transaction() -> NodeValue {
        NodeValue::Transaction(TransactionValue {
            event_id: "ffee00".to_string(),
            transaction: "/api/checkout".to_string(),
            op: Some("http.server".to_string()),
        })
    }

    fn error() -> NodeValue {
        NodeValue::Error(ErrorValue {
            event_id: "e1".to_string(),
            level: Some("fatal".to_string()),
            title: Some("ValueError: bad input".to_string()),
        })
    }

    #[test]
    fn test_span_matching() {
        assert!(QueryMatcher::new("db").matches(&span()));
        assert!(QueryMatcher::new("FROM users").matches(&span()));
        assert!(QueryMatcher::new("a1b2c3").matches(&span()));
        // span ids match exactly, never by substring
        assert!(!QueryMatcher::new("a1b2").matches(&span()));
    }

    #[test]
    fn test_transaction_matching() {
        assert!(QueryMatcher::new("http").matches(&transaction()));
        assert!(QueryMatcher::new("checkout").matches(&transaction()));
        assert!(QueryMatcher::new("ffee00").matches(&transaction()));
        assert!(!QueryMatcher::new("ffee").matches(&transaction()));
    }

    #[test]
    fn test_autogroup_matching() {
        let group = NodeValue::Autogroup(AutogroupValue {
            op: Some("http.client".to_string()),
            description: None,
            group_count: 5,
        });

        assert!(QueryMatcher::new("client").matches(&group));
        assert!(!QueryMatcher::new("server").matches(&group));
    }

    #[test]
    fn test_error_matching() {
        assert!(QueryMatcher::new("fatal").matches(&error()));
        assert!(!QueryMatcher::new("fat").matches(&error()));
        assert!(QueryMatcher::new("bad input").matches(&error()));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!QueryMatcher::new("SELECT * from").matches(&span()));
        assert!(!QueryMatcher::new("DB").matches(&span()));
    }

    #[test]
    fn test_empty_query_never_matches() {
        let matcher = QueryMatcher::new("");
        assert!(!matcher.matches(&span()));
        assert!(!matcher.matches(&transaction()));
        assert!(!matcher.matches(&error()));
    }

    #[test]
    fn test_missing_instrumentation_never_matches() {
        let gap = NodeValue::MissingInstrumentation(MissingInstrumentationValue {
            duration_ms: 40.0,
        });
        assert!(!QueryMatcher::new("Missing").matches(&gap));
    }
}
