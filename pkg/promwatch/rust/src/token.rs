// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

/// Header carrying the correlation token on every query request.
pub const TOKEN_HEADER: &str = "X-Promwatch-Token";

/// Correlation key for an in-flight query.
///
/// The expression doubles as the key; the optional disambiguator keeps two
/// subscribers that request the same expression with different intents
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryToken {
    expression: String,
    disambiguator: Option<String>,
}

impl QueryToken {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            disambiguator: None,
        }
    }

    pub fn with_disambiguator(
        expression: impl Into<String>,
        disambiguator: impl Into<String>,
    ) -> Self {
        let disambiguator = disambiguator.into();
        Self {
            expression: expression.into(),
            disambiguator: (!disambiguator.is_empty()).then_some(disambiguator),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn disambiguator(&self) -> Option<&str> {
        self.disambiguator.as_deref()
    }

    /// Unmapped queries resolve to an empty expression and must never be sent.
    pub fn is_empty(&self) -> bool {
        self.expression.trim().is_empty()
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.disambiguator {
            Some(d) => write!(f, "{}#{}", self.expression, d),
            None => write!(f, "{}", self.expression),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Instant,
    Range,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Instant => write!(f, "instant"),
            QueryKind::Range => write!(f, "range"),
        }
    }
}

/// A single request to issue for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub token: QueryToken,
    pub kind: QueryKind,
}

impl Query {
    pub fn instant(token: QueryToken) -> Self {
        Self {
            token,
            kind: QueryKind::Instant,
        }
    }

    pub fn range(token: QueryToken) -> Self {
        Self {
            token,
            kind: QueryKind::Range,
        }
    }

    pub fn expression(&self) -> &str {
        self.token.expression()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} query {}", self.kind, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_expression_different_intent() {
        let raw = QueryToken::with_disambiguator("node_load1", "Raw");
        let usage = QueryToken::with_disambiguator("node_load1", "Usage%");
        assert_ne!(raw, usage);
        assert_eq!(raw.expression(), usage.expression());
    }

    #[test]
    fn test_empty_disambiguator_is_dropped() {
        let token = QueryToken::with_disambiguator("up", "");
        assert_eq!(token, QueryToken::new("up"));
        assert_eq!(token.to_string(), "up");
    }

    #[test]
    fn test_display() {
        let token = QueryToken::with_disambiguator("up", "Dynamic");
        assert_eq!(token.to_string(), "up#Dynamic");
    }

    #[test]
    fn test_query_display() {
        let query = Query::range(QueryToken::with_disambiguator("up", "Raw"));
        assert_eq!(query.to_string(), "range query up#Raw");
        assert_eq!(query.expression(), "up");
        assert_eq!(Query::instant(QueryToken::new("up")).kind, QueryKind::Instant);
    }

    #[test]
    fn test_is_empty() {
        assert!(QueryToken::new("").is_empty());
        assert!(QueryToken::new("   ").is_empty());
        assert!(!QueryToken::new("up").is_empty());
    }
}
