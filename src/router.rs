//! Category Router
//!
//! Picks the response-bank category for a raw query: the first category, in
//! declaration order, with a keyword that occurs in the lower-cased query.
//! Routing is independent of the intent classifier and may disagree with it.

use crate::bank::ResponseBank;

/// Keyword-substring category router
#[derive(Debug, Clone, Default)]
pub struct CategoryRouter {
    /// (category, lower-cased keywords) in declaration order
    table: Vec<(String, Vec<String>)>,
}

impl CategoryRouter {
    /// Build the routing table from a bank
    pub fn from_bank(bank: &ResponseBank) -> Self {
        let table = bank
            .categories()
            .iter()
            .map(|c| {
                let keywords = c
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (c.name.clone(), keywords)
            })
            .collect();
        CategoryRouter { table }
    }

    /// Route a query to a category name
    pub fn route(&self, query: &str) -> Option<&str> {
        let lower = query.to_lowercase();
        self.table
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|(name, _)| name.as_str())
    }

    /// Number of routable categories
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> CategoryRouter {
        let bank = ResponseBank::from_json_str(
            r#"{
                "categories": [
                    {"name": "bus_delay", "keywords": ["Bus Late"]},
                    {"name": "bus", "keywords": ["bus"]},
                    {"name": "refund", "keywords": ["refund"]}
                ],
                "intents": [{"name": "unknown", "templates": ["?"]}]
            }"#,
        )
        .unwrap();
        CategoryRouter::from_bank(&bank)
    }

    #[test]
    fn test_route_first_match_wins() {
        let r = router();
        assert_eq!(r.route("My BUS LATE again"), Some("bus_delay"));
        assert_eq!(r.route("which bus is mine"), Some("bus"));
    }

    #[test]
    fn test_route_matches_keywords_made_of_stop_words() {
        // Routing sees the raw lower-cased text, not the normalized form
        let bank = ResponseBank::builtin().unwrap();
        let r = CategoryRouter::from_bank(&bank);
        assert_eq!(r.route("Where is the bus?"), Some("where_is_bus"));
    }

    #[test]
    fn test_route_none() {
        let r = router();
        assert_eq!(r.route("hello there"), None);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_builtin_routes_cancellation() {
        let bank = ResponseBank::builtin().unwrap();
        let r = CategoryRouter::from_bank(&bank);
        assert_eq!(r.route("How do I cancel my ticket?"), Some("cancellation"));
        assert_eq!(r.route("good morning"), Some("greeting"));
        assert_eq!(r.route("zzz"), None);
    }
}
