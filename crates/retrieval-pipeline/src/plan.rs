use serde::{Deserialize, Serialize};

pub const PLAN_TOP_K_MIN: i64 = 1;
pub const PLAN_TOP_K_MAX: i64 = 8;
pub const PLAN_TOP_K_DEFAULT: usize = 5;

/// Retrieval plan as produced by the intent-analysis call, before
/// normalization. Everything except `should_search` is optional because
/// model output is untrusted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchPlan {
    pub should_search: bool,
    #[serde(default)]
    pub search_query: Option<String>,
    #[serde(default)]
    pub identified_entities: Vec<String>,
    #[serde(default)]
    pub top_k: Option<f64>,
}

impl SearchPlan {
    /// Default plan used when the planner output cannot be parsed.
    pub fn fallback(user_message: &str) -> Self {
        Self {
            should_search: true,
            search_query: Some(user_message.to_string()),
            identified_entities: Vec::new(),
            top_k: None,
        }
    }
}

/// Validated plan the orchestrator executes. Also part of the cache key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NormalizedPlan {
    pub should_search: bool,
    pub search_query: String,
    pub identified_entities: Vec<String>,
    pub top_k: usize,
}

/// Clamps `top_k` into `[1, 8]` by floor, defaulting to 5 when it is absent
/// or non-finite, and fills an absent search query from the user message.
pub fn normalize_plan(plan: SearchPlan, user_message: &str) -> NormalizedPlan {
    let top_k = match plan.top_k {
        Some(value) if value.is_finite() => {
            (value.floor() as i64).clamp(PLAN_TOP_K_MIN, PLAN_TOP_K_MAX) as usize
        }
        _ => PLAN_TOP_K_DEFAULT,
    };

    NormalizedPlan {
        should_search: plan.should_search,
        search_query: plan
            .search_query
            .unwrap_or_else(|| user_message.to_string()),
        identified_entities: plan.identified_entities,
        top_k,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_top_k(top_k: Option<f64>) -> SearchPlan {
        SearchPlan {
            should_search: true,
            search_query: Some("query".to_string()),
            identified_entities: Vec::new(),
            top_k,
        }
    }

    #[test]
    fn test_top_k_in_range_is_floored() {
        assert_eq!(normalize_plan(plan_with_top_k(Some(3.7)), "").top_k, 3);
        assert_eq!(normalize_plan(plan_with_top_k(Some(1.0)), "").top_k, 1);
        assert_eq!(normalize_plan(plan_with_top_k(Some(8.0)), "").top_k, 8);
    }

    #[test]
    fn test_top_k_is_clamped() {
        assert_eq!(normalize_plan(plan_with_top_k(Some(0.5)), "").top_k, 1);
        assert_eq!(normalize_plan(plan_with_top_k(Some(-3.0)), "").top_k, 1);
        assert_eq!(normalize_plan(plan_with_top_k(Some(9.0)), "").top_k, 8);
        assert_eq!(normalize_plan(plan_with_top_k(Some(1e12)), "").top_k, 8);
    }

    #[test]
    fn test_top_k_defaults_when_absent_or_non_finite() {
        assert_eq!(normalize_plan(plan_with_top_k(None), "").top_k, 5);
        assert_eq!(normalize_plan(plan_with_top_k(Some(f64::NAN)), "").top_k, 5);
        assert_eq!(
            normalize_plan(plan_with_top_k(Some(f64::INFINITY)), "").top_k,
            5
        );
    }

    #[test]
    fn test_missing_query_falls_back_to_user_message() {
        let plan = SearchPlan {
            should_search: true,
            search_query: None,
            identified_entities: Vec::new(),
            top_k: None,
        };
        assert_eq!(normalize_plan(plan, "what is rust").search_query, "what is rust");
    }

    #[test]
    fn test_fallback_plan_searches_the_user_message() {
        let normalized = normalize_plan(SearchPlan::fallback("what is rust"), "what is rust");
        assert!(normalized.should_search);
        assert_eq!(normalized.search_query, "what is rust");
        assert_eq!(normalized.top_k, PLAN_TOP_K_DEFAULT);
        assert!(normalized.identified_entities.is_empty());
    }

    #[test]
    fn test_plan_parses_from_model_json() {
        let plan: SearchPlan = serde_json::from_str(
            r#"{"should_search": true, "search_query": "rust", "identified_entities": ["Tokio"], "top_k": 4}"#,
        )
        .expect("parse plan");
        assert_eq!(plan.identified_entities, vec!["Tokio"]);
        assert_eq!(plan.top_k, Some(4.0));
    }
}
