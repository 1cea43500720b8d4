use std::time::Duration;

use async_trait::async_trait;
use medretrieve_common::{MedretrieveError, Result, Section};
use serde_json::Value;

use crate::context::ToolContext;
use crate::registry::Tool;
use medretrieve_retrieval::{ReturnKind, SearchFilters, SearchMode, SearchOptions};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

fn parse_section(s: &str) -> Result<Section> {
    match s {
        "Background" => Ok(Section::Background),
        "Methods" => Ok(Section::Methods),
        "Results" => Ok(Section::Results),
        "Conclusions" => Ok(Section::Conclusions),
        "Other" => Ok(Section::Other),
        "Unstructured" => Ok(Section::Unstructured),
        other => Err(MedretrieveError::validation("section", format!("unknown section {other:?}"))),
    }
}

fn parse_filters(params: &Value) -> Result<SearchFilters> {
    let filters = params.get("filters").cloned().unwrap_or_else(|| serde_json::json!({}));

    let source = filters.get("source").and_then(Value::as_str).map(str::to_string);

    let year_range = filters
        .get("year_range")
        .and_then(Value::as_array)
        .map(|arr| -> Result<(i32, i32)> {
            let lo = arr.first().and_then(Value::as_i64).ok_or_else(|| MedretrieveError::validation("filters.year_range", "expected [lo, hi]"))?;
            let hi = arr.get(1).and_then(Value::as_i64).ok_or_else(|| MedretrieveError::validation("filters.year_range", "expected [lo, hi]"))?;
            if lo > hi {
                return Err(MedretrieveError::validation("filters.year_range", "lo must be <= hi"));
            }
            Ok((lo as i32, hi as i32))
        })
        .transpose()?;

    let sections = filters
        .get("sections")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(parse_section).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    Ok(SearchFilters { source, year_range, sections })
}

fn parse_options(params: &Value) -> Result<SearchOptions> {
    let mode = params.get("mode").and_then(Value::as_str).map(SearchMode::parse).transpose()?.unwrap_or_default();

    let alpha = params
        .get("alpha")
        .and_then(Value::as_f64)
        .map(|a| a.clamp(0.0, 1.0))
        .unwrap_or(0.5);

    let quality_threshold = params
        .get("quality_threshold")
        .and_then(Value::as_f64)
        .map(|q| {
            if !(0.0..=1.0).contains(&q) {
                return Err(MedretrieveError::validation("quality_threshold", "must be in [0,1]"));
            }
            Ok(q)
        })
        .transpose()?;

    let boost_recent = params.get("boost_recent").and_then(Value::as_bool).unwrap_or(true);
    let boost_clinical = params.get("boost_clinical").and_then(Value::as_bool).unwrap_or(true);
    let return_kind = params.get("return").and_then(Value::as_str).map(ReturnKind::parse).transpose()?.unwrap_or_default();

    Ok(SearchOptions { mode, alpha, quality_threshold, boost_recent, boost_clinical, return_kind })
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Hybrid lexical + vector search over indexed documents, returning ranked hits with snippets."
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LIMIT },
                "mode": { "type": "string", "enum": ["hybrid", "vector", "lexical"] },
                "alpha": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "quality_threshold": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "boost_recent": { "type": "boolean" },
                "boost_clinical": { "type": "boolean" },
                "return": { "type": "string", "enum": ["documents", "chunks"] },
                "filters": {
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "year_range": { "type": "array", "items": { "type": "integer" }, "minItems": 2, "maxItems": 2 },
                        "sections": { "type": "array", "items": { "type": "string" } },
                    },
                    "additionalProperties": false,
                },
            },
            "required": ["query"],
            "additionalProperties": false,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn cap_key(&self) -> &str {
        "search"
    }

    async fn run(&self, ctx: &ToolContext, params: Value, _idempotency_key: Option<&str>) -> Result<Value> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| MedretrieveError::validation("query", "query is required"))?;

        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);

        let filters = parse_filters(&params)?;
        let options = parse_options(&params)?;
        let results = ctx.engine.search(query, filters, limit, &options).await?;
        Ok(serde_json::json!({ "hits": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_section() {
        let err = parse_section("Abstract").unwrap_err();
        assert_eq!(err.code(), medretrieve_common::ErrorCode::Validation);
    }

    #[test]
    fn parses_known_sections() {
        assert_eq!(parse_section("Methods").unwrap(), Section::Methods);
    }

    #[test]
    fn parse_filters_accepts_empty_params() {
        let filters = parse_filters(&serde_json::json!({})).unwrap();
        assert!(filters.source.is_none());
        assert!(filters.year_range.is_none());
        assert!(filters.sections.is_empty());
    }

    #[test]
    fn parse_filters_reads_nested_shape() {
        let filters = parse_filters(&serde_json::json!({
            "filters": { "source": "pubmed", "year_range": [2020, 2024], "sections": ["Methods", "Results"] }
        }))
        .unwrap();
        assert_eq!(filters.source.as_deref(), Some("pubmed"));
        assert_eq!(filters.year_range, Some((2020, 2024)));
        assert_eq!(filters.sections, vec![Section::Methods, Section::Results]);
    }

    #[test]
    fn parse_filters_rejects_inverted_year_range() {
        let err = parse_filters(&serde_json::json!({"filters": {"year_range": [2024, 2020]}})).unwrap_err();
        assert_eq!(err.code(), medretrieve_common::ErrorCode::Validation);
    }

    #[test]
    fn parse_options_defaults_match_tool_surface_defaults() {
        let options = parse_options(&serde_json::json!({})).unwrap();
        assert_eq!(options.mode, SearchMode::Hybrid);
        assert_eq!(options.alpha, 0.5);
        assert!(options.quality_threshold.is_none());
        assert!(options.boost_recent);
        assert!(options.boost_clinical);
        assert_eq!(options.return_kind, ReturnKind::Documents);
    }

    #[test]
    fn parse_options_clamps_alpha_rather_than_erroring() {
        let options = parse_options(&serde_json::json!({"alpha": 5.0})).unwrap();
        assert_eq!(options.alpha, 1.0);
    }

    #[test]
    fn parse_options_rejects_out_of_range_quality_threshold() {
        let err = parse_options(&serde_json::json!({"quality_threshold": 1.5})).unwrap_err();
        assert_eq!(err.code(), medretrieve_common::ErrorCode::Validation);
    }
}
