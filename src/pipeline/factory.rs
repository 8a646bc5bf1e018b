use serde_json::Value;

use crate::models::DataKind;
use crate::pipeline::engine::Pipeline;
use crate::pipeline::step::StepDescriptor;
use crate::pipeline::steps::{
    FETCH_ALTERNATIVE_DATA, FETCH_FUNDAMENTAL_DATA, FETCH_MARKET_DATA, PERSIST_ALTERNATIVE_DATA,
    PERSIST_FUNDAMENTAL_DATA, PERSIST_MARKET_DATA, TRANSFORM_ALTERNATIVE_DATA,
    TRANSFORM_FUNDAMENTAL_DATA, TRANSFORM_MARKET_DATA,
};

/// Canonical pipeline name for a (data kind, source) pair.
pub fn pipeline_name(kind: &DataKind, source: &str) -> String {
    match kind {
        DataKind::Market => format!("{source}_market_data_pipeline"),
        DataKind::Fundamental => format!("{source}_fundamental_data_pipeline"),
        DataKind::Alternative(subtype) => format!("{subtype}_{source}_pipeline"),
    }
}

fn symbols_value(symbols: &[String]) -> Value {
    Value::Array(symbols.iter().cloned().map(Value::String).collect())
}

/// Builds the standard fetch → transform → persist definition for a data
/// kind. Pure data: registering the result has no side effects until the
/// pipeline is started.
pub fn build_pipeline(kind: &DataKind, source: &str, symbols: &[String]) -> Pipeline {
    let name = pipeline_name(kind, source);
    match kind {
        DataKind::Market => Pipeline::new(
            name,
            format!("Fetches, transforms, and stores market data from {source}"),
        )
        .add_step(
            StepDescriptor::new(FETCH_MARKET_DATA)
                .with_param("source", Value::String(source.to_string()))
                .with_param("symbols", symbols_value(symbols)),
        )
        .add_step(StepDescriptor::new(TRANSFORM_MARKET_DATA))
        .add_step(
            StepDescriptor::new(PERSIST_MARKET_DATA)
                .with_param("source", Value::String(source.to_string())),
        ),
        DataKind::Fundamental => Pipeline::new(
            name,
            format!("Fetches, transforms, and stores fundamental data from {source}"),
        )
        .add_step(
            StepDescriptor::new(FETCH_FUNDAMENTAL_DATA)
                .with_param("source", Value::String(source.to_string()))
                .with_param("symbols", symbols_value(symbols)),
        )
        .add_step(StepDescriptor::new(TRANSFORM_FUNDAMENTAL_DATA))
        .add_step(
            StepDescriptor::new(PERSIST_FUNDAMENTAL_DATA)
                .with_param("source", Value::String(source.to_string())),
        ),
        DataKind::Alternative(subtype) => Pipeline::new(
            name,
            format!("Fetches, transforms, and stores {subtype} data from {source}"),
        )
        .add_step(
            StepDescriptor::new(FETCH_ALTERNATIVE_DATA)
                .with_param("data_type", Value::String(subtype.clone()))
                .with_param("source", Value::String(source.to_string()))
                .with_param("symbols", symbols_value(symbols)),
        )
        .add_step(StepDescriptor::new(TRANSFORM_ALTERNATIVE_DATA))
        .add_step(
            StepDescriptor::new(PERSIST_ALTERNATIVE_DATA)
                .with_param("data_type", Value::String(subtype.clone()))
                .with_param("source", Value::String(source.to_string())),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_source_convention() {
        assert_eq!(
            pipeline_name(&DataKind::Market, "fmp"),
            "fmp_market_data_pipeline"
        );
        assert_eq!(
            pipeline_name(&DataKind::Fundamental, "fmp"),
            "fmp_fundamental_data_pipeline"
        );
        assert_eq!(
            pipeline_name(&DataKind::Alternative("sentiment".into()), "fmp"),
            "sentiment_fmp_pipeline"
        );
    }

    #[test]
    fn built_pipelines_are_three_step_chains() {
        let symbols = vec!["AAPL".to_string()];
        for kind in [
            DataKind::Market,
            DataKind::Fundamental,
            DataKind::Alternative("news".into()),
        ] {
            let pipeline = build_pipeline(&kind, "fmp", &symbols);
            assert_eq!(pipeline.steps.len(), 3);
            assert!(pipeline.steps[0].kind.starts_with("fetch_"));
            assert!(pipeline.steps[1].kind.starts_with("transform_"));
            assert!(pipeline.steps[2].kind.starts_with("persist_"));
        }
    }
}
