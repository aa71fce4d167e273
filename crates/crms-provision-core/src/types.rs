use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = rust_decimal::Decimal;

/// Rates and multipliers as decimals (0.25 = 25%). Never as percentages.
pub type Rate = rust_decimal::Decimal;

/// Year fractions on a 365-day year.
pub type Years = rust_decimal::Decimal;

/// Standard envelope around every batch provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    /// Run-level warnings only; row substitutions are counted in the summary.
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub rows_processed: usize,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Wrap a run result with methodology, assumptions and metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    rows_processed: usize,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            rows_processed,
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
