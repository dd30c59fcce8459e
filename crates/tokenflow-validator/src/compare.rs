use crate::target::TargetRecord;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueMismatch {
    pub identity: String,
    pub legacy: Value,
    pub candidate: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMismatch {
    pub identity: String,
    pub legacy: String,
    pub candidate: String,
}

/// Differences between the legacy state (A) and the candidate state (B)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    pub only_in_legacy: Vec<String>,
    pub only_in_candidate: Vec<String>,
    pub value_mismatches: Vec<ValueMismatch>,
    pub type_mismatches: Vec<TypeMismatch>,
    pub legacy_count: usize,
    pub candidate_count: usize,
}

impl DiscrepancyReport {
    pub fn total_differences(&self) -> usize {
        self.only_in_legacy.len()
            + self.only_in_candidate.len()
            + self.value_mismatches.len()
            + self.type_mismatches.len()
    }

    /// `total_differences / max(|A|, |B|)`, 0 when both states are empty
    pub fn discrepancy_rate(&self) -> f64 {
        let denominator = self.legacy_count.max(self.candidate_count);
        if denominator == 0 {
            return 0.0;
        }
        self.total_differences() as f64 / denominator as f64
    }

    pub fn is_clean(&self) -> bool {
        self.total_differences() == 0
    }
}

/// Compare two target states by identity.
///
/// A record present in both states can count as both a value and a type mismatch.
pub fn compare_states(legacy: &[TargetRecord], candidate: &[TargetRecord]) -> DiscrepancyReport {
    let legacy_index: HashMap<&str, &TargetRecord> =
        legacy.iter().map(|r| (r.identity.as_str(), r)).collect();
    let candidate_index: HashMap<&str, &TargetRecord> =
        candidate.iter().map(|r| (r.identity.as_str(), r)).collect();

    let mut report = DiscrepancyReport {
        legacy_count: legacy_index.len(),
        candidate_count: candidate_index.len(),
        ..DiscrepancyReport::default()
    };

    for record in legacy {
        let Some(other) = candidate_index.get(record.identity.as_str()) else {
            report.only_in_legacy.push(record.identity.clone());
            continue;
        };

        if !values_equal(&record.value, &other.value) {
            report.value_mismatches.push(ValueMismatch {
                identity: record.identity.clone(),
                legacy: record.value.clone(),
                candidate: other.value.clone(),
            });
        }
        if record.record_type != other.record_type {
            report.type_mismatches.push(TypeMismatch {
                identity: record.identity.clone(),
                legacy: record.record_type.clone(),
                candidate: other.record_type.clone(),
            });
        }
    }

    for record in candidate {
        if !legacy_index.contains_key(record.identity.as_str()) {
            report.only_in_candidate.push(record.identity.clone());
        }
    }

    report
}

/// Deep equality where numbers compare by numeric value (`1` equals `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}
