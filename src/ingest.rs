//! Manual outcome entry
//!
//! Operators can push a batch of values by hand (CLI or HTTP). Each value
//! gets a synthetic id and then goes through the same intake as polled
//! outcomes, so range checks and scoring apply unchanged.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::models::RawOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

pub fn synthetic_id() -> String {
    format!("manual-{}", Uuid::new_v4())
}

/// Turn a batch into raw outcomes. Range checks happen at intake, this
/// only enforces the batch bounds.
pub fn prepare_batch(values: &[i64], config: &IngestConfig) -> Result<Vec<RawOutcome>> {
    if values.is_empty() {
        bail!("empty batch");
    }
    if values.len() > config.max_batch {
        bail!(
            "batch of {} values exceeds the limit of {}",
            values.len(),
            config.max_batch
        );
    }
    Ok(values
        .iter()
        .map(|&v| RawOutcome::new(v, synthetic_id()))
        .collect())
}

/// Parse "1, 2 3,17" style input from the command line.
pub fn parse_values(input: &str) -> Result<Vec<i64>> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("'{}' is not a number", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_batch_bounds() {
        let config = IngestConfig { max_batch: 3 };
        assert!(prepare_batch(&[], &config).is_err());
        assert!(prepare_batch(&[1, 2, 3, 4], &config).is_err());

        let batch = prepare_batch(&[1, 99, -4], &config).unwrap();
        assert_eq!(batch.len(), 3);
        // out-of-range values still pass through, intake drops them
        assert_eq!(batch[1].value, Some(99));
    }

    #[test]
    fn test_synthetic_ids_are_unique() {
        let batch = prepare_batch(&[5; 50], &IngestConfig::default()).unwrap();
        let ids: HashSet<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 50);
        assert!(batch.iter().all(|r| r.id.starts_with("manual-")));
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_values("1, 2 3,17").unwrap(), vec![1, 2, 3, 17]);
        assert_eq!(parse_values(" ").unwrap(), Vec::<i64>::new());
        assert!(parse_values("4,x").is_err());
    }
}
