//! Typed price-identifier mapping.
//!
//! The payment processor speaks in opaque price identifiers; the engine
//! resolves them to a plan and its credit allotment through a [`PlanTable`]
//! built once at startup and validated there, instead of comparing
//! environment strings at every call site.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::account::Plan;
use crate::error::CoreError;

/// A resolved plan entry: the target plan and its credit allotment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSpec {
    /// The plan this price identifier maps to.
    pub plan: Plan,
    /// Credits granted per billing cycle on this plan.
    pub allotment: i64,
}

/// Mapping from processor price identifier to plan and allotment.
#[derive(Debug, Clone)]
pub struct PlanTable {
    entries: HashMap<String, PlanSpec>,
}

impl PlanTable {
    /// Build a table from `(price_id, plan)` pairs, taking each plan's
    /// default allotment.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if the table is empty, a price
    /// identifier is blank, a free-tier entry is present (the free plan has
    /// no price), or the same identifier appears twice.
    pub fn new<I>(entries: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (String, Plan)>,
    {
        let mut map = HashMap::new();
        for (price_id, plan) in entries {
            if price_id.trim().is_empty() {
                return Err(CoreError::Configuration(
                    "price identifier must not be blank".into(),
                ));
            }
            if plan == Plan::Free {
                return Err(CoreError::Configuration(
                    "the free plan has no purchasable price".into(),
                ));
            }
            let spec = PlanSpec {
                plan,
                allotment: plan.allotment(),
            };
            if map.insert(price_id.clone(), spec).is_some() {
                return Err(CoreError::Configuration(format!(
                    "duplicate price identifier: {price_id}"
                )));
            }
        }
        if map.is_empty() {
            return Err(CoreError::Configuration(
                "plan table must contain at least one price".into(),
            ));
        }
        Ok(Self { entries: map })
    }

    /// Resolve a price identifier to its plan spec.
    #[must_use]
    pub fn resolve(&self, price_id: &str) -> Option<PlanSpec> {
        self.entries.get(price_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PlanTable {
        PlanTable::new([
            ("price_standard".to_string(), Plan::Standard),
            ("price_premium".to_string(), Plan::Premium),
        ])
        .unwrap()
    }

    #[test]
    fn resolves_known_prices() {
        let table = table();
        let spec = table.resolve("price_standard").unwrap();
        assert_eq!(spec.plan, Plan::Standard);
        assert_eq!(spec.allotment, Plan::Standard.allotment());

        let spec = table.resolve("price_premium").unwrap();
        assert_eq!(spec.plan, Plan::Premium);
    }

    #[test]
    fn unknown_price_is_none() {
        assert!(table().resolve("price_unknown").is_none());
    }

    #[test]
    fn rejects_empty_table() {
        assert!(PlanTable::new([]).is_err());
    }

    #[test]
    fn rejects_blank_price_id() {
        assert!(PlanTable::new([("  ".to_string(), Plan::Standard)]).is_err());
    }

    #[test]
    fn rejects_duplicate_price_id() {
        let result = PlanTable::new([
            ("price_x".to_string(), Plan::Standard),
            ("price_x".to_string(), Plan::Premium),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_free_plan_entry() {
        assert!(PlanTable::new([("price_free".to_string(), Plan::Free)]).is_err());
    }
}
