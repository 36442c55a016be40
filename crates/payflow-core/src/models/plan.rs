//! Subscription plans and their feature bags

use super::BillingCycle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;

/// Plan entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub features: Json<PlanFeatures>,
    pub is_active: bool,
}

/// Feature bag stored as JSONB on the plan row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanFeatures {
    /// Per-feature usage limits, e.g. `{"api_calls": 100}`
    #[serde(default)]
    pub limits: HashMap<String, i64>,

    /// Marks a trial plan (nominal charge + immediate refund)
    #[serde(default)]
    pub trial: Option<bool>,

    /// Trial length in days
    #[serde(default)]
    pub period_days: Option<i64>,

    /// Plan to switch to when a trial renews
    #[serde(default)]
    pub renewal_plan: Option<i32>,
}

impl Plan {
    /// Whether the feature bag marks this as a trial plan.
    pub fn is_trial_plan(&self) -> bool {
        self.features.trial == Some(true)
    }

    /// Trial length; 14 days when the bag does not say.
    pub fn trial_period_days(&self) -> i64 {
        if self.is_trial_plan() {
            self.features.period_days.unwrap_or(14)
        } else {
            0
        }
    }

    /// Renewal plan configured for a trial, if any.
    pub fn renewal_plan_id(&self) -> Option<i32> {
        if self.is_trial_plan() {
            self.features.renewal_plan
        } else {
            None
        }
    }

    /// Limit for one feature; `None` means the feature is unavailable.
    pub fn feature_limit(&self, feature: &str) -> Option<i64> {
        self.features.limits.get(feature).copied()
    }

    pub fn feature_limits(&self) -> &HashMap<String, i64> {
        &self.features.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn plan_with_features(features: PlanFeatures) -> Plan {
        Plan {
            id: 1,
            name: "Trial".to_string(),
            description: None,
            price: Decimal::ONE,
            currency: "AED".to_string(),
            billing_cycle: BillingCycle::Monthly,
            features: Json(features),
            is_active: true,
        }
    }

    #[test]
    fn test_trial_plan_detection() {
        let plan = plan_with_features(PlanFeatures {
            trial: Some(true),
            period_days: Some(7),
            renewal_plan: Some(2),
            ..Default::default()
        });

        assert!(plan.is_trial_plan());
        assert_eq!(plan.trial_period_days(), 7);
        assert_eq!(plan.renewal_plan_id(), Some(2));
    }

    #[test]
    fn test_non_trial_plan_has_no_trial_surface() {
        let plan = plan_with_features(PlanFeatures {
            renewal_plan: Some(2),
            ..Default::default()
        });

        assert!(!plan.is_trial_plan());
        assert_eq!(plan.trial_period_days(), 0);
        assert_eq!(plan.renewal_plan_id(), None);
    }

    #[test]
    fn test_feature_limits() {
        let mut limits = HashMap::new();
        limits.insert("api_calls".to_string(), 100);
        let plan = plan_with_features(PlanFeatures {
            limits,
            ..Default::default()
        });

        assert_eq!(plan.feature_limit("api_calls"), Some(100));
        assert_eq!(plan.feature_limit("reports"), None);
    }

    #[test]
    fn test_features_parse_from_json() {
        let features: PlanFeatures =
            serde_json::from_str(r#"{"limits":{"api_calls":100},"trial":true,"renewal_plan":3}"#)
                .unwrap();
        assert_eq!(features.limits.get("api_calls"), Some(&100));
        assert_eq!(features.trial, Some(true));
        assert_eq!(features.renewal_plan, Some(3));
        assert_eq!(features.period_days, None);
    }
}
