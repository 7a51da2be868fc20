//! Threshold update engine
//!
//! A pure function from `(document, update)` to `(document', action)`. The
//! engine never performs I/O and never validates magnitudes; it only decides
//! between the set and revert branches.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::error::ValidationError;
use crate::models::{is_default_keyword, TenantConfig, ThresholdDocument, ThresholdValue};

/// One requested change to a tenant's overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdUpdate {
    pub tenant: String,
    pub metric: String,
    /// Magnitude, a disable keyword, or `default` to clear the override
    pub value: String,
    pub priority: Option<String>,
}

impl ThresholdUpdate {
    /// Build an update, rejecting empty or control-character arguments
    pub fn new(
        tenant: impl Into<String>,
        metric: impl Into<String>,
        value: impl Into<String>,
        priority: Option<String>,
    ) -> Result<Self, ValidationError> {
        let update = Self {
            tenant: tenant.into(),
            metric: metric.into(),
            value: value.into(),
            priority,
        };

        check_field("tenant", &update.tenant)?;
        check_field("metric", &update.metric)?;
        check_field("value", &update.value)?;
        if let Some(priority) = &update.priority {
            if priority.chars().any(char::is_control) {
                return Err(ValidationError::ControlCharacters {
                    field: "priority",
                    value: priority.clone(),
                });
            }
        }

        Ok(update)
    }

    /// True if this update clears the override
    pub fn is_revert(&self) -> bool {
        is_default_keyword(&self.value)
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// What `apply` did to the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionTaken {
    /// Override written (new or replacing `previous`)
    Set {
        value: ThresholdValue,
        previous: Option<ThresholdValue>,
    },
    /// Override removed; the tenant falls back to the system default
    Reverted {
        previous: ThresholdValue,
    },
    /// Revert requested but no override existed
    AlreadyDefault,
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTaken::Set {
                value,
                previous: Some(previous),
            } => write!(f, "set to {value} (was {previous})"),
            ActionTaken::Set {
                value,
                previous: None,
            } => write!(f, "set to {value}"),
            ActionTaken::Reverted { previous } => write!(f, "reverted to default (was {previous})"),
            ActionTaken::AlreadyDefault => write!(f, "already using default"),
        }
    }
}

/// Hook for rejecting updates before anything is fetched
///
/// The engine itself accepts any tenant and metric key.
pub trait UpdateValidator: Send + Sync {
    fn validate(&self, update: &ThresholdUpdate) -> Result<(), ValidationError>;
}

/// Accepts every update
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl UpdateValidator for AcceptAll {
    fn validate(&self, _update: &ThresholdUpdate) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Rejects metric keys outside a fixed set; an empty set accepts everything
#[derive(Debug, Clone, Default)]
pub struct KnownMetrics {
    metrics: Vec<String>,
}

impl KnownMetrics {
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
        }
    }
}

impl UpdateValidator for KnownMetrics {
    fn validate(&self, update: &ThresholdUpdate) -> Result<(), ValidationError> {
        if self.metrics.is_empty() || self.metrics.iter().any(|m| *m == update.metric) {
            Ok(())
        } else {
            Err(ValidationError::UnknownMetric {
                metric: update.metric.clone(),
            })
        }
    }
}

/// Apply one update to the document
///
/// The tenant entry is created if missing, for both branches. A priority given
/// together with `default` is ignored.
pub fn apply(mut doc: ThresholdDocument, update: &ThresholdUpdate) -> (ThresholdDocument, ActionTaken) {
    let config = doc
        .tenants_mut()
        .entry(update.tenant.clone())
        .or_insert_with(TenantConfig::new);

    let action = if update.is_revert() {
        if update.priority.is_some() {
            debug!(
                tenant = %update.tenant,
                metric = %update.metric,
                "Ignoring priority on revert"
            );
        }
        match config.remove(&update.metric) {
            Some(previous) => ActionTaken::Reverted { previous },
            None => ActionTaken::AlreadyDefault,
        }
    } else {
        let value = ThresholdValue::new(update.value.clone(), update.priority.as_deref());
        let previous = config.insert(update.metric.clone(), value.clone());
        ActionTaken::Set { value, previous }
    };

    debug!(
        tenant = %update.tenant,
        metric = %update.metric,
        action = %action,
        "Applied threshold update"
    );

    (doc, action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn update(tenant: &str, metric: &str, value: &str, priority: Option<&str>) -> ThresholdUpdate {
        ThresholdUpdate::new(tenant, metric, value, priority.map(str::to_string)).unwrap()
    }

    fn sample() -> ThresholdDocument {
        decode(
            "tenants:\n  db-a:\n    container_cpu: \"70:critical\"\n    mysql_connections: \"70\"\n  db-b:\n    mysql_cpu: \"40\"\n",
        )
        .unwrap()
    }

    #[test]
    fn test_lazy_tenant_creation() {
        let before = sample();
        let (after, action) = apply(before.clone(), &update("db-z", "cpu", "80", None));

        assert_eq!(after.get("db-z", "cpu").unwrap().to_string(), "80");
        assert_eq!(after.tenant("db-a"), before.tenant("db-a"));
        assert_eq!(after.tenant("db-b"), before.tenant("db-b"));
        assert!(matches!(action, ActionTaken::Set { previous: None, .. }));
    }

    #[test]
    fn test_lazy_creation_on_document_without_tenants() {
        let doc = decode("defaults:\n  cpu: 80\n").unwrap();
        let (after, _) = apply(doc, &update("db-z", "cpu", "80", None));

        assert!(after.has_tenants());
        assert_eq!(after.get("db-z", "cpu").unwrap().to_string(), "80");
    }

    #[test]
    fn test_priority_composition() {
        let (after, action) = apply(sample(), &update("db-a", "mysql_connections", "90", Some("high")));

        assert_eq!(after.get("db-a", "mysql_connections").unwrap().to_string(), "90:high");
        assert_eq!(
            action,
            ActionTaken::Set {
                value: ThresholdValue::parse("90:high"),
                previous: Some(ThresholdValue::parse("70")),
            }
        );
    }

    #[test]
    fn test_empty_priority_stores_bare_value() {
        let (after, _) = apply(sample(), &update("db-a", "mysql_connections", "90", Some("")));
        assert_eq!(after.get("db-a", "mysql_connections").unwrap().to_string(), "90");
    }

    #[test]
    fn test_revert_removes_key() {
        let (after, action) = apply(sample(), &update("db-a", "container_cpu", "default", None));

        assert!(!after.tenant("db-a").unwrap().contains("container_cpu"));
        assert_eq!(
            action,
            ActionTaken::Reverted {
                previous: ThresholdValue::parse("70:critical")
            }
        );
    }

    #[test]
    fn test_revert_is_case_insensitive() {
        for keyword in ["DEFAULT", "Default", "default"] {
            let (after, action) = apply(sample(), &update("db-a", "container_cpu", keyword, None));
            assert!(after.get("db-a", "container_cpu").is_none(), "{keyword}");
            assert!(matches!(action, ActionTaken::Reverted { .. }), "{keyword}");
        }
    }

    #[test]
    fn test_revert_twice_is_idempotent() {
        let revert = update("db-a", "container_cpu", "default", None);
        let (once, first) = apply(sample(), &revert);
        let (twice, second) = apply(once.clone(), &revert);

        assert_eq!(twice, once);
        assert!(matches!(first, ActionTaken::Reverted { .. }));
        assert_eq!(second, ActionTaken::AlreadyDefault);
    }

    #[test]
    fn test_revert_ignores_priority() {
        let (after, action) = apply(sample(), &update("db-a", "container_cpu", "default", Some("high")));

        assert!(after.get("db-a", "container_cpu").is_none());
        assert!(matches!(action, ActionTaken::Reverted { .. }));
    }

    #[test]
    fn test_set_twice_is_idempotent() {
        let set = update("db-b", "mysql_cpu", "55", Some("warning"));
        let (once, _) = apply(sample(), &set);
        let (twice, action) = apply(once.clone(), &set);

        assert_eq!(twice, once);
        assert_eq!(encode(&twice).unwrap(), encode(&once).unwrap());
        assert_eq!(
            action,
            ActionTaken::Set {
                value: ThresholdValue::parse("55:warning"),
                previous: Some(ThresholdValue::parse("55:warning")),
            }
        );
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let (after, _) = apply(sample(), &update("db-a", "container_cpu", "disable", None));
        let keys: Vec<&str> = after.tenant("db-a").unwrap().iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec!["container_cpu", "mysql_connections"]);
        assert!(after.get("db-a", "container_cpu").unwrap().is_disabled());
    }

    #[test]
    fn test_value_is_opaque() {
        let (after, _) = apply(sample(), &update("db-a", "cpu", "not-a-number", None));
        assert_eq!(after.get("db-a", "cpu").unwrap().magnitude(), "not-a-number");
    }

    #[test]
    fn test_value_with_colon_survives_reencoding() {
        for (value, priority) in [("70:critical", None), ("70:critical", Some("page"))] {
            let (after, _) = apply(sample(), &update("db-b", "cpu", value, priority));
            let back = decode(&encode(&after).unwrap()).unwrap();
            assert_eq!(back.tenants(), after.tenants(), "{value} with {priority:?}");
        }

        let (after, _) = apply(sample(), &update("db-b", "cpu", "70:critical", None));
        let stored = after.get("db-b", "cpu").unwrap();
        assert_eq!(stored.magnitude(), "70");
        assert_eq!(stored.priority(), Some("critical"));
    }

    #[test]
    fn test_validation_rejects_empty_and_control_characters() {
        assert_eq!(
            ThresholdUpdate::new("", "cpu", "80", None),
            Err(ValidationError::Empty { field: "tenant" })
        );
        assert_eq!(
            ThresholdUpdate::new("db-a", "  ", "80", None),
            Err(ValidationError::Empty { field: "metric" })
        );
        assert!(matches!(
            ThresholdUpdate::new("db-a", "cpu", "80\n", None),
            Err(ValidationError::ControlCharacters { field: "value", .. })
        ));
        assert!(ThresholdUpdate::new("db-a", "cpu", "80", Some(String::new())).is_ok());
    }

    #[test]
    fn test_known_metrics_validator() {
        let validator = KnownMetrics::new(["mysql_connections", "mysql_cpu"]);

        assert!(validator.validate(&update("db-a", "mysql_cpu", "80", None)).is_ok());
        assert_eq!(
            validator.validate(&update("db-a", "mysql_cpu_typo", "80", None)),
            Err(ValidationError::UnknownMetric {
                metric: "mysql_cpu_typo".to_string()
            })
        );
        assert!(KnownMetrics::default()
            .validate(&update("db-a", "anything", "1", None))
            .is_ok());
        assert!(AcceptAll.validate(&update("db-a", "anything", "1", None)).is_ok());
    }

    #[test]
    fn test_action_serializes_as_tagged_json() {
        let action = ActionTaken::Set {
            value: ThresholdValue::parse("90:high"),
            previous: None,
        };
        let json = serde_json::to_value(&action).unwrap();

        assert_eq!(json["action"], "set");
        assert_eq!(json["value"], "90:high");
        assert!(json["previous"].is_null());
    }
}
