//! Core data models for tenant threshold overrides

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::codec::Layout;

/// Update keyword that clears an override
pub const DEFAULT_KEYWORD: &str = "default";

/// Stored magnitudes that switch a metric off for a tenant
const DISABLE_KEYWORDS: &[&str] = &["disable", "disabled", "off", "false"];

/// Returns true if `value` is the revert keyword, in any case
pub fn is_default_keyword(value: &str) -> bool {
    value.eq_ignore_ascii_case(DEFAULT_KEYWORD)
}

/// A per-tenant threshold override, optionally tagged with a priority
///
/// Stored in the document as `"<magnitude>"` or `"<magnitude>:<priority>"`.
/// The composite form only exists at the serialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThresholdValue {
    magnitude: String,
    priority: Option<String>,
}

impl ThresholdValue {
    /// Build a value from update arguments. An empty priority means no priority.
    ///
    /// The result is normalized through the stored form, so a magnitude that
    /// already carries a `:` is split the same way a later decode would split it.
    pub fn new(magnitude: impl Into<String>, priority: Option<&str>) -> Self {
        let mut composite = magnitude.into();
        if let Some(priority) = priority.filter(|p| !p.is_empty()) {
            composite.push(':');
            composite.push_str(priority);
        }
        Self::parse(&composite)
    }

    /// Parse the composite stored form, splitting on the first `:`
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((magnitude, priority)) => Self {
                magnitude: magnitude.to_string(),
                priority: Some(priority.to_string()),
            },
            None => Self {
                magnitude: raw.to_string(),
                priority: None,
            },
        }
    }

    pub fn magnitude(&self) -> &str {
        &self.magnitude
    }

    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    /// The magnitude as a number, if it is one
    pub fn numeric(&self) -> Option<f64> {
        self.magnitude.trim().parse().ok()
    }

    /// True for `disable`, `disabled`, `off`, or `false` (any case) with no priority tag
    pub fn is_disabled(&self) -> bool {
        let full = self.to_string();
        let lower = full.trim().to_ascii_lowercase();
        DISABLE_KEYWORDS.contains(&lower.as_str())
    }
}

impl fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.priority {
            Some(priority) => write!(f, "{}:{}", self.magnitude, priority),
            None => write!(f, "{}", self.magnitude),
        }
    }
}

impl Serialize for ThresholdValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Metric key → override for one tenant, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TenantConfig(IndexMap<String, ThresholdValue>);

impl TenantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: &str) -> Option<&ThresholdValue> {
        self.0.get(metric)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    /// Insert or overwrite; new keys are appended, existing keys keep their position
    pub fn insert(&mut self, metric: impl Into<String>, value: ThresholdValue) -> Option<ThresholdValue> {
        self.0.insert(metric.into(), value)
    }

    /// Remove a key without disturbing the order of the others
    pub fn remove(&mut self, metric: &str) -> Option<ThresholdValue> {
        self.0.shift_remove(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ThresholdValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for TenantConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), ThresholdValue::parse(v.as_ref())))
                .collect(),
        )
    }
}

/// Tenant → overrides map, in document order
pub type TenantMap = IndexMap<String, TenantConfig>;

/// The decoded threshold document
///
/// Only the `tenants` section is modelled. Everything else in the source text
/// is carried in the layout and written back verbatim.
#[derive(Debug, Clone, Default)]
pub struct ThresholdDocument {
    tenants: Option<TenantMap>,
    pub(crate) layout: Layout,
}

impl ThresholdDocument {
    /// An in-memory document with an initialized, empty `tenants` section
    pub fn new() -> Self {
        Self {
            tenants: Some(TenantMap::new()),
            layout: Layout::default(),
        }
    }

    pub(crate) fn from_parts(tenants: Option<TenantMap>, layout: Layout) -> Self {
        Self { tenants, layout }
    }

    /// Whether the document has a `tenants` section at all
    pub fn has_tenants(&self) -> bool {
        self.tenants.is_some()
    }

    pub fn tenants(&self) -> Option<&TenantMap> {
        self.tenants.as_ref()
    }

    /// Mutable access to `tenants`, initializing the section if it is absent
    pub fn tenants_mut(&mut self) -> &mut TenantMap {
        self.tenants.get_or_insert_with(TenantMap::new)
    }

    pub fn tenant(&self, tenant: &str) -> Option<&TenantConfig> {
        self.tenants.as_ref()?.get(tenant)
    }

    /// Look up a single override
    pub fn get(&self, tenant: &str, metric: &str) -> Option<&ThresholdValue> {
        self.tenant(tenant)?.get(metric)
    }

    /// Builder-style helper for assembling documents in code
    pub fn with_tenant(mut self, tenant: impl Into<String>, config: TenantConfig) -> Self {
        self.tenants_mut().insert(tenant.into(), config);
        self
    }
}

impl PartialEq for ThresholdDocument {
    fn eq(&self, other: &Self) -> bool {
        self.tenants == other.tenants && self.layout.same_surroundings(&other.layout)
    }
}
