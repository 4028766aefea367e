//! Resource requests: one activity's demand for one resource in one step.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Identifies a resource pool as `group.item`, e.g. `AnimalFoodStore.Lucerne`.
///
/// The group is the category a registry either tracks or does not track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKind {
    group: String,
    item: String,
}

impl ResourceKind {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
        }
    }

    /// Parse `"Group.Item"`. The item part may itself contain dots.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        match raw.split_once('.') {
            Some((group, item)) if !group.trim().is_empty() && !item.trim().is_empty() => {
                Ok(Self::new(group.trim(), item.trim()))
            }
            _ => Err(RequestError::InvalidKind(raw.to_string())),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn item(&self) -> &str {
        &self.item
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.item)
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = RequestError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.to_string()
    }
}

/// Correlates every request one activity emits during a single resolution.
///
/// Minted by the allocation engine; distinct for every `resolve` call made by
/// that engine. Registries may use it to treat a pass as one transmutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationPassId(pub u64);

impl std::fmt::Display for AllocationPassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass#{}", self.0)
    }
}

/// Result of the registry's transmutation feasibility probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransmutationStatus {
    #[default]
    Unchecked,
    Possible,
    NotPossible,
}

/// One activity's demand for one resource kind in the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Set by the engine when the request enters a resolution.
    pub pass_id: Option<AllocationPassId>,
    pub activity_label: String,
    pub kind: ResourceKind,
    /// Quantity asked for. Never negative.
    pub required: f64,
    /// Quantity judged obtainable before removal.
    pub available: f64,
    /// Quantity actually debited. Only non-zero when the activity was performed.
    pub provided: f64,
    pub allow_transmutation: bool,
    pub transmutation: TransmutationStatus,
    /// Diagnostic annotation only.
    pub reason: Option<String>,
}

impl ResourceRequest {
    /// Build a request, rejecting negative or non-finite amounts.
    pub fn new(
        activity_label: impl Into<String>,
        kind: ResourceKind,
        required: f64,
    ) -> Result<Self, RequestError> {
        if !required.is_finite() || required < 0.0 {
            return Err(RequestError::InvalidAmount {
                kind,
                amount: required,
            });
        }
        Ok(Self {
            pass_id: None,
            activity_label: activity_label.into(),
            kind,
            required,
            available: 0.0,
            provided: 0.0,
            allow_transmutation: false,
            transmutation: TransmutationStatus::Unchecked,
            reason: None,
        })
    }

    pub fn with_transmutation(mut self, allow: bool) -> Self {
        self.allow_transmutation = allow;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True while `required > available`.
    pub fn is_unmet(&self) -> bool {
        self.required > self.available
    }

    /// Outstanding quantity, never negative.
    pub fn shortfall(&self) -> f64 {
        (self.required - self.available).max(0.0)
    }

    /// Whether this request may be converted into by transmutation right now.
    pub fn transmutation_usable(&self) -> bool {
        self.allow_transmutation && self.transmutation == TransmutationStatus::Possible
    }

    /// Clear per-pass state and stamp the request with a new pass id.
    pub(crate) fn begin_pass(&mut self, pass_id: AllocationPassId) {
        self.pass_id = Some(pass_id);
        self.available = 0.0;
        self.provided = 0.0;
        self.transmutation = TransmutationStatus::Unchecked;
    }
}

/// Reject lists that ask for one kind twice with conflicting transmutation flags.
pub(crate) fn validate_requests(requests: &[ResourceRequest]) -> Result<(), RequestError> {
    for (i, a) in requests.iter().enumerate() {
        if let Some(b) = requests[i + 1..]
            .iter()
            .find(|b| b.kind == a.kind && b.allow_transmutation != a.allow_transmutation)
        {
            return Err(RequestError::ConflictingDuplicate {
                activity: b.activity_label.clone(),
                kind: b.kind.clone(),
            });
        }
    }
    Ok(())
}
