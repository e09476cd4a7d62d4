use serde_json::Value;

use crate::json_path;
use crate::types::HttpResponse;

/// What a 2xx response without a readable confirmation field means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConfirmationPolicy {
    /// The field must be present and equal the expected value.
    #[default]
    Strict,
    /// A 2xx without the field counts as success. A present field that disagrees still fails.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    /// Accepted under [`ConfirmationPolicy::Optimistic`] without evidence.
    Assumed,
    Rejected(String),
}

impl ConfirmationOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Checks that a state-changing call reports the state it was asked for, e.g.
/// `isArchived == true` after an archive request.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    /// Dotted path into the JSON body.
    pub field: String,
    pub expected: Value,
    pub policy: ConfirmationPolicy,
}

impl Confirmation {
    pub fn new(field: impl Into<String>, expected: Value, policy: ConfirmationPolicy) -> Self {
        Self {
            field: field.into(),
            expected,
            policy,
        }
    }

    pub fn evaluate(&self, res: &HttpResponse) -> ConfirmationOutcome {
        if !res.is_success() {
            return ConfirmationOutcome::Rejected(format!("status {}", res.status));
        }

        let body: Option<Value> = serde_json::from_slice(&res.body).ok();
        let found = body.as_ref().and_then(|b| json_path::lookup(b, &self.field));

        match (found, self.policy) {
            (Some(v), _) if *v == self.expected => ConfirmationOutcome::Confirmed,
            (Some(v), _) => ConfirmationOutcome::Rejected(format!(
                "`{}` is {v}, expected {}",
                self.field, self.expected
            )),
            (None, ConfirmationPolicy::Optimistic) => ConfirmationOutcome::Assumed,
            (None, ConfirmationPolicy::Strict) => ConfirmationOutcome::Rejected(format!(
                "confirmation field `{}` missing from response",
                self.field
            )),
        }
    }
}
