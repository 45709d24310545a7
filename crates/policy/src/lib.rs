//! The verification policy engine: ordered rule lists with fallback
//! policies, producing a result with a full rule trail.
//!
//! A rule reports `Ok`, `Na` (not enough data, hand over to the fallback
//! policy) or `Fail` with a stable error code. Within a policy the rules
//! are conjunctive; the first non-ok outcome ends the policy and the
//! fallback, if any, is evaluated next. The final result is that of the
//! first succeeding policy, or of the last one tried.

mod codes;
mod context;
mod rules;

pub use codes::VerificationError;
pub use context::{CalendarProvider, VerificationContext};

use log::debug;
use serde::Serialize;

use rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Ok,
    Na,
    Fail(VerificationError),
}

impl Outcome {
    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }

    pub fn error(self) -> Option<VerificationError> {
        match self {
            Outcome::Fail(code) => Some(code),
            _ => None,
        }
    }
}

/// One evaluated rule in the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    pub policy: &'static str,
    pub rule: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyVerificationResult {
    pub policy: &'static str,
    pub outcome: Outcome,
    pub trail: Vec<RuleResult>,
}

impl PolicyVerificationResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<VerificationError> {
        self.outcome.error()
    }
}

impl std::fmt::Display for PolicyVerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.outcome {
            Outcome::Ok => write!(f, "{}: ok", self.policy),
            Outcome::Na => write!(f, "{}: inconclusive", self.policy),
            Outcome::Fail(code) => write!(f, "{}: failed {code}", self.policy),
        }
    }
}

pub struct Policy {
    name: &'static str,
    rules: Vec<Rule>,
    fallback: Option<Box<Policy>>,
}

impl Policy {
    /// Structural consistency of the signature itself; every other policy
    /// starts with these rules.
    pub fn internal() -> Policy {
        Policy {
            name: "internal",
            rules: rules::internal(),
            fallback: None,
        }
    }

    /// Internal consistency plus PKI validation of the calendar
    /// authentication record.
    pub fn key_based() -> Policy {
        Policy {
            name: "key-based",
            rules: rules::internal().into_iter().chain(rules::key_based()).collect(),
            fallback: None,
        }
    }

    /// Internal consistency plus anchoring in the publications file,
    /// extending the signature when allowed and needed.
    pub fn publication_based() -> Policy {
        Policy {
            name: "publication-based",
            rules: rules::internal()
                .into_iter()
                .chain(rules::publication_based())
                .collect(),
            fallback: None,
        }
    }

    /// Internal consistency plus comparison against the calendar database
    /// reached through the extender.
    pub fn calendar_based() -> Policy {
        Policy {
            name: "calendar-based",
            rules: rules::internal()
                .into_iter()
                .chain(rules::calendar_based())
                .collect(),
            fallback: None,
        }
    }

    /// The everyday policy: publication anchoring, then the PKI record,
    /// then the calendar database.
    pub fn general() -> Policy {
        let mut publication = Policy::publication_based();
        let mut key = Policy::key_based();
        key.fallback = Some(Box::new(Policy::calendar_based()));
        publication.fallback = Some(Box::new(key));
        Policy {
            name: "general",
            ..publication
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, ctx: &VerificationContext, trail: &mut Vec<RuleResult>) -> Outcome {
        for rule in &self.rules {
            let outcome = (rule.check)(ctx);
            debug!("rule {}/{}: {:?}", self.name, rule.name, outcome);
            trail.push(RuleResult {
                policy: self.name,
                rule: rule.name,
                outcome,
            });
            if !outcome.is_ok() {
                return outcome;
            }
        }
        Outcome::Ok
    }
}

/// Evaluates the policy (and its fallbacks) against the context.
pub fn verify(policy: &Policy, ctx: &VerificationContext) -> PolicyVerificationResult {
    let mut trail = Vec::new();
    let mut outcome = Outcome::Na;
    let mut current = Some(policy);
    while let Some(p) = current {
        outcome = p.run(ctx, &mut trail);
        if outcome.is_ok() {
            break;
        }
        current = p.fallback.as_deref();
    }
    PolicyVerificationResult {
        policy: policy.name,
        outcome,
        trail,
    }
}
