//! Execution shape validation.
//!
//! An execution shape is a (message category, node kind) pairing. A [`ShapeValidator`] decides whether a
//! pairing is an architecturally sanctioned routing, and explains its decision either way.
//!
//! [`ShapePolicy`] is a table of allowed shapes. It can be built in code or deserialized from configuration,
//! and [`ShapePolicy::standard`] holds the default table:
//!
//! | Category | Allowed node kinds        |
//! |----------|---------------------------|
//! | EVENT    | REDUCER, ORCHESTRATOR     |
//! | COMMAND  | ORCHESTRATOR, EFFECT      |
//! | INTENT   | EFFECT                    |
//!
//! # Example
//!
//! ```
//! use switchyard::handler::NodeKind;
//! use switchyard::message::MessageCategory;
//! use switchyard::shape::{ShapePolicy, ShapeValidator};
//!
//! let policy = ShapePolicy::new()
//!     .allow(MessageCategory::Event, NodeKind::Compute, "projections are pure");
//!
//! let result = policy.validate(MessageCategory::Event, NodeKind::Compute);
//! assert!(result.is_allowed());
//! assert_eq!(result.rationale(), "projections are pure");
//!
//! assert!(!policy.validate(MessageCategory::Command, NodeKind::Compute).is_allowed());
//! ```

use std::borrow::Cow;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{handler::NodeKind, message::MessageCategory};

/// The outcome of validating an execution shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    is_allowed: bool,
    rationale: Cow<'static, str>,
}

impl ValidationResult {
    /// An allowed shape with the given explanation.
    pub fn allowed(rationale: impl Into<Cow<'static, str>>) -> Self {
        ValidationResult {
            is_allowed: true,
            rationale: rationale.into(),
        }
    }

    /// A denied shape with the given explanation.
    pub fn denied(rationale: impl Into<Cow<'static, str>>) -> Self {
        ValidationResult {
            is_allowed: false,
            rationale: rationale.into(),
        }
    }

    /// Returns `true` if the shape is permitted.
    pub fn is_allowed(&self) -> bool {
        self.is_allowed
    }

    /// Human readable explanation of the decision.
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Consumes the result, returning the rationale.
    pub fn into_rationale(self) -> String {
        self.rationale.into_owned()
    }
}

/// Decides whether a message category may be routed to a node kind.
///
/// Implementations must be pure: no side effects and safe to call from any thread.
///
/// Closures of the form `Fn(MessageCategory, NodeKind) -> ValidationResult` implement this trait.
pub trait ShapeValidator: Send + Sync {
    /// Validates the (category, node kind) pairing.
    fn validate(&self, category: MessageCategory, node_kind: NodeKind) -> ValidationResult;
}

impl<F> ShapeValidator for F
where
    F: Fn(MessageCategory, NodeKind) -> ValidationResult + Send + Sync,
{
    fn validate(&self, category: MessageCategory, node_kind: NodeKind) -> ValidationResult {
        self(category, node_kind)
    }
}

/// A single allowed execution shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRule {
    /// The message category.
    pub category: MessageCategory,
    /// The node kind the category may target.
    pub node_kind: NodeKind,
    /// Why the shape is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A table of allowed execution shapes. Every pairing not listed is denied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapePolicy {
    rules: Vec<ShapeRule>,
}

impl ShapePolicy {
    /// Creates an empty policy which denies every shape.
    pub fn new() -> Self {
        ShapePolicy::default()
    }

    /// The default policy.
    pub fn standard() -> Self {
        ShapePolicy::new()
            .allow(
                MessageCategory::Event,
                NodeKind::Reducer,
                "events are facts and may be folded into state by reducers",
            )
            .allow(
                MessageCategory::Event,
                NodeKind::Orchestrator,
                "events may trigger workflows coordinated by orchestrators",
            )
            .allow(
                MessageCategory::Command,
                NodeKind::Orchestrator,
                "commands may be coordinated by orchestrators",
            )
            .allow(
                MessageCategory::Command,
                NodeKind::Effect,
                "commands may be executed by effect nodes",
            )
            .allow(
                MessageCategory::Intent,
                NodeKind::Effect,
                "intents may only be realised by effect nodes",
            )
    }

    /// Adds an allowed shape. Adding a shape that is already allowed replaces its rationale.
    pub fn allow(
        mut self,
        category: MessageCategory,
        node_kind: NodeKind,
        rationale: impl Into<String>,
    ) -> Self {
        let rationale = Some(rationale.into());
        match self
            .rules
            .iter_mut()
            .find(|rule| rule.category == category && rule.node_kind == node_kind)
        {
            Some(rule) => rule.rationale = rationale,
            None => self.rules.push(ShapeRule {
                category,
                node_kind,
                rationale,
            }),
        }
        self
    }

    /// The allowed shapes, in insertion order.
    pub fn rules(&self) -> &[ShapeRule] {
        &self.rules
    }

    /// Returns `true` if the shape is allowed.
    pub fn is_allowed(&self, category: MessageCategory, node_kind: NodeKind) -> bool {
        self.rule(category, node_kind).is_some()
    }

    /// The node kinds `category` may target, in rule order.
    pub fn allowed_targets(&self, category: MessageCategory) -> Vec<NodeKind> {
        self.rules
            .iter()
            .filter(|rule| rule.category == category)
            .map(|rule| rule.node_kind)
            .unique()
            .collect()
    }

    fn rule(&self, category: MessageCategory, node_kind: NodeKind) -> Option<&ShapeRule> {
        self.rules
            .iter()
            .find(|rule| rule.category == category && rule.node_kind == node_kind)
    }
}

impl ShapeValidator for ShapePolicy {
    fn validate(&self, category: MessageCategory, node_kind: NodeKind) -> ValidationResult {
        match self.rule(category, node_kind) {
            Some(ShapeRule {
                rationale: Some(rationale),
                ..
            }) if !rationale.trim().is_empty() => ValidationResult::allowed(rationale.clone()),
            Some(_) => ValidationResult::allowed(format!(
                "{category} messages may target {node_kind} nodes"
            )),
            None => {
                let targets = self.allowed_targets(category);
                if targets.is_empty() {
                    ValidationResult::denied(format!(
                        "{category} messages may not target {node_kind} nodes (no node kinds accept {category} messages)"
                    ))
                } else {
                    ValidationResult::denied(format!(
                        "{category} messages may not target {node_kind} nodes (allowed: {})",
                        targets.iter().join(", ")
                    ))
                }
            }
        }
    }
}
