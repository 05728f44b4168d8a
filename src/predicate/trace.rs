//! Execution traces for audit-mode evaluation.
//!
//! A [`Trace`] records one node of a predicate evaluation: what ran, what it
//! returned, and what was skipped by short-circuiting. Traces are cheap to
//! inspect, serialize to JSON for log pipelines, and render as an indented
//! tree for humans.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// The operator a trace node corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOp {
    Leaf,
    And,
    Or,
    Not,
}

impl TraceOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }
}

/// One node in an audit-mode execution trace.
///
/// `success` is `None` exactly when the node was skipped by short-circuiting;
/// evaluated nodes always carry `Some`. `elapsed` is measured per leaf and
/// summed for composite nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub label: Option<String>,
    pub operator: TraceOp,
    pub success: Option<bool>,
    pub skipped: bool,
    pub children: Vec<Trace>,
    pub elapsed: Duration,
}

impl Trace {
    /// An evaluated node.
    pub(crate) fn evaluated(
        label: Option<String>,
        operator: TraceOp,
        success: bool,
        children: Vec<Trace>,
        elapsed: Duration,
    ) -> Self {
        Self {
            label,
            operator,
            success: Some(success),
            skipped: false,
            children,
            elapsed,
        }
    }

    /// A sibling that short-circuiting left unevaluated.
    pub(crate) fn skipped(label: Option<String>, operator: TraceOp) -> Self {
        Self {
            label,
            operator,
            success: None,
            skipped: true,
            children: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether this node evaluated to `true`.
    pub fn passed(&self) -> bool {
        self.success == Some(true)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        for _ in 0..level {
            write!(f, "  ")?;
        }
        match self.label.as_deref() {
            Some(label) => write!(f, "{} {}", self.operator.name(), label)?,
            None => write!(f, "{}", self.operator.name())?,
        }
        match self.success {
            Some(ok) => writeln!(f, " => {ok}")?,
            None => writeln!(f, " => skipped")?,
        }
        for child in &self.children {
            child.render(f, level + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_indents_children() {
        let trace = Trace::evaluated(
            None,
            TraceOp::And,
            false,
            vec![
                Trace::evaluated(
                    Some("is_adult(min_age=18)".into()),
                    TraceOp::Leaf,
                    false,
                    vec![],
                    Duration::ZERO,
                ),
                Trace::skipped(Some("is_active()".into()), TraceOp::Leaf),
            ],
            Duration::ZERO,
        );
        let rendered = format!("{trace}");
        assert_eq!(
            rendered,
            "and => false\n  leaf is_adult(min_age=18) => false\n  leaf is_active() => skipped\n"
        );
    }

    #[test]
    fn serializes_skipped_success_as_null() {
        let trace = Trace::skipped(Some("x()".into()), TraceOp::Leaf);
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["success"], serde_json::Value::Null);
        assert_eq!(json["skipped"], serde_json::Value::Bool(true));
        assert_eq!(json["operator"], "leaf");
    }
}
