//! Classifying instance requests by issue label.
//!
//! Maintainers tag instance requests with one of a small set of labels.
//! [`LabelClassifier::classify`] maps the labels on an issue to a single
//! [`RequestClass`], refusing to guess when labels disagree.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// What an instance request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Add a new instance to the list.
    Add,
    /// Change the details of a listed instance.
    Edit,
    /// Remove a listed instance.
    Remove,
}

impl RequestClass {
    /// Human-readable verb used in replies.
    pub fn describe(&self) -> &'static str {
        match self {
            RequestClass::Add => "addition",
            RequestClass::Edit => "modification",
            RequestClass::Remove => "removal",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The labels attached to an issue when the event was delivered.
///
/// Names are deduplicated; the set is a snapshot and never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelSet(names.into_iter().map(Into::into).collect())
    }

    /// Reads `labels[*].name` from a GitHub issue object. Entries without a
    /// string name are skipped.
    pub fn from_issue(issue: &Value) -> Self {
        let names = issue
            .get("labels")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|label| label.get("name").and_then(Value::as_str));
        LabelSet::new(names)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Maps label names to request classes.
///
/// Label lookup ignores ASCII case, as GitHub label names do.
#[derive(Debug, Clone)]
pub struct LabelClassifier {
    table: HashMap<String, RequestClass>,
}

impl LabelClassifier {
    /// Creates a classifier from `(label, class)` pairs.
    pub fn new<I, S>(table: I) -> Self
    where
        I: IntoIterator<Item = (S, RequestClass)>,
        S: AsRef<str>,
    {
        LabelClassifier {
            table: table
                .into_iter()
                .map(|(label, class)| (label.as_ref().to_ascii_lowercase(), class))
                .collect(),
        }
    }

    /// The class a single label stands for, if any.
    pub fn class_of(&self, label: &str) -> Option<RequestClass> {
        self.table.get(&label.to_ascii_lowercase()).copied()
    }

    /// Returns the single class the labels agree on.
    ///
    /// * no known label → `None`
    /// * one or more known labels, all the same class → that class
    /// * known labels of different classes → `None`
    pub fn classify(&self, labels: &LabelSet) -> Option<RequestClass> {
        let classes: BTreeSet<RequestClass> = labels
            .iter()
            .filter_map(|name| self.class_of(name))
            .collect();

        let mut iter = classes.iter();
        match (iter.next(), iter.next()) {
            (Some(class), None) => Some(*class),
            (None, _) => None,
            (Some(_), Some(_)) => {
                debug!(?classes, "Ambiguous request labels; not classifying");
                None
            }
        }
    }
}

impl Default for LabelClassifier {
    /// The labels used by the instances repository.
    fn default() -> Self {
        LabelClassifier::new([
            ("instance add", RequestClass::Add),
            ("instance edit", RequestClass::Edit),
            ("instance change", RequestClass::Edit),
            ("instance remove", RequestClass::Remove),
            ("instance delete", RequestClass::Remove),
        ])
    }
}
