//! Handler for instance requests filed as issues.
//!
//! Maintainers label an issue to say what kind of request it is. Once a
//! recognized label is present, the bot reads the instance URL from the
//! issue title, canonicalizes it, and replies with a single comment saying
//! either which URL it understood or why it could not find one.
//!
//! Issues without a recognized label, or with conflicting labels, are left
//! alone. So is a `labeled` event for a label that is not a request label.
//! The issue's comments are read first, and a reply identical to one already
//! on the issue is not posted again.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{EventHandler, HandlerError};
use crate::github::IssueTracker;
use crate::instances::{LabelClassifier, LabelSet, RequestClass, extract_candidate, normalize};
use crate::types::{CommentId, IssueNumber};
use crate::webhooks::event::Event;

const ISSUE: &str = "/issue";
const ISSUE_TITLE: &str = "/issue/title";
const ISSUE_NUMBER: &str = "/issue/number";
const COMMENTS_URL: &str = "/issue/comments_url";
const TITLE_CHANGE: &str = "/changes/title";
const ADDED_LABEL: &str = "/label/name";

/// Replies to labelled instance requests with the URL the bot understood.
#[derive(Debug, Clone, Default)]
pub struct InstanceRequestHandler {
    classifier: LabelClassifier,
}

impl InstanceRequestHandler {
    pub fn new(classifier: LabelClassifier) -> Self {
        Self { classifier }
    }
}

/// What the bot concluded from an issue title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The title names an acceptable instance.
    Accepted(String),
    /// Something URL-like was found but it cannot be listed.
    Rejected(String),
    /// Nothing in the title looks like a URL.
    NotFound,
}

impl Verdict {
    pub fn from_title(title: &str) -> Self {
        let Some(candidate) = extract_candidate(title) else {
            return Verdict::NotFound;
        };
        match normalize(&candidate) {
            Some(url) => Verdict::Accepted(url.to_string()),
            None => Verdict::Rejected(candidate),
        }
    }

    /// The comment body posted back to the issue.
    pub fn reply(&self, class: RequestClass) -> String {
        match self {
            Verdict::Accepted(url) => format!(
                "Thanks! This is a request for the {class} of the instance {url}\n\n\
                 A maintainer will review it shortly."
            ),
            Verdict::Rejected(candidate) => format!(
                "`{}` is not an acceptable instance URL.\n\n\
                 Instances must be served over `https`, except `.onion` and `.i2p` \
                 instances which must use `http`. Write the full URL including the \
                 scheme, for example `<https://searx.example.org:8443/>`, and \
                 edit the issue title.",
                candidate.replace('`', "")
            ),
            Verdict::NotFound => "I could not find an instance URL in the title of this issue.\n\n\
                 Please edit the title so it contains the URL between angle brackets, \
                 for example `<https://searx.example.org/>`."
                .to_string(),
        }
    }
}

fn required<'a>(event: &'a Event, pointer: &'static str) -> Result<&'a Value, HandlerError> {
    event.get(pointer).ok_or(HandlerError::MissingField(pointer))
}

fn required_str<'a>(event: &'a Event, pointer: &'static str) -> Result<&'a str, HandlerError> {
    event.get_str(pointer).ok_or(HandlerError::MissingField(pointer))
}

#[async_trait]
impl EventHandler for InstanceRequestHandler {
    fn name(&self) -> &str {
        "instance-request"
    }

    async fn handle(&self, event: &Event, tracker: &dyn IssueTracker) -> Result<(), HandlerError> {
        let issue_number = event.get(ISSUE_NUMBER).and_then(Value::as_u64).map(IssueNumber);

        // A body-only edit does not change the requested URL.
        if event.action() == Some("edited") && event.get(TITLE_CHANGE).is_none() {
            debug!(issue = ?issue_number, "Title unchanged; no reply");
            return Ok(());
        }

        if event.action() == Some("labeled") {
            let added = event.get_str(ADDED_LABEL);
            if added.and_then(|name| self.classifier.class_of(name)).is_none() {
                debug!(issue = ?issue_number, label = ?added, "Not a request label; no reply");
                return Ok(());
            }
        }

        let labels = LabelSet::from_issue(required(event, ISSUE)?);
        let Some(class) = self.classifier.classify(&labels) else {
            debug!(issue = ?issue_number, labels = labels.len(), "Not an instance request");
            return Ok(());
        };

        let title = required_str(event, ISSUE_TITLE)?;
        let comments_url = required_str(event, COMMENTS_URL)?;

        let verdict = Verdict::from_title(title);
        debug!(issue = ?issue_number, %class, ?verdict, "Classified instance request");

        let reply = verdict.reply(class);

        let existing = tracker.get(comments_url).await?;
        let already_replied = existing
            .as_array()
            .into_iter()
            .flatten()
            .any(|comment| comment.get("body").and_then(Value::as_str) == Some(reply.as_str()));
        if already_replied {
            debug!(issue = ?issue_number, "Same reply already on the issue");
            return Ok(());
        }

        let response = tracker.post(comments_url, &json!({ "body": reply })).await?;

        let comment_id = response.get("id").and_then(Value::as_u64).map(CommentId);
        info!(
            issue = ?issue_number,
            comment = ?comment_id,
            %class,
            accepted = matches!(verdict, Verdict::Accepted(_)),
            "Replied to instance request"
        );
        Ok(())
    }
}
