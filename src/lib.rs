//! Searx Instances Bot - a GitHub bot that answers instance requests.
//!
//! Issues on the instances repository ask for a searx instance to be added,
//! changed or removed. The bot receives GitHub webhooks, finds the instance
//! URL in the issue title, canonicalizes it and replies on the issue.

pub mod bot;
pub mod config;
pub mod github;
pub mod instances;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
