//! Core domain types for the instances bot.

pub mod ids;

pub use ids::{CommentId, DeliveryId, IssueNumber};
