//! Instance request processing: finding, canonicalizing and classifying the
//! instance an issue is about.
//!
//! Everything here is pure. "No result" is expressed as `None`, never as an
//! error.

pub mod extract;
pub mod labels;
pub mod normalize;

pub use extract::extract_candidate;
pub use labels::{LabelClassifier, LabelSet, RequestClass};
pub use normalize::{NormalizedUrl, Scheme, infer_scheme, is_overlay_host, normalize};
