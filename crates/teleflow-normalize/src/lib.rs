//! Normalization and tagging of device stats and events.

pub mod classifier;
pub mod error;
pub mod filter;
pub mod functions;
pub mod matcher;
pub mod pipeline;
pub mod properties;
pub mod reduce;
pub mod rename;
pub mod tagger;

pub use classifier::{EventClassifier, EVENT_CATEGORY_KEY};
pub use error::NormalizeError;
pub use filter::{filter_data_by_keys, KeyFilter};
pub use functions::NormalizeFunction;
pub use matcher::KeyMatcher;
pub use pipeline::{
    normalize_data, normalize_event, DataOptions, EventOptions, Normalizer, MISSING_DATA,
};
pub use properties::{Properties, StatsProcessor};
pub use reduce::{reduce_data, ReduceOptions};
pub use rename::{rename_keys, RenamePatterns};
pub use tagger::{add_tag, check_data, Action, Conditions, EventTagger, TagSet, TagValue};
