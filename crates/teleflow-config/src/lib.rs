//! Agent settings and declaration validation.
//!
//! [`ValidatorEngine`] validates declarations against the embedded schemas
//! and the custom keywords in [`keywords`]; [`settings`] loads the agent's
//! own TOML settings.

pub mod engine;
pub mod keywords;
pub mod namespace;
pub mod platform;
pub mod pointer;
pub mod runner;
pub mod schema;
pub mod settings;

pub use engine::{ValidateOptions, Validator, ValidatorEngine, ValidatorKind, Validators};
pub use namespace::{namespaced_object, NamespaceCtx};
pub use platform::{DeviceType, LocalPlatform, Platform, PlatformError, ValidationContext};
pub use pointer::{expand_pointers, resolve, PointerError, ResolveOptions};
pub use schema::SchemaError;
pub use settings::{Settings, SettingsError};
