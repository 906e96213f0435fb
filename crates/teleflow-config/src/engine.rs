//! Compiled declaration validators.

use serde_json::Value;
use teleflow_core::declaration::NAMESPACE_CLASS;
use teleflow_core::{ErrorEntry, ValidationFailure};
use tracing::{debug, info};

use crate::platform::ValidationContext;
use crate::runner;
use crate::schema::{SchemaError, SchemaLoc, SchemaSet, Walker};

const EMBEDDED_SCHEMAS: [(&str, &str); 9] = [
    ("base_schema.json", include_str!("../schemas/base_schema.json")),
    ("controls_schema.json", include_str!("../schemas/controls_schema.json")),
    ("consumer_schema.json", include_str!("../schemas/consumer_schema.json")),
    ("endpoints_schema.json", include_str!("../schemas/endpoints_schema.json")),
    ("ihealth_schema.json", include_str!("../schemas/ihealth_schema.json")),
    ("listener_schema.json", include_str!("../schemas/listener_schema.json")),
    ("namespace_schema.json", include_str!("../schemas/namespace_schema.json")),
    ("shared_schema.json", include_str!("../schemas/shared_schema.json")),
    ("system_schema.json", include_str!("../schemas/system_schema.json")),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    /// A whole declaration (class `Telemetry`).
    Full,
    /// A single namespace object (class `Telemetry_Namespace`).
    Namespace,
}

impl ValidatorKind {
    fn schema_id(self) -> &'static str {
        match self {
            Self::Full => "base_schema.json",
            Self::Namespace => "namespace_schema.json",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Namespace => NAMESPACE_CLASS,
        }
    }
}

/// Per-call overrides of the engine's [`ValidationContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    pub expand: Option<bool>,
}

/// Schemas compiled once, plus the context keyword checks run with.
#[derive(Debug)]
pub struct ValidatorEngine {
    schemas: SchemaSet,
    ctx: ValidationContext,
}

/// Both validators of an engine.
#[derive(Debug, Clone, Copy)]
pub struct Validators<'e> {
    pub full: Validator<'e>,
    pub namespace: Validator<'e>,
}

#[derive(Debug, Clone, Copy)]
pub struct Validator<'e> {
    engine: &'e ValidatorEngine,
    kind: ValidatorKind,
}

impl ValidatorEngine {
    pub fn new(ctx: ValidationContext) -> Result<Self, SchemaError> {
        let mut schemas = SchemaSet::new();
        for (name, source) in EMBEDDED_SCHEMAS {
            schemas.add(name, source)?;
        }
        schemas.compile()?;
        info!(schemas = EMBEDDED_SCHEMAS.len(), "declaration schemas compiled");
        Ok(Self { schemas, ctx })
    }

    pub fn context(&self) -> &ValidationContext {
        &self.ctx
    }

    pub fn validators(&self) -> Validators<'_> {
        Validators {
            full: self.validator(ValidatorKind::Full),
            namespace: self.validator(ValidatorKind::Namespace),
        }
    }

    pub fn validator(&self, kind: ValidatorKind) -> Validator<'_> {
        Validator { engine: self, kind }
    }

    /// Validate a whole declaration with default options.
    pub async fn validate_declaration(&self, data: Value) -> Result<Value, ValidationFailure> {
        self.validator(ValidatorKind::Full)
            .validate(data, &ValidateOptions::default())
            .await
    }
}

impl Validator<'_> {
    pub fn kind(&self) -> ValidatorKind {
        self.kind
    }

    /// Validate `data`, returning it with expansions, defaults and
    /// encrypted secrets applied.
    ///
    /// Deferred checks only run when the synchronous pass found no error.
    /// The document is consumed: on failure nothing is handed back, and
    /// replacements applied by a deferred group before a later group failed
    /// are lost with it.
    pub async fn validate(
        &self,
        data: Value,
        opts: &ValidateOptions,
    ) -> Result<Value, ValidationFailure> {
        let mut ctx = self.engine.ctx.clone();
        if let Some(expand) = opts.expand {
            ctx.expand = expand;
        }

        let schema_id = self.kind.schema_id();
        let Some(schema) = self.engine.schemas.get(schema_id) else {
            return Err(ValidationFailure::single(ErrorEntry::Other(format!(
                "schema '{schema_id}' is not loaded"
            ))));
        };

        let (doc, deferred) = {
            let mut walker = Walker::new(&self.engine.schemas, Some(&ctx), schema_id, data);
            walker.validate(schema, &SchemaLoc::root(schema_id), "");
            if !walker.errors.is_empty() {
                info!(
                    validator = self.kind.name(),
                    errors = walker.errors.len(),
                    "declaration rejected"
                );
                return Err(ValidationFailure::new(
                    walker.errors.into_iter().map(ErrorEntry::from).collect(),
                ));
            }
            (walker.doc, walker.deferred)
        };

        if deferred.is_empty() {
            debug!(validator = self.kind.name(), "declaration valid");
            return Ok(doc);
        }
        debug!(
            validator = self.kind.name(),
            deferred = deferred.len(),
            "synchronous pass succeeded"
        );
        runner::run_deferred(doc, deferred).await
    }
}
