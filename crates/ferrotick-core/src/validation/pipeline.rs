use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info_span, warn, Span};

use super::checks::{
    DuplicateDetector, GapDetector, MissingTimestampDetector, PriceSanityCheck, SpikeDetector,
    SpreadAnalyzer, ZeroVolumeDetector,
};
use super::{CheckContext, ValidationConfig, ValidationReport, Validator};
use crate::{Column, Granularity, RecordBatch, SchemaError};

/// Runs validators in order and aggregates their findings.
///
/// A validator that returns an error or panics is logged, recorded in the
/// report as failed, and skipped; the remaining checks still run.
pub struct ValidationPipeline {
    config: ValidationConfig,
    validators: Vec<Box<dyn Validator>>,
    span: Span,
}

impl ValidationPipeline {
    pub fn new(config: ValidationConfig) -> Self {
        Self::with_span(config, info_span!("validation"))
    }

    /// Pipeline whose log records nest under `parent`.
    pub fn in_span(config: ValidationConfig, parent: &Span) -> Self {
        Self::with_span(config, info_span!(parent: parent, "validation"))
    }

    fn with_span(config: ValidationConfig, span: Span) -> Self {
        Self {
            config,
            validators: vec![
                Box::new(PriceSanityCheck),
                Box::new(DuplicateDetector),
                Box::new(GapDetector),
                Box::new(SpikeDetector),
                Box::new(MissingTimestampDetector),
                Box::new(ZeroVolumeDetector),
                Box::new(SpreadAnalyzer),
            ],
            span,
        }
    }

    /// Append a validator after the built-in checks.
    #[must_use]
    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validator_names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Validate `batch`. Fails only when `required_columns` are missing.
    pub fn validate(
        &self,
        batch: &RecordBatch,
        symbol: &str,
        granularity: Option<Granularity>,
        required_columns: &[Column],
    ) -> Result<ValidationReport, SchemaError> {
        let _entered = self.span.enter();
        batch.require_columns(required_columns)?;

        let ctx = CheckContext {
            symbol,
            granularity,
            config: &self.config,
        };
        let mut report = ValidationReport::new(symbol, batch.len());

        for validator in &self.validators {
            let name = validator.name();
            let kind = batch.kind();
            if !validator.applies_to(kind, &ctx)
                || batch
                    .require_columns(&validator.required_columns(kind, &ctx))
                    .is_err()
            {
                debug!(check = name, %kind, "check skipped");
                report.record_skipped(name);
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| validator.check(batch, &ctx))) {
                Ok(Ok(issues)) => {
                    debug!(check = name, issues = issues.len(), "check finished");
                    report.record_run(name, issues);
                }
                Ok(Err(error)) => {
                    warn!(check = name, %error, "check failed, skipping");
                    report.record_failure(name, error.to_string());
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(check = name, panic = %message, "check panicked, skipping");
                    report.record_failure(name, message);
                }
            }
        }

        debug!(summary = %report.summary(), "validation complete");
        Ok(report)
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("validator panicked")
    }
}
