//! Binds an ordered submission of control values onto a configuration snapshot.

use crate::controls::{Control, ControlValue};
use crate::training_config::TrainingConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("`{field}` expects {expected}, got {got}")]
    WrongKind { field: String, expected: &'static str, got: String },
    #[error("`{field}` must be one of [{choices}], got `{value}`")]
    NotAChoice { field: String, value: String, choices: String },
    #[error("`{field}` = {value} is outside [{min}, {max}] with step {step}")]
    OutOfRange { field: String, value: f64, min: f64, max: f64, step: f64 },
}

/// Zips `values` with the control names (by position) and sets each field on a copy of `base`.
///
/// Every value is checked against its control's constraint first; the first
/// violation aborts the bind and `base` is left untouched.
pub fn collect_and_bind(base: &TrainingConfig, controls: &[Control], values: &[ControlValue]) -> Result<TrainingConfig, BindError> {
    if values.len() != controls.len() {
        return Err(BindError::Arity { expected: controls.len(), got: values.len() });
    }
    let mut config = base.clone();
    for (control, value) in controls.iter().zip(values) {
        control.constraint.check(control.name, value)?;
        config.set(control.name, value)?;
    }
    Ok(config)
}
