//! Input controls shown on the panel and the values they submit.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::binding::BindError;
use crate::training_config::{Algorithm, ChoiceSet, Dataset, DynamicType, ModelArch, SkewType};

/// A single submitted control value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ControlValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }

    fn wrong_kind(&self, field: &str, expected: &'static str) -> BindError {
        BindError::WrongKind { field: field.to_string(), expected, got: format!("{} `{self}`", self.kind()) }
    }

    pub(crate) fn text(&self, field: &str) -> Result<&str, BindError> {
        match self {
            Self::Text(s) => Ok(s),
            _ => Err(self.wrong_kind(field, "text")),
        }
    }

    /// Numbers arrive as JSON numbers; numeric strings are accepted too.
    pub(crate) fn number(&self, field: &str) -> Result<f64, BindError> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|_| self.wrong_kind(field, "a number"))?,
            Self::Flag(_) => return Err(self.wrong_kind(field, "a number")),
        };
        if n.is_finite() { Ok(n) } else { Err(self.wrong_kind(field, "a finite number")) }
    }

    pub(crate) fn whole(&self, field: &str) -> Result<u32, BindError> {
        let n = self.number(field)?;
        if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
            return Err(self.wrong_kind(field, "a non-negative whole number"));
        }
        Ok(n as u32)
    }

    pub(crate) fn flag(&self, field: &str) -> Result<bool, BindError> {
        match self {
            Self::Flag(b) => Ok(*b),
            _ => Err(self.wrong_kind(field, "a boolean")),
        }
    }

    pub(crate) fn choice<T: ChoiceSet>(&self, field: &str) -> Result<T, BindError> {
        let text = self.text(field)?;
        text.parse::<T>().map_err(|_| BindError::NotAChoice { field: field.to_string(), value: text.to_string(), choices: T::CHOICES.join(", ") })
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ControlValue {
    fn from(v: bool) -> Self { Self::Flag(v) }
}

impl From<f64> for ControlValue {
    fn from(v: f64) -> Self { Self::Number(v) }
}

impl From<&str> for ControlValue {
    fn from(v: &str) -> Self { Self::Text(v.to_string()) }
}

impl From<String> for ControlValue {
    fn from(v: String) -> Self { Self::Text(v) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    #[serde(rename = "FL Setting")]
    FlSetting,
    #[serde(rename = "Dynamic Setting")]
    DynamicSetting,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::FlSetting, Section::DynamicSetting];

    pub fn heading(self) -> &'static str {
        match self {
            Section::FlSetting => "FL Setting",
            Section::DynamicSetting => "Dynamic Setting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Choice { choices: &'static [&'static str] },
    Range { min: f64, max: f64, step: f64 },
    Number { whole: bool },
    Toggle,
}

impl Constraint {
    /// Checks a submitted value against this control's domain.
    pub fn check(&self, field: &str, value: &ControlValue) -> Result<(), BindError> {
        match self {
            Constraint::Choice { choices } => {
                let text = value.text(field)?;
                if !choices.contains(&text) {
                    return Err(BindError::NotAChoice { field: field.to_string(), value: text.to_string(), choices: choices.join(", ") });
                }
            }
            Constraint::Range { min, max, step } => {
                let n = value.number(field)?;
                let steps = (n - min) / step;
                if n < *min || n > *max || (steps - steps.round()).abs() > 1e-9 {
                    return Err(BindError::OutOfRange { field: field.to_string(), value: n, min: *min, max: *max, step: *step });
                }
            }
            Constraint::Number { whole: true } => { value.whole(field)?; }
            Constraint::Number { whole: false } => { value.number(field)?; }
            Constraint::Toggle => { value.flag(field)?; }
        }
        Ok(())
    }
}

/// A declared input control: name, constraint and default, plus where it is displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    pub name: &'static str,
    pub label: &'static str,
    pub section: Section,
    pub row: u8,
    pub constraint: Constraint,
    pub default: ControlValue,
}

impl Control {
    fn choice(name: &'static str, label: &'static str, at: (Section, u8), choices: &'static [&'static str], default: &str) -> Self {
        Self { name, label, section: at.0, row: at.1, constraint: Constraint::Choice { choices }, default: default.into() }
    }

    fn range(name: &'static str, label: &'static str, at: (Section, u8), (min, max, step): (f64, f64, f64), default: f64) -> Self {
        Self { name, label, section: at.0, row: at.1, constraint: Constraint::Range { min, max, step }, default: default.into() }
    }

    fn number(name: &'static str, label: &'static str, at: (Section, u8), whole: bool, default: f64) -> Self {
        Self { name, label, section: at.0, row: at.1, constraint: Constraint::Number { whole }, default: default.into() }
    }

    fn toggle(name: &'static str, label: &'static str, at: (Section, u8), default: bool) -> Self {
        Self { name, label, section: at.0, row: at.1, constraint: Constraint::Toggle, default: default.into() }
    }
}

static CONTROLS: Lazy<Vec<Control>> = Lazy::new(|| {
    const FL_1: (Section, u8) = (Section::FlSetting, 1);
    const FL_2: (Section, u8) = (Section::FlSetting, 2);
    const DYN: (Section, u8) = (Section::DynamicSetting, 1);
    vec![
        Control::choice("algorithm", "Algorithm", FL_1, Algorithm::CHOICES, "fedavg"),
        Control::choice("dataset", "Dataset", FL_1, Dataset::CHOICES, "Mnist"),
        Control::choice("skew_type", "Skew Type", FL_1, SkewType::CHOICES, "label"),
        Control::number("alpha", "Alpha", FL_1, false, 100.0),
        Control::choice("model", "Model", FL_1, ModelArch::CHOICES, "SimpleCNN"),
        Control::range("batch_size", "Batch Size", FL_1, (32.0, 512.0, 32.0), 128.0),
        Control::range("num_clients", "Number of Clients", FL_2, (1.0, 20.0, 1.0), 10.0),
        Control::range("num_classes", "Number of Classes", FL_2, (2.0, 20.0, 1.0), 10.0),
        Control::range("num_rounds", "Number of Rounds", FL_2, (1.0, 20.0, 1.0), 10.0),
        Control::range("num_epochs", "Number of Epochs", FL_2, (1.0, 10.0, 1.0), 5.0),
        Control::choice("dynamic_type", "Dynamic Type", DYN, DynamicType::CHOICES, "static"),
        Control::number("round_start", "Round Start", DYN, true, 1.0),
        Control::range("initial_clients", "Initial Clients", DYN, (1.0, 20.0, 1.0), 5.0),
        Control::range("interval", "Interval", DYN, (5.0, 30.0, 1.0), 10.0),
        Control::range("overlap_clients", "Overlap Clients", DYN, (1.0, 10.0, 1.0), 2.0),
        Control::toggle("dpfl", "Enable Knowledge Pool Module", DYN, false),
    ]
});

/// All panel controls in declaration order.
pub fn declared() -> &'static [Control] { &CONTROLS }

pub fn default_values() -> Vec<ControlValue> { declared().iter().map(|c| c.default.clone()).collect() }

/// Full submission built from the declared defaults with some values replaced.
pub fn defaults_with(overrides: &[(&str, ControlValue)]) -> Result<Vec<ControlValue>, BindError> {
    let mut values = default_values();
    for (name, value) in overrides {
        let idx = declared().iter().position(|c| c.name == *name).ok_or_else(|| BindError::UnknownField(name.to_string()))?;
        values[idx] = value.clone();
    }
    Ok(values)
}
