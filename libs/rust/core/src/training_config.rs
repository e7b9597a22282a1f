//! Training configuration record consumed by the training engine.
//!
//! A fresh snapshot is bound for every submission; the engine takes it by value.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::binding::BindError;
use crate::controls::ControlValue;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown choice `{0}`")]
pub struct UnknownChoice(pub String);

/// Enumerated field whose accepted spellings are fixed.
pub trait ChoiceSet: FromStr + Copy {
    const CHOICES: &'static [&'static str];
}

macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl ChoiceSet for $name {
            const CHOICES: &'static [&'static str] = &[$($text),+];
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownChoice(other.to_string())),
                }
            }
        }
    };
}

choice_enum!(
    /// Federated-learning algorithm run by the engine.
    Algorithm {
        FedAvg => "fedavg",
        FedProx => "fedprox",
        Scaffold => "scaffold",
        FedMd => "fedmd",
        FedDf => "feddf",
        FedGen => "fedgen",
        Moon => "moon",
        FedProto => "fedproto",
        Fpl => "fpl",
        Flwf => "flwf",
        CFed => "cfed",
        FedCl => "fedcl",
    }
);

choice_enum!(Dataset {
    Mnist => "Mnist",
    Cifar10 => "Cifar10",
    Digits => "Digits",
    OfficeCaltech => "Office-Caltech",
});

choice_enum!(
    /// How client data is skewed when partitioning.
    SkewType {
        Label => "label",
        Feature => "feature",
        Quantity => "quantity",
    }
);

choice_enum!(ModelArch {
    SimpleCnn => "SimpleCNN",
    MyCnn => "MyCNN",
    ResNet10 => "ResNet10",
});

choice_enum!(
    /// Client participation pattern across rounds.
    DynamicType {
        Static => "static",
        RoundRobin => "round-robin",
        IncrementalArrival => "incremental-arrival",
        IncrementalDeparture => "incremental-departure",
        Random => "random",
        Markov => "markov",
    }
);

/// Names of every field the panel binds, in declaration order.
pub const FIELD_NAMES: [&str; 16] = [
    "algorithm",
    "dataset",
    "skew_type",
    "alpha",
    "model",
    "batch_size",
    "num_clients",
    "num_classes",
    "num_rounds",
    "num_epochs",
    "dynamic_type",
    "round_start",
    "initial_clients",
    "interval",
    "overlap_clients",
    "dpfl",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub algorithm: Algorithm,
    pub dataset: Dataset,
    pub skew_type: SkewType,
    pub alpha: f64,
    pub model: ModelArch,
    pub batch_size: u32,
    pub num_clients: u32,
    pub num_classes: u32,
    pub num_rounds: u32,
    pub num_epochs: u32,
    pub dynamic_type: DynamicType,
    pub round_start: u32,
    pub initial_clients: u32,
    pub interval: u32,
    pub overlap_clients: u32,
    /// Knowledge pool module toggle.
    pub dpfl: bool,
    /// Shared with the visualization server; never bound from the panel.
    pub log_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::FedAvg,
            dataset: Dataset::Mnist,
            skew_type: SkewType::Label,
            alpha: 100.0,
            model: ModelArch::SimpleCnn,
            batch_size: 128,
            num_clients: 10,
            num_classes: 10,
            num_rounds: 10,
            num_epochs: 5,
            dynamic_type: DynamicType::Static,
            round_start: 1,
            initial_clients: 5,
            interval: 10,
            overlap_clients: 2,
            dpfl: false,
            log_dir: PathBuf::from("runs"),
        }
    }
}

impl TrainingConfig {
    /// Sets the field called `name` from a submitted control value.
    pub fn set(&mut self, name: &str, value: &ControlValue) -> Result<(), BindError> {
        match name {
            "algorithm" => self.algorithm = value.choice(name)?,
            "dataset" => self.dataset = value.choice(name)?,
            "skew_type" => self.skew_type = value.choice(name)?,
            "alpha" => self.alpha = value.number(name)?,
            "model" => self.model = value.choice(name)?,
            "batch_size" => self.batch_size = value.whole(name)?,
            "num_clients" => self.num_clients = value.whole(name)?,
            "num_classes" => self.num_classes = value.whole(name)?,
            "num_rounds" => self.num_rounds = value.whole(name)?,
            "num_epochs" => self.num_epochs = value.whole(name)?,
            "dynamic_type" => self.dynamic_type = value.choice(name)?,
            "round_start" => self.round_start = value.whole(name)?,
            "initial_clients" => self.initial_clients = value.whole(name)?,
            "interval" => self.interval = value.whole(name)?,
            "overlap_clients" => self.overlap_clients = value.whole(name)?,
            "dpfl" => self.dpfl = value.flag(name)?,
            other => return Err(BindError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    /// Reads a bindable field back as a control value.
    pub fn field(&self, name: &str) -> Option<ControlValue> {
        let value: ControlValue = match name {
            "algorithm" => self.algorithm.as_str().into(),
            "dataset" => self.dataset.as_str().into(),
            "skew_type" => self.skew_type.as_str().into(),
            "alpha" => self.alpha.into(),
            "model" => self.model.as_str().into(),
            "batch_size" => f64::from(self.batch_size).into(),
            "num_clients" => f64::from(self.num_clients).into(),
            "num_classes" => f64::from(self.num_classes).into(),
            "num_rounds" => f64::from(self.num_rounds).into(),
            "num_epochs" => f64::from(self.num_epochs).into(),
            "dynamic_type" => self.dynamic_type.as_str().into(),
            "round_start" => f64::from(self.round_start).into(),
            "initial_clients" => f64::from(self.initial_clients).into(),
            "interval" => f64::from(self.interval).into(),
            "overlap_clients" => f64::from(self.overlap_clients).into(),
            "dpfl" => self.dpfl.into(),
            _ => return None,
        };
        Some(value)
    }

    /// Command-line flags for an argparse-style training entry point.
    ///
    /// Booleans become a bare `--name` flag when set and are omitted otherwise.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(FIELD_NAMES.len() * 2 + 2);
        for name in FIELD_NAMES {
            match self.field(name) {
                Some(ControlValue::Flag(true)) => args.push(format!("--{name}")),
                Some(ControlValue::Flag(false)) | None => {}
                Some(value) => {
                    args.push(format!("--{name}"));
                    args.push(value.to_string());
                }
            }
        }
        args.push("--log_dir".to_string());
        args.push(self.log_dir.display().to_string());
        args
    }
}
