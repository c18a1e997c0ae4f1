//! Settings module.

use std::fs;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::model::indel::{IndelModel, SimpleIndelModel, Tkf1};
use crate::model::subst::Jc69;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Number of MCMC iterations to run.
    pub chain_length: usize,

    /// Seed for the run's random number generator; runs with the same seed
    /// and inputs are reproducible.
    pub seed: u64,

    /// Mean of the exponential prior on branch lengths.
    pub branch_mean: f64,

    /// Number of rate-mixture components of the substitution model.
    pub n_rate_components: usize,

    /// The insertion/deletion model and its parameters.
    pub indel: IndelParameters,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum IndelParameters {
    /// Time-independent affine gap model.
    Affine {
        gap_open: f64,
        gap_extend: f64,
        end_prob: f64,
    },
    /// Birth-death links model.
    Tkf1 {
        lambda: f64,
        mu: f64,
        time_dependent: bool,
    },
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        write!(formatter, "{}", String::from_utf8(output).unwrap())
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> std::result::Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> std::result::Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> std::result::Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> std::result::Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        let settings = Self::read(&mut reader)?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    /// Instantiate the configured indel model.
    pub fn indel_model(&self) -> Result<Rc<dyn IndelModel>> {
        Ok(match self.indel {
            IndelParameters::Affine {
                gap_open,
                gap_extend,
                end_prob,
            } => Rc::new(SimpleIndelModel::new(gap_open, gap_extend, end_prob)?),
            IndelParameters::Tkf1 {
                lambda,
                mu,
                time_dependent,
            } => Rc::new(Tkf1::new(lambda, mu, time_dependent)?),
        })
    }

    /// Instantiate the substitution model with the configured number of
    /// rate components.
    pub fn subst_model(&self) -> Result<Rc<Jc69>> {
        let rates: Vec<f64> = (1..=self.n_rate_components).map(|i| i as f64).collect();
        Ok(Rc::new(Jc69::with_rates(&rates)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            chain_length: 10_000,
            seed: 42,
            branch_mean: 0.1,
            n_rate_components: 4,
            indel: IndelParameters::Tkf1 {
                lambda: 0.1,
                mu: 0.12,
                time_dependent: true,
            },
        }
    }

    #[test]
    fn read_write() {
        let settings = settings();
        let mut output = vec![];
        settings.write(&mut output).unwrap();
        let settings2 = Settings::read(&mut &output[..]).unwrap();
        assert_eq!(settings, settings2);
    }

    #[test]
    fn models_are_buildable() {
        let settings = settings();
        assert!(settings.indel_model().is_ok());
        let subst = settings.subst_model().unwrap();
        use crate::model::subst::SubstModel;
        assert_eq!(subst.n_components(), 4);
    }

    #[test]
    fn bad_parameters_fail_at_build_time() {
        let mut settings = settings();
        settings.indel = IndelParameters::Tkf1 {
            lambda: 0.5,
            mu: 0.1,
            time_dependent: true,
        };
        assert!(settings.indel_model().is_err());
    }
}
