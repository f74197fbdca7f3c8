//! Option resolution pipeline
//!
//! Each [`OptionsReader`] is one resolution stage. Stages never touch an
//! option that an earlier stage already marked valid, so a chain like
//! `flags -> dynamic defaults -> defaults -> validity` fills every option
//! from the highest priority source that has an answer.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use tracing::debug;

use crate::error::{CoreError, Result};
use crate::option::{InstallationOption, OptionKind, OptionSet, OptionValue, PlatformInfo, Scope};

/// One stage of the resolver pipeline
pub trait OptionsReader {
    /// Try to fill `option`; must leave already valid options untouched
    fn read(&mut self, option: &mut InstallationOption) -> Result<()>;
}

impl OptionSet {
    /// Apply one reader to every option, in order
    pub fn populate(&mut self, reader: &mut dyn OptionsReader) -> Result<()> {
        for option in self.iter_mut() {
            reader.read(option)?;
        }
        Ok(())
    }

    /// Apply a chain of readers, each over the whole set
    pub fn resolve(&mut self, chain: &mut [&mut dyn OptionsReader]) -> Result<()> {
        for reader in chain.iter_mut() {
            self.populate(&mut **reader)?;
        }
        Ok(())
    }
}

/// Command-line flag name of an option (`tls_issuer` -> `tls-issuer`)
pub fn flag_name(option_name: &str) -> String {
    option_name.replace('_', "-")
}

/// Reads values supplied as command-line flags
///
/// A flag whose value equals the option's static default is treated as not
/// provided, since the command line cannot distinguish the two.
#[derive(Debug, Default, Clone)]
pub struct FlagReader {
    values: HashMap<String, String>,
}

impl FlagReader {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl OptionsReader for FlagReader {
    fn read(&mut self, option: &mut InstallationOption) -> Result<()> {
        if option.valid {
            return Ok(());
        }
        let Some(raw) = self.values.get(&flag_name(&option.name)) else {
            return Ok(());
        };

        let value =
            OptionValue::parse(option.kind(), raw).ok_or_else(|| CoreError::InvalidValue {
                name: option.name.clone(),
                value: raw.clone(),
                kind: option.kind(),
            })?;

        if &value == option.default_value() {
            debug!(option = %option.name, "flag equals default, treated as not provided");
            return Ok(());
        }

        debug!(option = %option.name, %value, "resolved from flag");
        option.accept(value, true)
    }
}

/// Computes values from live platform state
#[derive(Debug, Clone)]
pub struct DynamicDefaultReader {
    platform: PlatformInfo,
}

impl DynamicDefaultReader {
    pub fn new(platform: PlatformInfo) -> Self {
        Self { platform }
    }
}

/// Evaluate an option's dynamic default, discarding unusable answers
fn dynamic_value(option: &InstallationOption, platform: &PlatformInfo) -> Option<OptionValue> {
    let f = option.dynamic_default()?;
    match f(platform) {
        Ok(Some(value)) if value.kind() == option.kind() && !value.is_empty() => Some(value),
        Ok(Some(value)) => {
            debug!(option = %option.name, %value, "dynamic default unusable");
            None
        }
        Ok(None) => None,
        Err(e) => {
            debug!(option = %option.name, error = %e, "dynamic default failed");
            None
        }
    }
}

impl OptionsReader for DynamicDefaultReader {
    fn read(&mut self, option: &mut InstallationOption) -> Result<()> {
        if option.valid {
            return Ok(());
        }
        if let Some(value) = dynamic_value(option, &self.platform) {
            debug!(option = %option.name, %value, "resolved from dynamic default");
            option.accept(value, false)?;
        }
        Ok(())
    }
}

/// Fills every remaining option with its static default
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultsReader;

impl OptionsReader for DefaultsReader {
    fn read(&mut self, option: &mut InstallationOption) -> Result<()> {
        if option.valid {
            return Ok(());
        }
        let value = option.default_value().clone();
        option.accept(value, false)
    }
}

/// Terminal stage: fails on the first option still lacking a value
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidityReader;

impl OptionsReader for ValidityReader {
    fn read(&mut self, option: &mut InstallationOption) -> Result<()> {
        if option.valid {
            Ok(())
        } else {
            Err(CoreError::MissingOption {
                name: option.name.clone(),
                scope: option.scope.clone(),
            })
        }
    }
}

/// Prompts the user for every option still lacking a value
///
/// The prompt is prefilled with the dynamic default when one is available,
/// otherwise with the static default. An empty answer accepts it.
pub struct InteractiveReader<R, W> {
    input: R,
    output: W,
    platform: Option<PlatformInfo>,
}

impl<R: BufRead, W: Write> InteractiveReader<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            platform: None,
        }
    }

    /// Use live platform state to prefill dynamic defaults
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    fn prompt(&mut self, option: &InstallationOption, prefill: &OptionValue) -> Result<()> {
        let label = match &option.scope {
            Scope::Shared => "Shared",
            Scope::Unit(id) => id.as_str(),
        };
        let mut line = format!("[{}] {}", label, option.name);
        if !option.description.is_empty() {
            line.push(' ');
            line.push_str(&option.description);
        }
        if option.kind() == OptionKind::Bool {
            line.push_str(" (y/n)");
        }
        write!(self.output, "{} [{}]: ", line, prefill)
            .and_then(|_| self.output.flush())
            .map_err(|e| input_error(option, e))
    }

    fn say(&mut self, option: &InstallationOption, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message).map_err(|e| input_error(option, e))
    }
}

fn input_error(option: &InstallationOption, e: impl std::fmt::Display) -> CoreError {
    CoreError::Input {
        name: option.name.clone(),
        message: e.to_string(),
    }
}

impl<R: BufRead, W: Write> OptionsReader for InteractiveReader<R, W> {
    fn read(&mut self, option: &mut InstallationOption) -> Result<()> {
        if option.valid {
            return Ok(());
        }

        let prefill = self
            .platform
            .as_ref()
            .and_then(|p| dynamic_value(option, p))
            .unwrap_or_else(|| option.default_value().clone());

        loop {
            self.prompt(option, &prefill)?;

            let mut answer = String::new();
            let read = self
                .input
                .read_line(&mut answer)
                .map_err(|e| input_error(option, e))?;
            if read == 0 {
                return Err(input_error(option, "unexpected end of input"));
            }

            let answer = answer.trim();
            if answer.is_empty() {
                return option.accept(prefill, true);
            }

            match OptionValue::parse(option.kind(), answer) {
                Some(value) => return option.accept(value, true),
                None => match option.kind() {
                    OptionKind::Bool => {
                        self.say(option, "It's either 'y' or 'n', please try again")?
                    }
                    OptionKind::Int => self.say(option, "Please provide an integer value")?,
                    OptionKind::String => self.say(option, "Please provide a value")?,
                },
            }
        }
    }
}

/// Ask a yes/no question, defaulting to "no"
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    loop {
        write!(output, "{} (y/n) [n]: ", question)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(false);
        }
        match OptionValue::parse(OptionKind::Bool, answer) {
            Some(OptionValue::Bool(yes)) => return Ok(yes),
            _ => writeln!(output, "It's either 'y' or 'n', please try again")?,
        }
    }
}
