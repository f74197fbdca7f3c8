//! Display formatting for CLI output

use console::style;

use plinth_core::{OptionSet, Scope};
use plinth_kube::{Deployment, NamespaceState};

/// One line per option: scope, name, value and where it came from
pub fn option_lines(options: &OptionSet) -> Vec<String> {
    let width = options.iter().map(|o| o.name.len()).max().unwrap_or(0);
    options
        .iter()
        .map(|option| {
            let scope = match &option.scope {
                Scope::Shared => "shared".to_string(),
                Scope::Unit(id) => id.clone(),
            };
            let origin = if option.user_specified {
                "user"
            } else {
                "default"
            };
            format!(
                "{:<width$}  {}  ({}, {})",
                option.name,
                option.value(),
                scope,
                origin,
                width = width
            )
        })
        .collect()
}

/// Print the resolved configuration before anything is applied
pub fn print_options(options: &OptionSet) {
    if options.is_empty() {
        return;
    }
    println!("{}", style("Configuration").bold());
    for line in option_lines(options) {
        println!("  {} {}", style("·").dim(), line);
    }
    println!();
}

fn state_label(state: NamespaceState) -> console::StyledObject<&'static str> {
    match state {
        NamespaceState::Absent => style("not installed").dim(),
        NamespaceState::Owned => style("installed").green(),
        NamespaceState::Foreign => style("present, not managed by plinth").yellow(),
    }
}

/// Print a unit with its installation state
pub fn print_unit(unit: &dyn Deployment, state: Option<NamespaceState>) {
    match state {
        Some(state) => println!(
            "  {} {} ({})",
            style("·").dim(),
            style(unit.describe()).cyan(),
            state_label(state)
        ),
        None => println!("  {} {}", style("·").dim(), style(unit.describe()).cyan()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::{InstallationOption, OptionValue};

    #[test]
    fn test_option_lines() {
        let mut options = OptionSet::new()
            .with(InstallationOption::string("system_domain", ""))
            .with(InstallationOption::bool("persist", false).private_to("registry"));
        for option in options.iter_mut() {
            if option.name == "system_domain" {
                option
                    .accept(OptionValue::from("10.0.0.1.nip.io"), false)
                    .unwrap();
            } else {
                option.accept(OptionValue::Bool(true), true).unwrap();
            }
        }

        assert_eq!(
            option_lines(&options),
            vec![
                "system_domain  10.0.0.1.nip.io  (shared, default)",
                "persist        true  (registry, user)",
            ]
        );
    }
}
