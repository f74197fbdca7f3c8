//! Installation options with typed values and shared/private scoping
//!
//! An [`InstallationOption`] is declared by a deployment unit and filled in
//! by the resolver pipeline (see [`crate::resolve`]). Options live in an
//! [`OptionSet`], keyed by `(name, scope)`:
//!
//! - **Shared** options are resolved once and handed to every unit
//! - **Private** options are only visible to the unit that declared them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Value kind of an option, fixed at declaration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[serde(alias = "boolean")]
    Bool,
    String,
    #[serde(alias = "integer")]
    Int,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Bool => write!(f, "boolean"),
            OptionKind::String => write!(f, "string"),
            OptionKind::Int => write!(f, "integer"),
        }
    }
}

/// A typed option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl OptionValue {
    /// The zero value of a kind (`false`, `0`, `""`)
    pub fn zero(kind: OptionKind) -> Self {
        match kind {
            OptionKind::Bool => OptionValue::Bool(false),
            OptionKind::String => OptionValue::String(String::new()),
            OptionKind::Int => OptionValue::Int(0),
        }
    }

    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::String(_) => OptionKind::String,
        }
    }

    /// Parse user input into a value of the given kind
    ///
    /// Booleans accept `y`/`n`, `yes`/`no`, `true`/`false` and `1`/`0`.
    /// Returns `None` when the input is not well-formed for the kind.
    pub fn parse(kind: OptionKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match kind {
            OptionKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Some(OptionValue::Bool(true)),
                "n" | "no" | "false" | "0" => Some(OptionValue::Bool(false)),
                _ => None,
            },
            OptionKind::Int => raw.parse::<i64>().ok().map(OptionValue::Int),
            OptionKind::String => Some(OptionValue::String(raw.to_string())),
        }
    }

    /// Convert a loosely-typed value (e.g. from YAML) into the given kind
    pub fn coerce(self, kind: OptionKind) -> Option<Self> {
        match (kind, self) {
            (OptionKind::Bool, v @ OptionValue::Bool(_)) => Some(v),
            (OptionKind::Int, v @ OptionValue::Int(_)) => Some(v),
            (OptionKind::String, v @ OptionValue::String(_)) => Some(v),
            (OptionKind::String, other) => Some(OptionValue::String(other.to_string())),
            (OptionKind::Int, OptionValue::String(s)) => s.trim().parse().ok().map(OptionValue::Int),
            (OptionKind::Bool, OptionValue::String(s)) => Self::parse(OptionKind::Bool, &s),
            _ => None,
        }
    }

    /// True for the empty string; other kinds are never empty
    pub fn is_empty(&self) -> bool {
        matches!(self, OptionValue::String(s) if s.is_empty())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::String(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::String(s)
    }
}

/// Visibility of an option
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Resolved once, visible to every unit
    #[default]
    Shared,
    /// Private to the unit with this id
    Unit(String),
}

impl Scope {
    pub fn is_shared(&self) -> bool {
        matches!(self, Scope::Shared)
    }

    /// Scope id as used on the wire: empty for shared options
    pub fn id(&self) -> &str {
        match self {
            Scope::Shared => "",
            Scope::Unit(id) => id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shared => write!(f, "shared"),
            Scope::Unit(id) => write!(f, "private to {}", id),
        }
    }
}

/// Live platform facts available to dynamic defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Externally reachable node addresses
    pub external_ips: Vec<String>,
    /// Kubernetes server version (git version string)
    pub server_version: String,
    /// Detected platform name (`kind`, `k3s`, `ibm`, `minikube`, `generic`)
    pub platform: String,
    /// Whether LoadBalancer services get an address on this platform
    pub has_load_balancer: bool,
}

/// Function computing a default from live platform state
///
/// `Ok(None)` means "no default could be determined", which is not an error:
/// the option stays invalid for the next resolver.
pub type DynamicDefault =
    Arc<dyn Fn(&PlatformInfo) -> std::result::Result<Option<OptionValue>, String> + Send + Sync>;

/// A named, typed, scoped configuration value
#[derive(Clone)]
pub struct InstallationOption {
    /// Identifying name (underscores, transliterated to flags with hyphens)
    pub name: String,
    /// Short description, shown in prompts and help
    pub description: String,
    /// Shared or private to one unit
    pub scope: Scope,
    kind: OptionKind,
    value: OptionValue,
    default: OptionValue,
    dynamic_default: Option<DynamicDefault>,
    /// Set once a resolver accepted a value
    pub valid: bool,
    /// Set when the value came from explicit user input
    pub user_specified: bool,
}

impl InstallationOption {
    /// Declare a shared option; the kind is taken from the default
    pub fn new(name: impl Into<String>, default: impl Into<OptionValue>) -> Self {
        let default = default.into();
        let kind = default.kind();
        Self {
            name: name.into(),
            description: String::new(),
            scope: Scope::Shared,
            kind,
            value: OptionValue::zero(kind),
            default,
            dynamic_default: None,
            valid: false,
            user_specified: false,
        }
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, default)
    }

    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, default.into())
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, default)
    }

    /// Set the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Make the option private to a unit
    pub fn private_to(mut self, unit_id: impl Into<String>) -> Self {
        self.scope = Scope::Unit(unit_id.into());
        self
    }

    /// Attach a dynamic default
    pub fn with_dynamic_default<F>(mut self, f: F) -> Self
    where
        F: Fn(&PlatformInfo) -> std::result::Result<Option<OptionValue>, String>
            + Send
            + Sync
            + 'static,
    {
        self.dynamic_default = Some(Arc::new(f));
        self
    }

    /// Attach a dynamic default to an already declared option
    pub fn set_dynamic_default(&mut self, f: DynamicDefault) {
        self.dynamic_default = Some(f);
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn value(&self) -> &OptionValue {
        &self.value
    }

    pub fn default_value(&self) -> &OptionValue {
        &self.default
    }

    pub fn dynamic_default(&self) -> Option<&DynamicDefault> {
        self.dynamic_default.as_ref()
    }

    /// Key identifying this option within a set
    pub fn key(&self) -> (&str, &Scope) {
        (&self.name, &self.scope)
    }

    /// Store a resolved value and mark the option valid
    pub fn accept(&mut self, value: OptionValue, user_specified: bool) -> Result<()> {
        if value.kind() != self.kind {
            return Err(CoreError::WrongKind {
                name: self.name.clone(),
                expected: self.kind,
                actual: value.kind(),
            });
        }
        self.value = value;
        self.valid = true;
        self.user_specified = user_specified;
        Ok(())
    }

    /// Forget any value, back to the zero value of the kind
    pub fn reset(&mut self) {
        self.value = OptionValue::zero(self.kind);
        self.valid = false;
        self.user_specified = false;
    }
}

impl fmt::Debug for InstallationOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationOption")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("default", &self.default)
            .field("dynamic_default", &self.dynamic_default.is_some())
            .field("valid", &self.valid)
            .field("user_specified", &self.user_specified)
            .finish()
    }
}

/// Ordered collection of options, unique by `(name, scope)`
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    options: Vec<InstallationOption>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an option, replacing an existing entry with the same key
    pub fn insert(&mut self, option: InstallationOption) {
        match self.options.iter_mut().find(|o| o.key() == option.key()) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, option: InstallationOption) -> Self {
        self.insert(option);
        self
    }

    /// Merge another set into this one (entries of `other` win)
    pub fn merge(&mut self, other: OptionSet) {
        for option in other.options {
            self.insert(option);
        }
    }

    /// Prepare a unit's declared options for merging into a shared set
    ///
    /// Shared entries lose whatever value the declaring unit gave them, so
    /// the shared slot is always resolved centrally.
    pub fn curated_for_gather(mut self) -> Self {
        for option in self.options.iter_mut().filter(|o| o.scope.is_shared()) {
            option.reset();
        }
        self
    }

    /// Options visible to one unit: all shared ones plus its private ones
    pub fn for_unit(&self, unit_id: &str) -> OptionSet {
        self.options
            .iter()
            .filter(|o| match &o.scope {
                Scope::Shared => true,
                Scope::Unit(id) => id == unit_id,
            })
            .cloned()
            .collect()
    }

    /// Find an option by name
    ///
    /// With a unit id, that unit's private option takes precedence over a
    /// shared option of the same name. Without one only shared options match.
    pub fn get(&self, name: &str, unit: Option<&str>) -> Option<&InstallationOption> {
        let private = unit.and_then(|unit| {
            self.options
                .iter()
                .find(|o| o.name == name && o.scope.id() == unit && !o.scope.is_shared())
        });
        private.or_else(|| {
            self.options
                .iter()
                .find(|o| o.name == name && o.scope.is_shared())
        })
    }

    /// Mutable lookup by exact key
    pub fn get_mut(&mut self, name: &str, scope: &Scope) -> Option<&mut InstallationOption> {
        self.options
            .iter_mut()
            .find(|o| o.name == name && &o.scope == scope)
    }

    fn require(&self, name: &str, unit: Option<&str>) -> Result<&InstallationOption> {
        self.get(name, unit).ok_or_else(|| CoreError::UnknownOption {
            name: name.to_string(),
        })
    }

    fn wrong_kind(option: &InstallationOption, expected: OptionKind) -> CoreError {
        CoreError::WrongKind {
            name: option.name.clone(),
            expected,
            actual: option.kind(),
        }
    }

    pub fn get_bool(&self, name: &str, unit: Option<&str>) -> Result<bool> {
        let option = self.require(name, unit)?;
        option
            .value()
            .as_bool()
            .ok_or_else(|| Self::wrong_kind(option, OptionKind::Bool))
    }

    pub fn get_string(&self, name: &str, unit: Option<&str>) -> Result<&str> {
        let option = self.require(name, unit)?;
        option
            .value()
            .as_str()
            .ok_or_else(|| Self::wrong_kind(option, OptionKind::String))
    }

    pub fn get_int(&self, name: &str, unit: Option<&str>) -> Result<i64> {
        let option = self.require(name, unit)?;
        option
            .value()
            .as_int()
            .ok_or_else(|| Self::wrong_kind(option, OptionKind::Int))
    }

    /// Shared boolean, `false` when absent or of another kind
    pub fn shared_bool(&self, name: &str) -> bool {
        self.get_bool(name, None).unwrap_or(false)
    }

    /// Shared string, empty when absent or of another kind
    pub fn shared_string(&self, name: &str) -> String {
        self.get_string(name, None)
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InstallationOption> {
        self.options.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, InstallationOption> {
        self.options.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// All `(name, scope id)` keys, in order
    pub fn keys(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .map(|o| (o.name.clone(), o.scope.id().to_string()))
            .collect()
    }
}

impl FromIterator<InstallationOption> for OptionSet {
    fn from_iter<I: IntoIterator<Item = InstallationOption>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for option in iter {
            set.insert(option);
        }
        set
    }
}

impl IntoIterator for OptionSet {
    type Item = InstallationOption;
    type IntoIter = std::vec::IntoIter<InstallationOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.into_iter()
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = &'a InstallationOption;
    type IntoIter = std::slice::Iter<'a, InstallationOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OptionSet {
        OptionSet::new()
            .with(InstallationOption::string("domain", "example.com"))
            .with(InstallationOption::bool("skip_ingress", false))
            .with(InstallationOption::string("email", "").private_to("cert-manager"))
            .with(InstallationOption::int("replicas", 1).private_to("registry"))
    }

    #[test]
    fn test_new_option_starts_invalid_with_zero_value() {
        let opt = InstallationOption::string("domain", "example.com");
        assert!(!opt.valid);
        assert!(!opt.user_specified);
        assert_eq!(opt.kind(), OptionKind::String);
        assert_eq!(opt.value(), &OptionValue::String(String::new()));
        assert_eq!(opt.default_value(), &OptionValue::from("example.com"));
    }

    #[test]
    fn test_accept_rejects_wrong_kind() {
        let mut opt = InstallationOption::int("replicas", 1);
        let err = opt.accept(OptionValue::from("three"), true).unwrap_err();
        assert!(matches!(err, CoreError::WrongKind { .. }));
        assert!(!opt.valid);

        opt.accept(OptionValue::Int(3), true).unwrap();
        assert!(opt.valid);
        assert!(opt.user_specified);
        assert_eq!(opt.value().as_int(), Some(3));
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let set = sample();
        let mut merged = set.clone();
        merged.merge(set.clone());
        assert_eq!(merged.keys(), set.keys());
    }

    #[test]
    fn test_merge_replaces_same_key() {
        let mut set = sample();
        set.merge(OptionSet::new().with(InstallationOption::string("domain", "other.org")));

        assert_eq!(set.len(), 4);
        let domain = set.get("domain", None).unwrap();
        assert_eq!(domain.default_value(), &OptionValue::from("other.org"));
    }

    #[test]
    fn test_same_name_different_scope_are_distinct() {
        let set = OptionSet::new()
            .with(InstallationOption::string("email", "shared@example.com"))
            .with(InstallationOption::string("email", "").private_to("cert-manager"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_for_unit_scoping() {
        let set = sample();

        let cm = set.for_unit("cert-manager");
        let keys = cm.keys();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&("email".to_string(), "cert-manager".to_string())));
        assert!(!keys.iter().any(|(_, scope)| scope == "registry"));

        let other = set.for_unit("gitea");
        assert!(other.iter().all(|o| o.scope.is_shared()));
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn test_curated_for_gather_resets_only_shared() {
        let mut set = sample();
        for opt in set.iter_mut() {
            let default = opt.default_value().clone();
            opt.accept(default, false).unwrap();
        }

        let curated = set.curated_for_gather();
        let domain = curated.get("domain", None).unwrap();
        assert_eq!(domain.value(), &OptionValue::String(String::new()));
        assert!(!domain.valid);

        let replicas = curated.get("replicas", Some("registry")).unwrap();
        assert_eq!(replicas.value(), &OptionValue::Int(1));
        assert!(replicas.valid);
    }

    #[test]
    fn test_get_prefers_private() {
        let mut set = OptionSet::new()
            .with(InstallationOption::string("email", "shared"))
            .with(InstallationOption::string("email", "private").private_to("cert-manager"));
        for opt in set.iter_mut() {
            let default = opt.default_value().clone();
            opt.accept(default, false).unwrap();
        }

        assert_eq!(set.get_string("email", Some("cert-manager")).unwrap(), "private");
        assert_eq!(set.get_string("email", Some("gitea")).unwrap(), "shared");
        assert_eq!(set.get_string("email", None).unwrap(), "shared");
    }

    #[test]
    fn test_typed_getters() {
        let set = sample();
        assert!(matches!(
            set.get_bool("domain", None),
            Err(CoreError::WrongKind { .. })
        ));
        assert!(matches!(
            set.get_string("missing", None),
            Err(CoreError::UnknownOption { .. })
        ));
        assert_eq!(set.get_int("replicas", Some("registry")).unwrap(), 0);
        assert!(!set.shared_bool("domain"));
        assert_eq!(set.shared_string("nope"), "");
    }

    #[test]
    fn test_parse_bool_tokens() {
        for raw in ["y", "yes", "TRUE", "1"] {
            assert_eq!(OptionValue::parse(OptionKind::Bool, raw), Some(OptionValue::Bool(true)));
        }
        for raw in ["n", "No", "false", "0"] {
            assert_eq!(OptionValue::parse(OptionKind::Bool, raw), Some(OptionValue::Bool(false)));
        }
        assert_eq!(OptionValue::parse(OptionKind::Bool, "maybe"), None);
        assert_eq!(OptionValue::parse(OptionKind::Int, "12x"), None);
        assert_eq!(OptionValue::parse(OptionKind::Int, " 42 "), Some(OptionValue::Int(42)));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            OptionValue::Int(8080).coerce(OptionKind::String),
            Some(OptionValue::from("8080"))
        );
        assert_eq!(OptionValue::from("7").coerce(OptionKind::Int), Some(OptionValue::Int(7)));
        assert_eq!(OptionValue::Int(1).coerce(OptionKind::Bool), None);
    }

    #[test]
    fn test_kind_names() {
        let kinds: Vec<OptionKind> =
            serde_yaml::from_str("[bool, boolean, int, integer, string]").unwrap();
        assert_eq!(
            kinds,
            vec![
                OptionKind::Bool,
                OptionKind::Bool,
                OptionKind::Int,
                OptionKind::Int,
                OptionKind::String
            ]
        );
    }
}
