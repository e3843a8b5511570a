//! Configuration option store and inclusion predicates.
//!
//! A build is driven by a C-preprocessor style configuration header of
//! `#define NAME [VALUE]` lines. The parsed [`Options`] table feeds the
//! inclusion gate that decides which components get registered at all.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// The value of a defined configuration option.
///
/// Option lookup is three-valued: an option can be absent entirely (the map
/// holds no entry), defined but valueless, or defined with a value. Callers
/// must not collapse "absent" and "defined empty" into one boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Defined without a value (`#define OS_USING_SHELL`).
    Defined,
    /// Defined with an integer value (`#define OS_TICK_PER_SECOND 100`).
    Int(i64),
    /// Defined with any other value; surrounding quotes are stripped.
    Str(String),
}

impl OptionValue {
    /// The `0` integer is the falsy sentinel of the inclusion gate.
    pub fn is_falsy(&self) -> bool {
        matches!(self, OptionValue::Int(0))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
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
            OptionValue::Defined => Ok(()),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Condition under which a component participates in the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Unconditionally active.
    Always,
    /// Active iff the named option is present and not falsy.
    Single(String),
    /// Active iff every non-empty entry satisfies the single-name rule.
    All(Vec<String>),
}

impl Predicate {
    pub fn single(name: impl Into<String>) -> Self {
        Predicate::Single(name.into())
    }

    pub fn all(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Predicate::All(names.into_iter().map(Into::into).collect())
    }
}

/// Result of evaluating a [`Predicate`] against the option store.
///
/// The single-name form passes the option's own value through when it has
/// one; registry callers only consume the boolean sense of this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Inactive,
    Active,
    Value(String),
}

impl Activation {
    pub fn is_active(&self) -> bool {
        !matches!(self, Activation::Inactive)
    }
}

/// The resolved option table of one build invocation.
///
/// Parsed once, immutable for the rest of the run (except for
/// [`Options::define`], which mirrors the original's late `AddDefined`).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Options {
    values: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration header.
    ///
    /// Only object-like `#define` lines contribute options; function-like
    /// macros and everything else are ignored. Conditional blocks are not
    /// evaluated, matching the original's collect-all preprocessor patch.
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();

        for line in text.lines() {
            let line = line.trim_start();
            let rest = match line
                .strip_prefix('#')
                .map(str::trim_start)
                .and_then(|l| l.strip_prefix("define"))
            {
                Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
                _ => continue,
            };

            let mut parts = rest.splitn(2, char::is_whitespace);
            let name = match parts.next() {
                Some(name) if !name.is_empty() && !name.contains('(') => name,
                _ => continue,
            };

            let value = match parts.next().map(str::trim).filter(|v| !v.is_empty()) {
                None => OptionValue::Defined,
                Some(v) => match parse_int(v) {
                    Some(i) => OptionValue::Int(i),
                    None => OptionValue::Str(v.trim_matches('"').to_owned()),
                },
            };

            values.insert(name.to_owned(), value);
        }

        Self { values }
    }

    /// Parse the configuration header at `path`.
    ///
    /// An absent configuration file is a fatal configuration error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| {
            format!("cannot read configuration header '{}'", path.display())
        })?;

        Ok(Self::parse(&text))
    }

    /// Three-valued lookup: [`None`] means the option is absent, which is
    /// distinct from `Some(OptionValue::Defined)`.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Define `name` as truthy after the fact.
    pub fn define(&mut self, name: impl Into<String>) {
        self.values.insert(name.into(), OptionValue::Int(1));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Evaluate an inclusion predicate against this option store.
    pub fn evaluate(&self, predicate: &Predicate) -> Activation {
        match predicate {
            Predicate::Always => Activation::Active,
            Predicate::Single(name) => self.evaluate_single(name),
            Predicate::All(names) => {
                // Empty entries never fail the gate.
                for name in names.iter().filter(|n| !n.is_empty()) {
                    if !self.evaluate_single(name).is_active() {
                        return Activation::Inactive;
                    }
                }
                Activation::Active
            }
        }
    }

    /// The boolean sense of [`Options::evaluate`].
    pub fn is_active(&self, predicate: &Predicate) -> bool {
        self.evaluate(predicate).is_active()
    }

    fn evaluate_single(&self, name: &str) -> Activation {
        match self.values.get(name) {
            None => Activation::Inactive,
            Some(value) if value.is_falsy() => Activation::Inactive,
            Some(OptionValue::Defined) => Activation::Active,
            Some(value) => Activation::Value(value.to_string()),
        }
    }
}

fn parse_int(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
