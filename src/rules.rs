// src/rules.rs

//! Install and upgrade rules
//!
//! Rules come from a line-oriented file:
//!
//! ```text
//! # class    pattern                verdict
//! UPGRADE    ^etc/.*$               NO
//! INSTALL    "^usr/share/doc/.*$"   NO
//! INSTALL    ^usr/share/doc/keep/   YES
//! ```
//!
//! For a given class every matching rule overwrites the running verdict, so
//! the last matching rule wins. With no matching rule the verdict is `true`
//! (install the file / overwrite it on upgrade).

use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Which decision a rule takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleClass {
    /// Whether an archive entry is extracted at all
    Install,
    /// Whether a conflicting entry may overwrite the live file; a `false`
    /// verdict sends it to the quarantine directory instead
    Upgrade,
}

impl RuleClass {
    pub fn as_str(&self) -> &str {
        match self {
            RuleClass::Install => "INSTALL",
            RuleClass::Upgrade => "UPGRADE",
        }
    }
}

impl FromStr for RuleClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "INSTALL" => Ok(RuleClass::Install),
            "UPGRADE" => Ok(RuleClass::Upgrade),
            _ => Err(format!("unknown rule: {}", s)),
        }
    }
}

/// A single compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub class: RuleClass,
    pub pattern: Regex,
    pub verdict: bool,
}

impl Rule {
    /// Compile a rule; the pattern is searched anywhere in the path
    pub fn new(class: RuleClass, pattern: &str, verdict: bool) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|source| Error::RegexCompile {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            class,
            pattern,
            verdict,
        })
    }
}

/// Ordered rule list
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Read and parse a rules file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse rules text; `origin` names the source in error messages
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let parse_error = |message: String| Error::ConfigParse {
                path: origin.to_string(),
                line: index + 1,
                message,
            };

            let fields = split_fields(line).map_err(|e| parse_error(e.to_string()))?;
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 3 {
                return Err(parse_error(format!(
                    "expected 3 fields, found {}",
                    fields.len()
                )));
            }

            let class = fields[0].parse::<RuleClass>().map_err(parse_error)?;
            let verdict = parse_verdict(&fields[2]).ok_or_else(|| {
                parse_error(format!("invalid verdict: {}", fields[2]))
            })?;

            rules.push(Rule::new(class, &fields[1], verdict)?);
        }

        debug!("Loaded {} rules from {}", rules.len(), origin);
        Ok(Self { rules })
    }

    /// Verdict for `path` under `class`: last matching rule wins, `true`
    /// when nothing matches
    pub fn evaluate(&self, class: RuleClass, path: &str) -> bool {
        let mut verdict = true;
        for rule in &self.rules {
            if rule.class == class && rule.pattern.is_match(path) {
                verdict = rule.verdict;
            }
        }
        verdict
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parse_verdict(field: &str) -> Option<bool> {
    match field {
        "Y" | "YES" => Some(true),
        "N" | "NO" => Some(false),
        _ => None,
    }
}

/// Split a rules line into whitespace-separated fields
///
/// Double quotes group whitespace and `#` into a field; inside quotes a
/// backslash escapes the next character. An unquoted `#` starts a comment.
pub fn split_fields(line: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_field = false;
    let mut quoted = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' if quoted => escaped = true,
            '\\' => return Err("backslash outside of quotes"),
            '"' => {
                quoted = !quoted;
                in_field = true;
            }
            '#' if !quoted => break,
            ' ' | '\t' if !quoted => {
                if in_field {
                    fields.push(std::mem::take(&mut current));
                    in_field = false;
                }
            }
            _ => {
                current.push(c);
                in_field = true;
            }
        }
    }

    if quoted {
        return Err("unterminated quote");
    }
    if in_field {
        fields.push(current);
    }

    Ok(fields)
}
