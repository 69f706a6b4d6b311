//! Routing directive matching and rewriting
//!
//! The proxy selects the live slot with a single assignment such as
//! `set $active_environment "blue";`. Matchers are tried in order, from the
//! strictest to the most tolerant, and the first one that finds anything wins.

use std::ops::Range;
use std::path::Path;

use regex::Regex;

use crate::errors::SlotError;
use crate::models::slot::Slot;

/// One routing assignment found in a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    /// Byte range of the assigned value, quotes excluded
    pub value_range: Range<usize>,

    /// Assigned value as written
    pub value: String,

    /// 1-based line number
    pub line: usize,
}

impl DirectiveMatch {
    /// Slot the directive names, if the value is a slot name
    pub fn slot(&self) -> Option<Slot> {
        match self.value.as_str() {
            "blue" => Some(Slot::Blue),
            "green" => Some(Slot::Green),
            _ => None,
        }
    }
}

/// Locates routing assignments in a configuration dialect
pub trait DirectiveMatcher: Send + Sync {
    fn name(&self) -> &str;

    /// Every assignment this matcher recognises, in file order
    fn find(&self, config: &str) -> Vec<DirectiveMatch>;
}

/// Regex matcher. The pattern must capture the value in a group named `value`.
pub struct RegexMatcher {
    name: String,
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, SlotError> {
        let regex = Regex::new(pattern)
            .map_err(|e| SlotError::ConfigError(format!("Invalid directive pattern: {}", e)))?;
        Ok(Self {
            name: name.into(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl DirectiveMatcher for RegexMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, config: &str) -> Vec<DirectiveMatch> {
        self.regex
            .captures_iter(config)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let value = caps.name("value")?;
                if is_commented(config, whole.start()) {
                    return None;
                }
                Some(DirectiveMatch {
                    value_range: value.range(),
                    value: value.as_str().to_string(),
                    line: line_number(config, whole.start()),
                })
            })
            .collect()
    }
}

fn line_start(config: &str, offset: usize) -> usize {
    config[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn line_number(config: &str, offset: usize) -> usize {
    config[..offset].matches('\n').count() + 1
}

fn is_commented(config: &str, offset: usize) -> bool {
    config[line_start(config, offset)..offset].contains('#')
}

/// Result of rewriting a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Configuration text after the rewrite
    pub text: String,

    /// Slot the directive named before, if it named one
    pub previous: Option<Slot>,

    /// Whether the text differs from the input
    pub changed: bool,
}

/// Ordered matcher cascade for one routing variable
pub struct DirectiveCascade {
    variable: String,
    matchers: Vec<Box<dyn DirectiveMatcher>>,
}

impl DirectiveCascade {
    /// Standard nginx cascade: exact quoted slot name, then any quoted value,
    /// then tolerant whitespace and quoting.
    pub fn nginx(variable: &str) -> Result<Self, SlotError> {
        let var = regex::escape(variable);
        let exact = RegexMatcher::new(
            "exact",
            &format!(r#"\bset\s+{var}\s+"(?P<value>blue|green)"\s*;"#),
        )?;
        let quoted = RegexMatcher::new(
            "quoted",
            &format!(r#"\bset\s+{var}\s+"(?P<value>[^"\n]*)"\s*;"#),
        )?;
        let tolerant = RegexMatcher::new(
            "tolerant",
            &format!(r#"\bset[ \t]+{var}[ \t]+['"]?(?P<value>[A-Za-z0-9_.-]+)['"]?[ \t]*;?"#),
        )?;

        Ok(Self {
            variable: variable.to_string(),
            matchers: vec![Box::new(exact), Box::new(quoted), Box::new(tolerant)],
        })
    }

    /// Cascade with no matchers, to be filled with [`DirectiveCascade::with_matcher`]
    pub fn empty(variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
            matchers: Vec::new(),
        }
    }

    /// Append a matcher, tried after the existing ones
    pub fn with_matcher(mut self, matcher: Box<dyn DirectiveMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Locate the single routing assignment in `config`.
    ///
    /// `path` is only used for error context.
    pub fn locate(&self, path: &Path, config: &str) -> Result<DirectiveMatch, SlotError> {
        for matcher in &self.matchers {
            let mut found = matcher.find(config);
            match found.len() {
                0 => continue,
                1 => return Ok(found.remove(0)),
                count => {
                    return Err(SlotError::AmbiguousDirective {
                        path: path.to_path_buf(),
                        pattern: matcher.name().to_string(),
                        count,
                    })
                }
            }
        }

        Err(SlotError::DirectiveNotFound {
            path: path.to_path_buf(),
            pattern: format!("set {} \"<slot>\";", self.variable),
            found_line: self.candidate_line(config),
        })
    }

    /// Slot the configuration currently routes to
    pub fn current_slot(&self, config: &str) -> Option<Slot> {
        self.locate(Path::new(""), config).ok()?.slot()
    }

    /// Rewrite the routing assignment to name `target`
    pub fn rewrite(&self, path: &Path, config: &str, target: Slot) -> Result<Rewrite, SlotError> {
        let found = self.locate(path, config)?;
        let previous = found.slot();
        if previous == Some(target) {
            return Ok(Rewrite {
                text: config.to_string(),
                previous,
                changed: false,
            });
        }

        let mut text = String::with_capacity(config.len());
        text.push_str(&config[..found.value_range.start]);
        text.push_str(target.as_str());
        text.push_str(&config[found.value_range.end..]);
        let changed = text != config;

        Ok(Rewrite {
            text,
            previous,
            changed,
        })
    }

    /// First uncommented line that mentions `set` and the variable outside a
    /// `map` block header, reported when nothing matched
    fn candidate_line(&self, config: &str) -> Option<(usize, String)> {
        config.lines().enumerate().find_map(|(i, line)| {
            let trimmed = line.trim();
            let relevant = !trimmed.starts_with('#')
                && trimmed.contains("set")
                && trimmed.contains(self.variable.as_str())
                && !trimmed.contains("map");
            relevant.then(|| (i + 1, trimmed.to_string()))
        })
    }
}
