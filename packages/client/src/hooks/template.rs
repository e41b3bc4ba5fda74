//! Response templates with `{name}` placeholders.
//!
//! `{{` and `}}` produce literal braces. Placeholders are checked against an
//! allow-list when the template is parsed, so a bad template fails at
//! registration rather than on the first matching frame.

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`, accepting only `allowed` placeholders and requiring
    /// every name in `required`.
    pub fn parse(
        source: &str,
        allowed: &[&'static str],
        required: &[&'static str],
    ) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(ConfigError::MalformedTemplate(format!(
                                    "unclosed '{{' in {:?}",
                                    source
                                )));
                            }
                            Some(c) => name.push(c),
                        }
                    }
                    if name.is_empty() {
                        return Err(ConfigError::MalformedTemplate(format!(
                            "empty placeholder in {:?}",
                            source
                        )));
                    }
                    if !allowed.contains(&name.as_str()) {
                        return Err(ConfigError::UnknownPlaceholder(name));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(ConfigError::MalformedTemplate(format!(
                        "single '}}' in {:?}",
                        source
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self {
            source: source.to_string(),
            segments,
        };
        if let Some(missing) = required.iter().copied().find(|name| !template.uses(name)) {
            return Err(ConfigError::MissingPlaceholder(missing));
        }

        Ok(template)
    }

    pub fn uses(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Placeholder(p) if p == name))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute placeholders; names without a value render empty.
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some((_, value)) = values.iter().find(|(key, _)| key == name) {
                        output.push_str(value);
                    }
                }
            }
        }
        output
    }
}
