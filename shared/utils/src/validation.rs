use bomsync_models::{BomError, BomResult};
use regex::Regex;
use std::sync::OnceLock;
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> BomResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let field = errors
                .field_errors()
                .keys()
                .next()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "model".to_string());
            Err(BomError::invalid_attributes(field, format_validation_errors(&errors)))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match (&error.message, &*error.code) {
                (Some(message), _) => message.to_string(),
                (None, "length") => format!("Length validation failed for field '{}'", field),
                (None, "range") => format!("Value out of range for field '{}'", field),
                (None, code) => format!("Validation failed for field '{}': {}", field, code),
            };
            messages.push(message);
        }
    }

    messages.sort();
    messages.join(", ")
}

fn position_regex() -> &'static Regex {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    POSITION.get_or_init(|| {
        Regex::new(r"^M1(\.U\d+(\.S\d+(\.F\d+(\.G\d+(\.P\d+(\.[A-Z])?)?)?)?)?)?$")
            .expect("position grammar is a valid regex")
    })
}

/// Whether a position code follows the `M1.U<n>.S<n>.F<n>.G<n>.P<n>.<letter>` grammar.
pub fn is_well_formed_position(position: &str) -> bool {
    position_regex().is_match(position)
}

/// Splits a trailing `.P<n>` suffix off a position, returning the prefix and `n`.
pub fn split_primary_suffix(position: &str) -> Option<(&str, usize)> {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let suffix = SUFFIX.get_or_init(|| Regex::new(r"^(.*)\.P(\d+)$").expect("suffix pattern is a valid regex"));

    let captures = suffix.captures(position)?;
    let prefix = captures.get(1)?.as_str();
    let index = captures.get(2)?.as_str().parse().ok()?;
    Some((prefix, index))
}

/// Normalizes a list of certification markers: trimmed, upper-cased, deduplicated, sorted.
pub fn normalize_certifications(certifications: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = certifications
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
