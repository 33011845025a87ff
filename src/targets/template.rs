//! Override label templates.
//!
//! Override labels may reference the values the target was discovered with:
//! `{{OriginalHost}}`, `{{OriginalPort}}` and `{{OriginalMetricsPath}}`.
//! The dotted form `{{ .OriginalHost }}` is accepted as well.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Error raised while rendering an override template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown template variable `{0}`")]
    UnknownVariable(String),
    #[error("unterminated or malformed action at offset {0}")]
    Malformed(usize),
}

/// Values available to override templates.
#[derive(Debug, Clone, Copy)]
pub struct TemplateParams<'a> {
    pub original_host: &'a str,
    pub original_port: &'a str,
    pub original_metrics_path: &'a str,
}

impl<'a> TemplateParams<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "OriginalHost" => Some(self.original_host),
            "OriginalPort" => Some(self.original_port),
            "OriginalMetricsPath" => Some(self.original_metrics_path),
            _ => None,
        }
    }
}

/// Render `template`, substituting every placeholder from `params`.
pub fn render(template: &str, params: &TemplateParams<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_literal(&mut out, template, last, whole.start())?;

        let value = params
            .lookup(name.as_str())
            .ok_or_else(|| TemplateError::UnknownVariable(name.as_str().to_string()))?;
        out.push_str(value);
        last = whole.end();
    }
    push_literal(&mut out, template, last, template.len())?;

    Ok(out)
}

/// Copy `template[start..end]` verbatim. Literal text must not open an action.
fn push_literal(out: &mut String, template: &str, start: usize, end: usize) -> Result<(), TemplateError> {
    let segment = &template[start..end];
    if let Some(pos) = segment.find("{{") {
        return Err(TemplateError::Malformed(start + pos));
    }
    out.push_str(segment);
    Ok(())
}
