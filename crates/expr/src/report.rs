use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

use crate::validate::ValidationError;

/// Render `errors` against the expression they were found in, one annotated report per error.
pub fn render(errors: &[ValidationError], source_name: &str, source_text: &str) -> String {
    let mut out = Vec::new();
    for error in errors {
        let offset = error.span.map_or(0, |span| span.start);
        let mut report = Report::build(ReportKind::Error, source_name, offset)
            .with_config(Config::default().with_color(false))
            .with_message(&error.message);
        if let Some(span) = error.span {
            report = report.with_label(Label::new((source_name, Range::from(span))).with_message(&error.message));
        }
        if let Some(hint) = &error.hint {
            report = report.with_help(hint);
        }
        if let Some(position) = &error.position {
            report = report.with_note(format!("at {position}"));
        }
        // Writing into a Vec does not fail
        let _ = report.finish().write((source_name, Source::from(source_text)), &mut out);
    }
    String::from_utf8_lossy(&out).into_owned()
}
