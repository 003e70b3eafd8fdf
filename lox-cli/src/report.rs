use std::io::Write;
use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};
use lox::{LoxError, Warning};

/// Converts a byte span to a character span for ariadne
fn byte_to_char_span(source: &str, byte_span: &Range<usize>) -> Range<usize> {
    let end = byte_span.end.min(source.len());
    let start = byte_span.start.min(end);
    source[..start].chars().count()..source[..end].chars().count()
}

fn render<W: Write>(
    kind: ReportKind,
    header: String,
    label: Option<String>,
    span: &Range<usize>,
    source: &str,
    filename: Option<&str>,
    mut writer: W,
) {
    let name = filename.unwrap_or("");
    let color = match kind {
        ReportKind::Warning => Color::Yellow,
        _ => Color::Red,
    };
    let char_span = byte_to_char_span(source, span);

    let mut label_builder = Label::new((name, char_span.clone())).with_color(color);
    if let Some(message) = label {
        label_builder = label_builder.with_message(message);
    }

    Report::build(kind, (name, char_span))
        .with_message(header)
        .with_label(label_builder)
        .finish()
        .write((name, Source::from(source)), &mut writer)
        .ok();
}

/// Renders a LoxError with the offending source underlined
pub fn report_error<W: Write>(error: &LoxError, source: &str, filename: Option<&str>, mut writer: W) {
    let (Some(span), Some(line)) = (error.span(), error.line()) else {
        writeln!(writer, "{}", error).ok();
        return;
    };

    render(
        ReportKind::Error,
        format!("{} [line {}]", error.kind(), line),
        Some(error.message()),
        &span,
        source,
        filename,
        writer,
    );
}

pub fn report_warning<W: Write>(
    warning: &Warning,
    source: &str,
    filename: Option<&str>,
    writer: W,
) {
    render(
        ReportKind::Warning,
        format!("[line {}] {}", warning.line, warning.message),
        None,
        &warning.span,
        source,
        filename,
        writer,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ansi(s: &str) -> String {
        let mut result = String::new();
        let mut in_escape = false;
        for c in s.chars() {
            if c == '\x1b' {
                in_escape = true;
            } else if in_escape {
                if c == 'm' {
                    in_escape = false;
                }
            } else {
                result.push(c);
            }
        }
        result
    }

    fn rendered_error(error: &LoxError, source: &str) -> String {
        let mut output = Vec::new();
        report_error(error, source, None, &mut output);
        strip_ansi(&String::from_utf8(output).unwrap())
    }

    fn first_line(s: &str) -> &str {
        s.lines().next().unwrap_or("")
    }

    #[test]
    fn byte_to_char_span_ascii_unchanged() {
        let source = "print x;";
        assert_eq!(byte_to_char_span(source, &(0..5)), 0..5);
        assert_eq!(byte_to_char_span(source, &(6..7)), 6..7);
    }

    #[test]
    fn byte_to_char_span_converts_utf8() {
        // 'é' takes two bytes
        let source = "\"é\" + 1";
        assert_eq!(byte_to_char_span(source, &(0..4)), 0..3);
        assert_eq!(byte_to_char_span(source, &(5..6)), 4..5);
    }

    #[test]
    fn byte_to_char_span_clamps_to_source_length() {
        let source = "hi";
        assert_eq!(byte_to_char_span(source, &(0..100)), 0..2);
        assert_eq!(byte_to_char_span(source, &(50..100)), 2..2);
    }

    #[test]
    fn scan_error_shows_message_and_source() {
        let error = LoxError::Scan {
            message: "Unexpected character '@'.".to_string(),
            line: 1,
            span: 6..7,
        };
        let result = rendered_error(&error, "print @");
        assert!(result.contains("Unexpected character '@'."));
        assert!(result.contains("print @"));
    }

    #[test]
    fn runtime_error_shows_message() {
        let error = LoxError::runtime("Operand of '-' must be a number, got string \"a\".", 1, 6..7);
        let result = rendered_error(&error, "print -\"a\";");
        assert!(result.contains("Operand of '-' must be a number"));
    }

    #[test]
    fn io_error_just_prints_message() {
        let error: LoxError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        let result = rendered_error(&error, "");
        assert_eq!(result, "Could not read script: gone\n");
    }

    #[test]
    fn error_header_names_kind_and_line() {
        let error = LoxError::Parse {
            message: "at end: Expect ';' after value.".to_string(),
            line: 1,
            span: 7..7,
        };
        let result = rendered_error(&error, "print 1");
        insta::assert_snapshot!(first_line(&result), @"Error: Syntax error [line 1]");
    }

    #[test]
    fn resolution_error_header() {
        let error = LoxError::Resolution {
            message: "at 'this': Can't use 'this' outside of a class.".to_string(),
            line: 2,
            span: 7..11,
        };
        let result = rendered_error(&error, "\nprint this;");
        insta::assert_snapshot!(first_line(&result), @"Error: Resolution error [line 2]");
        assert!(result.contains("Can't use 'this' outside of a class."));
    }

    #[test]
    fn warning_uses_warning_kind() {
        let warning = Warning {
            message: "Local variable 'a' is never used.".to_string(),
            line: 1,
            span: 6..7,
        };
        let mut output = Vec::new();
        report_warning(&warning, "{ var a = 1; }", None, &mut output);
        let result = strip_ansi(&String::from_utf8(output).unwrap());
        insta::assert_snapshot!(
            first_line(&result),
            @"Warning: [line 1] Local variable 'a' is never used."
        );
    }

    #[test]
    fn report_includes_filename() {
        let error = LoxError::runtime("Undefined variable 'x'.", 1, 6..7);
        let mut output = Vec::new();
        report_error(&error, "print x;", Some("script.lox"), &mut output);
        let result = strip_ansi(&String::from_utf8(output).unwrap());
        assert!(result.contains("script.lox"));
    }
}
