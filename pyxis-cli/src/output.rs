//! Diagnostic rendering

use colored::*;
use pyxis_build::BuildResult;
use pyxis_checker::{Diagnostic, Severity};

#[derive(Debug, Clone, Copy)]
pub struct OutputStyle {
    pub show_column_numbers: bool,
    pub color: bool,
}

/// `path:line[:col]: severity: message`
pub fn format_diagnostic(result: &BuildResult, diagnostic: &Diagnostic, style: OutputStyle) -> String {
    let location = result
        .modules
        .get(&diagnostic.module)
        .and_then(|m| m.path.as_ref())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| diagnostic.module.clone());
    let position = if style.show_column_numbers {
        format!("{}:{}:{}", location, diagnostic.line, diagnostic.column)
    } else {
        format!("{}:{}", location, diagnostic.line)
    };
    format!("{}: {}: {}", position, severity_label(diagnostic.severity, style.color), diagnostic.message)
}

fn severity_label(severity: Severity, color: bool) -> String {
    let label = severity.to_string();
    if !color {
        return label;
    }
    match severity {
        Severity::Error => label.red().bold().to_string(),
        Severity::Warning => label.yellow().bold().to_string(),
        Severity::Note => label.blue().to_string(),
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Closing summary line; `checked` counts the requested sources
pub fn summary(result: &BuildResult, checked: usize, color: bool) -> String {
    let errors = result.error_count();
    if errors == 0 {
        let line = format!("Success: no issues found in {}", plural(checked, "source file"));
        return if color { line.green().bold().to_string() } else { line };
    }
    let line = format!(
        "Found {} in {} (checked {})",
        plural(errors, "error"),
        plural(result.files_with_errors().len(), "file"),
        plural(checked, "source file")
    );
    if color {
        line.red().bold().to_string()
    } else {
        line
    }
}

/// Every reported diagnostic followed by the summary
pub fn render(result: &BuildResult, checked: usize, style: OutputStyle) -> Vec<String> {
    let mut lines: Vec<String> = result
        .diagnostics
        .iter()
        .map(|d| format_diagnostic(result, d, style))
        .collect();
    if result.cancelled {
        lines.push("Interrupted; results are incomplete".to_string());
    }
    lines.push(summary(result, checked, style.color));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyxis_build::{BuildManager, BuildSource, MemoryResolver, NoCache, Options};
    use std::sync::Arc;

    fn check(sources: &[(&str, &str)], roots: &[&str]) -> BuildResult {
        let mut resolver = MemoryResolver::new();
        for (name, source) in sources {
            resolver.insert(name, source, false);
        }
        let roots: Vec<BuildSource> = roots.iter().map(|m| BuildSource::module(*m)).collect();
        BuildManager::new(Options::default(), Arc::new(resolver), Arc::new(NoCache))
            .build(&roots)
            .unwrap()
    }

    const PLAIN: OutputStyle = OutputStyle {
        show_column_numbers: false,
        color: false,
    };

    #[test]
    fn test_error_lines_and_summary() {
        let result = check(
            &[("a", "x: int = \"one\"\n"), ("b", "import a\n\ny: str = 2\nz: str = 3\n")],
            &["b"],
        );
        let lines = render(&result, 1, PLAIN);
        assert_eq!(
            lines,
            vec![
                "a.py:1: error: Incompatible types in assignment (expression has type \"str\", variable has type \"int\")",
                "b.py:3: error: Incompatible types in assignment (expression has type \"int\", variable has type \"str\")",
                "b.py:4: error: Incompatible types in assignment (expression has type \"int\", variable has type \"str\")",
                "Found 3 errors in 2 files (checked 1 source file)",
            ]
        );
    }

    #[test]
    fn test_column_numbers() {
        let result = check(&[("m", "import missing\n")], &["m"]);
        let style = OutputStyle {
            show_column_numbers: true,
            color: false,
        };
        assert_eq!(
            format_diagnostic(&result, &result.diagnostics[0], style),
            "m.py:1:8: error: Cannot find implementation or library stub for module named \"missing\""
        );
        assert_eq!(summary(&result, 2, false), "Found 1 error in 1 file (checked 2 source files)");
    }

    #[test]
    fn test_success_summary() {
        let result = check(&[("m", "x = 1\n")], &["m"]);
        assert_eq!(render(&result, 1, PLAIN), vec!["Success: no issues found in 1 source file"]);
    }
}
