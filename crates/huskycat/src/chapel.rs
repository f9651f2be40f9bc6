//! Whitespace-only Chapel formatter (leaf utility).
//!
//! Two safe layers: whitespace normalization (line endings, trailing
//! whitespace, tabs, final newline) and brace-depth indentation. Check mode
//! reports what formatting would change without touching the file.

pub const INDENT_SIZE: usize = 2;

/// Format Chapel source. Idempotent: formatting formatted code is a no-op.
pub fn format(code: &str) -> String {
    fix_indentation(&normalize_whitespace(code))
}

/// Normalize line endings to LF, strip trailing whitespace, expand tabs,
/// and ensure a final newline.
pub fn normalize_whitespace(code: &str) -> String {
    let code = code.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = code
        .lines()
        .map(|line| line.trim_end().replace('\t', &" ".repeat(INDENT_SIZE)))
        .collect();

    let mut result = lines.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Re-indent by brace depth. A leading `}` dedents its own line; braces on
/// the line adjust the depth for the lines after it.
pub fn fix_indentation(code: &str) -> String {
    let mut formatted: Vec<String> = Vec::new();
    let mut depth: usize = 0;

    for line in code.lines() {
        let stripped = line.trim_start();

        if stripped.is_empty() {
            formatted.push(String::new());
            continue;
        }

        let line_depth = if stripped.starts_with('}') {
            depth.saturating_sub(1)
        } else {
            depth
        };
        formatted.push(format!(
            "{}{}",
            " ".repeat(line_depth * INDENT_SIZE),
            stripped
        ));

        let opens = stripped.matches('{').count();
        let closes = stripped.matches('}').count();
        depth = depth.saturating_add(opens).saturating_sub(closes);
    }

    let mut result = formatted.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Formatting violations, as human-readable messages. Empty means clean.
pub fn check_formatting(code: &str) -> Vec<String> {
    let mut issues = Vec::new();

    for (idx, line) in code.lines().enumerate() {
        if line != line.trim_end() {
            issues.push(format!("line {}: trailing whitespace", idx + 1));
        }
    }

    if !code.is_empty() && !code.ends_with('\n') {
        issues.push("missing final newline".to_string());
    }

    if code.contains('\t') {
        issues.push("contains tab characters (use spaces)".to_string());
    }

    if format(code) != code {
        issues.push("formatting differs from standard".to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_code_passes_check() {
        let code = "proc main() {\n  writeln(\"hi\");\n}\n";
        assert!(check_formatting(code).is_empty());
        assert_eq!(format(code), code);
    }

    #[test]
    fn trailing_whitespace_is_stripped() {
        assert_eq!(normalize_whitespace("var x = 1;   \n"), "var x = 1;\n");
    }

    #[test]
    fn tabs_become_two_spaces() {
        assert_eq!(normalize_whitespace("\tvar x = 1;\n"), "  var x = 1;\n");
    }

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize_whitespace("a;\r\nb;\r\n"), "a;\nb;\n");
    }

    #[test]
    fn final_newline_is_added() {
        assert_eq!(normalize_whitespace("var x = 1;"), "var x = 1;\n");
    }

    #[test]
    fn indentation_follows_brace_depth() {
        let messy = "proc main() {\nwriteln(1);\nif x {\nwriteln(2);\n}\n}\n";
        let expected = "proc main() {\n  writeln(1);\n  if x {\n    writeln(2);\n  }\n}\n";
        assert_eq!(format(messy), expected);
    }

    #[test]
    fn blank_lines_are_preserved_without_indent() {
        let code = "proc main() {\n\n  writeln(1);\n}\n";
        assert_eq!(format(code), code);
    }

    #[test]
    fn formatting_is_idempotent() {
        let messy = "proc f() {\n\tvar x = 1;  \nif x {\nreturn;\n}\n}";
        let once = format(messy);
        assert_eq!(format(&once), once);
    }

    #[test]
    fn check_lists_each_violation_kind() {
        let issues = check_formatting("proc f() {\n\tvar x = 1;  \n}");
        assert!(issues.iter().any(|i| i.contains("trailing whitespace")));
        assert!(issues.iter().any(|i| i.contains("tab characters")));
        assert!(issues.iter().any(|i| i.contains("final newline")));
    }

    #[test]
    fn unbalanced_braces_never_underflow() {
        let code = "}\n}\nvar x = 1;\n";
        // Depth clamps at zero instead of panicking.
        let formatted = format(code);
        assert!(formatted.contains("var x = 1;"));
    }
}
