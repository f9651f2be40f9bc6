#![no_main]

use huskycat::yaml_lint::{YamlLintConfig, lint};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let issues = lint(content, &YamlLintConfig::default());

        // Issues come back ordered by (line, column).
        for pair in issues.windows(2) {
            assert!((pair[0].line, pair[0].column) <= (pair[1].line, pair[1].column));
        }
    }
});
