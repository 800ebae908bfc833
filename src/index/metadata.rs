//! Pattern-based structural metadata extraction
//!
//! Extraction is data-driven: each language family maps to an ordered list
//! of regex rules plus a fixed keyword vocabulary, so adding a language is
//! an additive table change. Unrecognized file types fall back to a
//! generic rule set. There is no failure mode beyond empty metadata.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Extraction rules for one language family
pub struct LanguageRules {
    /// Declaration patterns; capture group 1 is the identifier name
    identifier_patterns: Vec<Regex>,
    /// Import/export patterns; capture group 1 is the target
    import_patterns: Vec<Regex>,
    /// Fixed keyword vocabulary for this family
    keywords: &'static [&'static str],
}

/// Metadata extracted from one chunk of text
#[derive(Debug, Default, Clone)]
pub struct ExtractedMetadata {
    pub identifiers: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
}

fn rules(
    identifier_patterns: &[&str],
    import_patterns: &[&str],
    keywords: &'static [&'static str],
) -> LanguageRules {
    LanguageRules {
        identifier_patterns: identifier_patterns
            .iter()
            .map(|p| Regex::new(p).expect("invalid extraction pattern"))
            .collect(),
        import_patterns: import_patterns
            .iter()
            .map(|p| Regex::new(p).expect("invalid extraction pattern"))
            .collect(),
        keywords,
    }
}

static RUST_RULES: Lazy<LanguageRules> = Lazy::new(|| {
    rules(
        &[
            r"fn\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"struct\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"enum\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"trait\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"(?:let|const|static)\s+(?:mut\s+)?([A-Za-z_][A-Za-z0-9_]*)",
        ],
        &[r"use\s+([A-Za-z0-9_:]+)"],
        &[
            "fn", "struct", "enum", "trait", "impl", "match", "async", "await", "mod", "pub",
            "unsafe", "lifetime",
        ],
    )
});

static JAVASCRIPT_RULES: Lazy<LanguageRules> = Lazy::new(|| {
    rules(
        &[
            r"function\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            r"class\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            r"(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            r"([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?\(",
        ],
        &[
            r#"import\s+.*?from\s+['"]([^'"]+)['"]"#,
            r"export\s+(?:default\s+)?(?:function|class|const)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
            r#"require\(['"]([^'"]+)['"]\)"#,
        ],
        &[
            "function", "class", "const", "async", "await", "promise", "import", "export",
            "callback", "component", "props", "state",
        ],
    )
});

static PYTHON_RULES: Lazy<LanguageRules> = Lazy::new(|| {
    rules(
        &[
            r"def\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"class\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*",
        ],
        &[r"(?:from|import)\s+([A-Za-z0-9_.]+)"],
        &[
            "def", "class", "self", "import", "async", "await", "lambda", "decorator", "yield",
            "except",
        ],
    )
});

static GO_RULES: Lazy<LanguageRules> = Lazy::new(|| {
    rules(
        &[
            r"func\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)",
            r"type\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"(?:var|const)\s+([A-Za-z_][A-Za-z0-9_]*)",
        ],
        &[r#"import\s+"([^"]+)""#],
        &[
            "func", "type", "struct", "interface", "goroutine", "channel", "defer", "package",
            "import", "range",
        ],
    )
});

static GENERIC_RULES: Lazy<LanguageRules> = Lazy::new(|| {
    rules(
        &[
            r"(?:function|def|fn|func)\s+([A-Za-z_][A-Za-z0-9_]*)",
            r"class\s+([A-Za-z_][A-Za-z0-9_]*)",
        ],
        &[],
        &[
            "function", "class", "return", "import", "export", "error", "config", "module",
        ],
    )
});

/// File type (lowercased extension) for a filename
pub fn file_type_of(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename)
        .unwrap_or("txt")
        .to_lowercase()
}

fn rules_for(file_type: &str) -> &'static LanguageRules {
    match file_type {
        "rs" => &RUST_RULES,
        "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => &JAVASCRIPT_RULES,
        "py" => &PYTHON_RULES,
        "go" => &GO_RULES,
        _ => &GENERIC_RULES,
    }
}

/// Extract identifiers, import targets and keyword hits from chunk text
pub fn extract(file_type: &str, content: &str) -> ExtractedMetadata {
    let rules = rules_for(file_type);
    let mut extracted = ExtractedMetadata::default();

    for pattern in &rules.identifier_patterns {
        for capture in pattern.captures_iter(content) {
            if let Some(name) = capture.get(1) {
                extracted.identifiers.insert(name.as_str().to_string());
            }
        }
    }

    for pattern in &rules.import_patterns {
        for capture in pattern.captures_iter(content) {
            if let Some(target) = capture.get(1) {
                extracted.identifiers.insert(target.as_str().to_string());
            }
        }
    }

    for keyword in rules.keywords {
        if content.contains(keyword) {
            extracted.keywords.insert((*keyword).to_string());
        }
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_of() {
        assert_eq!(file_type_of("src/main.rs"), "rs");
        assert_eq!(file_type_of("App.TSX"), "tsx");
        assert_eq!(file_type_of("Makefile"), "txt");
    }

    #[test]
    fn test_rust_extraction() {
        let content = "use std::collections::HashMap;\n\npub fn retry_request(x: u32) {}\npub struct RetryPolicy;";
        let extracted = extract("rs", content);

        assert!(extracted.identifiers.contains("retry_request"));
        assert!(extracted.identifiers.contains("RetryPolicy"));
        assert!(extracted.identifiers.contains("std::collections::HashMap"));
        assert!(extracted.keywords.contains("fn"));
        assert!(extracted.keywords.contains("struct"));
    }

    #[test]
    fn test_javascript_extraction() {
        let content = "import { api } from './client';\nexport function retryRequest() {}\nclass HttpClient {}";
        let extracted = extract("js", content);

        assert!(extracted.identifiers.contains("retryRequest"));
        assert!(extracted.identifiers.contains("HttpClient"));
        assert!(extracted.identifiers.contains("./client"));
    }

    #[test]
    fn test_python_extraction() {
        let content = "from os import path\n\ndef load_config():\n    pass\n\nclass Loader:\n    pass";
        let extracted = extract("py", content);

        assert!(extracted.identifiers.contains("load_config"));
        assert!(extracted.identifiers.contains("Loader"));
        assert!(extracted.identifiers.contains("os"));
    }

    #[test]
    fn test_unknown_type_uses_generic_rules() {
        let content = "function setup() {}\nclass Widget {}";
        let extracted = extract("xyz", content);

        assert!(extracted.identifiers.contains("setup"));
        assert!(extracted.identifiers.contains("Widget"));
    }

    #[test]
    fn test_plain_text_yields_empty_metadata() {
        let extracted = extract("txt", "just some prose with no declarations");
        assert!(extracted.identifiers.is_empty());
    }
}
