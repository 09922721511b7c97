use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use strata_parser::parser::recursion::MAX_RECURSION_EXPR;
use strata_parser::parser::MAX_EXPRESSION_LENGTH;
use strata_parser::ParseOptions;

/// Settings for checking and compiling expressions.
///
/// Every key is optional:
///
/// ```toml
/// max_expression_length = 50000
/// recursion_limit = 1600
///
/// [hints]
/// similarity_threshold = 0.8
/// max_suggestions = 3
///
/// [codegen]
/// null_safe_equality = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// The longest expression text accepted, in bytes
    pub max_expression_length: usize,
    /// The deepest nesting of sub-expressions accepted
    pub recursion_limit: usize,
    pub hints: HintConfig,
    pub codegen: CodegenConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_expression_length: MAX_EXPRESSION_LENGTH,
            recursion_limit: MAX_RECURSION_EXPR,
            hints: HintConfig::default(),
            codegen: CodegenConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid compiler configuration")
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_length: self.max_expression_length,
            recursion_limit: self.recursion_limit,
        }
    }
}

/// "Did you mean" suggestions for unknown identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HintConfig {
    /// Minimum Jaro-Winkler similarity, between 0 and 1
    pub similarity_threshold: f64,
    pub max_suggestions: usize,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_suggestions: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodegenConfig {
    /// Compare against boolean literals with `IS [NOT] DISTINCT FROM`, so that `NULL` compares unequal
    pub null_safe_equality: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            null_safe_equality: true,
        }
    }
}
