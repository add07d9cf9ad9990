/// Settings shared by the parser and the SQL compiler. Everything has a
///  working default, so `Config::default()` is the usual starting point.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Config {
    pub parser: ParserConfig,
    pub compile: CompileConfig,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ParserConfig {
    /// Nesting limit for parentheses, operators and lambdas. Inputs nested
    ///  deeper are rejected rather than risking the stack.
    pub max_depth: usize,
    /// Aliases defined by `$compute`. Identifiers matching one of these parse
    ///  as computed properties.
    pub computed: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            computed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CompileConfig {
    pub placeholder: Placeholder,
}

/// How bound parameters are spelled in generated SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Placeholder {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Numbered,
    /// `@p1`, `@p2`, ...
    Named,
}

impl Placeholder {
    /// Placeholder text for the parameter at one-based [index].
    pub fn render(self, index: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Numbered => format!("${index}"),
            Self::Named => format!("@p{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders() {
        assert_eq!(Placeholder::Question.render(3), "?");
        assert_eq!(Placeholder::Numbered.render(3), "$3");
        assert_eq!(Placeholder::Named.render(3), "@p3");
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.parser.max_depth, 100);
        assert_eq!(config.compile.placeholder, Placeholder::Question);
    }
}
