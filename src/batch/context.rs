/// Default tokens applied in front of every invocation in a batch run.
///
/// An `ARGS` directive swaps the whole set; nothing accumulates across
/// directives.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArgumentContext {
    defaults: Vec<String>,
}

impl ArgumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_defaults(&mut self, tokens: Vec<String>) {
        self.defaults = tokens;
    }

    pub fn current_defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Defaults first, then the line's own tokens, so a later flag wins
    /// when the handler parses them.
    pub fn merge(&self, line_tokens: &[String]) -> Vec<String> {
        let mut merged = Vec::with_capacity(self.defaults.len() + line_tokens.len());
        merged.extend_from_slice(&self.defaults);
        merged.extend_from_slice(line_tokens);
        merged
    }
}
