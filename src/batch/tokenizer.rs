use crate::error::CommandError;

/// Result of splitting one input line into words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tokenized {
    Blank,
    Comment,
    Words(Vec<String>),
}

/// Split a line using POSIX shell quoting rules.
///
/// Single and double quotes group words and are stripped from the output,
/// backslash escapes the next character. No variable or glob expansion is
/// performed. A `#` at the start of a word ends the line.
pub fn tokenize(line_number: usize, text: &str) -> Result<Tokenized, CommandError> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Ok(Tokenized::Blank);
    }
    if trimmed.starts_with('#') {
        return Ok(Tokenized::Comment);
    }

    let words = shlex::split(trimmed).ok_or_else(|| CommandError::Tokenize {
        line: line_number,
        message: describe_malformed(trimmed).to_string(),
    })?;

    if words.is_empty() {
        Ok(Tokenized::Blank)
    } else {
        Ok(Tokenized::Words(words))
    }
}

fn describe_malformed(text: &str) -> &'static str {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (None, '\'' | '"') => quote = Some(ch),
            _ => {}
        }
    }

    match quote {
        Some('\'') => "unterminated single quote",
        Some(_) => "unterminated double quote",
        None if escaped => "trailing backslash",
        None => "malformed quoting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn words(text: &str) -> Vec<String> {
        match tokenize(1, text).unwrap() {
            Tokenized::Words(words) => words,
            other => panic!("expected words, got {:?}", other),
        }
    }

    #[test]
    fn test_quoted_argument_stays_one_token() {
        assert_eq!(
            words(r#"clone "My VM" --name=foo"#),
            vec!["clone", "My VM", "--name=foo"]
        );
    }

    #[rstest]
    #[case(r"info --vm 'lab vm 01'", &["info", "--vm", "lab vm 01"])]
    #[case(r"info --vm lab\ vm", &["info", "--vm", "lab vm"])]
    #[case(r#"snapshot --description "say \"hi\"""#, &["snapshot", "--description", "say \"hi\""])]
    #[case("  upload\t--image  disk.vmdk  ", &["upload", "--image", "disk.vmdk"])]
    #[case("mkpod --name p1 # trailing note", &["mkpod", "--name", "p1"])]
    #[case("info --vm $HOME*", &["info", "--vm", "$HOME*"])]
    fn test_shell_word_splitting(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(words(line), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t \t")]
    fn test_blank_lines(#[case] line: &str) {
        assert_eq!(tokenize(3, line).unwrap(), Tokenized::Blank);
    }

    #[rstest]
    #[case("# a comment")]
    #[case("   #indented comment with 'open quote")]
    #[case("#")]
    fn test_comment_lines(#[case] line: &str) {
        assert_eq!(tokenize(3, line).unwrap(), Tokenized::Comment);
    }

    #[rstest]
    #[case(r#"clone --name "unterminated"#, "unterminated double quote")]
    #[case("clone --name 'oops", "unterminated single quote")]
    #[case(r"clone --name oops\", "trailing backslash")]
    fn test_malformed_quoting_reports_line(#[case] line: &str, #[case] reason: &str) {
        match tokenize(7, line) {
            Err(CommandError::Tokenize { line, message }) => {
                assert_eq!(line, 7);
                assert_eq!(message, reason);
            }
            other => panic!("expected tokenize error, got {:?}", other),
        }
    }
}
