//! Script parser
//!
//! Turns script text into a [`TestCase`]. The format is line oriented and
//! every line is classified by its prefix:
//! - `$$ arg` declares an invocation argument
//! - `# text` is a comment; it labels the step whose input follows it
//! - `> text` sends `text` plus a newline to stdin
//! - `<e` marks the current step's expectation as a stderr expectation
//! - `<r`, `<l` are reserved and rejected
//! - any other non-empty line is expected output; consecutive lines accumulate
//!   into one expectation

use thiserror::Error;
use tracing::debug;

use crate::script::{Interaction, TestCase};

const INPUT_PREFIX: &str = "> ";
const ARG_PREFIX: &str = "$$ ";
const ERROR_PREFIX: &str = "<e";
const COMMENT_PREFIX: &str = "#";
const RESERVED_PREFIXES: &[&str] = &["<r", "<l"];

/// Parse error returned when a script cannot be turned into a test case
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A reserved directive that has no implementation yet
    #[error("line {line}: unsupported directive '{directive}'")]
    UnsupportedDirective { directive: String, line: usize },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnsupportedDirective { line, .. } => *line,
        }
    }
}

/// Parse a whole script.
///
/// `name` is recorded on the resulting [`TestCase`] for reporting.
pub fn parse(script: &str, name: &str) -> Result<TestCase, ParseError> {
    let mut case = TestCase::new(name);

    for (i, raw) in script.split('\n').enumerate() {
        let line_number = i + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(INPUT_PREFIX) {
            let input = format!("{}\n", rest);
            match case.interactions.last_mut() {
                Some(last) if last.is_comment_only() => last.input = Some(input),
                _ => case.interactions.push(Interaction::input(input)),
            }
        } else if line.starts_with(ERROR_PREFIX) {
            match case.interactions.last_mut() {
                Some(last) => last.error = true,
                None => case.interactions.push(Interaction { error: true, ..Default::default() }),
            }
        } else if let Some(rest) = line.strip_prefix(COMMENT_PREFIX) {
            case.interactions.push(Interaction::comment(rest.trim()));
        } else if let Some(rest) = line.strip_prefix(ARG_PREFIX) {
            case.args.push(rest.to_string());
        } else if let Some(directive) = RESERVED_PREFIXES.iter().find(|p| line.starts_with(**p)) {
            return Err(ParseError::UnsupportedDirective {
                directive: directive.to_string(),
                line: line_number,
            });
        } else {
            push_output(&mut case, line);
        }
    }

    finalize(&mut case);
    Ok(case)
}

/// Append an expected output line to the current step.
fn push_output(case: &mut TestCase, line: &str) {
    match case.interactions.last_mut() {
        None => case.interactions.push(Interaction::output(format!("{}\n", line))),
        Some(last) => {
            let output = last.output.get_or_insert_with(String::new);
            output.push_str(line);
            output.push('\n');
        }
    }
}

/// Drop unmerged comment placeholders and mark the final step.
fn finalize(case: &mut TestCase) {
    case.interactions.retain(|interaction| {
        if interaction.is_comment_only() {
            debug!(comment = interaction.comment.as_deref(), "dropping comment with no step");
            false
        } else {
            true
        }
    });

    if let Some(last) = case.interactions.last_mut() {
        last.exit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(script: &str) -> TestCase {
        parse(script, "test.lunit").unwrap()
    }

    #[test]
    fn test_parse_empty_script() {
        let case = parse_ok("");
        assert_eq!(case.name, "test.lunit");
        assert!(case.args.is_empty());
        assert!(case.interactions.is_empty());
    }

    #[test]
    fn test_parse_args_in_order() {
        let case = parse_ok("$$ --first\n$$ two words\n$$ -x\n> go\n");
        assert_eq!(case.args, vec!["--first", "two words", "-x"]);
    }

    #[test]
    fn test_parse_no_args() {
        let case = parse_ok("> a\nb\n");
        assert!(case.args.is_empty());
    }

    #[test]
    fn test_parse_comment_merges_with_input() {
        let case = parse_ok("# note\n> hello\n");
        assert_eq!(case.interactions.len(), 1);
        let step = &case.interactions[0];
        assert_eq!(step.comment.as_deref(), Some("note"));
        assert_eq!(step.input.as_deref(), Some("hello\n"));
        assert!(step.exit);
    }

    #[test]
    fn test_parse_input_without_comment_is_new_step() {
        let case = parse_ok("> one\n> two\n");
        assert_eq!(case.interactions.len(), 2);
        assert_eq!(case.interactions[0].input.as_deref(), Some("one\n"));
        assert_eq!(case.interactions[1].input.as_deref(), Some("two\n"));
    }

    #[test]
    fn test_parse_multiline_output_accumulates() {
        let case = parse_ok("> x\nfoo\nbar\n");
        assert_eq!(case.interactions.len(), 1);
        assert_eq!(case.interactions[0].output.as_deref(), Some("foo\nbar\n"));
    }

    #[test]
    fn test_parse_output_before_any_input() {
        let case = parse_ok("Welcome\n> name\nHello name\n");
        assert_eq!(case.interactions.len(), 2);
        assert_eq!(case.interactions[0].output.as_deref(), Some("Welcome\n"));
        assert!(case.interactions[0].input.is_none());
        assert_eq!(case.interactions[1].input.as_deref(), Some("name\n"));
        assert_eq!(case.interactions[1].output.as_deref(), Some("Hello name\n"));
    }

    #[test]
    fn test_parse_error_marks_same_step() {
        let case = parse_ok("> bad\n<e\nerror: bad input\n");
        assert_eq!(case.interactions.len(), 1);
        let step = &case.interactions[0];
        assert!(step.error);
        assert_eq!(step.output.as_deref(), Some("error: bad input\n"));
    }

    #[test]
    fn test_parse_error_first_line_creates_step() {
        let case = parse_ok("<e\n");
        assert_eq!(case.interactions.len(), 1);
        assert!(case.interactions[0].error);
        assert!(case.interactions[0].exit);
    }

    #[test]
    fn test_parse_only_last_step_exits() {
        let case = parse_ok("> a\nA\n> b\nB\n> c\nC\n");
        let exits: Vec<bool> = case.interactions.iter().map(|i| i.exit).collect();
        assert_eq!(exits, vec![false, false, true]);
    }

    #[test]
    fn test_parse_blank_lines_are_skipped() {
        let case = parse_ok("\n> a\n\nA\n\n");
        assert_eq!(case.interactions.len(), 1);
        assert_eq!(case.interactions[0].output.as_deref(), Some("A\n"));
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let case = parse_ok("$$ arg\r\n> hi\r\nhi\r\n");
        assert_eq!(case.args, vec!["arg"]);
        assert_eq!(case.interactions[0].input.as_deref(), Some("hi\n"));
        assert_eq!(case.interactions[0].output.as_deref(), Some("hi\n"));
    }

    #[test]
    fn test_parse_comment_text_is_trimmed() {
        let case = parse_ok("#   spaced out   \n> go\n");
        assert_eq!(case.interactions[0].comment.as_deref(), Some("spaced out"));
    }

    #[test]
    fn test_parse_dangling_comments_are_dropped() {
        let case = parse_ok("# first\n# second\n> go\n# trailing\n");
        assert_eq!(case.interactions.len(), 1);
        let step = &case.interactions[0];
        assert_eq!(step.comment.as_deref(), Some("second"));
        assert_eq!(step.input.as_deref(), Some("go\n"));
        assert!(step.exit);
        assert!(case.interactions.iter().all(|i| !i.is_comment_only()));
    }

    #[test]
    fn test_parse_output_after_comment_binds_to_comment() {
        // The comment is no longer a bare placeholder, so the input starts a new step.
        let case = parse_ok("# banner\nWelcome\n> go\n");
        assert_eq!(case.interactions.len(), 2);
        assert_eq!(case.interactions[0].output.as_deref(), Some("Welcome\n"));
        assert_eq!(case.interactions[1].input.as_deref(), Some("go\n"));
    }

    #[test]
    fn test_parse_input_marker_needs_space() {
        let case = parse_ok("> x\n>no-space\n");
        assert_eq!(case.interactions.len(), 1);
        assert_eq!(case.interactions[0].output.as_deref(), Some(">no-space\n"));
    }

    #[test]
    fn test_parse_reserved_directives_fail() {
        let err = parse("> a\n<r something\n", "t").unwrap_err();
        assert_eq!(err, ParseError::UnsupportedDirective { directive: "<r".into(), line: 2 });
        assert!(err.to_string().contains("unsupported directive"));

        let err = parse("<l\n", "t").unwrap_err();
        assert_eq!(err.line(), 1);
    }
}
