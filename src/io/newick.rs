//! Lexical clean-up of Newick text before it is handed to the tree parser.
//!
//! The pass validates parentheses and branch-length tokens, drops whitespace
//! and `[...]` comments, moves comment-encoded support values into the label
//! slot of the clade they follow, and swaps quoted labels for placeholders so
//! punctuation inside quotes cannot confuse the parser.

use crate::error::ParseError;

const QUOTED_PREFIX: &str = "phylodashquoted";
const QUOTED_SUFFIX: &str = "q";
const SUPPORT_KEYS: [&str; 5] = ["support", "bootstrap", "posterior", "confidence", "prob"];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalisedNewick {
    pub text: String,
    quoted: Vec<String>,
}

impl NormalisedNewick {
    pub fn is_single_node(&self) -> bool {
        !self.text.contains('(')
    }

    /// Map a parser label back to the original text if it was quoted.
    pub fn restore_label(&self, label: &str) -> String {
        label
            .strip_prefix(QUOTED_PREFIX)
            .and_then(|rest| rest.strip_suffix(QUOTED_SUFFIX))
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| self.quoted.get(index))
            .cloned()
            .unwrap_or_else(|| label.to_owned())
    }
}

/// State for the label/length/comment tail that follows a `)`.
struct CladeTail {
    insert_at: usize,
    labelled: bool,
    support: Option<f64>,
}

struct Lexer {
    out: String,
    quoted: Vec<String>,
    depth: usize,
    length: Option<(usize, String)>,
    tail: Option<CladeTail>,
}

impl Lexer {
    fn finish_length(&mut self) -> Result<(), ParseError> {
        let Some((offset, token)) = self.length.take() else {
            return Ok(());
        };
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                self.out.push(':');
                self.out.push_str(&token);
                Ok(())
            }
            _ => Err(ParseError::InvalidBranchLength { token, offset }),
        }
    }

    fn finish_tail(&mut self) {
        if let Some(tail) = self.tail.take() {
            if let (false, Some(support)) = (tail.labelled, tail.support) {
                self.out.insert_str(tail.insert_at, &support.to_string());
            }
        }
    }

    fn push_label_text(&mut self, text: &str) {
        self.out.push_str(text);
        if let Some(tail) = self.tail.as_mut() {
            tail.labelled = true;
        }
    }
}

pub fn normalise(raw: &str) -> Result<NormalisedNewick, ParseError> {
    let mut lexer = Lexer {
        out: String::with_capacity(raw.len()),
        quoted: Vec::new(),
        depth: 0,
        length: None,
        tail: None,
    };

    let mut chars = raw.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                let mut label = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    if next == c {
                        // Doubled quote is an escaped quote character.
                        if chars.peek().map(|(_, after)| *after) == Some(c) {
                            chars.next();
                            label.push(c);
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    label.push(next);
                }
                if !closed {
                    return Err(ParseError::Unterminated {
                        what: "quoted label",
                        offset,
                    });
                }
                if lexer.length.is_some() {
                    return Err(ParseError::InvalidBranchLength {
                        token: label,
                        offset,
                    });
                }
                let placeholder = format!("{QUOTED_PREFIX}{}{QUOTED_SUFFIX}", lexer.quoted.len());
                lexer.quoted.push(label);
                lexer.push_label_text(&placeholder);
            }
            '[' => {
                let mut comment = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    comment.push(next);
                }
                if !closed {
                    return Err(ParseError::Unterminated {
                        what: "comment",
                        offset,
                    });
                }
                if let (Some(tail), Some(support)) = (lexer.tail.as_mut(), support_from_comment(&comment)) {
                    tail.support = Some(support);
                }
            }
            '(' => {
                lexer.finish_length()?;
                lexer.finish_tail();
                lexer.depth += 1;
                lexer.out.push('(');
            }
            ')' => {
                lexer.finish_length()?;
                lexer.finish_tail();
                if lexer.depth == 0 {
                    return Err(ParseError::Unbalanced {
                        message: format!("unexpected `)` at byte {offset}"),
                    });
                }
                lexer.depth -= 1;
                lexer.out.push(')');
                lexer.tail = Some(CladeTail {
                    insert_at: lexer.out.len(),
                    labelled: false,
                    support: None,
                });
            }
            ',' => {
                lexer.finish_length()?;
                lexer.finish_tail();
                lexer.out.push(',');
            }
            ':' => match lexer.length.as_mut() {
                Some((_, token)) => token.push(':'),
                None => lexer.length = Some((offset, String::new())),
            },
            ';' => break,
            c if c.is_whitespace() => {}
            c => match lexer.length.as_mut() {
                Some((_, token)) => token.push(c),
                None => {
                    let mut buffer = [0u8; 4];
                    lexer.push_label_text(c.encode_utf8(&mut buffer));
                }
            },
        }
    }

    lexer.finish_length()?;
    lexer.finish_tail();

    if lexer.depth > 0 {
        return Err(ParseError::Unbalanced {
            message: format!("{} unclosed `(`", lexer.depth),
        });
    }
    if lexer.out.is_empty() {
        return Err(ParseError::Empty);
    }

    lexer.out.push(';');
    Ok(NormalisedNewick {
        text: lexer.out,
        quoted: lexer.quoted,
    })
}

/// Support value from `[95]` or `[&posterior=0.99,...]` style comments.
fn support_from_comment(comment: &str) -> Option<f64> {
    let comment = comment.trim();
    if let Ok(value) = comment.parse::<f64>() {
        return Some(value);
    }

    comment
        .strip_prefix('&')?
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| {
            let key = key.trim().to_ascii_lowercase();
            SUPPORT_KEYS.contains(&key.as_str())
        })
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_and_comments() {
        let normalised = normalise(" ( A : 0.1 ,\n B[&rate=1] : 0.2 ) ; trailing").unwrap();
        assert_eq!(normalised.text, "(A:0.1,B:0.2);");
    }

    #[test]
    fn moves_comment_support_into_label_slot() {
        let normalised = normalise("((A,B)[&bootstrap=87]:0.5,C);").unwrap();
        assert_eq!(normalised.text, "((A,B)87:0.5,C);");

        let labelled = normalise("((A,B)inner[90]:0.5,C);").unwrap();
        assert_eq!(labelled.text, "((A,B)inner:0.5,C);");
    }

    #[test]
    fn quoted_labels_use_placeholders() {
        let normalised = normalise("('it''s here':1,B);").unwrap();
        assert!(normalised.text.starts_with(&format!("({QUOTED_PREFIX}0{QUOTED_SUFFIX}:1")));
        assert_eq!(
            normalised.restore_label(&format!("{QUOTED_PREFIX}0{QUOTED_SUFFIX}")),
            "it's here"
        );
        assert_eq!(normalised.restore_label("B"), "B");
    }

    #[test]
    fn reports_unterminated_constructs() {
        assert!(matches!(
            normalise("(A,B)[oops;"),
            Err(ParseError::Unterminated { what: "comment", .. })
        ));
        assert!(matches!(
            normalise("('A,B);"),
            Err(ParseError::Unterminated { what: "quoted label", .. })
        ));
    }

    #[test]
    fn rejects_empty_and_nan_lengths() {
        assert!(matches!(
            normalise("(A:,B);"),
            Err(ParseError::InvalidBranchLength { .. })
        ));
        assert!(matches!(
            normalise("(A:NaN,B);"),
            Err(ParseError::InvalidBranchLength { .. })
        ));
    }

    #[test]
    fn support_comment_forms() {
        assert_eq!(support_from_comment("95"), Some(95.0));
        assert_eq!(support_from_comment("&posterior=0.9,height=2"), Some(0.9));
        assert_eq!(support_from_comment("&height=2"), None);
        assert_eq!(support_from_comment("note"), None);
    }
}
