//! Command-line tokenization.
//!
//! A command line is split on whitespace; single- or double-quoted
//! runs keep their inner whitespace and drop the quotes. There is no
//! escape syntax inside quotes — a quote of the other kind passes
//! through literally. An unterminated quote consumes the rest of the
//! line.

/// Splits a command line into argument tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut token = String::new();
            for c in chars.by_ref() {
                if c == quote {
                    break;
                }
                token.push(c);
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }

    tokens
}

/// Joins tokens back into a single command line so the result
/// re-tokenizes to the same vector. Tokens with whitespace, quotes, or
/// no content get wrapped in whichever quote kind they don't contain.
/// Used when appending commands to the log.
pub fn join_tokens(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| {
            let needs_quoting = t.is_empty()
                || t.chars()
                    .any(|c| c.is_whitespace() || c == '"' || c == '\'');
            if !needs_quoting {
                t.clone()
            } else if !t.contains('"') {
                format!("\"{t}\"")
            } else {
                format!("'{t}'")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("SET foo bar"), strs(&["SET", "foo", "bar"]));
        assert_eq!(tokenize("  GET   key  "), strs(&["GET", "key"]));
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn double_quotes_keep_spaces() {
        assert_eq!(
            tokenize(r#"SET greeting "hello world""#),
            strs(&["SET", "greeting", "hello world"])
        );
    }

    #[test]
    fn single_quotes_keep_spaces() {
        assert_eq!(
            tokenize("PUBLISH ch 'two words'"),
            strs(&["PUBLISH", "ch", "two words"])
        );
    }

    #[test]
    fn other_quote_kind_passes_through() {
        assert_eq!(
            tokenize(r#"SET k "it's fine""#),
            strs(&["SET", "k", "it's fine"])
        );
    }

    #[test]
    fn unterminated_quote_takes_rest_of_line() {
        assert_eq!(tokenize(r#"SET k "tail end"#), strs(&["SET", "k", "tail end"]));
    }

    #[test]
    fn join_round_trips_through_tokenize() {
        let tokens = strs(&["SET", "k", "two words", "plain"]);
        let line = join_tokens(&tokens);
        assert_eq!(tokenize(&line), tokens);
    }

    #[test]
    fn join_quotes_empty_tokens() {
        let tokens = strs(&["SET", "k", ""]);
        assert_eq!(tokenize(&join_tokens(&tokens)), tokens);
    }

    #[test]
    fn join_picks_quote_kind_the_token_lacks() {
        let tokens = strs(&["JSON.SET", "doc", ".", r#"{"a":1}"#]);
        assert_eq!(tokenize(&join_tokens(&tokens)), tokens);

        let tokens = strs(&["SET", "k", "it's quoted"]);
        assert_eq!(tokenize(&join_tokens(&tokens)), tokens);
    }
}
