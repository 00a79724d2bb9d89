//! SQL injection detection.
//!
//! The input is tokenized into a stream of single-character token kinds and
//! the first five kinds form a fingerprint. A fingerprint found in the known
//! attack set, or a token stream with an injected structure (quote break
//! followed by a comment, stacked statement, UNION append, tautology, timing
//! function), is reported as an injection.
//!
//! Because the scanner cannot know whether the value will land inside a
//! quoted SQL string, inputs containing a quote are re-examined with a
//! synthetic leading quote so the text before the first quote folds into a
//! string token, the way it would inside the target query.

use phf::phf_set;

/// Maximum number of tokens examined per candidate.
const TOKEN_LIMIT: usize = 24;

/// Number of token kinds that make up a fingerprint.
const FINGERPRINT_LEN: usize = 5;

static LOGIC_WORDS: phf::Set<&'static str> = phf_set! {
    "AND", "OR", "XOR", "NOT",
};

static KEYWORDS: phf::Set<&'static str> = phf_set! {
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER",
    "CREATE", "GRANT", "REVOKE", "UNION", "ALL", "DISTINCT", "FROM",
    "WHERE", "HAVING", "GROUP", "ORDER", "BY", "LIMIT", "OFFSET", "INTO",
    "VALUES", "TABLE", "DATABASE", "EXEC", "EXECUTE", "DECLARE", "CAST",
    "CONVERT", "WAITFOR", "DELAY", "CASE", "WHEN", "THEN", "ELSE", "END",
    "NULL", "LIKE", "BETWEEN", "IN", "EXISTS", "IS", "AS", "JOIN",
    "INNER", "OUTER", "LEFT", "RIGHT", "ON", "SHUTDOWN",
};

static FUNCTIONS: phf::Set<&'static str> = phf_set! {
    "SLEEP", "BENCHMARK", "PG_SLEEP", "LOAD_FILE", "EXTRACTVALUE",
    "UPDATEXML", "CONCAT", "GROUP_CONCAT", "CHAR", "CHR", "ASCII",
    "SUBSTRING", "SUBSTR", "MID", "VERSION", "USER", "CURRENT_USER",
    "SYSTEM_USER", "SESSION_USER", "MD5", "SHA1", "HEX", "UNHEX",
    "FLOOR", "RAND", "COUNT", "MIN", "MAX", "AVG", "SUM", "IF",
    "IFNULL", "COALESCE", "NULLIF",
};

/// Functions whose presence alone marks a probe, quoted context or not.
static TIMING_FUNCTIONS: phf::Set<&'static str> = phf_set! {
    "SLEEP", "BENCHMARK", "PG_SLEEP", "LOAD_FILE", "EXTRACTVALUE",
    "UPDATEXML",
};

/// Statement keywords that are dangerous right after a statement separator.
static STACKED_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER",
    "CREATE", "GRANT", "REVOKE", "EXEC", "EXECUTE", "DECLARE", "SHUTDOWN",
    "WAITFOR",
};

/// Fingerprints of known injection shapes.
///
/// Kinds: `s` string, `1` number, `n` bareword, `v` variable, `k` keyword,
/// `f` function, `&` logical connective, `o` operator, `c` comment,
/// `(` `)` `;` themselves.
static FINGERPRINTS: phf::Set<&'static str> = phf_set! {
    // quote break, connective, comparison
    "s&sos", "s&so1", "s&son", "s&1o1", "s&1os", "s&nos", "s&no1",
    "s&sc", "s&1c", "s&nc", "s&s", "s&1", "s&n", "s&f(",
    // quote break straight into comment or operator
    "sc", "sos", "so1", "s;c", "s;k", "so1c", "soso",
    // numeric context
    "1&1o1", "1&1os", "1&so1", "1&sos", "1&1c", "1&sc", "1&1", "1&s",
    "1c", "1;c", "1os&", "1o1&",
    // bare connective payloads appended to a scalar
    "&1o1", "&sos", "&so1", "&nos",
    // variable probes
    "vov", "v&1o1", "v&sos",
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: char,
    text: String,
}

impl Token {
    fn new(kind: char, text: &str) -> Self {
        Token {
            kind,
            text: text.to_string(),
        }
    }
}

fn classify_word(word: &str, next_is_paren: bool) -> char {
    let upper = word.to_ascii_uppercase();
    if LOGIC_WORDS.contains(upper.as_str()) {
        '&'
    } else if next_is_paren && FUNCTIONS.contains(upper.as_str()) {
        'f'
    } else if KEYWORDS.contains(upper.as_str()) {
        'k'
    } else {
        'n'
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() && tokens.len() < TOKEN_LIMIT {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => {
                let quote = b;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                let end = j.min(bytes.len());
                let text = String::from_utf8_lossy(&bytes[start..end]).into_owned();
                tokens.push(Token { kind: 's', text });
                i = if j < bytes.len() { j + 1 } else { j };
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let mut j = i + 2;
                while j < bytes.len() && bytes[j] != b'\n' {
                    j += 1;
                }
                tokens.push(Token::new('c', "--"));
                i = j;
            }
            b'#' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != b'\n' {
                    j += 1;
                }
                tokens.push(Token::new('c', "#"));
                i = j;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let mut j = i + 2;
                while j + 1 < bytes.len() && !(bytes[j] == b'*' && bytes[j + 1] == b'/') {
                    j += 1;
                }
                tokens.push(Token::new('c', "/*"));
                i = if j + 1 < bytes.len() { j + 2 } else { bytes.len() };
            }
            b'0'..=b'9' => {
                let start = i;
                if b == b'0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
                    i += 2;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                } else {
                    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                        i += 1;
                    }
                }
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                tokens.push(Token { kind: '1', text });
            }
            b'@' => {
                let start = i;
                i += 1;
                if bytes.get(i) == Some(&b'@') {
                    i += 1;
                }
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                tokens.push(Token { kind: 'v', text });
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                let mut k = i;
                while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                    k += 1;
                }
                let next_is_paren = bytes.get(k) == Some(&b'(');
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                let kind = classify_word(&text, next_is_paren);
                tokens.push(Token { kind, text });
            }
            b'(' => {
                tokens.push(Token::new('(', "("));
                i += 1;
            }
            b')' => {
                tokens.push(Token::new(')', ")"));
                i += 1;
            }
            b';' => {
                tokens.push(Token::new(';', ";"));
                i += 1;
            }
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::new('&', "||"));
                i += 2;
            }
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::new('&', "&&"));
                i += 2;
            }
            b'=' | b'<' | b'>' | b'!' | b'+' | b'-' | b'*' | b'/' | b'%' | b'|' | b'&' | b'^'
            | b'~' | b',' | b':' => {
                let start = i;
                i += 1;
                while i < bytes.len() && matches!(bytes[i], b'=' | b'<' | b'>') && i - start < 2 {
                    i += 1;
                }
                let text = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                tokens.push(Token { kind: 'o', text });
            }
            _ => {
                i += 1;
            }
        }
    }
    tokens
}

fn fingerprint_of(tokens: &[Token]) -> String {
    tokens.iter().take(FINGERPRINT_LEN).map(|t| t.kind).collect()
}

/// Structural checks that do not depend on the exact fingerprint shape.
fn structural_hit(tokens: &[Token]) -> bool {
    for pair in tokens.windows(2) {
        let upper = pair[1].text.to_ascii_uppercase();
        // UNION immediately followed by another keyword appends a query
        if pair[0].kind == 'k'
            && pair[0].text.eq_ignore_ascii_case("union")
            && matches!(pair[1].kind, 'k' | 'f' | '(')
        {
            return true;
        }
        // statement separator starting a fresh dangerous statement
        if pair[0].kind == ';'
            && matches!(pair[1].kind, 'k' | 'f')
            && STACKED_KEYWORDS.contains(upper.as_str())
        {
            return true;
        }
    }
    for win in tokens.windows(3) {
        // tautology: the same literal compared to itself with '='
        if win[1].kind == 'o'
            && win[1].text == "="
            && win[0].kind == win[2].kind
            && matches!(win[0].kind, '1' | 's')
            && !win[0].text.is_empty()
            && win[0].text == win[2].text
        {
            return true;
        }
    }
    tokens.iter().any(|t| {
        (t.kind == 'f' && TIMING_FUNCTIONS.contains(t.text.to_ascii_uppercase().as_str()))
            || (t.kind == 'k' && t.text.eq_ignore_ascii_case("waitfor"))
    })
}

fn candidates(input: &str) -> Vec<String> {
    let mut list = vec![input.to_string()];
    if input.contains('\'') {
        list.push(format!("'{input}"));
    }
    if input.contains('"') {
        list.push(format!("\"{input}"));
    }
    list
}

/// Returns the fingerprint of the first candidate parse that looks injected.
pub fn sqli_fingerprint(input: &str) -> Option<String> {
    if input.len() < 3 {
        return None;
    }
    for candidate in candidates(input) {
        let tokens = tokenize(&candidate);
        if tokens.is_empty() {
            continue;
        }
        let fingerprint = fingerprint_of(&tokens);
        if FINGERPRINTS.contains(fingerprint.as_str()) || structural_hit(&tokens) {
            return Some(fingerprint);
        }
    }
    None
}

/// Convenience wrapper around [`sqli_fingerprint`].
pub fn is_sqli(input: &str) -> bool {
    sqli_fingerprint(input).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_tautology() {
        assert_eq!(sqli_fingerprint("1' OR '1'='1").as_deref(), Some("s&sos"));
        assert_eq!(sqli_fingerprint("' OR 1=1--").as_deref(), Some("s&1o1"));
        assert!(is_sqli("' OR 'a'='a"));
    }

    #[test]
    fn comment_truncation() {
        assert_eq!(sqli_fingerprint("admin'--").as_deref(), Some("sc"));
        assert!(is_sqli("admin' #"));
    }

    #[test]
    fn union_append() {
        assert!(is_sqli("1 UNION SELECT username, password FROM users"));
        assert!(is_sqli("' UNION ALL SELECT NULL--"));
    }

    #[test]
    fn stacked_statement() {
        assert!(is_sqli("1; DROP TABLE users"));
        assert!(is_sqli("'; DELETE FROM logs--"));
    }

    #[test]
    fn timing_probe() {
        assert!(is_sqli("1 AND SLEEP(5)"));
        assert!(is_sqli("benchmark(1000000,MD5('x'))"));
        assert!(is_sqli("1); WAITFOR DELAY '0:0:5'--"));
    }

    #[test]
    fn numeric_tautology() {
        assert!(is_sqli("1 OR 1=1"));
        assert!(!is_sqli("2=3"));
    }

    #[test]
    fn benign_text_passes() {
        assert!(!is_sqli("hello world"));
        assert!(!is_sqli("John O'Brien"));
        assert!(!is_sqli("1 or more items"));
        assert!(!is_sqli("price=10"));
        assert!(!is_sqli("select a seat"));
        assert!(!is_sqli("5-3"));
    }

    #[test]
    fn tokenizer_shapes() {
        let tokens = tokenize("'' OR 1=1--");
        let kinds: String = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, "s&1o1c");
        let tokens = tokenize("union select 0x1f");
        let kinds: String = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, "kk1");
    }
}
