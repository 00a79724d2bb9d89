//! Expansion templates (`%{VARIABLE}` / `%{COLLECTION.key}`).

use crate::error::{Error, Result};
use crate::variables::{TransactionVariables, VariableKind};

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Lookup { kind: VariableKind, key: String },
}

/// A compiled expansion template.
///
/// Templates mix literal text with `%{...}` lookups. Variable names are
/// case-insensitive; a lookup that resolves to nothing expands to the
/// empty string. Compilation fails on an unterminated `%{` or an unknown
/// variable name.
#[derive(Debug, Clone)]
pub struct Macro {
    raw: String,
    tokens: Vec<Token>,
}

impl Macro {
    /// Compile a template.
    pub fn compile(input: &str) -> Result<Macro> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(start) = rest.find("%{") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(Error::MacroSyntax {
                    template: input.to_string(),
                    message: "unterminated %{".to_string(),
                });
            };
            let body = &after[..end];
            if body.is_empty() {
                return Err(Error::MacroSyntax {
                    template: input.to_string(),
                    message: "empty expansion".to_string(),
                });
            }
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            let (name, key) = match body.split_once('.') {
                Some((name, key)) => (name, key),
                None => (body, ""),
            };
            let kind = VariableKind::parse(name)?;
            tokens.push(Token::Lookup {
                kind,
                key: key.to_string(),
            });
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Macro {
            raw: input.to_string(),
            tokens,
        })
    }

    /// Expand against transaction variables.
    pub fn expand(&self, variables: &TransactionVariables) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Lookup { kind, key } => out.push_str(&variables.first_value(*kind, key)),
            }
        }
        out
    }

    /// The original template text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the template contains any lookups.
    pub fn is_dynamic(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Lookup { .. }))
    }
}

impl std::fmt::Display for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
