//! The `setvar` action: write, adjust or remove a collection entry.

use crate::engine::Transaction;
use crate::error::{Error, Result};
use crate::macros::Macro;
use crate::variables::VariableKind;

/// A parsed `setvar` operand.
///
/// Both the key and the value may contain `%{...}` macros; they are expanded
/// against the transaction every time the action fires. Whether the value is
/// an increment (`+n`), a decrement (`-n`) or a plain assignment is decided
/// after expansion, so `TX.score=+%{tx.weight}` adds the resolved weight.
#[derive(Debug, Clone)]
pub struct SetVar {
    collection: VariableKind,
    key: Macro,
    value: Option<Macro>,
    remove: bool,
}

fn writable(kind: VariableKind) -> bool {
    matches!(kind, VariableKind::Tx | VariableKind::Env)
}

impl SetVar {
    /// Parse operands like `TX.score=+5`, `TX.name=%{MATCHED_VAR}`,
    /// `TX.flag` (set to `1`) or `!TX.flag` (remove).
    pub fn parse(operand: &str) -> Result<SetVar> {
        let (remove, rest) = match operand.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, operand),
        };
        let (target, value) = match rest.split_once('=') {
            Some((target, value)) => (target, Some(value)),
            None => (rest, None),
        };
        let (collection, key) = target.trim().split_once('.').ok_or_else(|| {
            Error::action_argument(
                "setvar",
                format!("expected COLLECTION.key, got {target:?}"),
            )
        })?;
        let kind = VariableKind::parse(collection)?;
        if !writable(kind) {
            return Err(Error::action_argument(
                "setvar",
                format!("collection {} is not writable", kind.name()),
            ));
        }
        if remove && value.is_some() {
            return Err(Error::action_argument(
                "setvar",
                format!("cannot combine ! with a value in {operand:?}"),
            ));
        }
        Ok(SetVar {
            collection: kind,
            key: Macro::compile(key.trim())?,
            value: value.map(|v| Macro::compile(v.trim())).transpose()?,
            remove,
        })
    }

    /// Apply to the transaction. Numeric errors are logged and skipped, never
    /// raised.
    pub(crate) fn apply(&self, tx: &mut Transaction) {
        let key = self.key.expand(tx.variables()).to_ascii_lowercase();
        if key.is_empty() {
            tracing::warn!(setvar = self.key.raw(), "key expanded to nothing, skipping");
            return;
        }
        if self.remove {
            if let Some(map) = tx.variables_mut().map_mut(self.collection) {
                map.remove(&key);
            }
            return;
        }
        let value = match &self.value {
            Some(value) => value.expand(tx.variables()),
            // bare `setvar:TX.flag` raises a flag
            None => "1".to_string(),
        };
        let stripped = value.strip_prefix('+').or_else(|| value.strip_prefix('-'));
        if let Some(amount) = stripped {
            let current = tx
                .variables()
                .map(self.collection)
                .and_then(|m| m.get_first(&key))
                .map(|v| v.to_string());
            let base = match current.as_deref() {
                None | Some("") => 0,
                Some(text) => match text.trim().parse::<i64>() {
                    Ok(n) => n,
                    Err(_) => {
                        tracing::warn!(key = %key, value = %text, "setvar arithmetic on non-numeric value, skipping");
                        return;
                    }
                },
            };
            let delta = match amount.trim().parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    tracing::warn!(key = %key, amount = %amount, "setvar amount is not numeric, skipping");
                    return;
                }
            };
            let next = if value.starts_with('+') {
                base.saturating_add(delta)
            } else {
                base.saturating_sub(delta)
            };
            if let Some(map) = tx.variables_mut().map_mut(self.collection) {
                map.set(&key, &next.to_string());
            }
        } else if let Some(map) = tx.variables_mut().map_mut(self.collection) {
            map.set(&key, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn tx() -> crate::engine::Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    fn tx_get(tx: &crate::engine::Transaction, key: &str) -> Option<String> {
        tx.variables()
            .map(VariableKind::Tx)
            .and_then(|m| m.get_first(key))
            .map(|v| v.to_string())
    }

    #[test]
    fn plain_set_and_flag() {
        let mut tx = tx();
        SetVar::parse("TX.mode=strict").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "mode").as_deref(), Some("strict"));
        SetVar::parse("TX.seen").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "seen").as_deref(), Some("1"));
        SetVar::parse("TX.mode=").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "mode").as_deref(), Some(""));
    }

    #[test]
    fn arithmetic() {
        let mut tx = tx();
        SetVar::parse("TX.score=+5").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "score").as_deref(), Some("5"));
        SetVar::parse("TX.score=+3").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "score").as_deref(), Some("8"));
        SetVar::parse("TX.score=-10").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "score").as_deref(), Some("-2"));
    }

    #[test]
    fn arithmetic_on_text_is_skipped() {
        let mut tx = tx();
        SetVar::parse("TX.label=abc").unwrap().apply(&mut tx);
        SetVar::parse("TX.label=+1").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "label").as_deref(), Some("abc"));
    }

    #[test]
    fn macro_key_and_value() {
        let mut tx = tx();
        SetVar::parse("TX.weight=4").unwrap().apply(&mut tx);
        SetVar::parse("TX.total=+%{TX.weight}").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "total").as_deref(), Some("4"));
        SetVar::parse("TX.copy_%{TX.weight}=x").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "copy_4").as_deref(), Some("x"));
    }

    #[test]
    fn removal() {
        let mut tx = tx();
        SetVar::parse("TX.gone=1").unwrap().apply(&mut tx);
        SetVar::parse("!TX.gone").unwrap().apply(&mut tx);
        assert_eq!(tx_get(&tx, "gone"), None);
    }

    #[test]
    fn rejects_bad_operands() {
        assert!(SetVar::parse("score=1").is_err());
        assert!(SetVar::parse("ARGS.x=1").is_err());
        assert!(SetVar::parse("!TX.x=1").is_err());
    }
}
