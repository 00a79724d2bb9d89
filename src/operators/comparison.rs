//! String and numeric comparison operators.
//!
//! Every right-hand side is a macro, so `@streq %{TX.expected}` style
//! arguments resolve against the live transaction.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::Result;
use crate::macros::Macro;

/// Substring test.
pub struct Contains {
    needle: Macro,
}

impl Contains {
    /// Compile the needle macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            needle: Macro::compile(raw)?,
        })
    }
}

impl Operator for Contains {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let needle = self.needle.expand(tx.variables());
        value.contains(needle.as_str())
    }

    fn name(&self) -> &'static str {
        "contains"
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Substring test with word boundaries on both sides.
pub struct ContainsWord {
    word: Macro,
}

impl ContainsWord {
    /// Compile the word macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            word: Macro::compile(raw)?,
        })
    }
}

impl Operator for ContainsWord {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let word = self.word.expand(tx.variables());
        if word.is_empty() {
            return false;
        }
        let haystack = value.as_bytes();
        let needle = word.as_bytes();
        if needle.len() > haystack.len() {
            return false;
        }
        for i in 0..=haystack.len() - needle.len() {
            if &haystack[i..i + needle.len()] == needle {
                let left_ok = i == 0 || !is_word_byte(haystack[i - 1]);
                let right_ok = i + needle.len() == haystack.len()
                    || !is_word_byte(haystack[i + needle.len()]);
                if left_ok && right_ok {
                    return true;
                }
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "containsWord"
    }
}

/// Prefix test.
pub struct BeginsWith {
    prefix: Macro,
}

impl BeginsWith {
    /// Compile the prefix macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            prefix: Macro::compile(raw)?,
        })
    }
}

impl Operator for BeginsWith {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let prefix = self.prefix.expand(tx.variables());
        value.starts_with(prefix.as_str())
    }

    fn name(&self) -> &'static str {
        "beginsWith"
    }
}

/// Suffix test.
pub struct EndsWith {
    suffix: Macro,
}

impl EndsWith {
    /// Compile the suffix macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            suffix: Macro::compile(raw)?,
        })
    }
}

impl Operator for EndsWith {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let suffix = self.suffix.expand(tx.variables());
        value.ends_with(suffix.as_str())
    }

    fn name(&self) -> &'static str {
        "endsWith"
    }
}

/// Exact string equality.
pub struct Streq {
    expected: Macro,
}

impl Streq {
    /// Compile the expected-value macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            expected: Macro::compile(raw)?,
        })
    }
}

impl Operator for Streq {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        self.expected.expand(tx.variables()) == value
    }

    fn name(&self) -> &'static str {
        "streq"
    }
}

/// Membership test: matches when the argument list contains the value as
/// a substring. An empty value never matches.
pub struct Within {
    set: Macro,
}

impl Within {
    /// Compile the set macro.
    pub fn new(raw: &str) -> Result<Self> {
        Ok(Self {
            set: Macro::compile(raw)?,
        })
    }
}

impl Operator for Within {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        self.set.expand(tx.variables()).contains(value)
    }

    fn name(&self) -> &'static str {
        "within"
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum CompareOp {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
}

/// Integer comparison. Operands that fail to parse count as zero.
pub struct NumCompare {
    op: CompareOp,
    target: Macro,
}

impl NumCompare {
    pub(crate) fn new(op: CompareOp, raw: &str) -> Result<Self> {
        Ok(Self {
            op,
            target: Macro::compile(raw)?,
        })
    }
}

fn parse_operand(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}

impl Operator for NumCompare {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let target = parse_operand(&self.target.expand(tx.variables()));
        let actual = parse_operand(value);
        match self.op {
            CompareOp::Eq => actual == target,
            CompareOp::Ge => actual >= target,
            CompareOp::Gt => actual > target,
            CompareOp::Le => actual <= target,
            CompareOp::Lt => actual < target,
        }
    }

    fn name(&self) -> &'static str {
        match self.op {
            CompareOp::Eq => "eq",
            CompareOp::Ge => "ge",
            CompareOp::Gt => "gt",
            CompareOp::Le => "le",
            CompareOp::Lt => "lt",
        }
    }
}
