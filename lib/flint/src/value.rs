use serde_derive::{Deserialize, Serialize};

/// A typed property value as it travels between the bus and the gateway.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Unsigned(u32),
    Signed(i32),
    Float(f32),
}

impl Value {
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(flag),
            _ => None,
        }
    }

    /// Logical negation, defined for booleans only.
    #[inline]
    pub fn negated(self) -> Option<Value> {
        self.as_bool().map(|flag| Value::Bool(!flag))
    }
}

/// Set-point command addressed to a writable register. `Toggle` flips the
/// current boolean value instead of carrying one.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    Set(Value),
    Toggle,
}

/// Gateway-side data type of a channel property or configuration slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated_bool() {
        assert_eq!(Value::Bool(true).negated(), Some(Value::Bool(false)));
        assert_eq!(Value::Bool(false).negated(), Some(Value::Bool(true)));
    }

    #[test]
    fn test_negated_numeric() {
        assert_eq!(Value::Float(1.5).negated(), None);
        assert_eq!(Value::Unsigned(1).negated(), None);
    }
}
