use std::fmt;

/// A script argument. Lines read from files produce `Text` only; actions
/// built in code may carry typed values directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
}

/// Result of a lenient conversion: the converted value, or the type's
/// default when `exact` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coerced<T> {
    pub value: T,
    pub exact: bool,
}

impl<T> Coerced<T> {
    fn exact(value: T) -> Self {
        Self { value, exact: true }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            exact: false,
        }
    }
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
        }
    }

    /// Numbers and booleans render the way they were written in a script.
    pub fn to_text(&self) -> Coerced<String> {
        match self {
            Self::Text(text) => Coerced::exact(text.clone()),
            Self::Number(number) => Coerced::exact(number.to_string()),
            Self::Bool(flag) => Coerced::exact(flag.to_string()),
            Self::List(_) => Coerced::fallback(String::new()),
        }
    }

    /// Unparsable text yields `0.0`.
    pub fn to_number(&self) -> Coerced<f64> {
        match self {
            Self::Number(number) => Coerced::exact(*number),
            Self::Text(text) => match text.trim().parse::<f64>() {
                Ok(number) if number.is_finite() => Coerced::exact(number),
                _ => Coerced::fallback(0.0),
            },
            Self::Bool(_) | Self::List(_) => Coerced::fallback(0.0),
        }
    }

    /// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`;
    /// anything else yields `false`.
    pub fn to_bool(&self) -> Coerced<bool> {
        match self {
            Self::Bool(flag) => Coerced::exact(*flag),
            Self::Text(text) => match text.as_str() {
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Coerced::exact(true),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Coerced::exact(false),
                _ => Coerced::fallback(false),
            },
            Self::Number(_) | Self::List(_) => Coerced::fallback(false),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
