use std::fmt;

/// A host value that was either recognized as a known variant `T`, or is a
/// raw value `Raw` the exporter has no typed representation for.
///
/// Host attribute containers store enumerations as plain integers, and a
/// newer plugin version may write values this crate doesn't know about.
/// Keeping the raw value lets callers report it instead of silently mapping
/// it onto a default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Recognized<T, Raw = i64> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

impl<T, Raw> Recognized<T, Raw> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn unknown(&self) -> Option<&Raw> {
        match self {
            Recognized::Known(_) => None,
            Recognized::Unknown(raw) => Some(raw),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Recognized::Known(t) => t,
            Recognized::Unknown(_) => default,
        }
    }

    pub fn unwrap_or_else<F: FnOnce(Raw) -> T>(self, f: F) -> T {
        match self {
            Recognized::Known(t) => t,
            Recognized::Unknown(raw) => f(raw),
        }
    }
}

impl<T, Raw> From<T> for Recognized<T, Raw> {
    fn from(value: T) -> Self {
        Recognized::Known(value)
    }
}

impl<T: fmt::Display, Raw: fmt::Display> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keeps_raw_value() {
        let value: Recognized<u8> = Recognized::Unknown(7);
        assert_eq!(value.unknown(), Some(&7));
        assert!(!value.is_known());
        assert_eq!(value.unwrap_or(3), 3);
        assert_eq!(value.to_string(), "unknown(7)");
    }
}
