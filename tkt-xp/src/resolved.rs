//! Best-effort results
//!
//! Components on the decision path never fail: they either produce the real
//! value or a usable default. `Resolved` keeps that distinction visible to
//! callers (for logging and diagnostics) without making it an error.

/// Outcome of an operation that always yields a usable value
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    /// The input decoded as intended
    Ok(T),
    /// The input was unusable; `value` is the bundled default
    Fallback { value: T, reason: String },
}

impl<T> Resolved<T> {
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Resolved::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback { .. })
    }

    /// Why the fallback was taken, if it was
    pub fn reason(&self) -> Option<&str> {
        match self {
            Resolved::Ok(_) => None,
            Resolved::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Resolved::Ok(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Resolved::Ok(value) | Resolved::Fallback { value, .. } => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Resolved::Ok(value) => Resolved::Ok(f(value)),
            Resolved::Fallback { value, reason } => Resolved::Fallback {
                value: f(value),
                reason,
            },
        }
    }
}
