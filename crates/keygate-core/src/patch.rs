//! Tri-state field updates.
//!
//! Partial updates need to tell three cases apart: leave the field alone,
//! clear it, or set it. On the wire these map to an absent field, an explicit
//! `null`, and a value. Use with `#[serde(default)]` so an absent field
//! deserializes as [`Patch::Unchanged`].

use serde::{Deserialize, Deserializer};

/// A partial update to a single optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the field as it is.
    #[default]
    Unchanged,
    /// Reset the field to "not set".
    Clear,
    /// Replace the field's value.
    Set(T),
}

impl<T> Patch<T> {
    /// Whether this patch leaves the field alone.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Apply the patch to an optional field.
    pub fn apply(self, target: &mut Option<T>) {
        match self {
            Self::Unchanged => {}
            Self::Clear => *target = None,
            Self::Set(value) => *target = Some(value),
        }
    }

    /// Transform the value carried by `Set`.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
        match self {
            Self::Unchanged => Patch::Unchanged,
            Self::Clear => Patch::Clear,
            Self::Set(value) => Patch::Set(f(value)),
        }
    }

    /// Fallible version of [`Patch::map`].
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<Patch<U>, E> {
        Ok(match self {
            Self::Unchanged => Patch::Unchanged,
            Self::Clear => Patch::Clear,
            Self::Set(value) => Patch::Set(f(value)?),
        })
    }
}

impl Patch<String> {
    /// Treat a blank string the same as `Clear`.
    ///
    /// Optional string settings use "empty" to mean "not set", so `Set("")`
    /// must not be stored as a value.
    #[must_use]
    pub fn blank_as_clear(self) -> Self {
        match self {
            Self::Set(value) if value.trim().is_empty() => Self::Clear,
            Self::Set(value) => Self::Set(value.trim().to_string()),
            other => other,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Clear, Self::Set)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        proxy_url: Patch<String>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let absent: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.proxy_url, Patch::Unchanged);

        let null: Body = serde_json::from_str(r#"{"proxy_url": null}"#).unwrap();
        assert_eq!(null.proxy_url, Patch::Clear);

        let set: Body = serde_json::from_str(r#"{"proxy_url": "http://p:1"}"#).unwrap();
        assert_eq!(set.proxy_url, Patch::Set("http://p:1".to_string()));
    }

    #[test]
    fn apply_to_option() {
        let mut field = Some(1);
        Patch::Unchanged.apply(&mut field);
        assert_eq!(field, Some(1));
        Patch::Set(2).apply(&mut field);
        assert_eq!(field, Some(2));
        Patch::Clear.apply(&mut field);
        assert_eq!(field, None);
    }

    #[test]
    fn blank_string_clears() {
        assert_eq!(Patch::Set("  ".to_string()).blank_as_clear(), Patch::Clear);
        assert_eq!(
            Patch::Set(" x ".to_string()).blank_as_clear(),
            Patch::Set("x".to_string())
        );
        assert_eq!(Patch::<String>::Unchanged.blank_as_clear(), Patch::Unchanged);
    }

    #[test]
    fn try_map_propagates_errors() {
        let parse = |s: &str| s.parse::<i64>().map_err(|_| s.to_string());
        let ok = Patch::Set("5").try_map(parse);
        assert_eq!(ok, Ok(Patch::Set(5)));
        let err = Patch::Set("x").try_map(parse);
        assert_eq!(err, Err("x".to_string()));
    }
}
