//! # Re-run dependencies.
//!
//! The binding layer hands the controller an ordered list of opaque values; when any
//! entry differs by value from the previous list, an auto-run controller executes again.

/// One opaque dependency value, compared by value.
#[derive(Clone, Debug, PartialEq)]
pub enum Dependency {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<Dependency>),
}

/// Returns `true` if `next` differs from `prev` in length or in any entry.
pub fn dependencies_changed(prev: &[Dependency], next: &[Dependency]) -> bool {
    prev != next
}

impl From<()> for Dependency {
    fn from(_: ()) -> Self {
        Dependency::Unit
    }
}

impl From<bool> for Dependency {
    fn from(v: bool) -> Self {
        Dependency::Bool(v)
    }
}

impl From<i32> for Dependency {
    fn from(v: i32) -> Self {
        Dependency::Int(i64::from(v))
    }
}

impl From<i64> for Dependency {
    fn from(v: i64) -> Self {
        Dependency::Int(v)
    }
}

impl From<u32> for Dependency {
    fn from(v: u32) -> Self {
        Dependency::UInt(u64::from(v))
    }
}

impl From<u64> for Dependency {
    fn from(v: u64) -> Self {
        Dependency::UInt(v)
    }
}

impl From<usize> for Dependency {
    fn from(v: usize) -> Self {
        Dependency::UInt(v as u64)
    }
}

impl From<f64> for Dependency {
    fn from(v: f64) -> Self {
        Dependency::Float(v)
    }
}

impl From<&str> for Dependency {
    fn from(v: &str) -> Self {
        Dependency::Text(v.to_string())
    }
}

impl From<String> for Dependency {
    fn from(v: String) -> Self {
        Dependency::Text(v)
    }
}

impl<D: Into<Dependency>> From<Option<D>> for Dependency {
    fn from(v: Option<D>) -> Self {
        v.map(Into::into).unwrap_or(Dependency::Unit)
    }
}

impl<D: Into<Dependency>> From<Vec<D>> for Dependency {
    fn from(v: Vec<D>) -> Self {
        Dependency::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compares_entry_wise_by_value() {
        let a: Vec<Dependency> = vec!["user".into(), 1u32.into()];
        let same: Vec<Dependency> = vec![String::from("user").into(), 1u32.into()];
        let other: Vec<Dependency> = vec!["user".into(), 2u32.into()];

        assert!(!dependencies_changed(&a, &same));
        assert!(dependencies_changed(&a, &other));
        assert!(dependencies_changed(&a, &a[..1]));
    }

    #[test]
    fn test_none_maps_to_unit() {
        assert_eq!(Dependency::from(None::<u32>), Dependency::Unit);
        assert_eq!(Dependency::from(Some(3i64)), Dependency::Int(3));
    }
}
