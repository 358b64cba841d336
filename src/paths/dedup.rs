//! Stable de-duplication for merged path lists.
//!
//! Dependency-contributed lists (exported flag files, classpath
//! entries) arrive in caller-significant order; sorting would destroy
//! it, so duplicates are dropped in place instead.

use std::collections::HashSet;
use std::hash::Hash;

/// Drop duplicates, keeping the first occurrence of each element.
pub fn first_unique_paths<T>(list: Vec<T>) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::new();
    list.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Drop duplicates, keeping the last occurrence of each element.
pub fn last_unique_paths<T>(list: Vec<T>) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::new();
    let mut out: Vec<T> = list
        .into_iter()
        .rev()
        .filter(|p| seen.insert(p.clone()))
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_unique_keeps_first() {
        let list = vec!["a", "b", "a", "c", "b"];
        assert_eq!(first_unique_paths(list), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_last_unique_keeps_last() {
        let list = vec!["a", "b", "a", "c", "b"];
        assert_eq!(last_unique_paths(list), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_idempotent() {
        let list = vec!["x", "y", "x", "z", "y", "x"];

        let first = first_unique_paths(list.clone());
        assert_eq!(first_unique_paths(first.clone()), first);

        let last = last_unique_paths(list);
        assert_eq!(last_unique_paths(last.clone()), last);
    }

    #[test]
    fn test_empty_and_unique_unchanged() {
        let empty: Vec<&str> = vec![];
        assert_eq!(first_unique_paths(empty.clone()), empty);

        let unique = vec!["a", "b", "c"];
        assert_eq!(first_unique_paths(unique.clone()), unique);
        assert_eq!(last_unique_paths(unique.clone()), unique);
    }
}
