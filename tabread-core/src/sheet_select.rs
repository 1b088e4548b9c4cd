//! Pick the one sheet a spreadsheet source reads

use crate::error::Result;

/// Return the first candidate flagged as selected, else the first candidate.
///
/// `is_selected` is called lazily in enumeration order and never again once
/// a flagged candidate is found. `None` only when there are no candidates.
pub fn select_active<I, T, F>(candidates: I, mut is_selected: F) -> Result<Option<T>>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Result<bool>,
{
    let mut first = None;
    for candidate in candidates {
        if is_selected(&candidate)? {
            return Ok(Some(candidate));
        }
        if first.is_none() {
            first = Some(candidate);
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_first_flagged_wins() {
        let flags = [false, true, true];
        let picked = select_active(0..3, |i| Ok(flags[*i])).unwrap();
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn test_stops_at_first_flag() {
        let mut calls = 0;
        let picked = select_active(0..10, |i| {
            calls += 1;
            Ok(*i == 2)
        })
        .unwrap();
        assert_eq!(picked, Some(2));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fallback_is_first_and_reproducible() {
        for _ in 0..3 {
            let picked = select_active(["one", "two", "three"], |_| Ok(false)).unwrap();
            assert_eq!(picked, Some("one"));
        }
    }

    #[test]
    fn test_no_candidates() {
        let picked = select_active(Vec::<u8>::new(), |_| Ok(true)).unwrap();
        assert_eq!(picked, None);
    }

    #[test]
    fn test_predicate_error_propagates() {
        let result = select_active(0..3, |_| Err(Error::Config("boom".to_string())));
        assert!(result.is_err());
    }
}
