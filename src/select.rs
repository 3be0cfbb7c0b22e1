use crate::error::{Error, Result};
use crate::model::Keyed;

/// Pick an entry by 1-based position or by UID.
///
/// A key without dots is a position; UIDs always contain a dot.
pub fn select<'a, T: Keyed>(items: &'a [T], key: &str, kind: &'static str) -> Result<&'a T> {
    let not_found = || Error::NotFound {
        kind,
        key: key.to_string(),
    };
    let key = key.trim();
    if !key.contains('.') {
        let position: usize = key.parse().map_err(|_| not_found())?;
        return position
            .checked_sub(1)
            .and_then(|i| items.get(i))
            .ok_or_else(not_found);
    }
    items.iter().find(|item| item.uid() == key).ok_or_else(not_found)
}
