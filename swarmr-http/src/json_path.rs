use serde_json::Value;

/// Follows a dotted path (`data.courses`) through nested objects.
pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(root, |cur, seg| cur.as_object()?.get(seg))
}
