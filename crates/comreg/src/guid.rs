//! GUID-shape helpers for registry key segments.

/// Hex digit counts of the five dash-separated GUID groups.
const GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// Whether `s` looks like a braced GUID: `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
pub fn is_guid_shaped(s: &str) -> bool {
    let Some(inner) = s.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) else {
        return false;
    };

    let groups: Vec<&str> = inner.split('-').collect();
    groups.len() == GROUP_LENGTHS.len()
        && groups
            .iter()
            .zip(GROUP_LENGTHS)
            .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Upper-case `s` if it is GUID-shaped, otherwise return it unchanged.
pub fn normalize_id(s: &str) -> String {
    if is_guid_shaped(s) {
        s.to_ascii_uppercase()
    } else {
        s.to_string()
    }
}
