//! Key taxonomy: which index group a class-registration key belongs to.
//!
//! | first segment         | shape                               | group                          |
//! |-----------------------|-------------------------------------|--------------------------------|
//! | `AppID`               | `AppID\{guid}...`                   | `AppID/{guid}`                 |
//! | `CLSID`               | `CLSID\{guid}...`                   | `CLSID/{guid}`                 |
//! | `Component Categories`| managed-code category               | dropped                        |
//! | `Interface`           | `Interface\{guid}...`               | `Interface/{guid}`             |
//! | `TypeLib`             | `TypeLib\{guid}\{hex version}...`   | `TypeLib/{guid}/{major}.{minor}` |
//! | `.xyz`                | file-extension association          | not an entity                  |
//! | anything else         |                                     | `.progid/{name}`               |

use comreg::{is_guid_shaped, normalize_id, DOTNET_CATEGORY};
use std::fmt;

/// Identity of the entity an entry group describes.
///
/// GUIDs are upper-cased and ProgId names lower-cased, so derived equality
/// and ordering are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupIndex {
    AppId(String),
    CoClass(String),
    Interface(String),
    TypeLib { id: String, major: u16, minor: u16 },
    ProgId(String),
}

impl GroupIndex {
    pub fn prog_id(name: &str) -> Self {
        GroupIndex::ProgId(name.to_lowercase())
    }

    pub fn co_class(id: &str) -> Self {
        GroupIndex::CoClass(normalize_id(id))
    }

    pub fn app_id(id: &str) -> Self {
        GroupIndex::AppId(normalize_id(id))
    }

    /// Number of leading key segments that name the entity itself.
    pub fn prefix_len(&self) -> usize {
        match self {
            GroupIndex::ProgId(_) => 1,
            GroupIndex::TypeLib { .. } => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for GroupIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupIndex::AppId(id) => write!(f, "AppID/{}", id),
            GroupIndex::CoClass(id) => write!(f, "CLSID/{}", id),
            GroupIndex::Interface(id) => write!(f, "Interface/{}", id),
            GroupIndex::TypeLib { id, major, minor } => {
                write!(f, "TypeLib/{}/{}.{}", id, major, minor)
            }
            GroupIndex::ProgId(name) => write!(f, ".progid/{}", name),
        }
    }
}

/// Where an entry's key falls in the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Taxonomy {
    Entity(GroupIndex),
    /// Managed-code component category; removed from the component.
    DotNetCategory,
    /// Not part of any entity; left as a raw entry.
    Unclassified,
}

/// Parse a hexadecimal dotted version with two to four parts into
/// `(major, minor)`.
pub fn parse_hex_version(s: &str) -> Option<(u16, u16)> {
    let parts: Vec<&str> = s.split('.').collect();
    if !(2..=4).contains(&parts.len()) {
        return None;
    }
    let mut numbers = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() {
            return None;
        }
        numbers.push(u16::from_str_radix(part, 16).ok()?);
    }
    Some((numbers[0], numbers[1]))
}

/// Classify a class-registration key by its segments.
pub fn classify_key(segments: &[&str]) -> Taxonomy {
    let Some(first) = segments.first() else {
        return Taxonomy::Unclassified;
    };
    let second = segments.get(1).copied();
    let guid_second = second.filter(|s| is_guid_shaped(s));

    match first.to_ascii_lowercase().as_str() {
        "appid" => match guid_second {
            Some(id) => Taxonomy::Entity(GroupIndex::app_id(id)),
            None => Taxonomy::Unclassified,
        },
        "clsid" => match guid_second {
            Some(id) => Taxonomy::Entity(GroupIndex::co_class(id)),
            None => Taxonomy::Unclassified,
        },
        "component categories" => match second {
            Some(id) if id.eq_ignore_ascii_case(DOTNET_CATEGORY) => Taxonomy::DotNetCategory,
            _ => Taxonomy::Unclassified,
        },
        "interface" => match guid_second {
            Some(id) => Taxonomy::Entity(GroupIndex::Interface(normalize_id(id))),
            None => Taxonomy::Unclassified,
        },
        "typelib" => {
            let (Some(id), Some(version)) = (guid_second, segments.get(2)) else {
                return Taxonomy::Unclassified;
            };
            match parse_hex_version(version) {
                Some((major, minor)) => Taxonomy::Entity(GroupIndex::TypeLib {
                    id: normalize_id(id),
                    major,
                    minor,
                }),
                None => Taxonomy::Unclassified,
            }
        }
        _ if first.starts_with('.') => Taxonomy::Unclassified,
        _ => Taxonomy::Entity(GroupIndex::prog_id(first)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: &str = "{11111111-2222-3333-4444-555555555555}";

    #[test]
    fn test_clsid_requires_guid() {
        assert_eq!(
            classify_key(&["CLSID", &G.to_lowercase(), "InprocServer32"]),
            Taxonomy::Entity(GroupIndex::CoClass(G.to_string()))
        );
        assert_eq!(classify_key(&["CLSID", "notaguid"]), Taxonomy::Unclassified);
        assert_eq!(classify_key(&["CLSID"]), Taxonomy::Unclassified);
    }

    #[test]
    fn test_appid_and_interface() {
        assert_eq!(
            classify_key(&["AppID", G]),
            Taxonomy::Entity(GroupIndex::AppId(G.to_string()))
        );
        // Executable-name AppID keys are not entities.
        assert_eq!(classify_key(&["AppID", "server.exe"]), Taxonomy::Unclassified);
        assert_eq!(
            classify_key(&["Interface", G, "ProxyStubClsid32"]),
            Taxonomy::Entity(GroupIndex::Interface(G.to_string()))
        );
    }

    #[test]
    fn test_typelib_versions() {
        assert_eq!(
            classify_key(&["TypeLib", G, "1.0", "0", "win32"]),
            Taxonomy::Entity(GroupIndex::TypeLib {
                id: G.to_string(),
                major: 1,
                minor: 0
            })
        );
        assert_eq!(
            classify_key(&["TypeLib", G, "a.1f"]),
            Taxonomy::Entity(GroupIndex::TypeLib {
                id: G.to_string(),
                major: 10,
                minor: 31
            })
        );
        assert_eq!(classify_key(&["TypeLib", G, "x.y"]), Taxonomy::Unclassified);
        assert_eq!(classify_key(&["TypeLib", G]), Taxonomy::Unclassified);
    }

    #[test]
    fn test_dotnet_category_dropped_others_unclassified() {
        assert_eq!(
            classify_key(&["Component Categories", DOTNET_CATEGORY]),
            Taxonomy::DotNetCategory
        );
        assert_eq!(
            classify_key(&["Component Categories", G]),
            Taxonomy::Unclassified
        );
    }

    #[test]
    fn test_extension_and_progid() {
        assert_eq!(classify_key(&[".txt"]), Taxonomy::Unclassified);
        assert_eq!(
            classify_key(&["Acme.Widget.1", "CLSID"]),
            Taxonomy::Entity(GroupIndex::ProgId("acme.widget.1".into()))
        );
    }

    #[test]
    fn test_hex_version() {
        assert_eq!(parse_hex_version("1.0"), Some((1, 0)));
        assert_eq!(parse_hex_version("2.a.0.0"), Some((2, 10)));
        assert_eq!(parse_hex_version("1"), None);
        assert_eq!(parse_hex_version("1..0"), None);
        assert_eq!(parse_hex_version("1.0.0.0.0"), None);
    }

    #[test]
    fn test_index_display() {
        let idx = GroupIndex::TypeLib {
            id: G.to_string(),
            major: 1,
            minor: 0,
        };
        assert_eq!(idx.to_string(), format!("TypeLib/{}/1.0", G));
        assert_eq!(GroupIndex::prog_id("Acme.W").to_string(), ".progid/acme.w");
    }
}
