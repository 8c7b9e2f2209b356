//! Field resolution rules, one set per entity kind.
//!
//! Each rule looks at an entry's key segments below the entity prefix and
//! its value name, both lower-cased, and either maps the value onto a field
//! or leaves the entry unresolved so it stays a raw entry.

use super::entity::{
    AppId, ClassContext, CoClass, ComEntity, FileReference, Handler, Interface, ProgId,
    ThreadingModel, TypeLib,
};
use super::taxonomy::{parse_hex_version, GroupIndex};
use crate::harvest::diagnostics::{DiagnosticKind, Diagnostics};
use crate::paths::index::parse_file_token;
use crate::paths::PathTokenIndex;
use comreg::normalize_id;

/// Category marking a class safe for scripting.
pub const CATID_SAFE_FOR_SCRIPTING: &str = "{7DD95801-9882-11CF-9FA9-00AA006C42C4}";
/// Category marking a class safe for initializing from persistent data.
pub const CATID_SAFE_FOR_INITIALIZING: &str = "{7DD95802-9882-11CF-9FA9-00AA006C42C4}";

/// Known `FLAGS` bits of a type library.
const LIBFLAG_RESTRICTED: u32 = 0x1;
const LIBFLAG_CONTROL: u32 = 0x2;
const LIBFLAG_HIDDEN: u32 = 0x4;
const LIBFLAG_HASDISKIMAGE: u32 = 0x8;

/// One entry of an index group, prepared for rule matching.
#[derive(Debug, Clone)]
pub struct GroupEntry<'a> {
    /// Position in the component's entry list.
    pub position: usize,
    /// Lower-cased key segments below the entity prefix.
    pub rel: Vec<String>,
    /// Lower-cased value name; `None` is the default value.
    pub name: Option<String>,
    pub value: &'a str,
    /// Display form used in diagnostics.
    pub subject: String,
}

impl GroupEntry<'_> {
    fn rel(&self) -> Vec<&str> {
        self.rel.iter().map(String::as_str).collect()
    }
}

/// Result of resolving one group.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub entity: ComEntity,
    /// Candidate parents, most specific first.
    pub parents: Vec<GroupIndex>,
    /// Positions of entries mapped onto a field.
    pub resolved: Vec<usize>,
    /// Set when a conflicting value invalidated the whole entity.
    pub invalid: bool,
}

/// Shared inputs for rule evaluation.
pub struct RuleContext<'a> {
    pub index: &'a PathTokenIndex,
    pub diagnostics: &'a mut Diagnostics,
}

impl RuleContext<'_> {
    fn unresolvable(&mut self, entry: &GroupEntry<'_>, message: String) {
        self.diagnostics
            .report(DiagnosticKind::UnresolvableValue, entry.subject.clone(), message);
    }
}

enum Outcome {
    Resolved,
    Unresolved,
    /// Stop processing the group and discard the entity.
    Conflict,
}

impl From<bool> for Outcome {
    fn from(resolved: bool) -> Self {
        if resolved {
            Outcome::Resolved
        } else {
            Outcome::Unresolved
        }
    }
}

/// Map a file reference value onto a declared file where possible.
pub fn resolve_file_reference(value: &str, index: &PathTokenIndex) -> FileReference {
    if let Some(id) = parse_file_token(value) {
        return FileReference::File {
            file_id: id.to_string(),
            relative_path: false,
        };
    }
    if let Some(id) = index.file_for_path(value) {
        return FileReference::File {
            file_id: id.to_string(),
            relative_path: false,
        };
    }
    if !value.contains(['\\', '/']) {
        if let Some(id) = index.file_for_name(value) {
            return FileReference::File {
                file_id: id.to_string(),
                relative_path: true,
            };
        }
    }
    FileReference::Foreign {
        path: value.to_string(),
    }
}

/// Apply `rule` to each entry in order. Returns the resolved positions and
/// whether a conflict stopped processing.
fn apply_rules<T>(
    target: &mut T,
    entries: &[GroupEntry<'_>],
    ctx: &mut RuleContext<'_>,
    rule: fn(&mut T, &GroupEntry<'_>, &mut RuleContext<'_>) -> Outcome,
) -> (Vec<usize>, bool) {
    let mut resolved = Vec::new();
    for entry in entries {
        match rule(target, entry, ctx) {
            Outcome::Resolved => resolved.push(entry.position),
            Outcome::Unresolved => {}
            Outcome::Conflict => return (resolved, true),
        }
    }
    (resolved, false)
}

/// Resolve every entry of a group into an entity.
pub fn resolve(
    group: &GroupIndex,
    display_id: &str,
    entries: &[GroupEntry<'_>],
    ctx: &mut RuleContext<'_>,
) -> Resolution {
    let ((resolved, invalid), entity, parents) = match group {
        GroupIndex::AppId(id) => {
            let mut app = AppId {
                id: id.clone(),
                ..Default::default()
            };
            let outcome = apply_rules(&mut app, entries, ctx, app_id_field);
            (outcome, ComEntity::AppId(app), Vec::new())
        }
        GroupIndex::CoClass(id) => {
            let mut class = CoClass {
                id: id.clone(),
                ..Default::default()
            };
            let outcome = apply_rules(&mut class, entries, ctx, co_class_field);
            (outcome, ComEntity::CoClass(class), Vec::new())
        }
        GroupIndex::ProgId(_) => {
            let mut prog = ProgId {
                id: display_id.to_string(),
                ..Default::default()
            };
            let outcome = apply_rules(&mut prog, entries, ctx, prog_id_field);
            let mut parents = Vec::new();
            if let Some(cur) = &prog.current_version {
                parents.push(GroupIndex::prog_id(cur));
            }
            if let Some(clsid) = &prog.class_id {
                parents.push(GroupIndex::co_class(clsid));
            }
            (outcome, ComEntity::ProgId(prog), parents)
        }
        GroupIndex::Interface(id) => {
            let mut iface = Interface {
                id: id.clone(),
                ..Default::default()
            };
            let outcome = apply_rules(&mut iface, entries, ctx, interface_field);
            let parent = iface
                .type_lib_id
                .as_deref()
                .zip(iface.type_lib_version.as_deref().and_then(parse_hex_version))
                .map(|(tl, (major, minor))| GroupIndex::TypeLib {
                    id: normalize_id(tl),
                    major,
                    minor,
                });
            (outcome, ComEntity::Interface(iface), parent.into_iter().collect())
        }
        GroupIndex::TypeLib { id, major, minor } => {
            let mut lib = TypeLib {
                id: id.clone(),
                major_version: *major,
                minor_version: *minor,
                ..Default::default()
            };
            let outcome = apply_rules(&mut lib, entries, ctx, type_lib_field);
            (outcome, ComEntity::TypeLib(lib), Vec::new())
        }
    };

    Resolution {
        entity,
        parents,
        resolved,
        invalid,
    }
}

fn set_once(slot: &mut Option<String>, value: &str) -> bool {
    match slot {
        Some(existing) => existing == value,
        None => {
            *slot = Some(value.to_string());
            true
        }
    }
}

fn app_id_field(app: &mut AppId, e: &GroupEntry<'_>, ctx: &mut RuleContext<'_>) -> Outcome {
    if !e.rel.is_empty() {
        return Outcome::Unresolved;
    }
    match e.name.as_deref() {
        None => set_once(&mut app.description, e.value).into(),
        Some("dllsurrogate") => set_once(&mut app.dll_surrogate, e.value).into(),
        Some("localservice") => set_once(&mut app.local_service, e.value).into(),
        Some("serviceparameters") => set_once(&mut app.service_parameters, e.value).into(),
        Some("remoteservername") => set_once(&mut app.remote_server_name, e.value).into(),
        Some("activateatstorage") => {
            if e.value.eq_ignore_ascii_case("y") {
                app.activate_at_storage = true;
                Outcome::Resolved
            } else {
                ctx.unresolvable(e, format!("unrecognized ActivateAtStorage '{}'", e.value));
                Outcome::Unresolved
            }
        }
        Some("runas") if e.value.eq_ignore_ascii_case("interactive user") => {
            app.run_as_interactive_user = true;
            Outcome::Resolved
        }
        _ => Outcome::Unresolved,
    }
}

fn co_class_field(class: &mut CoClass, e: &GroupEntry<'_>, ctx: &mut RuleContext<'_>) -> Outcome {
    match (e.rel().as_slice(), e.name.as_deref()) {
        ([], None) => set_once(&mut class.description, e.value).into(),
        ([], Some("appid")) => set_once(&mut class.app_id, &normalize_id(e.value)).into(),

        ([context], None) if server_context(context).is_some() => {
            let Some(flag) = server_context(context) else {
                return Outcome::Unresolved;
            };
            let server = resolve_file_reference(e.value, ctx.index);
            match &class.server {
                Some(existing) if *existing != server => Outcome::Unresolved,
                _ => {
                    class.server = Some(server);
                    class.context.insert(flag);
                    Outcome::Resolved
                }
            }
        }
        ([context], Some("threadingmodel")) if server_context(context).is_some() => {
            let Some(model) = ThreadingModel::parse(e.value) else {
                ctx.unresolvable(e, format!("unrecognized ThreadingModel '{}'", e.value));
                return Outcome::Unresolved;
            };
            match class.threading_model {
                Some(existing) if existing != model => Outcome::Conflict,
                _ => {
                    class.threading_model = Some(model);
                    Outcome::Resolved
                }
            }
        }

        (["inprochandler32"], None) if is_standard_handler(e.value, "ole32.dll") => {
            class.handler = class.handler.with(Handler::Handler32);
            Outcome::Resolved
        }
        (["inprochandler"], None) if is_standard_handler(e.value, "ole2.dll") => {
            class.handler = class.handler.with(Handler::Handler16);
            Outcome::Resolved
        }

        (["progid"], None) => set_once(&mut class.prog_id, e.value).into(),
        (["versionindependentprogid"], None) => {
            set_once(&mut class.version_independent_prog_id, e.value).into()
        }
        (["typelib"], None) => set_once(&mut class.type_lib_id, &normalize_id(e.value)).into(),
        (["version"], None) => set_once(&mut class.version, e.value).into(),

        (["control"], None) if e.value.is_empty() => {
            class.control = true;
            Outcome::Resolved
        }
        (["insertable"], None) if e.value.is_empty() => {
            class.insertable = true;
            Outcome::Resolved
        }
        (["programmable"], None) if e.value.is_empty() => {
            class.programmable = true;
            Outcome::Resolved
        }
        (["implemented categories", category], None) => {
            if category.eq_ignore_ascii_case(CATID_SAFE_FOR_SCRIPTING) {
                class.safe_for_scripting = true;
                Outcome::Resolved
            } else if category.eq_ignore_ascii_case(CATID_SAFE_FOR_INITIALIZING) {
                class.safe_for_initializing = true;
                Outcome::Resolved
            } else {
                Outcome::Unresolved
            }
        }
        _ => Outcome::Unresolved,
    }
}

fn server_context(segment: &str) -> Option<u8> {
    match segment {
        "inprocserver32" => Some(ClassContext::INPROC_SERVER32),
        "inprocserver" => Some(ClassContext::INPROC_SERVER),
        "localserver32" => Some(ClassContext::LOCAL_SERVER32),
        "localserver" => Some(ClassContext::LOCAL_SERVER),
        _ => None,
    }
}

/// Only the system-provided handler can be expressed as a flag.
fn is_standard_handler(value: &str, system_dll: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case(system_dll)
}

fn prog_id_field(prog: &mut ProgId, e: &GroupEntry<'_>, _ctx: &mut RuleContext<'_>) -> Outcome {
    match (e.rel().as_slice(), e.name.as_deref()) {
        ([], None) => set_once(&mut prog.description, e.value).into(),
        (["clsid"], None) => set_once(&mut prog.class_id, &normalize_id(e.value)).into(),
        (["curver"], None) => set_once(&mut prog.current_version, e.value).into(),
        _ => Outcome::Unresolved,
    }
}

fn interface_field(iface: &mut Interface, e: &GroupEntry<'_>, ctx: &mut RuleContext<'_>) -> Outcome {
    match (e.rel().as_slice(), e.name.as_deref()) {
        ([], None) => set_once(&mut iface.name, e.value).into(),
        (["proxystubclsid"], None) => {
            set_once(&mut iface.proxy_stub_class_id, &normalize_id(e.value)).into()
        }
        (["proxystubclsid32"], None) => {
            set_once(&mut iface.proxy_stub_class_id32, &normalize_id(e.value)).into()
        }
        (["nummethods"], None) => match e.value.trim().parse::<u32>() {
            Ok(n) if iface.num_methods.is_none() => {
                iface.num_methods = Some(n);
                Outcome::Resolved
            }
            Ok(_) => Outcome::Unresolved,
            Err(_) => {
                ctx.unresolvable(e, format!("NumMethods '{}' is not a number", e.value));
                Outcome::Unresolved
            }
        },
        (["typelib"], None) => set_once(&mut iface.type_lib_id, &normalize_id(e.value)).into(),
        (["typelib"], Some("version")) => set_once(&mut iface.type_lib_version, e.value).into(),
        _ => Outcome::Unresolved,
    }
}

fn type_lib_field(lib: &mut TypeLib, e: &GroupEntry<'_>, ctx: &mut RuleContext<'_>) -> Outcome {
    match (e.rel().as_slice(), e.name.as_deref()) {
        ([], None) => set_once(&mut lib.description, e.value).into(),
        (["flags"], None) => {
            let Ok(flags) = u32::from_str_radix(e.value.trim(), 16) else {
                ctx.unresolvable(e, format!("FLAGS '{}' is not hexadecimal", e.value));
                return Outcome::Unresolved;
            };
            lib.restricted = flags & LIBFLAG_RESTRICTED != 0;
            lib.control = flags & LIBFLAG_CONTROL != 0;
            lib.hidden = flags & LIBFLAG_HIDDEN != 0;
            lib.has_disk_image = flags & LIBFLAG_HASDISKIMAGE != 0;

            let known = LIBFLAG_RESTRICTED | LIBFLAG_CONTROL | LIBFLAG_HIDDEN | LIBFLAG_HASDISKIMAGE;
            let mut unknown = flags & !known;
            while unknown != 0 {
                let bit = unknown & unknown.wrapping_neg();
                ctx.unresolvable(e, format!("unknown type library flag bit 0x{:x}", bit));
                unknown &= !bit;
            }
            Outcome::Resolved
        }
        (["helpdir"], None) => set_once(&mut lib.help_directory, e.value).into(),
        ([lcid, platform @ ("win32" | "win64")], None) => {
            let Ok(language) = u32::from_str_radix(lcid, 16) else {
                return Outcome::Unresolved;
            };
            let binding = lib.language_mut(language);
            let slot = if *platform == "win32" {
                &mut binding.win32
            } else {
                &mut binding.win64
            };
            if slot.is_some() {
                return Outcome::Unresolved;
            }
            *slot = Some(resolve_file_reference(e.value, ctx.index));
            Outcome::Resolved
        }
        _ => Outcome::Unresolved,
    }
}
