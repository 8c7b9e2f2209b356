//! Typed COM registration entities.

use serde::{Serialize, Serializer};

/// Server contexts a class is registered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassContext(u8);

impl ClassContext {
    pub const INPROC_SERVER: u8 = 0x01;
    pub const INPROC_SERVER32: u8 = 0x02;
    pub const LOCAL_SERVER: u8 = 0x04;
    pub const LOCAL_SERVER32: u8 = 0x08;

    const NAMES: [(u8, &'static str); 4] = [
        (Self::INPROC_SERVER, "InprocServer"),
        (Self::INPROC_SERVER32, "InprocServer32"),
        (Self::LOCAL_SERVER, "LocalServer"),
        (Self::LOCAL_SERVER32, "LocalServer32"),
    ];

    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Serialize for ClassContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

/// Which object handlers a class registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    #[default]
    None,
    Handler32,
    Handler16,
    Both,
}

impl Handler {
    pub fn with(self, other: Handler) -> Handler {
        match (self, other) {
            (a, Handler::None) => a,
            (Handler::None, b) => b,
            (a, b) if a == b => a,
            _ => Handler::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingModel {
    Apartment,
    Free,
    Both,
    Neutral,
    Single,
}

impl ThreadingModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "apartment" => Some(ThreadingModel::Apartment),
            "free" => Some(ThreadingModel::Free),
            "both" => Some(ThreadingModel::Both),
            "neutral" => Some(ThreadingModel::Neutral),
            "single" => Some(ThreadingModel::Single),
            _ => None,
        }
    }
}

/// A reference from registration data to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileReference {
    /// A declared file, by identifier. `relative_path` is set when the
    /// registration named the file without a directory.
    File { file_id: String, relative_path: bool },
    /// A path outside the declared files.
    Foreign { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppId {
    pub id: String,
    pub description: Option<String>,
    pub dll_surrogate: Option<String>,
    pub local_service: Option<String>,
    pub service_parameters: Option<String>,
    pub remote_server_name: Option<String>,
    pub activate_at_storage: bool,
    pub run_as_interactive_user: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoClass {
    pub id: String,
    pub description: Option<String>,
    pub context: ClassContext,
    pub handler: Handler,
    pub threading_model: Option<ThreadingModel>,
    pub server: Option<FileReference>,
    pub app_id: Option<String>,
    pub prog_id: Option<String>,
    pub version_independent_prog_id: Option<String>,
    pub type_lib_id: Option<String>,
    pub version: Option<String>,
    pub control: bool,
    pub insertable: bool,
    pub programmable: bool,
    pub safe_for_scripting: bool,
    pub safe_for_initializing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgId {
    pub id: String,
    pub description: Option<String>,
    pub class_id: Option<String>,
    pub current_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub id: String,
    pub name: Option<String>,
    pub proxy_stub_class_id: Option<String>,
    pub proxy_stub_class_id32: Option<String>,
    pub num_methods: Option<u32>,
    pub type_lib_id: Option<String>,
    pub type_lib_version: Option<String>,
}

/// Per-language binding of a type library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeLibLanguage {
    pub language: u32,
    pub win32: Option<FileReference>,
    pub win64: Option<FileReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeLib {
    pub id: String,
    pub description: Option<String>,
    pub major_version: u16,
    pub minor_version: u16,
    pub restricted: bool,
    pub control: bool,
    pub hidden: bool,
    pub has_disk_image: bool,
    pub help_directory: Option<String>,
    pub languages: Vec<TypeLibLanguage>,
}

impl TypeLib {
    pub fn language_mut(&mut self, language: u32) -> &mut TypeLibLanguage {
        let pos = match self.languages.iter().position(|l| l.language == language) {
            Some(pos) => pos,
            None => {
                self.languages.push(TypeLibLanguage {
                    language,
                    ..Default::default()
                });
                self.languages.len() - 1
            }
        };
        &mut self.languages[pos]
    }
}

/// A reconstructed registration entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComEntity {
    AppId(AppId),
    CoClass(CoClass),
    ProgId(ProgId),
    Interface(Interface),
    TypeLib(TypeLib),
}

impl ComEntity {
    pub fn id(&self) -> &str {
        match self {
            ComEntity::AppId(e) => &e.id,
            ComEntity::CoClass(e) => &e.id,
            ComEntity::ProgId(e) => &e.id,
            ComEntity::Interface(e) => &e.id,
            ComEntity::TypeLib(e) => &e.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ComEntity::AppId(_) => "AppId",
            ComEntity::CoClass(_) => "CoClass",
            ComEntity::ProgId(_) => "ProgId",
            ComEntity::Interface(_) => "Interface",
            ComEntity::TypeLib(_) => "TypeLib",
        }
    }
}
