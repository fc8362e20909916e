// SPDX-License-Identifier: MIT

//! Dynamic symbol probing
//!
//! A `java` condition names a type and a field. Hosts register the types they
//! want to expose with a [`ProbeRegistry`] (or implement [`SymbolResolver`]
//! themselves); the condition resolves its field through the resolver on
//! first evaluation and keeps the handle once resolution succeeds.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ProbeError;

/// Type name of the built-in operating system probe
pub const OS_VERSION_TYPE: &str = "OsVersion";

/// Value read from a probed field
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Readable handle to a resolved field
#[derive(Clone)]
pub struct FieldHandle {
    read: Arc<dyn Fn() -> ProbeValue + Send + Sync>,
}

impl FieldHandle {
    pub fn new(read: impl Fn() -> ProbeValue + Send + Sync + 'static) -> Self {
        Self {
            read: Arc::new(read),
        }
    }

    /// Handle that always reads the same value
    pub fn constant(value: ProbeValue) -> Self {
        Self::new(move || value.clone())
    }

    pub fn read(&self) -> ProbeValue {
        (self.read)()
    }
}

impl fmt::Debug for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHandle").finish_non_exhaustive()
    }
}

/// Resolves `type.field` names to readable handles
pub trait SymbolResolver: Send + Sync {
    fn resolve_field(&self, type_name: &str, field: &str) -> Result<FieldHandle, ProbeError>;
}

#[derive(Debug, Clone)]
struct FieldEntry {
    handle: FieldHandle,
    public: bool,
}

/// Fields exposed by one probe type
#[derive(Debug, Clone, Default)]
pub struct ProbeType {
    fields: HashMap<String, FieldEntry>,
}

impl ProbeType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a readable field
    pub fn with_field(mut self, name: impl Into<String>, handle: FieldHandle) -> Self {
        self.fields.insert(
            name.into(),
            FieldEntry {
                handle,
                public: true,
            },
        );
        self
    }

    /// Add a field that exists but may not be probed
    pub fn with_private_field(mut self, name: impl Into<String>, handle: FieldHandle) -> Self {
        self.fields.insert(
            name.into(),
            FieldEntry {
                handle,
                public: false,
            },
        );
        self
    }
}

/// Default [`SymbolResolver`]: a table of named probe types
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    types: HashMap<String, ProbeType>,
}

impl ProbeRegistry {
    /// An empty registry. Every probe against it fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving the `OsVersion` type for the given platform
    pub fn with_os(os: &OsInfo) -> Self {
        let mut registry = Self::new();
        registry.register_type(OS_VERSION_TYPE, os.probe_type());
        registry
    }

    pub fn register_type(&mut self, name: impl Into<String>, probe_type: ProbeType) {
        self.types.insert(name.into(), probe_type);
    }
}

impl SymbolResolver for ProbeRegistry {
    fn resolve_field(&self, type_name: &str, field: &str) -> Result<FieldHandle, ProbeError> {
        let probe_type = self
            .types
            .get(type_name)
            .ok_or_else(|| ProbeError::TypeNotFound(type_name.to_string()))?;
        let entry = probe_type
            .fields
            .get(field)
            .ok_or_else(|| ProbeError::FieldNotFound {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;
        if !entry.public {
            return Err(ProbeError::AccessDenied {
                type_name: type_name.to_string(),
                field: field.to_string(),
            });
        }
        Ok(entry.handle.clone())
    }
}

/// Operating system facts behind the `OsVersion` probe type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl OsInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
        }
    }

    /// Facts for the running host. The OS version is not detected.
    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, "", std::env::consts::ARCH)
    }

    fn name_has(&self, needle: &str) -> bool {
        self.name.to_ascii_lowercase().contains(needle)
    }

    fn is_windows(&self) -> bool {
        self.name_has("windows")
    }

    fn is_windows_release(&self, label: &str, version: &str) -> bool {
        self.is_windows() && (self.name_has(label) || self.version.starts_with(version))
    }

    fn is_sunos(&self) -> bool {
        self.name_has("sunos") || self.name_has("solaris") || self.name_has("illumos")
    }

    fn is_mac(&self) -> bool {
        self.name_has("mac") || self.name_has("darwin")
    }

    fn is_x86(&self) -> bool {
        matches!(self.arch.as_str(), "x86" | "i386" | "i486" | "i586" | "i686")
    }

    fn is_x64(&self) -> bool {
        matches!(self.arch.as_str(), "x86_64" | "amd64")
    }

    fn is_sparc(&self) -> bool {
        self.arch.contains("sparc")
    }

    /// Boolean flags exposed as `OsVersion` fields
    pub fn flags(&self) -> Vec<(&'static str, bool)> {
        let linux = self.name_has("linux");
        let aix = self.name_has("aix");
        let sunos = self.is_sunos();
        let mac = self.is_mac();
        vec![
            ("IS_AIX", aix),
            ("IS_WINDOWS", self.is_windows()),
            ("IS_WINDOWS_XP", self.is_windows_release("xp", "5.1")),
            ("IS_WINDOWS_2003", self.is_windows_release("2003", "5.2")),
            ("IS_WINDOWS_VISTA", self.is_windows_release("vista", "6.0")),
            ("IS_WINDOWS_7", self.is_windows_release("7", "6.1")),
            ("IS_LINUX", linux),
            ("IS_SUNOS", sunos),
            ("IS_SUNOS_X86", sunos && (self.is_x86() || self.is_x64())),
            ("IS_SUNOS_SPARC", sunos && self.is_sparc()),
            ("IS_MAC", mac),
            ("IS_UNIX", linux || aix || sunos || mac || self.name_has("bsd")),
            ("IS_X86", self.is_x86()),
            ("IS_X64", self.is_x64()),
        ]
    }

    fn probe_type(&self) -> ProbeType {
        let mut probe_type = ProbeType::new()
            .with_field("OS_NAME", FieldHandle::constant(ProbeValue::Text(self.name.clone())))
            .with_field(
                "OS_VERSION",
                FieldHandle::constant(ProbeValue::Text(self.version.clone())),
            )
            .with_field("OS_ARCH", FieldHandle::constant(ProbeValue::Text(self.arch.clone())));
        for (name, value) in self.flags() {
            probe_type = probe_type.with_field(name, FieldHandle::constant(ProbeValue::Bool(value)));
        }
        probe_type
    }
}

impl Default for OsInfo {
    fn default() -> Self {
        Self::detect()
    }
}
