//! Specification model for the binding generator.
//!
//! A module specification is an explicit, serializable document (JSON via
//! serde) or is built programmatically with the constructors below. It is
//! populated once per run and read-only afterwards; every downstream phase
//! (attribute resolution, template instantiation, emission) consumes it
//! without mutating it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GenError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-declaration metadata overrides. Every field is optional; unset fields
/// fall back to inherited or default values during attribute resolution.
///
/// Unknown keys are rejected when the document is deserialized, so a typo in
/// an attribute name is a hard configuration error rather than a silently
/// ignored setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Metadata {
    /// Exported (Python-visible) name.
    pub pyname: Option<String>,
    /// Native (C++) name, when it differs from the spec name.
    pub cppname: Option<String>,
    /// Namespace path, e.g. `"Aspheric::Detail"`.
    pub namespace: Option<String>,
    /// Owning module for cross-module class references.
    pub module: Option<String>,
    /// Template parameter declarations, e.g. `["typename T1", "int N"]`.
    /// `Some(vec![])` expressly suppresses parameters inherited from a
    /// generic base class.
    pub template: Option<Vec<String>>,
    /// Implicit template parameter values, used by derived generics to fix
    /// parameters of their generic bases.
    pub template_dict: Option<BTreeMap<String, String>>,
    #[serde(rename = "virtual")]
    pub is_virtual: Option<bool>,
    pub pure_virtual: Option<bool>,
    pub protected: Option<bool>,
    #[serde(rename = "const")]
    pub is_const: Option<bool>,
    #[serde(rename = "static")]
    pub is_static: Option<bool>,
    /// Exclude from emission. An instantiation can override this
    /// independently of its generic declaration.
    pub ignore: Option<bool>,
    /// Verbatim C++ callable text replacing the generated binding target.
    pub implementation: Option<String>,
    /// pybind11 return-value policy name, e.g. `"reference_internal"`.
    pub returnpolicy: Option<String>,
    /// pybind11 call-guard type, e.g. `"py::gil_scoped_release"`.
    pub call_guard: Option<String>,
    /// pybind11 keep-alive argument index pair.
    pub keepalive: Option<(u32, u32)>,
    /// Disable implicit conversion for the declaration's arguments.
    pub noconvert: Option<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// One formal argument of a method or free function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArgDecl {
    pub name: String,
    /// C++ type text; may contain `%(T)s` template placeholders.
    pub cpp_type: String,
    /// Default value text, emitted as a pybind11 `"name"_a = default`.
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MethodDecl {
    pub name: String,
    /// Return type text; absent for constructors.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    #[serde(default)]
    pub doc: Option<String>,
    /// Marks a constructor; emitted as `py::init<...>()`.
    #[serde(default)]
    pub constructor: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Data-member binding kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttrKind {
    Readwrite,
    Readonly,
    /// Bound through explicit getter/setter accessors.
    Property,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttrKind,
    #[serde(default)]
    pub cppname: Option<String>,
    /// Getter member-function name for `Property` kind; defaults to `name`.
    #[serde(default)]
    pub getter: Option<String>,
    /// Setter member-function name for `Property` kind; absent means the
    /// property is read-only.
    #[serde(default)]
    pub setter: Option<String>,
    #[serde(default)]
    pub returnpolicy: Option<String>,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub cppname: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Re-export values into the enclosing scope (`.export_values()`).
    #[serde(default)]
    pub export_values: bool,
    /// Python base type for `py::native_enum`.
    #[serde(default = "default_native_type")]
    pub native_type: String,
    #[serde(default)]
    pub doc: Option<String>,
}

fn default_native_type() -> String {
    "enum.IntEnum".to_string()
}

/// STL container binding (`py::bind_vector` / `py::bind_map`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerBinding {
    /// Exported name of the bound container type.
    pub name: String,
    pub kind: ContainerKind,
    #[serde(default)]
    pub opaque: bool,
    /// `py::module_local(...)` choice; absent means pybind11's default.
    #[serde(default)]
    pub local: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    Vector { element: String },
    Map { key: String, value: String },
}

impl ContainerBinding {
    /// Full C++ type of the bound container.
    pub fn cpp_type(&self) -> String {
        match &self.kind {
            ContainerKind::Vector { element } => format!("std::vector<{}>", element),
            ContainerKind::Map { key, value } => format!("std::map<{}, {}>", key, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Module-level attribute binding: `m.attr("name") = value;`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModuleAttr {
    pub name: String,
    /// C++ expression; defaults to the attribute name itself.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub pyname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClassDecl {
    /// Unique internal name within the module specification.
    pub name: String,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    /// Verbatim C++ typedefs injected into trampoline and publicist bodies.
    #[serde(default)]
    pub typedefs: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ClassDecl {
            name: name.into(),
            bases: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            enums: Vec::new(),
            typedefs: None,
            doc: None,
            metadata: Metadata::default(),
        }
    }

    /// Whether this declaration carries its own template parameter list.
    /// Classes with no explicit list may still inherit one during attribute
    /// resolution.
    pub fn declares_template(&self) -> bool {
        matches!(&self.metadata.template, Some(t) if !t.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANTIATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// How template parameter values are supplied to an instantiation.
///
/// Deserializes from a bare string (single parameter), an array (ordered
/// values matching the declared list one-to-one) or a map (every declared
/// parameter must be present).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingSpec {
    Scalar(String),
    Positional(Vec<String>),
    Named(BTreeMap<String, String>),
}

/// A request to expand a generic class or function into a concrete one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Instantiation {
    /// Name of the generic declaration being instantiated.
    pub generic: String,
    /// Export name; synthesized from the bound values when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Absent is valid only when the resolved parameter list is empty and
    /// every value comes from a default template dictionary.
    #[serde(default)]
    pub parameters: Option<BindingSpec>,
    #[serde(default)]
    pub cppname: Option<String>,
    #[serde(default)]
    pub pyname: Option<String>,
    /// Text appended to the generic's doc string.
    #[serde(default)]
    pub docext: Option<String>,
    /// Ignore override, independent of the generic's own ignore flag.
    #[serde(default)]
    pub ignore: Option<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ModuleSpec {
    pub name: String,
    pub doc: Option<String>,
    /// Header includes, e.g. `"\"Geometry.hh\""` or `"<vector>"`.
    pub includes: Vec<String>,
    /// Emitted as `using namespace N;`.
    pub namespaces: Vec<String>,
    /// Emitted as `using X;`.
    pub scopenames: Vec<String>,
    /// Verbatim C++ placed before any binding code.
    pub preamble: Option<String>,
    /// Extra opaque type names beyond opaque container bindings.
    pub opaque: Vec<String>,
    pub classes: Vec<ClassDecl>,
    pub enums: Vec<EnumDecl>,
    pub containers: Vec<ContainerBinding>,
    pub functions: Vec<FunctionDecl>,
    pub attributes: Vec<ModuleAttr>,
    /// Class template instantiations.
    pub instantiations: Vec<Instantiation>,
    pub function_instantiations: Vec<Instantiation>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Deserialize a module specification from JSON. A document that is not
    /// JSON at all is a parse error; a well-formed document carrying an
    /// unrecognized key or an ill-typed value is a configuration error.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| match err.classify() {
            serde_json::error::Category::Data => {
                GenError::config(format!("invalid specification: {}", err))
            }
            _ => GenError::Parse(err),
        })
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name == name)
    }
}
