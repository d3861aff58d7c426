//! Binding emission for classes, enums, containers, free functions and
//! module attributes.
//!
//! Every emitter builds its chunk into a `String` and runs it through the
//! template engine's [`finalize`](crate::template::finalize) pass, so a
//! template placeholder that survives into output text is a hard error
//! naming the offending declaration.

use crate::attrs::{normalize_namespace, AttrResolver, ResolvedAttrs};
use crate::error::Result;
use crate::model::{
    AttrKind, AttributeDecl, ClassDecl, ContainerBinding, EnumDecl, FunctionDecl, MethodDecl,
    ModuleAttr,
};
use crate::template::{assert_resolved, finalize};

/// Generation options threaded from the entry point (no process-wide
/// singleton configuration).
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// pybind11 holder type appended to every `py::class_` template list.
    pub holder_type: String,
    /// Compute and report the reconciliation diff without applying it.
    pub dry_run: bool,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            holder_type: "py::smart_holder".to_string(),
            dry_run: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Render doc text as a C++ string literal.
pub fn doc_literal(doc: &str) -> String {
    let mut out = String::with_capacity(doc.len() + 2);
    out.push('"');
    for ch in doc.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// `, "x"_a.noconvert()=default` argument annotations for a callable.
fn arg_suffix(args: &[crate::model::ArgDecl], noconvert: bool) -> String {
    let mut out = String::new();
    for arg in args {
        out.push_str(&format!(", \"{}\"_a", arg.name));
        if noconvert {
            out.push_str(".noconvert()");
        }
        if let Some(default) = &arg.default {
            out.push('=');
            out.push_str(default);
        }
    }
    out
}

/// Return-policy / call-guard / keep-alive annotations.
fn policy_suffix(attrs: &ResolvedAttrs) -> String {
    let mut out = String::new();
    if let Some(policy) = &attrs.returnpolicy {
        out.push_str(&format!(", py::return_value_policy::{}", policy));
    }
    if let Some(guard) = &attrs.call_guard {
        out.push_str(&format!(", py::call_guard<{}>()", guard));
    }
    if let Some((a, b)) = attrs.keepalive {
        out.push_str(&format!(", py::keep_alive<{}, {}>()", a, b));
    }
    out
}

fn doc_suffix(doc: &Option<String>) -> String {
    match doc {
        Some(text) => format!(", {}", doc_literal(text)),
        None => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FREE FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// `m.def(...)` for one free function.
pub fn emit_function(resolver: &AttrResolver<'_>, func: &FunctionDecl) -> Result<String> {
    let attrs = resolver.resolve_function(func)?;
    assert_resolved(&func.name, &attrs.template_dict)?;
    let mut out = String::new();
    out.push_str(&format!("  m.def(\"{}\", ", attrs.pyname));

    if let Some(implementation) = &attrs.implementation {
        // A custom implementation short-circuits the address-of expression.
        out.push_str(implementation);
        out.push_str(&arg_suffix(&func.args, attrs.noconvert));
    } else if let Some(returns) = &func.returns {
        let arg_types: Vec<&str> = func.args.iter().map(|a| a.cpp_type.as_str()).collect();
        out.push_str(&format!(
            "({} (*)({})) &{}{}",
            returns,
            arg_types.join(", "),
            attrs.namespace,
            attrs.cppname
        ));
        out.push_str(&arg_suffix(&func.args, attrs.noconvert));
    } else {
        out.push_str(&format!("&{}{}", attrs.namespace, attrs.cppname));
    }

    out.push_str(&policy_suffix(&attrs));
    out.push_str(&doc_suffix(&func.doc));
    out.push_str(");\n");
    finalize(&attrs.pyname, &out, &attrs.template_dict)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// `py::native_enum` binding, under the module (`scope` = `"m"`) or a class
/// binding object. `owner` carries the enclosing class for nested enums.
pub fn emit_enum(decl: &EnumDecl, scope: &str, owner: Option<&ResolvedAttrs>) -> Result<String> {
    let namespace = normalize_namespace(decl.namespace.as_deref().unwrap_or(""));
    let cppname = decl.cppname.as_deref().unwrap_or(&decl.name);
    let prefix = match owner {
        Some(class) => format!("{}::{}{}", class.full_cppname, namespace, cppname),
        None => format!("{}{}", namespace, cppname),
    };

    let mut out = String::new();
    out.push_str(&format!(
        "  py::native_enum<{}>({}, \"{}\", \"{}\"",
        prefix, scope, decl.name, decl.native_type
    ));
    if let Some(doc) = &decl.doc {
        out.push_str(&format!(", {}", doc_literal(doc)));
    }
    out.push_str(")\n");
    for value in &decl.values {
        out.push_str(&format!("    .value(\"{}\", {}::{})\n", value, prefix, value));
    }
    if decl.export_values {
        out.push_str("    .export_values()\n");
    }
    out.push_str("    .finalize();\n\n");

    let dict = owner.map(|c| c.template_dict.clone()).unwrap_or_default();
    finalize(&decl.name, &out, &dict)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTAINERS
// ═══════════════════════════════════════════════════════════════════════════════

/// `PYBIND11_MAKE_OPAQUE` marker for an opaque container binding.
pub fn emit_opaque_marker(container: &ContainerBinding) -> Option<String> {
    if !container.opaque {
        return None;
    }
    Some(format!(
        "PYBIND11_MAKE_OPAQUE(PYBIND11_TYPE({}));\n",
        container.cpp_type()
    ))
}

/// `py::bind_vector` / `py::bind_map` call for one container.
pub fn emit_container(container: &ContainerBinding) -> String {
    let binder = match &container.kind {
        crate::model::ContainerKind::Vector { .. } => "bind_vector",
        crate::model::ContainerKind::Map { .. } => "bind_map",
    };
    let mut out = format!(
        "  py::{}<{}>(m, \"{}\"",
        binder,
        container.cpp_type(),
        container.name
    );
    if let Some(local) = container.local {
        out.push_str(&format!(", py::module_local({})", local));
    }
    out.push_str(");\n");
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn emit_module_attr(attr: &ModuleAttr) -> String {
    let pyname = attr.pyname.as_deref().unwrap_or(&attr.name);
    let value = attr.value.as_deref().unwrap_or(&attr.name);
    format!("  m.attr(\"{}\") = {};\n", pyname, value)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Full binding block for one concrete class: the `py::class_` object,
/// constructors, methods, data attributes and nested enums, in declaration
/// order.
pub fn emit_class(
    resolver: &mut AttrResolver<'_>,
    config: &GenConfig,
    decl: &ClassDecl,
    has_trampoline: bool,
    has_publicist: bool,
) -> Result<String> {
    let owner = resolver.resolve_class(&decl.name)?;
    // The dictionary must already be at its fixed point before any chunk is
    // substituted against it.
    assert_resolved(&decl.name, &owner.template_dict)?;

    let mut out = String::new();
    out.push_str(&format!(
        "  //............................................................................\n\
         \x20 // Class {}\n\
         \x20 {{\n",
        owner.pyname
    ));

    // py::class_ template arguments: type, trampoline, bases, holder.
    let mut class_args = vec![owner.full_cppname.clone()];
    if has_trampoline {
        class_args.push(format!(
            "{}Trampoline{}",
            owner.namespace, owner.pyname
        ));
    }
    for base_name in &decl.bases {
        let base = resolver.resolve_class(base_name)?;
        class_args.push(base.full_cppname.clone());
    }
    class_args.push(config.holder_type.clone());

    out.push_str(&format!(
        "    py::class_<{}> obj(m, \"{}\"",
        class_args.join(", "),
        owner.pyname
    ));
    if let Some(doc) = &decl.doc {
        out.push_str(&format!(", {}", doc_literal(doc)));
    }
    out.push_str(");\n\n");

    for method in &decl.methods {
        let attrs = resolver.resolve_method(&owner, method)?;
        if attrs.ignore {
            continue;
        }
        if method.constructor {
            out.push_str(&emit_constructor(method, &attrs));
        } else {
            out.push_str(&emit_method(&owner, method, &attrs, has_publicist));
        }
    }

    if !decl.attributes.is_empty() {
        out.push('\n');
        for attribute in &decl.attributes {
            out.push_str(&emit_attribute(&owner, attribute));
        }
    }

    if !decl.enums.is_empty() {
        out.push('\n');
        for nested in &decl.enums {
            out.push_str(&emit_enum(nested, "obj", Some(&owner))?);
        }
    }

    out.push_str("  }\n\n");
    finalize(&owner.pyname, &out, &owner.template_dict)
}

fn emit_constructor(method: &MethodDecl, attrs: &ResolvedAttrs) -> String {
    let mut out = String::from("    obj.def(");
    if let Some(implementation) = &attrs.implementation {
        out.push_str(&format!("py::init({})", implementation));
    } else {
        let arg_types: Vec<&str> = method.args.iter().map(|a| a.cpp_type.as_str()).collect();
        out.push_str(&format!("py::init<{}>()", arg_types.join(", ")));
    }
    out.push_str(&arg_suffix(&method.args, attrs.noconvert));
    out.push_str(&policy_suffix(attrs));
    out.push_str(&doc_suffix(&method.doc));
    out.push_str(");\n");
    out
}

fn emit_method(
    owner: &ResolvedAttrs,
    method: &MethodDecl,
    attrs: &ResolvedAttrs,
    has_publicist: bool,
) -> String {
    let def = if attrs.is_static { "def_static" } else { "def" };
    let mut out = format!("    obj.{}(\"{}\", ", def, attrs.pyname);

    if let Some(implementation) = &attrs.implementation {
        out.push_str(implementation);
    } else {
        // Protected methods are reached through the publicist subclass.
        let address_scope = if attrs.protected && has_publicist {
            format!("{}Publicist{}", owner.namespace, owner.pyname)
        } else {
            owner.full_cppname.clone()
        };
        let arg_types: Vec<&str> = method.args.iter().map(|a| a.cpp_type.as_str()).collect();
        match &method.returns {
            Some(returns) if attrs.is_static => {
                out.push_str(&format!(
                    "({} (*)({})) &{}::{}",
                    returns,
                    arg_types.join(", "),
                    address_scope,
                    attrs.cppname
                ));
            }
            Some(returns) => {
                let constness = if attrs.is_const { " const" } else { "" };
                out.push_str(&format!(
                    "({} ({}::*)({}){}) &{}::{}",
                    returns,
                    owner.full_cppname,
                    arg_types.join(", "),
                    constness,
                    address_scope,
                    attrs.cppname
                ));
            }
            None => {
                out.push_str(&format!("&{}::{}", address_scope, attrs.cppname));
            }
        }
    }

    out.push_str(&arg_suffix(&method.args, attrs.noconvert));
    out.push_str(&policy_suffix(attrs));
    out.push_str(&doc_suffix(&method.doc));
    out.push_str(");\n");
    out
}

fn emit_attribute(owner: &ResolvedAttrs, attribute: &AttributeDecl) -> String {
    let cppname = attribute.cppname.as_deref().unwrap_or(&attribute.name);
    let policy = attribute
        .returnpolicy
        .as_ref()
        .map(|p| format!(", py::return_value_policy::{}", p))
        .unwrap_or_default();
    let doc = doc_suffix(&attribute.doc);

    match attribute.kind {
        AttrKind::Readwrite => {
            let def = if attribute.is_static {
                "def_readwrite_static"
            } else {
                "def_readwrite"
            };
            format!(
                "    obj.{}(\"{}\", &{}::{}{}{});\n",
                def, attribute.name, owner.full_cppname, cppname, policy, doc
            )
        }
        AttrKind::Readonly => {
            let def = if attribute.is_static {
                "def_readonly_static"
            } else {
                "def_readonly"
            };
            format!(
                "    obj.{}(\"{}\", &{}::{}{}{});\n",
                def, attribute.name, owner.full_cppname, cppname, policy, doc
            )
        }
        AttrKind::Property => {
            let getter = attribute.getter.as_deref().unwrap_or(cppname);
            match &attribute.setter {
                Some(setter) => format!(
                    "    obj.def_property(\"{}\", &{full}::{}, &{full}::{}{}{});\n",
                    attribute.name,
                    getter,
                    setter,
                    policy,
                    doc,
                    full = owner.full_cppname
                ),
                None => format!(
                    "    obj.def_property_readonly(\"{}\", &{}::{}{}{});\n",
                    attribute.name, owner.full_cppname, getter, policy, doc
                ),
            }
        }
    }
}
