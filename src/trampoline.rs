//! Virtual-dispatch shim (trampoline) emission.
//!
//! For every concrete class carrying overridable behavior anywhere in its
//! ancestry, emits a forwarding type whose overrides route calls to the
//! Python-side override when one exists, else to the compiled base
//! implementation. A pure-virtual method with no Python override present at
//! call time surfaces pybind11's standard "no override found" error rather
//! than silently doing nothing.

use crate::attrs::AttrResolver;
use crate::error::{GenError, Result};
use crate::template::finalize;

/// Wrap macro arguments containing commas so the preprocessor keeps them
/// intact.
fn macro_safe(type_text: &str) -> String {
    if type_text.contains(',') {
        format!("PYBIND11_TYPE({})", type_text)
    } else {
        type_text.to_string()
    }
}

/// Emit the trampoline for `class_name`, or `None` when no method anywhere
/// in its MRO is virtual. The returned text has every template placeholder
/// substituted; a leftover placeholder is a hard error.
pub fn emit_trampoline(resolver: &mut AttrResolver<'_>, class_name: &str) -> Result<Option<String>> {
    let owner = resolver.resolve_class(class_name)?;
    let methods = resolver.virtual_methods(class_name)?;
    if methods.is_empty() {
        return Ok(None);
    }
    let decl = resolver
        .module()
        .class(class_name)
        .expect("class resolved above");

    let mut out = String::new();
    out.push_str(&format!(
        "//------------------------------------------------------------------------------\n\
         // Trampoline class for {pyname}\n\
         //------------------------------------------------------------------------------\n\
         #ifndef __trampoline_{pyname}__\n\
         #define __trampoline_{pyname}__\n\n",
        pyname = owner.pyname
    ));

    let namespaces: Vec<&str> = owner
        .namespace
        .trim_end_matches("::")
        .split("::")
        .filter(|s| !s.is_empty())
        .collect();
    for ns in &namespaces {
        out.push_str(&format!("namespace {} {{\n", ns));
    }
    if !namespaces.is_empty() {
        out.push('\n');
    }

    out.push_str(&format!(
        "class Trampoline{name}: public {full} {{\npublic:\n  using {full}::{base};  // inherit constructors\n",
        name = owner.pyname,
        full = owner.full_cppname,
        base = owner.cppname.split('<').next().unwrap_or(&owner.cppname),
    ));
    if let Some(typedefs) = &decl.typedefs {
        out.push_str(typedefs);
        out.push('\n');
    }

    for (_, method) in &methods {
        let attrs = resolver.resolve_method(&owner, method)?;
        let returns = method.returns.clone().unwrap_or_else(|| "void".to_string());

        // A custom implementation replaces the compiled default, and a
        // trampoline cannot forward to it.
        if !attrs.pure_virtual && attrs.implementation.is_some() {
            return Err(GenError::MissingDefault {
                class: owner.pyname.clone(),
                method: attrs.cppname.clone(),
            });
        }

        let arg_list: Vec<String> = method
            .args
            .iter()
            .map(|a| format!("{} {}", a.cpp_type, a.name))
            .collect();
        let arg_names: Vec<String> = method.args.iter().map(|a| a.name.clone()).collect();
        let constness = if attrs.is_const { " const" } else { "" };
        let macro_name = if attrs.pure_virtual {
            "PYBIND11_OVERRIDE_PURE"
        } else {
            "PYBIND11_OVERRIDE"
        };

        out.push_str(&format!(
            "  virtual {ret} {name}({args}){constness} override {{\n    {mac}({ret_arg},\n    \
             {base},\n    {name},\n    {argnames});\n  }}\n",
            ret = returns,
            name = attrs.cppname,
            args = arg_list.join(", "),
            constness = constness,
            mac = macro_name,
            ret_arg = macro_safe(&returns),
            base = macro_safe(&owner.full_cppname),
            argnames = arg_names.join(", "),
        ));
    }

    out.push_str("};\n");
    if !namespaces.is_empty() {
        out.push('\n');
    }
    for _ in &namespaces {
        out.push_str("}\n");
    }
    out.push_str("\n#endif\n\n");

    finalize(&owner.pyname, &out, &owner.template_dict).map(Some)
}
