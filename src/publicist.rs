//! Access-publicist emission.
//!
//! A publicist is a minimal subclass that re-exposes a class's protected
//! methods at public visibility so the binding layer can reference them.
//! Only methods actually declared on the class itself qualify — a method
//! inherited unchanged is already covered by the base's publicist. Native
//! names are deduplicated because overloads share one re-exposure line.

use crate::attrs::AttrResolver;
use crate::error::Result;
use crate::template::finalize;

/// Whether `class_name` declares at least one protected method of its own.
pub fn needs_publicist(resolver: &mut AttrResolver<'_>, class_name: &str) -> Result<bool> {
    let owner = resolver.resolve_class(class_name)?;
    let decl = resolver
        .module()
        .class(class_name)
        .expect("class resolved above");
    for method in &decl.methods {
        if resolver.resolve_method(&owner, method)?.protected {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Emit the publicist for `class_name`, or `None` when it has no protected
/// methods of its own. Guarded per concrete native name so the type can
/// appear in more than one included translation unit.
pub fn emit_publicist(resolver: &mut AttrResolver<'_>, class_name: &str) -> Result<Option<String>> {
    if !needs_publicist(resolver, class_name)? {
        return Ok(None);
    }
    let owner = resolver.resolve_class(class_name)?;
    let decl = resolver
        .module()
        .class(class_name)
        .expect("class resolved above");

    let mut out = String::new();
    out.push_str(&format!(
        "//------------------------------------------------------------------------------\n\
         // Publicist class for {pyname}\n\
         //------------------------------------------------------------------------------\n\
         #ifndef __publicist_{pyname}__\n\
         #define __publicist_{pyname}__\n\n",
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
        "class Publicist{name}: public {full} {{\npublic:\n",
        name = owner.pyname,
        full = owner.full_cppname,
    ));
    if let Some(typedefs) = &decl.typedefs {
        out.push_str(typedefs);
        out.push('\n');
    }

    let mut exposed: Vec<String> = Vec::new();
    for method in &decl.methods {
        let attrs = resolver.resolve_method(&owner, method)?;
        if !attrs.protected || exposed.contains(&attrs.cppname) {
            continue;
        }
        exposed.push(attrs.cppname.clone());
        out.push_str(&format!(
            "  using {full}::{name};\n",
            full = owner.full_cppname,
            name = attrs.cppname,
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
