//! Attribute resolution engine.
//!
//! Computes the effective metadata record for any declaration by merging
//! explicit per-declaration overrides with values inherited along the
//! base-class chain. Resolution order:
//!
//! 1. fixed defaults for every recognized attribute,
//! 2. inheritable class-level values (template parameter list, namespace,
//!    owning module, template dictionary) overlaid in reverse method
//!    resolution order, most-base first,
//! 3. the declaration's own explicit metadata last, so the most-derived
//!    explicit value always wins.
//!
//! Results are memoized per class name; resolving the same declaration
//! twice yields identical records.

use std::collections::{BTreeMap, HashMap};

use crate::error::{GenError, Result};
use crate::model::{ClassDecl, MethodDecl, Metadata, ModuleSpec};

/// Fully resolved metadata for a class, method, or function. One field per
/// recognized attribute; no stringly-typed lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttrs {
    pub pyname: String,
    pub cppname: String,
    /// Namespace normalized to end in `::` when non-empty.
    pub namespace: String,
    /// `namespace + cppname`, with a placeholder template argument list
    /// (`<%(T1)s, %(T2)s>`) appended for generic classes.
    pub full_cppname: String,
    pub module: Option<String>,
    /// Template parameter declarations, e.g. `["typename T1"]`.
    pub template: Vec<String>,
    pub template_dict: BTreeMap<String, String>,
    pub is_virtual: bool,
    pub pure_virtual: bool,
    pub protected: bool,
    pub is_const: bool,
    pub is_static: bool,
    pub ignore: bool,
    pub implementation: Option<String>,
    pub returnpolicy: Option<String>,
    pub call_guard: Option<String>,
    pub keepalive: Option<(u32, u32)>,
    pub noconvert: bool,
}

impl ResolvedAttrs {
    fn defaults(name: &str) -> Self {
        ResolvedAttrs {
            pyname: name.to_string(),
            cppname: name.to_string(),
            namespace: String::new(),
            full_cppname: name.to_string(),
            module: None,
            template: Vec::new(),
            template_dict: BTreeMap::new(),
            is_virtual: false,
            pure_virtual: false,
            protected: false,
            is_const: false,
            is_static: false,
            ignore: false,
            implementation: None,
            returnpolicy: None,
            call_guard: None,
            keepalive: None,
            noconvert: false,
        }
    }

    /// Whether the declaration is generic (carries template parameters).
    pub fn is_template(&self) -> bool {
        !self.template.is_empty()
    }

    /// Bare parameter names, stripped of their kind: `"typename T1"` -> `"T1"`.
    pub fn template_param_names(&self) -> Vec<String> {
        self.template
            .iter()
            .map(|t| param_name(t).to_string())
            .collect()
    }
}

/// Last whitespace-separated token of a template parameter declaration.
pub fn param_name(decl: &str) -> &str {
    decl.split_whitespace().last().unwrap_or(decl)
}

/// Normalize a namespace path so non-empty paths end in `::`.
pub fn normalize_namespace(ns: &str) -> String {
    if ns.is_empty() || ns.ends_with("::") {
        ns.to_string()
    } else {
        format!("{}::", ns)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Memoizing resolver over one module's class hierarchy.
pub struct AttrResolver<'a> {
    module: &'a ModuleSpec,
    mro_cache: HashMap<String, Vec<String>>,
    class_cache: HashMap<String, ResolvedAttrs>,
}

impl<'a> AttrResolver<'a> {
    pub fn new(module: &'a ModuleSpec) -> Self {
        AttrResolver {
            module,
            mro_cache: HashMap::new(),
            class_cache: HashMap::new(),
        }
    }

    pub fn module(&self) -> &'a ModuleSpec {
        self.module
    }

    fn class(&self, name: &str) -> Result<&'a ClassDecl> {
        self.module
            .class(name)
            .ok_or_else(|| GenError::config(format!("unknown class `{}` in hierarchy", name)))
    }

    /// C3 linearization of the class hierarchy, most-derived first. The
    /// hierarchy is metadata only; no instances are ever created.
    pub fn mro(&mut self, name: &str) -> Result<Vec<String>> {
        if let Some(cached) = self.mro_cache.get(name) {
            return Ok(cached.clone());
        }
        let decl = self.class(name)?;
        let mut parent_lins: Vec<Vec<String>> = Vec::new();
        for base in &decl.bases {
            parent_lins.push(self.mro(base)?);
        }
        parent_lins.push(decl.bases.clone());

        let mut result = vec![name.to_string()];
        loop {
            // Drop exhausted sequences.
            parent_lins.retain(|l| !l.is_empty());
            if parent_lins.is_empty() {
                break;
            }
            // Pick the first head that appears in no other sequence's tail.
            let mut candidate = None;
            for lin in &parent_lins {
                let head = &lin[0];
                let in_tail = parent_lins
                    .iter()
                    .any(|other| other.len() > 1 && other[1..].contains(head));
                if !in_tail {
                    candidate = Some(head.clone());
                    break;
                }
            }
            let head = candidate.ok_or_else(|| {
                GenError::config(format!(
                    "cannot linearize base classes of `{}` (inconsistent hierarchy)",
                    name
                ))
            })?;
            result.push(head.clone());
            for lin in parent_lins.iter_mut() {
                lin.retain(|c| c != &head);
            }
        }
        self.mro_cache.insert(name.to_string(), result.clone());
        Ok(result)
    }

    /// Resolved attributes for a class declaration.
    pub fn resolve_class(&mut self, name: &str) -> Result<ResolvedAttrs> {
        if let Some(cached) = self.class_cache.get(name) {
            return Ok(cached.clone());
        }
        let decl = self.class(name)?;
        let mro = self.mro(name)?;

        let mut resolved = ResolvedAttrs::defaults(&decl.name);

        // Inheritable class-level values, most-base first so that more
        // derived ancestors overwrite them.
        for ancestor_name in mro.iter().skip(1).rev() {
            let ancestor = self.class(ancestor_name)?;
            overlay_inheritable(&mut resolved, &ancestor.metadata);
        }
        // Own explicit metadata wins last.
        overlay_explicit(&mut resolved, &decl.metadata)?;

        resolved.namespace = normalize_namespace(&resolved.namespace);
        resolved.full_cppname = full_cppname(&resolved);

        check_class(&resolved)?;
        self.class_cache.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolved attributes for a method declared in (or inherited by) the
    /// class whose resolved attributes are `owner`. The enclosing-class
    /// fields (namespace, owning module) always come from the owner, even
    /// for methods inherited unmodified from a base.
    pub fn resolve_method(
        &self,
        owner: &ResolvedAttrs,
        method: &MethodDecl,
    ) -> Result<ResolvedAttrs> {
        let mut resolved = ResolvedAttrs::defaults(&method.name);
        overlay_explicit(&mut resolved, &method.metadata)?;
        resolved.namespace = owner.namespace.clone();
        resolved.module = owner.module.clone();
        resolved.full_cppname = format!("{}{}", resolved.namespace, resolved.cppname);

        if resolved.pure_virtual {
            resolved.is_virtual = true;
        }
        if resolved.is_static && resolved.is_virtual {
            return Err(GenError::config(format!(
                "method `{}::{}` is marked both static and virtual",
                owner.pyname, method.name
            )));
        }
        if method.constructor && (resolved.is_virtual || resolved.is_static) {
            return Err(GenError::config(format!(
                "constructor `{}::{}` cannot be virtual or static",
                owner.pyname, method.name
            )));
        }
        Ok(resolved)
    }

    /// Resolved attributes for a free function.
    pub fn resolve_function(&self, func: &crate::model::FunctionDecl) -> Result<ResolvedAttrs> {
        let mut resolved = ResolvedAttrs::defaults(&func.name);
        overlay_explicit(&mut resolved, &func.metadata)?;
        resolved.namespace = normalize_namespace(&resolved.namespace);
        resolved.full_cppname = format!("{}{}", resolved.namespace, resolved.cppname);
        Ok(resolved)
    }

    /// Every virtual method visible from `name`, walked in MRO order and
    /// keyed by native name so any re-declaration in a more-derived class —
    /// virtual or not — shadows the base version rather than duplicating
    /// it. Returns `(declaring class, method)` pairs in first-seen order.
    pub fn virtual_methods(&mut self, name: &str) -> Result<Vec<(String, MethodDecl)>> {
        let mro = self.mro(name)?;
        let owner = self.resolve_class(name)?;
        let mut seen: Vec<String> = Vec::new();
        let mut out: Vec<(String, MethodDecl)> = Vec::new();
        for class_name in &mro {
            let decl = self.class(class_name)?;
            for method in &decl.methods {
                let attrs = self.resolve_method(&owner, method)?;
                if seen.contains(&attrs.cppname) {
                    continue; // shadowed by a more-derived declaration
                }
                seen.push(attrs.cppname.clone());
                if attrs.is_virtual {
                    out.push((class_name.clone(), method.clone()));
                }
            }
        }
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE STEPS
// ═══════════════════════════════════════════════════════════════════════════════

/// Overlay only the attributes marked inheritable at class level.
fn overlay_inheritable(resolved: &mut ResolvedAttrs, metadata: &Metadata) {
    if let Some(template) = &metadata.template {
        resolved.template = template.clone();
    }
    if let Some(dict) = &metadata.template_dict {
        for (k, v) in dict {
            resolved.template_dict.insert(k.clone(), v.clone());
        }
    }
    if let Some(ns) = &metadata.namespace {
        resolved.namespace = ns.clone();
    }
    if let Some(module) = &metadata.module {
        resolved.module = Some(module.clone());
    }
}

/// Overlay every explicitly set attribute.
fn overlay_explicit(resolved: &mut ResolvedAttrs, metadata: &Metadata) -> Result<()> {
    if let Some(pyname) = &metadata.pyname {
        resolved.pyname = pyname.clone();
    }
    if let Some(cppname) = &metadata.cppname {
        resolved.cppname = cppname.clone();
    }
    if let Some(ns) = &metadata.namespace {
        resolved.namespace = ns.clone();
    }
    if let Some(module) = &metadata.module {
        resolved.module = Some(module.clone());
    }
    if let Some(template) = &metadata.template {
        // Some([]) expressly suppresses inherited parameters.
        resolved.template = template.clone();
    }
    if let Some(dict) = &metadata.template_dict {
        for (k, v) in dict {
            resolved.template_dict.insert(k.clone(), v.clone());
        }
    }
    if let Some(v) = metadata.is_virtual {
        resolved.is_virtual = v;
    }
    if let Some(v) = metadata.pure_virtual {
        resolved.pure_virtual = v;
    }
    if let Some(v) = metadata.protected {
        resolved.protected = v;
    }
    if let Some(v) = metadata.is_const {
        resolved.is_const = v;
    }
    if let Some(v) = metadata.is_static {
        resolved.is_static = v;
    }
    if let Some(v) = metadata.ignore {
        resolved.ignore = v;
    }
    if let Some(v) = &metadata.implementation {
        resolved.implementation = Some(v.clone());
    }
    if let Some(v) = &metadata.returnpolicy {
        resolved.returnpolicy = Some(v.clone());
    }
    if let Some(v) = &metadata.call_guard {
        resolved.call_guard = Some(v.clone());
    }
    if let Some(v) = metadata.keepalive {
        resolved.keepalive = Some(v);
    }
    if let Some(v) = metadata.noconvert {
        resolved.noconvert = v;
    }
    Ok(())
}

fn check_class(resolved: &ResolvedAttrs) -> Result<()> {
    if resolved.pure_virtual || resolved.is_virtual {
        return Err(GenError::config(format!(
            "class `{}` cannot itself be marked virtual; mark its methods instead",
            resolved.pyname
        )));
    }
    Ok(())
}

/// `namespace + cppname`, with placeholder template arguments for generics
/// so emitted text substitutes cleanly against the binding dictionary.
fn full_cppname(resolved: &ResolvedAttrs) -> String {
    if resolved.template.is_empty() {
        format!("{}{}", resolved.namespace, resolved.cppname)
    } else {
        let args: Vec<String> = resolved
            .template_param_names()
            .iter()
            .map(|n| format!("%({})s", n))
            .collect();
        format!(
            "{}{}<{}>",
            resolved.namespace,
            resolved.cppname,
            args.join(", ")
        )
    }
}
