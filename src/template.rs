//! Template instantiation engine.
//!
//! Expands generic class and function declarations into concrete ones by
//! binding their template parameters to textual values. Bound values may
//! themselves mention other parameters as `%(Name)s` placeholders, so the
//! binding dictionary is resolved to a fixed point before any emission.
//! Every emitted chunk is passed through [`finalize`], which applies the
//! dictionary and rejects any placeholder that survives.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::attrs::{param_name, AttrResolver};
use crate::error::{GenError, Result};
use crate::model::{BindingSpec, ClassDecl, FunctionDecl, Instantiation, ModuleSpec};

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"%\(([A-Za-z_][A-Za-z0-9_]*)\)s").unwrap();
}

/// Substitution passes allowed before a cyclic dictionary is declared fatal.
const MAX_SUBST_PASSES: usize = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// SUBSTITUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// One substitution pass: replace every placeholder that names a dictionary
/// key, leave the rest untouched.
fn substitute_once(text: &str, dict: &BTreeMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures| {
            let key = &caps[1];
            match dict.get(key) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Whether any placeholder in `text` names a key of `dict`.
fn mentions_key(text: &str, dict: &BTreeMap<String, String>) -> bool {
    PLACEHOLDER_RE
        .captures_iter(text)
        .any(|caps| dict.contains_key(&caps[1]))
}

/// Resolve a binding dictionary to a fixed point: no value may keep
/// mentioning another declared parameter. Cyclic definitions exhaust the
/// pass budget and fail.
pub fn resolve_dict(
    decl: &str,
    dict: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut current = dict.clone();
    for _ in 0..MAX_SUBST_PASSES {
        if !current.values().any(|v| mentions_key(v, &current)) {
            return Ok(current);
        }
        let snapshot = current.clone();
        for value in current.values_mut() {
            *value = substitute_once(value, &snapshot);
        }
    }
    let placeholder = current
        .values()
        .flat_map(|v| PLACEHOLDER_RE.captures_iter(v))
        .map(|caps| caps[1].to_string())
        .next()
        .unwrap_or_default();
    Err(GenError::UnresolvedTemplate {
        decl: decl.to_string(),
        placeholder,
    })
}

/// Apply a resolved dictionary to an emitted chunk. Any placeholder left
/// afterwards — unknown parameter, or one the binding never supplied — is a
/// hard error naming the offending declaration.
pub fn finalize(decl: &str, text: &str, dict: &BTreeMap<String, String>) -> Result<String> {
    let mut current = text.to_string();
    for _ in 0..MAX_SUBST_PASSES {
        if !mentions_key(&current, dict) {
            break;
        }
        current = substitute_once(&current, dict);
    }
    if let Some(caps) = PLACEHOLDER_RE.captures(&current) {
        return Err(GenError::UnresolvedTemplate {
            decl: decl.to_string(),
            placeholder: caps[1].to_string(),
        });
    }
    Ok(current)
}

/// Sanitize a bound value into an identifier-safe fragment for synthesized
/// export names: `std::vector<double>` -> `std_vector_double`.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_underscore = false;
    for ch in value.chars() {
        let mapped = if ch.is_alphanumeric() { Some(ch) } else { None };
        match mapped {
            Some(c) => {
                out.push(c);
                last_underscore = false;
            }
            None => {
                if !last_underscore && !out.is_empty() {
                    out.push('_');
                    last_underscore = true;
                }
            }
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING DICTIONARIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the binding dictionary for one instantiation from the declared
/// parameter list, the explicit binding form and the declaration's default
/// template dictionary.
fn build_dict(
    decl: &str,
    params: &[String],
    binding: Option<&BindingSpec>,
    defaults: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut dict: BTreeMap<String, String> = BTreeMap::new();
    match binding {
        None => {
            if !params.is_empty() {
                return Err(GenError::Arity {
                    decl: decl.to_string(),
                    expected: params.len(),
                    got: 0,
                });
            }
        }
        Some(BindingSpec::Scalar(value)) => {
            if params.len() != 1 {
                return Err(GenError::Arity {
                    decl: decl.to_string(),
                    expected: params.len(),
                    got: 1,
                });
            }
            dict.insert(params[0].clone(), value.clone());
        }
        Some(BindingSpec::Positional(values)) => {
            if params.len() != values.len() {
                return Err(GenError::Arity {
                    decl: decl.to_string(),
                    expected: params.len(),
                    got: values.len(),
                });
            }
            for (name, value) in params.iter().zip(values) {
                dict.insert(name.clone(), value.clone());
            }
        }
        Some(BindingSpec::Named(map)) => {
            for name in params {
                if !map.contains_key(name) {
                    return Err(GenError::MissingParameter {
                        decl: decl.to_string(),
                        parameter: name.clone(),
                    });
                }
            }
            // Extra keys are allowed; they feed parameters of generic bases.
            for (k, v) in map {
                dict.insert(k.clone(), v.clone());
            }
        }
    }
    // Defaults fill parameters the explicit binding did not cover.
    for (k, v) in defaults {
        dict.entry(k.clone()).or_insert_with(|| v.clone());
    }
    resolve_dict(decl, &dict)
}

fn synthesized_name(base: &str, values: &[String]) -> String {
    let mut name = base.to_string();
    for value in values {
        let frag = sanitize(value);
        if !frag.is_empty() {
            name.push('_');
            name.push_str(&frag);
        }
    }
    name
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASS AND FUNCTION INSTANTIATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Expand one class instantiation into an independent concrete declaration.
/// Instantiations of the same generic with different bindings never alias.
pub fn instantiate_class(
    resolver: &mut AttrResolver<'_>,
    inst: &Instantiation,
) -> Result<ClassDecl> {
    let generic = resolver
        .module()
        .class(&inst.generic)
        .ok_or_else(|| {
            GenError::config(format!(
                "instantiation references unknown class `{}`",
                inst.generic
            ))
        })?
        .clone();
    let resolved = resolver.resolve_class(&generic.name)?;

    let params = resolved.template_param_names();
    let dict = build_dict(
        &generic.name,
        &params,
        inst.parameters.as_ref(),
        &resolved.template_dict,
    )?;

    // Bound values in declaration order drive name synthesis.
    let values: Vec<String> = params
        .iter()
        .map(|p| dict.get(p).cloned().unwrap_or_default())
        .collect();

    let pyname = inst
        .pyname
        .clone()
        .or_else(|| inst.name.clone())
        .unwrap_or_else(|| synthesized_name(&resolved.pyname, &values));
    let cppname = inst.cppname.clone().unwrap_or_else(|| {
        if values.is_empty() {
            resolved.cppname.clone()
        } else {
            format!("{}<{}>", resolved.cppname, values.join(", "))
        }
    });

    let mut concrete = generic;
    concrete.name = pyname.clone();
    concrete.metadata.pyname = Some(pyname);
    concrete.metadata.cppname = Some(cppname);
    concrete.metadata.template = Some(Vec::new());
    concrete.metadata.template_dict = Some(dict);
    // Ignore comes from the instantiation, never the generic.
    concrete.metadata.ignore = Some(inst.ignore.unwrap_or(false));
    if let Some(docext) = &inst.docext {
        concrete.doc = Some(match concrete.doc {
            Some(doc) => format!("{}{}", doc, docext),
            None => docext.clone(),
        });
    }
    Ok(concrete)
}

/// Expand one function instantiation. The bound values are appended to the
/// native name as an explicit template argument list.
pub fn instantiate_function(
    resolver: &mut AttrResolver<'_>,
    inst: &Instantiation,
) -> Result<FunctionDecl> {
    let generic = resolver
        .module()
        .function(&inst.generic)
        .ok_or_else(|| {
            GenError::config(format!(
                "instantiation references unknown function `{}`",
                inst.generic
            ))
        })?
        .clone();
    let resolved = resolver.resolve_function(&generic)?;

    let params: Vec<String> = resolved.template.iter().map(|t| param_name(t).to_string()).collect();
    let dict = build_dict(
        &generic.name,
        &params,
        inst.parameters.as_ref(),
        &resolved.template_dict,
    )?;
    let values: Vec<String> = params
        .iter()
        .map(|p| dict.get(p).cloned().unwrap_or_default())
        .collect();

    let pyname = inst
        .pyname
        .clone()
        .or_else(|| inst.name.clone())
        .unwrap_or_else(|| synthesized_name(&resolved.pyname, &values));
    let cppname = inst.cppname.clone().unwrap_or_else(|| {
        if values.is_empty() {
            resolved.cppname.clone()
        } else {
            format!("{}<{}>", resolved.cppname, values.join(", "))
        }
    });

    let mut concrete = generic;
    concrete.name = pyname.clone();
    concrete.metadata.pyname = Some(pyname);
    concrete.metadata.cppname = Some(cppname);
    concrete.metadata.template = Some(Vec::new());
    concrete.metadata.template_dict = Some(dict);
    concrete.metadata.ignore = Some(inst.ignore.unwrap_or(false));
    if let Some(docext) = &inst.docext {
        concrete.doc = Some(match concrete.doc {
            Some(doc) => format!("{}{}", doc, docext),
            None => docext.clone(),
        });
    }
    Ok(concrete)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE EXPANSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Expand every instantiation in a module, producing a new module whose
/// class and function lists carry the concrete declarations alongside the
/// generics they came from (generics are skipped at emission but stay in
/// the hierarchy for inheritance). Two concrete declarations resolving to
/// the same export name is a hard error — never first-seen-wins, even for
/// diamond hierarchies.
pub fn expand_module(module: &ModuleSpec) -> Result<ModuleSpec> {
    let mut expanded = module.clone();

    {
        let mut resolver = AttrResolver::new(module);
        for inst in &module.instantiations {
            let concrete = instantiate_class(&mut resolver, inst)?;
            expanded.classes.push(concrete);
        }
        for inst in &module.function_instantiations {
            let concrete = instantiate_function(&mut resolver, inst)?;
            expanded.functions.push(concrete);
        }
    }
    expanded.instantiations.clear();
    expanded.function_instantiations.clear();

    // Export-name uniqueness over every concrete declaration.
    let mut resolver = AttrResolver::new(&expanded);
    let mut seen: HashSet<String> = HashSet::new();
    let names: Vec<String> = expanded.classes.iter().map(|c| c.name.clone()).collect();
    for name in names {
        let attrs = resolver.resolve_class(&name)?;
        if attrs.is_template() || attrs.ignore {
            continue;
        }
        if !seen.insert(attrs.pyname.clone()) {
            return Err(GenError::DuplicateExportName(attrs.pyname));
        }
    }
    let mut seen_fn: HashSet<String> = HashSet::new();
    for func in &expanded.functions {
        let attrs = resolver.resolve_function(func)?;
        if attrs.is_template() || attrs.ignore {
            continue;
        }
        if !seen_fn.insert(attrs.pyname.clone()) {
            return Err(GenError::DuplicateExportName(attrs.pyname));
        }
    }

    Ok(expanded)
}

/// Dictionary check applied before emission: the resolved dictionary of a
/// concrete declaration must already be at its fixed point.
pub fn assert_resolved(decl: &str, dict: &BTreeMap<String, String>) -> Result<()> {
    if dict.values().any(|v| mentions_key(v, dict)) {
        let placeholder = dict
            .values()
            .flat_map(|v| PLACEHOLDER_RE.captures_iter(v))
            .map(|caps| caps[1].to_string())
            .next()
            .unwrap_or_default();
        return Err(GenError::UnresolvedTemplate {
            decl: decl.to_string(),
            placeholder,
        });
    }
    Ok(())
}
