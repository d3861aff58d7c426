//! Module assembly and incremental regeneration.
//!
//! The assembler runs the generation phases in a fixed order, accumulating
//! text into per-artifact buffers (never appending to files across phases),
//! writes the complete output set into a fresh staging directory, and then
//! reconciles it against the committed output: only changed files are
//! replaced, stale artifacts of the previous run are removed, and files
//! carrying the skip sentinel on their first line are left exactly as
//! committed. Removal is bounded to the previously generated set — names
//! the committed manifest lists plus names following the module's artifact
//! scheme — so files the generator never wrote are left alone. Untouched
//! files are never rewritten, so downstream build systems driven by
//! modification times see minimal churn.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::attrs::AttrResolver;
use crate::emit::{
    doc_literal, emit_class, emit_container, emit_enum, emit_function, emit_module_attr,
    emit_opaque_marker, GenConfig,
};
use crate::error::{GenError, Result};
use crate::model::{ClassDecl, ModuleSpec};
use crate::publicist::emit_publicist;
use crate::template::expand_module;
use crate::trampoline::emit_trampoline;

/// First-line sentinel marking a committed file as exempt from
/// regeneration.
pub const SKIP_SENTINEL: &str = "// bindforge:skip";

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    /// One file per logical unit plus a master header, instead of a single
    /// monolithic translation unit.
    pub split: bool,
    /// Manifest file name, written when present (one generated path per
    /// line).
    pub manifest: Option<String>,
}

/// Outcome of the staging-to-committed reconciliation.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
}

impl Reconciliation {
    /// True when a rerun produced byte-identical output (the fixed point).
    pub fn is_fixed_point(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Generate the output set for `module` and reconcile it with the committed
/// output directory. All failures abort before the committed set is
/// touched; the staging directory is removed on both paths.
pub fn generate(
    module: &ModuleSpec,
    options: &OutputOptions,
    config: &GenConfig,
) -> Result<Reconciliation> {
    let artifacts = build_artifacts(module, options, config)?;

    fs::create_dir_all(&options.output_dir)?;
    let prior: HashSet<String> =
        manifest_entries(&options.output_dir, options.manifest.as_deref())
            .into_iter()
            .collect();
    let staging = options
        .output_dir
        .join(format!(".{}.staging", module.name));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = (|| {
        for (name, content) in &artifacts {
            fs::write(staging.join(name), content)?;
        }
        reconcile(&staging, &options.output_dir, &module.name, &prior, config.dry_run)
    })();
    // The staging area is scratch space; discard it even on the error path.
    let _ = fs::remove_dir_all(&staging);

    if let Ok(outcome) = &result {
        info!(
            module = %module.name,
            added = outcome.added.len(),
            changed = outcome.changed.len(),
            removed = outcome.removed.len(),
            unchanged = outcome.unchanged.len(),
            "generation complete"
        );
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════════

struct ClassOutput {
    pyname: String,
    binding: String,
    trampoline: Option<String>,
    publicist: Option<String>,
}

/// Run every generation phase in order and return the complete file set,
/// keyed by file name.
fn build_artifacts(
    module: &ModuleSpec,
    options: &OutputOptions,
    config: &GenConfig,
) -> Result<BTreeMap<String, String>> {
    let expanded = expand_module(module)?;
    let mut resolver = AttrResolver::new(&expanded);
    let name = expanded.name.clone();

    // Concrete classes bound by this module, in declaration order
    // (instantiation results follow the plain classes).
    let mut local: Vec<&ClassDecl> = Vec::new();
    let mut imports: Vec<String> = Vec::new();
    for class in &expanded.classes {
        let attrs = resolver.resolve_class(&class.name)?;
        if let Some(owner_module) = &attrs.module {
            if *owner_module != name {
                if !imports.contains(owner_module) {
                    imports.push(owner_module.clone());
                }
                continue;
            }
        }
        if attrs.is_template() || attrs.ignore {
            continue;
        }
        local.push(class);
    }

    // Module-level enum export names must be unique.
    let mut enum_names: HashSet<&str> = HashSet::new();
    for decl in &expanded.enums {
        if !enum_names.insert(&decl.name) {
            return Err(GenError::DuplicateExportName(decl.name.clone()));
        }
    }

    // Shims, one per concrete class, tracked by export name so a class
    // reached through more than one instantiation chain is emitted once.
    let mut seen_shims: HashSet<String> = HashSet::new();
    let mut classes: Vec<ClassOutput> = Vec::new();
    for class in &local {
        let attrs = resolver.resolve_class(&class.name)?;
        let (trampoline, publicist) = if seen_shims.insert(attrs.pyname.clone()) {
            (
                emit_trampoline(&mut resolver, &class.name)?,
                emit_publicist(&mut resolver, &class.name)?,
            )
        } else {
            (None, None)
        };
        debug!(class = %attrs.pyname, trampoline = trampoline.is_some(), publicist = publicist.is_some(), "emitting class");
        let binding = emit_class(
            &mut resolver,
            config,
            class,
            trampoline.is_some(),
            publicist.is_some(),
        )?;
        classes.push(ClassOutput {
            pyname: attrs.pyname,
            binding,
            trampoline,
            publicist,
        });
    }

    // Header: pybind11 includes, namespace alias, comma macro, user
    // includes, usings, preamble, opaque markers.
    let mut header = String::new();
    header.push_str(&format!(
        "//------------------------------------------------------------------------------\n\
         // Module {}\n\
         //------------------------------------------------------------------------------\n\
         // Put Python includes first to avoid compile warnings about redefining _POSIX_C_SOURCE\n\
         #include \"pybind11/pybind11.h\"\n\
         #include \"pybind11/stl_bind.h\"\n\
         #include \"pybind11/stl.h\"\n\
         #include \"pybind11/functional.h\"\n\
         #include \"pybind11/operators.h\"\n\n\
         namespace py = pybind11;\n\
         using namespace pybind11::literals;\n\n\
         #define BINDFORGE_COMMA ,\n\n",
        name
    ));
    for include in &expanded.includes {
        header.push_str(&format!("#include {}\n", include));
    }
    if !expanded.includes.is_empty() {
        header.push('\n');
    }
    for ns in &expanded.namespaces {
        header.push_str(&format!("using namespace {};\n", ns));
    }
    for scopename in &expanded.scopenames {
        header.push_str(&format!("using {};\n", scopename));
    }
    if !expanded.namespaces.is_empty() || !expanded.scopenames.is_empty() {
        header.push('\n');
    }
    if let Some(preamble) = &expanded.preamble {
        header.push_str(preamble);
        header.push_str("\n\n");
    }

    let mut opaque = String::new();
    for container in &expanded.containers {
        if let Some(marker) = emit_opaque_marker(container) {
            opaque.push_str(&marker);
        }
    }
    for type_name in &expanded.opaque {
        opaque.push_str(&format!(
            "PYBIND11_MAKE_OPAQUE({})\n",
            type_name.replace(',', " BINDFORGE_COMMA ")
        ));
    }
    if !opaque.is_empty() {
        opaque.push('\n');
    }

    // Entry-block sections.
    let mut entry = String::new();
    entry.push_str(&format!(
        "//------------------------------------------------------------------------------\n\
         // Make the module\n\
         //------------------------------------------------------------------------------\n\
         PYBIND11_MODULE({}, m) {{\n\n",
        name
    ));
    if let Some(doc) = &expanded.doc {
        entry.push_str(&format!("  m.doc() = {};\n\n", doc_literal(doc)));
    }
    if !imports.is_empty() {
        entry.push_str("  // Import external modules\n");
        for import in &imports {
            entry.push_str(&format!("  py::module_::import(\"{}\");\n", import));
        }
        entry.push('\n');
    }

    let mut container_calls = String::new();
    for container in &expanded.containers {
        container_calls.push_str(&emit_container(container));
    }

    let mut enums = String::new();
    for decl in &expanded.enums {
        enums.push_str(&emit_enum(decl, "m", None)?);
    }

    let mut functions = String::new();
    for func in &expanded.functions {
        let attrs = resolver.resolve_function(func)?;
        if attrs.is_template() || attrs.ignore {
            continue;
        }
        functions.push_str(&emit_function(&resolver, func)?);
    }

    let mut module_attrs = String::new();
    for attr in &expanded.attributes {
        module_attrs.push_str(&emit_module_attr(attr));
    }

    let mut artifacts: BTreeMap<String, String> = BTreeMap::new();
    if options.split {
        assemble_split(
            &name,
            options,
            header,
            opaque,
            entry,
            container_calls,
            enums,
            classes,
            functions,
            module_attrs,
            &mut artifacts,
        );
    } else {
        assemble_monolithic(
            &name,
            header,
            opaque,
            entry,
            container_calls,
            enums,
            classes,
            functions,
            module_attrs,
            &mut artifacts,
        );
        if let Some(manifest) = &options.manifest {
            let listing: String = artifacts.keys().map(|k| format!("{}\n", k)).collect();
            artifacts.insert(manifest.clone(), listing);
        }
    }
    Ok(artifacts)
}

#[allow(clippy::too_many_arguments)]
fn assemble_monolithic(
    name: &str,
    header: String,
    opaque: String,
    entry: String,
    containers: String,
    enums: String,
    classes: Vec<ClassOutput>,
    functions: String,
    module_attrs: String,
    artifacts: &mut BTreeMap<String, String>,
) {
    let mut out = header;
    out.push_str(&opaque);
    for class in &classes {
        if let Some(trampoline) = &class.trampoline {
            out.push_str(trampoline);
        }
    }
    for class in &classes {
        if let Some(publicist) = &class.publicist {
            out.push_str(publicist);
        }
    }
    out.push_str(&entry);
    if !containers.is_empty() {
        out.push_str("  //..............................................................................\n  // STL bindings\n");
        out.push_str(&containers);
        out.push('\n');
    }
    if !enums.is_empty() {
        out.push_str("  //..............................................................................\n  // enum types\n");
        out.push_str(&enums);
    }
    for class in &classes {
        out.push_str(&class.binding);
    }
    if !functions.is_empty() {
        out.push_str("  //...........................................................................\n  // Methods\n");
        out.push_str(&functions);
        out.push('\n');
    }
    if !module_attrs.is_empty() {
        out.push_str("  //...........................................................................\n  // Module attributes\n");
        out.push_str(&module_attrs);
    }
    out.push_str("}\n");
    artifacts.insert(format!("{}.cc", name), out);
}

#[allow(clippy::too_many_arguments)]
fn assemble_split(
    name: &str,
    options: &OutputOptions,
    header: String,
    opaque: String,
    entry: String,
    containers: String,
    enums: String,
    classes: Vec<ClassOutput>,
    functions: String,
    module_attrs: String,
    artifacts: &mut BTreeMap<String, String>,
) {
    // Master header aggregating shared declarations.
    let mut master = header;
    master.push_str(&opaque);
    artifacts.insert(format!("{}.hh", name), master);

    // One file per bound class, plus shim headers.
    for class in &classes {
        let mut includes = format!("#include \"{}.hh\"\n", name);
        if let Some(trampoline) = &class.trampoline {
            let file = format!("{}_{}_trampoline.hh", name, class.pyname);
            includes.push_str(&format!("#include \"{}\"\n", file));
            artifacts.insert(file, trampoline.clone());
        }
        if let Some(publicist) = &class.publicist {
            let file = format!("{}_{}_publicist.hh", name, class.pyname);
            includes.push_str(&format!("#include \"{}\"\n", file));
            artifacts.insert(file, publicist.clone());
        }
        let unit = format!(
            "//------------------------------------------------------------------------------\n\
             // Bindings for class {pyname}\n\
             //------------------------------------------------------------------------------\n\
             {includes}\nvoid bind{pyname}(py::module_& m) {{\n{binding}}}\n",
            pyname = class.pyname,
            includes = includes,
            binding = class.binding,
        );
        artifacts.insert(format!("{}_{}.cc", name, class.pyname), unit);
    }

    if !containers.is_empty() {
        let unit = format!(
            "//------------------------------------------------------------------------------\n\
             // Container bindings for module {name}\n\
             //------------------------------------------------------------------------------\n\
             #include \"{name}.hh\"\n\nvoid bindModuleContainers(py::module_& m) {{\n{containers}}}\n",
            name = name,
            containers = containers,
        );
        artifacts.insert(format!("{}_containers.cc", name), unit);
    }

    // Main translation unit: forward declarations and the module entry.
    let mut main = format!("#include \"{}.hh\"\n\n", name);
    main.push_str("// Forward declare the binding functions\n");
    if !containers.is_empty() {
        main.push_str("void bindModuleContainers(py::module_& m);\n");
    }
    for class in &classes {
        main.push_str(&format!("void bind{}(py::module_& m);\n", class.pyname));
    }
    main.push('\n');
    main.push_str(&entry);
    if !containers.is_empty() {
        main.push_str("  bindModuleContainers(m);\n\n");
    }
    if !enums.is_empty() {
        main.push_str("  //..............................................................................\n  // enum types\n");
        main.push_str(&enums);
    }
    for class in &classes {
        main.push_str(&format!("  bind{}(m);\n", class.pyname));
    }
    if !classes.is_empty() {
        main.push('\n');
    }
    if !functions.is_empty() {
        main.push_str("  //...........................................................................\n  // Methods\n");
        main.push_str(&functions);
        main.push('\n');
    }
    if !module_attrs.is_empty() {
        main.push_str("  //...........................................................................\n  // Module attributes\n");
        main.push_str(&module_attrs);
    }
    main.push_str("}\n");
    artifacts.insert(format!("{}.cc", name), main);

    // Manifest of every generated file, one path per line.
    if let Some(manifest) = &options.manifest {
        let listing: String = artifacts.keys().map(|k| format!("{}\n", k)).collect();
        artifacts.insert(manifest.clone(), listing);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════════

fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn has_skip_marker(path: &Path) -> bool {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().next().map(str::trim) == Some(SKIP_SENTINEL),
        Err(_) => false,
    }
}

/// Whether a committed file name follows the module's own artifact naming
/// scheme (`<module>.cc`, `<module>.hh`, `<module>_*.cc`, `<module>_*.hh`).
fn module_artifact(module: &str, file_name: &str) -> bool {
    if !(file_name.ends_with(".cc") || file_name.ends_with(".hh")) {
        return false;
    }
    file_name == format!("{}.cc", module)
        || file_name == format!("{}.hh", module)
        || file_name.starts_with(&format!("{}_", module))
}

/// File names the previous run recorded in the committed manifest, when one
/// is configured and present.
fn manifest_entries(committed: &Path, manifest: Option<&str>) -> Vec<String> {
    let manifest = match manifest {
        Some(name) => name,
        None => return Vec::new(),
    };
    match fs::read_to_string(committed.join(manifest)) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Top-level file names in a directory, ignoring dot-prefixed entries (the
/// staging directory itself lives under the committed directory).
fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|e| GenError::config(format!("scan failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') {
            continue;
        }
        names.push(file_name);
    }
    names.sort();
    Ok(names)
}

/// Directory-level diff and one-file-at-a-time replacement. Skip-marked
/// committed files are excluded from both replacement and removal, and
/// only files the generator can have written — prior-manifest entries or
/// module-named artifacts — are ever candidates for removal. Even if
/// interrupted, the committed set stays valid: untouched files are never
/// rewritten.
fn reconcile(
    staging: &Path,
    committed: &Path,
    module: &str,
    prior: &HashSet<String>,
    dry_run: bool,
) -> Result<Reconciliation> {
    let staged_names = list_files(staging)?;
    let committed_names = list_files(committed)?;
    let mut outcome = Reconciliation::default();

    for file_name in &staged_names {
        let staged_path = staging.join(file_name);
        let committed_path = committed.join(file_name);
        if committed_path.exists() {
            if has_skip_marker(&committed_path) {
                warn!(file = %file_name, "skip marker present; leaving committed file untouched");
                outcome.skipped.push(file_name.clone());
                continue;
            }
            if file_digest(&staged_path)? == file_digest(&committed_path)? {
                outcome.unchanged.push(file_name.clone());
                continue;
            }
            if !dry_run {
                fs::copy(&staged_path, &committed_path)?;
            }
            debug!(file = %file_name, "updated");
            outcome.changed.push(file_name.clone());
        } else {
            if !dry_run {
                fs::copy(&staged_path, &committed_path)?;
            }
            debug!(file = %file_name, "added");
            outcome.added.push(file_name.clone());
        }
    }

    for file_name in &committed_names {
        if staged_names.contains(file_name) {
            continue;
        }
        // Not a previously generated file; leave it alone.
        if !prior.contains(file_name) && !module_artifact(module, file_name) {
            continue;
        }
        let committed_path = committed.join(file_name);
        if has_skip_marker(&committed_path) {
            warn!(file = %file_name, "skip marker present; leaving stale file in place");
            outcome.skipped.push(file_name.clone());
            continue;
        }
        if !dry_run {
            fs::remove_file(&committed_path)?;
        }
        debug!(file = %file_name, "removed stale output");
        outcome.removed.push(file_name.clone());
    }

    Ok(outcome)
}
