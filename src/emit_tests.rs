#[cfg(test)]
mod tests {
    use crate::attrs::AttrResolver;
    use crate::emit::{emit_class, emit_container, emit_enum, emit_function, GenConfig};
    use crate::error::GenError;
    use crate::model::{
        ArgDecl, AttrKind, AttributeDecl, ClassDecl, ContainerBinding, ContainerKind, EnumDecl,
        FunctionDecl, Metadata, MethodDecl, ModuleSpec,
    };
    use crate::publicist::emit_publicist;
    use crate::trampoline::emit_trampoline;

    fn arg(name: &str, cpp_type: &str) -> ArgDecl {
        ArgDecl {
            name: name.to_string(),
            cpp_type: cpp_type.to_string(),
            default: None,
        }
    }

    fn method(name: &str, returns: Option<&str>) -> MethodDecl {
        MethodDecl {
            name: name.to_string(),
            returns: returns.map(|r| r.to_string()),
            args: vec![],
            doc: None,
            constructor: false,
            metadata: Metadata::default(),
        }
    }

    fn module_with(classes: Vec<ClassDecl>) -> ModuleSpec {
        let mut module = ModuleSpec::new("testmod");
        module.classes = classes;
        module
    }

    // ── trampolines ────────────────────────────────────────────────────────────

    #[test]
    fn test_trampoline_emitted_for_base_not_override() {
        let mut f = method("f", Some("int"));
        f.metadata.pure_virtual = Some(true);
        f.args = vec![arg("x", "int")];
        let mut a = ClassDecl::new("A");
        a.methods = vec![f];

        let mut g = method("f", Some("int"));
        g.args = vec![arg("x", "int")];
        let mut b = ClassDecl::new("B");
        b.bases = vec!["A".to_string()];
        b.methods = vec![g];

        let module = module_with(vec![a, b]);
        let mut resolver = AttrResolver::new(&module);

        let shim_a = emit_trampoline(&mut resolver, "A").unwrap();
        let shim_b = emit_trampoline(&mut resolver, "B").unwrap();
        assert!(shim_a.is_some());
        assert!(shim_b.is_none());

        let text = shim_a.unwrap();
        assert!(text.contains("class TrampolineA: public A"));
        assert!(text.contains("PYBIND11_OVERRIDE_PURE(int,"));
        assert!(text.contains("#ifndef __trampoline_A__"));
        assert!(text.contains("using A::A;"));
    }

    #[test]
    fn test_trampoline_forwards_nonpure_to_default() {
        let mut f = method("step", Some("void"));
        f.metadata.is_virtual = Some(true);
        f.metadata.is_const = Some(true);
        f.args = vec![arg("dt", "double")];
        let mut c = ClassDecl::new("Integrator");
        c.methods = vec![f];

        let module = module_with(vec![c]);
        let mut resolver = AttrResolver::new(&module);
        let text = emit_trampoline(&mut resolver, "Integrator").unwrap().unwrap();
        assert!(text.contains("virtual void step(double dt) const override"));
        assert!(text.contains("PYBIND11_OVERRIDE(void,"));
        assert!(!text.contains("PYBIND11_OVERRIDE_PURE"));
    }

    #[test]
    fn test_trampoline_substitutes_inherited_template_parameters() {
        let mut f = method("func", Some("void"));
        f.metadata.is_virtual = Some(true);
        f.args = vec![arg("x", "const %(T1)s&")];
        let mut generic = ClassDecl::new("A");
        generic.metadata.template = Some(vec!["typename T1".to_string()]);
        generic.methods = vec![f];

        let mut module = module_with(vec![generic]);
        module.instantiations = vec![crate::model::Instantiation {
            generic: "A".to_string(),
            name: None,
            parameters: Some(crate::model::BindingSpec::Scalar("double".to_string())),
            cppname: None,
            pyname: None,
            docext: None,
            ignore: None,
        }];
        let expanded = crate::template::expand_module(&module).unwrap();
        let mut resolver = AttrResolver::new(&expanded);

        let text = emit_trampoline(&mut resolver, "A_double").unwrap().unwrap();
        assert!(text.contains("public A<double>"));
        assert!(text.contains("const double& x"));
        assert!(!text.contains("%(T1)s"));
    }

    #[test]
    fn test_virtual_with_custom_implementation_has_no_default() {
        let mut f = method("f", Some("void"));
        f.metadata.is_virtual = Some(true);
        f.metadata.implementation = Some("[](A&) {}".to_string());
        let mut a = ClassDecl::new("A");
        a.methods = vec![f];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let err = emit_trampoline(&mut resolver, "A").unwrap_err();
        assert!(matches!(err, GenError::MissingDefault { .. }));
    }

    #[test]
    fn test_comma_types_are_macro_protected() {
        let mut f = method("table", Some("std::map<int, double>"));
        f.metadata.is_virtual = Some(true);
        let mut a = ClassDecl::new("A");
        a.methods = vec![f];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let text = emit_trampoline(&mut resolver, "A").unwrap().unwrap();
        assert!(text.contains("PYBIND11_OVERRIDE(PYBIND11_TYPE(std::map<int, double>),"));
    }

    // ── publicists ─────────────────────────────────────────────────────────────

    #[test]
    fn test_publicist_deduplicates_overloads() {
        let mut f1 = method("guard", Some("void"));
        f1.metadata.protected = Some(true);
        f1.args = vec![arg("x", "int")];
        let mut f2 = method("guard", Some("void"));
        f2.metadata.protected = Some(true);
        f2.args = vec![arg("x", "double")];
        let mut a = ClassDecl::new("A");
        a.methods = vec![f1, f2];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let text = emit_publicist(&mut resolver, "A").unwrap().unwrap();
        assert_eq!(text.matches("using A::guard;").count(), 1);
        assert!(text.contains("#ifndef __publicist_A__"));
        assert!(text.contains("class PublicistA: public A"));
    }

    #[test]
    fn test_no_publicist_for_inherited_protected_methods() {
        let mut f = method("guard", Some("void"));
        f.metadata.protected = Some(true);
        let mut a = ClassDecl::new("A");
        a.methods = vec![f];
        let mut b = ClassDecl::new("B");
        b.bases = vec!["A".to_string()];

        let module = module_with(vec![a, b]);
        let mut resolver = AttrResolver::new(&module);
        assert!(emit_publicist(&mut resolver, "A").unwrap().is_some());
        // B declares nothing protected of its own.
        assert!(emit_publicist(&mut resolver, "B").unwrap().is_none());
    }

    // ── functions ──────────────────────────────────────────────────────────────

    #[test]
    fn test_function_binding_with_signature_cast() {
        let mut func = FunctionDecl {
            name: "magnitude".to_string(),
            returns: Some("double".to_string()),
            args: vec![arg("v", "const Vector&")],
            doc: Some("Length of a vector".to_string()),
            metadata: Metadata::default(),
        };
        func.metadata.namespace = Some("Geom".to_string());
        let module = ModuleSpec::new("testmod");
        let resolver = AttrResolver::new(&module);

        let text = emit_function(&resolver, &func).unwrap();
        assert_eq!(
            text,
            "  m.def(\"magnitude\", (double (*)(const Vector&)) &Geom::magnitude, \"v\"_a, \"Length of a vector\");\n"
        );
    }

    #[test]
    fn test_function_policies_and_defaults() {
        let mut func = FunctionDecl {
            name: "lookup".to_string(),
            returns: Some("Node&".to_string()),
            args: vec![ArgDecl {
                name: "idx".to_string(),
                cpp_type: "int".to_string(),
                default: Some("0".to_string()),
            }],
            doc: None,
            metadata: Metadata::default(),
        };
        func.metadata.returnpolicy = Some("reference_internal".to_string());
        func.metadata.call_guard = Some("py::gil_scoped_release".to_string());
        func.metadata.keepalive = Some((1, 2));
        func.metadata.noconvert = Some(true);
        let module = ModuleSpec::new("testmod");
        let resolver = AttrResolver::new(&module);

        let text = emit_function(&resolver, &func).unwrap();
        assert!(text.contains("\"idx\"_a.noconvert()=0"));
        assert!(text.contains("py::return_value_policy::reference_internal"));
        assert!(text.contains("py::call_guard<py::gil_scoped_release>()"));
        assert!(text.contains("py::keep_alive<1, 2>()"));
    }

    #[test]
    fn test_function_implementation_short_circuits() {
        let mut func = FunctionDecl {
            name: "version".to_string(),
            returns: Some("std::string".to_string()),
            args: vec![],
            doc: None,
            metadata: Metadata::default(),
        };
        func.metadata.implementation = Some("[]() { return \"1.0\"; }".to_string());
        let module = ModuleSpec::new("testmod");
        let resolver = AttrResolver::new(&module);

        let text = emit_function(&resolver, &func).unwrap();
        assert!(text.contains("m.def(\"version\", []() { return \"1.0\"; });"));
        assert!(!text.contains("&version"));
    }

    // ── enums and containers ───────────────────────────────────────────────────

    #[test]
    fn test_module_enum_binding() {
        let decl = EnumDecl {
            name: "Color".to_string(),
            values: vec!["red".to_string(), "green".to_string()],
            cppname: None,
            namespace: Some("Art".to_string()),
            export_values: true,
            native_type: "enum.IntEnum".to_string(),
            doc: None,
        };
        let text = emit_enum(&decl, "m", None).unwrap();
        assert!(text.contains("py::native_enum<Art::Color>(m, \"Color\", \"enum.IntEnum\")"));
        assert!(text.contains(".value(\"red\", Art::Color::red)"));
        assert!(text.contains(".export_values()"));
        assert!(text.contains(".finalize();"));
    }

    #[test]
    fn test_nested_enum_binds_under_class_scope() {
        let decl = EnumDecl {
            name: "Mode".to_string(),
            values: vec!["fast".to_string()],
            cppname: None,
            namespace: None,
            export_values: false,
            native_type: "enum.IntEnum".to_string(),
            doc: None,
        };
        let mut owner_class = ClassDecl::new("Solver");
        owner_class.enums = vec![decl.clone()];
        let module = module_with(vec![owner_class]);
        let mut resolver = AttrResolver::new(&module);
        let owner = resolver.resolve_class("Solver").unwrap();

        let text = emit_enum(&decl, "obj", Some(&owner)).unwrap();
        assert!(text.contains("py::native_enum<Solver::Mode>(obj, \"Mode\""));
        assert!(text.contains(".value(\"fast\", Solver::Mode::fast)"));
    }

    #[test]
    fn test_container_bindings() {
        let vec_binding = ContainerBinding {
            name: "vector_of_double".to_string(),
            kind: ContainerKind::Vector {
                element: "double".to_string(),
            },
            opaque: true,
            local: Some(true),
        };
        let map_binding = ContainerBinding {
            name: "map_int_string".to_string(),
            kind: ContainerKind::Map {
                key: "int".to_string(),
                value: "std::string".to_string(),
            },
            opaque: false,
            local: None,
        };

        assert_eq!(
            crate::emit::emit_opaque_marker(&vec_binding).unwrap(),
            "PYBIND11_MAKE_OPAQUE(PYBIND11_TYPE(std::vector<double>));\n"
        );
        assert!(crate::emit::emit_opaque_marker(&map_binding).is_none());
        assert_eq!(
            emit_container(&vec_binding),
            "  py::bind_vector<std::vector<double>>(m, \"vector_of_double\", py::module_local(true));\n"
        );
        assert_eq!(
            emit_container(&map_binding),
            "  py::bind_map<std::map<int, std::string>>(m, \"map_int_string\");\n"
        );
    }

    // ── classes ────────────────────────────────────────────────────────────────

    #[test]
    fn test_class_binding_block() {
        let ctor = MethodDecl {
            name: "init".to_string(),
            returns: None,
            args: vec![arg("n", "int")],
            doc: Some("Construct with size".to_string()),
            constructor: true,
            metadata: Metadata::default(),
        };
        let mut getter = method("size", Some("int"));
        getter.metadata.is_const = Some(true);
        let mut a = ClassDecl::new("Buffer");
        a.methods = vec![ctor, getter];
        a.attributes = vec![AttributeDecl {
            name: "capacity".to_string(),
            kind: AttrKind::Readonly,
            cppname: None,
            getter: None,
            setter: None,
            returnpolicy: None,
            is_static: false,
            doc: None,
        }];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let decl = module.class("Buffer").unwrap();
        let text = emit_class(&mut resolver, &GenConfig::default(), decl, false, false).unwrap();

        assert!(text.contains("py::class_<Buffer, py::smart_holder> obj(m, \"Buffer\")"));
        assert!(text.contains("obj.def(py::init<int>(), \"n\"_a, \"Construct with size\");"));
        assert!(text.contains("obj.def(\"size\", (int (Buffer::*)() const) &Buffer::size);"));
        assert!(text.contains("obj.def_readonly(\"capacity\", &Buffer::capacity);"));
    }

    #[test]
    fn test_class_binding_with_trampoline_and_bases() {
        let mut f = method("f", Some("void"));
        f.metadata.is_virtual = Some(true);
        let mut base = ClassDecl::new("Base");
        base.methods = vec![f];
        let mut derived = ClassDecl::new("Derived");
        derived.bases = vec!["Base".to_string()];

        let module = module_with(vec![base, derived]);
        let mut resolver = AttrResolver::new(&module);
        let decl = module.class("Derived").unwrap();
        let text = emit_class(&mut resolver, &GenConfig::default(), decl, true, false).unwrap();
        assert!(
            text.contains("py::class_<Derived, TrampolineDerived, Base, py::smart_holder> obj")
        );
    }

    #[test]
    fn test_protected_method_bound_through_publicist() {
        let mut f = method("guard", Some("void"));
        f.metadata.protected = Some(true);
        let mut a = ClassDecl::new("A");
        a.methods = vec![f];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let decl = module.class("A").unwrap();
        let text = emit_class(&mut resolver, &GenConfig::default(), decl, false, true).unwrap();
        assert!(text.contains("&PublicistA::guard"));
    }

    #[test]
    fn test_unresolved_owner_dictionary_fails_before_emission() {
        let mut dict = std::collections::BTreeMap::new();
        dict.insert("T1".to_string(), "std::vector<%(T1)s>".to_string());
        let mut a = ClassDecl::new("A");
        a.metadata.template = Some(vec![]);
        a.metadata.template_dict = Some(dict);
        a.methods = vec![method("f", Some("void"))];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let decl = module.class("A").unwrap();
        let err = emit_class(&mut resolver, &GenConfig::default(), decl, false, false).unwrap_err();
        assert!(matches!(err, GenError::UnresolvedTemplate { .. }));
    }

    #[test]
    fn test_ignored_method_is_omitted() {
        let mut f = method("hidden", Some("void"));
        f.metadata.ignore = Some(true);
        let mut a = ClassDecl::new("A");
        a.methods = vec![f, method("visible", Some("void"))];

        let module = module_with(vec![a]);
        let mut resolver = AttrResolver::new(&module);
        let decl = module.class("A").unwrap();
        let text = emit_class(&mut resolver, &GenConfig::default(), decl, false, false).unwrap();
        assert!(!text.contains("hidden"));
        assert!(text.contains("visible"));
    }
}
