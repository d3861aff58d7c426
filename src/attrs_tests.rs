#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::attrs::AttrResolver;
    use crate::error::GenError;
    use crate::model::{ClassDecl, Metadata, MethodDecl, ModuleSpec};

    fn class(name: &str) -> ClassDecl {
        ClassDecl::new(name)
    }

    fn method(name: &str) -> MethodDecl {
        MethodDecl {
            name: name.to_string(),
            returns: Some("void".to_string()),
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

    #[test]
    fn test_resolution_is_idempotent() {
        let mut base = class("Base");
        base.metadata.namespace = Some("Outer".to_string());
        let mut derived = class("Derived");
        derived.bases = vec!["Base".to_string()];
        let module = module_with(vec![base, derived]);

        let mut resolver = AttrResolver::new(&module);
        let first = resolver.resolve_class("Derived").unwrap();
        let second = resolver.resolve_class("Derived").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_own_explicit_value_wins_over_ancestors() {
        let mut base = class("Base");
        base.metadata.namespace = Some("BaseSpace".to_string());
        base.metadata.module = Some("othermod".to_string());
        let mut derived = class("Derived");
        derived.bases = vec!["Base".to_string()];
        derived.metadata.namespace = Some("DerivedSpace".to_string());
        let module = module_with(vec![base, derived]);

        let mut resolver = AttrResolver::new(&module);
        let attrs = resolver.resolve_class("Derived").unwrap();
        assert_eq!(attrs.namespace, "DerivedSpace::");
        // Not set explicitly, so the ancestor's value holds.
        assert_eq!(attrs.module.as_deref(), Some("othermod"));
    }

    #[test]
    fn test_most_derived_ancestor_wins() {
        let mut a = class("A");
        a.metadata.namespace = Some("SpaceA".to_string());
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        b.metadata.namespace = Some("SpaceB".to_string());
        let mut c = class("C");
        c.bases = vec!["B".to_string()];
        let module = module_with(vec![a, b, c]);

        let mut resolver = AttrResolver::new(&module);
        let attrs = resolver.resolve_class("C").unwrap();
        assert_eq!(attrs.namespace, "SpaceB::");
    }

    #[test]
    fn test_template_list_is_inherited() {
        let mut a = class("A");
        a.metadata.template = Some(vec!["typename T1".to_string(), "typename T2".to_string()]);
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        let module = module_with(vec![a, b]);

        let mut resolver = AttrResolver::new(&module);
        let attrs = resolver.resolve_class("B").unwrap();
        assert_eq!(attrs.template_param_names(), vec!["T1".to_string(), "T2".to_string()]);
        assert_eq!(attrs.full_cppname, "B<%(T1)s, %(T2)s>");
    }

    #[test]
    fn test_empty_template_list_suppresses_inherited_parameters() {
        let mut a = class("A");
        a.metadata.template = Some(vec!["typename T1".to_string()]);
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        b.metadata.template = Some(vec![]);
        let module = module_with(vec![a, b]);

        let mut resolver = AttrResolver::new(&module);
        let attrs = resolver.resolve_class("B").unwrap();
        assert!(!attrs.is_template());
        assert_eq!(attrs.full_cppname, "B");
    }

    #[test]
    fn test_template_dict_merges_down_the_hierarchy() {
        let mut a = class("A");
        a.metadata.template = Some(vec!["typename T1".to_string()]);
        let mut dict_a = std::collections::BTreeMap::new();
        dict_a.insert("T1".to_string(), "int".to_string());
        a.metadata.template_dict = Some(dict_a);
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        let mut dict_b = std::collections::BTreeMap::new();
        dict_b.insert("T1".to_string(), "double".to_string());
        b.metadata.template_dict = Some(dict_b);
        let module = module_with(vec![a, b]);

        let mut resolver = AttrResolver::new(&module);
        let attrs = resolver.resolve_class("B").unwrap();
        assert_eq!(attrs.template_dict.get("T1").map(String::as_str), Some("double"));
    }

    #[test]
    fn test_method_takes_enclosing_fields_from_subclass() {
        let mut base = class("Base");
        base.metadata.namespace = Some("BaseSpace".to_string());
        base.methods = vec![method("work")];
        let mut derived = class("Derived");
        derived.bases = vec!["Base".to_string()];
        derived.metadata.namespace = Some("DerivedSpace".to_string());
        derived.metadata.module = Some("dmod".to_string());
        let module = module_with(vec![base, derived]);

        let mut resolver = AttrResolver::new(&module);
        let owner = resolver.resolve_class("Derived").unwrap();
        let base_decl = module.class("Base").unwrap();
        let attrs = resolver
            .resolve_method(&owner, &base_decl.methods[0])
            .unwrap();
        assert_eq!(attrs.namespace, "DerivedSpace::");
        assert_eq!(attrs.module.as_deref(), Some("dmod"));
    }

    #[test]
    fn test_diamond_mro_order() {
        let a = class("A");
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        let mut c = class("C");
        c.bases = vec!["A".to_string()];
        let mut d = class("D");
        d.bases = vec!["B".to_string(), "C".to_string()];
        let module = module_with(vec![a, b, c, d]);

        let mut resolver = AttrResolver::new(&module);
        let mro = resolver.mro("D").unwrap();
        let expected: Vec<String> = ["D", "B", "C", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(mro, expected);
    }

    #[test]
    fn test_inconsistent_hierarchy_fails() {
        let a = class("A");
        let b = class("B");
        let mut c = class("C");
        c.bases = vec!["A".to_string(), "B".to_string()];
        let mut d = class("D");
        d.bases = vec!["B".to_string(), "A".to_string()];
        let mut e = class("E");
        e.bases = vec!["C".to_string(), "D".to_string()];
        let module = module_with(vec![a, b, c, d, e]);

        let mut resolver = AttrResolver::new(&module);
        let err = resolver.mro("E").unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_unknown_base_is_configuration_error() {
        let mut orphan = class("Orphan");
        orphan.bases = vec!["Missing".to_string()];
        let module = module_with(vec![orphan]);

        let mut resolver = AttrResolver::new(&module);
        let err = resolver.resolve_class("Orphan").unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_static_virtual_method_is_rejected() {
        let mut m = method("bad");
        m.metadata.is_static = Some(true);
        m.metadata.is_virtual = Some(true);
        let mut c = class("C");
        c.methods = vec![m];
        let module = module_with(vec![c]);

        let mut resolver = AttrResolver::new(&module);
        let owner = resolver.resolve_class("C").unwrap();
        let err = resolver
            .resolve_method(&owner, &module.class("C").unwrap().methods[0])
            .unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_pure_virtual_implies_virtual() {
        let mut m = method("f");
        m.metadata.pure_virtual = Some(true);
        let mut c = class("C");
        c.methods = vec![m];
        let module = module_with(vec![c]);

        let mut resolver = AttrResolver::new(&module);
        let owner = resolver.resolve_class("C").unwrap();
        let attrs = resolver
            .resolve_method(&owner, &module.class("C").unwrap().methods[0])
            .unwrap();
        assert!(attrs.is_virtual);
        assert!(attrs.pure_virtual);
    }

    #[test]
    fn test_nonvirtual_redeclaration_shadows_base_virtual() {
        let mut f = method("f");
        f.metadata.pure_virtual = Some(true);
        let mut a = class("A");
        a.methods = vec![f];
        let mut b = class("B");
        b.bases = vec!["A".to_string()];
        b.methods = vec![method("f")];
        let module = module_with(vec![a, b]);

        let mut resolver = AttrResolver::new(&module);
        assert_eq!(resolver.virtual_methods("A").unwrap().len(), 1);
        // B fully defines f, so nothing is left to forward.
        assert!(resolver.virtual_methods("B").unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_metadata_key_is_a_configuration_error() {
        let text = r#"{"name": "m", "classes": [{"name": "A", "metadata": {"virtaul": true}}]}"#;
        match ModuleSpec::from_json(text).unwrap_err() {
            GenError::Configuration(msg) => assert!(msg.contains("virtaul")),
            other => panic!("expected Configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        let err = ModuleSpec::from_json("{\"name\": ").unwrap_err();
        assert!(matches!(err, GenError::Parse(_)));
    }
}
