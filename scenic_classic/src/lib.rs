//! The classic scene text encoding: scanner, parser and writer.

#![forbid(unsafe_code)]

pub mod error;
pub mod header;
pub mod parser;
pub mod scanner;
pub mod writer;

pub use error::*;
pub use header::HeaderKind;
pub use parser::{HeaderCheck, Parser};
pub use writer::{Writer, write_scene};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use glam::{Mat3, Vec3};
    use scenic_core::{
        Access, Color, Environment, LoadControl, Node, NodeBehavior, NodeContext, NodeFactory,
        NodeRef, NodeRegistry, Rotation, Scene, SingleVector3, SpecificationTable,
    };
    use scenic_nodes::Catalog;

    use super::*;

    fn parse_named(filename: &str, source: &str) -> Result<Scene> {
        Parser::new(
            source,
            filename,
            &Catalog,
            Arc::new(NodeRegistry::new()),
            Arc::new(SpecificationTable::new()),
        )
        .library("classic")
        .parse()
    }

    fn parse(source: &str) -> Scene {
        parse_named("test.wrl", source).unwrap()
    }

    /// Nodes held by an SFNode or MFNode field.
    fn nodes_of(node: &NodeRef, field: &str) -> Vec<NodeRef> {
        node.with_field(field, |f| f.referenced_nodes()).unwrap()
    }

    /// Counts `on_field_changed` calls of every `Counter` it creates.
    struct Counting {
        changes: Arc<AtomicUsize>,
    }

    struct CounterBehavior(Arc<AtomicUsize>);

    impl NodeBehavior for CounterBehavior {
        fn on_field_changed(&self, _ctx: &mut NodeContext<'_>, _name: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl NodeFactory for Counting {
        fn create_node(&self, type_name: &str, environment: &Arc<Environment>) -> Option<NodeRef> {
            if type_name != "Counter" {
                return Catalog.create_node(type_name, environment);
            }
            let spec = environment.specifications().get_or_init("Counter", |spec| {
                spec.register_field("value", SingleVector3::default(), Access::GET_SET);
            });
            Some(Node::create(environment, spec, CounterBehavior(self.changes.clone())))
        }
    }

    #[test]
    fn self_route_end_to_end() {
        let changes = Arc::new(AtomicUsize::new(0));
        let factory = Counting { changes: changes.clone() };
        let scene = Parser::new(
            "#VRML V2.0 utf8\n\
             DEF Box1 Transform { translation 1 2 3 children [ Shape {} ] }\n\
             ROUTE Box1.translation TO Box1.translation\n\
             ROUTE Box1.translation_changed TO Box1.set_translation\n\
             DEF Seen Counter {}\n\
             ROUTE Box1.translation TO Seen.value\n",
            "test.wrl",
            &factory,
            Arc::new(NodeRegistry::new()),
            Arc::new(SpecificationTable::new()),
        )
        .parse()
        .unwrap();
        let children = scene.children();
        assert_eq!(children.len(), 2);
        let transform = &children[0];
        assert_eq!(transform.type_name(), "Transform");
        assert_eq!(transform.name(), "Box1");
        assert_eq!(transform.value::<Vec3>("translation").unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(nodes_of(transform, "children")[0].type_name(), "Shape");

        // the aliased declaration is the same route
        let connections = transform.connections();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].0, "translation");
        assert_eq!(connections[0].1.target, transform.id());
        assert_eq!(connections[1].1.target, children[1].id());

        transform
            .set_field("translation", &SingleVector3::new(Vec3::X))
            .unwrap();
        assert_eq!(transform.value::<Vec3>("translation").unwrap(), Vec3::X);
        assert_eq!(changes.load(Ordering::SeqCst), 1, "one notification cycle");
        assert_eq!(children[1].value::<Vec3>("value").unwrap(), Vec3::X);
    }

    #[test]
    fn use_of_an_ancestor_is_refused() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF A Group { children [ DEF B Group { children [ USE A ] } ] }\n",
        );
        let a = scene.find("A").unwrap();
        let b = scene.find("B").unwrap();
        assert_eq!(nodes_of(&a, "children")[0].id(), b.id());
        assert!(nodes_of(&b, "children").is_empty());
        assert_eq!(b.parents(), [(a.id(), 1)]);
        assert_eq!(a.parents(), [(scene.id(), 1)]);
        assert!(b.is_initialized());
    }

    #[test]
    fn skipped_node_is_forgotten() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF A Group { children [ USE A ] bogus 1 }\n\
             DEF C Group { children [ USE A ] }\n",
        );
        let registry = scene.environment().registry().clone();
        assert_eq!(scene.children().len(), 1);
        assert!(registry.node_by_name("A").is_none());
        let c = scene.find("C").unwrap();
        assert!(nodes_of(&c, "children").is_empty());

        drop(c);
        drop(scene);
        assert!(registry.is_empty());
    }

    #[test]
    fn degenerate_rotation_axis_is_identity() {
        let scene = parse("#VRML V2.0 utf8\nTransform { rotation 0 0 0 1 }\n");
        let rotation = scene.children()[0].value::<Rotation>("rotation").unwrap();
        assert_eq!(rotation, Rotation::IDENTITY);
    }

    #[test]
    fn malformed_declarations_are_skipped() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             Group { children [ Shape { } ] }\n\
             Unknown { foo 1 bar [ 1 2 ] { nested { deeper } } }\n\
             Material { diffuseColor 1 0 }\n\
             Material { bogusField 3 }\n\
             ] \n\
             WorldInfo { title \"ok\" }\n",
        );
        let types: Vec<_> = scene
            .children()
            .iter()
            .map(|n| n.type_name().to_string())
            .collect();
        assert_eq!(types, ["Group", "WorldInfo"]);
        assert_eq!(scene.children()[1].value::<String>("title").unwrap(), "ok");
    }

    #[test]
    fn unterminated_node_keeps_what_was_parsed() {
        let scene = parse("#VRML V2.0 utf8\nGroup {}\nShape { appearance Appearance {\n");
        assert_eq!(scene.children().len(), 1);
    }

    #[test]
    fn headers() {
        let vrml = "#VRML V2.0 utf8\nGroup {}\n";
        assert!(matches!(
            parse_named("scene.x3dv", vrml),
            Err(ParseError::HeaderMismatch { .. })
        ));
        assert!(parse_named("scene.txt", vrml).is_ok());
        assert!(parse_named("scene.WRL", vrml).is_ok());

        let err = parse_named("scene.wrl", "#VRML V1.0 ascii\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidHeader { .. }));
        assert_eq!(err.position(), Some(Position::START));

        let forced = Parser::new(
            vrml,
            "scene.txt",
            &Catalog,
            Arc::new(NodeRegistry::new()),
            Arc::new(SpecificationTable::new()),
        )
        .header_check(HeaderCheck::Require(HeaderKind::X3d))
        .parse();
        assert!(matches!(forced, Err(ParseError::HeaderMismatch { .. })));
    }

    #[test]
    fn def_and_use() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF Red Material { diffuseColor 1 0 0 }\n\
             Shape { appearance Appearance { material USE Red } }\n\
             Shape { appearance Appearance { material USE Missing } }\n",
        );
        let children = scene.children();
        assert_eq!(children.len(), 3);
        let red = scene.find("Red").unwrap();

        let appearance = nodes_of(&children[1], "appearance");
        assert_eq!(nodes_of(&appearance[0], "material")[0].id(), red.id());
        assert_eq!(red.value::<Color>("diffuseColor").unwrap(), Color::rgb(1.0, 0.0, 0.0));

        let appearance = nodes_of(&children[2], "appearance");
        assert!(nodes_of(&appearance[0], "material").is_empty());
    }

    #[test]
    fn x3d_metadata() {
        let scene = parse_named(
            "scene.x3dv",
            "#X3D V3.0 utf8\nPROFILE Immersive\nMETA \"author\" \"someone\"\nGroup {}\n",
        )
        .unwrap();
        assert_eq!(scene.profile(), Some("Immersive"));
        assert_eq!(scene.meta().get("author").map(String::as_str), Some("someone"));
        assert_eq!(scene.children().len(), 1);
    }

    #[test]
    fn dynamic_fields_and_extended_types() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF S Script { url \"a.js\" SFFloat speed 2.5 MFInt32 steps [ 1, 2, 0x10 ] }\n\
             DEF T Script { SFMatrix3f m 1 2 3 4 5 6 7 8 9 }\n",
        );
        let script = scene.find("S").unwrap();
        assert_eq!(script.values::<String>("url").unwrap(), ["a.js"]);
        assert_eq!(script.value::<f32>("speed").unwrap(), 2.5);
        assert_eq!(script.values::<i32>("steps").unwrap(), [1, 2, 16]);
        // SFMatrix3f is a plain identifier without the extended header
        assert!(scene.find("T").is_none());

        let scene = parse_named(
            "test.owrl",
            "#OVRML V2.0 utf8\nDEF T Script { SFMatrix3f m 1 2 3 4 5 6 7 8 9 }\n",
        )
        .unwrap();
        let m = scene.find("T").unwrap().value::<Mat3>("m").unwrap();
        assert_eq!(m.row(0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.col(0), Vec3::new(1.0, 4.0, 7.0));
    }

    #[test]
    fn colors_are_clamped() {
        let scene = parse("#VRML V2.0 utf8\nMaterial { diffuseColor 2 -1 0.5 }\n");
        let color = scene.children()[0].value::<Color>("diffuseColor").unwrap();
        assert_eq!(color, Color::rgb(1.0, 0.0, 0.5));
    }

    #[test]
    fn routes_are_validated() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF F BooleanFilter {}\n\
             DEF G BooleanFilter {}\n\
             DEF M Material {}\n\
             ROUTE F.inputTrue TO G.set_boolean\n\
             ROUTE F.inputTrue TO M.transparency\n\
             ROUTE G.set_boolean TO F.set_boolean\n\
             ROUTE F.inputTrue TO Nobody.set_boolean\n",
        );
        let f = scene.find("F").unwrap();
        assert_eq!(f.connections().len(), 1);
        assert!(scene.find("G").unwrap().connections().is_empty());
        assert_eq!(scene.routes().len(), 1);
    }

    #[test]
    fn cancelled_parse_yields_nothing() {
        let control = LoadControl::new();
        control.cancel();
        let result = Parser::new(
            "#VRML V2.0 utf8\nGroup {}\n",
            "test.wrl",
            &Catalog,
            Arc::new(NodeRegistry::new()),
            Arc::new(SpecificationTable::new()),
        )
        .control(&control)
        .parse();
        assert!(matches!(result, Err(ParseError::Cancelled)));
    }

    #[test]
    fn progress_reaches_one() {
        let control = LoadControl::new();
        let scene = Parser::new(
            "#VRML V2.0 utf8\nGroup {}\nGroup {}\n",
            "test.wrl",
            &Catalog,
            Arc::new(NodeRegistry::new()),
            Arc::new(SpecificationTable::new()),
        )
        .control(&control)
        .parse()
        .unwrap();
        assert_eq!(scene.children().len(), 2);
        assert_eq!(control.progress(), 1.0);
    }

    #[test]
    fn parsed_scene_is_initialized() {
        let scene = parse("#VRML V2.0 utf8\nDEF G Group { children [ DEF S Shape {} ] }\n");
        let group = scene.find("G").unwrap();
        let shape = scene.find("S").unwrap();
        assert!(group.is_initialized() && shape.is_initialized());
        assert_eq!(shape.parents(), [(group.id(), 1)]);
        assert_eq!(group.parents(), [(scene.id(), 1)]);
    }

    const ROUND_TRIP: &str = "#VRML V2.0 utf8\n\
        DEF Root Transform {\n\
          translation 0 1 0\n\
          rotation 0 0 1 1.5\n\
          children [\n\
            Shape { appearance DEF Look Appearance { material Material { diffuseColor 0.2 0.4 0.6 } } geometry Box {} }\n\
            Shape { appearance USE Look geometry Box { size 1 1 1 } }\n\
          ]\n\
        }\n\
        WorldInfo { title \"say \\\"hi\\\"\" info [ \"a\", \"b\" ] }\n\
        DEF Clock TimeSensor { loop TRUE cycleInterval 2 }\n\
        Script { url \"s.js\" SFFloat weight 0.5 MFString tags [ \"x\" ] }\n\
        BooleanFilter {}\n\
        ROUTE Clock.isActive TO Filter.set_boolean\n";

    #[test]
    fn writer_round_trip() {
        let source = ROUND_TRIP.replace("BooleanFilter {}", "DEF Filter BooleanFilter {}");
        let first = parse(&source);
        let text = write_scene(&first, HeaderKind::Vrml);

        assert!(text.starts_with("#VRML V2.0 utf8\n"));
        assert!(text.contains("DEF Look Appearance"));
        assert!(text.contains("appearance USE Look"));
        assert!(text.contains("geometry Box { }"));
        assert!(text.contains("size 1 1 1"));
        assert!(text.contains(r#"title "say \"hi\"""#));
        assert!(text.contains("SFFloat weight 0.5"));
        assert!(!text.contains("addChildren"));
        assert!(text.trim_end().ends_with("ROUTE Clock.isActive TO Filter.set_boolean"));

        let second = parse(&text);
        assert_eq!(second.children().len(), first.children().len());
        assert_eq!(second.nodes().len(), first.nodes().len());
        assert_eq!(second.routes().len(), 1);
        assert_eq!(write_scene(&second, HeaderKind::Vrml), text);
    }

    #[test]
    fn writer_names_shared_and_routed_nodes() {
        let scene = parse(
            "#VRML V2.0 utf8\n\
             DEF A BooleanFilter {}\n\
             BooleanFilter {}\n\
             ROUTE A.inputTrue TO A.set_boolean\n",
        );
        let filter = scene.children()[1].clone();
        assert!(scene.find("A").unwrap().add_connection("inputFalse", filter.id(), "set_boolean"));

        let text = write_scene(&scene, HeaderKind::Vrml);
        let generated = format!("BooleanFilter_{}", filter.id());
        assert!(text.contains(&format!("DEF {generated} BooleanFilter")));
        assert!(text.contains(&format!("ROUTE A.inputFalse TO {generated}.set_boolean")));
    }

    #[test]
    fn writer_metadata_only_for_x3d() {
        let scene = parse_named(
            "scene.x3dv",
            "#X3D V3.0 utf8\nPROFILE Interchange\nMETA \"k\" \"v\"\n",
        )
        .unwrap();
        let x3d = write_scene(&scene, HeaderKind::X3d);
        assert_eq!(x3d, "#X3D V3.0 utf8\nPROFILE Interchange\nMETA \"k\" \"v\"\n");
        assert_eq!(write_scene(&scene, HeaderKind::Vrml), "#VRML V2.0 utf8\n");
    }
}
