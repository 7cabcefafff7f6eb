//! Recursive-descent parser for the classic encoding.
//!
//! Nodes come from a `NodeFactory`; parsed values are stored with
//! `Node::init_field` and stamped with the scene timestamp. Errors inside a
//! node body are logged and the node is skipped by brace balancing, so one
//! malformed declaration never takes the rest of the document with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::{debug, error, warn};
use scenic_core::{
    Access, Color, Dimension, Environment, Field, FieldType, FieldValue, LoadControl, MultiField,
    NodeFactory, NodeRef, NodeRegistry, RenderContext, Rotation, Scene, SingleField,
    SpecificationTable, Timestamp, default_field,
};

use crate::error::{ParseError, Position, Result};
use crate::header::HeaderKind;
use crate::scanner::{Keyword, Scanner, Symbol, Token};

/// Which header a document must start with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Known extensions require their header; anything else accepts all four.
    #[default]
    FromExtension,
    Require(HeaderKind),
    Any,
}

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    filename: PathBuf,
    factory: &'a dyn NodeFactory,
    registry: Arc<NodeRegistry>,
    specifications: Arc<SpecificationTable>,
    render_context: Option<Arc<dyn RenderContext>>,
    library: Arc<str>,
    timestamp: Timestamp,
    header_check: HeaderCheck,
    control: Option<&'a LoadControl>,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &'a str,
        filename: impl Into<PathBuf>,
        factory: &'a dyn NodeFactory,
        registry: Arc<NodeRegistry>,
        specifications: Arc<SpecificationTable>,
    ) -> Self {
        Self {
            scanner: Scanner::new(source),
            filename: filename.into(),
            factory,
            registry,
            specifications,
            render_context: None,
            library: Arc::from(""),
            timestamp: Timestamp::invalid(),
            header_check: HeaderCheck::default(),
            control: None,
        }
    }

    pub fn render_context(mut self, render_context: Option<Arc<dyn RenderContext>>) -> Self {
        self.render_context = render_context;
        self
    }

    /// Name of the library recorded in every node's environment.
    pub fn library(mut self, library: impl Into<Arc<str>>) -> Self {
        self.library = library.into();
        self
    }

    /// Timestamp stamped on parsed values. Invalid means now.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn header_check(mut self, check: HeaderCheck) -> Self {
        self.header_check = check;
        self
    }

    pub fn control(mut self, control: &'a LoadControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Parses the whole document into an initialized scene.
    ///
    /// Fails only for a bad header or cancellation. Everything else is logged
    /// and skipped.
    pub fn parse(mut self) -> Result<Scene> {
        let header = self.read_header()?;
        self.scanner.set_header(header);

        let timestamp = if self.timestamp.is_valid() {
            self.timestamp
        } else {
            Timestamp::now()
        };
        let scene = Scene::new(
            self.registry.clone(),
            self.specifications.clone(),
            self.render_context.clone(),
            self.library.clone(),
            self.filename.clone(),
            timestamp,
        );

        let mut builder = SceneBuilder {
            scanner: &mut self.scanner,
            filename: &self.filename,
            factory: self.factory,
            control: self.control,
            environment: scene.environment().clone(),
            scene,
            timestamp,
        };
        let children = builder.parse_statements()?;
        let scene = builder.scene;

        scene
            .set_children(children)
            .map_err(|source| ParseError::Node {
                source,
                position: self.scanner.last_position(),
            })?;
        scene.initialize();
        if let Some(control) = self.control {
            control.set_progress(1.0);
        }
        debug!(
            "parsed {} with {} top-level nodes",
            self.filename.display(),
            scene.children().len()
        );
        Ok(scene)
    }

    fn read_header(&mut self) -> Result<HeaderKind> {
        let line = self.scanner.read_line();
        let position = Position::START;
        let kind = HeaderKind::from_line(line).ok_or_else(|| ParseError::InvalidHeader {
            found: line.to_string(),
            position,
        })?;

        let required = match self.header_check {
            HeaderCheck::Any => None,
            HeaderCheck::Require(kind) => Some(kind),
            HeaderCheck::FromExtension => self
                .filename
                .extension()
                .and_then(|e| e.to_str())
                .and_then(HeaderKind::from_extension),
        };
        match required {
            Some(required) if required != kind => Err(ParseError::HeaderMismatch {
                extension: required.extension().to_string(),
                expected: required.line(),
                found: line.to_string(),
                position,
            }),
            _ => Ok(kind),
        }
    }
}

/// Parsing state once the scene root exists.
struct SceneBuilder<'p, 'a> {
    scanner: &'p mut Scanner<'a>,
    filename: &'p Path,
    factory: &'a dyn NodeFactory,
    control: Option<&'a LoadControl>,
    environment: Arc<Environment>,
    scene: Scene,
    timestamp: Timestamp,
}

impl SceneBuilder<'_, '_> {
    fn parse_statements(&mut self) -> Result<Vec<NodeRef>> {
        let mut children = Vec::new();
        while !self.scanner.peek().is_eof() {
            self.publish_progress();
            let before = self.scanner.consumed();

            let result = match self.scanner.peek() {
                Token::Keyword(Keyword::Route) => {
                    self.scanner.pop();
                    self.parse_route()
                }
                Token::Keyword(Keyword::Meta) => {
                    self.scanner.pop();
                    self.parse_meta()
                }
                Token::Keyword(Keyword::Profile) => {
                    self.scanner.pop();
                    self.parse_profile()
                }
                _ => self.parse_node().map(|node| children.extend(node)),
            };

            match result {
                Ok(()) => {}
                Err(ParseError::Cancelled) => return Err(ParseError::Cancelled),
                Err(err @ ParseError::UnexpectedEof { .. }) => {
                    error!("Error in \"{}\", {err}", self.filename.display());
                    break;
                }
                Err(err) => {
                    error!("Error in \"{}\", {err}", self.filename.display());
                    if self.scanner.consumed() == before {
                        self.scanner.pop();
                    }
                }
            }
        }
        Ok(children)
    }

    fn publish_progress(&self) {
        if let Some(control) = self.control {
            if !self.scanner.is_empty() {
                control.set_progress(self.scanner.consumed() as f32 / self.scanner.len() as f32);
            }
        }
    }

    // -------------------- Token helpers --------------------

    /// Error for the next token, which is left unconsumed.
    fn unexpected(&mut self, expected: &str) -> ParseError {
        let position = self.scanner.position();
        match self.scanner.peek() {
            Token::EndOfFile => ParseError::UnexpectedEof { position },
            found => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
                position,
            },
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String> {
        let name = self.scanner.pop_with(|token| match token {
            Token::Identifier(name) => Ok(name),
            other => Err(other),
        });
        name.ok_or_else(|| self.unexpected(expected))
    }

    fn expect_symbol(&mut self, symbol: Symbol) -> Result<()> {
        if self.scanner.peek().is_symbol(symbol) {
            self.scanner.pop();
            return Ok(());
        }
        Err(self.unexpected(&format!("'{}'", symbol.as_char())))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.scanner.peek().is_keyword(keyword) {
            self.scanner.pop();
            return Ok(());
        }
        Err(self.unexpected(&format!("'{keyword}'")))
    }

    fn expect_string(&mut self, expected: &str) -> Result<String> {
        let value = self.scanner.pop_with(|token| match token {
            Token::String(s) => Ok(s),
            other => Err(other),
        });
        value.ok_or_else(|| self.unexpected(expected))
    }

    /// Consumes up to and including the brace closing the current node.
    /// Without `started` the opening brace is expected next.
    fn skip_node(&mut self, started: bool) -> Result<()> {
        if !started {
            self.expect_symbol(Symbol::NodeBegin)?;
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.scanner.pop() {
                Token::EndOfFile => {
                    return Err(ParseError::UnexpectedEof {
                        position: self.scanner.last_position(),
                    });
                }
                Token::Symbol(Symbol::NodeBegin) => depth += 1,
                Token::Symbol(Symbol::NodeEnd) => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    // -------------------- Statements --------------------

    fn parse_meta(&mut self) -> Result<()> {
        let key = self.expect_string("a quoted META key")?;
        let value = self.expect_string("a quoted META value")?;
        self.scene.insert_meta(key, value);
        Ok(())
    }

    fn parse_profile(&mut self) -> Result<()> {
        let profile = self.expect_identifier("a profile name")?;
        self.scene.set_profile(profile);
        Ok(())
    }

    /// Parses `a.f TO b.g` (after `ROUTE`). Syntax errors propagate; a route
    /// that does not resolve is logged and dropped.
    fn parse_route(&mut self) -> Result<()> {
        let position = self.scanner.last_position();
        let source = self.expect_identifier("a source node name")?;
        self.expect_symbol(Symbol::Dot)?;
        let source_field = self.expect_identifier("a source field name")?;
        self.expect_keyword(Keyword::To)?;
        let target = self.expect_identifier("a target node name")?;
        self.expect_symbol(Symbol::Dot)?;
        let target_field = self.expect_identifier("a target field name")?;

        if let Err(reason) = self.install_route(&source, &source_field, &target, &target_field) {
            warn!(
                "\"{}\", {position}: ROUTE {source}.{source_field} TO {target}.{target_field} dropped: {reason}",
                self.filename.display()
            );
        }
        Ok(())
    }

    fn install_route(
        &self,
        source: &str,
        source_field: &str,
        target: &str,
        target_field: &str,
    ) -> std::result::Result<(), String> {
        let registry = self.environment.registry();
        let scene_id = self.scene.id();

        let from = registry
            .node_in_scene(source, scene_id)
            .ok_or_else(|| format!("source node '{source}' does not exist"))?;
        let from_field = from.original_field_name(source_field);
        let from_kind = from
            .field_kind(from_field)
            .ok_or_else(|| format!("{} has no field '{source_field}'", from.type_name()))?;

        let to = registry
            .node_in_scene(target, scene_id)
            .ok_or_else(|| format!("target node '{target}' does not exist"))?;
        let to_field = to.original_field_name(target_field);
        let to_kind = to
            .field_kind(to_field)
            .ok_or_else(|| format!("{} has no field '{target_field}'", to.type_name()))?;

        if from_kind != to_kind {
            return Err(format!(
                "fields have different types ({} vs {})",
                from_kind.0.keyword(from_kind.1),
                to_kind.0.keyword(to_kind.1)
            ));
        }
        if !from.field_access(from_field).is_some_and(|a| a.contains(Access::GET)) {
            return Err(format!("source field '{from_field}' is not an output"));
        }
        if !to.field_access(to_field).is_some_and(|a| a.contains(Access::SET)) {
            return Err(format!("target field '{to_field}' is not an input"));
        }

        if !from.add_connection(from_field, to.id(), to_field) {
            debug!("ROUTE {source}.{from_field} TO {target}.{to_field} declared twice");
        }
        Ok(())
    }

    // -------------------- Nodes --------------------

    /// `[DEF name] Type { ... }` or `NULL`. Unknown and malformed nodes are
    /// skipped and yield `None`.
    fn parse_node(&mut self) -> Result<Option<NodeRef>> {
        if self.control.is_some_and(LoadControl::is_cancelled) {
            return Err(ParseError::Cancelled);
        }

        let mut name = None;
        match self.scanner.peek() {
            Token::Keyword(Keyword::Null) => {
                self.scanner.pop();
                return Ok(None);
            }
            Token::Keyword(Keyword::Def) => {
                self.scanner.pop();
                name = Some(self.expect_identifier("a node name after DEF")?);
            }
            _ => {}
        }
        let type_name = self.expect_identifier("a node type")?;
        let position = self.scanner.last_position();

        let Some(node) = self.factory.create_node(&type_name, &self.environment) else {
            self.skip_node(false)?;
            warn!(
                "\"{}\", {position}: skipped unknown node type '{type_name}'",
                self.filename.display()
            );
            return Ok(None);
        };
        if let Some(name) = name {
            node.set_name(name);
        }
        self.expect_symbol(Symbol::NodeBegin)?;

        match self.parse_body(&node) {
            Ok(()) => Ok(Some(node)),
            Err(err @ (ParseError::Cancelled | ParseError::UnexpectedEof { .. })) => {
                node.discard();
                Err(err)
            }
            Err(err) => {
                node.discard();
                error!("Error in \"{}\", {err}", self.filename.display());
                self.skip_node(true)?;
                warn!(
                    "\"{}\", {position}: skipped {type_name} node",
                    self.filename.display()
                );
                Ok(None)
            }
        }
    }

    fn parse_body(&mut self, node: &NodeRef) -> Result<()> {
        loop {
            let position = self.scanner.position();
            match self.scanner.peek() {
                Token::Symbol(Symbol::NodeEnd) => {
                    self.scanner.pop();
                    return Ok(());
                }
                Token::Keyword(Keyword::Route) => {
                    self.scanner.pop();
                    self.parse_route()?;
                }
                Token::Keyword(Keyword::FieldType(ty, dimension)) => {
                    let (ty, dimension) = (*ty, *dimension);
                    self.scanner.pop();
                    let name = self.expect_identifier("a dynamic field name")?;
                    self.declare_field(node, &name, ty, dimension, position)?;
                    self.parse_field(node, &name)?;
                }
                Token::Identifier(_) => {
                    let name = self.expect_identifier("a field name")?;
                    if !node.has_field(&name) {
                        return Err(ParseError::UnknownField {
                            node_type: node.type_name().to_string(),
                            field: name,
                            position,
                        });
                    }
                    self.parse_field(node, &name)?;
                }
                Token::Invalid(_) => {
                    let token = self.scanner.pop();
                    error!(
                        "Error in \"{}\", {position}: {token}, trying the next field",
                        self.filename.display()
                    );
                }
                _ => return Err(self.unexpected("a field name or '}'")),
            }
        }
    }

    fn declare_field(
        &self,
        node: &NodeRef,
        name: &str,
        ty: FieldType,
        dimension: Dimension,
        position: Position,
    ) -> Result<()> {
        let Some(field) = default_field(ty, dimension) else {
            return Err(ParseError::UnexpectedToken {
                expected: "a field type".to_string(),
                found: ty.keyword(dimension),
                position,
            });
        };
        node.add_field(name, field.as_ref())
            .map_err(|source| ParseError::Node { source, position })
    }

    // -------------------- Field values --------------------

    fn parse_field(&mut self, node: &NodeRef, name: &str) -> Result<()> {
        let position = self.scanner.position();
        let Some((ty, dimension)) = node.field_kind(name) else {
            return Err(ParseError::UnknownField {
                node_type: node.type_name().to_string(),
                field: name.to_string(),
                position,
            });
        };

        let value = match dimension {
            Dimension::Single => self.parse_single(ty)?,
            Dimension::Multi => self.parse_multi(ty)?,
        };
        node.init_field(name, value.as_ref())
            .map_err(|source| ParseError::Node { source, position })
    }

    fn parse_single(&mut self, ty: FieldType) -> Result<Box<dyn Field>> {
        match ty {
            FieldType::Boolean => self.single(Self::parse_bool),
            FieldType::Int => self.single(Self::parse_int),
            FieldType::Float => self.single(Self::parse_float),
            FieldType::Time => self.single(Self::parse_time),
            FieldType::String => self.single(Self::parse_string),
            FieldType::Color => self.single(Self::parse_color),
            FieldType::Rotation => self.single(Self::parse_rotation),
            FieldType::Vector2 => self.single(Self::parse_vec2),
            FieldType::Vector3 => self.single(Self::parse_vec3),
            FieldType::Vector4 => self.single(Self::parse_vec4),
            FieldType::Matrix3 => self.single(Self::parse_mat3),
            FieldType::Matrix4 => self.single(Self::parse_mat4),
            FieldType::Node => self.single(Self::parse_node_value),
            FieldType::Invalid => Err(self.unexpected("a typed value")),
        }
    }

    fn parse_multi(&mut self, ty: FieldType) -> Result<Box<dyn Field>> {
        match ty {
            FieldType::Boolean => self.multi(Self::parse_bool),
            FieldType::Int => self.multi(Self::parse_int),
            FieldType::Float => self.multi(Self::parse_float),
            FieldType::Time => self.multi(Self::parse_time),
            FieldType::String => self.multi(Self::parse_string),
            FieldType::Color => self.multi(Self::parse_color),
            FieldType::Rotation => self.multi(Self::parse_rotation),
            FieldType::Vector2 => self.multi(Self::parse_vec2),
            FieldType::Vector3 => self.multi(Self::parse_vec3),
            FieldType::Vector4 => self.multi(Self::parse_vec4),
            FieldType::Matrix3 => self.multi(Self::parse_mat3),
            FieldType::Matrix4 => self.multi(Self::parse_mat4),
            FieldType::Node => self.multi_node(),
            FieldType::Invalid => Err(self.unexpected("a typed value")),
        }
    }

    fn single<T: FieldValue>(&mut self, parse: fn(&mut Self) -> Result<T>) -> Result<Box<dyn Field>> {
        let value = parse(self)?;
        Ok(Box::new(SingleField::with_timestamp(value, self.timestamp)))
    }

    /// A bracketed list or one bare value.
    fn multi<T: FieldValue>(&mut self, parse: fn(&mut Self) -> Result<T>) -> Result<Box<dyn Field>> {
        let mut values = Vec::new();
        if self.scanner.peek().is_symbol(Symbol::FieldBegin) {
            self.scanner.pop();
            while !self.scanner.peek().is_symbol(Symbol::FieldEnd) {
                values.push(parse(self)?);
            }
            self.scanner.pop();
        } else {
            values.push(parse(self)?);
        }
        Ok(Box::new(MultiField::with_timestamp(values, self.timestamp)))
    }

    /// Like `multi`, but skipped nodes and NULL leave no entry.
    fn multi_node(&mut self) -> Result<Box<dyn Field>> {
        let mut values = Vec::new();
        if self.scanner.peek().is_symbol(Symbol::FieldBegin) {
            self.scanner.pop();
            while !self.scanner.peek().is_symbol(Symbol::FieldEnd) {
                if let Some(node) = self.parse_node_value()? {
                    values.push(Some(node));
                }
            }
            self.scanner.pop();
        } else if let Some(node) = self.parse_node_value()? {
            values.push(Some(node));
        }
        Ok(Box::new(MultiField::with_timestamp(values, self.timestamp)))
    }

    /// `USE name`, `NULL` or a nested node declaration.
    fn parse_node_value(&mut self) -> Result<Option<NodeRef>> {
        if !self.scanner.peek().is_keyword(Keyword::Use) {
            return self.parse_node();
        }
        self.scanner.pop();
        let name = self.expect_identifier("a node name after USE")?;
        let found = self
            .environment
            .registry()
            .node_in_scene(&name, self.scene.id());
        if found.is_none() {
            warn!(
                "\"{}\", {}: USE of unknown node '{name}'",
                self.filename.display(),
                self.scanner.last_position()
            );
        }
        Ok(found)
    }

    fn parse_bool(&mut self) -> Result<bool> {
        let value = match self.scanner.peek() {
            Token::Keyword(Keyword::True) => true,
            Token::Keyword(Keyword::False) => false,
            _ => return Err(self.unexpected("TRUE or FALSE")),
        };
        self.scanner.pop();
        Ok(value)
    }

    fn parse_int(&mut self) -> Result<i32> {
        let Token::Integer(value) = *self.scanner.peek() else {
            return Err(self.unexpected("an integer"));
        };
        self.scanner.pop();
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<f64> {
        let value = match self.scanner.peek() {
            Token::Integer(v) => f64::from(*v),
            Token::Number(v) => *v,
            _ => return Err(self.unexpected("a number")),
        };
        self.scanner.pop();
        Ok(value)
    }

    fn parse_float(&mut self) -> Result<f32> {
        self.parse_number().map(|v| v as f32)
    }

    fn parse_time(&mut self) -> Result<f64> {
        self.parse_number()
    }

    /// A quoted string or a bare identifier.
    fn parse_string(&mut self) -> Result<String> {
        let value = self.scanner.pop_with(|token| match token {
            Token::String(s) | Token::Identifier(s) => Ok(s),
            other => Err(other),
        });
        value.ok_or_else(|| self.unexpected("a string"))
    }

    fn parse_floats<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0; N];
        for value in &mut out {
            *value = self.parse_float()?;
        }
        Ok(out)
    }

    fn parse_color(&mut self) -> Result<Color> {
        let [r, g, b] = self.parse_floats()?;
        Ok(Color::clamped(r, g, b))
    }

    /// Axis x y z, then angle. A degenerate axis yields the identity.
    fn parse_rotation(&mut self) -> Result<Rotation> {
        let [x, y, z, angle] = self.parse_floats()?;
        match Rotation::from_axis_angle(Vec3::new(x, y, z), angle) {
            Some(rotation) => Ok(rotation),
            None => {
                warn!(
                    "\"{}\", {}: invalid rotation axis, using the default axis",
                    self.filename.display(),
                    self.scanner.last_position()
                );
                Ok(Rotation::IDENTITY)
            }
        }
    }

    fn parse_vec2(&mut self) -> Result<Vec2> {
        self.parse_floats().map(Vec2::from_array)
    }

    fn parse_vec3(&mut self) -> Result<Vec3> {
        self.parse_floats().map(Vec3::from_array)
    }

    fn parse_vec4(&mut self) -> Result<Vec4> {
        self.parse_floats().map(Vec4::from_array)
    }

    /// Row-major in the source, stored transposed.
    fn parse_mat3(&mut self) -> Result<Mat3> {
        self.parse_floats::<9>()
            .map(|rows| Mat3::from_cols_array(&rows).transpose())
    }

    fn parse_mat4(&mut self) -> Result<Mat4> {
        self.parse_floats::<16>()
            .map(|rows| Mat4::from_cols_array(&rows).transpose())
    }
}
