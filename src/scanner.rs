use crate::config::Mode;
use crate::error::PreprocessError;
use crate::markup::{
    ClassAttribute, Component, Conditional, ElementKind, Expr, SourceNode, ValuePart, Visitor,
    walk,
};
use crate::resolver::{Resolution, ResolverAdapter, UtilityResolver};
use crate::session::Session;
use crate::splice::Edit;
use crate::style::StyleSheet;

pub const MAX_CONDITIONAL_DEPTH: usize = 32;

#[derive(Debug, Default)]
pub struct TransformBuffer {
    pub utilities: Vec<StyleSheet>,
    pub directives: Vec<StyleSheet>,
    pub ignored: Vec<String>,
    pub new_tags: Vec<String>,
    pub edits: Vec<Edit>,
}

impl TransformBuffer {
    fn absorb_utility(&mut self, resolution: Resolution) {
        self.ignored.extend(resolution.ignored);
        self.utilities.push(resolution.style_sheet);
    }

    fn absorb_directive(&mut self, resolution: Resolution) {
        self.ignored.extend(resolution.ignored);
        self.directives.push(resolution.style_sheet);
    }
}

pub struct Scanner<'a, R: ?Sized> {
    adapter: ResolverAdapter<'a, R>,
    session: &'a Session,
    buffer: TransformBuffer,
}

impl<'a, R: UtilityResolver + ?Sized> Scanner<'a, R> {
    pub fn new(resolver: &'a R, session: &'a Session) -> Self {
        Self {
            adapter: ResolverAdapter::new(resolver, session.options()),
            session,
            buffer: TransformBuffer::default(),
        }
    }

    pub fn scan(mut self, component: &Component) -> Result<TransformBuffer, PreprocessError> {
        walk(component, &mut self)?;
        Ok(self.buffer)
    }

    fn record_tag(&mut self, name: &str) {
        if self.session.has_tag(name) || self.buffer.new_tags.iter().any(|tag| tag == name) {
            return;
        }
        self.buffer.new_tags.push(name.to_string());
    }

    fn scan_class_attribute(&mut self, attribute: &ClassAttribute) {
        for part in &attribute.parts {
            let ValuePart::Text(text) = part else {
                continue;
            };
            let classes = text.text.trim();
            if classes.is_empty() {
                continue;
            }
            let resolution = self.adapter.resolve_attribute(classes);
            if self.adapter.mode() == Mode::Rewrite {
                let leading = &text.text[..text.text.len() - text.text.trim_start().len()];
                let trailing = &text.text[text.text.trim_end().len()..];
                self.buffer.edits.push(Edit {
                    range: text.start..text.end,
                    replacement: format!("{}{}{}", leading, resolution.replacement_text(), trailing),
                });
            }
            self.buffer.absorb_utility(resolution);
        }
    }

    fn scan_conditional(&mut self, conditional: &Conditional) -> Result<(), PreprocessError> {
        let consequent = branch_literal(conditional, Branch::Consequent)?;
        let alternate = branch_literal(conditional, Branch::Alternate)?;
        let resolution = self
            .adapter
            .resolve_directive(&format!("{} {}", consequent, alternate));
        self.buffer.absorb_directive(resolution);
        Ok(())
    }
}

impl<R: UtilityResolver + ?Sized> Visitor for Scanner<'_, R> {
    type Error = PreprocessError;

    fn enter(&mut self, node: SourceNode<'_>) -> Result<(), PreprocessError> {
        match node {
            SourceNode::Element(element) => {
                if element.kind == ElementKind::Element {
                    self.record_tag(&element.name);
                }
            }
            SourceNode::ClassDirective(directive) => {
                let resolution = self.adapter.resolve_directive(&directive.name);
                self.buffer.absorb_directive(resolution);
            }
            SourceNode::Conditional(conditional) => self.scan_conditional(conditional)?,
            SourceNode::ClassAttribute(attribute) => self.scan_class_attribute(attribute),
            SourceNode::Style(_) => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Consequent,
    Alternate,
}

enum Descent<'e> {
    Literal(&'e str),
    Descend(&'e Conditional),
}

fn descend(expr: &Expr) -> Option<Descent<'_>> {
    match expr {
        Expr::Literal(text) => Some(Descent::Literal(text)),
        Expr::Conditional(conditional) => Some(Descent::Descend(conditional)),
        Expr::Other(_) => None,
    }
}

fn branch_literal(conditional: &Conditional, branch: Branch) -> Result<&str, PreprocessError> {
    let mut current = conditional;
    for depth in 1..=MAX_CONDITIONAL_DEPTH {
        let expr = match branch {
            Branch::Consequent => &current.consequent,
            Branch::Alternate => &current.alternate,
        };
        match descend(expr) {
            Some(Descent::Literal(text)) => return Ok(text),
            Some(Descent::Descend(next)) => current = next,
            None => {
                return Err(PreprocessError::MalformedConditional {
                    offset: conditional.start,
                    depth,
                });
            }
        }
    }
    Err(PreprocessError::MalformedConditional {
        offset: conditional.start,
        depth: MAX_CONDITIONAL_DEPTH,
    })
}
