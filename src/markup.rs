use crate::error::PreprocessError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Component {
    pub fragment: Vec<Node>,
    pub styles: Vec<StyleBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Expression(ExpressionTag),
    Block(BlockTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Element,
    Component,
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    pub start: usize,
    pub end: usize,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Class(ClassAttribute),
    ClassDirective(ClassDirective),
    Other(OtherAttribute),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAttribute {
    pub start: usize,
    pub end: usize,
    pub parts: Vec<ValuePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDirective {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub expression: Option<ExpressionTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherAttribute {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub value: Vec<ValuePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePart {
    Text(TextPart),
    Expression(ExpressionTag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPart {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A `{...}` mustache. `start` and `end` include the braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionTag {
    pub start: usize,
    pub end: usize,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTag {
    pub start: usize,
    pub end: usize,
    pub keyword: String,
    pub expression: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    Conditional(Conditional),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub start: usize,
    pub test: Box<Expr>,
    pub consequent: Box<Expr>,
    pub alternate: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleBlock {
    pub start: usize,
    pub content_start: usize,
    pub content_end: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum SourceNode<'a> {
    Element(&'a Element),
    ClassAttribute(&'a ClassAttribute),
    ClassDirective(&'a ClassDirective),
    Conditional(&'a Conditional),
    Style(&'a StyleBlock),
}

pub trait Visitor {
    type Error;

    fn enter(&mut self, node: SourceNode<'_>) -> Result<(), Self::Error>;
}

pub fn walk<V: Visitor>(component: &Component, visitor: &mut V) -> Result<(), V::Error> {
    walk_nodes(&component.fragment, visitor)?;
    for style in &component.styles {
        visitor.enter(SourceNode::Style(style))?;
    }
    Ok(())
}

fn walk_nodes<V: Visitor>(nodes: &[Node], visitor: &mut V) -> Result<(), V::Error> {
    for node in nodes {
        match node {
            Node::Element(element) => walk_element(element, visitor)?,
            Node::Expression(tag) => walk_expr(&tag.expr, visitor)?,
            Node::Block(block) => {
                if let Some(expr) = &block.expression {
                    walk_expr(expr, visitor)?;
                }
            }
        }
    }
    Ok(())
}

fn walk_element<V: Visitor>(element: &Element, visitor: &mut V) -> Result<(), V::Error> {
    visitor.enter(SourceNode::Element(element))?;
    for attribute in &element.attributes {
        match attribute {
            Attribute::Class(class) => {
                visitor.enter(SourceNode::ClassAttribute(class))?;
                walk_value(&class.parts, visitor)?;
            }
            Attribute::ClassDirective(directive) => {
                visitor.enter(SourceNode::ClassDirective(directive))?;
                if let Some(tag) = &directive.expression {
                    walk_expr(&tag.expr, visitor)?;
                }
            }
            Attribute::Other(other) => walk_value(&other.value, visitor)?,
        }
    }
    walk_nodes(&element.children, visitor)
}

fn walk_value<V: Visitor>(parts: &[ValuePart], visitor: &mut V) -> Result<(), V::Error> {
    for part in parts {
        if let ValuePart::Expression(tag) = part {
            walk_expr(&tag.expr, visitor)?;
        }
    }
    Ok(())
}

fn walk_expr<V: Visitor>(expr: &Expr, visitor: &mut V) -> Result<(), V::Error> {
    if let Expr::Conditional(conditional) = expr {
        visitor.enter(SourceNode::Conditional(conditional))?;
        walk_expr(&conditional.test, visitor)?;
        walk_expr(&conditional.consequent, visitor)?;
        walk_expr(&conditional.alternate, visitor)?;
    }
    Ok(())
}

pub trait ComponentParser {
    fn parse(&self, source: &str) -> Result<Component, PreprocessError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupParser;

impl ComponentParser for MarkupParser {
    fn parse(&self, source: &str) -> Result<Component, PreprocessError> {
        parse(source)
    }
}

pub fn parse(source: &str) -> Result<Component, PreprocessError> {
    Parser { src: source, pos: 0 }.parse()
}

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

struct OpenTag {
    name: String,
    start: usize,
    attributes: Vec<Attribute>,
    self_closing: bool,
}

enum Mustache {
    Expression(ExpressionTag),
    Block(Option<BlockTag>),
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn parse(mut self) -> Result<Component, PreprocessError> {
        let mut component = Component::default();
        let mut stack: Vec<Element> = Vec::new();

        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                let close = self.find_from(self.pos + 4, "-->", "unterminated comment")?;
                self.pos = close + 3;
            } else if rest.starts_with("</") {
                let name = self.parse_close_tag()?;
                if let Some(depth) = stack.iter().rposition(|open| open.name == name) {
                    while stack.len() > depth {
                        if let Some(mut element) = stack.pop() {
                            element.end = self.pos;
                            push_node(&mut stack, &mut component, Node::Element(element));
                        }
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|ch: char| ch.is_ascii_alphabetic())
            {
                let tag = self.parse_open_tag()?;
                if tag.name == "script" || tag.name == "style" {
                    let content_start = self.pos;
                    let closing = format!("</{}", tag.name);
                    let unterminated = format!("unterminated <{}>", tag.name);
                    let content_end = self.find_from(content_start, &closing, &unterminated)?;
                    let end = self.find_from(content_end, ">", &unterminated)? + 1;
                    self.pos = end;
                    if tag.name == "style" && stack.is_empty() {
                        component.styles.push(StyleBlock {
                            start: tag.start,
                            content_start,
                            content_end,
                            end,
                        });
                    }
                    continue;
                }
                let element = Element {
                    kind: element_kind(&tag.name),
                    start: tag.start,
                    end: self.pos,
                    attributes: tag.attributes,
                    children: Vec::new(),
                    name: tag.name,
                };
                if tag.self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
                    push_node(&mut stack, &mut component, Node::Element(element));
                } else {
                    stack.push(element);
                }
            } else if rest.starts_with('{') {
                match self.parse_braces()? {
                    Mustache::Expression(tag) => {
                        push_node(&mut stack, &mut component, Node::Expression(tag))
                    }
                    Mustache::Block(Some(block)) => {
                        push_node(&mut stack, &mut component, Node::Block(block))
                    }
                    Mustache::Block(None) => {}
                }
            } else {
                let skip = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                let next = rest[skip..]
                    .find(['<', '{'])
                    .map(|idx| self.pos + skip + idx)
                    .unwrap_or(self.src.len());
                self.pos = next;
            }
        }

        while let Some(mut element) = stack.pop() {
            element.end = self.src.len();
            push_node(&mut stack, &mut component, Node::Element(element));
        }
        Ok(component)
    }

    fn parse_close_tag(&mut self) -> Result<String, PreprocessError> {
        let end = self.find_from(self.pos, ">", "unterminated closing tag")?;
        let name = self.src[self.pos + 2..end].trim().to_string();
        self.pos = end + 1;
        Ok(name)
    }

    fn parse_open_tag(&mut self) -> Result<OpenTag, PreprocessError> {
        let start = self.pos;
        self.pos += 1;
        let name_start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '/' || ch == '>' {
                break;
            }
            self.pos += ch.len_utf8();
        }
        let name = self.src[name_start..self.pos].to_string();
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Err(self.error(start, format!("unterminated <{}> tag", name)));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(OpenTag {
                    name,
                    start,
                    attributes,
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(OpenTag {
                    name,
                    start,
                    attributes,
                    self_closing: false,
                });
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }
            attributes.push(self.parse_attribute()?);
        }
    }

    fn parse_attribute(&mut self) -> Result<Attribute, PreprocessError> {
        let start = self.pos;
        if self.peek() == Some('{') {
            let value = self.parse_mustache()?.map(ValuePart::Expression);
            return Ok(Attribute::Other(OtherAttribute {
                name: String::new(),
                start,
                end: self.pos,
                value: value.into_iter().collect(),
            }));
        }

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '=' | '>' | '/') {
                break;
            }
            self.pos += ch.len_utf8();
        }
        let name = self.src[start..self.pos].to_string();

        let after_name = self.pos;
        self.skip_whitespace();
        let value = if self.peek() == Some('=') {
            self.pos += 1;
            self.skip_whitespace();
            self.parse_attribute_value()?
        } else {
            self.pos = after_name;
            Vec::new()
        };
        let end = self.pos;

        if name == "class" {
            return Ok(Attribute::Class(ClassAttribute {
                start,
                end,
                parts: value,
            }));
        }
        if let Some(directive) = name.strip_prefix("class:") {
            let expression = value.into_iter().find_map(|part| match part {
                ValuePart::Expression(tag) => Some(tag),
                ValuePart::Text(_) => None,
            });
            return Ok(Attribute::ClassDirective(ClassDirective {
                name: directive.to_string(),
                start,
                end,
                expression,
            }));
        }
        Ok(Attribute::Other(OtherAttribute {
            name,
            start,
            end,
            value,
        }))
    }

    fn parse_attribute_value(&mut self) -> Result<Vec<ValuePart>, PreprocessError> {
        let start = self.pos;
        let Some(first) = self.peek() else {
            return Err(self.error(start, "missing attribute value"));
        };

        if first == '"' || first == '\'' {
            self.pos += 1;
            let mut parts = Vec::new();
            let mut text_start = self.pos;
            loop {
                let Some(ch) = self.peek() else {
                    return Err(self.error(start, "unterminated attribute value"));
                };
                if ch == first || ch == '{' {
                    if self.pos > text_start {
                        parts.push(self.text_part(text_start, self.pos));
                    }
                    if ch == first {
                        self.pos += 1;
                        return Ok(parts);
                    }
                    if let Some(tag) = self.parse_mustache()? {
                        parts.push(ValuePart::Expression(tag));
                    }
                    text_start = self.pos;
                    continue;
                }
                self.pos += ch.len_utf8();
            }
        }

        if first == '{' {
            return Ok(self
                .parse_mustache()?
                .map(ValuePart::Expression)
                .into_iter()
                .collect());
        }

        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || ch == '>' || self.src[self.pos..].starts_with("/>") {
                break;
            }
            self.pos += ch.len_utf8();
        }
        Ok(vec![self.text_part(start, self.pos)])
    }

    fn parse_mustache(&mut self) -> Result<Option<ExpressionTag>, PreprocessError> {
        Ok(match self.parse_braces()? {
            Mustache::Expression(tag) => Some(tag),
            Mustache::Block(_) => None,
        })
    }

    fn parse_braces(&mut self) -> Result<Mustache, PreprocessError> {
        let start = self.pos;
        let close = matching_brace(self.src, start)
            .ok_or_else(|| self.error(start, "unterminated expression"))?;
        self.pos = close + 1;

        let inner = &self.src[start + 1..close];
        if inner.trim_start().starts_with(['#', ':', '/', '@']) {
            let block = block_tag(inner, start + 1).map(|(keyword, expression)| BlockTag {
                start,
                end: self.pos,
                keyword,
                expression,
            });
            return Ok(Mustache::Block(block));
        }
        Ok(Mustache::Expression(ExpressionTag {
            start,
            end: self.pos,
            expr: parse_expr(inner, start + 1),
        }))
    }

    fn text_part(&self, start: usize, end: usize) -> ValuePart {
        ValuePart::Text(TextPart {
            start,
            end,
            text: self.src[start..end].to_string(),
        })
    }

    fn find_from(&self, from: usize, needle: &str, message: &str) -> Result<usize, PreprocessError> {
        self.src[from..]
            .find(needle)
            .map(|idx| from + idx)
            .ok_or_else(|| self.error(from, message))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> PreprocessError {
        PreprocessError::Parse {
            message: message.into(),
            offset,
        }
    }
}

fn push_node(stack: &mut [Element], component: &mut Component, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => component.fragment.push(node),
    }
}

fn element_kind(name: &str) -> ElementKind {
    if name.contains(':') {
        ElementKind::Special
    } else if name.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        ElementKind::Component
    } else {
        ElementKind::Element
    }
}

/// Bindings such as the `as item` of `#each` or the name bound by `@const`
/// are not part of the expression.
fn block_tag(inner: &str, base: usize) -> Option<(String, Option<Expr>)> {
    let mut pos = inner.len() - inner.trim_start().len();
    let sigil = inner[pos..].chars().next()?;
    if sigil == '/' {
        return None;
    }
    pos += 1;
    let keyword_len = inner[pos..]
        .find(|ch: char| !ch.is_ascii_alphabetic())
        .unwrap_or(inner.len() - pos);
    let mut keyword = inner[pos..pos + keyword_len].to_string();
    pos += keyword_len;

    if sigil == ':' && keyword == "else" {
        let after = &inner[pos..];
        let gap = after.len() - after.trim_start().len();
        let chained = &after[gap..];
        if gap > 0
            && chained.starts_with("if")
            && chained[2..].starts_with(char::is_whitespace)
        {
            keyword = "else if".to_string();
            pos += gap + 2;
        }
    }

    let body = &inner[pos..];
    let (from, to) = match (sigil, keyword.as_str()) {
        ('#', "if" | "key") | (':', "else if") | ('@', "html" | "render") => (0, body.len()),
        ('#', "each") => (0, find_top_level_word(body, "as").unwrap_or(body.len())),
        ('#', "await") => (0, find_top_level_word(body, "then").unwrap_or(body.len())),
        ('@', "const") => match assignment(body) {
            Some(eq) => (eq + 1, body.len()),
            None => (body.len(), body.len()),
        },
        _ => (body.len(), body.len()),
    };
    let text = &body[from..to];
    let expression = (!text.trim().is_empty()).then(|| parse_expr(text, base + pos + from));
    Some((keyword, expression))
}

fn find_top_level_word(text: &str, word: &str) -> Option<usize> {
    top_level_chars(text).into_iter().find_map(|(idx, ch)| {
        let rest = text[idx..].strip_prefix(ch)?.strip_prefix(word)?;
        (ch.is_whitespace() && rest.starts_with(char::is_whitespace)).then_some(idx)
    })
}

fn assignment(text: &str) -> Option<usize> {
    top_level_chars(text).into_iter().find_map(|(idx, ch)| {
        let next = text[idx + 1..].chars().next();
        let prev = text[..idx].chars().next_back();
        (ch == '='
            && !matches!(next, Some('=') | Some('>'))
            && !matches!(prev, Some('=') | Some('!') | Some('<') | Some('>')))
        .then_some(idx)
    })
}

fn matching_brace(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in src[open..].char_indices() {
        if let Some(current) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == current {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn top_level_chars(text: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(current) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == current {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push((idx, ch)),
            _ => {}
        }
    }
    out
}

fn is_ternary_mark(text: &str, idx: usize) -> bool {
    let next = text[idx + 1..].chars().next();
    let prev = text[..idx].chars().next_back();
    !matches!(next, Some('?') | Some('.')) && prev != Some('?')
}

fn parse_expr(text: &str, base: usize) -> Expr {
    let lead = text.len() - text.trim_start().len();
    let trimmed = text.trim();
    let base = base + lead;

    if trimmed.starts_with('(') && wrapping_paren(trimmed) {
        return parse_expr(&trimmed[1..trimmed.len() - 1], base + 1);
    }

    let top = top_level_chars(trimmed);
    let question = top
        .iter()
        .position(|&(idx, ch)| ch == '?' && is_ternary_mark(trimmed, idx));
    if let Some(q) = question {
        let mut nested = 0usize;
        let colon = top[q + 1..].iter().find_map(|&(idx, ch)| {
            if ch == '?' && is_ternary_mark(trimmed, idx) {
                nested += 1;
            } else if ch == ':' {
                if nested == 0 {
                    return Some(idx);
                }
                nested -= 1;
            }
            None
        });
        if let Some(colon) = colon {
            let q_idx = top[q].0;
            return Expr::Conditional(Conditional {
                start: base,
                test: Box::new(parse_expr(&trimmed[..q_idx], base)),
                consequent: Box::new(parse_expr(&trimmed[q_idx + 1..colon], base + q_idx + 1)),
                alternate: Box::new(parse_expr(&trimmed[colon + 1..], base + colon + 1)),
            });
        }
    }

    match string_literal(trimmed).or_else(|| plain_literal(trimmed)) {
        Some(value) => Expr::Literal(value.to_string()),
        None => Expr::Other(trimmed.to_string()),
    }
}

/// Number, boolean and `null` literals keep their source text.
fn plain_literal(text: &str) -> Option<&str> {
    if matches!(text, "true" | "false" | "null") {
        return Some(text);
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut chars = digits.chars();
    let numeric_start = match chars.next()? {
        '0'..='9' => true,
        '.' => chars.next().is_some_and(|ch| ch.is_ascii_digit()),
        _ => false,
    };
    let numeric_body = digits
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_'));
    (numeric_start && numeric_body).then_some(text)
}

fn wrapping_paren(text: &str) -> bool {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return idx == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn string_literal(text: &str) -> Option<&str> {
    let quote = text.chars().next()?;
    if !matches!(quote, '"' | '\'' | '`') || text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return None;
        }
    }
    if quote == '`' && inner.contains("${") {
        return None;
    }
    Some(inner)
}
