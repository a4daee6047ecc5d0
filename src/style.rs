use indexmap::IndexMap;
use std::fmt;

/// Which accumulator a rule came from. The derived ordering is the cascade
/// order of the assembled sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Preflight,
    Utility,
    Directive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Local,
    Global,
    DeferredGlobal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredScope {
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn parse_list(text: &str) -> Vec<Declaration> {
        split_top_level(text, ';')
            .into_iter()
            .filter_map(|entry| {
                let (property, value) = entry.split_once(':')?;
                let property = property.trim();
                let value = value.trim();
                if property.is_empty() || value.is_empty() {
                    return None;
                }
                Some(Declaration::new(property, value))
            })
            .collect()
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {};", self.property, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub selector: String,
    pub scope: Scope,
    pub at_rule: Option<String>,
    pub declarations: Vec<Declaration>,
    pub layer: Layer,
    pub order: u32,
}

impl Rule {
    pub fn new(selector: impl Into<String>, declarations: Vec<Declaration>) -> Self {
        Self {
            selector: selector.into(),
            scope: Scope::Local,
            at_rule: None,
            declarations,
            layer: Layer::Utility,
            order: 0,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_at_rule(mut self, at_rule: impl Into<String>) -> Self {
        self.at_rule = Some(at_rule.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    fn render_selector(&self, deferred: DeferredScope) -> String {
        let global = match self.scope {
            Scope::Local => false,
            Scope::Global => true,
            Scope::DeferredGlobal => deferred == DeferredScope::Global,
        };
        if !global {
            return self.selector.clone();
        }
        split_top_level(&self.selector, ',')
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .map(|part| format!(":global({})", part))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render(&self, deferred: DeferredScope) -> String {
        let indent = if self.at_rule.is_some() { "  " } else { "" };
        let mut out = format!("{}{} {{\n", indent, self.render_selector(deferred));
        for declaration in &self.declarations {
            out.push_str(indent);
            out.push_str("  ");
            out.push_str(&declaration.to_string());
            out.push('\n');
        }
        out.push_str(indent);
        out.push('}');
        match &self.at_rule {
            Some(at_rule) => format!("{} {{\n{}\n}}", at_rule, out),
            None => out,
        }
    }
}

type CombineKey = (Layer, Option<String>, Scope, String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn extend(mut self, other: StyleSheet) -> StyleSheet {
        self.rules.extend(other.rules);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> StyleSheet {
        for rule in &mut self.rules {
            rule.scope = scope;
        }
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> StyleSheet {
        for rule in &mut self.rules {
            rule.layer = layer;
        }
        self
    }

    /// Merges rules sharing layer, at-rule, scope and selector. A repeated
    /// property keeps only its last value, moved to the end of the block.
    pub fn combine(self) -> StyleSheet {
        let mut merged: IndexMap<CombineKey, Rule> = IndexMap::new();
        for rule in self.rules {
            let key = (
                rule.layer,
                rule.at_rule.clone(),
                rule.scope,
                rule.selector.clone(),
            );
            match merged.get_mut(&key) {
                Some(existing) => {
                    existing.order = existing.order.min(rule.order);
                    for declaration in rule.declarations {
                        existing
                            .declarations
                            .retain(|current| current.property != declaration.property);
                        existing.declarations.push(declaration);
                    }
                }
                None => {
                    merged.insert(key, rule);
                }
            }
        }
        StyleSheet {
            rules: merged.into_values().collect(),
        }
    }

    pub fn sort(mut self) -> StyleSheet {
        self.rules.sort_by(|a, b| {
            a.layer
                .cmp(&b.layer)
                .then_with(|| a.at_rule.is_some().cmp(&b.at_rule.is_some()))
                .then_with(|| a.at_rule.cmp(&b.at_rule))
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| a.selector.cmp(&b.selector))
        });
        self
    }

    pub fn build(&self, deferred: DeferredScope) -> String {
        let mut css = String::new();
        for rule in self.rules.iter().filter(|rule| !rule.declarations.is_empty()) {
            css.push_str(&rule.render(deferred));
            css.push('\n');
        }
        css
    }
}

impl FromIterator<StyleSheet> for StyleSheet {
    fn from_iter<I: IntoIterator<Item = StyleSheet>>(iter: I) -> Self {
        iter.into_iter().fold(StyleSheet::new(), StyleSheet::extend)
    }
}

/// Splits on `separator` outside of quotes, parentheses and brackets.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;

    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if ch == separator && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
