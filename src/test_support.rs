use crate::resolver::{Resolution, UtilityResolver};
use crate::style::{Declaration, Rule, StyleSheet};
use std::cell::RefCell;

#[derive(Debug, Default)]
pub struct FakeResolver {
    known: Vec<String>,
    phantom_ignored: Option<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeResolver {
    pub fn new(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|token| token.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_phantom_ignored(mut self, token: &str) -> Self {
        self.phantom_ignored = Some(token.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn split(&self, classes: &str) -> (Vec<String>, Vec<String>) {
        let (resolved, mut ignored): (Vec<String>, Vec<String>) = classes
            .split_whitespace()
            .map(str::to_string)
            .partition(|token| self.known.contains(token));
        ignored.extend(self.phantom_ignored.clone());
        (resolved, ignored)
    }
}

impl UtilityResolver for FakeResolver {
    fn compile(&self, classes: &str, prefix: &str) -> Resolution {
        self.calls
            .borrow_mut()
            .push(format!("compile:{}:{}", classes, prefix));
        let (resolved, ignored) = self.split(classes);
        if resolved.is_empty() {
            return Resolution {
                ignored,
                ..Resolution::default()
            };
        }
        let emitted = format!("{}{}", prefix, resolved.join("-"));
        let declarations = resolved
            .iter()
            .map(|token| Declaration::new(format!("--{}", token), "1"))
            .collect();
        Resolution {
            style_sheet: StyleSheet::from_rules(vec![Rule::new(
                format!(".{}", emitted),
                declarations,
            )]),
            emitted_token: Some(emitted),
            ignored,
        }
    }

    fn interpret(&self, classes: &str) -> Resolution {
        self.calls.borrow_mut().push(format!("interpret:{}", classes));
        let (resolved, ignored) = self.split(classes);
        let rules = resolved
            .iter()
            .map(|token| {
                Rule::new(
                    format!(".{}", token),
                    vec![Declaration::new(format!("--{}", token), "1")],
                )
            })
            .collect();
        Resolution {
            emitted_token: None,
            ignored,
            style_sheet: StyleSheet::from_rules(rules),
        }
    }

    fn preflight(&self, tags: &[String], include_global: bool) -> StyleSheet {
        self.calls
            .borrow_mut()
            .push(format!("preflight:{}:{}", tags.join(","), include_global));
        let mut sheet = StyleSheet::new();
        if include_global {
            sheet.push(Rule::new("*", vec![Declaration::new("--baseline", "1")]));
        }
        for (idx, tag) in tags.iter().enumerate() {
            sheet.push(
                Rule::new(tag.clone(), vec![Declaration::new("--preflight", tag.clone())])
                    .with_order(idx as u32 + 1),
            );
        }
        sheet
    }
}
